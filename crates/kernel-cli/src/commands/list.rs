//! `skillkernel list` — every known skill, resident or ghost, with its
//! declared commands.

use anyhow::Result;
use colored::*;
use kernel_runtime::Kernel;
use std::collections::HashSet;

pub fn execute(kernel: &Kernel, json: bool) -> Result<()> {
    let resident: HashSet<String> = kernel.dispatch.resident().resident_ids().into_iter().collect();
    let mut records = kernel.metadata_index.records();
    records.sort_by(|a, b| a.id.cmp(&b.id));

    if json {
        let rows: Vec<serde_json::Value> = records
            .iter()
            .map(|r| {
                serde_json::json!({
                    "skill_id": r.id,
                    "resident": resident.contains(&r.id),
                    "commands": r.declared_commands.iter().map(|c| &c.name).collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("{} no skills found under the configured skills root", "!".yellow());
        return Ok(());
    }

    for record in &records {
        let state = if resident.contains(&record.id) {
            "resident".green()
        } else {
            "ghost".dimmed()
        };
        let commands: Vec<&str> = record.declared_commands.iter().map(|c| c.name.as_str()).collect();
        println!(
            "{:<24} {:<10} {}",
            record.id.cyan().bold(),
            state,
            commands.join(", ").dimmed()
        );
    }

    Ok(())
}
