//! `skillkernel find <query>` — semantic search over the Ghost-Tool Index,
//! for discovering a skill without knowing its id.

use anyhow::Result;
use colored::*;
use kernel_runtime::Kernel;
use std::collections::HashSet;

pub async fn execute(kernel: &Kernel, query: &str, json: bool) -> Result<()> {
    let resident: HashSet<String> = kernel.dispatch.resident().resident_ids().into_iter().collect();
    let matches = kernel.dispatch.ghost_index().search(query, &resident).await?;

    if json {
        let rows: Vec<serde_json::Value> = matches
            .iter()
            .map(|m| serde_json::json!({ "skill_id": m.skill_id, "score": m.score }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if matches.is_empty() {
        println!("{} no ghost skills matched {:?}", "!".yellow(), query);
        return Ok(());
    }

    for (rank, m) in matches.iter().enumerate() {
        println!(
            "{}. {} {}",
            (rank + 1).to_string().bold(),
            m.skill_id.cyan().bold(),
            format!("[{:.2}]", m.score).dimmed()
        );
    }

    Ok(())
}
