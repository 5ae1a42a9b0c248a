//! `skillkernel info <skill_id>` — a skill's protocol and command table,
//! equivalent to invoking the bare skill id as a dispatch target.

use anyhow::Result;
use colored::*;
use kernel_runtime::Kernel;

pub async fn execute(kernel: &Kernel, skill_id: &str, json: bool) -> Result<()> {
    match kernel.invoke(skill_id, serde_json::json!({}), "cli-info").await {
        Ok(value) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&value)?);
                return Ok(());
            }
            print_help(&value);
            Ok(())
        }
        Err(err) => {
            eprintln!("{} {}", "Error:".red().bold(), err);
            std::process::exit(1);
        }
    }
}

fn print_help(value: &serde_json::Value) {
    let skill_id = value.get("skill_id").and_then(|v| v.as_str()).unwrap_or("?");
    println!("{} {}", "Skill:".bold(), skill_id.cyan().bold());
    if let Some(desc) = value.get("description").and_then(|v| v.as_str()) {
        if !desc.is_empty() {
            println!("{}", desc);
        }
    }
    if let Some(protocol) = value.get("protocol").and_then(|v| v.as_str()) {
        if !protocol.is_empty() {
            println!();
            println!("{}", "Protocol".bold());
            println!("  {}", protocol.dimmed());
        }
    }
    if let Some(commands) = value.get("commands").and_then(|v| v.as_array()) {
        println!();
        println!("{} ({})", "Commands".bold(), commands.len());
        for command in commands {
            let name = command.get("name").and_then(|v| v.as_str()).unwrap_or("?");
            let description = command.get("description").and_then(|v| v.as_str()).unwrap_or("");
            println!("  {} {} {}", "•".cyan(), name.cyan().bold(), description.dimmed());
        }
    }
}
