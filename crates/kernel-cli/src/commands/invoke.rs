//! `skillkernel invoke <target> [--args <json>] [--session <id>]`

use anyhow::{Context, Result};
use colored::*;
use kernel_runtime::Kernel;

pub async fn execute(kernel: &Kernel, target: &str, args_json: &str, session: &str) -> Result<()> {
    let args: serde_json::Value =
        serde_json::from_str(args_json).with_context(|| format!("invalid --args JSON: {args_json}"))?;

    match kernel.invoke(target, args, session).await {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(err) => {
            eprintln!("{} {}", "Error:".red().bold(), err);
            eprintln!("  {} {}", "kind:".dimmed(), err.kind());
            if !err.extra().is_null() {
                eprintln!("  {} {}", "detail:".dimmed(), err.extra());
            }
            std::process::exit(1);
        }
    }
}
