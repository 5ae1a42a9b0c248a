//! `skillkernel serve` — run the Hot Reload Controller in the foreground,
//! keeping the Metadata Index and Ghost Index fresh until interrupted.

use anyhow::Result;
use colored::*;
use kernel_runtime::{Kernel, ReloadController};
use std::time::Duration;

pub async fn execute(kernel: &Kernel) -> Result<()> {
    let controller = ReloadController::new(
        kernel.config.skills_root_path.clone(),
        Duration::from_secs(kernel.config.reload_poll_interval_s),
        kernel.metadata_index.clone(),
        kernel.dispatch.ghost_index(),
        kernel.events.clone(),
    );
    let stop = controller.stop_flag();

    println!(
        "{} watching {} every {}s (ctrl-c to stop)",
        "→".cyan(),
        kernel.config.skills_root_path.display(),
        kernel.config.reload_poll_interval_s
    );

    let run = controller.run();
    tokio::pin!(run);

    tokio::select! {
        _ = &mut run => {}
        _ = tokio::signal::ctrl_c() => {
            stop.stop();
            eprintln!();
            eprintln!("{} shutting down", "✓".green());
        }
    }

    Ok(())
}
