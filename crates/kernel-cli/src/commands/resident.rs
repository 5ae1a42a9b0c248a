//! `skillkernel pin`/`unpin <skill_id>` — Resident Set pin management.

use anyhow::Result;
use colored::*;
use kernel_runtime::Kernel;

pub fn pin(kernel: &Kernel, skill_id: &str) -> Result<()> {
    if !kernel.dispatch.resident().contains(skill_id) {
        anyhow::bail!("'{skill_id}' is not resident; invoke it once before pinning");
    }
    kernel.dispatch.resident().pin(skill_id);
    println!("{} pinned {}", "✓".green(), skill_id.cyan());
    Ok(())
}

pub fn unpin(kernel: &Kernel, skill_id: &str) -> Result<()> {
    if !kernel.dispatch.resident().contains(skill_id) {
        anyhow::bail!("'{skill_id}' is not resident");
    }
    kernel.dispatch.resident().unpin(skill_id);
    println!("{} unpinned {}", "✓".green(), skill_id.cyan());
    Ok(())
}
