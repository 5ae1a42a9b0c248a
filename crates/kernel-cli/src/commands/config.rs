//! `skillkernel config` — print the effective `KernelConfig` (defaults,
//! TOML file, and `SKILL_KERNEL_*` env overrides already folded in).

use anyhow::Result;
use kernel_runtime::KernelConfig;

pub fn execute(config: &KernelConfig) -> Result<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
