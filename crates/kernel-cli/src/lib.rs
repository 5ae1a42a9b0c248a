//! Library half of the `skillkernel` binary: command implementations that
//! wire CLI subcommands to a `kernel_runtime::Kernel`.

pub mod commands;
