//! One module per `skillkernel` subcommand.

pub mod config;
pub mod find;
pub mod info;
pub mod invoke;
pub mod list;
pub mod resident;
pub mod serve;
