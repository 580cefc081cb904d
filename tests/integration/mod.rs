//! Integration Tests Module
//!
//! - **scenarios** - full transitions from plan to verified unlock bundles
//! - **cli_smoke_test** - offline subcommands of the built binary

pub mod cli_smoke_test;
pub mod scenarios;
