//! Command implementations for the elf CLI.
//!
//! Each submodule implements the logic for a group of query flags.

pub mod accountability;
pub mod context;
pub mod diagnostics;
pub mod query;

use std::process::ExitCode;

use anyhow::Result;
use clap::CommandFactory;
use elf_core::QueryEngine;

use crate::cli::{Cli, Query};

/// Run the operation the command line selects.
pub fn run(cli: &Cli, engine: &QueryEngine) -> Result<ExitCode> {
    match cli.query() {
        Query::Validate => diagnostics::validate(cli, engine),
        Query::Stats => diagnostics::stats(cli, engine).map(|_| ExitCode::SUCCESS),
        Query::Context => context::execute(cli, engine).map(|_| ExitCode::SUCCESS),
        Query::GoldenRules => {
            accountability::golden_rules(engine);
            Ok(ExitCode::SUCCESS)
        }
        Query::Violations => accountability::violations(cli, engine).map(|_| ExitCode::SUCCESS),
        Query::AccountabilityBanner => {
            accountability::accountability_banner(cli, engine).map(|_| ExitCode::SUCCESS)
        }
        Query::Help => {
            Cli::command().print_help()?;
            Ok(ExitCode::SUCCESS)
        }
        other => query::execute(&other, cli, engine).map(|_| ExitCode::SUCCESS),
    }
}
