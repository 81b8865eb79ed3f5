//! `--validate` and `--stats`.

use std::process::ExitCode;

use anyhow::Result;
use colored::Colorize;
use elf_core::QueryEngine;

use crate::cli::Cli;
use crate::output;

pub fn validate(cli: &Cli, engine: &QueryEngine) -> Result<ExitCode> {
    let report = engine.validate_database(cli.timeout())?;

    let code = if report.valid {
        println!("Database validation: {}", "PASSED".green().bold());
        ExitCode::SUCCESS
    } else {
        println!("Database validation: {}", "FAILED".red().bold());
        ExitCode::from(1)
    };
    println!("{}", output::render(&report, cli.format)?);
    Ok(code)
}

pub fn stats(cli: &Cli, engine: &QueryEngine) -> Result<()> {
    let stats = engine.get_statistics(cli.timeout())?;
    println!("{}", output::render(&stats, cli.format)?);
    Ok(())
}
