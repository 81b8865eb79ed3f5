//! Golden rules and violation accountability.

use anyhow::Result;
use elf_core::QueryEngine;

use crate::banner;
use crate::cli::Cli;
use crate::output;

/// Days covered by the accountability banner.
const BANNER_DAYS: u32 = 7;

pub fn golden_rules(engine: &QueryEngine) {
    println!("{}", engine.get_golden_rules());
}

pub fn violations(cli: &Cli, engine: &QueryEngine) -> Result<()> {
    let summary = engine.get_violation_summary(cli.violation_days, cli.timeout())?;
    println!("{}", output::render(&summary, cli.format)?);
    Ok(())
}

pub fn accountability_banner(cli: &Cli, engine: &QueryEngine) -> Result<()> {
    let summary = engine.get_violation_summary(BANNER_DAYS, cli.timeout())?;
    banner::print(&summary);
    Ok(())
}
