//! `--context`: tiered context for an agent task.

use anyhow::Result;
use elf_core::validation::split_tags;
use elf_core::{ContextRequest, QueryEngine};
use tracing::info;

use crate::cli::{Cli, Format};
use crate::output;

pub fn execute(cli: &Cli, engine: &QueryEngine) -> Result<()> {
    let request = request(cli);
    let assembled = engine.assemble_context(&request)?;
    info!(
        "Context assembled: ~{} tokens of {} budget",
        assembled.approx_tokens, assembled.max_tokens
    );

    match cli.format {
        Format::Text => println!("{}", assembled.text),
        format => println!("{}", output::render(&assembled, format)?),
    }
    Ok(())
}

fn request(cli: &Cli) -> ContextRequest {
    let mut request = ContextRequest::new(cli.task.as_str()).with_max_tokens(cli.max_tokens);
    if let Some(domain) = &cli.domain {
        request = request.with_domain(domain.as_str());
    }
    if let Some(tags) = &cli.tags {
        request = request.with_tags(split_tags(tags));
    }
    if let Some(timeout) = cli.timeout() {
        request = request.with_timeout(timeout);
    }
    request
}
