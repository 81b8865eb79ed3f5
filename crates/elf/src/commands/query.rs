//! Knowledge queries and category views.

use anyhow::Result;
use elf_core::QueryEngine;
use elf_core::validation::split_tags;
use serde::Serialize;
use tracing::debug;

use crate::cli::{Cli, Query};
use crate::output;

pub fn execute(query: &Query, cli: &Cli, engine: &QueryEngine) -> Result<()> {
    let timeout = cli.timeout();
    let domain = cli.domain.as_deref();
    debug!("Running {:?}", query);

    match query {
        Query::Domain(name) => print(cli, &engine.query_by_domain(name, cli.limit, timeout)?),
        Query::Tags(raw) => {
            let tags = split_tags(raw);
            print(cli, &engine.query_by_tags(&tags, cli.limit, timeout)?)
        }
        Query::Recent(n) => print(
            cli,
            &engine.query_recent(cli.learning_type.as_deref(), *n, None, timeout)?,
        ),
        Query::Similar(task) => print(
            cli,
            &engine.find_similar_failures(task, cli.threshold, cli.limit, timeout)?,
        ),
        Query::Experiments => print(cli, &engine.get_active_experiments(timeout)?),
        Query::CeoReviews => print(cli, &engine.get_pending_reviews(timeout)?),
        Query::Decisions => print(cli, &engine.get_decisions(domain, cli.limit, timeout)?),
        Query::Invariants => print(cli, &engine.get_invariants(domain, cli.limit, timeout)?),
        Query::Assumptions => {
            print(cli, &engine.get_assumptions(domain, None, cli.limit, timeout)?)
        }
        Query::Spikes => print(cli, &engine.get_spike_reports(domain, cli.limit, timeout)?),
        other => anyhow::bail!("{:?} is not a knowledge query", other),
    }
}

fn print<T: Serialize>(cli: &Cli, result: &T) -> Result<()> {
    println!("{}", output::render(result, cli.format)?);
    Ok(())
}
