//! elf - Emergent Learning Framework query CLI
//!
//! Tiered knowledge retrieval for agent sessions: domain, tag and recency
//! queries, similar-failure lookup, and context assembly over the learning
//! store.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use clap::error::ErrorKind as ClapErrorKind;
use elf_core::{ErrorKind, QueryEngine};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod banner;
mod cli;
mod commands;
mod config;
mod output;

use cli::Cli;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // clap exits 2 on usage errors, which would read as a store error
            return match e.kind() {
                ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            };
        }
    };

    init_tracing(cli.debug);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => report(&e, cli.debug),
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let config = config::load(cli.base_path.as_deref())?;
    let engine = QueryEngine::open(config)?;
    let outcome = commands::run(cli, &engine);
    engine.cleanup();
    outcome
}

fn init_tracing(debug: bool) {
    let level = if debug { "debug" } else { "warn" };
    let mut filter = EnvFilter::from_default_env();
    for directive in [format!("elf={}", level), format!("elf_core={}", level)] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Print an error with its kind prefix and pick the exit code.
fn report(err: &anyhow::Error, debug: bool) -> ExitCode {
    match err.downcast_ref::<elf_core::Error>() {
        Some(e) => eprintln!("{}: {}", prefix(e.kind()), e),
        None => eprintln!("UNEXPECTED ERROR: {} [{}]", err, ErrorKind::General.code()),
    }
    if debug {
        eprintln!("{:?}", err);
    }
    ExitCode::from(exit_code(err))
}

fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<elf_core::Error>()
        .map(|e| e.kind())
        .unwrap_or(ErrorKind::General)
        .exit_code()
}

fn prefix(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "VALIDATION ERROR",
        ErrorKind::Store => "DATABASE ERROR",
        ErrorKind::Timeout => "TIMEOUT ERROR",
        ErrorKind::Configuration => "CONFIGURATION ERROR",
        ErrorKind::General => "UNEXPECTED ERROR",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_prefixes() {
        assert_eq!(prefix(ErrorKind::Validation), "VALIDATION ERROR");
        assert_eq!(prefix(ErrorKind::Store), "DATABASE ERROR");
        assert_eq!(prefix(ErrorKind::Timeout), "TIMEOUT ERROR");
        assert_eq!(prefix(ErrorKind::Configuration), "CONFIGURATION ERROR");
    }

    #[test]
    fn test_exit_codes() {
        let timeout = anyhow::Error::from(elf_core::Error::timeout(Duration::from_secs(1)));
        assert_eq!(exit_code(&timeout), 3);

        let store = anyhow::Error::from(elf_core::Error::store("locked"));
        assert_eq!(exit_code(&store), 2);

        let config = anyhow::Error::from(elf_core::Error::configuration("no dir"));
        assert_eq!(exit_code(&config), 1);

        let other = anyhow::anyhow!("boom");
        assert_eq!(exit_code(&other), 1);
    }

    #[test]
    fn test_engine_round_trip_through_commands() {
        let dir = tempfile::TempDir::new().unwrap();
        let base = dir.path().to_str().unwrap();
        let cli = Cli::try_parse_from(["elf", "--base-path", base, "--validate"]).unwrap();
        assert!(run(&cli).is_ok());

        let cli = Cli::try_parse_from(["elf", "--base-path", base, "--domain", "a/b"]).unwrap();
        let err = run(&cli).unwrap_err();
        assert_eq!(
            err.downcast_ref::<elf_core::Error>().map(|e| e.kind()),
            Some(ErrorKind::Validation)
        );
    }

    #[test]
    fn test_zero_timeout_runs_with_default() {
        let dir = tempfile::TempDir::new().unwrap();
        let base = dir.path().to_str().unwrap();
        let cli = Cli::try_parse_from(["elf", "--base-path", base, "--timeout", "0", "--stats"])
            .unwrap();
        assert_eq!(cli.timeout(), Some(Duration::ZERO));
        assert!(run(&cli).is_ok());
    }
}
