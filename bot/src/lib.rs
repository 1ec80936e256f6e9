//! `usageguard` binary support
//!
//! One invocation is one reconciliation run: load configuration, install
//! logging, build collaborators, run the controller, report the exit code.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod cli;
pub mod logging;
pub mod wiring;

pub use cli::Cli;

use anyhow::Context;
use chrono::Utc;
use usageguard_engine::{ErrorCategory, GuardConfig, RunController, RunOutcome, UsageGuardError};
use wiring::Services;

/// Exit code for a configuration problem
pub const EXIT_CONFIG: u8 = 2;
/// Exit code for any other run-fatal failure
pub const EXIT_FAILURE: u8 = 1;

/// Execute a single run end to end
pub async fn run(cli: Cli) -> anyhow::Result<RunOutcome> {
    let started_at = Utc::now();

    let mut config =
        GuardConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply_overrides(&mut config);

    let log_file = logging::init(&config.output, started_at)?;
    tracing::info!(
        version = usageguard_engine::VERSION,
        simulate = config.run.simulate,
        log_file = ?log_file,
        "usageguard starting"
    );

    let services = Services::build(&config)?;
    let outcome = RunController::new(&config, services.collaborators())
        .run(started_at)
        .await
        .context("run aborted")?;

    tracing::info!(
        added = outcome.counters.added_count(),
        lifted = outcome.counters.lifted_count(),
        lift_processed = outcome.lift_pass.processed(),
        add_processed = outcome.add_pass.processed(),
        mutation_calls = outcome.counters.mutation_calls,
        published = outcome.published,
        "usageguard finished"
    );
    Ok(outcome)
}

/// Map a run failure to the process exit code
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err
        .downcast_ref::<UsageGuardError>()
        .map(UsageGuardError::category)
    {
        Some(ErrorCategory::ConfigError) => EXIT_CONFIG,
        _ => EXIT_FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exit_code_by_category() {
        let config = anyhow::Error::new(UsageGuardError::config("bad thresholds"))
            .context("failed to load configuration");
        assert_eq!(exit_code(&config), EXIT_CONFIG);

        let dataset = anyhow::Error::new(UsageGuardError::dataset("ranking unavailable"));
        assert_eq!(exit_code(&dataset), EXIT_FAILURE);

        let report = anyhow::Error::new(UsageGuardError::report("failed to write report"))
            .context("run aborted");
        assert_eq!(exit_code(&report), EXIT_FAILURE);

        assert_eq!(exit_code(&anyhow::anyhow!("other")), EXIT_FAILURE);
    }
}
