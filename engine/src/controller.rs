//! Run controller
//!
//! Drives one reconciliation run:
//!
//! ```text
//! Load -> Classify -> LiftPass -> AddPass -> Report -> Done
//! ```
//!
//! Only `Load` (and writing the report file) can fail the run. Everything a
//! pass does is recorded as per-case outcomes.

use crate::classifier::{Case, ClassifiedSets, classify};
use crate::collaborators::Collaborators;
use crate::config::GuardConfig;
use crate::dataset::Datasets;
use crate::dump;
use crate::errors::{Result, UsageGuardError};
use crate::outcome::{CaseResult, Direction, RunCounters};
use crate::provenance::ProvenanceValidator;
use crate::report::{self, ReportContext, RunSummary};
use crate::transition::{self, MachineSettings, ProtectionMachine};
use chrono::{DateTime, Utc};

/// Phases of a run, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Load,
    Classify,
    LiftPass,
    AddPass,
    Report,
    Done,
}

impl RunPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Classify => "classify",
            Self::LiftPass => "lift_pass",
            Self::AddPass => "add_pass",
            Self::Report => "report",
            Self::Done => "done",
        }
    }
}

/// How a pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStatus {
    /// Every candidate was processed
    Completed { processed: usize },
    /// Candidate set larger than the pass limit; nothing was processed
    Skipped { candidates: usize, limit: usize },
    /// Stopped by the hard cap
    Capped { processed: usize },
}

impl PassStatus {
    pub fn processed(self) -> usize {
        match self {
            Self::Completed { processed } | Self::Capped { processed } => processed,
            Self::Skipped { .. } => 0,
        }
    }
}

/// Everything a finished run hands back to its caller
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub counters: RunCounters,
    pub lift_pass: PassStatus,
    pub add_pass: PassStatus,
    /// One entry per processed case, in processing order
    pub results: Vec<CaseResult>,
    pub summary: RunSummary,
    /// Rendered report text (also written to the report path)
    pub report: String,
    pub published: bool,
}

pub struct RunController<'a> {
    config: &'a GuardConfig,
    deps: Collaborators<'a>,
}

/// Mutable state threaded through both passes
#[derive(Default)]
struct RunLedger {
    counters: RunCounters,
    results: Vec<CaseResult>,
}

impl RunLedger {
    fn record(&mut self, result: CaseResult) {
        let key = result.outcome.key(result.direction);
        if result.outcome.is_success() {
            tracing::info!(
                item_id = %result.item_id,
                direction = %result.direction,
                outcome = key,
                "{}",
                result.message
            );
        } else {
            tracing::warn!(
                item_id = %result.item_id,
                direction = %result.direction,
                outcome = key,
                "{}",
                result.message
            );
        }
        self.counters.record(&result);
        self.results.push(result);
    }
}

impl<'a> RunController<'a> {
    pub fn new(config: &'a GuardConfig, deps: Collaborators<'a>) -> Self {
        Self { config, deps }
    }

    /// Execute one full run
    pub async fn run(&self, started_at: DateTime<Utc>) -> Result<RunOutcome> {
        let settings = MachineSettings::from_config(self.config)?;
        let trusted = self.config.policy.trusted_actor_set();

        enter(RunPhase::Load);
        let data = Datasets::load(&self.deps).await?;

        enter(RunPhase::Classify);
        let sets = classify(&data, settings.thresholds, &trusted);
        if let Some(dir) = &self.config.output.dataset_dir {
            dump::write_all(dir, &data, &sets);
        }

        let machine = ProtectionMachine::new(
            self.deps.catalog,
            ProvenanceValidator::new(&trusted, self.deps.history),
            &settings,
        );
        let mut ledger = RunLedger::default();

        enter(RunPhase::LiftPass);
        let lift_pass = self
            .run_pass(&machine, Direction::Remove, &data, &sets, &mut ledger)
            .await;

        enter(RunPhase::AddPass);
        let add_pass = self
            .run_pass(&machine, Direction::Add, &data, &sets, &mut ledger)
            .await;

        let summary = RunSummary::new(&data, &sets, &ledger.counters, settings.thresholds);
        for line in summary.lines(settings.thresholds.usage_limit()) {
            tracing::info!("{line}");
        }

        enter(RunPhase::Report);
        let context = ReportContext {
            started_at,
            config: self.config,
            thresholds: settings.thresholds,
            summary: &summary,
            counters: &ledger.counters,
            in_cooldown: &sets.in_cooldown,
        };
        let text = self.write_report(&context)?;
        let published = self.publish_report(&text, &summary, settings.simulate).await;

        enter(RunPhase::Done);
        Ok(RunOutcome {
            counters: ledger.counters,
            lift_pass,
            add_pass,
            results: ledger.results,
            summary,
            report: text,
            published,
        })
    }

    async fn run_pass(
        &self,
        machine: &ProtectionMachine<'_>,
        direction: Direction,
        data: &Datasets,
        sets: &ClassifiedSets,
        ledger: &mut RunLedger,
    ) -> PassStatus {
        let policy = &self.config.policy;
        let (cases, limit): (&[Case], Option<usize>) = match direction {
            Direction::Remove => (sets.to_lift.as_slice(), policy.lift_limit),
            Direction::Add => (sets.to_add.as_slice(), policy.add_limit),
        };

        if let Some(limit) = limit.filter(|limit| cases.len() > *limit) {
            let verb = match direction {
                Direction::Remove => "lift",
                Direction::Add => "add",
            };
            tracing::info!(
                "Do not {verb} any protections, as the list has {} entries (limit: {limit})",
                cases.len()
            );
            return PassStatus::Skipped {
                candidates: cases.len(),
                limit,
            };
        }

        if direction == Direction::Add {
            for case in &sets.denied {
                ledger.record(transition::denied(case));
            }
        }

        for (idx, case) in cases.iter().enumerate() {
            let result = match direction {
                Direction::Remove => machine.remove(case, &data.legacy_grants).await,
                Direction::Add => machine.add(case, &data.deny_list).await,
            };
            ledger.record(result);

            let processed = idx + 1;
            if processed < cases.len() && policy.hard_limit.is_some_and(|cap| processed >= cap) {
                tracing::info!(
                    processed,
                    remaining = cases.len() - processed,
                    "hard limit reached"
                );
                return PassStatus::Capped { processed };
            }
        }

        PassStatus::Completed {
            processed: cases.len(),
        }
    }

    /// Render the report and write it to disk; failure here fails the run
    fn write_report(&self, context: &ReportContext<'_>) -> Result<String> {
        let output = &self.config.output;
        let template = report::load_template(output.report_template.as_deref())?;
        let text = report::render(&template, &context.values())?;

        if let Some(parent) = output.report_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                UsageGuardError::report_with_source(
                    format!("failed to create report directory {}", parent.display()),
                    e,
                )
            })?;
        }
        std::fs::write(&output.report_path, &text).map_err(|e| {
            UsageGuardError::report_with_source(
                format!("failed to write report to {}", output.report_path.display()),
                e,
            )
        })?;
        tracing::debug!(path = %output.report_path.display(), "report written");
        Ok(text)
    }

    /// Publish only after a real run that changed something
    async fn publish_report(&self, text: &str, summary: &RunSummary, simulate: bool) -> bool {
        let report = &self.config.report;
        if simulate || !self.config.publishes_report() || summary.added + summary.lifted == 0 {
            tracing::debug!("report not published");
            return false;
        }

        match self
            .deps
            .catalog
            .publish_page(&report.page, text, &report.edit_summary)
            .await
        {
            Ok(()) => {
                tracing::info!(page = %report.page, "report published");
                true
            }
            Err(err) => {
                tracing::error!(page = %report.page, error = %err, "failed to publish report");
                false
            }
        }
    }
}

fn enter(phase: RunPhase) {
    tracing::debug!(phase = phase.as_str(), "run phase");
}
