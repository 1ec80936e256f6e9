//! Run report rendering
//!
//! The report is plain wikitext rendered from a template with `{key}`
//! placeholders. `{{` and `}}` are literal braces, and a float placeholder may
//! carry a precision (`{wdcmpercent:.4f}`). Unknown keys are an error so that
//! a typo in a template never publishes a half-rendered page.

use crate::classifier::{Case, ClassifiedSets, Thresholds};
use crate::config::GuardConfig;
use crate::dataset::Datasets;
use crate::errors::{Result, UsageGuardError};
use crate::outcome::{Direction, OutcomeTally, RunCounters};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

/// Built-in template used when no template file is configured
pub const DEFAULT_TEMPLATE: &str = "\
Protection management run of {timestmp} (UTC).

== Configuration ==
* Usage ranking: {wdcmurl}
* Deny-list: {blacklisturl}
* Usage limit: {entityusagelimit}
* Cooldown limit: {cooldownlimit}
* Add limit: {addlimit}
* Lift limit: {liftlimit}
* Hard limit: {hardlimit}
* Minimum subscribed projects: {minsubscribedprojects}

== Input ==
* Items in usage ranking: {wdcmcnt}
* Items at or above the usage limit: {wdcmusagelimit} ({wdcmpercent:.4f}% of {itemcnt} items)
* Deny-listed items: {blacklistedcnt}
* Indefinitely semi-protected items: {indefsemi}
** highly used: {indefsemihighlyused}
** other: {indefsemiother}
** other, but also highly used: {indefsemiotherbutalsohighlyused}

== Processing ==
* Protections to add: {protectionstoadd}
* Deny-listed add candidates (not counted against the add limit): {deniedcandidatecnt}
* Protections to lift: {protectionstolift}
* Protections not lifted (cooldown): {cooldowncnt}
* Protections added in this run: {addedcnt}
* Protections lifted in this run: {liftedcnt}

=== Additions ===
{additionstats}

=== Removals ===
{removalstats}

=== Cooldown ===
{cooldownlist}
";

/// Set sizes and counts for one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub legacy_grants: usize,
    pub ranked: usize,
    pub ranked_at_or_above_limit: usize,
    pub total_items: u64,
    pub deny_listed: usize,
    pub protected: usize,
    pub protected_trusted: usize,
    pub protected_untrusted: usize,
    pub protected_untrusted_highly_used: usize,
    /// Add candidates checked against the add limit
    pub to_add: usize,
    /// Deny-listed add candidates, recorded without any remote call
    pub denied_candidates: usize,
    pub to_lift: usize,
    pub in_cooldown: usize,
    pub added: u64,
    pub lifted: u64,
}

impl RunSummary {
    pub fn new(
        data: &Datasets,
        sets: &ClassifiedSets,
        counters: &RunCounters,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            legacy_grants: data.legacy_grants.len(),
            ranked: data.usage.len(),
            ranked_at_or_above_limit: data.usage_at_or_above(thresholds.usage_limit()),
            total_items: data.total_items,
            deny_listed: data.deny_list.len(),
            protected: data.protections.len(),
            protected_trusted: sets.protected_trusted.len(),
            protected_untrusted: sets.protected_untrusted.len(),
            protected_untrusted_highly_used: sets.already_set_other.len(),
            to_add: sets.to_add.len(),
            denied_candidates: sets.denied.len(),
            to_lift: sets.to_lift.len(),
            in_cooldown: sets.in_cooldown.len(),
            added: counters.added_count(),
            lifted: counters.lifted_count(),
        }
    }

    /// Share of the catalog at or above the usage limit, in percent
    pub fn percent_ranked(&self) -> f64 {
        if self.total_items == 0 {
            return 0.0;
        }
        self.ranked_at_or_above_limit as f64 / self.total_items as f64 * 100.0
    }

    /// Human-readable summary, one line each
    pub fn lines(&self, usage_limit: u64) -> Vec<String> {
        vec![
            format!("Number of legacy grants: {}", self.legacy_grants),
            format!("Number of elements in usage ranking: {}", self.ranked),
            format!(
                "Number of elements in usage ranking (cnt>={usage_limit}): {} ({:.4}% of {} items)",
                self.ranked_at_or_above_limit,
                self.percent_ranked(),
                self.total_items
            ),
            format!("Number of deny-listed items: {}", self.deny_listed),
            format!("Number of indef semiprotected items: {}", self.protected),
            format!(
                "Number of indef semiprotected items (highly used): {}",
                self.protected_trusted
            ),
            format!(
                "Number of indef semiprotected items (other): {}",
                self.protected_untrusted
            ),
            format!(
                "Number of indef semiprotected items (other, but also highly used): {}",
                self.protected_untrusted_highly_used
            ),
            format!("Number of protections to add: {}", self.to_add),
            format!(
                "Number of deny-listed add candidates: {}",
                self.denied_candidates
            ),
            format!("Number of protections to lift: {}", self.to_lift),
            format!(
                "Number of protections not to lift (cooldown): {}",
                self.in_cooldown
            ),
            format!("Number of protections added in this run: {}", self.added),
            format!("Number of protections lifted in this run: {}", self.lifted),
        ]
    }
}

/// A placeholder value
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    Text(String),
    Float(f64),
}

impl From<String> for TemplateValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for TemplateValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<u64> for TemplateValue {
    fn from(value: u64) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<usize> for TemplateValue {
    fn from(value: usize) -> Self {
        Self::Text(value.to_string())
    }
}

impl<T: ToString> From<Option<T>> for TemplateValue {
    fn from(value: Option<T>) -> Self {
        Self::Text(value.map_or_else(|| "None".to_string(), |n| n.to_string()))
    }
}

pub type TemplateValues = BTreeMap<&'static str, TemplateValue>;

/// Everything the report needs from a finished run
pub struct ReportContext<'a> {
    pub started_at: DateTime<Utc>,
    pub config: &'a GuardConfig,
    pub thresholds: Thresholds,
    pub summary: &'a RunSummary,
    pub counters: &'a RunCounters,
    pub in_cooldown: &'a [Case],
}

impl ReportContext<'_> {
    pub fn values(&self) -> TemplateValues {
        let policy = &self.config.policy;
        let summary = self.summary;
        let min_subscribers = policy.min_subscribed_projects;
        let mut values = TemplateValues::new();
        values.insert(
            "timestmp",
            self.started_at.format("%Y-%m-%d, %H:%M:%S").to_string().into(),
        );
        values.insert("wdcmurl", self.config.sources.ranking_url.as_str().into());
        values.insert("blacklisturl", self.config.sources.deny_list_url.as_str().into());
        values.insert("entityusagelimit", self.thresholds.usage_limit().into());
        values.insert("cooldownlimit", self.thresholds.cooldown_limit().into());
        values.insert("addlimit", policy.add_limit.into());
        values.insert("liftlimit", policy.lift_limit.into());
        values.insert("hardlimit", policy.hard_limit.into());
        values.insert("minsubscribedprojects", min_subscribers.into());
        values.insert("wdcmcnt", summary.ranked.into());
        values.insert("wdcmusagelimit", summary.ranked_at_or_above_limit.into());
        values.insert("wdcmpercent", TemplateValue::Float(summary.percent_ranked()));
        values.insert("itemcnt", summary.total_items.into());
        values.insert("blacklistedcnt", summary.deny_listed.into());
        values.insert("indefsemi", summary.protected.into());
        values.insert("indefsemihighlyused", summary.protected_trusted.into());
        values.insert("indefsemiother", summary.protected_untrusted.into());
        values.insert(
            "indefsemiotherbutalsohighlyused",
            summary.protected_untrusted_highly_used.into(),
        );
        values.insert("protectionstoadd", summary.to_add.into());
        values.insert("deniedcandidatecnt", summary.denied_candidates.into());
        values.insert("protectionstolift", summary.to_lift.into());
        values.insert("cooldowncnt", summary.in_cooldown.into());
        values.insert("cooldownlist", cooldown_list(self.in_cooldown).into());
        values.insert("addedcnt", summary.added.into());
        values.insert("liftedcnt", summary.lifted.into());
        values.insert(
            "additionstats",
            outcome_table(&self.counters.added, Direction::Add, self.thresholds, min_subscribers)
                .into(),
        );
        values.insert(
            "removalstats",
            outcome_table(
                &self.counters.removed,
                Direction::Remove,
                self.thresholds,
                min_subscribers,
            )
            .into(),
        );
        values
    }
}

/// Sortable wikitable with one row per non-zero outcome
pub fn outcome_table(
    tally: &OutcomeTally,
    direction: Direction,
    thresholds: Thresholds,
    min_subscribers: Option<u64>,
) -> String {
    let mut table = String::from("{| class=\"wikitable sortable\"\n|-\n");
    table.push_str("! processing result !! number of cases\n");
    for (outcome, count) in tally.non_zero() {
        let _ = write!(
            table,
            "|-\n| {} || {count}\n",
            outcome.label(direction, thresholds, min_subscribers)
        );
    }
    table.push_str("|}");
    table
}

/// `{{Q|id}}` links, comma separated; empty for an empty band
pub fn cooldown_list(cases: &[Case]) -> String {
    cases
        .iter()
        .map(|c| format!("{{{{Q|{}}}}}", c.item_id))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Read the configured template, or fall back to the built-in one
pub fn load_template(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path).map_err(|e| {
            UsageGuardError::report_with_source(
                format!("failed to read report template {}", path.display()),
                e,
            )
        }),
        None => Ok(DEFAULT_TEMPLATE.to_string()),
    }
}

/// Substitute placeholders
pub fn render(template: &str, values: &TemplateValues) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => field.push(ch),
                        None => {
                            return Err(UsageGuardError::report(format!(
                                "unterminated placeholder {{{field}"
                            )));
                        }
                    }
                }
                out.push_str(&substitute(&field, values)?);
            }
            '}' => {
                return Err(UsageGuardError::report("single '}' in report template"));
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

fn substitute(field: &str, values: &TemplateValues) -> Result<String> {
    let (key, spec) = match field.split_once(':') {
        Some((key, spec)) => (key, Some(spec)),
        None => (field, None),
    };
    let value = values
        .get(key)
        .ok_or_else(|| UsageGuardError::report(format!("unknown report placeholder {{{key}}}")))?;

    match (value, spec) {
        (TemplateValue::Text(text), None) => Ok(text.clone()),
        (TemplateValue::Float(x), None) => Ok(x.to_string()),
        (TemplateValue::Float(x), Some(spec)) => {
            let precision = spec
                .strip_prefix('.')
                .and_then(|s| s.strip_suffix('f'))
                .and_then(|s| s.parse::<usize>().ok())
                .ok_or_else(|| {
                    UsageGuardError::report(format!("unsupported format spec {spec:?} for {key}"))
                })?;
            Ok(format!("{x:.precision$}"))
        }
        (TemplateValue::Text(_), Some(spec)) => Err(UsageGuardError::report(format!(
            "format spec {spec:?} is only supported for numeric placeholder, not {key}"
        ))),
    }
}
