//! Input datasets
//!
//! Canonical in-memory tables keyed by item identifier, plus the parsers and
//! normalizers that turn raw feed output into them. Loading is all-or-nothing:
//! if any source fails, no tables are returned and the run stops before any
//! mutation.

use crate::collaborators::Collaborators;
use crate::errors::{Result, UsageGuardError};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Usage count for one item, as published by the ranking feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageRecord {
    pub item_id: String,
    pub usage_count: u64,
}

/// A ranking row before its usage count has been validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawUsageRow {
    pub item_id: String,
    pub usage_count: Option<String>,
}

/// Most recent action that produced the tracked protection on an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtectionRecord {
    pub item_id: String,
    /// Log timestamp as a monotonic integer (`YYYYMMDDhhmmss`)
    pub applied_at: i64,
    pub actor: String,
}

/// Allow-listed protection applied before the policy existed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyGrant {
    pub item_id: String,
    /// Protection log id; ordering key distinct from the timestamp
    pub log_id: i64,
    pub actor: String,
}

/// Identifiers that must never receive protection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DenyList(BTreeSet<String>);

impl DenyList {
    pub fn contains(&self, item_id: &str) -> bool {
        self.0.contains(item_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<String> for DenyList {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The four canonical tables plus catalog size
#[derive(Debug, Clone, Default)]
pub struct Datasets {
    /// One record per protected item, ascending by `applied_at`
    pub protections: Vec<ProtectionRecord>,
    /// Ranking rows in feed order
    pub usage: Vec<UsageRecord>,
    /// One grant per item, ascending by `log_id`
    pub legacy_grants: Vec<LegacyGrant>,
    pub deny_list: DenyList,
    /// Total catalog entries, used only for report percentages
    pub total_items: u64,
}

impl Datasets {
    /// Fetch and normalize every input. Any failure is fatal for the run.
    pub async fn load(deps: &Collaborators<'_>) -> Result<Self> {
        let raw_protections = deps
            .history
            .current_protections()
            .await
            .map_err(|e| {
                UsageGuardError::dataset_with_source("failed to load current protections", e)
            })?;
        let protections = latest_protections(raw_protections);
        tracing::debug!(count = protections.len(), "loaded current protections");

        let raw_usage = deps
            .ranking
            .fetch()
            .await
            .map_err(|e| UsageGuardError::dataset_with_source("failed to load usage ranking", e))?;
        let usage = normalize_usage(raw_usage);
        tracing::debug!(count = usage.len(), "loaded usage ranking");

        let raw_grants = deps
            .legacy_grants
            .load()
            .await
            .map_err(|e| UsageGuardError::dataset_with_source("failed to load legacy grants", e))?;
        let legacy_grants = latest_legacy_grants(raw_grants);
        tracing::debug!(count = legacy_grants.len(), "loaded legacy grants");

        let deny_list: DenyList = deps
            .deny_list
            .fetch()
            .await
            .map_err(|e| UsageGuardError::dataset_with_source("failed to load deny-list", e))?
            .into_iter()
            .collect();
        tracing::debug!(count = deny_list.len(), "loaded deny-list");

        let total_items = deps
            .catalog
            .total_entry_count()
            .await
            .map_err(|e| UsageGuardError::dataset_with_source("failed to load catalog size", e))?;

        Ok(Self {
            protections,
            usage,
            legacy_grants,
            deny_list,
            total_items,
        })
    }

    /// Ranking rows at or above `limit`
    pub fn usage_at_or_above(&self, limit: u64) -> usize {
        self.usage.iter().filter(|u| u.usage_count >= limit).count()
    }
}

/// Parse the ranking CSV: a header line, then `identifier,usageCount` rows.
///
/// Rows without a second column keep `usage_count: None` so the normalizer
/// can drop them.
pub fn parse_ranking_csv(text: &str) -> Vec<RawUsageRow> {
    text.lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut cols = line.splitn(2, ',');
            let item_id = unquote(cols.next().unwrap_or_default());
            let usage_count = cols
                .next()
                .map(unquote)
                .filter(|value| !value.is_empty());
            RawUsageRow {
                item_id,
                usage_count,
            }
        })
        .collect()
}

fn unquote(field: &str) -> String {
    field.trim().trim_matches('"').to_string()
}

/// Drop rows with missing or non-numeric counts, then drop every identifier
/// that the feed lists more than once.
pub fn normalize_usage(rows: Vec<RawUsageRow>) -> Vec<UsageRecord> {
    let parsed: Vec<UsageRecord> = rows
        .into_iter()
        .filter_map(|row| {
            let count = row.usage_count.as_deref()?.parse::<u64>().ok()?;
            (!row.item_id.is_empty()).then_some(UsageRecord {
                item_id: row.item_id,
                usage_count: count,
            })
        })
        .collect();

    let mut occurrences: HashMap<&str, usize> = HashMap::new();
    for record in &parsed {
        *occurrences.entry(record.item_id.as_str()).or_default() += 1;
    }
    let duplicated: HashSet<String> = occurrences
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(id, _)| id.to_string())
        .collect();

    if !duplicated.is_empty() {
        tracing::warn!(
            count = duplicated.len(),
            "ranking feed lists identifiers more than once; dropping them"
        );
    }

    parsed
        .into_iter()
        .filter(|record| !duplicated.contains(&record.item_id))
        .collect()
}

/// Collapse history rows to the latest per item (largest timestamp; on a tie
/// the later row wins). Result is ascending by timestamp.
pub fn latest_protections(rows: Vec<ProtectionRecord>) -> Vec<ProtectionRecord> {
    keep_last_by(rows, |r| r.applied_at, |r| r.item_id.clone())
}

/// Collapse legacy grants to the one with the largest log id per item.
/// Result is ascending by log id.
pub fn latest_legacy_grants(grants: Vec<LegacyGrant>) -> Vec<LegacyGrant> {
    keep_last_by(grants, |g| g.log_id, |g| g.item_id.clone())
}

fn keep_last_by<T, K, O>(mut rows: Vec<T>, order: O, key: K) -> Vec<T>
where
    O: Fn(&T) -> i64,
    K: Fn(&T) -> String,
{
    rows.sort_by_key(&order);
    let mut seen = HashSet::new();
    let mut kept: Vec<T> = rows.into_iter().rev().filter(|r| seen.insert(key(r))).collect();
    kept.reverse();
    kept
}

/// Parse the legacy grant file: `identifier<TAB>logId<TAB>actor`, no header.
pub fn parse_legacy_grants(text: &str) -> Result<Vec<LegacyGrant>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            let cols: Vec<&str> = line.split('\t').collect();
            let [item_id, log_id, actor] = cols.as_slice() else {
                return Err(UsageGuardError::dataset(format!(
                    "legacy grants line {}: expected 3 tab-separated columns, got {}",
                    idx + 1,
                    cols.len()
                )));
            };
            let log_id = log_id.trim().parse::<i64>().map_err(|_| {
                UsageGuardError::dataset(format!(
                    "legacy grants line {}: log id {log_id:?} is not an integer",
                    idx + 1
                ))
            })?;
            Ok(LegacyGrant {
                item_id: item_id.trim().to_string(),
                log_id,
                actor: actor.trim().to_string(),
            })
        })
        .collect()
}

/// Parse the deny-list publication (a JSON array of identifiers)
pub fn parse_deny_list(text: &str) -> Result<Vec<String>> {
    serde_json::from_str(text).map_err(|e| {
        UsageGuardError::feed_with_source("deny-list is not a JSON array of strings", e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn usage(id: &str, count: u64) -> UsageRecord {
        UsageRecord {
            item_id: id.to_string(),
            usage_count: count,
        }
    }

    fn protection(id: &str, ts: i64, actor: &str) -> ProtectionRecord {
        ProtectionRecord {
            item_id: id.to_string(),
            applied_at: ts,
            actor: actor.to_string(),
        }
    }

    #[test]
    fn test_parse_ranking_csv_skips_header() {
        let text = "eu_page_id,eu_count\nQ1,900\n\"Q2\",\"450\"\nQ3\n\nQ4,\n";
        let rows = parse_ranking_csv(text);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].usage_count.as_deref(), Some("900"));
        assert_eq!(rows[1].item_id, "Q2");
        assert_eq!(rows[1].usage_count.as_deref(), Some("450"));
        assert_eq!(rows[2].usage_count, None);
        assert_eq!(rows[3].usage_count, None);
    }

    #[test]
    fn test_normalize_usage_drops_missing_and_non_numeric() {
        let rows = parse_ranking_csv("h,h\nQ1,900\nQ2,n/a\nQ3\nQ4,-5\nQ5,12\n");
        assert_eq!(normalize_usage(rows), vec![usage("Q1", 900), usage("Q5", 12)]);
    }

    #[test]
    fn test_normalize_usage_drops_duplicated_identifiers_entirely() {
        let rows = parse_ranking_csv("h,h\nQ1,900\nQ2,800\nQ1,700\nQ3,10\n");
        assert_eq!(normalize_usage(rows), vec![usage("Q2", 800), usage("Q3", 10)]);
    }

    #[test]
    fn test_latest_protections_keeps_most_recent() {
        let rows = vec![
            protection("Q1", 20200101000000, "AdminA"),
            protection("Q2", 20190101000000, "AdminB"),
            protection("Q1", 20210101000000, "MsynABot"),
            protection("Q1", 20150101000000, "AdminC"),
        ];
        assert_eq!(
            latest_protections(rows),
            vec![
                protection("Q2", 20190101000000, "AdminB"),
                protection("Q1", 20210101000000, "MsynABot"),
            ]
        );
    }

    #[test]
    fn test_latest_legacy_grants_keeps_highest_log_id() {
        let grants = parse_legacy_grants("Q1\t10\tAdminA\nQ1\t12\tAdminB\nQ2\t5\tAdminC\n")
            .expect("parse");
        let latest = latest_legacy_grants(grants);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].item_id, "Q2");
        assert_eq!(latest[1].log_id, 12);
        assert_eq!(latest[1].actor, "AdminB");
    }

    #[test]
    fn test_parse_legacy_grants_rejects_malformed_rows() {
        assert!(parse_legacy_grants("Q1\tabc\tAdminA\n").is_err());
        assert!(parse_legacy_grants("Q1\t10\n").is_err());
    }

    #[test]
    fn test_parse_deny_list() {
        let list: DenyList = parse_deny_list(r#"["Q4115189", "Q13406268"]"#)
            .expect("parse")
            .into_iter()
            .collect();
        assert!(list.contains("Q4115189"));
        assert_eq!(list.len(), 2);
        assert!(parse_deny_list(r#"{"Q1": true}"#).is_err());
    }
}
