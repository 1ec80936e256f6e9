//! Set classification
//!
//! Partitions the joined datasets into the case sets each pass works on.
//! Every step is a plain relational operation (filter, anti-join, left join,
//! sort) over the canonical tables.
//!
//! ```text
//!   usage:   0 ........ cooldown_limit ........ usage_limit ........
//!            |  lift if protected  |  hold (no-op)  |  add if unprotected
//! ```
//!
//! The add set is drawn only from unprotected ranked items and the lift set
//! only from protected items, so the two are disjoint for any input.

use crate::dataset::{Datasets, LegacyGrant, ProtectionRecord, UsageRecord};
use crate::errors::{Result, UsageGuardError};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Two-threshold hysteresis policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    usage_limit: u64,
    cooldown_limit: u64,
}

impl Thresholds {
    /// Refuses `cooldown_limit >= usage_limit`
    pub fn new(usage_limit: u64, cooldown_limit: u64) -> Result<Self> {
        if cooldown_limit >= usage_limit {
            return Err(UsageGuardError::config(format!(
                "cooldown limit {cooldown_limit} must be below usage limit {usage_limit}"
            )));
        }
        Ok(Self {
            usage_limit,
            cooldown_limit,
        })
    }

    /// Protect at or above
    pub fn usage_limit(self) -> u64 {
        self.usage_limit
    }

    /// Never lift at or above
    pub fn cooldown_limit(self) -> u64 {
        self.cooldown_limit
    }

    /// Inside `[cooldown_limit, usage_limit)`
    pub fn in_band(self, usage: u64) -> bool {
        (self.cooldown_limit..self.usage_limit).contains(&usage)
    }
}

/// Unit of work fed into the protection state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Case {
    pub item_id: String,
    /// `None` when the item is absent from the ranking
    pub usage_count: Option<u64>,
    /// Actor of the current protection; `None` for add candidates
    pub actor: Option<String>,
}

impl Case {
    pub fn for_add(record: &UsageRecord) -> Self {
        Self {
            item_id: record.item_id.clone(),
            usage_count: Some(record.usage_count),
            actor: None,
        }
    }

    pub fn for_lift(record: &ProtectionRecord, usage_count: Option<u64>) -> Self {
        Self {
            item_id: record.item_id.clone(),
            usage_count,
            actor: Some(record.actor.clone()),
        }
    }

    /// Usage with absence read as zero
    pub fn usage_or_zero(&self) -> u64 {
        self.usage_count.unwrap_or(0)
    }
}

/// Output of classification
#[derive(Debug, Clone, Default)]
pub struct ClassifiedSets {
    /// Protections that are legacy grants or were applied by a trusted actor
    pub protected_trusted: Vec<ProtectionRecord>,
    /// Every other current protection
    pub protected_untrusted: Vec<ProtectionRecord>,
    /// Unprotected, at or above the usage limit, not denied; highest usage first
    pub to_add: Vec<Case>,
    /// Add candidates removed because they are on the deny-list
    pub denied: Vec<Case>,
    /// Trusted protections below the cooldown floor (or unranked)
    pub to_lift: Vec<Case>,
    /// Trusted protections inside the hysteresis band; never mutated
    pub in_cooldown: Vec<Case>,
    /// Untrusted protections still justified by usage; never mutated
    pub already_set_other: Vec<Case>,
}

/// Partition the datasets
pub fn classify(
    data: &Datasets,
    thresholds: Thresholds,
    trusted_actors: &BTreeSet<String>,
) -> ClassifiedSets {
    let usage_by_id: HashMap<&str, u64> = data
        .usage
        .iter()
        .map(|u| (u.item_id.as_str(), u.usage_count))
        .collect();
    let protected_ids: HashSet<&str> = data
        .protections
        .iter()
        .map(|p| p.item_id.as_str())
        .collect();
    let granted_ids = grant_ids(&data.legacy_grants);

    let (protected_trusted, protected_untrusted): (Vec<_>, Vec<_>) =
        data.protections.iter().cloned().partition(|p| {
            granted_ids.contains(p.item_id.as_str()) || trusted_actors.contains(&p.actor)
        });

    let (denied, to_add): (Vec<Case>, Vec<Case>) = sorted_desc(
        data.usage
            .iter()
            .filter(|u| u.usage_count >= thresholds.usage_limit())
            .filter(|u| !protected_ids.contains(u.item_id.as_str()))
            .map(Case::for_add)
            .collect(),
    )
    .into_iter()
    .partition(|case| data.deny_list.contains(&case.item_id));

    let to_lift = sorted_desc(
        protected_trusted
            .iter()
            .filter(|p| {
                usage_by_id
                    .get(p.item_id.as_str())
                    .is_none_or(|u| *u < thresholds.cooldown_limit())
            })
            .map(|p| Case::for_lift(p, usage_by_id.get(p.item_id.as_str()).copied()))
            .collect(),
    );

    let in_cooldown = sorted_desc(
        protected_trusted
            .iter()
            .filter_map(|p| {
                let usage = usage_by_id.get(p.item_id.as_str()).copied()?;
                thresholds
                    .in_band(usage)
                    .then(|| Case::for_lift(p, Some(usage)))
            })
            .collect(),
    );

    let already_set_other = protected_untrusted
        .iter()
        .filter_map(|p| {
            let usage = usage_by_id.get(p.item_id.as_str()).copied()?;
            (usage >= thresholds.usage_limit()).then(|| Case::for_lift(p, Some(usage)))
        })
        .collect();

    ClassifiedSets {
        protected_trusted,
        protected_untrusted,
        to_add,
        denied,
        to_lift,
        in_cooldown,
        already_set_other,
    }
}

fn grant_ids(grants: &[LegacyGrant]) -> HashSet<&str> {
    grants.iter().map(|g| g.item_id.as_str()).collect()
}

/// Descending by usage, absent usage last, ties keep input order
fn sorted_desc(mut cases: Vec<Case>) -> Vec<Case> {
    cases.sort_by(|a, b| match (a.usage_count, b.usage_count) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    cases
}
