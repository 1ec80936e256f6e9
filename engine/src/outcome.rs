//! Case outcomes and per-run counters
//!
//! Every processed case yields exactly one [`Outcome`]. Counters are owned by
//! a single run and returned to the caller; there is no process-wide tally.

use crate::classifier::Thresholds;
use serde::Serialize;
use std::fmt;

/// Direction of a protection change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Add,
    Remove,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed taxonomy of case results, shared by both directions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Add: usage below the limit. Remove: usage at or above it.
    UsageThreshold,
    Denylisted,
    BelowSubscriberThreshold,
    NotAuthorized,
    ItemMissing,
    ItemIsAlias,
    /// Live protection is not the expected pre-state
    UnexpectedProtection,
    /// Pre-state plus the change does not give the target shape
    ShapeMismatch,
    /// A remote call made for this case failed
    SaveFailed,
    Success,
}

impl Outcome {
    /// Reporting order
    pub const ALL: [Outcome; 10] = [
        Self::UsageThreshold,
        Self::Denylisted,
        Self::BelowSubscriberThreshold,
        Self::NotAuthorized,
        Self::ItemMissing,
        Self::ItemIsAlias,
        Self::UnexpectedProtection,
        Self::ShapeMismatch,
        Self::SaveFailed,
        Self::Success,
    ];

    fn index(self) -> usize {
        match self {
            Self::UsageThreshold => 0,
            Self::Denylisted => 1,
            Self::BelowSubscriberThreshold => 2,
            Self::NotAuthorized => 3,
            Self::ItemMissing => 4,
            Self::ItemIsAlias => 5,
            Self::UnexpectedProtection => 6,
            Self::ShapeMismatch => 7,
            Self::SaveFailed => 8,
            Self::Success => 9,
        }
    }

    /// Stable key for logs
    pub fn key(self, direction: Direction) -> &'static str {
        match (self, direction) {
            (Self::UsageThreshold, Direction::Add) => "belowlimit",
            (Self::UsageThreshold, Direction::Remove) => "overlimit",
            (Self::Denylisted, _) => "blacklisted",
            (Self::BelowSubscriberThreshold, _) => "belowsubscribedprojects",
            (Self::NotAuthorized, _) => "notwhitelisted",
            (Self::ItemMissing, _) => "itemnotexists",
            (Self::ItemIsAlias, _) => "itemisredirect",
            (Self::UnexpectedProtection, Direction::Add) => "itemhassomeprotection",
            (Self::UnexpectedProtection, Direction::Remove) => "itemisnotsemiprotected",
            (Self::ShapeMismatch, Direction::Add) => "couldntchangetosemiprotection",
            (Self::ShapeMismatch, Direction::Remove) => "couldntremoveprotection",
            (Self::SaveFailed, _) => "savefailed",
            (Self::Success, _) => "successful",
        }
    }

    /// Row label in the report tables
    pub fn label(
        self,
        direction: Direction,
        thresholds: Thresholds,
        min_subscribers: Option<u64>,
    ) -> String {
        match (self, direction) {
            (Self::UsageThreshold, Direction::Add) => format!(
                "Entity usage below configured limit of {}",
                thresholds.usage_limit()
            ),
            (Self::UsageThreshold, Direction::Remove) => format!(
                "Entity usage above configured limit of {}",
                thresholds.usage_limit()
            ),
            (Self::Denylisted, _) => "Blacklisted item".to_string(),
            (Self::BelowSubscriberThreshold, _) => format!(
                "Subscribed project count below configured limit of {}",
                min_subscribers.map_or_else(|| "None".to_string(), |n| n.to_string())
            ),
            (Self::NotAuthorized, _) => "Not a whitelisted protection".to_string(),
            (Self::ItemMissing, _) => "Item page does not exist".to_string(),
            (Self::ItemIsAlias, _) => "Item page is a redirect".to_string(),
            (Self::UnexpectedProtection, Direction::Add) => {
                "Item page already has some sort of protection".to_string()
            }
            (Self::UnexpectedProtection, Direction::Remove) => {
                "Item page is not indefinitely semiprotected".to_string()
            }
            (Self::ShapeMismatch, Direction::Add) => "Addition of protection failed".to_string(),
            (Self::ShapeMismatch, Direction::Remove) => "Removal of protection failed".to_string(),
            (Self::SaveFailed, _) => "Modification of protection level failed".to_string(),
            (Self::Success, Direction::Add) => "Successfully protected".to_string(),
            (Self::Success, Direction::Remove) => "Successfully unprotected".to_string(),
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// Result of processing one case: the outcome plus its printed line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseResult {
    pub item_id: String,
    pub direction: Direction,
    pub outcome: Outcome,
    pub message: String,
    /// Whether the mutation API was actually called
    pub mutated: bool,
}

/// Per-direction counts, indexed by [`Outcome`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeTally([u64; Outcome::ALL.len()]);

impl OutcomeTally {
    pub fn increment(&mut self, outcome: Outcome) {
        self.0[outcome.index()] += 1;
    }

    pub fn get(&self, outcome: Outcome) -> u64 {
        self.0[outcome.index()]
    }

    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }

    /// Non-zero entries in reporting order
    pub fn non_zero(&self) -> impl Iterator<Item = (Outcome, u64)> + '_ {
        Outcome::ALL
            .iter()
            .map(|o| (*o, self.get(*o)))
            .filter(|(_, n)| *n > 0)
    }
}

/// Counters for one run, split into the add and remove taxonomies
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub added: OutcomeTally,
    pub removed: OutcomeTally,
    /// Real mutation calls issued (zero in simulate mode)
    pub mutation_calls: u64,
}

impl RunCounters {
    pub fn record(&mut self, result: &CaseResult) {
        self.tally_mut(result.direction).increment(result.outcome);
        if result.mutated {
            self.mutation_calls += 1;
        }
    }

    pub fn tally(&self, direction: Direction) -> &OutcomeTally {
        match direction {
            Direction::Add => &self.added,
            Direction::Remove => &self.removed,
        }
    }

    fn tally_mut(&mut self, direction: Direction) -> &mut OutcomeTally {
        match direction {
            Direction::Add => &mut self.added,
            Direction::Remove => &mut self.removed,
        }
    }

    pub fn added_count(&self) -> u64 {
        self.added.get(Outcome::Success)
    }

    pub fn lifted_count(&self) -> u64 {
        self.removed.get(Outcome::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(direction: Direction, outcome: Outcome, mutated: bool) -> CaseResult {
        CaseResult {
            item_id: "Q1".to_string(),
            direction,
            outcome,
            message: String::new(),
            mutated,
        }
    }

    #[test]
    fn test_all_indexes_are_distinct() {
        for (i, outcome) in Outcome::ALL.iter().enumerate() {
            assert_eq!(outcome.index(), i);
        }
    }

    #[test]
    fn test_counters_split_by_direction() {
        let mut counters = RunCounters::default();
        counters.record(&result(Direction::Add, Outcome::Success, true));
        counters.record(&result(Direction::Add, Outcome::Denylisted, false));
        counters.record(&result(Direction::Remove, Outcome::Success, true));
        counters.record(&result(Direction::Remove, Outcome::Success, false));

        assert_eq!(counters.added_count(), 1);
        assert_eq!(counters.lifted_count(), 2);
        assert_eq!(counters.added.total(), 2);
        assert_eq!(counters.mutation_calls, 2);
        let non_zero: Vec<_> = counters.tally(Direction::Add).non_zero().collect();
        assert_eq!(
            non_zero,
            vec![(Outcome::Denylisted, 1), (Outcome::Success, 1)]
        );
    }

    #[test]
    fn test_labels_depend_on_direction() {
        let t = Thresholds::new(500, 300).expect("valid");
        assert_eq!(
            Outcome::UsageThreshold.label(Direction::Add, t, None),
            "Entity usage below configured limit of 500"
        );
        assert_eq!(
            Outcome::UsageThreshold.label(Direction::Remove, t, None),
            "Entity usage above configured limit of 500"
        );
        assert_eq!(
            Outcome::BelowSubscriberThreshold.label(Direction::Add, t, Some(3)),
            "Subscribed project count below configured limit of 3"
        );
        assert_eq!(Outcome::Denylisted.key(Direction::Add), "blacklisted");
        assert_eq!(
            Outcome::UnexpectedProtection.key(Direction::Remove),
            "itemisnotsemiprotected"
        );
    }
}
