//! Provenance validation for lift candidates
//!
//! A protection may be lifted only if it was applied by a trusted actor, or
//! if it matches exactly one legacy grant and the history store still agrees
//! that the grant's log entry is the latest protect action on the item.

use crate::classifier::Case;
use crate::collaborators::HistoryStore;
use crate::dataset::LegacyGrant;
use std::collections::BTreeSet;

pub struct ProvenanceValidator<'a> {
    trusted_actors: &'a BTreeSet<String>,
    history: &'a dyn HistoryStore,
}

impl<'a> ProvenanceValidator<'a> {
    pub fn new(trusted_actors: &'a BTreeSet<String>, history: &'a dyn HistoryStore) -> Self {
        Self {
            trusted_actors,
            history,
        }
    }

    /// Whether the protection behind `case` may be lifted.
    ///
    /// `grants` is the full legacy grant table; only rows for the case's item
    /// are considered. Ambiguous or unverifiable provenance is never trusted.
    pub async fn is_lift_authorized(&self, case: &Case, grants: &[LegacyGrant]) -> bool {
        if case
            .actor
            .as_ref()
            .is_some_and(|actor| self.trusted_actors.contains(actor))
        {
            return true;
        }

        let mut matching = grants.iter().filter(|g| g.item_id == case.item_id);
        let grant = match (matching.next(), matching.next()) {
            (Some(grant), None) => grant,
            (None, _) => return false,
            (Some(_), Some(_)) => {
                tracing::debug!(item_id = %case.item_id, "several legacy grants for one item");
                return false;
            }
        };

        match self.history.latest_protect_action(&case.item_id).await {
            Ok(Some(action)) => {
                action.item_id == grant.item_id
                    && action.log_id == grant.log_id
                    && action.actor == grant.actor
            }
            Ok(None) => false,
            Err(err) => {
                tracing::warn!(
                    item_id = %case.item_id,
                    error = %err,
                    "provenance query failed; treating protection as untrusted"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::ProtectAction;
    use crate::dataset::ProtectionRecord;
    use crate::errors::{Result, UsageGuardError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedHistory {
        latest: Option<ProtectAction>,
        fail: bool,
        queries: AtomicUsize,
    }

    impl FixedHistory {
        fn returning(latest: Option<ProtectAction>) -> Self {
            Self {
                latest,
                fail: false,
                queries: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl HistoryStore for FixedHistory {
        async fn current_protections(&self) -> Result<Vec<ProtectionRecord>> {
            Ok(Vec::new())
        }

        async fn latest_protect_action(&self, _item_id: &str) -> Result<Option<ProtectAction>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(UsageGuardError::history("replica unreachable"));
            }
            Ok(self.latest.clone())
        }
    }

    fn case(actor: &str) -> Case {
        Case {
            item_id: "Q7".to_string(),
            usage_count: Some(10),
            actor: Some(actor.to_string()),
        }
    }

    fn grant(id: &str, log_id: i64, actor: &str) -> LegacyGrant {
        LegacyGrant {
            item_id: id.to_string(),
            log_id,
            actor: actor.to_string(),
        }
    }

    fn action(log_id: i64, actor: &str) -> Option<ProtectAction> {
        Some(ProtectAction {
            item_id: "Q7".to_string(),
            log_id,
            actor: actor.to_string(),
        })
    }

    fn trusted() -> BTreeSet<String> {
        BTreeSet::from(["trusted1".to_string()])
    }

    #[tokio::test]
    async fn test_trusted_actor_short_circuits() {
        let history = FixedHistory::returning(None);
        let trusted = trusted();
        let validator = ProvenanceValidator::new(&trusted, &history);

        assert!(validator.is_lift_authorized(&case("trusted1"), &[]).await);
        assert_eq!(history.queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_or_several_grants_not_authorized() {
        let history = FixedHistory::returning(action(42, "AdminA"));
        let trusted = trusted();
        let validator = ProvenanceValidator::new(&trusted, &history);

        assert!(!validator.is_lift_authorized(&case("AdminA"), &[]).await);
        let grants = [grant("Q7", 42, "AdminA"), grant("Q7", 43, "AdminA")];
        assert!(!validator.is_lift_authorized(&case("AdminA"), &grants).await);
        assert_eq!(history.queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exact_triple_match_required() {
        let trusted = trusted();
        let grants = [grant("Q1", 1, "Other"), grant("Q7", 42, "AdminA")];

        let matching = FixedHistory::returning(action(42, "AdminA"));
        let validator = ProvenanceValidator::new(&trusted, &matching);
        assert!(validator.is_lift_authorized(&case("AdminA"), &grants).await);

        let wrong_log = FixedHistory::returning(action(43, "AdminA"));
        let validator = ProvenanceValidator::new(&trusted, &wrong_log);
        assert!(!validator.is_lift_authorized(&case("AdminA"), &grants).await);

        let wrong_actor = FixedHistory::returning(action(42, "AdminB"));
        let validator = ProvenanceValidator::new(&trusted, &wrong_actor);
        assert!(!validator.is_lift_authorized(&case("AdminA"), &grants).await);

        let nothing = FixedHistory::returning(None);
        let validator = ProvenanceValidator::new(&trusted, &nothing);
        assert!(!validator.is_lift_authorized(&case("AdminA"), &grants).await);
    }

    #[tokio::test]
    async fn test_query_failure_not_authorized() {
        let history = FixedHistory {
            latest: action(42, "AdminA"),
            fail: true,
            queries: AtomicUsize::new(0),
        };
        let trusted = trusted();
        let validator = ProvenanceValidator::new(&trusted, &history);
        let grants = [grant("Q7", 42, "AdminA")];

        assert!(!validator.is_lift_authorized(&case("AdminA"), &grants).await);
        assert_eq!(history.queries.load(Ordering::SeqCst), 1);
    }
}
