//! Protection state machine
//!
//! Executes one add or remove transition against a single item. Each
//! transition is a strict sequence of guards; the first failing guard decides
//! the outcome and nothing after it runs. Failures are values, never `Err`.

use crate::classifier::{Case, Thresholds};
use crate::collaborators::{CatalogApi, CatalogItem};
use crate::config::GuardConfig;
use crate::dataset::{DenyList, LegacyGrant};
use crate::errors::{Result, UsageGuardError};
use crate::outcome::{CaseResult, Direction, Outcome};
use crate::provenance::ProvenanceValidator;
use crate::shape::{
    EDIT_ACTION, INDEFINITE, ProtectionRequest, ProtectionShape, Restriction, SEMI_LEVEL,
};
use std::time::Duration;

/// Policy inputs the state machine needs for every case
#[derive(Debug, Clone)]
pub struct MachineSettings {
    pub thresholds: Thresholds,
    pub min_subscribers: Option<u64>,
    pub simulate: bool,
    pub post_mutation_delay: Duration,
    pub protect_reason: String,
    pub unprotect_reason: String,
}

impl MachineSettings {
    pub fn from_config(config: &GuardConfig) -> Result<Self> {
        Ok(Self {
            thresholds: config.policy.thresholds()?,
            min_subscribers: config.policy.min_subscribed_projects,
            simulate: config.run.simulate,
            post_mutation_delay: config.run.post_mutation_delay(),
            protect_reason: config.catalog.protect_reason.clone(),
            unprotect_reason: config.catalog.unprotect_reason.clone(),
        })
    }
}

pub struct ProtectionMachine<'a> {
    catalog: &'a dyn CatalogApi,
    validator: ProvenanceValidator<'a>,
    settings: &'a MachineSettings,
}

/// Short-circuit helper: a guard either passes a value on or ends the case
type Step<T> = std::result::Result<T, CaseResult>;

impl<'a> ProtectionMachine<'a> {
    pub fn new(
        catalog: &'a dyn CatalogApi,
        validator: ProvenanceValidator<'a>,
        settings: &'a MachineSettings,
    ) -> Self {
        Self {
            catalog,
            validator,
            settings,
        }
    }

    /// Unprotected -> indefinite semi-protection
    pub async fn add(&self, case: &Case, deny_list: &DenyList) -> CaseResult {
        match self.try_add(case, deny_list).await {
            Ok(result) | Err(result) => result,
        }
    }

    /// Indefinite semi-protection -> unprotected
    pub async fn remove(&self, case: &Case, grants: &[LegacyGrant]) -> CaseResult {
        match self.try_remove(case, grants).await {
            Ok(result) | Err(result) => result,
        }
    }

    async fn try_add(&self, case: &Case, deny_list: &DenyList) -> Step<CaseResult> {
        let id = &case.item_id;
        let usage = case.usage_or_zero();
        let limit = self.settings.thresholds.usage_limit();
        let fail = |outcome, message: String| {
            Err(finish(case, Direction::Add, outcome, message, false))
        };

        if usage < limit {
            return fail(
                Outcome::UsageThreshold,
                format!("Item {id}: entity usage count {usage} under {limit}"),
            );
        }
        if deny_list.contains(id) {
            return fail(Outcome::Denylisted, denied_message(id));
        }
        if let Some(minimum) = self.settings.min_subscribers {
            match self.catalog.subscriber_count(id).await {
                Ok(count) if count < minimum => {
                    return fail(
                        Outcome::BelowSubscriberThreshold,
                        format!("Item {id}: fewer than {minimum} subscribed projects ({count})"),
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    return fail(
                        Outcome::SaveFailed,
                        format!("Item {id}: subscriber count lookup failed: {err}"),
                    );
                }
            }
        }

        let item = self.lookup(case, Direction::Add).await?;
        if item.is_alias {
            return fail(Outcome::ItemIsAlias, format!("Item {id} is a redirect"));
        }
        if !item.protection.is_unprotected() {
            return fail(
                Outcome::UnexpectedProtection,
                format!(
                    "Item {id} is currently not unprotected (but {} instead)",
                    item.protection
                ),
            );
        }

        let expected = item
            .protection
            .with(EDIT_ACTION, Restriction::new(SEMI_LEVEL, INDEFINITE));
        if expected != ProtectionShape::semi_protected() {
            return fail(
                Outcome::ShapeMismatch,
                format!(
                    "Item {id}: modified protection is not \"semiprotected\" \
                     (but {expected} instead)"
                ),
            );
        }

        let request = ProtectionRequest::semi_protect(self.settings.protect_reason.as_str());
        let mutated = self.mutate(case, Direction::Add, &request).await?;
        Ok(finish(
            case,
            Direction::Add,
            Outcome::Success,
            format!("Item {id}: added protection to {expected} (used on {usage} pages)"),
            mutated,
        ))
    }

    async fn try_remove(&self, case: &Case, grants: &[LegacyGrant]) -> Step<CaseResult> {
        let id = &case.item_id;
        let usage = case.usage_or_zero();
        let limit = self.settings.thresholds.usage_limit();
        let fail = |outcome, message: String| {
            Err(finish(case, Direction::Remove, outcome, message, false))
        };

        if usage >= limit {
            return fail(
                Outcome::UsageThreshold,
                format!("Item {id}: entity usage count {usage} over {limit}"),
            );
        }
        if !self.validator.is_lift_authorized(case, grants).await {
            return fail(
                Outcome::NotAuthorized,
                format!(
                    "Item {id}: protecting actor \"{}\" is not trusted and no legacy grant matches",
                    case.actor.as_deref().unwrap_or_default()
                ),
            );
        }

        let item = self.lookup(case, Direction::Remove).await?;
        if item.protection != ProtectionShape::semi_protected() {
            return fail(
                Outcome::UnexpectedProtection,
                format!(
                    "Item {id} is currently not semiprotected (but {} instead)",
                    item.protection
                ),
            );
        }

        let expected = item.protection.without(EDIT_ACTION);
        if !expected.is_unprotected() {
            return fail(
                Outcome::ShapeMismatch,
                format!(
                    "Item {id}: modified protection is not \"unprotected\" (but {expected} instead)"
                ),
            );
        }

        let request = ProtectionRequest::unprotect(self.settings.unprotect_reason.as_str());
        let mutated = self.mutate(case, Direction::Remove, &request).await?;
        Ok(finish(
            case,
            Direction::Remove,
            Outcome::Success,
            format!(
                "Item {id}: removed protection to {expected} (used on {})",
                usage_phrase(case.usage_count)
            ),
            mutated,
        ))
    }

    /// Fetch the live item; a missing item or a failed lookup ends the case
    async fn lookup(&self, case: &Case, direction: Direction) -> Step<CatalogItem> {
        let id = &case.item_id;
        match self.catalog.get_item(id).await {
            Ok(item) if !item.exists => Err(finish(
                case,
                direction,
                Outcome::ItemMissing,
                format!("Item {id} does not exist"),
                false,
            )),
            Ok(item) => Ok(item),
            Err(err) => Err(finish(
                case,
                direction,
                Outcome::SaveFailed,
                format!("Item {id}: item lookup failed: {err}"),
                false,
            )),
        }
    }

    /// Issue the mutation unless simulating. Returns whether a real call was made.
    async fn mutate(
        &self,
        case: &Case,
        direction: Direction,
        request: &ProtectionRequest,
    ) -> Step<bool> {
        if self.settings.simulate {
            return Ok(false);
        }

        let result = self.catalog.set_protection(&case.item_id, request).await;
        if !self.settings.post_mutation_delay.is_zero() {
            tokio::time::sleep(self.settings.post_mutation_delay).await;
        }
        result.map(|()| true).map_err(|err: UsageGuardError| {
            finish(
                case,
                direction,
                Outcome::SaveFailed,
                format!("Item {}: protection change failed: {err}", case.item_id),
                true,
            )
        })
    }
}

/// Result for a deny-listed add candidate, without any remote call
pub fn denied(case: &Case) -> CaseResult {
    finish(
        case,
        Direction::Add,
        Outcome::Denylisted,
        denied_message(&case.item_id),
        false,
    )
}

fn denied_message(id: &str) -> String {
    format!("Item {id}: item is on the deny-list")
}

fn usage_phrase(usage: Option<u64>) -> String {
    match usage {
        Some(n) => format!("{n} pages"),
        None => "no ranked pages".to_string(),
    }
}

fn finish(
    case: &Case,
    direction: Direction,
    outcome: Outcome,
    message: String,
    mutated: bool,
) -> CaseResult {
    CaseResult {
        item_id: case.item_id.clone(),
        direction,
        outcome,
        message,
        mutated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{HistoryStore, ProtectAction};
    use crate::dataset::ProtectionRecord;
    use async_trait::async_trait;
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubCatalog {
        items: Mutex<HashMap<String, CatalogItem>>,
        subscribers: u64,
        fail_writes: bool,
        calls: Mutex<Vec<String>>,
    }

    impl StubCatalog {
        fn with_item(self, id: &str, item: CatalogItem) -> Self {
            if let Ok(mut items) = self.items.lock() {
                items.insert(id.to_string(), item);
            }
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl CatalogApi for StubCatalog {
        async fn get_item(&self, item_id: &str) -> Result<CatalogItem> {
            self.calls.lock().expect("lock").push(format!("get {item_id}"));
            Ok(self
                .items
                .lock()
                .expect("lock")
                .get(item_id)
                .cloned()
                .unwrap_or_else(CatalogItem::missing))
        }

        async fn set_protection(&self, item_id: &str, request: &ProtectionRequest) -> Result<()> {
            self.calls
                .lock()
                .expect("lock")
                .push(format!("set {item_id} {}", request.level));
            if self.fail_writes {
                return Err(UsageGuardError::catalog("protect: permissiondenied"));
            }
            Ok(())
        }

        async fn subscriber_count(&self, item_id: &str) -> Result<u64> {
            self.calls.lock().expect("lock").push(format!("subs {item_id}"));
            Ok(self.subscribers)
        }

        async fn total_entry_count(&self) -> Result<u64> {
            Ok(0)
        }

        async fn publish_page(&self, _title: &str, _text: &str, _summary: &str) -> Result<()> {
            Ok(())
        }
    }

    struct EmptyHistory;

    #[async_trait]
    impl HistoryStore for EmptyHistory {
        async fn current_protections(&self) -> Result<Vec<ProtectionRecord>> {
            Ok(Vec::new())
        }

        async fn latest_protect_action(&self, _item_id: &str) -> Result<Option<ProtectAction>> {
            Ok(None)
        }
    }

    fn settings() -> MachineSettings {
        MachineSettings {
            thresholds: Thresholds::new(500, 300).expect("valid"),
            min_subscribers: None,
            simulate: false,
            post_mutation_delay: Duration::ZERO,
            protect_reason: "protect".to_string(),
            unprotect_reason: "unprotect".to_string(),
        }
    }

    fn add_case(id: &str, usage: u64) -> Case {
        Case {
            item_id: id.to_string(),
            usage_count: Some(usage),
            actor: None,
        }
    }

    fn lift_case(id: &str, usage: Option<u64>, actor: &str) -> Case {
        Case {
            item_id: id.to_string(),
            usage_count: usage,
            actor: Some(actor.to_string()),
        }
    }

    async fn run_add(catalog: &StubCatalog, settings: &MachineSettings, case: &Case) -> CaseResult {
        let trusted = BTreeSet::new();
        let machine = ProtectionMachine::new(
            catalog,
            ProvenanceValidator::new(&trusted, &EmptyHistory),
            settings,
        );
        machine.add(case, &DenyList::from_iter(["W".to_string()])).await
    }

    async fn run_remove(
        catalog: &StubCatalog,
        settings: &MachineSettings,
        case: &Case,
    ) -> CaseResult {
        let trusted = BTreeSet::from(["trusted1".to_string()]);
        let machine = ProtectionMachine::new(
            catalog,
            ProvenanceValidator::new(&trusted, &EmptyHistory),
            settings,
        );
        machine.remove(case, &[]).await
    }

    #[tokio::test]
    async fn test_add_success_calls_protect() {
        let catalog = StubCatalog::default()
            .with_item("X", CatalogItem::existing(ProtectionShape::unprotected()));
        let result = run_add(&catalog, &settings(), &add_case("X", 600)).await;

        assert_eq!(result.outcome, Outcome::Success);
        assert!(result.mutated);
        assert_eq!(
            result.message,
            "Item X: added protection to {'edit': ('autoconfirmed', 'infinity')} \
             (used on 600 pages)"
        );
        assert_eq!(catalog.calls(), vec!["get X", "set X autoconfirmed"]);
    }

    #[tokio::test]
    async fn test_add_guards_short_circuit_in_order() {
        let catalog = StubCatalog::default()
            .with_item("R", CatalogItem::alias())
            .with_item("P", CatalogItem::existing(ProtectionShape::semi_protected()));
        let s = settings();

        let below = run_add(&catalog, &s, &add_case("X", 499)).await;
        assert_eq!(below.outcome, Outcome::UsageThreshold);
        let denied = run_add(&catalog, &s, &add_case("W", 900)).await;
        assert_eq!(denied.outcome, Outcome::Denylisted);
        assert!(catalog.calls().is_empty());

        assert_eq!(run_add(&catalog, &s, &add_case("M", 900)).await.outcome, Outcome::ItemMissing);
        assert_eq!(run_add(&catalog, &s, &add_case("R", 900)).await.outcome, Outcome::ItemIsAlias);
        let partial = run_add(&catalog, &s, &add_case("P", 900)).await;
        assert_eq!(partial.outcome, Outcome::UnexpectedProtection);
        assert!(!catalog.calls().iter().any(|c| c.starts_with("set")));
    }

    #[tokio::test]
    async fn test_add_subscriber_guard_only_when_configured() {
        let catalog = StubCatalog {
            subscribers: 2,
            ..Default::default()
        }
        .with_item("X", CatalogItem::existing(ProtectionShape::unprotected()));
        let mut s = settings();
        s.min_subscribers = Some(3);

        let result = run_add(&catalog, &s, &add_case("X", 900)).await;
        assert_eq!(result.outcome, Outcome::BelowSubscriberThreshold);
        assert_eq!(catalog.calls(), vec!["subs X"]);
    }

    #[tokio::test]
    async fn test_simulate_runs_guards_without_mutation() {
        let catalog = StubCatalog::default()
            .with_item("X", CatalogItem::existing(ProtectionShape::unprotected()));
        let mut s = settings();
        s.simulate = true;

        let result = run_add(&catalog, &s, &add_case("X", 600)).await;
        assert_eq!(result.outcome, Outcome::Success);
        assert!(!result.mutated);
        assert_eq!(catalog.calls(), vec!["get X"]);
    }

    #[tokio::test]
    async fn test_failed_mutation_is_save_failed() {
        let catalog = StubCatalog {
            fail_writes: true,
            ..Default::default()
        }
        .with_item("Y", CatalogItem::existing(ProtectionShape::semi_protected()));

        let result =
            run_remove(&catalog, &settings(), &lift_case("Y", Some(100), "trusted1")).await;
        assert_eq!(result.outcome, Outcome::SaveFailed);
        assert!(result.mutated);
    }

    #[tokio::test]
    async fn test_remove_guards() {
        let extra =
            ProtectionShape::semi_protected().with("move", Restriction::new("sysop", INDEFINITE));
        let catalog = StubCatalog::default()
            .with_item("Y", CatalogItem::existing(ProtectionShape::semi_protected()))
            .with_item("E", CatalogItem::existing(extra));
        let s = settings();

        let over = run_remove(&catalog, &s, &lift_case("Y", Some(500), "trusted1")).await;
        assert_eq!(over.outcome, Outcome::UsageThreshold);
        let untrusted = run_remove(&catalog, &s, &lift_case("Y", Some(10), "AdminU")).await;
        assert_eq!(untrusted.outcome, Outcome::NotAuthorized);
        assert!(catalog.calls().is_empty());

        let extra = run_remove(&catalog, &s, &lift_case("E", Some(10), "trusted1")).await;
        assert_eq!(extra.outcome, Outcome::UnexpectedProtection);
        let missing = run_remove(&catalog, &s, &lift_case("M", None, "trusted1")).await;
        assert_eq!(missing.outcome, Outcome::ItemMissing);

        let lifted = run_remove(&catalog, &s, &lift_case("Y", None, "trusted1")).await;
        assert_eq!(lifted.outcome, Outcome::Success);
        assert_eq!(lifted.message, "Item Y: removed protection to {} (used on no ranked pages)");
        assert!(catalog.calls().contains(&"set Y all".to_string()));
    }
}
