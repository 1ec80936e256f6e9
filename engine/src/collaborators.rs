//! External collaborators
//!
//! The engine reaches the outside world only through these traits. Concrete
//! HTTP and SQLite implementations live in `usageguard-adapters`; tests use
//! in-memory fakes.

use crate::dataset::{LegacyGrant, ProtectionRecord, RawUsageRow};
use crate::errors::Result;
use crate::shape::{ProtectionRequest, ProtectionShape};
use async_trait::async_trait;

/// Most recent protect action recorded for an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectAction {
    pub item_id: String,
    pub log_id: i64,
    pub actor: String,
}

/// Live state of an item as reported by the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    pub exists: bool,
    pub is_alias: bool,
    pub protection: ProtectionShape,
}

impl CatalogItem {
    pub fn missing() -> Self {
        Self {
            exists: false,
            is_alias: false,
            protection: ProtectionShape::unprotected(),
        }
    }

    pub fn existing(protection: ProtectionShape) -> Self {
        Self {
            exists: true,
            is_alias: false,
            protection,
        }
    }

    pub fn alias() -> Self {
        Self {
            exists: true,
            is_alias: true,
            protection: ProtectionShape::unprotected(),
        }
    }
}

/// Durable history of protection actions
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Every protect/modify log row whose page currently carries indefinite
    /// edit semi-protection. Several rows per item are expected.
    async fn current_protections(&self) -> Result<Vec<ProtectionRecord>>;

    /// The single most recent `protect` action on `item_id`, if any
    async fn latest_protect_action(&self, item_id: &str) -> Result<Option<ProtectAction>>;
}

/// Usage ranking publication
#[async_trait]
pub trait RankingFeed: Send + Sync {
    /// Rows in feed order, usage counts still unparsed
    async fn fetch(&self) -> Result<Vec<RawUsageRow>>;
}

/// Identifiers that must never be protected
#[async_trait]
pub trait DenyListFeed: Send + Sync {
    async fn fetch(&self) -> Result<Vec<String>>;
}

/// Curated allow-list of protections predating the policy
#[async_trait]
pub trait LegacyGrantSource: Send + Sync {
    async fn load(&self) -> Result<Vec<LegacyGrant>>;
}

/// Catalog read and mutation API
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn get_item(&self, item_id: &str) -> Result<CatalogItem>;

    async fn set_protection(&self, item_id: &str, request: &ProtectionRequest) -> Result<()>;

    /// Number of client projects subscribed to the item
    async fn subscriber_count(&self, item_id: &str) -> Result<u64>;

    /// Total number of entries in the catalog (reporting only)
    async fn total_entry_count(&self) -> Result<u64>;

    /// Replace the text of a page (report publication)
    async fn publish_page(&self, title: &str, text: &str, summary: &str) -> Result<()>;
}

/// All collaborators a run needs, injected by the caller
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub history: &'a dyn HistoryStore,
    pub ranking: &'a dyn RankingFeed,
    pub deny_list: &'a dyn DenyListFeed,
    pub legacy_grants: &'a dyn LegacyGrantSource,
    pub catalog: &'a dyn CatalogApi,
}
