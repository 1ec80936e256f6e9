//! Concrete collaborators for the usageguard engine
//!
//! - [`MediaWikiCatalog`]: item lookup, protection changes and report
//!   publication over the MediaWiki action API
//! - [`HttpRankingFeed`] / [`HttpDenyListFeed`]: remote publications
//! - [`FileLegacyGrants`]: curated allow-list on local disk
//! - [`SqliteHistoryStore`]: protection log snapshot

pub mod catalog;
pub mod feeds;
pub mod history;
pub mod legacy;

pub use catalog::MediaWikiCatalog;
pub use feeds::{HttpDenyListFeed, HttpRankingFeed};
pub use history::SqliteHistoryStore;
pub use legacy::FileLegacyGrants;

use std::time::Duration;
use usageguard_engine::{Result, UsageGuardError};

/// Shared HTTP client for every remote collaborator
pub fn http_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .map_err(|e| UsageGuardError::config_with_source("failed to build HTTP client", e))
}
