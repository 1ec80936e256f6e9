//! Collaborator construction
//!
//! Configuration only carries locations and names. Live clients and the
//! history connection are built here, once per run, and lent to the engine.

use anyhow::Context;
use std::time::Duration;
use usageguard_adapters::{
    FileLegacyGrants, HttpDenyListFeed, HttpRankingFeed, MediaWikiCatalog, SqliteHistoryStore,
    http_client,
};
use usageguard_engine::{Collaborators, GuardConfig};

pub struct Services {
    history: SqliteHistoryStore,
    ranking: HttpRankingFeed,
    deny_list: HttpDenyListFeed,
    legacy_grants: FileLegacyGrants,
    catalog: MediaWikiCatalog,
}

impl Services {
    pub fn build(config: &GuardConfig) -> anyhow::Result<Self> {
        let client = http_client(
            &config.catalog.user_agent,
            Duration::from_secs(config.catalog.timeout_secs),
        )?;

        let history = SqliteHistoryStore::open(&config.sources.history_db_path)
            .context("failed to open protection history")?;

        let access_token = access_token(&config.catalog.access_token_env);
        if access_token.is_none() && !config.run.simulate {
            tracing::warn!(
                env = %config.catalog.access_token_env,
                "no access token set; protection changes will be rejected"
            );
        }

        Ok(Self {
            history,
            ranking: HttpRankingFeed::new(
                client.clone(),
                config.sources.ranking_url.clone(),
                config.sources.ranking_cache_path.clone(),
            ),
            deny_list: HttpDenyListFeed::new(client.clone(), config.sources.deny_list_url.clone()),
            legacy_grants: FileLegacyGrants::new(config.sources.legacy_grants_path.clone()),
            catalog: MediaWikiCatalog::new(
                client,
                config.catalog.api_endpoint.clone(),
                access_token,
            ),
        })
    }

    pub fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            history: &self.history,
            ranking: &self.ranking,
            deny_list: &self.deny_list,
            legacy_grants: &self.legacy_grants,
            catalog: &self.catalog,
        }
    }
}

fn access_token(env_name: &str) -> Option<String> {
    std::env::var(env_name)
        .ok()
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}
