//! HTTP feeds: usage ranking and deny-list

use async_trait::async_trait;
use std::path::PathBuf;
use usageguard_engine::{
    DenyListFeed, RankingFeed, RawUsageRow, Result, UsageGuardError, parse_deny_list,
    parse_ranking_csv,
};

async fn get_text(client: &reqwest::Client, url: &str, what: &str) -> Result<String> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| UsageGuardError::feed_with_source(format!("GET {what} failed"), e))?;

    if !resp.status().is_success() {
        return Err(UsageGuardError::feed(format!(
            "GET {what} failed: {}",
            resp.status()
        )));
    }

    resp.text()
        .await
        .map_err(|e| UsageGuardError::feed_with_source(format!("reading {what} body failed"), e))
}

/// Ranking CSV fetched over HTTP and cached on disk before parsing
pub struct HttpRankingFeed {
    client: reqwest::Client,
    url: String,
    cache_path: PathBuf,
}

impl HttpRankingFeed {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        cache_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            cache_path: cache_path.into(),
        }
    }

    async fn refresh_cache(&self) -> Result<()> {
        let body = get_text(&self.client, &self.url, "usage ranking").await?;

        if let Some(parent) = self.cache_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                UsageGuardError::feed_with_source(
                    format!("failed to create cache directory {}", parent.display()),
                    e,
                )
            })?;
        }
        tokio::fs::write(&self.cache_path, body).await.map_err(|e| {
            UsageGuardError::feed_with_source(
                format!("failed to cache ranking at {}", self.cache_path.display()),
                e,
            )
        })
    }
}

#[async_trait]
impl RankingFeed for HttpRankingFeed {
    async fn fetch(&self) -> Result<Vec<RawUsageRow>> {
        self.refresh_cache().await?;

        let cached = tokio::fs::read_to_string(&self.cache_path).await.map_err(|e| {
            UsageGuardError::feed_with_source(
                format!("failed to read cached ranking {}", self.cache_path.display()),
                e,
            )
        })?;
        let rows = parse_ranking_csv(&cached);
        tracing::debug!(rows = rows.len(), url = %self.url, "usage ranking fetched");
        Ok(rows)
    }
}

/// Deny-list published as a JSON array
pub struct HttpDenyListFeed {
    client: reqwest::Client,
    url: String,
}

impl HttpDenyListFeed {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl DenyListFeed for HttpDenyListFeed {
    async fn fetch(&self) -> Result<Vec<String>> {
        let body = get_text(&self.client, &self.url, "deny-list").await?;
        parse_deny_list(&body)
    }
}
