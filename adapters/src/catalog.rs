//! MediaWiki action API client
//!
//! Every request asks for `format=json&formatversion=2`. Writes fetch a fresh
//! CSRF token first. A response carrying an `error` object is a failure even
//! when the HTTP status is 200.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use usageguard_engine::{
    CatalogApi, CatalogItem, ProtectionRequest, ProtectionShape, Restriction, Result,
    UsageGuardError,
};

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    info: String,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    #[serde(default)]
    redirect: bool,
    #[serde(default)]
    protection: Vec<ProtectionEntry>,
}

#[derive(Debug, Deserialize)]
struct ProtectionEntry {
    #[serde(rename = "type")]
    action: String,
    level: String,
    expiry: String,
}

#[derive(Debug, Deserialize)]
struct Subscriber {
    site: String,
}

pub struct MediaWikiCatalog {
    client: reqwest::Client,
    endpoint: String,
    access_token: Option<String>,
}

impl MediaWikiCatalog {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        access_token: Option<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            access_token,
        }
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn get(&self, params: &[(&str, &str)]) -> Result<Value> {
        let req = self
            .client
            .get(&self.endpoint)
            .query(&[("format", "json"), ("formatversion", "2")])
            .query(params);
        self.send(req, params).await
    }

    async fn post(&self, form: &[(&str, &str)]) -> Result<Value> {
        let mut body: Vec<(&str, &str)> = vec![("format", "json"), ("formatversion", "2")];
        body.extend_from_slice(form);
        let req = self.client.post(&self.endpoint).form(&body);
        self.send(req, form).await
    }

    async fn send(&self, req: reqwest::RequestBuilder, params: &[(&str, &str)]) -> Result<Value> {
        let action = params
            .iter()
            .find(|(k, _)| *k == "action")
            .map_or("query", |(_, v)| *v);

        let resp = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| {
                UsageGuardError::catalog_with_source(format!("{action} request failed"), e)
            })?;

        if !resp.status().is_success() {
            return Err(UsageGuardError::catalog(format!(
                "{action} request failed: {}",
                resp.status()
            )));
        }

        let value: Value = resp.json().await.map_err(|e| {
            UsageGuardError::catalog_with_source(format!("{action} response is not JSON"), e)
        })?;

        if let Some(error) = value.get("error") {
            let error: ApiError = serde_json::from_value(error.clone()).map_err(|e| {
                UsageGuardError::catalog_with_source(
                    format!("{action} returned a malformed error"),
                    e,
                )
            })?;
            return Err(UsageGuardError::catalog(format!(
                "{action}: {}: {}",
                error.code, error.info
            )));
        }

        Ok(value)
    }

    async fn csrf_token(&self) -> Result<String> {
        let value = self
            .get(&[("action", "query"), ("meta", "tokens"), ("type", "csrf")])
            .await?;
        extract(&value, "/query/tokens/csrftoken")
    }
}

/// Pull a typed value out of a response by JSON pointer
fn extract<T: DeserializeOwned>(value: &Value, pointer: &str) -> Result<T> {
    let field = value
        .pointer(pointer)
        .ok_or_else(|| UsageGuardError::catalog(format!("response lacks {pointer}")))?;
    serde_json::from_value(field.clone()).map_err(|e| {
        UsageGuardError::catalog_with_source(format!("unexpected value at {pointer}"), e)
    })
}

/// Every entry counts, cascading ones included
fn shape_from(entries: &[ProtectionEntry]) -> ProtectionShape {
    ProtectionShape::from_entries(entries.iter().map(|e| {
        (
            e.action.as_str(),
            Restriction::new(e.level.as_str(), e.expiry.as_str()),
        )
    }))
}

#[async_trait]
impl CatalogApi for MediaWikiCatalog {
    async fn get_item(&self, item_id: &str) -> Result<CatalogItem> {
        let value = self
            .get(&[
                ("action", "query"),
                ("prop", "info"),
                ("inprop", "protection"),
                ("titles", item_id),
            ])
            .await?;
        let pages: Vec<PageInfo> = extract(&value, "/query/pages")?;
        let Some(page) = pages.into_iter().next() else {
            return Err(UsageGuardError::catalog(format!("no page returned for {item_id}")));
        };

        if page.missing || page.invalid {
            return Ok(CatalogItem::missing());
        }
        Ok(CatalogItem {
            exists: true,
            is_alias: page.redirect,
            protection: shape_from(&page.protection),
        })
    }

    async fn set_protection(&self, item_id: &str, request: &ProtectionRequest) -> Result<()> {
        let token = self.csrf_token().await?;
        let protections = format!("{}={}", request.action, request.level);
        let mut form = vec![
            ("action", "protect"),
            ("title", item_id),
            ("protections", protections.as_str()),
            ("reason", request.reason.as_str()),
            ("token", token.as_str()),
        ];
        if let Some(expiry) = &request.expiry {
            form.push(("expiry", expiry.as_str()));
        }

        let value = self.post(&form).await?;
        if value.get("protect").is_none() {
            return Err(UsageGuardError::catalog(format!(
                "protect on {item_id} returned no result"
            )));
        }
        tracing::debug!(item_id, level = %request.level, "protection changed");
        Ok(())
    }

    async fn subscriber_count(&self, item_id: &str) -> Result<u64> {
        let value = self
            .get(&[
                ("action", "query"),
                ("list", "wbsubscribers"),
                ("wblsentities", item_id),
                ("wblslimit", "500"),
            ])
            .await?;
        let pointer = format!("/query/subscribers/{item_id}/subscribers");
        if value.pointer(&pointer).is_none() {
            return Ok(0);
        }
        let subscribers: Vec<Subscriber> = extract(&value, &pointer)?;
        tracing::trace!(
            item_id,
            sites = ?subscribers.iter().map(|s| s.site.as_str()).collect::<Vec<_>>(),
            "subscribers"
        );
        Ok(subscribers.len() as u64)
    }

    async fn total_entry_count(&self) -> Result<u64> {
        let value = self
            .get(&[("action", "query"), ("meta", "siteinfo"), ("siprop", "statistics")])
            .await?;
        extract(&value, "/query/statistics/articles")
    }

    async fn publish_page(&self, title: &str, text: &str, summary: &str) -> Result<()> {
        let token = self.csrf_token().await?;
        let form = [
            ("action", "edit"),
            ("title", title),
            ("text", text),
            ("summary", summary),
            ("minor", "1"),
            ("watchlist", "nochange"),
            ("token", token.as_str()),
        ];

        let value = self.post(&form).await?;
        let result: String = extract(&value, "/edit/result")?;
        if result != "Success" {
            return Err(UsageGuardError::catalog(format!(
                "edit of {title} returned {result}"
            )));
        }
        Ok(())
    }
}
