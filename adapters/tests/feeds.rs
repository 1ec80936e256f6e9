#![allow(clippy::unwrap_used, clippy::expect_used)]

use pretty_assertions::assert_eq;
use std::time::Duration;
use usageguard_adapters::{HttpDenyListFeed, HttpRankingFeed, http_client};
use usageguard_engine::{DenyListFeed, RankingFeed, normalize_usage};
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::method;
use wiremock::matchers::path;

fn client() -> reqwest::Client {
    http_client("usageguard-test", Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn ranking_feed_caches_then_parses() {
    let server = MockServer::start().await;
    let csv = "eu_page_id,eu_count\nQ5,1200\nQ42,900\nQ1,n/a\n";
    Mock::given(method("GET"))
        .and(path("/wdcm_topItems.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string(csv))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("dataframe").join("wdcmToplist.txt");
    let feed = HttpRankingFeed::new(
        client(),
        format!("{}/wdcm_topItems.csv", server.uri()),
        &cache,
    );

    let rows = feed.fetch().await.unwrap();

    assert_eq!(std::fs::read_to_string(&cache).unwrap(), csv);
    assert_eq!(rows.len(), 3);
    let usage = normalize_usage(rows);
    let ids: Vec<&str> = usage.iter().map(|u| u.item_id.as_str()).collect();
    assert_eq!(ids, vec!["Q5", "Q42"]);
}

#[tokio::test]
async fn ranking_feed_fails_on_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("cache.txt");
    let feed = HttpRankingFeed::new(client(), server.uri(), &cache);

    assert!(feed.fetch().await.is_err());
    assert!(!cache.exists());
}

#[tokio::test]
async fn deny_list_feed_parses_json_array() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/w/index.php"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"["Q4115189", "Q13406268", "Q15397819"]"#),
        )
        .mount(&server)
        .await;

    let feed = HttpDenyListFeed::new(client(), format!("{}/w/index.php", server.uri()));
    let ids = feed.fetch().await.unwrap();

    assert_eq!(ids, vec!["Q4115189", "Q13406268", "Q15397819"]);
}

#[tokio::test]
async fn deny_list_feed_rejects_non_array() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let feed = HttpDenyListFeed::new(client(), server.uri());
    assert!(feed.fetch().await.is_err());
}
