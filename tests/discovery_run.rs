//! End-to-end discovery tests against a mock HTTP server

use std::sync::{Arc, Mutex};
use std::time::Duration;
use veilleur::config::{DiscoveryConfig, TopicEntry};
use veilleur::discovery::DiscoveryEngine;
use veilleur::fetch::FetchOptions;
use veilleur::store::{SqliteStore, Store};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn probe_opts() -> FetchOptions {
    FetchOptions::new(Duration::from_secs(2), 0)
}

fn store_with_topic() -> Arc<Mutex<SqliteStore>> {
    let store = Arc::new(Mutex::new(SqliteStore::new_in_memory().unwrap()));
    store
        .lock()
        .unwrap()
        .upsert_topic(&TopicEntry {
            slug: "climate".to_string(),
            name: "Climate".to_string(),
            query: "climate emissions".to_string(),
            includes: vec![],
            excludes: vec![],
            freshness_hours: 72,
            max_items: 50,
            enabled: true,
        })
        .unwrap();
    store
}

/// Discovery config pointed entirely at the mock server: one seeded
/// candidate, search endpoint answering empty result pages
fn mock_discovery_config(server: &MockServer, seeds: Vec<String>) -> DiscoveryConfig {
    DiscoveryConfig {
        seeds,
        aggregators: vec![],
        search_base_url: format!("{}/search", server.uri()),
        max_candidates_per_run: 50,
    }
}

async fn mount_empty_search(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body>no results</body></html>"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_strong_candidate_auto_promoted() {
    let server = MockServer::start().await;
    let domain = server.address().to_string();
    let store = store_with_topic();

    mount_empty_search(&server).await;

    // All four probe signals present: 30 + 20 + 15 + 25 + 10 = 100
    let recent = (chrono::Utc::now() - chrono::Duration::days(1)).to_rfc3339();
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<urlset><url><loc>http://{}/news/story</loc><lastmod>{}</lastmod></url></urlset>"#,
            domain, recent
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<rss></rss>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html lang="en"><head><script type="application/ld+json">
               {"@type":"NewsArticle","headline":"Front page story"}
               </script></head><body></body></html>"#,
        ))
        .mount(&server)
        .await;

    let engine = DiscoveryEngine::new(
        store.clone(),
        reqwest::Client::new(),
        mock_discovery_config(&server, vec![domain.clone()]),
        probe_opts(),
    );

    let stats = engine.run().await.unwrap();
    assert_eq!(stats.candidates_found, 1);
    assert_eq!(stats.candidates_probed, 1);
    assert_eq!(stats.auto_promoted, 1);
    assert_eq!(stats.errors, 0);

    let guard = store.lock().unwrap();

    // Promoted into a source linked to the first enabled topic
    let source = guard.get_source_by_domain(&domain).unwrap().unwrap();
    assert!(source.enabled);
    let topic = guard.get_topic_by_slug("climate").unwrap().unwrap();
    let linked = guard.sources_for_topic(topic.id).unwrap();
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].domain, domain);

    // Candidate rows removed on promotion
    assert!(guard.get_candidate(&domain).unwrap().is_none());
    assert_eq!(guard.count_candidates().unwrap(), 0);
}

#[tokio::test]
async fn test_weak_candidate_stays_candidate() {
    let server = MockServer::start().await;
    let domain = server.address().to_string();
    let store = store_with_topic();

    mount_empty_search(&server).await;

    // Nothing but a bare homepage: no sitemap, no feed, no JSON-LD
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body>hello</body></html>"),
        )
        .mount(&server)
        .await;

    let engine = DiscoveryEngine::new(
        store.clone(),
        reqwest::Client::new(),
        mock_discovery_config(&server, vec![domain.clone()]),
        probe_opts(),
    );

    let stats = engine.run().await.unwrap();
    assert_eq!(stats.candidates_probed, 1);
    assert_eq!(stats.auto_promoted, 0);

    let guard = store.lock().unwrap();
    let candidate = guard.get_candidate(&domain).unwrap().unwrap();
    assert_eq!(candidate.score, 0);
    assert_eq!(candidate.discovered_via, "seed");
    assert!(guard.get_source_by_domain(&domain).unwrap().is_none());
}

#[tokio::test]
async fn test_existing_sources_not_recandidated() {
    let server = MockServer::start().await;
    let domain = server.address().to_string();
    let store = store_with_topic();

    // The domain is already a source
    store
        .lock()
        .unwrap()
        .upsert_source(&domain, &Default::default(), true)
        .unwrap();

    mount_empty_search(&server).await;

    let engine = DiscoveryEngine::new(
        store.clone(),
        reqwest::Client::new(),
        mock_discovery_config(&server, vec![domain.clone()]),
        probe_opts(),
    );

    let stats = engine.run().await.unwrap();
    assert_eq!(stats.candidates_found, 0);
    assert_eq!(stats.candidates_probed, 0);
    assert_eq!(store.lock().unwrap().count_candidates().unwrap(), 0);
}

#[tokio::test]
async fn test_unreachable_candidate_counted_not_fatal() {
    let server = MockServer::start().await;
    let store = store_with_topic();

    mount_empty_search(&server).await;

    // One dead seed (connection refused on a free port) alongside a weak
    // but reachable one; the batch must finish either way.
    let dead = "127.0.0.1:1".to_string();
    let alive = server.address().to_string();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body>hello</body></html>"),
        )
        .mount(&server)
        .await;

    let engine = DiscoveryEngine::new(
        store.clone(),
        reqwest::Client::new(),
        mock_discovery_config(&server, vec![dead, alive.clone()]),
        probe_opts(),
    );

    let stats = engine.run().await.unwrap();
    assert_eq!(stats.candidates_found, 2);
    assert_eq!(stats.candidates_probed, 2);
    assert_eq!(stats.auto_promoted, 0);

    // The dead domain's probe snapshot records it as unreachable
    let guard = store.lock().unwrap();
    let dead_candidate = guard.get_candidate("127.0.0.1:1").unwrap().unwrap();
    assert_eq!(dead_candidate.score, 0);
    assert_eq!(dead_candidate.robots_state.as_deref(), Some("unreachable"));
}
