//! Integration tests for the HTTP fetch capability
//!
//! These tests use wiremock to create mock HTTP servers and check how
//! responses are mapped onto fetch outcomes.

use tide_crawl::capability::{HttpFetcher, Page};
use tide_crawl::config::FetcherConfig;
use tide_crawl::{FetchOutcome, Fetcher};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config() -> FetcherConfig {
    FetcherConfig {
        max_repeat: 3,
        request_timeout_ms: 2000,
        ..FetcherConfig::default()
    }
}

async fn fetch(fetcher: &HttpFetcher, url: &str, repeat_count: u32) -> FetchOutcome<Page> {
    Fetcher::<(), Page>::fetch(fetcher, url, &(), repeat_count).await
}

#[tokio::test]
async fn test_successful_fetch_returns_page() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<html><head><title>Home</title></head></html>",
            "text/html",
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let fetcher = HttpFetcher::new(&test_config()).unwrap();
    let url = format!("{}/", mock_server.uri());

    match fetch(&fetcher, &url, 0).await {
        FetchOutcome::Success(page) => {
            assert_eq!(page.status, 200);
            assert_eq!(page.final_url, url);
            assert!(page.content_type.starts_with("text/html"));
            assert!(page.body.contains("<title>Home</title>"));
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn test_not_found_is_permanent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let fetcher = HttpFetcher::new(&test_config()).unwrap();
    let outcome = fetch(&fetcher, &format!("{}/missing", mock_server.uri()), 0).await;

    assert_eq!(outcome, FetchOutcome::PermanentFailure);
}

#[tokio::test]
async fn test_server_error_retries_until_ceiling() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&mock_server)
        .await;

    let fetcher = HttpFetcher::new(&test_config()).unwrap();
    let url = format!("{}/flaky", mock_server.uri());

    for repeat_count in 0..3 {
        assert_eq!(
            fetch(&fetcher, &url, repeat_count).await,
            FetchOutcome::RetryNeeded
        );
    }
    assert_eq!(fetch(&fetcher, &url, 3).await, FetchOutcome::PermanentFailure);
}

#[tokio::test]
async fn test_rate_limited_is_transient() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&mock_server)
        .await;

    let fetcher = HttpFetcher::new(&test_config()).unwrap();
    let outcome = fetch(&fetcher, &format!("{}/busy", mock_server.uri()), 0).await;

    assert_eq!(outcome, FetchOutcome::RetryNeeded);
}

#[tokio::test]
async fn test_configured_user_agent_is_sent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(header("user-agent", "TestBot/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = FetcherConfig {
        user_agents: vec!["TestBot/1.0".to_string()],
        ..test_config()
    };
    let fetcher = HttpFetcher::new(&config).unwrap();
    let outcome = fetch(&fetcher, &format!("{}/", mock_server.uri()), 0).await;

    assert!(matches!(outcome, FetchOutcome::Success(_)));
}

#[tokio::test]
async fn test_redirect_sets_final_url() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(301)
                .insert_header("location", format!("{}/new", mock_server.uri()).as_str()),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"))
        .mount(&mock_server)
        .await;

    let fetcher = HttpFetcher::new(&test_config()).unwrap();

    match fetch(&fetcher, &format!("{}/old", mock_server.uri()), 0).await {
        FetchOutcome::Success(page) => {
            assert_eq!(page.final_url, format!("{}/new", mock_server.uri()));
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn test_connection_refused_is_transient() {
    // Bind and immediately release a port so nothing is listening on it
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let fetcher = HttpFetcher::new(&test_config()).unwrap();
    let url = format!("http://127.0.0.1:{}/", port);

    assert_eq!(fetch(&fetcher, &url, 0).await, FetchOutcome::RetryNeeded);
    assert_eq!(fetch(&fetcher, &url, 3).await, FetchOutcome::PermanentFailure);
}
