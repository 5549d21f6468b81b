use image_harvest::config::HttpConfig;
use image_harvest::crawler::{build_http_client, ConcurrencyBudget, Fetcher, RetryPolicy};
use image_harvest::{FetchError, HarvestError};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher(max_attempts: u32, http: &HttpConfig) -> Fetcher {
    let policy = RetryPolicy::default()
        .with_max_attempts(max_attempts)
        .with_backoff(Duration::from_millis(1), Duration::from_millis(5), 2.0);
    Fetcher::new(
        build_http_client(http).unwrap(),
        policy,
        ConcurrencyBudget::new(4),
    )
}

#[tokio::test]
async fn test_fetch_succeeds_after_transient_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page.html"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>ok</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = fetcher(6, &HttpConfig::default());
    let body = fetcher
        .fetch(&format!("{}/page.html", server.uri()))
        .await
        .unwrap();

    assert_eq!(body, "<p>ok</p>");
    assert_eq!(fetcher.budget().in_flight(), 0);
}

#[tokio::test]
async fn test_fetch_gives_up_after_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down.html"))
        .respond_with(ResponseTemplate::new(502))
        .expect(4)
        .mount(&server)
        .await;

    let fetcher = fetcher(4, &HttpConfig::default());
    let result = fetcher.fetch(&format!("{}/down.html", server.uri())).await;

    match result {
        Err(HarvestError::Fetch(FetchError::Failed {
            attempts, source, ..
        })) => {
            assert_eq!(attempts, 4);
            assert!(matches!(*source, FetchError::Status { status: 502, .. }));
        }
        other => panic!("expected exhausted retries, got {:?}", other),
    }
    assert_eq!(fetcher.budget().available(), 4);
}

#[tokio::test]
async fn test_fetch_does_not_retry_permanent_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bad.html"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = fetcher(6, &HttpConfig::default());
    let result = fetcher.fetch(&format!("{}/bad.html", server.uri())).await;

    assert!(matches!(
        result,
        Err(HarvestError::Fetch(FetchError::Status { status: 400, .. }))
    ));
}

#[tokio::test]
async fn test_fetch_timeout_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.html"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .expect(2)
        .mount(&server)
        .await;

    let http = HttpConfig {
        timeout_secs: 1,
        ..HttpConfig::default()
    };
    let fetcher = fetcher(2, &http);
    let result = fetcher.fetch(&format!("{}/slow.html", server.uri())).await;

    match result {
        Err(HarvestError::Fetch(FetchError::Failed { source, .. })) => {
            assert!(matches!(*source, FetchError::Timeout { .. }));
        }
        other => panic!("expected timeout failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_dropped_fetch_releases_permit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hang.html"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let fetcher = fetcher(1, &HttpConfig::default());
    let url = format!("{}/hang.html", server.uri());

    let result = tokio::time::timeout(Duration::from_millis(100), fetcher.fetch(&url)).await;

    assert!(result.is_err());
    assert_eq!(fetcher.budget().in_flight(), 0);
    assert_eq!(fetcher.budget().available(), 4);
}
