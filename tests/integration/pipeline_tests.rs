use crate::support::*;
use image_harvest::state::Stage;
use image_harvest::{run_harvest, HarvestError, Pipeline};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_full_harvest_downloads_each_image_once() {
    let server = MockServer::start().await;
    mount_site(&server, 3, 2).await;
    mount_images(&server, None).await;

    let dir = TempDir::new().unwrap();
    let download_dir = dir.path().join("download_imgs");
    let config = test_config(&server.uri(), &download_dir);

    let summary = run_harvest(config, CancellationToken::new()).await.unwrap();

    // 3 detail pages x 2 sub-pages = 6 sub-pages, 12 image URLs, 7 distinct names
    assert!(!summary.cancelled);
    assert_eq!(summary.total_failures(), 0);
    assert_eq!(summary.stage(Stage::Listing).unwrap().succeeded, 1);
    assert_eq!(summary.stage(Stage::Details).unwrap().succeeded, 3);
    assert_eq!(summary.stage(Stage::Images).unwrap().succeeded, 6);
    assert_eq!(summary.files_downloaded(), 7);
    assert_eq!(summary.duplicates_skipped, 5);
    assert_eq!(summary.bytes_written, 7 * IMAGE_SIZE as u64);
    assert_eq!(summary.dir_size, Some(7 * IMAGE_SIZE as u64));

    let files = dir_entries(&download_dir);
    assert_eq!(files.len(), 7);
    assert!(files.contains(&"shared.jpg".to_string()));
    assert!(files.contains(&"2_1.jpg".to_string()));
    assert!(files.iter().all(|name| !name.ends_with(".part")));

    // One GET per distinct image name
    assert_eq!(requests_with_prefix(&server, "/3/img/").await, 7);
}

#[tokio::test]
async fn test_stages_are_strictly_sequential() {
    let server = MockServer::start().await;
    mount_site(&server, 4, 3).await;
    mount_images(&server, Some(Duration::from_millis(20))).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());

    let summary = run_harvest(config, CancellationToken::new()).await.unwrap();

    let order: Vec<Stage> = summary.stages.iter().map(|report| report.stage).collect();
    assert_eq!(order, Stage::ALL.to_vec());

    for pair in summary.stages.windows(2) {
        let finished = pair[0].last_item_finished.unwrap();
        let started = pair[1].first_item_started.unwrap();
        assert!(
            finished <= started,
            "stage '{}' started before '{}' finished",
            pair[1].stage,
            pair[0].stage
        );
    }
}

#[tokio::test]
async fn test_listing_failure_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/3/index.html"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let download_dir = dir.path().join("download_imgs");
    let config = test_config(&server.uri(), &download_dir);

    let result = run_harvest(config, CancellationToken::new()).await;

    match result {
        Err(HarvestError::Listing { url, .. }) => {
            assert!(url.ends_with("/3/index.html"));
        }
        other => panic!("expected listing failure, got {:?}", other),
    }
    assert!(!download_dir.exists());
    assert_eq!(requests_with_prefix(&server, "/3/").await, 1);
}

#[tokio::test]
async fn test_listing_retries_transient_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/3/index.html"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_site(&server, 1, 1).await;
    mount_images(&server, None).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());

    let summary = run_harvest(config, CancellationToken::new()).await.unwrap();

    assert_eq!(summary.files_downloaded(), 2);
    assert_eq!(requests_with_prefix(&server, "/3/index.html").await, 3);
}

#[tokio::test]
async fn test_failed_pages_do_not_stop_siblings() {
    let server = MockServer::start().await;

    // Mounted first so they win over the site's own pages
    Mock::given(method("GET"))
        .and(path("/3/page_2.html"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/3/depth2/sub_3_1.html"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;
    mount_site(&server, 3, 2).await;
    mount_images(&server, None).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());

    let summary = run_harvest(config, CancellationToken::new()).await.unwrap();

    let details = summary.stage(Stage::Details).unwrap();
    assert_eq!(details.scheduled, 3);
    assert_eq!(details.succeeded, 2);
    assert_eq!(details.failures.len(), 1);
    assert!(details.failures[0].url.ends_with("/3/page_2.html"));
    assert!(details.failures[0].cause.contains("3 attempts"));

    let images = summary.stage(Stage::Images).unwrap();
    assert_eq!(images.scheduled, 4);
    assert_eq!(images.succeeded, 3);
    assert!(images.failures[0].cause.contains("410"));

    // sub_1_1, sub_1_2, sub_3_2 each add their own image, plus shared.jpg
    assert_eq!(summary.files_downloaded(), 4);
    assert_eq!(dir_entries(dir.path()).len(), 4);

    // 500 is retried up to the attempt limit, 410 is not retried
    assert_eq!(requests_with_prefix(&server, "/3/page_2.html").await, 3);
    assert_eq!(requests_with_prefix(&server, "/3/depth2/sub_3_1.html").await, 1);
}

#[tokio::test]
async fn test_failed_download_is_reported_without_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/3/img/1_1.jpg"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    mount_site(&server, 1, 2).await;
    mount_images(&server, None).await;

    let dir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), dir.path());

    let summary = run_harvest(config, CancellationToken::new()).await.unwrap();

    let downloads = summary.stage(Stage::Downloads).unwrap();
    assert_eq!(downloads.scheduled, 3);
    assert_eq!(downloads.succeeded, 2);
    assert!(downloads.failures[0].url.ends_with("/3/img/1_1.jpg"));
    assert_eq!(
        dir_entries(dir.path()),
        vec!["1_2.jpg".to_string(), "shared.jpg".to_string()]
    );
}

#[tokio::test]
async fn test_concurrency_bound_is_respected() {
    let server = MockServer::start().await;
    mount_page(&server, "/3/index.html", listing_html(12)).await;
    for d in 1..=12 {
        Mock::given(method("GET"))
            .and(path(format!("/3/page_{}.html", d)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(detail_html(d, 0))
                    .set_delay(Duration::from_millis(50)),
            )
            .mount(&server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let mut config = test_config(&server.uri(), dir.path());
    config.crawler.max_concurrent_requests = 3;

    let pipeline = Pipeline::new(config).unwrap();
    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.stage(Stage::Details).unwrap().succeeded, 12);
    assert!(summary.peak_in_flight <= 3, "peak was {}", summary.peak_in_flight);
    assert!(summary.peak_in_flight >= 1);

    let details = summary.progress.stage(Stage::Details).unwrap();
    assert_eq!(details.completed, 12);
    assert_eq!(details.total, 12);
    assert_eq!(summary.progress.stage(Stage::Downloads).unwrap().total, 0);
}

#[tokio::test]
async fn test_repeated_runs_start_from_scratch() {
    let server = MockServer::start().await;
    mount_site(&server, 2, 1).await;
    mount_images(&server, None).await;

    let dir = TempDir::new().unwrap();
    let download_dir = dir.path().join("download_imgs");
    let config = test_config(&server.uri(), &download_dir);
    let pipeline = Pipeline::new(config).unwrap();

    let first = pipeline.run().await.unwrap();
    std::fs::remove_dir_all(&download_dir).unwrap();
    let second = pipeline.run().await.unwrap();

    // 2 detail pages x 1 sub-page: shared.jpg plus 1_1.jpg and 2_1.jpg
    for summary in [&first, &second] {
        assert!(!summary.cancelled);
        assert_eq!(summary.total_failures(), 0);
        assert_eq!(summary.files_downloaded(), 3);
        assert_eq!(summary.duplicates_skipped, 1);
        assert_eq!(summary.bytes_written, 3 * IMAGE_SIZE as u64);
        assert_eq!(summary.dir_size, Some(3 * IMAGE_SIZE as u64));

        let details = summary.progress.stage(Stage::Details).unwrap();
        assert_eq!(details.completed, 2);
        assert_eq!(details.total, 2);
    }
    assert_eq!(dir_entries(&download_dir).len(), 3);
}

#[tokio::test]
async fn test_unwritable_download_dir_keeps_discovery_reports() {
    let server = MockServer::start().await;
    mount_site(&server, 2, 1).await;
    mount_images(&server, None).await;

    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let config = test_config(&server.uri(), &blocker.join("download_imgs"));

    let summary = run_harvest(config, CancellationToken::new()).await.unwrap();

    assert!(!summary.cancelled);
    assert_eq!(summary.stage(Stage::Listing).unwrap().succeeded, 1);
    assert_eq!(summary.stage(Stage::Details).unwrap().succeeded, 2);
    assert_eq!(summary.stage(Stage::Images).unwrap().succeeded, 2);

    let downloads = summary.stage(Stage::Downloads).unwrap();
    assert_eq!(downloads.scheduled, 3);
    assert_eq!(downloads.succeeded, 0);
    assert_eq!(downloads.failed(), 3);
    assert_eq!(summary.files_downloaded(), 0);
    assert_eq!(summary.bytes_written, 0);
    assert_eq!(summary.dir_size, None);
    assert_eq!(requests_with_prefix(&server, "/3/img/").await, 0);
}

#[tokio::test]
async fn test_cancellation_stops_downloads_without_partial_files() {
    let server = MockServer::start().await;
    mount_site(&server, 2, 2).await;
    mount_images(&server, Some(Duration::from_secs(30))).await;

    let dir = TempDir::new().unwrap();
    let download_dir = dir.path().join("download_imgs");
    let config = test_config(&server.uri(), &download_dir);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let summary = tokio::time::timeout(Duration::from_secs(10), run_harvest(config, cancel))
        .await
        .expect("cancelled run should finish promptly")
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.files_downloaded(), 0);
    assert_eq!(summary.bytes_written, 0);
    assert!(dir_entries(&download_dir).is_empty());
}

#[tokio::test]
async fn test_run_timeout_cancels_run() {
    let server = MockServer::start().await;
    mount_site(&server, 1, 1).await;
    mount_images(&server, Some(Duration::from_secs(30))).await;

    let dir = TempDir::new().unwrap();
    let mut config = test_config(&server.uri(), dir.path());
    config.crawler.run_timeout_secs = 1;

    let summary = tokio::time::timeout(
        Duration::from_secs(10),
        run_harvest(config, CancellationToken::new()),
    )
    .await
    .expect("run timeout should cancel the run")
    .unwrap();

    assert!(summary.cancelled);
    assert!(dir_entries(dir.path()).is_empty());
}
