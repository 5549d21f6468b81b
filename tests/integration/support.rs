//! Mock site builders shared by the integration tests
//!
//! The mock site mirrors the layout the pipeline expects:
//!
//! ```text
//! /3/index.html              listing, links page_<d>.html
//! /3/page_<d>.html           detail page, links sub_<d>_<s>.html (under depth2/)
//! /3/depth2/sub_<d>_<s>.html sub-page, images /3/img/...
//! /3/img/<name>              image bytes
//! ```

use image_harvest::config::Config;
use std::path::Path;
use std::time::Duration;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const IMAGE_SIZE: usize = 2000;

/// Creates a test configuration pointing at `server_uri` with fast retries
pub fn test_config(server_uri: &str, download_dir: &Path) -> Config {
    let mut config = Config::new(
        format!("{}/3/index.html", server_uri),
        format!("{}/3/", server_uri),
        download_dir,
    );
    config.crawler.progress_interval_secs = 0;
    config.retry.max_attempts = 3;
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config.retry.jitter = false;
    config.http.timeout_secs = 10;
    config
}

pub fn listing_html(detail_pages: usize) -> String {
    let cards: String = (1..=detail_pages)
        .map(|d| format!(r#"<div class="item_card"><a href="page_{}.html">Page {}</a></div>"#, d, d))
        .collect();
    format!("<html><body>{}</body></html>", cards)
}

pub fn detail_html(detail: usize, sub_pages: usize) -> String {
    let cards: String = (1..=sub_pages)
        .map(|s| {
            format!(
                r#"<div class="item_card"><a href="sub_{}_{}.html">Sub {}</a></div>"#,
                detail, s, s
            )
        })
        .collect();
    format!("<html><body>{}</body></html>", cards)
}

pub fn sub_page_html(images: &[String]) -> String {
    let imgs: String = images
        .iter()
        .map(|src| format!(r#"<img src="{}">"#, src))
        .collect();
    format!(r#"<html><body><div class="img_box">{}</div></body></html>"#, imgs)
}

/// Serves `body` as HTML at `route`
pub async fn mount_page(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Serves `IMAGE_SIZE` bytes for every path under /3/img/
pub async fn mount_images(server: &MockServer, delay: Option<Duration>) {
    let mut response = ResponseTemplate::new(200).set_body_bytes(vec![0xAB; IMAGE_SIZE]);
    if let Some(delay) = delay {
        response = response.set_delay(delay);
    }

    Mock::given(method("GET"))
        .and(path_regex(r"^/3/img/.+$"))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Mounts a full site
///
/// Every sub-page shows one image shared by all sub-pages (`shared.jpg`) and
/// one image of its own, so a site with `d` detail pages of `s` sub-pages
/// each yields `2*d*s` image URLs of which `d*s + 1` are distinct.
pub async fn mount_site(server: &MockServer, detail_pages: usize, sub_pages: usize) {
    mount_page(server, "/3/index.html", listing_html(detail_pages)).await;

    for d in 1..=detail_pages {
        mount_page(server, &format!("/3/page_{}.html", d), detail_html(d, sub_pages)).await;

        for s in 1..=sub_pages {
            let images = vec![
                "/3/img/shared.jpg".to_string(),
                format!("{}/3/img/{}_{}.jpg", server.uri(), d, s),
            ];
            mount_page(
                server,
                &format!("/3/depth2/sub_{}_{}.html", d, s),
                sub_page_html(&images),
            )
            .await;
        }
    }
}

/// Number of requests the server received for paths starting with `prefix`
pub async fn requests_with_prefix(server: &MockServer, prefix: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path().starts_with(prefix))
        .count()
}

/// Sorted file names in `dir`, empty if it does not exist
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}
