//! Integration tests for the harvest pipeline
//!
//! These tests use wiremock to serve a small site (listing page, detail
//! pages, sub-pages and images) and run the pipeline against it end-to-end.

mod fetch_tests;
mod pipeline_tests;
mod support;
