//! # HTTP Transport Integration Tests
//!
//! Runs `HttpFetcher` against a throwaway `axum` server bound to `127.0.0.1:0`, both
//! directly and as the transport of a full engine built from a config file.

use std::io::Write;

use anyhow::Result;
use lib_consolidator::configs::ConsolidatorConfig;
use lib_consolidator::retrieve::{HttpFetchOptions, HttpFetcher};
use lib_consolidator::{Consolidator, ConsolidatorError, ConsolidatorEvent, EngineOptions, Fetch};
use project_tests::{init_logging, next_event, serve, CannedResponse};
use serde_json::json;

fn no_retries() -> HttpFetchOptions {
    HttpFetchOptions {
        max_retries: 0,
        ..HttpFetchOptions::default()
    }
}

#[tokio::test]
async fn test_fetch_reports_status_content_type_and_body() -> Result<()> {
    init_logging();
    let server = serve(vec![CannedResponse::json(r#"{"speed": 12}"#)]).await?;
    let fetcher = HttpFetcher::with_options(&server.base_url, no_retries())?;

    let response = fetcher.fetch("/vessels/self").await?;
    assert_eq!(response.status_code, 200);
    assert_eq!(response.content_type.as_deref(), Some("application/json"));
    assert_eq!(response.body, r#"{"speed": 12}"#);

    assert_eq!(server.requests(), vec!["GET /vessels/self"]);
    Ok(())
}

#[tokio::test]
async fn test_non_success_status_is_returned_not_raised() -> Result<()> {
    init_logging();
    let server = serve(vec![CannedResponse {
        status: 404,
        content_type: "application/json",
        body: r#"{"error": "missing"}"#.to_string(),
    }])
    .await?;
    let fetcher = HttpFetcher::with_options(&server.base_url, no_retries())?;

    let response = fetcher.fetch("/nope").await?;
    assert_eq!(response.status_code, 404);
    assert_eq!(response.body, r#"{"error": "missing"}"#);
    Ok(())
}

#[tokio::test]
async fn test_connection_failure_is_a_transport_error() -> Result<()> {
    init_logging();
    // Bind and drop to get a port nobody listens on.
    let port = std::net::TcpListener::bind("127.0.0.1:0")?.local_addr()?.port();
    let fetcher = HttpFetcher::with_options(&format!("http://127.0.0.1:{}/", port), no_retries())?;

    assert!(matches!(fetcher.fetch("/a").await, Err(ConsolidatorError::Transport(_))));
    Ok(())
}

#[tokio::test]
async fn test_engine_polls_over_http_from_config_file() -> Result<()> {
    init_logging();
    let server = serve(vec![CannedResponse::json(r#"{"wind": {"speed": 7, "dir": 270}}"#)]).await?;

    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "{{ baseUrl: '{}', defaultPollRateMs: null, maxRetries: 0 }}", server.base_url)?;
    let config = ConsolidatorConfig::load(file.path())?;
    assert_eq!(config.engine_options(), EngineOptions { default_rate: None });

    let fetcher = HttpFetcher::with_options(config.require_base_url()?, config.http_options())?;
    let engine = Consolidator::with_options(fetcher, config.engine_options());
    let mut events = engine.subscribe();

    engine.register("/weather/wind/speed", None)?;
    engine.register("/weather/wind/dir", None)?;
    assert_eq!(engine.polled_paths(), vec!["/weather/wind"]);

    let first = next_event(&mut events).await;
    let second = next_event(&mut events).await;
    assert_eq!(
        first,
        ConsolidatorEvent::Data {
            origin: "/weather/wind/dir".to_string(),
            source: Some("/weather/wind".to_string()),
            data: json!(270),
        }
    );
    assert_eq!(second.origin(), Some("/weather/wind/speed"));

    assert_eq!(server.requests(), vec!["GET /weather/wind"]);
    Ok(())
}
