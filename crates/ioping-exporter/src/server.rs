//! HTTP endpoints: metrics exposition, landing page and health check.

use std::io;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use prometheus::{Encoder, Registry, TextEncoder};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::compression::CompressionLayer;
use tracing::{error, info};

pub const DEFAULT_LISTEN_ADDRESS: &str = ":10033";
pub const DEFAULT_TELEMETRY_PATH: &str = "/metrics";
const HEALTH_PATH: &str = "/health";

struct ServerState {
    registry: Registry,
    telemetry_path: String,
}

/// Router serving `registry` under `telemetry_path`.
///
/// `telemetry_path` must have passed [`validate_telemetry_path`].
pub fn router(registry: Registry, telemetry_path: &str) -> Router {
    let state = Arc::new(ServerState {
        registry,
        telemetry_path: telemetry_path.to_string(),
    });

    Router::new()
        .route(telemetry_path, get(handle_metrics))
        .route("/", get(handle_index))
        .route(HEALTH_PATH, get(handle_health))
        .with_state(state)
        .layer(CompressionLayer::new())
}

/// Web flags rejected at startup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WebConfigError {
    #[error("invalid listen address {addr:?}: missing port")]
    MissingPort { addr: String },
    #[error("invalid listen address {addr:?}: {reason}")]
    InvalidPort { addr: String, reason: String },
    #[error("telemetry path {path:?} must start with '/'")]
    RelativePath { path: String },
    #[error("telemetry path {path:?} is reserved")]
    ReservedPath { path: String },
    #[error("telemetry path {path:?} must not contain route parameters or wildcards")]
    PathPattern { path: String },
}

/// Accepts `host:port` or a bare `:port`, which binds every interface.
pub fn normalize_listen_address(addr: &str) -> Result<String, WebConfigError> {
    let addr = addr.trim();
    let normalized = match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => addr.to_string(),
    };

    let port = normalized
        .rsplit_once(':')
        .map(|(_, port)| port)
        .ok_or_else(|| WebConfigError::MissingPort {
            addr: addr.to_string(),
        })?;
    port.parse::<u16>()
        .map_err(|e| WebConfigError::InvalidPort {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;
    Ok(normalized)
}

/// Checks that `path` can be registered as a literal axum route.
pub fn validate_telemetry_path(path: &str) -> Result<(), WebConfigError> {
    if !path.starts_with('/') {
        return Err(WebConfigError::RelativePath {
            path: path.to_string(),
        });
    }
    if path == "/" || path == HEALTH_PATH {
        return Err(WebConfigError::ReservedPath {
            path: path.to_string(),
        });
    }
    // axum treats `{..}` as captures and panics on `:`/`*` segment prefixes.
    if path.contains(['{', '}'])
        || path
            .split('/')
            .any(|segment| segment.starts_with([':', '*']))
    {
        return Err(WebConfigError::PathPattern {
            path: path.to_string(),
        });
    }
    Ok(())
}

/// Serves `app` until `shutdown` turns true, then drains open connections.
pub async fn serve(
    listen: &str,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
) -> io::Result<()> {
    let listener = TcpListener::bind(listen).await?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            // A dropped sender also means shutdown.
            let _ = shutdown.wait_for(|stop| *stop).await;
            info!("http server shutting down");
        })
        .await
}

async fn handle_metrics(State(state): State<Arc<ServerState>>) -> Response {
    let encoder = TextEncoder::new();
    let families = state.registry.gather();
    let mut buf = Vec::new();

    match encoder.encode(&families, &mut buf) {
        Ok(()) => (
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            buf,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn handle_index(State(state): State<Arc<ServerState>>) -> Html<String> {
    Html(format!(
        "<html>\n\
         <head><title>ioping Exporter</title></head>\n\
         <body>\n\
         <h1>ioping Exporter</h1>\n\
         <p><a href=\"{}\">Metrics</a></p>\n\
         </body>\n\
         </html>\n",
        state.telemetry_path
    ))
}

async fn handle_health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use ioping_core::metrics::{IopingCollector, MetricsAggregator};
    use ioping_core::prober::ProbeMode;
    use tower::ServiceExt; // for `oneshot`

    fn registry() -> Registry {
        let mut aggregator = MetricsAggregator::new(vec![0.001, 0.01]).unwrap();
        aggregator.register("/tmp", ProbeMode::Read);
        let aggregator = Arc::new(aggregator);
        aggregator.observe_latency("/tmp", ProbeMode::Read, 2_000_000);

        let registry = Registry::new();
        registry
            .register(Box::new(
                IopingCollector::new(Vec::new(), aggregator).unwrap(),
            ))
            .unwrap();
        registry
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = router(registry(), DEFAULT_TELEMETRY_PATH);
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/plain"));

        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains(
            r#"ioping_response_duration_seconds_bucket{mode="read",target="/tmp",le="0.01"} 1"#
        ));
        assert!(text.contains(r#"ioping_response_duration_seconds_count{mode="read",target="/tmp"} 1"#));
    }

    #[tokio::test]
    async fn test_custom_telemetry_path() {
        let app = router(registry(), "/probe/metrics");

        let (status, body) = get_body(app.clone(), "/probe/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("ioping_response_duration_seconds"));

        let (status, _) = get_body(app, "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_landing_page_links_metrics() {
        let (status, body) = get_body(router(registry(), "/probe/metrics"), "/").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<h1>ioping Exporter</h1>"));
        assert!(body.contains(r#"<a href="/probe/metrics">Metrics</a>"#));
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_body(router(registry(), DEFAULT_TELEMETRY_PATH), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let app = router(registry(), DEFAULT_TELEMETRY_PATH);
        let server = tokio::spawn(async move { serve("127.0.0.1:0", app, rx).await });

        tx.send(true).unwrap();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn test_normalize_listen_address() {
        assert_eq!(normalize_listen_address(":10033").unwrap(), "0.0.0.0:10033");
        assert_eq!(
            normalize_listen_address("127.0.0.1:9000").unwrap(),
            "127.0.0.1:9000"
        );
        assert_eq!(
            normalize_listen_address("localhost:9000").unwrap(),
            "localhost:9000"
        );
        assert_eq!(
            normalize_listen_address("10033"),
            Err(WebConfigError::MissingPort {
                addr: "10033".to_string()
            })
        );
        assert!(matches!(
            normalize_listen_address(":http"),
            Err(WebConfigError::InvalidPort { .. })
        ));
        assert!(matches!(
            normalize_listen_address(":70000"),
            Err(WebConfigError::InvalidPort { .. })
        ));
    }

    #[test]
    fn test_validate_telemetry_path() {
        assert!(validate_telemetry_path("/metrics").is_ok());
        assert!(validate_telemetry_path("/probe/metrics").is_ok());
        assert!(matches!(
            validate_telemetry_path("metrics"),
            Err(WebConfigError::RelativePath { .. })
        ));
        assert!(matches!(
            validate_telemetry_path("/"),
            Err(WebConfigError::ReservedPath { .. })
        ));
        assert!(matches!(
            validate_telemetry_path("/health"),
            Err(WebConfigError::ReservedPath { .. })
        ));
        for path in ["/:metrics", "/*rest", "/{id}", "/a/:b", "/metrics}", "/a/*"] {
            assert_eq!(
                validate_telemetry_path(path),
                Err(WebConfigError::PathPattern {
                    path: path.to_string()
                }),
                "{path}"
            );
        }
    }

    #[test]
    fn test_router_accepts_valid_telemetry_paths() {
        for path in ["/metrics", "/probe/metrics", "/a-b/c_d.txt"] {
            validate_telemetry_path(path).unwrap();
            let _ = router(registry(), path);
        }
    }
}
