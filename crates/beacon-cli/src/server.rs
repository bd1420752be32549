//! HTTP pixel endpoint.
//!
//! `GET /track/{id}` always answers with the transparent GIF, whatever
//! happens to ingestion. Store work runs on tokio's blocking pool behind a
//! single mutex-guarded connection.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    Router,
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
    routing::get,
};
use beacon_core::OpenEvent;
use beacon_core::db::store::EventStore;
use beacon_core::dedup::DedupPolicy;
use beacon_core::identifier::strip_image_suffix;
use beacon_core::ingest::{self, IngestOutcome, Retention};
use chrono::{DateTime, Utc};
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};

/// 1x1 transparent GIF89a.
pub const PIXEL_GIF: [u8; 43] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

/// Shared per-process server state.
pub struct AppState {
    store: Mutex<Box<dyn EventStore + Send>>,
    policy: DedupPolicy,
    retention: Retention,
}

impl AppState {
    pub fn new(
        store: Box<dyn EventStore + Send>,
        policy: DedupPolicy,
        retention: Retention,
    ) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(store),
            policy,
            retention,
        })
    }

    fn ingest(&self, event: &OpenEvent, now: DateTime<Utc>) -> IngestOutcome {
        let Ok(store) = self.store.lock() else {
            warn!("event store lock poisoned");
            return IngestOutcome::Failed {
                reason: "store lock poisoned".to_string(),
            };
        };
        ingest::record_open(&**store, &self.policy, self.retention, event, now)
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/track/{id}", get(track_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(state)
}

/// First `X-Forwarded-For` entry, else the peer address.
pub fn client_origin(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty())
        .map_or_else(|| peer.ip().to_string(), str::to_string)
}

fn pixel_response() -> Response {
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("image/gif")),
            (
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-store, no-cache, must-revalidate, max-age=0"),
            ),
            (header::PRAGMA, HeaderValue::from_static("no-cache")),
        ],
        PIXEL_GIF.as_slice(),
    )
        .into_response()
}

async fn track_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let now = Utc::now();
    let event = OpenEvent::new(strip_image_suffix(&id), client_origin(&headers, peer), agent, now);

    let task_state = Arc::clone(&state);
    match tokio::task::spawn_blocking(move || task_state.ingest(&event, now)).await {
        Ok(outcome) => debug!(%outcome, "pixel served"),
        Err(err) => warn!(error = %err, "ingestion task failed"),
    }

    pixel_response()
}

async fn healthz_handler() -> &'static str {
    "ok"
}

/// Bind `address` and serve until Ctrl+C or SIGTERM.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve(address: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(address).await?;
    info!("Server running on {}", listener.local_addr()?);

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::db::store::MemoryStore;

    fn peer() -> SocketAddr {
        "192.0.2.10:51000".parse().expect("socket addr")
    }

    fn state_with(store: &Arc<MemoryStore>) -> Arc<AppState> {
        AppState::new(
            Box::new(Arc::clone(store)),
            DedupPolicy::default(),
            Retention::default(),
        )
    }

    async fn hit(state: &Arc<AppState>, id: &str, headers: HeaderMap) -> Response {
        track_handler(
            State(Arc::clone(state)),
            ConnectInfo(peer()),
            Path(id.to_string()),
            headers,
        )
        .await
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), 1024)
            .await
            .expect("read body")
            .to_vec()
    }

    #[test]
    fn pixel_is_a_gif() {
        assert_eq!(PIXEL_GIF.len(), 43);
        assert!(PIXEL_GIF.starts_with(b"GIF89a"));
        assert_eq!(PIXEL_GIF.last(), Some(&0x3b));
    }

    #[test]
    fn origin_prefers_first_forwarded_entry() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_origin(&headers, peer()), "192.0.2.10");

        headers.insert("x-forwarded-for", HeaderValue::from_static(" 203.0.113.5 , 10.0.0.1"));
        assert_eq!(client_origin(&headers, peer()), "203.0.113.5");

        headers.insert("x-forwarded-for", HeaderValue::from_static(""));
        assert_eq!(client_origin(&headers, peer()), "192.0.2.10");
    }

    #[tokio::test]
    async fn track_records_once_and_always_returns_pixel() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(&store);

        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8.4.0"));

        for _ in 0..3 {
            let response = hit(&state, "camp1-a@x.png", headers.clone()).await;
            assert_eq!(response.status(), axum::http::StatusCode::OK);
            assert_eq!(
                response.headers().get(header::CONTENT_TYPE),
                Some(&HeaderValue::from_static("image/gif"))
            );
            assert!(
                response
                    .headers()
                    .get(header::CACHE_CONTROL)
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|v| v.contains("no-store"))
            );
            assert_eq!(body_bytes(response).await, PIXEL_GIF.to_vec());
        }

        let events = store.snapshot();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].identifier, "camp1-a@x");
        assert_eq!(events[0].origin, "192.0.2.10");
        assert_eq!(events[0].agent, "curl/8.4.0");
    }

    #[tokio::test]
    async fn failing_store_still_serves_pixel() {
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);
        let state = state_with(&store);

        let response = hit(&state, "camp1-a@x", HeaderMap::new()).await;
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        assert_eq!(body_bytes(response).await, PIXEL_GIF.to_vec());
    }

    #[tokio::test]
    async fn invalid_identifier_still_serves_pixel() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(&store);

        let long = "x".repeat(150);
        let response = hit(&state, &long, HeaderMap::new()).await;
        assert_eq!(body_bytes(response).await, PIXEL_GIF.to_vec());
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn healthz_says_ok() {
        assert_eq!(healthz_handler().await, "ok");
    }
}
