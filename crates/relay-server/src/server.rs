//! `RelayServer`: Axum HTTP + WebSocket gateway in front of the hubs.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::errors::HubError;
use crate::health::{self, HealthResponse};
use crate::hub::HubDirectory;
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::{SessionConfig, run_ws_session};

/// Body of the `426` answer to a non-WebSocket request on the hub route.
///
/// The route is the hub itself, so it answers with the hub's wording rather
/// than a fronting router's.
pub const UPGRADE_REQUIRED_BODY: &str = "Expected Upgrade: websocket";

/// How long `/health` waits for the hub to answer.
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Named hubs.
    pub hubs: Arc<HubDirectory>,
    /// Hub that `/api/ws` joins.
    pub hub_name: Arc<str>,
    /// Per-session limits.
    pub session: SessionConfig,
    /// Shutdown coordinator; sessions close with 1001 when it fires.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus render handle.
    pub metrics: PrometheusHandle,
}

/// The relay server.
pub struct RelayServer {
    config: ServerConfig,
    hubs: Arc<HubDirectory>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: PrometheusHandle,
}

impl RelayServer {
    /// Create a new server. No hub exists until first use.
    pub fn new(config: ServerConfig, metrics_handle: PrometheusHandle) -> Self {
        let hubs = HubDirectory::new(config.close_reason.clone(), config.mailbox_capacity);
        Self {
            config,
            hubs: Arc::new(hubs),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: metrics_handle,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hubs: self.hubs.clone(),
            hub_name: Arc::from(self.config.hub_name.as_str()),
            session: self.config.session_config(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/", get(root_handler))
            .route("/api/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until shutdown is initiated.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), HubError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        info!(
            addr = %local_addr,
            hub = %self.config.hub_name,
            "relay server listening"
        );

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "server terminated with error");
            }
            info!("relay server stopped");
        });

        Ok((local_addr, handle))
    }

    /// Named hubs.
    pub fn hubs(&self) -> &Arc<HubDirectory> {
        &self.hubs
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /
async fn root_handler() -> &'static str {
    "Hello, World!"
}

/// Whether the request carries exactly `Upgrade: websocket`.
fn wants_websocket(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "websocket")
}

/// GET /api/ws
///
/// Requests without `Upgrade: websocket` get `426` before any hub is
/// touched. Other handshake defects are answered by Axum's rejection.
async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if !wants_websocket(&headers) {
        debug!("rejecting non-websocket request");
        return (StatusCode::UPGRADE_REQUIRED, UPGRADE_REQUIRED_BODY).into_response();
    }
    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => {
            debug!(status = %rejection.status(), "websocket handshake rejected");
            return rejection.into_response();
        }
    };

    let hub = state.hubs.get(&state.hub_name);
    let session = state.session;
    let cancel = state.shutdown.token();
    ws.max_message_size(session.max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, hub, session, cancel))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let hub = state.hubs.get(&state.hub_name);
    let stats = tokio::time::timeout(HEALTH_PROBE_TIMEOUT, hub.stats())
        .await
        .ok()
        .and_then(Result::ok);
    let resp = health::health_check(state.start_time, &state.hub_name, stats);
    let status = if resp.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(resp))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    metrics::render(&state.metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    fn make_server() -> RelayServer {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        RelayServer::new(ServerConfig::default(), handle)
    }

    async fn body_string(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), 10_000)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert!(!server.shutdown().is_shutting_down());
        assert!(server.hubs().is_empty());
    }

    #[test]
    fn upgrade_header_detection() {
        let mut headers = HeaderMap::new();
        assert!(!wants_websocket(&headers));
        let _ = headers.insert(header::UPGRADE, "h2c".parse().unwrap());
        assert!(!wants_websocket(&headers));
        let _ = headers.insert(header::UPGRADE, "WebSocket".parse().unwrap());
        assert!(!wants_websocket(&headers));
        let _ = headers.insert(header::UPGRADE, "websocket".parse().unwrap());
        assert!(wants_websocket(&headers));
    }

    #[tokio::test]
    async fn root_says_hello() {
        let app = make_server().router();
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "Hello, World!");
    }

    #[tokio::test]
    async fn ws_route_without_upgrade_is_426() {
        let server = make_server();
        let app = server.router();
        let req = Request::builder()
            .uri("/api/ws")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UPGRADE_REQUIRED);
        assert_eq!(body_string(resp).await, UPGRADE_REQUIRED_BODY);
        // No hub was created for the rejected request.
        assert!(server.hubs().is_empty());
    }

    #[tokio::test]
    async fn ws_route_with_wrong_upgrade_is_426() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/api/ws")
            .header(header::CONNECTION, "Upgrade")
            .header(header::UPGRADE, "h2c")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UPGRADE_REQUIRED);
    }

    #[tokio::test]
    async fn health_endpoint_reports_default_hub() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let parsed: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["hub"], "global");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["counter"], 0);
        assert!(parsed["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn metrics_endpoint_responds() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = make_server().router();
        let req = Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port_and_stops_on_shutdown() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        server.shutdown().shutdown();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
