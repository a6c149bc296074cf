//! Web server setup and routing

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;

use crate::api;
use crate::state::AppState;

/// Build the router for the API and the static dashboard
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // API routes
        .route("/api/devices", get(api::list_devices))
        .route("/api/stats", get(api::get_stats))
        .route("/api/networks", get(api::list_networks))
        .route("/api/scan", post(api::trigger_scan))
        // Static dashboard
        .fallback_service(ServeDir::new(&state.config.daemon.web_root))
        // CORS
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        // State
        .with_state(state)
}

/// Run the web server until `shutdown` resolves
pub async fn run(
    state: Arc<AppState>,
    bind: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = router(state.clone());

    // Start background rescans if configured
    let background = match state.config.daemon.scan_interval_secs {
        0 => None,
        secs => {
            let presence = state.presence.clone();
            let target = state.config.daemon.scan_network.clone();
            Some(tokio::spawn(async move {
                presence.run(Duration::from_secs(secs), target).await;
            }))
        }
    };

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, protocol = "HTTP", "Starting web server");
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    if let Some(task) = background {
        task.abort();
        // A cancelled task resolves with a JoinError; nothing to report
        let _ = task.await;
    }

    info!("Web server stopped");
    served?;
    Ok(())
}

/// Resolves on Ctrl-C
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use lighthouse_core::{DeviceStore, Observation};
    use lighthouse_discovery::{
        InterfaceSnapshot, InterfaceSource, NetworkEnumerator, PresenceService, ProbeError,
        Prober,
    };
    use tower::ServiceExt;

    struct StaticProber(Vec<Observation>);

    impl Prober for StaticProber {
        fn scan(&self, cidr: &str) -> Result<Vec<Observation>, ProbeError> {
            lighthouse_discovery::probe::validate_target(cidr)?;
            Ok(self.0.clone())
        }
    }

    struct OneInterface;

    impl InterfaceSource for OneInterface {
        fn interfaces(&self) -> Vec<InterfaceSnapshot> {
            vec![InterfaceSnapshot {
                name: "en0".to_string(),
                is_up: true,
                is_loopback: false,
                ipv4: vec!["192.168.1.37/24".parse().unwrap()],
            }]
        }
    }

    fn test_state(observations: Vec<Observation>) -> Arc<AppState> {
        let presence = PresenceService::new(
            Arc::new(DeviceStore::in_memory().unwrap()),
            Arc::new(StaticProber(observations)),
            NetworkEnumerator::new(Arc::new(OneInterface)),
            10,
        );
        AppState::with_presence(Config::default(), Arc::new(presence))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_device_list() {
        let app = router(test_state(Vec::new()));
        let (status, body) = send(app, get("/api/devices")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_scan_then_read() {
        let state = test_state(vec![
            Observation::new("192.168.1.1").with_vendor("Netgear"),
            Observation::new("192.168.1.20").with_hostname("nas"),
        ]);

        let (status, body) = send(router(state.clone()), post_json("/api/scan", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["network"], "192.168.1.0/24");
        assert_eq!(body["devices_found"], 2);
        assert_eq!(body["saved"], 2);

        let (_, devices) = send(router(state.clone()), get("/api/devices")).await;
        assert_eq!(devices[0]["ipAddress"], "192.168.1.1");
        assert_eq!(devices[0]["vendor"], "Netgear");
        assert_eq!(devices[1]["hostname"], "nas");
        assert_eq!(devices[1]["isOnline"], true);

        let (_, stats) = send(router(state), get("/api/stats")).await;
        assert_eq!(stats, serde_json::json!({"total": 2, "online": 2, "offline": 0}));
    }

    #[tokio::test]
    async fn test_reads_mark_stale_devices_offline() {
        let state = test_state(Vec::new());
        let store = state.presence.store();
        let stale = chrono::Utc::now() - chrono::Duration::minutes(30);
        store.upsert_at(&Observation::new("10.0.0.9"), stale).unwrap();
        store.upsert(&Observation::new("10.0.0.1")).unwrap();

        let (status, stats) = send(router(state.clone()), get("/api/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats, serde_json::json!({"total": 2, "online": 1, "offline": 1}));

        let (_, devices) = send(router(state), get("/api/devices")).await;
        assert_eq!(devices[1]["ipAddress"], "10.0.0.9");
        assert_eq!(devices[1]["isOnline"], false);
    }

    #[tokio::test]
    async fn test_scan_rejects_invalid_target() {
        let app = router(test_state(Vec::new()));
        let (status, body) =
            send(app, post_json("/api/scan", r#"{"network": "not-a-cidr"}"#)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("not-a-cidr"));
    }

    #[tokio::test]
    async fn test_scan_rejects_malformed_body() {
        let app = router(test_state(Vec::new()));
        let (status, _) = send(app, post_json("/api/scan", "{network")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_networks() {
        let app = router(test_state(Vec::new()));
        let (status, body) = send(app, get("/api/networks")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!([{"interface": "en0", "ip": "192.168.1.37", "cidr": "192.168.1.0/24"}])
        );
    }
}
