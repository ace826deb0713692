//! A narrow read-only JSON API exposing sender health and frame-rate stats
//! for operators, running on its own Tokio task independent of the render
//! loop and the controller reactor.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::sender_monitor::SenderMonitor;

#[derive(Clone)]
struct AppState {
    monitor: Arc<SenderMonitor>,
    ready: Arc<AtomicBool>,
}

#[derive(Serialize)]
struct StatsEntry {
    ip: String,
    port: u16,
    state: &'static str,
    last_success_ms_ago: u64,
    last_error: Option<String>,
}

#[derive(Serialize)]
struct FrameRateResponse {
    measured_fps: f64,
    target_fps: u32,
    frame_misses: u64,
}

/// Binds `bind_address:port` and serves `/api/stats`, `/api/frame_rate` and `/healthz`
/// until the listener is closed or the process exits. Reads `monitor` and `ready`
/// through shared handles; never blocks or is blocked by the render tick.
pub async fn serve(bind_address: IpAddr, port: u16, monitor: Arc<SenderMonitor>, ready: Arc<AtomicBool>) -> std::io::Result<()> {
    let app = router(monitor, ready);
    let addr = SocketAddr::new(bind_address, port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "monitor HTTP surface listening");
    axum::serve(listener, app).await
}

fn router(monitor: Arc<SenderMonitor>, ready: Arc<AtomicBool>) -> Router {
    Router::new()
        .route("/api/stats", get(stats))
        .route("/api/frame_rate", get(frame_rate))
        .route("/healthz", get(healthz))
        .with_state(AppState { monitor, ready })
}

async fn stats(State(state): State<AppState>) -> Json<Vec<StatsEntry>> {
    let entries = state
        .monitor
        .stats()
        .into_iter()
        .map(|s| StatsEntry {
            ip: s.addr.ip().to_string(),
            port: s.addr.port(),
            state: if s.routable { "Routable" } else { "Cooling" },
            last_success_ms_ago: s.last_success_ms_ago,
            last_error: s.last_error,
        })
        .collect();
    Json(entries)
}

async fn frame_rate(State(state): State<AppState>) -> Json<FrameRateResponse> {
    let stats = state.monitor.frame_rate();
    Json(FrameRateResponse {
        measured_fps: stats.measured_fps,
        target_fps: stats.target_fps,
        frame_misses: stats.frame_misses,
    })
}

async fn healthz(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.ready.load(Ordering::Relaxed) {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn healthz_reports_503_before_ready_and_200_after() {
        let monitor = Arc::new(SenderMonitor::new(Duration::from_secs(30), 30));
        let ready = Arc::new(AtomicBool::new(false));
        let state = AppState { monitor, ready: ready.clone() };

        let (status, _) = healthz(State(state.clone())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        ready.store(true, Ordering::Relaxed);
        let (status, _) = healthz(State(state)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn stats_reports_registered_failures() {
        let monitor = Arc::new(SenderMonitor::new(Duration::from_secs(30), 30));
        let addr: SocketAddr = "127.0.0.1:6454".parse().unwrap();
        monitor.report_failure(addr, "refused");
        let state = AppState { monitor, ready: Arc::new(AtomicBool::new(true)) };

        let Json(entries) = stats(State(state)).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].port, 6454);
        assert!(!matches!(entries[0].state, "Routable"));
    }
}
