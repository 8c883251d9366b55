//! `GET /health`: last cycle report and run counters.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use fleet_core::now_millis;
use fleet_engine::CycleReport;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::info;

#[derive(Debug)]
pub struct HealthState {
    mode: &'static str,
    started_at: i64,
    running: AtomicBool,
    cycles: AtomicU64,
    digests: AtomicU64,
    last_report: RwLock<Option<CycleReport>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub mode: &'static str,
    pub started_at: i64,
    pub cycles: u64,
    pub digests: u64,
    pub last_cycle: Option<CycleReport>,
}

impl HealthState {
    pub fn new(mode: &'static str) -> Self {
        Self {
            mode,
            started_at: now_millis(),
            running: AtomicBool::new(true),
            cycles: AtomicU64::new(0),
            digests: AtomicU64::new(0),
            last_report: RwLock::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn record_cycle(&self, report: CycleReport) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_report.write() {
            *last = Some(report);
        }
    }

    pub fn record_digest(&self) {
        self.digests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            status: if self.is_running() { "ok" } else { "stopping" },
            mode: self.mode,
            started_at: self.started_at,
            cycles: self.cycles.load(Ordering::Relaxed),
            digests: self.digests.load(Ordering::Relaxed),
            last_cycle: self.last_report.read().ok().and_then(|r| r.clone()),
        }
    }
}

pub fn create_health_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<Arc<HealthState>>) -> Json<HealthSnapshot> {
    Json(state.snapshot())
}

/// Bind the health endpoint and serve it in the background.
pub async fn start_health_server(
    state: Arc<HealthState>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_health_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(port, "Health endpoint listening");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Health server error: {}", e);
        }
    });
    Ok(())
}
