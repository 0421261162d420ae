//! Health endpoint — thin read-only status wrapper over the shared state.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::routing::get;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::dedup::DedupStore;
use crate::pause::PauseController;

/// Read-only view handed to the health endpoint.
pub struct HealthState {
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub accounts: usize,
    pub dedup: Arc<DedupStore>,
    pub pause: Arc<PauseController>,
    pub clock: Arc<dyn Clock>,
}

pub fn health_router(state: Arc<HealthState>) -> axum::Router {
    axum::Router::new()
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<HealthState>>) -> Json<serde_json::Value> {
    Json(health_payload(&state))
}

fn health_payload(state: &HealthState) -> serde_json::Value {
    let now = state.clock.now();
    let snapshot = state.pause.snapshot(now);
    serde_json::json!({
        "status": "ok",
        "uptime_secs": (now - state.started_at).num_seconds(),
        "accounts": state.accounts,
        "dedup_size": state.dedup.len(),
        "paused": snapshot.paused,
        "pause_remaining_secs": snapshot.remaining_secs,
    })
}

/// Spawn the health HTTP server.
pub fn spawn_health_server(port: u16, state: Arc<HealthState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let app = health_router(state);
        let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(port, "Failed to bind health endpoint: {e}");
                return;
            }
        };
        tracing::info!(port, "Health endpoint started");
        axum::serve(listener, app).await.ok();
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    #[test]
    fn payload_reflects_shared_state() {
        let start = chrono::Utc::now();
        let clock = Arc::new(FakeClock::new(start));
        let dedup = Arc::new(DedupStore::new());
        let pause = Arc::new(PauseController::new(chrono::Duration::hours(12)));

        dedup.seed(["a_1".to_string(), "a_2".to_string()]);
        pause.pause(start);
        clock.advance(chrono::Duration::hours(2));

        let state = HealthState {
            started_at: start,
            accounts: 3,
            dedup,
            pause,
            clock,
        };

        let payload = health_payload(&state);
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["uptime_secs"], 7200);
        assert_eq!(payload["accounts"], 3);
        assert_eq!(payload["dedup_size"], 2);
        assert_eq!(payload["paused"], true);
        assert_eq!(payload["pause_remaining_secs"], 10 * 3600);
    }

    #[test]
    fn payload_when_active_has_no_remaining() {
        let start = chrono::Utc::now();
        let state = HealthState {
            started_at: start,
            accounts: 1,
            dedup: Arc::new(DedupStore::new()),
            pause: Arc::new(PauseController::default()),
            clock: Arc::new(FakeClock::new(start)),
        };

        let payload = health_payload(&state);
        assert_eq!(payload["paused"], false);
        assert_eq!(payload["pause_remaining_secs"], serde_json::Value::Null);
    }
}
