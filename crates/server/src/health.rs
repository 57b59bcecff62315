use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use saleslens_db::DbPool;
use serde::Serialize;
use tracing::{error, info};

use crate::scheduler::SyncStatus;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    sync_status: Arc<SyncStatus>,
}

impl HealthState {
    pub fn new(db_pool: DbPool, sync_status: Arc<SyncStatus>) -> Self {
        Self { db_pool, sync_status }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub sync: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn spawn(bind_address: &str, port: u16, state: HealthState) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(state)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

/// Readiness follows the database only; a failing sync pass is reported but
/// does not take the service out of rotation.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let sync = sync_check(&state.sync_status).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "saleslens-server runtime initialized".to_string(),
        },
        database,
        sync,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

async fn sync_check(status: &SyncStatus) -> HealthCheck {
    let Some(tick) = status.last_tick().await else {
        return HealthCheck { status: "pending", detail: "no sync pass has run yet".to_string() };
    };
    let started = tick.started_at.map(|at| at.to_rfc3339()).unwrap_or_default();
    let detail = format!(
        "last pass at {started}: {} of {} businesses synced",
        tick.succeeded, tick.businesses
    );
    if tick.failed == 0 {
        HealthCheck { status: "ready", detail }
    } else {
        HealthCheck { status: "degraded", detail }
    }
}
