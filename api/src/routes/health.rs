use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use super::AppState;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status ("ok" when healthy, "degraded" when the DB is
    /// unreachable or no curves are loaded)
    pub status: String,
    /// API version
    pub version: String,
    /// Whether the database is reachable
    pub database: bool,
    /// Number of crop coefficient curves in the current snapshot
    pub curves_loaded: usize,
}

fn status_label(db_ok: bool, curves_loaded: usize) -> &'static str {
    if db_ok && curves_loaded > 0 {
        "ok"
    } else {
        "degraded"
    }
}

/// Health check endpoint.
///
/// Always 200; `status` is "degraded" when the database does not answer or
/// the curve snapshot is empty.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service status", body = HealthResponse),
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_ok = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.pool)
        .await
        .is_ok();
    let curves_loaded = state.curves.snapshot().len();

    Json(HealthResponse {
        status: status_label(db_ok, curves_loaded).to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: db_ok,
        curves_loaded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_label() {
        assert_eq!(status_label(true, 12), "ok");
        assert_eq!(status_label(false, 12), "degraded");
        assert_eq!(status_label(true, 0), "degraded");
    }
}
