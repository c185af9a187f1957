pub mod agrimet;
pub mod curves;
pub mod health;

use std::path::PathBuf;
use std::sync::Arc;

use crate::services::chart::ChartClient;
use crate::services::curves::CurveStore;

/// Shared state for all routes.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) pool: sqlx::PgPool,
    pub(crate) chart: ChartClient,
    pub(crate) curves: Arc<CurveStore>,
    /// File that `POST /api/v1/curves/reload` re-reads.
    pub(crate) curve_path: PathBuf,
}
