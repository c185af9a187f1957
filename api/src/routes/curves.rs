use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::AppState;
use crate::errors::{AppError, ErrorResponse};
use crate::services::curve_table;
use crate::services::curves::{load_curve_file, CoefficientCurve, ParseWarning, CURVE_POINTS};

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchQuery {
    /// Text to look for in crop codes and descriptions
    pub term: String,
    /// Match case exactly (default false)
    #[serde(default)]
    pub case_sensitive: bool,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PeriodQuery {
    /// First period, 1-based (1 = planting)
    pub start: usize,
    /// Last period, inclusive (defaults to `start`)
    pub end: Option<usize>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Snapshot summary.
#[derive(Debug, Serialize, ToSchema)]
pub struct CurveListResponse {
    /// Number of curves loaded
    pub count: usize,
    /// Crop codes, sorted
    pub crop_codes: Vec<String>,
    /// Curve numbers, sorted
    pub curve_numbers: Vec<i32>,
    /// Problems found while parsing the source file
    pub warnings: Vec<ParseWarning>,
}

/// One crop coefficient curve.
#[derive(Debug, Serialize, ToSchema)]
pub struct CurveResponse {
    /// Source-table curve number
    pub curve_number: i32,
    /// Crop code (e.g. "ALFP")
    pub crop_code: String,
    pub description: String,
    /// Kc at growth stage 0, 10, …, 200 %
    pub coefficients: Vec<f64>,
}

impl From<&CoefficientCurve> for CurveResponse {
    fn from(c: &CoefficientCurve) -> Self {
        Self {
            curve_number: c.curve_number,
            crop_code: c.crop_code.clone(),
            description: c.description.clone(),
            coefficients: c.coefficients.to_vec(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    pub term: String,
    pub case_sensitive: bool,
    /// Matching crop codes, sorted
    pub matches: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PeriodResponse {
    pub crop_code: String,
    pub start: usize,
    pub end: usize,
    /// Coefficients for periods `start..=end`
    pub coefficients: Vec<f64>,
}

/// Coefficients read back from the `crop_coefficients` table.
#[derive(Debug, Serialize, ToSchema)]
pub struct TableCoefficientsResponse {
    pub crop_code: String,
    pub coefficients: Vec<f64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReloadResponse {
    /// Curves in the new snapshot
    pub count: usize,
    /// Rows written to the `crop_coefficients` table
    pub exported: u64,
    pub warnings: Vec<ParseWarning>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// List the loaded crop codes and curve numbers.
#[utoipa::path(
    get,
    path = "/api/v1/curves",
    tag = "Curves",
    responses(
        (status = 200, description = "Current curve snapshot summary", body = CurveListResponse),
    )
)]
pub async fn list_curves(State(state): State<AppState>) -> Json<CurveListResponse> {
    let set = state.curves.snapshot();
    Json(CurveListResponse {
        count: set.len(),
        crop_codes: set.list_crop_codes(),
        curve_numbers: set.list_curve_numbers(),
        warnings: set.warnings().to_vec(),
    })
}

/// Search crop codes and descriptions.
#[utoipa::path(
    get,
    path = "/api/v1/curves/search",
    tag = "Curves",
    params(SearchQuery),
    responses(
        (status = 200, description = "Matching crop codes", body = SearchResponse),
        (status = 400, description = "Empty search term", body = ErrorResponse),
    )
)]
pub async fn search_curves(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, AppError> {
    let term = params.term.trim();
    if term.is_empty() {
        return Err(AppError::BadRequest("term parameter is required".to_string()));
    }
    let matches = state.curves.snapshot().search(term, params.case_sensitive);
    Ok(Json(SearchResponse {
        term: term.to_string(),
        case_sensitive: params.case_sensitive,
        matches,
    }))
}

/// Get a curve by crop code.
#[utoipa::path(
    get,
    path = "/api/v1/curves/{crop_code}",
    tag = "Curves",
    params(
        ("crop_code" = String, Path, description = "Crop code, e.g. ALFP"),
    ),
    responses(
        (status = 200, description = "Crop coefficient curve", body = CurveResponse),
        (status = 404, description = "Unknown crop code", body = ErrorResponse),
    )
)]
pub async fn get_curve(
    State(state): State<AppState>,
    Path(crop_code): Path<String>,
) -> Result<Json<CurveResponse>, AppError> {
    let set = state.curves.snapshot();
    let curve = set.get(&crop_code.to_uppercase())?;
    Ok(Json(CurveResponse::from(curve)))
}

/// Get a curve by its source-table curve number.
#[utoipa::path(
    get,
    path = "/api/v1/curves/number/{curve_number}",
    tag = "Curves",
    params(
        ("curve_number" = i32, Path, description = "Curve number"),
    ),
    responses(
        (status = 200, description = "Crop coefficient curve", body = CurveResponse),
        (status = 404, description = "Unknown curve number", body = ErrorResponse),
    )
)]
pub async fn get_curve_by_number(
    State(state): State<AppState>,
    Path(curve_number): Path<i32>,
) -> Result<Json<CurveResponse>, AppError> {
    let set = state.curves.snapshot();
    let curve = set.get_by_curve_number(curve_number)?;
    Ok(Json(CurveResponse::from(curve)))
}

/// Get the coefficients for a range of growth periods.
#[utoipa::path(
    get,
    path = "/api/v1/curves/{crop_code}/periods",
    tag = "Curves",
    params(
        ("crop_code" = String, Path, description = "Crop code, e.g. ALFP"),
        PeriodQuery,
    ),
    responses(
        (status = 200, description = "Coefficients for the requested periods", body = PeriodResponse),
        (status = 400, description = "Period outside 1..=21 or start after end", body = ErrorResponse),
        (status = 404, description = "Unknown crop code", body = ErrorResponse),
    )
)]
pub async fn get_curve_periods(
    State(state): State<AppState>,
    Path(crop_code): Path<String>,
    Query(params): Query<PeriodQuery>,
) -> Result<Json<PeriodResponse>, AppError> {
    let crop_code = crop_code.to_uppercase();
    let set = state.curves.snapshot();
    let end = params.end.unwrap_or(params.start);

    let coefficients = if end == params.start {
        vec![set.coefficient(&crop_code, params.start)?]
    } else {
        set.coefficient_range(&crop_code, params.start, end)?
    };

    Ok(Json(PeriodResponse {
        crop_code,
        start: params.start,
        end,
        coefficients,
    }))
}

/// Get a crop's coefficients from the durable `crop_coefficients` table.
#[utoipa::path(
    get,
    path = "/api/v1/curves/{crop_code}/table",
    tag = "Curves",
    params(
        ("crop_code" = String, Path, description = "Crop code, e.g. ALFP"),
    ),
    responses(
        (status = 200, description = "Stored coefficients", body = TableCoefficientsResponse),
        (status = 404, description = "Crop code not in the table", body = ErrorResponse),
    )
)]
pub async fn get_table_coefficients(
    State(state): State<AppState>,
    Path(crop_code): Path<String>,
) -> Result<Json<TableCoefficientsResponse>, AppError> {
    let crop_code = crop_code.to_uppercase();
    let coefficients: [f64; CURVE_POINTS] =
        curve_table::table_coefficients(&state.pool, &crop_code).await?;
    Ok(Json(TableCoefficientsResponse {
        crop_code,
        coefficients: coefficients.to_vec(),
    }))
}

/// Re-read the curve file, export it to the table and swap the snapshot.
///
/// On a load or export error the previous snapshot stays in place.
#[utoipa::path(
    post,
    path = "/api/v1/curves/reload",
    tag = "Curves",
    responses(
        (status = 200, description = "New snapshot installed", body = ReloadResponse),
        (status = 500, description = "Curve file unreadable or table export failed", body = ErrorResponse),
    )
)]
pub async fn reload_curves(State(state): State<AppState>) -> Result<Json<ReloadResponse>, AppError> {
    let path = state.curve_path.clone();
    let set = tokio::task::spawn_blocking(move || load_curve_file(&path))
        .await
        .map_err(|e| AppError::InternalError(format!("Curve reload task failed: {}", e)))??;

    // swapped only once the table holds the new curves
    let pool = state.pool.clone();
    let (set, exported) = state
        .curves
        .replace_after(set, |set| async move { curve_table::export_curves(&pool, &set).await })
        .await?;
    tracing::info!("Reloaded {} crop coefficient curves", set.len());

    Ok(Json(ReloadResponse {
        count: set.len(),
        exported,
        warnings: set.warnings().to_vec(),
    }))
}
