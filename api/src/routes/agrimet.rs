use std::collections::BTreeSet;

use axum::extract::{Query, State};
use axum::Json;
use chrono::{Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::AppState;
use crate::db::queries;
use crate::errors::{AppError, ErrorResponse};
use crate::services::chart::{ChartDayRow, CropDates, StationCrop, CROP_NAMES};
use crate::services::crop_et::{self, CropEtResult, CropWaterUseReport};
use crate::services::curve_table;

/// Days back from today to the first and last day of the chart window.
const CWU_WINDOW_START_DAYS_AGO: i64 = 15;
const CWU_WINDOW_END_DAYS_AGO: i64 = 11;

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
pub struct StationQuery {
    /// AgriMet station id (e.g. "abei")
    pub station: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CropDatesQuery {
    /// AgriMet station id (e.g. "abei")
    pub station: Option<String>,
    /// Only return this crop code
    pub crop: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CropEtQuery {
    /// AgriMet station id (e.g. "abei")
    pub station: Option<String>,
    /// First day, `YYYY-MM-DD`
    pub start_date: Option<String>,
    /// Last day (inclusive), `YYYY-MM-DD`
    pub end_date: Option<String>,
    /// Comma-separated crop codes (e.g. "ALFP,BEET")
    pub crops: Option<String>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct CropDatesResponse {
    pub success: bool,
    pub station: String,
    pub dates: CropDates,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StationCropInfoResponse {
    pub success: bool,
    pub station: String,
    pub crop_data: Vec<StationCrop>,
    /// Dates of the five daily readings, oldest first
    pub dates: Vec<NaiveDate>,
    #[serde(rename = "cwuData")]
    #[schema(value_type = Vec<Object>)]
    pub cwu_data: Vec<ChartDayRow>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CropEtResponse {
    pub success: bool,
    pub station: String,
    pub start_date: String,
    pub end_date: String,
    pub crop_codes: Vec<String>,
    pub results: Vec<CropEtResult>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CwuChartResponse {
    pub success: bool,
    /// Days in the window, `YYYY-MM-DD`
    pub dates: Vec<String>,
    #[serde(flatten)]
    pub report: CropWaterUseReport,
}

// ---------------------------------------------------------------------------
// Parameter helpers
// ---------------------------------------------------------------------------

fn required(value: Option<String>, name: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("{} parameter is required", name)))
}

fn parse_date(value: &str, name: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        AppError::BadRequest(format!("{} must be a date in YYYY-MM-DD format", name))
    })
}

/// Split a comma-separated crop list into unique upper-case codes, keeping
/// the first occurrence order.
fn parse_crop_list(value: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    value
        .split(',')
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty() && seen.insert(c.clone()))
        .collect()
}

/// The five days of the chart window, oldest first.
fn cwu_window(today: NaiveDate) -> Vec<String> {
    (CWU_WINDOW_END_DAYS_AGO..=CWU_WINDOW_START_DAYS_AGO)
        .rev()
        .map(|back| (today - Duration::days(back)).format("%Y-%m-%d").to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Planting, full cover and termination dates from a station's chart.
#[utoipa::path(
    get,
    path = "/api/v1/agrimet/crop_dates",
    tag = "AgriMet",
    params(CropDatesQuery),
    responses(
        (status = 200, description = "Crop phenology for the station", body = CropDatesResponse),
        (status = 400, description = "Missing station", body = ErrorResponse),
        (status = 404, description = "No chart or no matching crop", body = ErrorResponse),
    )
)]
pub async fn get_crop_dates(
    State(state): State<AppState>,
    Query(params): Query<CropDatesQuery>,
) -> Result<Json<CropDatesResponse>, AppError> {
    let station = required(params.station, "station")?;
    tracing::info!("Fetching AgriMet crop dates for station {}", station);

    let mut dates = state.chart.crop_dates(&station).await.ok_or_else(|| {
        AppError::NotFound(format!("No crop dates found for station {}", station))
    })?;

    if let Some(crop) = params.crop.map(|c| c.trim().to_uppercase()).filter(|c| !c.is_empty()) {
        let record = dates.find(&crop).cloned().ok_or_else(|| {
            AppError::NotFound(format!(
                "No crop dates found for crop {} at station {}",
                crop, station
            ))
        })?;
        dates = CropDates {
            crop_codes: vec![crop],
            crop_dates: vec![record],
        };
    }

    Ok(Json(CropDatesResponse {
        success: true,
        station,
        dates,
    }))
}

/// Recent daily crop water use from a station's chart.
#[utoipa::path(
    get,
    path = "/api/v1/agrimet/station_crop_info",
    tag = "AgriMet",
    params(StationQuery),
    responses(
        (status = 200, description = "Crop water use for the last five days", body = StationCropInfoResponse),
        (status = 400, description = "Missing station", body = ErrorResponse),
        (status = 404, description = "Chart lists no crops", body = ErrorResponse),
        (status = 502, description = "Chart feed unavailable", body = ErrorResponse),
    )
)]
pub async fn get_station_crop_info(
    State(state): State<AppState>,
    Query(params): Query<StationQuery>,
) -> Result<Json<StationCropInfoResponse>, AppError> {
    let station = required(params.station, "station")?;
    tracing::info!("Fetching AgriMet station crop information for station {}", station);

    let report = state.chart.station_crop_data(&station).await;
    if !report.success {
        return Err(AppError::ExternalServiceError(
            report
                .error
                .unwrap_or_else(|| "chart feed unavailable".to_string()),
        ));
    }
    if report.crops.is_empty() {
        return Err(AppError::NotFound(format!(
            "No crop data found for station {}",
            station
        )));
    }

    Ok(Json(StationCropInfoResponse {
        success: true,
        station,
        crop_data: report.crops,
        dates: report.dates,
        cwu_data: report.cwu_data,
    }))
}

/// Daily Kc and ETc for a station and date range.
///
/// Curves are read from the `crop_coefficients` table.
#[utoipa::path(
    get,
    path = "/api/v1/agrimet/crop_et",
    tag = "AgriMet",
    params(CropEtQuery),
    responses(
        (status = 200, description = "Per-date crop ET", body = CropEtResponse),
        (status = 400, description = "Missing or malformed parameter", body = ErrorResponse),
        (status = 404, description = "Unknown crop or no weather data", body = ErrorResponse),
    )
)]
pub async fn get_crop_et(
    State(state): State<AppState>,
    Query(params): Query<CropEtQuery>,
) -> Result<Json<CropEtResponse>, AppError> {
    let station = required(params.station, "station")?;
    let start_date = required(params.start_date, "start_date")?;
    let end_date = required(params.end_date, "end_date")?;
    let crop_codes = parse_crop_list(&required(params.crops, "crops")?);
    if crop_codes.is_empty() {
        return Err(AppError::BadRequest("crops parameter is required".to_string()));
    }
    if parse_date(&start_date, "start_date")? > parse_date(&end_date, "end_date")? {
        return Err(AppError::BadRequest(
            "start_date must not be after end_date".to_string(),
        ));
    }

    let curves = curve_table::table_curves(&state.pool, &crop_codes).await?;
    let records =
        queries::get_daily_climate_data(&state.pool, &station, &start_date, &end_date).await?;
    let phenology = state.chart.crop_dates(&station).await.unwrap_or_default();

    let results = crop_et::compute_crop_ets(&records, &crop_codes, &phenology, &curves)?;
    if results.is_empty() {
        return Err(AppError::NotFound(format!(
            "No weather data found for station {} between {} and {}",
            station, start_date, end_date
        )));
    }

    Ok(Json(CropEtResponse {
        success: true,
        station,
        start_date,
        end_date,
        crop_codes,
        results,
    }))
}

/// Weather, crop ET and chart data for a station over the five days ending
/// eleven days ago.
#[utoipa::path(
    get,
    path = "/api/v1/agrimet/cwu_chart_data",
    tag = "AgriMet",
    params(StationQuery),
    responses(
        (status = 200, description = "Crop water use chart data", body = CwuChartResponse),
        (status = 400, description = "Missing station", body = ErrorResponse),
        (status = 404, description = "No crop ET data for the window", body = ErrorResponse),
    )
)]
pub async fn get_cwu_chart_data(
    State(state): State<AppState>,
    Query(params): Query<StationQuery>,
) -> Result<Json<CwuChartResponse>, AppError> {
    let station = required(params.station, "station")?;
    tracing::info!("Fetching AgriMet crop water use chart data for station {}", station);

    let dates = cwu_window(Local::now().date_naive());
    let (start_date, end_date) = match (dates.first(), dates.last()) {
        (Some(first), Some(last)) => (first.clone(), last.clone()),
        _ => return Err(AppError::InternalError("empty date window".to_string())),
    };

    let curves = state.curves.snapshot();
    let crop_codes: Vec<String> = CROP_NAMES
        .iter()
        .map(|(code, _)| code.to_string())
        .filter(|code| curves.contains(code))
        .collect();

    let report = crop_et::crop_water_use_report(
        &state.pool,
        &state.chart,
        &*curves,
        &station,
        &start_date,
        &end_date,
        &crop_codes,
    )
    .await?;

    Ok(Json(CwuChartResponse {
        success: true,
        dates,
        report,
    }))
}
