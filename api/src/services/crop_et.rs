//! Daily crop coefficient (Kc) and crop ET (ETc) series.
//!
//! For every usable weather row and every requested crop, the crop's
//! phenology is placed in the row's year, turned into a growth-stage percent
//! and interpolated on the crop's curve. `ETc = ETrs × Kc`.
//!
//! Two kinds of missing data are handled differently: a weather row without
//! a readable date or ETrs is dropped from the output, while a crop without
//! usable phenology stays in the output with null Kc and ETc.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use sqlx::PgPool;
use utoipa::ToSchema;

use crate::db::models::{DailyWeatherRecord, WEATHER_CODES};
use crate::db::queries;
use crate::errors::AppError;
use crate::helpers::round_output;
use crate::services::chart::{ChartClient, CropDates, StationCropReport, CROP_NAMES};
use crate::services::curves::{CurveError, CurveSet, CURVE_POINTS};
use crate::services::growth::{interpolate_kc, stage_percent, PhenologyRecord};

/// Source of 21-point curves by crop code.
pub trait CurveLookup {
    fn curve(&self, crop_code: &str) -> Result<&[f64; CURVE_POINTS], CurveError>;
}

impl CurveLookup for CurveSet {
    fn curve(&self, crop_code: &str) -> Result<&[f64; CURVE_POINTS], CurveError> {
        self.get(crop_code).map(|c| &c.coefficients)
    }
}

impl CurveLookup for HashMap<String, [f64; CURVE_POINTS]> {
    fn curve(&self, crop_code: &str) -> Result<&[f64; CURVE_POINTS], CurveError> {
        self.get(crop_code).ok_or_else(|| {
            let mut available: Vec<String> = self.keys().cloned().collect();
            available.sort();
            CurveError::CropNotFound {
                crop_code: crop_code.to_string(),
                available,
            }
        })
    }
}

/// Source of phenology records by crop code.
pub trait PhenologyLookup {
    fn phenology(&self, crop_code: &str) -> Option<&PhenologyRecord>;
}

impl PhenologyLookup for CropDates {
    fn phenology(&self, crop_code: &str) -> Option<&PhenologyRecord> {
        self.find(crop_code)
    }
}

/// Kc and ETc of one crop on one day. Both are null when the crop's
/// phenology is unavailable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, ToSchema)]
pub struct CropEt {
    #[serde(rename = "Kc")]
    pub kc: Option<f64>,
    #[serde(rename = "ETc")]
    pub etc: Option<f64>,
}

/// Per-crop values for one date.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CropEtResult {
    /// `YYYY-MM-DD`
    pub date: String,
    pub crop_results: BTreeMap<String, CropEt>,
}

fn row_date(record: &DailyWeatherRecord) -> Option<NaiveDate> {
    let date = record.date.as_deref().map(str::trim).filter(|d| !d.is_empty())?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

fn usable_row(record: &DailyWeatherRecord) -> Option<(NaiveDate, f64)> {
    let date = row_date(record)?;
    let etrs = record.value("ETRS").filter(|v| v.is_finite())?;
    Some((date, etrs))
}

fn crop_et_on(
    date: NaiveDate,
    etrs: f64,
    phenology: Option<&PhenologyRecord>,
    curve: &[f64; CURVE_POINTS],
) -> CropEt {
    let Some(season) = phenology.and_then(|p| p.season_in(date.year())) else {
        return CropEt::default();
    };
    let kc = interpolate_kc(curve, stage_percent(date, &season));
    CropEt {
        kc: Some(round_output(kc)),
        etc: Some(round_output(etrs * kc)),
    }
}

/// Compute Kc/ETc for every usable row and every crop in `crop_codes`.
///
/// Every requested crop appears in every output date. A crop with no curve
/// fails the whole computation.
pub fn compute_crop_ets<C, P>(
    records: &[DailyWeatherRecord],
    crop_codes: &[String],
    phenology: &P,
    curves: &C,
) -> Result<Vec<CropEtResult>, CurveError>
where
    C: CurveLookup + ?Sized,
    P: PhenologyLookup + ?Sized,
{
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let crops = crop_codes
        .iter()
        .map(|code| Ok::<_, CurveError>((code, curves.curve(code)?, phenology.phenology(code))))
        .collect::<Result<Vec<_>, CurveError>>()?;

    let mut results = Vec::with_capacity(records.len());
    for record in records {
        let Some((date, etrs)) = usable_row(record) else {
            tracing::debug!(
                "Skipping weather row for {} dated {:?}: no usable date or ETrs",
                record.station,
                record.date
            );
            continue;
        };

        let crop_results = crops
            .iter()
            .map(|(code, curve, phenology)| {
                ((*code).clone(), crop_et_on(date, etrs, *phenology, curve))
            })
            .collect();

        results.push(CropEtResult {
            date: date.format("%Y-%m-%d").to_string(),
            crop_results,
        });
    }

    Ok(results)
}

/// Named columns serialized as a JSON object in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnTable(Vec<(String, Vec<Value>)>);

impl ColumnTable {
    pub fn push(&mut self, name: impl Into<String>, values: Vec<Value>) {
        self.0.push((name.into(), values));
    }
}

#[cfg(test)]
impl ColumnTable {
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.as_slice())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }
}

impl Serialize for ColumnTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, values) in &self.0 {
            map.serialize_entry(name, values)?;
        }
        map.end()
    }
}

/// Station weather, crop ET columns and the recent station chart for one
/// date range.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CropWaterUseReport {
    /// Column name → one value per weather row
    #[schema(value_type = Object)]
    pub data: ColumnTable,
    /// Crop code → display name
    pub crop_codes: BTreeMap<String, String>,
    pub station_crop_data: StationCropReport,
    pub results: Vec<CropEtResult>,
}

fn json_number(v: Option<f64>) -> Value {
    v.map(Value::from).unwrap_or(Value::Null)
}

/// Assemble the column table. ETc columns are aligned with the weather rows;
/// rows the engine skipped get null.
pub fn build_report(
    records: &[DailyWeatherRecord],
    crop_codes: &[String],
    results: Vec<CropEtResult>,
    station_crop_data: StationCropReport,
) -> CropWaterUseReport {
    let mut data = ColumnTable::default();
    data.push(
        "Station",
        records
            .iter()
            .map(|r| Value::from(r.station.clone()))
            .collect(),
    );
    data.push(
        "Date",
        records
            .iter()
            .map(|r| r.date.clone().map(Value::from).unwrap_or(Value::Null))
            .collect(),
    );
    for (code, label) in WEATHER_CODES {
        data.push(label, records.iter().map(|r| json_number(r.value(code))).collect());
    }

    let by_date: HashMap<&str, &CropEtResult> =
        results.iter().map(|r| (r.date.as_str(), r)).collect();
    for code in crop_codes {
        let column = records
            .iter()
            .map(|r| {
                let etc = row_date(r)
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .and_then(|d| by_date.get(d.as_str()))
                    .and_then(|res| res.crop_results.get(code))
                    .and_then(|et| et.etc);
                json_number(etc)
            })
            .collect();
        data.push(format!("ETc ({})", code), column);
    }

    CropWaterUseReport {
        data,
        crop_codes: CROP_NAMES
            .iter()
            .map(|(code, name)| (code.to_string(), name.to_string()))
            .collect(),
        station_crop_data,
        results,
    }
}

/// Weather rows, crop ET and the station chart for `station` between
/// `start_date` and `end_date` (inclusive, `YYYY-MM-DD`).
pub async fn crop_water_use_report<C>(
    pool: &PgPool,
    chart: &ChartClient,
    curves: &C,
    station: &str,
    start_date: &str,
    end_date: &str,
    crop_codes: &[String],
) -> Result<CropWaterUseReport, AppError>
where
    C: CurveLookup + ?Sized,
{
    let records = queries::get_daily_climate_data(pool, station, start_date, end_date).await?;
    let views = chart.views(station).await;
    let phenology = views.crop_dates.unwrap_or_default();

    let results = compute_crop_ets(&records, crop_codes, &phenology, curves)?;
    if results.is_empty() {
        tracing::error!(
            "No crop ET data generated for station {}, dates: {} to {}",
            station,
            start_date,
            end_date
        );
        return Err(AppError::NotFound("No crop ET data found".to_string()));
    }

    Ok(build_report(&records, crop_codes, results, views.station_crops))
}
