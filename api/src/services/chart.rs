//! AgriMet station crop water use chart.
//!
//! Fetches `{base}/{station}ch.txt` from the Bureau of Reclamation AgriMet
//! site and parses it. The feed has no schema: after comments and 12 banner
//! lines, each crop takes two physical lines, and only the first carries data:
//!
//! ```text
//!  * ALFP 04/01* 0.35 0.35 0.33 0.33 * 0.34 *06/01*10/05* 26.3 * 2.4* 4.9 *
//! ```
//!
//! Splitting on `*`, dropping the leader and re-splitting on whitespace gives
//! the token layout below. Two views are built from the same tokens: the
//! phenology dates ([`CropDates`]) and the recent water use table
//! ([`StationCrop`]). Fetch and parse failures stop at this module: callers
//! get `None` or a `success: false` report.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::services::growth::{MonthDay, PhenologyRecord};

/// Banner lines after comment/blank removal.
const HEADER_LINES: usize = 12;
/// Physical lines per crop record; only the first is used.
const LINES_PER_RECORD: usize = 2;

// Token positions within a record.
const TOKEN_CROP_CODE: usize = 0;
const TOKEN_START_DATE: usize = 1;
const TOKEN_DAILY_ET: usize = 2;
const TOKEN_COVER_DATE: usize = 7;
const TOKEN_TERM_DATE: usize = 8;
const TOKEN_SUM_ET: usize = 9;
const TOKEN_7_DAY_USE: usize = 10;
const TOKEN_14_DAY_USE: usize = 11;

/// Daily ET readings per record (four previous days + today).
pub const DAILY_ET_DAYS: usize = 5;

/// A record needs at least this many tokens to carry the termination date.
const PHENOLOGY_TOKENS: usize = TOKEN_TERM_DATE + 1;

/// AgriMet crop codes and their display names.
pub const CROP_NAMES: &[(&str, &str)] = &[
    ("ALFA", "Alfalfa"),
    ("ALFM", "Alfalfa (Mean)"),
    ("ALFN", "Alfalfa (New Plant)"),
    ("ALFP", "Alfalfa (Peak)"),
    ("APPL", "Apples"),
    ("ASPA", "Asparagus"),
    ("BEAN", "Dry Beans"),
    ("BEET", "Sugar Beets"),
    ("BETS", "Beets (Table)"),
    ("BLGR", "Bluegrass Seed"),
    ("BLUB", "Blueberries"),
    ("BROC", "Broccoli"),
    ("CABG", "Cabbage"),
    ("CBBG", "Cabbage (Green)"),
    ("CGRP", "Concord Grapes"),
    ("CHRY", "Cherries"),
    ("CRAN", "Cranberries"),
    ("CRTS", "Carrot Seed"),
    ("FCRN", "Field Corn"),
    ("GARL", "Garlic"),
    ("GRSD", "Grass Seed"),
    (
        "HAYP",
        "Fescue Grass Hay (Peak Daily Consumptive Use for Mature Grass Hay)",
    ),
    (
        "HAYM",
        "Fescue Grass Hay (Mean Annual Use with 3 Seasonal Cuttings)",
    ),
    ("HOPS", "Hops"),
    ("HZLN", "Hazelnuts"),
    ("LAWN", "Lawn"),
    ("LILY", "Easter Lilies"),
    ("MELN", "Melons"),
    ("NMNT", "New Mint"),
    ("ONYN", "Onion"),
    ("ORCH", "Orchards"),
    ("PAST", "Pasture"),
    ("PEAR", "Pears"),
    ("PEAS", "Peas"),
    ("PECH", "Peaches"),
    ("POP1", "First Year Poplar Trees"),
    ("POP2", "Second Year Poplar Trees"),
    ("POP3", "Third Year + Poplar Trees"),
    ("POTA", "Potatoes"),
    ("POTS", "Potatoes (Shepody)"),
    ("PPMT", "Peppermint"),
    ("RAPE", "Rapeseed (Canola)"),
    ("SAFL", "Safflower"),
    ("SBAR", "Spring Barley"),
    ("SBRY", "Strawberry"),
    ("SCRN", "Sweet Corn"),
    ("SGRN", "Spring Grain"),
    ("SPMT", "Spearmint"),
    ("SPNC", "Spinach"),
    ("SQSH", "Squash"),
    ("TBER", "Trailing Berries"),
    ("WGRN", "Winter Grain"),
    ("WGRP", "Wine Grape"),
];

/// Display name for a crop code; unknown codes are returned unchanged.
pub fn crop_display_name(code: &str) -> &str {
    CROP_NAMES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
        .unwrap_or(code)
}

/// Errors fetching or parsing a chart. Never leaves this module's boundary
/// functions.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("chart request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("chart feed returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed chart record '{crop_code}': expected at least {expected} fields, found {found}")]
    Malformed {
        crop_code: String,
        expected: usize,
        found: usize,
    },
}

/// Phenology view of a station chart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct CropDates {
    /// Crop codes in feed order
    pub crop_codes: Vec<String>,
    /// Planting / full cover / termination dates per crop
    pub crop_dates: Vec<PhenologyRecord>,
}

impl CropDates {
    /// First record for `crop_code`.
    pub fn find(&self, crop_code: &str) -> Option<&PhenologyRecord> {
        self.crop_dates.iter().find(|r| r.crop_code == crop_code)
    }
}

/// One crop row of the recent water use view.
///
/// Numeric fields are `None` where the feed printed no usable number.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StationCrop {
    /// Crop code
    pub code: String,
    /// Display name (the code itself when unknown)
    pub name: String,
    /// Season start date as printed (`MM/DD`)
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    /// Full cover date as printed
    #[serde(rename = "coverDate")]
    pub cover_date: Option<String>,
    /// Termination date as printed
    #[serde(rename = "termDate")]
    pub term_date: Option<String>,
    /// Daily crop ET (in), oldest first, last entry is today
    #[serde(rename = "dailyET")]
    pub daily_et: Vec<Option<f64>>,
    /// Season total ET (in)
    #[serde(rename = "sumET")]
    pub sum_et: Option<f64>,
    /// Water use over the last 7 days (in)
    #[serde(rename = "7DayUse")]
    pub seven_day_use: Option<f64>,
    /// Water use over the last 14 days (in)
    #[serde(rename = "14DayUse")]
    pub fourteen_day_use: Option<f64>,
}

/// One day of the five-day chart: crop display name → daily ET.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartDayRow {
    /// `MM/DD`
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(flatten)]
    pub values: BTreeMap<String, Option<f64>>,
}

/// Recent water use view, or why it is unavailable.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StationCropReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub crops: Vec<StationCrop>,
    /// Dates of the five daily readings, oldest first
    pub dates: Vec<NaiveDate>,
    #[serde(rename = "cwuData")]
    #[schema(value_type = Vec<Object>)]
    pub cwu_data: Vec<ChartDayRow>,
}

impl StationCropReport {
    fn failed(error: &FeedError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            crops: Vec::new(),
            dates: Vec::new(),
            cwu_data: Vec::new(),
        }
    }

    fn from_crops(crops: Vec<StationCrop>, today: NaiveDate) -> Self {
        let cwu_data = cwu_chart_rows(&crops, today);
        Self {
            success: true,
            error: None,
            dates: cwu_data_dates(today),
            cwu_data,
            crops,
        }
    }
}

fn cwu_data_dates(today: NaiveDate) -> Vec<NaiveDate> {
    (0..DAILY_ET_DAYS as i64)
        .rev()
        .map(|back| today - chrono::Duration::days(back))
        .collect()
}

/// Pivot the daily readings into one row per day (today−4 … today), each
/// keyed by crop display name.
pub fn cwu_chart_rows(crops: &[StationCrop], today: NaiveDate) -> Vec<ChartDayRow> {
    cwu_data_dates(today)
        .into_iter()
        .enumerate()
        .map(|(day, date)| ChartDayRow {
            date: date.format("%m/%d").to_string(),
            values: crops
                .iter()
                .map(|crop| (crop.name.clone(), crop.daily_et.get(day).copied().flatten()))
                .collect(),
        })
        .collect()
}

/// Both views of one chart fetch.
#[derive(Debug, Clone)]
pub struct ChartViews {
    pub crop_dates: Option<CropDates>,
    pub station_crops: StationCropReport,
}

/// Split chart text into per-crop token lists.
///
/// Every other body line is a record, including a final crop line with no
/// separator after it. A body of fewer than two lines yields nothing.
pub fn chart_records(content: &str) -> Vec<Vec<String>> {
    let lines: Vec<&str> = content
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .collect();

    let body = lines.get(HEADER_LINES..).unwrap_or(&[]);
    if body.len() < LINES_PER_RECORD {
        return Vec::new();
    }
    body.iter()
        .step_by(LINES_PER_RECORD)
        .map(|line| record_tokens(line))
        .collect()
}

fn record_tokens(line: &str) -> Vec<String> {
    let fields: Vec<&str> = line.split('*').skip(1).collect();
    fields
        .join(" ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn number_at(tokens: &[String], idx: usize) -> Option<f64> {
    tokens
        .get(idx)
        .and_then(|t| t.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Build the phenology view. Any record too short to carry all three dates
/// makes the whole chart unusable.
pub fn parse_crop_dates(content: &str) -> Result<CropDates, FeedError> {
    let mut crop_dates = Vec::new();

    for tokens in chart_records(content) {
        if tokens.len() < PHENOLOGY_TOKENS {
            return Err(FeedError::Malformed {
                crop_code: tokens.first().cloned().unwrap_or_default(),
                expected: PHENOLOGY_TOKENS,
                found: tokens.len(),
            });
        }
        crop_dates.push(PhenologyRecord {
            crop_code: tokens[TOKEN_CROP_CODE].clone(),
            planting_date: MonthDay::parse(&tokens[TOKEN_START_DATE]),
            full_cover_date: MonthDay::parse(&tokens[TOKEN_COVER_DATE]),
            termination_date: MonthDay::parse(&tokens[TOKEN_TERM_DATE]),
        });
    }

    let crop_codes = crop_dates.iter().map(|r| r.crop_code.clone()).collect();
    Ok(CropDates {
        crop_codes,
        crop_dates,
    })
}

/// Build the recent water use view. Missing or non-numeric fields become
/// `None`; records without a crop code are dropped.
pub fn parse_station_crops(content: &str) -> Vec<StationCrop> {
    chart_records(content)
        .into_iter()
        .filter_map(|tokens| {
            let code = tokens.get(TOKEN_CROP_CODE)?.clone();
            Some(StationCrop {
                name: crop_display_name(&code).to_string(),
                start_date: tokens.get(TOKEN_START_DATE).cloned(),
                cover_date: tokens.get(TOKEN_COVER_DATE).cloned(),
                term_date: tokens.get(TOKEN_TERM_DATE).cloned(),
                daily_et: (TOKEN_DAILY_ET..TOKEN_DAILY_ET + DAILY_ET_DAYS)
                    .map(|i| number_at(&tokens, i))
                    .collect(),
                sum_et: number_at(&tokens, TOKEN_SUM_ET),
                seven_day_use: number_at(&tokens, TOKEN_7_DAY_USE),
                fourteen_day_use: number_at(&tokens, TOKEN_14_DAY_USE),
                code,
            })
        })
        .collect()
}

/// Client for the AgriMet chart feed.
#[derive(Debug, Clone)]
pub struct ChartClient {
    client: reqwest::Client,
    base_url: String,
}

impl ChartClient {
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Download the raw chart text for `station`.
    pub async fn fetch_chart(&self, station: &str) -> Result<String, FeedError> {
        let url = format!("{}/{}ch.txt", self.base_url, station.trim().to_lowercase());

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(FeedError::Status(response.status()));
        }

        let content = response.text().await?;
        tracing::debug!("Fetched chart for station {} ({} bytes)", station, content.len());
        Ok(content)
    }

    /// Phenology for every crop at `station`, or `None` if the chart could
    /// not be fetched or parsed.
    pub async fn crop_dates(&self, station: &str) -> Option<CropDates> {
        match self.fetch_chart(station).await {
            Ok(content) => crop_dates_or_none(station, &content),
            Err(e) => {
                tracing::warn!("Crop dates unavailable for station {}: {}", station, e);
                None
            }
        }
    }

    /// Recent crop water use at `station`.
    pub async fn station_crop_data(&self, station: &str) -> StationCropReport {
        match self.fetch_chart(station).await {
            Ok(content) => StationCropReport::from_crops(parse_station_crops(&content), today()),
            Err(e) => {
                tracing::warn!("Crop water use unavailable for station {}: {}", station, e);
                StationCropReport::failed(&e)
            }
        }
    }

    /// Both views from a single fetch.
    pub async fn views(&self, station: &str) -> ChartViews {
        match self.fetch_chart(station).await {
            Ok(content) => ChartViews {
                crop_dates: crop_dates_or_none(station, &content),
                station_crops: StationCropReport::from_crops(parse_station_crops(&content), today()),
            },
            Err(e) => {
                tracing::warn!("Chart unavailable for station {}: {}", station, e);
                ChartViews {
                    crop_dates: None,
                    station_crops: StationCropReport::failed(&e),
                }
            }
        }
    }
}

fn crop_dates_or_none(station: &str, content: &str) -> Option<CropDates> {
    match parse_crop_dates(content) {
        Ok(dates) => {
            tracing::info!(
                "Parsed crop dates for station {} ({} crops)",
                station,
                dates.crop_codes.len()
            );
            Some(dates)
        }
        Err(e) => {
            tracing::warn!("Crop dates unavailable for station {}: {}", station, e);
            None
        }
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}
