use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};

use crate::helpers::opt_dec_to_f64;
use crate::services::curves::CURVE_POINTS;

/// Row of the durable `crop_coefficients` mirror.
///
/// The 21 coefficient columns are named `p1` … `p21`.
#[derive(Debug, Clone, PartialEq)]
pub struct CropCoefficientRow {
    pub crop_code: String,
    pub curve_number: i32,
    pub description: String,
    pub coefficients: [f64; CURVE_POINTS],
}

/// Column name of a 1-based coefficient period.
pub fn coefficient_column(period: usize) -> String {
    format!("p{}", period)
}

impl<'r> FromRow<'r, PgRow> for CropCoefficientRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let mut coefficients = [0.0; CURVE_POINTS];
        for (i, slot) in coefficients.iter_mut().enumerate() {
            *slot = row.try_get(coefficient_column(i + 1).as_str())?;
        }
        Ok(Self {
            crop_code: row.try_get("crop_code")?,
            curve_number: row.try_get("curve_number")?,
            description: row.try_get("description")?,
            coefficients,
        })
    }
}

/// AgriMet daily weather codes and their column labels, in table order.
pub const WEATHER_CODES: [(&str, &str); 16] = [
    ("ET", "Evapotranspiration Kimberly-Penman (in)"),
    ("ETRS", "Evapotranspiration ASCE-EWRI Alfalfa (in)"),
    ("ETOS", "Evapotranspiration ASCE-EWRI Grass (in)"),
    ("MN", "Minimum Daily Air Temperature (F)"),
    ("MX", "Maximum Daily Air Temperature (F)"),
    ("MM", "Mean Daily Air Temperature (F)"),
    ("PP", "Daily (24 Hour) Precipitation (in)"),
    ("PU", "Accumulated Water Year Precipitation (in)"),
    ("SR", "Daily Solar Radiation (Langleys)"),
    ("TA", "Mean Daily Humidity (%)"),
    ("TG", "Growing Degree Days (base 50F)"),
    ("YM", "Mean Daily Dewpoint Temperature (F)"),
    ("UA", "Daily Average Wind Speed (mph)"),
    ("UD", "Daily Average Wind Direction (deg az)"),
    ("WG", "Daily Peak Wind Gust (mph)"),
    ("WR", "Daily Wind Run (miles)"),
];

/// One station-day of the `daily_climate_data` table.
///
/// `date` is stored as `YYYY-MM-DD` text and may be missing or malformed in
/// imported rows.
#[derive(Debug, Clone, Default, PartialEq, FromRow)]
pub struct DailyWeatherRecord {
    pub station: String,
    pub date: Option<String>,
    pub et: Option<Decimal>,
    pub etrs: Option<Decimal>,
    pub etos: Option<Decimal>,
    pub mn: Option<Decimal>,
    pub mx: Option<Decimal>,
    pub mm: Option<Decimal>,
    pub pp: Option<Decimal>,
    pub pu: Option<Decimal>,
    pub sr: Option<Decimal>,
    pub ta: Option<Decimal>,
    pub tg: Option<Decimal>,
    pub ym: Option<Decimal>,
    pub ua: Option<Decimal>,
    pub ud: Option<Decimal>,
    pub wg: Option<Decimal>,
    pub wr: Option<Decimal>,
}

impl DailyWeatherRecord {
    /// Reading for a weather code from [`WEATHER_CODES`] as f64.
    pub fn value(&self, code: &str) -> Option<f64> {
        let raw = match code {
            "ET" => self.et,
            "ETRS" => self.etrs,
            "ETOS" => self.etos,
            "MN" => self.mn,
            "MX" => self.mx,
            "MM" => self.mm,
            "PP" => self.pp,
            "PU" => self.pu,
            "SR" => self.sr,
            "TA" => self.ta,
            "TG" => self.tg,
            "YM" => self.ym,
            "UA" => self.ua,
            "UD" => self.ud,
            "WG" => self.wg,
            "WR" => self.wr,
            _ => None,
        };
        opt_dec_to_f64(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_value_by_code() {
        let record = DailyWeatherRecord {
            station: "abei".to_string(),
            date: Some("2024-07-01".to_string()),
            etrs: Some(Decimal::from_str("0.32").unwrap()),
            mx: Some(Decimal::from_str("88.5").unwrap()),
            ..Default::default()
        };
        assert_eq!(record.value("ETRS"), Some(0.32));
        assert_eq!(record.value("MX"), Some(88.5));
        assert_eq!(record.value("PP"), None);
        assert_eq!(record.value("XX"), None);
    }

    #[test]
    fn test_every_weather_code_is_readable() {
        let one = Some(Decimal::ONE);
        let record = DailyWeatherRecord {
            et: one,
            etrs: one,
            etos: one,
            mn: one,
            mx: one,
            mm: one,
            pp: one,
            pu: one,
            sr: one,
            ta: one,
            tg: one,
            ym: one,
            ua: one,
            ud: one,
            wg: one,
            wr: one,
            ..Default::default()
        };
        for (code, _) in WEATHER_CODES {
            assert_eq!(record.value(code), Some(1.0), "code {}", code);
        }
    }

    #[test]
    fn test_coefficient_column() {
        assert_eq!(coefficient_column(1), "p1");
        assert_eq!(coefficient_column(21), "p21");
    }
}
