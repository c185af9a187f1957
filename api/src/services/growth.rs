//! Growth-stage interpolation.
//!
//! A crop's season is described by three month/day dates (planting, full
//! cover, termination). The growth-stage percent runs 0–100 from planting to
//! full cover and 100–200 from full cover to termination; the crop
//! coefficient for a day is interpolated from the 21-point curve at that
//! percent.
//!
//! Phenology dates carry no year. They are placed in the year of the query
//! date, so a season that crosses 31 Dec (e.g. winter grain planted in
//! October) never contains the query date and yields percent 0.

use std::fmt;

use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use utoipa::ToSchema;

use crate::services::curves::CURVE_POINTS;

/// Upper bound of the growth-stage scale.
pub const MAX_STAGE_PERCENT: f64 = 200.0;

/// Percent spacing between two consecutive curve points.
const PERCENT_PER_POINT: f64 = 10.0;

/// A calendar month/day with no year, as printed in the chart feed (`MM/DD`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthDay {
    pub month: u32,
    pub day: u32,
}

impl MonthDay {
    /// Parse `MM/DD` (single-digit parts allowed). Returns `None` for
    /// anything that is not a real day of some year; 02/29 is accepted.
    pub fn parse(text: &str) -> Option<Self> {
        let (month, day) = text.trim().split_once('/')?;
        let month: u32 = month.trim().parse().ok()?;
        let day: u32 = day.trim().parse().ok()?;
        // 2000 is a leap year, so this validates every possible month/day.
        NaiveDate::from_ymd_opt(2000, month, day)?;
        Some(Self { month, day })
    }

    /// Place this month/day in `year`. `None` for 02/29 in a non-leap year.
    pub fn in_year(self, year: i32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.month, self.day)
    }
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{:02}", self.month, self.day)
    }
}

impl Serialize for MonthDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Planting, full-cover and termination dates of one crop at one station.
///
/// A date the feed did not supply (or supplied in an unreadable form) is
/// `None`; such a record produces no Kc.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PhenologyRecord {
    /// Crop code (e.g. "ALFP")
    pub crop_code: String,
    /// Planting / season start date, `MM/DD`
    #[schema(value_type = Option<String>, example = "04/01")]
    pub planting_date: Option<MonthDay>,
    /// Full cover date, `MM/DD`
    #[schema(value_type = Option<String>, example = "06/01")]
    pub full_cover_date: Option<MonthDay>,
    /// Termination date, `MM/DD`
    #[schema(value_type = Option<String>, example = "10/05")]
    pub termination_date: Option<MonthDay>,
}

impl PhenologyRecord {
    /// Resolve the three dates in `year`. `None` if any date is missing or
    /// does not exist in that year.
    pub fn season_in(&self, year: i32) -> Option<SeasonDates> {
        Some(SeasonDates {
            planting: self.planting_date?.in_year(year)?,
            full_cover: self.full_cover_date?.in_year(year)?,
            termination: self.termination_date?.in_year(year)?,
        })
    }
}

/// Phenology dates resolved into a concrete year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeasonDates {
    pub planting: NaiveDate,
    pub full_cover: NaiveDate,
    pub termination: NaiveDate,
}

impl SeasonDates {
    /// Days from planting to full cover (may be zero or negative).
    pub fn cover_days(&self) -> i64 {
        (self.full_cover - self.planting).num_days()
    }

    /// Days from full cover to termination (may be zero or negative).
    pub fn term_days(&self) -> i64 {
        (self.termination - self.full_cover).num_days()
    }
}

/// Growth-stage percent of `date` within `season`, clamped to `[0, 200]`.
///
/// Outside the season the percent is 0. A zero-length (or inverted) stage
/// contributes nothing: 0 before full cover, 100 after it.
pub fn stage_percent(date: NaiveDate, season: &SeasonDates) -> f64 {
    if date < season.planting || date > season.termination {
        return 0.0;
    }

    let percent = if date <= season.full_cover {
        let cover_days = season.cover_days();
        if cover_days > 0 {
            100.0 * (date - season.planting).num_days() as f64 / cover_days as f64
        } else {
            0.0
        }
    } else {
        let term_days = season.term_days();
        if term_days > 0 {
            100.0 + 100.0 * (date - season.full_cover).num_days() as f64 / term_days as f64
        } else {
            100.0
        }
    };

    percent.clamp(0.0, MAX_STAGE_PERCENT)
}

/// Linearly interpolate Kc from a 21-point curve at growth-stage `percent`.
///
/// Out-of-range (and NaN) percents are clamped first, so the result always
/// lies between two adjacent curve points. 0 and 200 return the end points
/// exactly.
pub fn interpolate_kc(coefficients: &[f64; CURVE_POINTS], percent: f64) -> f64 {
    let percent = if percent.is_nan() {
        0.0
    } else {
        percent.clamp(0.0, MAX_STAGE_PERCENT)
    };

    let idx_float = percent / PERCENT_PER_POINT;
    let idx_low = (idx_float.floor() as usize).min(CURVE_POINTS - 1);
    let idx_high = (idx_low + 1).min(CURVE_POINTS - 1);

    let kc_low = coefficients[idx_low];
    let kc_high = coefficients[idx_high];
    kc_low + (kc_high - kc_low) * (idx_float - idx_low as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alfp_curve() -> [f64; CURVE_POINTS] {
        [
            0.30, 0.30, 0.30, 0.30, 0.30, 0.60, 0.75, 0.90, 1.05, 1.15, 1.20, 1.15, 1.05, 0.90,
            0.75, 0.60, 0.40, 0.40, 0.40, 0.40, 0.40,
        ]
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn alfp_season_2024() -> SeasonDates {
        SeasonDates {
            planting: date(2024, 4, 1),
            full_cover: date(2024, 6, 1),
            termination: date(2024, 10, 5),
        }
    }

    #[test]
    fn test_month_day_parse() {
        assert_eq!(MonthDay::parse("04/01"), Some(MonthDay { month: 4, day: 1 }));
        assert_eq!(MonthDay::parse("4/1"), Some(MonthDay { month: 4, day: 1 }));
        assert_eq!(MonthDay::parse(" 10/05 "), Some(MonthDay { month: 10, day: 5 }));
        assert_eq!(MonthDay::parse("02/29"), Some(MonthDay { month: 2, day: 29 }));
    }

    #[test]
    fn test_month_day_parse_rejects_garbage() {
        assert_eq!(MonthDay::parse("13/01"), None);
        assert_eq!(MonthDay::parse("02/30"), None);
        assert_eq!(MonthDay::parse("0.34"), None);
        assert_eq!(MonthDay::parse("--/--"), None);
        assert_eq!(MonthDay::parse(""), None);
    }

    #[test]
    fn test_month_day_display() {
        assert_eq!(MonthDay { month: 6, day: 1 }.to_string(), "06/01");
    }

    #[test]
    fn test_leap_day_not_in_common_year() {
        let md = MonthDay { month: 2, day: 29 };
        assert_eq!(md.in_year(2024), Some(date(2024, 2, 29)));
        assert_eq!(md.in_year(2023), None);
    }

    #[test]
    fn test_season_in_requires_all_dates() {
        let record = PhenologyRecord {
            crop_code: "ALFP".to_string(),
            planting_date: MonthDay::parse("04/01"),
            full_cover_date: None,
            termination_date: MonthDay::parse("10/05"),
        };
        assert_eq!(record.season_in(2024), None);
    }

    #[test]
    fn test_season_uses_query_year() {
        let record = PhenologyRecord {
            crop_code: "ALFP".to_string(),
            planting_date: MonthDay::parse("04/01"),
            full_cover_date: MonthDay::parse("06/01"),
            termination_date: MonthDay::parse("10/05"),
        };
        let season = record.season_in(2024).unwrap();
        assert_eq!(season, alfp_season_2024());
        assert_eq!(season.cover_days(), 61);
        assert_eq!(season.term_days(), 126);
    }

    #[test]
    fn test_stage_percent_outside_season_is_zero() {
        let season = alfp_season_2024();
        assert_eq!(stage_percent(date(2024, 3, 31), &season), 0.0);
        assert_eq!(stage_percent(date(2024, 10, 6), &season), 0.0);
        assert_eq!(stage_percent(date(2024, 12, 31), &season), 0.0);
    }

    #[test]
    fn test_stage_percent_key_dates() {
        let season = alfp_season_2024();
        assert_eq!(stage_percent(date(2024, 4, 1), &season), 0.0);
        assert_eq!(stage_percent(date(2024, 6, 1), &season), 100.0);
        assert_eq!(stage_percent(date(2024, 10, 5), &season), 200.0);
    }

    #[test]
    fn test_stage_percent_after_full_cover() {
        // 30 days past full cover out of a 126-day second stage
        let pct = stage_percent(date(2024, 7, 1), &alfp_season_2024());
        assert!((pct - (100.0 + 100.0 * 30.0 / 126.0)).abs() < 1e-12);
        assert!((pct - 123.8).abs() < 0.05);
    }

    #[test]
    fn test_stage_percent_zero_cover_days() {
        let season = SeasonDates {
            planting: date(2024, 5, 1),
            full_cover: date(2024, 5, 1),
            termination: date(2024, 9, 1),
        };
        assert_eq!(stage_percent(date(2024, 5, 1), &season), 0.0);
        assert!(stage_percent(date(2024, 5, 2), &season) > 100.0);
    }

    #[test]
    fn test_stage_percent_zero_term_days() {
        let season = SeasonDates {
            planting: date(2024, 4, 1),
            full_cover: date(2024, 9, 1),
            termination: date(2024, 9, 1),
        };
        assert_eq!(stage_percent(date(2024, 9, 1), &season), 100.0);
        assert_eq!(stage_percent(date(2024, 8, 1), &season).round(), 80.0);
    }

    #[test]
    fn test_stage_percent_monotonic_within_season() {
        let season = alfp_season_2024();
        let mut day = season.planting;
        let mut previous = stage_percent(day, &season);
        while day < season.termination {
            day = day.succ_opt().unwrap();
            let pct = stage_percent(day, &season);
            assert!(pct >= previous, "percent dropped on {}", day);
            assert!((0.0..=MAX_STAGE_PERCENT).contains(&pct));
            previous = pct;
        }
    }

    #[test]
    fn test_interpolate_end_points_exact() {
        let curve = alfp_curve();
        assert_eq!(interpolate_kc(&curve, 0.0), curve[0]);
        assert_eq!(interpolate_kc(&curve, 200.0), curve[20]);
    }

    #[test]
    fn test_interpolate_on_curve_point() {
        let curve = alfp_curve();
        assert_eq!(interpolate_kc(&curve, 100.0), curve[10]);
        assert_eq!(interpolate_kc(&curve, 50.0), curve[5]);
    }

    #[test]
    fn test_interpolate_between_points() {
        let curve = alfp_curve();
        // halfway between 0.90 (70 %) and 1.05 (80 %)
        assert!((interpolate_kc(&curve, 75.0) - 0.975).abs() < 1e-12);
    }

    #[test]
    fn test_interpolate_clamps_out_of_range() {
        let curve = alfp_curve();
        assert_eq!(interpolate_kc(&curve, -15.0), curve[0]);
        assert_eq!(interpolate_kc(&curve, 250.0), curve[20]);
        assert_eq!(interpolate_kc(&curve, f64::NAN), curve[0]);
    }

    #[test]
    fn test_interpolate_stays_within_curve_bounds() {
        let curve = alfp_curve();
        let min = curve.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = curve.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        for step in 0..=2000 {
            let kc = interpolate_kc(&curve, step as f64 * 0.1);
            assert!(kc >= min - 1e-12 && kc <= max + 1e-12, "kc {} at {}", kc, step);
        }
    }

    #[test]
    fn test_end_to_end_alfp_example() {
        let curve = alfp_curve();
        let pct = stage_percent(date(2024, 7, 1), &alfp_season_2024());
        let kc = interpolate_kc(&curve, pct);
        // between index 12 (1.05) and 13 (0.90)
        assert!(kc < curve[12] && kc > curve[13]);
        let fraction = pct / 10.0 - 12.0;
        assert!((kc - (1.05 + (0.90 - 1.05) * fraction)).abs() < 1e-12);
    }
}
