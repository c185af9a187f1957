//! Shared numeric helpers.
//!
//! Weather columns are stored as NUMERIC and read as `Decimal`; the crop ET
//! engine works in f64 and rounds its outputs to a fixed number of places.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Decimal places kept on Kc and ETc outputs.
pub(crate) const OUTPUT_DECIMAL_PLACES: i32 = 4;

/// Convert an Option<Decimal> to Option<f64>.
pub(crate) fn opt_dec_to_f64(d: Option<Decimal>) -> Option<f64> {
    d.and_then(|v| v.to_f64())
}

/// Round half away from zero to `places` decimal places.
///
/// Non-finite input is returned unchanged.
pub(crate) fn round_dp(v: f64, places: i32) -> f64 {
    if !v.is_finite() {
        return v;
    }
    let scale = 10f64.powi(places);
    (v * scale).round() / scale
}

/// Round an engine output to [`OUTPUT_DECIMAL_PLACES`].
pub(crate) fn round_output(v: f64) -> f64 {
    round_dp(v, OUTPUT_DECIMAL_PLACES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_opt_dec_to_f64() {
        assert_eq!(opt_dec_to_f64(None), None);
        let d = Decimal::from_str("0.314").unwrap();
        assert!((opt_dec_to_f64(Some(d)).unwrap() - 0.314).abs() < 1e-12);
    }

    #[test]
    fn test_round_dp() {
        assert_eq!(round_dp(1.23456, 4), 1.2346);
        assert_eq!(round_dp(0.33264, 4), 0.3326);
        assert_eq!(round_dp(-1.23455, 2), -1.23);
        assert_eq!(round_dp(2.0, 4), 2.0);
    }

    #[test]
    fn test_round_dp_non_finite() {
        assert!(round_dp(f64::NAN, 4).is_nan());
        assert_eq!(round_dp(f64::INFINITY, 4), f64::INFINITY);
    }

    #[test]
    fn test_round_output() {
        assert_eq!(round_output(0.123449), 0.1234);
        assert_eq!(round_output(0.12345678), 0.1235);
    }
}
