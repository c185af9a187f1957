//! Durable mirror of the in-memory curve snapshot in `crop_coefficients`.

use std::collections::HashMap;

use sqlx::PgPool;

use crate::db::queries;
use crate::errors::AppError;
use crate::services::curves::{CoefficientCurve, CurveError, CurveSet, CURVE_POINTS};

/// Replace the table contents with `set`. Returns the number of rows written.
pub async fn export_curves(pool: &PgPool, set: &CurveSet) -> Result<u64, AppError> {
    let written = queries::replace_crop_coefficients(pool, set.iter()).await?;
    tracing::info!("Exported {} crop coefficient curves to database", written);
    Ok(written)
}

/// Rebuild a snapshot from the table, for when the curve file is unavailable.
pub async fn load_table_snapshot(pool: &PgPool) -> Result<CurveSet, AppError> {
    let rows = queries::list_crop_coefficients(pool).await?;
    let set = CurveSet::from_curves(rows.into_iter().map(|row| CoefficientCurve {
        curve_number: row.curve_number,
        crop_code: row.crop_code,
        coefficients: row.coefficients,
        description: row.description,
    }));
    tracing::info!("Loaded {} crop coefficient curves from database", set.len());
    Ok(set)
}

async fn missing_crop(pool: &PgPool, crop_code: &str) -> AppError {
    match queries::list_crop_coefficient_codes(pool).await {
        Ok(available) => CurveError::CropNotFound {
            crop_code: crop_code.to_string(),
            available,
        }
        .into(),
        Err(e) => e.into(),
    }
}

/// One crop's 21 coefficients as stored in the table.
pub async fn table_coefficients(
    pool: &PgPool,
    crop_code: &str,
) -> Result<[f64; CURVE_POINTS], AppError> {
    match queries::get_crop_coefficients(pool, crop_code).await? {
        Some(row) => Ok(row.coefficients),
        None => Err(missing_crop(pool, crop_code).await),
    }
}

/// Coefficients for `crop_codes` read from the table in one query, keyed by
/// crop code. Fails on the first code the table does not hold.
pub async fn table_curves(
    pool: &PgPool,
    crop_codes: &[String],
) -> Result<HashMap<String, [f64; CURVE_POINTS]>, AppError> {
    let rows = queries::get_crop_coefficients_for(pool, crop_codes).await?;
    let curves: HashMap<String, [f64; CURVE_POINTS]> = rows
        .into_iter()
        .map(|row| (row.crop_code, row.coefficients))
        .collect();

    if let Some(missing) = crop_codes.iter().find(|code| !curves.contains_key(*code)) {
        return Err(missing_crop(pool, missing).await);
    }
    Ok(curves)
}
