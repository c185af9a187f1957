use sqlx::{PgPool, Postgres, QueryBuilder};

use super::models::{coefficient_column, CropCoefficientRow, DailyWeatherRecord};
use crate::services::curves::{CoefficientCurve, CURVE_POINTS};

fn coefficient_columns() -> String {
    (1..=CURVE_POINTS)
        .map(coefficient_column)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Replace the whole `crop_coefficients` table with `curves`.
///
/// Runs in one transaction, so readers never see a partially written table.
pub async fn replace_crop_coefficients<'a>(
    pool: &PgPool,
    curves: impl IntoIterator<Item = &'a CoefficientCurve>,
) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM crop_coefficients")
        .execute(&mut *tx)
        .await?;

    let insert = format!(
        "INSERT INTO crop_coefficients (crop_code, curve_number, description, {})
         VALUES ($1, $2, $3, {})",
        coefficient_columns(),
        (4..4 + CURVE_POINTS)
            .map(|i| format!("${}", i))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut written = 0;
    for curve in curves {
        let mut query = sqlx::query(&insert)
            .bind(&curve.crop_code)
            .bind(curve.curve_number)
            .bind(&curve.description);
        for value in curve.coefficients {
            query = query.bind(value);
        }
        written += query.execute(&mut *tx).await?.rows_affected();
    }

    tx.commit().await?;
    Ok(written)
}

/// Get a single crop's row from the durable mirror.
pub async fn get_crop_coefficients(
    pool: &PgPool,
    crop_code: &str,
) -> Result<Option<CropCoefficientRow>, sqlx::Error> {
    let sql = format!(
        "SELECT crop_code, curve_number, description, {}
         FROM crop_coefficients WHERE crop_code = $1",
        coefficient_columns()
    );
    sqlx::query_as::<_, CropCoefficientRow>(&sql)
        .bind(crop_code)
        .fetch_optional(pool)
        .await
}

/// Every row of the durable mirror, by curve number.
pub async fn list_crop_coefficients(pool: &PgPool) -> Result<Vec<CropCoefficientRow>, sqlx::Error> {
    let sql = format!(
        "SELECT crop_code, curve_number, description, {}
         FROM crop_coefficients ORDER BY curve_number",
        coefficient_columns()
    );
    sqlx::query_as::<_, CropCoefficientRow>(&sql)
        .fetch_all(pool)
        .await
}

/// Get the rows for a set of crop codes. Unknown codes are simply absent.
pub async fn get_crop_coefficients_for(
    pool: &PgPool,
    crop_codes: &[String],
) -> Result<Vec<CropCoefficientRow>, sqlx::Error> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "SELECT crop_code, curve_number, description, {} FROM crop_coefficients WHERE crop_code = ANY(",
        coefficient_columns()
    ));
    builder.push_bind(crop_codes).push(")");
    builder
        .build_query_as::<CropCoefficientRow>()
        .fetch_all(pool)
        .await
}

/// All crop codes present in the durable mirror, sorted.
pub async fn list_crop_coefficient_codes(pool: &PgPool) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT crop_code FROM crop_coefficients ORDER BY crop_code")
        .fetch_all(pool)
        .await
}

/// Daily weather rows for a station in an inclusive `YYYY-MM-DD` range.
pub async fn get_daily_climate_data(
    pool: &PgPool,
    station: &str,
    start_date: &str,
    end_date: &str,
) -> Result<Vec<DailyWeatherRecord>, sqlx::Error> {
    sqlx::query_as::<_, DailyWeatherRecord>(
        "SELECT station, date, et, etrs, etos, mn, mx, mm, pp, pu, sr, ta, tg, ym, ua, ud, wg, wr
         FROM daily_climate_data
         WHERE LOWER(station) = LOWER($1) AND date BETWEEN $2 AND $3
         ORDER BY date ASC",
    )
    .bind(station)
    .bind(start_date)
    .bind(end_date)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coefficient_columns() {
        let columns = coefficient_columns();
        assert!(columns.starts_with("p1, p2, "));
        assert!(columns.ends_with("p20, p21"));
        assert_eq!(columns.split(", ").count(), CURVE_POINTS);
    }
}
