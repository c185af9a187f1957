// AgriMet Crop ET API v0.1
use axum::{
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod db;
mod errors;
mod helpers;
mod routes;
mod services;

use config::AppConfig;
use routes::AppState;
use services::chart::ChartClient;
use services::curves::{CurveSet, CurveStore};

/// Maximum number of connections in the database pool.
const DB_POOL_MAX_CONNECTIONS: u32 = 5;
/// Minimum number of connections kept alive in the database pool.
const DB_POOL_MIN_CONNECTIONS: u32 = 2;

/// OpenAPI document for the AgriMet Crop ET API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "AgriMet Crop ET API",
        version = "0.1.0",
        description = "Daily crop coefficient (Kc) and crop evapotranspiration (ETc) for \
            AgriMet weather stations. Combines the AgriMet 21-point crop coefficient \
            curves, per-station planting / full cover / termination dates from the \
            station crop water use charts, and daily ETrs from station weather records.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Curves", description = "Crop coefficient curves"),
        (name = "AgriMet", description = "Station charts and crop ET"),
    ),
    paths(
        routes::health::health_check,
        routes::curves::list_curves,
        routes::curves::search_curves,
        routes::curves::get_curve,
        routes::curves::get_curve_by_number,
        routes::curves::get_curve_periods,
        routes::curves::get_table_coefficients,
        routes::curves::reload_curves,
        routes::agrimet::get_crop_dates,
        routes::agrimet::get_station_crop_info,
        routes::agrimet::get_crop_et,
        routes::agrimet::get_cwu_chart_data,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            routes::curves::CurveListResponse,
            routes::curves::CurveResponse,
            routes::curves::SearchResponse,
            routes::curves::PeriodResponse,
            routes::curves::TableCoefficientsResponse,
            routes::curves::ReloadResponse,
            routes::agrimet::CropDatesResponse,
            routes::agrimet::StationCropInfoResponse,
            routes::agrimet::CropEtResponse,
            routes::agrimet::CwuChartResponse,
            services::curves::ParseWarning,
            services::growth::PhenologyRecord,
            services::chart::CropDates,
            services::chart::StationCrop,
            services::chart::StationCropReport,
            services::crop_et::CropEt,
            services::crop_et::CropEtResult,
            services::crop_et::CropWaterUseReport,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agrimet_et_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();

    // Set up database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(DB_POOL_MAX_CONNECTIONS)
        .min_connections(DB_POOL_MIN_CONNECTIONS)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations completed");

    // Load crop coefficient curves and mirror them into the database.
    // Without the file, fall back to the last exported table.
    let curve_set = match services::curves::load_curve_file(&config.crop_coefficients_path) {
        Ok(set) => {
            if let Err(e) = services::curve_table::export_curves(&pool, &set).await {
                tracing::error!("Failed to export crop coefficient curves: {}", e);
            }
            set
        }
        Err(e) => {
            tracing::error!("Failed to load crop coefficient curves: {}", e);
            services::curve_table::load_table_snapshot(&pool)
                .await
                .unwrap_or_else(|e| {
                    tracing::error!("Failed to read crop coefficients table: {}", e);
                    CurveSet::default()
                })
        }
    };
    if curve_set.is_empty() {
        tracing::warn!("No crop coefficient curves available");
    }

    let app_state = AppState {
        pool,
        chart: ChartClient::new(
            &config.agrimet_chart_url,
            &config.agrimet_user_agent,
            config.feed_timeout,
        ),
        curves: Arc::new(CurveStore::new(curve_set)),
        curve_path: config.crop_coefficients_path.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/curves", get(routes::curves::list_curves))
        .route("/api/v1/curves/search", get(routes::curves::search_curves))
        .route("/api/v1/curves/reload", post(routes::curves::reload_curves))
        .route(
            "/api/v1/curves/number/:curve_number",
            get(routes::curves::get_curve_by_number),
        )
        .route("/api/v1/curves/:crop_code", get(routes::curves::get_curve))
        .route(
            "/api/v1/curves/:crop_code/periods",
            get(routes::curves::get_curve_periods),
        )
        .route(
            "/api/v1/curves/:crop_code/table",
            get(routes::curves::get_table_coefficients),
        )
        .route(
            "/api/v1/agrimet/crop_dates",
            get(routes::agrimet::get_crop_dates),
        )
        .route(
            "/api/v1/agrimet/station_crop_info",
            get(routes::agrimet::get_station_crop_info),
        )
        .route("/api/v1/agrimet/crop_et", get(routes::agrimet::get_crop_et))
        .route(
            "/api/v1/agrimet/cwu_chart_data",
            get(routes::agrimet::get_cwu_chart_data),
        )
        .with_state(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}
