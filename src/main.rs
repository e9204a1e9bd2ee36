// Kisan Sarthi API v0.1
use axum::{
    routing::{get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod auth;
mod config;
mod db;
mod errors;
mod helpers;
mod routes;
mod services;

use config::AppConfig;
use routes::AppState;
use services::generator::GeneratorClient;
use services::predictor::{CategoricalEncodings, Predictor};
use services::recommend::Recommender;
use services::scraper::PageScraper;
use services::weather::WeatherClient;

/// Maximum number of connections in the database pool.
const DB_POOL_MAX_CONNECTIONS: u32 = 10;
/// Minimum number of connections kept alive in the database pool.
const DB_POOL_MIN_CONNECTIONS: u32 = 2;
/// Per-page timeout for product-page scraping.
const SCRAPE_TIMEOUT: Duration = Duration::from_secs(10);

/// Kisan Sarthi API: OpenAPI document.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Kisan Sarthi API",
        version = "0.1.0",
        description = "Farm management backend. Tracks farms, land plots, soil-sensor \
            devices and their readings, and produces crop and fertilizer recommendations \
            from the latest soil data, local weather, two trained classifiers and a \
            text-generation model.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Users", description = "Registration and login"),
        (name = "Farms", description = "Farm management"),
        (name = "Lands", description = "Land plots within a farm"),
        (name = "Devices", description = "Soil-sensor registry and land assignment"),
        (name = "Soil readings", description = "Device ingestion and reading history"),
        (name = "Plantings", description = "Crops planted on land plots"),
        (name = "Reference", description = "Crops, fertilizers and diseases"),
        (name = "Recommendations", description = "Crop and fertilizer recommendations"),
    ),
    paths(
        routes::health::health_check,
        routes::auth::register,
        routes::auth::login,
        routes::auth::me,
        routes::auth::update_me,
        routes::farms::create_farm,
        routes::farms::list_farms,
        routes::farms::get_farm,
        routes::farms::update_farm,
        routes::farms::delete_farm,
        routes::farms::create_land,
        routes::farms::list_lands,
        routes::farms::get_land,
        routes::farms::update_land,
        routes::farms::delete_land,
        routes::devices::register_device,
        routes::devices::list_farm_devices,
        routes::devices::get_device,
        routes::devices::update_device,
        routes::devices::update_assignment,
        routes::devices::delete_device,
        routes::readings::ingest_reading,
        routes::readings::list_land_readings,
        routes::plantings::start_planting,
        routes::plantings::get_planting,
        routes::plantings::update_planting,
        routes::reference::list_crops,
        routes::reference::list_fertilizers,
        routes::reference::list_diseases,
        routes::recommendations::crop_suggestions_for_land,
        routes::recommendations::fertilizer_recommendations_for_land,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            routes::health::ModelStatus,
            services::predictor::ModelKind,
            routes::auth::RegisterRequest,
            routes::auth::LoginRequest,
            routes::auth::UpdateUserRequest,
            routes::auth::UserResponse,
            routes::auth::LoginResponse,
            routes::farms::CreateFarmRequest,
            routes::farms::UpdateFarmRequest,
            routes::farms::FarmResponse,
            routes::farms::CreateLandRequest,
            routes::farms::UpdateLandRequest,
            routes::farms::LandResponse,
            routes::farms::LandDetailResponse,
            routes::farms::CurrentPlanting,
            routes::farms::CropRef,
            routes::farms::AssignedDevice,
            routes::devices::RegisterDeviceRequest,
            routes::devices::UpdateDeviceRequest,
            routes::devices::AssignmentRequest,
            routes::devices::DeviceResponse,
            db::models::DeviceStatus,
            services::ingest::ReadingPayload,
            routes::readings::IngestResponse,
            routes::readings::SoilReadingResponse,
            routes::plantings::StartPlantingRequest,
            routes::plantings::UpdatePlantingRequest,
            routes::plantings::PlantingResponse,
            db::models::PlantingStatus,
            routes::reference::CropResponse,
            routes::reference::FertilizerResponse,
            routes::reference::DiseaseResponse,
            routes::recommendations::CropSuggestion,
            routes::recommendations::CropSuggestionsResponse,
            routes::recommendations::FertilizerRecommendation,
            routes::recommendations::FertilizerRecommendationsResponse,
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
                .unwrap_or_else(|_| "kisan_sarthi_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();

    // Models are required by the recommendation endpoints; refuse to start without them.
    let encodings = CategoricalEncodings::load(&config.encodings_path)
        .expect("Failed to load categorical encodings");
    let predictor = Predictor::load(&config.model_dir, encodings)
        .expect("Failed to load prediction models");

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

    if config.gen_api_key.is_empty() {
        tracing::warn!("GEN_API_KEY not set; recommendation endpoints will return 502");
    }
    if config.weather_api_key.is_empty() {
        tracing::warn!("WEATHER_API_KEY not set; readings without climate data cannot be used");
    }
    if !config.fertilizer_source_urls.is_empty() {
        tracing::info!(
            "Scraping {} fertilizer source pages per recommendation",
            config.fertilizer_source_urls.len()
        );
    }

    let recommender = Recommender {
        pool: pool.clone(),
        weather: WeatherClient::new(&config.weather_api_url, &config.weather_api_key),
        generator: GeneratorClient::new(
            &config.gen_api_url,
            &config.gen_model,
            &config.gen_api_key,
            config.gen_timeout,
        ),
        predictor: Arc::new(predictor),
        scraper: PageScraper::new(SCRAPE_TIMEOUT),
        default_location: config.default_location.clone(),
        fertilizer_sources: config.fertilizer_source_urls.clone(),
    };

    // Build shared application state
    let app_state = AppState {
        pool: pool.clone(),
        recommender,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    // CRUD routes use PgPool state directly; health and recommendations use AppState.
    let user_routes = Router::new()
        .route("/api/v1/auth/register", post(routes::auth::register))
        .route("/api/v1/auth/login", post(routes::auth::login))
        .route(
            "/api/v1/users/me",
            get(routes::auth::me).put(routes::auth::update_me),
        )
        .with_state(pool.clone());

    let farm_routes = Router::new()
        .route(
            "/api/v1/farms",
            get(routes::farms::list_farms).post(routes::farms::create_farm),
        )
        .route(
            "/api/v1/farms/:id",
            get(routes::farms::get_farm)
                .put(routes::farms::update_farm)
                .delete(routes::farms::delete_farm),
        )
        .route(
            "/api/v1/farms/:id/lands",
            get(routes::farms::list_lands).post(routes::farms::create_land),
        )
        .route(
            "/api/v1/farms/:id/devices",
            get(routes::devices::list_farm_devices),
        )
        .route(
            "/api/v1/lands/:id",
            get(routes::farms::get_land)
                .put(routes::farms::update_land)
                .delete(routes::farms::delete_land),
        )
        .route(
            "/api/v1/lands/:id/soil-readings",
            get(routes::readings::list_land_readings),
        )
        .route(
            "/api/v1/lands/:id/plantings",
            post(routes::plantings::start_planting),
        )
        .route(
            "/api/v1/plantings/:id",
            get(routes::plantings::get_planting).put(routes::plantings::update_planting),
        )
        .with_state(pool.clone());

    let device_routes = Router::new()
        .route("/api/v1/devices", post(routes::devices::register_device))
        .route(
            "/api/v1/devices/:id",
            get(routes::devices::get_device)
                .patch(routes::devices::update_device)
                .delete(routes::devices::delete_device),
        )
        .route(
            "/api/v1/devices/:id/assignment",
            put(routes::devices::update_assignment),
        )
        .route("/api/v1/soil-readings", post(routes::readings::ingest_reading))
        .with_state(pool.clone());

    let reference_routes = Router::new()
        .route("/api/v1/crops", get(routes::reference::list_crops))
        .route("/api/v1/fertilizers", get(routes::reference::list_fertilizers))
        .route("/api/v1/diseases", get(routes::reference::list_diseases))
        .with_state(pool);

    let recommendation_routes = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route(
            "/api/v1/lands/:id/crop-suggestions",
            get(routes::recommendations::crop_suggestions_for_land),
        )
        .route(
            "/api/v1/lands/:id/fertilizer-recommendations",
            get(routes::recommendations::fertilizer_recommendations_for_land),
        )
        .with_state(app_state);

    let app = Router::new()
        .merge(user_routes)
        .merge(farm_routes)
        .merge(device_routes)
        .merge(reference_routes)
        .merge(recommendation_routes)
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
