// src/main.rs
use std::net::SocketAddr;
use std::sync::Arc;

use dotenvy::dotenv;
use http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use poll_analytics::config::{Config, StoreBackend};
use poll_analytics::state::AppState;
use poll_analytics::store::{postgres, EventStore, MemoryStore, PollStore};
use poll_analytics::{db, routes};

#[tokio::main]
async fn main() {
    dotenv().ok(); // Load environment variables from .env file

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let (events, polls) = match build_stores(&config).await {
        Ok(stores) => stores,
        Err(e) => {
            error!("Failed to initialize storage: {}", e);
            std::process::exit(1);
        }
    };

    let cors = match cors_layer(config.cors_origin.as_deref()) {
        Ok(cors) => cors,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let state = AppState::new(events, polls, config.max_timeframe_days);
    let app = routes::create_routes(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Analytics service listening on http://{}", addr);

    if let Err(e) = axum_server::bind(addr).serve(app.into_make_service()).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn build_stores(
    config: &Config,
) -> Result<(Arc<dyn EventStore>, Arc<dyn PollStore>), Box<dyn std::error::Error>> {
    match config.store_backend {
        StoreBackend::Memory => {
            info!("Using in-memory store");
            let store = match &config.memory_seed_path {
                Some(path) => MemoryStore::load_seed(path).await?,
                None => MemoryStore::new(),
            };
            let store = Arc::new(store);
            let events: Arc<dyn EventStore> = store.clone();
            let polls: Arc<dyn PollStore> = store;
            Ok((events, polls))
        }
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or("DATABASE_URL must be set")?;
            let pool = db::create_pool(database_url, config.max_connections).await?;
            let events = postgres::detect_event_store(&pool).await?;
            let polls: Arc<dyn PollStore> = Arc::new(postgres::PgPollStore::new(pool));
            Ok((events, polls))
        }
    }
}

fn cors_layer(origin: Option<&str>) -> Result<CorsLayer, String> {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    match origin {
        Some(origin) => {
            let origin = origin
                .parse::<HeaderValue>()
                .map_err(|_| format!("Failed to parse CORS origin: {}", origin))?;
            Ok(cors.allow_origin(origin))
        }
        None => Ok(cors.allow_origin(Any)),
    }
}
