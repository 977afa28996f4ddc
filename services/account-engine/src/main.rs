use account_engine::{
    config::Config,
    database::Database,
    exchange::{CachedRateSource, ExchangeRateClient, RateTableSource},
    handlers,
    services::AccountService,
};
use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use dotenv::dotenv;
use redis::aio::ConnectionManager;
use std::io;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

fn startup_error(context: &str, err: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv().ok();

    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .json()
        .init();

    let config = Config::from_env().map_err(|e| startup_error("Failed to load configuration", e))?;
    config
        .validate()
        .map_err(|e| startup_error("Invalid configuration", e))?;

    info!("Starting Account Engine on port {}", config.server.port);

    let db = Database::new(
        &config.database.url,
        config.database.max_connections,
        config.database.min_connections,
    )
    .await
    .map_err(|e| startup_error("Failed to connect to database", e))?;
    db.setup_schema()
        .await
        .map_err(|e| startup_error("Failed to prepare schema", e))?;

    let client = ExchangeRateClient::new(
        config.exchange.base_url.clone(),
        config.exchange.api_key.clone(),
        config.exchange.timeout_secs,
    )
    .map_err(|e| startup_error("Failed to build exchange rate client", e))?;

    let rates: Arc<dyn RateTableSource> = match config.redis.enabled_url() {
        Some(url) => {
            let redis_client =
                redis::Client::open(url).map_err(|e| startup_error("Failed to create Redis client", e))?;
            let redis_conn = ConnectionManager::new(redis_client)
                .await
                .map_err(|e| startup_error("Failed to connect to Redis", e))?;
            info!("Caching rate tables for {}s", config.redis.rate_ttl_secs);
            Arc::new(CachedRateSource::new(client, redis_conn, config.redis.rate_ttl_secs))
        }
        None => {
            warn!("Redis not configured, rate tables are fetched on every conversion");
            Arc::new(client)
        }
    };

    let account_service = Arc::new(AccountService::new(
        Arc::new(db),
        rates,
        config.pagination,
    ));

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .app_data(web::Data::new(account_service.clone()))
            .configure(handlers::configure_routes)
    })
    .workers(config.server.workers)
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await
}
