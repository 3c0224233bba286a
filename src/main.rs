use axum::Router;
use axum::http::HeaderValue;
use phantomtalk::{
    AppState, Config, files::FileStore, messages, registry::ConnectionRegistry, relay::Relay,
    sweeper,
};
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(&config.database_url)
        .await?;
    messages::store::init(&db_pool).await?;

    let files = FileStore::new(&config.upload_dir);
    files.init().await?;

    let registry = ConnectionRegistry::new();
    let relay = Relay::new(config.webhook_url.clone());

    tokio::spawn(sweeper::run_expiration(
        db_pool.clone(),
        files.clone(),
        registry.clone(),
        config.sweep_interval,
    ));
    tokio::spawn(sweeper::run_reset(
        db_pool.clone(),
        files.clone(),
        registry.clone(),
        config.reset_interval,
    ));

    let app_state = AppState {
        db_pool,
        files,
        registry,
        relay,
    };

    let cors = if config.cors_origins.iter().any(|origin| origin == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let app = Router::new()
        .nest("/api", messages::router())
        .with_state(app_state)
        .layer(cors);

    tracing::info!(addr = %config.bind_addr, "phantomtalk listening");
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
