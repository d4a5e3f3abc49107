mod auth;
mod config;
mod db;
mod error;
mod models;
mod routes;
mod services;

use std::net::SocketAddr;

use anyhow::Context;
use auth::token::TokenSigner;
use axum::http::{header, HeaderValue, Method};
use config::Config;
use routes::{create_router, AppState};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (from repo root)
    dotenvy::from_filename("../../.env").ok();
    dotenvy::dotenv().ok();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("shopcart_server=debug,tower_http=debug"));
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = Config::from_env()?;
    let port = config.server_port;

    // Create database pool and run migrations
    let pool = db::create_pool(&config.sqlite_path, config.db_pool_size, config.store_timeout)?;
    tracing::info!("Database initialized at {}", config.sqlite_path);

    let state = AppState {
        db: pool,
        tokens: TokenSigner::new(&config.token_secret),
        config: config.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .cors_origin
                .parse::<HeaderValue>()
                .context("CORS_ORIGIN must be a valid header value")?,
        )
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("shopcart-server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    // Rate limiting keys on the peer address.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server failed")?;

    Ok(())
}
