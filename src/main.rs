use std::sync::Arc;

use anyhow::Result;
use tower::Service;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use class_booking_service::{
    adapters::database::{MemoryDatabase, SqliteDatabase},
    api::{self, AppState},
    auth::TokenIssuer,
    commands::{EnsureSuperAdmin, SharedLogic},
    config::{AppConfig, MEMORY_DATABASE},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "class_booking_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;

    let logic = if config.database.url == MEMORY_DATABASE {
        tracing::warn!("Using the in-memory store, data is lost on shutdown");
        SharedLogic::shared(Arc::new(MemoryDatabase::default()))
    } else {
        let database =
            SqliteDatabase::connect(&config.database.url, config.database.max_connections).await?;
        database.run_migrations().await?;
        SharedLogic::shared(Arc::new(database))
    }
    .with_refund_policy(config.booking.refund_policy());

    let created = logic
        .clone()
        .call(EnsureSuperAdmin {
            email: config.super_admin.email.clone(),
            name: config.super_admin.name.clone(),
            password: config.super_admin.password.clone(),
        })
        .await?;
    if created {
        tracing::info!(email = %config.super_admin.email, "Super admin account initialised");
    }

    let tokens = TokenIssuer::new(&config.auth.jwt_secret, config.auth.jwt_expiration_seconds);
    let app = api::router(AppState::new(logic, tokens), &config.server.prefix);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
