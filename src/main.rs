//! Miniblog - A small multi-user blog backend

use anyhow::Result;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use miniblog::{
    api::{self, AppState},
    config::Config,
    db::{
        self,
        repositories::{ArticleRepository, SqlxArticleRepository},
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "miniblog=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting miniblog...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!(applied, "Database migrations completed");

    // Stored like counters may drift if the like table was edited by hand
    let repaired = SqlxArticleRepository::new(pool.clone())
        .sync_like_counts()
        .await?;
    if repaired > 0 {
        tracing::warn!(repaired, "Repaired stale article like counts");
    }

    let state = AppState::build(pool, &config);

    // Expired session sweep
    {
        let user_service = state.user_service.clone();
        let every = config.auth.session_cleanup_interval_secs.max(1);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(every));
            loop {
                interval.tick().await;
                if let Err(e) = user_service.cleanup_expired_sessions().await {
                    tracing::warn!("Session cleanup failed: {}", e);
                }
            }
        });
    }

    // Build router
    let app = api::build_router(state, &config.server.cors_origin);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
