use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use encore_api::{
    api::{create_router, AppState},
    config::Config,
    db::{create_pool, PgStore},
    services::{
        providers::{
            spotify::SpotifyProvider, AuthProvider, FeedbackWriter, MetadataProvider,
            StorageProvider,
        },
        RecommendationPipeline,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!().run(&pool).await?;

    let store = Arc::new(PgStore::new(pool));
    let auth: Arc<dyn AuthProvider> = store.clone();
    let storage: Arc<dyn StorageProvider> = store.clone();
    let feedback: Arc<dyn FeedbackWriter> = store;

    let metadata: Arc<dyn MetadataProvider> = Arc::new(SpotifyProvider::new(
        config.spotify_client_id.clone(),
        config.spotify_client_secret.clone(),
        config.spotify_api_url.clone(),
        config.spotify_token_url.clone(),
    ));

    let pipeline = Arc::new(RecommendationPipeline::new(
        auth.clone(),
        storage,
        metadata,
        config.feedback_limit,
        config.pool_limit,
    ));

    let state = AppState::new(pipeline, auth, feedback, config.recommendation_limit);
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
