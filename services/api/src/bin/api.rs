//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        storage::AUDIO_URL_PREFIX, AudioStore, DbAdapter, ElevenLabsSpeechAdapter,
        OpenAiNarrativeAdapter, PlaceholderIllustrator,
    },
    config::Config,
    error::ApiError,
    seed::ensure_default_user,
    web::{self, jobs::JobQueue, AppState, StoryPipeline},
};
use async_openai::{config::OpenAIConfig, Client};
use axum::http::{header::CONTENT_TYPE, HeaderValue, Method};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    let default_user = ensure_default_user(
        db_adapter.as_ref(),
        &config.default_user_email,
        &config.default_user_password,
    )
    .await?;

    // --- 3. Initialize Service Adapters ---
    let google_api_key = config
        .google_api_key
        .as_ref()
        .ok_or_else(|| ApiError::Internal("GOOGLE_API_KEY is required".to_string()))?;
    let narrative_client = Client::with_config(
        OpenAIConfig::new()
            .with_api_key(google_api_key)
            .with_api_base(&config.narrative_api_base),
    );
    let narrative_adapter = Arc::new(OpenAiNarrativeAdapter::new(
        narrative_client,
        config.narrative_model.clone(),
    ));

    let elevenlabs_api_key = config
        .elevenlabs_api_key
        .as_ref()
        .ok_or_else(|| ApiError::Internal("ELEVENLABS_API_KEY is required".to_string()))?;
    let audio_store = AudioStore::new(config.audio_dir(), AUDIO_URL_PREFIX)?;
    let speech_adapter = Arc::new(ElevenLabsSpeechAdapter::new(
        reqwest::Client::new(),
        &config.elevenlabs_api_base,
        elevenlabs_api_key,
        &config.tts_model,
        audio_store,
    ));

    let pipeline = StoryPipeline {
        db: db_adapter,
        narrative: narrative_adapter,
        illustrator: Arc::new(PlaceholderIllustrator::default()),
        speech: speech_adapter,
        default_voice_id: config.default_voice_id.clone(),
    };

    // --- 4. Start Job Workers & Build the Shared AppState ---
    let shutdown = CancellationToken::new();
    let jobs = Arc::new(JobQueue::start(
        pipeline.clone(),
        config.job_workers,
        config.job_retention,
        shutdown.clone(),
    ));
    let app_state = Arc::new(AppState {
        pipeline,
        jobs,
        default_user_id: default_user.id,
    });

    let cors_origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    // --- 5. Create the Web Router ---
    let app = web::router(app_state, &config.static_dir)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    let worker_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            worker_shutdown.cancel();
        })
        .await?;

    Ok(())
}
