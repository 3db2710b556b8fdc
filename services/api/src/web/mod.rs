pub mod jobs;
pub mod rest;
pub mod state;
pub mod story_task;

pub use rest::ApiDoc;
pub use state::AppState;
pub use story_task::StoryPipeline;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::{path::Path, sync::Arc};
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Builds the complete application router: REST API, static media and Swagger UI.
///
/// Cross-cutting layers (CORS, tracing) are added by the binary.
pub fn router(app_state: Arc<AppState>, static_dir: &Path) -> Router {
    let api_router = Router::new()
        .route("/", get(rest::root_handler))
        .route(
            "/stories",
            post(rest::create_story_handler).get(rest::list_stories_handler),
        )
        .route(
            "/stories/",
            post(rest::create_story_handler).get(rest::list_stories_handler),
        )
        .route("/stories/jobs", post(rest::submit_story_job_handler))
        .route(
            "/stories/{story_id}",
            get(rest::get_story_handler).delete(rest::delete_story_handler),
        )
        .route(
            "/stories/{story_id}/generate-audio",
            post(rest::generate_audio_handler),
        )
        .route(
            "/stories/{story_id}/generate-audio/jobs",
            post(rest::submit_audio_job_handler),
        )
        .route("/jobs/{job_id}", get(rest::get_job_handler))
        .route("/voices", get(rest::list_voices_handler))
        .route(
            "/voice-profiles",
            get(rest::list_voice_profiles_handler).post(rest::create_voice_profile_handler),
        )
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .with_state(app_state);

    // Merge the API router with static media and the Swagger UI router for a complete application.
    Router::new()
        .merge(api_router)
        .nest_service("/static", ServeDir::new(static_dir))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
