//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::{
    error::ApiError,
    web::{
        jobs::{JobKind, JobSnapshot},
        state::AppState,
    },
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storybook_core::{
    domain::{Alignment, Page, ProviderVoice, Story, VoiceProfile},
    ports::PortError,
};
use tracing::{info, warn};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        root_handler,
        create_story_handler,
        list_stories_handler,
        get_story_handler,
        delete_story_handler,
        generate_audio_handler,
        submit_story_job_handler,
        submit_audio_job_handler,
        get_job_handler,
        list_voices_handler,
        list_voice_profiles_handler,
        create_voice_profile_handler,
    ),
    components(
        schemas(
            CreateStoryRequest,
            StoryResponse,
            PageResponse,
            AlignmentResponse,
            JobResponse,
            VoiceResponse,
            VoiceProfileResponse,
            CreateVoiceProfileRequest,
        )
    ),
    tags(
        (name = "Storybook API", description = "Generated, illustrated and narrated children's stories.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateStoryRequest {
    pub theme: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl CreateStoryRequest {
    fn validated_theme(&self) -> Result<&str, ApiError> {
        let theme = self.theme.trim();
        if theme.is_empty() {
            return Err(ApiError::BadRequest("theme must not be empty".to_string()));
        }
        Ok(theme)
    }
}

/// Per-character timing; the three arrays always have the same length.
#[derive(Serialize, ToSchema)]
pub struct AlignmentResponse {
    pub characters: Vec<String>,
    pub character_start_times_seconds: Vec<f64>,
    pub character_end_times_seconds: Vec<f64>,
}

impl From<Alignment> for AlignmentResponse {
    fn from(alignment: Alignment) -> Self {
        let (characters, starts, ends) = alignment.into_parts();
        Self {
            characters,
            character_start_times_seconds: starts,
            character_end_times_seconds: ends,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PageResponse {
    pub id: Uuid,
    pub story_id: Uuid,
    pub page_number: i32,
    pub text_content: String,
    pub image_url: Option<String>,
    pub audio_url: Option<String>,
    pub alignment_data: Option<AlignmentResponse>,
}

impl From<Page> for PageResponse {
    fn from(page: Page) -> Self {
        Self {
            id: page.id,
            story_id: page.story_id,
            page_number: page.page_number,
            text_content: page.text_content,
            image_url: page.image_url,
            audio_url: page.audio_url,
            alignment_data: page.alignment.map(AlignmentResponse::from),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct StoryResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub theme: String,
    pub created_at: DateTime<Utc>,
    pub pages: Vec<PageResponse>,
}

impl From<Story> for StoryResponse {
    fn from(story: Story) -> Self {
        Self {
            id: story.id,
            user_id: story.user_id,
            title: story.title,
            theme: story.theme,
            created_at: story.created_at,
            pages: story.pages.into_iter().map(PageResponse::from).collect(),
        }
    }
}

/// A background job as seen by the client.
#[derive(Serialize, ToSchema)]
pub struct JobResponse {
    pub job_id: Uuid,
    pub kind: String,
    pub story_id: Uuid,
    /// One of `pending`, `running`, `completed`, `failed`.
    pub status: String,
    pub warnings: Vec<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<JobSnapshot> for JobResponse {
    fn from(job: JobSnapshot) -> Self {
        Self {
            job_id: job.id,
            kind: job.kind.name().to_string(),
            story_id: job.kind.story_id(),
            status: job.status.as_str().to_string(),
            warnings: job.warnings,
            error: job.error,
            created_at: job.created_at,
            finished_at: job.finished_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct VoiceResponse {
    pub voice_id: String,
    pub name: String,
}

impl From<ProviderVoice> for VoiceResponse {
    fn from(voice: ProviderVoice) -> Self {
        Self {
            voice_id: voice.voice_id,
            name: voice.name,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateVoiceProfileRequest {
    pub name: String,
    pub voice_id: String,
}

#[derive(Serialize, ToSchema)]
pub struct VoiceProfileResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub voice_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<VoiceProfile> for VoiceProfileResponse {
    fn from(profile: VoiceProfile) -> Self {
        Self {
            id: profile.id,
            user_id: profile.user_id,
            name: profile.name,
            voice_id: profile.provider_voice_id,
            created_at: profile.created_at,
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Service greeting"))
)]
pub async fn root_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Welcome to the Storybook API" }))
}

/// Create a story and generate its pages before responding.
///
/// The request blocks until the text and every illustration are ready. Audio
/// fields are left empty; see `/stories/{story_id}/generate-audio`.
#[utoipa::path(
    post,
    path = "/stories/",
    request_body = CreateStoryRequest,
    responses(
        (status = 200, description = "Story created with its pages", body = StoryResponse),
        (status = 400, description = "Empty theme"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_story_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<CreateStoryRequest>,
) -> Result<Json<StoryResponse>, ApiError> {
    let theme = req.validated_theme()?;
    let (story, warnings) = app_state
        .pipeline
        .generate_story(app_state.default_user_id, theme, req.title.as_deref())
        .await?;
    if !warnings.is_empty() {
        warn!(story_id = %story.id, ?warnings, "Story generated with degraded upstream calls");
    }
    Ok(Json(story.into()))
}

#[utoipa::path(
    get,
    path = "/stories/",
    responses((status = 200, description = "All stories with their pages", body = [StoryResponse]))
)]
pub async fn list_stories_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<StoryResponse>>, ApiError> {
    let stories = app_state.db().list_stories().await?;
    Ok(Json(stories.into_iter().map(StoryResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/stories/{story_id}",
    responses(
        (status = 200, description = "The story with its pages", body = StoryResponse),
        (status = 404, description = "Story not found")
    ),
    params(("story_id" = Uuid, Path, description = "The story's ID."))
)]
pub async fn get_story_handler(
    State(app_state): State<Arc<AppState>>,
    Path(story_id): Path<Uuid>,
) -> Result<Json<StoryResponse>, ApiError> {
    let story = app_state.db().get_story(story_id).await?;
    Ok(Json(story.into()))
}

/// Delete a story together with all of its pages.
#[utoipa::path(
    delete,
    path = "/stories/{story_id}",
    responses(
        (status = 204, description = "Story deleted"),
        (status = 404, description = "Story not found")
    ),
    params(("story_id" = Uuid, Path, description = "The story's ID."))
)]
pub async fn delete_story_handler(
    State(app_state): State<Arc<AppState>>,
    Path(story_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    app_state.db().delete_story(story_id).await?;
    info!(%story_id, "Story deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Narrate every page that has no audio yet, using the default voice.
///
/// Pages that already have audio are returned unchanged. A page whose synthesis
/// failed is returned without audio.
#[utoipa::path(
    post,
    path = "/stories/{story_id}/generate-audio",
    responses(
        (status = 200, description = "The story with narrated pages", body = StoryResponse),
        (status = 404, description = "Story not found")
    ),
    params(("story_id" = Uuid, Path, description = "The story's ID."))
)]
pub async fn generate_audio_handler(
    State(app_state): State<Arc<AppState>>,
    Path(story_id): Path<Uuid>,
) -> Result<Json<StoryResponse>, ApiError> {
    let (story, warnings) = app_state.pipeline.narrate_story(story_id).await?;
    if !warnings.is_empty() {
        warn!(%story_id, ?warnings, "Narration finished with degraded pages");
    }
    Ok(Json(story.into()))
}

/// Create a story and generate its pages in the background.
///
/// The story row exists as soon as this returns; poll `/jobs/{job_id}` and then
/// fetch the story.
#[utoipa::path(
    post,
    path = "/stories/jobs",
    request_body = CreateStoryRequest,
    responses(
        (status = 202, description = "Generation job accepted", body = JobResponse),
        (status = 400, description = "Empty theme")
    )
)]
pub async fn submit_story_job_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<CreateStoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let theme = req.validated_theme()?;
    let story = app_state
        .pipeline
        .create_story(app_state.default_user_id, theme, req.title.as_deref())
        .await?;
    let job = app_state
        .jobs
        .submit(JobKind::GenerateStory {
            story_id: story.id,
            theme: theme.to_string(),
        })
        .await?;
    Ok((StatusCode::ACCEPTED, Json(JobResponse::from(job))))
}

#[utoipa::path(
    post,
    path = "/stories/{story_id}/generate-audio/jobs",
    responses(
        (status = 202, description = "Narration job accepted", body = JobResponse),
        (status = 404, description = "Story not found")
    ),
    params(("story_id" = Uuid, Path, description = "The story's ID."))
)]
pub async fn submit_audio_job_handler(
    State(app_state): State<Arc<AppState>>,
    Path(story_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    app_state.db().get_story(story_id).await?;
    let job = app_state
        .jobs
        .submit(JobKind::NarrateStory { story_id })
        .await?;
    Ok((StatusCode::ACCEPTED, Json(JobResponse::from(job))))
}

#[utoipa::path(
    get,
    path = "/jobs/{job_id}",
    responses(
        (status = 200, description = "Current job state", body = JobResponse),
        (status = 404, description = "Unknown job")
    ),
    params(("job_id" = Uuid, Path, description = "The job's ID."))
)]
pub async fn get_job_handler(
    State(app_state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobResponse>, ApiError> {
    let job = app_state
        .jobs
        .get(job_id)
        .await
        .ok_or_else(|| PortError::NotFound(format!("Job {} not found", job_id)))?;
    Ok(Json(job.into()))
}

/// List the voices offered by the speech provider. Empty when the provider is unreachable.
#[utoipa::path(
    get,
    path = "/voices",
    responses((status = 200, description = "Provider voices", body = [VoiceResponse]))
)]
pub async fn list_voices_handler(State(app_state): State<Arc<AppState>>) -> Json<Vec<VoiceResponse>> {
    let voices = app_state.speech().list_voices().await;
    if let Some(reason) = voices.degraded_reason() {
        warn!("Voice listing degraded: {}", reason);
    }
    Json(
        voices
            .unwrap_or(Vec::new())
            .into_iter()
            .map(VoiceResponse::from)
            .collect(),
    )
}

#[utoipa::path(
    get,
    path = "/voice-profiles",
    responses((status = 200, description = "Voice profiles of the current user", body = [VoiceProfileResponse]))
)]
pub async fn list_voice_profiles_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<VoiceProfileResponse>>, ApiError> {
    let profiles = app_state
        .db()
        .list_voice_profiles(app_state.default_user_id)
        .await?;
    Ok(Json(profiles.into_iter().map(VoiceProfileResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/voice-profiles",
    request_body = CreateVoiceProfileRequest,
    responses(
        (status = 201, description = "Voice profile created", body = VoiceProfileResponse),
        (status = 400, description = "Missing name or voice id")
    )
)]
pub async fn create_voice_profile_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<CreateVoiceProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim();
    let voice_id = req.voice_id.trim();
    if name.is_empty() || voice_id.is_empty() {
        return Err(ApiError::BadRequest(
            "name and voice_id must not be empty".to_string(),
        ));
    }
    let profile = app_state
        .db()
        .create_voice_profile(app_state.default_user_id, name, voice_id)
        .await?;
    Ok((StatusCode::CREATED, Json(VoiceProfileResponse::from(profile))))
}
