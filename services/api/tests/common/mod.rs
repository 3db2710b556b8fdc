//! Shared helpers for the API integration tests: in-memory doubles for every
//! port and a router wired exactly like the binary's.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api_lib::adapters::PlaceholderIllustrator;
use api_lib::web::{self, jobs::JobQueue, AppState, StoryPipeline};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::Value;
use storybook_core::domain::{
    Alignment, Generation, NarratedAudio, NewPage, Page, PageDraft, ProviderVoice, Story, User,
    VoiceProfile,
};
use storybook_core::ports::{
    DatabaseService, NarrativeService, PortError, PortResult, SpeechSynthesisService,
};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// In-memory database
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    stories: Vec<Story>,
    pages: Vec<Page>,
    voice_profiles: Vec<VoiceProfile>,
}

#[derive(Default)]
pub struct InMemoryDb {
    tables: Mutex<Tables>,
    audio_writes: AtomicUsize,
}

impl InMemoryDb {
    pub fn page_count(&self) -> usize {
        self.tables.lock().unwrap().pages.len()
    }

    /// Number of `attach_audio` calls that stored narration on a page.
    pub fn audio_writes(&self) -> usize {
        self.audio_writes.load(Ordering::SeqCst)
    }

    fn hydrate(tables: &Tables, story: &Story) -> Story {
        let mut pages: Vec<Page> = tables
            .pages
            .iter()
            .filter(|p| p.story_id == story.id)
            .cloned()
            .collect();
        pages.sort_by_key(|p| (p.page_number, p.id));
        Story {
            pages,
            ..story.clone()
        }
    }
}

#[async_trait]
impl DatabaseService for InMemoryDb {
    async fn ensure_user(&self, email: &str, _hashed_password: &str) -> PortResult<User> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(user) = tables.users.iter().find(|u| u.email == email) {
            return Ok(user.clone());
        }
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            created_at: Utc::now(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn create_story(&self, user_id: Uuid, title: &str, theme: &str) -> PortResult<Story> {
        let story = Story {
            id: Uuid::new_v4(),
            user_id,
            title: title.to_string(),
            theme: theme.to_string(),
            created_at: Utc::now(),
            pages: Vec::new(),
        };
        self.tables.lock().unwrap().stories.push(story.clone());
        Ok(story)
    }

    async fn get_story(&self, story_id: Uuid) -> PortResult<Story> {
        let tables = self.tables.lock().unwrap();
        tables
            .stories
            .iter()
            .find(|s| s.id == story_id)
            .map(|s| Self::hydrate(&tables, s))
            .ok_or_else(|| PortError::NotFound(format!("Story {} not found", story_id)))
    }

    async fn list_stories(&self) -> PortResult<Vec<Story>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .stories
            .iter()
            .map(|s| Self::hydrate(&tables, s))
            .collect())
    }

    async fn delete_story(&self, story_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.stories.len();
        tables.stories.retain(|s| s.id != story_id);
        if tables.stories.len() == before {
            return Err(PortError::NotFound(format!("Story {} not found", story_id)));
        }
        tables.pages.retain(|p| p.story_id != story_id);
        Ok(())
    }

    async fn add_pages(&self, story_id: Uuid, pages: &[NewPage]) -> PortResult<Vec<Page>> {
        let mut tables = self.tables.lock().unwrap();
        let inserted: Vec<Page> = pages
            .iter()
            .map(|p| Page {
                id: Uuid::new_v4(),
                story_id,
                page_number: p.page_number,
                text_content: p.text_content.clone(),
                image_url: p.image_url.clone(),
                audio_url: None,
                alignment: None,
            })
            .collect();
        tables.pages.extend(inserted.iter().cloned());
        Ok(inserted)
    }

    async fn attach_audio(
        &self,
        page_id: Uuid,
        audio_url: &str,
        alignment: Option<&Alignment>,
    ) -> PortResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        let page = tables
            .pages
            .iter_mut()
            .find(|p| p.id == page_id)
            .ok_or_else(|| PortError::NotFound(format!("Page {} not found", page_id)))?;
        if page.has_audio() {
            return Ok(false);
        }
        page.audio_url = Some(audio_url.to_string());
        page.alignment = alignment.cloned();
        self.audio_writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn create_voice_profile(
        &self,
        user_id: Uuid,
        name: &str,
        provider_voice_id: &str,
    ) -> PortResult<VoiceProfile> {
        let profile = VoiceProfile {
            id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
            provider_voice_id: provider_voice_id.to_string(),
            created_at: Utc::now(),
        };
        self.tables
            .lock()
            .unwrap()
            .voice_profiles
            .push(profile.clone());
        Ok(profile)
    }

    async fn list_voice_profiles(&self, user_id: Uuid) -> PortResult<Vec<VoiceProfile>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .voice_profiles
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Narrative doubles
// ---------------------------------------------------------------------------

/// Returns the same result for every theme.
pub struct ScriptedNarrative(pub Generation<Vec<PageDraft>>);

#[async_trait]
impl NarrativeService for ScriptedNarrative {
    async fn generate_pages(&self, _theme: &str) -> Generation<Vec<PageDraft>> {
        self.0.clone()
    }
}

pub fn three_page_narrative() -> ScriptedNarrative {
    ScriptedNarrative(Generation::Success(
        (1..=3)
            .map(|n| PageDraft {
                page_number: n,
                text_content: format!("Page {} of the brave dog.", n),
                image_prompt: format!("A brave dog, scene {}", n),
            })
            .collect(),
    ))
}

pub fn unparseable_narrative() -> ScriptedNarrative {
    ScriptedNarrative(Generation::degraded(
        "narrative reply could not be parsed: expected value at line 1 column 1",
    ))
}

// ---------------------------------------------------------------------------
// Speech doubles
// ---------------------------------------------------------------------------

/// Succeeds for every page, with one alignment triple per character.
#[derive(Default)]
pub struct EchoSpeech {
    pub calls: AtomicUsize,
}

#[async_trait]
impl SpeechSynthesisService for EchoSpeech {
    async fn narrate(&self, text: &str, _voice_id: &str) -> Generation<NarratedAudio> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let characters: Vec<String> = text.chars().map(|c| c.to_string()).collect();
        let n = characters.len();
        let starts = (0..n).map(|i| i as f64 * 0.05).collect();
        let ends = (0..n).map(|i| (i + 1) as f64 * 0.05).collect();
        Generation::Success(NarratedAudio {
            audio_url: format!("/static/audio/{}.mp3", Uuid::new_v4()),
            alignment: Some(Alignment::new(characters, starts, ends).unwrap()),
        })
    }

    async fn list_voices(&self) -> Generation<Vec<ProviderVoice>> {
        Generation::Success(vec![ProviderVoice {
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            name: "Rachel".to_string(),
        }])
    }
}

/// Fails for every call.
#[derive(Default)]
pub struct BrokenSpeech {
    pub calls: AtomicUsize,
}

#[async_trait]
impl SpeechSynthesisService for BrokenSpeech {
    async fn narrate(&self, _text: &str, _voice_id: &str) -> Generation<NarratedAudio> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Generation::degraded("provider returned 401: invalid api key")
    }

    async fn list_voices(&self) -> Generation<Vec<ProviderVoice>> {
        Generation::degraded("provider returned 401: invalid api key")
    }
}

/// Reports success but hands back no audio reference.
#[derive(Default)]
pub struct EmptyUrlSpeech {
    pub calls: AtomicUsize,
}

#[async_trait]
impl SpeechSynthesisService for EmptyUrlSpeech {
    async fn narrate(&self, _text: &str, _voice_id: &str) -> Generation<NarratedAudio> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Generation::Success(NarratedAudio {
            audio_url: String::new(),
            alignment: None,
        })
    }

    async fn list_voices(&self) -> Generation<Vec<ProviderVoice>> {
        Generation::Success(Vec::new())
    }
}

/// `EchoSpeech` that takes a while per page, so two runs over one story overlap.
#[derive(Default)]
pub struct SlowSpeech {
    pub inner: EchoSpeech,
}

#[async_trait]
impl SpeechSynthesisService for SlowSpeech {
    async fn narrate(&self, text: &str, voice_id: &str) -> Generation<NarratedAudio> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.inner.narrate(text, voice_id).await
    }

    async fn list_voices(&self) -> Generation<Vec<ProviderVoice>> {
        self.inner.list_voices().await
    }
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub db: Arc<InMemoryDb>,
    pub state: Arc<AppState>,
}

/// Build the application router over the given doubles, the same way the
/// binary wires its real adapters.
pub async fn build_test_app(
    narrative: Arc<dyn NarrativeService>,
    speech: Arc<dyn SpeechSynthesisService>,
) -> TestApp {
    build_test_app_with_retention(narrative, speech, Duration::from_secs(3600)).await
}

/// Like `build_test_app`, with a custom retention for finished jobs.
pub async fn build_test_app_with_retention(
    narrative: Arc<dyn NarrativeService>,
    speech: Arc<dyn SpeechSynthesisService>,
    job_retention: Duration,
) -> TestApp {
    let db = Arc::new(InMemoryDb::default());
    let user = db
        .ensure_user("test@example.com", "not-a-real-hash")
        .await
        .unwrap();

    let pipeline = StoryPipeline {
        db: db.clone(),
        narrative,
        illustrator: Arc::new(PlaceholderIllustrator::default()),
        speech,
        default_voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
    };
    let jobs = Arc::new(JobQueue::start(
        pipeline.clone(),
        2,
        job_retention,
        CancellationToken::new(),
    ));
    let state = Arc::new(AppState {
        pipeline,
        jobs,
        default_user_id: user.id,
    });

    TestApp {
        router: web::router(state.clone(), &std::env::temp_dir()),
        db,
        state,
    }
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, None).await
}

pub async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Some(body)).await
}

pub async fn post_empty(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::POST, uri, None).await
}

/// Poll `/jobs/{id}` until the job finishes or five seconds pass.
pub async fn wait_for_job(app: &Router, job_id: &str) -> Value {
    for _ in 0..100 {
        let (status, job) = get(app, &format!("/jobs/{}", job_id)).await;
        assert_eq!(status, StatusCode::OK);
        if matches!(job["status"].as_str(), Some("completed" | "failed")) {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("job {} did not finish in time", job_id);
}

/// Asserts the audio/alignment combination every narrated page must satisfy.
pub fn assert_page_audio_consistent(page: &Value) {
    let audio = page["audio_url"].as_str().unwrap_or("");
    let alignment = &page["alignment_data"];
    if audio.is_empty() {
        assert!(alignment.is_null(), "alignment without audio: {}", page);
        return;
    }
    if !alignment.is_null() {
        let chars = alignment["characters"].as_array().unwrap().len();
        let starts = alignment["character_start_times_seconds"].as_array().unwrap().len();
        let ends = alignment["character_end_times_seconds"].as_array().unwrap().len();
        assert_eq!(chars, starts);
        assert_eq!(chars, ends);
    }
}
