//! crates/storybook_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use crate::domain::{
    Alignment, Generation, NarratedAudio, NewPage, Page, PageDraft, ProviderVoice, Story, User,
    VoiceProfile,
};
use async_trait::async_trait;
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    /// Returns the user with `email`, creating it with `hashed_password` if absent.
    async fn ensure_user(&self, email: &str, hashed_password: &str) -> PortResult<User>;

    // --- Stories ---
    /// Creates a story with no pages.
    async fn create_story(&self, user_id: Uuid, title: &str, theme: &str) -> PortResult<Story>;

    /// Loads a story with its pages ordered by page number.
    async fn get_story(&self, story_id: Uuid) -> PortResult<Story>;

    async fn list_stories(&self) -> PortResult<Vec<Story>>;

    /// Deletes a story and, with it, every page it owns.
    async fn delete_story(&self, story_id: Uuid) -> PortResult<()>;

    // --- Pages ---
    /// Inserts all pages for a story atomically.
    async fn add_pages(&self, story_id: Uuid, pages: &[NewPage]) -> PortResult<Vec<Page>>;

    /// Stores narration on a page that has none yet.
    ///
    /// Returns `false` when the page already carries a non-empty audio reference;
    /// that page is left as it was. `NotFound` when the page does not exist.
    async fn attach_audio(
        &self,
        page_id: Uuid,
        audio_url: &str,
        alignment: Option<&Alignment>,
    ) -> PortResult<bool>;

    // --- Voice Profiles ---
    async fn create_voice_profile(
        &self,
        user_id: Uuid,
        name: &str,
        provider_voice_id: &str,
    ) -> PortResult<VoiceProfile>;

    async fn list_voice_profiles(&self, user_id: Uuid) -> PortResult<Vec<VoiceProfile>>;
}

#[async_trait]
pub trait NarrativeService: Send + Sync {
    /// Writes a short children's story about `theme`, one draft per page.
    async fn generate_pages(&self, theme: &str) -> Generation<Vec<PageDraft>>;
}

#[async_trait]
pub trait IllustrationService: Send + Sync {
    /// Returns a reference (URL) to an illustration matching the prompt.
    async fn illustrate(&self, prompt: &str) -> String;
}

#[async_trait]
pub trait SpeechSynthesisService: Send + Sync {
    /// Synthesizes `text` with the provider voice `voice_id` and stores the audio.
    /// Every call produces a new audio file.
    async fn narrate(&self, text: &str, voice_id: &str) -> Generation<NarratedAudio>;

    /// Lists the voices available from the provider.
    async fn list_voices(&self) -> Generation<Vec<ProviderVoice>>;
}
