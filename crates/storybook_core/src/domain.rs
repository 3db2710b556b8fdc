//! crates/storybook_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

// Represents a user - stories and voice profiles hang off it
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// A named reference to a voice hosted by the speech-synthesis provider.
#[derive(Debug, Clone)]
pub struct VoiceProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub provider_voice_id: String,
    pub created_at: DateTime<Utc>,
}

/// A themed, multi-page generated narrative. `pages` is ordered by page number.
#[derive(Debug, Clone)]
pub struct Story {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub theme: String,
    pub created_at: DateTime<Utc>,
    pub pages: Vec<Page>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub id: Uuid,
    pub story_id: Uuid,
    /// 1-based. Uniqueness within a story is not enforced.
    pub page_number: i32,
    pub text_content: String,
    pub image_url: Option<String>,
    pub audio_url: Option<String>,
    pub alignment: Option<Alignment>,
}

impl Page {
    /// True when the page carries a usable narration reference.
    pub fn has_audio(&self) -> bool {
        self.audio_url.as_deref().is_some_and(|url| !url.is_empty())
    }
}

/// A page about to be inserted. Audio is always attached later.
#[derive(Debug, Clone)]
pub struct NewPage {
    pub page_number: i32,
    pub text_content: String,
    pub image_url: Option<String>,
}

/// One page as described by the narrative model, before illustration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDraft {
    pub page_number: i32,
    pub text_content: String,
    pub image_prompt: String,
}

//=========================================================================================
// Alignment
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlignmentError {
    #[error("alignment sequences differ in length: {characters} characters, {starts} start times, {ends} end times")]
    LengthMismatch {
        characters: usize,
        starts: usize,
        ends: usize,
    },
}

/// Per-character timing for a narrated text.
///
/// Index `i` of each sequence describes the `i`-th character. The sequences can
/// only be built through [`Alignment::new`], so they always have equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    characters: Vec<String>,
    start_times: Vec<f64>,
    end_times: Vec<f64>,
}

impl Alignment {
    pub fn new(
        characters: Vec<String>,
        start_times: Vec<f64>,
        end_times: Vec<f64>,
    ) -> Result<Self, AlignmentError> {
        if characters.len() != start_times.len() || characters.len() != end_times.len() {
            return Err(AlignmentError::LengthMismatch {
                characters: characters.len(),
                starts: start_times.len(),
                ends: end_times.len(),
            });
        }
        Ok(Self {
            characters,
            start_times,
            end_times,
        })
    }

    pub fn characters(&self) -> &[String] {
        &self.characters
    }

    pub fn start_times(&self) -> &[f64] {
        &self.start_times
    }

    pub fn end_times(&self) -> &[f64] {
        &self.end_times
    }

    /// Number of character triples.
    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    /// Splits the alignment back into its three sequences.
    pub fn into_parts(self) -> (Vec<String>, Vec<f64>, Vec<f64>) {
        (self.characters, self.start_times, self.end_times)
    }
}

//=========================================================================================
// Upstream Results
//=========================================================================================

/// Output of a speech-synthesis call: a path into the static directory plus optional timing.
#[derive(Debug, Clone, PartialEq)]
pub struct NarratedAudio {
    pub audio_url: String,
    pub alignment: Option<Alignment>,
}

/// A voice offered by the speech-synthesis provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderVoice {
    pub voice_id: String,
    pub name: String,
}

/// Result of a call to an external generation service.
///
/// Upstream failures are not request failures: the caller receives `Degraded`
/// with a reason and decides whether to warn, skip or persist an empty state.
#[derive(Debug, Clone, PartialEq)]
pub enum Generation<T> {
    Success(T),
    Degraded(String),
}

impl<T> Generation<T> {
    pub fn degraded(reason: impl Into<String>) -> Self {
        Generation::Degraded(reason.into())
    }

    pub fn degraded_reason(&self) -> Option<&str> {
        match self {
            Generation::Success(_) => None,
            Generation::Degraded(reason) => Some(reason),
        }
    }

    /// Returns the payload, dropping the degrade reason.
    pub fn into_success(self) -> Option<T> {
        match self {
            Generation::Success(value) => Some(value),
            Generation::Degraded(_) => None,
        }
    }

    /// Returns the payload or `fallback` when degraded.
    pub fn unwrap_or(self, fallback: T) -> T {
        self.into_success().unwrap_or(fallback)
    }
}
