//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::web::{jobs::JobQueue, story_task::StoryPipeline};
use std::sync::Arc;
use storybook_core::ports::{DatabaseService, SpeechSynthesisService};
use uuid::Uuid;

/// The shared application state, created once at startup and passed to all handlers.
///
/// Every service is injected here, so tests can swap any of them for a double.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: StoryPipeline,
    pub jobs: Arc<JobQueue>,
    /// Owner of every story until authentication exists.
    pub default_user_id: Uuid,
}

impl AppState {
    pub fn db(&self) -> &Arc<dyn DatabaseService> {
        &self.pipeline.db
    }

    pub fn speech(&self) -> &Arc<dyn SpeechSynthesisService> {
        &self.pipeline.speech
    }
}
