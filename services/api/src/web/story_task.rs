//! services/api/src/web/story_task.rs
//!
//! The story "workers": sequences the narrative, illustration and speech ports and
//! writes their results through the database port. Used both inline by the
//! synchronous endpoints and by the background job workers.

use std::sync::Arc;
use storybook_core::{
    domain::{Generation, NewPage, Story},
    ports::{
        DatabaseService, IllustrationService, NarrativeService, PortResult,
        SpeechSynthesisService,
    },
};
use tracing::{info, warn};
use uuid::Uuid;

/// The ports the generation steps run against, plus the voice used for narration.
#[derive(Clone)]
pub struct StoryPipeline {
    pub db: Arc<dyn DatabaseService>,
    pub narrative: Arc<dyn NarrativeService>,
    pub illustrator: Arc<dyn IllustrationService>,
    pub speech: Arc<dyn SpeechSynthesisService>,
    pub default_voice_id: String,
}

impl StoryPipeline {
    /// Creates the story row. The title defaults to "Story about <theme>".
    pub async fn create_story(
        &self,
        user_id: Uuid,
        theme: &str,
        title: Option<&str>,
    ) -> PortResult<Story> {
        let title = match title.map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => format!("Story about {}", theme),
        };
        let story = self.db.create_story(user_id, &title, theme).await?;
        info!(story_id = %story.id, theme, "Story created");
        Ok(story)
    }

    /// Writes the text and illustrates every page, one after another.
    ///
    /// Returns the warnings collected from degraded upstream calls. A degraded
    /// narrative leaves the story with zero pages.
    pub async fn populate_pages(&self, story_id: Uuid, theme: &str) -> PortResult<Vec<String>> {
        let mut warnings = Vec::new();

        let drafts = match self.narrative.generate_pages(theme).await {
            Generation::Success(drafts) => drafts,
            Generation::Degraded(reason) => {
                warn!(%story_id, "Narrative degraded, story stays empty: {}", reason);
                warnings.push(format!("narrative: {}", reason));
                Vec::new()
            }
        };

        let mut pages = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let image_url = self.illustrator.illustrate(&draft.image_prompt).await;
            pages.push(NewPage {
                page_number: draft.page_number,
                text_content: draft.text_content,
                image_url: Some(image_url),
            });
        }

        let inserted = self.db.add_pages(story_id, &pages).await?;
        info!(%story_id, pages = inserted.len(), "Story pages written");
        Ok(warnings)
    }

    /// Creates a story and fills it in before returning it with its pages.
    pub async fn generate_story(
        &self,
        user_id: Uuid,
        theme: &str,
        title: Option<&str>,
    ) -> PortResult<(Story, Vec<String>)> {
        let story = self.create_story(user_id, theme, title).await?;
        let warnings = self.populate_pages(story.id, theme).await?;
        let story = self.db.get_story(story.id).await?;
        Ok((story, warnings))
    }

    /// Narrates every page of the story that has no audio yet.
    ///
    /// Pages that already carry a non-empty audio reference are left untouched.
    /// A degraded synthesis leaves that page unaudioed and moves on.
    pub async fn narrate_story(&self, story_id: Uuid) -> PortResult<(Story, Vec<String>)> {
        let story = self.db.get_story(story_id).await?;
        info!(%story_id, pages = story.pages.len(), "Generating narration");

        let mut warnings = Vec::new();
        for page in &story.pages {
            if page.has_audio() {
                info!(%story_id, page_number = page.page_number, "Page already narrated, skipping");
                continue;
            }

            match self
                .speech
                .narrate(&page.text_content, &self.default_voice_id)
                .await
            {
                Generation::Success(audio) if !audio.audio_url.is_empty() => {
                    let attached = self
                        .db
                        .attach_audio(page.id, &audio.audio_url, audio.alignment.as_ref())
                        .await?;
                    if !attached {
                        info!(
                            %story_id,
                            page_number = page.page_number,
                            discarded = %audio.audio_url,
                            "Page was narrated concurrently, keeping the existing audio"
                        );
                    }
                }
                Generation::Success(_) => {
                    warn!(%story_id, page_number = page.page_number, "Speech returned an empty reference");
                    warnings.push(format!("page {}: empty audio reference", page.page_number));
                }
                Generation::Degraded(reason) => {
                    warn!(%story_id, page_number = page.page_number, "Narration degraded: {}", reason);
                    warnings.push(format!("page {}: {}", page.page_number, reason));
                }
            }
        }

        let story = self.db.get_story(story_id).await?;
        info!(%story_id, "Narration complete");
        Ok((story, warnings))
    }
}
