//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, PgPool};
use std::collections::HashMap;
use storybook_core::domain::{Alignment, NewPage, Page, Story, User, VoiceProfile};
use storybook_core::ports::{DatabaseService, PortError, PortResult};
use tracing::warn;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn pages_for(&self, story_ids: &[Uuid]) -> PortResult<Vec<Page>> {
        let records = sqlx::query_as::<_, PageRecord>(
            "SELECT id, story_id, page_number, text_content, image_url, audio_url, alignment_data \
             FROM pages WHERE story_id = ANY($1) ORDER BY page_number ASC, id ASC",
        )
        .bind(story_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(PageRecord::to_domain).collect())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

/// JSON document stored in `pages.alignment_data`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AlignmentDocument {
    pub characters: Vec<String>,
    pub character_start_times_seconds: Vec<f64>,
    pub character_end_times_seconds: Vec<f64>,
}

impl From<&Alignment> for AlignmentDocument {
    fn from(alignment: &Alignment) -> Self {
        Self {
            characters: alignment.characters().to_vec(),
            character_start_times_seconds: alignment.start_times().to_vec(),
            character_end_times_seconds: alignment.end_times().to_vec(),
        }
    }
}

impl AlignmentDocument {
    /// Converts back into the domain type; a document with unequal sequences is dropped.
    pub fn into_domain(self) -> Option<Alignment> {
        Alignment::new(
            self.characters,
            self.character_start_times_seconds,
            self.character_end_times_seconds,
        )
        .map_err(|e| warn!("Discarding stored alignment: {}", e))
        .ok()
    }
}

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            email: self.email,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct StoryRecord {
    id: Uuid,
    user_id: Uuid,
    title: String,
    theme: String,
    created_at: DateTime<Utc>,
}
impl StoryRecord {
    fn to_domain(self, pages: Vec<Page>) -> Story {
        Story {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            theme: self.theme,
            created_at: self.created_at,
            pages,
        }
    }
}

#[derive(FromRow)]
struct PageRecord {
    id: Uuid,
    story_id: Uuid,
    page_number: i32,
    text_content: String,
    image_url: Option<String>,
    audio_url: Option<String>,
    alignment_data: Option<Json<AlignmentDocument>>,
}
impl PageRecord {
    fn to_domain(self) -> Page {
        Page {
            id: self.id,
            story_id: self.story_id,
            page_number: self.page_number,
            text_content: self.text_content,
            image_url: self.image_url,
            audio_url: self.audio_url,
            alignment: self.alignment_data.and_then(|doc| doc.0.into_domain()),
        }
    }
}

#[derive(FromRow)]
struct VoiceProfileRecord {
    id: Uuid,
    user_id: Uuid,
    name: String,
    provider_voice_id: String,
    created_at: DateTime<Utc>,
}
impl VoiceProfileRecord {
    fn to_domain(self) -> VoiceProfile {
        VoiceProfile {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            provider_voice_id: self.provider_voice_id,
            created_at: self.created_at,
        }
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn ensure_user(&self, email: &str, hashed_password: &str) -> PortResult<User> {
        sqlx::query(
            "INSERT INTO users (id, email, hashed_password) VALUES ($1, $2, $3) \
             ON CONFLICT (email) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hashed_password)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", email)),
            _ => unexpected(e),
        })?;

        Ok(record.to_domain())
    }

    async fn create_story(&self, user_id: Uuid, title: &str, theme: &str) -> PortResult<Story> {
        let record = sqlx::query_as::<_, StoryRecord>(
            "INSERT INTO stories (id, user_id, title, theme) VALUES ($1, $2, $3, $4) \
             RETURNING id, user_id, title, theme, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(title)
        .bind(theme)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain(Vec::new()))
    }

    async fn get_story(&self, story_id: Uuid) -> PortResult<Story> {
        let record = sqlx::query_as::<_, StoryRecord>(
            "SELECT id, user_id, title, theme, created_at FROM stories WHERE id = $1",
        )
        .bind(story_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Story {} not found", story_id)),
            _ => unexpected(e),
        })?;

        let pages = self.pages_for(&[story_id]).await?;
        Ok(record.to_domain(pages))
    }

    async fn list_stories(&self) -> PortResult<Vec<Story>> {
        let records = sqlx::query_as::<_, StoryRecord>(
            "SELECT id, user_id, title, theme, created_at FROM stories ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let mut pages_by_story: HashMap<Uuid, Vec<Page>> = HashMap::new();
        for page in self.pages_for(&ids).await? {
            pages_by_story.entry(page.story_id).or_default().push(page);
        }

        let stories = records
            .into_iter()
            .map(|r| {
                let pages = pages_by_story.remove(&r.id).unwrap_or_default();
                r.to_domain(pages)
            })
            .collect();
        Ok(stories)
    }

    async fn delete_story(&self, story_id: Uuid) -> PortResult<()> {
        // Pages go with the story through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM stories WHERE id = $1")
            .bind(story_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Story {} not found", story_id)));
        }
        Ok(())
    }

    async fn add_pages(&self, story_id: Uuid, pages: &[NewPage]) -> PortResult<Vec<Page>> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let mut inserted = Vec::with_capacity(pages.len());
        for page in pages {
            let record = sqlx::query_as::<_, PageRecord>(
                "INSERT INTO pages (id, story_id, page_number, text_content, image_url) \
                 VALUES ($1, $2, $3, $4, $5) \
                 RETURNING id, story_id, page_number, text_content, image_url, audio_url, alignment_data",
            )
            .bind(Uuid::new_v4())
            .bind(story_id)
            .bind(page.page_number)
            .bind(&page.text_content)
            .bind(page.image_url.as_deref())
            .fetch_one(&mut *tx)
            .await
            .map_err(unexpected)?;
            inserted.push(record.to_domain());
        }
        tx.commit().await.map_err(unexpected)?;
        Ok(inserted)
    }

    async fn attach_audio(
        &self,
        page_id: Uuid,
        audio_url: &str,
        alignment: Option<&Alignment>,
    ) -> PortResult<bool> {
        let result = sqlx::query(
            "UPDATE pages SET audio_url = $1, alignment_data = $2 \
             WHERE id = $3 AND COALESCE(audio_url, '') = ''",
        )
        .bind(audio_url)
        .bind(alignment.map(|a| Json(AlignmentDocument::from(a))))
        .bind(page_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pages WHERE id = $1)")
            .bind(page_id)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        if exists {
            Ok(false)
        } else {
            Err(PortError::NotFound(format!("Page {} not found", page_id)))
        }
    }

    async fn create_voice_profile(
        &self,
        user_id: Uuid,
        name: &str,
        provider_voice_id: &str,
    ) -> PortResult<VoiceProfile> {
        let record = sqlx::query_as::<_, VoiceProfileRecord>(
            "INSERT INTO voice_profiles (id, user_id, name, provider_voice_id) VALUES ($1, $2, $3, $4) \
             RETURNING id, user_id, name, provider_voice_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(name)
        .bind(provider_voice_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn list_voice_profiles(&self, user_id: Uuid) -> PortResult<Vec<VoiceProfile>> {
        let records = sqlx::query_as::<_, VoiceProfileRecord>(
            "SELECT id, user_id, name, provider_voice_id, created_at FROM voice_profiles \
             WHERE user_id = $1 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}
