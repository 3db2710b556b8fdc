//! services/api/src/adapters/storage.rs
//!
//! Local filesystem storage for synthesized narration.

use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// URL prefix under which the static directory's `audio/` folder is served.
pub const AUDIO_URL_PREFIX: &str = "/static/audio";

/// Writes audio files under a directory that is served as static content.
#[derive(Clone, Debug)]
pub struct AudioStore {
    dir: PathBuf,
    url_prefix: String,
}

impl AudioStore {
    /// Creates the store, creating `dir` if it does not exist yet.
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persists MP3 bytes under a fresh random name and returns its URL path.
    ///
    /// Names are UUIDv4 and never checked for collisions. Identical input
    /// produces a new file on every call.
    pub async fn save_mp3(&self, audio: &[u8]) -> std::io::Result<String> {
        let filename = format!("{}.mp3", Uuid::new_v4());
        let path = self.dir.join(&filename);
        debug!(path = %path.display(), bytes = audio.len(), "Saving audio");
        tokio::fs::write(&path, audio).await?;
        Ok(format!("{}/{}", self.url_prefix, filename))
    }
}
