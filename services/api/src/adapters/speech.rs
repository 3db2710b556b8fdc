//! services/api/src/adapters/speech.rs
//!
//! This module contains the adapter for ElevenLabs text-to-speech.
//! It implements the `SpeechSynthesisService` port from the `core` crate, requesting
//! per-character timestamps along with the audio.

use crate::adapters::storage::AudioStore;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use storybook_core::{
    domain::{Alignment, Generation, NarratedAudio, ProviderVoice},
    ports::SpeechSynthesisService,
};
use tracing::{error, info, warn};

/// Failures inside a single synthesis call. They never leave this module:
/// the port reports them as `Generation::Degraded`.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("audio payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("could not store audio: {0}")]
    Io(#[from] std::io::Error),
}

//=========================================================================================
// Provider Payloads
//=========================================================================================

#[derive(Debug, Deserialize)]
pub struct TimestampedSpeech {
    pub audio_base64: String,
    #[serde(default)]
    pub alignment: Option<ProviderAlignment>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderAlignment {
    pub characters: Vec<String>,
    pub character_start_times_seconds: Vec<f64>,
    pub character_end_times_seconds: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct VoicesPayload {
    voices: Vec<VoiceEntry>,
}

#[derive(Debug, Deserialize)]
struct VoiceEntry {
    voice_id: String,
    name: String,
}

impl TimestampedSpeech {
    /// Decodes the audio and turns the provider alignment into the domain type.
    ///
    /// Alignment with unequal sequences is dropped; the audio is kept.
    pub fn into_parts(self) -> Result<(Vec<u8>, Option<Alignment>), SpeechError> {
        let audio = STANDARD.decode(self.audio_base64.as_bytes())?;
        let alignment = self.alignment.and_then(|a| {
            Alignment::new(
                a.characters,
                a.character_start_times_seconds,
                a.character_end_times_seconds,
            )
            .map_err(|e| warn!("Dropping provider alignment: {}", e))
            .ok()
        });
        Ok((audio, alignment))
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `SpeechSynthesisService` using the ElevenLabs API.
#[derive(Clone)]
pub struct ElevenLabsSpeechAdapter {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    store: AudioStore,
}

impl ElevenLabsSpeechAdapter {
    /// Creates a new `ElevenLabsSpeechAdapter`.
    pub fn new(
        http: reqwest::Client,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        store: AudioStore,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            store,
        }
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<NarratedAudio, SpeechError> {
        let url = format!(
            "{}/v1/text-to-speech/{}/with-timestamps",
            self.api_base, voice_id
        );
        let response = self
            .http
            .post(url)
            .header("xi-api-key", &self.api_key)
            .json(&serde_json::json!({
                "text": text,
                "model_id": self.model,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Status { status, body });
        }

        let payload: TimestampedSpeech = response.json().await?;
        let (audio, alignment) = payload.into_parts()?;
        let audio_url = self.store.save_mp3(&audio).await?;

        Ok(NarratedAudio {
            audio_url,
            alignment,
        })
    }

    async fn fetch_voices(&self) -> Result<Vec<ProviderVoice>, SpeechError> {
        let response = self
            .http
            .get(format!("{}/v1/voices", self.api_base))
            .header("xi-api-key", &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::Status { status, body });
        }

        let payload: VoicesPayload = response.json().await?;
        Ok(payload
            .voices
            .into_iter()
            .map(|v| ProviderVoice {
                voice_id: v.voice_id,
                name: v.name,
            })
            .collect())
    }
}

//=========================================================================================
// `SpeechSynthesisService` Trait Implementation
//=========================================================================================

#[async_trait]
impl SpeechSynthesisService for ElevenLabsSpeechAdapter {
    async fn narrate(&self, text: &str, voice_id: &str) -> Generation<NarratedAudio> {
        info!(voice_id, characters = text.chars().count(), "Synthesizing narration");
        match self.synthesize(text, voice_id).await {
            Ok(audio) => {
                match &audio.alignment {
                    Some(alignment) => info!(
                        audio_url = %audio.audio_url,
                        timestamps = alignment.len(),
                        "Narration saved"
                    ),
                    None => info!(audio_url = %audio.audio_url, "Narration saved without alignment"),
                }
                Generation::Success(audio)
            }
            Err(e) => {
                error!(voice_id, "Speech synthesis failed: {}", e);
                Generation::degraded(e.to_string())
            }
        }
    }

    async fn list_voices(&self) -> Generation<Vec<ProviderVoice>> {
        match self.fetch_voices().await {
            Ok(voices) => Generation::Success(voices),
            Err(e) => {
                error!("Fetching voices failed: {}", e);
                Generation::degraded(e.to_string())
            }
        }
    }
}
