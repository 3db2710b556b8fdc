//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub static_dir: PathBuf,
    pub cors_origin: String,
    pub google_api_key: Option<String>,
    pub narrative_api_base: String,
    pub narrative_model: String,
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_api_base: String,
    pub tts_model: String,
    pub default_voice_id: String,
    pub job_workers: usize,
    pub job_retention: Duration,
    pub default_user_email: String,
    pub default_user_password: String,
    // Auth settings are read so deployments can set them, but no endpoint uses them yet.
    pub secret_key: String,
    pub algorithm: String,
    pub access_token_expire_minutes: u32,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Load Server and Database Settings ---
        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:8000");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let static_dir = PathBuf::from(var_or("STATIC_DIR", "./static"));
        let cors_origin = var_or("CORS_ORIGIN", "http://localhost:5173");

        // --- Load API Keys (as optional) ---
        let google_api_key = lookup("GOOGLE_API_KEY");
        let elevenlabs_api_key = lookup("ELEVENLABS_API_KEY");

        // --- Load Adapter-specific Settings ---
        let narrative_api_base = var_or(
            "NARRATIVE_API_BASE",
            "https://generativelanguage.googleapis.com/v1beta/openai",
        );
        let narrative_model = var_or("NARRATIVE_MODEL", "gemini-2.5-pro");
        let elevenlabs_api_base = var_or("ELEVENLABS_API_BASE", "https://api.elevenlabs.io");
        let tts_model = var_or("TTS_MODEL", "eleven_turbo_v2_5");
        let default_voice_id = var_or("DEFAULT_VOICE_ID", "21m00Tcm4TlvDq8ikWAM");

        let job_workers_str = var_or("JOB_WORKERS", "2");
        let job_workers = job_workers_str
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "JOB_WORKERS".to_string(),
                    format!("'{}' is not a positive integer", job_workers_str),
                )
            })?;

        let retention_str = var_or("JOB_RETENTION_SECONDS", "3600");
        let job_retention = retention_str
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidValue("JOB_RETENTION_SECONDS".to_string(), e.to_string()))?;

        let default_user_email = var_or("DEFAULT_USER_EMAIL", "test@example.com");
        let default_user_password = var_or("DEFAULT_USER_PASSWORD", "change-me");

        // --- Load Auth Settings ---
        let secret_key = var_or("SECRET_KEY", "your-secret-key");
        let algorithm = var_or("ALGORITHM", "HS256");
        let expire_str = var_or("ACCESS_TOKEN_EXPIRE_MINUTES", "30");
        let access_token_expire_minutes = expire_str.parse::<u32>().map_err(|e| {
            ConfigError::InvalidValue("ACCESS_TOKEN_EXPIRE_MINUTES".to_string(), e.to_string())
        })?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            static_dir,
            cors_origin,
            google_api_key,
            narrative_api_base,
            narrative_model,
            elevenlabs_api_key,
            elevenlabs_api_base,
            tts_model,
            default_voice_id,
            job_workers,
            job_retention,
            default_user_email,
            default_user_password,
            secret_key,
            algorithm,
            access_token_expire_minutes,
        })
    }

    /// Directory the audio files are written to.
    pub fn audio_dir(&self) -> PathBuf {
        self.static_dir.join("audio")
    }
}
