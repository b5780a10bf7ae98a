use secrecy::{ExposeSecret, SecretBox};
use std::env;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid API key for {service}: {reason}")]
    InvalidKey { service: String, reason: String },
}

/// Env var name, human-readable service name, and the key prefix the
/// service hands out (empty when the service has no stable prefix).
const KEY_SPECS: [(&str, &str, &str); 3] = [
    ("OPENAI_API_KEY", "OpenAI", "sk-"),
    ("FIREWORKS_API_KEY", "Fireworks AI", "fw_"),
    ("ELEVENLABS_API_KEY", "ElevenLabs", ""),
];

/// API credentials for the three remote collaborators: the completion
/// endpoint, the streaming transcription service, and the speech synthesizer.
#[derive(Debug)]
pub struct ApiConfig {
    completion_key: SecretBox<String>,
    transcription_key: SecretBox<String>,
    synthesis_key: SecretBox<String>,
}

impl ApiConfig {
    /// Load credentials from the environment, reading `.env` first when one
    /// exists so development setups need no exported variables.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let [completion, transcription, synthesis] = KEY_SPECS;
        let completion_key = load_key(completion.0, completion.1, completion.2)?;
        let transcription_key = load_key(transcription.0, transcription.1, transcription.2)?;
        let synthesis_key = load_key(synthesis.0, synthesis.1, synthesis.2)?;

        Ok(Self {
            completion_key,
            transcription_key,
            synthesis_key,
        })
    }

    /// Expose only at the call site building a request.
    pub fn completion_key(&self) -> &str {
        self.completion_key.expose_secret()
    }

    pub fn transcription_key(&self) -> &str {
        self.transcription_key.expose_secret()
    }

    pub fn synthesis_key(&self) -> &str {
        self.synthesis_key.expose_secret()
    }
}

fn load_key(var: &str, service: &str, prefix: &str) -> Result<SecretBox<String>, ConfigError> {
    let key = env::var(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))?;
    check_key(&key, service, prefix)?;
    Ok(SecretBox::new(Box::new(key)))
}

fn check_key(key: &str, service: &str, prefix: &str) -> Result<(), ConfigError> {
    if key.trim().is_empty() {
        return Err(ConfigError::InvalidKey {
            service: service.to_string(),
            reason: "key is empty".to_string(),
        });
    }
    if !prefix.is_empty() && !key.starts_with(prefix) {
        return Err(ConfigError::InvalidKey {
            service: service.to_string(),
            reason: format!("expected a key starting with '{}'", prefix),
        });
    }
    if key.len() < 10 {
        return Err(ConfigError::InvalidKey {
            service: service.to_string(),
            reason: "key is implausibly short".to_string(),
        });
    }
    Ok(())
}

/// Load configuration, logging a setup hint on the common first-run failure.
pub fn load_config() -> Result<ApiConfig, ConfigError> {
    match ApiConfig::load() {
        Ok(config) => {
            log::info!("API configuration loaded");
            Ok(config)
        }
        Err(ConfigError::MissingEnvVar(var)) => {
            log::error!("Missing required environment variable: {}", var);
            log::error!("Create a .env file in the project root with:");
            log::error!("{}=your_api_key_here", var);
            Err(ConfigError::MissingEnvVar(var))
        }
        Err(e) => {
            log::error!("Configuration error: {}", e);
            Err(e)
        }
    }
}
