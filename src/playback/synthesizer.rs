use once_cell::sync::Lazy;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::PlaybackError;

// Name fragments that mark a catalog entry as a natural-sounding voice,
// checked in order of preference.
static PREFERRED_VOICE_HINTS: Lazy<Vec<&'static str>> =
    Lazy::new(|| vec!["natural", "conversational", "calm", "female"]);

#[derive(Debug, Clone)]
pub struct SynthesizerConfig {
    pub base_url: String,
    pub voice_id: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.elevenlabs.io/v1".to_string(),
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(), // Rachel voice
            model: "eleven_multilingual_v2".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Voice {
    pub voice_id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VoiceCatalog {
    voices: Vec<Voice>,
}

/// Text-to-speech over an ElevenLabs-style HTTP API, returning raw 16kHz
/// 16-bit PCM ready for the output player.
pub struct HttpSynthesizer {
    client: Client,
    api_key: String,
    config: SynthesizerConfig,
}

impl HttpSynthesizer {
    pub fn new(api_key: String) -> Self {
        Self::with_config(api_key, SynthesizerConfig::default())
    }

    pub fn with_config(api_key: String, config: SynthesizerConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            config,
        }
    }

    /// Synthesize speech for the given text with the configured voice.
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>, PlaybackError> {
        let url = format!(
            "{}/text-to-speech/{}?output_format=pcm_16000",
            self.config.base_url, self.config.voice_id
        );

        let payload = json!({
            "text": text,
            "model_id": self.config.model,
        });

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PlaybackError::Synthesis(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PlaybackError::Synthesis(format!(
                "{} - {}",
                status.as_u16(),
                message
            )));
        }

        let pcm = response
            .bytes()
            .await
            .map_err(|e| PlaybackError::Synthesis(e.to_string()))?
            .to_vec();

        if pcm.is_empty() {
            return Err(PlaybackError::Synthesis("Empty audio response".to_string()));
        }

        Ok(pcm)
    }

    /// Fetch the service's voice catalog.
    pub async fn voices(&self) -> Result<Vec<Voice>, PlaybackError> {
        let url = format!("{}/voices", self.config.base_url);

        let response = self
            .client
            .get(&url)
            .header("xi-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| PlaybackError::Synthesis(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PlaybackError::Synthesis(format!(
                "{} - {}",
                status.as_u16(),
                message
            )));
        }

        let catalog: VoiceCatalog = response
            .json()
            .await
            .map_err(|e| PlaybackError::Synthesis(e.to_string()))?;

        Ok(catalog.voices)
    }

    /// Switch to a natural-sounding voice from the catalog when one exists.
    /// Quality-of-service only: catalog failures leave the default in place.
    pub async fn prefer_natural_voice(&mut self) {
        match self.voices().await {
            Ok(voices) => {
                if let Some(voice) = pick_preferred(&voices) {
                    log::info!("Synthesizer: using voice '{}'", voice.name);
                    self.config.voice_id = voice.voice_id.clone();
                } else {
                    log::debug!("Synthesizer: no preferred voice found, keeping default");
                }
            }
            Err(e) => {
                log::warn!("Synthesizer: voice catalog unavailable ({}), keeping default", e);
            }
        }
    }

    pub fn set_voice(&mut self, voice_id: String) {
        self.config.voice_id = voice_id;
    }

    pub fn voice_id(&self) -> &str {
        &self.config.voice_id
    }
}

/// First catalog entry whose name or category matches a preference hint.
fn pick_preferred(voices: &[Voice]) -> Option<&Voice> {
    for hint in PREFERRED_VOICE_HINTS.iter() {
        if let Some(voice) = voices.iter().find(|v| {
            v.name.to_lowercase().contains(hint)
                || v.category
                    .as_deref()
                    .map(|c| c.to_lowercase().contains(hint))
                    .unwrap_or(false)
        }) {
            return Some(voice);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(id: &str, name: &str, category: Option<&str>) -> Voice {
        Voice {
            voice_id: id.to_string(),
            name: name.to_string(),
            category: category.map(|c| c.to_string()),
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = SynthesizerConfig::default();
        assert_eq!(config.voice_id, "21m00Tcm4TlvDq8ikWAM");
        assert_eq!(config.model, "eleven_multilingual_v2");
    }

    #[test]
    fn test_pick_preferred_by_name() {
        let voices = vec![
            voice("a", "Gravel", None),
            voice("b", "Nova Natural", None),
            voice("c", "Breeze", Some("female")),
        ];
        assert_eq!(pick_preferred(&voices).unwrap().voice_id, "b");
    }

    #[test]
    fn test_pick_preferred_by_category() {
        let voices = vec![
            voice("a", "Gravel", Some("gruff")),
            voice("b", "Breeze", Some("Female")),
        ];
        assert_eq!(pick_preferred(&voices).unwrap().voice_id, "b");
    }

    #[test]
    fn test_pick_preferred_none_matches() {
        let voices = vec![voice("a", "Gravel", None)];
        assert!(pick_preferred(&voices).is_none());
    }

    #[tokio::test]
    #[cfg_attr(
        not(feature = "test-api"),
        ignore = "requires API key - run with --features test-api"
    )]
    async fn test_voice_catalog_with_api() {
        let key = std::env::var("ELEVENLABS_API_KEY").expect("ELEVENLABS_API_KEY not set");
        let synthesizer = HttpSynthesizer::new(key);
        let voices = synthesizer.voices().await.unwrap();
        assert!(!voices.is_empty());
    }
}
