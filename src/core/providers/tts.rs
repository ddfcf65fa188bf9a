//! HTTP text-to-speech adapter
//!
//! Posts the complete response text and returns base64 audio plus a playback
//! duration. When the service omits the duration, it is estimated from word
//! count at a typical speaking rate so the kiosk UI can time its animations.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{ProviderError, SpeechAudio, TextToSpeech};

/// Average conversational speaking rate used for the duration estimate
const WORDS_PER_SECOND: f32 = 2.5;

pub struct HttpTextToSpeech {
    client: reqwest::Client,
    url: String,
    api_key: String,
    voice: String,
}

#[derive(Debug, Deserialize)]
struct SynthesisResponse {
    audio: String,
    #[serde(default)]
    duration_seconds: Option<f32>,
}

/// Estimate spoken duration of `text` in seconds
pub fn estimate_duration_seconds(text: &str) -> f32 {
    let words = text.split_whitespace().count();
    (words as f32 / WORDS_PER_SECOND).max(0.5)
}

impl HttpTextToSpeech {
    pub fn new(url: String, api_key: String, voice: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            api_key,
            voice,
        }
    }
}

#[async_trait]
impl TextToSpeech for HttpTextToSpeech {
    async fn synthesize(&self, text: &str) -> Result<SpeechAudio, ProviderError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "text": text, "voice": self.voice }))
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: SynthesisResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        if parsed.audio.is_empty() {
            return Err(ProviderError::Empty);
        }
        Ok(SpeechAudio {
            duration_seconds: parsed
                .duration_seconds
                .unwrap_or_else(|| estimate_duration_seconds(text)),
            audio_base64: parsed.audio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_duration_estimate_scales_with_words() {
        let short = estimate_duration_seconds("hello there");
        let long = estimate_duration_seconds("one two three four five six seven eight nine ten");
        assert!(long > short);
        assert_eq!(long, 4.0);
    }

    #[test]
    fn test_duration_estimate_has_floor() {
        assert_eq!(estimate_duration_seconds(""), 0.5);
    }

    #[tokio::test]
    async fn test_synthesize_uses_service_duration_when_present() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"audio": "QUJD", "duration_seconds": 3.25}),
            ))
            .mount(&server)
            .await;

        let tts = HttpTextToSpeech::new(server.uri(), "k".to_string(), "v".to_string());
        let audio = tts.synthesize("hello").await.unwrap();
        assert_eq!(audio.audio_base64, "QUJD");
        assert_eq!(audio.duration_seconds, 3.25);
    }

    #[tokio::test]
    async fn test_synthesize_estimates_missing_duration() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"audio": "QUJD"})))
            .mount(&server)
            .await;

        let tts = HttpTextToSpeech::new(server.uri(), "k".to_string(), "v".to_string());
        let audio = tts.synthesize("one two three four five").await.unwrap();
        assert_eq!(audio.duration_seconds, 2.0);
    }

    #[tokio::test]
    async fn test_empty_audio_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"audio": ""})))
            .mount(&server)
            .await;

        let tts = HttpTextToSpeech::new(server.uri(), "k".to_string(), "v".to_string());
        assert!(matches!(
            tts.synthesize("hi").await,
            Err(ProviderError::Empty)
        ));
    }
}
