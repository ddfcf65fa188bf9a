//! Gemini streamed chat completion
//!
//! Calls `streamGenerateContent?alt=sse` and parses the SSE body with
//! `eventsource-stream`. Each event carries a partial `GenerateContentResponse`;
//! text parts are forwarded to the caller as they arrive, and the first
//! appearance of grounding metadata raises a one-shot web-search event.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{ChatCompletion, ChatEvent, ChatEventCallback, ChatOutcome, ProviderError};
use crate::core::history::{ChatRole, ChatTurn};

pub struct GeminiChat {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
    #[serde(rename = "groundingMetadata")]
    grounding_metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiChat {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model,
        }
    }

    fn request_body(history: &[ChatTurn]) -> serde_json::Value {
        let contents: Vec<serde_json::Value> = history
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    ChatRole::User => "user",
                    ChatRole::Model => "model",
                };
                json!({ "role": role, "parts": [{ "text": turn.content }] })
            })
            .collect();
        json!({
            "contents": contents,
            "tools": [{ "google_search": {} }]
        })
    }
}

#[async_trait]
impl ChatCompletion for GeminiChat {
    async fn generate(
        &self,
        history: &[ChatTurn],
        on_event: ChatEventCallback,
    ) -> Result<ChatOutcome, ProviderError> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request_body(history))
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

        let mut events = response.bytes_stream().eventsource();
        let mut text = String::new();
        let mut used_web_search = false;

        while let Some(event) = events.next().await {
            let event = event.map_err(|e| ProviderError::Http(format!("SSE stream error: {e}")))?;
            let parsed: StreamResponse = serde_json::from_str(&event.data)
                .map_err(|e| ProviderError::Decode(format!("bad stream payload: {e}")))?;

            for candidate in parsed.candidates {
                if !used_web_search && candidate.grounding_metadata.is_some() {
                    used_web_search = true;
                    debug!("Chat response is grounded in web search");
                    on_event(ChatEvent::WebSearch).await;
                }
                let Some(content) = candidate.content else {
                    continue;
                };
                for part in content.parts {
                    if let Some(chunk) = part.text
                        && !chunk.is_empty()
                    {
                        text.push_str(&chunk);
                        on_event(ChatEvent::Chunk(chunk)).await;
                    }
                }
            }
        }

        if text.is_empty() {
            return Err(ProviderError::Empty);
        }
        Ok(ChatOutcome {
            text,
            used_web_search,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn collecting_callback() -> (ChatEventCallback, Arc<Mutex<Vec<ChatEvent>>>) {
        let seen: Arc<Mutex<Vec<ChatEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ChatEventCallback = Arc::new(move |event| {
            let sink = sink.clone();
            Box::pin(async move {
                sink.lock().push(event);
            })
        });
        (callback, seen)
    }

    fn user_turn(text: &str) -> ChatTurn {
        ChatTurn {
            role: ChatRole::User,
            content: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_streams_chunks_and_accumulates_text() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"lo\"}]}}]}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/models/test-model:streamGenerateContent"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;

        let chat = GeminiChat::new(server.uri(), "k".to_string(), "test-model".to_string());
        let (callback, seen) = collecting_callback();
        let outcome = chat.generate(&[user_turn("hi")], callback).await.unwrap();

        assert_eq!(outcome.text, "Hello");
        assert!(!outcome.used_web_search);
        let chunks: Vec<String> = seen
            .lock()
            .iter()
            .filter_map(|e| match e {
                ChatEvent::Chunk(c) => Some(c.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(chunks, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_grounding_metadata_raises_one_web_search_event() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"a\"}]},\"groundingMetadata\":{}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"b\"}]},\"groundingMetadata\":{}}]}\n\n",
        );
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;

        let chat = GeminiChat::new(server.uri(), "k".to_string(), "m".to_string());
        let (callback, seen) = collecting_callback();
        let outcome = chat.generate(&[user_turn("hi")], callback).await.unwrap();

        assert!(outcome.used_web_search);
        let web_search_events = seen
            .lock()
            .iter()
            .filter(|e| matches!(e, ChatEvent::WebSearch))
            .count();
        assert_eq!(web_search_events, 1);
    }

    #[tokio::test]
    async fn test_api_error_is_surfaced_with_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exhausted"))
            .mount(&server)
            .await;

        let chat = GeminiChat::new(server.uri(), "k".to_string(), "m".to_string());
        let (callback, _) = collecting_callback();
        let err = chat.generate(&[user_turn("hi")], callback).await.unwrap_err();
        match err {
            ProviderError::Api { status, message } => {
                assert_eq!(status, 429);
                assert!(message.contains("quota"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_stream_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(""),
            )
            .mount(&server)
            .await;

        let chat = GeminiChat::new(server.uri(), "k".to_string(), "m".to_string());
        let (callback, _) = collecting_callback();
        assert!(matches!(
            chat.generate(&[user_turn("hi")], callback).await,
            Err(ProviderError::Empty)
        ));
    }
}
