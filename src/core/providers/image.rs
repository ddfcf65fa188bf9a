//! Gemini image-edit adapter
//!
//! Sends the session's current image inline with the edit instruction and
//! returns the first image part of the response. The negative prompt, when
//! present, is folded into the instruction text since the generateContent
//! API has no separate field for it.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{ImageEditor, ProviderError};

pub struct GeminiImageEditor {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EditResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(rename = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
}

impl GeminiImageEditor {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model,
        }
    }

    fn instruction(prompt: &str, negative_prompt: Option<&str>) -> String {
        match negative_prompt {
            Some(negative) if !negative.trim().is_empty() => {
                format!("{prompt}. Do not include: {negative}")
            }
            _ => prompt.to_string(),
        }
    }
}

#[async_trait]
impl ImageEditor for GeminiImageEditor {
    async fn edit(
        &self,
        image_base64: &str,
        prompt: &str,
        negative_prompt: Option<&str>,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": Self::instruction(prompt, negative_prompt) },
                    { "inlineData": { "mimeType": "image/png", "data": image_base64 } }
                ]
            }],
            "generationConfig": { "responseModalities": ["IMAGE", "TEXT"] }
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
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

        let parsed: EditResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.inline_data.map(|d| d.data))
            .ok_or(ProviderError::Empty)
    }
}
