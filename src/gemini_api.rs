use base64::Engine;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::artifact::Artifact;
use crate::config::ClientConfig;
use crate::error::{GenMediaError, Result, error_for_response};

const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-preview";

/// Client for Gemini's native image output (`generateContent`)
#[derive(Debug, Clone)]
pub struct FlashImageClient {
    client: Client,
    config: ClientConfig,
    model: String,
}

impl FlashImageClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = config.http_client()?;
        Ok(Self {
            client,
            config,
            model: DEFAULT_MODEL.to_string(),
        })
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_payload(prompt: &str) -> Value {
        json!({
            "contents": [{
                "parts": [{"text": prompt}]
            }]
        })
    }

    /// Collect every inline image in `candidates[0].content.parts`.
    fn extract_images(data: &Value) -> Result<Vec<Artifact>> {
        let parts = data["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| GenMediaError::InvalidResponse("Missing parts in response".to_string()))?;

        let mut images = Vec::new();
        for part in parts {
            let inline_data = part.get("inlineData").or_else(|| part.get("inline_data"));

            if let Some(inline_data) = inline_data {
                let mime_type = inline_data
                    .get("mimeType")
                    .or_else(|| inline_data.get("mime_type"))
                    .and_then(Value::as_str)
                    .unwrap_or("image/png")
                    .to_string();
                let base64_data = inline_data["data"].as_str().ok_or_else(|| {
                    GenMediaError::InvalidResponse("Missing image data".to_string())
                })?;

                let bytes = base64::engine::general_purpose::STANDARD.decode(base64_data)?;
                images.push(Artifact::new(bytes, mime_type));
            } else if let Some(text) = part.get("text").and_then(Value::as_str) {
                debug!("Model returned text alongside images: {}", text);
            }
        }

        Ok(images)
    }

    /// Generate images from a text prompt.
    ///
    /// Returns an empty list when the model answered with text only.
    pub async fn generate_images(&self, prompt: &str) -> Result<Vec<Artifact>> {
        let url = self.config.model_url(&self.model, "generateContent");
        let payload = Self::build_payload(prompt);

        debug!(
            "Sending image generation request to Gemini API (model: {})",
            self.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.config.api_key())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        debug!("Received response with status: {}", status);

        if !status.is_success() {
            return Err(error_for_response(response).await);
        }

        let data: Value = response.json().await?;

        if let Some(reason) = data["promptFeedback"]["blockReason"].as_str() {
            return Err(GenMediaError::ContentBlocked(reason.to_string()));
        }

        let images = Self::extract_images(&data)?;
        info!("Gemini returned {} image(s)", images.len());
        Ok(images)
    }
}
