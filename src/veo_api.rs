//! Veo video generation over the long-running operation API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::artifact::Artifact;
use crate::config::ClientConfig;
use crate::error::{GenMediaError, Result, error_for_response};
use crate::operation::{Operation, OperationSource};

const DEFAULT_MODEL: &str = "veo-3.1-generate-preview";
const DEFAULT_VIDEO_MIME: &str = "video/mp4";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VideoAspectRatio {
    #[default]
    Landscape, // 16:9
    Portrait, // 9:16
}

impl VideoAspectRatio {
    pub fn api_value(&self) -> &'static str {
        match self {
            VideoAspectRatio::Landscape => "16:9",
            VideoAspectRatio::Portrait => "9:16",
        }
    }
}

impl fmt::Display for VideoAspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.api_value())
    }
}

impl FromStr for VideoAspectRatio {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "16:9" | "landscape" => Ok(VideoAspectRatio::Landscape),
            "9:16" | "portrait" => Ok(VideoAspectRatio::Portrait),
            _ => Err(format!(
                "Invalid video aspect ratio: {}. Use 16:9 or 9:16",
                s
            )),
        }
    }
}

/// A single video generation request
#[derive(Debug, Clone, Default)]
pub struct VideoRequest {
    pub prompt: String,
    pub aspect_ratio: Option<VideoAspectRatio>,
    pub negative_prompt: Option<String>,
}

impl VideoRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_aspect_ratio(mut self, ratio: VideoAspectRatio) -> Self {
        self.aspect_ratio = Some(ratio);
        self
    }

    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative_prompt.into());
        self
    }
}

/// Result reference carried by a finished Veo operation
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResponse {
    #[serde(default)]
    pub generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateVideoResponse {
    #[serde(default)]
    pub generated_samples: Vec<GeneratedSample>,
    #[serde(default)]
    pub rai_media_filtered_count: Option<u32>,
    #[serde(default)]
    pub rai_media_filtered_reasons: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeneratedSample {
    #[serde(default)]
    pub video: Option<VideoRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoRef {
    #[serde(default)]
    pub uri: Option<String>,
}

impl VideoResponse {
    /// Download URIs of every generated sample, in response order.
    pub fn video_references(&self) -> Vec<String> {
        let Some(generated) = &self.generate_video_response else {
            return Vec::new();
        };

        if generated.rai_media_filtered_count.unwrap_or(0) > 0 {
            warn!(
                "{} video(s) removed by safety filters: {}",
                generated.rai_media_filtered_count.unwrap_or(0),
                generated.rai_media_filtered_reasons.join("; ")
            );
        }

        generated
            .generated_samples
            .iter()
            .filter_map(|sample| sample.video.as_ref()?.uri.clone())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct VeoClient {
    client: Client,
    config: ClientConfig,
    model: String,
}

impl VeoClient {
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

    fn build_payload(request: &VideoRequest) -> Value {
        let mut parameters = json!({});
        if let Some(ratio) = &request.aspect_ratio {
            parameters["aspectRatio"] = json!(ratio.api_value());
        }
        if let Some(negative) = &request.negative_prompt {
            parameters["negativePrompt"] = json!(negative);
        }

        json!({
            "instances": [{"prompt": request.prompt}],
            "parameters": parameters
        })
    }

    fn operation_url(&self, name: &str) -> String {
        format!("{}/{}", self.config.base_url, name.trim_start_matches('/'))
    }

    /// Start a generation job and return its handle.
    pub async fn submit(&self, request: &VideoRequest) -> Result<Operation<VideoResponse>> {
        let url = self.config.model_url(&self.model, "predictLongRunning");
        let payload = Self::build_payload(request);

        debug!(
            "Submitting video generation request to Veo API (model: {})",
            self.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.config.api_key())
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }

        let operation: Operation<VideoResponse> = response.json().await?;
        info!("Video generation job submitted: {}", operation.name);
        Ok(operation)
    }

    /// Fetch a generated video's bytes.
    pub async fn download(&self, uri: &str) -> Result<Artifact> {
        if uri.starts_with("gs://") {
            return Err(GenMediaError::InvalidResponse(format!(
                "video stored in Cloud Storage ({}) cannot be downloaded with an API key",
                uri
            )));
        }

        debug!("Downloading generated video");

        let response = self
            .client
            .get(uri)
            .header("x-goog-api-key", self.config.api_key())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("video/"))
            .unwrap_or(DEFAULT_VIDEO_MIME)
            .to_string();
        let data = response.bytes().await?.to_vec();

        info!("Downloaded video ({} bytes)", data.len());
        Ok(Artifact::new(data, mime_type))
    }
}

#[async_trait]
impl OperationSource for VeoClient {
    type Response = VideoResponse;

    async fn refresh(
        &self,
        operation: &Operation<VideoResponse>,
    ) -> Result<Operation<VideoResponse>> {
        let url = self.operation_url(&operation.name);

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", self.config.api_key())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_response(response).await);
        }

        Ok(response.json().await?)
    }
}
