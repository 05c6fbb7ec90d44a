use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::artifact::Artifact;
use crate::config::ClientConfig;
use crate::error::{GenMediaError, Result, error_for_response};

const DEFAULT_NUMBER_OF_IMAGES: u32 = 4;
const MAX_NUMBER_OF_IMAGES: u32 = 4;

/// Supported Imagen 4 model variants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImagenModel {
    #[default]
    Standard,
    Ultra,
    Fast,
}

impl ImagenModel {
    pub fn api_model_name(&self) -> &'static str {
        match self {
            ImagenModel::Standard => "imagen-4.0-generate-001",
            ImagenModel::Ultra => "imagen-4.0-ultra-generate-001",
            ImagenModel::Fast => "imagen-4.0-fast-generate-001",
        }
    }
}

impl fmt::Display for ImagenModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImagenModel::Standard => write!(f, "standard"),
            ImagenModel::Ultra => write!(f, "ultra"),
            ImagenModel::Fast => write!(f, "fast"),
        }
    }
}

impl FromStr for ImagenModel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" | "imagen-4.0-generate-001" => Ok(ImagenModel::Standard),
            "ultra" | "imagen-4.0-ultra-generate-001" => Ok(ImagenModel::Ultra),
            "fast" | "imagen-4.0-fast-generate-001" => Ok(ImagenModel::Fast),
            _ => Err(format!(
                "Unknown model: {}. Use 'standard', 'ultra' or 'fast'",
                s
            )),
        }
    }
}

/// Aspect ratio options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AspectRatio {
    #[default]
    Square, // 1:1
    Wide,     // 16:9
    Tall,     // 9:16
    Standard, // 4:3
    Portrait, // 3:4
}

impl AspectRatio {
    pub fn api_value(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Wide => "16:9",
            AspectRatio::Tall => "9:16",
            AspectRatio::Standard => "4:3",
            AspectRatio::Portrait => "3:4",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.api_value())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "1:1" | "square" => Ok(AspectRatio::Square),
            "16:9" | "wide" => Ok(AspectRatio::Wide),
            "9:16" | "tall" => Ok(AspectRatio::Tall),
            "4:3" | "standard" => Ok(AspectRatio::Standard),
            "3:4" | "portrait" => Ok(AspectRatio::Portrait),
            _ => Err(format!(
                "Invalid aspect ratio: {}. Use 1:1, 16:9, 9:16, 4:3, or 3:4",
                s
            )),
        }
    }
}

/// Whether generated images may depict people
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PersonGeneration {
    DontAllow,
    #[default]
    AllowAdult,
    AllowAll,
}

impl PersonGeneration {
    pub fn api_value(&self) -> &'static str {
        match self {
            PersonGeneration::DontAllow => "dont_allow",
            PersonGeneration::AllowAdult => "allow_adult",
            PersonGeneration::AllowAll => "allow_all",
        }
    }
}

/// Per-request generation settings
#[derive(Debug, Clone)]
pub struct ImagenConfig {
    pub number_of_images: u32,
    pub aspect_ratio: AspectRatio,
    pub person_generation: PersonGeneration,
}

impl Default for ImagenConfig {
    fn default() -> Self {
        Self {
            number_of_images: DEFAULT_NUMBER_OF_IMAGES,
            aspect_ratio: AspectRatio::default(),
            person_generation: PersonGeneration::default(),
        }
    }
}

impl ImagenConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_number_of_images(mut self, n: u32) -> Self {
        self.number_of_images = n;
        self
    }

    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = ratio;
        self
    }

    pub fn with_person_generation(mut self, person_generation: PersonGeneration) -> Self {
        self.person_generation = person_generation;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.number_of_images == 0 || self.number_of_images > MAX_NUMBER_OF_IMAGES {
            return Err(GenMediaError::InvalidConfig(format!(
                "number of images must be between 1 and {}, got {}",
                MAX_NUMBER_OF_IMAGES, self.number_of_images
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    rai_filtered_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ImagenClient {
    client: Client,
    config: ClientConfig,
    model: ImagenModel,
    gen_config: ImagenConfig,
}

impl ImagenClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_model(config, ImagenModel::default())
    }

    pub fn with_model(config: ClientConfig, model: ImagenModel) -> Result<Self> {
        let client = config.http_client()?;
        Ok(Self {
            client,
            config,
            model,
            gen_config: ImagenConfig::default(),
        })
    }

    /// Settings used when generating through [`crate::job::ImageBackend`].
    pub fn with_generation_config(mut self, gen_config: ImagenConfig) -> Self {
        self.gen_config = gen_config;
        self
    }

    pub fn model(&self) -> ImagenModel {
        self.model
    }

    pub fn generation_config(&self) -> &ImagenConfig {
        &self.gen_config
    }

    fn build_payload(prompt: &str, gen_config: &ImagenConfig) -> Value {
        json!({
            "instances": [{"prompt": prompt}],
            "parameters": {
                "sampleCount": gen_config.number_of_images,
                "aspectRatio": gen_config.aspect_ratio.api_value(),
                "personGeneration": gen_config.person_generation.api_value()
            }
        })
    }

    /// Decode every prediction that carries image bytes.
    ///
    /// Predictions removed by the safety filter are logged and skipped.
    fn parse_predictions(response: PredictResponse) -> Result<Vec<Artifact>> {
        let mut images = Vec::with_capacity(response.predictions.len());

        for prediction in response.predictions {
            match prediction.bytes_base64_encoded {
                Some(encoded) => {
                    let data = base64::engine::general_purpose::STANDARD.decode(encoded)?;
                    let mime_type = prediction
                        .mime_type
                        .unwrap_or_else(|| "image/png".to_string());
                    images.push(Artifact::new(data, mime_type));
                }
                None => {
                    if let Some(reason) = prediction.rai_filtered_reason {
                        warn!("Image removed by safety filter: {}", reason);
                    }
                }
            }
        }

        Ok(images)
    }

    /// Generate images from a text prompt.
    ///
    /// A successful call can legitimately return no images.
    pub async fn generate_images(
        &self,
        prompt: &str,
        gen_config: &ImagenConfig,
    ) -> Result<Vec<Artifact>> {
        gen_config.validate()?;

        let url = self
            .config
            .model_url(self.model.api_model_name(), "predict");
        let payload = Self::build_payload(prompt, gen_config);

        debug!(
            "Sending image generation request to Imagen API (model: {}, images: {})",
            self.model, gen_config.number_of_images
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

        let body: PredictResponse = response.json().await?;
        let images = Self::parse_predictions(body)?;
        info!("Imagen returned {} image(s)", images.len());
        Ok(images)
    }
}
