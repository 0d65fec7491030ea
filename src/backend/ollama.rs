//! LLaVA over HTTP.
//!
//! Talks to any server exposing Ollama's `/api/generate` route. Prompts are
//! sent in raw mode so the LLaVA template (and its delimiter) reaches the
//! model untouched.

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::{
    error::ModelError,
    image_io::encode_png,
    model::{VisionModel, VisionRequest, VisionResponse},
    prompt::{IMAGE_PLACEHOLDER, strip_image_placeholder},
};

pub const DEFAULT_URL: &str = "http://localhost:11434";
/// Where an attached image goes in a raw prompt.
const IMAGE_TAG: &str = "[img-0]";
/// LLaVA 1.5 7B, the model the prompts were tuned on.
pub const DEFAULT_MODEL: &str = "llava:7b";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Clone, Debug)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    /// Prefix the completion with the prompt, the way a decoded `generate`
    /// output reads.
    pub echo_prompt: bool,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            echo_prompt: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: usize,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    raw: bool,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Blocking client. Construct and drop it outside of an async runtime.
pub struct OllamaModel {
    config: OllamaConfig,
    client: reqwest::blocking::Client,
}

impl OllamaModel {
    pub fn new(config: OllamaConfig) -> Result<Self, ModelError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.config.base_url.trim_end_matches('/'))
    }

    /// Raw mode only places an image where the prompt names it, so the
    /// placeholder becomes Ollama's tag when an image is attached.
    fn generate_request(&self, request: &VisionRequest) -> Result<GenerateRequest, ModelError> {
        let (prompt, images) = match &request.image {
            Some(image) => (
                request.prompt.replacen(IMAGE_PLACEHOLDER, IMAGE_TAG, 1),
                vec![STANDARD.encode(encode_png(image)?)],
            ),
            None => (strip_image_placeholder(&request.prompt), Vec::new()),
        };
        Ok(GenerateRequest {
            model: self.config.model.clone(),
            prompt,
            images,
            raw: true,
            stream: false,
            options: GenerateOptions {
                num_predict: request.params.max_new_tokens,
                temperature: request.params.effective_temperature(),
            },
        })
    }

    fn decoded_text(&self, prompt: &str, completion: String) -> String {
        if self.config.echo_prompt {
            format!("{prompt}{completion}")
        } else {
            completion
        }
    }
}

fn error_from_body(status: u16, body: &str) -> ModelError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.trim().to_string());
    ModelError::from_message(status, message)
}

impl VisionModel for OllamaModel {
    fn name(&self) -> &str {
        &self.config.model
    }

    fn run(&mut self, request: VisionRequest) -> Result<VisionResponse, ModelError> {
        let body = self.generate_request(&request)?;
        log::debug!("Generating with {} at {}", self.config.model, self.endpoint());

        let response = self.client.post(self.endpoint()).json(&body).send()?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(error_from_body(status.as_u16(), &text));
        }

        let generated: GenerateResponse = response.json()?;
        let prompt = strip_image_placeholder(&request.prompt);
        Ok(VisionResponse {
            text: self.decoded_text(&prompt, generated.response),
        })
    }
}
