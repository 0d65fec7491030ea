//! Fake models for unit tests.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use crate::{
    error::ModelError,
    model::{GenerationParams, VisionModel, VisionRequest, VisionResponse},
};

#[derive(Clone, Debug, PartialEq)]
pub struct SeenRequest {
    pub prompt: String,
    pub image_size: Option<(u32, u32)>,
    pub params: GenerationParams,
}

/// Replays scripted results in order, then echoes prompts.
pub struct ScriptedModel {
    script: VecDeque<Result<String, ModelError>>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<Result<String, ModelError>>) -> Self {
        Self {
            script: script.into(),
            seen: Arc::default(),
        }
    }

    pub fn echo() -> Self {
        Self::new(Vec::new())
    }

    /// Shared log of every request the model received.
    pub fn seen(&self) -> Arc<Mutex<Vec<SeenRequest>>> {
        self.seen.clone()
    }
}

impl VisionModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn run(&mut self, request: VisionRequest) -> Result<VisionResponse, ModelError> {
        self.seen.lock().unwrap().push(SeenRequest {
            prompt: request.prompt.clone(),
            image_size: request.image.as_ref().map(|img| img.dimensions()),
            params: request.params,
        });
        let text = match self.script.pop_front() {
            Some(result) => result?,
            None => request.prompt,
        };
        Ok(VisionResponse { text })
    }
}

/// Accepts only the listed image sizes, like a processor whose token count
/// only lines up for some resolutions.
pub struct SizeGatedModel {
    pub accepted: Vec<(u32, u32)>,
    pub broken: Vec<(u32, u32)>,
    pub tried: Vec<(u32, u32)>,
}

impl SizeGatedModel {
    pub fn accepting(accepted: &[(u32, u32)]) -> Self {
        Self {
            accepted: accepted.to_vec(),
            broken: Vec::new(),
            tried: Vec::new(),
        }
    }
}

impl VisionModel for SizeGatedModel {
    fn name(&self) -> &str {
        "size-gated"
    }

    fn run(&mut self, request: VisionRequest) -> Result<VisionResponse, ModelError> {
        let size = request
            .image
            .as_ref()
            .map(|img| img.dimensions())
            .ok_or(ModelError::ImageRequired)?;
        self.tried.push(size);
        if self.broken.contains(&size) {
            return Err(ModelError::Inference("CUDA out of memory".into()));
        }
        if self.accepted.contains(&size) {
            Ok(VisionResponse { text: "ok".into() })
        } else {
            Err(ModelError::TokenMismatch(format!(
                "Image features and image tokens do not match: size {}x{}",
                size.0, size.1
            )))
        }
    }
}
