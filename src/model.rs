use image::RgbImage;

use crate::error::ModelError;

/// Decoding settings forwarded to the model's generate call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GenerationParams {
    pub max_new_tokens: usize,
    pub do_sample: bool,
    pub temperature: f32,
}

impl GenerationParams {
    pub fn greedy(max_new_tokens: usize) -> Self {
        Self {
            max_new_tokens,
            do_sample: false,
            temperature: 1.0,
        }
    }

    pub fn sampled(max_new_tokens: usize, temperature: f32) -> Self {
        Self {
            max_new_tokens,
            do_sample: true,
            temperature,
        }
    }

    /// Temperature to hand a backend that has no separate sampling switch.
    pub fn effective_temperature(&self) -> f32 {
        if self.do_sample { self.temperature } else { 0.0 }
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::greedy(200)
    }
}

/// One prompt plus an optional image, ready for a single generate call.
#[derive(Clone, Debug)]
pub struct VisionRequest {
    pub prompt: String,
    pub image: Option<RgbImage>,
    pub params: GenerationParams,
}

impl VisionRequest {
    pub fn new(prompt: impl Into<String>, image: RgbImage, params: GenerationParams) -> Self {
        Self {
            prompt: prompt.into(),
            image: Some(image),
            params,
        }
    }

    pub fn text_only(prompt: impl Into<String>, params: GenerationParams) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
            params,
        }
    }

    /// Prompt and image size, kept around after the request has been consumed.
    pub fn metadata(&self) -> RequestMetadata {
        RequestMetadata {
            prompt: self.prompt.clone(),
            image_size: self.image.as_ref().map(|img| img.dimensions()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RequestMetadata {
    pub prompt: String,
    pub image_size: Option<(u32, u32)>,
}

/// Decoded output of a generate call.
///
/// Decoder-only models echo the prompt, so `text` may start with it.
#[derive(Clone, Debug, PartialEq)]
pub struct VisionResponse {
    pub text: String,
}

/// A vision-language model that turns an image and a prompt into text.
///
/// Implementations are driven from a single thread and may keep mutable
/// state such as KV caches between calls.
pub trait VisionModel {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    fn run(&mut self, request: VisionRequest) -> Result<VisionResponse, ModelError>;
}

impl<M: VisionModel + ?Sized> VisionModel for Box<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn run(&mut self, request: VisionRequest) -> Result<VisionResponse, ModelError> {
        (**self).run(request)
    }
}
