use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::{
    engine::{EngineState, InferenceEngine},
    error::Result,
    model::{GenerationParams, VisionModel, VisionRequest},
    prompt::{AnswerStyle, PromptTemplate, presets},
};

/// A prompt together with the decoding settings and extraction style used
/// for it.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisTask {
    pub prompt: PromptTemplate,
    pub style: AnswerStyle,
    pub params: GenerationParams,
}

impl AnalysisTask {
    /// City, country and a fact, sampled at temperature 0.7.
    pub fn map_center() -> Self {
        Self {
            prompt: presets::map_center(),
            style: AnswerStyle::Strip,
            params: GenerationParams::sampled(200, 0.7),
        }
    }

    /// Landmark-aware prompt, greedy, answer keeps its `GEOGENIE:` tag.
    pub fn map_center_detailed() -> Self {
        Self {
            prompt: presets::map_center_detailed(),
            style: AnswerStyle::KeepDelimiter,
            params: GenerationParams::greedy(200),
        }
    }

    pub fn variations() -> Vec<Self> {
        presets::variations()
            .into_iter()
            .map(|prompt| Self {
                prompt,
                ..Self::map_center()
            })
            .collect()
    }

    pub fn request(&self, image: RgbImage) -> VisionRequest {
        VisionRequest::new(self.prompt.text(), image, self.params)
    }
}

/// Answer produced for one prompt.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PromptAnalysis {
    pub prompt: String,
    pub response: String,
}

/// Runs analysis tasks on the shared inference engine.
pub struct MapAnalyzer {
    engine: InferenceEngine,
}

impl MapAnalyzer {
    pub fn new(engine: InferenceEngine) -> Self {
        Self { engine }
    }

    pub fn from_model<M: VisionModel + Send + 'static>(model: M) -> Self {
        Self::new(InferenceEngine::new(model))
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    pub async fn analyze(&self, image: RgbImage, task: &AnalysisTask) -> Result<String> {
        let state = self.engine.state();
        if state == EngineState::Processing {
            log::debug!("Engine is {}, request queued", state.as_str());
        }
        let response = self.engine.infer(task.request(image)).await?;
        let metadata = &response.request_metadata;
        if let Some((width, height)) = metadata.image_size {
            log::debug!("Request #{} carried a {width}x{height} image", response.id);
        }
        log::debug!("Raw model response: {}", response.text);
        let answer = task.prompt.extract(&response.text, task.style);
        log::info!(
            "Request #{} answered in {:?} ({:?} since the model picked it up): {}",
            response.id,
            response.duration,
            response.start_time.elapsed(),
            metadata.prompt.lines().nth(1).unwrap_or(metadata.prompt.as_str()),
        );
        Ok(answer)
    }

    /// Runs every task on the same image, stopping at the first failure.
    pub async fn analyze_all(
        &self,
        image: &RgbImage,
        tasks: &[AnalysisTask],
    ) -> Result<Vec<PromptAnalysis>> {
        let mut analyses = Vec::with_capacity(tasks.len());
        for task in tasks {
            log::info!("Processing prompt: {}", task.prompt.text());
            let response = self.analyze(image.clone(), task).await?;
            analyses.push(PromptAnalysis {
                prompt: task.prompt.text().to_string(),
                response,
            });
        }
        Ok(analyses)
    }
}
