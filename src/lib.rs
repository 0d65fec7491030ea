//! Ask a vision-language model which city sits at the center of a map.
//!
//! The model is opaque: anything implementing [`VisionModel`] can be used.
//! It is loaded once, moved onto the [`InferenceEngine`] thread, and fed one
//! request at a time by the HTTP server, the CLI and the image-size probe.

pub mod analysis;
pub mod backend;
pub mod commands;
pub mod engine;
pub mod error;
pub mod image_io;
pub mod messages;
pub mod model;
pub mod probe;
pub mod prompt;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

pub use analysis::{AnalysisTask, MapAnalyzer, PromptAnalysis};
pub use backend::{BackendConfig, BackendKind, BoxedModel};
pub use engine::{EngineResponse, EngineState, InferenceEngine};
pub use error::{GeogenieError, ModelError, Result};
pub use model::{GenerationParams, VisionModel, VisionRequest, VisionResponse};
pub use probe::{ProbeReport, SizeProbe};
pub use prompt::{AnswerStyle, PromptTemplate};
