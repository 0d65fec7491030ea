use serde::{Deserialize, Serialize};

use crate::analysis::PromptAnalysis;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisResponse {
    pub success: bool,
    pub analysis: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VariationsResponse {
    pub success: bool,
    pub analyses: Vec<PromptAnalysis>,
}

/// Body of every error reply.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorDetail {
    pub detail: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PingResponse {
    pub status: String,
    pub message: String,
}

impl PingResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            message: "API is running".to_string(),
        }
    }
}
