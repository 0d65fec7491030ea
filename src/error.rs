use std::path::PathBuf;

/// Phrase the LLaVA processor emits when the image token count and the image
/// feature count disagree.
pub const TOKEN_MISMATCH_MARKER: &str = "Image features and image tokens do not match";

/// Errors raised by a [`crate::VisionModel`] backend.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The processor rejected the image size.
    #[error("{0}")]
    TokenMismatch(String),

    #[error("this model needs an image to run")]
    ImageRequired,

    #[error("backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),

    #[error("inference failed: {0}")]
    Inference(String),
}

impl ModelError {
    /// Classifies a free-form backend message, promoting token mismatches.
    pub fn from_message(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains(TOKEN_MISMATCH_MARKER) {
            ModelError::TokenMismatch(message)
        } else {
            ModelError::Backend { status, message }
        }
    }

    pub fn is_token_mismatch(&self) -> bool {
        matches!(self, ModelError::TokenMismatch(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GeogenieError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("cannot identify image: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("unsupported image format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("inference engine is not running")]
    EngineClosed,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T, E = GeogenieError> = std::result::Result<T, E>;
