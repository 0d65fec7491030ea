//! Concrete [`VisionModel`] implementations.

use std::{fmt, str::FromStr};

use crate::{error::Result, model::VisionModel};

pub mod ollama;
#[cfg(feature = "paligemma")]
pub mod paligemma;

pub use ollama::{OllamaConfig, OllamaModel};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// LLaVA served over HTTP by an Ollama-compatible server.
    #[default]
    Ollama,
    /// PaliGemma running in-process through kornia-vlm.
    Paligemma,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Ollama => "ollama",
            BackendKind::Paligemma => "paligemma",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ollama" => Ok(BackendKind::Ollama),
            "paligemma" => Ok(BackendKind::Paligemma),
            other => Err(format!("unknown backend `{other}`, expected ollama or paligemma")),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub ollama: OllamaConfig,
}

pub type BoxedModel = Box<dyn VisionModel + Send>;

impl BackendConfig {
    /// Loads the configured model. Called once per process.
    pub fn build(&self) -> Result<BoxedModel> {
        log::info!("Loading {} model...", self.kind);
        let model: BoxedModel = match self.kind {
            BackendKind::Ollama => Box::new(OllamaModel::new(self.ollama.clone())?),
            BackendKind::Paligemma => load_paligemma()?,
        };
        log::info!("{} model loaded successfully!", model.name());
        Ok(model)
    }
}

#[cfg(feature = "paligemma")]
fn load_paligemma() -> Result<BoxedModel> {
    Ok(Box::new(paligemma::PaligemmaModel::new()?))
}

#[cfg(not(feature = "paligemma"))]
fn load_paligemma() -> Result<BoxedModel> {
    Err(crate::error::GeogenieError::InvalidConfig(
        "built without the `paligemma` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeogenieError;

    #[test]
    fn backend_names_parse_case_insensitively() {
        assert_eq!("Ollama".parse::<BackendKind>(), Ok(BackendKind::Ollama));
        assert_eq!("paligemma".parse::<BackendKind>(), Ok(BackendKind::Paligemma));
        assert!("torch".parse::<BackendKind>().is_err());
    }

    #[cfg(not(feature = "paligemma"))]
    #[test]
    fn paligemma_needs_its_feature() {
        let config = BackendConfig {
            kind: BackendKind::Paligemma,
            ..Default::default()
        };
        assert!(matches!(config.build(), Err(GeogenieError::InvalidConfig(_))));
    }
}
