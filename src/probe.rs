//! Finds an image size the model's processor will accept.
//!
//! Some processor versions compute a number of image tokens that does not
//! match the number of image features for arbitrary sizes. The probe resizes
//! the image to a few candidate sizes and keeps the first one that runs.

use std::fmt;

use image::RgbImage;

use crate::{
    image_io::resize_exact,
    model::{GenerationParams, VisionModel, VisionRequest},
    prompt::presets,
};

/// Square sizes commonly used by vision encoders, smallest first.
pub const STANDARD_SIZES: [(u32, u32); 5] = [
    (224, 224),
    (336, 336),
    (448, 448),
    (672, 672),
    (1024, 1024),
];

/// Factors applied to the original size after the standard sizes.
/// Doubling comes first.
pub const SCALE_FACTORS: [f32; 4] = [2.0, 1.5, 3.0, 4.0];

#[derive(Clone, Debug, PartialEq)]
pub enum ProbeOutcome {
    Success,
    /// Processor rejected the size with a token/feature mismatch.
    TokenMismatch(String),
    /// Any other failure.
    Error(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProbeAttempt {
    pub width: u32,
    pub height: u32,
    pub outcome: ProbeOutcome,
}

impl ProbeAttempt {
    pub fn succeeded(&self) -> bool {
        self.outcome == ProbeOutcome::Success
    }
}

impl fmt::Display for ProbeAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = (self.width, self.height);
        match &self.outcome {
            ProbeOutcome::Success => write!(f, "SUCCESS: Size {w}x{h} works!"),
            ProbeOutcome::TokenMismatch(e) => write!(f, "FAILED: Size {w}x{h} - {e}"),
            ProbeOutcome::Error(e) => write!(f, "ERROR: Size {w}x{h} - {e}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProbeReport {
    pub original: (u32, u32),
    pub attempts: Vec<ProbeAttempt>,
    /// First standard size that worked.
    pub standard_fit: Option<(u32, u32)>,
    /// First scale factor of the original size that worked.
    pub scale_fit: Option<f32>,
}

impl ProbeReport {
    pub fn key_finding(&self) -> Option<String> {
        self.scale_fit.map(|scale| {
            if scale == 2.0 {
                "KEY FINDING: The image needs to be exactly 2x the original size.".to_string()
            } else {
                format!("KEY FINDING: The image needs to be scaled by {scale}x.")
            }
        })
    }
}

/// Candidate sizes and scale factors to try.
#[derive(Clone, Debug)]
pub struct SizeProbe {
    pub standard_sizes: Vec<(u32, u32)>,
    pub scale_factors: Vec<f32>,
}

impl Default for SizeProbe {
    fn default() -> Self {
        Self {
            standard_sizes: STANDARD_SIZES.to_vec(),
            scale_factors: SCALE_FACTORS.to_vec(),
        }
    }
}

impl SizeProbe {
    /// Tries the standard sizes until one works, then the scale factors
    /// until one works.
    pub fn run<M: VisionModel + ?Sized>(&self, model: &mut M, image: &RgbImage) -> ProbeReport {
        let (orig_width, orig_height) = image.dimensions();
        let mut attempts = Vec::new();

        let mut standard_fit = None;
        for &(width, height) in &self.standard_sizes {
            let attempt = try_size(model, image, width, height);
            let ok = attempt.succeeded();
            attempts.push(attempt);
            if ok {
                standard_fit = Some((width, height));
                break;
            }
        }

        let mut scale_fit = None;
        if orig_width > 0 && orig_height > 0 {
            for &scale in &self.scale_factors {
                let width = (orig_width as f32 * scale) as u32;
                let height = (orig_height as f32 * scale) as u32;
                let attempt = try_size(model, image, width, height);
                let ok = attempt.succeeded();
                attempts.push(attempt);
                if ok {
                    scale_fit = Some(scale);
                    break;
                }
            }
        }

        ProbeReport {
            original: (orig_width, orig_height),
            attempts,
            standard_fit,
            scale_fit,
        }
    }
}

fn try_size<M: VisionModel + ?Sized>(
    model: &mut M,
    image: &RgbImage,
    width: u32,
    height: u32,
) -> ProbeAttempt {
    let resized = resize_exact(image, width, height);
    let request = VisionRequest::new(presets::probe().text(), resized, GenerationParams::greedy(1));

    let outcome = match model.run(request) {
        Ok(_) => ProbeOutcome::Success,
        Err(e) if e.is_token_mismatch() => ProbeOutcome::TokenMismatch(e.to_string()),
        Err(e) => ProbeOutcome::Error(e.to_string()),
    };
    let attempt = ProbeAttempt {
        width,
        height,
        outcome,
    };
    log::info!("{attempt}");
    attempt
}
