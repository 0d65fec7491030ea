//! Bodies of the `geogenie` CLI subcommands.
//!
//! Each command drives a loaded [`VisionModel`] directly and writes its
//! report to `out`.

use std::{io::Write, path::Path};

use crate::{
    error::Result,
    image_io,
    model::{GenerationParams, VisionModel, VisionRequest},
    probe::SizeProbe,
    prompt::{AnswerStyle, PromptTemplate, presets},
};

/// Tokens generated per map by [`batch`].
pub const BATCH_MAX_NEW_TOKENS: usize = 100;
/// Tokens generated by [`text`].
pub const TEXT_MAX_NEW_TOKENS: usize = 256;

/// Asks which city sits at the center of the map at `image_path`.
///
/// `question` replaces the default bay-area question. With `raw` the whole
/// decoded output is printed instead of the text after `ASSISTANT:`.
pub fn guess<M: VisionModel + ?Sized>(
    model: &mut M,
    image_path: &Path,
    question: Option<&str>,
    max_new_tokens: usize,
    raw: bool,
    out: &mut impl Write,
) -> Result<()> {
    let template = match question {
        Some(question) => PromptTemplate::assistant(question),
        None => presets::bay_area(),
    };
    let image = image_io::read_rgb(image_path)?;
    let request = VisionRequest::new(
        template.text(),
        image,
        GenerationParams::greedy(max_new_tokens),
    );

    let response = model.run(request)?;
    let answer = if raw {
        response.text
    } else {
        template.extract(&response.text, AnswerStyle::Strip)
    };
    writeln!(out, "LLaVA says: {answer}")?;
    Ok(())
}

pub fn text<M: VisionModel + ?Sized>(model: &mut M, prompt: &str, out: &mut impl Write) -> Result<()> {
    let request = VisionRequest::text_only(prompt, GenerationParams::greedy(TEXT_MAX_NEW_TOKENS));
    let response = model.run(request)?;
    writeln!(out, "\nPrompt: {prompt}")?;
    writeln!(out, "\nResponse: {}", response.text)?;
    Ok(())
}

/// Guesses every map in `dir` in path order. A map that fails is reported
/// and skipped.
pub fn batch<M: VisionModel + ?Sized>(model: &mut M, dir: &Path, out: &mut impl Write) -> Result<()> {
    let template = presets::americas();
    for path in image_io::collect_images(dir)? {
        writeln!(out, "\nProcessing image: {}", path.display())?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let result = image_io::read_rgb(&path).and_then(|image| {
            let request = VisionRequest::new(
                template.text(),
                image,
                GenerationParams::greedy(BATCH_MAX_NEW_TOKENS),
            );
            Ok(model.run(request)?)
        });
        match result {
            Ok(response) => writeln!(out, "For map {name}, LLaVA says: {}", response.text)?,
            Err(e) => {
                log::warn!("Skipping {}: {e}", path.display());
                writeln!(out, "For map {name}, LLaVA failed: {e}")?
            }
        }
    }
    Ok(())
}

pub fn probe<M: VisionModel + ?Sized>(model: &mut M, image_path: &Path, out: &mut impl Write) -> Result<()> {
    writeln!(out, "Testing with image: {}", image_path.display())?;
    let image = image_io::read_rgb(image_path)?;
    let (width, height) = image.dimensions();
    writeln!(out, "Original image size: {width}x{height}")?;

    let report = SizeProbe::default().run(model, &image);
    for attempt in &report.attempts {
        writeln!(out, "{attempt}")?;
    }
    if let Some(finding) = report.key_finding() {
        writeln!(out, "{finding}")?;
    }
    Ok(())
}
