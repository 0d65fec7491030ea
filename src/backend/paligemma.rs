use kornia_image::{Image, ImageSize, allocator::CpuAllocator};
use kornia_vlm::paligemma::{Paligemma, PaligemmaConfig};

use crate::{
    error::ModelError,
    model::{VisionModel, VisionRequest, VisionResponse},
    prompt::strip_image_placeholder,
};

/// In-process PaliGemma. Only the generated tokens come back, so delimiter
/// extraction leaves its answers untouched.
pub struct PaligemmaModel(Paligemma);

impl PaligemmaModel {
    pub fn new() -> Result<Self, ModelError> {
        let model = Paligemma::new(PaligemmaConfig::default())
            .map_err(|e| ModelError::Inference(e.to_string()))?;
        Ok(Self(model))
    }
}

impl VisionModel for PaligemmaModel {
    fn name(&self) -> &str {
        "paligemma"
    }

    fn run(&mut self, request: VisionRequest) -> Result<VisionResponse, ModelError> {
        let rgb = request.image.ok_or(ModelError::ImageRequired)?;
        let (width, height) = rgb.dimensions();
        let image = Image::<u8, 3, CpuAllocator>::new(
            ImageSize {
                width: width as usize,
                height: height as usize,
            },
            rgb.into_raw(),
            CpuAllocator,
        )
        .map_err(|e| ModelError::Inference(e.to_string()))?;

        if request.params.do_sample {
            log::debug!("paligemma decodes greedily; ignoring temperature");
        }

        let prompt = strip_image_placeholder(&request.prompt);
        let text = self
            .0
            .inference(&image, &prompt, request.params.max_new_tokens, false)
            .map_err(|e| ModelError::from_message(500, e.to_string()))?;

        Ok(VisionResponse { text })
    }
}
