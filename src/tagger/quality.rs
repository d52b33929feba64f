use image::RgbImage;

/// Confidence reported by [`StubValidator`] for every image.
pub const STUB_CONFIDENCE: f32 = 0.95;

/// Scores how well a normalized image matches its label, in `[0, 1]`.
pub trait LabelValidator: Send + Sync {
    fn validate(&self, image: &RgbImage, label: &str) -> f32;
}

/// Accepts everything with a fixed confidence. Stands in until a real
/// image/text model is wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubValidator;

impl LabelValidator for StubValidator {
    fn validate(&self, _image: &RgbImage, label: &str) -> f32 {
        log::debug!("label '{label}' accepted without validation");
        STUB_CONFIDENCE
    }
}
