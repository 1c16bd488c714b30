use crate::error::PredictError;
use crate::model::{decode_image, LoadedModel};
use crate::prediction::Prediction;

/// Seam between the host and the inference core. Uploaded bytes go in, a
/// structured prediction comes out; decode and inference failures stay
/// request-scoped.
pub trait ModelService: Send + Sync + 'static {
    fn predict(&self, image_bytes: &[u8]) -> Result<Prediction, PredictError>;
    fn class_labels(&self) -> &[String];
}

impl ModelService for LoadedModel {
    fn predict(&self, image_bytes: &[u8]) -> Result<Prediction, PredictError> {
        let image = decode_image(image_bytes)?;
        self.predict_image(&image)
    }

    fn class_labels(&self) -> &[String] {
        self.class_labels()
    }
}
