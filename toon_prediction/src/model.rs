use crate::artifact::{ArtifactBundle, Preprocessing};
use crate::error::{LoadError, PredictError};
use crate::prediction::{decode_probabilities, softmax, Prediction};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::{Array, Ix4};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;
use std::io::Cursor;
use std::sync::Mutex;

/// Deserialized artifact: the inference session, its label vocabulary and
/// the preprocessing the model was trained with. Read-only after
/// construction; the session mutex exists because the runtime requires
/// exclusive access during a forward pass.
#[derive(Debug)]
pub struct LoadedModel {
    session: Mutex<Session>,
    output_name: String,
    labels: Vec<String>,
    preprocessing: Preprocessing,
}

impl LoadedModel {
    pub(crate) fn from_bundle(bundle: ArtifactBundle) -> Result<Self, LoadError> {
        let session = build_session(&bundle.weights)
            .map_err(|e| LoadError::UnknownLoadFailure(format!("failed to build inference session: {e}")))?;
        let output_name = session
            .outputs()
            .first()
            .map(|output| output.name().to_string())
            .ok_or_else(|| {
                LoadError::UnknownLoadFailure("model declares no output tensor".to_string())
            })?;

        tracing::info!(
            "Created ONNX session with {} classes",
            bundle.manifest.labels.len()
        );

        Ok(Self {
            session: Mutex::new(session),
            output_name,
            labels: bundle.manifest.labels,
            preprocessing: bundle.manifest.preprocessing,
        })
    }

    pub fn class_labels(&self) -> &[String] {
        &self.labels
    }

    pub fn predict_image(&self, image: &DynamicImage) -> Result<Prediction, PredictError> {
        let input = image_to_tensor(image, &self.preprocessing);
        let scores = self.run_forward(&input)?;

        if scores.len() != self.labels.len() {
            return Err(PredictError::InferenceFailure(format!(
                "model produced {} scores for {} labels",
                scores.len(),
                self.labels.len()
            )));
        }

        let probabilities = softmax(&scores);
        decode_probabilities(probabilities, &self.labels)
    }

    fn run_forward(&self, input: &Array<f32, Ix4>) -> Result<Vec<f32>, PredictError> {
        let mut session = self
            .session
            .lock()
            .map_err(|e| PredictError::InferenceFailure(format!("session mutex poisoned: {e}")))?;

        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.to_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)
            .map_err(|e| PredictError::InferenceFailure(format!("failed to build tensor: {e}")))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| PredictError::InferenceFailure(format!("forward pass failed: {e}")))?;

        let (_shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| {
                PredictError::InferenceFailure(format!("failed to extract tensor: {e}"))
            })?;

        Ok(data.to_vec())
    }
}

fn build_session(weights: &[u8]) -> Result<Session, ort::Error> {
    ort::init().commit();
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .commit_from_memory(weights)
}

pub fn decode_image(image_bytes: &[u8]) -> Result<DynamicImage, PredictError> {
    let reader = image::ImageReader::new(Cursor::new(image_bytes))
        .with_guessed_format()
        .map_err(|e| PredictError::DecodeFailure(e.to_string()))?;

    reader
        .decode()
        .map_err(|e| PredictError::DecodeFailure(e.to_string()))
}

fn image_to_tensor(image: &DynamicImage, preprocessing: &Preprocessing) -> Array<f32, Ix4> {
    let width = preprocessing.input_width;
    let height = preprocessing.input_height;
    let resized = image.resize_exact(width, height, FilterType::CatmullRom);

    let mut input = Array::zeros((1, 3, height as usize, width as usize));
    for pixel in resized.pixels() {
        let x = pixel.0 as usize;
        let y = pixel.1 as usize;
        let [r, g, b, _] = pixel.2 .0;
        input[[0, 0, y, x]] = ((r as f32) / 255. - preprocessing.mean[0]) / preprocessing.std[0];
        input[[0, 1, y, x]] = ((g as f32) / 255. - preprocessing.mean[1]) / preprocessing.std[1];
        input[[0, 2, y, x]] = ((b as f32) / 255. - preprocessing.mean[2]) / preprocessing.std[2];
    }

    input
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn identity_preprocessing(width: u32, height: u32) -> Preprocessing {
        Preprocessing {
            input_width: width,
            input_height: height,
            mean: [0.0, 0.0, 0.0],
            std: [1.0, 1.0, 1.0],
        }
    }

    fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(width, height, Rgb(color));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn image_to_tensor_resizes_to_model_input_shape() {
        let image = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(100, 50, Rgb([255, 0, 0])));

        let input = image_to_tensor(&image, &identity_preprocessing(224, 224));

        assert_eq!(input.shape(), &[1, 3, 224, 224]);
        assert!((input[[0, 0, 0, 0]] - 1.0).abs() < 1e-5);
        assert!(input[[0, 1, 0, 0]].abs() < 1e-5);
        assert!(input[[0, 2, 0, 0]].abs() < 1e-5);
    }

    #[test]
    fn image_to_tensor_applies_mean_std_normalization() {
        let image = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(8, 8, Rgb([255, 255, 255])));
        let preprocessing = Preprocessing {
            input_width: 8,
            input_height: 8,
            mean: [0.5, 0.5, 0.5],
            std: [0.25, 0.25, 0.25],
        };

        let input = image_to_tensor(&image, &preprocessing);

        // (1.0 - 0.5) / 0.25
        assert!((input[[0, 0, 4, 4]] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn decode_image_rejects_non_image_bytes() {
        let err = decode_image(b"this is a plain text file").unwrap_err();

        assert!(matches!(err, PredictError::DecodeFailure(_)));
    }

    #[test]
    fn decode_image_recovers_after_a_rejected_upload() {
        assert!(decode_image(b"not an image").is_err());

        let image = decode_image(&png_bytes(10, 10, [0, 128, 255])).unwrap();

        assert_eq!(image.dimensions(), (10, 10));
    }
}
