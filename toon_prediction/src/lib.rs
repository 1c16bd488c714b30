mod artifact;
mod loader;
mod model;
mod model_service;
mod path_compat;
mod prediction;

pub mod error;

pub use artifact::{Manifest, Preprocessing, SUPPORTED_BUNDLE_VERSION};
pub use error::{LoadError, PredictError};
pub use loader::ModelLoader;
pub use model::{decode_image, LoadedModel};
pub use model_service::ModelService;
pub use prediction::Prediction;
