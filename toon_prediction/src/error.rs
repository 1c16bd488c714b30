use std::path::PathBuf;
use thiserror::Error;

/// Load-time failures. All of them are terminal: the artifact on disk is
/// static, so retrying a failed load cannot change the outcome and the
/// loader caches the error alongside successful loads.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("model artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),
    #[error(
        "model artifact uses bundle format {found}, but this build reads format {supported}; \
         re-export the artifact with a matching packager"
    )]
    VersionIncompatible { found: u32, supported: u32 },
    #[error("model artifact is not a valid bundle: {0}")]
    CorruptArtifact(String),
    #[error("failed to load model artifact: {0}")]
    UnknownLoadFailure(String),
}

/// Request-time failures. Reported per request and recovered at the caller;
/// the cached model and the session stay usable for the next upload.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictError {
    #[error("uploaded bytes do not decode as an image: {0}")]
    DecodeFailure(String),
    #[error("inference failed: {0}")]
    InferenceFailure(String),
}
