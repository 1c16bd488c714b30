use crate::error::LoadError;
use crate::path_compat::normalize_entry_path;
use flate2::read::GzDecoder;
use serde::Deserialize;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tar::Archive;

/// Bundle format this build reads. Bumped when the manifest schema or the
/// archive layout changes.
pub const SUPPORTED_BUNDLE_VERSION: u32 = 1;

const MANIFEST_ENTRY: &str = "manifest.json";

/// `manifest.json` inside the artifact bundle.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub labels: Vec<String>,
    pub preprocessing: Preprocessing,
    /// Archive-internal path of the ONNX weights entry. Written by the
    /// packager on whatever OS trained the model, so it may carry backslash
    /// separators.
    pub weights_entry: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Preprocessing {
    pub input_width: u32,
    pub input_height: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

/// A fully read artifact, not yet turned into an inference session.
#[derive(Debug)]
pub struct ArtifactBundle {
    pub manifest: Manifest,
    pub weights: Vec<u8>,
}

impl ArtifactBundle {
    pub fn read(path: &Path) -> Result<Self, LoadError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => LoadError::ArtifactNotFound(path.to_path_buf()),
            _ => LoadError::UnknownLoadFailure(format!("failed to open artifact: {e}")),
        })?;

        let mut archive = Archive::new(GzDecoder::new(file));
        let mut entries: Vec<(String, Vec<u8>)> = Vec::new();

        let iter = archive
            .entries()
            .map_err(|e| LoadError::CorruptArtifact(format!("unreadable bundle archive: {e}")))?;
        for entry in iter {
            let mut entry = entry
                .map_err(|e| LoadError::CorruptArtifact(format!("unreadable bundle entry: {e}")))?;
            let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).map_err(|e| {
                LoadError::CorruptArtifact(format!("truncated bundle entry {name}: {e}"))
            })?;
            entries.push((name, data));
        }

        let manifest_bytes = take_entry(&mut entries, MANIFEST_ENTRY).ok_or_else(|| {
            LoadError::CorruptArtifact(format!("bundle has no {MANIFEST_ENTRY} entry"))
        })?;
        let manifest: Manifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|e| LoadError::CorruptArtifact(format!("malformed {MANIFEST_ENTRY}: {e}")))?;

        if manifest.format_version != SUPPORTED_BUNDLE_VERSION {
            return Err(LoadError::VersionIncompatible {
                found: manifest.format_version,
                supported: SUPPORTED_BUNDLE_VERSION,
            });
        }
        if manifest.labels.is_empty() {
            return Err(LoadError::CorruptArtifact(
                "manifest declares an empty label vocabulary".to_string(),
            ));
        }

        let weights = take_entry(&mut entries, &manifest.weights_entry).ok_or_else(|| {
            LoadError::CorruptArtifact(format!(
                "weights entry {:?} missing from bundle",
                manifest.weights_entry
            ))
        })?;

        Ok(Self { manifest, weights })
    }
}

fn take_entry(entries: &mut Vec<(String, Vec<u8>)>, wanted: &str) -> Option<Vec<u8>> {
    let index = entries
        .iter()
        .position(|(name, _)| entry_matches(name, wanted))?;
    Some(entries.swap_remove(index).1)
}

fn entry_matches(stored: &str, wanted: &str) -> bool {
    let stored = normalize_entry_path(stored);
    let wanted = normalize_entry_path(wanted);
    stored.trim_start_matches("./") == wanted.trim_start_matches("./")
}
