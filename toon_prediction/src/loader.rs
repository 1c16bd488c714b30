use crate::artifact::ArtifactBundle;
use crate::error::LoadError;
use crate::model::LoadedModel;
use crate::path_compat::EntryPathGuard;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};

const POISONED: &str = "model cache mutex poisoned";

enum Slot<T> {
    Empty,
    InFlight,
    Ready(T),
}

/// At-most-one execution of the initializer per process. Concurrent callers
/// wait on the in-flight computation and all observe its single result.
pub(crate) struct SingleFlight<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T: Clone> SingleFlight<T> {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Empty),
            ready: Condvar::new(),
        }
    }

    pub(crate) fn get_or_init<F>(&self, init: F) -> T
    where
        F: FnOnce() -> T,
    {
        {
            let mut slot = self.slot.lock().expect(POISONED);
            loop {
                match &*slot {
                    Slot::Ready(value) => return value.clone(),
                    Slot::InFlight => slot = self.ready.wait(slot).expect(POISONED),
                    Slot::Empty => break,
                }
            }
            *slot = Slot::InFlight;
        }

        // Run the initializer without holding the lock so waiters can park
        // on the condvar. If it unwinds, reopen the slot so they retry
        // instead of blocking forever.
        let reopen = ReopenOnUnwind { flight: self };
        let value = init();
        std::mem::forget(reopen);

        let mut slot = self.slot.lock().expect(POISONED);
        *slot = Slot::Ready(value.clone());
        self.ready.notify_all();
        value
    }
}

struct ReopenOnUnwind<'a, T> {
    flight: &'a SingleFlight<T>,
}

impl<T> Drop for ReopenOnUnwind<'_, T> {
    fn drop(&mut self) {
        let mut slot = match self.flight.slot.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Slot::Empty;
        self.flight.ready.notify_all();
    }
}

/// Loads the model artifact at a fixed path and memoizes the outcome for the
/// process lifetime. Errors are cached too: the artifact is static, so a
/// failed load stays failed until the process restarts.
pub struct ModelLoader {
    artifact_path: PathBuf,
    cache: SingleFlight<Result<Arc<LoadedModel>, LoadError>>,
}

impl ModelLoader {
    pub fn new(artifact_path: impl Into<PathBuf>) -> Self {
        Self {
            artifact_path: artifact_path.into(),
            cache: SingleFlight::new(),
        }
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    pub fn load(&self) -> Result<Arc<LoadedModel>, LoadError> {
        self.cache.get_or_init(|| {
            tracing::info!("Loading model artifact from {:?}", self.artifact_path);
            load_artifact(&self.artifact_path).map(Arc::new)
        })
    }
}

fn load_artifact(path: &Path) -> Result<LoadedModel, LoadError> {
    if !path.exists() {
        return Err(LoadError::ArtifactNotFound(path.to_path_buf()));
    }

    let bundle = {
        // Entry-path normalization is scoped to deserialization only.
        let _style = EntryPathGuard::unified();
        ArtifactBundle::read(path)?
    };

    LoadedModel::from_bundle(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::test_support::{manifest_json, write_bundle};
    use crate::path_compat::{current_style, style_test_lock, EntryPathStyle};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    #[test]
    fn initializer_runs_exactly_once_across_concurrent_callers() {
        let flight = SingleFlight::new();
        let calls = AtomicUsize::new(0);
        let barrier = Barrier::new(8);

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        flight.get_or_init(|| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            Arc::new(42u32)
                        })
                    })
                })
                .collect();

            let values: Vec<Arc<u32>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            for value in &values {
                assert!(Arc::ptr_eq(value, &values[0]));
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sequential_calls_reuse_the_first_result() {
        let flight = SingleFlight::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = flight.get_or_init(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                7u32
            });
            assert_eq!(value, 7);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_initializer_reopens_the_slot() {
        let flight: SingleFlight<u32> = SingleFlight::new();

        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            flight.get_or_init(|| panic!("load blew up"));
        }));
        assert!(unwound.is_err());

        let value = flight.get_or_init(|| 9);
        assert_eq!(value, 9);
    }

    #[test]
    fn missing_artifact_fails_without_deserializing() {
        let _lock = style_test_lock();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.tar.gz");
        let loader = ModelLoader::new(&path);

        let err = loader.load().unwrap_err();

        assert_eq!(err, LoadError::ArtifactNotFound(path));
    }

    #[test]
    fn load_outcome_is_memoized_without_rereading_the_file() {
        let _lock = style_test_lock();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.tar.gz");
        let loader = ModelLoader::new(&path);

        assert!(matches!(
            loader.load().unwrap_err(),
            LoadError::ArtifactNotFound(_)
        ));

        // The artifact appearing later must not change the cached outcome.
        let manifest = manifest_json(1, &["Doraemon", "WALL-E"], "weights.onnx");
        write_bundle(
            &path,
            &[
                ("manifest.json", manifest.as_bytes()),
                ("weights.onnx", b"bytes"),
            ],
        );

        assert!(matches!(
            loader.load().unwrap_err(),
            LoadError::ArtifactNotFound(_)
        ));
    }

    #[test]
    fn zero_byte_artifact_is_corrupt_not_missing() {
        let _lock = style_test_lock();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.tar.gz");
        std::fs::write(&path, b"").unwrap();
        let loader = ModelLoader::new(&path);

        let err = loader.load().unwrap_err();

        assert!(matches!(err, LoadError::CorruptArtifact(_)));
    }

    #[test]
    fn version_mismatch_surfaces_through_the_loader() {
        let _lock = style_test_lock();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.tar.gz");
        let manifest = manifest_json(3, &["Doraemon", "WALL-E"], "weights.onnx");
        write_bundle(
            &path,
            &[
                ("manifest.json", manifest.as_bytes()),
                ("weights.onnx", b"bytes"),
            ],
        );
        let loader = ModelLoader::new(&path);

        let err = loader.load().unwrap_err();

        assert!(matches!(
            err,
            LoadError::VersionIncompatible {
                found: 3,
                supported: _
            }
        ));
    }

    #[test]
    fn path_style_is_restored_after_failed_loads() {
        let _lock = style_test_lock();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.tar.gz");
        std::fs::write(&path, b"garbage that is not gzip").unwrap();
        let loader = ModelLoader::new(&path);

        let _ = loader.load().unwrap_err();

        assert_eq!(current_style(), EntryPathStyle::Native);
    }
}
