use std::borrow::Cow;
use std::sync::atomic::{AtomicU8, Ordering};

const STYLE_NATIVE: u8 = 0;
const STYLE_UNIFIED: u8 = 1;

// Entry paths stored inside a bundle carry the separator convention of the
// OS that produced it, not the OS that loads it.
static ENTRY_PATH_STYLE: AtomicU8 = AtomicU8::new(STYLE_NATIVE);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPathStyle {
    /// Entry names are compared exactly as stored.
    Native,
    /// Backslash separators are rewritten to forward slashes before
    /// comparison, so Windows-authored bundles resolve on any host.
    Unified,
}

pub fn current_style() -> EntryPathStyle {
    match ENTRY_PATH_STYLE.load(Ordering::SeqCst) {
        STYLE_UNIFIED => EntryPathStyle::Unified,
        _ => EntryPathStyle::Native,
    }
}

/// Scoped swap of the process-global entry-path style. The previous style is
/// restored when the guard drops, on success and failure paths alike.
pub struct EntryPathGuard {
    previous: u8,
}

impl EntryPathGuard {
    pub fn unified() -> Self {
        let previous = ENTRY_PATH_STYLE.swap(STYLE_UNIFIED, Ordering::SeqCst);
        Self { previous }
    }
}

impl Drop for EntryPathGuard {
    fn drop(&mut self) {
        ENTRY_PATH_STYLE.store(self.previous, Ordering::SeqCst);
    }
}

pub(crate) fn normalize_entry_path(raw: &str) -> Cow<'_, str> {
    match current_style() {
        EntryPathStyle::Native => Cow::Borrowed(raw),
        EntryPathStyle::Unified => {
            if raw.contains('\\') {
                Cow::Owned(raw.replace('\\', "/"))
            } else {
                Cow::Borrowed(raw)
            }
        }
    }
}

// The style is process-global, so tests that depend on it serialize here.
#[cfg(test)]
pub(crate) fn style_test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
