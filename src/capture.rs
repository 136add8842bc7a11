//! Terminal output capture.
//!
//! [`OutputCapture`] buffers text written by the presenter's terminal and,
//! right before each save, appends it to a tracked file in the session root
//! so the output becomes part of the snapshot.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{HistoryError, Result};
use crate::session::SaveHook;

/// Shared buffer of terminal text awaiting the next save.
#[derive(Clone, Debug)]
pub struct OutputCapture {
    buffer: Arc<Mutex<String>>,
    file: PathBuf,
}

impl OutputCapture {
    /// Capture into `file`, relative to the session root.
    #[must_use]
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(String::new())),
            file: file.into(),
        }
    }

    pub fn push(&self, text: &str) {
        self.buffer.lock().push_str(text);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Append the buffered text to `<root>/<file>` and clear the buffer.
    ///
    /// The buffer is left intact if the write fails.
    ///
    /// # Errors
    /// Returns [`HistoryError::Hook`] if the file cannot be written.
    pub fn flush_into(&self, root: &Path) -> Result<()> {
        let mut buffer = self.buffer.lock();
        if buffer.is_empty() {
            return Ok(());
        }
        let path = root.join(&self.file);
        append(&path, &buffer).map_err(|e| HistoryError::Hook {
            message: format!("writing {}: {e}", path.display()),
        })?;
        debug!(bytes = buffer.len(), path = %path.display(), "captured output flushed");
        buffer.clear();
        Ok(())
    }

    /// A pre-save hook that flushes this capture.
    #[must_use]
    pub fn into_hook(self) -> SaveHook {
        Box::new(move |root| self.flush_into(root))
    }
}

fn append(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(text.as_bytes())
}
