//! Bookkeeping for a file being received.
//!
//! A write failure or an overrun marks the upload as failed but does not
//! stop it: incoming bytes are still consumed so the connection stays in
//! step with the peer. The failure only shows at [`UploadTracker::finish`],
//! which discards the partial file.

use serde::Serialize;
use std::time::SystemTime;

use crate::storage::{FileStore, FileSystem};

#[derive(Default)]
pub struct UploadTracker {
    file: Option<Box<dyn FileStore>>,
    name: String,
    declared_length: Option<u64>,
    bytes_written: u64,
    last_modified: Option<SystemTime>,
    error: bool,
}

/// Reportable view of an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadSnapshot {
    pub name: String,
    pub bytes_written: u64,
    pub declared_length: Option<u64>,
    pub error: bool,
}

impl UploadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of `file` and starts counting from zero.
    pub fn start(&mut self, file: Box<dyn FileStore>, name: &str, declared_length: Option<u64>) {
        self.file = Some(file);
        self.name = name.to_string();
        self.declared_length = declared_length;
        self.bytes_written = 0;
        self.last_modified = None;
        self.error = false;
    }

    /// Feeds received bytes into the file.
    ///
    /// Always consumes all of `data`. Bytes past the declared length are
    /// dropped and flag the upload as failed.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let Some(file) = self.file.as_mut() else {
            return data.len();
        };

        let room = match self.declared_length {
            Some(declared) => declared.saturating_sub(self.bytes_written),
            None => u64::MAX,
        };
        let accepted = data.len().min(usize::try_from(room).unwrap_or(usize::MAX));

        if accepted < data.len() && !self.error {
            tracing::warn!(
                file = %self.name,
                declared = ?self.declared_length,
                surplus = data.len() - accepted,
                "Upload longer than declared"
            );
            self.error = true;
        }

        if !self.error && accepted > 0 {
            match file.write(&data[..accepted]) {
                Ok(()) => self.bytes_written += accepted as u64,
                Err(e) => {
                    tracing::warn!(file = %self.name, error = %e, "Upload write failed");
                    self.error = true;
                }
            }
        }

        data.len()
    }

    /// Completes the upload.
    ///
    /// The file is kept only if `expected_length` bytes were written without
    /// error; otherwise it is closed and removed. Returns whether the file
    /// was kept. The name, byte count and error flag stay readable until the
    /// next [`start`](Self::start).
    pub fn finish(
        &mut self,
        files: &mut dyn FileSystem,
        expected_length: u64,
        last_modified: Option<SystemTime>,
    ) -> bool {
        let Some(file) = self.file.take() else {
            return false;
        };
        self.last_modified = last_modified;

        if self.error || self.bytes_written != expected_length {
            tracing::warn!(
                file = %self.name,
                written = self.bytes_written,
                expected = expected_length,
                write_error = self.error,
                "Discarding incomplete upload"
            );
            self.error = true;
            discard(files, file, &self.name);
            return false;
        }

        if let Err(e) = file.close() {
            tracing::error!(file = %self.name, error = %e, "Failed to close uploaded file");
            self.error = true;
            remove_quietly(files, &self.name);
            return false;
        }

        if let Some(when) = last_modified {
            if let Err(e) = files.set_last_modified(&self.name, when) {
                tracing::warn!(file = %self.name, error = %e, "Could not set modification time");
            }
        }

        tracing::info!(file = %self.name, bytes = self.bytes_written, "Upload committed");
        true
    }

    /// Drops any partial file and resets every counter.
    pub fn cancel(&mut self, files: &mut dyn FileSystem) {
        if let Some(file) = self.file.take() {
            tracing::info!(file = %self.name, written = self.bytes_written, "Upload cancelled");
            discard(files, file, &self.name);
        }
        *self = Self::default();
    }

    pub fn is_active(&self) -> bool {
        self.file.is_some()
    }

    pub fn has_error(&self) -> bool {
        self.error
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn declared_length(&self) -> Option<u64> {
        self.declared_length
    }

    pub fn snapshot(&self) -> Option<UploadSnapshot> {
        if self.name.is_empty() {
            return None;
        }
        Some(UploadSnapshot {
            name: self.name.clone(),
            bytes_written: self.bytes_written,
            declared_length: self.declared_length,
            error: self.error,
        })
    }
}

fn discard(files: &mut dyn FileSystem, file: Box<dyn FileStore>, name: &str) {
    if let Err(e) = file.close() {
        tracing::debug!(file = %name, error = %e, "Close of discarded upload failed");
    }
    remove_quietly(files, name);
}

fn remove_quietly(files: &mut dyn FileSystem, name: &str) {
    if let Err(e) = files.remove(name) {
        tracing::warn!(file = %name, error = %e, "Could not remove partial upload");
    }
}
