//! Durable destinations for drained log generations.

use crate::entry::LogEntry;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An append-only destination for audit entries.
///
/// The flusher calls [`LogSink::write_batch`] once per drained generation.
/// When it returns `Ok`, the batch must be durable.
pub trait LogSink: Send {
    /// Durably appends a batch of entries, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the entries could not be made durable.
    fn write_batch(&mut self, entries: &[LogEntry]) -> io::Result<()>;
}

/// Appends entries to a file as JSON lines.
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileSink {
    /// Opens `path` for appending, creating it (and parent directories) if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn write_batch(&mut self, entries: &[LogEntry]) -> io::Result<()> {
        for entry in entries {
            serde_json::to_writer(&mut self.writer, entry)?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()?;
        self.writer.get_ref().sync_data()
    }
}

/// Collects entries in memory.
///
/// Clones share the same buffer, so a test can keep one clone and hand the
/// other to the service.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<MemorySinkState>>,
}

#[derive(Debug, Default)]
struct MemorySinkState {
    entries: Vec<LogEntry>,
    batches: usize,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything written so far.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.inner.lock().entries.clone()
    }

    /// Returns the number of non-empty batches written.
    pub fn batch_count(&self) -> usize {
        self.inner.lock().batches
    }
}

impl LogSink for MemorySink {
    fn write_batch(&mut self, entries: &[LogEntry]) -> io::Result<()> {
        let mut state = self.inner.lock();
        state.entries.extend_from_slice(entries);
        state.batches += 1;
        Ok(())
    }
}
