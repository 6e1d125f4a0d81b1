//! Log writers: the seam to whatever persists packets and messages.

use std::fs::{self, File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use ctsd_types::{current_timestamp_ms, PacketSnapshot, ServerMessage};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::error::Result;

/// Direction of a raw buffer relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RawDirection {
    Read,
    Write,
}

/// One record handed to a writer.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogRecord<'a> {
    Packet(&'a PacketSnapshot),
    Message(&'a ServerMessage),
    /// Bytes as they crossed an interface or router.
    Raw {
        link: &'a str,
        direction: RawDirection,
        time_ms: u64,
        bytes: &'a [u8],
    },
}

/// A log sink that can be switched on and off.
///
/// Each `start` begins a new file; `write` while stopped is a no-op.
pub trait LogWriter: Send + Sync {
    fn start(&self) -> Result<()>;

    fn stop(&self);

    fn is_logging(&self) -> bool;

    /// Current (or last) file name.
    fn filename(&self) -> Option<PathBuf>;

    fn write(&self, record: &LogRecord<'_>) -> Result<()>;
}

struct OpenLog {
    path: PathBuf,
    file: LineWriter<File>,
}

/// Writes one JSON document per line into `{dir}/{timestamp}_{label}_{n}.jsonl`.
pub struct JsonLinesWriter {
    dir: PathBuf,
    label: String,
    sequence: AtomicU64,
    open: Mutex<Option<OpenLog>>,
    last_path: Mutex<Option<PathBuf>>,
}

impl JsonLinesWriter {
    pub fn new(dir: impl Into<PathBuf>, label: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            label: label.into(),
            sequence: AtomicU64::new(0),
            open: Mutex::new(None),
            last_path: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl LogWriter for JsonLinesWriter {
    fn start(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let n = self.sequence.fetch_add(1, Ordering::Relaxed);
        let path = self
            .dir
            .join(format!("{}_{}_{n}.jsonl", current_timestamp_ms(), self.label));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let mut open = self.open.lock();
        if let Some(mut previous) = open.take() {
            if let Err(e) = previous.file.flush() {
                warn!(path = %previous.path.display(), error = %e, "Failed to flush log before rotating");
            }
        }
        *open = Some(OpenLog {
            path: path.clone(),
            file: LineWriter::new(file),
        });
        *self.last_path.lock() = Some(path);
        Ok(())
    }

    fn stop(&self) {
        if let Some(mut log) = self.open.lock().take() {
            if let Err(e) = log.file.flush() {
                warn!(path = %log.path.display(), error = %e, "Failed to flush log on stop");
            }
        }
    }

    fn is_logging(&self) -> bool {
        self.open.lock().is_some()
    }

    fn filename(&self) -> Option<PathBuf> {
        self.last_path.lock().clone()
    }

    fn write(&self, record: &LogRecord<'_>) -> Result<()> {
        let mut open = self.open.lock();
        let Some(log) = open.as_mut() else {
            return Ok(());
        };
        serde_json::to_writer(&mut log.file, record)?;
        log.file.write_all(b"\n")?;
        Ok(())
    }
}
