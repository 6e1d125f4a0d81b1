//! Interfaces, routers and the transport seam beneath them.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use ctsd_types::{current_timestamp_ms, ConnectionState, LinkCounters, LinkInfo};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::logging::{LogRecord, LogWriter, RawDirection};

/// Physical layer under an interface or router.
///
/// Implementations frame nothing; they move already-framed bytes.
pub trait Transport: Send + Sync {
    /// Make one connection attempt.
    fn connect(&self) -> io::Result<()>;

    fn disconnect(&self);

    /// Write a framed buffer, returning the number of bytes written.
    fn write_raw(&self, bytes: &[u8]) -> io::Result<usize>;
}

/// Transport with nothing attached. Every connect attempt fails, so the
/// link stays `ATTEMPTING`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedTransport;

impl Transport for DetachedTransport {
    fn connect(&self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::NotConnected, "no transport attached"))
    }

    fn disconnect(&self) {}

    fn write_raw(&self, _bytes: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::NotConnected, "no transport attached"))
    }
}

/// Transport that always connects and keeps everything written to it.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    written: Mutex<Vec<Vec<u8>>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers written so far, oldest first.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().clone()
    }
}

impl Transport for LoopbackTransport {
    fn connect(&self) -> io::Result<()> {
        Ok(())
    }

    fn disconnect(&self) {}

    fn write_raw(&self, bytes: &[u8]) -> io::Result<usize> {
        self.written.lock().push(bytes.to_vec());
        Ok(bytes.len())
    }
}

#[derive(Debug, Default)]
struct Counters {
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
    write_count: AtomicU64,
    read_count: AtomicU64,
    write_error_count: AtomicU64,
    read_error_count: AtomicU64,
    protocol_error_count: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> LinkCounters {
        LinkCounters {
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            write_count: self.write_count.load(Ordering::Relaxed),
            read_count: self.read_count.load(Ordering::Relaxed),
            write_error_count: self.write_error_count.load(Ordering::Relaxed),
            read_error_count: self.read_error_count.load(Ordering::Relaxed),
            protocol_error_count: self.protocol_error_count.load(Ordering::Relaxed),
        }
    }
}

/// Connection state, counters and transport shared by interfaces and routers.
pub struct Link {
    name: String,
    state: RwLock<ConnectionState>,
    counters: Counters,
    raw_logging: AtomicBool,
    raw_log: Mutex<Option<Box<dyn LogWriter>>>,
    auto_connect: bool,
    transport: Arc<dyn Transport>,
}

impl Link {
    pub fn new(name: impl Into<String>, transport: Arc<dyn Transport>, auto_connect: bool) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(ConnectionState::Disconnected),
            counters: Counters::default(),
            raw_logging: AtomicBool::new(false),
            raw_log: Mutex::new(None),
            auto_connect,
            transport,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn auto_connect(&self) -> bool {
        self.auto_connect
    }

    /// Move to `ATTEMPTING` and make one attempt through the transport.
    pub fn connect(&self) -> ConnectionState {
        {
            let mut state = self.state.write();
            if *state == ConnectionState::Connected {
                return ConnectionState::Connected;
            }
            *state = ConnectionState::Attempting;
        }
        match self.attempt() {
            Ok(state) => state,
            Err(e) => {
                warn!(link = %self.name, error = %e, "Connection attempt failed");
                ConnectionState::Attempting
            }
        }
    }

    /// Retry a link stuck in `ATTEMPTING`. Links in any other state are left alone.
    pub fn retry(&self) -> ConnectionState {
        if self.state() != ConnectionState::Attempting {
            return self.state();
        }
        match self.attempt() {
            Ok(state) => state,
            Err(e) => {
                debug!(link = %self.name, error = %e, "Reconnect attempt failed");
                ConnectionState::Attempting
            }
        }
    }

    fn attempt(&self) -> io::Result<ConnectionState> {
        self.transport.connect()?;
        let mut state = self.state.write();
        // A disconnect may have landed while the transport was connecting.
        if *state == ConnectionState::Attempting {
            *state = ConnectionState::Connected;
            info!(link = %self.name, "Connected");
            return Ok(ConnectionState::Connected);
        }
        let current = *state;
        drop(state);
        self.transport.disconnect();
        Ok(current)
    }

    pub fn disconnect(&self) {
        let previous = std::mem::replace(&mut *self.state.write(), ConnectionState::Disconnected);
        if previous != ConnectionState::Disconnected {
            self.transport.disconnect();
            info!(link = %self.name, "Disconnected");
        }
    }

    /// Write a buffer, counting bytes on success or a write error on failure.
    pub fn write(&self, bytes: &[u8]) -> Result<usize> {
        let result = if self.state() == ConnectionState::Connected {
            self.transport.write_raw(bytes)
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("{} is not connected", self.name),
            ))
        };

        match result {
            Ok(written) => {
                self.counters.bytes_written.fetch_add(written as u64, Ordering::Relaxed);
                self.counters.write_count.fetch_add(1, Ordering::Relaxed);
                self.log_raw(RawDirection::Write, &bytes[..written.min(bytes.len())]);
                Ok(written)
            }
            Err(source) => {
                self.counters.write_error_count.fetch_add(1, Ordering::Relaxed);
                Err(Error::Transport {
                    link: self.name.clone(),
                    source,
                })
            }
        }
    }

    /// Count a buffer received on this link.
    pub fn record_read(&self, bytes: &[u8]) {
        self.counters.bytes_read.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        self.counters.read_count.fetch_add(1, Ordering::Relaxed);
        self.log_raw(RawDirection::Read, bytes);
    }

    pub fn record_read_error(&self) {
        self.counters.read_error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_protocol_error(&self) {
        self.counters.protocol_error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn raw_logging(&self) -> bool {
        self.raw_logging.load(Ordering::Relaxed)
    }

    /// Give the link a writer for its raw traffic, replacing any previous one.
    pub fn attach_raw_log(&self, writer: Box<dyn LogWriter>) {
        if let Some(previous) = self.raw_log.lock().replace(writer) {
            previous.stop();
        }
    }

    /// Switch raw logging. Starting begins a new raw log file when a writer
    /// is attached.
    pub fn set_raw_logging(&self, enabled: bool) -> Result<()> {
        let raw_log = self.raw_log.lock();
        if enabled {
            if let Some(writer) = raw_log.as_ref() {
                writer.start()?;
            }
            self.raw_logging.store(true, Ordering::Relaxed);
        } else {
            self.raw_logging.store(false, Ordering::Relaxed);
            if let Some(writer) = raw_log.as_ref() {
                writer.stop();
            }
        }
        debug!(link = %self.name, enabled, "Raw logging toggled");
        Ok(())
    }

    /// Current (or last) raw log file.
    pub fn raw_log_filename(&self) -> Option<std::path::PathBuf> {
        self.raw_log.lock().as_ref().and_then(|w| w.filename())
    }

    fn log_raw(&self, direction: RawDirection, bytes: &[u8]) {
        if !self.raw_logging() {
            return;
        }
        let raw_log = self.raw_log.lock();
        let Some(writer) = raw_log.as_ref() else {
            return;
        };
        let record = LogRecord::Raw {
            link: &self.name,
            direction,
            time_ms: current_timestamp_ms(),
            bytes,
        };
        if let Err(e) = writer.write(&record) {
            warn!(link = %self.name, error = %e, "Raw log write failed");
        }
    }

    pub fn counters(&self) -> LinkCounters {
        self.counters.snapshot()
    }

    pub fn info(&self) -> LinkInfo {
        LinkInfo {
            name: self.name.clone(),
            state: self.state(),
            counters: self.counters(),
        }
    }
}

/// Contract shared by interfaces and routers.
pub trait Connection {
    fn link(&self) -> &Link;

    fn name(&self) -> &str {
        self.link().name()
    }

    fn state(&self) -> ConnectionState {
        self.link().state()
    }

    fn connect(&self) -> ConnectionState {
        self.link().connect()
    }

    fn disconnect(&self) {
        self.link().disconnect()
    }

    fn info(&self) -> LinkInfo {
        self.link().info()
    }
}

/// A link that targets are mapped onto.
pub struct Interface {
    link: Link,
    targets: RwLock<Vec<String>>,
}

impl Interface {
    pub fn new(link: Link, targets: Vec<String>) -> Self {
        Self {
            link,
            targets: RwLock::new(targets),
        }
    }

    pub fn targets(&self) -> Vec<String> {
        self.targets.read().clone()
    }

    pub fn has_target(&self, target: &str) -> bool {
        self.targets.read().iter().any(|t| t == target)
    }

    pub(crate) fn add_target(&self, target: &str) {
        let mut targets = self.targets.write();
        if !targets.iter().any(|t| t == target) {
            targets.push(target.to_string());
        }
    }

    pub(crate) fn remove_target(&self, target: &str) {
        self.targets.write().retain(|t| t != target);
    }
}

impl Connection for Interface {
    fn link(&self) -> &Link {
        &self.link
    }
}

/// What a router forwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterSource {
    /// Telemetry received on the listed interfaces.
    Interfaces(Vec<String>),
    /// Telemetry from every interface.
    AllTelemetry,
    /// Every command sent.
    AllCommands,
}

/// A link that forwards traffic to external consumers.
pub struct Router {
    link: Link,
    source: RouterSource,
}

impl Router {
    pub fn new(link: Link, source: RouterSource) -> Self {
        Self { link, source }
    }

    pub fn source(&self) -> &RouterSource {
        &self.source
    }

    pub fn routes_telemetry_from(&self, interface: &str) -> bool {
        match &self.source {
            RouterSource::Interfaces(names) => names.iter().any(|n| n == interface),
            RouterSource::AllTelemetry => true,
            RouterSource::AllCommands => false,
        }
    }

    pub fn routes_commands(&self) -> bool {
        self.source == RouterSource::AllCommands
    }
}

impl Connection for Router {
    fn link(&self) -> &Link {
        &self.link
    }
}
