//! Logger controller: named packet loggers and the server message log.
//!
//! Each packet logger covers a set of interfaces and owns a command writer
//! and a telemetry writer. The controller only switches writers on and off
//! and routes records to them; the writers decide what ends up on disk.

mod writer;

pub use writer::{JsonLinesWriter, LogRecord, LogWriter, RawDirection};

use std::path::{Path, PathBuf};

use ctsd_types::{PacketSnapshot, ServerMessage};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::PacketLoggerConfig;
use crate::error::{Error, NotFoundKind, Result};
use crate::registry::ALL;

/// Logger created when the configuration names none.
pub const DEFAULT_LOGGER: &str = "DEFAULT";

/// Answer of `get_packet_logger_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PacketLoggerInfo {
    pub name: String,
    pub interfaces: Vec<String>,
    pub cmd_logging: bool,
    pub tlm_logging: bool,
}

pub struct PacketLogger {
    name: String,
    interfaces: Vec<String>,
    cmd: Box<dyn LogWriter>,
    tlm: Box<dyn LogWriter>,
}

impl PacketLogger {
    pub fn new(
        name: impl Into<String>,
        interfaces: Vec<String>,
        cmd: Box<dyn LogWriter>,
        tlm: Box<dyn LogWriter>,
    ) -> Self {
        Self {
            name: name.into(),
            interfaces,
            cmd,
            tlm,
        }
    }

    /// Logger writing JSON lines under `dir`.
    pub fn json_lines(name: &str, interfaces: Vec<String>, dir: &Path) -> Self {
        let label = name.to_lowercase();
        Self::new(
            name,
            interfaces,
            Box::new(JsonLinesWriter::new(dir, format!("{label}_cmd"))),
            Box::new(JsonLinesWriter::new(dir, format!("{label}_tlm"))),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn covers(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i == interface)
    }

    fn info(&self) -> PacketLoggerInfo {
        PacketLoggerInfo {
            name: self.name.clone(),
            interfaces: self.interfaces.clone(),
            cmd_logging: self.cmd.is_logging(),
            tlm_logging: self.tlm.is_logging(),
        }
    }
}

pub struct LoggerController {
    loggers: Vec<PacketLogger>,
    messages: Box<dyn LogWriter>,
}

impl LoggerController {
    /// Build JSON-lines loggers from configuration.
    ///
    /// With no configured loggers a `DEFAULT` logger covering every
    /// interface is created.
    pub fn new(configs: &[PacketLoggerConfig], interface_names: &[String], log_dir: &Path) -> Result<Self> {
        let loggers = if configs.is_empty() {
            vec![PacketLogger::json_lines(DEFAULT_LOGGER, interface_names.to_vec(), log_dir)]
        } else {
            configs
                .iter()
                .map(|config| {
                    if let Some(unknown) = config.interfaces.iter().find(|i| !interface_names.contains(*i)) {
                        return Err(Error::not_found(NotFoundKind::Interface, unknown.as_str()));
                    }
                    Ok(PacketLogger::json_lines(&config.name, config.interfaces.clone(), log_dir))
                })
                .collect::<Result<Vec<_>>>()?
        };
        Ok(Self::from_parts(
            loggers,
            Box::new(JsonLinesWriter::new(log_dir, "server_messages")),
        ))
    }

    pub fn from_parts(loggers: Vec<PacketLogger>, messages: Box<dyn LogWriter>) -> Self {
        Self { loggers, messages }
    }

    fn logger(&self, name: &str) -> Result<&PacketLogger> {
        self.loggers
            .iter()
            .find(|l| l.name == name)
            .ok_or_else(|| Error::not_found(NotFoundKind::PacketLogger, name))
    }

    /// One named logger, or all of them for `ALL`.
    fn select(&self, name: &str) -> Result<Vec<&PacketLogger>> {
        if name == ALL {
            Ok(self.loggers.iter().collect())
        } else {
            Ok(vec![self.logger(name)?])
        }
    }

    pub fn start_logging(&self, name: &str) -> Result<()> {
        for logger in self.select(name)? {
            logger.cmd.start()?;
            logger.tlm.start()?;
            info!(logger = %logger.name, "Packet logging started");
        }
        Ok(())
    }

    pub fn stop_logging(&self, name: &str) -> Result<()> {
        for logger in self.select(name)? {
            logger.cmd.stop();
            logger.tlm.stop();
            info!(logger = %logger.name, "Packet logging stopped");
        }
        Ok(())
    }

    pub fn start_cmd_log(&self, name: &str) -> Result<()> {
        for logger in self.select(name)? {
            logger.cmd.start()?;
        }
        Ok(())
    }

    pub fn start_tlm_log(&self, name: &str) -> Result<()> {
        for logger in self.select(name)? {
            logger.tlm.start()?;
        }
        Ok(())
    }

    pub fn stop_cmd_log(&self, name: &str) -> Result<()> {
        for logger in self.select(name)? {
            logger.cmd.stop();
        }
        Ok(())
    }

    pub fn stop_tlm_log(&self, name: &str) -> Result<()> {
        for logger in self.select(name)? {
            logger.tlm.stop();
        }
        Ok(())
    }

    pub fn get_cmd_log_filename(&self, name: &str) -> Result<Option<PathBuf>> {
        Ok(self.logger(name)?.cmd.filename())
    }

    pub fn get_tlm_log_filename(&self, name: &str) -> Result<Option<PathBuf>> {
        Ok(self.logger(name)?.tlm.filename())
    }

    pub fn get_packet_loggers(&self) -> Vec<String> {
        self.loggers.iter().map(|l| l.name.clone()).collect()
    }

    pub fn get_packet_logger_info(&self, name: &str) -> Result<PacketLoggerInfo> {
        Ok(self.logger(name)?.info())
    }

    pub fn get_all_packet_logger_info(&self) -> Vec<PacketLoggerInfo> {
        self.loggers.iter().map(PacketLogger::info).collect()
    }

    /// Close the current server message log and open a new one.
    pub fn start_new_server_message_log(&self) -> Result<()> {
        self.messages.start()
    }

    pub fn get_server_message_log_filename(&self) -> Option<PathBuf> {
        self.messages.filename()
    }

    pub fn log_telemetry(&self, interface: &str, snapshot: &PacketSnapshot) {
        for logger in self.loggers.iter().filter(|l| l.covers(interface)) {
            if let Err(e) = logger.tlm.write(&LogRecord::Packet(snapshot)) {
                warn!(logger = %logger.name, error = %e, "Telemetry log write failed");
            }
        }
    }

    pub fn log_command(&self, interface: &str, snapshot: &PacketSnapshot) {
        for logger in self.loggers.iter().filter(|l| l.covers(interface)) {
            if let Err(e) = logger.cmd.write(&LogRecord::Packet(snapshot)) {
                warn!(logger = %logger.name, error = %e, "Command log write failed");
            }
        }
    }

    pub fn log_server_message(&self, message: &ServerMessage) {
        if let Err(e) = self.messages.write(&LogRecord::Message(message)) {
            warn!(error = %e, "Server message log write failed");
        }
    }

    /// Stop every writer, flushing open files.
    pub fn stop_all(&self) {
        for logger in &self.loggers {
            logger.cmd.stop();
            logger.tlm.stop();
        }
        self.messages.stop();
    }
}
