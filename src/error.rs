//! Error types for the server core.

use std::fmt;

use thiserror::Error;

/// What kind of entity a [`Error::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotFoundKind {
    TelemetryTarget,
    TelemetryPacket,
    CommandTarget,
    CommandPacket,
    Item,
    Target,
    Interface,
    Router,
    PacketLogger,
    LimitsGroup,
    LimitsSet,
    BackgroundTask,
    Subscriber,
}

impl NotFoundKind {
    fn message(&self, name: &str) -> String {
        match self {
            NotFoundKind::TelemetryTarget => format!("Telemetry target '{name}' does not exist"),
            NotFoundKind::TelemetryPacket => format!("Telemetry packet '{name}' does not exist"),
            NotFoundKind::CommandTarget => format!("Command target '{name}' does not exist"),
            NotFoundKind::CommandPacket => format!("Command packet '{name}' does not exist"),
            NotFoundKind::Item => format!("Packet item '{name}' does not exist"),
            NotFoundKind::Target => format!("Unknown target: {name}"),
            NotFoundKind::Interface => format!("Unknown interface: {name}"),
            NotFoundKind::Router => format!("Unknown router: {name}"),
            NotFoundKind::PacketLogger => format!("Unknown packet log writer: {name}"),
            NotFoundKind::LimitsGroup => format!(
                "LIMITS_GROUP {name} undefined. Ensure your telemetry definition contains the line: LIMITS_GROUP {name}"
            ),
            NotFoundKind::LimitsSet => format!("Unknown limits set: {name}"),
            NotFoundKind::BackgroundTask => format!("Unknown background task: {name}"),
            NotFoundKind::Subscriber => format!("Unknown subscriber id: {name}"),
        }
    }
}

fn not_found_message(kind: &NotFoundKind, name: &str) -> String {
    kind.message(name)
}

impl fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Errors returned by server core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A named entity does not exist.
    #[error("{}", not_found_message(.kind, .name))]
    NotFound { kind: NotFoundKind, name: String },

    /// Malformed input, such as out-of-order thresholds.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A background task body failed.
    #[error("Background task '{task}' failed: {message}")]
    TaskFault { task: String, message: String },

    /// The transport under an interface or router failed.
    #[error("Transport failure on {link}: {source}")]
    Transport {
        link: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn not_found(kind: NotFoundKind, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// The missing entity's kind, if this is a `NotFound`.
    pub fn not_found_kind(&self) -> Option<NotFoundKind> {
        match self {
            Error::NotFound { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_messages() {
        let err = Error::not_found(NotFoundKind::TelemetryTarget, "BLAH");
        assert_eq!(err.to_string(), "Telemetry target 'BLAH' does not exist");

        let err = Error::not_found(NotFoundKind::TelemetryPacket, "INST BLAH");
        assert_eq!(err.to_string(), "Telemetry packet 'INST BLAH' does not exist");

        let err = Error::not_found(NotFoundKind::Item, "INST HEALTH_STATUS BLAH");
        assert_eq!(
            err.to_string(),
            "Packet item 'INST HEALTH_STATUS BLAH' does not exist"
        );
    }

    #[test]
    fn limits_group_message_names_the_directive() {
        let err = Error::not_found(NotFoundKind::LimitsGroup, "MINE");
        assert_eq!(
            err.to_string(),
            "LIMITS_GROUP MINE undefined. Ensure your telemetry definition contains the line: LIMITS_GROUP MINE"
        );
    }

    #[test]
    fn kind_is_inspectable() {
        let err = Error::not_found(NotFoundKind::Interface, "BLAH");
        assert!(err.is_not_found());
        assert_eq!(err.not_found_kind(), Some(NotFoundKind::Interface));
        assert_eq!(err.to_string(), "Unknown interface: BLAH");

        let err = Error::invalid("bad");
        assert!(!err.is_not_found());
        assert_eq!(err.not_found_kind(), None);
    }
}
