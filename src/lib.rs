//! # ctsd
//!
//! The runtime core of a command and telemetry server: limits monitoring,
//! subscriber event distribution, link bookkeeping and background task
//! supervision.
//!
//! Decoded telemetry enters the [`Server`], is checked against the limits
//! defined in the [`catalog`], and fans out to any number of hub
//! subscribers. Interfaces and routers are tracked by the
//! [`registry`]; long-running work runs under the [`supervisor`].
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                              Server                              │
//! │                                                                  │
//! │  interface ──▶ ┌──────────┐   ┌──────────┐   ┌──────────────────┐ │
//! │                │ registry │──▶│  limits  │──▶│       hub        │ │
//! │  routers  ◀─── │ (counts) │   │ (engine) │   │ limits events    │ │
//! │                └────┬─────┘   └──────────┘   │ packets          │ │
//! │                     │                        │ server messages  │ │
//! │                     ▼                        └──────────────────┘ │
//! │                ┌──────────┐   ┌────────────┐                     │
//! │                │ logging  │   │ supervisor │◀── BackgroundTask    │
//! │                └──────────┘   └────────────┘                     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`catalog`]**: Read-only target, packet and item definitions, limits
//!   sets and limits groups
//! - **[`registry`]**: Interfaces, routers, connection state, link counters
//!   and per-packet counts
//! - **[`limits`]**: Per-item limits state machine with persistence, sets,
//!   groups and staleness
//! - **[`hub`]**: Bounded drop-oldest subscriber queues for limits events,
//!   packets and server messages
//! - **[`supervisor`]**: Cancellable background tasks with observable state
//! - **[`logging`]**: Packet loggers and the server message log
//!
//! ## Usage
//!
//! ```
//! use std::time::Duration;
//! use ctsd::catalog::{Catalog, LimitsDefinition};
//! use ctsd::Server;
//! use ctsd_types::LimitState;
//!
//! # tokio_test::block_on(async {
//! let catalog = Catalog::builder()
//!     .target("INST", |t| {
//!         t.telemetry("HEALTH_STATUS", |p| {
//!             p.item("TEMP1", |i| i.limits("DEFAULT", LimitsDefinition::new(-80.0, -70.0, 60.0, 80.0)))
//!         })
//!     })
//!     .build()
//!     .unwrap();
//! let server = Server::builder(catalog).build().unwrap();
//!
//! let id = server.hub().subscribe_limits_events(None).unwrap();
//! server.inject_tlm("INST", "HEALTH_STATUS", &[("TEMP1", -75.0)]).unwrap();
//!
//! let event = server.hub().get_limits_event(id, Duration::ZERO).await.unwrap().unwrap();
//! assert_eq!(event.new_state, LimitState::YellowLow);
//! # });
//! ```

pub mod catalog;
pub mod config;
pub mod duration;
pub mod error;
pub mod hub;
pub mod limits;
pub mod logging;
pub mod registry;
pub mod server;
pub mod supervisor;

pub use catalog::Catalog;
pub use config::ServerConfig;
pub use error::{Error, NotFoundKind, Result};
pub use server::{Server, ServerBuilder};
