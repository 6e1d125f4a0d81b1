//! The server context.
//!
//! A [`Server`] owns every component and is passed explicitly to whatever
//! drives it. Nothing is global: two servers built from the same catalog
//! share no state, and a stopped server leaves nothing behind for the next.
//!
//! ```rust
//! use ctsd::catalog::{Catalog, LimitsDefinition};
//! use ctsd::Server;
//! use ctsd_types::LimitState;
//!
//! let catalog = Catalog::builder()
//!     .target("INST", |t| {
//!         t.telemetry("HEALTH_STATUS", |p| {
//!             p.item("TEMP1", |i| i.limits("DEFAULT", LimitsDefinition::new(-80.0, -70.0, 60.0, 80.0)))
//!         })
//!     })
//!     .build()
//!     .unwrap();
//!
//! let server = Server::builder(catalog).build().unwrap();
//! server.inject_tlm("INST", "HEALTH_STATUS", &[("TEMP1", 95.0)]).unwrap();
//!
//! let state = server.limits().get_item_limits_state("INST", "HEALTH_STATUS", "TEMP1").unwrap();
//! assert_eq!(state, Some(LimitState::RedHigh));
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ctsd_types::{current_timestamp_ms, PacketSnapshot, ServerMessage, ServerStatus};
use tracing::{info, warn};

use crate::catalog::{Catalog, ReceivedPacket};
use crate::config::ServerConfig;
use crate::error::{Error, NotFoundKind, Result};
use crate::hub::{Hub, SubscriberId};
use crate::limits::LimitsEngine;
use crate::logging::LoggerController;
use crate::registry::{Connection, ConnectionRegistry, Transport, TransportMap, ALL};
use crate::supervisor::{BackgroundTask, ReconnectTask, StalenessTask, Supervisor};

/// Builder for [`Server`].
pub struct ServerBuilder {
    catalog: Arc<Catalog>,
    config: ServerConfig,
    transports: TransportMap,
    tasks: Vec<Arc<dyn BackgroundTask>>,
}

impl ServerBuilder {
    fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            config: ServerConfig::default(),
            transports: TransportMap::new(),
            tasks: Vec::new(),
        }
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach a transport to the interface or router called `name`.
    pub fn transport(mut self, name: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        self.transports.insert(name.into(), transport);
        self
    }

    /// Register an additional background task, started with the server.
    pub fn background_task(mut self, task: Arc<dyn BackgroundTask>) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn build(self) -> Result<Server> {
        let config = self.config;
        let hub = Arc::new(Hub::new(&config.hub));
        let registry = Arc::new(ConnectionRegistry::new(
            self.catalog.clone(),
            &config.interfaces,
            &config.routers,
            &self.transports,
        )?
        .with_raw_log_dir(&config.log_dir));
        let limits = Arc::new(LimitsEngine::new(&self.catalog, hub.clone(), &config.limits)?);
        let loggers = LoggerController::new(
            &config.packet_loggers,
            &registry.get_interface_names(),
            &config.log_dir,
        )?;

        let supervisor = Supervisor::new();
        if config.tasks.reconnect {
            supervisor.register(Arc::new(ReconnectTask::new(
                registry.clone(),
                config.tasks.reconnect_delay,
            )))?;
        }
        if config.tasks.staleness_sweep {
            supervisor.register(Arc::new(StalenessTask::new(
                limits.clone(),
                config.tasks.staleness_check_interval,
            )))?;
        }
        for task in self.tasks {
            supervisor.register(task)?;
        }

        Ok(Server {
            catalog: self.catalog,
            registry,
            limits,
            hub,
            supervisor,
            loggers,
            shutdown_grace: config.tasks.shutdown_grace,
            running: AtomicBool::new(false),
        })
    }
}

pub struct Server {
    catalog: Arc<Catalog>,
    registry: Arc<ConnectionRegistry>,
    limits: Arc<LimitsEngine>,
    hub: Arc<Hub>,
    supervisor: Supervisor,
    loggers: LoggerController,
    shutdown_grace: Duration,
    running: AtomicBool,
}

impl Server {
    pub fn builder(catalog: impl Into<Arc<Catalog>>) -> ServerBuilder {
        ServerBuilder::new(catalog.into())
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn limits(&self) -> &LimitsEngine {
        &self.limits
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn loggers(&self) -> &LoggerController {
        &self.loggers
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Connect links, open logs and start every registered background task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.registry.connect_auto();
        self.loggers.start_new_server_message_log()?;
        self.loggers.start_logging(ALL)?;
        for task in self.supervisor.get_background_tasks() {
            self.supervisor.start_background_task(&task.name)?;
        }
        info!(
            interfaces = self.registry.interfaces().len(),
            routers = self.registry.routers().len(),
            tasks = self.supervisor.get_background_tasks().len(),
            "Server started"
        );
        Ok(())
    }

    /// Cancel tasks, disconnect every link, close logs and dispose every
    /// hub subscriber.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.supervisor.stop_all(self.shutdown_grace).await;
        self.registry.disconnect_all();
        for result in [
            self.registry.stop_raw_logging_interface(ALL),
            self.registry.stop_raw_logging_router(ALL),
        ] {
            if let Err(e) = result {
                warn!(error = %e, "Failed to stop raw logging");
            }
        }
        self.loggers.stop_all();
        self.hub.clear();
        info!("Server stopped");
    }

    /// Process a telemetry packet received on `interface`.
    ///
    /// `values` are raw item values; they are converted, stored and checked
    /// against limits before the snapshot is published. Returns the packet's
    /// received count.
    pub fn handle_telemetry(
        &self,
        interface: &str,
        target: &str,
        packet: &str,
        buffer: Vec<u8>,
        values: &[(&str, f64)],
    ) -> Result<u64> {
        self.registry.interface(interface)?;
        self.receive(Some(interface), Some(interface), target, packet, buffer, values)
    }

    /// Insert telemetry as if it had been received, without touching any
    /// link counters.
    pub fn inject_tlm(&self, target: &str, packet: &str, values: &[(&str, f64)]) -> Result<u64> {
        let mapped = self
            .registry
            .interface_for_target(target)
            .map(|i| i.name().to_string());
        self.receive(None, mapped.as_deref(), target, packet, Vec::new(), values)
    }

    fn receive(
        &self,
        link: Option<&str>,
        log_as: Option<&str>,
        target: &str,
        packet: &str,
        buffer: Vec<u8>,
        values: &[(&str, f64)],
    ) -> Result<u64> {
        let definition = self.catalog.telemetry_packet(target, packet)?;
        let converted = values
            .iter()
            .map(|&(name, raw)| {
                definition
                    .item(name)
                    .map(|item| (name, raw, item.convert(raw)))
                    .ok_or_else(|| Error::not_found(NotFoundKind::Item, format!("{target} {packet} {name}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let received_count = self.registry.record_telemetry(link, target, packet, &buffer)?;
        self.limits.update_values(target, packet, &converted)?;
        self.limits.check_limits(target, packet)?;

        let snapshot = PacketSnapshot {
            buffer,
            target: target.to_string(),
            packet: packet.to_string(),
            received_time_ms: current_timestamp_ms(),
            flags: 0,
            received_count,
        };
        if let Some(interface) = log_as {
            self.loggers.log_telemetry(interface, &snapshot);
        }
        self.hub.publish_packet(snapshot);
        Ok(received_count)
    }

    /// Count a buffer from `interface` that matched no packet definition.
    pub fn handle_unidentified(&self, interface: &str, buffer: &[u8]) -> Result<u64> {
        self.registry.record_unidentified(interface, buffer)
    }

    /// Write an encoded command to the interface its target is mapped to.
    ///
    /// Returns the command's sent count.
    pub fn send_command(&self, target: &str, packet: &str, buffer: Vec<u8>) -> Result<u64> {
        self.catalog.command_packet(target, packet)?;
        let interface = self
            .registry
            .interface_for_target(target)
            .ok_or_else(|| Error::invalid(format!("target {target} is not mapped to an interface")))?;

        interface.link().write(&buffer)?;
        let count = self.registry.record_command(target, packet, &buffer)?;

        let snapshot = PacketSnapshot {
            buffer,
            target: target.to_string(),
            packet: packet.to_string(),
            received_time_ms: current_timestamp_ms(),
            flags: 0,
            received_count: count,
        };
        self.loggers.log_command(interface.name(), &snapshot);
        Ok(count)
    }

    /// Forward a command received on `router` to its target's interface and
    /// log it like any other sent command.
    pub fn handle_router_command(&self, router: &str, target: &str, packet: &str, buffer: Vec<u8>) -> Result<u64> {
        let count = self.registry.record_router_command(router, target, packet, &buffer)?;
        if let Some(interface) = self.registry.interface_for_target(target) {
            let snapshot = PacketSnapshot {
                buffer,
                target: target.to_string(),
                packet: packet.to_string(),
                received_time_ms: current_timestamp_ms(),
                flags: 0,
                received_count: count,
            };
            self.loggers.log_command(interface.name(), &snapshot);
        }
        Ok(count)
    }

    /// Count a buffer from `router` that matched no command definition.
    pub fn handle_unidentified_command(&self, router: &str, buffer: &[u8]) -> Result<u64> {
        self.registry.record_unidentified_command(router, buffer)
    }

    pub fn get_server_status(&self) -> ServerStatus {
        let tasks = self.supervisor.get_background_tasks();
        ServerStatus {
            limits_set: self.limits.get_limits_set(),
            limits_event_subscribers: self.hub.limits_events().subscriber_count(),
            packet_subscribers: self.hub.packets().subscriber_count(),
            server_message_subscribers: self.hub.server_messages().subscriber_count(),
            interfaces: self.registry.interfaces().len(),
            routers: self.registry.routers().len(),
            background_tasks: tasks.len(),
            active_tasks: tasks.iter().filter(|t| t.state.is_active()).count(),
        }
    }

    /// Publish an operational message to subscribers and the message log.
    pub fn post_server_message(&self, message: impl Into<String>) {
        let message = ServerMessage::new(message);
        info!(message = %message.message, "Server message");
        self.loggers.log_server_message(&message);
        self.hub.publish_server_message(message);
    }

    /// Next packet for a packet subscriber, rebuilt against its catalog
    /// definition. `None` on timeout.
    pub async fn get_packet(&self, id: SubscriberId, timeout: Duration) -> Result<Option<ReceivedPacket>> {
        match self.hub.get_packet_snapshot(id, timeout).await? {
            Some(snapshot) => ReceivedPacket::from_snapshot(&self.catalog, snapshot).map(Some),
            None => Ok(None),
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("Server dropped without stop; disconnecting links");
            self.registry.disconnect_all();
            self.loggers.stop_all();
            self.hub.clear();
        }
    }
}
