//! Connection registry: interfaces, routers, target mapping and packet counters.
//!
//! Every query here is non-blocking. Link counters are atomics bumped by
//! whichever worker owns the traffic; state reads take a short `RwLock`.

mod counters;
mod link;

pub use link::{Connection, DetachedTransport, Interface, Link, LoopbackTransport, Router, RouterSource, Transport};

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use ctsd_types::{ConnectionState, LinkInfo, PacketCount, TargetInfo};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::config::{InterfaceConfig, RouterConfig};
use crate::error::{Error, NotFoundKind, Result};
use crate::logging::JsonLinesWriter;
use counters::PacketCounters;

/// Router that forwards all identified telemetry.
pub const PREIDENTIFIED_ROUTER: &str = "PREIDENTIFIED_ROUTER";

/// Router that forwards all commands.
pub const PREIDENTIFIED_CMD_ROUTER: &str = "PREIDENTIFIED_CMD_ROUTER";

/// Name accepted by the raw-logging toggles to mean every link.
pub const ALL: &str = "ALL";

/// Transports keyed by interface or router name. Links without an entry
/// get a [`DetachedTransport`].
pub type TransportMap = HashMap<String, Arc<dyn Transport>>;

pub struct ConnectionRegistry {
    catalog: Arc<Catalog>,
    interfaces: Vec<Interface>,
    routers: Vec<Router>,
    tlm_counts: PacketCounters,
    cmd_counts: PacketCounters,
    /// Serializes target moves between interfaces.
    remap: Mutex<()>,
}

impl ConnectionRegistry {
    pub fn new(
        catalog: Arc<Catalog>,
        interfaces: &[InterfaceConfig],
        routers: &[RouterConfig],
        transports: &TransportMap,
    ) -> Result<Self> {
        let transport_for = |name: &str| -> Arc<dyn Transport> {
            transports
                .get(name)
                .cloned()
                .unwrap_or_else(|| Arc::new(DetachedTransport) as Arc<dyn Transport>)
        };

        let mut names = HashSet::new();
        let mut mapped = HashSet::new();
        let mut built_interfaces = Vec::with_capacity(interfaces.len());
        for config in interfaces {
            if !names.insert(config.name.clone()) {
                return Err(Error::invalid(format!("duplicate interface {}", config.name)));
            }
            for target in &config.targets {
                if catalog.target(target).is_none() {
                    return Err(Error::not_found(NotFoundKind::Target, target.as_str()));
                }
                if !mapped.insert(target.clone()) {
                    return Err(Error::invalid(format!(
                        "target {target} is mapped to more than one interface"
                    )));
                }
            }
            let link = Link::new(&config.name, transport_for(&config.name), config.auto_connect);
            built_interfaces.push(Interface::new(link, config.targets.clone()));
        }

        let mut built_routers = Vec::with_capacity(routers.len() + 2);
        for config in routers {
            if !names.insert(config.name.clone()) {
                return Err(Error::invalid(format!("duplicate link name {}", config.name)));
            }
            for interface in &config.interfaces {
                if !interfaces.iter().any(|i| &i.name == interface) {
                    return Err(Error::not_found(NotFoundKind::Interface, interface.as_str()));
                }
            }
            let link = Link::new(&config.name, transport_for(&config.name), config.auto_connect);
            built_routers.push(Router::new(link, RouterSource::Interfaces(config.interfaces.clone())));
        }
        for (name, source) in [
            (PREIDENTIFIED_CMD_ROUTER, RouterSource::AllCommands),
            (PREIDENTIFIED_ROUTER, RouterSource::AllTelemetry),
        ] {
            if !names.insert(name.to_string()) {
                return Err(Error::invalid(format!("{name} is reserved")));
            }
            built_routers.push(Router::new(Link::new(name, transport_for(name), true), source));
        }
        built_routers.sort_by(|a, b| a.name().cmp(b.name()));

        Ok(Self {
            tlm_counts: PacketCounters::telemetry(&catalog),
            cmd_counts: PacketCounters::commands(&catalog),
            catalog,
            interfaces: built_interfaces,
            routers: built_routers,
            remap: Mutex::new(()),
        })
    }

    /// Attach a JSON-lines raw log under `dir` to every interface and router,
    /// named `{link}_raw`.
    pub fn with_raw_log_dir(self, dir: &Path) -> Self {
        for link in self.links() {
            let label = format!("{}_raw", link.name().to_lowercase());
            link.attach_raw_log(Box::new(JsonLinesWriter::new(dir, label)));
        }
        self
    }

    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    pub fn routers(&self) -> &[Router] {
        &self.routers
    }

    pub fn interface(&self, name: &str) -> Result<&Interface> {
        self.interfaces
            .iter()
            .find(|i| i.name() == name)
            .ok_or_else(|| Error::not_found(NotFoundKind::Interface, name))
    }

    pub fn router(&self, name: &str) -> Result<&Router> {
        self.routers
            .iter()
            .find(|r| r.name() == name)
            .ok_or_else(|| Error::not_found(NotFoundKind::Router, name))
    }

    fn links(&self) -> impl Iterator<Item = &Link> {
        self.interfaces
            .iter()
            .map(Connection::link)
            .chain(self.routers.iter().map(Connection::link))
    }

    pub fn connect_interface(&self, name: &str) -> Result<ConnectionState> {
        Ok(self.interface(name)?.connect())
    }

    pub fn disconnect_interface(&self, name: &str) -> Result<()> {
        self.interface(name)?.disconnect();
        Ok(())
    }

    pub fn interface_state(&self, name: &str) -> Result<ConnectionState> {
        Ok(self.interface(name)?.state())
    }

    pub fn connect_router(&self, name: &str) -> Result<ConnectionState> {
        Ok(self.router(name)?.connect())
    }

    pub fn disconnect_router(&self, name: &str) -> Result<()> {
        self.router(name)?.disconnect();
        Ok(())
    }

    pub fn router_state(&self, name: &str) -> Result<ConnectionState> {
        Ok(self.router(name)?.state())
    }

    /// Connect every link configured with `auto_connect`.
    pub fn connect_auto(&self) {
        for link in self.links().filter(|l| l.auto_connect()) {
            link.connect();
        }
    }

    pub fn disconnect_all(&self) {
        for link in self.links() {
            link.disconnect();
        }
    }

    /// Retry every link stuck in `ATTEMPTING`; returns how many connected.
    pub fn retry_attempting(&self) -> usize {
        self.links()
            .filter(|l| l.state() == ConnectionState::Attempting)
            .filter(|l| l.retry() == ConnectionState::Connected)
            .count()
    }

    /// Write bytes straight to an interface, bypassing any protocol encoding.
    pub fn send_raw(&self, interface: &str, bytes: &[u8]) -> Result<usize> {
        self.interface(interface)?.link().write(bytes)
    }

    /// Move a target onto `interface`, removing it from its previous one.
    pub fn map_target_to_interface(&self, target: &str, interface: &str) -> Result<()> {
        if self.catalog.target(target).is_none() {
            return Err(Error::not_found(NotFoundKind::Target, target));
        }
        let destination = self.interface(interface)?;

        let _guard = self.remap.lock();
        for other in &self.interfaces {
            if other.name() != interface {
                other.remove_target(target);
            }
        }
        destination.add_target(target);
        info!(target_name = target, interface, "Mapped target to interface");
        Ok(())
    }

    pub fn get_interface_targets(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.interface(name)?.targets())
    }

    /// The interface a target is mapped to, if any.
    pub fn interface_for_target(&self, target: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.has_target(target))
    }

    pub fn get_interface_info(&self, name: &str) -> Result<LinkInfo> {
        Ok(self.interface(name)?.info())
    }

    pub fn get_all_interface_info(&self) -> Vec<LinkInfo> {
        self.interfaces.iter().map(Connection::info).collect()
    }

    pub fn get_router_info(&self, name: &str) -> Result<LinkInfo> {
        Ok(self.router(name)?.info())
    }

    pub fn get_all_router_info(&self) -> Vec<LinkInfo> {
        self.routers.iter().map(Connection::info).collect()
    }

    pub fn get_interface_names(&self) -> Vec<String> {
        self.interfaces.iter().map(|i| i.name().to_string()).collect()
    }

    pub fn get_router_names(&self) -> Vec<String> {
        self.routers.iter().map(|r| r.name().to_string()).collect()
    }

    pub fn get_target_list(&self) -> Vec<String> {
        self.catalog.target_names()
    }

    pub fn get_target_ignored_items(&self, target: &str) -> Result<Vec<String>> {
        self.catalog
            .target(target)
            .map(|t| t.ignored_items.clone())
            .ok_or_else(|| Error::not_found(NotFoundKind::Target, target))
    }

    pub fn get_target_ignored_parameters(&self, target: &str) -> Result<Vec<String>> {
        self.catalog
            .target(target)
            .map(|t| t.ignored_parameters.clone())
            .ok_or_else(|| Error::not_found(NotFoundKind::Target, target))
    }

    /// `(cmd count, tlm count)` summed over the target's packets.
    pub fn get_target_info(&self, target: &str) -> Result<(u64, u64)> {
        if self.catalog.target(target).is_none() {
            return Err(Error::not_found(NotFoundKind::Target, target));
        }
        Ok((self.cmd_counts.target_total(target), self.tlm_counts.target_total(target)))
    }

    pub fn get_all_target_info(&self) -> Vec<TargetInfo> {
        self.catalog
            .targets()
            .iter()
            .map(|t| TargetInfo {
                target: t.name.clone(),
                interface: self.interface_for_target(&t.name).map(|i| i.name().to_string()),
                cmd_count: self.cmd_counts.target_total(&t.name),
                tlm_count: self.tlm_counts.target_total(&t.name),
            })
            .collect()
    }

    pub fn get_cmd_cnt(&self, target: &str, packet: &str) -> Result<u64> {
        self.catalog.command_packet(target, packet)?;
        Ok(self.cmd_counts.get(target, packet).unwrap_or(0))
    }

    pub fn get_tlm_cnt(&self, target: &str, packet: &str) -> Result<u64> {
        self.catalog.telemetry_packet(target, packet)?;
        Ok(self.tlm_counts.get(target, packet).unwrap_or(0))
    }

    pub fn get_all_cmd_info(&self) -> Vec<PacketCount> {
        self.cmd_counts.rows()
    }

    pub fn get_all_tlm_info(&self) -> Vec<PacketCount> {
        self.tlm_counts.rows()
    }

    /// Count an identified telemetry packet and forward it to routers.
    ///
    /// Returns the packet's new received count.
    pub fn record_telemetry(
        &self,
        interface: Option<&str>,
        target: &str,
        packet: &str,
        bytes: &[u8],
    ) -> Result<u64> {
        self.catalog.telemetry_packet(target, packet)?;
        if let Some(name) = interface {
            let interface = self.interface(name)?;
            interface.link().record_read(bytes);
            self.route(|r| r.routes_telemetry_from(name), bytes);
        } else {
            self.route(|r| r.source() == &RouterSource::AllTelemetry, bytes);
        }
        Ok(self.tlm_counts.increment(target, packet).unwrap_or(0))
    }

    /// Count a buffer no packet definition matched.
    pub fn record_unidentified(&self, interface: &str, bytes: &[u8]) -> Result<u64> {
        self.interface(interface)?.link().record_read(bytes);
        Ok(self.tlm_counts.increment_unknown())
    }

    /// Accept a command received on `router`: count the read, write it to
    /// the interface the target is mapped to and count it as sent.
    ///
    /// Returns the command's new sent count.
    pub fn record_router_command(&self, router: &str, target: &str, packet: &str, bytes: &[u8]) -> Result<u64> {
        let router = self.router(router)?;
        router.link().record_read(bytes);
        self.catalog.command_packet(target, packet)?;
        let interface = self
            .interface_for_target(target)
            .ok_or_else(|| Error::invalid(format!("target {target} is not mapped to an interface")))?;
        interface.link().write(bytes)?;
        self.record_command(target, packet, bytes)
    }

    /// Count a buffer received on `router` that no command definition matched.
    pub fn record_unidentified_command(&self, router: &str, bytes: &[u8]) -> Result<u64> {
        self.router(router)?.link().record_read(bytes);
        Ok(self.cmd_counts.increment_unknown())
    }

    /// Count a command that was written and forward it to command routers.
    pub fn record_command(&self, target: &str, packet: &str, bytes: &[u8]) -> Result<u64> {
        self.catalog.command_packet(target, packet)?;
        self.route(Router::routes_commands, bytes);
        Ok(self.cmd_counts.increment(target, packet).unwrap_or(0))
    }

    fn route(&self, wants: impl Fn(&Router) -> bool, bytes: &[u8]) {
        for router in self.routers.iter().filter(|r| wants(r)) {
            if router.state() != ConnectionState::Connected {
                continue;
            }
            if let Err(e) = router.link().write(bytes) {
                debug!(router = router.name(), error = %e, "Route write failed");
            }
        }
    }

    pub fn start_raw_logging_interface(&self, name: &str) -> Result<()> {
        self.set_interface_raw_logging(name, true)
    }

    pub fn stop_raw_logging_interface(&self, name: &str) -> Result<()> {
        self.set_interface_raw_logging(name, false)
    }

    pub fn start_raw_logging_router(&self, name: &str) -> Result<()> {
        self.set_router_raw_logging(name, true)
    }

    pub fn stop_raw_logging_router(&self, name: &str) -> Result<()> {
        self.set_router_raw_logging(name, false)
    }

    fn set_interface_raw_logging(&self, name: &str, enabled: bool) -> Result<()> {
        if name == ALL {
            for interface in &self.interfaces {
                interface.link().set_raw_logging(enabled)?;
            }
            Ok(())
        } else {
            self.interface(name)?.link().set_raw_logging(enabled)
        }
    }

    fn set_router_raw_logging(&self, name: &str, enabled: bool) -> Result<()> {
        if name == ALL {
            for router in &self.routers {
                router.link().set_raw_logging(enabled)?;
            }
            Ok(())
        } else {
            self.router(name)?.link().set_raw_logging(enabled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::demo_catalog;

    fn interface(name: &str, targets: &[&str]) -> InterfaceConfig {
        InterfaceConfig {
            name: name.to_string(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
            auto_connect: true,
        }
    }

    fn registry_with(transports: TransportMap) -> ConnectionRegistry {
        ConnectionRegistry::new(
            Arc::new(demo_catalog()),
            &[interface("INST_INT", &["INST"]), interface("SPARE_INT", &[])],
            &[RouterConfig {
                name: "ROUTE".into(),
                interfaces: vec!["INST_INT".into()],
                auto_connect: true,
            }],
            &transports,
        )
        .unwrap()
    }

    fn registry() -> ConnectionRegistry {
        registry_with(TransportMap::new())
    }

    #[test]
    fn unknown_names_are_reported() {
        let registry = registry();
        assert_eq!(
            registry.get_interface_info("BLAH").unwrap_err().to_string(),
            "Unknown interface: BLAH"
        );
        assert_eq!(
            registry.get_router_info("BLAH").unwrap_err().to_string(),
            "Unknown router: BLAH"
        );
        assert_eq!(
            registry.get_target_info("BLAH").unwrap_err().to_string(),
            "Unknown target: BLAH"
        );
        assert!(registry.connect_interface("BLAH").unwrap_err().is_not_found());
        assert!(registry.router_state("BLAH").unwrap_err().is_not_found());
    }

    #[test]
    fn detached_interface_reports_attempting() {
        let registry = registry();
        registry.connect_auto();
        let info = registry.get_interface_info("INST_INT").unwrap();
        assert_eq!(info.state.as_str(), "ATTEMPTING");
        assert_eq!(info.counters.as_array(), [0; 7]);

        registry.disconnect_interface("INST_INT").unwrap();
        assert_eq!(registry.interface_state("INST_INT").unwrap(), ConnectionState::Disconnected);
    }

    #[test]
    fn builtin_routers_are_listed() {
        let registry = registry();
        assert_eq!(
            registry.get_router_names(),
            vec!["PREIDENTIFIED_CMD_ROUTER", "PREIDENTIFIED_ROUTER", "ROUTE"]
        );
        assert_eq!(registry.get_all_router_info().len(), 3);
    }

    #[test]
    fn reserved_router_name_is_rejected() {
        let result = ConnectionRegistry::new(
            Arc::new(demo_catalog()),
            &[],
            &[RouterConfig {
                name: PREIDENTIFIED_ROUTER.into(),
                interfaces: vec![],
                auto_connect: true,
            }],
            &TransportMap::new(),
        );
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn router_must_reference_known_interfaces() {
        let result = ConnectionRegistry::new(
            Arc::new(demo_catalog()),
            &[],
            &[RouterConfig {
                name: "ROUTE".into(),
                interfaces: vec!["NOPE".into()],
                auto_connect: true,
            }],
            &TransportMap::new(),
        );
        assert_eq!(result.err().unwrap().to_string(), "Unknown interface: NOPE");
    }

    #[test]
    fn map_target_moves_between_interfaces() {
        let registry = registry();
        assert_eq!(registry.get_interface_targets("INST_INT").unwrap(), vec!["INST"]);

        registry.map_target_to_interface("INST", "SPARE_INT").unwrap();
        assert!(registry.get_interface_targets("INST_INT").unwrap().is_empty());
        assert_eq!(registry.get_interface_targets("SPARE_INT").unwrap(), vec!["INST"]);

        registry.map_target_to_interface("INST", "INST_INT").unwrap();
        assert_eq!(registry.get_interface_targets("INST_INT").unwrap(), vec!["INST"]);

        assert!(registry.map_target_to_interface("BLAH", "INST_INT").is_err());
        assert!(registry.map_target_to_interface("INST", "BLAH").is_err());
    }

    #[test]
    fn all_target_info_includes_unmapped_targets() {
        let registry = registry();
        let info = registry.get_all_target_info();
        assert_eq!(info[0].target, "INST");
        assert_eq!(info[0].interface.as_deref(), Some("INST_INT"));
        assert_eq!(info[1].target, "SYSTEM");
        assert_eq!(info[1].interface, None);
        assert_eq!(registry.get_target_list(), vec!["INST", "SYSTEM"]);
    }

    #[test]
    fn packet_counts() {
        let registry = registry();
        let before = registry.get_tlm_cnt("INST", "ADCS").unwrap();
        registry.record_telemetry(Some("INST_INT"), "INST", "ADCS", &[0; 8]).unwrap();
        assert_eq!(registry.get_tlm_cnt("INST", "ADCS").unwrap() - before, 1);

        let (cmd, tlm) = registry.get_target_info("INST").unwrap();
        assert_eq!((cmd, tlm), (0, 1));
        registry.record_command("INST", "ABORT", &[1]).unwrap();
        assert_eq!(registry.get_cmd_cnt("INST", "ABORT").unwrap(), 1);

        assert!(registry.get_cmd_cnt("BLAH", "ABORT").unwrap_err().to_string().contains("does not exist"));
        assert!(registry.get_cmd_cnt("INST", "BLAH").unwrap_err().to_string().contains("does not exist"));
        assert!(registry.get_tlm_cnt("BLAH", "ADCS").unwrap_err().to_string().contains("does not exist"));
        assert!(registry.get_tlm_cnt("INST", "BLAH").unwrap_err().to_string().contains("does not exist"));

        let counters = registry.get_interface_info("INST_INT").unwrap().counters;
        assert_eq!(counters.bytes_read, 8);
        assert_eq!(counters.read_count, 1);
    }

    #[test]
    fn all_cmd_info_ends_with_unknown_row() {
        let registry = registry();
        registry.record_unidentified("INST_INT", &[0xFF]).unwrap();
        let rows = registry.get_all_tlm_info();
        let last = rows.last().unwrap();
        assert_eq!((last.target.as_str(), last.count), ("UNKNOWN", 1));

        let rows = registry.get_all_cmd_info();
        assert_eq!(rows.last().unwrap().count, 0);
        assert_eq!(rows.len(), 3);

        registry.record_unidentified_command("ROUTE", &[0xEE, 0xEE]).unwrap();
        let rows = registry.get_all_cmd_info();
        let last = rows.last().unwrap();
        assert_eq!((last.target.as_str(), last.packet.as_str(), last.count), ("UNKNOWN", "UNKNOWN", 1));
        let counters = registry.get_router_info("ROUTE").unwrap().counters;
        assert_eq!((counters.bytes_read, counters.read_count), (2, 1));
        assert!(registry.record_unidentified_command("BLAH", &[0]).is_err());
    }

    #[test]
    fn router_commands_reach_the_mapped_interface() {
        let inst = Arc::new(LoopbackTransport::new());
        let mut transports = TransportMap::new();
        transports.insert("INST_INT".into(), inst.clone());
        let registry = registry_with(transports);
        registry.connect_auto();

        assert_eq!(registry.record_router_command("ROUTE", "INST", "ABORT", b"abort").unwrap(), 1);
        assert_eq!(inst.written(), vec![b"abort".to_vec()]);
        assert_eq!(registry.get_cmd_cnt("INST", "ABORT").unwrap(), 1);
        let counters = registry.get_router_info("ROUTE").unwrap().counters;
        assert_eq!((counters.bytes_read, counters.read_count), (5, 1));
        assert_eq!(registry.get_interface_info("INST_INT").unwrap().counters.write_count, 1);

        let err = registry.record_router_command("ROUTE", "INST", "BLAH", b"x").unwrap_err();
        assert_eq!(err.not_found_kind(), Some(NotFoundKind::CommandPacket));
        // SYSTEM is not mapped to any interface
        assert!(registry.record_router_command("ROUTE", "SYSTEM", "ABORT", b"x").is_err());
        assert_eq!(registry.get_router_info("ROUTE").unwrap().counters.read_count, 3);
    }

    #[test]
    fn target_ignore_lists() {
        let registry = registry();
        assert_eq!(registry.get_target_ignored_items("SYSTEM").unwrap(), vec!["PKTID"]);
        assert_eq!(
            registry.get_target_ignored_parameters("SYSTEM").unwrap(),
            vec!["CCSDSVER", "PKTID"]
        );
        assert!(registry.get_target_ignored_items("INST").unwrap().is_empty());
        assert_eq!(
            registry.get_target_ignored_parameters("BLAH").unwrap_err().to_string(),
            "Unknown target: BLAH"
        );
    }

    #[test]
    fn send_raw_and_routing_use_transports() {
        let inst = Arc::new(LoopbackTransport::new());
        let route = Arc::new(LoopbackTransport::new());
        let mut transports = TransportMap::new();
        transports.insert("INST_INT".into(), inst.clone());
        transports.insert("ROUTE".into(), route.clone());
        let registry = registry_with(transports);
        registry.connect_auto();

        assert_eq!(registry.send_raw("INST_INT", b"\x00\x01").unwrap(), 2);
        assert_eq!(inst.written(), vec![vec![0x00, 0x01]]);

        registry.record_telemetry(Some("INST_INT"), "INST", "HEALTH_STATUS", b"tlm").unwrap();
        assert_eq!(route.written(), vec![b"tlm".to_vec()]);
        assert_eq!(registry.get_router_info("ROUTE").unwrap().counters.write_count, 1);

        // SPARE_INT has no transport attached
        assert!(registry.send_raw("SPARE_INT", b"x").is_err());
        assert_eq!(registry.get_interface_info("SPARE_INT").unwrap().counters.write_error_count, 1);
    }

    #[test]
    fn retry_attempting_connects_recovered_links() {
        let registry = registry();
        registry.connect_auto();
        assert_eq!(registry.retry_attempting(), 0);
        assert_eq!(registry.interface_state("INST_INT").unwrap(), ConnectionState::Attempting);
    }

    #[test]
    fn raw_logging_toggles() {
        let registry = registry();
        registry.start_raw_logging_interface(ALL).unwrap();
        assert!(registry.interfaces().iter().all(|i| i.link().raw_logging()));
        registry.stop_raw_logging_interface("INST_INT").unwrap();
        assert!(!registry.interface("INST_INT").unwrap().link().raw_logging());
        assert!(registry.interface("SPARE_INT").unwrap().link().raw_logging());

        registry.start_raw_logging_router("ROUTE").unwrap();
        assert!(registry.router("ROUTE").unwrap().link().raw_logging());
        registry.stop_raw_logging_router(ALL).unwrap();
        assert!(registry.routers().iter().all(|r| !r.link().raw_logging()));

        assert!(registry.start_raw_logging_router("BLAH").is_err());
    }

    #[test]
    fn raw_logs_follow_the_toggle() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry().with_raw_log_dir(dir.path());

        registry.record_unidentified("INST_INT", b"off").unwrap();
        registry.start_raw_logging_interface("INST_INT").unwrap();
        registry.record_unidentified("INST_INT", b"on").unwrap();
        registry.record_unidentified("SPARE_INT", b"spare").unwrap();
        registry.stop_raw_logging_interface(ALL).unwrap();
        registry.record_unidentified("INST_INT", b"off again").unwrap();

        let path = registry.interface("INST_INT").unwrap().link().raw_log_filename().unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().contains("inst_int_raw"));
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 1);
        let line: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(line["bytes"], serde_json::json!(b"on".to_vec()));
        assert!(registry.interface("SPARE_INT").unwrap().link().raw_log_filename().is_none());
    }
}
