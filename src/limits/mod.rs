//! Limits monitoring engine.
//!
//! Holds the current value and limits state of every telemetry item,
//! classifies packets as they are checked, applies persistence, tracks
//! packet staleness, and publishes every change of effective state to the
//! hub's limits channel.
//!
//! Each item is guarded by its own mutex. Classification additionally holds
//! the engine-wide gate shared, and group toggles hold it exclusively, so a
//! group toggle is never observed half applied.

mod classify;
mod item;

pub use classify::classify;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ctsd_types::{current_timestamp_ms, LimitState, LimitsEvent, LimitsSettings, OutOfLimitsItem, OverallState, ServerMessage};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::catalog::{Catalog, ItemRef, LimitsDefinition};
use crate::config::LimitsConfig;
use crate::error::{Error, NotFoundKind, Result};
use crate::hub::Hub;
use item::{ItemLimits, ItemState, Transition};

/// Arguments of [`LimitsEngine::set_limits`].
///
/// Defaults: set `CUSTOM`, configured default persistence, enabled, no green band.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitsRequest {
    pub red_low: f64,
    pub yellow_low: f64,
    pub yellow_high: f64,
    pub red_high: f64,
    pub green_low: Option<f64>,
    pub green_high: Option<f64>,
    pub set: String,
    pub persistence: Option<u32>,
    pub enabled: bool,
}

impl LimitsRequest {
    pub const DEFAULT_SET: &'static str = "CUSTOM";

    pub fn new(red_low: f64, yellow_low: f64, yellow_high: f64, red_high: f64) -> Self {
        Self {
            red_low,
            yellow_low,
            yellow_high,
            red_high,
            green_low: None,
            green_high: None,
            set: Self::DEFAULT_SET.to_string(),
            persistence: None,
            enabled: true,
        }
    }

    pub fn green(mut self, green_low: f64, green_high: f64) -> Self {
        self.green_low = Some(green_low);
        self.green_high = Some(green_high);
        self
    }

    pub fn set(mut self, set: impl Into<String>) -> Self {
        self.set = set.into();
        self
    }

    pub fn persistence(mut self, persistence: u32) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

#[derive(Debug, Default)]
struct PacketClock {
    last_checked: Option<Instant>,
    /// Items were moved to `STALE` by a sweep since the last check.
    stale_marked: bool,
}

struct PacketLimits {
    target: String,
    packet: String,
    /// Indices into `LimitsEngine::items`.
    items: Vec<usize>,
    item_index: HashMap<String, usize>,
    clock: Mutex<PacketClock>,
}

impl PacketLimits {
    fn is_stale(&self, now: Instant, window: Duration) -> bool {
        self.clock
            .lock()
            .last_checked
            .map_or(true, |checked| now.saturating_duration_since(checked) >= window)
    }
}

pub struct LimitsEngine {
    hub: Arc<Hub>,
    items: Vec<ItemLimits>,
    packets: Vec<PacketLimits>,
    /// target -> packet -> index into `packets`
    index: HashMap<String, HashMap<String, usize>>,
    groups: Vec<(String, Vec<usize>)>,
    gate: RwLock<()>,
    sets: RwLock<Vec<String>>,
    active_set: RwLock<String>,
    staleness_window: Duration,
    default_persistence: u32,
}

impl LimitsEngine {
    pub fn new(catalog: &Catalog, hub: Arc<Hub>, config: &LimitsConfig) -> Result<Self> {
        if config.default_persistence == 0 {
            return Err(Error::invalid("default persistence must be at least 1"));
        }

        let mut items = Vec::new();
        let mut packets = Vec::new();
        let mut index: HashMap<String, HashMap<String, usize>> = HashMap::new();

        for target in catalog.targets() {
            let by_packet = index.entry(target.name.clone()).or_default();
            for packet in &target.telemetry {
                let mut entry = PacketLimits {
                    target: target.name.clone(),
                    packet: packet.name.clone(),
                    items: Vec::with_capacity(packet.items.len()),
                    item_index: HashMap::with_capacity(packet.items.len()),
                    clock: Mutex::new(PacketClock::default()),
                };
                for def in &packet.items {
                    entry.items.push(items.len());
                    entry.item_index.insert(def.name.clone(), items.len());
                    items.push(ItemLimits {
                        id: ItemRef::new(&target.name, &packet.name, &def.name),
                        state: Mutex::new(ItemState::new(def)),
                    });
                }
                by_packet.insert(packet.name.clone(), packets.len());
                packets.push(entry);
            }
        }

        let mut engine = Self {
            hub,
            items,
            packets,
            index,
            groups: Vec::new(),
            gate: RwLock::new(()),
            sets: RwLock::new(catalog.limits_sets()),
            active_set: RwLock::new(String::new()),
            staleness_window: config.staleness_window,
            default_persistence: config.default_persistence,
        };

        for group in catalog.limits_groups() {
            let members = group
                .items
                .iter()
                .map(|i| engine.item_position(&i.target, &i.packet, &i.item))
                .collect::<Result<Vec<_>>>()?;
            engine.groups.push((group.name.clone(), members));
        }

        if !engine.sets.read().contains(&config.active_set) {
            return Err(Error::not_found(NotFoundKind::LimitsSet, config.active_set.as_str()));
        }
        *engine.active_set.write() = config.active_set.clone();
        Ok(engine)
    }

    pub fn staleness_window(&self) -> Duration {
        self.staleness_window
    }

    fn target_packets(&self, target: &str) -> Result<&HashMap<String, usize>> {
        self.index
            .get(target)
            .ok_or_else(|| Error::not_found(NotFoundKind::TelemetryTarget, target))
    }

    fn packet(&self, target: &str, packet: &str) -> Result<&PacketLimits> {
        self.target_packets(target)?
            .get(packet)
            .map(|&i| &self.packets[i])
            .ok_or_else(|| Error::not_found(NotFoundKind::TelemetryPacket, format!("{target} {packet}")))
    }

    fn item_position(&self, target: &str, packet: &str, item: &str) -> Result<usize> {
        self.packet(target, packet)?
            .item_index
            .get(item)
            .copied()
            .ok_or_else(|| Error::not_found(NotFoundKind::Item, format!("{target} {packet} {item}")))
    }

    fn item(&self, target: &str, packet: &str, item: &str) -> Result<&ItemLimits> {
        Ok(&self.items[self.item_position(target, packet, item)?])
    }

    /// Store new raw and converted values for items of a packet without
    /// checking limits. Fails without storing anything if a name is unknown.
    pub fn update_values(&self, target: &str, packet: &str, values: &[(&str, f64, f64)]) -> Result<()> {
        let entry = self.packet(target, packet)?;
        let positions = values
            .iter()
            .map(|(name, _, _)| {
                entry
                    .item_index
                    .get(*name)
                    .copied()
                    .ok_or_else(|| Error::not_found(NotFoundKind::Item, format!("{target} {packet} {name}")))
            })
            .collect::<Result<Vec<_>>>()?;

        for (position, (_, raw, converted)) in positions.into_iter().zip(values) {
            let mut state = self.items[position].state.lock();
            state.raw = Some(*raw);
            state.value = Some(*converted);
        }
        Ok(())
    }

    /// Current `(raw, converted)` value of an item.
    pub fn item_value(&self, target: &str, packet: &str, item: &str) -> Result<(Option<f64>, Option<f64>)> {
        let state = self.item(target, packet, item)?.state.lock();
        Ok((state.raw, state.value))
    }

    /// Classify every item of a packet and reset its staleness clock.
    ///
    /// Returns the number of limits events published.
    pub fn check_limits(&self, target: &str, packet: &str) -> Result<usize> {
        let entry = self.packet(target, packet)?;
        let transitions = {
            let _gate = self.gate.read();
            let set = self.active_set.read().clone();
            {
                let mut clock = entry.clock.lock();
                clock.last_checked = Some(Instant::now());
                clock.stale_marked = false;
            }
            entry
                .items
                .iter()
                .filter_map(|&i| {
                    let item = &self.items[i];
                    item.state.lock().evaluate(&set).map(|t| (i, t))
                })
                .collect::<Vec<_>>()
        };
        Ok(self.publish(transitions))
    }

    fn publish(&self, transitions: Vec<(usize, Transition)>) -> usize {
        let timestamp_ms = current_timestamp_ms();
        let count = transitions.len();
        for (i, transition) in transitions {
            let id = &self.items[i].id;
            debug!(
                item = %id,
                old = transition.old.map(|s| s.as_str()).unwrap_or("NONE"),
                new = transition.new.as_str(),
                value = transition.value,
                "Limits state changed"
            );
            self.hub.publish_limits_event(LimitsEvent {
                target: id.target.clone(),
                packet: id.packet.clone(),
                item: id.item.clone(),
                old_state: transition.old,
                new_state: transition.new,
                value: transition.value,
                timestamp_ms,
            });
        }
        count
    }

    pub fn limits_enabled(&self, target: &str, packet: &str, item: &str) -> Result<bool> {
        Ok(self.item(target, packet, item)?.state.lock().enabled)
    }

    pub fn enable_limits(&self, target: &str, packet: &str, item: &str) -> Result<()> {
        self.item(target, packet, item)?.state.lock().enabled = true;
        Ok(())
    }

    /// Stop classifying an item. Its definitions and effective state are kept.
    pub fn disable_limits(&self, target: &str, packet: &str, item: &str) -> Result<()> {
        let mut state = self.item(target, packet, item)?.state.lock();
        state.enabled = false;
        state.reset_pending();
        Ok(())
    }

    /// Threshold definition under `set`, or the active set when `None`.
    ///
    /// `Ok(None)` when the item has no definition for that set.
    pub fn get_limits(&self, target: &str, packet: &str, item: &str, set: Option<&str>) -> Result<Option<LimitsSettings>> {
        let item = self.item(target, packet, item)?;
        let set = match set {
            Some(set) => set.to_string(),
            None => self.get_limits_set(),
        };
        let state = item.state.lock();
        Ok(state
            .definitions
            .get(&set)
            .map(|def| settings(&set, def, state.enabled)))
    }

    /// Store a threshold definition and return it as `get_limits` would.
    pub fn set_limits(&self, target: &str, packet: &str, item: &str, request: LimitsRequest) -> Result<LimitsSettings> {
        let item = self.item(target, packet, item)?;
        let definition = LimitsDefinition {
            persistence: request.persistence.unwrap_or(self.default_persistence),
            red_low: request.red_low,
            yellow_low: request.yellow_low,
            yellow_high: request.yellow_high,
            red_high: request.red_high,
            green_low: request.green_low,
            green_high: request.green_high,
        };
        definition.validate()?;

        {
            let mut sets = self.sets.write();
            if !sets.contains(&request.set) {
                sets.push(request.set.clone());
            }
        }

        let active = self.get_limits_set();
        let mut state = item.state.lock();
        state.definitions.insert(request.set.clone(), definition);
        state.enabled = request.enabled;
        if request.set == active {
            state.reset_pending();
        }
        info!(item = %item.id, set = %request.set, "Limits changed");
        Ok(settings(&request.set, &definition, state.enabled))
    }

    /// Group names in definition order.
    pub fn get_limits_groups(&self) -> Vec<String> {
        self.groups.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn enable_limits_group(&self, name: &str) -> Result<()> {
        self.toggle_group(name, true)
    }

    pub fn disable_limits_group(&self, name: &str) -> Result<()> {
        self.toggle_group(name, false)
    }

    fn toggle_group(&self, name: &str, enabled: bool) -> Result<()> {
        let (_, members) = self
            .groups
            .iter()
            .find(|(group, _)| group == name)
            .ok_or_else(|| Error::not_found(NotFoundKind::LimitsGroup, name))?;

        let _gate = self.gate.write();
        for &i in members {
            let mut state = self.items[i].state.lock();
            state.enabled = enabled;
            if !enabled {
                state.reset_pending();
            }
        }
        info!(group = name, enabled, "Limits group toggled");
        Ok(())
    }

    /// Known limit sets: the catalog's sets as [`Catalog::limits_sets`] orders
    /// them, followed by sets introduced through `set_limits` in the order
    /// they were added.
    pub fn get_limits_sets(&self) -> Vec<String> {
        self.sets.read().clone()
    }

    pub fn get_limits_set(&self) -> String {
        self.active_set.read().clone()
    }

    /// Switch the active set. Effective states are kept until the next check.
    pub fn set_limits_set(&self, name: &str) -> Result<()> {
        if !self.sets.read().iter().any(|s| s == name) {
            return Err(Error::not_found(NotFoundKind::LimitsSet, name));
        }
        {
            let _gate = self.gate.write();
            *self.active_set.write() = name.to_string();
            for item in &self.items {
                item.state.lock().reset_pending();
            }
        }
        info!(set = name, "Limits set changed");
        self.hub
            .publish_server_message(ServerMessage::new(format!("Limits Set Changed to: {name}")));
        Ok(())
    }

    /// Items currently in a red or yellow state.
    pub fn get_out_of_limits(&self) -> Vec<OutOfLimitsItem> {
        let set = self.get_limits_set();
        self.items
            .iter()
            .filter_map(|item| {
                let state = item.state.lock();
                match state.effective {
                    Some(effective) if effective.is_out_of_limits() && state.is_monitored(&set) => {
                        Some(OutOfLimitsItem {
                            target: item.id.target.clone(),
                            packet: item.id.packet.clone(),
                            item: item.id.item.clone(),
                            state: effective,
                        })
                    }
                    _ => None,
                }
            })
            .collect()
    }

    /// Most severe effective state among enabled items of non-stale packets.
    pub fn get_overall_limits_state(&self) -> OverallState {
        self.overall_at(Instant::now(), &[])
    }

    /// As [`get_overall_limits_state`](Self::get_overall_limits_state),
    /// leaving out the listed items.
    pub fn overall_limits_state_ignoring(&self, ignored: &[ItemRef]) -> OverallState {
        self.overall_at(Instant::now(), ignored)
    }

    fn overall_at(&self, now: Instant, ignored: &[ItemRef]) -> OverallState {
        let _gate = self.gate.read();
        let set = self.active_set.read().clone();
        self.packets
            .iter()
            .filter(|packet| !packet.is_stale(now, self.staleness_window))
            .flat_map(|packet| packet.items.iter().map(|&i| &self.items[i]))
            .filter(|item| !ignored.contains(&item.id))
            .filter_map(|item| {
                let state = item.state.lock();
                if state.is_monitored(&set) {
                    state.effective.and_then(|s| s.severity())
                } else {
                    None
                }
            })
            .max()
            .unwrap_or_default()
    }

    /// Stale `(target, packet)` pairs, optionally only those with monitored
    /// items and optionally restricted to one target.
    pub fn get_stale(&self, with_limits_only: bool, target: Option<&str>) -> Result<Vec<(String, String)>> {
        self.stale_at(Instant::now(), with_limits_only, target)
    }

    fn stale_at(&self, now: Instant, with_limits_only: bool, target: Option<&str>) -> Result<Vec<(String, String)>> {
        if let Some(target) = target {
            self.target_packets(target)?;
        }
        Ok(self
            .packets
            .iter()
            .filter(|p| target.map_or(true, |t| p.target == t))
            .filter(|p| !with_limits_only || self.has_definitions(p))
            .filter(|p| p.is_stale(now, self.staleness_window))
            .map(|p| (p.target.clone(), p.packet.clone()))
            .collect())
    }

    /// Whether any item of the packet currently carries a definition in any set.
    fn has_definitions(&self, packet: &PacketLimits) -> bool {
        packet
            .items
            .iter()
            .any(|&i| !self.items[i].state.lock().definitions.is_empty())
    }

    /// Move monitored items of packets that went stale since their last
    /// check to `STALE`, publishing an event for each.
    ///
    /// Returns the number of packets newly marked.
    pub fn sweep_stale(&self) -> usize {
        self.sweep_stale_at(Instant::now())
    }

    fn sweep_stale_at(&self, now: Instant) -> usize {
        let mut marked = 0;
        let mut transitions = Vec::new();
        {
            let _gate = self.gate.read();
            let set = self.active_set.read().clone();
            for packet in &self.packets {
                {
                    let mut clock = packet.clock.lock();
                    let expired = clock
                        .last_checked
                        .is_some_and(|checked| now.saturating_duration_since(checked) >= self.staleness_window);
                    if !expired || clock.stale_marked {
                        continue;
                    }
                    clock.stale_marked = true;
                }
                marked += 1;
                for &i in &packet.items {
                    if let Some(transition) = self.items[i].state.lock().mark_stale(&set) {
                        transitions.push((i, transition));
                    }
                }
            }
        }
        if marked > 0 {
            debug!(packets = marked, "Marked stale packets");
        }
        self.publish(transitions);
        marked
    }

    /// The state callers see for an item: `DISABLED` when it is not
    /// monitored under the active set, `STALE` when its packet is stale,
    /// otherwise the effective state.
    ///
    /// `None` for a monitored item in a fresh packet that has no effective
    /// state yet, because it was never sampled or persistence has not been
    /// reached.
    pub fn get_item_limits_state(&self, target: &str, packet: &str, item: &str) -> Result<Option<LimitState>> {
        self.item_state_at(Instant::now(), target, packet, item)
    }

    fn item_state_at(&self, now: Instant, target: &str, packet: &str, item: &str) -> Result<Option<LimitState>> {
        let entry = self.packet(target, packet)?;
        let item = self.item(target, packet, item)?;
        let set = self.get_limits_set();
        let state = item.state.lock();
        if !state.is_monitored(&set) {
            return Ok(Some(LimitState::Disabled));
        }
        if entry.is_stale(now, self.staleness_window) {
            return Ok(Some(LimitState::Stale));
        }
        Ok(state.effective)
    }
}

fn settings(set: &str, def: &LimitsDefinition, enabled: bool) -> LimitsSettings {
    LimitsSettings {
        set: set.to_string(),
        persistence: def.persistence,
        enabled,
        red_low: def.red_low,
        yellow_low: def.yellow_low,
        yellow_high: def.yellow_high,
        red_high: def.red_high,
        green_low: def.green_low,
        green_high: def.green_high,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::demo_catalog;
    use crate::config::HubConfig;

    fn engine() -> (LimitsEngine, Arc<Hub>) {
        let hub = Arc::new(Hub::new(&HubConfig::default()));
        let engine = LimitsEngine::new(&demo_catalog(), hub.clone(), &LimitsConfig::default()).unwrap();
        (engine, hub)
    }

    /// Store converted values (raw 0 converts to -100) and check the packet.
    fn inject(engine: &LimitsEngine, packet: &str, values: &[(&str, f64)]) {
        let values: Vec<(&str, f64, f64)> = values.iter().map(|(n, v)| (*n, *v, *v)).collect();
        engine.update_values("INST", packet, &values).unwrap();
        engine.check_limits("INST", packet).unwrap();
    }

    const TEMPS: [&str; 4] = ["TEMP1", "TEMP2", "TEMP3", "TEMP4"];

    #[test]
    fn all_items_below_red_low_make_overall_red() {
        let (engine, _) = engine();
        inject(&engine, "HEALTH_STATUS", &TEMPS.map(|t| (t, -100.0)));

        for item in TEMPS {
            assert_eq!(
                engine.get_item_limits_state("INST", "HEALTH_STATUS", item).unwrap(),
                Some(LimitState::RedLow)
            );
        }
        assert_eq!(engine.get_overall_limits_state(), OverallState::Red);
        assert_eq!(engine.get_out_of_limits().len(), 4);
    }

    #[test]
    fn overall_is_neutral_without_monitored_items() {
        let (engine, _) = engine();
        assert_eq!(engine.get_overall_limits_state(), OverallState::Green);

        inject(&engine, "HEALTH_STATUS", &TEMPS.map(|t| (t, 70.0)));
        assert_eq!(engine.get_overall_limits_state(), OverallState::Yellow);

        engine.disable_limits_group("FIRST").unwrap();
        engine.disable_limits_group("SECOND").unwrap();
        assert_eq!(engine.get_overall_limits_state(), OverallState::Green);
    }

    #[test]
    fn overall_skips_stale_packets_and_ignored_items() {
        let (engine, _) = engine();
        inject(&engine, "HEALTH_STATUS", &[("TEMP1", 90.0), ("TEMP2", 70.0)]);
        assert_eq!(engine.get_overall_limits_state(), OverallState::Red);

        let ignored = [ItemRef::new("INST", "HEALTH_STATUS", "TEMP1")];
        assert_eq!(engine.overall_limits_state_ignoring(&ignored), OverallState::Yellow);

        let later = Instant::now() + engine.staleness_window() * 2;
        assert_eq!(engine.overall_at(later, &[]), OverallState::Green);
    }

    #[test]
    fn events_are_published_on_transitions_only() {
        let (engine, hub) = engine();
        let id = hub.subscribe_limits_events(None).unwrap();

        inject(&engine, "HEALTH_STATUS", &[("TEMP1", 0.0)]);
        inject(&engine, "HEALTH_STATUS", &[("TEMP1", 1.0)]);
        inject(&engine, "HEALTH_STATUS", &[("TEMP1", 90.0)]);

        assert_eq!(hub.limits_events().backlog(id).unwrap(), 2);
        let first = tokio_test::block_on(hub.get_limits_event(id, Duration::ZERO)).unwrap().unwrap();
        assert_eq!(first.item, "TEMP1");
        assert_eq!(first.old_state, None);
        assert_eq!(first.new_state, LimitState::Green);
        let second = tokio_test::block_on(hub.get_limits_event(id, Duration::ZERO)).unwrap().unwrap();
        assert_eq!(second.old_state, Some(LimitState::Green));
        assert_eq!(second.new_state, LimitState::RedHigh);
        assert_eq!(second.value, 90.0);
    }

    #[test]
    fn persistence_filters_flicker() {
        let (engine, hub) = engine();
        engine
            .set_limits(
                "INST",
                "HEALTH_STATUS",
                "TEMP1",
                LimitsRequest::new(-80.0, -70.0, 60.0, 80.0).set("DEFAULT").persistence(3),
            )
            .unwrap();
        for _ in 0..3 {
            inject(&engine, "HEALTH_STATUS", &[("TEMP1", 0.0)]);
        }
        let id = hub.subscribe_limits_events(None).unwrap();
        for _ in 0..10 {
            inject(&engine, "HEALTH_STATUS", &[("TEMP1", 90.0)]);
            inject(&engine, "HEALTH_STATUS", &[("TEMP1", 90.0)]);
            inject(&engine, "HEALTH_STATUS", &[("TEMP1", 0.0)]);
        }
        assert_eq!(hub.limits_events().backlog(id).unwrap(), 0);
        assert_eq!(
            engine.get_item_limits_state("INST", "HEALTH_STATUS", "TEMP1").unwrap(),
            Some(LimitState::Green)
        );
    }

    #[test]
    fn unknown_names_fail_with_catalog_messages() {
        let (engine, _) = engine();
        assert_eq!(
            engine.limits_enabled("BLAH", "HEALTH_STATUS", "TEMP1").unwrap_err().to_string(),
            "Telemetry target 'BLAH' does not exist"
        );
        assert_eq!(
            engine.enable_limits("INST", "BLAH", "TEMP1").unwrap_err().to_string(),
            "Telemetry packet 'INST BLAH' does not exist"
        );
        assert_eq!(
            engine.disable_limits("INST", "HEALTH_STATUS", "BLAH").unwrap_err().to_string(),
            "Packet item 'INST HEALTH_STATUS BLAH' does not exist"
        );
        assert!(engine.get_limits("BLAH", "HEALTH_STATUS", "TEMP1", None).is_err());
        assert!(engine
            .set_limits("INST", "HEALTH_STATUS", "BLAH", LimitsRequest::new(0.0, 1.0, 2.0, 3.0))
            .is_err());
    }

    #[test]
    fn enable_and_disable_are_idempotent_and_keep_definitions() {
        let (engine, _) = engine();
        let before = engine.get_limits("INST", "HEALTH_STATUS", "TEMP1", None).unwrap();

        engine.disable_limits("INST", "HEALTH_STATUS", "TEMP1").unwrap();
        engine.disable_limits("INST", "HEALTH_STATUS", "TEMP1").unwrap();
        assert!(!engine.limits_enabled("INST", "HEALTH_STATUS", "TEMP1").unwrap());
        assert_eq!(
            engine.get_item_limits_state("INST", "HEALTH_STATUS", "TEMP1").unwrap(),
            Some(LimitState::Disabled)
        );

        engine.enable_limits("INST", "HEALTH_STATUS", "TEMP1").unwrap();
        engine.enable_limits("INST", "HEALTH_STATUS", "TEMP1").unwrap();
        assert!(engine.limits_enabled("INST", "HEALTH_STATUS", "TEMP1").unwrap());
        assert_eq!(engine.get_limits("INST", "HEALTH_STATUS", "TEMP1", None).unwrap(), before);
    }

    #[test]
    fn get_limits_reports_catalog_definitions() {
        let (engine, _) = engine();
        let default = engine.get_limits("INST", "HEALTH_STATUS", "TEMP1", None).unwrap().unwrap();
        assert_eq!(default.set, "DEFAULT");
        assert_eq!(default.persistence, 1);
        assert!(default.enabled);
        assert_eq!(
            (default.red_low, default.yellow_low, default.yellow_high, default.red_high),
            (-80.0, -70.0, 60.0, 80.0)
        );
        assert_eq!((default.green_low, default.green_high), (Some(-20.0), Some(20.0)));

        let tvac = engine.get_limits("INST", "HEALTH_STATUS", "TEMP1", Some("TVAC")).unwrap().unwrap();
        assert_eq!((tvac.red_low, tvac.yellow_low, tvac.yellow_high, tvac.red_high), (-80.0, -30.0, 30.0, 80.0));
        assert_eq!((tvac.green_low, tvac.green_high), (None, None));

        assert_eq!(engine.get_limits("INST", "ADCS", "POSX", None).unwrap(), None);
    }

    #[test]
    fn set_limits_round_trips() {
        let (engine, _) = engine();
        let stored = engine
            .set_limits("INST", "HEALTH_STATUS", "TEMP1", LimitsRequest::new(0.0, 10.0, 20.0, 30.0))
            .unwrap();
        assert_eq!(
            stored,
            LimitsSettings {
                set: "CUSTOM".into(),
                persistence: 1,
                enabled: true,
                red_low: 0.0,
                yellow_low: 10.0,
                yellow_high: 20.0,
                red_high: 30.0,
                green_low: None,
                green_high: None,
            }
        );
        assert_eq!(
            engine.get_limits("INST", "HEALTH_STATUS", "TEMP1", Some("CUSTOM")).unwrap(),
            Some(stored)
        );

        let stored = engine
            .set_limits(
                "INST",
                "HEALTH_STATUS",
                "TEMP1",
                LimitsRequest::new(0.0, 10.0, 20.0, 30.0)
                    .green(12.0, 15.0)
                    .persistence(2)
                    .enabled(false)
                    .set("CUSTOM2"),
            )
            .unwrap();
        assert_eq!(stored.set, "CUSTOM2");
        assert_eq!(stored.persistence, 2);
        assert!(!stored.enabled);
        assert_eq!((stored.green_low, stored.green_high), (Some(12.0), Some(15.0)));
        assert_eq!(
            engine.get_limits("INST", "HEALTH_STATUS", "TEMP1", Some("CUSTOM2")).unwrap(),
            Some(stored)
        );

        assert_eq!(engine.get_limits_sets(), vec!["DEFAULT", "TVAC", "CUSTOM", "CUSTOM2"]);
    }

    #[test]
    fn set_limits_validates() {
        let (engine, _) = engine();
        let err = engine
            .set_limits("INST", "HEALTH_STATUS", "TEMP1", LimitsRequest::new(10.0, 0.0, 20.0, 30.0))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        let err = engine
            .set_limits("INST", "HEALTH_STATUS", "TEMP1", LimitsRequest::new(0.0, 10.0, 20.0, 30.0).persistence(0))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(engine.get_limits_sets(), vec!["DEFAULT", "TVAC"]);
    }

    #[test]
    fn groups_toggle_members() {
        let (engine, _) = engine();
        assert_eq!(engine.get_limits_groups(), vec!["FIRST", "SECOND"]);

        engine.disable_limits_group("FIRST").unwrap();
        assert!(!engine.limits_enabled("INST", "HEALTH_STATUS", "TEMP1").unwrap());
        assert!(engine.limits_enabled("INST", "HEALTH_STATUS", "TEMP2").unwrap());
        assert!(!engine.limits_enabled("INST", "HEALTH_STATUS", "TEMP3").unwrap());

        engine.enable_limits_group("FIRST").unwrap();
        assert!(engine.limits_enabled("INST", "HEALTH_STATUS", "TEMP1").unwrap());
        assert!(engine.limits_enabled("INST", "HEALTH_STATUS", "TEMP3").unwrap());
    }

    #[test]
    fn undefined_group_changes_nothing() {
        let (engine, _) = engine();
        engine.disable_limits("INST", "HEALTH_STATUS", "TEMP2").unwrap();
        let before: Vec<bool> = TEMPS
            .iter()
            .map(|t| engine.limits_enabled("INST", "HEALTH_STATUS", t).unwrap())
            .collect();

        for result in [engine.enable_limits_group("MINE"), engine.disable_limits_group("MINE")] {
            let err = result.unwrap_err();
            assert_eq!(err.not_found_kind(), Some(NotFoundKind::LimitsGroup));
            assert!(err.to_string().contains("LIMITS_GROUP MINE undefined"));
        }

        let after: Vec<bool> = TEMPS
            .iter()
            .map(|t| engine.limits_enabled("INST", "HEALTH_STATUS", t).unwrap())
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn limits_sets_switch() {
        let (engine, hub) = engine();
        let messages = hub.subscribe_server_messages(None).unwrap();
        assert_eq!(engine.get_limits_set(), "DEFAULT");

        engine.set_limits_set("TVAC").unwrap();
        assert_eq!(engine.get_limits_set(), "TVAC");
        let message = tokio_test::block_on(hub.get_server_message(messages, Duration::ZERO))
            .unwrap()
            .unwrap();
        assert_eq!(message.message, "Limits Set Changed to: TVAC");

        // 40 is GREEN_HIGH under DEFAULT but YELLOW_HIGH under TVAC
        inject(&engine, "HEALTH_STATUS", &[("TEMP1", 40.0)]);
        assert_eq!(
            engine.get_item_limits_state("INST", "HEALTH_STATUS", "TEMP1").unwrap(),
            Some(LimitState::YellowHigh)
        );

        let err = engine.set_limits_set("BLAH").unwrap_err();
        assert_eq!(err.not_found_kind(), Some(NotFoundKind::LimitsSet));
        assert_eq!(engine.get_limits_set(), "TVAC");
    }

    #[test]
    fn runtime_sets_are_appended_in_order_added() {
        let (engine, _) = engine();
        for set in ["ZCOLD", "AHOT", "ZCOLD"] {
            engine
                .set_limits("INST", "PARAMS", "VALUE1", LimitsRequest::new(0.0, 1.0, 4.0, 5.0).set(set))
                .unwrap();
        }
        assert_eq!(engine.get_limits_sets(), vec!["DEFAULT", "TVAC", "ZCOLD", "AHOT"]);
    }

    #[test]
    fn item_without_definition_in_active_set_is_disabled() {
        let (engine, _) = engine();
        engine.set_limits_set("TVAC").unwrap();
        inject(&engine, "PARAMS", &[("VALUE1", 100.0)]);
        assert_eq!(
            engine.get_item_limits_state("INST", "PARAMS", "VALUE1").unwrap(),
            Some(LimitState::Disabled)
        );
    }

    #[test]
    fn checked_packets_are_not_stale() {
        let (engine, _) = engine();
        inject(&engine, "HEALTH_STATUS", &TEMPS.map(|t| (t, 0.0)));

        let stale = engine.get_stale(false, Some("INST")).unwrap();
        assert!(!stale.contains(&("INST".into(), "HEALTH_STATUS".into())));
        for packet in ["ADCS", "PARAMS", "IMAGE"] {
            assert!(stale.contains(&("INST".into(), packet.into())), "{packet}");
        }

        assert_eq!(
            engine.get_stale(true, Some("INST")).unwrap(),
            vec![("INST".to_string(), "PARAMS".to_string())]
        );
        assert_eq!(
            engine.get_stale(false, Some("BLAH")).unwrap_err().to_string(),
            "Telemetry target 'BLAH' does not exist"
        );
        assert!(engine
            .get_stale(false, None)
            .unwrap()
            .contains(&("SYSTEM".into(), "LIMITS_CHANGE".into())));
    }

    #[test]
    fn definitions_added_at_runtime_count_for_stale_queries() {
        let (engine, _) = engine();
        let with_limits = engine.get_stale(true, Some("INST")).unwrap();
        assert!(!with_limits.contains(&("INST".into(), "ADCS".into())));

        engine
            .set_limits(
                "INST",
                "ADCS",
                "POSX",
                LimitsRequest::new(-10.0, -5.0, 5.0, 10.0).set("DEFAULT"),
            )
            .unwrap();
        let with_limits = engine.get_stale(true, Some("INST")).unwrap();
        assert!(with_limits.contains(&("INST".into(), "ADCS".into())));
        assert!(!with_limits.contains(&("INST".into(), "IMAGE".into())));
    }

    #[test]
    fn fresh_item_without_effective_state_reports_none() {
        let (engine, _) = engine();
        engine
            .set_limits(
                "INST",
                "HEALTH_STATUS",
                "TEMP1",
                LimitsRequest::new(-80.0, -70.0, 60.0, 80.0).set("DEFAULT").persistence(3),
            )
            .unwrap();
        inject(&engine, "HEALTH_STATUS", &[("TEMP1", 0.0)]);

        // sampled but below persistence
        assert_eq!(engine.get_item_limits_state("INST", "HEALTH_STATUS", "TEMP1").unwrap(), None);
        // never sampled
        assert_eq!(engine.get_item_limits_state("INST", "HEALTH_STATUS", "TEMP2").unwrap(), None);
        assert!(!engine
            .get_stale(false, Some("INST"))
            .unwrap()
            .contains(&("INST".into(), "HEALTH_STATUS".into())));

        inject(&engine, "HEALTH_STATUS", &[("TEMP1", 0.0)]);
        inject(&engine, "HEALTH_STATUS", &[("TEMP1", 0.0)]);
        assert_eq!(
            engine.get_item_limits_state("INST", "HEALTH_STATUS", "TEMP1").unwrap(),
            Some(LimitState::Green)
        );
    }

    #[test]
    fn group_toggles_are_atomic_against_concurrent_checks() {
        let (engine, _) = engine();
        let done = std::sync::atomic::AtomicBool::new(false);

        std::thread::scope(|scope| {
            for _ in 0..3 {
                scope.spawn(|| {
                    let mut value = 0.0;
                    while !done.load(std::sync::atomic::Ordering::Acquire) {
                        value = if value == 0.0 { 90.0 } else { 0.0 };
                        let values: Vec<(&str, f64, f64)> = TEMPS.iter().map(|t| (*t, value, value)).collect();
                        engine.update_values("INST", "HEALTH_STATUS", &values).unwrap();
                        engine.check_limits("INST", "HEALTH_STATUS").unwrap();
                        engine.get_overall_limits_state();
                    }
                });
            }
            scope.spawn(|| {
                for _ in 0..2000 {
                    let _gate = engine.gate.read();
                    let first: Vec<bool> = [0, 2]
                        .iter()
                        .map(|&n| engine.item("INST", "HEALTH_STATUS", TEMPS[n]).unwrap().state.lock().enabled)
                        .collect();
                    assert_eq!(first[0], first[1], "group FIRST half applied");
                    let set = engine.get_limits_set();
                    assert!(set == "DEFAULT" || set == "TVAC");
                }
            });
            for n in 0..500 {
                if n % 2 == 0 {
                    engine.disable_limits_group("FIRST").unwrap();
                    engine.set_limits_set("TVAC").unwrap();
                } else {
                    engine.enable_limits_group("FIRST").unwrap();
                    engine.set_limits_set("DEFAULT").unwrap();
                }
            }
            done.store(true, std::sync::atomic::Ordering::Release);
        });

        assert!(engine.limits_enabled("INST", "HEALTH_STATUS", "TEMP1").unwrap());
        assert!(engine.limits_enabled("INST", "HEALTH_STATUS", "TEMP3").unwrap());
        assert_eq!(engine.get_limits_set(), "DEFAULT");
    }

    #[test]
    fn packets_go_stale_after_the_window() {
        let (engine, hub) = engine();
        inject(&engine, "HEALTH_STATUS", &[("TEMP1", 0.0)]);
        let id = hub.subscribe_limits_events(None).unwrap();

        let later = Instant::now() + engine.staleness_window() + Duration::from_secs(1);
        assert!(engine
            .stale_at(later, false, Some("INST"))
            .unwrap()
            .contains(&("INST".into(), "HEALTH_STATUS".into())));
        assert_eq!(
            engine.item_state_at(later, "INST", "HEALTH_STATUS", "TEMP1").unwrap(),
            Some(LimitState::Stale)
        );

        assert_eq!(engine.sweep_stale_at(later), 1);
        assert_eq!(engine.sweep_stale_at(later), 0);

        // only TEMP1 had ever been classified; the others move from None to STALE
        assert_eq!(hub.limits_events().backlog(id).unwrap(), 4);
        let event = tokio_test::block_on(hub.get_limits_event(id, Duration::ZERO)).unwrap().unwrap();
        assert_eq!(event.old_state, Some(LimitState::Green));
        assert_eq!(event.new_state, LimitState::Stale);
    }

    #[test]
    fn update_values_is_all_or_nothing() {
        let (engine, _) = engine();
        let err = engine
            .update_values("INST", "HEALTH_STATUS", &[("TEMP1", 1.0, 1.0), ("NOPE", 2.0, 2.0)])
            .unwrap_err();
        assert_eq!(err.not_found_kind(), Some(NotFoundKind::Item));
        assert_eq!(engine.item_value("INST", "HEALTH_STATUS", "TEMP1").unwrap(), (None, None));
    }

    #[test]
    fn unknown_active_set_is_rejected() {
        let hub = Arc::new(Hub::new(&HubConfig::default()));
        let config = LimitsConfig {
            active_set: "NOPE".into(),
            ..LimitsConfig::default()
        };
        let result = LimitsEngine::new(&demo_catalog(), hub, &config);
        assert_eq!(result.err().unwrap().not_found_kind(), Some(NotFoundKind::LimitsSet));
    }
}
