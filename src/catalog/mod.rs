//! Read-only catalog of targets, packets and items.
//!
//! The catalog is produced outside the core (normally by the definition
//! parser) and handed to the server at startup. It answers existence
//! lookups with the `NotFound` messages callers expect and carries the
//! per-item limit definitions the limits engine starts from.
//!
//! ```rust
//! use ctsd::catalog::{Catalog, LimitsDefinition};
//!
//! let catalog = Catalog::builder()
//!     .target("INST", |t| {
//!         t.telemetry("HEALTH_STATUS", |p| {
//!             p.item("TEMP1", |i| {
//!                 i.limits("DEFAULT", LimitsDefinition::new(-80.0, -70.0, 60.0, 80.0))
//!             })
//!         })
//!         .command("ABORT", |p| p)
//!     })
//!     .build()
//!     .unwrap();
//!
//! assert!(catalog.item("INST", "HEALTH_STATUS", "TEMP1").is_ok());
//! assert!(catalog.item("INST", "HEALTH_STATUS", "BLAH").is_err());
//! ```

mod builder;

pub use builder::{CatalogBuilder, ItemBuilder, PacketBuilder, TargetBuilder};

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ctsd_types::PacketSnapshot;
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_LIMITS_SET;
use crate::error::{Error, NotFoundKind, Result};

/// Fully qualified reference to a telemetry item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub target: String,
    pub packet: String,
    pub item: String,
}

impl ItemRef {
    pub fn new(target: impl Into<String>, packet: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            packet: packet.into(),
            item: item.into(),
        }
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.target, self.packet, self.item)
    }
}

/// Thresholds of one item under one limit set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimitsDefinition {
    #[serde(default = "default_persistence")]
    pub persistence: u32,
    pub red_low: f64,
    pub yellow_low: f64,
    pub yellow_high: f64,
    pub red_high: f64,
    #[serde(default)]
    pub green_low: Option<f64>,
    #[serde(default)]
    pub green_high: Option<f64>,
}

fn default_persistence() -> u32 {
    crate::config::DEFAULT_PERSISTENCE
}

impl LimitsDefinition {
    /// Thresholds without a green band, persistence 1.
    pub fn new(red_low: f64, yellow_low: f64, yellow_high: f64, red_high: f64) -> Self {
        Self {
            persistence: default_persistence(),
            red_low,
            yellow_low,
            yellow_high,
            red_high,
            green_low: None,
            green_high: None,
        }
    }

    /// Add an inner green band.
    pub fn green(mut self, green_low: f64, green_high: f64) -> Self {
        self.green_low = Some(green_low);
        self.green_high = Some(green_high);
        self
    }

    pub fn persistence(mut self, persistence: u32) -> Self {
        self.persistence = persistence;
        self
    }

    /// Check threshold ordering and persistence.
    ///
    /// Requires `red_low < yellow_low < green_low <= green_high < yellow_high < red_high`,
    /// with the green pair either both present or both absent.
    pub fn validate(&self) -> Result<()> {
        if self.persistence == 0 {
            return Err(Error::invalid("persistence must be at least 1"));
        }
        let values = [self.red_low, self.yellow_low, self.yellow_high, self.red_high];
        if values.iter().chain(self.green_low.iter()).chain(self.green_high.iter()).any(|v| !v.is_finite()) {
            return Err(Error::invalid("limits must be finite numbers"));
        }
        if !(self.red_low < self.yellow_low) {
            return Err(Error::invalid(format!(
                "red_low ({}) must be below yellow_low ({})",
                self.red_low, self.yellow_low
            )));
        }
        if !(self.yellow_high < self.red_high) {
            return Err(Error::invalid(format!(
                "yellow_high ({}) must be below red_high ({})",
                self.yellow_high, self.red_high
            )));
        }
        match (self.green_low, self.green_high) {
            (None, None) => {
                if !(self.yellow_low < self.yellow_high) {
                    return Err(Error::invalid(format!(
                        "yellow_low ({}) must be below yellow_high ({})",
                        self.yellow_low, self.yellow_high
                    )));
                }
            }
            (Some(green_low), Some(green_high)) => {
                if !(self.yellow_low < green_low && green_low <= green_high && green_high < self.yellow_high) {
                    return Err(Error::invalid(format!(
                        "green band {green_low}..{green_high} must lie strictly inside yellow band {}..{}",
                        self.yellow_low, self.yellow_high
                    )));
                }
            }
            _ => {
                return Err(Error::invalid(
                    "green_low and green_high must be given together",
                ))
            }
        }
        Ok(())
    }
}

/// Polynomial read conversion: `c0 + c1*x + c2*x^2 + ...`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversion(pub Vec<f64>);

impl Conversion {
    pub fn apply(&self, raw: f64) -> f64 {
        // Horner's method
        self.0.iter().rev().fold(0.0, |acc, c| acc * raw + c)
    }
}

/// A telemetry item and its limit definitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDef {
    pub name: String,
    #[serde(default)]
    pub conversion: Option<Conversion>,
    /// Initial value of the item's limits-enabled flag.
    #[serde(default = "default_enabled")]
    pub limits_enabled: bool,
    /// Thresholds keyed by limit set name.
    #[serde(default)]
    pub limits: BTreeMap<String, LimitsDefinition>,
}

fn default_enabled() -> bool {
    true
}

impl ItemDef {
    pub fn convert(&self, raw: f64) -> f64 {
        match &self.conversion {
            Some(conversion) => conversion.apply(raw),
            None => raw,
        }
    }
}

/// A command or telemetry packet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketDef {
    #[serde(default)]
    pub target: String,
    pub name: String,
    #[serde(default)]
    pub items: Vec<ItemDef>,
}

impl PacketDef {
    pub fn item(&self, name: &str) -> Option<&ItemDef> {
        self.items.iter().find(|i| i.name == name)
    }
}

/// A target with its command and telemetry packets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetDef {
    pub name: String,
    #[serde(default)]
    pub commands: Vec<Arc<PacketDef>>,
    #[serde(default)]
    pub telemetry: Vec<Arc<PacketDef>>,
    /// Telemetry items display tools skip for this target.
    #[serde(default)]
    pub ignored_items: Vec<String>,
    /// Command parameters display tools skip for this target.
    #[serde(default)]
    pub ignored_parameters: Vec<String>,
}

impl TargetDef {
    pub fn telemetry_packet(&self, name: &str) -> Option<&Arc<PacketDef>> {
        self.telemetry.iter().find(|p| p.name == name)
    }

    pub fn command_packet(&self, name: &str) -> Option<&Arc<PacketDef>> {
        self.commands.iter().find(|p| p.name == name)
    }
}

/// Named batch of items toggled together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsGroupDef {
    pub name: String,
    pub items: Vec<ItemRef>,
}

/// Serialized form of a catalog, as written by external tooling.
#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    targets: Vec<TargetDef>,
    #[serde(default)]
    limits_groups: Vec<LimitsGroupDef>,
}

#[derive(Serialize)]
struct CatalogFileRef<'a> {
    targets: &'a [TargetDef],
    limits_groups: &'a [LimitsGroupDef],
}

/// The target/packet/item registry.
#[derive(Debug, Clone)]
pub struct Catalog {
    targets: Vec<TargetDef>,
    index: HashMap<String, usize>,
    groups: Vec<LimitsGroupDef>,
}

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::new()
    }

    /// Build a catalog, validating limit definitions and group members.
    ///
    /// Targets are kept sorted by name.
    pub fn new(mut targets: Vec<TargetDef>, groups: Vec<LimitsGroupDef>) -> Result<Self> {
        targets.sort_by(|a, b| a.name.cmp(&b.name));

        let mut index = HashMap::with_capacity(targets.len());
        for (i, target) in targets.iter_mut().enumerate() {
            if index.insert(target.name.clone(), i).is_some() {
                return Err(Error::invalid(format!("duplicate target {}", target.name)));
            }
            for packet in target.telemetry.iter_mut().chain(target.commands.iter_mut()) {
                if packet.target != target.name {
                    Arc::make_mut(packet).target = target.name.clone();
                }
                for item in &packet.items {
                    for (set, def) in &item.limits {
                        def.validate().map_err(|e| {
                            Error::invalid(format!(
                                "{} {} {} limits set {set}: {e}",
                                target.name, packet.name, item.name
                            ))
                        })?;
                    }
                }
            }
        }

        let catalog = Self {
            targets,
            index,
            groups,
        };
        for group in &catalog.groups {
            for item in &group.items {
                catalog.item(&item.target, &item.packet, &item.item)?;
            }
        }
        Ok(catalog)
    }

    /// Parse a catalog from its JSON form.
    pub fn from_json(content: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(content)?;
        Self::new(file.targets, file.limits_groups)
    }

    /// Serialize back to the JSON form [`Catalog::from_json`] reads.
    pub fn to_json(&self) -> Result<String> {
        let file = CatalogFileRef {
            targets: &self.targets,
            limits_groups: &self.groups,
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn targets(&self) -> &[TargetDef] {
        &self.targets
    }

    pub fn target_names(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.name.clone()).collect()
    }

    pub fn target(&self, name: &str) -> Option<&TargetDef> {
        self.index.get(name).map(|&i| &self.targets[i])
    }

    pub fn telemetry_target(&self, target: &str) -> Result<&TargetDef> {
        self.target(target)
            .ok_or_else(|| Error::not_found(NotFoundKind::TelemetryTarget, target))
    }

    pub fn telemetry_packet(&self, target: &str, packet: &str) -> Result<&Arc<PacketDef>> {
        self.telemetry_target(target)?
            .telemetry_packet(packet)
            .ok_or_else(|| Error::not_found(NotFoundKind::TelemetryPacket, format!("{target} {packet}")))
    }

    pub fn command_packet(&self, target: &str, packet: &str) -> Result<&Arc<PacketDef>> {
        self.target(target)
            .ok_or_else(|| Error::not_found(NotFoundKind::CommandTarget, target))?
            .command_packet(packet)
            .ok_or_else(|| Error::not_found(NotFoundKind::CommandPacket, format!("{target} {packet}")))
    }

    pub fn item(&self, target: &str, packet: &str, item: &str) -> Result<&ItemDef> {
        self.telemetry_packet(target, packet)?
            .item(item)
            .ok_or_else(|| Error::not_found(NotFoundKind::Item, format!("{target} {packet} {item}")))
    }

    pub fn limits_groups(&self) -> &[LimitsGroupDef] {
        &self.groups
    }

    /// Limit set names: `DEFAULT` first, then in order of first appearance
    /// walking targets by name and packets and items in definition order.
    /// Sets new to the same item appear alphabetically.
    pub fn limits_sets(&self) -> Vec<String> {
        let mut sets = vec![DEFAULT_LIMITS_SET.to_string()];
        for target in &self.targets {
            for packet in &target.telemetry {
                for item in &packet.items {
                    for set in item.limits.keys() {
                        if !sets.contains(set) {
                            sets.push(set.clone());
                        }
                    }
                }
            }
        }
        sets
    }
}

/// A packet rebuilt from a hub snapshot and its catalog definition.
#[derive(Debug, Clone)]
pub struct ReceivedPacket {
    pub definition: Arc<PacketDef>,
    pub buffer: Vec<u8>,
    pub received_time: SystemTime,
    pub received_count: u64,
    pub flags: u32,
}

impl ReceivedPacket {
    pub fn from_snapshot(catalog: &Catalog, snapshot: PacketSnapshot) -> Result<Self> {
        let definition = catalog
            .telemetry_packet(&snapshot.target, &snapshot.packet)
            .or_else(|_| catalog.command_packet(&snapshot.target, &snapshot.packet))?
            .clone();
        Ok(Self {
            definition,
            buffer: snapshot.buffer,
            received_time: UNIX_EPOCH + Duration::from_millis(snapshot.received_time_ms),
            received_count: snapshot.received_count,
            flags: snapshot.flags,
        })
    }

    pub fn target_name(&self) -> &str {
        &self.definition.target
    }

    pub fn packet_name(&self) -> &str {
        &self.definition.name
    }
}
