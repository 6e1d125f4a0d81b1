//! Closure-style builders for assembling a [`Catalog`] in code.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Catalog, Conversion, ItemDef, ItemRef, LimitsDefinition, LimitsGroupDef, PacketDef, TargetDef};
use crate::error::Result;

/// Builder for [`Catalog`].
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    targets: Vec<TargetDef>,
    groups: Vec<LimitsGroupDef>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a target, configured by `f`.
    pub fn target(mut self, name: impl Into<String>, f: impl FnOnce(TargetBuilder) -> TargetBuilder) -> Self {
        let builder = f(TargetBuilder::new(name.into()));
        self.targets.push(builder.build());
        self
    }

    /// Add a limits group from `(target, packet, item)` triples.
    pub fn limits_group<I, S>(mut self, name: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = (S, S, S)>,
        S: Into<String>,
    {
        self.groups.push(LimitsGroupDef {
            name: name.into(),
            items: items
                .into_iter()
                .map(|(t, p, i)| ItemRef::new(t, p, i))
                .collect(),
        });
        self
    }

    pub fn build(self) -> Result<Catalog> {
        Catalog::new(self.targets, self.groups)
    }
}

/// Builder for one target's packets.
#[derive(Debug)]
pub struct TargetBuilder {
    name: String,
    commands: Vec<Arc<PacketDef>>,
    telemetry: Vec<Arc<PacketDef>>,
    ignored_items: Vec<String>,
    ignored_parameters: Vec<String>,
}

impl TargetBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            commands: Vec::new(),
            telemetry: Vec::new(),
            ignored_items: Vec::new(),
            ignored_parameters: Vec::new(),
        }
    }

    pub fn ignore_item(mut self, name: impl Into<String>) -> Self {
        self.ignored_items.push(name.into());
        self
    }

    pub fn ignore_parameter(mut self, name: impl Into<String>) -> Self {
        self.ignored_parameters.push(name.into());
        self
    }

    pub fn telemetry(mut self, name: impl Into<String>, f: impl FnOnce(PacketBuilder) -> PacketBuilder) -> Self {
        let packet = f(PacketBuilder::new(&self.name, name.into())).build();
        self.telemetry.push(Arc::new(packet));
        self
    }

    pub fn command(mut self, name: impl Into<String>, f: impl FnOnce(PacketBuilder) -> PacketBuilder) -> Self {
        let packet = f(PacketBuilder::new(&self.name, name.into())).build();
        self.commands.push(Arc::new(packet));
        self
    }

    fn build(self) -> TargetDef {
        TargetDef {
            name: self.name,
            commands: self.commands,
            telemetry: self.telemetry,
            ignored_items: self.ignored_items,
            ignored_parameters: self.ignored_parameters,
        }
    }
}

/// Builder for one packet's items.
#[derive(Debug)]
pub struct PacketBuilder {
    target: String,
    name: String,
    items: Vec<ItemDef>,
}

impl PacketBuilder {
    fn new(target: &str, name: String) -> Self {
        Self {
            target: target.to_string(),
            name,
            items: Vec::new(),
        }
    }

    pub fn item(mut self, name: impl Into<String>, f: impl FnOnce(ItemBuilder) -> ItemBuilder) -> Self {
        let item = f(ItemBuilder::new(name.into())).build();
        self.items.push(item);
        self
    }

    fn build(self) -> PacketDef {
        PacketDef {
            target: self.target,
            name: self.name,
            items: self.items,
        }
    }
}

/// Builder for one item.
#[derive(Debug)]
pub struct ItemBuilder {
    name: String,
    conversion: Option<Conversion>,
    limits_enabled: bool,
    limits: BTreeMap<String, LimitsDefinition>,
}

impl ItemBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            conversion: None,
            limits_enabled: true,
            limits: BTreeMap::new(),
        }
    }

    /// Polynomial coefficients, lowest order first.
    pub fn conversion(mut self, coefficients: impl Into<Vec<f64>>) -> Self {
        self.conversion = Some(Conversion(coefficients.into()));
        self
    }

    /// Thresholds under the named limit set.
    pub fn limits(mut self, set: impl Into<String>, definition: LimitsDefinition) -> Self {
        self.limits.insert(set.into(), definition);
        self
    }

    /// Start with limit checking turned off for this item.
    pub fn limits_disabled(mut self) -> Self {
        self.limits_enabled = false;
        self
    }

    fn build(self) -> ItemDef {
        ItemDef {
            name: self.name,
            conversion: self.conversion,
            limits_enabled: self.limits_enabled,
            limits: self.limits,
        }
    }
}
