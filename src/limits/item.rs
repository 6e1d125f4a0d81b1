//! Per-item limits state and persistence.

use std::collections::BTreeMap;

use ctsd_types::LimitState;

use super::classify::classify;
use crate::catalog::{ItemDef, ItemRef, LimitsDefinition};

/// A change of effective state produced by a sample.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Transition {
    pub old: Option<LimitState>,
    pub new: LimitState,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct ItemState {
    pub raw: Option<f64>,
    pub value: Option<f64>,
    pub enabled: bool,
    pub definitions: BTreeMap<String, LimitsDefinition>,
    /// `None` until the first classification under persistence takes effect.
    pub effective: Option<LimitState>,
    pending: Option<LimitState>,
    pending_count: u32,
}

impl ItemState {
    pub fn new(def: &ItemDef) -> Self {
        Self {
            raw: None,
            value: None,
            enabled: def.limits_enabled,
            definitions: def.limits.clone(),
            effective: None,
            pending: None,
            pending_count: 0,
        }
    }

    pub fn is_monitored(&self, set: &str) -> bool {
        self.enabled && self.definitions.contains_key(set)
    }

    /// Classify the current value under `set` and apply persistence.
    pub fn evaluate(&mut self, set: &str) -> Option<Transition> {
        if !self.enabled {
            return None;
        }
        let definition = self.definitions.get(set)?;
        let value = self.value?;
        let candidate = classify(definition, value)?;

        if Some(candidate) == self.effective {
            self.reset_pending();
            return None;
        }
        if self.pending == Some(candidate) {
            self.pending_count += 1;
        } else {
            self.pending = Some(candidate);
            self.pending_count = 1;
        }
        if self.pending_count < definition.persistence {
            return None;
        }

        let old = self.effective.replace(candidate);
        self.reset_pending();
        Some(Transition {
            old,
            new: candidate,
            value,
        })
    }

    /// Force the effective state to `STALE`.
    pub fn mark_stale(&mut self, set: &str) -> Option<Transition> {
        if !self.is_monitored(set) || self.effective == Some(LimitState::Stale) {
            return None;
        }
        let old = self.effective.replace(LimitState::Stale);
        self.reset_pending();
        Some(Transition {
            old,
            new: LimitState::Stale,
            value: self.value.unwrap_or(f64::NAN),
        })
    }

    pub fn reset_pending(&mut self) {
        self.pending = None;
        self.pending_count = 0;
    }
}

/// An item's identity plus its guarded state.
pub(crate) struct ItemLimits {
    pub id: ItemRef,
    pub state: parking_lot::Mutex<ItemState>,
}
