//! Per-packet received counters.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use ctsd_types::PacketCount;

use crate::catalog::Catalog;

pub(crate) const UNKNOWN: &str = "UNKNOWN";

/// Counters for one packet namespace (commands or telemetry).
///
/// The key set is fixed from the catalog at construction, so increments
/// only touch atomics.
#[derive(Debug, Default)]
pub(crate) struct PacketCounters {
    packets: BTreeMap<String, BTreeMap<String, AtomicU64>>,
    unknown: AtomicU64,
}

impl PacketCounters {
    pub fn telemetry(catalog: &Catalog) -> Self {
        Self::from_names(
            catalog
                .targets()
                .iter()
                .map(|t| (t.name.as_str(), t.telemetry.iter().map(|p| p.name.as_str()))),
        )
    }

    pub fn commands(catalog: &Catalog) -> Self {
        Self::from_names(
            catalog
                .targets()
                .iter()
                .map(|t| (t.name.as_str(), t.commands.iter().map(|p| p.name.as_str()))),
        )
    }

    fn from_names<'a, P>(targets: impl Iterator<Item = (&'a str, P)>) -> Self
    where
        P: Iterator<Item = &'a str>,
    {
        let packets = targets
            .map(|(target, packets)| {
                (
                    target.to_string(),
                    packets.map(|p| (p.to_string(), AtomicU64::new(0))).collect(),
                )
            })
            .collect();
        Self {
            packets,
            unknown: AtomicU64::new(0),
        }
    }

    /// Increment and return the new count, or `None` for an unknown packet.
    pub fn increment(&self, target: &str, packet: &str) -> Option<u64> {
        self.packets
            .get(target)
            .and_then(|packets| packets.get(packet))
            .map(|count| count.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn increment_unknown(&self) -> u64 {
        self.unknown.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self, target: &str, packet: &str) -> Option<u64> {
        self.packets
            .get(target)
            .and_then(|packets| packets.get(packet))
            .map(|count| count.load(Ordering::Relaxed))
    }

    /// Sum over every packet of a target.
    pub fn target_total(&self, target: &str) -> u64 {
        self.packets
            .get(target)
            .map(|packets| packets.values().map(|c| c.load(Ordering::Relaxed)).sum())
            .unwrap_or(0)
    }

    /// One row per packet, then the `UNKNOWN UNKNOWN` row.
    pub fn rows(&self) -> Vec<PacketCount> {
        let mut rows: Vec<PacketCount> = self
            .packets
            .iter()
            .flat_map(|(target, packets)| {
                packets.iter().map(move |(packet, count)| PacketCount {
                    target: target.clone(),
                    packet: packet.clone(),
                    count: count.load(Ordering::Relaxed),
                })
            })
            .collect();
        rows.push(PacketCount {
            target: UNKNOWN.to_string(),
            packet: UNKNOWN.to_string(),
            count: self.unknown.load(Ordering::Relaxed),
        });
        rows
    }
}
