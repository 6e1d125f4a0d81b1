//! Limit states and the records describing item thresholds.

use core::fmt;

/// Limits state of a single telemetry item.
///
/// The seven banded states are produced by classification. `Stale` marks an
/// item whose packet has not been checked within the staleness window, and
/// `Disabled` an item that is not being monitored under the active limit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum LimitState {
    RedLow,
    YellowLow,
    GreenLow,
    Green,
    GreenHigh,
    YellowHigh,
    RedHigh,
    Stale,
    Disabled,
}

impl LimitState {
    /// Upper-case name used in messages and exports.
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitState::RedLow => "RED_LOW",
            LimitState::YellowLow => "YELLOW_LOW",
            LimitState::GreenLow => "GREEN_LOW",
            LimitState::Green => "GREEN",
            LimitState::GreenHigh => "GREEN_HIGH",
            LimitState::YellowHigh => "YELLOW_HIGH",
            LimitState::RedHigh => "RED_HIGH",
            LimitState::Stale => "STALE",
            LimitState::Disabled => "DISABLED",
        }
    }

    pub fn is_red(&self) -> bool {
        matches!(self, LimitState::RedLow | LimitState::RedHigh)
    }

    pub fn is_yellow(&self) -> bool {
        matches!(self, LimitState::YellowLow | LimitState::YellowHigh)
    }

    /// True for any red or yellow state.
    pub fn is_out_of_limits(&self) -> bool {
        self.is_red() || self.is_yellow()
    }

    /// Severity bucket used for overall-state aggregation.
    ///
    /// Returns `None` for `Stale` and `Disabled`, which never contribute.
    pub fn severity(&self) -> Option<OverallState> {
        match self {
            LimitState::RedLow | LimitState::RedHigh => Some(OverallState::Red),
            LimitState::YellowLow | LimitState::YellowHigh => Some(OverallState::Yellow),
            LimitState::GreenLow | LimitState::Green | LimitState::GreenHigh => {
                Some(OverallState::Green)
            }
            LimitState::Stale | LimitState::Disabled => None,
        }
    }
}

impl fmt::Display for LimitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate limits state across every monitored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum OverallState {
    #[default]
    Green,
    Yellow,
    Red,
}

impl OverallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallState::Green => "GREEN",
            OverallState::Yellow => "YELLOW",
            OverallState::Red => "RED",
        }
    }
}

impl fmt::Display for OverallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Threshold definition of one item under one limit set, as reported by
/// `get_limits` and returned by `set_limits`.
///
/// `enabled` is the item's limits flag, which is shared by every set.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LimitsSettings {
    pub set: String,
    pub persistence: u32,
    pub enabled: bool,
    pub red_low: f64,
    pub yellow_low: f64,
    pub yellow_high: f64,
    pub red_high: f64,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub green_low: Option<f64>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub green_high: Option<f64>,
}

/// An item currently in a red or yellow state.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutOfLimitsItem {
    pub target: String,
    pub packet: String,
    pub item: String,
    pub state: LimitState,
}
