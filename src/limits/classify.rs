//! Threshold classification.

use ctsd_types::LimitState;

use crate::catalog::LimitsDefinition;

/// Classify a converted value against a threshold definition.
///
/// Red bands are checked before yellow, yellow before green. Without a
/// green band every in-limits value is `Green`. NaN is not classified.
pub fn classify(definition: &LimitsDefinition, value: f64) -> Option<LimitState> {
    if value.is_nan() {
        return None;
    }

    let state = if value < definition.red_low {
        LimitState::RedLow
    } else if value > definition.red_high {
        LimitState::RedHigh
    } else if value < definition.yellow_low {
        LimitState::YellowLow
    } else if value > definition.yellow_high {
        LimitState::YellowHigh
    } else {
        match (definition.green_low, definition.green_high) {
            (Some(low), _) if value < low => LimitState::GreenLow,
            (_, Some(high)) if value > high => LimitState::GreenHigh,
            _ => LimitState::Green,
        }
    };
    Some(state)
}
