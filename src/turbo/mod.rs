//! Turbo module - transfer-speed negotiation and link keepalive
//!
//! TurboMIDI elevates the byte rate by a negotiated multiplier. Two
//! strategies are tried in order: the vendor speed-index protocol
//! (query/set/confirm) and the generic capability negotiation
//! (supported/certified bitmasks plus an acknowledgement sent at the
//! original 1x speed). While elevated, an Active Sensing heartbeat
//! keeps the link from falling back.

mod keepalive;
mod negotiator;

pub use keepalive::*;
pub use negotiator::*;

use std::time::Duration;

use thiserror::Error;

use crate::transport::TransportError;

/// Speed multiplier per index; index 0 is unused padding so that the
/// table reads naturally (index 1 = 1x ... index 11 = 20x).
pub const SPEED_FACTORS: [f32; 12] = [
    1.0, 1.0, 2.0, 3.33, 4.0, 5.0, 6.66, 8.0, 10.0, 13.33, 16.66, 20.0,
];

/// Highest defined speed index.
pub const MAX_SPEED_INDEX: u8 = 11;

/// Factor for a speed index; out-of-table indices read as 1x.
pub fn factor_for(index: u8) -> f32 {
    SPEED_FACTORS
        .get(usize::from(index))
        .copied()
        .unwrap_or(1.0)
}

/// Highest index whose factor does not exceed `factor` (at least 1).
pub fn index_for_factor(factor: f32) -> u8 {
    let mut best = 1u8;
    for (i, &f) in SPEED_FACTORS.iter().enumerate().skip(1) {
        if f <= factor {
            best = i as u8;
        }
    }
    best
}

/// Highest set index in a capability bitmask (bit `i - 1` = index `i`)
/// not exceeding `max`.
pub fn best_index_in_mask(mask: u16, max: u8) -> Option<u8> {
    (2..=max.min(MAX_SPEED_INDEX))
        .rev()
        .find(|&i| mask & (1 << (i - 1)) != 0)
}

/// Turbo errors
#[derive(Error, Debug)]
pub enum TurboError {
    #[error("Speed negotiation failed, link stays at 1x")]
    NegotiationFailed,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Inbound turbo frame stream closed")]
    StreamClosed,
}

/// Negotiation and keepalive knobs.
#[derive(Debug, Clone)]
pub struct TurboConfig {
    /// Per-exchange reply timeout; negotiation is short or not at all.
    pub negotiation_timeout: Duration,
    /// Heartbeat period while the link is elevated.
    pub keepalive_interval: Duration,
    /// Device-model maximum speed index.
    pub max_speed_index: u8,
}

impl Default for TurboConfig {
    fn default() -> Self {
        Self {
            negotiation_timeout: Duration::from_millis(1000),
            keepalive_interval: Duration::from_millis(300),
            max_speed_index: MAX_SPEED_INDEX,
        }
    }
}

/// The negotiated link state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurboStatus {
    pub index: u8,
    pub factor: f32,
}

impl TurboStatus {
    pub fn standard() -> Self {
        Self {
            index: 1,
            factor: 1.0,
        }
    }

    pub fn elevated(&self) -> bool {
        self.factor > 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factor_table_spot_values() {
        assert_eq!(factor_for(1), 1.0);
        assert_eq!(factor_for(7), 8.0);
        assert_eq!(factor_for(11), 20.0);
        assert_eq!(factor_for(0), 1.0);
        assert_eq!(factor_for(200), 1.0);
    }

    #[test]
    fn test_index_for_factor_rounds_down() {
        assert_eq!(index_for_factor(1.0), 1);
        assert_eq!(index_for_factor(8.0), 7);
        assert_eq!(index_for_factor(9.0), 7);
        assert_eq!(index_for_factor(20.0), 11);
        assert_eq!(index_for_factor(0.5), 1);
        assert_eq!(index_for_factor(100.0), 11);
    }

    #[test]
    fn test_best_index_in_mask() {
        // Indices 2, 4 and 7 advertised.
        let mask = (1 << 1) | (1 << 3) | (1 << 6);
        assert_eq!(best_index_in_mask(mask, 11), Some(7));
        assert_eq!(best_index_in_mask(mask, 6), Some(4));
        assert_eq!(best_index_in_mask(mask, 2), Some(2));
        assert_eq!(best_index_in_mask(0, 11), None);
    }
}
