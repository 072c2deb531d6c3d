// virtchan - Virtual time-series channels
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sample tuples and energy helpers

use serde::{Deserialize, Serialize};

/// Milliseconds per hour, the divisor turning W·ms into Wh.
pub const MS_PER_HOUR: f64 = 3.6e6;

/// A `(timestamp, value, weight)` sample
///
/// Weight counts how many raw rows an aggregated tuple stands for
/// (1 for unaggregated samples).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    /// Timestamp in milliseconds
    pub timestamp: i64,
    /// The measured or derived value
    pub value: f64,
    /// Number of raw rows represented
    pub weight: u32,
}

impl Tuple {
    /// Create an unaggregated tuple (weight 1)
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self {
            timestamp,
            value,
            weight: 1,
        }
    }

    /// Create a tuple with an explicit weight
    pub fn weighted(timestamp: i64, value: f64, weight: u32) -> Self {
        Self {
            timestamp,
            value,
            weight,
        }
    }
}

impl From<(i64, f64)> for Tuple {
    fn from((timestamp, value): (i64, f64)) -> Self {
        Tuple::new(timestamp, value)
    }
}

impl From<(i64, f64, u32)> for Tuple {
    fn from((timestamp, value, weight): (i64, f64, u32)) -> Self {
        Tuple::weighted(timestamp, value, weight)
    }
}

/// Energy of `power` held for `period_ms`, in Wh-equivalent units.
pub fn period_consumption(power: f64, period_ms: i64) -> f64 {
    power * period_ms as f64 / MS_PER_HOUR
}
