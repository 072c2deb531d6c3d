// virtchan - Virtual time-series channels
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Battery simulation block
//!
//! Integrates the net power of a `charge` and a `discharge` input into a
//! charge level bounded by `[minlevel, maxlevel] × capacity`. When a step
//! would cross a bound, only the part of the step that fits is applied and
//! the emitted power is scaled by the same fraction.
//!
//! Efficiency losses apply to the charging leg: charging with power `P` for
//! `Δt` stores `η·P·Δt`, discharging removes exactly what is drawn.

use super::Parameters;
use crate::config::Query;
use crate::coordinator::Coordinator;
use crate::error::{EngineError, Result};
use crate::stats::{ChannelStats, Output};
use crate::stream::SampleSource;
use crate::tuple::{period_consumption, Tuple};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Input name of the charging power
pub const CHARGE: &str = "charge";
/// Input name of the discharging power
pub const DISCHARGE: &str = "discharge";

/// Output view of a battery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatteryView {
    /// Power flowing into the battery (W), 0 while discharging
    Charge,
    /// Power drawn from the battery (W), 0 while charging
    Discharge,
    /// Signed net power (W)
    Net,
    /// Charge level (Wh)
    Level,
}

impl BatteryView {
    pub const ALL: [BatteryView; 4] = [
        BatteryView::Charge,
        BatteryView::Discharge,
        BatteryView::Net,
        BatteryView::Level,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BatteryView::Charge => "charge",
            BatteryView::Discharge => "discharge",
            BatteryView::Net => "net",
            BatteryView::Level => "level",
        }
    }
}

impl fmt::Display for BatteryView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatteryView {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        BatteryView::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| EngineError::UnknownOutput {
                block: "battery".to_string(),
                output: s.to_string(),
            })
    }
}

/// Battery configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Battery {
    /// Block name
    pub name: String,
    /// Channel feeding the `charge` input
    pub charge: String,
    /// Channel feeding the `discharge` input
    pub discharge: String,
    /// Capacity in kWh
    pub capacity: f64,
    /// Lower bound as fraction of capacity
    pub min_level: f64,
    /// Upper bound as fraction of capacity
    pub max_level: f64,
    /// Cap on charging power (W)
    pub max_charge: Option<f64>,
    /// Cap on discharging power (W)
    pub max_discharge: Option<f64>,
    /// Charging efficiency in `(0, 1]`
    pub efficiency: f64,
}

impl Battery {
    /// Battery with default bounds and no power caps
    pub fn new(
        name: impl Into<String>,
        charge: impl Into<String>,
        discharge: impl Into<String>,
        capacity: f64,
    ) -> Self {
        Self {
            name: name.into(),
            charge: charge.into(),
            discharge: discharge.into(),
            capacity,
            min_level: 0.0,
            max_level: 1.0,
            max_charge: None,
            max_discharge: None,
            efficiency: 1.0,
        }
    }

    /// Build from block parameters
    ///
    /// Required: `charge`, `discharge`, `capacity`. Optional: `minlevel`,
    /// `maxlevel`, `maxcharge`, `maxdischarge`, `efficiency`.
    pub fn from_parameters(params: &Parameters) -> Result<Self> {
        params.require(&[CHARGE, DISCHARGE, "capacity"])?;

        let battery = Self {
            name: params.block().to_string(),
            charge: params.string(CHARGE)?.to_string(),
            discharge: params.string(DISCHARGE)?.to_string(),
            capacity: params.number("capacity")?,
            min_level: params.number_or("minlevel", 0.0)?,
            max_level: params.number_or("maxlevel", 1.0)?,
            max_charge: params.optional_number("maxcharge")?,
            max_discharge: params.optional_number("maxdischarge")?,
            efficiency: params.number_or("efficiency", 1.0)?,
        };
        battery.validate()?;
        Ok(battery)
    }

    /// Check parameter ranges
    pub fn validate(&self) -> Result<()> {
        let invalid = |parameter: &str, reason: &str| {
            Err(EngineError::invalid(&self.name, parameter, reason))
        };

        if !(self.capacity > 0.0) {
            return invalid("capacity", "must be positive");
        }
        if !(0.0..=1.0).contains(&self.min_level) {
            return invalid("minlevel", "must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.max_level) || self.max_level < self.min_level {
            return invalid("maxlevel", "must be within [minlevel, 1]");
        }
        if !(self.efficiency > 0.0 && self.efficiency <= 1.0) {
            return invalid("efficiency", "must be within (0, 1]");
        }
        if self.max_charge.map_or(false, |c| c < 0.0) {
            return invalid("maxcharge", "must not be negative");
        }
        if self.max_discharge.map_or(false, |c| c < 0.0) {
            return invalid("maxdischarge", "must not be negative");
        }
        Ok(())
    }

    /// Capacity in Wh
    pub fn capacity_wh(&self) -> f64 {
        self.capacity * 1e3
    }

    /// Lower charge bound in Wh
    pub fn min_charge_level(&self) -> f64 {
        self.min_level * self.capacity_wh()
    }

    /// Upper charge bound in Wh
    pub fn max_charge_level(&self) -> f64 {
        self.max_level * self.capacity_wh()
    }

    /// Run an independent simulation for `view`
    ///
    /// Opens fresh input streams and a fresh coordinator, so simulations of
    /// different views never share state.
    pub fn simulate(
        &self,
        view: BatteryView,
        source: &dyn SampleSource,
        query: &Query,
    ) -> Result<BatterySimulation> {
        let mut coordinator = Coordinator::new(query.group_by);
        coordinator.register_channel(CHARGE, source, &self.charge, query)?;
        coordinator.register_channel(DISCHARGE, source, &self.discharge, query)?;
        BatterySimulation::new(self.clone(), view, coordinator)
    }
}

/// Result of one simulation step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryStep {
    /// Net power actually flowing (W)
    pub net_value: f64,
    /// Energy drawn from or offered to the battery over the step (Wh)
    pub net_charge: f64,
    /// Charge level after the step (Wh)
    pub level: f64,
}

impl BatteryStep {
    /// Value emitted for `view`
    pub fn value(&self, view: BatteryView) -> f64 {
        match view {
            BatteryView::Charge if self.net_charge > 0.0 => self.net_value,
            BatteryView::Discharge if self.net_charge < 0.0 => -self.net_value,
            BatteryView::Charge | BatteryView::Discharge => 0.0,
            BatteryView::Net => self.net_value,
            BatteryView::Level => self.level,
        }
    }
}

/// Charge level state machine
#[derive(Debug, Clone)]
pub struct BatteryState {
    battery: Battery,
    level: f64,
}

impl BatteryState {
    /// Empty battery
    pub fn new(battery: Battery) -> Self {
        Self { battery, level: 0.0 }
    }

    /// Current charge level (Wh)
    pub fn level(&self) -> f64 {
        self.level
    }

    /// Advance by `period_ms` with the given input powers
    pub fn step(&mut self, charge: f64, discharge: f64, period_ms: i64) -> BatteryStep {
        let charge = self.battery.max_charge.map_or(charge, |cap| charge.min(cap));
        let discharge = self
            .battery
            .max_discharge
            .map_or(discharge, |cap| discharge.min(cap));

        let mut net_value = charge - discharge;
        let mut net_charge = period_consumption(net_value, period_ms);

        if net_charge != 0.0 {
            let stored = if net_charge > 0.0 {
                net_charge * self.battery.efficiency
            } else {
                net_charge
            };
            let target = self.level + stored;
            let min = self.battery.min_charge_level();
            let max = self.battery.max_charge_level();

            let effective = if net_charge > 0.0 {
                max.min(target)
            } else if self.level > min {
                min.max(target)
            } else {
                self.level
            };

            // partial step at a bound
            if target != effective {
                let fraction = (effective - self.level) / stored;
                net_charge *= fraction;
                net_value *= fraction;
            }
            self.level = effective;
        }

        BatteryStep {
            net_value,
            net_charge,
            level: self.level,
        }
    }
}

/// One battery output view over coordinated inputs
pub struct BatterySimulation {
    view: BatteryView,
    state: BatteryState,
    coordinator: Coordinator,
    stats: ChannelStats,
    last_ts: Option<i64>,
    done: bool,
}

impl BatterySimulation {
    /// Simulate over a coordinator with `charge` and `discharge` inputs
    pub fn new(battery: Battery, view: BatteryView, coordinator: Coordinator) -> Result<Self> {
        for input in [CHARGE, DISCHARGE] {
            if coordinator.cursor(input).is_none() {
                return Err(EngineError::UnknownInput(input.to_string()));
            }
        }
        battery.validate()?;

        Ok(Self {
            view,
            state: BatteryState::new(battery),
            coordinator,
            stats: ChannelStats::new(),
            last_ts: None,
            done: false,
        })
    }

    pub fn view(&self) -> BatteryView {
        self.view
    }

    /// Current charge level (Wh)
    pub fn level(&self) -> f64 {
        self.state.level()
    }

    fn step(&mut self) -> Result<Option<Tuple>> {
        let Some(t) = self.coordinator.next_instant() else {
            return Ok(None);
        };

        let charge = self.coordinator.value_at(CHARGE, t)?;
        let discharge = self.coordinator.value_at(DISCHARGE, t)?;

        let prev = match self.last_ts {
            Some(prev) => prev,
            None => {
                let from = self.coordinator.earliest_from()?.min(t);
                self.stats.seed(from);
                from
            }
        };
        let period = t - prev;

        let step = self.state.step(charge, discharge, period);
        let tuple = Tuple::new(t, step.value(self.view));

        self.stats
            .add_consumption(period_consumption(tuple.value, period));
        self.stats.record(&tuple);
        self.last_ts = Some(t);
        Ok(Some(tuple))
    }
}

impl Iterator for BatterySimulation {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Result<Tuple>> {
        if self.done {
            return None;
        }

        match self.step() {
            Ok(Some(tuple)) => Some(Ok(tuple)),
            Ok(None) => {
                self.done = true;
                log::debug!(
                    "battery {} finished: {} rows, level {:.3} Wh",
                    self.view,
                    self.stats.row_count,
                    self.state.level()
                );
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl Output for BatterySimulation {
    fn stats(&self) -> &ChannelStats {
        &self.stats
    }
}
