// virtchan-testdata - Household scenarios
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Household energy scenarios.
//!
//! Each scenario produces a photovoltaic feed-in channel `pv`, a household
//! load channel `load` and a cumulative grid meter `meter`, sampled at
//! different, jittered rates so their timestamps rarely coincide.

use crate::generator::{generate_series, GeneratorConfig, SeriesConfig};
use crate::patterns::Pattern;
use serde::{Deserialize, Serialize};
use virtchan::{ChannelClass, MemorySource};

/// Channel names used by every scenario.
pub const PV: &str = "pv";
pub const LOAD: &str = "load";
pub const METER: &str = "meter";

/// Weather and season of a generated day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HouseholdScenario {
    /// Clear summer day, large midday surplus.
    SunnyDay,
    /// Overcast day with noisy, reduced generation.
    CloudyDay,
    /// Short winter day, generation never covers the load.
    WinterDay,
}

impl HouseholdScenario {
    pub const ALL: [HouseholdScenario; 3] = [
        HouseholdScenario::SunnyDay,
        HouseholdScenario::CloudyDay,
        HouseholdScenario::WinterDay,
    ];

    fn pv_peak(&self) -> f64 {
        match self {
            HouseholdScenario::SunnyDay => 6000.0,
            HouseholdScenario::CloudyDay => 2500.0,
            HouseholdScenario::WinterDay => 800.0,
        }
    }

    fn pv_noise(&self) -> f64 {
        match self {
            HouseholdScenario::CloudyDay => 400.0,
            _ => 50.0,
        }
    }

    /// Series definitions of the scenario.
    pub fn series(&self) -> Vec<SeriesConfig> {
        vec![
            SeriesConfig::new(PV, Pattern::solar(self.pv_peak()))
                .with_noise(self.pv_noise())
                .with_range(0.0, self.pv_peak()),
            SeriesConfig::new(LOAD, Pattern::household(250.0, 2500.0))
                .with_noise(80.0)
                .with_range(50.0, 10_000.0),
            SeriesConfig::new(METER, Pattern::household(250.0, 2500.0))
                .with_range(0.0, 10_000.0)
                .cumulative(),
        ]
    }
}

/// Generated household day.
#[derive(Debug, Clone)]
pub struct Household {
    pub scenario: HouseholdScenario,
    /// Start of the day (ms).
    pub start: i64,
    /// End of the day (ms).
    pub end: i64,
}

impl Household {
    /// One day starting at the default generator start.
    pub fn new(scenario: HouseholdScenario) -> Self {
        let start = GeneratorConfig::default().start_time_ms;
        Self {
            scenario,
            start,
            end: start + 24 * 3_600_000,
        }
    }

    /// Generate the day into a source.
    ///
    /// `pv` is sampled every 60 s, `load` every 45 s, `meter` every 15 min.
    pub fn source(&self, seed: u64) -> MemorySource {
        let rates = [(PV, 60_000, 20_000), (LOAD, 45_000, 10_000), (METER, 900_000, 0)];
        let mut source = MemorySource::new();

        for series in self.scenario.series() {
            let (interval, jitter) = rates
                .iter()
                .find(|(name, _, _)| *name == series.channel)
                .map(|(_, interval, jitter)| (*interval, *jitter))
                .unwrap_or((60_000, 0));
            let config = GeneratorConfig::new()
                .with_start_time(self.start)
                .with_sample_interval_ms(interval)
                .with_jitter_ms(jitter)
                .with_num_samples(((self.end - self.start) / interval) as usize + 1)
                .with_seed(seed);
            source.insert(series.channel.clone(), series.class, generate_series(&config, &series));
        }

        source
    }
}

/// Class the scenarios use for `channel`.
pub fn expected_class(channel: &str) -> ChannelClass {
    if channel == METER {
        ChannelClass::Cumulative
    } else {
        ChannelClass::Instantaneous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use virtchan::SampleSource;

    #[test]
    fn test_household_channels() {
        let source = Household::new(HouseholdScenario::SunnyDay).source(42);
        assert_eq!(source.len(), 3);
        assert_eq!(source.sample_count(PV), Some(24 * 60 + 1));
        assert_eq!(source.sample_count(METER), Some(24 * 4 + 1));
        for channel in [PV, LOAD, METER] {
            assert_eq!(source.channel_class(channel).unwrap(), expected_class(channel));
        }
    }

    #[test]
    fn test_winter_generation_below_load_peak() {
        let series = HouseholdScenario::WinterDay.series();
        assert_eq!(series[0].max, 800.0);
    }

    #[test]
    fn test_same_seed_same_day() {
        let a = Household::new(HouseholdScenario::CloudyDay).source(7);
        let b = Household::new(HouseholdScenario::CloudyDay).source(7);
        assert_eq!(a.sample_count(LOAD), b.sample_count(LOAD));
    }
}
