// virtchan-testdata - Signal patterns
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Signal patterns for power series.
//!
//! Patterns are evaluated at absolute timestamps (ms since the epoch), so
//! diurnal shapes line up with UTC hours of day.

use rand::prelude::*;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Signal pattern definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pattern {
    /// Constant value.
    Constant { value: f64 },

    /// `offset + amplitude * sin(2*PI*t/period_ms + phase)`
    Sine {
        amplitude: f64,
        period_ms: i64,
        phase: f64,
        offset: f64,
    },

    /// Bell curve around `peak_hour`, `min` far from it.
    Diurnal {
        min: f64,
        max: f64,
        peak_hour: f64,
        spread: f64,
    },

    /// Two bell curves per day (morning and evening load).
    BimodalDiurnal {
        min: f64,
        max: f64,
        peak1_hour: f64,
        peak2_hour: f64,
        spread: f64,
    },

    /// Levels as `(timestamp_ms, value)`, each holding until the next.
    Step { levels: Vec<(i64, f64)> },

    /// Linear ramp from `min` to `max`, restarting every period.
    Sawtooth { min: f64, max: f64, period_ms: i64 },

    /// Random walk starting at `start` (needs [`PatternState`]).
    RandomWalk { start: f64, step_std: f64 },

    /// Sum of patterns.
    Composite(Vec<Pattern>),
}

/// Distance in hours between two hours of day, wrapping at midnight.
fn hour_distance(a: f64, b: f64) -> f64 {
    let diff = (a - b).abs();
    if diff > 12.0 {
        24.0 - diff
    } else {
        diff
    }
}

fn bell(hour: f64, peak: f64, spread: f64) -> f64 {
    let diff = hour_distance(hour, peak);
    (-diff * diff / (2.0 * spread * spread)).exp()
}

impl Pattern {
    /// Evaluate the pattern at `timestamp_ms`.
    ///
    /// `RandomWalk` is stateful; use [`PatternState::evaluate`] for it.
    pub fn evaluate(&self, timestamp_ms: i64, rng: &mut (impl Rng + ?Sized)) -> f64 {
        match self {
            Pattern::Constant { value } => *value,

            Pattern::Sine {
                amplitude,
                period_ms,
                phase,
                offset,
            } => {
                let t = timestamp_ms as f64;
                offset + amplitude * (2.0 * PI * t / *period_ms as f64 + phase).sin()
            }

            Pattern::Diurnal {
                min,
                max,
                peak_hour,
                spread,
            } => {
                let hour = (timestamp_ms as f64 / MS_PER_HOUR).rem_euclid(24.0);
                min + (max - min) * bell(hour, *peak_hour, *spread)
            }

            Pattern::BimodalDiurnal {
                min,
                max,
                peak1_hour,
                peak2_hour,
                spread,
            } => {
                let hour = (timestamp_ms as f64 / MS_PER_HOUR).rem_euclid(24.0);
                let factor = bell(hour, *peak1_hour, *spread).max(bell(hour, *peak2_hour, *spread));
                min + (max - min) * factor
            }

            Pattern::Step { levels } => {
                let mut current = levels.first().map(|(_, v)| *v).unwrap_or(0.0);
                for (ts, value) in levels {
                    if timestamp_ms >= *ts {
                        current = *value;
                    } else {
                        break;
                    }
                }
                current
            }

            Pattern::Sawtooth {
                min,
                max,
                period_ms,
            } => {
                let fraction = timestamp_ms.rem_euclid(*period_ms) as f64 / *period_ms as f64;
                min + (max - min) * fraction
            }

            Pattern::RandomWalk { start, step_std } => {
                start + Normal::new(0.0, *step_std).map_or(0.0, |n| n.sample(rng))
            }

            Pattern::Composite(patterns) => {
                patterns.iter().map(|p| p.evaluate(timestamp_ms, rng)).sum()
            }
        }
    }

    /// Photovoltaic output: bell curve around noon, zero at night.
    pub fn solar(peak_watts: f64) -> Self {
        Pattern::Diurnal {
            min: 0.0,
            max: peak_watts,
            peak_hour: 12.0,
            spread: 2.5,
        }
    }

    /// Household load with morning and evening peaks.
    pub fn household(base_watts: f64, peak_watts: f64) -> Self {
        Pattern::BimodalDiurnal {
            min: base_watts,
            max: peak_watts,
            peak1_hour: 7.0,
            peak2_hour: 19.0,
            spread: 1.5,
        }
    }
}

/// State for stateful patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternState {
    walk: Option<f64>,
}

impl PatternState {
    /// Evaluate `pattern`, advancing random walks by one step.
    pub fn evaluate(
        &mut self,
        pattern: &Pattern,
        timestamp_ms: i64,
        rng: &mut (impl Rng + ?Sized),
    ) -> f64 {
        match pattern {
            Pattern::RandomWalk { start, step_std } => {
                let step = Normal::new(0.0, *step_std).map_or(0.0, |n| n.sample(rng));
                let value = self.walk.unwrap_or(*start) + step;
                self.walk = Some(value);
                value
            }
            _ => pattern.evaluate(timestamp_ms, rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;

    const HOUR: i64 = 3_600_000;

    #[test]
    fn test_solar_zero_at_night() {
        let mut rng = StdRng::seed_from_u64(1);
        let solar = Pattern::solar(4000.0);
        assert!(solar.evaluate(0, &mut rng) < 1.0);
        assert!((solar.evaluate(12 * HOUR, &mut rng) - 4000.0).abs() < 1e-9);
    }

    #[test]
    fn test_household_peaks() {
        let mut rng = StdRng::seed_from_u64(1);
        let load = Pattern::household(200.0, 2000.0);
        let morning = load.evaluate(7 * HOUR, &mut rng);
        let noon = load.evaluate(13 * HOUR, &mut rng);
        assert!((morning - 2000.0).abs() < 1e-9);
        assert!(noon < morning);
        assert!(noon >= 200.0);
    }

    #[test]
    fn test_step_levels() {
        let mut rng = StdRng::seed_from_u64(1);
        let step = Pattern::Step {
            levels: vec![(0, 1.0), (1000, 5.0), (2000, 2.0)],
        };
        assert_eq!(step.evaluate(500, &mut rng), 1.0);
        assert_eq!(step.evaluate(1000, &mut rng), 5.0);
        assert_eq!(step.evaluate(5000, &mut rng), 2.0);
    }

    #[test]
    fn test_sawtooth() {
        let mut rng = StdRng::seed_from_u64(1);
        let saw = Pattern::Sawtooth {
            min: 0.0,
            max: 10.0,
            period_ms: 1000,
        };
        assert_eq!(saw.evaluate(0, &mut rng), 0.0);
        assert_eq!(saw.evaluate(500, &mut rng), 5.0);
        assert_eq!(saw.evaluate(1500, &mut rng), 5.0);
    }

    #[test]
    fn test_random_walk_is_stateful() {
        let mut rng = StdRng::seed_from_u64(7);
        let walk = Pattern::RandomWalk {
            start: 100.0,
            step_std: 1.0,
        };
        let mut state = PatternState::default();
        let values: Vec<f64> = (0..50)
            .map(|i| state.evaluate(&walk, i, &mut rng))
            .collect();
        // consecutive values differ by one step, not by the full spread
        assert!(values.windows(2).all(|w| (w[1] - w[0]).abs() < 6.0));
    }

    #[test]
    fn test_composite_sums() {
        let mut rng = StdRng::seed_from_u64(1);
        let composite = Pattern::Composite(vec![
            Pattern::Constant { value: 1.0 },
            Pattern::Constant { value: 2.5 },
        ]);
        assert_eq!(composite.evaluate(0, &mut rng), 3.5);
    }
}
