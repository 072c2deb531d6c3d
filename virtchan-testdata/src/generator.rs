// virtchan-testdata - Core generator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Series generation.
//!
//! Produces strictly ascending, irregularly spaced samples: every nominal
//! sample time is shifted by a random jitter smaller than the interval, and
//! samples may be dropped at random.

use crate::patterns::{Pattern, PatternState};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use virtchan::{ChannelClass, MemorySource, Tuple};

/// Sampling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Start timestamp in milliseconds.
    pub start_time_ms: i64,
    /// Nominal interval between samples in milliseconds.
    pub sample_interval_ms: i64,
    /// Maximum jitter added to each nominal sample time.
    pub jitter_ms: i64,
    /// Probability that a sample is missing.
    pub dropout: f64,
    /// Number of nominal samples.
    pub num_samples: usize,
    /// Random seed for reproducibility.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            start_time_ms: 1706745600000, // 2024-02-01 00:00:00 UTC
            sample_interval_ms: 60_000,
            jitter_ms: 0,
            dropout: 0.0,
            num_samples: 60,
            seed: None,
        }
    }
}

impl GeneratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start_time(mut self, timestamp_ms: i64) -> Self {
        self.start_time_ms = timestamp_ms;
        self
    }

    pub fn with_sample_interval_ms(mut self, interval_ms: i64) -> Self {
        self.sample_interval_ms = interval_ms;
        self
    }

    pub fn with_sample_interval_secs(mut self, secs: i64) -> Self {
        self.sample_interval_ms = secs * 1000;
        self
    }

    /// Jitter is capped below the interval so samples stay ascending.
    pub fn with_jitter_ms(mut self, jitter_ms: i64) -> Self {
        self.jitter_ms = jitter_ms;
        self
    }

    pub fn with_dropout(mut self, probability: f64) -> Self {
        self.dropout = probability.clamp(0.0, 1.0);
        self
    }

    pub fn with_num_samples(mut self, n: usize) -> Self {
        self.num_samples = n;
        self
    }

    /// Set duration in hours (calculates num_samples from interval).
    pub fn with_duration_hours(mut self, hours: f64) -> Self {
        let total_ms = hours * 3_600_000.0;
        self.num_samples = (total_ms / self.sample_interval_ms as f64).ceil() as usize;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// End of the nominal sampling range.
    pub fn end_time_ms(&self) -> i64 {
        self.start_time_ms + self.sample_interval_ms * self.num_samples.saturating_sub(1) as i64
    }

    fn rng(&self, salt: u64) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ salt),
            None => StdRng::from_entropy(),
        }
    }
}

/// One generated channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesConfig {
    /// Channel identifier.
    pub channel: String,
    /// Instantaneous power, or a cumulative meter integrating it.
    pub class: ChannelClass,
    /// Power pattern in W.
    pub pattern: Pattern,
    /// Standard deviation of added noise.
    pub noise_std: f64,
    /// Values are clamped to `[min, max]` before integration.
    pub min: f64,
    pub max: f64,
}

impl SeriesConfig {
    pub fn new(channel: &str, pattern: Pattern) -> Self {
        Self {
            channel: channel.to_string(),
            class: ChannelClass::Instantaneous,
            pattern,
            noise_std: 0.0,
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }

    pub fn with_noise(mut self, std: f64) -> Self {
        self.noise_std = std;
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Emit a meter reading in Wh instead of power.
    pub fn cumulative(mut self) -> Self {
        self.class = ChannelClass::Cumulative;
        self
    }
}

/// Simple FNV-1a over the channel name to decorrelate per-channel streams.
fn salt(channel: &str) -> u64 {
    channel
        .bytes()
        .fold(0xcbf29ce484222325, |h, b| (h ^ b as u64).wrapping_mul(0x100000001b3))
}

/// Generate the samples of one series.
pub fn generate_series(config: &GeneratorConfig, series: &SeriesConfig) -> Vec<Tuple> {
    let mut rng = config.rng(salt(&series.channel));
    let mut state = PatternState::default();
    let noise = Normal::new(0.0, series.noise_std).ok();
    let jitter = config
        .jitter_ms
        .clamp(0, (config.sample_interval_ms - 1).max(0));

    let mut samples = Vec::with_capacity(config.num_samples);
    let mut meter = 0.0;
    let mut last: Option<(i64, f64)> = None;

    for i in 0..config.num_samples {
        let nominal = config.start_time_ms + i as i64 * config.sample_interval_ms;
        let timestamp = if jitter > 0 {
            nominal + rng.gen_range(0..=jitter)
        } else {
            nominal
        };

        let mut power = state.evaluate(&series.pattern, timestamp, &mut rng);
        if series.noise_std > 0.0 {
            if let Some(noise) = noise {
                power += noise.sample(&mut rng);
            }
        }
        let power = power.clamp(series.min, series.max);

        // the first sample is always kept so every series has a start
        if i > 0 && config.dropout > 0.0 && rng.gen::<f64>() < config.dropout {
            continue;
        }

        let value = match series.class {
            ChannelClass::Instantaneous => power,
            ChannelClass::Cumulative => {
                if let Some((prev_ts, prev_power)) = last {
                    meter += prev_power * (timestamp - prev_ts) as f64 / 3_600_000.0;
                }
                meter
            }
        };
        last = Some((timestamp, power));
        samples.push(Tuple::new(timestamp, value));
    }

    samples
}

/// Generate every series into one source.
pub fn generate_source(config: &GeneratorConfig, series: &[SeriesConfig]) -> MemorySource {
    let mut source = MemorySource::new();
    for s in series {
        source.insert(s.channel.clone(), s.class, generate_series(config, s));
    }
    source
}
