// virtchan - Virtual time-series channels
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Limiter block: clips a single input to a cutoff value

use super::Parameters;
use crate::config::Query;
use crate::error::{EngineError, Result};
use crate::reader::ChannelReader;
use crate::stats::{ChannelStats, Output};
use crate::stream::SampleSource;
use crate::tuple::{period_consumption, Tuple};

/// Name of the limiter's only output view
pub const OUTPUT: &str = "output";

/// Limiter configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Limiter {
    pub name: String,
    /// Input channel
    pub input: String,
    /// Upper bound of emitted values
    pub cutoff: f64,
}

impl Limiter {
    pub fn new(name: impl Into<String>, input: impl Into<String>, cutoff: f64) -> Self {
        Self {
            name: name.into(),
            input: input.into(),
            cutoff,
        }
    }

    /// Build from block parameters (`input`, `cutoff`)
    pub fn from_parameters(params: &Parameters) -> Result<Self> {
        params.require(&["input", "cutoff"])?;
        let cutoff = params.number("cutoff")?;
        if cutoff.is_nan() {
            return Err(EngineError::invalid(params.block(), "cutoff", "not a number"));
        }
        Ok(Self::new(params.block(), params.string("input")?, cutoff))
    }

    /// Open the input and clip it
    pub fn open(&self, source: &dyn SampleSource, query: &Query) -> Result<LimiterOutput> {
        let input = ChannelReader::open(source, &self.input, query)?;
        Ok(LimiterOutput::new(input, self.cutoff))
    }
}

/// Clipped output sequence
pub struct LimiterOutput {
    input: ChannelReader,
    cutoff: f64,
    stats: ChannelStats,
    last_ts: Option<i64>,
}

impl LimiterOutput {
    pub fn new(input: ChannelReader, cutoff: f64) -> Self {
        Self {
            input,
            cutoff,
            stats: ChannelStats::new(),
            last_ts: None,
        }
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }
}

impl Iterator for LimiterOutput {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Result<Tuple>> {
        let mut tuple = match self.input.next() {
            Some(Ok(tuple)) => tuple,
            Some(Err(err)) => return Some(Err(err)),
            None => {
                if self.last_ts.is_none() {
                    // only the seed row was read
                    if let (Ok(from), Ok(to)) = (self.input.from(), self.input.to()) {
                        self.stats.seed(from);
                        self.stats.finish(to);
                    }
                }
                return None;
            }
        };

        let prev = match self.last_ts {
            Some(prev) => prev,
            None => {
                let from = self.input.from().unwrap_or(tuple.timestamp);
                self.stats.seed(from);
                from
            }
        };

        tuple.value = tuple.value.min(self.cutoff);
        self.stats
            .add_consumption(period_consumption(tuple.value, tuple.timestamp - prev));
        self.stats.record(&tuple);
        self.last_ts = Some(tuple.timestamp);

        Some(Ok(tuple))
    }
}

impl Output for LimiterOutput {
    fn stats(&self) -> &ChannelStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{boxed, ChannelClass, MemorySource};
    use approx::assert_relative_eq;

    const HOUR: i64 = 3_600_000;

    fn limiter_over(points: &[(i64, f64)], cutoff: f64) -> LimiterOutput {
        let tuples: Vec<Tuple> = points.iter().map(|&p| Tuple::from(p)).collect();
        LimiterOutput::new(ChannelReader::new(boxed(tuples)), cutoff)
    }

    #[test]
    fn test_values_clipped_to_cutoff() {
        let points = [(0, 0.0), (HOUR, 500.0), (2 * HOUR, 1500.0), (3 * HOUR, 900.0)];
        let mut limiter = limiter_over(&points, 1000.0);
        let tuples: Vec<Tuple> = limiter.by_ref().collect::<Result<_>>().unwrap();

        assert_eq!(
            tuples.iter().map(|t| t.value).collect::<Vec<_>>(),
            vec![500.0, 1000.0, 900.0]
        );
        assert_relative_eq!(limiter.consumption(), 2400.0);
        assert_relative_eq!(limiter.average().unwrap(), 800.0);
        assert_eq!(limiter.from().unwrap(), 0);
        assert_eq!(limiter.to().unwrap(), 3 * HOUR);
        assert_eq!(limiter.max_tuple().unwrap().value, 1000.0);
    }

    #[test]
    fn test_weight_counts_rows() {
        let tuples = vec![
            Tuple::new(0, 1.0),
            Tuple::weighted(1000, 2.0, 3),
            Tuple::weighted(2000, 3.0, 2),
        ];
        let mut limiter = LimiterOutput::new(ChannelReader::new(boxed(tuples)), 2.5);
        let out: Vec<Tuple> = limiter.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(out[1], Tuple::weighted(2000, 2.5, 2));
        assert_eq!(limiter.row_count(), 5);
    }

    #[test]
    fn test_single_tuple_matches_reader() {
        let mut reader = ChannelReader::new(boxed(vec![Tuple::new(10, 1.0)]));
        assert!(reader.next().is_none());

        let mut limiter = limiter_over(&[(10, 1.0)], 10.0);
        assert!(limiter.next().is_none());
        assert_eq!(limiter.from(), reader.from());
        assert_eq!(limiter.from(), Ok(10));
        assert_eq!(limiter.row_count(), 0);
        assert!(matches!(
            limiter.average(),
            Err(EngineError::ArithmeticError(_))
        ));
        assert!(matches!(
            reader.average(),
            Err(EngineError::ArithmeticError(_))
        ));
    }

    #[test]
    fn test_limiter_from_parameters() {
        let params = Parameters::from_json("cap", r#"{"input": "grid", "cutoff": 4200}"#).unwrap();
        let limiter = Limiter::from_parameters(&params).unwrap();
        assert_eq!(limiter, Limiter::new("cap", "grid", 4200.0));

        let params = Parameters::from_json("cap", r#"{"input": "grid"}"#).unwrap();
        assert_eq!(
            Limiter::from_parameters(&params),
            Err(EngineError::missing("cap", "cutoff"))
        );
    }

    #[test]
    fn test_limiter_over_source() {
        let source = MemorySource::new().with_channel(
            "grid",
            ChannelClass::Instantaneous,
            (0..10).map(|i| Tuple::new(i * 1000, i as f64 * 100.0)),
        );
        let limiter = Limiter::new("cap", "grid", 450.0);
        let values: Vec<f64> = limiter
            .open(&source, &Query::default())
            .unwrap()
            .map(|t| t.unwrap().value)
            .collect();
        assert_eq!(values.len(), 9);
        assert!(values.iter().all(|v| *v <= 450.0));
        assert_eq!(values[3], 400.0);
        assert_eq!(values[4], 450.0);
    }
}
