// virtchan - Virtual time-series channels
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Output statistics
//!
//! Every output sequence (virtual channel, block view, reader) keeps a
//! [`ChannelStats`] that is updated once per emitted tuple and is read
//! through the [`Output`] accessors after exhaustion.

use crate::config::OutputMode;
use crate::error::{EngineError, Result};
use crate::tuple::{Tuple, MS_PER_HOUR};

/// Accumulators of one output sequence
#[derive(Debug, Clone, Default)]
pub struct ChannelStats {
    /// First timestamp (seed of the sequence)
    pub from: Option<i64>,
    /// Last emitted timestamp
    pub to: Option<i64>,
    /// Number of rows represented by the emitted tuples
    pub row_count: u64,
    /// Accumulated consumption in Wh
    pub consumption: f64,
    /// Tuple with the smallest value
    pub min: Option<Tuple>,
    /// Tuple with the largest value
    pub max: Option<Tuple>,
    /// Accounting mode used by `average`
    pub mode: OutputMode,
}

impl ChannelStats {
    /// Create empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Statistics for a rule in the given output mode
    pub fn with_mode(mode: OutputMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Seed the start of the sequence
    pub fn seed(&mut self, from: i64) {
        self.from = Some(from);
    }

    /// Record an emitted tuple
    pub fn record(&mut self, tuple: &Tuple) {
        self.row_count += tuple.weight as u64;
        self.to = Some(tuple.timestamp);

        if self.min.map_or(true, |min| tuple.value < min.value) {
            self.min = Some(*tuple);
        }
        if self.max.map_or(true, |max| tuple.value > max.value) {
            self.max = Some(*tuple);
        }
    }

    /// Add consumption in Wh
    pub fn add_consumption(&mut self, wh: f64) {
        self.consumption += wh;
    }

    /// Mark the end of the sequence
    pub fn finish(&mut self, to: i64) {
        self.to = Some(to);
    }

    /// First timestamp
    pub fn from(&self) -> Result<i64> {
        self.from.ok_or(EngineError::NoData)
    }

    /// Last timestamp
    pub fn to(&self) -> Result<i64> {
        self.to.ok_or(EngineError::NoData)
    }

    /// Whether any tuple was recorded
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Average over the sequence
    ///
    /// In values mode this is the mean power `consumption / (to - from)`,
    /// in consumption mode the mean per-row consumption.
    pub fn average(&self) -> Result<f64> {
        let from = self.from()?;
        let to = self.to()?;

        match self.mode {
            OutputMode::Values => {
                if to == from {
                    return Err(EngineError::ArithmeticError(format!(
                        "zero-width time range at {}",
                        from
                    )));
                }
                Ok(self.consumption * MS_PER_HOUR / (to - from) as f64)
            }
            OutputMode::Consumption => {
                if self.row_count == 0 {
                    return Err(EngineError::ArithmeticError(
                        "average over zero rows".to_string(),
                    ));
                }
                Ok(self.consumption / self.row_count as f64)
            }
        }
    }

    /// Reset all statistics, keeping the mode
    pub fn reset(&mut self) {
        *self = Self::with_mode(self.mode);
    }

    /// Generate a human-readable report
    pub fn report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Channel Statistics ===\n\n");
        match (self.from, self.to) {
            (Some(from), Some(to)) => {
                report.push_str(&format!("Range: {} .. {} ({} ms)\n", from, to, to - from))
            }
            _ => report.push_str("Range: n/a\n"),
        }
        report.push_str(&format!("Rows: {}\n", self.row_count));
        report.push_str(&format!("Consumption: {:.3} Wh\n", self.consumption));
        if let Ok(average) = self.average() {
            report.push_str(&format!("Average: {:.3}\n", average));
        }
        if let Some(min) = self.min {
            report.push_str(&format!("Min: {} @ {}\n", min.value, min.timestamp));
        }
        if let Some(max) = self.max {
            report.push_str(&format!("Max: {} @ {}\n", max.value, max.timestamp));
        }

        report
    }
}

/// An output sequence with statistics
///
/// Accessors are meaningful once the sequence has been exhausted.
pub trait Output: Iterator<Item = Result<Tuple>> {
    /// Statistics gathered so far
    fn stats(&self) -> &ChannelStats;

    fn from(&self) -> Result<i64> {
        self.stats().from()
    }

    fn to(&self) -> Result<i64> {
        self.stats().to()
    }

    fn row_count(&self) -> u64 {
        self.stats().row_count
    }

    fn min_tuple(&self) -> Option<Tuple> {
        self.stats().min
    }

    fn max_tuple(&self) -> Option<Tuple> {
        self.stats().max
    }

    fn consumption(&self) -> f64 {
        self.stats().consumption
    }

    fn average(&self) -> Result<f64> {
        self.stats().average()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::period_consumption;

    #[test]
    fn test_min_max_row_count() {
        let mut stats = ChannelStats::new();
        stats.seed(0);
        stats.record(&Tuple::new(1000, 5.0));
        stats.record(&Tuple::new(2000, -1.0));
        stats.record(&Tuple::weighted(3000, 9.0, 3));

        assert_eq!(stats.row_count, 5);
        assert_eq!(stats.min.unwrap().timestamp, 2000);
        assert_eq!(stats.max.unwrap().value, 9.0);
        assert_eq!(stats.to().unwrap(), 3000);
    }

    #[test]
    fn test_average_mean_power() {
        let mut stats = ChannelStats::new();
        stats.seed(0);
        stats.add_consumption(period_consumption(100.0, 3_600_000));
        stats.record(&Tuple::new(3_600_000, 100.0));
        assert!((stats.average().unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_average_zero_width_is_arithmetic_error() {
        let mut stats = ChannelStats::new();
        stats.seed(1000);
        stats.finish(1000);
        assert!(matches!(
            stats.average(),
            Err(EngineError::ArithmeticError(_))
        ));
    }

    #[test]
    fn test_average_consumption_mode() {
        let mut stats = ChannelStats::with_mode(OutputMode::Consumption);
        stats.seed(0);
        stats.record(&Tuple::new(10, 1.0));
        stats.record(&Tuple::new(20, 3.0));
        stats.add_consumption(4.0);
        assert!((stats.average().unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_stats_no_data() {
        let stats = ChannelStats::new();
        assert_eq!(stats.from(), Err(EngineError::NoData));
        assert_eq!(stats.average(), Err(EngineError::NoData));
        assert!(stats.is_empty());
    }

    #[test]
    fn test_reset_keeps_mode() {
        let mut stats = ChannelStats::with_mode(OutputMode::Consumption);
        stats.seed(5);
        stats.record(&Tuple::new(6, 1.0));
        stats.reset();
        assert!(stats.is_empty());
        assert_eq!(stats.mode, OutputMode::Consumption);
        assert!(stats.from.is_none());
    }

    #[test]
    fn test_report_generation() {
        let mut stats = ChannelStats::new();
        stats.seed(0);
        stats.record(&Tuple::new(1000, 2.0));
        let report = stats.report();
        assert!(report.contains("Rows: 1"));
        assert!(report.contains("Consumption"));
    }
}
