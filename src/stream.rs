// virtchan - Virtual time-series channels
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sample streams and the sample source boundary
//!
//! The engine never reads storage itself. It asks a [`SampleSource`] for a
//! lazy, ascending [`SampleStream`] per channel and for the channel's
//! semantic class. [`MemorySource`] is an in-memory source with the same
//! range selection rules as the storage layer, used by tests, benchmarks and
//! the replay tool.

use crate::config::{Query, RangeMode};
use crate::error::{EngineError, Result};
use crate::group::GroupBy;
use crate::tuple::Tuple;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::iter::Peekable;
use std::str::FromStr;
use std::sync::Arc;

/// Forward-only lazy sequence of ascending tuples for one channel
pub type SampleStream = Box<dyn Iterator<Item = Tuple>>;

/// Box any tuple iterator as a [`SampleStream`]
pub fn boxed<I>(iter: I) -> SampleStream
where
    I: IntoIterator<Item = Tuple>,
    I::IntoIter: 'static,
{
    Box::new(iter.into_iter())
}

/// Semantic class of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelClass {
    /// Meter readings: a value describes the period ending at its timestamp
    Cumulative,
    /// Sensor readings: a value holds until the next sample
    #[default]
    Instantaneous,
}

impl ChannelClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelClass::Cumulative => "cumulative",
            ChannelClass::Instantaneous => "instantaneous",
        }
    }
}

impl fmt::Display for ChannelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelClass {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cumulative" | "meter" => Ok(ChannelClass::Cumulative),
            "instantaneous" | "sensor" => Ok(ChannelClass::Instantaneous),
            other => Err(EngineError::Config(format!("Unknown channel class: {}", other))),
        }
    }
}

/// Provider of per-channel sample streams
pub trait SampleSource {
    /// Open an ascending stream of `channel` for the query range
    fn open(&self, channel: &str, query: &Query) -> Result<SampleStream>;

    /// Semantic class of `channel`
    fn channel_class(&self, channel: &str) -> Result<ChannelClass>;
}

struct MemoryChannel {
    class: ChannelClass,
    samples: Arc<Vec<Tuple>>,
}

/// In-memory sample source
///
/// Row selection around `[from, to]`:
/// - `Exact`: from the last sample at or before `from` to the last sample at
///   or before `to`.
/// - `Chart`: one more sample before that start, and up to the first sample
///   at or after `to`.
///
/// Selected rows are then collapsed per `group_by` bucket and packed down to
/// roughly `tuple_count` rows, in that order.
#[derive(Default)]
pub struct MemorySource {
    channels: HashMap<String, MemoryChannel>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a channel
    ///
    /// Samples are sorted by timestamp; for duplicate timestamps the last
    /// sample given wins.
    pub fn insert<I>(&mut self, channel: impl Into<String>, class: ChannelClass, samples: I)
    where
        I: IntoIterator<Item = Tuple>,
    {
        let mut samples: Vec<Tuple> = samples.into_iter().collect();
        samples.sort_by_key(|t| t.timestamp);
        dedup_keep_last(&mut samples);

        self.channels.insert(
            channel.into(),
            MemoryChannel {
                class,
                samples: Arc::new(samples),
            },
        );
    }

    /// Builder variant of [`insert`](Self::insert)
    pub fn with_channel<I>(mut self, channel: impl Into<String>, class: ChannelClass, samples: I) -> Self
    where
        I: IntoIterator<Item = Tuple>,
    {
        self.insert(channel, class, samples);
        self
    }

    /// Append one sample, creating an instantaneous channel if needed
    ///
    /// Samples not after the channel's last timestamp are dropped.
    pub fn push(&mut self, channel: &str, tuple: Tuple) -> bool {
        let entry = self
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| MemoryChannel {
                class: ChannelClass::default(),
                samples: Arc::new(Vec::new()),
            });

        if let Some(last) = entry.samples.last() {
            if tuple.timestamp <= last.timestamp {
                log::warn!(
                    "sample for {} at {} not after {}, dropped",
                    channel,
                    tuple.timestamp,
                    last.timestamp
                );
                return false;
            }
        }
        Arc::make_mut(&mut entry.samples).push(tuple);
        true
    }

    /// Channel identifiers
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Number of raw samples stored for `channel`
    pub fn sample_count(&self, channel: &str) -> Option<usize> {
        self.channels.get(channel).map(|c| c.samples.len())
    }

    fn channel(&self, channel: &str) -> Result<&MemoryChannel> {
        self.channels
            .get(channel)
            .ok_or_else(|| EngineError::UnknownChannel(channel.to_string()))
    }
}

fn dedup_keep_last(samples: &mut Vec<Tuple>) {
    let mut out: Vec<Tuple> = Vec::with_capacity(samples.len());
    for tuple in samples.drain(..) {
        match out.last_mut() {
            Some(last) if last.timestamp == tuple.timestamp => *last = tuple,
            _ => out.push(tuple),
        }
    }
    *samples = out;
}

/// Index range `[start, end)` of the rows selected for `query`
fn select_range(samples: &[Tuple], query: &Query) -> (usize, usize) {
    if samples.is_empty() || query.is_empty() {
        return (0, 0);
    }

    let at_or_before_from = samples.partition_point(|t| t.timestamp <= query.from);
    let (start, end) = match query.mode {
        RangeMode::Exact => (
            at_or_before_from.saturating_sub(1),
            samples.partition_point(|t| t.timestamp <= query.to),
        ),
        RangeMode::Chart => (
            at_or_before_from.saturating_sub(2),
            (samples.partition_point(|t| t.timestamp < query.to) + 1).min(samples.len()),
        ),
    };

    (start, end.max(start))
}

impl SampleSource for MemorySource {
    fn open(&self, channel: &str, query: &Query) -> Result<SampleStream> {
        let memory = self.channel(channel)?;
        let (start, end) = select_range(&memory.samples, query);

        log::debug!(
            "open {} [{}, {}] {:?}: {} rows",
            channel,
            query.from,
            query.to,
            query.mode,
            end - start
        );

        let rows = SliceStream {
            samples: Arc::clone(&memory.samples),
            pos: start,
            end,
        };

        let mut stream: SampleStream = match query.group_by {
            Some(period) => Box::new(BucketAggregate::new(rows, period)),
            None => Box::new(rows),
        };

        if let Some(count) = query.tuple_count {
            // grouped rows are counted after grouping
            let available = match query.group_by {
                Some(period) => count_buckets(&memory.samples[start..end], period),
                None => end - start,
            };
            let size = pack_size(available, count);
            if size > 1 {
                stream = Box::new(Pack::new(stream, size));
            }
        }

        Ok(stream)
    }

    fn channel_class(&self, channel: &str) -> Result<ChannelClass> {
        Ok(self.channel(channel)?.class)
    }
}

/// Lazy iterator over a shared, sorted sample buffer
struct SliceStream {
    samples: Arc<Vec<Tuple>>,
    pos: usize,
    end: usize,
}

impl Iterator for SliceStream {
    type Item = Tuple;

    fn next(&mut self) -> Option<Tuple> {
        if self.pos >= self.end {
            return None;
        }
        let tuple = self.samples.get(self.pos).copied();
        self.pos += 1;
        tuple
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end.saturating_sub(self.pos);
        (remaining, Some(remaining))
    }
}

fn count_buckets(samples: &[Tuple], period: GroupBy) -> usize {
    let mut count = 0;
    let mut last = None;
    for tuple in samples {
        let bucket = period.bucket(tuple.timestamp);
        if last != Some(bucket) {
            count += 1;
            last = Some(bucket);
        }
    }
    count
}

/// Rows per packed tuple; the seed row is never packed
fn pack_size(rows: usize, target: usize) -> usize {
    if target == 0 || rows <= target {
        return 1;
    }
    let packable = rows - 1;
    let slots = target.saturating_sub(1).max(1);
    (packable + slots - 1) / slots
}

/// Merge a run of rows: weighted mean value, summed weight, last timestamp
fn combine(rows: &[Tuple]) -> Option<Tuple> {
    let last = rows.last()?;
    let weight: u32 = rows.iter().map(|t| t.weight).sum();
    let value = if weight == 0 {
        rows.iter().map(|t| t.value).sum::<f64>() / rows.len() as f64
    } else {
        rows.iter().map(|t| t.value * t.weight as f64).sum::<f64>() / weight as f64
    };
    Some(Tuple::weighted(last.timestamp, value, weight))
}

/// Collapses consecutive rows of the same period bucket
struct BucketAggregate<I: Iterator<Item = Tuple>> {
    inner: Peekable<I>,
    period: GroupBy,
}

impl<I: Iterator<Item = Tuple>> BucketAggregate<I> {
    fn new(inner: I, period: GroupBy) -> Self {
        Self {
            inner: inner.peekable(),
            period,
        }
    }
}

impl<I: Iterator<Item = Tuple>> Iterator for BucketAggregate<I> {
    type Item = Tuple;

    fn next(&mut self) -> Option<Tuple> {
        let first = self.inner.next()?;
        let bucket = self.period.bucket(first.timestamp);
        let mut rows = vec![first];

        while let Some(next) = self.inner.peek() {
            if self.period.bucket(next.timestamp) != bucket {
                break;
            }
            rows.extend(self.inner.next());
        }
        combine(&rows)
    }
}

/// Packs consecutive rows into groups of `size`, passing the first row through
struct Pack {
    inner: SampleStream,
    size: usize,
    seeded: bool,
}

impl Pack {
    fn new(inner: SampleStream, size: usize) -> Self {
        Self {
            inner,
            size,
            seeded: false,
        }
    }
}

impl Iterator for Pack {
    type Item = Tuple;

    fn next(&mut self) -> Option<Tuple> {
        if !self.seeded {
            self.seeded = true;
            return self.inner.next();
        }
        let rows: Vec<Tuple> = self.inner.by_ref().take(self.size).collect();
        combine(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: i64 = 60_000;
    const RANGE_FROM: i64 = 3_600_000;
    const RANGE_TO: i64 = 7_200_000;

    fn minute_source(offset: i64) -> MemorySource {
        MemorySource::new().with_channel(
            "meter",
            ChannelClass::Instantaneous,
            (50..=130).map(|m| Tuple::new(m * MINUTE + offset, m as f64)),
        )
    }

    fn timestamps(source: &MemorySource, query: &Query) -> Vec<i64> {
        source
            .open("meter", query)
            .unwrap()
            .map(|t| t.timestamp)
            .collect()
    }

    #[test]
    fn test_exact_range_on_minute_boundaries() {
        let source = minute_source(0);
        let query = Query::new(RANGE_FROM, RANGE_TO).with_mode(RangeMode::Exact);
        let ts = timestamps(&source, &query);
        assert_eq!(ts.len(), 61);
        assert_eq!(ts[0], RANGE_FROM);
        assert_eq!(*ts.last().unwrap(), RANGE_TO);
    }

    #[test]
    fn test_chart_range_on_minute_boundaries() {
        let source = minute_source(0);
        let ts = timestamps(&source, &Query::new(RANGE_FROM, RANGE_TO));
        assert_eq!(ts.len(), 62);
        assert_eq!(ts[0], RANGE_FROM - MINUTE);
        assert_eq!(*ts.last().unwrap(), RANGE_TO);
    }

    #[test]
    fn test_ranges_with_offset_samples() {
        let source = minute_source(30_000);

        let exact = timestamps(
            &source,
            &Query::new(RANGE_FROM, RANGE_TO).with_mode(RangeMode::Exact),
        );
        assert_eq!(exact.len(), 61);
        assert_eq!(exact[0], RANGE_FROM - 30_000);
        assert_eq!(*exact.last().unwrap(), RANGE_TO - 30_000);

        let chart = timestamps(&source, &Query::new(RANGE_FROM, RANGE_TO));
        assert_eq!(chart.len(), 63);
        assert_eq!(chart[0], RANGE_FROM - 90_000);
        assert_eq!(*chart.last().unwrap(), RANGE_TO + 30_000);
    }

    #[test]
    fn test_range_before_first_sample() {
        let source = minute_source(0);
        let query = Query::new(0, 51 * MINUTE).with_mode(RangeMode::Exact);
        assert_eq!(timestamps(&source, &query), vec![50 * MINUTE, 51 * MINUTE]);
    }

    #[test]
    fn test_empty_query_range() {
        let source = minute_source(0);
        assert!(timestamps(&source, &Query::new(10, 5)).is_empty());
    }

    #[test]
    fn test_unknown_channel() {
        let source = MemorySource::new();
        assert!(matches!(
            source.open("nope", &Query::default()),
            Err(EngineError::UnknownChannel(_))
        ));
        assert!(source.channel_class("nope").is_err());
    }

    #[test]
    fn test_group_by_aggregates_buckets() {
        let source = MemorySource::new().with_channel(
            "power",
            ChannelClass::Instantaneous,
            vec![
                Tuple::new(100, 1.0),
                Tuple::new(900, 3.0),
                Tuple::new(1500, 10.0),
                Tuple::new(2100, 4.0),
            ],
        );
        let query = Query::new(0, 3000).with_group_by(GroupBy::Second);
        let rows: Vec<Tuple> = source.open("power", &query).unwrap().collect();
        assert_eq!(
            rows,
            vec![
                Tuple::weighted(900, 2.0, 2),
                Tuple::weighted(1500, 10.0, 1),
                Tuple::weighted(2100, 4.0, 1),
            ]
        );
    }

    #[test]
    fn test_tuple_count_packs_rows() {
        let source = minute_source(0);
        let query = Query::new(RANGE_FROM, RANGE_TO)
            .with_mode(RangeMode::Exact)
            .with_tuple_count(11);
        let rows: Vec<Tuple> = source.open("meter", &query).unwrap().collect();

        // seed row plus 60 rows packed by 6
        assert_eq!(rows.len(), 11);
        assert_eq!(rows[0], Tuple::new(RANGE_FROM, 60.0));
        assert_eq!(rows[1].weight, 6);
        assert_eq!(rows[1].timestamp, 66 * MINUTE);
        assert!((rows[1].value - 63.5).abs() < 1e-12);
        assert_eq!(rows.last().unwrap().timestamp, RANGE_TO);
        let weight: u32 = rows.iter().map(|t| t.weight).sum();
        assert_eq!(weight, 61);
    }

    #[test]
    fn test_insert_sorts_and_dedups() {
        let mut source = MemorySource::new();
        source.insert(
            "a",
            ChannelClass::Cumulative,
            vec![
                Tuple::new(300, 3.0),
                Tuple::new(100, 1.0),
                Tuple::new(300, 4.0),
            ],
        );
        let rows: Vec<Tuple> = source.open("a", &Query::default()).unwrap().collect();
        assert_eq!(rows, vec![Tuple::new(100, 1.0), Tuple::new(300, 4.0)]);
        assert_eq!(source.channel_class("a").unwrap(), ChannelClass::Cumulative);
    }

    #[test]
    fn test_push_rejects_non_ascending() {
        let mut source = MemorySource::new();
        assert!(source.push("a", Tuple::new(10, 1.0)));
        assert!(!source.push("a", Tuple::new(10, 2.0)));
        assert!(source.push("a", Tuple::new(20, 2.0)));
        assert_eq!(source.sample_count("a"), Some(2));
    }

    #[test]
    fn test_channel_class_parse() {
        assert_eq!("meter".parse::<ChannelClass>().unwrap(), ChannelClass::Cumulative);
        assert_eq!(
            " Sensor ".parse::<ChannelClass>().unwrap(),
            ChannelClass::Instantaneous
        );
        assert!("gauge".parse::<ChannelClass>().is_err());
    }
}
