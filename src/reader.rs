// virtchan - Virtual time-series channels
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Single-channel reader
//!
//! Reads one stream as an output sequence. The first row only positions the
//! start of the range; every following row describes the period since its
//! predecessor and is emitted.

use crate::config::Query;
use crate::error::Result;
use crate::stats::{ChannelStats, Output};
use crate::stream::{SampleSource, SampleStream};
use crate::tuple::{period_consumption, Tuple};

/// Output sequence over one raw channel
pub struct ChannelReader {
    stream: SampleStream,
    stats: ChannelStats,
    last_ts: Option<i64>,
    done: bool,
}

impl ChannelReader {
    pub fn new(stream: SampleStream) -> Self {
        Self {
            stream,
            stats: ChannelStats::new(),
            last_ts: None,
            done: false,
        }
    }

    /// Open `channel` at `source` for `query`
    pub fn open(source: &dyn SampleSource, channel: &str, query: &Query) -> Result<Self> {
        Ok(Self::new(source.open(channel, query)?))
    }
}

impl Iterator for ChannelReader {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Result<Tuple>> {
        if self.done {
            return None;
        }

        loop {
            let Some(tuple) = self.stream.next() else {
                self.done = true;
                if let Some(last) = self.last_ts {
                    self.stats.finish(last);
                }
                return None;
            };

            match self.last_ts {
                None => self.stats.seed(tuple.timestamp),
                Some(prev) if tuple.timestamp <= prev => {
                    log::warn!(
                        "reader dropped tuple at {} after {}",
                        tuple.timestamp,
                        prev
                    );
                    continue;
                }
                Some(prev) => {
                    self.stats
                        .add_consumption(period_consumption(tuple.value, tuple.timestamp - prev));
                    self.stats.record(&tuple);
                    self.last_ts = Some(tuple.timestamp);
                    return Some(Ok(tuple));
                }
            }
            self.last_ts = Some(tuple.timestamp);
        }
    }
}

impl Output for ChannelReader {
    fn stats(&self) -> &ChannelStats {
        &self.stats
    }
}
