// virtchan - Virtual time-series channels
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! K-way timestamp merge
//!
//! [`TimestampMerger`] combines any number of ascending timestamp
//! sequences into one ascending sequence in which every distinct timestamp
//! appears exactly once. At most one pending timestamp is buffered per
//! input.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Boxed ascending timestamp sequence
pub type TimestampIter = Box<dyn Iterator<Item = i64>>;

/// Min-heap merge over ascending timestamp sequences
pub struct TimestampMerger {
    inputs: Vec<TimestampIter>,
    /// (pending timestamp, input index)
    heap: BinaryHeap<Reverse<(i64, usize)>>,
    primed: bool,
    last: Option<i64>,
}

impl TimestampMerger {
    pub fn new() -> Self {
        Self {
            inputs: Vec::new(),
            heap: BinaryHeap::new(),
            primed: false,
            last: None,
        }
    }

    /// Add an input sequence
    ///
    /// Inputs are not read until the first call to `next`.
    pub fn add<I>(&mut self, input: I)
    where
        I: Iterator<Item = i64> + 'static,
    {
        let index = self.inputs.len();
        self.inputs.push(Box::new(input));
        if self.primed {
            self.advance(index, self.last);
        }
    }

    /// Number of inputs
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Last emitted timestamp
    pub fn last_emitted(&self) -> Option<i64> {
        self.last
    }

    /// Pull the next timestamp of input `index` strictly above `floor`.
    fn advance(&mut self, index: usize, floor: Option<i64>) {
        for ts in self.inputs[index].by_ref() {
            match floor {
                Some(floor) if ts <= floor => {
                    log::warn!(
                        "timestamp input {} not ascending: {} after {}, skipped",
                        index,
                        ts,
                        floor
                    );
                }
                _ => {
                    self.heap.push(Reverse((ts, index)));
                    return;
                }
            }
        }
    }

    fn prime(&mut self) {
        self.primed = true;
        for index in 0..self.inputs.len() {
            self.advance(index, None);
        }
    }
}

impl Default for TimestampMerger {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for TimestampMerger {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        if !self.primed {
            self.prime();
        }

        let Reverse((ts, index)) = self.heap.pop()?;
        self.advance(index, Some(ts));

        // every other input currently holding the same timestamp moves on
        while let Some(Reverse((next, other))) = self.heap.peek().copied() {
            if next != ts {
                break;
            }
            self.heap.pop();
            self.advance(other, Some(ts));
        }

        self.last = Some(ts);
        Some(ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IN1: [i64; 6] = [100, 1000, 2000, 3000, 4000, 5000];
    const IN2: [i64; 11] = [
        100, 900, 1150, 1850, 2100, 3000, 3200, 3400, 3600, 3800, 4000,
    ];

    fn sorted_union(inputs: &[&[i64]]) -> Vec<i64> {
        let mut all: Vec<i64> = inputs.iter().flat_map(|s| s.iter().copied()).collect();
        all.sort_unstable();
        all.dedup();
        all
    }

    #[test]
    fn test_merge_two_series() {
        let mut merger = TimestampMerger::new();
        merger.add(IN1.into_iter());
        merger.add(IN2.into_iter());

        let merged: Vec<i64> = merger.collect();
        assert_eq!(merged, sorted_union(&[&IN1, &IN2]));
        assert_eq!(merged.iter().filter(|&&ts| ts == 100).count(), 1);
    }

    #[test]
    fn test_merge_no_inputs() {
        let mut merger = TimestampMerger::new();
        assert!(merger.is_empty());
        assert_eq!(merger.next(), None);
    }

    #[test]
    fn test_merge_with_empty_input() {
        let mut merger = TimestampMerger::new();
        merger.add(std::iter::empty());
        merger.add(IN1.into_iter());
        assert_eq!(merger.collect::<Vec<_>>(), IN1.to_vec());
    }

    #[test]
    fn test_merge_three_identical() {
        let mut merger = TimestampMerger::new();
        for _ in 0..3 {
            merger.add(IN1.into_iter());
        }
        assert_eq!(merger.collect::<Vec<_>>(), IN1.to_vec());
    }

    #[test]
    fn test_merge_skips_non_ascending_values() {
        let mut merger = TimestampMerger::new();
        merger.add(vec![10, 20, 15, 30].into_iter());
        assert_eq!(merger.collect::<Vec<_>>(), vec![10, 20, 30]);
    }

    #[test]
    fn test_merge_random_sets() {
        use rand::prelude::*;
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..50 {
            let n = rng.gen_range(1..6);
            let series: Vec<Vec<i64>> = (0..n)
                .map(|_| {
                    let mut ts = rng.gen_range(-50..50);
                    (0..rng.gen_range(0..40))
                        .map(|_| {
                            ts += rng.gen_range(1..30);
                            ts
                        })
                        .collect()
                })
                .collect();

            let mut merger = TimestampMerger::new();
            for s in &series {
                merger.add(s.clone().into_iter());
            }
            let merged: Vec<i64> = merger.collect();
            let refs: Vec<&[i64]> = series.iter().map(|s| s.as_slice()).collect();
            assert_eq!(merged, sorted_union(&refs));
        }
    }

    #[test]
    fn test_last_emitted_tracks_output() {
        let mut merger = TimestampMerger::new();
        merger.add(IN1.into_iter());
        assert_eq!(merger.last_emitted(), None);
        merger.next();
        assert_eq!(merger.last_emitted(), Some(100));
    }
}
