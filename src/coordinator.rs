// virtchan - Virtual time-series channels
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Input coordination
//!
//! A [`Coordinator`] owns the named [`StreamCursor`]s of one evaluation and
//! the shared [`Timeline`] built from their timestamps. Evaluators and
//! simulation blocks hold one coordinator each and drive it instant by
//! instant.

use crate::config::Query;
use crate::cursor::{StalenessPolicy, StreamCursor};
use crate::error::{EngineError, Result};
use crate::group::{GroupBy, PeriodGrouper};
use crate::merge::TimestampMerger;
use crate::stream::{ChannelClass, SampleSource, SampleStream};
use std::collections::HashMap;

/// Synchronized instants of all registered inputs
pub enum Timeline {
    /// Every distinct input timestamp
    Merged(TimestampMerger),
    /// Latest timestamp per period bucket
    Grouped(PeriodGrouper<TimestampMerger>),
}

impl Timeline {
    pub fn new(group_by: Option<GroupBy>) -> Self {
        match group_by {
            Some(period) => Timeline::Grouped(PeriodGrouper::new(TimestampMerger::new(), period)),
            None => Timeline::Merged(TimestampMerger::new()),
        }
    }

    fn merger_mut(&mut self) -> &mut TimestampMerger {
        match self {
            Timeline::Merged(merger) => merger,
            Timeline::Grouped(grouper) => grouper.inner_mut(),
        }
    }

    /// Grouping period, if any
    pub fn group_by(&self) -> Option<GroupBy> {
        match self {
            Timeline::Merged(_) => None,
            Timeline::Grouped(grouper) => Some(grouper.period()),
        }
    }
}

impl Iterator for Timeline {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        match self {
            Timeline::Merged(merger) => merger.next(),
            Timeline::Grouped(grouper) => grouper.next(),
        }
    }
}

/// Owner of the named cursors of one evaluation
pub struct Coordinator {
    cursors: HashMap<String, StreamCursor>,
    names: Vec<String>,
    timeline: Timeline,
    sealed: bool,
}

impl Coordinator {
    /// Create an empty coordinator
    ///
    /// With `group_by` set the timeline yields one instant per period and
    /// every cursor sample-holds.
    pub fn new(group_by: Option<GroupBy>) -> Self {
        Self {
            cursors: HashMap::new(),
            names: Vec::new(),
            timeline: Timeline::new(group_by),
            sealed: false,
        }
    }

    /// Register a named input stream
    pub fn register_input(
        &mut self,
        name: impl Into<String>,
        stream: SampleStream,
        class: ChannelClass,
    ) -> Result<()> {
        let name = name.into();
        if self.sealed {
            return Err(EngineError::CoordinatorSealed(name));
        }
        if self.cursors.contains_key(&name) {
            return Err(EngineError::DuplicateInput(name));
        }

        let policy = match self.timeline.group_by() {
            Some(_) => StalenessPolicy::SampleHold,
            None => StalenessPolicy::ByChannelClass,
        };
        let (cursor, timestamps) = StreamCursor::tapped(stream, policy, class);
        self.timeline.merger_mut().add(timestamps);

        log::trace!("registered input {} ({}, {:?})", name, class, policy);
        self.names.push(name.clone());
        self.cursors.insert(name, cursor);
        Ok(())
    }

    /// Open `channel` at `source` and register it as input `name`
    pub fn register_channel(
        &mut self,
        name: impl Into<String>,
        source: &dyn SampleSource,
        channel: &str,
        query: &Query,
    ) -> Result<()> {
        let name = name.into();
        if self.sealed {
            return Err(EngineError::CoordinatorSealed(name));
        }
        let class = source.channel_class(channel)?;
        let stream = source.open(channel, query)?;
        self.register_input(name, stream, class)
    }

    /// Value of input `name` at instant `t`
    pub fn value_at(&mut self, name: &str, t: i64) -> Result<f64> {
        self.cursors
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownInput(name.to_string()))?
            .value_at(t)
    }

    /// Earliest first timestamp over all inputs that consumed data
    pub fn earliest_from(&self) -> Result<i64> {
        self.cursors
            .values()
            .filter_map(|cursor| cursor.from().ok())
            .min()
            .ok_or(EngineError::NoData)
    }

    /// Next synchronized instant
    pub fn next_instant(&mut self) -> Option<i64> {
        self.seal();
        self.timeline.next()
    }

    /// The driving timeline
    pub fn timeline(&mut self) -> &mut Timeline {
        self.seal();
        &mut self.timeline
    }

    pub fn cursor(&self, name: &str) -> Option<&StreamCursor> {
        self.cursors.get(name)
    }

    /// Input names in registration order
    pub fn input_names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn group_by(&self) -> Option<GroupBy> {
        self.timeline.group_by()
    }

    fn seal(&mut self) {
        if !self.sealed {
            self.sealed = true;
            log::debug!(
                "coordinator sealed with {} inputs, grouping {:?}",
                self.names.len(),
                self.timeline.group_by()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::boxed;
    use crate::tuple::Tuple;

    fn series(points: &[(i64, f64)]) -> SampleStream {
        boxed(
            points
                .iter()
                .map(|&(ts, v)| Tuple::new(ts, v))
                .collect::<Vec<_>>(),
        )
    }

    fn two_inputs(group_by: Option<GroupBy>) -> Coordinator {
        let mut coordinator = Coordinator::new(group_by);
        coordinator
            .register_input(
                "in1",
                series(&[(100, 100.0), (1000, 10.0), (2000, 20.0)]),
                ChannelClass::Instantaneous,
            )
            .unwrap();
        coordinator
            .register_input(
                "in2",
                series(&[(100, 200.0), (900, 1.0), (1150, 2.0)]),
                ChannelClass::Instantaneous,
            )
            .unwrap();
        coordinator
    }

    #[test]
    fn test_timeline_merges_inputs() {
        let mut coordinator = two_inputs(None);
        let instants: Vec<i64> = coordinator.timeline().collect();
        assert_eq!(instants, vec![100, 900, 1000, 1150, 2000]);
    }

    #[test]
    fn test_grouped_timeline() {
        let mut coordinator = two_inputs(Some(GroupBy::Second));
        let instants: Vec<i64> = coordinator.timeline().collect();
        assert_eq!(instants, vec![900, 1150, 2000]);
        assert_eq!(
            coordinator.cursor("in1").unwrap().policy(),
            StalenessPolicy::SampleHold
        );
    }

    #[test]
    fn test_values_along_timeline() {
        let mut coordinator = two_inputs(None);
        let mut diffs = Vec::new();
        while let Some(t) = coordinator.next_instant() {
            let a = coordinator.value_at("in1", t).unwrap();
            let b = coordinator.value_at("in2", t).unwrap();
            diffs.push((t, a - b));
        }
        assert_eq!(
            diffs,
            vec![
                (100, -100.0),
                (900, 99.0),
                (1000, 9.0),
                (1150, 8.0),
                (2000, 18.0)
            ]
        );
    }

    #[test]
    fn test_duplicate_input() {
        let mut coordinator = two_inputs(None);
        assert_eq!(
            coordinator.register_input("in1", series(&[]), ChannelClass::Instantaneous),
            Err(EngineError::DuplicateInput("in1".to_string()))
        );
    }

    #[test]
    fn test_sealed_after_timeline_start() {
        let mut coordinator = two_inputs(None);
        assert!(!coordinator.is_sealed());
        coordinator.next_instant();
        assert!(matches!(
            coordinator.register_input("in3", series(&[]), ChannelClass::Instantaneous),
            Err(EngineError::CoordinatorSealed(_))
        ));
    }

    #[test]
    fn test_unknown_input() {
        let mut coordinator = two_inputs(None);
        assert_eq!(
            coordinator.value_at("in9", 100),
            Err(EngineError::UnknownInput("in9".to_string()))
        );
    }

    #[test]
    fn test_earliest_from() {
        let mut coordinator = Coordinator::new(None);
        coordinator
            .register_input("a", series(&[(500, 1.0), (900, 2.0)]), ChannelClass::Instantaneous)
            .unwrap();
        coordinator
            .register_input("b", series(&[(300, 1.0), (700, 2.0)]), ChannelClass::Instantaneous)
            .unwrap();
        assert_eq!(coordinator.earliest_from(), Err(EngineError::NoData));

        coordinator.value_at("a", 1000).unwrap();
        assert_eq!(coordinator.earliest_from().unwrap(), 500);
        coordinator.value_at("b", 1000).unwrap();
        assert_eq!(coordinator.earliest_from().unwrap(), 300);
    }

    #[test]
    fn test_input_names_in_registration_order() {
        let coordinator = two_inputs(None);
        assert_eq!(coordinator.input_names(), &["in1", "in2"]);
        assert_eq!(coordinator.len(), 2);
    }
}
