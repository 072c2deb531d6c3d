// virtchan - Virtual time-series channels
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Stream cursors
//!
//! A [`StreamCursor`] answers "what was this channel's value at instant T"
//! over a forward-only [`SampleStream`]. Queries must be non-decreasing in
//! T; the cursor never rewinds.
//!
//! Inside a [`Coordinator`](crate::coordinator::Coordinator) the same stream
//! also feeds the shared timeline. Both readers pull through one [`Feed`]
//! that buffers only the tuples the slower reader has not reached yet.

use crate::error::{EngineError, Result};
use crate::stream::{ChannelClass, SampleStream};
use crate::tuple::Tuple;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// How a cursor resolves a value at an instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalenessPolicy {
    /// Last tuple at or before T
    SampleHold,
    /// Chosen from the channel class: cumulative channels match the
    /// period boundary at or after T, instantaneous channels sample-hold
    #[default]
    ByChannelClass,
}

/// Resolution rule after applying the channel class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Last tuple at or before T, 0 before the first tuple
    Hold,
    /// First tuple at or after T, holding the last tuple once exhausted
    Boundary,
}

impl StalenessPolicy {
    /// Resolution rule for a channel of class `class`
    pub fn resolve(&self, class: ChannelClass) -> Resolution {
        match (self, class) {
            (StalenessPolicy::ByChannelClass, ChannelClass::Cumulative) => Resolution::Boundary,
            _ => Resolution::Hold,
        }
    }
}

/// Buffered single-consumption stream shared by a cursor and a timestamp tap
pub(crate) struct Feed {
    stream: SampleStream,
    buffer: VecDeque<Tuple>,
    /// Absolute index of `buffer[0]`
    offset: usize,
    last_ts: Option<i64>,
    exhausted: bool,
    tap_pos: usize,
    cursor_pos: usize,
    tapped: bool,
}

impl Feed {
    fn new(stream: SampleStream, tapped: bool) -> Self {
        Self {
            stream,
            buffer: VecDeque::new(),
            offset: 0,
            last_ts: None,
            exhausted: false,
            tap_pos: 0,
            cursor_pos: 0,
            tapped,
        }
    }

    /// Tuple at absolute index `index`, pulling from the stream as needed
    fn fetch(&mut self, index: usize) -> Option<Tuple> {
        while !self.exhausted && self.offset + self.buffer.len() <= index {
            match self.stream.next() {
                Some(tuple) => {
                    if let Some(last) = self.last_ts {
                        if tuple.timestamp <= last {
                            log::warn!(
                                "stream not ascending: {} after {}, tuple dropped",
                                tuple.timestamp,
                                last
                            );
                            continue;
                        }
                    }
                    self.last_ts = Some(tuple.timestamp);
                    self.buffer.push_back(tuple);
                }
                None => self.exhausted = true,
            }
        }
        index
            .checked_sub(self.offset)
            .and_then(|i| self.buffer.get(i))
            .copied()
    }

    /// Drop tuples both readers have passed
    fn compact(&mut self) {
        let low = if self.tapped {
            self.tap_pos.min(self.cursor_pos)
        } else {
            self.cursor_pos
        };
        while self.offset < low && self.buffer.pop_front().is_some() {
            self.offset += 1;
        }
    }

    #[cfg(test)]
    fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Timestamps of a shared feed, in stream order
pub(crate) struct FeedTimestamps {
    feed: Rc<RefCell<Feed>>,
}

impl Iterator for FeedTimestamps {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        let mut feed = self.feed.borrow_mut();
        let index = feed.tap_pos;
        let tuple = feed.fetch(index)?;
        feed.tap_pos += 1;
        feed.compact();
        Some(tuple.timestamp)
    }
}

/// Stateful reader answering value-at-instant queries over one stream
pub struct StreamCursor {
    feed: Rc<RefCell<Feed>>,
    policy: StalenessPolicy,
    class: ChannelClass,
    current: Option<Tuple>,
    previous: Option<Tuple>,
    first: Option<i64>,
    last_query: Option<i64>,
}

impl StreamCursor {
    /// Create a standalone cursor
    pub fn new(stream: SampleStream, policy: StalenessPolicy, class: ChannelClass) -> Self {
        Self::with_feed(Rc::new(RefCell::new(Feed::new(stream, false))), policy, class)
    }

    /// Create a cursor plus a tap over the timestamps of the same stream
    pub(crate) fn tapped(
        stream: SampleStream,
        policy: StalenessPolicy,
        class: ChannelClass,
    ) -> (Self, FeedTimestamps) {
        let feed = Rc::new(RefCell::new(Feed::new(stream, true)));
        let tap = FeedTimestamps {
            feed: Rc::clone(&feed),
        };
        (Self::with_feed(feed, policy, class), tap)
    }

    fn with_feed(feed: Rc<RefCell<Feed>>, policy: StalenessPolicy, class: ChannelClass) -> Self {
        Self {
            feed,
            policy,
            class,
            current: None,
            previous: None,
            first: None,
            last_query: None,
        }
    }

    pub fn policy(&self) -> StalenessPolicy {
        self.policy
    }

    pub fn class(&self) -> ChannelClass {
        self.class
    }

    /// Effective resolution rule
    pub fn resolution(&self) -> Resolution {
        self.policy.resolve(self.class)
    }

    /// Most recently consumed tuple
    pub fn current(&self) -> Option<Tuple> {
        self.current
    }

    /// Tuple consumed before `current`
    pub fn previous(&self) -> Option<Tuple> {
        self.previous
    }

    /// Value of the channel at instant `t`
    ///
    /// Before any tuple is reached the value is 0.
    pub fn value_at(&mut self, t: i64) -> Result<f64> {
        if let Some(last) = self.last_query {
            if t < last {
                return Err(EngineError::OutOfOrderQuery { requested: t, last });
            }
        }
        self.last_query = Some(t);

        match self.resolution() {
            Resolution::Hold => {
                while self.peek().map_or(false, |next| next.timestamp <= t) {
                    self.consume();
                }
            }
            Resolution::Boundary => {
                while self.current.map_or(true, |c| c.timestamp < t) {
                    if self.peek().is_none() {
                        break;
                    }
                    self.consume();
                }
            }
        }

        Ok(self.current.map_or(0.0, |c| c.value))
    }

    /// First consumed timestamp
    pub fn from(&self) -> Result<i64> {
        self.first.ok_or(EngineError::NoData)
    }

    /// Last consumed timestamp
    pub fn to(&self) -> Result<i64> {
        self.current.map(|c| c.timestamp).ok_or(EngineError::NoData)
    }

    fn peek(&self) -> Option<Tuple> {
        let mut feed = self.feed.borrow_mut();
        let index = feed.cursor_pos;
        feed.fetch(index)
    }

    fn consume(&mut self) {
        let next = {
            let mut feed = self.feed.borrow_mut();
            let index = feed.cursor_pos;
            let next = feed.fetch(index);
            if next.is_some() {
                feed.cursor_pos += 1;
                feed.compact();
            }
            next
        };

        if let Some(tuple) = next {
            self.previous = self.current.replace(tuple);
            self.first.get_or_insert(tuple.timestamp);
        }
    }
}

impl std::fmt::Debug for StreamCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCursor")
            .field("policy", &self.policy)
            .field("class", &self.class)
            .field("current", &self.current)
            .field("first", &self.first)
            .field("last_query", &self.last_query)
            .finish()
    }
}
