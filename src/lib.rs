// virtchan - Virtual time-series channels
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # virtchan - Virtual time-series channels
//!
//! Derives new time series from irregularly sampled measurement channels.
//!
//! ## Key Features
//!
//! - **Timestamp synchronization**: Merge the timestamps of any number of
//!   ascending streams into one duplicate-free timeline
//! - **Period grouping**: Collapse the timeline to one instant per calendar
//!   period (second to year)
//! - **Rule evaluation**: Evaluate an arithmetic rule (`in1() - in2()`) at
//!   every synchronized instant
//! - **Building blocks**: Battery charge simulation and power limiting
//!
//! ## Quick Start
//!
//! ```rust
//! use virtchan::{ChannelClass, MemorySource, Output, Query, Tuple, VirtualChannel, VirtualDefinition};
//!
//! let source = MemorySource::new()
//!     .with_channel(
//!         "pv",
//!         ChannelClass::Instantaneous,
//!         vec![Tuple::new(0, 0.0), Tuple::new(1000, 500.0), Tuple::new(2000, 700.0)],
//!     )
//!     .with_channel(
//!         "load",
//!         ChannelClass::Instantaneous,
//!         vec![Tuple::new(0, 100.0), Tuple::new(1500, 300.0)],
//!     );
//!
//! let definition = VirtualDefinition::new("in1() - in2()")
//!     .with_input("in1", "pv")
//!     .with_input("in2", "load");
//! let mut channel = VirtualChannel::from_source(&definition, &source, &Query::default())?;
//!
//! let values = channel
//!     .by_ref()
//!     .map(|t| t.map(|t| t.value))
//!     .collect::<virtchan::Result<Vec<_>>>()?;
//! assert_eq!(values, vec![400.0, 200.0, 400.0]);
//! assert_eq!(channel.row_count(), 3);
//! # Ok::<(), virtchan::EngineError>(())
//! ```
//!
//! ## Modules
//!
//! - [`merge`]: Timestamp merging
//! - [`group`]: Calendar period grouping
//! - [`stream`]: Sample streams and sources
//! - [`cursor`]: Per-input value lookup
//! - [`coordinator`]: Shared timeline over named inputs
//! - [`virtual_channel`]: Rule evaluation
//! - [`functions`]: Rule function library
//! - [`blocks`]: Battery and limiter building blocks
//! - [`stats`]: Output statistics

// Modules
pub mod blocks;
pub mod config;
pub mod coordinator;
pub mod cursor;
pub mod error;
pub mod functions;
pub mod group;
pub mod merge;
pub mod reader;
pub mod stats;
pub mod stream;
pub mod tuple;
pub mod virtual_channel;

// Re-exports for convenient access
pub use blocks::{
    Battery, BatterySimulation, BatteryView, Block, BlockOutput, BlockRegistry, Limiter,
    LimiterOutput, Parameters,
};
pub use config::{InputBinding, OutputMode, Query, RangeMode, VirtualDefinition};
pub use coordinator::{Coordinator, Timeline};
pub use cursor::{Resolution, StalenessPolicy, StreamCursor};
pub use error::{EngineError, Result};
pub use group::{GroupBy, PeriodGrouper};
pub use merge::TimestampMerger;
pub use reader::ChannelReader;
pub use stats::{ChannelStats, Output};
pub use stream::{boxed, ChannelClass, MemorySource, SampleSource, SampleStream};
pub use tuple::Tuple;
pub use virtual_channel::VirtualChannel;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
