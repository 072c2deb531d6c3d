// virtchan-testdata - Test series generator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # virtchan-testdata
//!
//! Irregularly sampled energy series for virtchan tests and benchmarks.
//!
//! - **Signal patterns**: Solar and household load shapes, steps, random walks
//! - **Irregular sampling**: Jittered timestamps and random dropouts
//! - **Meters**: Cumulative channels integrating a power pattern
//! - **Scenarios**: Complete household days (`pv`, `load`, `meter`)
//!
//! ## Quick Start
//!
//! ```rust
//! use virtchan_testdata::{Household, HouseholdScenario};
//!
//! let source = Household::new(HouseholdScenario::SunnyDay).source(42);
//! assert_eq!(source.len(), 3);
//! ```

pub mod generator;
pub mod patterns;
pub mod scenario;

// Re-exports for convenience
pub use generator::{generate_series, generate_source, GeneratorConfig, SeriesConfig};
pub use patterns::{Pattern, PatternState};
pub use scenario::{Household, HouseholdScenario, LOAD, METER, PV};
