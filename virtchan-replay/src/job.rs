// virtchan-replay - Job definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Job definitions and execution.
//!
//! A job names exactly one thing to evaluate: either a virtual channel
//!
//! ```json
//! { "virtual": { "rule": "in1() - in2()", "inputs": [
//!     { "key": "in1", "channel": "pv" }, { "key": "in2", "channel": "load" } ] } }
//! ```
//!
//! or one output of a building block
//!
//! ```json
//! { "blocks": { "home": { "type": "battery", "charge": "pv", "discharge": "load", "capacity": 7.5 } },
//!   "output": "homelevel" }
//! ```
//!
//! Optional keys: `query` (range and retrieval options) and `classes`
//! (channel name to `cumulative` / `instantaneous`).

use crate::error::ReplayError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;
use virtchan::{
    BlockRegistry, ChannelClass, Output, Query, SampleSource, Tuple, VirtualChannel,
    VirtualDefinition,
};

/// Job file contents.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Job {
    #[serde(default)]
    pub query: Option<Query>,
    #[serde(default)]
    pub classes: HashMap<String, ChannelClass>,
    #[serde(default, rename = "virtual")]
    pub virtual_channel: Option<VirtualDefinition>,
    #[serde(default)]
    pub blocks: Option<serde_json::Value>,
    /// Block output to evaluate, e.g. `homelevel`
    #[serde(default)]
    pub output: Option<String>,
}

/// Summary statistics of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<i64>,
    pub rows: u64,
    /// Wh
    pub consumption: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<Tuple>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<Tuple>,
}

/// Output tuples plus summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub channel: String,
    pub tuples: Vec<Tuple>,
    pub summary: Summary,
}

impl Job {
    /// Load a job file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ReplayError::FileNotFound(path.display().to_string()));
        }
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Parse a job from JSON text.
    pub fn from_json(json: &str) -> Result<Self, ReplayError> {
        let job: Job = serde_json::from_str(json)?;
        job.validate()?;
        Ok(job)
    }

    fn validate(&self) -> Result<(), ReplayError> {
        match (&self.virtual_channel, &self.blocks, &self.output) {
            (Some(_), None, None) => Ok(()),
            (None, Some(_), Some(_)) => Ok(()),
            (None, Some(_), None) => Err(ReplayError::InvalidJob(
                "'blocks' requires an 'output'".to_string(),
            )),
            (None, None, _) => Err(ReplayError::InvalidJob(
                "one of 'virtual' or 'blocks' is required".to_string(),
            )),
            (Some(_), _, _) => Err(ReplayError::InvalidJob(
                "'virtual' cannot be combined with 'blocks'".to_string(),
            )),
        }
    }

    /// Evaluate the job against `source`.
    pub fn run(&self, source: &dyn SampleSource, query: &Query) -> Result<Report, ReplayError> {
        if let Some(definition) = &self.virtual_channel {
            info!("Evaluating rule {}", definition.rule);
            let channel = VirtualChannel::from_source(definition, source, query)?;
            return collect(definition.rule.clone(), channel);
        }

        let (Some(blocks), Some(output)) = (&self.blocks, &self.output) else {
            return Err(ReplayError::InvalidJob("nothing to evaluate".to_string()));
        };
        let registry = BlockRegistry::from_value(blocks.clone())?;
        info!("Evaluating {} ({} blocks defined)", output, registry.len());
        let channel = registry.open(output, source, query)?;
        collect(output.clone(), channel)
    }
}

/// Drain an output sequence into a report.
fn collect<O: Output>(channel: String, mut output: O) -> Result<Report, ReplayError> {
    let tuples = output.by_ref().collect::<virtchan::Result<Vec<_>>>()?;
    let summary = Summary {
        from: output.from().ok(),
        to: output.to().ok(),
        rows: output.row_count(),
        consumption: output.consumption(),
        average: output.average().ok(),
        min: output.min_tuple(),
        max: output.max_tuple(),
    };
    Ok(Report {
        channel,
        tuples,
        summary,
    })
}
