// virtchan - Virtual time-series channels
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Configuration types for evaluation requests and virtual channels

use crate::group::GroupBy;
use serde::{Deserialize, Serialize};

/// How the sample source selects rows around the requested range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeMode {
    /// Extend the range so the first emitted period covers `from` and the
    /// last one reaches `to` (plotting).
    #[default]
    Chart,
    /// Stay inside the requested range (export).
    Exact,
}

/// How a rule result is accounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Rule yields power-like values; consumption is integrated over time.
    #[default]
    Values,
    /// Rule output is turned into per-period consumption before emission.
    Consumption,
}

/// One evaluation request: time range plus retrieval options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Range start in milliseconds
    pub from: i64,
    /// Range end in milliseconds
    pub to: i64,
    /// Row selection around the range
    #[serde(default)]
    pub mode: RangeMode,
    /// Target number of tuples (rows are packed when exceeded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuple_count: Option<usize>,
    /// Group rows and timestamps per calendar period
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<GroupBy>,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            from: 0,
            to: i64::MAX,
            mode: RangeMode::Chart,
            tuple_count: None,
            group_by: None,
        }
    }
}

impl Query {
    /// Create a query for `[from, to]`
    pub fn new(from: i64, to: i64) -> Self {
        Self {
            from,
            to,
            ..Default::default()
        }
    }

    /// Set the range mode
    pub fn with_mode(mut self, mode: RangeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the target tuple count
    pub fn with_tuple_count(mut self, count: usize) -> Self {
        self.tuple_count = Some(count);
        self
    }

    /// Group by calendar period
    pub fn with_group_by(mut self, group_by: GroupBy) -> Self {
        self.group_by = Some(group_by);
        self
    }

    /// Whether `[from, to]` is empty
    pub fn is_empty(&self) -> bool {
        self.from > self.to
    }
}

/// Input of a virtual channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputBinding {
    /// Input key used inside the rule (`in1`..`inN`)
    pub key: String,
    /// Channel identifier at the sample source
    pub channel: String,
    /// Channel title; whitespace-stripped it becomes an alias of `key`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl InputBinding {
    pub fn new(key: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            channel: channel.into(),
            title: None,
        }
    }

    /// Attach a title alias
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Title with all whitespace removed, usable as rule identifier
    pub fn alias(&self) -> Option<String> {
        self.title
            .as_ref()
            .map(|t| t.chars().filter(|c| !c.is_whitespace()).collect::<String>())
            .filter(|a| !a.is_empty())
    }
}

/// Rule and inputs of a virtual channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualDefinition {
    /// Arithmetic rule, e.g. `in1() - in2()`
    pub rule: String,
    /// Named inputs
    pub inputs: Vec<InputBinding>,
    /// Accounting of the rule output
    #[serde(default)]
    pub output: OutputMode,
}

impl VirtualDefinition {
    pub fn new(rule: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            inputs: Vec::new(),
            output: OutputMode::Values,
        }
    }

    /// Bind `key` to `channel`
    pub fn with_input(mut self, key: impl Into<String>, channel: impl Into<String>) -> Self {
        self.inputs.push(InputBinding::new(key, channel));
        self
    }

    /// Add a fully specified binding
    pub fn with_binding(mut self, binding: InputBinding) -> Self {
        self.inputs.push(binding);
        self
    }

    /// Set the output mode
    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_default() {
        let query = Query::default();
        assert_eq!(query.mode, RangeMode::Chart);
        assert!(query.tuple_count.is_none());
        assert!(query.group_by.is_none());
        assert!(!query.is_empty());
    }

    #[test]
    fn test_query_builder() {
        let query = Query::new(10, 20)
            .with_mode(RangeMode::Exact)
            .with_group_by(GroupBy::Hour)
            .with_tuple_count(100);
        assert_eq!(query.from, 10);
        assert_eq!(query.to, 20);
        assert_eq!(query.mode, RangeMode::Exact);
        assert_eq!(query.group_by, Some(GroupBy::Hour));
        assert_eq!(query.tuple_count, Some(100));
    }

    #[test]
    fn test_query_from_json() {
        let query: Query =
            serde_json::from_str(r#"{"from": 1, "to": 2, "mode": "exact", "group_by": "day"}"#)
                .unwrap();
        assert_eq!(query.mode, RangeMode::Exact);
        assert_eq!(query.group_by, Some(GroupBy::Day));
    }

    #[test]
    fn test_binding_alias_strips_whitespace() {
        let binding = InputBinding::new("in1", "abc").with_title("Heat Pump  Power");
        assert_eq!(binding.alias().as_deref(), Some("HeatPumpPower"));
        assert_eq!(InputBinding::new("in1", "abc").with_title("  ").alias(), None);
    }

    #[test]
    fn test_definition_from_json() {
        let def: VirtualDefinition = serde_json::from_str(
            r#"{"rule": "in1()-in2()", "inputs": [
                {"key": "in1", "channel": "a"},
                {"key": "in2", "channel": "b", "title": "Grid"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(def.inputs.len(), 2);
        assert_eq!(def.output, OutputMode::Values);
        assert_eq!(def.inputs[1].alias().as_deref(), Some("Grid"));
    }
}
