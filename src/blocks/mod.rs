// virtchan - Virtual time-series channels
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Building blocks
//!
//! A building block is a composite virtual channel with named output views
//! (e.g. `battery` exposes `charge`, `discharge`, `net` and `level`).
//! Blocks are defined per request in a [`BlockRegistry`]; an output is
//! addressed by the block name immediately followed by the view name, e.g.
//! `homebatterylevel` for view `level` of block `homebattery`.
//!
//! ```json
//! {
//!     "homebattery": { "type": "battery", "charge": "pv", "discharge": "load", "capacity": 7.5 },
//!     "gridcap": { "type": "limiter", "input": "grid", "cutoff": 4200 }
//! }
//! ```

pub mod battery;
pub mod limiter;

pub use battery::{Battery, BatterySimulation, BatteryState, BatteryStep, BatteryView};
pub use limiter::{Limiter, LimiterOutput};

use crate::config::Query;
use crate::error::{EngineError, Result};
use crate::stats::{ChannelStats, Output};
use crate::stream::SampleSource;
use crate::tuple::Tuple;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Parameters of one block definition
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Parameters {
    block: String,
    values: Map<String, Value>,
}

impl Parameters {
    pub fn new(block: impl Into<String>) -> Self {
        Self {
            block: block.into(),
            values: Map::new(),
        }
    }

    /// Parameters from a JSON object
    pub fn from_value(block: impl Into<String>, value: Value) -> Result<Self> {
        let block = block.into();
        match value {
            Value::Object(values) => Ok(Self { block, values }),
            other => Err(EngineError::Config(format!(
                "definition of {} must be an object, got {}",
                block, other
            ))),
        }
    }

    /// Parameters from JSON text
    pub fn from_json(block: impl Into<String>, json: &str) -> Result<Self> {
        Self::from_value(block, serde_json::from_str(json)?)
    }

    /// Builder-style setter
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    /// Name of the block these parameters belong to
    pub fn block(&self) -> &str {
        &self.block
    }

    pub fn has(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Fail with `MissingParameter` on the first absent name
    pub fn require(&self, names: &[&str]) -> Result<()> {
        match names.iter().find(|name| !self.has(name)) {
            Some(name) => Err(EngineError::missing(&self.block, name)),
            None => Ok(()),
        }
    }

    /// Required string parameter
    pub fn string(&self, name: &str) -> Result<&str> {
        match self.values.get(name) {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(EngineError::invalid(
                &self.block,
                name,
                format!("expected string, got {}", other),
            )),
            None => Err(EngineError::missing(&self.block, name)),
        }
    }

    /// Required numeric parameter; numeric strings are accepted
    pub fn number(&self, name: &str) -> Result<f64> {
        self.optional_number(name)?
            .ok_or_else(|| EngineError::missing(&self.block, name))
    }

    pub fn number_or(&self, name: &str, default: f64) -> Result<f64> {
        Ok(self.optional_number(name)?.unwrap_or(default))
    }

    /// Optional numeric parameter; `null` counts as absent
    pub fn optional_number(&self, name: &str) -> Result<Option<f64>> {
        match self.values.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| EngineError::invalid(&self.block, name, "not representable")),
            Some(Value::String(s)) => s.trim().parse::<f64>().map(Some).map_err(|_| {
                EngineError::invalid(&self.block, name, format!("not a number: {}", s))
            }),
            Some(other) => Err(EngineError::invalid(
                &self.block,
                name,
                format!("expected number, got {}", other),
            )),
        }
    }
}

/// Known block kinds
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Battery(Battery),
    Limiter(Limiter),
}

impl Block {
    /// Build a block from its definition
    ///
    /// The kind is taken from `type`, or from the block name if `type` is
    /// absent.
    pub fn from_parameters(params: &Parameters) -> Result<Self> {
        let kind = match params.get("type") {
            Some(_) => params.string("type")?,
            None => params.block(),
        };

        match kind.to_ascii_lowercase().as_str() {
            "battery" => Ok(Block::Battery(Battery::from_parameters(params)?)),
            "limiter" => Ok(Block::Limiter(Limiter::from_parameters(params)?)),
            other => Err(EngineError::invalid(
                params.block(),
                "type",
                format!("unknown block type {}", other),
            )),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Block::Battery(b) => &b.name,
            Block::Limiter(l) => &l.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Block::Battery(_) => "battery",
            Block::Limiter(_) => "limiter",
        }
    }

    /// Output view names
    pub fn outputs(&self) -> Vec<&'static str> {
        match self {
            Block::Battery(_) => BatteryView::ALL.iter().map(|v| v.as_str()).collect(),
            Block::Limiter(_) => vec![limiter::OUTPUT],
        }
    }

    /// Open output view `output`
    pub fn open(
        &self,
        output: &str,
        source: &dyn SampleSource,
        query: &Query,
    ) -> Result<BlockOutput> {
        let unknown = || EngineError::UnknownOutput {
            block: self.name().to_string(),
            output: output.to_string(),
        };

        match self {
            Block::Battery(battery) => {
                let view = output.parse::<BatteryView>().map_err(|_| unknown())?;
                Ok(BlockOutput::Battery(battery.simulate(view, source, query)?))
            }
            Block::Limiter(cap) if output == limiter::OUTPUT => {
                Ok(BlockOutput::Limiter(cap.open(source, query)?))
            }
            Block::Limiter(_) => Err(unknown()),
        }
    }
}

/// Output sequence of one block view
pub enum BlockOutput {
    Battery(BatterySimulation),
    Limiter(LimiterOutput),
}

impl Iterator for BlockOutput {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Result<Tuple>> {
        match self {
            BlockOutput::Battery(sim) => sim.next(),
            BlockOutput::Limiter(limiter) => limiter.next(),
        }
    }
}

impl Output for BlockOutput {
    fn stats(&self) -> &ChannelStats {
        match self {
            BlockOutput::Battery(sim) => sim.stats(),
            BlockOutput::Limiter(limiter) => limiter.stats(),
        }
    }
}

/// Request-scoped registry of block definitions
#[derive(Debug, Clone, Default)]
pub struct BlockRegistry {
    blocks: BTreeMap<String, Block>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry from a JSON map of block name to definition
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(json)?)
    }

    /// Registry from an already parsed definition map
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(definitions) = value else {
            return Err(EngineError::Config(
                "block definitions must be an object".to_string(),
            ));
        };
        let mut registry = Self::new();
        for (name, definition) in definitions {
            let params = Parameters::from_value(name.as_str(), definition)?;
            registry.define(Block::from_parameters(&params)?)?;
        }
        Ok(registry)
    }

    /// Add a block under its name
    pub fn define(&mut self, block: Block) -> Result<()> {
        let name = block.name().to_string();
        if self.blocks.contains_key(&name) {
            return Err(EngineError::DuplicateBlock(name));
        }
        log::debug!("defined {} block {}", block.kind(), name);
        self.blocks.insert(name, block);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Block> {
        self.blocks.get(name)
    }

    /// Block names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.blocks.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Split `<name><view>` into its block and view
    ///
    /// The longest block name that prefixes `channel` wins.
    pub fn resolve<'a>(&self, channel: &'a str) -> Result<(&Block, &'a str)> {
        let (name, block) = self
            .blocks
            .iter()
            .filter(|(name, _)| channel.starts_with(name.as_str()))
            .max_by_key(|(name, _)| name.len())
            .ok_or_else(|| EngineError::UnknownBlock(channel.to_string()))?;

        let output = &channel[name.len()..];
        if block.outputs().contains(&output) {
            Ok((block, output))
        } else {
            Err(EngineError::UnknownOutput {
                block: name.clone(),
                output: output.to_string(),
            })
        }
    }

    /// Open the block output addressed by `channel`
    pub fn open(
        &self,
        channel: &str,
        source: &dyn SampleSource,
        query: &Query,
    ) -> Result<BlockOutput> {
        let (block, output) = self.resolve(channel)?;
        block.open(output, source, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{ChannelClass, MemorySource};

    const DEVICES: &str = r#"{
        "home": {"type": "battery", "charge": "pv", "discharge": "load", "capacity": 1},
        "homecap": {"type": "limiter", "input": "load", "cutoff": 250},
        "limiter": {"input": "pv", "cutoff": 100}
    }"#;

    fn source() -> MemorySource {
        MemorySource::new()
            .with_channel(
                "pv",
                ChannelClass::Instantaneous,
                (0..5).map(|i| Tuple::new(i * 1000, 500.0)),
            )
            .with_channel(
                "load",
                ChannelClass::Instantaneous,
                (0..5).map(|i| Tuple::new(i * 1000, 200.0 + i as f64 * 50.0)),
            )
    }

    #[test]
    fn test_registry_from_json() {
        let registry = BlockRegistry::from_json(DEVICES).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get("home").unwrap().kind(), "battery");
        // type defaults to the block name
        assert_eq!(registry.get("limiter").unwrap().kind(), "limiter");
    }

    #[test]
    fn test_resolve_longest_prefix() {
        let registry = BlockRegistry::from_json(DEVICES).unwrap();

        let (block, output) = registry.resolve("homelevel").unwrap();
        assert_eq!(block.name(), "home");
        assert_eq!(output, "level");

        let (block, output) = registry.resolve("homecapoutput").unwrap();
        assert_eq!(block.name(), "homecap");
        assert_eq!(output, "output");
    }

    #[test]
    fn test_resolve_errors() {
        let registry = BlockRegistry::from_json(DEVICES).unwrap();
        assert_eq!(
            registry.resolve("garagelevel").unwrap_err(),
            EngineError::UnknownBlock("garagelevel".to_string())
        );
        assert_eq!(
            registry.resolve("homevoltage").unwrap_err(),
            EngineError::UnknownOutput {
                block: "home".to_string(),
                output: "voltage".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_block() {
        let mut registry = BlockRegistry::new();
        registry
            .define(Block::Limiter(Limiter::new("cap", "a", 1.0)))
            .unwrap();
        assert_eq!(
            registry.define(Block::Limiter(Limiter::new("cap", "b", 2.0))),
            Err(EngineError::DuplicateBlock("cap".to_string()))
        );
    }

    #[test]
    fn test_unknown_type() {
        let params = Parameters::new("x").with("type", "inverter");
        assert!(matches!(
            Block::from_parameters(&params),
            Err(EngineError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_missing_parameter_from_json() {
        let err = BlockRegistry::from_json(r#"{"b": {"type": "battery", "charge": "pv"}}"#)
            .unwrap_err();
        assert_eq!(err, EngineError::missing("b", "discharge"));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            BlockRegistry::from_json("{"),
            Err(EngineError::Config(_))
        ));
        assert!(matches!(
            BlockRegistry::from_json(r#"{"b": 5}"#),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_open_outputs() {
        let registry = BlockRegistry::from_json(DEVICES).unwrap();
        let source = source();

        let charge: Vec<Tuple> = registry
            .open("homecharge", &source, &Query::default())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(charge.len(), 5);
        assert_eq!(charge[0].value, 0.0);
        assert_eq!(charge[1].value, 250.0);

        let mut capped = registry
            .open("homecapoutput", &source, &Query::default())
            .unwrap();
        let values: Vec<f64> = capped.by_ref().map(|t| t.unwrap().value).collect();
        assert_eq!(values, vec![250.0, 250.0, 250.0, 250.0]);
        assert_eq!(capped.row_count(), 4);
    }

    #[test]
    fn test_parameter_accessors() {
        let params = Parameters::new("p")
            .with("a", 1.5)
            .with("b", "2.5")
            .with("c", "abc")
            .with("d", true);
        assert_eq!(params.number("a").unwrap(), 1.5);
        assert_eq!(params.number("b").unwrap(), 2.5);
        assert!(matches!(
            params.number("c"),
            Err(EngineError::InvalidParameter { .. })
        ));
        assert!(params.number("d").is_err());
        assert_eq!(params.number_or("z", 7.0).unwrap(), 7.0);
        assert_eq!(params.optional_number("z").unwrap(), None);
        assert!(params.string("a").is_err());
        assert_eq!(params.string("c").unwrap(), "abc");
    }
}
