// virtchan - Virtual time-series channels
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Rule-based virtual channels
//!
//! A [`VirtualChannel`] evaluates one arithmetic rule per synchronized
//! instant of its [`Coordinator`]. Inside the rule, each input is available
//! as a zero-argument function (`in1()`, or its whitespace-free title) and as
//! a string constant naming the input (`val(in1)`, `from(in1)`).
//!
//! Instant-dependent functions:
//!
//! | function      | result                                         |
//! |---------------|------------------------------------------------|
//! | `val(key)`    | value of input `key` at the current instant    |
//! | `ts()`        | current instant                                |
//! | `prev()`      | previous instant                               |
//! | `from(key)`   | first timestamp consumed from input `key`      |
//! | `to(key)`     | last timestamp consumed from input `key`       |
//! | `cons(value)` | `value * (ts - prev) / 3.6e6`                  |
//!
//! The static library is described in [`crate::functions`].

use crate::config::{OutputMode, Query, VirtualDefinition};
use crate::coordinator::Coordinator;
use crate::error::{EngineError, Result};
use crate::functions::{self, arguments};
use crate::stats::{ChannelStats, Output};
use crate::stream::SampleSource;
use crate::tuple::{Tuple, MS_PER_HOUR};
use evalexpr::{
    build_operator_tree, ContextWithMutableFunctions, ContextWithMutableVariables, EvalexprError,
    EvalexprResult, Function, HashMapContext, Node, Value,
};
use std::collections::HashMap;
use std::sync::Arc;

const NO_PREVIOUS: &str = "no previous instant";
const UNKNOWN_INPUT: &str = "unknown input: ";
const NO_DATA: &str = "no data for input: ";

/// Functions bound per instant
const INSTANT_FUNCTIONS: &[&str] = &["val", "ts", "prev", "from", "to", "cons"];

/// Input keys and aliases must not shadow a rule function
fn check_name(name: &str) -> Result<()> {
    if INSTANT_FUNCTIONS.contains(&name) || functions::LIBRARY.contains(&name) {
        return Err(EngineError::Config(format!(
            "input name '{}' collides with a rule function",
            name
        )));
    }
    Ok(())
}

/// Input keys and title aliases of one rule
struct Bindings {
    /// Input keys in definition order
    keys: Vec<String>,
    /// Identifier (key or alias) to key
    names: HashMap<String, String>,
}

impl Bindings {
    fn key(&self, name: &str) -> EvalexprResult<&str> {
        self.names
            .get(name)
            .map(|k| k.as_str())
            .ok_or_else(|| EvalexprError::CustomMessage(format!("{}{}", UNKNOWN_INPUT, name)))
    }

    /// Key named by a function argument, defaulting to the first input
    fn key_argument(&self, argument: &Value) -> EvalexprResult<&str> {
        match arguments(argument).as_slice() {
            [] => self
                .keys
                .first()
                .map(|k| k.as_str())
                .ok_or_else(|| EvalexprError::CustomMessage(format!("{}in1", UNKNOWN_INPUT))),
            [Value::String(name)] => self.key(name),
            [other] => Err(EvalexprError::expected_string(other.clone())),
            args => Err(EvalexprError::CustomMessage(format!(
                "input selector expects 1 argument, got {}",
                args.len()
            ))),
        }
    }
}

/// Input state at one instant
struct Frame {
    bindings: Arc<Bindings>,
    ts: i64,
    prev: Option<i64>,
    values: HashMap<String, f64>,
    from: HashMap<String, i64>,
    to: HashMap<String, i64>,
}

impl Frame {
    fn value(&self, key: &str) -> EvalexprResult<Value> {
        self.values
            .get(key)
            .map(|v| Value::Float(*v))
            .ok_or_else(|| EvalexprError::CustomMessage(format!("{}{}", UNKNOWN_INPUT, key)))
    }

    fn timestamp(&self, map: &HashMap<String, i64>, key: &str) -> EvalexprResult<Value> {
        map.get(key)
            .map(|ts| Value::Int(*ts))
            .ok_or_else(|| EvalexprError::CustomMessage(format!("{}{}", NO_DATA, key)))
    }

    fn prev(&self) -> EvalexprResult<i64> {
        self.prev
            .ok_or_else(|| EvalexprError::CustomMessage(NO_PREVIOUS.to_string()))
    }
}

/// Translate an evaluation failure into an engine error
fn rule_error(err: EvalexprError) -> EngineError {
    match &err {
        EvalexprError::CustomMessage(msg) if msg == NO_PREVIOUS => EngineError::NoPreviousInstant,
        EvalexprError::CustomMessage(msg) if msg.starts_with(UNKNOWN_INPUT) => {
            EngineError::UnknownInput(msg[UNKNOWN_INPUT.len()..].to_string())
        }
        EvalexprError::CustomMessage(msg) if msg.starts_with(NO_DATA) => EngineError::NoData,
        _ => EngineError::InvalidRule(err.to_string()),
    }
}

/// Virtual channel evaluating a rule over coordinated inputs
pub struct VirtualChannel {
    coordinator: Coordinator,
    rule: Node,
    context: HashMapContext,
    bindings: Arc<Bindings>,
    output: OutputMode,
    stats: ChannelStats,
    last_ts: Option<i64>,
    done: bool,
}

impl VirtualChannel {
    /// Create a channel over an already populated coordinator
    ///
    /// Every input of `definition` must be registered in `coordinator`, and
    /// every coordinator input must be bound by `definition`. Without inputs
    /// in the definition, the coordinator's inputs are used under their
    /// registered names.
    pub fn new(definition: &VirtualDefinition, coordinator: Coordinator) -> Result<Self> {
        let rule = build_operator_tree(&definition.rule)
            .map_err(|e| EngineError::InvalidRule(format!("{}: {}", definition.rule, e)))?;

        let mut keys = Vec::new();
        let mut names = HashMap::new();
        if definition.inputs.is_empty() {
            for name in coordinator.input_names() {
                check_name(name)?;
                keys.push(name.clone());
                names.insert(name.clone(), name.clone());
            }
        } else {
            for binding in &definition.inputs {
                if coordinator.cursor(&binding.key).is_none() {
                    return Err(EngineError::UnknownInput(binding.key.clone()));
                }
                check_name(&binding.key)?;
                keys.push(binding.key.clone());
                names.insert(binding.key.clone(), binding.key.clone());
                if let Some(alias) = binding.alias() {
                    check_name(&alias)?;
                    names.entry(alias).or_insert_with(|| binding.key.clone());
                }
            }
            // an unread cursor would buffer its whole stream
            let unbound = coordinator.input_names().iter().find(|n| !keys.contains(*n));
            if let Some(unbound) = unbound {
                return Err(EngineError::Config(format!(
                    "coordinator input '{}' is not bound by the rule",
                    unbound
                )));
            }
        }

        let mut context = HashMapContext::new();
        functions::install(&mut context).map_err(rule_error)?;
        for (name, key) in &names {
            context
                .set_value(name.clone(), Value::String(key.clone()))
                .map_err(rule_error)?;
        }

        Ok(Self {
            coordinator,
            rule,
            context,
            bindings: Arc::new(Bindings { keys, names }),
            output: definition.output,
            stats: ChannelStats::with_mode(definition.output),
            last_ts: None,
            done: false,
        })
    }

    /// Open every input of `definition` at `source` and create the channel
    pub fn from_source(
        definition: &VirtualDefinition,
        source: &dyn SampleSource,
        query: &Query,
    ) -> Result<Self> {
        let mut coordinator = Coordinator::new(query.group_by);
        for binding in &definition.inputs {
            coordinator.register_channel(binding.key.as_str(), source, &binding.channel, query)?;
        }
        Self::new(definition, coordinator)
    }

    /// Rule output mode
    pub fn output_mode(&self) -> OutputMode {
        self.output
    }

    /// Input keys in definition order
    pub fn input_keys(&self) -> &[String] {
        &self.bindings.keys
    }

    /// Evaluate the rule at instant `t` without emitting
    ///
    /// `prev()` and `cons()` refer to the last emitted instant and fail
    /// with `NoPreviousInstant` before the first one.
    pub fn evaluate_at(&mut self, t: i64) -> Result<f64> {
        let frame = self.sample(t)?;
        self.bind(frame).map_err(rule_error)?;

        match self.rule.eval_with_context(&self.context).map_err(rule_error)? {
            Value::Float(v) => Ok(v),
            Value::Int(v) => Ok(v as f64),
            other => Err(EngineError::NonNumericRuleResult(other.to_string())),
        }
    }

    /// Resolve every input at `t`
    fn sample(&mut self, t: i64) -> Result<Frame> {
        let mut values = HashMap::with_capacity(self.bindings.keys.len());
        let mut from = HashMap::new();
        let mut to = HashMap::new();

        for key in &self.bindings.keys {
            values.insert(key.clone(), self.coordinator.value_at(key, t)?);
            if let Some(cursor) = self.coordinator.cursor(key) {
                if let Ok(ts) = cursor.from() {
                    from.insert(key.clone(), ts);
                }
                if let Ok(ts) = cursor.to() {
                    to.insert(key.clone(), ts);
                }
            }
        }

        Ok(Frame {
            bindings: Arc::clone(&self.bindings),
            ts: t,
            prev: self.last_ts,
            values,
            from,
            to,
        })
    }

    /// Install the instant-dependent functions for `frame`
    fn bind(&mut self, frame: Frame) -> EvalexprResult<()> {
        let frame = Arc::new(frame);

        let f = Arc::clone(&frame);
        self.context.set_function(
            "val".to_string(),
            Function::new(move |argument| f.value(f.bindings.key_argument(argument)?)),
        )?;

        let f = Arc::clone(&frame);
        self.context
            .set_function("ts".to_string(), Function::new(move |_| Ok(Value::Int(f.ts))))?;

        let f = Arc::clone(&frame);
        self.context.set_function(
            "prev".to_string(),
            Function::new(move |_| Ok(Value::Int(f.prev()?))),
        )?;

        let f = Arc::clone(&frame);
        self.context.set_function(
            "from".to_string(),
            Function::new(move |argument| f.timestamp(&f.from, f.bindings.key_argument(argument)?)),
        )?;

        let f = Arc::clone(&frame);
        self.context.set_function(
            "to".to_string(),
            Function::new(move |argument| f.timestamp(&f.to, f.bindings.key_argument(argument)?)),
        )?;

        let f = Arc::clone(&frame);
        self.context.set_function(
            "cons".to_string(),
            Function::new(move |argument| {
                let value = match arguments(argument).as_slice() {
                    [value] => value.as_number()?,
                    args => {
                        return Err(EvalexprError::CustomMessage(format!(
                            "cons expects 1 argument, got {}",
                            args.len()
                        )))
                    }
                };
                let period = f.ts - f.prev()?;
                Ok(Value::Float(value * period as f64 / MS_PER_HOUR))
            }),
        )?;

        for (name, key) in &frame.bindings.names {
            let f = Arc::clone(&frame);
            let key = key.clone();
            self.context.set_function(
                name.clone(),
                Function::new(move |_| f.value(&key)),
            )?;
        }

        Ok(())
    }

    fn step(&mut self) -> Result<Option<Tuple>> {
        loop {
            let Some(t) = self.coordinator.next_instant() else {
                return Ok(None);
            };

            let Some(prev) = self.last_ts else {
                // the first instant only positions the cursors
                self.sample(t)?;
                let from = self.coordinator.earliest_from()?;
                self.stats.seed(from);
                self.last_ts = Some(t);
                continue;
            };

            let mut value = self.evaluate_at(t)?;
            let period = t - prev;
            match self.output {
                OutputMode::Values => {
                    self.stats
                        .add_consumption(value * period as f64 / MS_PER_HOUR);
                }
                OutputMode::Consumption => {
                    value *= period as f64 / MS_PER_HOUR;
                    self.stats.add_consumption(value);
                }
            }

            let tuple = Tuple::new(t, value);
            self.stats.record(&tuple);
            self.last_ts = Some(t);
            return Ok(Some(tuple));
        }
    }
}

impl Iterator for VirtualChannel {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Result<Tuple>> {
        if self.done {
            return None;
        }

        match self.step() {
            Ok(Some(tuple)) => Some(Ok(tuple)),
            Ok(None) => {
                self.done = true;
                if let Some(last) = self.last_ts {
                    self.stats.finish(last);
                }
                log::debug!(
                    "virtual channel finished: {} rows, consumption {:.3}",
                    self.stats.row_count,
                    self.stats.consumption
                );
                None
            }
            Err(err) => {
                self.done = true;
                log::debug!("virtual channel failed: {}", err);
                Some(Err(err))
            }
        }
    }
}

impl Output for VirtualChannel {
    fn stats(&self) -> &ChannelStats {
        &self.stats
    }
}
