// virtchan - Virtual time-series channels
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Static function library available to virtual channel rules
//!
//! Math functions follow the usual floating point semantics (`sqrt(-1)` is
//! NaN, not an error). Date functions take millisecond timestamps and
//! evaluate in UTC.

use chrono::{DateTime, Datelike, Timelike, Utc};
use evalexpr::{
    ContextWithMutableFunctions, EvalexprError, EvalexprResult, Function, HashMapContext, Value,
};

/// Names of all library functions
pub const LIBRARY: &[&str] = &[
    "abs", "acos", "acosh", "asin", "asinh", "atan", "atan2", "atanh", "ceil", "cos", "cosh",
    "deg2rad", "exp", "expm1", "floor", "fmod", "hypot", "intdiv", "is_finite", "is_infinite",
    "is_nan", "log", "log10", "log1p", "max", "min", "pi", "pow", "rad2deg", "round", "sin",
    "sinh", "sqrt", "tan", "tanh", "sgn", "avg", "if", "ifnull", "year", "month", "day", "hour",
    "minutes", "seconds",
];

/// Flatten call arguments into a list of values
pub(crate) fn arguments(argument: &Value) -> Vec<Value> {
    match argument {
        Value::Tuple(values) => values.clone(),
        Value::Empty => Vec::new(),
        other => vec![other.clone()],
    }
}

fn arity_error(name: &str, expected: &str, actual: usize) -> EvalexprError {
    EvalexprError::CustomMessage(format!(
        "{} expects {} argument(s), got {}",
        name, expected, actual
    ))
}

/// Numeric value, booleans count as 0/1
fn number(value: &Value) -> EvalexprResult<f64> {
    match value {
        Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        other => other.as_number(),
    }
}

fn numbers(name: &str, argument: &Value, min: usize, max: usize) -> EvalexprResult<Vec<f64>> {
    let args = arguments(argument);
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else if max == usize::MAX {
            format!("at least {}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(arity_error(name, &expected, args.len()));
    }
    args.iter().map(number).collect()
}

fn truthy(value: &Value) -> EvalexprResult<bool> {
    match value {
        Value::Boolean(b) => Ok(*b),
        Value::Empty => Ok(false),
        other => Ok(other.as_number()? != 0.0),
    }
}

fn unary(name: &'static str, f: fn(f64) -> f64) -> Function {
    Function::new(move |argument| {
        let args = numbers(name, argument, 1, 1)?;
        Ok(Value::Float(f(args[0])))
    })
}

fn binary(name: &'static str, f: fn(f64, f64) -> f64) -> Function {
    Function::new(move |argument| {
        let args = numbers(name, argument, 2, 2)?;
        Ok(Value::Float(f(args[0], args[1])))
    })
}

fn predicate(name: &'static str, f: fn(f64) -> bool) -> Function {
    Function::new(move |argument| {
        let args = numbers(name, argument, 1, 1)?;
        Ok(Value::Boolean(f(args[0])))
    })
}

fn variadic(name: &'static str, f: fn(&[f64]) -> f64) -> Function {
    Function::new(move |argument| {
        let args = numbers(name, argument, 1, usize::MAX)?;
        Ok(Value::Float(f(&args)))
    })
}

fn date_part(name: &'static str, f: fn(&DateTime<Utc>) -> u32) -> Function {
    Function::new(move |argument| {
        let args = numbers(name, argument, 1, 1)?;
        let dt = DateTime::<Utc>::from_timestamp_millis(args[0] as i64).ok_or_else(|| {
            EvalexprError::CustomMessage(format!("{}: timestamp {} out of range", name, args[0]))
        })?;
        Ok(Value::Int(f(&dt) as i64))
    })
}

fn signum(x: f64) -> f64 {
    if x == 0.0 {
        0.0
    } else if x > 0.0 {
        1.0
    } else {
        -1.0
    }
}

fn round_to(name: &'static str) -> Function {
    Function::new(move |argument| {
        let args = numbers(name, argument, 1, 2)?;
        let precision = args.get(1).copied().unwrap_or(0.0) as i32;
        let scale = 10f64.powi(precision);
        Ok(Value::Float((args[0] * scale).round() / scale))
    })
}

fn logarithm() -> Function {
    Function::new(|argument| {
        let args = numbers("log", argument, 1, 2)?;
        Ok(Value::Float(match args.get(1) {
            Some(base) => args[0].ln() / base.ln(),
            None => args[0].ln(),
        }))
    })
}

fn integer_division() -> Function {
    Function::new(|argument| {
        let args = numbers("intdiv", argument, 2, 2)?;
        let (dividend, divisor) = (args[0] as i64, args[1] as i64);
        if divisor == 0 {
            return Err(EvalexprError::CustomMessage(
                "intdiv: division by zero".to_string(),
            ));
        }
        Ok(Value::Int(dividend.wrapping_div(divisor)))
    })
}

fn if_function() -> Function {
    Function::new(|argument| {
        let args = arguments(argument);
        match args.as_slice() {
            [condition, then] => Ok(if truthy(condition)? {
                then.clone()
            } else {
                Value::Int(0)
            }),
            [condition, then, otherwise] => Ok(if truthy(condition)? {
                then.clone()
            } else {
                otherwise.clone()
            }),
            _ => Err(arity_error("if", "2 to 3", args.len())),
        }
    })
}

fn ifnull_function() -> Function {
    Function::new(|argument| {
        let args = arguments(argument);
        match args.as_slice() {
            [value, fallback] => {
                let empty = match value {
                    Value::Empty => true,
                    Value::Float(f) => f.is_nan() || *f == 0.0,
                    other => !truthy(other)?,
                };
                Ok(if empty { fallback.clone() } else { value.clone() })
            }
            _ => Err(arity_error("ifnull", "2", args.len())),
        }
    })
}

/// Register the library in `context`
pub fn install(context: &mut HashMapContext) -> EvalexprResult<()> {
    let functions: Vec<(&str, Function)> = vec![
        ("abs", unary("abs", f64::abs)),
        ("acos", unary("acos", f64::acos)),
        ("acosh", unary("acosh", f64::acosh)),
        ("asin", unary("asin", f64::asin)),
        ("asinh", unary("asinh", f64::asinh)),
        ("atan", unary("atan", f64::atan)),
        ("atan2", binary("atan2", f64::atan2)),
        ("atanh", unary("atanh", f64::atanh)),
        ("ceil", unary("ceil", f64::ceil)),
        ("cos", unary("cos", f64::cos)),
        ("cosh", unary("cosh", f64::cosh)),
        ("deg2rad", unary("deg2rad", f64::to_radians)),
        ("exp", unary("exp", f64::exp)),
        ("expm1", unary("expm1", f64::exp_m1)),
        ("floor", unary("floor", f64::floor)),
        ("fmod", binary("fmod", |a, b| a % b)),
        ("hypot", binary("hypot", f64::hypot)),
        ("intdiv", integer_division()),
        ("is_finite", predicate("is_finite", f64::is_finite)),
        ("is_infinite", predicate("is_infinite", f64::is_infinite)),
        ("is_nan", predicate("is_nan", f64::is_nan)),
        ("log", logarithm()),
        ("log10", unary("log10", f64::log10)),
        ("log1p", unary("log1p", f64::ln_1p)),
        ("max", variadic("max", |v| v.iter().copied().fold(f64::NEG_INFINITY, f64::max))),
        ("min", variadic("min", |v| v.iter().copied().fold(f64::INFINITY, f64::min))),
        (
            "pi",
            Function::new(|argument| {
                numbers("pi", argument, 0, 0)?;
                Ok(Value::Float(std::f64::consts::PI))
            }),
        ),
        ("pow", binary("pow", f64::powf)),
        ("rad2deg", unary("rad2deg", f64::to_degrees)),
        ("round", round_to("round")),
        ("sin", unary("sin", f64::sin)),
        ("sinh", unary("sinh", f64::sinh)),
        ("sqrt", unary("sqrt", f64::sqrt)),
        ("tan", unary("tan", f64::tan)),
        ("tanh", unary("tanh", f64::tanh)),
        ("sgn", unary("sgn", signum)),
        ("avg", variadic("avg", |v| v.iter().sum::<f64>() / v.len() as f64)),
        ("if", if_function()),
        ("ifnull", ifnull_function()),
        ("year", date_part("year", |dt| dt.year() as u32)),
        ("month", date_part("month", |dt| dt.month())),
        ("day", date_part("day", |dt| dt.day())),
        ("hour", date_part("hour", |dt| dt.hour())),
        ("minutes", date_part("minutes", |dt| dt.minute())),
        ("seconds", date_part("seconds", |dt| dt.second())),
    ];

    for (name, function) in functions {
        context.set_function(name.to_string(), function)?;
    }
    Ok(())
}
