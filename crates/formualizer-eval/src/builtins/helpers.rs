//! Shared plumbing for builtin kernels: argument extraction helpers that
//! keep each kernel file focused on its actual algorithm instead of
//! `ArgValue`/`Range` boilerplate.

use formualizer_common::{ArgKind, ArgSpec, ExcelError, ExcelErrorKind, ExcelMessage, Range, Value};

use crate::registry::ArgValue;

pub fn num_spec() -> ArgSpec {
    ArgSpec::new(ArgKind::Number)
}
pub fn int_spec() -> ArgSpec {
    ArgSpec::new(ArgKind::Integer)
}
pub fn range_spec() -> ArgSpec {
    ArgSpec::new(ArgKind::Range)
}
pub fn any_spec() -> ArgSpec {
    ArgSpec::new(ArgKind::Any)
}
pub fn string_spec() -> ArgSpec {
    ArgSpec::new(ArgKind::String)
}
pub fn bool_spec() -> ArgSpec {
    ArgSpec::new(ArgKind::Boolean)
}

pub fn value_err() -> ExcelError {
    ExcelError::new(ExcelErrorKind::Value)
}
pub fn num_err() -> ExcelError {
    ExcelError::new(ExcelErrorKind::Num)
}
pub fn na_err() -> ExcelError {
    ExcelError::na()
}
pub fn value_msg(m: ExcelMessage) -> ExcelError {
    ExcelError::value(m)
}
pub fn num_msg(m: ExcelMessage) -> ExcelError {
    ExcelError::num(m)
}

/// Pull the `Range` out of an already-coerced `ArgKind::Range` argument.
pub fn as_range(a: &ArgValue) -> Range {
    a.as_range()
}

pub fn as_scalar(a: &ArgValue) -> Value {
    a.as_scalar()
}

pub fn as_f64(a: &ArgValue) -> Result<f64, ExcelError> {
    match a.as_scalar() {
        Value::Number(n, _) => Ok(n),
        Value::Bool(b) => Ok(if b { 1.0 } else { 0.0 }),
        Value::Empty => Ok(0.0),
        Value::Text(s) => s.trim().parse::<f64>().map_err(|_| value_err()),
        Value::Error(e) => Err(e),
    }
}

pub fn as_i64(a: &ArgValue) -> Result<i64, ExcelError> {
    as_f64(a).map(|n| n.trunc() as i64)
}

pub fn as_bool(a: &ArgValue) -> Result<bool, ExcelError> {
    match a.as_scalar() {
        Value::Bool(b) => Ok(b),
        Value::Number(n, _) => Ok(n != 0.0),
        Value::Empty => Ok(false),
        Value::Text(s) => match s.to_ascii_uppercase().as_str() {
            "TRUE" => Ok(true),
            "FALSE" => Ok(false),
            _ => Err(value_err()),
        },
        Value::Error(e) => Err(e),
    }
}

pub fn as_string(a: &ArgValue) -> Result<String, ExcelError> {
    match a.as_scalar() {
        Value::Text(s) => Ok(s),
        Value::Number(n, _) => Ok(format_number(n)),
        Value::Bool(b) => Ok(if b { "TRUE" } else { "FALSE" }.to_string()),
        Value::Empty => Ok(String::new()),
        Value::Error(e) => Err(e),
    }
}

/// Row-major numeric scan of a range argument, skipping non-numeric
/// cells — the convention most statistical kernels use (`spec.md` §4.11).
pub fn numbers_of(r: &Range) -> Vec<f64> {
    r.raw_numbers()
}

/// Row-major numeric scan, coercing text/bool too (used by kernels that
/// want every numeric-ish cell, e.g. `SORT`/`SEQUENCE` inputs).
pub fn coerced_numbers_of(r: &Range) -> Vec<f64> {
    r.values_top_left_to_bottom_right()
        .filter_map(|v| match v {
            Value::Number(n, _) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        })
        .collect()
}

pub fn range_to_rows(r: &Range) -> Vec<Vec<Value>> {
    r.raw_data().to_vec()
}

pub fn numbers_to_range(rows: Vec<Vec<f64>>) -> Range {
    Range::only_numbers(rows)
}

pub fn scalar(v: Value) -> Value {
    v
}

/// Mirrors `interpreter::format_number`'s general-number text coercion so
/// kernels that stringify numbers (e.g. `CONCAT`, `DOLLAR` internals) agree
/// with `&`-concatenation.
pub fn format_number(n: f64) -> String {
    if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
