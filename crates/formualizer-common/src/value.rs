//! Scalar and range value model (`spec.md` §3.1–§3.2, C1).

use std::fmt;

use crate::error::ExcelError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Advisory display tag on a `Number`. Arithmetic always unwraps to the
/// underlying `f64`; constructors that produce a "typed" number (date
/// kernels, `CONVERT`, percent literals) re-tag the result. Two numbers
/// with different subtypes still compare/add/subtract as plain numbers —
/// subtype is metadata for formatting, never semantics, per `spec.md` §3.1.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum NumberSubtype {
    #[default]
    Plain,
    Date,
    DateTime,
    Time,
    Percent,
    Currency,
}

/// A single spreadsheet cell value.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug)]
pub enum Value {
    Number(f64, NumberSubtype),
    Text(String),
    Bool(bool),
    Empty,
    Error(ExcelError),
}

impl Value {
    pub fn number(n: f64) -> Self {
        Value::Number(n, NumberSubtype::Plain)
    }

    pub fn tagged(n: f64, subtype: NumberSubtype) -> Self {
        Value::Number(n, subtype)
    }

    pub fn text<S: Into<String>>(s: S) -> Self {
        Value::Text(s.into())
    }

    pub fn error(e: ExcelError) -> Self {
        Value::Error(e)
    }

    pub fn subtype(&self) -> NumberSubtype {
        match self {
            Value::Number(_, s) => *s,
            _ => NumberSubtype::Plain,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn as_error(&self) -> Option<&ExcelError> {
        match self {
            Value::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// `Empty` behaves as `0` in numeric context and as `""` in text
    /// context, but must stay distinguishable from `Text("")` for
    /// `ISBLANK`/`TYPE` (`spec.md` §4.1).
    pub fn is_blank_distinct_from_empty_string(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Truthiness used by logical functions / `IF` condition coercion.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n, _) => *n != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Empty => false,
            Value::Error(_) => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n, _) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Value::Empty => Ok(()),
            Value::Error(e) => write!(f, "{e}"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a, _), Value::Number(b, _)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Empty, Value::Empty) => true,
            (Value::Error(a), Value::Error(b)) => a == b,
            _ => false,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::number(n)
    }
}
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}
impl From<ExcelError> for Value {
    fn from(e: ExcelError) -> Self {
        Value::Error(e)
    }
}

/// A rectangular `width × height` matrix of scalars (`spec.md` §3.2, C1).
///
/// Invariants upheld by every constructor: `data.len() == height` and every
/// row has exactly `width` cells. `Range` never nests — a cell inside a
/// `Range` is always a scalar `Value`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug)]
pub struct Range {
    data: Vec<Vec<Value>>,
    width: usize,
    height: usize,
}

impl Range {
    /// Build from fully-formed rows, asserting the row-length invariant.
    pub fn only_values(rows: Vec<Vec<Value>>) -> Self {
        let height = rows.len().max(1);
        let width = rows.first().map(|r| r.len()).unwrap_or(1).max(1);
        for row in &rows {
            debug_assert_eq!(row.len(), width, "Range rows must share one width");
        }
        let data = if rows.is_empty() {
            vec![vec![Value::Empty; width]; height]
        } else {
            rows
        };
        Self {
            data,
            width,
            height,
        }
    }

    /// Build from raw numbers, tagging every cell `Plain`.
    pub fn only_numbers(rows: Vec<Vec<f64>>) -> Self {
        Self::only_values(
            rows.into_iter()
                .map(|r| r.into_iter().map(Value::number).collect())
                .collect(),
        )
    }

    /// Promote a scalar to a 1×1 range.
    pub fn from_scalar(v: Value) -> Self {
        Self {
            data: vec![vec![v]],
            width: 1,
            height: 1,
        }
    }

    /// Sentinel 0×0 range standing in for an omitted optional `Range`
    /// argument that carries no default (`spec.md` §4.6 `ArgSpec::optional`).
    /// Unlike every constructor above, this deliberately violates §3.2's
    /// "both ≥ 1" invariant — it never reaches a kernel as a real value,
    /// only as something for `width() * height() == 0` omission checks to
    /// distinguish from a genuinely blank 1×1 cell.
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            width: 0,
            height: 0,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, row: usize, col: usize) -> Value {
        self.data
            .get(row)
            .and_then(|r| r.get(col))
            .cloned()
            .unwrap_or(Value::Empty)
    }

    /// Borrowed row-major view of the raw matrix.
    pub fn raw_data(&self) -> &[Vec<Value>] {
        &self.data
    }

    /// Only the numeric cells (row-major), coercing blanks to `0.0` and
    /// skipping text/bool/error cells — the convention most statistical
    /// kernels use when scanning a range (`spec.md` §4.11).
    pub fn raw_numbers(&self) -> Vec<f64> {
        self.data
            .iter()
            .flat_map(|row| row.iter())
            .filter_map(|v| match v {
                Value::Number(n, _) => Some(*n),
                _ => None,
            })
            .collect()
    }

    pub fn has_only_numbers(&self) -> bool {
        self.data
            .iter()
            .flat_map(|row| row.iter())
            .all(|v| matches!(v, Value::Number(_, _)))
    }

    /// Lazy row-major iterator from top-left to bottom-right.
    pub fn values_top_left_to_bottom_right(&self) -> impl Iterator<Item = &Value> {
        self.data.iter().flat_map(|row| row.iter())
    }

    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.data
    }

    /// `true` if this range is actually a promoted scalar.
    pub fn is_scalar(&self) -> bool {
        self.width == 1 && self.height == 1
    }

    pub fn to_scalar(&self) -> Option<Value> {
        self.is_scalar().then(|| self.get(0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExcelErrorKind;

    #[test]
    fn scalar_promotion_round_trips() {
        let r = Range::from_scalar(Value::number(42.0));
        assert_eq!(r.width(), 1);
        assert_eq!(r.height(), 1);
        assert_eq!(r.to_scalar(), Some(Value::number(42.0)));
    }

    #[test]
    fn empty_is_distinct_from_empty_string() {
        assert!(Value::Empty.is_blank_distinct_from_empty_string());
        assert!(!Value::text("").is_blank_distinct_from_empty_string());
        assert_ne!(Value::Empty, Value::text(""));
    }

    #[test]
    fn raw_numbers_skips_non_numeric_cells() {
        let r = Range::only_values(vec![vec![
            Value::number(1.0),
            Value::text("x"),
            Value::Bool(true),
            Value::Error(ExcelError::new(ExcelErrorKind::Na)),
        ]]);
        assert_eq!(r.raw_numbers(), vec![1.0]);
    }
}
