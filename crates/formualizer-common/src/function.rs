//! Function-descriptor vocabulary shared by the parser (for arity checks
//! during parsing, where applicable) and the evaluator's `FunctionRegistry`
//! (`spec.md` §4.6).

use crate::value::Value;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The coercion target an `ArgSpec` slot expects.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ArgKind {
    Number,
    Integer,
    Boolean,
    String,
    Scalar,
    /// Must not itself be an `Error` scalar (used by a handful of kernels
    /// that otherwise accept `Any`, e.g. the second argument of `IFERROR`).
    NoError,
    Range,
    Any,
}

/// A numeric display tag applied to a function's return value (`spec.md`
/// §4.6 `return_number_type`). Mirrors `NumberSubtype` in `value.rs` but is
/// kept as a separate, smaller type because a descriptor only ever needs to
/// say "this function returns a date" — not participate in arithmetic.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum NumberType {
    #[default]
    Plain,
    Date,
    DateTime,
    Time,
    Percent,
    Currency,
}

/// One parameter slot in a function's signature.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug)]
pub struct ArgSpec {
    pub argument_type: ArgKind,
    pub optional: bool,
    pub default: Option<Value>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub greater_than: Option<f64>,
    pub less_than: Option<f64>,
    /// Whether the scalar subtype tag (date/percent/…) should be preserved
    /// through this argument rather than stripped during coercion.
    pub pass_subtype: bool,
}

impl ArgSpec {
    pub fn new(argument_type: ArgKind) -> Self {
        Self {
            argument_type,
            optional: false,
            default: None,
            min: None,
            max: None,
            greater_than: None,
            less_than: None,
            pass_subtype: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_default(mut self, v: Value) -> Self {
        self.optional = true;
        self.default = Some(v);
        self
    }

    pub fn min(mut self, v: f64) -> Self {
        self.min = Some(v);
        self
    }
    pub fn max(mut self, v: f64) -> Self {
        self.max = Some(v);
        self
    }
    pub fn greater_than(mut self, v: f64) -> Self {
        self.greater_than = Some(v);
        self
    }
    pub fn less_than(mut self, v: f64) -> Self {
        self.less_than = Some(v);
        self
    }
    pub fn pass_subtype(mut self) -> Self {
        self.pass_subtype = true;
        self
    }
}
