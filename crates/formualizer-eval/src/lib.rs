//! Google-Sheets compatibility core: function registry, evaluator, and
//! function kernels for a formula engine (`spec.md` §1).
//!
//! This crate is deliberately narrow: it owns lexical/parsing-adjacent
//! semantics that only make sense once a formula is being *evaluated*
//! (dispatch, arithmetic, criteria, array/financial/statistical/text
//! kernels). Dependency graphs, recalculation scheduling, and workbook
//! storage are a host engine's job (`spec.md` §1, Non-goals).

pub mod arithmetic;
pub mod builtins;
pub mod criterion;
pub mod interpreter;
pub mod registry;
pub mod traits;

/// The handful of types a host engine needs to evaluate a formula against
/// its own sheet storage (`spec.md` §6.4).
pub mod prelude {
    pub use crate::interpreter::InterpreterState;
    pub use crate::registry::{ArgValue, ArraySize, BuiltinFunction, FunctionRegistry};
    pub use crate::traits::{
        Basis, DateTimeHelper, GregorianDateTimeHelper, LocaleContext, SheetView, SimpleDate,
    };
    pub use formualizer_common::{ExcelError, ExcelErrorKind, Range, Value};
    pub use formualizer_parse::{Ast, CompatibilityMode, Config};
}
