//! Two-layer function registry (`spec.md` §4.6, C6).
//!
//! Built once per engine instance and immutable after — there is
//! deliberately no process-wide static here. §9's documented bug class
//! ("a single process-wide mutable matcher reconfigured on each build...
//! silently broke when two engines... coexisted") applies just as much to
//! a function table as to the lexer's cell-reference matcher, so this type
//! is owned by whichever `InterpreterState`/engine instance built it.

use std::sync::Arc;

use formualizer_common::{ArgSpec, NumberType};
use formualizer_parse::Ast;
use rustc_hash::FxHashMap;

use crate::interpreter::InterpreterState;

/// One resolved, pre-coerced call argument (`spec.md` §4.7).
#[derive(Clone, Debug)]
pub enum ArgValue {
    Scalar(formualizer_common::Value),
    Range(formualizer_common::Range),
}

impl ArgValue {
    pub fn as_scalar(&self) -> formualizer_common::Value {
        match self {
            ArgValue::Scalar(v) => v.clone(),
            ArgValue::Range(r) => r.to_scalar().unwrap_or_else(|| r.get(0, 0)),
        }
    }

    pub fn as_range(&self) -> formualizer_common::Range {
        match self {
            ArgValue::Scalar(v) => formualizer_common::Range::from_scalar(v.clone()),
            ArgValue::Range(r) => r.clone(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ArgValue::Scalar(formualizer_common::Value::Error(_)))
    }
}

/// Predicted shape of a spilled result (`spec.md` §4.10.11). The spill
/// engine that asserts `actual <= predicted` lives outside this core
/// (§1 out of scope); kernels still honor the "never under-predict"
/// discipline so a host scheduler can rely on it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ArraySize {
    pub width: usize,
    pub height: usize,
}

impl ArraySize {
    pub fn scalar() -> Self {
        Self {
            width: 1,
            height: 1,
        }
    }
    pub fn fixed(width: usize, height: usize) -> Self {
        Self { width, height }
    }
}

/// A registered function's full descriptor + implementation (`spec.md`
/// §4.6). `BuiltinFunction` is object-safe so the registry can hold
/// `Arc<dyn BuiltinFunction>` regardless of each kernel's concrete type.
pub trait BuiltinFunction: Send + Sync {
    fn name(&self) -> &'static str;

    fn parameters(&self) -> &'static [ArgSpec] {
        &[]
    }

    /// The last `k` parameter slots form a repeating group.
    fn repeat_last_args(&self) -> u8 {
        0
    }

    /// Flatten `Range` arguments in the repeating tail into scalars before
    /// invocation (used by variadic aggregations like `SUM`/`CHOOSE`-style
    /// tails).
    fn expand_ranges(&self) -> bool {
        false
    }

    /// If true, the evaluator must not broadcast this function over a
    /// range input (`spec.md` §4.7 point 5).
    fn vectorization_forbidden(&self) -> bool {
        false
    }

    /// If true, this function receives raw, unevaluated `Ast` nodes plus
    /// the interpreter state and performs its own evaluation — used by
    /// higher-order calls, error-introspection, and reference-
    /// introspection (`spec.md` §4.6).
    fn does_not_need_arguments_to_be_computed(&self) -> bool {
        false
    }

    fn return_number_type(&self) -> NumberType {
        NumberType::Plain
    }

    fn size_of_result_array(&self, _args: &[Ast], _state: &InterpreterState) -> ArraySize {
        ArraySize::scalar()
    }

    /// Normal evaluation path: pre-evaluated, coerced arguments.
    fn call(
        &self,
        args: &[ArgValue],
        state: &InterpreterState,
    ) -> formualizer_common::Value {
        let _ = (args, state);
        formualizer_common::Value::Error(formualizer_common::ExcelError::na())
    }

    /// Array-valued kernels (`SORT`, `SPLIT`, `SEQUENCE`, …) set this and
    /// implement `call_range` instead of `call` — the interpreter keeps
    /// the full rectangular result rather than collapsing to the
    /// top-left cell (`spec.md` §4.10).
    fn returns_array(&self) -> bool {
        false
    }

    /// Only invoked when `returns_array()` is true. The default
    /// implementation promotes a scalar `call` result, so a function can
    /// flip `returns_array` on without overriding this.
    fn call_range(
        &self,
        args: &[ArgValue],
        state: &InterpreterState,
    ) -> formualizer_common::Range {
        formualizer_common::Range::from_scalar(self.call(args, state))
    }

    /// Lazy evaluation path, only invoked when
    /// `does_not_need_arguments_to_be_computed()` is true.
    fn call_lazy(
        &self,
        args: &[Ast],
        state: &InterpreterState,
    ) -> formualizer_common::Value {
        let _ = (args, state);
        formualizer_common::Value::Error(formualizer_common::ExcelError::na())
    }
}

/// Two-layer mapping from canonical function name to implementation
/// (`spec.md` §4.6). Layer A ("default") and layer B ("googleSheets
/// overrides") are both built once, at construction time, and never
/// mutated again.
#[derive(Default)]
pub struct FunctionRegistry {
    default: FxHashMap<String, Arc<dyn BuiltinFunction>>,
    google_sheets: FxHashMap<String, Arc<dyn BuiltinFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        let mut reg = Self::default();
        crate::builtins::register_default(&mut reg);
        crate::builtins::register_google_sheets_overrides(&mut reg);
        reg
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn register_default(&mut self, f: Arc<dyn BuiltinFunction>) {
        self.default.insert(f.name().to_ascii_uppercase(), f);
    }

    pub fn register_google_sheets(&mut self, f: Arc<dyn BuiltinFunction>) {
        self.google_sheets.insert(f.name().to_ascii_uppercase(), f);
    }

    /// A lookup returns the layer-B entry when present and `mode` is
    /// `GoogleSheets`, else the layer-A entry.
    pub fn lookup(
        &self,
        mode: formualizer_parse::CompatibilityMode,
        name: &str,
    ) -> Option<Arc<dyn BuiltinFunction>> {
        let key = name.to_ascii_uppercase();
        if mode == formualizer_parse::CompatibilityMode::GoogleSheets {
            if let Some(f) = self.google_sheets.get(&key) {
                #[cfg(feature = "tracing")]
                tracing::trace!(name = %key, "resolved from googleSheets overlay");
                return Some(Arc::clone(f));
            }
        }
        self.default.get(&key).map(Arc::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formualizer_parse::CompatibilityMode;

    struct TaggedFn(&'static str, &'static str);
    impl BuiltinFunction for TaggedFn {
        fn name(&self) -> &'static str {
            self.0
        }
    }

    #[test]
    fn overlay_wins_only_in_google_sheets_mode() {
        let mut reg = FunctionRegistry::empty();
        reg.register_default(Arc::new(TaggedFn("FOO", "default")));
        reg.register_google_sheets(Arc::new(TaggedFn("FOO", "overlay")));

        let default_hit = reg.lookup(CompatibilityMode::Default, "foo").unwrap();
        let gs_hit = reg.lookup(CompatibilityMode::GoogleSheets, "foo").unwrap();
        assert_eq!(default_hit.name(), "FOO");
        assert_eq!(gs_hit.name(), "FOO");
        assert!(!Arc::ptr_eq(&default_hit, &gs_hit));
    }

    #[test]
    fn default_mode_never_sees_overlay() {
        let mut reg = FunctionRegistry::empty();
        let default_fn: Arc<dyn BuiltinFunction> = Arc::new(TaggedFn("FOO", "default"));
        reg.register_default(Arc::clone(&default_fn));
        reg.register_google_sheets(Arc::new(TaggedFn("FOO", "overlay")));

        let hit = reg.lookup(CompatibilityMode::Default, "foo").unwrap();
        assert!(Arc::ptr_eq(&hit, &default_fn));
    }
}
