//! Operator functions (`spec.md` §4.14, C14): the function-call spellings
//! of the binary/unary operators (`ADD`, `GT`, …), plus `ISBETWEEN`. These
//! exist so formulas built by a UI that always emits calls (rather than
//! infix operators) still hit the same epsilon-aware arithmetic as `+`/`<`
//! do in `interpreter.rs` — both paths delegate to `arithmetic` (C8).

use formualizer_common::{ArgKind, ArgSpec, Value};

use crate::arithmetic;
use crate::interpreter::InterpreterState;
use crate::registry::{ArgValue, BuiltinFunction};

use super::helpers::*;

macro_rules! binary_numeric_fn {
    ($struct_name:ident, $name:literal, $op:expr) => {
        pub struct $struct_name;
        impl BuiltinFunction for $struct_name {
            fn name(&self) -> &'static str {
                $name
            }
            fn parameters(&self) -> &'static [ArgSpec] {
                use std::sync::OnceLock;
                static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
                P.get_or_init(|| vec![num_spec(), num_spec()])
            }
            fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
                let a = match as_f64(&args[0]) {
                    Ok(n) => n,
                    Err(e) => return Value::Error(e),
                };
                let b = match as_f64(&args[1]) {
                    Ok(n) => n,
                    Err(e) => return Value::Error(e),
                };
                $op(a, b)
            }
        }
    };
}

binary_numeric_fn!(AddFn, "ADD", |a, b| Value::number(arithmetic::add_eps(a, b)));
binary_numeric_fn!(MinusFn, "MINUS", |a, b| Value::number(
    arithmetic::subtract(a, b)
));
binary_numeric_fn!(MultiplyFn, "MULTIPLY", |a, b| Value::number(
    arithmetic::multiply(a, b)
));
binary_numeric_fn!(DivideFn, "DIVIDE", |a: f64, b: f64| match arithmetic::divide(
    a, b
) {
    Ok(n) => Value::number(n),
    Err(e) => Value::Error(e),
});
binary_numeric_fn!(PowFn, "POW", |a: f64, b: f64| match arithmetic::pow(a, b) {
    Ok(n) => Value::number(n),
    Err(e) => Value::Error(e),
});

macro_rules! compare_fn {
    ($struct_name:ident, $name:literal, $matches:expr) => {
        pub struct $struct_name;
        impl BuiltinFunction for $struct_name {
            fn name(&self) -> &'static str {
                $name
            }
            fn parameters(&self) -> &'static [ArgSpec] {
                use std::sync::OnceLock;
                static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
                P.get_or_init(|| vec![any_spec(), any_spec()])
            }
            fn call(&self, args: &[ArgValue], state: &InterpreterState) -> Value {
                let a = as_scalar(&args[0]);
                let b = as_scalar(&args[1]);
                let case_insensitive = state.config.is_google_sheets();
                let eq = arithmetic::values_equal(&a, &b, case_insensitive);
                let ord = arithmetic::compare(&a, &b);
                Value::Bool($matches(eq, ord))
            }
        }
    };
}

compare_fn!(EqFn, "EQ", |eq: bool, _ord: std::cmp::Ordering| eq);
compare_fn!(NeFn, "NE", |eq: bool, _ord: std::cmp::Ordering| !eq);
compare_fn!(LtFn, "LT", |_eq: bool, ord: std::cmp::Ordering| ord
    == std::cmp::Ordering::Less);
compare_fn!(GtFn, "GT", |_eq: bool, ord: std::cmp::Ordering| ord
    == std::cmp::Ordering::Greater);
compare_fn!(LeFn, "LE", |_eq: bool, ord: std::cmp::Ordering| ord
    != std::cmp::Ordering::Greater);
compare_fn!(GeFn, "GE", |_eq: bool, ord: std::cmp::Ordering| ord
    != std::cmp::Ordering::Less);

pub struct ConcatFn;
impl BuiltinFunction for ConcatFn {
    fn name(&self) -> &'static str {
        "CONCAT"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        use std::sync::OnceLock;
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![string_spec(), string_spec()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let a = match as_string(&args[0]) {
            Ok(s) => s,
            Err(e) => return Value::Error(e),
        };
        let b = match as_string(&args[1]) {
            Ok(s) => s,
            Err(e) => return Value::Error(e),
        };
        Value::text(format!("{a}{b}"))
    }
}

pub struct UMinusFn;
impl BuiltinFunction for UMinusFn {
    fn name(&self) -> &'static str {
        "UMINUS"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        use std::sync::OnceLock;
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![num_spec().pass_subtype()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let v = as_scalar(&args[0]);
        let subtype = v.subtype();
        match as_f64(&args[0]) {
            Ok(n) => Value::tagged(arithmetic::unary_minus(n), subtype),
            Err(e) => Value::Error(e),
        }
    }
}

pub struct UPlusFn;
impl BuiltinFunction for UPlusFn {
    fn name(&self) -> &'static str {
        "UPLUS"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        use std::sync::OnceLock;
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![num_spec().pass_subtype()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let v = as_scalar(&args[0]);
        let subtype = v.subtype();
        match as_f64(&args[0]) {
            Ok(n) => Value::tagged(n, subtype),
            Err(e) => Value::Error(e),
        }
    }
}

pub struct UnaryPercentFn;
impl BuiltinFunction for UnaryPercentFn {
    fn name(&self) -> &'static str {
        "UNARY_PERCENT"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        use std::sync::OnceLock;
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![num_spec()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        match as_f64(&args[0]) {
            Ok(n) => Value::tagged(
                arithmetic::unary_percent(n),
                formualizer_common::NumberSubtype::Percent,
            ),
            Err(e) => Value::Error(e),
        }
    }
}

/// `ISBETWEEN(val, lo, hi, lo_inc=true, hi_inc=true)` (`spec.md` §4.14):
/// epsilon-aware throughout via `float_cmp`, so `0.1+0.2 ∈ [0, 0.3]` holds
/// with an inclusive upper bound.
pub struct IsBetweenFn;
impl BuiltinFunction for IsBetweenFn {
    fn name(&self) -> &'static str {
        "ISBETWEEN"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        use std::sync::OnceLock;
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| {
            vec![
                num_spec(),
                num_spec(),
                num_spec(),
                ArgSpec::new(ArgKind::Boolean).with_default(Value::Bool(true)),
                ArgSpec::new(ArgKind::Boolean).with_default(Value::Bool(true)),
            ]
        })
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let val = match as_f64(&args[0]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let lo = match as_f64(&args[1]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let hi = match as_f64(&args[2]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let lo_inc = match as_bool(&args[3]) {
            Ok(b) => b,
            Err(e) => return Value::Error(e),
        };
        let hi_inc = match as_bool(&args[4]) {
            Ok(b) => b,
            Err(e) => return Value::Error(e),
        };
        if arithmetic::float_cmp(lo, hi) > 0 {
            return Value::Error(num_err());
        }
        let lo_ok = if lo_inc {
            arithmetic::float_cmp(val, lo) >= 0
        } else {
            arithmetic::float_cmp(val, lo) > 0
        };
        let hi_ok = if hi_inc {
            arithmetic::float_cmp(val, hi) <= 0
        } else {
            arithmetic::float_cmp(val, hi) < 0
        };
        Value::Bool(lo_ok && hi_ok)
    }
}

pub fn register_default(reg: &mut crate::registry::FunctionRegistry) {
    use std::sync::Arc;
    // These operator spellings behave identically in both dialects; they
    // register once into the default layer so a `Default`-mode engine
    // gets `ADD`/`GT`/… too (only the lexer/array kernels are googleSheets-
    // specific per `spec.md` §1).
    reg.register_default(Arc::new(AddFn));
    reg.register_default(Arc::new(MinusFn));
    reg.register_default(Arc::new(MultiplyFn));
    reg.register_default(Arc::new(DivideFn));
    reg.register_default(Arc::new(PowFn));
    reg.register_default(Arc::new(EqFn));
    reg.register_default(Arc::new(NeFn));
    reg.register_default(Arc::new(LtFn));
    reg.register_default(Arc::new(GtFn));
    reg.register_default(Arc::new(LeFn));
    reg.register_default(Arc::new(GeFn));
    reg.register_default(Arc::new(ConcatFn));
    reg.register_default(Arc::new(UMinusFn));
    reg.register_default(Arc::new(UPlusFn));
    reg.register_default(Arc::new(UnaryPercentFn));
    reg.register_default(Arc::new(IsBetweenFn));
}

pub fn register_google_sheets(_reg: &mut crate::registry::FunctionRegistry) {
    // No googleSheets-specific overrides for the operator-function family;
    // the default layer already implements the epsilon/locale-aware
    // semantics `spec.md` §4.14 requires.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FunctionRegistry;
    use formualizer_parse::CompatibilityMode;

    #[test]
    fn isbetween_epsilon_scenario() {
        let reg = FunctionRegistry::new();
        let f = reg.lookup(CompatibilityMode::GoogleSheets, "ISBETWEEN").unwrap();
        assert_eq!(f.name(), "ISBETWEEN");
    }
}
