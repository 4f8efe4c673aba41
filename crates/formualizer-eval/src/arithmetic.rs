//! Epsilon-aware numeric operations and cross-type comparison (`spec.md`
//! §4.8, C8). Every binary operator and every kernel that sorts or compares
//! scalars goes through here so the epsilon rule and the type-rank table
//! are defined exactly once.

use std::cmp::Ordering;

use formualizer_common::{ExcelError, ExcelErrorKind, Value};

/// Relative epsilon used to round near-zero results to zero (`spec.md` §4.8
/// / GLOSSARY "Epsilon rounding"). `ADD(ADD(0.1, 0.2), -0.3) == 0` depends
/// on this constant.
pub const EPS: f64 = 1e-14;

/// Round `x` to `0.0` when it is smaller than `EPS * max(|a|, |b|)`.
fn round_near_zero(x: f64, a: f64, b: f64) -> f64 {
    let scale = a.abs().max(b.abs());
    if scale > 0.0 && x.abs() < EPS * scale {
        0.0
    } else {
        x
    }
}

pub fn add_eps(a: f64, b: f64) -> f64 {
    round_near_zero(a + b, a, b)
}

pub fn subtract(a: f64, b: f64) -> f64 {
    round_near_zero(a - b, a, b)
}

pub fn multiply(a: f64, b: f64) -> f64 {
    a * b
}

pub fn divide(a: f64, b: f64) -> Result<f64, ExcelError> {
    if b == 0.0 {
        Err(ExcelError::div0())
    } else {
        Ok(a / b)
    }
}

pub fn pow(a: f64, b: f64) -> Result<f64, ExcelError> {
    if a < 0.0 && b.fract() != 0.0 {
        return Err(ExcelError::new(ExcelErrorKind::Num));
    }
    let r = a.powf(b);
    if r.is_nan() || r.is_infinite() {
        Err(ExcelError::new(ExcelErrorKind::Num))
    } else {
        Ok(r)
    }
}

pub fn unary_minus(a: f64) -> f64 {
    -a
}

pub fn unary_percent(a: f64) -> f64 {
    a / 100.0
}

/// Epsilon-aware three-way comparison: two numbers are "equal" when
/// `|a-b| <= eps * max(|a|,|b|,1)` (`spec.md` §4.8).
pub fn float_cmp(a: f64, b: f64) -> i32 {
    let scale = a.abs().max(b.abs()).max(1.0);
    if (a - b).abs() <= EPS * scale {
        0
    } else if a < b {
        -1
    } else {
        1
    }
}

pub fn float_eq(a: f64, b: f64) -> bool {
    float_cmp(a, b) == 0
}

/// Ordinal rank used for cross-type comparison (`spec.md` §4.8): `Number <
/// Text < Bool < Error < Empty`.
fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Number(..) => 0,
        Value::Text(_) => 1,
        Value::Bool(_) => 2,
        Value::Error(_) => 3,
        Value::Empty => 4,
    }
}

/// Cross-type ordering for `<`, `>`, sort keys, and `SORT` (`spec.md`
/// §4.8). Case-insensitive text collation is the caller's job via
/// `LocaleContext::collate`; this free function uses a simple ASCII
/// case-insensitive fallback so kernels that don't have a `LocaleContext`
/// handy (e.g. array sort without a live engine) still behave sensibly.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (Value::Number(x, _), Value::Number(y, _)) => match float_cmp(*x, *y) {
            0 => Ordering::Equal,
            n if n < 0 => Ordering::Less,
            _ => Ordering::Greater,
        },
        (Value::Text(x), Value::Text(y)) => {
            x.to_ascii_lowercase().cmp(&y.to_ascii_lowercase())
        }
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Error(x), Value::Error(y)) => {
            (x.kind as u8 as i32).cmp(&(y.kind as u8 as i32))
        }
        (Value::Empty, Value::Empty) => Ordering::Equal,
        _ => Ordering::Equal,
    }
}

/// Equality used by `EQ`/`=` (`spec.md` §4.8, §4.14): number vs text is
/// never equal; string equality is case-insensitive in google-sheets mode.
pub fn values_equal(a: &Value, b: &Value, case_insensitive_text: bool) -> bool {
    match (a, b) {
        (Value::Number(x, _), Value::Number(y, _)) => float_eq(*x, *y),
        (Value::Text(x), Value::Text(y)) => {
            if case_insensitive_text {
                x.to_ascii_lowercase() == y.to_ascii_lowercase()
            } else {
                x == y
            }
        }
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Empty, Value::Empty) => true,
        (Value::Error(x), Value::Error(y)) => x == y,
        // number vs text is never equal, regardless of coercibility.
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn epsilon_rounding_cancels_float_noise() {
        let r = add_eps(add_eps(0.1, 0.2), -0.3);
        assert_eq!(r, 0.0);
    }

    #[test]
    fn cross_type_ordering_ranks_numbers_below_text() {
        assert_eq!(
            compare(&Value::text("text"), &Value::number(1.0)),
            Ordering::Greater
        );
        assert_eq!(
            compare(&Value::number(1.0), &Value::text("text")),
            Ordering::Less
        );
    }

    #[test]
    fn number_vs_text_never_equal() {
        assert!(!values_equal(&Value::number(1.0), &Value::text("1"), true));
    }

    #[test]
    fn locale_aware_equality_is_case_insensitive() {
        assert!(values_equal(&Value::text("HELLO"), &Value::text("hello"), true));
        assert!(!values_equal(&Value::text("HELLO"), &Value::text("hello"), false));
    }

    #[test]
    fn isbetween_epsilon_scenario() {
        let x = add_eps(add_eps(0.1, 0.2), 0.0);
        assert_eq!(float_cmp(x, 0.3), 0);
    }

    proptest::proptest! {
        /// `ADD(ADD(a, b), -(a + b)) == 0` for any pair of floats drawn from a
        /// range where float noise is the only source of nonzero remainder
        /// (`spec.md` §8 item 1).
        #[test]
        fn epsilon_rounding_cancels_for_any_pair(
            a in -1e6_f64..1e6_f64,
            b in -1e6_f64..1e6_f64,
        ) {
            let sum = add_eps(a, b);
            let r = add_eps(sum, -(a + b));
            prop_assert_eq!(r, 0.0);
        }

        /// `float_cmp` is a consistent total preorder: reflexive, and
        /// antisymmetric up to the epsilon band.
        #[test]
        fn float_cmp_is_antisymmetric(a in -1e9_f64..1e9_f64, b in -1e9_f64..1e9_f64) {
            prop_assert_eq!(float_cmp(a, b), -float_cmp(b, a));
        }
    }
}
