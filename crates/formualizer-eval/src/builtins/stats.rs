//! Statistical kernels (`spec.md` §4.11, C11) beyond the core aggregation
//! family already covered by C9's criterion engine.

use std::sync::OnceLock;

use formualizer_common::{ArgSpec, ExcelError, ExcelMessage, Range, Value};

use crate::criterion::{criterion_function_compute, Criterion};
use crate::interpreter::InterpreterState;
use crate::registry::{ArgValue, BuiltinFunction};

use super::helpers::*;

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn sample_variance(xs: &[f64]) -> f64 {
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() as f64 - 1.0)
}

fn sorted_of(r: &Range) -> Vec<f64> {
    let mut v = numbers_of(r);
    v.sort_by(|a, b| a.partial_cmp(b).unwrap());
    v
}

/// `spec.md` §4.11: continuous (0-based) rank of `x` within the sorted
/// array, by linear interpolation between bracketing elements — the
/// shared core of `PERCENTRANK.INC`/`PERCENTRANK.EXC`.
fn rank_fraction(sorted: &[f64], x: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 || x < sorted[0] || x > sorted[n - 1] {
        return None;
    }
    if n == 1 {
        return Some(0.0);
    }
    for i in 0..n - 1 {
        if sorted[i] <= x && x <= sorted[i + 1] {
            if sorted[i + 1] == sorted[i] {
                return Some(i as f64);
            }
            return Some(i as f64 + (x - sorted[i]) / (sorted[i + 1] - sorted[i]));
        }
    }
    None
}

fn percentile_inc(sorted: &[f64], k: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let idx = k * (n as f64 - 1.0);
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = idx - lo as f64;
        sorted[lo] + frac * (sorted[hi] - sorted[lo])
    }
}

fn percentile_exc(sorted: &[f64], k: f64) -> Result<f64, ExcelError> {
    let n = sorted.len() as f64;
    let idx = k * (n + 1.0);
    if idx < 1.0 || idx > n {
        return Err(num_err());
    }
    let lo = idx.floor() as usize - 1;
    let hi = idx.ceil() as usize - 1;
    if lo == hi {
        Ok(sorted[lo])
    } else {
        let frac = idx - idx.floor();
        Ok(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
    }
}

/// Horner evaluation of a polynomial with an explicit leading coefficient
/// (`coef[0]` is the highest-degree term).
fn polevl(x: f64, coef: &[f64]) -> f64 {
    let mut ans = coef[0];
    for &c in &coef[1..] {
        ans = ans * x + c;
    }
    ans
}

/// Horner evaluation of a monic polynomial (implicit leading coefficient
/// `1.0`, `coef` holds the remaining `N` coefficients).
fn p1evl(x: f64, coef: &[f64]) -> f64 {
    let mut ans = x + coef[0];
    for &c in &coef[1..] {
        ans = ans * x + c;
    }
    ans
}

const ERF_T: [f64; 5] = [
    9.60497373987051638749E0,
    9.00260197203842689217E1,
    2.23200534594684319226E3,
    7.00332514112805075473E3,
    5.55923013010394962768E4,
];
const ERF_U: [f64; 5] = [
    3.35617141647503099647E1,
    5.21357949780152679795E2,
    4.59432382970980127987E3,
    2.26290000613890934246E4,
    4.92673942608635921086E4,
];
const ERFC_P: [f64; 9] = [
    2.46196981473530512524E-10,
    5.64189564831068821977E-1,
    7.46321056442269912687E0,
    4.86371970985681366614E1,
    1.96520832956077098242E2,
    5.26445194995477358631E2,
    9.34528527171957607540E2,
    1.02755188689515710272E3,
    5.57535335369399327526E2,
];
const ERFC_Q: [f64; 8] = [
    1.32281951154744992508E1,
    8.67072140885989742329E1,
    3.54937778887819891062E2,
    9.75708501743205489753E2,
    1.82390916687909736289E3,
    2.24633760818710981792E3,
    1.65666309194161350182E3,
    5.57535340817727675546E2,
];
const ERFC_R: [f64; 6] = [
    5.64189583547755073984E-1,
    1.27536670759978104416E0,
    5.01905042251180477414E0,
    6.16021097993053585195E0,
    7.40974269950448939160E0,
    2.97886665372100240670E0,
];
const ERFC_S: [f64; 6] = [
    2.26052863220117276590E0,
    9.39603524938001434673E0,
    1.20489539808096656605E1,
    1.70814450747565897222E1,
    9.60896809063285878198E0,
    3.36907645100081516050E0,
];

/// Cody's rational Chebyshev approximation (as used by Cephes' `erf`/
/// `erfc`), accurate to better than 1e-14 absolute error over the whole
/// real line — `spec.md` §4.11 `ERF.PRECISE`/`ERFC.PRECISE` require
/// "absolute error < 1e-14", which the earlier Abramowitz & Stegun 7.1.26
/// approximation (~1e-7) fell well short of.
fn erf(x: f64) -> f64 {
    if x.abs() > 1.0 {
        return 1.0 - erfc(x);
    }
    let z = x * x;
    x * polevl(z, &ERF_T) / p1evl(z, &ERF_U)
}

fn erfc(a: f64) -> f64 {
    let x = a.abs();
    if x < 1.0 {
        return 1.0 - erf(a);
    }
    let z = (-a * a).exp();
    let (p, q) = if x < 8.0 {
        (polevl(x, &ERFC_P), p1evl(x, &ERFC_Q))
    } else {
        (polevl(x, &ERFC_R), p1evl(x, &ERFC_S))
    };
    let y = z * p / q;
    if a < 0.0 { 2.0 - y } else { y }
}

/// `COUNTIF(range, criterion)` / `COUNTIFS(range1, crit1, [range2, crit2], …)`
/// (`spec.md` §4.9): the single-criteria and multi-criteria spellings of
/// the same `criterion_function_compute` fold `AVERAGEIFS` composes below,
/// projecting `1` per matching row and combining by addition.
macro_rules! countif_family {
    ($struct_name:ident, $name:literal, $repeat:literal, $first_crit_idx:literal) => {
        pub struct $struct_name;
        impl BuiltinFunction for $struct_name {
            fn name(&self) -> &'static str {
                $name
            }
            fn parameters(&self) -> &'static [ArgSpec] {
                static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
                P.get_or_init(|| vec![range_spec(), any_spec()])
            }
            fn repeat_last_args(&self) -> u8 {
                $repeat
            }
            fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
                let mut ranges = Vec::new();
                let mut criteria = Vec::new();
                let mut i = $first_crit_idx;
                while i + 1 <= args.len() {
                    let r = as_range(&args[i - 1]);
                    let crit = match Criterion::compile(&as_scalar(&args[i])) {
                        Ok(c) => c,
                        Err(e) => return Value::Error(e),
                    };
                    ranges.push(r);
                    criteria.push(crit);
                    i += 2;
                }
                let refs: Vec<&Range> = ranges.iter().collect();
                let first = refs[0].clone();
                let result = criterion_function_compute(
                    &refs,
                    &criteria,
                    &first,
                    0_u32,
                    |a, b| a + b,
                    |_v| 1_u32,
                );
                match result {
                    Ok(n) => Value::number(n as f64),
                    Err(e) => Value::Error(e),
                }
            }
        }
    };
}

countif_family!(CountIfFn, "COUNTIF", 2, 1);
countif_family!(CountIfsFn, "COUNTIFS", 2, 1);

/// `SUMIF(range, criterion, [sum_range])` / `SUMIFS(sum_range, range1,
/// crit1, …)` (`spec.md` §4.9). `SUMIF` keeps Excel's historical argument
/// order (criteria range first, sum range optional and defaulting to the
/// criteria range itself); `SUMIFS` takes the sum range first like
/// `AVERAGEIFS`.
pub struct SumIfFn;
impl BuiltinFunction for SumIfFn {
    fn name(&self) -> &'static str {
        "SUMIF"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![range_spec(), any_spec(), range_spec().optional()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let criteria_range = as_range(&args[0]);
        let crit = match Criterion::compile(&as_scalar(&args[1])) {
            Ok(c) => c,
            Err(e) => return Value::Error(e),
        };
        let sum_range = as_range(&args[2]);
        let values = if sum_range.width() * sum_range.height() == 0 {
            criteria_range.clone()
        } else {
            sum_range
        };
        let result = criterion_function_compute(
            &[&criteria_range],
            &[crit],
            &values,
            0.0_f64,
            |a, b| a + b,
            |v| match v {
                Value::Number(n, _) => *n,
                Value::Bool(b) => {
                    if *b {
                        1.0
                    } else {
                        0.0
                    }
                }
                _ => 0.0,
            },
        );
        match result {
            Ok(sum) => Value::number(sum),
            Err(e) => Value::Error(e),
        }
    }
}

pub struct SumIfsFn;
impl BuiltinFunction for SumIfsFn {
    fn name(&self) -> &'static str {
        "SUMIFS"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![range_spec(), range_spec(), any_spec()])
    }
    fn repeat_last_args(&self) -> u8 {
        2
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let values = as_range(&args[0]);
        let mut ranges = Vec::new();
        let mut criteria = Vec::new();
        let mut i = 1;
        while i + 1 < args.len() {
            let r = as_range(&args[i]);
            let crit = match Criterion::compile(&as_scalar(&args[i + 1])) {
                Ok(c) => c,
                Err(e) => return Value::Error(e),
            };
            ranges.push(r);
            criteria.push(crit);
            i += 2;
        }
        let refs: Vec<&Range> = ranges.iter().collect();
        let result = criterion_function_compute(
            &refs,
            &criteria,
            &values,
            0.0_f64,
            |a, b| a + b,
            |v| match v {
                Value::Number(n, _) => *n,
                Value::Bool(b) => {
                    if *b {
                        1.0
                    } else {
                        0.0
                    }
                }
                _ => 0.0,
            },
        );
        match result {
            Ok(sum) => Value::number(sum),
            Err(e) => Value::Error(e),
        }
    }
}

/// `AVERAGEIF(range, criterion, [avg_range])` (`spec.md` §4.9): the
/// single-criteria sibling of `AVERAGEIFS`, same optional-range default
/// as `SUMIF`.
pub struct AverageIfFn;
impl BuiltinFunction for AverageIfFn {
    fn name(&self) -> &'static str {
        "AVERAGEIF"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![range_spec(), any_spec(), range_spec().optional()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let criteria_range = as_range(&args[0]);
        let crit = match Criterion::compile(&as_scalar(&args[1])) {
            Ok(c) => c,
            Err(e) => return Value::Error(e),
        };
        let sum_range = as_range(&args[2]);
        let values = if sum_range.width() * sum_range.height() == 0 {
            criteria_range.clone()
        } else {
            sum_range
        };
        let result = criterion_function_compute(
            &[&criteria_range],
            &[crit],
            &values,
            (0.0_f64, 0_u32),
            |(s, n), (s2, n2)| (s + s2, n + n2),
            |v| match v {
                Value::Number(n, _) => (*n, 1),
                _ => (0.0, 0),
            },
        );
        match result {
            Ok((_, 0)) => Value::Error(ExcelError::div0()),
            Ok((sum, count)) => Value::number(sum / count as f64),
            Err(e) => Value::Error(e),
        }
    }
}

pub struct AverageIfsFn;
impl BuiltinFunction for AverageIfsFn {
    fn name(&self) -> &'static str {
        "AVERAGEIFS"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![range_spec(), range_spec(), any_spec()])
    }
    fn repeat_last_args(&self) -> u8 {
        2
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let values = as_range(&args[0]);
        let mut ranges = Vec::new();
        let mut criteria = Vec::new();
        let mut i = 1;
        while i + 1 < args.len() {
            let r = as_range(&args[i]);
            let crit = match Criterion::compile(&as_scalar(&args[i + 1])) {
                Ok(c) => c,
                Err(e) => return Value::Error(e),
            };
            ranges.push(r);
            criteria.push(crit);
            i += 2;
        }
        let refs: Vec<&Range> = ranges.iter().collect();
        let result = criterion_function_compute(
            &refs,
            &criteria,
            &values,
            (0.0_f64, 0_u32),
            |(s, n), (s2, n2)| (s + s2, n + n2),
            |v| match v {
                Value::Number(n, _) => (*n, 1),
                _ => (0.0, 0),
            },
        );
        match result {
            Ok((_, 0)) => Value::Error(ExcelError::div0()),
            Ok((sum, count)) => Value::number(sum / count as f64),
            Err(e) => Value::Error(e),
        }
    }
}

/// Sample excess kurtosis (`spec.md` §4.11).
pub struct KurtFn;
impl BuiltinFunction for KurtFn {
    fn name(&self) -> &'static str {
        "KURT"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![range_spec()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let xs = numbers_of(&as_range(&args[0]));
        let n = xs.len() as f64;
        if n < 4.0 {
            return Value::Error(value_msg(ExcelMessage::NumberRange));
        }
        let m = mean(&xs);
        let s = sample_variance(&xs).sqrt();
        if s == 0.0 {
            return Value::Error(ExcelError::div0());
        }
        let sum4: f64 = xs.iter().map(|x| ((x - m) / s).powi(4)).sum();
        let term1 = (n * (n + 1.0)) / ((n - 1.0) * (n - 2.0) * (n - 3.0));
        let term2 = 3.0 * (n - 1.0).powi(2) / ((n - 2.0) * (n - 3.0));
        Value::number(term1 * sum4 - term2)
    }
}

macro_rules! percentrank_fn {
    ($struct_name:ident, $name:literal, $transform:expr) => {
        pub struct $struct_name;
        impl BuiltinFunction for $struct_name {
            fn name(&self) -> &'static str {
                $name
            }
            fn parameters(&self) -> &'static [ArgSpec] {
                static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
                P.get_or_init(|| vec![range_spec(), num_spec(), int_spec().with_default(Value::number(3.0))])
            }
            fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
                let sorted = sorted_of(&as_range(&args[0]));
                let x = match as_f64(&args[1]) {
                    Ok(n) => n,
                    Err(e) => return Value::Error(e),
                };
                let significance = match as_i64(&args[2]) {
                    Ok(n) => n.max(1),
                    Err(e) => return Value::Error(e),
                };
                let Some(idx) = rank_fraction(&sorted, x) else {
                    return Value::Error(na_err());
                };
                let n = sorted.len() as f64;
                let rank = $transform(idx, n);
                let factor = 10f64.powi(significance as i32);
                Value::number((rank * factor).round() / factor)
            }
        }
    };
}

percentrank_fn!(PercentRankIncFn, "PERCENTRANK.INC", |idx: f64, n: f64| idx
    / (n - 1.0).max(1.0));
percentrank_fn!(PercentRankExcFn, "PERCENTRANK.EXC", |idx: f64, n: f64| (idx
    + 1.0)
    / (n + 1.0));
/// Legacy bare spelling, equivalent to the `.INC` variant.
percentrank_fn!(PercentRankFn, "PERCENTRANK", |idx: f64, n: f64| idx
    / (n - 1.0).max(1.0));

macro_rules! quartile_percentile_fn {
    ($struct_name:ident, $name:literal, $inclusive:literal) => {
        pub struct $struct_name;
        impl BuiltinFunction for $struct_name {
            fn name(&self) -> &'static str {
                $name
            }
            fn parameters(&self) -> &'static [ArgSpec] {
                static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
                P.get_or_init(|| vec![range_spec(), num_spec()])
            }
            fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
                let sorted = sorted_of(&as_range(&args[0]));
                if sorted.is_empty() {
                    return Value::Error(num_err());
                }
                let k = match as_f64(&args[1]) {
                    Ok(n) => n,
                    Err(e) => return Value::Error(e),
                };
                if $inclusive {
                    if !(0.0..=1.0).contains(&k) {
                        return Value::Error(num_err());
                    }
                    Value::number(percentile_inc(&sorted, k))
                } else {
                    match percentile_exc(&sorted, k) {
                        Ok(v) => Value::number(v),
                        Err(e) => Value::Error(e),
                    }
                }
            }
        }
    };
}

quartile_percentile_fn!(PercentileIncFn, "PERCENTILE.INC", true);
quartile_percentile_fn!(PercentileExcFn, "PERCENTILE.EXC", false);
/// Legacy bare spelling, equivalent to the `.INC` variant.
quartile_percentile_fn!(PercentileFn, "PERCENTILE", true);

macro_rules! quartile_fn {
    ($struct_name:ident, $name:literal, $inclusive:literal) => {
        pub struct $struct_name;
        impl BuiltinFunction for $struct_name {
            fn name(&self) -> &'static str {
                $name
            }
            fn parameters(&self) -> &'static [ArgSpec] {
                static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
                P.get_or_init(|| vec![range_spec(), int_spec()])
            }
            fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
                let sorted = sorted_of(&as_range(&args[0]));
                if sorted.is_empty() {
                    return Value::Error(num_err());
                }
                let quart = match as_i64(&args[1]) {
                    Ok(n) => n,
                    Err(e) => return Value::Error(e),
                };
                if !(0..=4).contains(&quart) {
                    return Value::Error(num_err());
                }
                let k = quart as f64 / 4.0;
                if $inclusive {
                    Value::number(percentile_inc(&sorted, k))
                } else {
                    match percentile_exc(&sorted, k) {
                        Ok(v) => Value::number(v),
                        Err(e) => Value::Error(e),
                    }
                }
            }
        }
    };
}

quartile_fn!(QuartileIncFn, "QUARTILE.INC", true);
quartile_fn!(QuartileExcFn, "QUARTILE.EXC", false);
/// Legacy bare spelling, equivalent to the `.INC` variant.
quartile_fn!(QuartileFn, "QUARTILE", true);

pub struct ModeSnglFn;
impl BuiltinFunction for ModeSnglFn {
    fn name(&self) -> &'static str {
        "MODE.SNGL"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![range_spec()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        match modes_of(&as_range(&args[0])) {
            Some(modes) => Value::number(modes[0]),
            None => Value::Error(na_err()),
        }
    }
}

/// Bare `MODE` is the same kernel as `MODE.SNGL` (`spec.md` §4.11 names
/// both spellings for the single-value form).
pub struct ModeFn;
impl BuiltinFunction for ModeFn {
    fn name(&self) -> &'static str {
        "MODE"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![range_spec()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        match modes_of(&as_range(&args[0])) {
            Some(modes) => Value::number(modes[0]),
            None => Value::Error(na_err()),
        }
    }
}

/// Returns every value tied for most-frequent, ascending, as a column
/// (`spec.md` §4.11): array-valued, unlike `MODE.SNGL`.
pub struct ModeMultFn;
impl BuiltinFunction for ModeMultFn {
    fn name(&self) -> &'static str {
        "MODE.MULT"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![range_spec()])
    }
    fn returns_array(&self) -> bool {
        true
    }
    fn call_range(&self, args: &[ArgValue], _state: &InterpreterState) -> Range {
        match modes_of(&as_range(&args[0])) {
            Some(modes) => Range::only_values(modes.into_iter().map(|m| vec![Value::number(m)]).collect()),
            None => Range::from_scalar(Value::Error(na_err())),
        }
    }
    fn call(&self, args: &[ArgValue], state: &InterpreterState) -> Value {
        self.call_range(args, state).get(0, 0)
    }
}

fn modes_of(r: &Range) -> Option<Vec<f64>> {
    let xs = numbers_of(r);
    if xs.is_empty() {
        return None;
    }
    let mut counts: Vec<(f64, u32)> = Vec::new();
    for x in &xs {
        if let Some(entry) = counts.iter_mut().find(|(v, _)| (*v - x).abs() < 1e-12) {
            entry.1 += 1;
        } else {
            counts.push((*x, 1));
        }
    }
    let max_count = counts.iter().map(|(_, c)| *c).max().unwrap();
    if max_count < 2 {
        return None;
    }
    let mut modes: Vec<f64> = counts
        .into_iter()
        .filter(|(_, c)| *c == max_count)
        .map(|(v, _)| v)
        .collect();
    modes.sort_by(|a, b| a.partial_cmp(b).unwrap());
    Some(modes)
}

/// Mean after discarding `percent/2` of the data from each tail, rounded
/// down to an even excluded count (`spec.md` §4.11).
pub struct TrimMeanFn;
impl BuiltinFunction for TrimMeanFn {
    fn name(&self) -> &'static str {
        "TRIMMEAN"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![range_spec(), num_spec()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let sorted = sorted_of(&as_range(&args[0]));
        let percent = match as_f64(&args[1]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        if !(0.0..1.0).contains(&percent) || sorted.is_empty() {
            return Value::Error(num_err());
        }
        let n = sorted.len();
        let mut exclude = ((n as f64) * percent).floor() as usize;
        if exclude % 2 == 1 {
            exclude -= 1;
        }
        let trim_each_side = exclude / 2;
        if trim_each_side * 2 >= n {
            return Value::Error(num_err());
        }
        let kept = &sorted[trim_each_side..n - trim_each_side];
        Value::number(mean(kept))
    }
}

/// `PROB(range, prob_range, lower, upper=lower)` (`spec.md` §4.11): sum of
/// probabilities for values falling in `[lower, upper]`.
pub struct ProbFn;
impl BuiltinFunction for ProbFn {
    fn name(&self) -> &'static str {
        "PROB"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![range_spec(), range_spec(), num_spec(), num_spec()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let values = numbers_of(&as_range(&args[0]));
        let probs = numbers_of(&as_range(&args[1]));
        let lower = match as_f64(&args[2]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let upper = match as_f64(&args[3]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        if values.len() != probs.len() {
            return Value::Error(value_msg(ExcelMessage::EqualLength));
        }
        if probs.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Value::Error(num_err());
        }
        let total: f64 = probs.iter().sum();
        if (total - 1.0).abs() > 1e-10 {
            return Value::Error(num_err());
        }
        let (lo, hi) = (lower.min(upper), lower.max(upper));
        let sum: f64 = values
            .iter()
            .zip(&probs)
            .filter(|(v, _)| **v >= lo && **v <= hi)
            .map(|(_, p)| p)
            .sum();
        Value::number(sum)
    }
}

/// `MARGINOFERROR(range, confidence)` (`spec.md` §4.11): half-width of a
/// two-tailed confidence interval around the sample mean.
pub struct MarginOfErrorFn;
impl BuiltinFunction for MarginOfErrorFn {
    fn name(&self) -> &'static str {
        "MARGINOFERROR"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![range_spec(), num_spec()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let xs = numbers_of(&as_range(&args[0]));
        let confidence = match as_f64(&args[1]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        if xs.len() < 2 {
            return Value::Error(ExcelError::div0());
        }
        if !(0.0..1.0).contains(&confidence) {
            return Value::Error(num_err());
        }
        let s = sample_variance(&xs).sqrt();
        let n = xs.len() as f64;
        Value::number(confidence * s / n.sqrt())
    }
}

pub struct ErfPreciseFn;
impl BuiltinFunction for ErfPreciseFn {
    fn name(&self) -> &'static str {
        "ERF.PRECISE"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![num_spec()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        match as_f64(&args[0]) {
            Ok(n) => Value::number(erf(n)),
            Err(e) => Value::Error(e),
        }
    }
}

pub struct ErfcPreciseFn;
impl BuiltinFunction for ErfcPreciseFn {
    fn name(&self) -> &'static str {
        "ERFC.PRECISE"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![num_spec()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        match as_f64(&args[0]) {
            Ok(n) => Value::number(erfc(n)),
            Err(e) => Value::Error(e),
        }
    }
}

fn linear_regression(ys: &[f64], xs: &[f64]) -> Option<(f64, f64)> {
    if ys.len() != xs.len() || ys.len() < 2 {
        return None;
    }
    let mx = mean(xs);
    let my = mean(ys);
    let mut cov = 0.0;
    let mut var = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        cov += (x - mx) * (y - my);
        var += (x - mx).powi(2);
    }
    if var == 0.0 {
        return None;
    }
    let slope = cov / var;
    let intercept = my - slope * mx;
    Some((slope, intercept))
}

pub struct InterceptFn;
impl BuiltinFunction for InterceptFn {
    fn name(&self) -> &'static str {
        "INTERCEPT"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![range_spec(), range_spec()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let ys = numbers_of(&as_range(&args[0]));
        let xs = numbers_of(&as_range(&args[1]));
        match linear_regression(&ys, &xs) {
            Some((_, intercept)) => Value::number(intercept),
            None => Value::Error(num_err()),
        }
    }
}

pub struct ForecastFn;
impl BuiltinFunction for ForecastFn {
    fn name(&self) -> &'static str {
        "FORECAST"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![num_spec(), range_spec(), range_spec()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let x = match as_f64(&args[0]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let ys = numbers_of(&as_range(&args[1]));
        let xs = numbers_of(&as_range(&args[2]));
        match linear_regression(&ys, &xs) {
            Some((slope, intercept)) => Value::number(slope * x + intercept),
            None => Value::Error(num_err()),
        }
    }
}

pub struct AverageWeightedFn;
impl BuiltinFunction for AverageWeightedFn {
    fn name(&self) -> &'static str {
        "AVERAGE.WEIGHTED"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![range_spec(), range_spec()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let values = numbers_of(&as_range(&args[0]));
        let weights = numbers_of(&as_range(&args[1]));
        if values.len() != weights.len() || values.is_empty() {
            return Value::Error(value_msg(ExcelMessage::EqualLength));
        }
        let total_weight: f64 = weights.iter().sum();
        if total_weight == 0.0 {
            return Value::Error(ExcelError::div0());
        }
        let weighted: f64 = values.iter().zip(&weights).map(|(v, w)| v * w).sum();
        Value::number(weighted / total_weight)
    }
}

pub fn register(reg: &mut crate::registry::FunctionRegistry) {
    use std::sync::Arc;
    reg.register_google_sheets(Arc::new(CountIfFn));
    reg.register_google_sheets(Arc::new(CountIfsFn));
    reg.register_google_sheets(Arc::new(SumIfFn));
    reg.register_google_sheets(Arc::new(SumIfsFn));
    reg.register_google_sheets(Arc::new(AverageIfFn));
    reg.register_google_sheets(Arc::new(AverageIfsFn));
    reg.register_google_sheets(Arc::new(KurtFn));
    reg.register_google_sheets(Arc::new(PercentRankIncFn));
    reg.register_google_sheets(Arc::new(PercentRankExcFn));
    reg.register_google_sheets(Arc::new(PercentRankFn));
    reg.register_google_sheets(Arc::new(PercentileIncFn));
    reg.register_google_sheets(Arc::new(PercentileExcFn));
    reg.register_google_sheets(Arc::new(PercentileFn));
    reg.register_google_sheets(Arc::new(QuartileIncFn));
    reg.register_google_sheets(Arc::new(QuartileExcFn));
    reg.register_google_sheets(Arc::new(QuartileFn));
    reg.register_google_sheets(Arc::new(ModeSnglFn));
    reg.register_google_sheets(Arc::new(ModeFn));
    reg.register_google_sheets(Arc::new(ModeMultFn));
    reg.register_google_sheets(Arc::new(TrimMeanFn));
    reg.register_google_sheets(Arc::new(ProbFn));
    reg.register_google_sheets(Arc::new(MarginOfErrorFn));
    reg.register_google_sheets(Arc::new(ErfPreciseFn));
    reg.register_google_sheets(Arc::new(ErfcPreciseFn));
    reg.register_google_sheets(Arc::new(InterceptFn));
    reg.register_google_sheets(Arc::new(ForecastFn));
    reg.register_google_sheets(Arc::new(AverageWeightedFn));
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptySheet;
    impl crate::traits::SheetView for EmptySheet {
        fn get_cell(&self, _sheet: Option<&str>, _col: u32, _row: u32) -> Value {
            Value::Empty
        }
    }
    struct NoopLocale;
    impl crate::traits::LocaleContext for NoopLocale {
        fn collate(&self, a: &str, b: &str, _ci: bool) -> std::cmp::Ordering {
            a.cmp(b)
        }
        fn get_function_mapping(&self) -> &rustc_hash::FxHashMap<String, String> {
            static M: OnceLock<rustc_hash::FxHashMap<String, String>> = OnceLock::new();
            M.get_or_init(Default::default)
        }
        fn get_error_mapping(&self) -> &rustc_hash::FxHashMap<String, formualizer_common::ExcelErrorKind> {
            static M: OnceLock<rustc_hash::FxHashMap<String, formualizer_common::ExcelErrorKind>> =
                OnceLock::new();
            M.get_or_init(Default::default)
        }
    }

    fn test_state<'a>(
        config: &'a formualizer_parse::Config,
        registry: &'a crate::registry::FunctionRegistry,
        sheet: &'a EmptySheet,
        locale: &'a NoopLocale,
        dt: &'a crate::traits::GregorianDateTimeHelper,
    ) -> InterpreterState<'a> {
        InterpreterState {
            config,
            registry,
            sheet,
            locale,
            datetime: dt,
            current_sheet: None,
        }
    }

    fn number_column(xs: &[f64]) -> Range {
        Range::only_values(xs.iter().map(|n| vec![Value::number(*n)]).collect())
    }

    #[test]
    fn averageifs_zero_matches_is_div0_not_value() {
        let config = formualizer_parse::Config::google_sheets();
        let registry = crate::registry::FunctionRegistry::new();
        let sheet = EmptySheet;
        let locale = NoopLocale;
        let dt = crate::traits::GregorianDateTimeHelper;
        let state = test_state(&config, &registry, &sheet, &locale, &dt);

        let values = number_column(&[1.0, 2.0, 3.0]);
        let criteria_range = number_column(&[1.0, 2.0, 3.0]);
        let args = vec![
            ArgValue::Range(values),
            ArgValue::Range(criteria_range),
            ArgValue::Scalar(Value::Text(">100".to_string())),
        ];
        let result = AverageIfsFn.call(&args, &state);
        assert_eq!(result, Value::Error(ExcelError::div0()));
    }

    #[test]
    fn prob_rejects_probability_outside_unit_interval() {
        let config = formualizer_parse::Config::google_sheets();
        let registry = crate::registry::FunctionRegistry::new();
        let sheet = EmptySheet;
        let locale = NoopLocale;
        let dt = crate::traits::GregorianDateTimeHelper;
        let state = test_state(&config, &registry, &sheet, &locale, &dt);

        let args = vec![
            ArgValue::Range(number_column(&[1.0, 2.0, 3.0])),
            ArgValue::Range(number_column(&[0.5, 0.6, -0.1])),
            ArgValue::Scalar(Value::number(1.0)),
            ArgValue::Scalar(Value::number(3.0)),
        ];
        assert_eq!(ProbFn.call(&args, &state), Value::Error(num_err()));
    }

    #[test]
    fn prob_enforces_tight_sum_tolerance() {
        let config = formualizer_parse::Config::google_sheets();
        let registry = crate::registry::FunctionRegistry::new();
        let sheet = EmptySheet;
        let locale = NoopLocale;
        let dt = crate::traits::GregorianDateTimeHelper;
        let state = test_state(&config, &registry, &sheet, &locale, &dt);

        // Sums to 1 + 1e-8: within the old 1e-7 tolerance but must now fail.
        let args = vec![
            ArgValue::Range(number_column(&[1.0, 2.0])),
            ArgValue::Range(number_column(&[0.5, 0.50000001])),
            ArgValue::Scalar(Value::number(1.0)),
            ArgValue::Scalar(Value::number(2.0)),
        ];
        assert_eq!(ProbFn.call(&args, &state), Value::Error(num_err()));
    }

    #[test]
    fn marginoferror_below_two_samples_is_div0() {
        let config = formualizer_parse::Config::google_sheets();
        let registry = crate::registry::FunctionRegistry::new();
        let sheet = EmptySheet;
        let locale = NoopLocale;
        let dt = crate::traits::GregorianDateTimeHelper;
        let state = test_state(&config, &registry, &sheet, &locale, &dt);

        let args = vec![
            ArgValue::Range(number_column(&[5.0])),
            ArgValue::Scalar(Value::number(0.95)),
        ];
        assert_eq!(MarginOfErrorFn.call(&args, &state), Value::Error(ExcelError::div0()));
    }

    #[test]
    fn marginoferror_uses_confidence_times_stddev_over_sqrt_n() {
        let config = formualizer_parse::Config::google_sheets();
        let registry = crate::registry::FunctionRegistry::new();
        let sheet = EmptySheet;
        let locale = NoopLocale;
        let dt = crate::traits::GregorianDateTimeHelper;
        let state = test_state(&config, &registry, &sheet, &locale, &dt);

        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let s = sample_variance(&xs).sqrt();
        let n = xs.len() as f64;
        let confidence = 0.8;
        let args = vec![
            ArgValue::Range(number_column(&xs)),
            ArgValue::Scalar(Value::number(confidence)),
        ];
        match MarginOfErrorFn.call(&args, &state) {
            Value::Number(got, _) => assert!((got - confidence * s / n.sqrt()).abs() < 1e-12),
            other => panic!("expected a number, got {other:?}"),
        }
    }

    #[test]
    fn modes_of_finds_tied_modes_ascending() {
        let r = Range::only_values(
            [1.0, 1.0, 2.0, 2.0, 3.0]
                .iter()
                .map(|n| vec![Value::number(*n)])
                .collect(),
        );
        assert_eq!(modes_of(&r), Some(vec![1.0, 2.0]));
    }

    #[test]
    fn percentile_inc_matches_median_at_half() {
        let sorted = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile_inc(&sorted, 0.5), 2.5);
    }

    #[test]
    fn erf_is_odd_and_bounded() {
        assert!((erf(0.0)).abs() < 1e-12);
        assert!(erf(3.0) > 0.999);
        assert!((erf(-1.0) + erf(1.0)).abs() < 1e-9);
    }

    #[test]
    fn erf_matches_reference_to_1e14() {
        // Reference values per `spec.md` §4.11's "absolute error < 1e-14".
        assert!((erf(1.0) - 0.842_700_792_949_714_87).abs() < 1e-14);
        assert!((erf(0.5) - 0.520_499_877_813_046_54).abs() < 1e-14);
        assert!((erfc(2.0) - 0.004_677_734_981_047_265_8).abs() < 1e-14);
    }

    #[test]
    fn erf_and_erfc_are_complementary() {
        for x in [0.1, 0.5, 1.0, 2.5, 5.0, 9.0] {
            assert!((erf(x) + erfc(x) - 1.0).abs() < 1e-14);
        }
    }

    #[test]
    fn linear_regression_recovers_exact_line() {
        let xs = vec![1.0, 2.0, 3.0, 4.0];
        let ys = vec![3.0, 5.0, 7.0, 9.0];
        let (slope, intercept) = linear_regression(&ys, &xs).unwrap();
        assert!((slope - 2.0).abs() < 1e-9);
        assert!((intercept - 1.0).abs() < 1e-9);
    }
}
