//! Array-reshaping and matrix kernels (`spec.md` §4.10, C10). Every
//! function here sets `returns_array` and implements `call_range`; the
//! scalar `call` path (used when a caller forces scalar context) falls
//! back to the default "top-left cell" projection already supplied by
//! `BuiltinFunction::call_range`'s scalar counterpart in `registry.rs`.

use std::cmp::Ordering;
use std::sync::OnceLock;

use formualizer_common::{ArgSpec, ExcelError, ExcelMessage, Range, Value};

use crate::arithmetic;
use crate::interpreter::InterpreterState;
use crate::registry::{ArgValue, ArraySize, BuiltinFunction};

use super::helpers::*;

fn compare_values(a: &Value, b: &Value) -> Ordering {
    arithmetic::compare(a, b)
}

/// `SORT(range, sort_col1=1, ascending1=true, [sort_col2, ascending2]…)`
/// (`spec.md` §4.10.1): stable multi-key row sort.
pub struct SortFn;
impl BuiltinFunction for SortFn {
    fn name(&self) -> &'static str {
        "SORT"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| {
            vec![
                range_spec(),
                int_spec().with_default(Value::number(1.0)),
                bool_spec().with_default(Value::Bool(true)),
            ]
        })
    }
    fn repeat_last_args(&self) -> u8 {
        2
    }
    fn returns_array(&self) -> bool {
        true
    }
    fn call_range(&self, args: &[ArgValue], _state: &InterpreterState) -> Range {
        let data = as_range(&args[0]);
        let mut keys: Vec<(usize, bool)> = Vec::new();
        let mut i = 1;
        while i + 1 < args.len() {
            let col = as_i64(&args[i]).unwrap_or(1).max(1) as usize - 1;
            let asc = as_bool(&args[i + 1]).unwrap_or(true);
            keys.push((col, asc));
            i += 2;
        }
        let mut rows = data.raw_data().to_vec();
        rows.sort_by(|a, b| {
            for (col, asc) in &keys {
                let av = a.get(*col).unwrap_or(&Value::Empty);
                let bv = b.get(*col).unwrap_or(&Value::Empty);
                let c = compare_values(av, bv);
                if c != Ordering::Equal {
                    return if *asc { c } else { c.reverse() };
                }
            }
            Ordering::Equal
        });
        Range::only_values(rows)
    }
    fn size_of_result_array(&self, args: &[formualizer_parse::Ast], state: &InterpreterState) -> ArraySize {
        match args.first() {
            Some(a) => {
                let r = state.evaluate_range(a);
                ArraySize::fixed(r.width(), r.height())
            }
            None => ArraySize::scalar(),
        }
    }
}

fn dedupe_vectors(vectors: Vec<Vec<Value>>, exactly_once: bool) -> Vec<Vec<Value>> {
    let mut counts: Vec<(Vec<Value>, usize)> = Vec::new();
    for v in &vectors {
        if let Some(entry) = counts.iter_mut().find(|(existing, _)| existing == v) {
            entry.1 += 1;
        } else {
            counts.push((v.clone(), 1));
        }
    }
    if exactly_once {
        counts.into_iter().filter(|(_, c)| *c == 1).map(|(v, _)| v).collect()
    } else {
        counts.into_iter().map(|(v, _)| v).collect()
    }
}

fn transpose(rows: &[Vec<Value>]) -> Vec<Vec<Value>> {
    if rows.is_empty() {
        return Vec::new();
    }
    let width = rows[0].len();
    (0..width)
        .map(|c| rows.iter().map(|r| r[c].clone()).collect())
        .collect()
}

/// `UNIQUE(range, by_column=false, exactly_once=false)` (`spec.md`
/// §4.10.2).
pub struct UniqueFn;
impl BuiltinFunction for UniqueFn {
    fn name(&self) -> &'static str {
        "UNIQUE"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| {
            vec![
                range_spec(),
                bool_spec().with_default(Value::Bool(false)),
                bool_spec().with_default(Value::Bool(false)),
            ]
        })
    }
    fn returns_array(&self) -> bool {
        true
    }
    fn call_range(&self, args: &[ArgValue], _state: &InterpreterState) -> Range {
        let data = as_range(&args[0]);
        let by_column = as_bool(&args[1]).unwrap_or(false);
        let exactly_once = as_bool(&args[2]).unwrap_or(false);
        let rows = data.raw_data().to_vec();
        if by_column {
            let cols = transpose(&rows);
            let deduped = dedupe_vectors(cols, exactly_once);
            Range::only_values(transpose(&deduped))
        } else {
            Range::only_values(dedupe_vectors(rows, exactly_once))
        }
    }
}

/// `FLATTEN(range1, range2, …)` (`spec.md` §4.10.3): row-major
/// concatenation of every argument into a single column.
pub struct FlattenFn;
impl BuiltinFunction for FlattenFn {
    fn name(&self) -> &'static str {
        "FLATTEN"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![range_spec()])
    }
    fn repeat_last_args(&self) -> u8 {
        1
    }
    fn returns_array(&self) -> bool {
        true
    }
    fn call_range(&self, args: &[ArgValue], _state: &InterpreterState) -> Range {
        let mut out = Vec::new();
        for a in args {
            let r = as_range(a);
            for v in r.values_top_left_to_bottom_right() {
                out.push(vec![v.clone()]);
            }
        }
        if out.is_empty() {
            out.push(vec![Value::Empty]);
        }
        Range::only_values(out)
    }
}

/// `CHOOSECOLS(range, col1, col2, …)` (`spec.md` §4.10.4): 1-based column
/// selection, `#VALUE!` on an out-of-range index.
pub struct ChooseColsFn;
impl BuiltinFunction for ChooseColsFn {
    fn name(&self) -> &'static str {
        "CHOOSECOLS"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![range_spec(), int_spec()])
    }
    fn repeat_last_args(&self) -> u8 {
        1
    }
    fn returns_array(&self) -> bool {
        true
    }
    fn call_range(&self, args: &[ArgValue], _state: &InterpreterState) -> Range {
        let data = as_range(&args[0]);
        let mut cols = Vec::new();
        for a in &args[1..] {
            match as_i64(a) {
                Ok(n) if n >= 1 && (n as usize) <= data.width() => cols.push(n as usize - 1),
                _ => return Range::from_scalar(Value::Error(value_err())),
            }
        }
        let rows = data
            .raw_data()
            .iter()
            .map(|row| cols.iter().map(|c| row[*c].clone()).collect())
            .collect();
        Range::only_values(rows)
    }
}

/// `CHOOSEROWS(range, row1, row2, …)` (`spec.md` §4.10.5).
pub struct ChooseRowsFn;
impl BuiltinFunction for ChooseRowsFn {
    fn name(&self) -> &'static str {
        "CHOOSEROWS"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![range_spec(), int_spec()])
    }
    fn repeat_last_args(&self) -> u8 {
        1
    }
    fn returns_array(&self) -> bool {
        true
    }
    fn call_range(&self, args: &[ArgValue], _state: &InterpreterState) -> Range {
        let data = as_range(&args[0]);
        let mut out = Vec::new();
        for a in &args[1..] {
            match as_i64(a) {
                Ok(n) if n >= 1 && (n as usize) <= data.height() => {
                    out.push(data.raw_data()[n as usize - 1].clone())
                }
                _ => return Range::from_scalar(Value::Error(value_err())),
            }
        }
        Range::only_values(out)
    }
}

/// `HSTACK(range1, range2, …)` (`spec.md` §4.10.6): side-by-side
/// concatenation; rows shorter than the tallest input pad with `#N/A`.
pub struct HStackFn;
impl BuiltinFunction for HStackFn {
    fn name(&self) -> &'static str {
        "HSTACK"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![range_spec()])
    }
    fn repeat_last_args(&self) -> u8 {
        1
    }
    fn returns_array(&self) -> bool {
        true
    }
    fn call_range(&self, args: &[ArgValue], _state: &InterpreterState) -> Range {
        let ranges: Vec<Range> = args.iter().map(as_range).collect();
        let height = ranges.iter().map(|r| r.height()).max().unwrap_or(1);
        let mut rows = vec![Vec::new(); height];
        for r in &ranges {
            for row in 0..height {
                for col in 0..r.width() {
                    let v = if row < r.height() {
                        r.get(row, col)
                    } else {
                        Value::Error(na_err())
                    };
                    rows[row].push(v);
                }
            }
        }
        Range::only_values(rows)
    }
}

/// `VSTACK(range1, range2, …)` (`spec.md` §4.10.7): stacked
/// concatenation; columns shorter than the widest input pad with `#N/A`.
pub struct VStackFn;
impl BuiltinFunction for VStackFn {
    fn name(&self) -> &'static str {
        "VSTACK"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![range_spec()])
    }
    fn repeat_last_args(&self) -> u8 {
        1
    }
    fn returns_array(&self) -> bool {
        true
    }
    fn call_range(&self, args: &[ArgValue], _state: &InterpreterState) -> Range {
        let ranges: Vec<Range> = args.iter().map(as_range).collect();
        let width = ranges.iter().map(|r| r.width()).max().unwrap_or(1);
        let mut rows = Vec::new();
        for r in &ranges {
            for row in 0..r.height() {
                let mut out_row = Vec::with_capacity(width);
                for col in 0..width {
                    out_row.push(if col < r.width() {
                        r.get(row, col)
                    } else {
                        Value::Error(na_err())
                    });
                }
                rows.push(out_row);
            }
        }
        Range::only_values(rows)
    }
}

fn flatten_source(r: &Range) -> Vec<Value> {
    r.values_top_left_to_bottom_right().cloned().collect()
}

/// `WRAPCOLS(range, wrap_count, [pad_with])` (`spec.md` §4.10.8): reshape
/// a flattened source into columns of `wrap_count` rows each.
pub struct WrapColsFn;
impl BuiltinFunction for WrapColsFn {
    fn name(&self) -> &'static str {
        "WRAPCOLS"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![range_spec(), int_spec(), any_spec().with_default(Value::Error(na_err()))])
    }
    fn returns_array(&self) -> bool {
        true
    }
    fn call_range(&self, args: &[ArgValue], _state: &InterpreterState) -> Range {
        let flat = flatten_source(&as_range(&args[0]));
        let wrap = match as_i64(&args[1]) {
            Ok(n) if n > 0 => n as usize,
            _ => return Range::from_scalar(Value::Error(num_err())),
        };
        let pad = as_scalar(&args[2]);
        let cols = flat.len().div_ceil(wrap);
        let mut rows = vec![vec![pad.clone(); cols]; wrap];
        for (i, v) in flat.into_iter().enumerate() {
            rows[i % wrap][i / wrap] = v;
        }
        Range::only_values(rows)
    }
}

/// `WRAPROWS(range, wrap_count, [pad_with])` (`spec.md` §4.10.9).
pub struct WrapRowsFn;
impl BuiltinFunction for WrapRowsFn {
    fn name(&self) -> &'static str {
        "WRAPROWS"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![range_spec(), int_spec(), any_spec().with_default(Value::Error(na_err()))])
    }
    fn returns_array(&self) -> bool {
        true
    }
    fn call_range(&self, args: &[ArgValue], _state: &InterpreterState) -> Range {
        let flat = flatten_source(&as_range(&args[0]));
        let wrap = match as_i64(&args[1]) {
            Ok(n) if n > 0 => n as usize,
            _ => return Range::from_scalar(Value::Error(num_err())),
        };
        let pad = as_scalar(&args[2]);
        let row_count = flat.len().div_ceil(wrap);
        let mut rows = vec![vec![pad.clone(); wrap]; row_count];
        for (i, v) in flat.into_iter().enumerate() {
            rows[i / wrap][i % wrap] = v;
        }
        Range::only_values(rows)
    }
}

fn should_keep(v: &Value, ignore: i64) -> bool {
    match ignore {
        1 => !v.is_empty(),
        2 => !v.is_error(),
        3 => !v.is_empty() && !v.is_error(),
        _ => true,
    }
}

/// `TOCOL(range, ignore=0, scan_by_column=false)` (`spec.md` §4.10.10).
pub struct ToColFn;
impl BuiltinFunction for ToColFn {
    fn name(&self) -> &'static str {
        "TOCOL"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| {
            vec![
                range_spec(),
                int_spec().with_default(Value::number(0.0)),
                bool_spec().with_default(Value::Bool(false)),
            ]
        })
    }
    fn returns_array(&self) -> bool {
        true
    }
    fn call_range(&self, args: &[ArgValue], _state: &InterpreterState) -> Range {
        let data = as_range(&args[0]);
        let ignore = as_i64(&args[1]).unwrap_or(0);
        let scan_by_column = as_bool(&args[2]).unwrap_or(false);
        let rows = data.raw_data().to_vec();
        let source = if scan_by_column { transpose(&rows) } else { rows };
        let mut out = Vec::new();
        for row in &source {
            for v in row {
                if should_keep(v, ignore) {
                    out.push(vec![v.clone()]);
                }
            }
        }
        if out.is_empty() {
            out.push(vec![Value::Empty]);
        }
        Range::only_values(out)
    }
}

/// `TOROW(range, ignore=0, scan_by_column=false)` (`spec.md` §4.10.10).
pub struct ToRowFn;
impl BuiltinFunction for ToRowFn {
    fn name(&self) -> &'static str {
        "TOROW"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| {
            vec![
                range_spec(),
                int_spec().with_default(Value::number(0.0)),
                bool_spec().with_default(Value::Bool(false)),
            ]
        })
    }
    fn returns_array(&self) -> bool {
        true
    }
    fn call_range(&self, args: &[ArgValue], _state: &InterpreterState) -> Range {
        let data = as_range(&args[0]);
        let ignore = as_i64(&args[1]).unwrap_or(0);
        let scan_by_column = as_bool(&args[2]).unwrap_or(false);
        let rows = data.raw_data().to_vec();
        let source = if scan_by_column { transpose(&rows) } else { rows };
        let mut out = Vec::new();
        for row in &source {
            for v in row {
                if should_keep(v, ignore) {
                    out.push(v.clone());
                }
            }
        }
        if out.is_empty() {
            out.push(Value::Empty);
        }
        Range::only_values(vec![out])
    }
}

/// `SEQUENCE(rows, [columns=1], [start=1], [step=1])` (`spec.md`
/// §4.10.11): `size_of_result_array` reads literal `rows`/`columns`
/// arguments directly since they are always plain numeric literals in
/// practice, never a range.
pub struct SequenceFn;
impl BuiltinFunction for SequenceFn {
    fn name(&self) -> &'static str {
        "SEQUENCE"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| {
            vec![
                int_spec(),
                int_spec().with_default(Value::number(1.0)),
                num_spec().with_default(Value::number(1.0)),
                num_spec().with_default(Value::number(1.0)),
            ]
        })
    }
    fn returns_array(&self) -> bool {
        true
    }
    fn call_range(&self, args: &[ArgValue], _state: &InterpreterState) -> Range {
        let rows = match as_i64(&args[0]) {
            Ok(n) if n > 0 => n as usize,
            _ => return Range::from_scalar(Value::Error(num_err())),
        };
        let cols = match as_i64(&args[1]) {
            Ok(n) if n > 0 => n as usize,
            _ => return Range::from_scalar(Value::Error(num_err())),
        };
        let start = as_f64(&args[2]).unwrap_or(1.0);
        let step = as_f64(&args[3]).unwrap_or(1.0);
        let mut grid = Vec::with_capacity(rows);
        for r in 0..rows {
            let mut row = Vec::with_capacity(cols);
            for c in 0..cols {
                let n = (r * cols + c) as f64;
                row.push(Value::number(start + n * step));
            }
            grid.push(row);
        }
        Range::only_values(grid)
    }
    fn size_of_result_array(&self, args: &[formualizer_parse::Ast], state: &InterpreterState) -> ArraySize {
        let rows = args
            .first()
            .map(|a| state.evaluate(a))
            .and_then(|v| state.coerce_number(&v).ok())
            .map(|n| n.max(0.0) as usize)
            .unwrap_or(1);
        let cols = args
            .get(1)
            .map(|a| state.evaluate(a))
            .and_then(|v| state.coerce_number(&v).ok())
            .map(|n| n.max(0.0) as usize)
            .unwrap_or(1);
        ArraySize::fixed(cols.max(1), rows.max(1))
    }
}

/// `FREQUENCY(data, bins)` (`spec.md` §4.10.12): count of `data` values
/// in each half-open bucket `(bins[i-1], bins[i]]`, plus a final overflow
/// bucket for values greater than the last bin.
pub struct FrequencyFn;
impl BuiltinFunction for FrequencyFn {
    fn name(&self) -> &'static str {
        "FREQUENCY"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![range_spec(), range_spec()])
    }
    fn returns_array(&self) -> bool {
        true
    }
    fn call_range(&self, args: &[ArgValue], _state: &InterpreterState) -> Range {
        let data = numbers_of(&as_range(&args[0]));
        let bins = numbers_of(&as_range(&args[1]));
        let counts = frequency_counts(&data, &bins);
        Range::only_values(counts.into_iter().map(|c| vec![Value::number(c as f64)]).collect())
    }
}

/// One bucket per bin plus an overflow bucket for values above every bin
/// (`spec.md` §4.10.12); `sum(counts) == data.len()` always holds.
fn frequency_counts(data: &[f64], bins: &[f64]) -> Vec<u32> {
    let mut counts = vec![0u32; bins.len() + 1];
    for &x in data {
        let mut bucket = bins.len();
        for (i, &b) in bins.iter().enumerate() {
            if x <= b {
                bucket = i;
                break;
            }
        }
        counts[bucket] += 1;
    }
    counts
}

fn square_matrix(r: &Range) -> Option<Vec<Vec<f64>>> {
    if r.width() != r.height() {
        return None;
    }
    Some(
        r.raw_data()
            .iter()
            .map(|row| {
                row.iter()
                    .map(|v| match v {
                        Value::Number(n, _) => *n,
                        Value::Bool(b) => {
                            if *b {
                                1.0
                            } else {
                                0.0
                            }
                        }
                        _ => f64::NAN,
                    })
                    .collect()
            })
            .collect(),
    )
}

/// `MDETERM(range)` (`spec.md` §4.10.13): Gaussian elimination with
/// partial pivoting.
pub struct MDetermFn;
impl BuiltinFunction for MDetermFn {
    fn name(&self) -> &'static str {
        "MDETERM"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![range_spec()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let Some(mut m) = square_matrix(&as_range(&args[0])) else {
            return Value::Error(value_err());
        };
        let n = m.len();
        let mut det = 1.0;
        for i in 0..n {
            let mut pivot = i;
            for r in i + 1..n {
                if m[r][i].abs() > m[pivot][i].abs() {
                    pivot = r;
                }
            }
            if m[pivot][i].abs() < 1e-14 {
                return Value::number(0.0);
            }
            if pivot != i {
                m.swap(pivot, i);
                det = -det;
            }
            det *= m[i][i];
            for r in i + 1..n {
                let factor = m[r][i] / m[i][i];
                for c in i..n {
                    m[r][c] -= factor * m[i][c];
                }
            }
        }
        Value::number(det)
    }
}

/// `MINVERSE(range)` (`spec.md` §4.10.14): Gauss-Jordan elimination on
/// `[A | I]`; `#NUM!` if `A` is singular.
pub struct MInverseFn;
impl BuiltinFunction for MInverseFn {
    fn name(&self) -> &'static str {
        "MINVERSE"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![range_spec()])
    }
    fn returns_array(&self) -> bool {
        true
    }
    fn call_range(&self, args: &[ArgValue], _state: &InterpreterState) -> Range {
        let Some(a) = square_matrix(&as_range(&args[0])) else {
            return Range::from_scalar(Value::Error(value_err()));
        };
        match invert_matrix(a) {
            Some(inv) => Range::only_values(
                inv.into_iter()
                    .map(|row| row.into_iter().map(Value::number).collect())
                    .collect(),
            ),
            None => Range::from_scalar(Value::Error(num_err())),
        }
    }
}

/// Gauss-Jordan elimination on `[A | I]`; `None` if `A` is singular within
/// `1e-14` (`spec.md` §4.10.14).
fn invert_matrix(a: Vec<Vec<f64>>) -> Option<Vec<Vec<f64>>> {
    let n = a.len();
    let mut aug: Vec<Vec<f64>> = a
        .into_iter()
        .enumerate()
        .map(|(i, mut row)| {
            let mut id_row = vec![0.0; n];
            id_row[i] = 1.0;
            row.extend(id_row);
            row
        })
        .collect();
    for i in 0..n {
        let mut pivot = i;
        for r in i + 1..n {
            if aug[r][i].abs() > aug[pivot][i].abs() {
                pivot = r;
            }
        }
        if aug[pivot][i].abs() < 1e-14 {
            return None;
        }
        aug.swap(pivot, i);
        let pivot_val = aug[i][i];
        for c in 0..2 * n {
            aug[i][c] /= pivot_val;
        }
        for r in 0..n {
            if r == i {
                continue;
            }
            let factor = aug[r][i];
            for c in 0..2 * n {
                aug[r][c] -= factor * aug[i][c];
            }
        }
    }
    Some(aug.into_iter().map(|row| row[n..].to_vec()).collect())
}

/// `MUNIT(n)` (`spec.md` §4.10.15): the `n×n` identity matrix.
pub struct MUnitFn;
impl BuiltinFunction for MUnitFn {
    fn name(&self) -> &'static str {
        "MUNIT"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![int_spec()])
    }
    fn returns_array(&self) -> bool {
        true
    }
    fn call_range(&self, args: &[ArgValue], _state: &InterpreterState) -> Range {
        let n = match as_i64(&args[0]) {
            Ok(n) if n > 0 => n as usize,
            _ => return Range::from_scalar(Value::Error(num_err())),
        };
        let rows = (0..n)
            .map(|r| (0..n).map(|c| Value::number(if r == c { 1.0 } else { 0.0 })).collect())
            .collect();
        Range::only_values(rows)
    }
    fn size_of_result_array(&self, args: &[formualizer_parse::Ast], state: &InterpreterState) -> ArraySize {
        let n = args
            .first()
            .map(|a| state.evaluate(a))
            .and_then(|v| state.coerce_number(&v).ok())
            .map(|n| n.max(0.0) as usize)
            .unwrap_or(1);
        ArraySize::fixed(n.max(1), n.max(1))
    }
}

struct RegStats {
    slope: f64,
    intercept: f64,
    se_slope: f64,
    se_intercept: f64,
    r2: f64,
    se_y: f64,
    f_stat: f64,
    df: f64,
    ss_reg: f64,
    ss_resid: f64,
}

fn regression_stats(ys: &[f64], xs: &[f64], const_term: bool) -> Option<RegStats> {
    let n = ys.len();
    if n < 2 || xs.len() != n {
        return None;
    }
    let (slope, intercept) = if const_term {
        let xm = mean_f(xs);
        let ym = mean_f(ys);
        let mut cov = 0.0;
        let mut var = 0.0;
        for (x, y) in xs.iter().zip(ys) {
            cov += (x - xm) * (y - ym);
            var += (x - xm).powi(2);
        }
        if var == 0.0 {
            return None;
        }
        let m = cov / var;
        (m, ym - m * xm)
    } else {
        let sum_xy: f64 = xs.iter().zip(ys).map(|(x, y)| x * y).sum();
        let sum_xx: f64 = xs.iter().map(|x| x * x).sum();
        if sum_xx == 0.0 {
            return None;
        }
        (sum_xy / sum_xx, 0.0)
    };
    let y_mean = mean_f(ys);
    let mut ss_resid = 0.0;
    let mut ss_reg = 0.0;
    let mut ss_tot = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let pred = slope * x + intercept;
        ss_resid += (y - pred).powi(2);
        ss_reg += (pred - y_mean).powi(2);
        ss_tot += (y - y_mean).powi(2);
    }
    let df = if const_term { n as f64 - 2.0 } else { n as f64 - 1.0 };
    let se_y = (ss_resid / df.max(1.0)).sqrt();
    let sum_xx_dev: f64 = if const_term {
        let xm = mean_f(xs);
        xs.iter().map(|x| (x - xm).powi(2)).sum()
    } else {
        xs.iter().map(|x| x * x).sum()
    };
    let se_slope = se_y / sum_xx_dev.sqrt().max(1e-300);
    let se_intercept = if const_term {
        let xm = mean_f(xs);
        se_y * ((1.0 / n as f64) + xm * xm / sum_xx_dev).sqrt()
    } else {
        0.0
    };
    let r2 = if ss_tot > 0.0 { 1.0 - ss_resid / ss_tot } else { 1.0 };
    let f_stat = if df > 0.0 && ss_resid > 0.0 {
        ss_reg / (ss_resid / df)
    } else {
        f64::INFINITY
    };
    Some(RegStats {
        slope,
        intercept,
        se_slope,
        se_intercept,
        r2,
        se_y,
        f_stat,
        df,
        ss_reg,
        ss_resid,
    })
}

fn mean_f(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn default_x_series(len: usize) -> Vec<f64> {
    (1..=len).map(|n| n as f64).collect()
}

/// `TREND(known_ys, [known_xs], [new_xs], [const=true])` (`spec.md`
/// §4.10.16): ordinary least squares, predicted for each `new_xs` entry.
pub struct TrendFn;
impl BuiltinFunction for TrendFn {
    fn name(&self) -> &'static str {
        "TREND"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| {
            vec![
                range_spec(),
                range_spec().optional(),
                range_spec().optional(),
                bool_spec().with_default(Value::Bool(true)),
            ]
        })
    }
    fn returns_array(&self) -> bool {
        true
    }
    fn call_range(&self, args: &[ArgValue], _state: &InterpreterState) -> Range {
        let ys = numbers_of(&as_range(&args[0]));
        let xs = {
            let r = as_range(&args[1]);
            if r.width() * r.height() == 0 {
                default_x_series(ys.len())
            } else {
                numbers_of(&r)
            }
        };
        let xs = if xs.is_empty() { default_x_series(ys.len()) } else { xs };
        let new_xs_range = as_range(&args[2]);
        let new_xs_raw = numbers_of(&new_xs_range);
        let new_xs = if new_xs_range.width() * new_xs_range.height() == 0 || new_xs_raw.is_empty() {
            xs.clone()
        } else {
            new_xs_raw
        };
        let const_term = as_bool(&args[3]).unwrap_or(true);
        let Some(stats) = regression_stats(&ys, &xs, const_term) else {
            return Range::from_scalar(Value::Error(num_err()));
        };
        let rows = new_xs
            .into_iter()
            .map(|x| vec![Value::number(stats.slope * x + stats.intercept)])
            .collect();
        Range::only_values(rows)
    }
    fn size_of_result_array(&self, args: &[formualizer_parse::Ast], state: &InterpreterState) -> ArraySize {
        trend_growth_size(args, state)
    }
}

/// Shared `size_of_result_array` for `TREND`/`GROWTH` (`spec.md` §4.10.11):
/// predicted height is the cell count of `new_x` when supplied, else the
/// cell count of `known_y` — matching `call_range`'s single-column output
/// so the prediction is exact rather than merely an over-approximation.
fn trend_growth_size(args: &[formualizer_parse::Ast], state: &InterpreterState) -> ArraySize {
    let known_y_count = args
        .first()
        .map(|a| {
            let r = state.evaluate_range(a);
            r.width() * r.height()
        })
        .unwrap_or(1);
    let new_x_count = args.get(2).map(|a| {
        let r = state.evaluate_range(a);
        r.width() * r.height()
    });
    let n = match new_x_count {
        Some(0) | None => known_y_count,
        Some(c) => c,
    };
    ArraySize::fixed(1, n.max(1))
}

/// `GROWTH(known_ys, [known_xs], [new_xs], [const=true])` (`spec.md`
/// §4.10.17): exponential fit `y = b*m^x`, via log-linearization.
pub struct GrowthFn;
impl BuiltinFunction for GrowthFn {
    fn name(&self) -> &'static str {
        "GROWTH"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| {
            vec![
                range_spec(),
                range_spec().optional(),
                range_spec().optional(),
                bool_spec().with_default(Value::Bool(true)),
            ]
        })
    }
    fn returns_array(&self) -> bool {
        true
    }
    fn call_range(&self, args: &[ArgValue], _state: &InterpreterState) -> Range {
        let ys = numbers_of(&as_range(&args[0]));
        if ys.iter().any(|y| *y <= 0.0) {
            return Range::from_scalar(Value::Error(num_err()));
        }
        let ln_ys: Vec<f64> = ys.iter().map(|y| y.ln()).collect();
        let xs = {
            let r = as_range(&args[1]);
            if r.width() * r.height() == 0 {
                default_x_series(ys.len())
            } else {
                numbers_of(&r)
            }
        };
        let xs = if xs.is_empty() { default_x_series(ys.len()) } else { xs };
        let new_xs_range = as_range(&args[2]);
        let new_xs_raw = numbers_of(&new_xs_range);
        let new_xs = if new_xs_range.width() * new_xs_range.height() == 0 || new_xs_raw.is_empty() {
            xs.clone()
        } else {
            new_xs_raw
        };
        let const_term = as_bool(&args[3]).unwrap_or(true);
        let Some(stats) = regression_stats(&ln_ys, &xs, const_term) else {
            return Range::from_scalar(Value::Error(num_err()));
        };
        let rows = new_xs
            .into_iter()
            .map(|x| vec![Value::number((stats.slope * x + stats.intercept).exp())])
            .collect();
        Range::only_values(rows)
    }
    fn size_of_result_array(&self, args: &[formualizer_parse::Ast], state: &InterpreterState) -> ArraySize {
        trend_growth_size(args, state)
    }
}

/// `size_of_result_array` discipline for `LINEST`/`LOGEST`'s `stats` arg
/// (`spec.md` §4.10.11): only a literal `FALSE` narrows the prediction to
/// `2×1`; a literal `TRUE`, an omitted arg, or any non-literal expression
/// all get the conservative `2×5` so the spill engine's `actual <=
/// predicted` invariant never breaks on a dynamic `stats` argument.
fn linest_logest_size(args: &[formualizer_parse::Ast]) -> ArraySize {
    match args.get(3) {
        Some(formualizer_parse::Ast::Bool(false)) => ArraySize::fixed(2, 1),
        _ => ArraySize::fixed(2, 5),
    }
}

fn linest_table(stats: RegStats, want_stats: bool) -> Range {
    if !want_stats {
        return Range::only_values(vec![vec![Value::number(stats.slope), Value::number(stats.intercept)]]);
    }
    Range::only_values(vec![
        vec![Value::number(stats.slope), Value::number(stats.intercept)],
        vec![Value::number(stats.se_slope), Value::number(stats.se_intercept)],
        vec![Value::number(stats.r2), Value::number(stats.se_y)],
        vec![Value::number(stats.f_stat), Value::number(stats.df)],
        vec![Value::number(stats.ss_reg), Value::number(stats.ss_resid)],
    ])
}

/// `LINEST(known_ys, [known_xs], [const=true], [stats=false])`
/// (`spec.md` §4.10.18): single-regressor ordinary least squares. Result
/// shape is `2×1` normally, `2×5` when `stats` is `TRUE`.
pub struct LinestFn;
impl BuiltinFunction for LinestFn {
    fn name(&self) -> &'static str {
        "LINEST"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| {
            vec![
                range_spec(),
                range_spec().optional(),
                bool_spec().with_default(Value::Bool(true)),
                bool_spec().with_default(Value::Bool(false)),
            ]
        })
    }
    fn returns_array(&self) -> bool {
        true
    }
    fn call_range(&self, args: &[ArgValue], _state: &InterpreterState) -> Range {
        let ys = numbers_of(&as_range(&args[0]));
        let xs = {
            let r = as_range(&args[1]);
            if r.width() * r.height() == 0 {
                default_x_series(ys.len())
            } else {
                numbers_of(&r)
            }
        };
        let xs = if xs.is_empty() { default_x_series(ys.len()) } else { xs };
        let const_term = as_bool(&args[2]).unwrap_or(true);
        let want_stats = as_bool(&args[3]).unwrap_or(false);
        let Some(stats) = regression_stats(&ys, &xs, const_term) else {
            return Range::from_scalar(Value::Error(num_err()));
        };
        linest_table(stats, want_stats)
    }
    fn size_of_result_array(&self, args: &[formualizer_parse::Ast], _state: &InterpreterState) -> ArraySize {
        linest_logest_size(args)
    }
}

/// `LOGEST(known_ys, [known_xs], [const=true], [stats=false])`
/// (`spec.md` §4.10.19): exponential-fit analogue of `LINEST`, computed
/// in log space and exponentiated back for the coefficient row.
pub struct LogestFn;
impl BuiltinFunction for LogestFn {
    fn name(&self) -> &'static str {
        "LOGEST"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| {
            vec![
                range_spec(),
                range_spec().optional(),
                bool_spec().with_default(Value::Bool(true)),
                bool_spec().with_default(Value::Bool(false)),
            ]
        })
    }
    fn returns_array(&self) -> bool {
        true
    }
    fn call_range(&self, args: &[ArgValue], _state: &InterpreterState) -> Range {
        let ys = numbers_of(&as_range(&args[0]));
        if ys.iter().any(|y| *y <= 0.0) {
            return Range::from_scalar(Value::Error(num_err()));
        }
        let ln_ys: Vec<f64> = ys.iter().map(|y| y.ln()).collect();
        let xs = {
            let r = as_range(&args[1]);
            if r.width() * r.height() == 0 {
                default_x_series(ys.len())
            } else {
                numbers_of(&r)
            }
        };
        let xs = if xs.is_empty() { default_x_series(ys.len()) } else { xs };
        let const_term = as_bool(&args[2]).unwrap_or(true);
        let want_stats = as_bool(&args[3]).unwrap_or(false);
        let Some(stats) = regression_stats(&ln_ys, &xs, const_term) else {
            return Range::from_scalar(Value::Error(num_err()));
        };
        let m = stats.slope.exp();
        let b = stats.intercept.exp();
        if !want_stats {
            return Range::only_values(vec![vec![Value::number(m), Value::number(b)]]);
        }
        Range::only_values(vec![
            vec![Value::number(m), Value::number(b)],
            vec![Value::number(stats.se_slope), Value::number(stats.se_intercept)],
            vec![Value::number(stats.r2), Value::number(stats.se_y)],
            vec![Value::number(stats.f_stat), Value::number(stats.df)],
            vec![Value::number(stats.ss_reg), Value::number(stats.ss_resid)],
        ])
    }
    fn size_of_result_array(&self, args: &[formualizer_parse::Ast], _state: &InterpreterState) -> ArraySize {
        linest_logest_size(args)
    }
}

pub fn register(reg: &mut crate::registry::FunctionRegistry) {
    use std::sync::Arc;
    reg.register_google_sheets(Arc::new(SortFn));
    reg.register_google_sheets(Arc::new(UniqueFn));
    reg.register_google_sheets(Arc::new(FlattenFn));
    reg.register_google_sheets(Arc::new(ChooseColsFn));
    reg.register_google_sheets(Arc::new(ChooseRowsFn));
    reg.register_google_sheets(Arc::new(HStackFn));
    reg.register_google_sheets(Arc::new(VStackFn));
    reg.register_google_sheets(Arc::new(WrapColsFn));
    reg.register_google_sheets(Arc::new(WrapRowsFn));
    reg.register_google_sheets(Arc::new(ToColFn));
    reg.register_google_sheets(Arc::new(ToRowFn));
    reg.register_google_sheets(Arc::new(SequenceFn));
    reg.register_google_sheets(Arc::new(FrequencyFn));
    reg.register_google_sheets(Arc::new(MDetermFn));
    reg.register_google_sheets(Arc::new(MInverseFn));
    reg.register_google_sheets(Arc::new(MUnitFn));
    reg.register_google_sheets(Arc::new(TrendFn));
    reg.register_google_sheets(Arc::new(GrowthFn));
    reg.register_google_sheets(Arc::new(LinestFn));
    reg.register_google_sheets(Arc::new(LogestFn));
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn mdeterm_2x2() {
        let r = Range::only_values(vec![
            vec![Value::number(1.0), Value::number(2.0)],
            vec![Value::number(3.0), Value::number(4.0)],
        ]);
        let m = square_matrix(&r).unwrap();
        // det([[1,2],[3,4]]) = 1*4 - 2*3 = -2
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn dedupe_preserves_first_occurrence_order() {
        let rows = vec![
            vec![Value::number(1.0)],
            vec![Value::number(2.0)],
            vec![Value::number(1.0)],
        ];
        let out = dedupe_vectors(rows, false);
        assert_eq!(out, vec![vec![Value::number(1.0)], vec![Value::number(2.0)]]);
    }

    #[test]
    fn sequence_fills_row_major() {
        let rows_count = 2usize;
        let cols = 3usize;
        let mut grid = Vec::new();
        for r in 0..rows_count {
            let mut row = Vec::new();
            for c in 0..cols {
                row.push((r * cols + c) as f64 + 1.0);
            }
            grid.push(row);
        }
        assert_eq!(grid[1], vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn regression_recovers_exact_line() {
        let xs = vec![1.0, 2.0, 3.0, 4.0];
        let ys = vec![3.0, 5.0, 7.0, 9.0];
        let stats = regression_stats(&ys, &xs, true).unwrap();
        assert!((stats.slope - 2.0).abs() < 1e-9);
        assert!((stats.intercept - 1.0).abs() < 1e-9);
        assert!((stats.r2 - 1.0).abs() < 1e-9);
    }

    /// Builds a diagonally-dominant `n×n` matrix from `seed`, which Gauss
    /// elimination never rejects as singular, for properties that need "any
    /// invertible matrix" rather than a specific one.
    fn diagonally_dominant_matrix(n: usize, seed: &[f64]) -> Vec<Vec<f64>> {
        let mut m = vec![vec![0.0; n]; n];
        let mut it = seed.iter().cycle();
        for i in 0..n {
            for j in 0..n {
                m[i][j] = *it.next().unwrap();
            }
            // Off-diagonal entries are at most 50 in magnitude and a row has
            // at most 5 of them (n <= 6), so +400 keeps every row strictly
            // diagonally dominant regardless of n — Gershgorin guarantees
            // invertibility.
            m[i][i] += 400.0;
        }
        m
    }

    proptest::proptest! {
        /// `A * MINVERSE(A) ≈ I` within `1e-8` for any diagonally-dominant
        /// (hence invertible) `n×n` matrix, `n` in `2..=6` (`spec.md` §8
        /// item 2).
        #[test]
        fn minverse_is_a_true_inverse(
            n in 2_usize..=6,
            seed in proptest::collection::vec(-50.0_f64..50.0, 36),
        ) {
            let a = diagonally_dominant_matrix(n, &seed);
            let inv = invert_matrix(a.clone()).expect("diagonally dominant matrices are invertible");
            for i in 0..n {
                for j in 0..n {
                    let dot: f64 = (0..n).map(|k| a[i][k] * inv[k][j]).sum();
                    let expected = if i == j { 1.0 } else { 0.0 };
                    prop_assert!(
                        (dot - expected).abs() < 1e-8,
                        "cell ({i},{j}) = {dot}, expected {expected}"
                    );
                }
            }
        }

        /// `sum(FREQUENCY(data, bins)) == data.len()` for any data/bins pair
        /// (`spec.md` §8 item 3) — every value lands in exactly one bucket.
        #[test]
        fn frequency_bucket_counts_sum_to_input_len(
            data in proptest::collection::vec(-1000.0_f64..1000.0, 0..50),
            mut bins in proptest::collection::vec(-1000.0_f64..1000.0, 0..10),
        ) {
            bins.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let counts = frequency_counts(&data, &bins);
            prop_assert_eq!(counts.len(), bins.len() + 1);
            let total: u32 = counts.iter().sum();
            prop_assert_eq!(total as usize, data.len());
        }
    }
}
