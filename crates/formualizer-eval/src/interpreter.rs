//! Recursive AST walker, argument coercion, and spill glue (`spec.md` §4.7,
//! C7). This is the sole boundary (`InterpreterState::evaluate`) through
//! which an external scheduler consumes the core (`spec.md` §6.4).

use formualizer_common::{ArgKind, ArgSpec, ExcelError, ExcelErrorKind, Range, Value};
use formualizer_parse::{Ast, Config, Operator};

use crate::arithmetic;
use crate::registry::{ArgValue, FunctionRegistry};
use crate::traits::{DateTimeHelper, LocaleContext, SheetView};

/// Everything a formula evaluation needs: the current formula's address,
/// the sheet view handle, the registry, the config, and the locale
/// context (`spec.md` §6.4).
pub struct InterpreterState<'a> {
    pub config: &'a Config,
    pub registry: &'a FunctionRegistry,
    pub sheet: &'a dyn SheetView,
    pub locale: &'a dyn LocaleContext,
    pub datetime: &'a dyn DateTimeHelper,
    /// The sheet the formula being evaluated lives on, used to resolve
    /// unqualified references.
    pub current_sheet: Option<&'a str>,
}

/// Internal result of evaluating one AST node: either a scalar or a
/// rectangular value, before the caller decides how to use it.
enum EvalResult {
    Scalar(Value),
    Range(Range),
}

impl EvalResult {
    fn into_scalar(self) -> Value {
        match self {
            EvalResult::Scalar(v) => v,
            // "Top-left scalar" rule (`spec.md` §4.7 point 5).
            EvalResult::Range(r) => r.get(0, 0),
        }
    }

    fn into_range(self) -> Range {
        match self {
            EvalResult::Scalar(v) => Range::from_scalar(v),
            EvalResult::Range(r) => r,
        }
    }

    fn shape(&self) -> (usize, usize) {
        match self {
            EvalResult::Scalar(_) => (1, 1),
            EvalResult::Range(r) => (r.width(), r.height()),
        }
    }
}

impl<'a> InterpreterState<'a> {
    /// `spec.md` §6.4: the sole boundary through which an external
    /// scheduler consumes the core.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip(self, ast)))]
    pub fn evaluate(&self, ast: &Ast) -> Value {
        let result = self.eval_node(ast).into_scalar();
        #[cfg(feature = "tracing")]
        tracing::trace!(?result, "evaluated");
        result
    }

    /// Used by kernels (`Range`-typed `ArgSpec`s, higher-order functions)
    /// that need the full rectangular value rather than a collapsed
    /// scalar.
    pub fn evaluate_range(&self, ast: &Ast) -> Range {
        self.eval_node(ast).into_range()
    }

    fn eval_node(&self, ast: &Ast) -> EvalResult {
        match ast {
            Ast::Number(n) => EvalResult::Scalar(Value::number(*n)),
            Ast::Text(s) => EvalResult::Scalar(Value::text(s.clone())),
            Ast::Bool(b) => EvalResult::Scalar(Value::Bool(*b)),
            Ast::ErrorLit(k) => EvalResult::Scalar(Value::Error(ExcelError::new(*k))),
            Ast::CellReference(r) => EvalResult::Scalar(self.resolve_cell(r)),
            Ast::RangeReference(r) => EvalResult::Range(self.resolve_area(r)),
            Ast::NamedExpression(name) => {
                // Google-sheets mode: TRUE/FALSE are recognized identifiers
                // even when a user-defined name tries to shadow them
                // (`spec.md` §3.5). The lexer already special-cases the
                // literal token; a `NamedExpression` reaching here is an
                // unresolved name.
                let _ = name;
                EvalResult::Scalar(Value::Error(ExcelError::new(ExcelErrorKind::Name)))
            }
            Ast::ArrayLiteral(rows) => EvalResult::Range(self.eval_array_literal(rows)),
            Ast::UnaryOp { op, arg } => self.eval_unary(*op, arg),
            Ast::BinaryOp { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs),
            Ast::Procedure { name, args } => self.eval_procedure(name, args),
        }
    }

    fn resolve_cell(&self, r: &formualizer_common::Ref) -> Value {
        match r {
            formualizer_common::Ref::Cell { sheet, coord, .. } => {
                self.sheet
                    .get_cell(sheet.as_deref().or(self.current_sheet), coord.col, coord.row)
            }
            _ => Value::Error(ExcelError::new(ExcelErrorKind::Ref)),
        }
    }

    fn resolve_area(&self, r: &formualizer_common::Ref) -> Range {
        match r {
            formualizer_common::Ref::Cell { sheet, coord, .. } => Range::from_scalar(
                self.sheet
                    .get_cell(sheet.as_deref().or(self.current_sheet), coord.col, coord.row),
            ),
            formualizer_common::Ref::Area { sheet, start, end, .. } => {
                let sheet = sheet.as_deref().or(self.current_sheet);
                let (r0, r1) = (start.row.min(end.row), start.row.max(end.row));
                let (c0, c1) = (start.col.min(end.col), start.col.max(end.col));
                let rows = (r0..=r1)
                    .map(|row| (c0..=c1).map(|col| self.sheet.get_cell(sheet, col, row)).collect())
                    .collect();
                Range::only_values(rows)
            }
            formualizer_common::Ref::ColRange {
                sheet,
                start_col,
                end_col,
            } => {
                let sheet = sheet.as_deref().or(self.current_sheet);
                let max_row = self.config.max_rows.saturating_sub(1);
                let (c0, c1) = (*start_col.min(end_col), *start_col.max(end_col));
                let rows = (0..=max_row.min(4095))
                    .map(|row| (c0..=c1).map(|col| self.sheet.get_cell(sheet, col, row)).collect())
                    .collect();
                Range::only_values(rows)
            }
            formualizer_common::Ref::RowRange {
                sheet,
                start_row,
                end_row,
            } => {
                let sheet = sheet.as_deref().or(self.current_sheet);
                let max_col = self.config.max_cols.saturating_sub(1);
                let (r0, r1) = (*start_row.min(end_row), *start_row.max(end_row));
                let rows = (r0..=r1)
                    .map(|row| (0..=max_col.min(4095)).map(|col| self.sheet.get_cell(sheet, col, row)).collect())
                    .collect();
                Range::only_values(rows)
            }
        }
    }

    fn eval_array_literal(&self, rows: &[Vec<Ast>]) -> Range {
        let data = rows
            .iter()
            .map(|row| row.iter().map(|cell| self.evaluate(cell)).collect())
            .collect();
        Range::only_values(data)
    }

    /* ---------------------------- operators ---------------------------- */

    fn eval_unary(&self, op: Operator, arg: &Ast) -> EvalResult {
        let v = self.eval_node(arg);
        self.map_elementwise_1(v, |x| self.apply_unary_scalar(op, x))
    }

    fn apply_unary_scalar(&self, op: Operator, v: Value) -> Value {
        if let Value::Error(_) = v {
            return v;
        }
        let n = match self.coerce_number(&v) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        match op {
            Operator::Neg => Value::number(arithmetic::unary_minus(n)),
            Operator::Pos => Value::number(n),
            Operator::Percent => Value::tagged(
                arithmetic::unary_percent(n),
                formualizer_common::NumberSubtype::Percent,
            ),
            _ => Value::Error(ExcelError::new(ExcelErrorKind::Error)),
        }
    }

    fn eval_binary(&self, op: Operator, lhs: &Ast, rhs: &Ast) -> EvalResult {
        let l = self.eval_node(lhs);
        let r = self.eval_node(rhs);
        self.map_elementwise_2(l, r, |a, b| self.apply_binary_scalar(op, a, b))
    }

    fn apply_binary_scalar(&self, op: Operator, l: Value, r: Value) -> Value {
        if let Value::Error(e) = &l {
            return Value::Error(e.clone());
        }
        if let Value::Error(e) = &r {
            return Value::Error(e.clone());
        }
        match op {
            Operator::Add => self.numeric2(l, r, arithmetic::add_eps),
            Operator::Sub => self.numeric2(l, r, arithmetic::subtract),
            Operator::Mul => self.numeric2(l, r, arithmetic::multiply),
            Operator::Div => match (self.coerce_number(&l), self.coerce_number(&r)) {
                (Ok(a), Ok(b)) => match arithmetic::divide(a, b) {
                    Ok(n) => Value::number(n),
                    Err(e) => Value::Error(e),
                },
                (Err(e), _) | (_, Err(e)) => Value::Error(e),
            },
            Operator::Pow => match (self.coerce_number(&l), self.coerce_number(&r)) {
                (Ok(a), Ok(b)) => match arithmetic::pow(a, b) {
                    Ok(n) => Value::number(n),
                    Err(e) => Value::Error(e),
                },
                (Err(e), _) | (_, Err(e)) => Value::Error(e),
            },
            Operator::Concat => Value::text(format!(
                "{}{}",
                self.coerce_text(&l),
                self.coerce_text(&r)
            )),
            Operator::Eq | Operator::Ne | Operator::Lt | Operator::Gt | Operator::Le | Operator::Ge => {
                let eq = arithmetic::values_equal(&l, &r, self.config.is_google_sheets());
                let ord = arithmetic::compare(&l, &r);
                let result = match op {
                    Operator::Eq => eq,
                    Operator::Ne => !eq,
                    Operator::Lt => ord == std::cmp::Ordering::Less,
                    Operator::Gt => ord == std::cmp::Ordering::Greater,
                    Operator::Le => ord != std::cmp::Ordering::Greater,
                    Operator::Ge => ord != std::cmp::Ordering::Less,
                    _ => unreachable!(),
                };
                Value::Bool(result)
            }
            Operator::Range | Operator::Union => Value::Error(ExcelError::new(ExcelErrorKind::Error)),
            Operator::Neg | Operator::Pos | Operator::Percent => {
                Value::Error(ExcelError::new(ExcelErrorKind::Error))
            }
        }
    }

    fn numeric2(&self, l: Value, r: Value, f: impl Fn(f64, f64) -> f64) -> Value {
        match (self.coerce_number(&l), self.coerce_number(&r)) {
            (Ok(a), Ok(b)) => Value::number(f(a, b)),
            (Err(e), _) | (_, Err(e)) => Value::Error(e),
        }
    }

    /// Elementwise unary broadcast (`spec.md` §4.7 point 4).
    fn map_elementwise_1(&self, v: EvalResult, f: impl Fn(Value) -> Value) -> EvalResult {
        match v {
            EvalResult::Scalar(s) => EvalResult::Scalar(f(s)),
            EvalResult::Range(r) => {
                let rows = r
                    .raw_data()
                    .iter()
                    .map(|row| row.iter().cloned().map(&f).collect())
                    .collect();
                EvalResult::Range(Range::only_values(rows))
            }
        }
    }

    /// Elementwise binary broadcast: 1x1 broadcasts across; otherwise
    /// shapes must be equal or one dimension is 1 (`spec.md` §4.7 point 4).
    fn map_elementwise_2(
        &self,
        l: EvalResult,
        r: EvalResult,
        f: impl Fn(Value, Value) -> Value,
    ) -> EvalResult {
        let (lw, lh) = l.shape();
        let (rw, rh) = r.shape();
        if (lw, lh) == (1, 1) || (rw, rh) == (1, 1) || (lw, lh) == (rw, rh) {
            match (l, r) {
                (EvalResult::Scalar(a), EvalResult::Scalar(b)) => EvalResult::Scalar(f(a, b)),
                (l, r) => {
                    let lr = l.into_range();
                    let rr = r.into_range();
                    let width = lr.width().max(rr.width());
                    let height = lr.height().max(rr.height());
                    let rows = (0..height)
                        .map(|row| {
                            (0..width)
                                .map(|col| {
                                    let a = lr.get(row % lr.height(), col % lr.width());
                                    let b = rr.get(row % rr.height(), col % rr.width());
                                    f(a, b)
                                })
                                .collect()
                        })
                        .collect();
                    EvalResult::Range(Range::only_values(rows))
                }
            }
        } else {
            EvalResult::Scalar(Value::Error(ExcelError::new(ExcelErrorKind::Value)))
        }
    }

    /* ---------------------------- coercion ---------------------------- */

    pub fn coerce_number(&self, v: &Value) -> Result<f64, ExcelError> {
        match v {
            Value::Number(n, _) => Ok(*n),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Empty => Ok(0.0),
            Value::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| ExcelError::new(ExcelErrorKind::Value)),
            Value::Error(e) => Err(e.clone()),
        }
    }

    pub fn coerce_text(&self, v: &Value) -> String {
        match v {
            Value::Text(s) => s.clone(),
            Value::Number(n, _) => format_number(*n),
            Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Value::Empty => String::new(),
            Value::Error(e) => e.to_string(),
        }
    }

    pub fn coerce_bool(&self, v: &Value) -> Result<bool, ExcelError> {
        match v {
            Value::Bool(b) => Ok(*b),
            Value::Number(n, _) => Ok(*n != 0.0),
            Value::Empty => Ok(false),
            Value::Text(s) => match s.to_ascii_uppercase().as_str() {
                "TRUE" => Ok(true),
                "FALSE" => Ok(false),
                _ => Err(ExcelError::new(ExcelErrorKind::Value)),
            },
            Value::Error(e) => Err(e.clone()),
        }
    }

    /* ---------------------------- procedures ---------------------------- */

    fn eval_procedure(&self, name: &str, args: &[Ast]) -> EvalResult {
        let Some(func) = self.registry.lookup(self.config.compatibility_mode, name) else {
            return EvalResult::Scalar(Value::Error(ExcelError::new(ExcelErrorKind::Name)));
        };

        if func.does_not_need_arguments_to_be_computed() {
            return EvalResult::Scalar(func.call_lazy(args, self));
        }

        match self.resolve_call_args(func.parameters(), func.repeat_last_args(), func.expand_ranges(), args) {
            Ok(resolved) => {
                // First-error-wins short circuit (`spec.md` §4.7 point 6).
                for a in &resolved {
                    if let ArgValue::Scalar(Value::Error(e)) = a {
                        return EvalResult::Scalar(Value::Error(e.clone()));
                    }
                }

                if func.returns_array() {
                    return EvalResult::Range(func.call_range(&resolved, self));
                }

                if !func.vectorization_forbidden() {
                    if let Some((w, h)) = self.vector_shape(func.parameters(), func.repeat_last_args(), &resolved) {
                        return EvalResult::Range(self.vectorize(func.as_ref(), func.parameters(), func.repeat_last_args(), &resolved, w, h));
                    }
                }

                EvalResult::Scalar(func.call(&resolved, self))
            }
            Err(e) => EvalResult::Scalar(Value::Error(e)),
        }
    }

    fn spec_at(specs: &[ArgSpec], repeat: u8, idx: usize) -> Option<&ArgSpec> {
        if specs.is_empty() {
            return None;
        }
        if idx < specs.len() {
            Some(&specs[idx])
        } else if repeat > 0 {
            let tail_start = specs.len() - (repeat as usize);
            let offset = (idx - tail_start) % (repeat as usize);
            Some(&specs[tail_start + offset])
        } else {
            specs.last()
        }
    }

    fn resolve_call_args<'s>(
        &self,
        specs: &'s [ArgSpec],
        repeat: u8,
        expand_ranges: bool,
        args: &[Ast],
    ) -> Result<Vec<ArgValue>, ExcelError> {
        let mut out = Vec::with_capacity(args.len().max(specs.len()));

        for (idx, node) in args.iter().enumerate() {
            let Some(spec) = Self::spec_at(specs, repeat, idx) else {
                out.push(ArgValue::Scalar(self.evaluate(node)));
                continue;
            };
            let evaluated = self.eval_node(node);
            if expand_ranges && idx >= specs.len().saturating_sub(repeat as usize) {
                if let EvalResult::Range(r) = evaluated {
                    for v in r.values_top_left_to_bottom_right() {
                        out.push(ArgValue::Scalar(self.coerce_to(spec, v.clone())?));
                    }
                    continue;
                }
            }
            out.push(self.resolve_one_arg(spec, evaluated)?);
        }

        // Fill in optional trailing defaults that were never supplied.
        for idx in args.len()..specs.len() {
            let spec = &specs[idx];
            if let Some(default) = &spec.default {
                out.push(ArgValue::Scalar(default.clone()));
            } else if spec.optional {
                out.push(if spec.argument_type == ArgKind::Range {
                    ArgValue::Range(formualizer_common::Range::empty())
                } else {
                    ArgValue::Scalar(Value::Empty)
                });
            } else {
                return Err(ExcelError::na());
            }
        }

        Ok(out)
    }

    fn resolve_one_arg(&self, spec: &ArgSpec, evaluated: EvalResult) -> Result<ArgValue, ExcelError> {
        match spec.argument_type {
            ArgKind::Range => Ok(ArgValue::Range(evaluated.into_range())),
            _ => {
                let (w, h) = evaluated.shape();
                if (w, h) != (1, 1) {
                    // Vectorization candidate: hand the whole range back
                    // and let the caller decide (vector_shape/vectorize).
                    return Ok(ArgValue::Range(evaluated.into_range()));
                }
                let scalar = evaluated.into_scalar();
                Ok(ArgValue::Scalar(self.coerce_to(spec, scalar)?))
            }
        }
    }

    fn coerce_to(&self, spec: &ArgSpec, v: Value) -> Result<Value, ExcelError> {
        if let Value::Error(e) = &v {
            return Err(e.clone());
        }
        let coerced = match spec.argument_type {
            ArgKind::Number | ArgKind::Integer => {
                let mut n = self.coerce_number(&v)?;
                if spec.argument_type == ArgKind::Integer {
                    n = n.trunc();
                }
                if let Some(min) = spec.min {
                    if n < min {
                        return Err(ExcelError::num(formualizer_common::ExcelMessage::NumberRange));
                    }
                }
                if let Some(max) = spec.max {
                    if n > max {
                        return Err(ExcelError::num(formualizer_common::ExcelMessage::NumberRange));
                    }
                }
                if let Some(gt) = spec.greater_than {
                    if !(n > gt) {
                        return Err(ExcelError::num(formualizer_common::ExcelMessage::NumberRange));
                    }
                }
                if let Some(lt) = spec.less_than {
                    if !(n < lt) {
                        return Err(ExcelError::num(formualizer_common::ExcelMessage::NumberRange));
                    }
                }
                if spec.pass_subtype {
                    Value::tagged(n, v.subtype())
                } else {
                    Value::number(n)
                }
            }
            ArgKind::Boolean => Value::Bool(self.coerce_bool(&v)?),
            ArgKind::String => Value::text(self.coerce_text(&v)),
            ArgKind::Scalar | ArgKind::NoError | ArgKind::Any => v,
            ArgKind::Range => unreachable!("handled earlier"),
        };
        Ok(coerced)
    }

    /// Determine whether any scalar-kind argument carries a >1-cell range
    /// that must be vectorized, and if so the canonical shape to iterate.
    fn vector_shape(&self, specs: &[ArgSpec], repeat: u8, resolved: &[ArgValue]) -> Option<(usize, usize)> {
        let mut shape = None;
        for (idx, a) in resolved.iter().enumerate() {
            let Some(spec) = Self::spec_at(specs, repeat, idx) else {
                continue;
            };
            if matches!(spec.argument_type, ArgKind::Range) {
                continue;
            }
            if let ArgValue::Range(r) = a {
                if r.width() * r.height() > 1 {
                    shape = Some((r.width(), r.height()));
                }
            }
        }
        shape
    }

    fn vectorize(
        &self,
        func: &dyn crate::registry::BuiltinFunction,
        specs: &[ArgSpec],
        repeat: u8,
        resolved: &[ArgValue],
        width: usize,
        height: usize,
    ) -> Range {
        let mut rows = Vec::with_capacity(height);
        for row in 0..height {
            let mut out_row = Vec::with_capacity(width);
            for col in 0..width {
                let mut cell_args = Vec::with_capacity(resolved.len());
                for (idx, a) in resolved.iter().enumerate() {
                    let spec = Self::spec_at(specs, repeat, idx);
                    let is_range_spec = spec.map(|s| matches!(s.argument_type, ArgKind::Range)).unwrap_or(false);
                    match a {
                        ArgValue::Range(r) if !is_range_spec => {
                            let rr = row % r.height().max(1);
                            let cc = col % r.width().max(1);
                            let scalar = r.get(rr, cc);
                            let coerced = match spec {
                                Some(s) => self.coerce_to(s, scalar).unwrap_or(Value::Error(
                                    ExcelError::new(ExcelErrorKind::Value),
                                )),
                                None => scalar,
                            };
                            cell_args.push(ArgValue::Scalar(coerced));
                        }
                        other => cell_args.push(other.clone()),
                    }
                }
                let has_error = cell_args
                    .iter()
                    .any(|a| matches!(a, ArgValue::Scalar(Value::Error(_))));
                let v = if has_error {
                    cell_args
                        .iter()
                        .find_map(|a| match a {
                            ArgValue::Scalar(Value::Error(e)) => Some(Value::Error(e.clone())),
                            _ => None,
                        })
                        .unwrap()
                } else {
                    func.call(&cell_args, self)
                };
                out_row.push(v);
            }
            rows.push(out_row);
        }
        Range::only_values(rows)
    }
}

/// Mimics spreadsheet general-number formatting closely enough for
/// `&`-concatenation and `TEXT`-adjacent coercion (not a full number
/// formatter — `DOLLAR`/`FIXED` own that, see C13).
fn format_number(n: f64) -> String {
    if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FunctionRegistry;
    use crate::traits::{GregorianDateTimeHelper, LocaleContext};
    use formualizer_parse::parse;
    use std::cmp::Ordering;

    struct EmptySheet;
    impl SheetView for EmptySheet {
        fn get_cell(&self, _sheet: Option<&str>, _col: u32, _row: u32) -> Value {
            Value::Empty
        }
    }

    struct InvariantLocale {
        funcs: rustc_hash::FxHashMap<String, String>,
        errors: rustc_hash::FxHashMap<String, ExcelErrorKind>,
    }
    impl LocaleContext for InvariantLocale {
        fn collate(&self, a: &str, b: &str, case_insensitive: bool) -> Ordering {
            if case_insensitive {
                a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase())
            } else {
                a.cmp(b)
            }
        }
        fn get_function_mapping(&self) -> &rustc_hash::FxHashMap<String, String> {
            &self.funcs
        }
        fn get_error_mapping(&self) -> &rustc_hash::FxHashMap<String, ExcelErrorKind> {
            &self.errors
        }
    }

    fn eval(formula: &str) -> Value {
        let config = Config::google_sheets();
        let ast = parse(formula, config.clone()).unwrap();
        let registry = FunctionRegistry::new();
        let sheet = EmptySheet;
        let locale = InvariantLocale {
            funcs: Default::default(),
            errors: Default::default(),
        };
        let dt = GregorianDateTimeHelper;
        let state = InterpreterState {
            config: &config,
            registry: &registry,
            sheet: &sheet,
            locale: &locale,
            datetime: &dt,
            current_sheet: None,
        };
        state.evaluate(&ast)
    }

    #[test]
    fn epsilon_rounding_property() {
        assert_eq!(eval("=ADD(ADD(0.1,0.2),-0.3)"), Value::number(0.0));
    }

    #[test]
    fn cross_type_ordering_property() {
        assert_eq!(eval("=GT(\"text\",1)"), Value::Bool(true));
        assert_eq!(eval("=LT(1,\"text\")"), Value::Bool(true));
        assert_eq!(eval("=EQ(1,\"1\")"), Value::Bool(false));
    }

    #[test]
    fn locale_aware_equality_property() {
        assert_eq!(eval("=EQ(\"HELLO\",\"hello\")"), Value::Bool(true));
    }

    #[test]
    fn isbetween_epsilon_property() {
        assert_eq!(
            eval("=ISBETWEEN(ADD(0.1,0.2),0,0.3,TRUE,TRUE)"),
            Value::Bool(true)
        );
        assert_eq!(
            eval("=ISBETWEEN(ADD(0.1,0.2),0,0.3,TRUE,FALSE)"),
            Value::Bool(false)
        );
    }

    #[test]
    fn simple_arithmetic_short_circuits_on_error() {
        assert_eq!(eval("=1+#DIV/0!"), Value::Error(ExcelError::new(ExcelErrorKind::Div)));
    }

    #[test]
    fn division_by_zero() {
        assert_eq!(eval("=1/0"), Value::Error(ExcelError::new(ExcelErrorKind::Div)));
    }
}
