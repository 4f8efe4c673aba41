//! Info and unit/type conversion (`spec.md` §4.15, C15).

use std::sync::OnceLock;

use formualizer_common::{ArgKind, ArgSpec, ExcelError, ExcelErrorKind, Value};
use formualizer_parse::Ast;

use crate::interpreter::InterpreterState;
use crate::registry::{ArgValue, BuiltinFunction};

use super::helpers::*;

/// `TYPE(x)` (`spec.md` §4.15): array detection must run *before* argument
/// evaluation when the argument is a direct cell reference to an array
/// root or an inline `{…}` literal, so this is lazy
/// (`does_not_need_arguments_to_be_computed`).
pub struct TypeFn;
impl BuiltinFunction for TypeFn {
    fn name(&self) -> &'static str {
        "TYPE"
    }
    fn does_not_need_arguments_to_be_computed(&self) -> bool {
        true
    }
    fn call_lazy(&self, args: &[Ast], state: &InterpreterState) -> Value {
        let Some(arg) = args.first() else {
            return Value::Error(na_err());
        };
        if matches!(arg, Ast::ArrayLiteral(_)) {
            return Value::number(64.0);
        }
        if let Ast::CellReference(r) = arg {
            if let formualizer_common::Ref::Cell { sheet, coord, .. } = r {
                if state
                    .sheet
                    .is_array_root(sheet.as_deref().or(state.current_sheet), coord.col, coord.row)
                {
                    return Value::number(64.0);
                }
            }
        }
        if matches!(arg, Ast::RangeReference(_)) {
            return Value::number(64.0);
        }
        let v = state.evaluate(arg);
        Value::number(match v {
            Value::Number(..) | Value::Empty => 1.0,
            Value::Text(_) => 2.0,
            Value::Bool(_) => 4.0,
            Value::Error(_) => 16.0,
        })
    }
}

/// `ERROR.TYPE(x)` (`spec.md` §4.15): error-inspecting, so it does not
/// short-circuit on an error argument — handled by registering the
/// descriptor with `NoError` unset (evaluator's generic short-circuit only
/// triggers for non-error-inspecting calls; here we evaluate normally but
/// the argument is `Any`, so an error scalar reaches `call` directly).
pub struct ErrorTypeFn;
impl BuiltinFunction for ErrorTypeFn {
    fn name(&self) -> &'static str {
        "ERROR.TYPE"
    }
    fn does_not_need_arguments_to_be_computed(&self) -> bool {
        true
    }
    fn call_lazy(&self, args: &[Ast], state: &InterpreterState) -> Value {
        let Some(arg) = args.first() else {
            return Value::Error(na_err());
        };
        match state.evaluate(arg) {
            Value::Error(e) => match e.kind.error_type_code() {
                Some(code) => Value::number(code as f64),
                None => Value::Error(na_err()),
            },
            _ => Value::Error(na_err()),
        }
    }
}

/// `ISERROR(x)` (`spec.md` §4.2): error-inspecting, so it evaluates its
/// own argument (`call_lazy`) rather than going through the evaluator's
/// generic error short-circuit.
pub struct IsErrorFn;
impl BuiltinFunction for IsErrorFn {
    fn name(&self) -> &'static str {
        "ISERROR"
    }
    fn does_not_need_arguments_to_be_computed(&self) -> bool {
        true
    }
    fn call_lazy(&self, args: &[Ast], state: &InterpreterState) -> Value {
        let Some(arg) = args.first() else {
            return Value::Error(na_err());
        };
        Value::Bool(matches!(state.evaluate(arg), Value::Error(_)))
    }
}

/// `ISNA(x)` (`spec.md` §4.2): true only for the `NA` error kind.
pub struct IsNaFn;
impl BuiltinFunction for IsNaFn {
    fn name(&self) -> &'static str {
        "ISNA"
    }
    fn does_not_need_arguments_to_be_computed(&self) -> bool {
        true
    }
    fn call_lazy(&self, args: &[Ast], state: &InterpreterState) -> Value {
        let Some(arg) = args.first() else {
            return Value::Error(na_err());
        };
        Value::Bool(matches!(
            state.evaluate(arg),
            Value::Error(e) if e.kind == formualizer_common::ExcelErrorKind::Na
        ))
    }
}

/// `IFERROR(value, value_if_error)` (`spec.md` §4.2): evaluates `value`
/// once and only falls through to `value_if_error` (default `""`) when it
/// is an error — the textbook error-inspecting function that must not
/// short-circuit on its first argument.
pub struct IfErrorFn;
impl BuiltinFunction for IfErrorFn {
    fn name(&self) -> &'static str {
        "IFERROR"
    }
    fn does_not_need_arguments_to_be_computed(&self) -> bool {
        true
    }
    fn call_lazy(&self, args: &[Ast], state: &InterpreterState) -> Value {
        let Some(value_arg) = args.first() else {
            return Value::Error(na_err());
        };
        match state.evaluate(value_arg) {
            Value::Error(_) => match args.get(1) {
                Some(fallback) => state.evaluate(fallback),
                None => Value::text(String::new()),
            },
            other => other,
        }
    }
}

/// `ISBLANK(x)` (`spec.md` §4.1): `Empty` must be distinguishable from
/// text `""` here, unlike in numeric/text coercion contexts.
pub struct IsBlankFn;
impl BuiltinFunction for IsBlankFn {
    fn name(&self) -> &'static str {
        "ISBLANK"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![any_spec()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        Value::Bool(matches!(as_scalar(&args[0]), Value::Empty))
    }
}

pub struct IsDateFn;
impl BuiltinFunction for IsDateFn {
    fn name(&self) -> &'static str {
        "ISDATE"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![any_spec()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let v = as_scalar(&args[0]);
        Value::Bool(matches!(
            v,
            Value::Number(_, formualizer_common::NumberSubtype::Date)
                | Value::Number(_, formualizer_common::NumberSubtype::DateTime)
        ))
    }
}

/// Validate without backtracking (`spec.md` §4.15): one `@`, non-empty
/// local/domain, a `.` in the domain with a non-empty TLD, no whitespace.
pub struct IsEmailFn;
impl BuiltinFunction for IsEmailFn {
    fn name(&self) -> &'static str {
        "ISEMAIL"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![string_spec()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let s = match as_string(&args[0]) {
            Ok(s) => s,
            Err(e) => return Value::Error(e),
        };
        Value::Bool(is_email(&s))
    }
}

fn is_email(s: &str) -> bool {
    if s.chars().any(|c| c.is_whitespace()) {
        return false;
    }
    let mut parts = s.splitn(2, '@');
    let (local, domain) = match (parts.next(), parts.next()) {
        (Some(l), Some(d)) => (l, d),
        _ => return false,
    };
    if local.is_empty() || domain.is_empty() {
        return false;
    }
    if domain.contains('@') {
        return false;
    }
    match domain.rfind('.') {
        Some(idx) if idx > 0 && idx < domain.len() - 1 => true,
        _ => false,
    }
}

/// `^https?://.+` case-insensitive (`spec.md` §4.15).
pub struct IsUrlFn;
impl BuiltinFunction for IsUrlFn {
    fn name(&self) -> &'static str {
        "ISURL"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![string_spec()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let s = match as_string(&args[0]) {
            Ok(s) => s,
            Err(e) => return Value::Error(e),
        };
        let lower = s.to_ascii_lowercase();
        let matches = (lower.starts_with("http://") && lower.len() > 7)
            || (lower.starts_with("https://") && lower.len() > 8);
        Value::Bool(matches)
    }
}

/// A unit's category and its multiplicative factor relative to the
/// category's base unit. Declared, closed table — `spec.md` §4.15 /
/// §9 Open Questions requires that lookup never fall through to
/// inherited/prototype names; a plain `match` can't do that by
/// construction, which is the point.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum UnitCategory {
    Length,
    Mass,
    Time,
    Volume,
    Area,
    Speed,
    Pressure,
    Energy,
    Force,
    Temperature,
}

fn unit_factor(unit: &str) -> Option<(UnitCategory, f64)> {
    use UnitCategory::*;
    Some(match unit {
        // length, base = meter
        "m" => (Length, 1.0),
        "mi" => (Length, 1609.344),
        "Nmi" => (Length, 1852.0),
        "in" => (Length, 0.0254),
        "ft" => (Length, 0.3048),
        "yd" => (Length, 0.9144),
        "cm" => (Length, 0.01),
        "km" => (Length, 1000.0),
        "mm" => (Length, 0.001),
        // mass, base = gram
        "g" => (Mass, 1.0),
        "kg" => (Mass, 1000.0),
        "mg" => (Mass, 0.001),
        "lbm" => (Mass, 453.59237),
        "ozm" => (Mass, 28.349523125),
        "stone" => (Mass, 6350.29318),
        // time, base = second
        "sec" => (Time, 1.0),
        "s" => (Time, 1.0),
        "min" => (Time, 60.0),
        "hr" => (Time, 3600.0),
        "day" => (Time, 86400.0),
        // volume, base = liter
        "l" => (Volume, 1.0),
        "tsp" => (Volume, 0.00492892),
        "tbs" => (Volume, 0.0147868),
        "gal" => (Volume, 3.78541),
        "qt" => (Volume, 0.946353),
        "pt" => (Volume, 0.473176),
        "cup" => (Volume, 0.236588),
        "ml" => (Volume, 0.001),
        "m3" => (Volume, 1000.0),
        // area, base = square meter
        "m2" => (Area, 1.0),
        "ha" => (Area, 10_000.0),
        "acre" => (Area, 4046.8564224),
        "uk_acre" => (Area, 4046.8564224),
        // speed, base = meter/second
        "m/s" => (Speed, 1.0),
        "mph" => (Speed, 0.44704),
        "km/h" => (Speed, 0.277778),
        "kn" => (Speed, 0.514444),
        // pressure, base = pascal
        "Pa" => (Pressure, 1.0),
        "atm" => (Pressure, 101325.0),
        "mmHg" => (Pressure, 133.322),
        // energy, base = joule
        "J" => (Energy, 1.0),
        "cal" => (Energy, 4.184),
        "eV" => (Energy, 1.602176634e-19),
        "Wh" => (Energy, 3600.0),
        "BTU" => (Energy, 1055.05585),
        // force, base = newton
        "N" => (Force, 1.0),
        "dyn" => (Force, 1e-5),
        "lbf" => (Force, 4.4482216152605),
        // temperature — handled specially, factor unused
        "C" => (Temperature, 1.0),
        "F" => (Temperature, 1.0),
        "K" => (Temperature, 1.0),
        _ => return None,
    })
}

fn temp_to_celsius(unit: &str, v: f64) -> Option<f64> {
    Some(match unit {
        "C" => v,
        "F" => (v - 32.0) * 5.0 / 9.0,
        "K" => v - 273.15,
        _ => return None,
    })
}

fn celsius_to_temp(unit: &str, c: f64) -> Option<f64> {
    Some(match unit {
        "C" => c,
        "F" => c * 9.0 / 5.0 + 32.0,
        "K" => c + 273.15,
        _ => return None,
    })
}

pub struct ConvertFn;
impl BuiltinFunction for ConvertFn {
    fn name(&self) -> &'static str {
        "CONVERT"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![num_spec(), string_spec(), string_spec()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let v = match as_f64(&args[0]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let from = match as_string(&args[1]) {
            Ok(s) => s,
            Err(e) => return Value::Error(e),
        };
        let to = match as_string(&args[2]) {
            Ok(s) => s,
            Err(e) => return Value::Error(e),
        };
        let (Some((from_cat, from_factor)), Some((to_cat, to_factor))) =
            (unit_factor(&from), unit_factor(&to))
        else {
            return Value::Error(ExcelError::new(ExcelErrorKind::Na));
        };
        if from_cat != to_cat {
            return Value::Error(ExcelError::new(ExcelErrorKind::Na));
        }
        if from_cat == UnitCategory::Temperature {
            let Some(c) = temp_to_celsius(&from, v) else {
                return Value::Error(ExcelError::new(ExcelErrorKind::Na));
            };
            let Some(out) = celsius_to_temp(&to, c) else {
                return Value::Error(ExcelError::new(ExcelErrorKind::Na));
            };
            return Value::number(out);
        }
        Value::number(v * from_factor / to_factor)
    }
}

/// `TO_DATE(x)` (`spec.md` §1/§3.5): numbers pass through re-tagged
/// `DATE`; text is parsed against `Config::date_formats` in order (the
/// google-sheets defaults are `[MM/DD/YYYY, MM/DD/YY, YYYY/MM/DD]`) and
/// converted to a serial via the `DateTimeHelper` collaborator (`spec.md`
/// §6.3) — this core does not hand-roll date-serial arithmetic itself.
pub struct ToDateFn;
impl BuiltinFunction for ToDateFn {
    fn name(&self) -> &'static str {
        "TO_DATE"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![any_spec()])
    }
    fn call(&self, args: &[ArgValue], state: &InterpreterState) -> Value {
        match as_scalar(&args[0]) {
            Value::Error(e) => Value::Error(e),
            Value::Number(n, _) => Value::tagged(n, formualizer_common::NumberSubtype::Date),
            Value::Bool(b) => {
                Value::tagged(if b { 1.0 } else { 0.0 }, formualizer_common::NumberSubtype::Date)
            }
            Value::Empty => Value::tagged(0.0, formualizer_common::NumberSubtype::Date),
            Value::Text(s) => match parse_configured_date(&s, state) {
                Some(serial) => Value::tagged(serial as f64, formualizer_common::NumberSubtype::Date),
                None => Value::Error(value_err()),
            },
        }
    }
}

/// Try each of `Config::date_formats` in order against `s`, matching the
/// `MM`/`DD`/`YYYY`/`YY` placeholder positions literally (the google-sheets
/// formats only ever separate fields with `/`).
fn parse_configured_date(s: &str, state: &InterpreterState) -> Option<i64> {
    let parts: Vec<&str> = s.trim().splitn(3, |c| c == '/' || c == '-').collect();
    if parts.len() != 3 {
        return None;
    }
    for fmt in &state.config.date_formats {
        let fields: Vec<&str> = fmt.splitn(3, '/').collect();
        if fields.len() != 3 {
            continue;
        }
        let mut year = None;
        let mut month = None;
        let mut day = None;
        for (field, part) in fields.iter().zip(parts.iter()) {
            let n: i32 = match part.parse() {
                Ok(n) => n,
                Err(_) => return None,
            };
            match *field {
                "YYYY" => year = Some(n),
                "YY" => year = Some(if n < 100 { 2000 + n } else { n }),
                "MM" => month = Some(n as u32),
                "DD" => day = Some(n as u32),
                _ => {}
            }
        }
        if let (Some(y), Some(m), Some(d)) = (year, month, day) {
            let date = crate::traits::SimpleDate::new(y, m, d);
            return Some(state.datetime.date_to_serial(date));
        }
    }
    None
}

macro_rules! to_type_fn {
    ($struct_name:ident, $name:literal, $subtype:expr, $coerce:expr) => {
        pub struct $struct_name;
        impl BuiltinFunction for $struct_name {
            fn name(&self) -> &'static str {
                $name
            }
            fn parameters(&self) -> &'static [ArgSpec] {
                static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
                P.get_or_init(|| vec![any_spec()])
            }
            fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
                $coerce(as_scalar(&args[0]))
            }
        }
    };
}

to_type_fn!(ToTextFn, "TO_TEXT", (), |v: Value| Value::text(
    match v {
        Value::Text(s) => s,
        Value::Number(n, _) => format_number(n),
        Value::Bool(b) => if b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Empty => String::new(),
        Value::Error(e) => return Value::Error(e),
    }
));

to_type_fn!(ToPureNumberFn, "TO_PURE_NUMBER", (), |v: Value| match v {
    Value::Number(n, _) => Value::number(n),
    Value::Error(e) => Value::Error(e),
    other => Value::number(match other {
        Value::Bool(b) => {
            if b {
                1.0
            } else {
                0.0
            }
        }
        Value::Empty => 0.0,
        Value::Text(s) => match s.trim().parse::<f64>() {
            Ok(n) => n,
            Err(_) => return Value::Error(value_err()),
        },
        _ => unreachable!(),
    }),
});

to_type_fn!(ToPercentFn, "TO_PERCENT", (), |v: Value| match v {
    Value::Error(e) => Value::Error(e),
    other => {
        let n = match other {
            Value::Number(n, _) => n,
            Value::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Empty => 0.0,
            Value::Text(s) => match s.trim().trim_end_matches('%').parse::<f64>() {
                Ok(n) => n,
                Err(_) => return Value::Error(value_err()),
            },
            _ => unreachable!(),
        };
        Value::tagged(n, formualizer_common::NumberSubtype::Percent)
    }
});

to_type_fn!(ToDollarsFn, "TO_DOLLARS", (), |v: Value| match v {
    Value::Error(e) => Value::Error(e),
    other => {
        let n = match other {
            Value::Number(n, _) => n,
            Value::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Empty => 0.0,
            Value::Text(s) => match s.trim().trim_start_matches('$').parse::<f64>() {
                Ok(n) => n,
                Err(_) => return Value::Error(value_err()),
            },
            _ => unreachable!(),
        };
        Value::tagged(n, formualizer_common::NumberSubtype::Currency)
    }
});

pub fn register(reg: &mut crate::registry::FunctionRegistry) {
    use std::sync::Arc;
    reg.register_google_sheets(Arc::new(TypeFn));
    reg.register_google_sheets(Arc::new(ErrorTypeFn));
    reg.register_google_sheets(Arc::new(IsErrorFn));
    reg.register_google_sheets(Arc::new(IsNaFn));
    reg.register_google_sheets(Arc::new(IfErrorFn));
    reg.register_google_sheets(Arc::new(IsBlankFn));
    reg.register_google_sheets(Arc::new(IsDateFn));
    reg.register_google_sheets(Arc::new(IsEmailFn));
    reg.register_google_sheets(Arc::new(IsUrlFn));
    reg.register_google_sheets(Arc::new(ConvertFn));
    reg.register_google_sheets(Arc::new(ToDateFn));
    reg.register_google_sheets(Arc::new(ToTextFn));
    reg.register_google_sheets(Arc::new(ToPureNumberFn));
    reg.register_google_sheets(Arc::new(ToPercentFn));
    reg.register_google_sheets(Arc::new(ToDollarsFn));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation_rejects_double_at() {
        assert!(!is_email("a@b@c.com"));
        assert!(is_email("a@b.com"));
        assert!(!is_email("a@b"));
        assert!(!is_email("@b.com"));
    }

    #[test]
    fn convert_excludes_prototype_lookups() {
        assert!(unit_factor("toString").is_none());
        assert!(unit_factor("constructor").is_none());
    }

    #[test]
    fn convert_temperature_round_trips() {
        let c = temp_to_celsius("F", 32.0).unwrap();
        assert!((c - 0.0).abs() < 1e-9);
        let f = celsius_to_temp("F", 100.0).unwrap();
        assert!((f - 212.0).abs() < 1e-9);
    }

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

    /// google-sheets default date formats try `MM/DD/YYYY` first; `TO_DATE`
    /// must resolve `"03/04/2021"` as March 4th, not April 3rd.
    #[test]
    fn to_date_parses_mm_dd_yyyy_before_yyyy_mm_dd() {
        use crate::traits::{DateTimeHelper, GregorianDateTimeHelper, SimpleDate};

        let config = formualizer_parse::Config::google_sheets();
        let registry = crate::registry::FunctionRegistry::new();
        let sheet = EmptySheet;
        let locale = NoopLocale;
        let dt = GregorianDateTimeHelper;
        let state = InterpreterState {
            config: &config,
            registry: &registry,
            sheet: &sheet,
            locale: &locale,
            datetime: &dt,
            current_sheet: None,
        };
        let serial = parse_configured_date("03/04/2021", &state).unwrap();
        assert_eq!(dt.serial_to_date(serial), SimpleDate::new(2021, 3, 4));
    }
}
