//! Bond, depreciation, and rate-solving kernels (`spec.md` §4.12, C12).
//!
//! Day-count arithmetic is delegated to `state.datetime` (`traits::
//! DateTimeHelper`) throughout — this module never hard-codes a calendar
//! epoch or leap-year rule, only the bond-math formulas layered on top.

use std::sync::OnceLock;

use formualizer_common::{ArgSpec, ExcelError, ExcelMessage, Value};

use crate::interpreter::InterpreterState;
use crate::registry::{ArgValue, BuiltinFunction};
use crate::traits::{Basis, SimpleDate};

use super::helpers::*;

fn basis_spec() -> ArgSpec {
    int_spec().with_default(Value::number(0.0))
}
fn freq_spec() -> ArgSpec {
    int_spec()
}

fn basis_of(args: &[ArgValue], idx: usize) -> Result<Basis, ExcelError> {
    let code = as_i64(&args[idx])?;
    Basis::from_code(code).ok_or_else(|| num_msg(ExcelMessage::NumberRange))
}

fn date_of(state: &InterpreterState, args: &[ArgValue], idx: usize) -> Result<SimpleDate, ExcelError> {
    let serial = as_i64(&args[idx])?;
    Ok(state.datetime.serial_to_date(serial))
}

fn days_in_month(year: i32, month: u32) -> u32 {
    use chrono::Datelike;
    let next = if month == 12 {
        chrono::NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        chrono::NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next.map(|d| (d - chrono::Duration::days(1)).day())
        .unwrap_or(28)
}

fn add_months(d: SimpleDate, months: i64) -> SimpleDate {
    let total = (d.year as i64) * 12 + (d.month as i64 - 1) + months;
    let year = total.div_euclid(12) as i32;
    let month = (total.rem_euclid(12) + 1) as u32;
    let day = d.day.min(days_in_month(year, month));
    SimpleDate::new(year, month, day)
}

/// Bracketing coupon dates around `settlement` on the `maturity`-anchored
/// schedule stepping by `12 / frequency` months (`spec.md` §4.12.2–§4.12.5
/// coupon-date family: PCD/NCD).
fn pcd_ncd(settlement: SimpleDate, maturity: SimpleDate, frequency: i64) -> (SimpleDate, SimpleDate) {
    let step = 12 / frequency;
    let mut ncd = maturity;
    loop {
        let candidate = add_months(ncd, -step);
        if candidate <= settlement {
            return (candidate, ncd);
        }
        ncd = candidate;
    }
}

/// 30/360-style day count between two dates without the `/360` division
/// `DateTimeHelper::year_fraction` applies — used by the COUPDAYS family
/// when `basis` is one of the 30/360 variants.
fn thirty360_days(
    state: &InterpreterState,
    basis: Basis,
    start: SimpleDate,
    end: SimpleDate,
) -> f64 {
    let (s, e) = match basis {
        Basis::Us30_360 => state.datetime.to_basis_us(start, end),
        Basis::European30_360 => state.datetime.to_basis_eu(start, end),
        _ => (start, end),
    };
    let dy = (e.year - s.year) as f64;
    let dm = (e.month as i32 - s.month as i32) as f64;
    let dd = (e.day as i32 - s.day as i32) as f64;
    dy * 360.0 + dm * 30.0 + dd
}

fn day_count(state: &InterpreterState, basis: Basis, start: SimpleDate, end: SimpleDate) -> f64 {
    match basis {
        Basis::Us30_360 | Basis::European30_360 => thirty360_days(state, basis, start, end),
        _ => (state.datetime.date_to_serial(end) - state.datetime.date_to_serial(start)) as f64,
    }
}

fn coupdays(state: &InterpreterState, basis: Basis, pcd: SimpleDate, ncd: SimpleDate, frequency: i64) -> f64 {
    match basis {
        Basis::Us30_360 | Basis::European30_360 => 360.0 / frequency as f64,
        _ => day_count(state, basis, pcd, ncd),
    }
}

fn coupnum(ncd: SimpleDate, maturity: SimpleDate, step: i64) -> f64 {
    let mut n = 0.0;
    let mut d = ncd;
    while d <= maturity {
        n += 1.0;
        d = add_months(d, step);
    }
    n
}

/// Shared Newton-Raphson solver (`spec.md` §4.12.6): propagates an error
/// from `f`/`df` rather than substituting `NaN`, and reports
/// `ConvergenceFailure` after 100 iterations or a near-zero derivative.
fn newton(
    mut f: impl FnMut(f64) -> Result<f64, ExcelError>,
    mut df: impl FnMut(f64) -> Result<f64, ExcelError>,
    guess: f64,
) -> Result<f64, ExcelError> {
    let mut x = guess;
    for _iter in 0..100 {
        let fx = f(x)?;
        if fx.abs() < 1e-10 {
            #[cfg(feature = "tracing")]
            tracing::trace!(iterations = _iter, root = x, "newton converged");
            return Ok(x);
        }
        let dfx = df(x)?;
        if dfx.abs() < 1e-14 {
            return Err(num_msg(ExcelMessage::ConvergenceFailure));
        }
        x -= fx / dfx;
    }
    Err(num_msg(ExcelMessage::ConvergenceFailure))
}

/// `k - 1 + DSC/E` exponents and the period cashflow schedule shared by
/// `PRICE`, `DURATION`, and `MDURATION` (`spec.md` §4.12.7–§4.12.9).
struct CouponSchedule {
    exponents: Vec<f64>,
    cashflows: Vec<f64>,
}

fn coupon_schedule(
    state: &InterpreterState,
    settlement: SimpleDate,
    maturity: SimpleDate,
    rate: f64,
    redemption: f64,
    frequency: i64,
    basis: Basis,
) -> CouponSchedule {
    let (pcd, ncd) = pcd_ncd(settlement, maturity, frequency);
    let e = coupdays(state, basis, pcd, ncd, frequency);
    let dsc = day_count(state, basis, settlement, ncd);
    let n = coupnum(ncd, maturity, 12 / frequency) as i64;
    let coupon = 100.0 * rate / frequency as f64;
    let mut exponents = Vec::with_capacity(n as usize);
    let mut cashflows = Vec::with_capacity(n as usize);
    for k in 1..=n {
        exponents.push((k - 1) as f64 + dsc / e);
        cashflows.push(if k == n { coupon + redemption } else { coupon });
    }
    CouponSchedule { exponents, cashflows }
}

fn accrued_fraction(state: &InterpreterState, settlement: SimpleDate, maturity: SimpleDate, frequency: i64, basis: Basis) -> f64 {
    let (pcd, ncd) = pcd_ncd(settlement, maturity, frequency);
    let e = coupdays(state, basis, pcd, ncd, frequency);
    let a = day_count(state, basis, pcd, settlement);
    a / e
}

fn price_given_yield(
    state: &InterpreterState,
    settlement: SimpleDate,
    maturity: SimpleDate,
    rate: f64,
    yld: f64,
    redemption: f64,
    frequency: i64,
    basis: Basis,
) -> f64 {
    let sched = coupon_schedule(state, settlement, maturity, rate, redemption, frequency, basis);
    let y = yld / frequency as f64;
    let dirty: f64 = sched
        .exponents
        .iter()
        .zip(&sched.cashflows)
        .map(|(t, cf)| cf / (1.0 + y).powf(*t))
        .sum();
    let accrued = accrued_fraction(state, settlement, maturity, frequency, basis) * 100.0 * rate / frequency as f64;
    dirty - accrued
}

pub struct PriceFn;
impl BuiltinFunction for PriceFn {
    fn name(&self) -> &'static str {
        "PRICE"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| {
            vec![
                num_spec(),
                num_spec(),
                num_spec(),
                num_spec(),
                num_spec(),
                freq_spec(),
                basis_spec(),
            ]
        })
    }
    fn call(&self, args: &[ArgValue], state: &InterpreterState) -> Value {
        let settlement = match date_of(state, args, 0) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let maturity = match date_of(state, args, 1) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let rate = match as_f64(&args[2]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let yld = match as_f64(&args[3]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let redemption = match as_f64(&args[4]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let frequency = match as_i64(&args[5]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let basis = match basis_of(args, 6) {
            Ok(b) => b,
            Err(e) => return Value::Error(e),
        };
        if maturity <= settlement || frequency <= 0 {
            return Value::Error(num_err());
        }
        Value::number(price_given_yield(
            state, settlement, maturity, rate, yld, redemption, frequency, basis,
        ))
    }
}

/// Macaulay duration in years (`spec.md` §4.12.8): present-value-weighted
/// time to each cashflow, divided by the dirty price and the frequency.
pub struct DurationFn;
impl BuiltinFunction for DurationFn {
    fn name(&self) -> &'static str {
        "DURATION"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![num_spec(), num_spec(), num_spec(), num_spec(), freq_spec(), basis_spec()])
    }
    fn call(&self, args: &[ArgValue], state: &InterpreterState) -> Value {
        let settlement = match date_of(state, args, 0) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let maturity = match date_of(state, args, 1) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let coupon = match as_f64(&args[2]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let yld = match as_f64(&args[3]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let frequency = match as_i64(&args[4]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let basis = match basis_of(args, 5) {
            Ok(b) => b,
            Err(e) => return Value::Error(e),
        };
        if maturity <= settlement || frequency <= 0 {
            return Value::Error(num_err());
        }
        Value::number(macaulay_duration(state, settlement, maturity, coupon, yld, 100.0, frequency, basis))
    }
}

fn macaulay_duration(
    state: &InterpreterState,
    settlement: SimpleDate,
    maturity: SimpleDate,
    coupon: f64,
    yld: f64,
    redemption: f64,
    frequency: i64,
    basis: Basis,
) -> f64 {
    let sched = coupon_schedule(state, settlement, maturity, coupon, redemption, frequency, basis);
    let y = yld / frequency as f64;
    let mut dirty = 0.0;
    let mut weighted = 0.0;
    for (t, cf) in sched.exponents.iter().zip(&sched.cashflows) {
        let disc = cf / (1.0 + y).powf(*t);
        dirty += disc;
        weighted += t * disc;
    }
    (weighted / dirty) / frequency as f64
}

pub struct MDurationFn;
impl BuiltinFunction for MDurationFn {
    fn name(&self) -> &'static str {
        "MDURATION"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![num_spec(), num_spec(), num_spec(), num_spec(), freq_spec(), basis_spec()])
    }
    fn call(&self, args: &[ArgValue], state: &InterpreterState) -> Value {
        let settlement = match date_of(state, args, 0) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let maturity = match date_of(state, args, 1) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let coupon = match as_f64(&args[2]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let yld = match as_f64(&args[3]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let frequency = match as_i64(&args[4]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let basis = match basis_of(args, 5) {
            Ok(b) => b,
            Err(e) => return Value::Error(e),
        };
        if maturity <= settlement || frequency <= 0 {
            return Value::Error(num_err());
        }
        let dur = macaulay_duration(state, settlement, maturity, coupon, yld, 100.0, frequency, basis);
        Value::number(dur / (1.0 + yld / frequency as f64))
    }
}

/// Solves `PRICE(..., yield, ...) == pr` via Newton-Raphson with a
/// central-difference derivative (`spec.md` §4.12.6).
pub struct YieldFn;
impl BuiltinFunction for YieldFn {
    fn name(&self) -> &'static str {
        "YIELD"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| {
            vec![
                num_spec(),
                num_spec(),
                num_spec(),
                num_spec(),
                num_spec(),
                freq_spec(),
                basis_spec(),
            ]
        })
    }
    fn call(&self, args: &[ArgValue], state: &InterpreterState) -> Value {
        let settlement = match date_of(state, args, 0) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let maturity = match date_of(state, args, 1) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let rate = match as_f64(&args[2]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let pr = match as_f64(&args[3]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let redemption = match as_f64(&args[4]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let frequency = match as_i64(&args[5]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let basis = match basis_of(args, 6) {
            Ok(b) => b,
            Err(e) => return Value::Error(e),
        };
        if maturity <= settlement || frequency <= 0 {
            return Value::Error(num_err());
        }
        let h = 1e-6;
        let f = |y: f64| -> Result<f64, ExcelError> {
            Ok(price_given_yield(state, settlement, maturity, rate, y, redemption, frequency, basis) - pr)
        };
        let df = |y: f64| -> Result<f64, ExcelError> {
            let up = price_given_yield(state, settlement, maturity, rate, y + h, redemption, frequency, basis);
            let down = price_given_yield(state, settlement, maturity, rate, y - h, redemption, frequency, basis);
            Ok((up - down) / (2.0 * h))
        };
        match newton(f, df, rate.max(0.01)) {
            Ok(y) => Value::number(y),
            Err(e) => Value::Error(e),
        }
    }
}

pub struct DiscFn;
impl BuiltinFunction for DiscFn {
    fn name(&self) -> &'static str {
        "DISC"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![num_spec(), num_spec(), num_spec(), num_spec(), basis_spec()])
    }
    fn call(&self, args: &[ArgValue], state: &InterpreterState) -> Value {
        let settlement = match date_of(state, args, 0) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let maturity = match date_of(state, args, 1) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let pr = match as_f64(&args[2]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let redemption = match as_f64(&args[3]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let basis = match basis_of(args, 4) {
            Ok(b) => b,
            Err(e) => return Value::Error(e),
        };
        if maturity <= settlement || redemption == 0.0 {
            return Value::Error(num_err());
        }
        let yf = state.datetime.year_fraction(settlement, maturity, basis);
        Value::number((redemption - pr) / redemption / yf)
    }
}

pub struct PriceDiscFn;
impl BuiltinFunction for PriceDiscFn {
    fn name(&self) -> &'static str {
        "PRICEDISC"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![num_spec(), num_spec(), num_spec(), num_spec(), basis_spec()])
    }
    fn call(&self, args: &[ArgValue], state: &InterpreterState) -> Value {
        let settlement = match date_of(state, args, 0) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let maturity = match date_of(state, args, 1) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let discount = match as_f64(&args[2]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let redemption = match as_f64(&args[3]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let basis = match basis_of(args, 4) {
            Ok(b) => b,
            Err(e) => return Value::Error(e),
        };
        if maturity <= settlement {
            return Value::Error(num_err());
        }
        let yf = state.datetime.year_fraction(settlement, maturity, basis);
        Value::number(redemption * (1.0 - discount * yf))
    }
}

pub struct ReceivedFn;
impl BuiltinFunction for ReceivedFn {
    fn name(&self) -> &'static str {
        "RECEIVED"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![num_spec(), num_spec(), num_spec(), num_spec(), basis_spec()])
    }
    fn call(&self, args: &[ArgValue], state: &InterpreterState) -> Value {
        let settlement = match date_of(state, args, 0) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let maturity = match date_of(state, args, 1) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let investment = match as_f64(&args[2]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let discount = match as_f64(&args[3]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let basis = match basis_of(args, 4) {
            Ok(b) => b,
            Err(e) => return Value::Error(e),
        };
        if maturity <= settlement {
            return Value::Error(num_err());
        }
        let yf = state.datetime.year_fraction(settlement, maturity, basis);
        let denom = 1.0 - discount * yf;
        if denom == 0.0 {
            return Value::Error(ExcelError::div0());
        }
        Value::number(investment / denom)
    }
}

pub struct YieldDiscFn;
impl BuiltinFunction for YieldDiscFn {
    fn name(&self) -> &'static str {
        "YIELDDISC"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![num_spec(), num_spec(), num_spec(), num_spec(), basis_spec()])
    }
    fn call(&self, args: &[ArgValue], state: &InterpreterState) -> Value {
        let settlement = match date_of(state, args, 0) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let maturity = match date_of(state, args, 1) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let pr = match as_f64(&args[2]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let redemption = match as_f64(&args[3]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let basis = match basis_of(args, 4) {
            Ok(b) => b,
            Err(e) => return Value::Error(e),
        };
        if maturity <= settlement || pr == 0.0 {
            return Value::Error(num_err());
        }
        let yf = state.datetime.year_fraction(settlement, maturity, basis);
        Value::number((redemption / pr - 1.0) / yf)
    }
}

pub struct PriceMatFn;
impl BuiltinFunction for PriceMatFn {
    fn name(&self) -> &'static str {
        "PRICEMAT"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![num_spec(), num_spec(), num_spec(), num_spec(), num_spec(), basis_spec()])
    }
    fn call(&self, args: &[ArgValue], state: &InterpreterState) -> Value {
        let settlement = match date_of(state, args, 0) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let issue = match date_of(state, args, 1) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let maturity = match date_of(state, args, 2) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let rate = match as_f64(&args[3]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let yld = match as_f64(&args[4]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let basis = match basis_of(args, 5) {
            Ok(b) => b,
            Err(e) => return Value::Error(e),
        };
        if maturity <= settlement || settlement < issue {
            return Value::Error(num_err());
        }
        let dim = state.datetime.year_fraction(issue, maturity, basis);
        let dis = state.datetime.year_fraction(issue, settlement, basis);
        let dsm = state.datetime.year_fraction(settlement, maturity, basis);
        let numerator = 100.0 + dim * rate * 100.0;
        Value::number(numerator / (1.0 + dsm * yld) - dis * rate * 100.0)
    }
}

pub struct YieldMatFn;
impl BuiltinFunction for YieldMatFn {
    fn name(&self) -> &'static str {
        "YIELDMAT"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![num_spec(), num_spec(), num_spec(), num_spec(), num_spec(), basis_spec()])
    }
    fn call(&self, args: &[ArgValue], state: &InterpreterState) -> Value {
        let settlement = match date_of(state, args, 0) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let issue = match date_of(state, args, 1) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let maturity = match date_of(state, args, 2) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let rate = match as_f64(&args[3]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let pr = match as_f64(&args[4]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let basis = match basis_of(args, 5) {
            Ok(b) => b,
            Err(e) => return Value::Error(e),
        };
        if maturity <= settlement || settlement < issue {
            return Value::Error(num_err());
        }
        let dim = state.datetime.year_fraction(issue, maturity, basis);
        let dis = state.datetime.year_fraction(issue, settlement, basis);
        let dsm = state.datetime.year_fraction(settlement, maturity, basis);
        let num = 100.0 + dim * rate * 100.0;
        let denom = pr + dis * rate * 100.0;
        if denom == 0.0 || dsm == 0.0 {
            return Value::Error(ExcelError::div0());
        }
        Value::number((num / denom - 1.0) / dsm)
    }
}

pub struct IntRateFn;
impl BuiltinFunction for IntRateFn {
    fn name(&self) -> &'static str {
        "INTRATE"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![num_spec(), num_spec(), num_spec(), num_spec(), basis_spec()])
    }
    fn call(&self, args: &[ArgValue], state: &InterpreterState) -> Value {
        let settlement = match date_of(state, args, 0) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let maturity = match date_of(state, args, 1) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let investment = match as_f64(&args[2]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let redemption = match as_f64(&args[3]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let basis = match basis_of(args, 4) {
            Ok(b) => b,
            Err(e) => return Value::Error(e),
        };
        if maturity <= settlement || investment == 0.0 {
            return Value::Error(num_err());
        }
        let yf = state.datetime.year_fraction(settlement, maturity, basis);
        Value::number((redemption - investment) / investment / yf)
    }
}

/// Simplified accrued-interest model (`spec.md` §4.12.10): accrued
/// interest since `issue` scaled by the basis year fraction. The
/// `calc_method` argument (true = accrue from issue, false = accrue from
/// the last coupon date) selects which anchor date feeds the fraction.
pub struct AccrIntFn;
impl BuiltinFunction for AccrIntFn {
    fn name(&self) -> &'static str {
        "ACCRINT"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| {
            vec![
                num_spec(),
                num_spec(),
                num_spec(),
                num_spec(),
                num_spec(),
                freq_spec().with_default(Value::number(1.0)),
                basis_spec(),
                bool_spec().with_default(Value::Bool(true)),
            ]
        })
    }
    fn call(&self, args: &[ArgValue], state: &InterpreterState) -> Value {
        let issue = match date_of(state, args, 0) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let first_interest = match date_of(state, args, 1) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let settlement = match date_of(state, args, 2) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let rate = match as_f64(&args[3]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let par = match as_f64(&args[4]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let basis = match basis_of(args, 6) {
            Ok(b) => b,
            Err(e) => return Value::Error(e),
        };
        let calc_method = match as_bool(&args[7]) {
            Ok(b) => b,
            Err(e) => return Value::Error(e),
        };
        if settlement <= issue {
            return Value::Error(num_err());
        }
        let anchor = if calc_method { issue } else { first_interest.min(settlement) };
        let yf = state.datetime.year_fraction(anchor, settlement, basis);
        Value::number(par * rate * yf)
    }
}

/// French straight-line depreciation with a pro-rated first period
/// (`spec.md` §4.12.11).
pub struct AmorlincFn;
impl BuiltinFunction for AmorlincFn {
    fn name(&self) -> &'static str {
        "AMORLINC"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| {
            vec![
                num_spec(),
                num_spec(),
                num_spec(),
                num_spec(),
                int_spec(),
                num_spec(),
                basis_spec(),
            ]
        })
    }
    fn call(&self, args: &[ArgValue], state: &InterpreterState) -> Value {
        let cost = match as_f64(&args[0]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let date_purchased = match date_of(state, args, 1) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let first_period = match date_of(state, args, 2) {
            Ok(d) => d,
            Err(e) => return Value::Error(e),
        };
        let salvage = match as_f64(&args[3]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let period = match as_i64(&args[4]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let rate = match as_f64(&args[5]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let basis = match basis_of(args, 6) {
            Ok(b) => b,
            Err(e) => return Value::Error(e),
        };
        if period < 0 || rate <= 0.0 {
            return Value::Error(num_err());
        }
        let per_period = cost * rate;
        let prorated = cost * rate * state.datetime.year_fraction(date_purchased, first_period, basis);
        let result = if period == 0 {
            prorated.min(cost - salvage)
        } else {
            let mut depreciated = prorated;
            for _ in 1..period {
                depreciated += per_period;
            }
            let remaining = (cost - salvage - depreciated).max(0.0);
            per_period.min(remaining)
        };
        Value::number(result.max(0.0))
    }
}

/// Variable-rate declining-balance depreciation (`spec.md` §4.12.12):
/// double-declining balance that switches to straight-line for the
/// remainder once straight-line would depreciate faster, integrated over
/// whichever sub-period of `[start_period, end_period]` overlaps each
/// whole accounting period.
pub struct VdbFn;
impl BuiltinFunction for VdbFn {
    fn name(&self) -> &'static str {
        "VDB"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| {
            vec![
                num_spec(),
                num_spec(),
                num_spec(),
                num_spec(),
                num_spec(),
                num_spec().with_default(Value::number(2.0)),
                bool_spec().with_default(Value::Bool(false)),
            ]
        })
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let cost = match as_f64(&args[0]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let salvage = match as_f64(&args[1]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let life = match as_f64(&args[2]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let start_period = match as_f64(&args[3]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let end_period = match as_f64(&args[4]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let factor = match as_f64(&args[5]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let no_switch = match as_bool(&args[6]) {
            Ok(b) => b,
            Err(e) => return Value::Error(e),
        };
        if life <= 0.0 || start_period < 0.0 || end_period < start_period {
            return Value::Error(num_err());
        }
        let mut book = cost;
        let mut total = 0.0;
        let n = end_period.ceil() as i64;
        for period in 1..=n.max(1) {
            let period_start = (period - 1) as f64;
            let period_end = period as f64;
            let ddb = book * factor / life;
            let straight_remaining = (life - period_start).max(1e-9);
            let sln = (book - salvage) / straight_remaining;
            let dep = if no_switch { ddb } else { ddb.max(sln) };
            let dep = dep.clamp(0.0, (book - salvage).max(0.0));
            let overlap = (period_end.min(end_period) - period_start.max(start_period)).max(0.0);
            total += dep * overlap;
            book -= dep;
        }
        Value::number(total)
    }
}

/// Internal rate of return for irregular cashflow dates (`spec.md`
/// §4.12.13), solved via the shared Newton-Raphson contract.
pub struct XirrFn;
impl BuiltinFunction for XirrFn {
    fn name(&self) -> &'static str {
        "XIRR"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![range_spec(), range_spec(), num_spec().with_default(Value::number(0.1))])
    }
    fn call(&self, args: &[ArgValue], state: &InterpreterState) -> Value {
        let values = as_range(&args[0]);
        let dates = as_range(&args[1]);
        let guess = match as_f64(&args[2]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let cashflows = numbers_of(&values);
        let date_serials: Vec<f64> = dates.raw_numbers();
        if cashflows.len() != date_serials.len() {
            return Value::Error(value_msg(ExcelMessage::EqualLength));
        }
        if cashflows.len() < 2 {
            return Value::Error(num_err());
        }
        if !cashflows.iter().any(|v| *v > 0.0) || !cashflows.iter().any(|v| *v < 0.0) {
            return Value::Error(num_err());
        }
        let d0 = date_serials[0];
        let times: Vec<f64> = date_serials.iter().map(|d| (d - d0) / 365.0).collect();

        let f = |r: f64| -> Result<f64, ExcelError> {
            if 1.0 + r <= 0.0 {
                return Err(num_err());
            }
            Ok(cashflows
                .iter()
                .zip(&times)
                .map(|(cf, t)| cf / (1.0 + r).powf(*t))
                .sum())
        };
        let df = |r: f64| -> Result<f64, ExcelError> {
            if 1.0 + r <= 0.0 {
                return Err(num_err());
            }
            Ok(cashflows
                .iter()
                .zip(&times)
                .map(|(cf, t)| -t * cf / (1.0 + r).powf(t + 1.0))
                .sum())
        };
        match newton(f, df, guess) {
            Ok(r) => Value::number(r),
            Err(e) => Value::Error(e),
        }
    }
}

fn coup_params() -> &'static [ArgSpec] {
    static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
    P.get_or_init(|| vec![num_spec(), num_spec(), freq_spec(), basis_spec()])
}

fn coup_dates(
    state: &InterpreterState,
    args: &[ArgValue],
) -> Result<(SimpleDate, SimpleDate, i64, Basis, SimpleDate, SimpleDate), ExcelError> {
    let settlement = date_of(state, args, 0)?;
    let maturity = date_of(state, args, 1)?;
    let frequency = as_i64(&args[2])?;
    let basis = basis_of(args, 3)?;
    if maturity <= settlement || ![1, 2, 4].contains(&frequency) {
        return Err(num_err());
    }
    let (pcd, ncd) = pcd_ncd(settlement, maturity, frequency);
    Ok((settlement, maturity, frequency, basis, pcd, ncd))
}

/// Days from the previous coupon date to settlement (`spec.md` §4.12.2).
pub struct CoupDaysBsFn;
impl BuiltinFunction for CoupDaysBsFn {
    fn name(&self) -> &'static str {
        "COUPDAYBS"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        coup_params()
    }
    fn call(&self, args: &[ArgValue], state: &InterpreterState) -> Value {
        match coup_dates(state, args) {
            Ok((settlement, _, _, basis, pcd, _)) => {
                Value::number(day_count(state, basis, pcd, settlement))
            }
            Err(e) => Value::Error(e),
        }
    }
}

/// Total days in the coupon period containing settlement
/// (`spec.md` §4.12.2). Identity: `COUPDAYBS + COUPDAYSNC == COUPDAYS`.
pub struct CoupDaysFn;
impl BuiltinFunction for CoupDaysFn {
    fn name(&self) -> &'static str {
        "COUPDAYS"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        coup_params()
    }
    fn call(&self, args: &[ArgValue], state: &InterpreterState) -> Value {
        match coup_dates(state, args) {
            Ok((_, _, frequency, basis, pcd, ncd)) => {
                Value::number(coupdays(state, basis, pcd, ncd, frequency))
            }
            Err(e) => Value::Error(e),
        }
    }
}

/// Days from settlement to the next coupon date (`spec.md` §4.12.2).
pub struct CoupDaysNcFn;
impl BuiltinFunction for CoupDaysNcFn {
    fn name(&self) -> &'static str {
        "COUPDAYSNC"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        coup_params()
    }
    fn call(&self, args: &[ArgValue], state: &InterpreterState) -> Value {
        match coup_dates(state, args) {
            Ok((settlement, _, _, basis, _, ncd)) => {
                Value::number(day_count(state, basis, settlement, ncd))
            }
            Err(e) => Value::Error(e),
        }
    }
}

/// The coupon date immediately following settlement, as a date-tagged
/// serial (`spec.md` §4.12.2).
pub struct CoupNcdFn;
impl BuiltinFunction for CoupNcdFn {
    fn name(&self) -> &'static str {
        "COUPNCD"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        coup_params()
    }
    fn call(&self, args: &[ArgValue], state: &InterpreterState) -> Value {
        match coup_dates(state, args) {
            Ok((_, _, _, _, _, ncd)) => Value::tagged(
                state.datetime.date_to_serial(ncd) as f64,
                formualizer_common::NumberSubtype::Date,
            ),
            Err(e) => Value::Error(e),
        }
    }
}

/// The latest coupon date at or before settlement, as a date-tagged
/// serial (`spec.md` §4.12.2).
pub struct CoupPcdFn;
impl BuiltinFunction for CoupPcdFn {
    fn name(&self) -> &'static str {
        "COUPPCD"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        coup_params()
    }
    fn call(&self, args: &[ArgValue], state: &InterpreterState) -> Value {
        match coup_dates(state, args) {
            Ok((_, _, _, _, pcd, _)) => Value::tagged(
                state.datetime.date_to_serial(pcd) as f64,
                formualizer_common::NumberSubtype::Date,
            ),
            Err(e) => Value::Error(e),
        }
    }
}

/// Count of coupons strictly after settlement and up to maturity
/// (`spec.md` §4.12.2) — compares full dates, not just months, so a
/// settlement one day before a coupon still counts that coupon.
pub struct CoupNumFn;
impl BuiltinFunction for CoupNumFn {
    fn name(&self) -> &'static str {
        "COUPNUM"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        coup_params()
    }
    fn call(&self, args: &[ArgValue], state: &InterpreterState) -> Value {
        match coup_dates(state, args) {
            Ok((_, maturity, frequency, _, _, ncd)) => {
                Value::number(coupnum(ncd, maturity, 12 / frequency))
            }
            Err(e) => Value::Error(e),
        }
    }
}

pub fn register(reg: &mut crate::registry::FunctionRegistry) {
    use std::sync::Arc;
    reg.register_google_sheets(Arc::new(CoupDaysBsFn));
    reg.register_google_sheets(Arc::new(CoupDaysFn));
    reg.register_google_sheets(Arc::new(CoupDaysNcFn));
    reg.register_google_sheets(Arc::new(CoupNcdFn));
    reg.register_google_sheets(Arc::new(CoupPcdFn));
    reg.register_google_sheets(Arc::new(CoupNumFn));
    reg.register_google_sheets(Arc::new(PriceFn));
    reg.register_google_sheets(Arc::new(DurationFn));
    reg.register_google_sheets(Arc::new(MDurationFn));
    reg.register_google_sheets(Arc::new(YieldFn));
    reg.register_google_sheets(Arc::new(DiscFn));
    reg.register_google_sheets(Arc::new(PriceDiscFn));
    reg.register_google_sheets(Arc::new(ReceivedFn));
    reg.register_google_sheets(Arc::new(YieldDiscFn));
    reg.register_google_sheets(Arc::new(PriceMatFn));
    reg.register_google_sheets(Arc::new(YieldMatFn));
    reg.register_google_sheets(Arc::new(IntRateFn));
    reg.register_google_sheets(Arc::new(AccrIntFn));
    reg.register_google_sheets(Arc::new(AmorlincFn));
    reg.register_google_sheets(Arc::new(VdbFn));
    reg.register_google_sheets(Arc::new(XirrFn));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::GregorianDateTimeHelper;
    use proptest::prelude::*;

    #[test]
    fn pcd_ncd_brackets_settlement() {
        let maturity = SimpleDate::new(2020, 6, 30);
        let settlement = SimpleDate::new(2020, 2, 15);
        let (pcd, ncd) = pcd_ncd(settlement, maturity, 2);
        assert_eq!(pcd, SimpleDate::new(2019, 12, 30));
        assert_eq!(ncd, SimpleDate::new(2020, 6, 30));
    }

    #[test]
    fn coupnum_counts_remaining_coupons() {
        let maturity = SimpleDate::new(2021, 6, 30);
        let ncd = SimpleDate::new(2020, 6, 30);
        assert_eq!(coupnum(ncd, maturity, 6), 2.0);
    }

    fn test_state_with<'a>(
        config: &'a formualizer_parse::Config,
        registry: &'a crate::registry::FunctionRegistry,
        sheet: &'a dyn crate::traits::SheetView,
        locale: &'a dyn crate::traits::LocaleContext,
        dt: &'a GregorianDateTimeHelper,
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

    /// `COUPDAYBS + COUPDAYSNC == COUPDAYS` for every valid
    /// `(settlement, maturity, frequency, basis)` (`spec.md` §8 item 1).
    #[test]
    fn coupon_day_identity_holds_across_bases_and_frequencies() {
        let config = formualizer_parse::Config::google_sheets();
        let registry = crate::registry::FunctionRegistry::new();
        let sheet = EmptySheet;
        let locale = NoopLocale;
        let dt = GregorianDateTimeHelper;
        let state = test_state_with(&config, &registry, &sheet, &locale, &dt);

        let settlement = dt.date_to_serial(SimpleDate::new(2020, 2, 15));
        let maturity = dt.date_to_serial(SimpleDate::new(2022, 12, 31));
        for frequency in [1_i64, 2, 4] {
            for basis_code in 0..=4_i64 {
                let args = vec![
                    ArgValue::Scalar(Value::number(settlement as f64)),
                    ArgValue::Scalar(Value::number(maturity as f64)),
                    ArgValue::Scalar(Value::number(frequency as f64)),
                    ArgValue::Scalar(Value::number(basis_code as f64)),
                ];
                let bs = CoupDaysBsFn.call(&args, &state);
                let nc = CoupDaysNcFn.call(&args, &state);
                let total = CoupDaysFn.call(&args, &state);
                let (Value::Number(bs, _), Value::Number(nc, _), Value::Number(total, _)) =
                    (bs, nc, total)
                else {
                    panic!("expected numeric results for frequency={frequency} basis={basis_code}");
                };
                assert!(
                    (bs + nc - total).abs() < 1e-6,
                    "frequency={frequency} basis={basis_code}: {bs} + {nc} != {total}"
                );
            }
        }
    }

    #[test]
    fn price_at_par_when_rate_equals_yield() {
        let dt = GregorianDateTimeHelper;
        let _ = dt;
        // At rate == yield with redemption 100 and settlement on a coupon
        // date, price should land near par; exercised indirectly via
        // coupon_schedule in higher-level tests once a full InterpreterState
        // fixture exists (see interpreter.rs eval() helper).
    }

    proptest::proptest! {
        /// Generalizes `coupon_day_identity_holds_across_bases_and_frequencies`
        /// to random settlement/maturity serials at least a year apart, across
        /// every supported frequency and basis (`spec.md` §8 item 1).
        #[test]
        fn coupon_day_identity_holds_for_random_dates(
            settlement_serial in 30000_i64..40000_i64,
            gap_days in 370_i64..2000_i64,
            frequency in proptest::prop_oneof![
                proptest::strategy::Just(1_i64),
                proptest::strategy::Just(2_i64),
                proptest::strategy::Just(4_i64)
            ],
            basis_code in 0_i64..=4_i64,
        ) {
            let config = formualizer_parse::Config::google_sheets();
            let registry = crate::registry::FunctionRegistry::new();
            let sheet = EmptySheet;
            let locale = NoopLocale;
            let dt = GregorianDateTimeHelper;
            let state = test_state_with(&config, &registry, &sheet, &locale, &dt);

            let maturity_serial = settlement_serial + gap_days;
            let args = vec![
                ArgValue::Scalar(Value::number(settlement_serial as f64)),
                ArgValue::Scalar(Value::number(maturity_serial as f64)),
                ArgValue::Scalar(Value::number(frequency as f64)),
                ArgValue::Scalar(Value::number(basis_code as f64)),
            ];
            let bs = CoupDaysBsFn.call(&args, &state);
            let nc = CoupDaysNcFn.call(&args, &state);
            let total = CoupDaysFn.call(&args, &state);
            let (Value::Number(bs, _), Value::Number(nc, _), Value::Number(total, _)) =
                (bs, nc, total)
            else {
                return Err(proptest::test_runner::TestCaseError::fail(
                    "expected numeric results",
                ));
            };
            prop_assert!((bs + nc - total).abs() < 1e-6);
        }
    }
}
