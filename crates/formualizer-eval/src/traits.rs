//! External collaborators consumed by the evaluator (`spec.md` §6).
//!
//! The core never reaches into sheet storage, locale tables, or date-serial
//! arithmetic directly — it only ever goes through these three narrow
//! traits. A host engine implements them once and hands trait objects to
//! [`crate::interpreter::InterpreterState`].

use std::cmp::Ordering;

use formualizer_common::{ExcelErrorKind, Value};

/// §6.1 — read-only sheet access. The evaluator never mutates a sheet;
/// mutation happens between evaluations, orchestrated by the external
/// dependency graph (out of scope for this core).
pub trait SheetView: Send + Sync {
    /// Out-of-bounds access returns `Value::Empty`, never an error.
    fn get_cell(&self, sheet: Option<&str>, col: u32, row: u32) -> Value;

    /// Whether `(sheet, col, row)` is the anchor cell of a spilled array
    /// formula. Consulted by `TYPE` before argument evaluation (`spec.md`
    /// §4.15) so a reference to an array root reports `64` even though the
    /// referenced cell alone is a scalar.
    fn is_array_root(&self, sheet: Option<&str>, col: u32, row: u32) -> bool {
        let _ = (sheet, col, row);
        false
    }
}

/// §6.2 — locale-aware collation and name translation. A core built for a
/// single locale (e.g. tests) can implement this with the invariant/`en-US`
/// behavior below.
pub trait LocaleContext: Send + Sync {
    /// Locale-aware string comparison. Google Sheets mode folds case for
    /// equality (`spec.md` §4.8); `case_insensitive` tells the caller's
    /// intent, the implementation decides how to honor it for `<`/`>`.
    fn collate(&self, a: &str, b: &str, case_insensitive: bool) -> Ordering;

    /// Canonical (English, upper-case) name -> locale-displayed name.
    fn get_function_translation(&self, canonical: &str) -> String {
        canonical.to_string()
    }

    /// Locale function name -> canonical name, consulted by the parser
    /// (`spec.md` §4.5) before a `Procedure` node is emitted.
    fn get_function_mapping(&self) -> &rustc_hash::FxHashMap<String, String>;

    /// Locale error string -> canonical kind (inverse of `ExcelErrorKind`'s
    /// `Display`, needed when a non-English error literal is tokenized).
    fn get_error_mapping(&self) -> &rustc_hash::FxHashMap<String, ExcelErrorKind>;
}

/// A calendar date independent of any serial epoch, passed across the
/// `DateTimeHelper` boundary (`spec.md` §6.3).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SimpleDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl SimpleDate {
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }
}

/// Day-count basis for bond math (`spec.md` §4.12.1 / GLOSSARY).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Basis {
    Us30_360 = 0,
    ActualActual = 1,
    Actual360 = 2,
    Actual365 = 3,
    European30_360 = 4,
}

impl Basis {
    pub fn from_code(n: i64) -> Option<Self> {
        Some(match n {
            0 => Self::Us30_360,
            1 => Self::ActualActual,
            2 => Self::Actual360,
            3 => Self::Actual365,
            4 => Self::European30_360,
            _ => return None,
        })
    }
}

/// §6.3 — date-serial arithmetic primitives. The financial kernels (C12)
/// need calendar math (leap years, day-count year length) but not the
/// engine's serial-number epoch policy, so that policy is injected here
/// rather than hard-coded into the core.
pub trait DateTimeHelper: Send + Sync {
    fn date_to_serial(&self, date: SimpleDate) -> i64;
    fn serial_to_date(&self, serial: i64) -> SimpleDate;

    /// Length in days of the basis-dependent "year" spanning `start..end`,
    /// leap-aware for `Basis::ActualActual` (`spec.md` §4.12.1).
    fn year_length_for_basis(&self, start: SimpleDate, end: SimpleDate, basis: Basis) -> f64;

    /// Canonicalize a day-of-month per the US 30/360 rule (`spec.md`
    /// §4.12.1): day 31 rolls back to 30; day 30 in `start` forces `end`'s
    /// day to 30 as well when `end` is also day 31.
    fn to_basis_us(&self, start: SimpleDate, end: SimpleDate) -> (SimpleDate, SimpleDate);

    /// Canonicalize per the European 30/360 rule: day 31 in either date
    /// simply becomes 30, independently.
    fn to_basis_eu(&self, start: SimpleDate, end: SimpleDate) -> (SimpleDate, SimpleDate);

    fn is_leap_year(&self, year: i32) -> bool {
        (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
    }

    /// `spec.md` §4.12.1 `year_fraction`, implemented here in terms of the
    /// other primitives so every financial kernel shares one definition.
    fn year_fraction(&self, start: SimpleDate, end: SimpleDate, basis: Basis) -> f64 {
        match basis {
            Basis::Us30_360 => {
                let (s, e) = self.to_basis_us(start, end);
                let dy = (e.year - s.year) as f64;
                let dm = (e.month as i32 - s.month as i32) as f64;
                let dd = (e.day as i32 - s.day as i32) as f64;
                (dy * 360.0 + dm * 30.0 + dd) / 360.0
            }
            Basis::European30_360 => {
                let (s, e) = self.to_basis_eu(start, end);
                let dy = (e.year - s.year) as f64;
                let dm = (e.month as i32 - s.month as i32) as f64;
                let dd = (e.day as i32 - s.day as i32) as f64;
                (dy * 360.0 + dm * 30.0 + dd) / 360.0
            }
            Basis::Actual360 => {
                (self.date_to_serial(end) - self.date_to_serial(start)) as f64 / 360.0
            }
            Basis::Actual365 => {
                (self.date_to_serial(end) - self.date_to_serial(start)) as f64 / 365.0
            }
            Basis::ActualActual => {
                let days = (self.date_to_serial(end) - self.date_to_serial(start)) as f64;
                days / self.year_length_for_basis(start, end, basis)
            }
        }
    }
}

/// Default, Gregorian-calendar `DateTimeHelper` good enough for tests and a
/// host that has no exotic epoch requirements. Serial `0` is `1899-12-30`,
/// matching the classic spreadsheet epoch (so `1` is `1899-12-31`, `2` is
/// `1900-01-01` — the same off-by-one quirk both reference products share).
#[derive(Copy, Clone, Debug, Default)]
pub struct GregorianDateTimeHelper;

impl GregorianDateTimeHelper {
    const EPOCH: chrono::NaiveDate = match chrono::NaiveDate::from_ymd_opt(1899, 12, 30) {
        Some(d) => d,
        None => unreachable!(),
    };

    fn to_naive(date: SimpleDate) -> chrono::NaiveDate {
        chrono::NaiveDate::from_ymd_opt(date.year, date.month, date.day)
            .unwrap_or_else(|| Self::EPOCH)
    }
}

impl DateTimeHelper for GregorianDateTimeHelper {
    fn date_to_serial(&self, date: SimpleDate) -> i64 {
        (Self::to_naive(date) - Self::EPOCH).num_days()
    }

    fn serial_to_date(&self, serial: i64) -> SimpleDate {
        let d = Self::EPOCH + chrono::Duration::days(serial);
        use chrono::Datelike;
        SimpleDate::new(d.year(), d.month(), d.day())
    }

    fn year_length_for_basis(&self, start: SimpleDate, end: SimpleDate, basis: Basis) -> f64 {
        match basis {
            Basis::ActualActual => {
                // Average length across the years the period spans; a
                // single-year period just uses that year's length.
                if start.year == end.year {
                    if self.is_leap_year(start.year) {
                        366.0
                    } else {
                        365.0
                    }
                } else {
                    let mut total = 0.0;
                    let mut years = 0.0;
                    for y in start.year..=end.year {
                        total += if self.is_leap_year(y) { 366.0 } else { 365.0 };
                        years += 1.0;
                    }
                    total / years
                }
            }
            Basis::Us30_360 | Basis::European30_360 => 360.0,
            Basis::Actual360 => 360.0,
            Basis::Actual365 => 365.0,
        }
    }

    fn to_basis_us(&self, start: SimpleDate, end: SimpleDate) -> (SimpleDate, SimpleDate) {
        let mut s = start;
        let mut e = end;
        let s_last_day_of_feb = s.month == 2 && s.day == last_day_of_month(s.year, s.month);
        if s.day == 31 || s_last_day_of_feb {
            s.day = 30;
        }
        if e.day == 31 && s.day == 30 {
            e.day = 30;
        }
        (s, e)
    }

    fn to_basis_eu(&self, start: SimpleDate, end: SimpleDate) -> (SimpleDate, SimpleDate) {
        let mut s = start;
        let mut e = end;
        if s.day == 31 {
            s.day = 30;
        }
        if e.day == 31 {
            e.day = 30;
        }
        (s, e)
    }
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let next_month = if month == 12 {
        chrono::NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        chrono::NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next_month
        .map(|d| (d - chrono::Duration::days(1)).day())
        .unwrap_or(28)
}

use chrono::Datelike;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_round_trips() {
        let h = GregorianDateTimeHelper;
        let d = SimpleDate::new(2010, 1, 1);
        let serial = h.date_to_serial(d);
        assert_eq!(h.serial_to_date(serial), d);
    }

    #[test]
    fn epoch_matches_classic_off_by_one() {
        let h = GregorianDateTimeHelper;
        assert_eq!(h.date_to_serial(SimpleDate::new(1900, 1, 1)), 2);
    }

    #[test]
    fn us_30_360_rolls_31_to_30() {
        let h = GregorianDateTimeHelper;
        let (s, e) = h.to_basis_us(SimpleDate::new(2010, 1, 31), SimpleDate::new(2010, 2, 28));
        assert_eq!(s.day, 30);
        assert_eq!(e.day, 28);
    }
}
