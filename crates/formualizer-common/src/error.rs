//! Excel/Google-Sheets style error representation.
//!
//! - **`ExcelErrorKind`** — the canonical set of error codes.
//! - **`ExcelMessage`**   — a closed set of well-known edge-case tags, so
//!   kernels and tests can match on *why* an error was raised instead of
//!   scraping a free-text string.
//! - **`ErrorContext`**   — optional row/col provenance.
//! - **`ExcelError`**     — the value propagated through evaluation.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// All recognized error codes (`spec.md` §3.1 / §4.2 / §7).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ExcelErrorKind {
    Null,
    Div,
    Value,
    Ref,
    Name,
    Num,
    Na,
    Error,
    Spill,
    Cycle,
}

impl fmt::Display for ExcelErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Null => "#NULL!",
            Self::Div => "#DIV/0!",
            Self::Value => "#VALUE!",
            Self::Ref => "#REF!",
            Self::Name => "#NAME?",
            Self::Num => "#NUM!",
            Self::Na => "#N/A",
            Self::Error => "#ERROR!",
            Self::Spill => "#SPILL!",
            Self::Cycle => "#CIRC!",
        })
    }
}

impl ExcelErrorKind {
    /// Parse the exact on-sheet rendering of an error back into a kind.
    /// Used by `LocaleContext::get_error_mapping` consumers and by
    /// `ERROR.TYPE`'s inverse table.
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s.trim() {
            "#NULL!" => Self::Null,
            "#DIV/0!" => Self::Div,
            "#VALUE!" => Self::Value,
            "#REF!" => Self::Ref,
            "#NAME?" => Self::Name,
            "#NUM!" => Self::Num,
            "#N/A" => Self::Na,
            "#ERROR!" => Self::Error,
            "#SPILL!" => Self::Spill,
            "#CIRC!" => Self::Cycle,
            _ => return None,
        })
    }

    /// The `ERROR.TYPE` numeric code (`spec.md` §4.15); `None` has no
    /// `ERROR.TYPE` mapping under the classic 1..8 table (`SPILL`/`CYCLE`
    /// are Google-Sheets-era additions the classic table never covered).
    pub fn error_type_code(&self) -> Option<u8> {
        Some(match self {
            Self::Null => 1,
            Self::Div => 2,
            Self::Value => 3,
            Self::Ref => 4,
            Self::Name => 5,
            Self::Num => 6,
            Self::Na => 7,
            Self::Error => 8,
            Self::Spill | Self::Cycle => return None,
        })
    }
}

/// Closed set of well-known edge cases a kernel can tag an error with,
/// so tests and `IFERROR`-adjacent logic can branch on *why* without
/// string matching. Kernels are free to leave this `None` for ordinary
/// propagation.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExcelMessage {
    EqualLength,
    ValueSmall,
    NumberRange,
    PatternNotFound,
    IndexBounds,
    LessThanOne,
    NegativeLength,
    WrongArgCount,
    NonNumeric,
    DivisorZero,
    ConvergenceFailure,
    RegexSyntax,
    UnsupportedUnit,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ErrorContext {
    pub row: Option<u32>,
    pub col: Option<u32>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExcelError {
    pub kind: ExcelErrorKind,
    pub message: Option<ExcelMessage>,
    pub detail: Option<String>,
    pub context: Option<ErrorContext>,
}

impl From<ExcelErrorKind> for ExcelError {
    fn from(kind: ExcelErrorKind) -> Self {
        Self {
            kind,
            message: None,
            detail: None,
            context: None,
        }
    }
}

impl ExcelError {
    pub fn new(kind: ExcelErrorKind) -> Self {
        kind.into()
    }

    pub fn with_message(mut self, message: ExcelMessage) -> Self {
        self.message = Some(message);
        self
    }

    pub fn with_detail<S: Into<String>>(mut self, detail: S) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_location(mut self, row: u32, col: u32) -> Self {
        self.context = Some(ErrorContext {
            row: Some(row),
            col: Some(col),
        });
        self
    }

    pub fn value(message: ExcelMessage) -> Self {
        Self::new(ExcelErrorKind::Value).with_message(message)
    }

    pub fn num(message: ExcelMessage) -> Self {
        Self::new(ExcelErrorKind::Num).with_message(message)
    }

    pub fn div0() -> Self {
        Self::new(ExcelErrorKind::Div).with_message(ExcelMessage::DivisorZero)
    }

    pub fn na() -> Self {
        Self::new(ExcelErrorKind::Na)
    }
}

impl fmt::Display for ExcelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for ExcelError {}

impl PartialEq<str> for ExcelError {
    fn eq(&self, other: &str) -> bool {
        self.kind.to_string() == other
    }
}
impl PartialEq<&str> for ExcelError {
    fn eq(&self, other: &&str) -> bool {
        self.kind.to_string() == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_exact_wire_strings() {
        assert_eq!(ExcelErrorKind::Div.to_string(), "#DIV/0!");
        assert_eq!(ExcelErrorKind::Na.to_string(), "#N/A");
        assert_eq!(ExcelErrorKind::Name.to_string(), "#NAME?");
    }

    #[test]
    fn error_type_codes_match_spec_table() {
        assert_eq!(ExcelErrorKind::Null.error_type_code(), Some(1));
        assert_eq!(ExcelErrorKind::Na.error_type_code(), Some(7));
        assert_eq!(ExcelErrorKind::Error.error_type_code(), Some(8));
        assert_eq!(ExcelErrorKind::Spill.error_type_code(), None);
    }

    #[test]
    fn parse_round_trips_display() {
        for kind in [
            ExcelErrorKind::Null,
            ExcelErrorKind::Div,
            ExcelErrorKind::Value,
            ExcelErrorKind::Ref,
            ExcelErrorKind::Name,
            ExcelErrorKind::Num,
            ExcelErrorKind::Na,
        ] {
            assert_eq!(ExcelErrorKind::parse(&kind.to_string()), Some(kind));
        }
    }
}
