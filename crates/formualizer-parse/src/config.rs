//! Lexer/parser configuration (`spec.md` §3.5).
//!
//! One `Config` is built per engine instance and handed to
//! `Tokenizer::new`; nothing here is ever shared mutably across engines
//! (`spec.md` §9, §5).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which reference product's lexical/parsing quirks a [`Config`] should
/// imitate. Generalizes the two-variant dialect switch the tokenizer used
/// to grow its first alternate mode from.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompatibilityMode {
    #[default]
    Default,
    GoogleSheets,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecimalSeparator {
    Dot,
    Comma,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhitespaceMode {
    /// Formulas never absorb incidental whitespace.
    Off,
    /// Only ASCII space/tab between tokens is absorbed.
    Standard,
    /// Any Unicode whitespace between tokens is absorbed.
    All,
}

/// Recognized lexer/parser options (`spec.md` §3.5).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub compatibility_mode: CompatibilityMode,
    pub arg_separator: char,
    pub array_col_sep: char,
    pub array_row_sep: char,
    pub decimal_separator: DecimalSeparator,
    pub max_rows: u32,
    pub max_cols: u32,
    pub locale: String,
    pub date_formats: Vec<String>,
    pub currency_symbols: Vec<String>,
    pub ignore_whitespace: WhitespaceMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            compatibility_mode: CompatibilityMode::Default,
            arg_separator: ',',
            array_col_sep: ',',
            array_row_sep: ';',
            decimal_separator: DecimalSeparator::Dot,
            max_rows: 1_048_576,
            max_cols: 16_384,
            locale: "en-US".to_string(),
            date_formats: Vec::new(),
            currency_symbols: Vec::new(),
            ignore_whitespace: WhitespaceMode::Standard,
        }
    }
}

impl Config {
    /// The Google Sheets default profile (`spec.md` §3.5): any field left
    /// unset by the caller takes these values.
    pub fn google_sheets() -> Self {
        Self {
            compatibility_mode: CompatibilityMode::GoogleSheets,
            arg_separator: ',',
            array_col_sep: ',',
            array_row_sep: ';',
            decimal_separator: DecimalSeparator::Dot,
            date_formats: vec![
                "MM/DD/YYYY".to_string(),
                "MM/DD/YY".to_string(),
                "YYYY/MM/DD".to_string(),
            ],
            locale: "en-US".to_string(),
            currency_symbols: vec!["$".to_string(), "USD".to_string()],
            ..Self::default()
        }
    }

    pub fn is_google_sheets(&self) -> bool {
        self.compatibility_mode == CompatibilityMode::GoogleSheets
    }

    /// `true` when `arg_separator` and `array_col_sep` coincide, so the
    /// tokenizer must fuse both into a single token class (`spec.md`
    /// §4.4 "Argument separator fusion").
    pub fn separators_fused(&self) -> bool {
        self.arg_separator == self.array_col_sep
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn google_sheets_profile_matches_spec_defaults() {
        let cfg = Config::google_sheets();
        assert_eq!(cfg.decimal_separator, DecimalSeparator::Dot);
        assert_eq!(cfg.locale, "en-US");
        assert_eq!(cfg.currency_symbols, vec!["$", "USD"]);
        assert_eq!(
            cfg.date_formats,
            vec!["MM/DD/YYYY", "MM/DD/YY", "YYYY/MM/DD"]
        );
    }

    #[test]
    fn default_separators_are_not_fused_unless_configured() {
        let mut cfg = Config::default();
        assert!(!cfg.separators_fused());
        cfg.array_col_sep = ',';
        cfg.arg_separator = ',';
        assert!(cfg.separators_fused());
    }
}
