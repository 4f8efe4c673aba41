//! Hand-rolled byte-scanning tokenizer (`spec.md` §4.4, C4).
//!
//! Mode-sensitive rules live here rather than in a shared global: every
//! [`Tokenizer`] owns the [`CellRefMatcher`] built from its [`Config`] at
//! construction time, so two tokenizers built with different `max_cols`
//! never interfere with each other (`spec.md` §9, testable property 9).

use std::error::Error;
use std::fmt::{self, Display};

use crate::config::{Config, WhitespaceMode};

static ERROR_CODES: &[&str] = &[
    "#NULL!", "#DIV/0!", "#VALUE!", "#REF!", "#NAME?", "#NUM!", "#N/A", "#ERROR!", "#SPILL!",
    "#CIRC!",
];

#[derive(Debug, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

#[derive(Debug)]
pub struct TokenizerError {
    pub message: String,
    pub pos: usize,
}

impl fmt::Display for TokenizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenizerError at {}: {}", self.pos, self.message)
    }
}

impl Error for TokenizerError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    Literal,
    Operand,
    Func,
    Array,
    Paren,
    Sep,
    OpPrefix,
    OpInfix,
    OpPostfix,
    Whitespace,
}

impl Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenSubType {
    None,
    Text,
    Number,
    Logical,
    Error,
    Range,
    NamedExpression,
    CellRef,
    Open,
    Close,
    Arg,
    Row,
}

impl Display for TokenSubType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, PartialEq, Hash)]
pub struct Token {
    pub value: String,
    pub token_type: TokenType,
    pub subtype: TokenSubType,
    pub start: usize,
    pub end: usize,
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{} subtype: {} value: {}>",
            self.token_type, self.subtype, self.value
        )
    }
}

impl Token {
    pub fn new(value: String, token_type: TokenType, subtype: TokenSubType, start: usize, end: usize) -> Self {
        Self {
            value,
            token_type,
            subtype,
            start,
            end,
        }
    }
}

/// Operator precedence used by the Pratt parser (`spec.md` §4.5).
pub fn get_precedence(op: &str) -> Option<(u8, Associativity)> {
    Some(match op {
        ":" => (90, Associativity::Left),
        "u-" | "u+" => (80, Associativity::Right),
        "^" => (70, Associativity::Right),
        "*" | "/" => (60, Associativity::Left),
        "+" | "-" => (50, Associativity::Left),
        "&" => (40, Associativity::Left),
        "=" | "<>" | "<" | ">" | "<=" | ">=" => (30, Associativity::Left),
        "%" => (20, Associativity::Left),
        "," => (10, Associativity::Left),
        _ => return None,
    })
}

/// Per-instance cell-reference recognizer closing over `{max_cols}`
/// (`spec.md` §4.4, §9). Deliberately holds no process-wide state — a new
/// `CellRefMatcher` is constructed for every `Tokenizer::new` call and is
/// owned exclusively by that tokenizer.
#[derive(Debug, Clone, Copy)]
struct CellRefMatcher {
    max_cols: u32,
}

impl CellRefMatcher {
    fn new(max_cols: u32) -> Self {
        Self { max_cols }
    }

    /// Attempt to match `[A-Z]{1,3}\d{1,5}` at `chars[pos..]`, accepting
    /// only when the decoded column is strictly less than `max_cols`.
    /// Returns the number of chars consumed on success.
    fn match_at(&self, chars: &[char], pos: usize) -> Option<usize> {
        let mut i = pos;
        let mut letters = 0usize;
        while i < chars.len() && chars[i].is_ascii_alphabetic() && letters < 3 {
            i += 1;
            letters += 1;
        }
        if letters == 0 {
            return None;
        }
        // The letter run must not continue into a 4th alphabetic char
        // (that would be a longer identifier, not a column ref).
        if i < chars.len() && chars[i].is_ascii_alphabetic() {
            return None;
        }
        let digits_start = i;
        let mut digits = 0usize;
        while i < chars.len() && chars[i].is_ascii_digit() && digits < 5 {
            i += 1;
            digits += 1;
        }
        if digits == 0 {
            return None;
        }
        if i < chars.len() && chars[i].is_ascii_digit() {
            return None;
        }
        // No trailing identifier character (so "A1x" isn't swallowed).
        if i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
            return None;
        }
        let col_letters: String = chars[pos..digits_start].iter().collect();
        let col = formualizer_common::reference::letters_to_col(&col_letters)?;
        if col >= self.max_cols {
            return None;
        }
        Some(i - pos)
    }

    /// Match a bare `[A-Z]{1,3}` letter run (no trailing digits), used for
    /// the column half of an `A:C` column-range token.
    fn match_column_only(&self, chars: &[char], pos: usize) -> Option<usize> {
        let mut i = pos;
        let mut letters = 0usize;
        while i < chars.len() && chars[i].is_ascii_alphabetic() && letters < 3 {
            i += 1;
            letters += 1;
        }
        if letters == 0 || (i < chars.len() && chars[i].is_ascii_alphabetic()) {
            return None;
        }
        let col_letters: String = chars[pos..i].iter().collect();
        let col = formualizer_common::reference::letters_to_col(&col_letters)?;
        if col >= self.max_cols {
            return None;
        }
        Some(i)
    }
}

pub struct Tokenizer {
    chars: Vec<char>,
    config: Config,
    cell_ref_matcher: CellRefMatcher,
    pos: usize,
    tokens: Vec<Token>,
}

impl Tokenizer {
    /// Build a tokenizer bound to `config`. The `CellRefMatcher` is
    /// constructed fresh here — never shared with any other `Tokenizer`.
    pub fn new(formula: &str, config: Config) -> Result<Self, TokenizerError> {
        let source = formula.strip_prefix('=').unwrap_or(formula);
        let cell_ref_matcher = CellRefMatcher::new(config.max_cols);
        Ok(Self {
            chars: source.chars().collect(),
            config,
            cell_ref_matcher,
            pos: 0,
            tokens: Vec::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn parse(mut self) -> Result<Vec<Token>, TokenizerError> {
        while self.pos < self.chars.len() {
            if self.try_whitespace() {
                continue;
            }
            if self.try_string()? {
                continue;
            }
            if self.try_error_literal() {
                continue;
            }
            if self.try_bracketed()? {
                continue;
            }
            if self.try_comparison_op() {
                continue;
            }
            if self.try_paren_or_brace() {
                continue;
            }
            if self.try_separator() {
                continue;
            }
            if self.try_arithmetic_op() {
                continue;
            }
            if self.try_range_or_number_or_ref()? {
                continue;
            }
            if self.try_boolean_or_named_expression() {
                continue;
            }
            return Err(TokenizerError {
                message: format!("unexpected character '{}'", self.chars[self.pos]),
                pos: self.pos,
            });
        }
        Ok(self.tokens)
    }

    fn push(&mut self, value: String, token_type: TokenType, subtype: TokenSubType, start: usize, end: usize) {
        self.tokens.push(Token::new(value, token_type, subtype, start, end));
    }

    fn try_whitespace(&mut self) -> bool {
        let start = self.pos;
        let absorbs = |c: char, mode: WhitespaceMode| match mode {
            WhitespaceMode::Off => false,
            WhitespaceMode::Standard => c == ' ' || c == '\t',
            WhitespaceMode::All => c.is_whitespace(),
        };
        while self.pos < self.chars.len() && absorbs(self.chars[self.pos], self.config.ignore_whitespace) {
            self.pos += 1;
        }
        if self.pos > start {
            let value: String = self.chars[start..self.pos].iter().collect();
            self.push(value, TokenType::Whitespace, TokenSubType::None, start, self.pos);
            true
        } else {
            false
        }
    }

    fn try_string(&mut self) -> Result<bool, TokenizerError> {
        if self.chars[self.pos] != '"' {
            return Ok(false);
        }
        let start = self.pos;
        let mut i = self.pos + 1;
        let mut buf = String::new();
        loop {
            if i >= self.chars.len() {
                return Err(TokenizerError {
                    message: "unterminated string literal".to_string(),
                    pos: start,
                });
            }
            if self.chars[i] == '"' {
                if i + 1 < self.chars.len() && self.chars[i + 1] == '"' {
                    buf.push('"');
                    i += 2;
                    continue;
                }
                i += 1;
                break;
            }
            buf.push(self.chars[i]);
            i += 1;
        }
        self.push(buf, TokenType::Operand, TokenSubType::Text, start, i);
        self.pos = i;
        Ok(true)
    }

    fn try_error_literal(&mut self) -> bool {
        for code in ERROR_CODES {
            let len = code.chars().count();
            if self.pos + len <= self.chars.len() {
                let slice: String = self.chars[self.pos..self.pos + len].iter().collect();
                if slice.eq_ignore_ascii_case(code) {
                    self.push(
                        code.to_string(),
                        TokenType::Operand,
                        TokenSubType::Error,
                        self.pos,
                        self.pos + len,
                    );
                    self.pos += len;
                    return true;
                }
            }
        }
        false
    }

    /// `[Sheet Name]` / `'Sheet Name'!` bracketed sheet qualifiers and
    /// `[@Column]` structured-table refs are swallowed as part of a
    /// following cell/named-expression token; this pass only recognizes
    /// the quoted-sheet-name prefix so it is not mistaken for a string.
    fn try_bracketed(&mut self) -> Result<bool, TokenizerError> {
        if self.chars[self.pos] != '\'' {
            return Ok(false);
        }
        let start = self.pos;
        let mut i = self.pos + 1;
        loop {
            if i >= self.chars.len() {
                return Err(TokenizerError {
                    message: "unterminated quoted sheet name".to_string(),
                    pos: start,
                });
            }
            if self.chars[i] == '\'' {
                if i + 1 < self.chars.len() && self.chars[i + 1] == '\'' {
                    i += 2;
                    continue;
                }
                i += 1;
                break;
            }
            i += 1;
        }
        // A quoted sheet name must be followed by '!'; otherwise treat the
        // quote as an error token boundary (caller will fail parsing).
        if i < self.chars.len() && self.chars[i] == '!' {
            i += 1;
        }
        let value: String = self.chars[start..i].iter().collect();
        self.push(value, TokenType::Operand, TokenSubType::Range, start, i);
        self.pos = i;
        Ok(true)
    }

    fn try_comparison_op(&mut self) -> bool {
        let two: Option<&str> = if self.pos + 1 < self.chars.len() {
            match (self.chars[self.pos], self.chars[self.pos + 1]) {
                ('<', '=') => Some("<="),
                ('>', '=') => Some(">="),
                ('<', '>') => Some("<>"),
                _ => None,
            }
        } else {
            None
        };
        if let Some(op) = two {
            self.push(op.to_string(), TokenType::OpInfix, TokenSubType::None, self.pos, self.pos + 2);
            self.pos += 2;
            return true;
        }
        match self.chars[self.pos] {
            '<' | '>' | '=' => {
                let op = self.chars[self.pos].to_string();
                self.push(op, TokenType::OpInfix, TokenSubType::None, self.pos, self.pos + 1);
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn try_paren_or_brace(&mut self) -> bool {
        match self.chars[self.pos] {
            '(' => {
                self.push("(".into(), TokenType::Paren, TokenSubType::Open, self.pos, self.pos + 1);
                self.pos += 1;
                true
            }
            ')' => {
                self.push(")".into(), TokenType::Paren, TokenSubType::Close, self.pos, self.pos + 1);
                self.pos += 1;
                true
            }
            '{' => {
                self.push("{".into(), TokenType::Array, TokenSubType::Open, self.pos, self.pos + 1);
                self.pos += 1;
                true
            }
            '}' => {
                self.push("}".into(), TokenType::Array, TokenSubType::Close, self.pos, self.pos + 1);
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn try_separator(&mut self) -> bool {
        let c = self.chars[self.pos];
        // Fused separators (spec.md §4.4): if arg_separator == array_col_sep
        // both classes share one token; subtype is resolved by the parser
        // from surrounding context (inside `{}` vs inside `(...)`).
        if c == self.config.arg_separator || c == self.config.array_col_sep {
            self.push(c.to_string(), TokenType::Sep, TokenSubType::Arg, self.pos, self.pos + 1);
            self.pos += 1;
            return true;
        }
        if c == self.config.array_row_sep {
            self.push(c.to_string(), TokenType::Sep, TokenSubType::Row, self.pos, self.pos + 1);
            self.pos += 1;
            return true;
        }
        false
    }

    fn try_arithmetic_op(&mut self) -> bool {
        match self.chars[self.pos] {
            '+' => {
                self.push("+".into(), TokenType::OpInfix, TokenSubType::None, self.pos, self.pos + 1);
                self.pos += 1;
                true
            }
            '-' => {
                self.push("-".into(), TokenType::OpInfix, TokenSubType::None, self.pos, self.pos + 1);
                self.pos += 1;
                true
            }
            '*' => {
                self.push("*".into(), TokenType::OpInfix, TokenSubType::None, self.pos, self.pos + 1);
                self.pos += 1;
                true
            }
            '/' => {
                self.push("/".into(), TokenType::OpInfix, TokenSubType::None, self.pos, self.pos + 1);
                self.pos += 1;
                true
            }
            '^' => {
                self.push("^".into(), TokenType::OpInfix, TokenSubType::None, self.pos, self.pos + 1);
                self.pos += 1;
                true
            }
            '&' => {
                self.push("&".into(), TokenType::OpInfix, TokenSubType::None, self.pos, self.pos + 1);
                self.pos += 1;
                true
            }
            '%' => {
                self.push("%".into(), TokenType::OpPostfix, TokenSubType::None, self.pos, self.pos + 1);
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn is_identifier_char(c: char) -> bool {
        c.is_alphanumeric() || c == '_' || c == '.'
    }

    /// Handles number literals, `A1`-style cell refs, `A:C` column
    /// ranges, `1:5` row ranges, and the bare `:` range operator — these
    /// all start by scanning a run of digits/letters so they are grouped
    /// into one matcher to share the lookahead.
    fn try_range_or_number_or_ref(&mut self) -> Result<bool, TokenizerError> {
        let c = self.chars[self.pos];

        if c == ':' {
            self.push(":".into(), TokenType::OpInfix, TokenSubType::Range, self.pos, self.pos + 1);
            self.pos += 1;
            return Ok(true);
        }

        if c.is_ascii_digit() || (c == self.decimal_char() && self.pos + 1 < self.chars.len() && self.chars[self.pos + 1].is_ascii_digit())
        {
            return Ok(self.try_number());
        }

        if c.is_ascii_alphabetic() {
            let start = self.pos;
            if let Some(len) = self.cell_ref_matcher.match_at(&self.chars, self.pos) {
                let end = start + len;
                self.push(
                    self.chars[start..end].iter().collect(),
                    TokenType::Operand,
                    TokenSubType::CellRef,
                    start,
                    end,
                );
                self.pos = end;
                return Ok(true);
            }
            // Column-only run (`A:C` style column range): a bare 1-3
            // letter run immediately followed by `:` is the column half
            // of a `ColRange`, not a named expression.
            if let Some(end) = self.cell_ref_matcher.match_column_only(&self.chars, start) {
                if end < self.chars.len() && self.chars[end] == ':' {
                    self.push(
                        self.chars[start..end].iter().collect(),
                        TokenType::Operand,
                        TokenSubType::CellRef,
                        start,
                        end,
                    );
                    self.pos = end;
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    fn decimal_char(&self) -> char {
        use crate::config::DecimalSeparator;
        match self.config.decimal_separator {
            DecimalSeparator::Dot => '.',
            DecimalSeparator::Comma => ',',
        }
    }

    fn try_number(&mut self) -> bool {
        let start = self.pos;
        let dec = self.decimal_char();
        let mut i = self.pos;
        while i < self.chars.len() && self.chars[i].is_ascii_digit() {
            i += 1;
        }
        if i < self.chars.len() && self.chars[i] == dec {
            i += 1;
            while i < self.chars.len() && self.chars[i].is_ascii_digit() {
                i += 1;
            }
        }
        if i < self.chars.len() && (self.chars[i] == 'e' || self.chars[i] == 'E') {
            let mut j = i + 1;
            if j < self.chars.len() && (self.chars[j] == '+' || self.chars[j] == '-') {
                j += 1;
            }
            if j < self.chars.len() && self.chars[j].is_ascii_digit() {
                while j < self.chars.len() && self.chars[j].is_ascii_digit() {
                    j += 1;
                }
                i = j;
            }
        }
        if i == start {
            return false;
        }
        let raw: String = self.chars[start..i].iter().collect();
        let normalized = if dec == ',' { raw.replace(',', ".") } else { raw.clone() };
        self.push(normalized, TokenType::Operand, TokenSubType::Number, start, i);
        self.pos = i;
        true
    }

    /// Boolean literal vs named-expression longest match (`spec.md` §4.4):
    /// `TRUE`/`FALSE` only tokenize as `Logical` when no further identifier
    /// character follows; otherwise the whole identifier run becomes a
    /// `NamedExpression` token (e.g. `TRUECOUNT`).
    fn try_boolean_or_named_expression(&mut self) -> bool {
        let c = self.chars[self.pos];
        if !(c.is_alphabetic() || c == '_' || c == '$') {
            return false;
        }
        let start = self.pos;
        let mut i = self.pos;
        while i < self.chars.len() && Self::is_identifier_char(self.chars[i]) {
            i += 1;
        }
        if i == start {
            return false;
        }
        let ident: String = self.chars[start..i].iter().collect();
        let is_func = i < self.chars.len() && self.chars[i] == '(';
        if is_func {
            self.push(ident, TokenType::Func, TokenSubType::None, start, i);
        } else if ident.eq_ignore_ascii_case("TRUE") || ident.eq_ignore_ascii_case("FALSE") {
            self.push(
                ident.to_ascii_uppercase(),
                TokenType::Operand,
                TokenSubType::Logical,
                start,
                i,
            );
        } else {
            self.push(ident, TokenType::Operand, TokenSubType::NamedExpression, start, i);
        }
        self.pos = i;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn tokenize(formula: &str, config: Config) -> Vec<Token> {
        Tokenizer::new(formula, config).unwrap().parse().unwrap()
    }

    #[test]
    fn boolean_prefers_longer_named_expression() {
        let tokens = tokenize("=TRUECOUNT", Config::default());
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].subtype, TokenSubType::NamedExpression);
        assert_eq!(tokens[0].value, "TRUECOUNT");
    }

    #[test]
    fn bare_boolean_is_logical() {
        let tokens = tokenize("=TRUE", Config::default());
        assert_eq!(tokens[0].subtype, TokenSubType::Logical);
    }

    #[test]
    fn cell_ref_respects_max_cols() {
        let mut narrow = Config::default();
        narrow.max_cols = 3; // columns A, B, C only
        let tokens = tokenize("=D1", narrow);
        // D (col index 3) is rejected, falls through to named expression.
        assert_eq!(tokens[0].subtype, TokenSubType::NamedExpression);
        assert_eq!(tokens[0].value, "D1");
    }

    #[test]
    fn two_tokenizers_with_different_max_cols_do_not_interfere() {
        let mut wide = Config::default();
        wide.max_cols = 16_384;
        let mut narrow = Config::default();
        narrow.max_cols = 1;

        let wide_tokens = tokenize("=B1", wide.clone());
        let narrow_tokens = tokenize("=B1", narrow);
        assert_eq!(wide_tokens[0].subtype, TokenSubType::CellRef);
        assert_eq!(narrow_tokens[0].subtype, TokenSubType::NamedExpression);

        // Building narrow after wide must not have mutated wide's matcher.
        let wide_tokens_again = tokenize("=B1", wide);
        assert_eq!(wide_tokens_again[0].subtype, TokenSubType::CellRef);
    }

    #[test]
    fn comparison_operators_longest_match_first() {
        let tokens = tokenize("=A1<=B1", Config::default());
        assert!(tokens.iter().any(|t| t.value == "<="));
    }

    #[test]
    fn column_and_row_range_tokens() {
        let tokens = tokenize("=A:C", Config::default());
        assert_eq!(tokens[0].subtype, TokenSubType::CellRef);
        assert_eq!(tokens[1].value, ":");
        assert_eq!(tokens[2].subtype, TokenSubType::CellRef);
    }

    #[test]
    fn string_literal_escapes_double_quote() {
        let tokens = tokenize(r#"="say ""hi""""#, Config::default());
        assert_eq!(tokens[0].value, "say \"hi\"");
    }

    #[test]
    fn error_literal_is_recognized() {
        let tokens = tokenize("=#N/A", Config::default());
        assert_eq!(tokens[0].subtype, TokenSubType::Error);
    }
}
