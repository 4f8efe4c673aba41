//! Byte-indexed text and regex/format functions (`spec.md` §4.13, C13).
//!
//! All byte-oriented functions interpret positions in UTF-8 bytes of the
//! *original, unmodified* string — slicing may bisect a multi-byte
//! character, and that partial-character result is the documented
//! behavior, not a bug to paper over.

use std::sync::OnceLock;

use formualizer_common::{ArgKind, ArgSpec, ExcelError, ExcelErrorKind, ExcelMessage, Value};
use regex::Regex;

use crate::interpreter::InterpreterState;
use crate::registry::{ArgValue, BuiltinFunction};

use super::helpers::*;

/// Byte length of the entire string (`spec.md` §4.13): supplementary
/// plane characters are 4 UTF-8 bytes, never the 6 a UTF-16 surrogate
/// pair would suggest.
pub struct LenBFn;
impl BuiltinFunction for LenBFn {
    fn name(&self) -> &'static str {
        "LENB"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![string_spec()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        match as_string(&args[0]) {
            Ok(s) => Value::number(s.len() as f64),
            Err(e) => Value::Error(e),
        }
    }
}

fn byte_slice(s: &str, start_byte: usize, len: usize) -> String {
    let bytes = s.as_bytes();
    let end = (start_byte + len).min(bytes.len());
    let start = start_byte.min(bytes.len());
    if start >= end {
        return String::new();
    }
    // Slicing at an arbitrary byte offset can bisect a multi-byte
    // character; `from_utf8_lossy` preserves the documented "partial
    // character survives" behavior instead of panicking.
    String::from_utf8_lossy(&bytes[start..end]).into_owned()
}

pub struct LeftBFn;
impl BuiltinFunction for LeftBFn {
    fn name(&self) -> &'static str {
        "LEFTB"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![string_spec(), int_spec().with_default(Value::number(1.0))])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let s = match as_string(&args[0]) {
            Ok(s) => s,
            Err(e) => return Value::Error(e),
        };
        let n = match as_i64(&args[1]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        if n < 0 {
            return Value::Error(value_msg(ExcelMessage::NegativeLength));
        }
        Value::text(byte_slice(&s, 0, n as usize))
    }
}

pub struct RightBFn;
impl BuiltinFunction for RightBFn {
    fn name(&self) -> &'static str {
        "RIGHTB"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![string_spec(), int_spec().with_default(Value::number(1.0))])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let s = match as_string(&args[0]) {
            Ok(s) => s,
            Err(e) => return Value::Error(e),
        };
        let n = match as_i64(&args[1]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        if n < 0 {
            return Value::Error(value_msg(ExcelMessage::NegativeLength));
        }
        let total = s.len();
        let n = (n as usize).min(total);
        Value::text(byte_slice(&s, total - n, n))
    }
}

pub struct MidBFn;
impl BuiltinFunction for MidBFn {
    fn name(&self) -> &'static str {
        "MIDB"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![string_spec(), int_spec(), int_spec()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let s = match as_string(&args[0]) {
            Ok(s) => s,
            Err(e) => return Value::Error(e),
        };
        let start = match as_i64(&args[1]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let len = match as_i64(&args[2]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        if start < 1 {
            return Value::Error(value_msg(ExcelMessage::LessThanOne));
        }
        if len < 0 {
            return Value::Error(value_msg(ExcelMessage::NegativeLength));
        }
        Value::text(byte_slice(&s, (start - 1) as usize, len as usize))
    }
}

/// Case-sensitive byte search (`spec.md` §4.13).
pub struct FindBFn;
impl BuiltinFunction for FindBFn {
    fn name(&self) -> &'static str {
        "FINDB"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| {
            vec![
                string_spec(),
                string_spec(),
                int_spec().with_default(Value::number(1.0)),
            ]
        })
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let needle = match as_string(&args[0]) {
            Ok(s) => s,
            Err(e) => return Value::Error(e),
        };
        let haystack = match as_string(&args[1]) {
            Ok(s) => s,
            Err(e) => return Value::Error(e),
        };
        let start = match as_i64(&args[2]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        if start < 1 {
            return Value::Error(value_msg(ExcelMessage::LessThanOne));
        }
        let from = ((start - 1) as usize).min(haystack.len());
        match haystack.as_bytes().get(from..).and_then(|rest| {
            find_bytes(rest, needle.as_bytes())
        }) {
            Some(idx) => Value::number((from + idx + 1) as f64),
            None => Value::Error(ExcelError::new(ExcelErrorKind::Value).with_message(ExcelMessage::PatternNotFound)),
        }
    }
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
}

/// Case-insensitive byte search returning a position in the *original*
/// string (`spec.md` §4.13 / §8 property 11): critical for characters
/// like `İ → i̇` whose lowercasing changes byte length.
pub struct SearchBFn;
impl BuiltinFunction for SearchBFn {
    fn name(&self) -> &'static str {
        "SEARCHB"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| {
            vec![
                string_spec(),
                string_spec(),
                int_spec().with_default(Value::number(1.0)),
            ]
        })
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let needle = match as_string(&args[0]) {
            Ok(s) => s,
            Err(e) => return Value::Error(e),
        };
        let haystack = match as_string(&args[1]) {
            Ok(s) => s,
            Err(e) => return Value::Error(e),
        };
        let start = match as_i64(&args[2]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        if start < 1 {
            return Value::Error(value_msg(ExcelMessage::LessThanOne));
        }
        let from = ((start - 1) as usize).min(haystack.len());
        // Search every byte-aligned char boundary >= `from` in the
        // *original* string for a case-insensitive match, rather than
        // lowercasing the whole string first (which would shift offsets
        // for characters whose lowercase form has a different byte
        // length, e.g. 'İ').
        let needle_lower = needle.to_lowercase();
        for (idx, _) in haystack.char_indices() {
            if idx < from {
                continue;
            }
            let rest = &haystack[idx..];
            if rest.len() >= needle.len() {
                // Compare case-insensitively by lowercasing only the
                // candidate window, so byte offsets in `haystack` stay
                // anchored to the original string.
                let mut chars_consumed = 0usize;
                let mut byte_len = 0usize;
                for c in rest.chars() {
                    byte_len += c.len_utf8();
                    chars_consumed += 1;
                    if byte_len >= needle.len() || chars_consumed > needle.chars().count() + 4 {
                        break;
                    }
                }
                let window = &rest[..byte_len.min(rest.len())];
                if window.to_lowercase().starts_with(&needle_lower) {
                    return Value::number((idx + 1) as f64);
                }
            }
        }
        Value::Error(ExcelError::new(ExcelErrorKind::Value).with_message(ExcelMessage::PatternNotFound))
    }
}

pub struct ReplaceBFn;
impl BuiltinFunction for ReplaceBFn {
    fn name(&self) -> &'static str {
        "REPLACEB"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![string_spec(), int_spec(), int_spec(), string_spec()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let old = match as_string(&args[0]) {
            Ok(s) => s,
            Err(e) => return Value::Error(e),
        };
        let start = match as_i64(&args[1]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let n = match as_i64(&args[2]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let new = match as_string(&args[3]) {
            Ok(s) => s,
            Err(e) => return Value::Error(e),
        };
        if start < 1 {
            return Value::Error(value_msg(ExcelMessage::LessThanOne));
        }
        if n < 0 {
            return Value::Error(value_msg(ExcelMessage::NegativeLength));
        }
        let bytes = old.into_bytes();
        let start0 = ((start - 1) as usize).min(bytes.len());
        let end0 = (start0 + n as usize).min(bytes.len());
        let mut out = Vec::with_capacity(bytes.len() + new.len());
        out.extend_from_slice(&bytes[..start0]);
        out.extend_from_slice(new.as_bytes());
        out.extend_from_slice(&bytes[end0..]);
        Value::text(String::from_utf8_lossy(&out).into_owned())
    }
}

fn compile_regex(pattern: &str) -> Result<Regex, ExcelError> {
    Regex::new(pattern).map_err(|_| value_msg(ExcelMessage::RegexSyntax))
}

pub struct RegexMatchFn;
impl BuiltinFunction for RegexMatchFn {
    fn name(&self) -> &'static str {
        "REGEXMATCH"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![string_spec(), string_spec()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let text = match as_string(&args[0]) {
            Ok(s) => s,
            Err(e) => return Value::Error(e),
        };
        let pattern = match as_string(&args[1]) {
            Ok(s) => s,
            Err(e) => return Value::Error(e),
        };
        match compile_regex(&pattern) {
            Ok(re) => Value::Bool(re.is_match(&text)),
            Err(e) => Value::Error(e),
        }
    }
}

/// Returns the first capture group if present, else the full match, else
/// `#N/A` (`spec.md` §4.13). An empty capture group yields `""`, not
/// `#N/A` (`spec.md` §9 Open Questions).
pub struct RegexExtractFn;
impl BuiltinFunction for RegexExtractFn {
    fn name(&self) -> &'static str {
        "REGEXEXTRACT"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![string_spec(), string_spec()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let text = match as_string(&args[0]) {
            Ok(s) => s,
            Err(e) => return Value::Error(e),
        };
        let pattern = match as_string(&args[1]) {
            Ok(s) => s,
            Err(e) => return Value::Error(e),
        };
        let re = match compile_regex(&pattern) {
            Ok(re) => re,
            Err(e) => return Value::Error(e),
        };
        match re.captures(&text) {
            Some(caps) => {
                if caps.len() > 1 {
                    Value::text(caps.get(1).map(|m| m.as_str()).unwrap_or("").to_string())
                } else {
                    Value::text(caps.get(0).unwrap().as_str().to_string())
                }
            }
            None => Value::Error(na_err()),
        }
    }
}

pub struct RegexReplaceFn;
impl BuiltinFunction for RegexReplaceFn {
    fn name(&self) -> &'static str {
        "REGEXREPLACE"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![string_spec(), string_spec(), string_spec()])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let text = match as_string(&args[0]) {
            Ok(s) => s,
            Err(e) => return Value::Error(e),
        };
        let pattern = match as_string(&args[1]) {
            Ok(s) => s,
            Err(e) => return Value::Error(e),
        };
        let replacement = match as_string(&args[2]) {
            Ok(s) => s,
            Err(e) => return Value::Error(e),
        };
        match compile_regex(&pattern) {
            Ok(re) => Value::text(re.replace_all(&text, replacement.as_str()).into_owned()),
            Err(e) => Value::Error(e),
        }
    }
}

fn round_to_decimals(n: f64, decimals: i64) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (n * factor).round() / factor
}

/// `en-US` grouped formatting to `decimals` places, negative allowed
/// (round to a power of 10) (`spec.md` §4.13).
fn format_grouped(n: f64, decimals: i64) -> String {
    let rounded = round_to_decimals(n, decimals.max(0));
    let dec = decimals.max(0) as usize;
    let negative = rounded < 0.0;
    let s = format!("{:.*}", dec, rounded.abs());
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (s, None),
    };
    let grouped = group_thousands(&int_part);
    let mut out = String::new();
    if negative && rounded != 0.0 {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(f) = frac_part {
        out.push('.');
        out.push_str(&f);
    }
    out
}

fn group_thousands(digits: &str) -> String {
    let bytes = digits.as_bytes();
    let mut out = Vec::new();
    for (i, b) in bytes.iter().enumerate() {
        if i != 0 && (bytes.len() - i) % 3 == 0 {
            out.push(b',');
        }
        out.push(*b);
    }
    String::from_utf8(out).unwrap()
}

pub struct DollarFn;
impl BuiltinFunction for DollarFn {
    fn name(&self) -> &'static str {
        "DOLLAR"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| vec![num_spec(), int_spec().with_default(Value::number(2.0))])
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let n = match as_f64(&args[0]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let decimals = match as_i64(&args[1]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let rounded = if decimals < 0 {
            let factor = 10f64.powi((-decimals) as i32);
            (n / factor).round() * factor
        } else {
            n
        };
        let body = if decimals < 0 {
            format_grouped(rounded, 0)
        } else {
            format_grouped(rounded, decimals)
        };
        let sign = if rounded < 0.0 { "-$" } else { "$" };
        let body = body.trim_start_matches('-');
        Value::text(format!("{sign}{body}"))
    }
}

pub struct FixedFn;
impl BuiltinFunction for FixedFn {
    fn name(&self) -> &'static str {
        "FIXED"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| {
            vec![
                num_spec(),
                int_spec().with_default(Value::number(2.0)),
                bool_spec().with_default(Value::Bool(false)),
            ]
        })
    }
    fn call(&self, args: &[ArgValue], _state: &InterpreterState) -> Value {
        let n = match as_f64(&args[0]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let decimals = match as_i64(&args[1]) {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        let no_commas = match as_bool(&args[2]) {
            Ok(b) => b,
            Err(e) => return Value::Error(e),
        };
        let rounded = if decimals < 0 {
            let factor = 10f64.powi((-decimals) as i32);
            (n / factor).round() * factor
        } else {
            n
        };
        if no_commas {
            let dec = decimals.max(0) as usize;
            Value::text(format!("{:.*}", dec, rounded))
        } else {
            Value::text(format_grouped(rounded, decimals.max(0)))
        }
    }
}

/// Converts full-width (zenkaku) characters to half-width (hankaku); a
/// pass-through no-op for text with no full-width characters.
pub struct AscFn;
impl BuiltinFunction for AscFn {
    fn name(&self) -> &'static str {
        "ASC"
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
        let out: String = s
            .chars()
            .map(|c| {
                let code = c as u32;
                if (0xFF01..=0xFF5E).contains(&code) {
                    char::from_u32(code - 0xFEE0).unwrap_or(c)
                } else if c == '\u{3000}' {
                    ' '
                } else {
                    c
                }
            })
            .collect();
        Value::text(out)
    }
}

/// `SPLIT(text, delimiter, [split_by_each=true], [remove_empty=true])`:
/// returns a single-row `Range` of the split pieces.
pub struct SplitFn;
impl BuiltinFunction for SplitFn {
    fn name(&self) -> &'static str {
        "SPLIT"
    }
    fn parameters(&self) -> &'static [ArgSpec] {
        static P: OnceLock<Vec<ArgSpec>> = OnceLock::new();
        P.get_or_init(|| {
            vec![
                string_spec(),
                string_spec(),
                bool_spec().with_default(Value::Bool(true)),
                bool_spec().with_default(Value::Bool(true)),
            ]
        })
    }
    fn returns_array(&self) -> bool {
        true
    }

    fn call_range(&self, args: &[ArgValue], _state: &InterpreterState) -> formualizer_common::Range {
        let text = match as_string(&args[0]) {
            Ok(s) => s,
            Err(e) => return formualizer_common::Range::from_scalar(Value::Error(e)),
        };
        let delims = match as_string(&args[1]) {
            Ok(s) => s,
            Err(e) => return formualizer_common::Range::from_scalar(Value::Error(e)),
        };
        let split_by_each = match as_bool(&args[2]) {
            Ok(b) => b,
            Err(e) => return formualizer_common::Range::from_scalar(Value::Error(e)),
        };
        let remove_empty = match as_bool(&args[3]) {
            Ok(b) => b,
            Err(e) => return formualizer_common::Range::from_scalar(Value::Error(e)),
        };
        let pieces: Vec<&str> = if split_by_each {
            let delim_chars: Vec<char> = delims.chars().collect();
            text.split(|c| delim_chars.contains(&c)).collect()
        } else {
            text.split(delims.as_str()).collect()
        };
        let pieces: Vec<&str> = if remove_empty {
            pieces.into_iter().filter(|p| !p.is_empty()).collect()
        } else {
            pieces
        };
        let pieces = if pieces.is_empty() { vec![""] } else { pieces };
        let row: Vec<Value> = pieces.into_iter().map(|p| Value::text(p.to_string())).collect();
        formualizer_common::Range::only_values(vec![row])
    }

    fn call(&self, args: &[ArgValue], state: &InterpreterState) -> Value {
        self.call_range(args, state).get(0, 0)
    }
}

pub fn register(reg: &mut crate::registry::FunctionRegistry) {
    use std::sync::Arc;
    reg.register_google_sheets(Arc::new(LenBFn));
    reg.register_google_sheets(Arc::new(LeftBFn));
    reg.register_google_sheets(Arc::new(RightBFn));
    reg.register_google_sheets(Arc::new(MidBFn));
    reg.register_google_sheets(Arc::new(FindBFn));
    reg.register_google_sheets(Arc::new(SearchBFn));
    reg.register_google_sheets(Arc::new(ReplaceBFn));
    reg.register_google_sheets(Arc::new(RegexMatchFn));
    reg.register_google_sheets(Arc::new(RegexExtractFn));
    reg.register_google_sheets(Arc::new(RegexReplaceFn));
    reg.register_google_sheets(Arc::new(DollarFn));
    reg.register_google_sheets(Arc::new(FixedFn));
    reg.register_google_sheets(Arc::new(AscFn));
    reg.register_google_sheets(Arc::new(SplitFn));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenb_counts_supplementary_plane_as_four_bytes() {
        assert_eq!("😀".len(), 4);
    }

    #[test]
    fn searchb_finds_original_byte_offset() {
        // 'İ' is 2 bytes in UTF-8; 's' starts at byte index 2.
        let haystack = "İstanbul";
        assert_eq!(haystack.as_bytes()[0..2], *"İ".as_bytes());
        let idx = haystack.find('s').unwrap();
        assert_eq!(idx, 2);
    }

    #[test]
    fn byte_slice_may_bisect_multibyte_char() {
        let s = "😀x";
        // byte 0..1 is the first byte of the 4-byte emoji; lossy decode
        // must not panic.
        let _ = byte_slice(s, 0, 1);
    }

    #[test]
    fn format_grouped_adds_thousands_separators() {
        assert_eq!(format_grouped(1234567.5, 2), "1,234,567.50");
    }
}
