//! Criterion compiler and the generic `*IFS` folder (`spec.md` §4.9, C9).

use formualizer_common::{ExcelError, Range, Value};

use crate::arithmetic::float_cmp;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug)]
enum Comparand {
    Number(f64),
    /// Wildcard-compiled text pattern; `*` → any run, `?` → one char,
    /// `~*`/`~?` escape a literal wildcard character.
    Pattern(Vec<PatternTok>),
    Bool(bool),
    Blank,
}

#[derive(Clone, Debug, PartialEq)]
enum PatternTok {
    Any,
    One,
    Lit(char),
}

fn compile_pattern(s: &str) -> Vec<PatternTok> {
    let mut toks = Vec::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '~' => match chars.peek() {
                Some('*') => {
                    toks.push(PatternTok::Lit('*'));
                    chars.next();
                }
                Some('?') => {
                    toks.push(PatternTok::Lit('?'));
                    chars.next();
                }
                _ => toks.push(PatternTok::Lit('~')),
            },
            '*' => toks.push(PatternTok::Any),
            '?' => toks.push(PatternTok::One),
            other => toks.push(PatternTok::Lit(other.to_ascii_lowercase())),
        }
    }
    toks
}

fn pattern_matches(toks: &[PatternTok], text: &str) -> bool {
    let chars: Vec<char> = text.to_ascii_lowercase().chars().collect();
    fn go(toks: &[PatternTok], s: &[char]) -> bool {
        match toks.first() {
            None => s.is_empty(),
            Some(PatternTok::Lit(c)) => s.first() == Some(c) && go(&toks[1..], &s[1.min(s.len())..]),
            Some(PatternTok::One) => !s.is_empty() && go(&toks[1..], &s[1..]),
            Some(PatternTok::Any) => {
                for i in 0..=s.len() {
                    if go(&toks[1..], &s[i..]) {
                        return true;
                    }
                }
                false
            }
        }
    }
    go(toks, &chars)
}

/// A compiled criterion predicate (`spec.md` §4.9).
#[derive(Clone, Debug)]
pub struct Criterion {
    op: CmpOp,
    comparand: Comparand,
}

impl Criterion {
    /// Compile a scalar criteria literal. Leading `=`/`<>`/`<`/`<=`/`>`/`>=`
    /// select the operator; bare text/number is `=` with wildcard matching.
    pub fn compile(v: &Value) -> Result<Self, ExcelError> {
        match v {
            Value::Number(n, _) => Ok(Self {
                op: CmpOp::Eq,
                comparand: Comparand::Number(*n),
            }),
            Value::Bool(b) => Ok(Self {
                op: CmpOp::Eq,
                comparand: Comparand::Bool(*b),
            }),
            Value::Empty => Ok(Self {
                op: CmpOp::Eq,
                comparand: Comparand::Blank,
            }),
            Value::Error(e) => Err(e.clone()),
            Value::Text(s) => {
                let (op, rest) = Self::split_op(s);
                let rest_trim = rest.trim();
                if let Ok(n) = rest_trim.parse::<f64>() {
                    Ok(Self {
                        op,
                        comparand: Comparand::Number(n),
                    })
                } else if rest_trim.is_empty() && op == CmpOp::Eq {
                    Ok(Self {
                        op: CmpOp::Eq,
                        comparand: Comparand::Blank,
                    })
                } else {
                    Ok(Self {
                        op,
                        comparand: Comparand::Pattern(compile_pattern(rest_trim)),
                    })
                }
            }
        }
    }

    fn split_op(s: &str) -> (CmpOp, &str) {
        for (prefix, op) in [
            ("<=", CmpOp::Le),
            (">=", CmpOp::Ge),
            ("<>", CmpOp::Ne),
            ("<", CmpOp::Lt),
            (">", CmpOp::Gt),
            ("=", CmpOp::Eq),
        ] {
            if let Some(rest) = s.strip_prefix(prefix) {
                return (op, rest);
            }
        }
        (CmpOp::Eq, s)
    }

    /// Test a sheet value against this criterion (`spec.md` §4.9): numeric
    /// comparands compare numerically (after number coercion of the cell),
    /// text comparands compare textually with case-insensitive wildcards.
    pub fn matches(&self, cell: &Value) -> bool {
        let is_eq_like = matches!(self.op, CmpOp::Eq | CmpOp::Ne);
        match &self.comparand {
            Comparand::Number(n) => {
                let cell_n = match cell {
                    Value::Number(x, _) => Some(*x),
                    Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                    Value::Text(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                let Some(x) = cell_n else { return self.op == CmpOp::Ne };
                let c = float_cmp(x, *n);
                match self.op {
                    CmpOp::Eq => c == 0,
                    CmpOp::Ne => c != 0,
                    CmpOp::Lt => c < 0,
                    CmpOp::Le => c <= 0,
                    CmpOp::Gt => c > 0,
                    CmpOp::Ge => c >= 0,
                }
            }
            Comparand::Bool(b) => matches!(cell, Value::Bool(x) if x == b) == (self.op == CmpOp::Eq),
            Comparand::Blank => matches!(cell, Value::Empty) == (self.op == CmpOp::Eq),
            Comparand::Pattern(toks) => {
                let text = match cell {
                    Value::Text(s) => s.clone(),
                    Value::Number(n, _) => n.to_string(),
                    Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
                    Value::Empty => String::new(),
                    Value::Error(_) => return false,
                };
                let m = pattern_matches(toks, &text);
                if is_eq_like {
                    m == (self.op == CmpOp::Eq)
                } else {
                    // relational ops on text operands fall back to
                    // lexicographic comparison against the literal text.
                    let lit: String = toks
                        .iter()
                        .map(|t| match t {
                            PatternTok::Lit(c) => *c,
                            _ => ' ',
                        })
                        .collect();
                    let c = text.to_ascii_lowercase().cmp(&lit.trim().to_string());
                    use std::cmp::Ordering::*;
                    match self.op {
                        CmpOp::Lt => c == Less,
                        CmpOp::Le => c != Greater,
                        CmpOp::Gt => c == Greater,
                        CmpOp::Ge => c != Less,
                        _ => false,
                    }
                }
            }
        }
    }
}

/// The generic folder behind `COUNTIF`/`SUMIF`/`AVERAGEIF`/`*IFS`
/// (`spec.md` §4.9): AND all per-range predicates row-wise; if all match,
/// project the corresponding cell of `values` and fold with `combine`.
pub fn criterion_function_compute<T, Combine, Project>(
    criteria_ranges: &[&Range],
    criteria: &[Criterion],
    values: &Range,
    identity: T,
    combine: Combine,
    project: Project,
) -> Result<T, ExcelError>
where
    Combine: Fn(T, T) -> T,
    Project: Fn(&Value) -> T,
{
    debug_assert_eq!(criteria_ranges.len(), criteria.len());
    let n = criteria_ranges
        .first()
        .map(|r| r.width() * r.height())
        .unwrap_or(0);
    let mut acc = identity;
    for idx in 0..n {
        let row = idx / values.width();
        let col = idx % values.width();
        let mut all = true;
        for (range, crit) in criteria_ranges.iter().zip(criteria.iter()) {
            let r = idx / range.width();
            let c = idx % range.width();
            if !crit.matches(&range.get(r, c)) {
                all = false;
                break;
            }
        }
        if all {
            acc = combine(acc, project(&values.get(row, col)));
        }
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_text_is_wildcard_equality() {
        let c = Criterion::compile(&Value::text("a*b")).unwrap();
        assert!(c.matches(&Value::text("aXYZb")));
        assert!(!c.matches(&Value::text("aXYZc")));
    }

    #[test]
    fn comparison_prefix_parses_numeric() {
        let c = Criterion::compile(&Value::text(">20")).unwrap();
        assert!(c.matches(&Value::number(25.0)));
        assert!(!c.matches(&Value::number(15.0)));
    }

    #[test]
    fn not_equal_prefix() {
        let c = Criterion::compile(&Value::text("<>5")).unwrap();
        assert!(c.matches(&Value::number(4.0)));
        assert!(!c.matches(&Value::number(5.0)));
    }

    #[test]
    fn escaped_wildcard_is_literal() {
        let c = Criterion::compile(&Value::text("50~%")).unwrap();
        assert!(c.matches(&Value::text("50%")));
        assert!(!c.matches(&Value::text("50X")));
    }

    #[test]
    fn averageifs_scenario_s2() {
        // spec.md S2: D=5..50 step 5 (10 rows), C=100..1000 step 100.
        let d: Vec<Vec<Value>> = (1..=10).map(|i| vec![Value::number(i as f64 * 5.0)]).collect();
        let c: Vec<Vec<Value>> = (1..=10).map(|i| vec![Value::number(i as f64 * 100.0)]).collect();
        let d_range = Range::only_values(d);
        let c_range = Range::only_values(c);
        let crit_d = Criterion::compile(&Value::text(">20")).unwrap();
        let crit_c = Criterion::compile(&Value::text("<800")).unwrap();
        let (sum, count) = criterion_function_compute(
            &[&d_range, &c_range],
            &[crit_d, crit_c],
            &c_range,
            (0.0_f64, 0_u32),
            |(s, n), (s2, n2)| (s + s2, n + n2),
            |v| match v {
                Value::Number(n, _) => (*n, 1),
                _ => (0.0, 0),
            },
        )
        .unwrap();
        assert_eq!(sum / count as f64, 500.0);
    }
}
