//! Pratt-precedence expression parser (`spec.md` §4.5, C5).

use std::fmt;

use formualizer_common::{Coord, ExcelErrorKind, Ref};

use crate::config::Config;
use crate::tokenizer::{Associativity, Token, TokenSubType, TokenType, Tokenizer, get_precedence};

#[derive(Debug, Clone, PartialEq)]
pub enum ParserError {
    UnexpectedEnd,
    UnexpectedToken(String),
    InvalidReference(String),
    InvalidNumber(String),
}

impl fmt::Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParserError::UnexpectedEnd => write!(f, "unexpected end of formula"),
            ParserError::UnexpectedToken(t) => write!(f, "unexpected token: {t}"),
            ParserError::InvalidReference(t) => write!(f, "invalid reference: {t}"),
            ParserError::InvalidNumber(t) => write!(f, "invalid number: {t}"),
        }
    }
}

impl std::error::Error for ParserError {}

/// Operator set (`spec.md` §4.3): `+ - * / ^ & = <> < > <= >= : ,-range-
/// union`. `Percent` doubles as the lone postfix unary operator; `Neg`/
/// `Pos` are the prefix unary forms of `-`/`+`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Range,
    Union,
    Neg,
    Pos,
    Percent,
}

/// Expression tree node (`spec.md` §3.4). Each node exclusively owns its
/// children; nodes are immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    Number(f64),
    Text(String),
    Bool(bool),
    ErrorLit(ExcelErrorKind),
    CellReference(Ref),
    RangeReference(Ref),
    NamedExpression(String),
    ArrayLiteral(Vec<Vec<Ast>>),
    UnaryOp { op: Operator, arg: Box<Ast> },
    BinaryOp { op: Operator, lhs: Box<Ast>, rhs: Box<Ast> },
    Procedure { name: String, args: Vec<Ast> },
}

/// Parse a formula (with or without leading `=`) under `config`.
pub fn parse(formula: &str, config: Config) -> Result<Ast, ParserError> {
    let tokens = Tokenizer::new(formula, config.clone())
        .map_err(|e| ParserError::UnexpectedToken(e.message))?
        .parse()
        .map_err(|e| ParserError::UnexpectedToken(e.message))?;
    let meaningful: Vec<Token> = tokens
        .into_iter()
        .filter(|t| t.token_type != TokenType::Whitespace)
        .collect();
    let mut parser = Parser {
        tokens: meaningful,
        pos: 0,
    };
    let ast = parser.parse_expr(0)?;
    if parser.pos != parser.tokens.len() {
        return Err(ParserError::UnexpectedToken(
            parser.tokens[parser.pos].value.clone(),
        ));
    }
    Ok(ast)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect_value(&mut self, value: &str) -> Result<(), ParserError> {
        match self.advance() {
            Some(t) if t.value == value => Ok(()),
            Some(t) => Err(ParserError::UnexpectedToken(t.value)),
            None => Err(ParserError::UnexpectedEnd),
        }
    }

    /// Precedence-climbing loop (`spec.md` §4.5 table). `min_bp` is the
    /// minimum binding power an infix operator must have to be consumed
    /// at this recursion depth.
    fn parse_expr(&mut self, min_bp: u8) -> Result<Ast, ParserError> {
        let mut lhs = self.parse_prefix()?;

        loop {
            let Some(tok) = self.peek() else { break };
            if tok.token_type == TokenType::Paren && tok.subtype == TokenSubType::Close {
                break;
            }
            if tok.token_type == TokenType::Array && tok.subtype == TokenSubType::Close {
                break;
            }

            if tok.token_type == TokenType::OpPostfix && tok.value == "%" {
                let (bp, _) = get_precedence("%").unwrap();
                if bp < min_bp {
                    break;
                }
                self.advance();
                lhs = Ast::UnaryOp {
                    op: Operator::Percent,
                    arg: Box::new(lhs),
                };
                continue;
            }

            let op_str = match (tok.token_type, tok.value.as_str()) {
                (TokenType::OpInfix, s) => s.to_string(),
                (TokenType::Sep, ",") => ",".to_string(),
                _ => break,
            };
            let Some((bp, assoc)) = get_precedence(&op_str) else {
                break;
            };
            if bp < min_bp {
                break;
            }
            self.advance();
            let next_min = match assoc {
                Associativity::Left => bp + 1,
                Associativity::Right => bp,
            };
            let rhs = self.parse_expr(next_min)?;
            let op = match op_str.as_str() {
                "+" => Operator::Add,
                "-" => Operator::Sub,
                "*" => Operator::Mul,
                "/" => Operator::Div,
                "^" => Operator::Pow,
                "&" => Operator::Concat,
                "=" => Operator::Eq,
                "<>" => Operator::Ne,
                "<" => Operator::Lt,
                ">" => Operator::Gt,
                "<=" => Operator::Le,
                ">=" => Operator::Ge,
                ":" => Operator::Range,
                "," => Operator::Union,
                other => return Err(ParserError::UnexpectedToken(other.to_string())),
            };
            lhs = if op == Operator::Range {
                self.lower_range(lhs, rhs)?
            } else {
                Ast::BinaryOp { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
            };
        }

        Ok(lhs)
    }

    /// `A1:B2` between two references lowers to a single `RangeReference`
    /// rather than staying a `BinaryOp` (`spec.md` §4.5). `1:5` between
    /// two whole-number literals lowers to a `RowRange` the same way —
    /// the tokenizer has no distinct subtype for a bare row number, so
    /// the distinction is made here once both sides are in hand.
    fn lower_range(&self, lhs: Ast, rhs: Ast) -> Result<Ast, ParserError> {
        if let (Ast::Number(a), Ast::Number(b)) = (&lhs, &rhs) {
            if *a >= 1.0 && *b >= 1.0 && a.fract() == 0.0 && b.fract() == 0.0 {
                return Ok(Ast::RangeReference(Ref::RowRange {
                    sheet: None,
                    start_row: (*a as u32) - 1,
                    end_row: (*b as u32) - 1,
                }));
            }
        }
        let lhs_ref = Self::as_ref(&lhs).ok_or_else(|| {
            ParserError::InvalidReference("range operator requires a reference on the left".into())
        })?;
        let rhs_ref = Self::as_ref(&rhs).ok_or_else(|| {
            ParserError::InvalidReference("range operator requires a reference on the right".into())
        })?;
        let sheet = lhs_ref.sheet().or(rhs_ref.sheet()).map(|s| s.to_string());
        let (start, end) = match (lhs_ref, rhs_ref) {
            (Ref::Cell { coord: a, .. }, Ref::Cell { coord: b, .. }) => (*a, *b),
            _ => {
                return Err(ParserError::InvalidReference(
                    "range operator endpoints must be single cells".into(),
                ))
            }
        };
        Ok(Ast::RangeReference(Ref::Area {
            sheet,
            start,
            end,
            start_row_absolute: false,
            start_col_absolute: false,
            end_row_absolute: false,
            end_col_absolute: false,
        }))
    }

    fn as_ref(ast: &Ast) -> Option<&Ref> {
        match ast {
            Ast::CellReference(r) | Ast::RangeReference(r) => Some(r),
            _ => None,
        }
    }

    fn parse_prefix(&mut self) -> Result<Ast, ParserError> {
        let Some(tok) = self.peek().cloned() else {
            return Err(ParserError::UnexpectedEnd);
        };

        if tok.token_type == TokenType::OpInfix && (tok.value == "-" || tok.value == "+") {
            self.advance();
            let (bp, _) = get_precedence("u-").unwrap();
            let arg = self.parse_expr(bp)?;
            let op = if tok.value == "-" { Operator::Neg } else { Operator::Pos };
            return Ok(Ast::UnaryOp { op, arg: Box::new(arg) });
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Ast, ParserError> {
        let tok = self.advance().ok_or(ParserError::UnexpectedEnd)?;
        match (tok.token_type, tok.subtype) {
            (TokenType::Paren, TokenSubType::Open) => {
                let inner = self.parse_expr(0)?;
                self.expect_value(")")?;
                Ok(inner)
            }
            (TokenType::Array, TokenSubType::Open) => self.parse_array_literal(),
            (TokenType::Operand, TokenSubType::Number) => {
                let n: f64 = tok
                    .value
                    .parse()
                    .map_err(|_| ParserError::InvalidNumber(tok.value.clone()))?;
                Ok(Ast::Number(n))
            }
            (TokenType::Operand, TokenSubType::Text) => Ok(Ast::Text(tok.value)),
            (TokenType::Operand, TokenSubType::Logical) => Ok(Ast::Bool(tok.value == "TRUE")),
            (TokenType::Operand, TokenSubType::Error) => ExcelErrorKind::parse(&tok.value)
                .map(Ast::ErrorLit)
                .ok_or_else(|| ParserError::UnexpectedToken(tok.value.clone())),
            (TokenType::Operand, TokenSubType::CellRef) => {
                if split_cell_ref(&tok.value).is_none() {
                    // Bare column-letter token: the tokenizer only emits
                    // this subtype for a letter run immediately followed
                    // by ':' (`spec.md` §4.4 column-range class), so the
                    // ':' and a second column-only token are guaranteed.
                    self.parse_col_range(tok, None)
                } else {
                    self.parse_cell_ref(tok, None)
                }
            }
            (TokenType::Operand, TokenSubType::Range) => {
                let sheet = tok
                    .value
                    .trim_end_matches('!')
                    .trim_matches('\'')
                    .replace("''", "'");
                let next = self.advance().ok_or(ParserError::UnexpectedEnd)?;
                if next.subtype != TokenSubType::CellRef {
                    return Err(ParserError::InvalidReference(next.value));
                }
                if split_cell_ref(&next.value).is_none() {
                    self.parse_col_range(next, Some(sheet))
                } else {
                    self.parse_cell_ref(next, Some(sheet))
                }
            }
            (TokenType::Operand, TokenSubType::NamedExpression) => {
                Ok(Ast::NamedExpression(tok.value))
            }
            (TokenType::Func, _) => self.parse_procedure(tok.value),
            _ => Err(ParserError::UnexpectedToken(tok.value)),
        }
    }

    fn parse_cell_ref(&mut self, tok: Token, sheet: Option<String>) -> Result<Ast, ParserError> {
        let (col_letters, row_digits) = split_cell_ref(&tok.value)
            .ok_or_else(|| ParserError::InvalidReference(tok.value.clone()))?;
        let col = formualizer_common::reference::letters_to_col(col_letters)
            .ok_or_else(|| ParserError::InvalidReference(tok.value.clone()))?;
        let row: u32 = row_digits
            .parse::<u32>()
            .map_err(|_| ParserError::InvalidReference(tok.value.clone()))?;
        let row = row.saturating_sub(1);
        Ok(Ast::CellReference(Ref::Cell {
            sheet,
            coord: Coord::new(row, col),
            row_absolute: false,
            col_absolute: false,
        }))
    }

    /// `A:C` (optionally `Sheet!A:C`) — the leading token is a bare column
    /// letter run; consume `:` and the matching column-only token inline
    /// rather than going through the generic operator loop, since a
    /// column range is atomic at the token level (`spec.md` §3.3/§4.4).
    fn parse_col_range(&mut self, first: Token, sheet: Option<String>) -> Result<Ast, ParserError> {
        self.expect_value(":")?;
        let next = self.advance().ok_or(ParserError::UnexpectedEnd)?;
        if next.subtype != TokenSubType::CellRef || split_cell_ref(&next.value).is_some() {
            return Err(ParserError::InvalidReference(next.value));
        }
        let start_col = formualizer_common::reference::letters_to_col(&first.value)
            .ok_or_else(|| ParserError::InvalidReference(first.value.clone()))?;
        let end_col = formualizer_common::reference::letters_to_col(&next.value)
            .ok_or_else(|| ParserError::InvalidReference(next.value.clone()))?;
        Ok(Ast::RangeReference(Ref::ColRange {
            sheet,
            start_col,
            end_col,
        }))
    }

    fn parse_array_literal(&mut self) -> Result<Ast, ParserError> {
        let mut rows: Vec<Vec<Ast>> = vec![Vec::new()];
        loop {
            if let Some(tok) = self.peek() {
                if tok.token_type == TokenType::Array && tok.subtype == TokenSubType::Close {
                    self.advance();
                    break;
                }
            }
            let elem = self.parse_expr(get_precedence(",").unwrap().0 + 1)?;
            rows.last_mut().unwrap().push(elem);
            match self.peek() {
                Some(t) if t.token_type == TokenType::Sep && t.subtype == TokenSubType::Arg => {
                    self.advance();
                }
                Some(t) if t.token_type == TokenType::Sep && t.subtype == TokenSubType::Row => {
                    self.advance();
                    rows.push(Vec::new());
                }
                Some(t) if t.token_type == TokenType::Array && t.subtype == TokenSubType::Close => {
                    self.advance();
                    break;
                }
                Some(t) => return Err(ParserError::UnexpectedToken(t.value.clone())),
                None => return Err(ParserError::UnexpectedEnd),
            }
        }
        Ok(Ast::ArrayLiteral(rows))
    }

    fn parse_procedure(&mut self, raw_name: String) -> Result<Ast, ParserError> {
        self.expect_value("(")?;
        let name = raw_name.to_ascii_uppercase();
        let mut args = Vec::new();
        if let Some(tok) = self.peek() {
            if tok.token_type == TokenType::Paren && tok.subtype == TokenSubType::Close {
                self.advance();
                return Ok(Ast::Procedure { name, args });
            }
        }
        loop {
            let arg = self.parse_expr(get_precedence(",").unwrap().0 + 1)?;
            args.push(arg);
            match self.peek() {
                Some(t) if t.token_type == TokenType::Sep && t.subtype == TokenSubType::Arg => {
                    self.advance();
                }
                Some(t) if t.token_type == TokenType::Paren && t.subtype == TokenSubType::Close => {
                    self.advance();
                    break;
                }
                Some(t) => return Err(ParserError::UnexpectedToken(t.value.clone())),
                None => return Err(ParserError::UnexpectedEnd),
            }
        }
        Ok(Ast::Procedure { name, args })
    }
}

fn split_cell_ref(s: &str) -> Option<(&str, &str)> {
    let split_at = s.find(|c: char| c.is_ascii_digit())?;
    Some((&s[..split_at], &s[split_at..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn p(formula: &str) -> Ast {
        parse(formula, Config::default()).unwrap()
    }

    #[test]
    fn parses_simple_binary_expression() {
        let ast = p("=1+2*3");
        assert_eq!(
            ast,
            Ast::BinaryOp {
                op: Operator::Add,
                lhs: Box::new(Ast::Number(1.0)),
                rhs: Box::new(Ast::BinaryOp {
                    op: Operator::Mul,
                    lhs: Box::new(Ast::Number(2.0)),
                    rhs: Box::new(Ast::Number(3.0)),
                }),
            }
        );
    }

    #[test]
    fn right_associative_power() {
        let ast = p("=2^3^2");
        assert_eq!(
            ast,
            Ast::BinaryOp {
                op: Operator::Pow,
                lhs: Box::new(Ast::Number(2.0)),
                rhs: Box::new(Ast::BinaryOp {
                    op: Operator::Pow,
                    lhs: Box::new(Ast::Number(3.0)),
                    rhs: Box::new(Ast::Number(2.0)),
                }),
            }
        );
    }

    #[test]
    fn range_operator_lowers_to_range_reference() {
        let ast = p("=A1:B2");
        match ast {
            Ast::RangeReference(Ref::Area { start, end, .. }) => {
                assert_eq!(start, Coord::new(0, 0));
                assert_eq!(end, Coord::new(1, 1));
            }
            other => panic!("expected RangeReference, got {other:?}"),
        }
    }

    #[test]
    fn function_call_with_args() {
        let ast = p("=SUM(A1:A3, 5)");
        match ast {
            Ast::Procedure { name, args } => {
                assert_eq!(name, "SUM");
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected Procedure, got {other:?}"),
        }
    }

    #[test]
    fn postfix_percent_applies_before_addition() {
        let ast = p("=1+50%");
        assert_eq!(
            ast,
            Ast::BinaryOp {
                op: Operator::Add,
                lhs: Box::new(Ast::Number(1.0)),
                rhs: Box::new(Ast::UnaryOp {
                    op: Operator::Percent,
                    arg: Box::new(Ast::Number(50.0)),
                }),
            }
        );
    }

    #[test]
    fn array_literal_parses_rows_and_cols() {
        let ast = p("={1,2;3,4}");
        assert_eq!(
            ast,
            Ast::ArrayLiteral(vec![
                vec![Ast::Number(1.0), Ast::Number(2.0)],
                vec![Ast::Number(3.0), Ast::Number(4.0)],
            ])
        );
    }

    #[test]
    fn type_of_array_literal_is_an_array_literal_node() {
        let ast = p("=TYPE({1,2,3})");
        match ast {
            Ast::Procedure { name, args } => {
                assert_eq!(name, "TYPE");
                assert!(matches!(args[0], Ast::ArrayLiteral(_)));
            }
            other => panic!("expected Procedure, got {other:?}"),
        }
    }

    #[test]
    fn column_range_lowers_to_col_range_ref() {
        let ast = p("=A:C");
        match ast {
            Ast::RangeReference(Ref::ColRange { start_col, end_col, .. }) => {
                assert_eq!(start_col, 0);
                assert_eq!(end_col, 2);
            }
            other => panic!("expected ColRange, got {other:?}"),
        }
    }

    #[test]
    fn row_range_lowers_to_row_range_ref() {
        let ast = p("=1:5");
        match ast {
            Ast::RangeReference(Ref::RowRange { start_row, end_row, .. }) => {
                assert_eq!(start_row, 0);
                assert_eq!(end_row, 4);
            }
            other => panic!("expected RowRange, got {other:?}"),
        }
    }

    #[test]
    fn sheet_qualified_column_range() {
        let ast = p("='Sheet One'!A:B");
        match ast {
            Ast::RangeReference(Ref::ColRange { sheet, start_col, end_col }) => {
                assert_eq!(sheet.as_deref(), Some("Sheet One"));
                assert_eq!(start_col, 0);
                assert_eq!(end_col, 1);
            }
            other => panic!("expected ColRange, got {other:?}"),
        }
    }

    #[test]
    fn sheet_qualified_reference() {
        let ast = p("='Sheet One'!A1");
        match ast {
            Ast::CellReference(Ref::Cell { sheet, .. }) => {
                assert_eq!(sheet.as_deref(), Some("Sheet One"));
            }
            other => panic!("expected CellReference, got {other:?}"),
        }
    }
}
