//! Tokenizer, Pratt parser, and `Ast` for the Google Sheets compatibility
//! core. Mode-sensitive lexing lives in [`tokenizer`]; nothing here knows
//! about function dispatch or evaluation — that is `formualizer-eval`'s
//! job.

pub mod config;
pub mod parser;
pub mod tokenizer;

pub use config::{CompatibilityMode, Config, DecimalSeparator, WhitespaceMode};
pub use parser::{Ast, Operator, ParserError, parse};
pub use tokenizer::{Associativity, Token, TokenSubType, TokenType, Tokenizer, TokenizerError};

pub use formualizer_common::{ExcelError, ExcelErrorKind, Ref, Value};
