//! Lexer and parser for the s-expression surface syntax.
//!
//! The grammar is deliberately tiny: an expression is an atom (bool, int,
//! float, string, symbol) or `(operator expr*)`. Numbers carry no sign;
//! negation is spelled `(- 0 5)`.

use logos::Logos;
use serde::Serialize;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,

    #[token("true", |_| true)]
    #[token("false", |_| false)]
    Bool(bool),

    // A trailing or leading dot is fine: `31536000.` and `.5` both lex as floats.
    #[regex(r"[0-9]+\.[0-9]*|\.[0-9]+", |lex| lex.slice().parse::<f64>().ok(), priority = 4)]
    Float(f64),

    #[regex(r"[0-9]+", parse_int, priority = 3)]
    Int(i64),

    #[regex(r#""([^"\\]|\\.)*""#, unescape)]
    Str(String),

    #[regex(r#"[^\s()"]+"#, |lex| lex.slice().to_string(), priority = 1)]
    Symbol(String),
}

/// Integers that overflow i64 fall back to the u64 bit pattern, so the full
/// 64-bit payload range stays reachable from source text.
fn parse_int(lex: &mut logos::Lexer<'_, Token>) -> Option<i64> {
    let s = lex.slice();
    s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<u64>().ok().map(|v| v as i64))
}

fn unescape(lex: &mut logos::Lexer<'_, Token>) -> Option<String> {
    let raw = lex.slice();
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => return None,
        }
    }
    Some(out)
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParseError {
    #[error("unrecognized token at byte {offset}")]
    Lex { offset: usize },
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unexpected ')' at byte {offset}")]
    StrayClose { offset: usize },
    #[error("expected an operator symbol at byte {offset}")]
    ExpectedOperator { offset: usize },
    #[error("trailing input at byte {offset}")]
    Trailing { offset: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Symbol(String),
    Call { op: String, args: Vec<Expr> },
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Bool(b) => write!(f, "{}", b),
            Expr::Int(v) => write!(f, "{}", v),
            Expr::Float(v) => write!(f, "{}", v),
            Expr::Str(s) => write!(f, "{:?}", s),
            Expr::Symbol(s) => write!(f, "{}", s),
            Expr::Call { op, args } => {
                write!(f, "({}", op)?;
                for a in args {
                    write!(f, " {}", a)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Parse a single expression, requiring the whole input to be consumed.
pub fn parse(src: &str) -> Result<Expr, ParseError> {
    let mut lex = Token::lexer(src);
    let mut tokens = Vec::new();
    while let Some(tok) = lex.next() {
        match tok {
            Ok(t) => tokens.push((t, lex.span().start)),
            Err(()) => return Err(ParseError::Lex { offset: lex.span().start }),
        }
    }

    let mut pos = 0;
    let expr = parse_expr(&tokens, &mut pos)?;
    if pos != tokens.len() {
        return Err(ParseError::Trailing { offset: tokens[pos].1 });
    }
    Ok(expr)
}

fn parse_expr(tokens: &[(Token, usize)], pos: &mut usize) -> Result<Expr, ParseError> {
    let (tok, offset) = tokens.get(*pos).ok_or(ParseError::UnexpectedEof)?;
    *pos += 1;
    match tok {
        Token::Bool(b) => Ok(Expr::Bool(*b)),
        Token::Int(v) => Ok(Expr::Int(*v)),
        Token::Float(v) => Ok(Expr::Float(*v)),
        Token::Str(s) => Ok(Expr::Str(s.clone())),
        Token::Symbol(s) => Ok(Expr::Symbol(s.clone())),
        Token::RParen => Err(ParseError::StrayClose { offset: *offset }),
        Token::LParen => {
            let (op_tok, op_offset) = tokens.get(*pos).ok_or(ParseError::UnexpectedEof)?;
            let op = match op_tok {
                Token::Symbol(s) => s.clone(),
                _ => return Err(ParseError::ExpectedOperator { offset: *op_offset }),
            };
            *pos += 1;

            let mut args = Vec::new();
            loop {
                match tokens.get(*pos) {
                    None => return Err(ParseError::UnexpectedEof),
                    Some((Token::RParen, _)) => {
                        *pos += 1;
                        return Ok(Expr::Call { op, args });
                    }
                    Some(_) => args.push(parse_expr(tokens, pos)?),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(src: &str) -> Vec<Token> {
        Token::lexer(src).map(|t| t.unwrap()).collect()
    }

    #[test]
    fn lex_atoms() {
        assert_eq!(
            lex_all(r#"( ) true false 12 1.5 .5 31536000. "hi" x"#),
            vec![
                Token::LParen,
                Token::RParen,
                Token::Bool(true),
                Token::Bool(false),
                Token::Int(12),
                Token::Float(1.5),
                Token::Float(0.5),
                Token::Float(31536000.0),
                Token::Str("hi".to_string()),
                Token::Symbol("x".to_string()),
            ]
        );
    }

    #[test]
    fn lex_operators_as_symbols() {
        assert_eq!(
            lex_all("+ - >>> == != nan? ->bool **"),
            vec![
                Token::Symbol("+".into()),
                Token::Symbol("-".into()),
                Token::Symbol(">>>".into()),
                Token::Symbol("==".into()),
                Token::Symbol("!=".into()),
                Token::Symbol("nan?".into()),
                Token::Symbol("->bool".into()),
                Token::Symbol("**".into()),
            ]
        );
    }

    #[test]
    fn lex_symbol_with_bool_prefix() {
        assert_eq!(lex_all("truex"), vec![Token::Symbol("truex".into())]);
    }

    #[test]
    fn lex_u64_overflow_wraps() {
        assert_eq!(
            lex_all("18446744073709551615"),
            vec![Token::Int(u64::MAX as i64)]
        );
    }

    #[test]
    fn lex_string_escapes() {
        assert_eq!(
            lex_all(r#""a\"b\\c\nd""#),
            vec![Token::Str("a\"b\\c\nd".to_string())]
        );
    }

    #[test]
    fn parse_atom() {
        assert_eq!(parse("42"), Ok(Expr::Int(42)));
        assert_eq!(parse("true"), Ok(Expr::Bool(true)));
    }

    #[test]
    fn parse_nested_call() {
        let e = parse("(+ (* 2 x) (% y 9))").unwrap();
        assert_eq!(
            e,
            Expr::Call {
                op: "+".into(),
                args: vec![
                    Expr::Call {
                        op: "*".into(),
                        args: vec![Expr::Int(2), Expr::Symbol("x".into())],
                    },
                    Expr::Call {
                        op: "%".into(),
                        args: vec![Expr::Symbol("y".into()), Expr::Int(9)],
                    },
                ],
            }
        );
    }

    #[test]
    fn parse_errors() {
        assert_eq!(parse(""), Err(ParseError::UnexpectedEof));
        assert_eq!(parse("(+ 1 2"), Err(ParseError::UnexpectedEof));
        assert_eq!(parse(")"), Err(ParseError::StrayClose { offset: 0 }));
        assert_eq!(parse("1 2"), Err(ParseError::Trailing { offset: 2 }));
        assert_eq!(parse("(1 2)"), Err(ParseError::ExpectedOperator { offset: 1 }));
        assert!(matches!(parse(r#""open"#), Err(ParseError::Lex { .. })));
    }

    #[test]
    fn display_round_trip() {
        let e = parse(r#"(index "The quick" s)"#).unwrap();
        assert_eq!(e.to_string(), r#"(index "The quick" s)"#);
    }

    #[test]
    fn negative_numbers_are_symbols() {
        // The reader has no signed literals; `-5` is a (probably undeclared) symbol.
        assert_eq!(parse("-5"), Ok(Expr::Symbol("-5".into())));
    }
}
