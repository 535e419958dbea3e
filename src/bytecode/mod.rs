//! The wire-format bytecode: flat `(tag, payload)` word pairs, plus the
//! emitter that lowers a parsed expression into them.
//!
//! A stream is always an even number of i64 words. The word at an even index
//! carries a tag in its low 8 bits; the following word is the payload: an
//! operator code, a 0/1 boolean, an integer, an IEEE-754 bit pattern, a raw
//! descriptor pointer, or a symbol ordinal.

use crate::jit::ArgType;
use crate::jit::ops;
use crate::parser::Expr;

/// Discriminator for one opcode pair. The numeric values are wire-stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    Operator = 0,
    Bool = 1,
    Int = 2,
    Float = 3,
    Str = 4,
    Symbol = 5,
}

impl Tag {
    /// Decode a tag word; only the low 8 bits are significant.
    pub fn from_word(word: i64) -> Option<Tag> {
        match (word & 0xff) as u8 {
            0 => Some(Tag::Operator),
            1 => Some(Tag::Bool),
            2 => Some(Tag::Int),
            3 => Some(Tag::Float),
            4 => Some(Tag::Str),
            5 => Some(Tag::Symbol),
            _ => None,
        }
    }
}

/// A `{pointer, length}` view of caller-owned bytes. String payloads on the
/// wire and string argument slots both hold a pointer to one of these.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct StrDesc {
    pub ptr: *const u8,
    pub len: i64,
}

impl StrDesc {
    pub fn new(s: &str) -> StrDesc {
        StrDesc { ptr: s.as_ptr(), len: s.len() as i64 }
    }
}

/// A string literal pinned behind stable heap allocations so the descriptor
/// pointer baked into the bytecode stays valid.
#[derive(Debug)]
pub(crate) struct Literal {
    // Keeps the bytes alive; `desc` points into it.
    _text: Box<str>,
    desc: Box<StrDesc>,
}

impl Literal {
    fn new(s: &str) -> Literal {
        let text: Box<str> = s.into();
        let desc = Box::new(StrDesc { ptr: text.as_ptr(), len: text.len() as i64 });
        Literal { _text: text, desc }
    }

    fn payload(&self) -> i64 {
        &*self.desc as *const StrDesc as i64
    }
}

/// An emitted opcode stream together with its argument layout and any pinned
/// string literals. The literals must outlive every use of the stream; the
/// compiler takes ownership of them when it consumes a `Program`.
#[derive(Debug)]
pub struct Program {
    code: Vec<i64>,
    arg_types: Vec<u8>,
    literals: Vec<Literal>,
}

impl Program {
    pub fn words(&self) -> &[i64] {
        &self.code
    }

    /// One tag byte per declared argument, in declaration order.
    pub fn arg_types(&self) -> &[u8] {
        &self.arg_types
    }

    pub fn arg_count(&self) -> usize {
        self.arg_types.len()
    }

    pub(crate) fn into_parts(self) -> (Vec<i64>, Vec<u8>, Vec<Literal>) {
        (self.code, self.arg_types, self.literals)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EmitError {
    #[error("no operator {name} taking {argc} operands")]
    UnknownOperator { name: String, argc: usize },
    #[error("symbol {name} not found")]
    UnknownSymbol { name: String },
    #[error("string literal too large")]
    OversizeString,
}

struct Emitter<'a> {
    params: &'a [(&'a str, ArgType)],
    code: Vec<i64>,
    literals: Vec<Literal>,
}

/// Lower an expression into bytecode against a declared parameter list.
/// Symbols resolve to the ordinal of their name in `params`; every declared
/// parameter keeps its slot whether or not the expression uses it.
pub fn emit(expr: &Expr, params: &[(&str, ArgType)]) -> Result<Program, EmitError> {
    let mut e = Emitter { params, code: Vec::new(), literals: Vec::new() };
    e.walk(expr)?;
    Ok(Program {
        code: e.code,
        arg_types: params.iter().map(|(_, t)| t.as_byte()).collect(),
        literals: e.literals,
    })
}

impl Emitter<'_> {
    fn pair(&mut self, tag: Tag, payload: i64) {
        self.code.push(tag as i64);
        self.code.push(payload);
    }

    fn walk(&mut self, expr: &Expr) -> Result<(), EmitError> {
        match expr {
            Expr::Bool(b) => self.pair(Tag::Bool, *b as i64),
            Expr::Int(v) => self.pair(Tag::Int, *v),
            Expr::Float(v) => self.pair(Tag::Float, v.to_bits() as i64),
            Expr::Str(s) => {
                if s.len() > i32::MAX as usize {
                    return Err(EmitError::OversizeString);
                }
                let lit = Literal::new(s);
                let payload = lit.payload();
                self.literals.push(lit);
                self.pair(Tag::Str, payload);
            }
            Expr::Symbol(name) => {
                let ordinal = self
                    .params
                    .iter()
                    .position(|(n, _)| n == name)
                    .ok_or_else(|| EmitError::UnknownSymbol { name: name.clone() })?;
                self.pair(Tag::Symbol, ordinal as i64);
            }
            Expr::Call { op, args } => {
                let info = ops::by_name(op, args.len()).ok_or_else(|| {
                    EmitError::UnknownOperator { name: op.clone(), argc: args.len() }
                })?;
                if info.arity == 2 && args.len() > 2 {
                    // Left-associative fold: `(op a b c)` becomes `a b op c op`,
                    // so the earliest-pushed operand stays the left one.
                    self.walk(&args[0])?;
                    self.walk(&args[1])?;
                    self.pair(Tag::Operator, info.code as i64);
                    for arg in &args[2..] {
                        self.walk(arg)?;
                        self.pair(Tag::Operator, info.code as i64);
                    }
                } else {
                    for arg in args {
                        self.walk(arg)?;
                    }
                    self.pair(Tag::Operator, info.code as i64);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn emit_src(src: &str, params: &[(&str, ArgType)]) -> Program {
        emit(&parse(src).unwrap(), params).unwrap()
    }

    #[test]
    fn pair_layout() {
        let p = emit_src("(+ 1 2)", &[]);
        assert_eq!(p.words(), &[2, 1, 2, 2, 0, 0x01]);
        assert_eq!(p.arg_count(), 0);
    }

    #[test]
    fn float_payload_is_bit_pattern() {
        let p = emit_src("3.5", &[]);
        assert_eq!(p.words(), &[3, 3.5f64.to_bits() as i64]);
    }

    #[test]
    fn bool_payload() {
        let p = emit_src("(&& true false)", &[]);
        assert_eq!(p.words(), &[1, 1, 1, 0, 0, 0x20]);
    }

    #[test]
    fn variadic_fold_interleaves_operators() {
        let p = emit_src("(+ 1 2 3)", &[]);
        assert_eq!(p.words(), &[2, 1, 2, 2, 0, 0x01, 2, 3, 0, 0x01]);
    }

    #[test]
    fn unary_minus_selects_neg() {
        let p = emit_src("(- 5)", &[]);
        assert_eq!(p.words(), &[2, 5, 0, 0x03]);
    }

    #[test]
    fn symbol_ordinals_follow_declaration_order() {
        let params = [("x", ArgType::Int), ("y", ArgType::Float)];
        let p = emit_src("(+ y x)", &params);
        assert_eq!(p.words(), &[5, 1, 5, 0, 0, 0x01]);
        assert_eq!(p.arg_types(), &[2, 3]);
    }

    #[test]
    fn unused_params_keep_their_slot() {
        let params = [("x", ArgType::Int), ("y", ArgType::Int)];
        let p = emit_src("y", &params);
        assert_eq!(p.words(), &[5, 1]);
        assert_eq!(p.arg_count(), 2);
    }

    #[test]
    fn unknown_symbol_is_an_error() {
        let err = emit(&parse("(+ x 1)").unwrap(), &[]).unwrap_err();
        assert_eq!(err, EmitError::UnknownSymbol { name: "x".into() });
    }

    #[test]
    fn unknown_operator_is_an_error() {
        let err = emit(&parse("(frob 1 2)").unwrap(), &[]).unwrap_err();
        assert_eq!(err, EmitError::UnknownOperator { name: "frob".into(), argc: 2 });
    }

    #[test]
    fn wrong_arity_is_an_error() {
        assert!(emit(&parse("(+ 1)").unwrap(), &[]).is_err());
        assert!(emit(&parse("(sin 1 2 3)").unwrap(), &[]).is_err());
    }

    #[test]
    fn string_literal_is_pinned() {
        let p = emit_src(r#"(len "Hello")"#, &[]);
        assert_eq!(p.words()[0], 4);
        let desc = p.words()[1] as *const StrDesc;
        let (ptr, len) = unsafe { ((*desc).ptr, (*desc).len) };
        assert_eq!(len, 5);
        let bytes = unsafe { std::slice::from_raw_parts(ptr, len as usize) };
        assert_eq!(bytes, b"Hello");
    }

    #[test]
    fn tag_decoding_masks_low_byte() {
        assert_eq!(Tag::from_word(0x02), Some(Tag::Int));
        assert_eq!(Tag::from_word(0x102), Some(Tag::Int));
        assert_eq!(Tag::from_word(0x07), None);
    }
}
