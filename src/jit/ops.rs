//! The operator table: one static, data-only mapping from wire opcode to
//! arity and backend primitive. The numeric opcode values are part of the
//! wire format and must not be renumbered.
//!
//! The same table serves both directions: the bytecode emitter resolves
//! `(name, arity)` pairs to opcodes, and the compiler resolves opcodes back
//! to primitives.

/// Two-operand numeric primitives, integer or floating per operand types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NumOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Min,
    Max,
}

/// Integer-only bit manipulation; float operands are converted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BitOp {
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogicOp {
    And,
    Or,
}

/// Ordered comparisons. Equality is handled separately: it is polymorphic
/// over string operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
}

/// Float-only unary primitives with a native instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FloatUn {
    Ceil,
    Floor,
    Trunc,
    Rint,
    Sqrt,
}

/// Float-only unary primitives routed through a host call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MathF1 {
    Acos,
    Asin,
    Atan,
    Cos,
    Cosh,
    Exp,
    Log,
    Log10,
    Round,
    Sin,
    Sinh,
    Tan,
    Tanh,
}

/// Float-only binary primitives routed through a host call. `Fmod` has no
/// opcode of its own; the compiler uses it for `%` on float operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MathF2 {
    Atan2,
    Pow,
    Fmod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FloatClass {
    Nan,
    Finite,
    Inf,
}

/// The backend primitive an operator dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Prim {
    Arith(NumOp),
    Bit(BitOp),
    Not,
    Neg,
    Abs,
    Sign,
    Logic(LogicOp),
    Cmp(CmpOp),
    Eq { negate: bool },
    /// Three-way comparison yielding -1/0/1; `nan` is the result when either
    /// float operand is NaN (-1 for `cmpl`, +1 for `cmpg`).
    Cmp3 { nan: i64 },
    ToBool,
    NotBool,
    FloatUn(FloatUn),
    Math1(MathF1),
    Math2(MathF2),
    Class(FloatClass),
    StrLen,
    StrIndex,
}

pub(crate) struct OpInfo {
    pub(crate) code: u8,
    pub(crate) name: &'static str,
    pub(crate) arity: u8,
    pub(crate) prim: Prim,
}

const fn op(code: u8, name: &'static str, arity: u8, prim: Prim) -> OpInfo {
    OpInfo { code, name, arity, prim }
}

pub(crate) static OPS: &[OpInfo] = &[
    op(0x01, "+", 2, Prim::Arith(NumOp::Add)),
    op(0x02, "-", 2, Prim::Arith(NumOp::Sub)),
    op(0x03, "-", 1, Prim::Neg),
    op(0x04, "*", 2, Prim::Arith(NumOp::Mul)),
    op(0x05, "/", 2, Prim::Arith(NumOp::Div)),
    op(0x06, "%", 2, Prim::Arith(NumOp::Rem)),
    op(0x07, "&", 2, Prim::Bit(BitOp::And)),
    op(0x08, "|", 2, Prim::Bit(BitOp::Or)),
    op(0x09, "^", 2, Prim::Bit(BitOp::Xor)),
    op(0x0a, "^", 1, Prim::Not),
    op(0x0b, "<<", 2, Prim::Bit(BitOp::Shl)),
    op(0x0c, ">>", 2, Prim::Bit(BitOp::Shr)),
    op(0x0d, ">>>", 2, Prim::Bit(BitOp::Ushr)),
    op(0x20, "&&", 2, Prim::Logic(LogicOp::And)),
    op(0x21, "||", 2, Prim::Logic(LogicOp::Or)),
    op(0x40, "=", 2, Prim::Eq { negate: false }),
    op(0x41, "==", 2, Prim::Eq { negate: false }),
    op(0x42, "!=", 2, Prim::Eq { negate: true }),
    op(0x43, "<", 2, Prim::Cmp(CmpOp::Lt)),
    op(0x44, "<=", 2, Prim::Cmp(CmpOp::Le)),
    op(0x45, ">", 2, Prim::Cmp(CmpOp::Gt)),
    op(0x46, ">=", 2, Prim::Cmp(CmpOp::Ge)),
    op(0x47, "cmpl", 2, Prim::Cmp3 { nan: -1 }),
    op(0x48, "cmpg", 2, Prim::Cmp3 { nan: 1 }),
    op(0x49, "->bool", 1, Prim::ToBool),
    op(0x4a, "!", 1, Prim::NotBool),
    op(0x4b, "acos", 1, Prim::Math1(MathF1::Acos)),
    op(0x4c, "asin", 1, Prim::Math1(MathF1::Asin)),
    op(0x4d, "atan", 1, Prim::Math1(MathF1::Atan)),
    op(0x4e, "atan2", 2, Prim::Math2(MathF2::Atan2)),
    op(0x4f, "ceil", 1, Prim::FloatUn(FloatUn::Ceil)),
    op(0x50, "cos", 1, Prim::Math1(MathF1::Cos)),
    op(0x51, "cosh", 1, Prim::Math1(MathF1::Cosh)),
    op(0x52, "exp", 1, Prim::Math1(MathF1::Exp)),
    op(0x53, "floor", 1, Prim::FloatUn(FloatUn::Floor)),
    op(0x54, "log", 1, Prim::Math1(MathF1::Log)),
    op(0x55, "log10", 1, Prim::Math1(MathF1::Log10)),
    op(0x56, "pow", 2, Prim::Math2(MathF2::Pow)),
    op(0x57, "**", 2, Prim::Math2(MathF2::Pow)),
    op(0x58, "rint", 1, Prim::FloatUn(FloatUn::Rint)),
    op(0x59, "round", 1, Prim::Math1(MathF1::Round)),
    op(0x5a, "sin", 1, Prim::Math1(MathF1::Sin)),
    op(0x5b, "sinh", 1, Prim::Math1(MathF1::Sinh)),
    op(0x5c, "sqrt", 1, Prim::FloatUn(FloatUn::Sqrt)),
    op(0x5d, "tan", 1, Prim::Math1(MathF1::Tan)),
    op(0x5e, "tanh", 1, Prim::Math1(MathF1::Tanh)),
    op(0x5f, "trunc", 1, Prim::FloatUn(FloatUn::Trunc)),
    op(0x60, "nan?", 1, Prim::Class(FloatClass::Nan)),
    op(0x61, "finite?", 1, Prim::Class(FloatClass::Finite)),
    op(0x62, "inf?", 1, Prim::Class(FloatClass::Inf)),
    op(0x63, "abs", 1, Prim::Abs),
    op(0x64, "min", 2, Prim::Arith(NumOp::Min)),
    op(0x65, "max", 2, Prim::Arith(NumOp::Max)),
    op(0x66, "sign", 1, Prim::Sign),
    op(0x80, "len", 1, Prim::StrLen),
    op(0x81, "index", 2, Prim::StrIndex),
];

/// Operator for a wire opcode payload.
pub(crate) fn by_code(code: u64) -> Option<&'static OpInfo> {
    OPS.iter().find(|o| o.code as u64 == code)
}

/// Operator for a source-level name applied to `argc` operands. An exact
/// arity match wins; a binary operator also accepts more than two operands,
/// which the emitter folds into a chain.
pub(crate) fn by_name(name: &str, argc: usize) -> Option<&'static OpInfo> {
    let mut binary = None;
    for o in OPS {
        if o.name != name {
            continue;
        }
        if o.arity as usize == argc {
            return Some(o);
        }
        if o.arity == 2 {
            binary = Some(o);
        }
    }
    if argc > 2 { binary } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn opcodes_are_unique() {
        let mut seen = HashSet::new();
        for o in OPS {
            assert!(seen.insert(o.code), "conflicting opcode {:#x} ({})", o.code, o.name);
        }
    }

    #[test]
    fn names_resolve_by_arity() {
        assert_eq!(by_name("-", 2).unwrap().code, 0x02);
        assert_eq!(by_name("-", 1).unwrap().code, 0x03);
        assert_eq!(by_name("^", 1).unwrap().code, 0x0a);
        assert_eq!(by_name("sin", 1).unwrap().code, 0x5a);
    }

    #[test]
    fn variadic_falls_back_to_binary() {
        assert_eq!(by_name("+", 5).unwrap().code, 0x01);
        assert_eq!(by_name("/", 4).unwrap().code, 0x05);
        // Exact-arity operators do not stretch.
        assert_eq!(by_name("sin", 3).map(|o| o.code), None);
    }

    #[test]
    fn wrong_arity_is_rejected() {
        assert_eq!(by_name("+", 1).map(|o| o.code), None);
        assert_eq!(by_name("+", 0).map(|o| o.code), None);
        assert_eq!(by_name("nosuch", 2).map(|o| o.code), None);
    }

    #[test]
    fn code_lookup() {
        assert_eq!(by_code(0x41).unwrap().name, "==");
        assert_eq!(by_code(0x81).unwrap().name, "index");
        assert!(by_code(0x0e).is_none());
        assert!(by_code(0x1234).is_none());
    }

    #[test]
    fn aliases_share_primitives() {
        assert_eq!(by_code(0x40).unwrap().prim, by_code(0x41).unwrap().prim);
        assert_eq!(by_code(0x56).unwrap().prim, by_code(0x57).unwrap().prim);
    }
}
