//! The stack-based bytecode compiler.
//!
//! One left-to-right scan over the opcode pairs, treating the stream as
//! reverse-Polish notation: constants and argument loads push IR values,
//! operators pop their operands and push the primitive's result. The sole
//! value left on top of the stack becomes the function's return value, with
//! float results reinterpreted into the i64 return channel.

pub(crate) mod backend;
pub(crate) mod cranelift;
pub(crate) mod host;
pub(crate) mod ops;

use cranelift_jit::JITModule;

use crate::bytecode::{Literal, Program, StrDesc, Tag};
use self::backend::CodeGen;
use self::ops::{FloatClass, LogicOp, MathF2, NumOp, OpInfo, Prim};

/// Declared type of one argument slot. The numeric values match the wire
/// tags, so a type table is one of these per byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArgType {
    Bool = 1,
    Int = 2,
    Float = 3,
    Str = 4,
}

impl ArgType {
    pub fn from_byte(b: u8) -> Option<ArgType> {
        match b {
            1 => Some(ArgType::Bool),
            2 => Some(ArgType::Int),
            3 => Some(ArgType::Float),
            4 => Some(ArgType::Str),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum CompileError {
    #[error("native code generation is not available on this target")]
    BackendUnavailable,
    #[error("opcode stream length must be even, got {0}")]
    OddLength(usize),
    #[error("unknown tag {0:#x}")]
    UnknownTag(i64),
    #[error("unknown operator {0:#x}")]
    UnknownOperator(i64),
    #[error("operand stack underflow for operator {op:#x}")]
    StackUnderflow { op: u8 },
    #[error("symbol ordinal {0} out of range")]
    UnknownSymbol(i64),
    #[error("argument {index} has invalid type tag {tag:#x}")]
    InvalidArgType { index: usize, tag: u8 },
    #[error("operator {op:#x} requires a string operand")]
    ExpectedString { op: u8 },
    #[error("no result value on the stack")]
    EmptyStack,
    #[error("code generation failed: {0}")]
    Codegen(String),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CallError {
    #[error("expression takes {expected} arguments, got {got}")]
    ArityMismatch { expected: usize, got: usize },
    #[error("argument {index} expects {expected:?}")]
    TypeMismatch { index: usize, expected: ArgType },
}

/// Logical type of a value on the evaluation stack. `Bool` values live in
/// the integer channel as 0/1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValTy {
    Bool,
    Int,
    Float,
    Str,
}

impl ValTy {
    fn is_float(self) -> bool {
        self == ValTy::Float
    }

    fn is_str(self) -> bool {
        self == ValTy::Str
    }
}

impl From<ArgType> for ValTy {
    fn from(t: ArgType) -> ValTy {
        match t {
            ArgType::Bool => ValTy::Bool,
            ArgType::Int => ValTy::Int,
            ArgType::Float => ValTy::Float,
            ArgType::Str => ValTy::Str,
        }
    }
}

/// Compile a raw opcode stream against a wire-format argument type table.
///
/// String payloads in the stream are raw descriptor pointers; the caller is
/// responsible for keeping whatever they point at alive for the lifetime of
/// the returned artifact. `compile_program` handles that automatically for
/// emitter output.
pub fn compile(opcodes: &[i64], arg_types: &[u8]) -> Result<CompiledExpr, CompileError> {
    let types = arg_types
        .iter()
        .enumerate()
        .map(|(index, &tag)| {
            ArgType::from_byte(tag).ok_or(CompileError::InvalidArgType { index, tag })
        })
        .collect::<Result<Vec<_>, _>>()?;
    cranelift::compile(opcodes, &types)
}

/// Compile emitter output, transferring its pinned string literals into the
/// artifact so the pointers baked into the code stay valid.
pub fn compile_program(program: Program) -> Result<CompiledExpr, CompileError> {
    let (code, arg_types, literals) = program.into_parts();
    let mut compiled = compile(&code, &arg_types)?;
    compiled.literals = literals;
    Ok(compiled)
}

/// Run the scan against a backend. Returns whether the result is a float
/// boxed into the integer return channel.
pub(crate) fn translate<B: CodeGen>(
    b: &mut B,
    opcodes: &[i64],
    arg_types: &[ArgType],
) -> Result<bool, CompileError> {
    if opcodes.len() % 2 != 0 {
        return Err(CompileError::OddLength(opcodes.len()));
    }

    let mut stack: Vec<(B::Value, ValTy)> = Vec::with_capacity(opcodes.len() / 2);
    for pair in opcodes.chunks_exact(2) {
        let (tag_word, payload) = (pair[0], pair[1]);
        let tag = Tag::from_word(tag_word).ok_or(CompileError::UnknownTag(tag_word))?;
        match tag {
            Tag::Bool => {
                let v = b.const_int(payload);
                stack.push((v, ValTy::Bool));
            }
            Tag::Int => {
                let v = b.const_int(payload);
                stack.push((v, ValTy::Int));
            }
            Tag::Float => {
                let v = b.const_float(f64::from_bits(payload as u64));
                stack.push((v, ValTy::Float));
            }
            Tag::Str => {
                let v = b.const_ptr(payload);
                stack.push((v, ValTy::Str));
            }
            Tag::Symbol => {
                if payload < 0 || payload as usize >= arg_types.len() {
                    return Err(CompileError::UnknownSymbol(payload));
                }
                let ty = arg_types[payload as usize];
                let v = b.load_arg(payload as usize, ty);
                stack.push((v, ValTy::from(ty)));
            }
            Tag::Operator => {
                let info =
                    ops::by_code(payload as u64).ok_or(CompileError::UnknownOperator(payload))?;
                apply(b, info, &mut stack)?;
            }
        }
    }

    let (result, ty) = stack.pop().ok_or(CompileError::EmptyStack)?;
    if ty.is_float() {
        let bits = b.float_bits(result);
        b.ret(bits);
        Ok(true)
    } else {
        b.ret(result);
        Ok(false)
    }
}

fn as_float<B: CodeGen>(b: &mut B, v: B::Value, ty: ValTy) -> B::Value {
    if ty.is_float() { v } else { b.int_to_float(v) }
}

fn as_int<B: CodeGen>(b: &mut B, v: B::Value, ty: ValTy) -> B::Value {
    if ty.is_float() { b.float_to_int(v) } else { v }
}

fn as_bool<B: CodeGen>(b: &mut B, v: B::Value, ty: ValTy) -> B::Value {
    if ty.is_float() {
        b.float_to_bool(false, v)
    } else {
        b.int_to_bool(false, v)
    }
}

/// Pop operands, apply one operator, push the result. The operand pushed
/// earlier is the left operand of a binary primitive.
fn apply<B: CodeGen>(
    b: &mut B,
    info: &OpInfo,
    stack: &mut Vec<(B::Value, ValTy)>,
) -> Result<(), CompileError> {
    let underflow = CompileError::StackUnderflow { op: info.code };

    if info.arity == 1 {
        let (v, ty) = stack.pop().ok_or(underflow)?;
        let out = match info.prim {
            Prim::Neg => {
                if ty.is_float() {
                    (b.float_neg(v), ValTy::Float)
                } else {
                    (b.int_neg(v), ValTy::Int)
                }
            }
            Prim::Not => {
                let v = as_int(b, v, ty);
                (b.int_not(v), ValTy::Int)
            }
            Prim::Abs => {
                if ty.is_float() {
                    (b.float_abs(v), ValTy::Float)
                } else {
                    (b.int_abs(v), ValTy::Int)
                }
            }
            Prim::Sign => {
                if ty.is_float() {
                    let zero = b.const_float(0.0);
                    (b.float_cmp3(0, v, zero), ValTy::Int)
                } else {
                    let zero = b.const_int(0);
                    (b.int_cmp3(v, zero), ValTy::Int)
                }
            }
            Prim::ToBool => (as_bool(b, v, ty), ValTy::Bool),
            Prim::NotBool => {
                let out = if ty.is_float() {
                    b.float_to_bool(true, v)
                } else {
                    b.int_to_bool(true, v)
                };
                (out, ValTy::Bool)
            }
            Prim::FloatUn(op) => {
                let v = as_float(b, v, ty);
                (b.float_un(op, v), ValTy::Float)
            }
            Prim::Math1(f) => {
                let v = as_float(b, v, ty);
                (b.math1(f, v)?, ValTy::Float)
            }
            Prim::Class(class) => {
                // Integral operands convert to finite floats, so the answer
                // is a constant.
                let out = if ty.is_float() {
                    b.float_class(class, v)
                } else {
                    b.const_int(if class == FloatClass::Finite { 1 } else { 0 })
                };
                (out, ValTy::Bool)
            }
            Prim::StrLen => {
                if !ty.is_str() {
                    return Err(CompileError::ExpectedString { op: info.code });
                }
                (b.str_len(v)?, ValTy::Int)
            }
            _ => return Err(CompileError::UnknownOperator(info.code as i64)),
        };
        stack.push(out);
        return Ok(());
    }

    let (rhs, rty) = stack.pop().ok_or_else(|| underflow.clone())?;
    let (lhs, lty) = stack.pop().ok_or(underflow)?;
    let promote = lty.is_float() || rty.is_float();

    let out = match info.prim {
        Prim::Arith(op) => {
            if promote {
                let a = as_float(b, lhs, lty);
                let c = as_float(b, rhs, rty);
                let v = if op == NumOp::Rem {
                    b.math2(MathF2::Fmod, a, c)?
                } else {
                    b.float_num(op, a, c)
                };
                (v, ValTy::Float)
            } else {
                (b.int_num(op, lhs, rhs), ValTy::Int)
            }
        }
        Prim::Bit(op) => {
            let a = as_int(b, lhs, lty);
            let c = as_int(b, rhs, rty);
            (b.bit(op, a, c), ValTy::Int)
        }
        Prim::Logic(op) => {
            let a = as_bool(b, lhs, lty);
            let c = as_bool(b, rhs, rty);
            // Both sides are already evaluated; there is no short-circuit in
            // a pure expression.
            let bit_op = match op {
                LogicOp::And => ops::BitOp::And,
                LogicOp::Or => ops::BitOp::Or,
            };
            (b.bit(bit_op, a, c), ValTy::Bool)
        }
        Prim::Cmp(op) => {
            let v = if promote {
                let a = as_float(b, lhs, lty);
                let c = as_float(b, rhs, rty);
                b.float_cmp(op, a, c)
            } else {
                b.int_cmp(op, lhs, rhs)
            };
            (v, ValTy::Bool)
        }
        Prim::Eq { negate } => match (lty.is_str(), rty.is_str()) {
            (true, true) => (b.str_eq(negate, lhs, rhs)?, ValTy::Bool),
            (false, false) => {
                let v = if promote {
                    let a = as_float(b, lhs, lty);
                    let c = as_float(b, rhs, rty);
                    b.float_eq(negate, a, c)
                } else {
                    b.int_eq(negate, lhs, rhs)
                };
                (v, ValTy::Bool)
            }
            // A pointer compared against a non-pointer is a type mismatch;
            // the result is the constant false, not a compile failure.
            _ => (b.const_int(0), ValTy::Bool),
        },
        Prim::Cmp3 { nan } => {
            let v = if promote {
                let a = as_float(b, lhs, lty);
                let c = as_float(b, rhs, rty);
                b.float_cmp3(nan, a, c)
            } else {
                b.int_cmp3(lhs, rhs)
            };
            (v, ValTy::Int)
        }
        Prim::Math2(f) => {
            let a = as_float(b, lhs, lty);
            let c = as_float(b, rhs, rty);
            (b.math2(f, a, c)?, ValTy::Float)
        }
        Prim::StrIndex => {
            if !lty.is_str() || !rty.is_str() {
                return Err(CompileError::ExpectedString { op: info.code });
            }
            (b.str_index(lhs, rhs)?, ValTy::Int)
        }
        _ => return Err(CompileError::UnknownOperator(info.code as i64)),
    };
    stack.push(out);
    Ok(())
}

/// One argument for the typed call API.
#[derive(Debug, Clone, Copy)]
pub enum Arg<'a> {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(&'a str),
}

/// A decoded result word.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ret {
    Int(i64),
    Float(f64),
}

impl Ret {
    pub fn as_f64(self) -> f64 {
        match self {
            Ret::Int(v) => v as f64,
            Ret::Float(v) => v,
        }
    }
}

/// A compiled expression: native code owned by the backend module, plus the
/// argument layout needed to invoke it.
pub struct CompiledExpr {
    pub(crate) module: Option<JITModule>,
    pub(crate) entry: *const u8,
    pub(crate) arg_types: Vec<ArgType>,
    pub(crate) returns_float: bool,
    pub(crate) literals: Vec<Literal>,
}

// The entry pointer is immutable native code and invocations only read the
// caller's buffer, so concurrent calls are fine.
unsafe impl Send for CompiledExpr {}
unsafe impl Sync for CompiledExpr {}

impl CompiledExpr {
    /// Whether the returned word carries an f64 bit pattern.
    pub fn returns_float(&self) -> bool {
        self.returns_float
    }

    pub fn arg_types(&self) -> &[ArgType] {
        &self.arg_types
    }

    pub fn arg_count(&self) -> usize {
        self.arg_types.len()
    }

    /// Invoke with a pre-packed argument buffer: one 8-byte word per declared
    /// argument, string slots holding `StrDesc` pointers. The buffer and any
    /// descriptors it references must stay valid for the duration of the
    /// call.
    pub fn call_raw(&self, args: &[u64]) -> Result<u64, CallError> {
        if args.len() < self.arg_types.len() {
            return Err(CallError::ArityMismatch {
                expected: self.arg_types.len(),
                got: args.len(),
            });
        }
        let base = if args.is_empty() { std::ptr::null() } else { args.as_ptr() };
        let f: extern "C" fn(*const u64) -> i64 = unsafe { std::mem::transmute(self.entry) };
        Ok(f(base) as u64)
    }

    /// Invoke with typed arguments, packing the buffer and decoding the
    /// result word. Numeric arguments convert to the declared slot type;
    /// strings must meet a string slot exactly.
    pub fn call(&self, args: &[Arg<'_>]) -> Result<Ret, CallError> {
        if args.len() != self.arg_types.len() {
            return Err(CallError::ArityMismatch {
                expected: self.arg_types.len(),
                got: args.len(),
            });
        }

        // Descriptors first, so their addresses are stable when the words
        // are packed.
        let mut descs = Vec::with_capacity(
            args.iter().filter(|a| matches!(a, Arg::Str(_))).count(),
        );
        for arg in args {
            if let Arg::Str(s) = arg {
                descs.push(StrDesc::new(s));
            }
        }

        let mut words = Vec::with_capacity(args.len());
        let mut next_desc = 0;
        for (index, (arg, &ty)) in args.iter().zip(&self.arg_types).enumerate() {
            let word = match (arg, ty) {
                (Arg::Str(_), ArgType::Str) => {
                    let p = &descs[next_desc] as *const StrDesc as u64;
                    next_desc += 1;
                    p
                }
                (Arg::Str(_), _) | (_, ArgType::Str) => {
                    return Err(CallError::TypeMismatch { index, expected: ty });
                }
                (arg, ty) => pack_numeric(arg, ty),
            };
            words.push(word);
        }

        let raw = self.call_raw(&words)?;
        Ok(if self.returns_float {
            Ret::Float(f64::from_bits(raw))
        } else {
            Ret::Int(raw as i64)
        })
    }
}

impl Drop for CompiledExpr {
    fn drop(&mut self) {
        if let Some(module) = self.module.take() {
            unsafe { module.free_memory() };
        }
    }
}

impl std::fmt::Debug for CompiledExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledExpr")
            .field("arg_types", &self.arg_types)
            .field("returns_float", &self.returns_float)
            .finish_non_exhaustive()
    }
}

/// Convert a numeric argument into its declared slot representation.
fn pack_numeric(arg: &Arg<'_>, ty: ArgType) -> u64 {
    let (bits, is_float) = match *arg {
        Arg::Bool(v) => (v as u64, false),
        Arg::Int(v) => (v as u64, false),
        Arg::Float(v) => (v.to_bits(), true),
        Arg::Str(_) => (0, false), // unreachable; the caller matched strings
    };
    match ty {
        ArgType::Float => {
            if is_float {
                bits
            } else {
                (bits as i64 as f64).to_bits()
            }
        }
        ArgType::Bool => (bits != 0) as u64,
        _ => {
            if is_float {
                f64::from_bits(bits) as i64 as u64
            } else {
                bits
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arg_type_bytes_round_trip() {
        for ty in [ArgType::Bool, ArgType::Int, ArgType::Float, ArgType::Str] {
            assert_eq!(ArgType::from_byte(ty.as_byte()), Some(ty));
        }
        assert_eq!(ArgType::from_byte(0), None);
        assert_eq!(ArgType::from_byte(5), None);
    }

    #[test]
    fn numeric_packing_matrix() {
        assert_eq!(pack_numeric(&Arg::Int(42), ArgType::Int), 42);
        assert_eq!(pack_numeric(&Arg::Int(-1), ArgType::Int), u64::MAX);
        assert_eq!(pack_numeric(&Arg::Int(2), ArgType::Float), 2.0f64.to_bits());
        assert_eq!(pack_numeric(&Arg::Bool(true), ArgType::Int), 1);
        assert_eq!(pack_numeric(&Arg::Bool(true), ArgType::Float), 1.0f64.to_bits());
        assert_eq!(pack_numeric(&Arg::Float(2.5), ArgType::Float), 2.5f64.to_bits());
        assert_eq!(pack_numeric(&Arg::Float(2.9), ArgType::Int), 2);
        assert_eq!(pack_numeric(&Arg::Float(0.0), ArgType::Bool), 0);
        assert_eq!(pack_numeric(&Arg::Float(1.5), ArgType::Bool), 1);
        assert_eq!(pack_numeric(&Arg::Int(7), ArgType::Bool), 1);
    }
}
