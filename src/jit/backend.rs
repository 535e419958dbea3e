//! The code-generation capability contract.
//!
//! The bytecode translator is generic over this trait, so a backend without
//! native code generation (an interpreter, say) can slot in behind the same
//! compiler core. `Value` is an opaque handle to a typed, not-yet-materialized
//! computation; the translator tracks logical types itself and only asks the
//! backend to emit.
//!
//! Contracts the shipped backend honors and any other implementor must too:
//! integer `/` and `%` by zero produce 0 (never a trap), `i64::MIN / -1`
//! wraps, comparisons and boolean coercions produce 0/1 in the integer
//! channel, and `float_bits` is a pure bit reinterpretation.

use super::ops::{BitOp, CmpOp, FloatClass, FloatUn, MathF1, MathF2, NumOp};
use super::{ArgType, CompileError};

pub(crate) trait CodeGen {
    type Value: Copy;

    // ── constants and argument loads ────────────────────────────────────

    fn const_int(&mut self, v: i64) -> Self::Value;
    fn const_float(&mut self, v: f64) -> Self::Value;
    /// A pointer-typed constant carrying a raw descriptor address.
    fn const_ptr(&mut self, bits: i64) -> Self::Value;
    /// Typed load from the argument buffer at byte offset `8 * ordinal`.
    fn load_arg(&mut self, ordinal: usize, ty: ArgType) -> Self::Value;

    // ── conversions ─────────────────────────────────────────────────────

    fn int_to_float(&mut self, v: Self::Value) -> Self::Value;
    /// Saturating; never traps on NaN or out-of-range values.
    fn float_to_int(&mut self, v: Self::Value) -> Self::Value;
    /// Reinterpret an f64 as the i64 return channel.
    fn float_bits(&mut self, v: Self::Value) -> Self::Value;

    // ── numeric primitives ──────────────────────────────────────────────

    fn int_num(&mut self, op: NumOp, a: Self::Value, b: Self::Value) -> Self::Value;
    /// `NumOp::Rem` never reaches this; the translator routes float
    /// remainders through `math2(MathF2::Fmod, ..)`.
    fn float_num(&mut self, op: NumOp, a: Self::Value, b: Self::Value) -> Self::Value;
    fn bit(&mut self, op: BitOp, a: Self::Value, b: Self::Value) -> Self::Value;
    fn int_neg(&mut self, v: Self::Value) -> Self::Value;
    fn int_not(&mut self, v: Self::Value) -> Self::Value;
    fn int_abs(&mut self, v: Self::Value) -> Self::Value;
    fn float_neg(&mut self, v: Self::Value) -> Self::Value;
    fn float_abs(&mut self, v: Self::Value) -> Self::Value;
    fn float_un(&mut self, op: FloatUn, v: Self::Value) -> Self::Value;

    // ── comparisons and boolean coercion ────────────────────────────────

    fn int_cmp(&mut self, op: CmpOp, a: Self::Value, b: Self::Value) -> Self::Value;
    fn float_cmp(&mut self, op: CmpOp, a: Self::Value, b: Self::Value) -> Self::Value;
    fn int_eq(&mut self, negate: bool, a: Self::Value, b: Self::Value) -> Self::Value;
    fn float_eq(&mut self, negate: bool, a: Self::Value, b: Self::Value) -> Self::Value;
    /// Three-way comparison yielding -1/0/1.
    fn int_cmp3(&mut self, a: Self::Value, b: Self::Value) -> Self::Value;
    /// Three-way comparison; `nan` is the result when either operand is NaN.
    fn float_cmp3(&mut self, nan: i64, a: Self::Value, b: Self::Value) -> Self::Value;
    fn int_to_bool(&mut self, negate: bool, v: Self::Value) -> Self::Value;
    fn float_to_bool(&mut self, negate: bool, v: Self::Value) -> Self::Value;
    fn float_class(&mut self, class: FloatClass, v: Self::Value) -> Self::Value;

    // ── host calls ──────────────────────────────────────────────────────

    fn math1(&mut self, f: MathF1, v: Self::Value) -> Result<Self::Value, CompileError>;
    fn math2(
        &mut self,
        f: MathF2,
        a: Self::Value,
        b: Self::Value,
    ) -> Result<Self::Value, CompileError>;
    fn str_len(&mut self, s: Self::Value) -> Result<Self::Value, CompileError>;
    fn str_eq(
        &mut self,
        negate: bool,
        a: Self::Value,
        b: Self::Value,
    ) -> Result<Self::Value, CompileError>;
    fn str_index(
        &mut self,
        haystack: Self::Value,
        needle: Self::Value,
    ) -> Result<Self::Value, CompileError>;

    // ── epilogue ────────────────────────────────────────────────────────

    fn ret(&mut self, v: Self::Value);
}
