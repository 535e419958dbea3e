//! sprig — a JIT compiler for small pure expressions.
//!
//! An expression like `(+ (* 2 x) (% y 9))` is parsed, lowered to a flat
//! stack bytecode, and compiled to native code through Cranelift. The
//! compiled artifact is invoked repeatedly with positional arguments packed
//! into an 8-byte-word buffer; it reads only that buffer and returns one
//! word, so calls are pure and thread-safe.
//!
//! ```no_run
//! use sprig::{compile_str, Arg, ArgType, Ret};
//!
//! let f = compile_str("(+ (* 2 x) 1)", &[("x", ArgType::Int)]).unwrap();
//! assert_eq!(f.call(&[Arg::Int(20)]).unwrap(), Ret::Int(41));
//! ```
//!
//! The bytecode layer is public: embedders that produce opcode streams
//! directly can call [`jit::compile`] and the C ABI in [`ffi`].

use std::sync::OnceLock;

pub mod bytecode;
pub mod ffi;
pub mod jit;
pub mod parser;

pub use bytecode::{EmitError, Program, StrDesc, Tag, emit};
pub use jit::{
    Arg, ArgType, CallError, CompileError, CompiledExpr, Ret, compile, compile_program,
};
pub use parser::{Expr, ParseError, parse};

/// Whether native code generation works on this host. The probe runs once
/// per process; repeated calls are free.
pub fn backend_available() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(|| cranelift_native::builder().is_ok())
}

/// Any failure on the source-to-artifact path.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Emit(#[from] EmitError),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Parse, lower, and compile a source expression against a declared
/// parameter list. Symbols resolve by name; arguments are later passed in
/// declaration order.
pub fn compile_str(src: &str, params: &[(&str, ArgType)]) -> Result<CompiledExpr, Error> {
    let expr = parse(src)?;
    let program = emit(&expr, params)?;
    Ok(compile_program(program)?)
}
