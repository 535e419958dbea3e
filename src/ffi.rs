//! C ABI for embedding the compiler from other runtimes.
//!
//! Every failure collapses to the zero sentinel; a real handle is never 0,
//! so success stays distinguishable without an error channel. After a
//! successful compile, byte 0 of the caller's opcode buffer is overwritten
//! with `0xFF` when the result word carries an f64 bit pattern and `0x00`
//! otherwise. New embedders should prefer `sprig_returns_float` over the
//! byte-0 convention; it is kept for existing producers.
//!
//! Releasing a handle twice, or calling through one after release, is
//! undefined; the caller owns that discipline.

use std::slice;

use crate::jit::{self, CompiledExpr};

/// Whether native code generation works on this host. Idempotent; the probe
/// runs once per process.
#[unsafe(no_mangle)]
pub extern "C" fn sprig_backend_available() -> i32 {
    crate::backend_available() as i32
}

/// Compile `len` words of bytecode against `argc` argument type bytes.
/// Returns an opaque handle, or 0 on any failure.
///
/// # Safety
///
/// `code` must point at `len` readable words, writable at byte 0; `argv`
/// must point at `argc` readable bytes when `argc > 0`. String payloads in
/// the stream must point at descriptors that outlive the handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_compile(
    len: i64,
    code: *mut i64,
    argc: i64,
    argv: *const u8,
) -> u64 {
    if code.is_null() || len < 0 || len % 2 != 0 {
        return 0;
    }
    if argc < 0 || (argc > 0 && argv.is_null()) {
        return 0;
    }
    let opcodes = unsafe { slice::from_raw_parts(code, len as usize) };
    let arg_types: &[u8] = if argc > 0 {
        unsafe { slice::from_raw_parts(argv, argc as usize) }
    } else {
        &[]
    };

    match jit::compile(opcodes, arg_types) {
        Ok(compiled) => {
            let flag: u8 = if compiled.returns_float() { 0xff } else { 0x00 };
            unsafe { *(code as *mut u8) = flag };
            Box::into_raw(Box::new(compiled)) as u64
        }
        Err(_) => 0,
    }
}

/// Structured replacement for the byte-0 side channel: 1 when the handle's
/// result word carries an f64 bit pattern. Returns 0 for a null handle.
///
/// # Safety
///
/// `handle` must be 0 or a live value returned by `sprig_compile`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_returns_float(handle: u64) -> i32 {
    if handle == 0 {
        return 0;
    }
    let compiled = unsafe { &*(handle as *const CompiledExpr) };
    compiled.returns_float() as i32
}

/// Invoke a compiled expression with `argc` packed argument words. Returns
/// the result word, or 0 when the handle is null or the buffer is null with
/// a nonzero count.
///
/// # Safety
///
/// `handle` must be 0 or a live value returned by `sprig_compile`; `args`
/// must point at `argc` readable words when `argc > 0`, and any string
/// descriptors they reference must stay valid for the duration of the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_call(handle: u64, args: *const u64, argc: i64) -> u64 {
    if handle == 0 || argc < 0 || (args.is_null() && argc != 0) {
        return 0;
    }
    let compiled = unsafe { &*(handle as *const CompiledExpr) };
    let words: &[u64] = if argc > 0 {
        unsafe { slice::from_raw_parts(args, argc as usize) }
    } else {
        &[]
    };
    compiled.call_raw(words).unwrap_or(0)
}

/// Release a compiled expression and the code memory behind it. A null
/// handle is a no-op.
///
/// # Safety
///
/// `handle` must be 0 or a live value returned by `sprig_compile`, and must
/// not be used again afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sprig_release(handle: u64) {
    if handle != 0 {
        drop(unsafe { Box::from_raw(handle as *mut CompiledExpr) });
    }
}
