//! The C ABI surface: sentinel collapsing and the legacy byte-0 flag.

use sprig::ffi::{
    sprig_backend_available, sprig_call, sprig_compile, sprig_release, sprig_returns_float,
};

#[test]
fn backend_probe() {
    assert_eq!(sprig_backend_available(), 1);
    assert_eq!(sprig_backend_available(), 1);
}

#[test]
fn compile_call_release_round_trip() {
    let mut code = [2i64, 7];
    let handle = unsafe { sprig_compile(2, code.as_mut_ptr(), 0, std::ptr::null()) };
    assert_ne!(handle, 0);
    // Legacy side channel: byte 0 cleared for a non-float result.
    assert_eq!(code[0] & 0xff, 0x00);
    assert_eq!(unsafe { sprig_returns_float(handle) }, 0);
    assert_eq!(unsafe { sprig_call(handle, std::ptr::null(), 0) }, 7);
    unsafe { sprig_release(handle) };
}

#[test]
fn float_result_sets_byte_zero() {
    let mut code = [3i64, 2.5f64.to_bits() as i64];
    let handle = unsafe { sprig_compile(2, code.as_mut_ptr(), 0, std::ptr::null()) };
    assert_ne!(handle, 0);
    assert_eq!(code[0] & 0xff, 0xff);
    assert_eq!(unsafe { sprig_returns_float(handle) }, 1);
    let word = unsafe { sprig_call(handle, std::ptr::null(), 0) };
    assert_eq!(f64::from_bits(word), 2.5);
    unsafe { sprig_release(handle) };
}

#[test]
fn arguments_pass_through() {
    // (+ x x) with x declared Int: symbol 0, symbol 0, operator +.
    let mut code = [5i64, 0, 5, 0, 0, 0x01];
    let types = [2u8];
    let handle = unsafe { sprig_compile(6, code.as_mut_ptr(), 1, types.as_ptr()) };
    assert_ne!(handle, 0);
    let args = [21u64];
    assert_eq!(unsafe { sprig_call(handle, args.as_ptr(), 1) }, 42);
    unsafe { sprig_release(handle) };
}

#[test]
fn failures_collapse_to_zero() {
    // Stack underflow.
    let mut code = [0i64, 0x01];
    assert_eq!(unsafe { sprig_compile(2, code.as_mut_ptr(), 0, std::ptr::null()) }, 0);
    // Odd length.
    let mut code = [2i64];
    assert_eq!(unsafe { sprig_compile(1, code.as_mut_ptr(), 0, std::ptr::null()) }, 0);
    // Null buffers.
    assert_eq!(unsafe { sprig_compile(2, std::ptr::null_mut(), 0, std::ptr::null()) }, 0);
    let mut code = [2i64, 1];
    assert_eq!(unsafe { sprig_compile(2, code.as_mut_ptr(), 1, std::ptr::null()) }, 0);
}

#[test]
fn null_handle_is_inert() {
    assert_eq!(unsafe { sprig_call(0, std::ptr::null(), 0) }, 0);
    assert_eq!(unsafe { sprig_returns_float(0) }, 0);
    unsafe { sprig_release(0) };
}

#[test]
fn null_argument_buffer_with_count_is_zero() {
    let mut code = [5i64, 0];
    let types = [2u8];
    let handle = unsafe { sprig_compile(2, code.as_mut_ptr(), 1, types.as_ptr()) };
    assert_ne!(handle, 0);
    assert_eq!(unsafe { sprig_call(handle, std::ptr::null(), 1) }, 0);
    // Fewer words than declared arguments is also the sentinel.
    assert_eq!(unsafe { sprig_call(handle, std::ptr::null(), 0) }, 0);
    unsafe { sprig_release(handle) };
}
