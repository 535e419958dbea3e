//! Host functions linked into generated code by symbol name.
//!
//! Transcendental math has no native instruction in the backend, so those
//! operators compile to calls back into these wrappers. The string primitives
//! read through caller-owned descriptors and never take ownership.

use cranelift_jit::JITBuilder;

use super::ops::{MathF1, MathF2};
use crate::bytecode::StrDesc;

pub(crate) const STR_LEN: &str = "sprig_str_len";
pub(crate) const STR_EQ: &str = "sprig_str_eq";
pub(crate) const STR_INDEX: &str = "sprig_str_index";

pub(crate) const MATH1: &[MathF1] = &[
    MathF1::Acos,
    MathF1::Asin,
    MathF1::Atan,
    MathF1::Cos,
    MathF1::Cosh,
    MathF1::Exp,
    MathF1::Log,
    MathF1::Log10,
    MathF1::Round,
    MathF1::Sin,
    MathF1::Sinh,
    MathF1::Tan,
    MathF1::Tanh,
];

pub(crate) const MATH2: &[MathF2] = &[MathF2::Atan2, MathF2::Pow, MathF2::Fmod];

impl MathF1 {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            MathF1::Acos => "sprig_acos",
            MathF1::Asin => "sprig_asin",
            MathF1::Atan => "sprig_atan",
            MathF1::Cos => "sprig_cos",
            MathF1::Cosh => "sprig_cosh",
            MathF1::Exp => "sprig_exp",
            MathF1::Log => "sprig_log",
            MathF1::Log10 => "sprig_log10",
            MathF1::Round => "sprig_round",
            MathF1::Sin => "sprig_sin",
            MathF1::Sinh => "sprig_sinh",
            MathF1::Tan => "sprig_tan",
            MathF1::Tanh => "sprig_tanh",
        }
    }

    fn host(self) -> extern "C" fn(f64) -> f64 {
        match self {
            MathF1::Acos => acos,
            MathF1::Asin => asin,
            MathF1::Atan => atan,
            MathF1::Cos => cos,
            MathF1::Cosh => cosh,
            MathF1::Exp => exp,
            MathF1::Log => log,
            MathF1::Log10 => log10,
            MathF1::Round => round,
            MathF1::Sin => sin,
            MathF1::Sinh => sinh,
            MathF1::Tan => tan,
            MathF1::Tanh => tanh,
        }
    }
}

impl MathF2 {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            MathF2::Atan2 => "sprig_atan2",
            MathF2::Pow => "sprig_pow",
            MathF2::Fmod => "sprig_fmod",
        }
    }

    fn host(self) -> extern "C" fn(f64, f64) -> f64 {
        match self {
            MathF2::Atan2 => atan2,
            MathF2::Pow => pow,
            MathF2::Fmod => fmod,
        }
    }
}

/// Register every host symbol with the JIT linker.
pub(crate) fn register(builder: &mut JITBuilder) {
    for &f in MATH1 {
        builder.symbol(f.symbol(), f.host() as *const u8);
    }
    for &f in MATH2 {
        builder.symbol(f.symbol(), f.host() as *const u8);
    }
    builder.symbol(STR_LEN, str_len as *const u8);
    builder.symbol(STR_EQ, str_eq as *const u8);
    builder.symbol(STR_INDEX, str_index as *const u8);
}

extern "C" fn acos(x: f64) -> f64 {
    x.acos()
}
extern "C" fn asin(x: f64) -> f64 {
    x.asin()
}
extern "C" fn atan(x: f64) -> f64 {
    x.atan()
}
extern "C" fn cos(x: f64) -> f64 {
    x.cos()
}
extern "C" fn cosh(x: f64) -> f64 {
    x.cosh()
}
extern "C" fn exp(x: f64) -> f64 {
    x.exp()
}
extern "C" fn log(x: f64) -> f64 {
    x.ln()
}
extern "C" fn log10(x: f64) -> f64 {
    x.log10()
}
/// Rounds half away from zero; round-to-nearest-even is `rint`, which gets a
/// native instruction instead.
extern "C" fn round(x: f64) -> f64 {
    x.round()
}
extern "C" fn sin(x: f64) -> f64 {
    x.sin()
}
extern "C" fn sinh(x: f64) -> f64 {
    x.sinh()
}
extern "C" fn tan(x: f64) -> f64 {
    x.tan()
}
extern "C" fn tanh(x: f64) -> f64 {
    x.tanh()
}
extern "C" fn atan2(y: f64, x: f64) -> f64 {
    y.atan2(x)
}
extern "C" fn pow(base: f64, exponent: f64) -> f64 {
    base.powf(exponent)
}
extern "C" fn fmod(a: f64, b: f64) -> f64 {
    a % b
}

fn desc_bytes<'a>(desc: *const StrDesc) -> Option<&'a [u8]> {
    if desc.is_null() {
        return None;
    }
    let d = unsafe { *desc };
    if d.ptr.is_null() || d.len < 0 {
        return None;
    }
    Some(unsafe { std::slice::from_raw_parts(d.ptr, d.len as usize) })
}

pub(crate) extern "C" fn str_len(s: *const StrDesc) -> i64 {
    desc_bytes(s).map_or(0, |b| b.len() as i64)
}

pub(crate) extern "C" fn str_eq(a: *const StrDesc, b: *const StrDesc) -> i64 {
    match (desc_bytes(a), desc_bytes(b)) {
        (Some(x), Some(y)) => (x == y) as i64,
        _ => 0,
    }
}

/// Byte index of the first occurrence of `needle` in `haystack`, -1 when
/// absent, 0 for an empty needle.
pub(crate) extern "C" fn str_index(haystack: *const StrDesc, needle: *const StrDesc) -> i64 {
    let (Some(hay), Some(needle)) = (desc_bytes(haystack), desc_bytes(needle)) else {
        return -1;
    };
    if needle.is_empty() {
        return 0;
    }
    if needle.len() > hay.len() {
        return -1;
    }
    hay.windows(needle.len())
        .position(|w| w == needle)
        .map_or(-1, |i| i as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(s: &str) -> StrDesc {
        StrDesc::new(s)
    }

    #[test]
    fn len_counts_bytes() {
        let d = desc("Hello");
        assert_eq!(str_len(&d), 5);
        assert_eq!(str_len(std::ptr::null()), 0);
    }

    #[test]
    fn eq_compares_content() {
        let a = desc("Hello");
        let b = desc("Hello");
        let c = desc("hello");
        assert_eq!(str_eq(&a, &b), 1);
        assert_eq!(str_eq(&a, &c), 0);
        assert_eq!(str_eq(&a, std::ptr::null()), 0);
    }

    #[test]
    fn index_matches_std_find() {
        let sentence = "The quick brown fox jumps over the lazy dog";
        let hay = desc(sentence);
        for needle_text in ["quick", "dog", "T", "", "zebra", "the lazy"] {
            let needle = desc(needle_text);
            let expected = sentence.find(needle_text).map_or(-1, |i| i as i64);
            assert_eq!(str_index(&hay, &needle), expected, "needle {:?}", needle_text);
        }
    }

    #[test]
    fn index_needle_longer_than_haystack() {
        let hay = desc("ab");
        let needle = desc("abc");
        assert_eq!(str_index(&hay, &needle), -1);
    }

    #[test]
    fn fmod_keeps_dividend_sign() {
        assert_eq!(fmod(7.5, 2.0), 1.5);
        assert_eq!(fmod(-7.5, 2.0), -1.5);
    }

    #[test]
    fn round_is_half_away_from_zero() {
        assert_eq!(round(2.5), 3.0);
        assert_eq!(round(-2.5), -3.0);
        assert_eq!(round(3.5), 4.0);
    }
}
