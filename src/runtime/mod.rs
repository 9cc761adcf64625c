//! Runtime helper library called by generated code.
//!
//! Every helper is an `extern "C"` function registered into the JIT
//! engine's host symbol table under the name generated code imports.
//! Numeric arguments and results are `f32`; table and value names arrive
//! as interned [`Symbol`] handles.

pub mod history;
pub mod store;
pub mod symbol;

use std::cell::RefCell;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub use history::{InputHistory, OutputHistory};
pub use store::{release_retired_tables, remove_table, set_table, set_value, table, value};
pub use symbol::{Symbol, SymbolName};

thread_local! {
    static RNG: RefCell<ChaCha8Rng> = RefCell::new(ChaCha8Rng::from_entropy());
}

/// Reseed the calling thread's generator used by `random(a, b)`.
pub fn seed_random(seed: u64) {
    RNG.with(|rng| *rng.borrow_mut() = ChaCha8Rng::seed_from_u64(seed));
}

fn symbol(sym: *const SymbolName) -> Option<Symbol> {
    // SAFETY: generated code only passes handles produced by `Symbol::as_ptr`.
    unsafe { Symbol::from_ptr(sym) }
}

// --- Tables and values ---

pub extern "C" fn jit_expr_table_value_ptr(sym: *const SymbolName, index: f32) -> *mut f32 {
    match symbol(sym) {
        Some(name) => store::table_cell_ptr(name, index),
        None => std::ptr::null_mut(),
    }
}

pub extern "C" fn jit_expr_table_size(sym: *const SymbolName) -> f32 {
    symbol(sym)
        .and_then(|name| store::with_table(name, |t| t.len() as f32))
        .unwrap_or(0.0)
}

/// Sum of cells `start..=end`, clamped to the table.
pub extern "C" fn jit_expr_table_sum(sym: *const SymbolName, start: f32, end: f32) -> f32 {
    let (start, end) = (start as i64, end as i64);
    if start > end || end < 0 {
        return 0.0;
    }
    symbol(sym)
        .and_then(|name| {
            store::with_table(name, |t| {
                if t.is_empty() {
                    return 0.0;
                }
                let lo = start.max(0) as usize;
                let hi = (end as usize).min(t.len() - 1);
                if lo > hi {
                    0.0
                } else {
                    t[lo..=hi].iter().sum()
                }
            })
        })
        .unwrap_or(0.0)
}

pub extern "C" fn jit_expr_table_sum_all(sym: *const SymbolName) -> f32 {
    symbol(sym)
        .and_then(|name| store::with_table(name, |t| t.iter().sum()))
        .unwrap_or(0.0)
}

pub extern "C" fn jit_expr_value_get(sym: *const SymbolName) -> f32 {
    symbol(sym).and_then(store::value_of).unwrap_or(0.0)
}

pub extern "C" fn jit_expr_value_assign(sym: *const SymbolName, value: f32) -> f32 {
    if let Some(name) = symbol(sym) {
        store::assign(name, value);
    }
    value
}

pub extern "C" fn jit_expr_deref(ptr: *const f32) -> f32 {
    // SAFETY: non-null pointers come from `jit_expr_table_value_ptr`.
    unsafe { ptr.as_ref() }.copied().unwrap_or(0.0)
}

/// Linear interpolation between `buf[i]` and `buf[i + 1]`, both wrapped
/// into `[0, len)`.
pub extern "C" fn jit_expr_array_read(buf: *const f32, index: f32, len: i32) -> f32 {
    if buf.is_null() || len <= 0 {
        return 0.0;
    }
    let i = index.floor();
    let frac = index - i;
    let i = i as i64;
    let len = len as i64;
    // SAFETY: the caller passes a buffer of `len` samples.
    unsafe {
        let a = *buf.add(i.rem_euclid(len) as usize);
        let b = *buf.add((i + 1).rem_euclid(len) as usize);
        b * frac + a * (1.0 - frac)
    }
}

// --- Numeric helpers ---

pub extern "C" fn jit_expr_min(a: f32, b: f32) -> f32 {
    a.min(b)
}

pub extern "C" fn jit_expr_max(a: f32, b: f32) -> f32 {
    a.max(b)
}

/// Uniform integer in `[a, b)`, or 0 when the range is empty.
pub extern "C" fn jit_expr_random(a: f32, b: f32) -> f32 {
    let (lo, hi) = (a as i64, b as i64);
    if hi <= lo {
        return 0.0;
    }
    RNG.with(|rng| rng.borrow_mut().gen_range(lo..hi)) as f32
}

pub extern "C" fn jit_expr_fact(n: f32) -> f32 {
    let n = n as i64;
    let mut acc = 1.0f32;
    for k in 2..=n {
        acc *= k as f32;
        if acc.is_infinite() {
            break;
        }
    }
    acc
}

pub extern "C" fn jit_expr_imodf(v: f32) -> f32 {
    v.trunc()
}

pub extern "C" fn jit_expr_modf(v: f32) -> f32 {
    v - v.trunc()
}

pub extern "C" fn jit_expr_isnan(v: f32) -> f32 {
    v.is_nan() as i32 as f32
}

pub extern "C" fn jit_expr_isinf(v: f32) -> f32 {
    v.is_infinite() as i32 as f32
}

pub extern "C" fn jit_expr_finite(v: f32) -> f32 {
    v.is_finite() as i32 as f32
}

pub extern "C" fn jit_expr_ldexp(x: f32, exp: f32) -> f32 {
    x * 2f32.powi(exp as i32)
}

// --- libm-style f32 math ---

macro_rules! unary_math {
    ($($name:ident => $f:expr;)*) => {
        $(
            pub extern "C" fn $name(x: f32) -> f32 {
                let f: fn(f32) -> f32 = $f;
                f(x)
            }
        )*
    };
}

macro_rules! binary_math {
    ($($name:ident => $f:expr;)*) => {
        $(
            pub extern "C" fn $name(x: f32, y: f32) -> f32 {
                let f: fn(f32, f32) -> f32 = $f;
                f(x, y)
            }
        )*
    };
}

unary_math! {
    fabsf => f32::abs;
    acosf => f32::acos;
    acoshf => f32::acosh;
    asinf => f32::asin;
    asinhf => f32::asinh;
    atanf => f32::atan;
    atanhf => f32::atanh;
    cbrtf => f32::cbrt;
    ceilf => f32::ceil;
    cosf => f32::cos;
    coshf => f32::cosh;
    erff => erf;
    erfcf => |x| 1.0 - erf(x);
    expf => f32::exp;
    expm1f => f32::exp_m1;
    floorf => f32::floor;
    logf => f32::ln;
    log10f => f32::log10;
    log1pf => f32::ln_1p;
    nearbyintf => f32::round_ties_even;
    rintf => f32::round_ties_even;
    roundf => f32::round;
    sinf => f32::sin;
    sinhf => f32::sinh;
    sqrtf => f32::sqrt;
    tanf => f32::tan;
    tanhf => f32::tanh;
    truncf => f32::trunc;
}

binary_math! {
    atan2f => f32::atan2;
    copysignf => f32::copysign;
    fmodf => |x, y| x % y;
    powf => f32::powf;
    remainderf => |x, y| x - (x / y).round_ties_even() * y;
}

/// Abramowitz and Stegun 7.1.26, max error about 1.5e-7.
fn erf(x: f32) -> f32 {
    let sign = x.signum();
    let x = x.abs() as f64;
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    sign * (1.0 - poly * (-x * x).exp()) as f32
}

/// Every helper generated code may import, by symbol name.
pub fn helper_symbols() -> Vec<(&'static str, *const u8)> {
    macro_rules! sym {
        ($($name:ident),* $(,)?) => {
            vec![$((stringify!($name), $name as *const u8)),*]
        };
    }
    sym![
        jit_expr_table_value_ptr,
        jit_expr_table_size,
        jit_expr_table_sum,
        jit_expr_table_sum_all,
        jit_expr_value_get,
        jit_expr_value_assign,
        jit_expr_deref,
        jit_expr_array_read,
        jit_expr_min,
        jit_expr_max,
        jit_expr_random,
        jit_expr_fact,
        jit_expr_imodf,
        jit_expr_modf,
        jit_expr_isnan,
        jit_expr_isinf,
        jit_expr_finite,
        jit_expr_ldexp,
        fabsf,
        acosf,
        acoshf,
        asinf,
        asinhf,
        atanf,
        atanhf,
        cbrtf,
        ceilf,
        cosf,
        coshf,
        erff,
        erfcf,
        expf,
        expm1f,
        floorf,
        logf,
        log10f,
        log1pf,
        nearbyintf,
        rintf,
        roundf,
        sinf,
        sinhf,
        sqrtf,
        tanf,
        tanhf,
        truncf,
        atan2f,
        copysignf,
        fmodf,
        powf,
        remainderf,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn handle(name: &str) -> *const SymbolName {
        Symbol::intern(name).as_ptr()
    }

    #[test]
    fn table_sum_inclusive_and_clamped() {
        set_table("rt-test-sum", vec![1.0, 2.0, 3.0, 4.0]);
        let h = handle("rt-test-sum");
        assert_eq!(jit_expr_table_sum(h, 1.0, 2.0), 5.0);
        assert_eq!(jit_expr_table_sum(h, -3.0, 10.0), 10.0);
        assert_eq!(jit_expr_table_sum(h, 3.0, 1.0), 0.0);
        assert_eq!(jit_expr_table_sum(h, -5.0, -1.0), 0.0);
        assert_eq!(jit_expr_table_sum_all(h), 10.0);
        assert_eq!(jit_expr_table_size(h), 4.0);
    }

    #[test]
    fn missing_table_is_zero() {
        let h = handle("rt-test-missing");
        assert_eq!(jit_expr_table_size(h), 0.0);
        assert_eq!(jit_expr_table_sum_all(h), 0.0);
        assert_eq!(jit_expr_deref(jit_expr_table_value_ptr(h, 0.0)), 0.0);
        assert_eq!(jit_expr_table_size(std::ptr::null()), 0.0);
    }

    #[test]
    fn values_get_and_assign() {
        let h = handle("rt-test-value");
        assert_eq!(jit_expr_value_get(h), 0.0);
        assert_eq!(jit_expr_value_assign(h, 2.5), 2.5);
        assert_eq!(jit_expr_value_get(h), 2.5);
        assert_eq!(value("rt-test-value"), Some(2.5));
    }

    #[test]
    fn array_read_interpolates_and_wraps() {
        let buf = [0.0f32, 10.0, 20.0, 30.0];
        assert_approx_eq!(jit_expr_array_read(buf.as_ptr(), 1.0, 4), 10.0);
        assert_approx_eq!(jit_expr_array_read(buf.as_ptr(), 1.5, 4), 15.0);
        assert_approx_eq!(jit_expr_array_read(buf.as_ptr(), 3.5, 4), 15.0);
        assert_approx_eq!(jit_expr_array_read(buf.as_ptr(), 6.0, 4), 20.0);
        assert_eq!(jit_expr_array_read(std::ptr::null(), 1.0, 4), 0.0);
    }

    #[test]
    fn random_range() {
        seed_random(7);
        for _ in 0..100 {
            let v = jit_expr_random(2.0, 5.0);
            assert!((2.0..5.0).contains(&v));
            assert_eq!(v, v.trunc());
        }
        assert_eq!(jit_expr_random(3.0, 3.0), 0.0);
        assert_eq!(jit_expr_random(4.0, 1.0), 0.0);
    }

    #[test]
    fn random_is_seedable() {
        seed_random(42);
        let a: Vec<f32> = (0..8).map(|_| jit_expr_random(0.0, 1000.0)).collect();
        seed_random(42);
        let b: Vec<f32> = (0..8).map(|_| jit_expr_random(0.0, 1000.0)).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn numeric_helpers() {
        assert_eq!(jit_expr_fact(5.0), 120.0);
        assert_eq!(jit_expr_fact(0.0), 1.0);
        assert_eq!(jit_expr_fact(-3.0), 1.0);
        assert!(jit_expr_fact(1e9).is_infinite());
        assert_eq!(jit_expr_imodf(-2.75), -2.0);
        assert_approx_eq!(jit_expr_modf(2.75), 0.75);
        assert_eq!(jit_expr_isnan(f32::NAN), 1.0);
        assert_eq!(jit_expr_isinf(1.0), 0.0);
        assert_eq!(jit_expr_finite(1.0), 1.0);
        assert_eq!(jit_expr_ldexp(3.0, 2.0), 12.0);
        assert_eq!(jit_expr_min(1.0, 2.0), 1.0);
        assert_eq!(jit_expr_max(1.0, 2.0), 2.0);
    }

    #[test]
    fn math_symbols() {
        assert_approx_eq!(erff(0.0), 0.0);
        assert_approx_eq!(erff(1.0), 0.842_700_8, 1e-5);
        assert_approx_eq!(erfcf(-1.0), 1.842_700_8, 1e-5);
        assert_eq!(rintf(2.5), 2.0);
        assert_eq!(rintf(3.5), 4.0);
        assert_eq!(rintf(-2.5), -2.0);
        assert_eq!(roundf(2.5), 3.0);
        assert_approx_eq!(remainderf(5.0, 3.0), -1.0);
        assert_approx_eq!(fmodf(5.0, 3.0), 2.0);
        assert_eq!(fabsf(-2.0), 2.0);
    }

    #[test]
    fn helper_names_unique() {
        let mut names: Vec<_> = helper_symbols().into_iter().map(|(n, _)| n).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
