//! Built-in function table: argument signatures and helper symbol names.

use std::collections::HashMap;

use lazy_static::lazy_static;

/// Expected kind of a function argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    /// Any float or integer expression.
    Number,
    /// A quoted table name or quoted symbol variable.
    Symbol,
}

use Param::{Number as N, Symbol as S};

lazy_static! {
    static ref SIGNATURES: HashMap<&'static str, &'static [Param]> = {
        let table: &[(&'static str, &'static [Param])] = &[
            ("Sum", &[S, N, N]),
            ("abs", &[N]),
            ("acos", &[N]),
            ("acosh", &[N]),
            ("asin", &[N]),
            ("asinh", &[N]),
            ("atan", &[N]),
            ("atan2", &[N, N]),
            ("atanh", &[N]),
            ("cbrt", &[N]),
            ("ceil", &[N]),
            ("copysign", &[N, N]),
            ("cos", &[N]),
            ("cosh", &[N]),
            ("erf", &[N]),
            ("erfc", &[N]),
            ("exp", &[N]),
            ("expm1", &[N]),
            ("fact", &[N]),
            ("finite", &[N]),
            ("float", &[N]),
            ("floor", &[N]),
            ("fmod", &[N, N]),
            ("if", &[N, N, N]),
            ("imodf", &[N]),
            ("int", &[N]),
            ("isinf", &[N]),
            ("isnan", &[N]),
            ("ldexp", &[N, N]),
            ("ln", &[N]),
            ("log", &[N]),
            ("log10", &[N]),
            ("log1p", &[N]),
            ("max", &[N, N]),
            ("min", &[N, N]),
            ("modf", &[N]),
            ("nearbyint", &[N]),
            ("pow", &[N, N]),
            ("random", &[N, N]),
            ("remainder", &[N, N]),
            ("rint", &[N]),
            ("round", &[N]),
            ("sin", &[N]),
            ("sinh", &[N]),
            ("size", &[S]),
            ("sqrt", &[N]),
            ("sum", &[S]),
            ("tan", &[N]),
            ("tanh", &[N]),
            ("trunc", &[N]),
        ];
        table.iter().copied().collect()
    };

    /// Functions whose helper symbol is not `name` + `f`.
    static ref ALIASES: HashMap<&'static str, &'static str> = {
        let table: &[(&'static str, &'static str)] = &[
            ("abs", "fabsf"),
            ("ln", "logf"),
            ("log", "logf"),
            ("fact", "jit_expr_fact"),
            ("max", "jit_expr_max"),
            ("min", "jit_expr_min"),
            ("random", "jit_expr_random"),
            ("imodf", "jit_expr_imodf"),
            ("modf", "jit_expr_modf"),
            ("isnan", "jit_expr_isnan"),
            ("isinf", "jit_expr_isinf"),
            ("finite", "jit_expr_finite"),
            ("ldexp", "jit_expr_ldexp"),
            ("size", "jit_expr_table_size"),
            ("sum", "jit_expr_table_sum_all"),
            ("Sum", "jit_expr_table_sum"),
        ];
        table.iter().copied().collect()
    };
}

/// Argument signature of a built-in function, or `None` if unknown.
pub fn signature(name: &str) -> Option<&'static [Param]> {
    SIGNATURES.get(name).copied()
}

/// Functions lowered inline rather than called.
pub fn is_inline(name: &str) -> bool {
    matches!(name, "if" | "int" | "float")
}

/// The external symbol a call to `name` resolves to.
pub fn helper_symbol(name: &str) -> String {
    match ALIASES.get(name) {
        Some(alias) => (*alias).to_string(),
        None => format!("{name}f"),
    }
}

/// All known function names, sorted.
pub fn names() -> Vec<&'static str> {
    let mut names: Vec<_> = SIGNATURES.keys().copied().collect();
    names.sort_unstable();
    names
}
