//! Convenience constructors for expression nodes.

use super::{CallType, DType, Expr, ExprKind};

/// Result type of a binary arithmetic node: float wins over integer.
fn promote(a: DType, b: DType) -> DType {
    if a == DType::F32 || b == DType::F32 {
        DType::F32
    } else {
        a
    }
}

/// Macro to generate binary arithmetic helper functions.
macro_rules! impl_binary_helper {
    ($fn_name:ident, $variant:ident, $doc:expr) => {
        #[doc = $doc]
        pub fn $fn_name(a: impl Into<Expr>, b: impl Into<Expr>) -> Expr {
            let a = a.into();
            let b = b.into();
            let dtype = promote(a.dtype(), b.dtype());
            Expr::new(ExprKind::$variant(a, b), dtype)
        }
    };
}

/// Macro to generate comparison helper functions.
macro_rules! impl_compare_helper {
    ($fn_name:ident, $variant:ident, $doc:expr) => {
        #[doc = $doc]
        pub fn $fn_name(a: impl Into<Expr>, b: impl Into<Expr>) -> Expr {
            Expr::new(ExprKind::$variant(a.into(), b.into()), DType::Bool)
        }
    };
}

impl_binary_helper!(add, Add, "Create an add node: a + b");
impl_binary_helper!(sub, Sub, "Create a subtract node: a - b");
impl_binary_helper!(mul, Mul, "Create a multiply node: a * b");
impl_binary_helper!(div, Div, "Create a divide node: a / b");
impl_binary_helper!(min, Min, "Create a min node: min(a, b)");
impl_binary_helper!(max, Max, "Create a max node: max(a, b)");

impl_compare_helper!(lt, Lt, "Create a less-than comparison: a < b");
impl_compare_helper!(le, Le, "Create a less-than-or-equal comparison: a <= b");
impl_compare_helper!(gt, Gt, "Create a greater-than comparison: a > b");
impl_compare_helper!(ge, Ge, "Create a greater-than-or-equal comparison: a >= b");
impl_compare_helper!(eq, Eq, "Create an equality comparison: a == b");
impl_compare_helper!(ne, Ne, "Create a not-equal comparison: a != b");

/// Create a negation node: -a
/// Uses `Mul` with -1 since there is no dedicated `Neg` variant.
pub fn neg(a: impl Into<Expr>) -> Expr {
    let a = a.into();
    let minus_one: Expr = if a.dtype() == DType::I32 {
        (-1i32).into()
    } else {
        (-1.0f32).into()
    };
    mul(minus_one, a)
}

/// Create a select node: `cond ? then_case : else_case`.
pub fn select(cond: Expr, then_case: impl Into<Expr>, else_case: impl Into<Expr>) -> Expr {
    let then_case = then_case.into();
    let else_case = else_case.into();
    let dtype = promote(then_case.dtype(), else_case.dtype());
    Expr::new(
        ExprKind::Select {
            cond,
            then_case,
            else_case,
        },
        dtype,
    )
}

/// Create a let node binding `name` to `value` inside `body`.
pub fn let_in(name: &str, value: Expr, body: Expr) -> Expr {
    let dtype = body.dtype();
    Expr::new(
        ExprKind::Let {
            name: name.to_string(),
            value,
            body,
        },
        dtype,
    )
}

/// Create a cast node.
pub fn cast(dtype: DType, value: Expr) -> Expr {
    Expr::new(ExprKind::Cast(dtype, value), dtype)
}

/// Create a call to the `exp` intrinsic.
pub fn exp(value: impl Into<Expr>) -> Expr {
    Expr::new(
        ExprKind::Call {
            name: "exp".to_string(),
            args: vec![value.into()],
            func: None,
            call_type: CallType::Intrinsic,
        },
        DType::F32,
    )
}
