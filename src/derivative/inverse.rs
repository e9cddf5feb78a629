//! Argument inversion.
//!
//! Given an index expression `e` that is affine-monotone in a single variable
//! `x`, [`invert`] produces the expression for `x` in terms of the value of
//! `e`, spelled with `x` standing for that value. Substituting the inverse
//! for `x` in an adjoint turns a gather-shaped read `f(e)` into a legal
//! scatter over `f`'s own argument.
//!
//! `min`/`max` pass through: when a scattered index is clamped, the clamp
//! becomes part of the adjoint's iteration envelope instead of an arithmetic
//! inverse.

use crate::ast::{helper, Expr, ExprKind};
use crate::error::{DerivativeError, Result};

use super::vars::expr_uses_var;

/// Inverts `expr` with respect to the variable `var`.
///
/// Supported shapes: `add`, `sub`, `min`, `max` with the variable in exactly
/// one branch, and the variable itself. Anything else is a precondition
/// violation surfaced as [`DerivativeError::UninvertibleArg`].
pub fn invert(var: &str, expr: &Expr) -> Result<Expr> {
    match expr.kind() {
        ExprKind::Add(a, b) => {
            let in_a = expr_uses_var(a, var);
            let in_b = expr_uses_var(b, var);
            if in_a && !in_b {
                // e = a + b  =>  a = e - b
                return Ok(helper::sub(invert(var, a)?, b.clone()));
            } else if in_b && !in_a {
                return Ok(helper::sub(invert(var, b)?, a.clone()));
            }
        }
        ExprKind::Sub(a, b) => {
            let in_a = expr_uses_var(a, var);
            let in_b = expr_uses_var(b, var);
            if in_a && !in_b {
                // e = a - b  =>  a = e + b
                return Ok(helper::add(invert(var, a)?, b.clone()));
            } else if in_b && !in_a {
                // e = a - b  =>  b = a - e
                return Ok(helper::sub(a.clone(), invert(var, b)?));
            }
        }
        ExprKind::Min(a, b) => {
            let in_a = expr_uses_var(a, var);
            let in_b = expr_uses_var(b, var);
            if in_a && !in_b {
                return Ok(helper::min(invert(var, a)?, b.clone()));
            } else if in_b && !in_a {
                return Ok(helper::min(a.clone(), invert(var, b)?));
            }
        }
        ExprKind::Max(a, b) => {
            let in_a = expr_uses_var(a, var);
            let in_b = expr_uses_var(b, var);
            if in_a && !in_b {
                return Ok(helper::max(invert(var, a)?, b.clone()));
            } else if in_b && !in_a {
                return Ok(helper::max(a.clone(), invert(var, b)?));
            }
        }
        ExprKind::Var { .. } => return Ok(expr.clone()),
        _ => {}
    }
    Err(DerivativeError::UninvertibleArg {
        var: var.to_string(),
        expr: expr.to_string(),
    })
}
