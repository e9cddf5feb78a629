//! Variable probe and substituter.
//!
//! Both are pure: the probe is a read-only traversal, and the substituter
//! rebuilds only the spine above a replaced variable, sharing every subtree
//! that does not contain the target.

use crate::ast::{Expr, ExprKind};

/// Does a free variable named `name` occur anywhere in `expr`?
///
/// A `let` of the same name shadows the variable in its body; occurrences in
/// the binding's value still count.
pub fn expr_uses_var(expr: &Expr, name: &str) -> bool {
    match expr.kind() {
        ExprKind::Var { name: n, .. } => n == name,
        ExprKind::Const(_) => false,
        ExprKind::Let {
            name: bound,
            value,
            body,
        } => expr_uses_var(value, name) || (bound != name && expr_uses_var(body, name)),
        _ => expr.children().iter().any(|c| expr_uses_var(c, name)),
    }
}

/// Replaces every free occurrence of the variable `name` in `expr` by
/// `replacement`, rebuilding parents and sharing untouched subtrees.
pub fn substitute(expr: &Expr, name: &str, replacement: &Expr) -> Expr {
    match expr.kind() {
        ExprKind::Var { name: n, .. } if n == name => replacement.clone(),
        ExprKind::Var { .. } | ExprKind::Const(_) => expr.clone(),
        ExprKind::Cast(dtype, v) => {
            let nv = substitute(v, name, replacement);
            if nv.id() == v.id() {
                expr.clone()
            } else {
                Expr::new(ExprKind::Cast(*dtype, nv), expr.dtype())
            }
        }
        ExprKind::Add(a, b) => rebuild2(expr, a, b, name, replacement, ExprKind::Add),
        ExprKind::Sub(a, b) => rebuild2(expr, a, b, name, replacement, ExprKind::Sub),
        ExprKind::Mul(a, b) => rebuild2(expr, a, b, name, replacement, ExprKind::Mul),
        ExprKind::Div(a, b) => rebuild2(expr, a, b, name, replacement, ExprKind::Div),
        ExprKind::Min(a, b) => rebuild2(expr, a, b, name, replacement, ExprKind::Min),
        ExprKind::Max(a, b) => rebuild2(expr, a, b, name, replacement, ExprKind::Max),
        ExprKind::Lt(a, b) => rebuild2(expr, a, b, name, replacement, ExprKind::Lt),
        ExprKind::Le(a, b) => rebuild2(expr, a, b, name, replacement, ExprKind::Le),
        ExprKind::Gt(a, b) => rebuild2(expr, a, b, name, replacement, ExprKind::Gt),
        ExprKind::Ge(a, b) => rebuild2(expr, a, b, name, replacement, ExprKind::Ge),
        ExprKind::Eq(a, b) => rebuild2(expr, a, b, name, replacement, ExprKind::Eq),
        ExprKind::Ne(a, b) => rebuild2(expr, a, b, name, replacement, ExprKind::Ne),
        ExprKind::Select {
            cond,
            then_case,
            else_case,
        } => {
            let nc = substitute(cond, name, replacement);
            let nt = substitute(then_case, name, replacement);
            let ne = substitute(else_case, name, replacement);
            if nc.id() == cond.id() && nt.id() == then_case.id() && ne.id() == else_case.id() {
                expr.clone()
            } else {
                Expr::new(
                    ExprKind::Select {
                        cond: nc,
                        then_case: nt,
                        else_case: ne,
                    },
                    expr.dtype(),
                )
            }
        }
        ExprKind::Let {
            name: bound,
            value,
            body,
        } => {
            let nv = substitute(value, name, replacement);
            // The binding shadows `name` in the body.
            let nb = if bound == name {
                body.clone()
            } else {
                substitute(body, name, replacement)
            };
            if nv.id() == value.id() && nb.id() == body.id() {
                expr.clone()
            } else {
                Expr::new(
                    ExprKind::Let {
                        name: bound.clone(),
                        value: nv,
                        body: nb,
                    },
                    expr.dtype(),
                )
            }
        }
        ExprKind::Call {
            name: callee,
            args,
            func,
            call_type,
        } => {
            let new_args: Vec<Expr> = args
                .iter()
                .map(|a| substitute(a, name, replacement))
                .collect();
            if new_args.iter().zip(args).all(|(n, o)| n.id() == o.id()) {
                expr.clone()
            } else {
                Expr::new(
                    ExprKind::Call {
                        name: callee.clone(),
                        args: new_args,
                        func: func.clone(),
                        call_type: *call_type,
                    },
                    expr.dtype(),
                )
            }
        }
    }
}

fn rebuild2(
    expr: &Expr,
    a: &Expr,
    b: &Expr,
    name: &str,
    replacement: &Expr,
    make: fn(Expr, Expr) -> ExprKind,
) -> Expr {
    let na = substitute(a, name, replacement);
    let nb = substitute(b, name, replacement);
    if na.id() == a.id() && nb.id() == b.id() {
        expr.clone()
    } else {
        Expr::new(make(na, nb), expr.dtype())
    }
}
