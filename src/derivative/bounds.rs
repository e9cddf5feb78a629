//! Loop bounds inference.
//!
//! For every array function reachable from the output, derives the index
//! range over which it is read. Each call site's argument expressions are
//! bounded by symbolic interval arithmetic against the caller's iteration
//! domain, and ranges from multiple call sites are joined into a hull.
//!
//! Functions are scanned caller-before-callee over the reverse-topological
//! list produced by the function sorter, so a function's own bounds are
//! final before they become the frame for scanning its right-hand sides.

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::ast::{CallType, Expr, ExprId, ExprKind};
use crate::error::{DerivativeError, Result};
use crate::func::Func;
use crate::rdom::RDom;

/// Inferred bounds per function name.
pub type FuncBounds = FxHashMap<String, RDom>;

/// The iteration context bounds are estimated against: the enclosing
/// function's argument names and its inferred domain.
pub struct Frame<'a> {
    pub args: &'a [String],
    pub bounds: Option<&'a RDom>,
}

impl Frame<'_> {
    /// The frame the output expression is scanned under: no enclosing
    /// function, no iteration domain.
    pub fn output() -> Frame<'static> {
        Frame {
            args: &[],
            bounds: None,
        }
    }
}

/// Symbolic interval `(lo, hi)` of an index expression.
///
/// Supported shapes: integer constants, add, sub, min, max, reduction
/// variables (their `(min, min + extent)` range) and free arguments of the
/// current frame (their inferred range). Anything else is refused.
pub fn expr_interval(expr: &Expr, frame: &Frame, func: &str) -> Result<(Expr, Expr)> {
    match expr.kind() {
        ExprKind::Const(lit) if !lit.dtype().is_float() => Ok((expr.clone(), expr.clone())),
        ExprKind::Var {
            rdom: Some(rv), ..
        } => Ok((rv.min.clone(), rv.min.clone() + rv.extent.clone())),
        ExprKind::Var { name, rdom: None } => {
            if let Some(bounds) = frame.bounds {
                if let Some(axis) = frame.args.iter().position(|a| a == name) {
                    if axis < bounds.len() {
                        let rv = bounds.at(axis);
                        return Ok((rv.min.clone(), rv.min.clone() + rv.extent.clone()));
                    }
                }
            }
            Err(unsupported(expr, func))
        }
        ExprKind::Add(a, b) => {
            let (alo, ahi) = expr_interval(a, frame, func)?;
            let (blo, bhi) = expr_interval(b, frame, func)?;
            Ok((alo + blo, ahi + bhi))
        }
        ExprKind::Sub(a, b) => {
            let (alo, ahi) = expr_interval(a, frame, func)?;
            let (blo, bhi) = expr_interval(b, frame, func)?;
            Ok((alo - bhi, ahi - blo))
        }
        ExprKind::Min(a, b) => {
            let (alo, ahi) = expr_interval(a, frame, func)?;
            let (blo, bhi) = expr_interval(b, frame, func)?;
            Ok((crate::ast::helper::min(alo, blo), crate::ast::helper::min(ahi, bhi)))
        }
        ExprKind::Max(a, b) => {
            let (alo, ahi) = expr_interval(a, frame, func)?;
            let (blo, bhi) = expr_interval(b, frame, func)?;
            Ok((crate::ast::helper::max(alo, blo), crate::ast::helper::max(ahi, bhi)))
        }
        _ => Err(unsupported(expr, func)),
    }
}

fn unsupported(expr: &Expr, func: &str) -> DerivativeError {
    DerivativeError::UnsupportedBoundsExpr {
        expr: expr.to_string(),
        func: func.to_string(),
    }
}

/// Component-wise interval hull of two `(lo, hi)` pairs.
pub fn merge_bounds(a: (Expr, Expr), b: (Expr, Expr)) -> (Expr, Expr) {
    (
        crate::ast::helper::min(a.0, b.0),
        crate::ast::helper::max(a.1, b.1),
    )
}

/// Walks the function DAG and accumulates a bounds entry per function.
#[derive(Default)]
pub struct BoundsInferencer {
    bounds: FuncBounds,
}

impl BoundsInferencer {
    /// Infers bounds for every function in `funcs`, which must be the
    /// reverse-topological list rooted at `output` (callers first).
    pub fn infer(output: &Expr, funcs: &[Func]) -> Result<FuncBounds> {
        let mut inferencer = BoundsInferencer::default();

        let mut visited = FxHashSet::default();
        inferencer.scan(output, &Frame::output(), &mut visited, "<output>")?;

        for func in funcs {
            let name = func.name();
            let rdom = inferencer
                .bounds
                .get(&name)
                .cloned()
                .ok_or_else(|| DerivativeError::MissingBounds(name.clone()))?;
            debug!("bounds of {name}: {rdom}");

            let args = func.args();
            let frame = Frame {
                args: &args,
                bounds: Some(&rdom),
            };
            for update_id in (0..func.num_update_definitions()).rev() {
                let mut visited = FxHashSet::default();
                inferencer.scan(&func.update_value(update_id), &frame, &mut visited, &name)?;
            }
            if let Some(value) = func.value() {
                let mut visited = FxHashSet::default();
                inferencer.scan(&value, &frame, &mut visited, &name)?;
            }
        }

        Ok(inferencer.bounds)
    }

    fn scan(
        &mut self,
        expr: &Expr,
        frame: &Frame,
        visited: &mut FxHashSet<ExprId>,
        func_name: &str,
    ) -> Result<()> {
        if !visited.insert(expr.id()) {
            return Ok(());
        }
        match expr.kind() {
            ExprKind::Call {
                name,
                args,
                func: Some(_),
                call_type: CallType::Function,
            } => {
                let mut arg_bounds = Vec::with_capacity(args.len());
                for arg in args {
                    let (lo, hi) = expr_interval(arg, frame, func_name)?;
                    // RDom takes (min, extent) rather than (lo, hi).
                    arg_bounds.push((lo.clone(), hi - lo));
                }
                let merged = match self.bounds.get(name) {
                    Some(prev) => prev
                        .iter()
                        .zip(arg_bounds)
                        .map(|(rv, (min, extent))| {
                            let (lo, hi) = merge_bounds(
                                (rv.min.clone(), rv.min.clone() + rv.extent.clone()),
                                (min.clone(), min + extent),
                            );
                            (lo.clone(), hi - lo)
                        })
                        .collect(),
                    None => arg_bounds,
                };
                self.bounds.insert(name.clone(), RDom::new(merged));
                // Arguments of a function read are index expressions, not
                // further call sites; they were bounded above.
                Ok(())
            }
            _ => {
                for child in expr.children() {
                    self.scan(&child, frame, visited, func_name)?;
                }
                Ok(())
            }
        }
    }
}
