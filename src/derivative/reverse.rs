//! Reverse accumulation.
//!
//! Seeds the output's adjoint with 1.0, walks the output expression and then
//! every contributing function's stages in reverse, and scatters adjoint
//! contributions into per-function adjoint definitions. Scattered writes are
//! canonicalized (argument inversion, reduction promotion) so every emitted
//! update has the callee's own arguments on the left-hand side.

use log::{debug, trace};
use rustc_hash::FxHashMap;

use crate::ast::{fresh_id, CallType, Expr, ExprId, ExprKind};
use crate::error::{DerivativeError, Result};
use crate::func::Func;
use crate::rdom::RDom;

use super::bounds::{BoundsInferencer, FuncBounds};
use super::inverse::invert;
use super::sort::ExpressionSorter;
use super::vars::{expr_uses_var, substitute};

/// One reverse-mode pass. State is scoped to a single
/// [`ReverseAccumulator::propagate`] invocation.
#[derive(Default)]
pub struct ReverseAccumulator {
    /// Adjoint accumulated so far per expression node, for the expression
    /// currently being walked. Cleared between expressions.
    adjoints: FxHashMap<ExprId, Expr>,
    /// Adjoint function per primal function name.
    adjoint_funcs: FxHashMap<String, Func>,
    /// Staging target for scatters into the function currently being
    /// differentiated.
    staging: Option<Func>,
    /// In-scope `let` bindings of the current expression.
    let_bindings: FxHashMap<String, Expr>,
    func_bounds: FuncBounds,
    current_bounds: Option<RDom>,
    current_func: String,
}

impl ReverseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the adjoint of `output` with respect to every function in
    /// `funcs` (the reverse-topological list from the function sorter).
    pub fn propagate(mut self, output: &Expr, funcs: &[Func]) -> Result<FxHashMap<String, Func>> {
        if funcs.is_empty() {
            debug!("reverse accumulation: no functions to backpropagate to");
            return Ok(FxHashMap::default());
        }

        debug!("reverse accumulation: inferring bounds");
        self.func_bounds = BoundsInferencer::infer(output, funcs)?;

        // A zero-valued stub per function; update stages accumulate into it.
        for func in funcs {
            let adjoint = Func::new(&format!("{}_d", func.name()));
            let args = func.args();
            let arg_refs: Vec<&str> = args.iter().map(|a| a.as_str()).collect();
            adjoint.define(&arg_refs, 0.0f32);
            self.adjoint_funcs.insert(func.name(), adjoint);
        }

        // Seed the output itself with the identity adjoint and push it down
        // to the functions it reads.
        self.begin_expression();
        let list = ExpressionSorter::sort(output);
        self.adjoints.insert(output.id(), 1.0f32.into());
        self.walk(&list)?;

        for func in funcs {
            self.propagate_function(func)?;
        }

        Ok(self.adjoint_funcs)
    }

    /// Walks one function's stages from the last update down to the pure
    /// definition, swapping in a staging adjoint per stage.
    fn propagate_function(&mut self, func: &Func) -> Result<()> {
        let name = func.name();
        debug!("reverse accumulation: differentiating {name}");
        self.current_func = name.clone();

        let mut stage_values: Vec<Expr> = (0..func.num_update_definitions())
            .rev()
            .map(|i| func.update_value(i))
            .collect();
        if let Some(value) = func.value() {
            stage_values.push(value);
        }

        for value in stage_values {
            let list = ExpressionSorter::sort(&value);
            self.current_bounds = Some(
                self.func_bounds
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| DerivativeError::MissingBounds(name.clone()))?,
            );
            self.begin_expression();

            // Scatters into the function being differentiated go to a fresh
            // staging function, never to the adjoint read on the right-hand
            // side of this very stage.
            let staging = Func::new(&format!("{name}_d"));
            let args = func.args();
            let arg_refs: Vec<&str> = args.iter().map(|a| a.as_str()).collect();
            staging.define(&arg_refs, 0.0f32);
            self.staging = Some(staging.clone());

            let adjoint_func = self
                .adjoint_funcs
                .get(&name)
                .cloned()
                .ok_or_else(|| DerivativeError::MissingAdjoint(name.clone()))?;
            self.adjoints
                .insert(value.id(), adjoint_func.at(&func.arg_exprs()));

            self.walk(&list)?;

            staging.update_add(adjoint_func.at(&adjoint_func.arg_exprs()));
            self.adjoint_funcs.insert(name.clone(), staging);
            self.staging = None;
        }
        Ok(())
    }

    fn begin_expression(&mut self) {
        self.adjoints.clear();
        self.let_bindings.clear();
    }

    fn walk(&mut self, sorted: &[Expr]) -> Result<()> {
        for expr in sorted.iter().rev() {
            self.visit(expr)?;
        }
        Ok(())
    }

    fn visit(&mut self, expr: &Expr) -> Result<()> {
        let Some(adjoint) = self.adjoints.get(&expr.id()).cloned() else {
            // Not on any differentiable path to the output.
            trace!("no adjoint for {expr}, skipping");
            return Ok(());
        };

        match expr.kind() {
            // d/dx cast(x) = 1
            ExprKind::Cast(_, value) => self.accumulate(&value.clone(), adjoint),
            // d/da (a + b) = 1, d/db (a + b) = 1
            ExprKind::Add(a, b) => {
                let (a, b) = (a.clone(), b.clone());
                self.accumulate(&a, adjoint.clone());
                self.accumulate(&b, adjoint);
            }
            // d/da (a - b) = 1, d/db (a - b) = -1
            ExprKind::Sub(a, b) => {
                let (a, b) = (a.clone(), b.clone());
                self.accumulate(&a, adjoint.clone());
                self.accumulate(&b, -adjoint);
            }
            // d/da (a*b) = b, d/db (a*b) = a
            ExprKind::Mul(a, b) => {
                let (a, b) = (a.clone(), b.clone());
                self.accumulate(&a, adjoint.clone() * b.clone());
                self.accumulate(&b, adjoint * a);
            }
            // d/da (a/b) = 1/b, d/db (a/b) = -a/b^2
            ExprKind::Div(a, b) => {
                let (a, b) = (a.clone(), b.clone());
                self.accumulate(&a, adjoint.clone() / b.clone());
                self.accumulate(&b.clone(), -adjoint * a / (b.clone() * b));
            }
            // Indicator selection; both branches win at equality, which
            // keeps the result a valid subgradient.
            ExprKind::Min(a, b) => {
                let (a, b) = (a.clone(), b.clone());
                let to_a = crate::ast::helper::select(
                    crate::ast::helper::le(a.clone(), b.clone()),
                    adjoint.clone(),
                    0.0f32,
                );
                let to_b = crate::ast::helper::select(
                    crate::ast::helper::le(b.clone(), a.clone()),
                    adjoint,
                    0.0f32,
                );
                self.accumulate(&a, to_a);
                self.accumulate(&b, to_b);
            }
            ExprKind::Max(a, b) => {
                let (a, b) = (a.clone(), b.clone());
                let to_a = crate::ast::helper::select(
                    crate::ast::helper::ge(a.clone(), b.clone()),
                    adjoint.clone(),
                    0.0f32,
                );
                let to_b = crate::ast::helper::select(
                    crate::ast::helper::ge(b.clone(), a.clone()),
                    adjoint,
                    0.0f32,
                );
                self.accumulate(&a, to_a);
                self.accumulate(&b, to_b);
            }
            ExprKind::Let { name, value, body } => {
                let (name, value, body) = (name.clone(), value.clone(), body.clone());
                self.accumulate(&body, adjoint);
                // The binding is recorded before the bound variable is
                // visited: the let node sorts after its body.
                self.let_bindings.insert(name, value);
            }
            ExprKind::Var { name, .. } => {
                if let Some(value) = self.let_bindings.get(name).cloned() {
                    // Rewrap the adjoint in the original binding under a
                    // fresh name so the primal's name is not shadowed.
                    let fresh = format!("{}_adj{}", name, fresh_id());
                    let fresh_var = Expr::var(&fresh).with_type(expr.dtype());
                    let rewrapped = substitute(&adjoint, name, &fresh_var);
                    let name = name.clone();
                    self.accumulate(
                        &value,
                        crate::ast::helper::let_in(&fresh, value.clone(), rewrapped),
                    );
                    trace!("rebound let {name} as {fresh}");
                }
            }
            ExprKind::Call {
                name,
                args,
                func,
                call_type,
            } => match call_type {
                CallType::Intrinsic if name.as_str() == "exp" => {
                    // d/dx exp(x) = exp(x)
                    for arg in args.clone() {
                        self.accumulate(
                            &arg,
                            adjoint.clone() * crate::ast::helper::exp(arg.clone()),
                        );
                    }
                }
                CallType::Intrinsic => {
                    trace!("intrinsic {name} has no adjoint rule");
                }
                CallType::Function => {
                    if let Some(func) = func {
                        let (func, args) = (func.clone(), args.clone());
                        self.scatter(&func, &args, adjoint)?;
                    }
                }
            },
            ExprKind::Const(_)
            | ExprKind::Select { .. }
            | ExprKind::Lt(..)
            | ExprKind::Le(..)
            | ExprKind::Gt(..)
            | ExprKind::Ge(..)
            | ExprKind::Eq(..)
            | ExprKind::Ne(..) => {}
        }
        Ok(())
    }

    /// Adds `adjoint` into the slot for `target`, initializing on first
    /// write. Contributions from multiple parents of a shared node sum here
    /// before the node itself is visited.
    fn accumulate(&mut self, target: &Expr, adjoint: Expr) {
        self.adjoints
            .entry(target.id())
            .and_modify(|acc| *acc = acc.clone() + adjoint.clone())
            .or_insert(adjoint);
    }

    /// Canonicalizes and emits `callee_adjoint(args) += adjoint` for a read
    /// `callee(call_args)` carrying `adjoint`.
    fn scatter(&mut self, callee: &Func, call_args: &[Expr], adjoint: Expr) -> Result<()> {
        let callee_name = callee.name();
        debug!("scattering to {callee_name}, adjoint {adjoint}");

        let target = if callee_name != self.current_func {
            self.adjoint_funcs
                .get(&callee_name)
                .cloned()
                .ok_or_else(|| DerivativeError::MissingAdjoint(callee_name.clone()))?
        } else {
            self.staging
                .clone()
                .ok_or_else(|| DerivativeError::MissingAdjoint(callee_name.clone()))?
        };
        if !self.func_bounds.contains_key(&callee_name) {
            return Err(DerivativeError::MissingBounds(callee_name));
        }

        // Canonicalize left to right so the write's index expressions become
        // exactly the callee's own arguments.
        let canonical = callee.args();
        let mut adjoint = adjoint;
        for (axis, arg) in call_args.iter().enumerate() {
            let xi = &canonical[axis];
            if !expr_uses_var(arg, xi) {
                // The caller iterates this axis but the write does not pin
                // it: sum the surviving iteration variable over the caller's
                // range.
                if expr_uses_var(&adjoint, xi) {
                    let rvar = self.caller_rvar(&callee_name, axis)?;
                    adjoint = substitute(&adjoint, xi, &rvar);
                }
                // A reduction variable as the index: rename it to the
                // canonical argument so the write lands where the read was.
                if let ExprKind::Var {
                    name,
                    rdom: Some(_),
                } = arg.kind()
                {
                    adjoint = substitute(&adjoint, name, &Expr::var(xi));
                }
            } else {
                let inverse = invert(xi, arg)?;
                adjoint = substitute(&adjoint, xi, &inverse);
            }
        }

        debug!("canonicalized adjoint {adjoint}");
        target.update_add(adjoint);
        super::print_func(&target);
        Ok(())
    }

    fn caller_rvar(&self, callee: &str, axis: usize) -> Result<Expr> {
        let bounds = self
            .current_bounds
            .as_ref()
            .ok_or_else(|| DerivativeError::ScatterArity {
                func: callee.to_string(),
                axis,
                arity: 0,
            })?;
        if axis >= bounds.len() {
            return Err(DerivativeError::ScatterArity {
                func: callee.to_string(),
                axis,
                arity: bounds.len(),
            });
        }
        Ok(bounds.var(axis))
    }
}
