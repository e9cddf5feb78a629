//! Function DAG and expression ordering.
//!
//! Reverse-mode accumulation needs two orders: the list of array functions
//! reachable from the output with every caller preceding its callees, and,
//! within one right-hand side, a post-order list of subexpressions so that
//! reverse iteration yields parents before operands.

use rustc_hash::FxHashSet;

use crate::ast::{CallType, Expr, ExprId, ExprKind};
use crate::func::Func;

/// Gathers the function DAG in reverse topological order, tie-broken by
/// first-visit order.
#[derive(Default)]
pub struct FunctionSorter {
    functions: Vec<Func>,
    traversed: FxHashSet<String>,
    visited: FxHashSet<ExprId>,
}

impl FunctionSorter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort_expr(&mut self, expr: &Expr) {
        self.visit(expr);
    }

    /// Emits `func`, then recurses into its stages from the last update down
    /// to the pure definition, so later stages' callees are listed before
    /// earlier stages'.
    pub fn sort_func(&mut self, func: &Func) {
        self.traversed.insert(func.name());
        self.functions.push(func.clone());
        for update_id in (0..func.num_update_definitions()).rev() {
            let value = func.update_value(update_id);
            self.visit(&value);
        }
        if let Some(value) = func.value() {
            self.visit(&value);
        }
    }

    /// The collected list: every reachable function exactly once, callers
    /// before callees.
    pub fn into_functions(self) -> Vec<Func> {
        self.functions
    }

    fn visit(&mut self, expr: &Expr) {
        if !self.visited.insert(expr.id()) {
            return;
        }
        match expr.kind() {
            ExprKind::Call {
                func: Some(func),
                call_type: CallType::Function,
                ..
            } => {
                // The callee's own stages are what matter; index expressions
                // cannot contain further function reads.
                if !self.traversed.contains(&func.name()) {
                    self.sort_func(func);
                }
            }
            _ => {
                for child in expr.children() {
                    self.visit(&child);
                }
            }
        }
    }
}

/// Topologically sorts the subexpressions of one right-hand side.
///
/// Every subexpression appears exactly once, operands strictly before their
/// parents; the root is last. Array-function reads are treated as leaves:
/// their index arguments are handled when the callee itself is
/// differentiated, not here. Intrinsic arguments are ordinary operands.
#[derive(Default)]
pub struct ExpressionSorter {
    list: Vec<Expr>,
    visited: FxHashSet<ExprId>,
}

impl ExpressionSorter {
    pub fn sort(expr: &Expr) -> Vec<Expr> {
        let mut sorter = ExpressionSorter::default();
        sorter.include(expr);
        sorter.list
    }

    fn include(&mut self, expr: &Expr) {
        if !self.visited.insert(expr.id()) {
            return;
        }
        match expr.kind() {
            ExprKind::Call {
                call_type: CallType::Function,
                ..
            } => {}
            _ => {
                for child in expr.children() {
                    self.include(&child);
                }
            }
        }
        self.list.push(expr.clone());
    }
}
