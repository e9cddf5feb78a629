//! Reverse-mode automatic differentiation.
//!
//! Given a scalar output expression built from a DAG of array functions,
//! [`propagate_adjoints`] emits, for every contributing function, a new
//! array function whose value at an index is the partial derivative of the
//! output with respect to the primal's value at that index.
//!
//! The pass runs three cooperating traversals: a reverse-topological sort of
//! the function DAG, a per-right-hand-side topological sort of scalar
//! subexpressions, and the reverse accumulation walk itself, helped by two
//! symbolic algebra pieces (interval bounds inference for scattered updates
//! and argument inversion for canonical writes).
//!
//! # Example
//!
//! ```
//! use reverb::{propagate_adjoints, Expr, Func};
//!
//! let f = Func::new("f");
//! f.define(&["x"], 2.0f32);
//! let g = Func::new("g");
//! g.define(&["x"], 3.0f32);
//! let out = Func::new("out");
//! out.define(&["x"], f.at(&[Expr::var("x")]) * g.at(&[Expr::var("x")]));
//!
//! let adjoints = propagate_adjoints(&out.at(&[0.into()])).unwrap();
//! assert!(adjoints.contains_key("f"));
//! assert!(adjoints.contains_key("g"));
//! ```

pub mod bounds;
pub mod inverse;
pub mod reverse;
pub mod sort;
pub mod vars;

use log::debug;
use rustc_hash::FxHashMap;

use crate::ast::Expr;
use crate::error::Result;
use crate::func::Func;

use reverse::ReverseAccumulator;
use sort::FunctionSorter;

/// Computes adjoint functions for every array function reachable from
/// `output`.
///
/// The output expression must be scalar-valued. The returned map has one
/// entry per reachable function, keyed by the primal's name; each adjoint
/// shares its primal's argument list. With no reachable functions the map is
/// empty.
///
/// All fatal conditions (unsupported bounds shapes, uninvertible call
/// arguments, missing preconditions) abort the pass; no partial map is
/// returned.
pub fn propagate_adjoints(output: &Expr) -> Result<FxHashMap<String, Func>> {
    let mut sorter = FunctionSorter::new();
    sorter.sort_expr(output);
    let funcs = sorter.into_functions();

    debug!("propagate_adjoints: sorted function list:");
    for func in &funcs {
        debug!("  . {}", func.name());
    }

    ReverseAccumulator::new().propagate(output, &funcs)
}

/// Logs the function DAG rooted at `func`: every reachable function in
/// forward definition order, with the pure and update right-hand sides of
/// each.
pub fn print_func(func: &Func) {
    debug!("printing function {}", func.name());
    let mut sorter = FunctionSorter::new();
    sorter.sort_func(func);
    let funcs = sorter.into_functions();
    for (i, func) in funcs.iter().enumerate().rev() {
        debug!("  funcs[{i}]: {func}");
        if let Some(value) = func.value() {
            debug!("    init: {value}");
        }
        for update_id in 0..func.num_update_definitions() {
            debug!("    update[{update_id}]: {}", func.update_value(update_id));
        }
    }
}
