//! Reverb: reverse-mode automatic differentiation for a small array-language
//! IR.
//!
//! A program is a DAG of named array functions ([`Func`]), each a pure
//! right-hand side over integer index variables plus optional `+=` update
//! stages. Given a scalar output expression, [`propagate_adjoints`] returns,
//! per contributing function, a new array function computing
//! `∂output/∂f(x₀, …)`, with scattered reads turned into canonical writes
//! by argument inversion and reduction promotion.
//!
//! # Example
//!
//! ```
//! use reverb::interp::Interp;
//! use reverb::{propagate_adjoints, Expr, Func};
//!
//! // f(x) = x; out(x) = f(x + 1); differentiate out(0).
//! let f = Func::new("f");
//! f.define(&["x"], reverb::ast::helper::cast(reverb::DType::F32, Expr::var("x")));
//! let out = Func::new("out");
//! out.define(&["x"], f.at(&[Expr::var("x") + 1]));
//!
//! let adjoints = propagate_adjoints(&out.at(&[0.into()])).unwrap();
//!
//! // The read at x + 1 scatters back through the inverse x - 1.
//! let mut interp = Interp::new();
//! assert_eq!(interp.eval_func(&adjoints["f"], &[1]).unwrap(), 1.0);
//! ```

pub mod ast;
pub mod derivative;
pub mod error;
pub mod func;
pub mod interp;
pub mod rdom;

pub use ast::{CallType, DType, Expr, ExprId, ExprKind, Literal};
pub use derivative::{print_func, propagate_adjoints};
pub use error::DerivativeError;
pub use func::Func;
pub use rdom::{RDom, RVar};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::ast::helper::{
        add, cast, div, eq, exp, ge, gt, le, let_in, lt, max, min, mul, ne, neg, select, sub,
    };
    pub use crate::ast::{DType, Expr, ExprKind, Literal};
    pub use crate::derivative::{print_func, propagate_adjoints};
    pub use crate::error::DerivativeError;
    pub use crate::func::Func;
    pub use crate::rdom::{RDom, RVar};
}
