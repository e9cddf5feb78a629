//! Error types for the differentiation pass.

use thiserror::Error;

/// Fatal failures of the differentiation pass.
///
/// Every variant is an internal precondition violation: a well-formed
/// pipeline never produces them, and no partial adjoint map is returned when
/// one occurs.
#[derive(Debug, Error)]
pub enum DerivativeError {
    /// The bounds estimator met a node shape it refuses to guess a bound for.
    #[error("cannot infer bounds for `{expr}` while differentiating `{func}`")]
    UnsupportedBoundsExpr { expr: String, func: String },

    /// The argument inverter was invoked on an expression that is not
    /// affine-monotone in the target variable.
    #[error("cannot invert `{expr}` with respect to `{var}`")]
    UninvertibleArg { var: String, expr: String },

    /// A function was reached during scatter without a bounds entry; bounds
    /// inference must precede accumulation.
    #[error("no inferred bounds for function `{0}`")]
    MissingBounds(String),

    /// A function was reached during scatter without an adjoint stub.
    #[error("no adjoint function allocated for `{0}`")]
    MissingAdjoint(String),

    /// A scatter needed a reduction variable for an axis outside the current
    /// iteration domain.
    #[error("scatter into `{func}` needs a reduction variable for axis {axis}, but the current domain has arity {arity}")]
    ScatterArity {
        func: String,
        axis: usize,
        arity: usize,
    },
}

pub type Result<T> = std::result::Result<T, DerivativeError>;
