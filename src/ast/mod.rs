//! Scalar expression IR.
//!
//! Expressions form an immutable DAG: an [`Expr`] is a cheap-clone handle to a
//! reference-counted node, and the same node may appear under multiple
//! parents. Passes that need to tell "same node" from "equal node" key on
//! [`Expr::id`], the node's address.

pub mod helper;

use std::cell::Cell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::func::Func;
use crate::rdom::RVar;

thread_local! {
    static NEXT_ID: Cell<usize> = const { Cell::new(0) };
}

/// Generates a fresh sequence number, used for reduction variable and
/// synthesized binding names.
pub(crate) fn fresh_id() -> usize {
    NEXT_ID.with(|cell| {
        let id = cell.get();
        cell.set(id + 1);
        id
    })
}

/// Scalar element type of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DType {
    /// 32-bit float. Array function values are conceptually `F32`.
    #[default]
    F32,
    /// 32-bit integer. Index variables and loop bounds are `I32`.
    I32,
    /// Result of a comparison, consumed by `Select`.
    Bool,
}

impl DType {
    pub fn is_float(self) -> bool {
        matches!(self, DType::F32)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "f32"),
            DType::I32 => write!(f, "i32"),
            DType::Bool => write!(f, "bool"),
        }
    }
}

/// A constant scalar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    F32(f32),
    I32(i32),
}

// f32 does not implement Eq/Hash; compare and hash the bit pattern.
impl Eq for Literal {}

impl Hash for Literal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Literal::F32(v) => {
                0u8.hash(state);
                v.to_bits().hash(state);
            }
            Literal::I32(v) => {
                1u8.hash(state);
                v.hash(state);
            }
        }
    }
}

impl Literal {
    pub fn dtype(&self) -> DType {
        match self {
            Literal::F32(_) => DType::F32,
            Literal::I32(_) => DType::I32,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::F32(v) => write!(f, "{v}"),
            Literal::I32(v) => write!(f, "{v}"),
        }
    }
}

/// How a `Call` node binds to its callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallType {
    /// A read of an array function; `func` carries the definition.
    Function,
    /// A named scalar intrinsic such as `exp`.
    Intrinsic,
}

/// The closed set of expression node kinds.
///
/// New operators require an explicit adjoint rule in the differentiation
/// engine, so the set is deliberately not open for extension.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Const(Literal),
    /// A free variable. When the variable is a reduction variable, `rdom`
    /// carries its `(min, extent)` binding.
    Var {
        name: String,
        rdom: Option<RVar>,
    },
    Cast(DType, Expr),

    Add(Expr, Expr),
    Sub(Expr, Expr),
    Mul(Expr, Expr),
    Div(Expr, Expr),
    Min(Expr, Expr),
    Max(Expr, Expr),

    Lt(Expr, Expr),
    Le(Expr, Expr),
    Gt(Expr, Expr),
    Ge(Expr, Expr),
    Eq(Expr, Expr),
    Ne(Expr, Expr),

    Select {
        cond: Expr,
        then_case: Expr,
        else_case: Expr,
    },
    Let {
        name: String,
        value: Expr,
        body: Expr,
    },
    Call {
        name: String,
        args: Vec<Expr>,
        func: Option<Func>,
        call_type: CallType,
    },
}

/// A single immutable IR node. Obtained through [`Expr`].
#[derive(Debug, PartialEq)]
pub struct ExprNode {
    pub kind: ExprKind,
    pub dtype: DType,
}

/// Stable identity of an expression node, used to key per-node state.
pub type ExprId = *const ExprNode;

/// Handle to a shared expression node.
#[derive(Clone)]
pub struct Expr(Rc<ExprNode>);

impl Expr {
    pub fn new(kind: ExprKind, dtype: DType) -> Self {
        Expr(Rc::new(ExprNode { kind, dtype }))
    }

    /// A plain index variable of type `i32`.
    pub fn var(name: &str) -> Self {
        Expr::new(
            ExprKind::Var {
                name: name.to_string(),
                rdom: None,
            },
            DType::I32,
        )
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    pub fn dtype(&self) -> DType {
        self.0.dtype
    }

    /// The node's address. Two handles to the same shared node compare equal.
    pub fn id(&self) -> ExprId {
        Rc::as_ptr(&self.0)
    }

    /// Rebuilds the node with a different type. Produces a new identity.
    pub fn with_type(&self, dtype: DType) -> Self {
        Expr::new(self.0.kind.clone(), dtype)
    }

    /// Direct operands in source order. `Let` exposes value then body;
    /// `Call` exposes its arguments.
    pub fn children(&self) -> Vec<Expr> {
        match self.kind() {
            ExprKind::Const(_) | ExprKind::Var { .. } => vec![],
            ExprKind::Cast(_, v) => vec![v.clone()],
            ExprKind::Add(a, b)
            | ExprKind::Sub(a, b)
            | ExprKind::Mul(a, b)
            | ExprKind::Div(a, b)
            | ExprKind::Min(a, b)
            | ExprKind::Max(a, b)
            | ExprKind::Lt(a, b)
            | ExprKind::Le(a, b)
            | ExprKind::Gt(a, b)
            | ExprKind::Ge(a, b)
            | ExprKind::Eq(a, b)
            | ExprKind::Ne(a, b) => vec![a.clone(), b.clone()],
            ExprKind::Select {
                cond,
                then_case,
                else_case,
            } => vec![cond.clone(), then_case.clone(), else_case.clone()],
            ExprKind::Let { value, body, .. } => vec![value.clone(), body.clone()],
            ExprKind::Call { args, .. } => args.clone(),
        }
    }
}

impl PartialEq for Expr {
    /// Structural equality; shared nodes short-circuit on identity.
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || *self.0 == *other.0
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExprKind::Const(lit) => write!(f, "{lit}"),
            ExprKind::Var { name, .. } => write!(f, "{name}"),
            ExprKind::Cast(dtype, v) => write!(f, "{dtype}({v})"),
            ExprKind::Add(a, b) => write!(f, "({a} + {b})"),
            ExprKind::Sub(a, b) => write!(f, "({a} - {b})"),
            ExprKind::Mul(a, b) => write!(f, "({a}*{b})"),
            ExprKind::Div(a, b) => write!(f, "({a}/{b})"),
            ExprKind::Min(a, b) => write!(f, "min({a}, {b})"),
            ExprKind::Max(a, b) => write!(f, "max({a}, {b})"),
            ExprKind::Lt(a, b) => write!(f, "({a} < {b})"),
            ExprKind::Le(a, b) => write!(f, "({a} <= {b})"),
            ExprKind::Gt(a, b) => write!(f, "({a} > {b})"),
            ExprKind::Ge(a, b) => write!(f, "({a} >= {b})"),
            ExprKind::Eq(a, b) => write!(f, "({a} == {b})"),
            ExprKind::Ne(a, b) => write!(f, "({a} != {b})"),
            ExprKind::Select {
                cond,
                then_case,
                else_case,
            } => write!(f, "select({cond}, {then_case}, {else_case})"),
            ExprKind::Let { name, value, body } => {
                write!(f, "(let {name} = {value} in {body})")
            }
            ExprKind::Call { name, args, .. } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<f32> for Expr {
    fn from(v: f32) -> Self {
        Expr::new(ExprKind::Const(Literal::F32(v)), DType::F32)
    }
}

impl From<i32> for Expr {
    fn from(v: i32) -> Self {
        Expr::new(ExprKind::Const(Literal::I32(v)), DType::I32)
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $helper:ident) => {
        impl std::ops::$trait for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                helper::$helper(self, rhs)
            }
        }

        impl<'a, 'b> std::ops::$trait<&'b Expr> for &'a Expr {
            type Output = Expr;
            fn $method(self, rhs: &'b Expr) -> Expr {
                helper::$helper(self.clone(), rhs.clone())
            }
        }

        impl std::ops::$trait<f32> for Expr {
            type Output = Expr;
            fn $method(self, rhs: f32) -> Expr {
                helper::$helper(self, Expr::from(rhs))
            }
        }

        impl std::ops::$trait<i32> for Expr {
            type Output = Expr;
            fn $method(self, rhs: i32) -> Expr {
                helper::$helper(self, Expr::from(rhs))
            }
        }
    };
}

impl_binary_op!(Add, add, add);
impl_binary_op!(Sub, sub, sub);
impl_binary_op!(Mul, mul, mul);
impl_binary_op!(Div, div, div);

impl std::ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        helper::neg(self)
    }
}

impl std::ops::Neg for &Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        helper::neg(self.clone())
    }
}
