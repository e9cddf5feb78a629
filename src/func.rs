//! Array functions.
//!
//! A [`Func`] is a named definition over a tuple of integer index variables:
//! one pure right-hand side plus zero or more `+=` update stages applied in
//! declaration order. Handles share the definition, so a call site built
//! before an update stage observes the stage once it is appended.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::ast::{helper, CallType, DType, Expr, ExprKind};

#[derive(Debug)]
struct FuncInner {
    name: String,
    args: Vec<String>,
    value: Option<Expr>,
    updates: Vec<Expr>,
}

/// Shared handle to an array function definition.
#[derive(Clone)]
pub struct Func(Rc<RefCell<FuncInner>>);

impl Func {
    pub fn new(name: &str) -> Self {
        Func(Rc::new(RefCell::new(FuncInner {
            name: name.to_string(),
            args: Vec::new(),
            value: None,
            updates: Vec::new(),
        })))
    }

    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    /// The ordered free-argument names.
    pub fn args(&self) -> Vec<String> {
        self.0.borrow().args.clone()
    }

    /// The free arguments as variable expressions.
    pub fn arg_exprs(&self) -> Vec<Expr> {
        self.0.borrow().args.iter().map(|a| Expr::var(a)).collect()
    }

    /// Sets the pure definition `name(args) = value`.
    ///
    /// # Panics
    ///
    /// Panics if the function already has a pure definition.
    pub fn define(&self, args: &[&str], value: impl Into<Expr>) {
        let mut inner = self.0.borrow_mut();
        assert!(
            inner.value.is_none(),
            "{}: pure definition already set",
            inner.name
        );
        inner.args = args.iter().map(|a| a.to_string()).collect();
        inner.value = Some(value.into());
    }

    pub fn defined(&self) -> bool {
        self.0.borrow().value.is_some()
    }

    /// The pure right-hand side, if defined.
    pub fn value(&self) -> Option<Expr> {
        self.0.borrow().value.clone()
    }

    pub fn num_update_definitions(&self) -> usize {
        self.0.borrow().updates.len()
    }

    /// The full right-hand side of update stage `i`, including the read of
    /// the previous stage: for `f(args) += e` this is `f(args) + e`.
    pub fn update_value(&self, i: usize) -> Expr {
        let added = self.0.borrow().updates[i].clone();
        helper::add(self.at(&self.arg_exprs()), added)
    }

    /// Appends an update stage `name(args) += value`.
    ///
    /// # Panics
    ///
    /// Panics if the function has no pure definition yet.
    pub fn update_add(&self, value: impl Into<Expr>) {
        let value = value.into();
        let mut inner = self.0.borrow_mut();
        assert!(
            inner.value.is_some(),
            "{}: update before pure definition",
            inner.name
        );
        inner.updates.push(value);
    }

    /// Builds a call expression reading this function at `args`.
    ///
    /// # Panics
    ///
    /// Panics if the argument count does not match the definition's arity.
    pub fn at(&self, args: &[Expr]) -> Expr {
        let inner = self.0.borrow();
        assert_eq!(
            args.len(),
            inner.args.len(),
            "{}: called with {} arguments, defined over {}",
            inner.name,
            args.len(),
            inner.args.len()
        );
        Expr::new(
            ExprKind::Call {
                name: inner.name.clone(),
                args: args.to_vec(),
                func: Some(self.clone()),
                call_type: CallType::Function,
            },
            DType::F32,
        )
    }

    /// Stable identity of the underlying definition, independent of name.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

impl PartialEq for Func {
    /// Handle identity: two handles are equal when they share a definition.
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

// Shallow on purpose: update stages read the function itself, so recursing
// into the definition would not terminate.
impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.borrow();
        f.debug_struct("Func")
            .field("name", &inner.name)
            .field("args", &inner.args)
            .field("updates", &inner.updates.len())
            .finish()
    }
}

impl fmt::Display for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.borrow();
        write!(f, "{}({})", inner.name, inner.args.join(", "))
    }
}
