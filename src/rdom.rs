//! Reduction domains.
//!
//! An [`RDom`] is an ordered tuple of named reduction variables, each with a
//! symbolic `(min, extent)` pair. Domains serve two roles: the loop bounds
//! attached to an array function by bounds inference, and the iteration
//! domain of a scattered update introduced by the differentiation pass.

use std::fmt;

use crate::ast::{fresh_id, DType, Expr, ExprKind};

/// A single reduction variable with its symbolic bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct RVar {
    pub name: String,
    pub min: Expr,
    pub extent: Expr,
}

impl RVar {
    /// The variable expression carrying this binding.
    pub fn var(&self) -> Expr {
        Expr::new(
            ExprKind::Var {
                name: self.name.clone(),
                rdom: Some(self.clone()),
            },
            DType::I32,
        )
    }
}

impl fmt::Display for RVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}, {}]", self.name, self.min, self.extent)
    }
}

/// An ordered tuple of reduction variables.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RDom {
    vars: Vec<RVar>,
}

impl RDom {
    /// Builds a domain from `(min, extent)` pairs. Variable names are
    /// generated fresh (`r{seq}${axis}`) so distinct domains never collide.
    pub fn new(bounds: Vec<(Expr, Expr)>) -> Self {
        let seq = fresh_id();
        let vars = bounds
            .into_iter()
            .enumerate()
            .map(|(axis, (min, extent))| RVar {
                name: format!("r{seq}${axis}"),
                min,
                extent,
            })
            .collect();
        RDom { vars }
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn domain(&self) -> &[RVar] {
        &self.vars
    }

    pub fn at(&self, axis: usize) -> &RVar {
        &self.vars[axis]
    }

    /// The variable expression for one axis.
    pub fn var(&self, axis: usize) -> Expr {
        self.vars[axis].var()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RVar> {
        self.vars.iter()
    }
}

impl fmt::Display for RDom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rdom(")?;
        for (i, rv) in self.vars.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{rv}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_names_per_domain() {
        let a = RDom::new(vec![(0.into(), 4.into())]);
        let b = RDom::new(vec![(0.into(), 4.into())]);
        assert_ne!(a.at(0).name, b.at(0).name);
    }

    #[test]
    fn test_var_carries_binding() {
        let dom = RDom::new(vec![(2.into(), 5.into()), (0.into(), 3.into())]);
        let v = dom.var(1);
        let ExprKind::Var { name, rdom: Some(rv) } = v.kind() else {
            panic!("expected bound Var");
        };
        assert_eq!(name, &dom.at(1).name);
        assert_eq!(rv.min, Expr::from(0));
        assert_eq!(rv.extent, Expr::from(3));
    }
}
