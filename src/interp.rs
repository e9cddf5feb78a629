//! Scalar interpreter for expressions and array functions.
//!
//! Evaluates a function at an integer index point by computing the pure
//! definition and then folding each update stage in declaration order. A
//! stage whose right-hand side contains reduction variables is applied once
//! per point of their cross product, sequentially, with the stage's read of
//! the function itself resolving to the running accumulator.
//!
//! Results are cached per `(definition, stage count, point)`; stages are
//! append-only, so a cached entry can never go stale.

use rustc_hash::FxHashMap;

use crate::ast::{CallType, DType, Expr, ExprKind, Literal};
use crate::func::Func;
use crate::rdom::RVar;

/// A runtime scalar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    F32(f32),
    I32(i32),
    Bool(bool),
}

impl Value {
    pub fn as_f32(self) -> Result<f32, String> {
        match self {
            Value::F32(v) => Ok(v),
            Value::I32(v) => Ok(v as f32),
            Value::Bool(_) => Err("expected a number, found a bool".to_string()),
        }
    }

    pub fn as_i32(self) -> Result<i32, String> {
        match self {
            Value::I32(v) => Ok(v),
            Value::F32(v) => Err(format!("expected an integer, found {v}")),
            Value::Bool(_) => Err("expected an integer, found a bool".to_string()),
        }
    }

    pub fn as_bool(self) -> Result<bool, String> {
        match self {
            Value::Bool(v) => Ok(v),
            other => Err(format!("expected a bool, found {other:?}")),
        }
    }
}

type Env = FxHashMap<String, Value>;

/// Resolution context for a stage's reads of the function it updates.
struct SelfRead<'a> {
    func: &'a Func,
    /// Number of stages already folded; a self read off the current point
    /// evaluates through these.
    stages: usize,
    point: &'a [i32],
    acc: f32,
}

/// Expression and function evaluator with a result cache.
#[derive(Default)]
pub struct Interp {
    cache: FxHashMap<(usize, usize, Vec<i32>), f32>,
}

impl Interp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates `func` at `point`, all update stages applied.
    pub fn eval_func(&mut self, func: &Func, point: &[i32]) -> Result<f32, String> {
        self.eval_stages(func, func.num_update_definitions(), point)
    }

    /// Evaluates a closed expression (no free variables).
    pub fn eval_closed(&mut self, expr: &Expr) -> Result<Value, String> {
        let mut env = Env::default();
        self.eval_expr(expr, &mut env, None)
    }

    fn eval_stages(&mut self, func: &Func, stages: usize, point: &[i32]) -> Result<f32, String> {
        let key = (func.id(), stages, point.to_vec());
        if let Some(&v) = self.cache.get(&key) {
            return Ok(v);
        }

        let args = func.args();
        if args.len() != point.len() {
            return Err(format!(
                "{}: evaluated at {} indices, defined over {}",
                func.name(),
                point.len(),
                args.len()
            ));
        }
        let value = func
            .value()
            .ok_or_else(|| format!("{}: no pure definition", func.name()))?;

        let mut env: Env = args
            .iter()
            .zip(point)
            .map(|(a, &p)| (a.clone(), Value::I32(p)))
            .collect();
        let mut acc = self.eval_expr(&value, &mut env, None)?.as_f32()?;

        for stage in 0..stages {
            let stage_value = func.update_value(stage);
            let rvars = collect_rvars(&stage_value);
            let mut ranges = Vec::with_capacity(rvars.len());
            for rv in &rvars {
                let min = self.eval_expr(&rv.min, &mut env, None)?.as_i32()?;
                let extent = self.eval_expr(&rv.extent, &mut env, None)?.as_i32()?;
                ranges.push((rv.name.clone(), min, extent));
            }
            if ranges.iter().any(|(_, _, extent)| *extent <= 0) {
                continue;
            }

            let mut combo: Vec<i32> = ranges.iter().map(|(_, min, _)| *min).collect();
            'iterate: loop {
                for (i, (name, _, _)) in ranges.iter().enumerate() {
                    env.insert(name.clone(), Value::I32(combo[i]));
                }
                let ctx = SelfRead {
                    func,
                    stages: stage,
                    point,
                    acc,
                };
                acc = self.eval_expr(&stage_value, &mut env, Some(&ctx))?.as_f32()?;

                // Odometer: last axis fastest.
                let mut axis = ranges.len();
                loop {
                    if axis == 0 {
                        break 'iterate;
                    }
                    axis -= 1;
                    combo[axis] += 1;
                    let (_, min, extent) = &ranges[axis];
                    if combo[axis] < min + extent {
                        continue 'iterate;
                    }
                    combo[axis] = *min;
                }
            }
            for (name, _, _) in &ranges {
                env.remove(name);
            }
        }

        self.cache.insert(key, acc);
        Ok(acc)
    }

    fn eval_expr(
        &mut self,
        expr: &Expr,
        env: &mut Env,
        self_read: Option<&SelfRead>,
    ) -> Result<Value, String> {
        match expr.kind() {
            ExprKind::Const(Literal::F32(v)) => Ok(Value::F32(*v)),
            ExprKind::Const(Literal::I32(v)) => Ok(Value::I32(*v)),
            ExprKind::Var { name, .. } => env
                .get(name)
                .copied()
                .ok_or_else(|| format!("unbound variable `{name}`")),
            ExprKind::Cast(dtype, v) => {
                let v = self.eval_expr(v, env, self_read)?;
                match dtype {
                    DType::F32 => Ok(Value::F32(v.as_f32()?)),
                    DType::I32 => match v {
                        Value::I32(i) => Ok(Value::I32(i)),
                        Value::F32(f) => Ok(Value::I32(f as i32)),
                        Value::Bool(_) => Err("cannot cast a bool to i32".to_string()),
                    },
                    DType::Bool => v.as_bool().map(Value::Bool),
                }
            }
            ExprKind::Add(a, b) => self.binop(a, b, env, self_read, |x, y| x + y, |x, y| Some(x + y)),
            ExprKind::Sub(a, b) => self.binop(a, b, env, self_read, |x, y| x - y, |x, y| Some(x - y)),
            ExprKind::Mul(a, b) => self.binop(a, b, env, self_read, |x, y| x * y, |x, y| Some(x * y)),
            ExprKind::Div(a, b) => self.binop(
                a,
                b,
                env,
                self_read,
                |x, y| x / y,
                |x, y| if y == 0 { None } else { Some(x / y) },
            ),
            ExprKind::Min(a, b) => {
                self.binop(a, b, env, self_read, f32::min, |x, y| Some(x.min(y)))
            }
            ExprKind::Max(a, b) => {
                self.binop(a, b, env, self_read, f32::max, |x, y| Some(x.max(y)))
            }
            ExprKind::Lt(a, b) => self.compare(a, b, env, self_read, |o| o.is_lt()),
            ExprKind::Le(a, b) => self.compare(a, b, env, self_read, |o| o.is_le()),
            ExprKind::Gt(a, b) => self.compare(a, b, env, self_read, |o| o.is_gt()),
            ExprKind::Ge(a, b) => self.compare(a, b, env, self_read, |o| o.is_ge()),
            ExprKind::Eq(a, b) => self.compare(a, b, env, self_read, |o| o.is_eq()),
            ExprKind::Ne(a, b) => self.compare(a, b, env, self_read, |o| o.is_ne()),
            ExprKind::Select {
                cond,
                then_case,
                else_case,
            } => {
                if self.eval_expr(cond, env, self_read)?.as_bool()? {
                    self.eval_expr(then_case, env, self_read)
                } else {
                    self.eval_expr(else_case, env, self_read)
                }
            }
            ExprKind::Let { name, value, body } => {
                let bound = self.eval_expr(value, env, self_read)?;
                let shadowed = env.insert(name.clone(), bound);
                let result = self.eval_expr(body, env, self_read);
                match shadowed {
                    Some(old) => env.insert(name.clone(), old),
                    None => env.remove(name),
                };
                result
            }
            ExprKind::Call {
                name,
                args,
                func,
                call_type,
            } => match call_type {
                CallType::Intrinsic if name.as_str() == "exp" => {
                    let arg = self.eval_expr(&args[0], env, self_read)?.as_f32()?;
                    Ok(Value::F32(arg.exp()))
                }
                CallType::Intrinsic => Err(format!("unknown intrinsic `{name}`")),
                CallType::Function => {
                    let func = func
                        .as_ref()
                        .ok_or_else(|| format!("call to `{name}` has no definition"))?;
                    let mut point = Vec::with_capacity(args.len());
                    for arg in args {
                        point.push(self.eval_expr(arg, env, self_read)?.as_i32()?);
                    }
                    if let Some(ctx) = self_read {
                        if ctx.func == func {
                            if point == ctx.point {
                                return Ok(Value::F32(ctx.acc));
                            }
                            return self.eval_stages(func, ctx.stages, &point).map(Value::F32);
                        }
                    }
                    self.eval_func(func, &point).map(Value::F32)
                }
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn binop(
        &mut self,
        a: &Expr,
        b: &Expr,
        env: &mut Env,
        self_read: Option<&SelfRead>,
        float_op: impl Fn(f32, f32) -> f32,
        int_op: impl Fn(i32, i32) -> Option<i32>,
    ) -> Result<Value, String> {
        let a = self.eval_expr(a, env, self_read)?;
        let b = self.eval_expr(b, env, self_read)?;
        match (a, b) {
            (Value::I32(x), Value::I32(y)) => int_op(x, y)
                .map(Value::I32)
                .ok_or_else(|| "integer division by zero".to_string()),
            _ => Ok(Value::F32(float_op(a.as_f32()?, b.as_f32()?))),
        }
    }

    fn compare(
        &mut self,
        a: &Expr,
        b: &Expr,
        env: &mut Env,
        self_read: Option<&SelfRead>,
        check: impl Fn(std::cmp::Ordering) -> bool,
    ) -> Result<Value, String> {
        let a = self.eval_expr(a, env, self_read)?;
        let b = self.eval_expr(b, env, self_read)?;
        let ordering = match (a, b) {
            (Value::I32(x), Value::I32(y)) => x.cmp(&y),
            _ => a
                .as_f32()?
                .partial_cmp(&b.as_f32()?)
                .ok_or_else(|| "comparison with NaN".to_string())?,
        };
        Ok(Value::Bool(check(ordering)))
    }
}

/// Evaluates a closed integer expression.
pub fn eval_i32(expr: &Expr) -> Result<i32, String> {
    Interp::new().eval_closed(expr)?.as_i32()
}

/// Distinct reduction variables in `expr`, in first-occurrence order.
fn collect_rvars(expr: &Expr) -> Vec<RVar> {
    fn go(expr: &Expr, seen: &mut Vec<RVar>) {
        if let ExprKind::Var {
            rdom: Some(rv), ..
        } = expr.kind()
        {
            if !seen.iter().any(|s| s.name == rv.name) {
                seen.push(rv.clone());
            }
        }
        for child in expr.children() {
            go(&child, seen);
        }
    }
    let mut seen = Vec::new();
    go(expr, &mut seen);
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::helper;
    use crate::rdom::RDom;

    #[test]
    fn test_arithmetic() {
        let mut interp = Interp::new();
        let e = (Expr::from(2.0f32) + 3.0) * 4.0;
        assert_eq!(interp.eval_closed(&e).unwrap(), Value::F32(20.0));
        let e = Expr::from(7) / 2;
        assert_eq!(interp.eval_closed(&e).unwrap(), Value::I32(3));
    }

    #[test]
    fn test_select_and_compare() {
        let mut interp = Interp::new();
        let e = helper::select(helper::le(Expr::from(1), Expr::from(2)), 10.0f32, 20.0f32);
        assert_eq!(interp.eval_closed(&e).unwrap(), Value::F32(10.0));
    }

    #[test]
    fn test_let_shadowing_restores() {
        let mut interp = Interp::new();
        let inner = helper::let_in("t", Expr::from(3), Expr::var("t"));
        let e = helper::let_in("t", Expr::from(1), inner + Expr::var("t"));
        assert_eq!(interp.eval_closed(&e).unwrap(), Value::I32(4));
    }

    #[test]
    fn test_exp() {
        let mut interp = Interp::new();
        let e = helper::exp(Expr::from(0.0f32));
        assert_eq!(interp.eval_closed(&e).unwrap(), Value::F32(1.0));
    }

    #[test]
    fn test_pure_function() {
        let f = Func::new("f");
        f.define(&["x"], Expr::var("x") * 2 + 1);
        let mut interp = Interp::new();
        assert_eq!(interp.eval_func(&f, &[4]).unwrap(), 9.0);
    }

    #[test]
    fn test_update_stage_folds_reduction() {
        // s(x) = 0; s(x) += f(x, r) over r in [0, 4) with f(x, y) = y.
        let f = Func::new("f");
        f.define(&["x", "y"], helper::cast(DType::F32, Expr::var("y")));
        let s = Func::new("s");
        s.define(&["x"], 0.0f32);
        let dom = RDom::new(vec![(0.into(), 4.into())]);
        s.update_add(f.at(&[Expr::var("x"), dom.var(0)]));

        let mut interp = Interp::new();
        assert_eq!(interp.eval_func(&s, &[0]).unwrap(), 0.0 + 1.0 + 2.0 + 3.0);
    }

    #[test]
    fn test_self_read_off_point_uses_previous_stages() {
        // g(x) = x; g(x) += g(0) reads the pure definition at 0.
        let g = Func::new("g");
        g.define(&["x"], helper::cast(DType::F32, Expr::var("x")));
        g.update_add(g.at(&[0.into()]));

        let mut interp = Interp::new();
        assert_eq!(interp.eval_func(&g, &[5]).unwrap(), 5.0);
        assert_eq!(interp.eval_func(&g, &[0]).unwrap(), 0.0);
    }

    #[test]
    fn test_zero_extent_reduction_applies_nothing() {
        let s = Func::new("s");
        s.define(&["x"], 1.0f32);
        let dom = RDom::new(vec![(0.into(), 0.into())]);
        s.update_add(helper::cast(DType::F32, dom.var(0)));

        let mut interp = Interp::new();
        assert_eq!(interp.eval_func(&s, &[3]).unwrap(), 1.0);
    }
}
