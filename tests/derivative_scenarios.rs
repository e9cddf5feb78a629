//! End-to-end differentiation scenarios: build a small pipeline, propagate
//! adjoints, and evaluate the returned adjoint functions numerically.

mod common;

use common::{approx_eq, init_logging};
use reverb::ast::helper::{cast, exp, let_in, max};
use reverb::interp::Interp;
use reverb::{propagate_adjoints, DType, Expr, ExprKind, Func, RDom};

#[test]
fn test_elementwise_multiply() {
    init_logging();

    let f = Func::new("f");
    f.define(&["x"], 2.0f32);
    let g = Func::new("g");
    g.define(&["x"], 3.0f32);
    let out = Func::new("out");
    out.define(&["x"], f.at(&[Expr::var("x")]) * g.at(&[Expr::var("x")]));

    let adjoints = propagate_adjoints(&out.at(&[0.into()])).unwrap();
    assert_eq!(adjoints.len(), 3);

    let mut interp = Interp::new();
    assert!(approx_eq(interp.eval_func(&adjoints["f"], &[0]).unwrap(), 3.0));
    assert!(approx_eq(interp.eval_func(&adjoints["g"], &[0]).unwrap(), 2.0));
}

#[test]
fn test_shifted_read_inverts_the_index() {
    init_logging();

    // out(x) = f(x + 1): the unit adjoint lands at x = 1 via x - 1.
    let f = Func::new("f");
    f.define(&["x"], cast(DType::F32, Expr::var("x")));
    let out = Func::new("out");
    out.define(&["x"], f.at(&[Expr::var("x") + 1]));

    let adjoints = propagate_adjoints(&out.at(&[0.into()])).unwrap();

    let mut interp = Interp::new();
    assert!(approx_eq(interp.eval_func(&adjoints["f"], &[1]).unwrap(), 1.0));
}

#[test]
fn test_reduction_over_callee_axis() {
    init_logging();

    // out(x) = sum over y in [0, 4) of f(x, y).
    let f = Func::new("f");
    f.define(&["x", "y"], 1.0f32);
    let out = Func::new("out");
    out.define(&["x"], 0.0f32);
    let dom = RDom::new(vec![(0.into(), 4.into())]);
    out.update_add(f.at(&[Expr::var("x"), dom.var(0)]));

    let adjoints = propagate_adjoints(&out.at(&[0.into()])).unwrap();
    assert_eq!(adjoints.len(), 2);

    let mut interp = Interp::new();
    for y in 0..4 {
        assert!(approx_eq(
            interp.eval_func(&adjoints["f"], &[0, y]).unwrap(),
            1.0
        ));
    }
}

#[test]
fn test_max_subgradient() {
    init_logging();

    let a = Func::new("a");
    a.define(&["x"], 1.0f32);
    let b = Func::new("b");
    b.define(&["x"], 2.0f32);
    let output = max(a.at(&[0.into()]), b.at(&[0.into()]));

    let adjoints = propagate_adjoints(&output).unwrap();

    let mut interp = Interp::new();
    assert!(approx_eq(interp.eval_func(&adjoints["a"], &[0]).unwrap(), 0.0));
    assert!(approx_eq(interp.eval_func(&adjoints["b"], &[0]).unwrap(), 1.0));
}

#[test]
fn test_divide() {
    init_logging();

    let a = Func::new("a");
    a.define(&["x"], 6.0f32);
    let b = Func::new("b");
    b.define(&["x"], 3.0f32);
    let output = a.at(&[0.into()]) / b.at(&[0.into()]);

    let adjoints = propagate_adjoints(&output).unwrap();

    let mut interp = Interp::new();
    assert!(approx_eq(
        interp.eval_func(&adjoints["a"], &[0]).unwrap(),
        1.0 / 3.0
    ));
    assert!(approx_eq(
        interp.eval_func(&adjoints["b"], &[0]).unwrap(),
        -2.0 / 3.0
    ));
}

#[test]
fn test_let_binding() {
    init_logging();

    // out = let t = a(0) in t * t, so d out / d a(0) = 2 * a(0).
    let a = Func::new("a");
    a.define(&["x"], 4.0f32);
    let t = Expr::var("t").with_type(DType::F32);
    let output = let_in("t", a.at(&[0.into()]), &t * &t);

    let adjoints = propagate_adjoints(&output).unwrap();

    let mut interp = Interp::new();
    assert!(approx_eq(interp.eval_func(&adjoints["a"], &[0]).unwrap(), 8.0));

    // The emitted adjoint keeps a let binding around the contribution.
    assert!(adjoint_dag_contains_let(&adjoints["a"]));
}

#[test]
fn test_reduction_weighted_read() {
    init_logging();

    // out(x) = sum over r in [0, 2) of f(r) * g(x).
    let f = Func::new("f");
    f.define(&["x"], 2.0f32);
    let g = Func::new("g");
    g.define(&["x"], 3.0f32);
    let out = Func::new("out");
    out.define(&["x"], 0.0f32);
    let dom = RDom::new(vec![(0.into(), 2.into())]);
    out.update_add(f.at(&[dom.var(0)]) * g.at(&[Expr::var("x")]));

    let adjoints = propagate_adjoints(&out.at(&[0.into()])).unwrap();

    // The adjoint of g keeps the primal's reduction: sum over r of f(r).
    let mut interp = Interp::new();
    assert!(approx_eq(interp.eval_func(&adjoints["g"], &[0]).unwrap(), 4.0));

    // f was read at a reduction variable, so f's adjoint sums the caller's
    // own iteration variable over the caller's range: a promoted reduction
    // variable must appear in f's adjoint DAG.
    assert!(adjoint_dag_contains_rvar(&adjoints["f"]));
}

#[test]
fn test_exp() {
    init_logging();

    let a = Func::new("a");
    a.define(&["x"], 1.0f32);
    let output = exp(a.at(&[0.into()]));

    let adjoints = propagate_adjoints(&output).unwrap();

    let mut interp = Interp::new();
    assert!(approx_eq(
        interp.eval_func(&adjoints["a"], &[0]).unwrap(),
        1.0f32.exp()
    ));
}

/// Searches every function reachable from `func` (following call handles by
/// identity, so staging generations sharing a name are all visited) for a
/// right-hand-side node matching `pred`.
fn adjoint_dag_contains(func: &Func, pred: &dyn Fn(&Expr) -> bool) -> bool {
    fn visit_func(func: &Func, pred: &dyn Fn(&Expr) -> bool, seen: &mut Vec<usize>) -> bool {
        if seen.contains(&func.id()) {
            return false;
        }
        seen.push(func.id());
        let mut values: Vec<Expr> = func.value().into_iter().collect();
        values.extend((0..func.num_update_definitions()).map(|i| func.update_value(i)));
        values.iter().any(|v| visit_expr(v, pred, seen))
    }

    fn visit_expr(expr: &Expr, pred: &dyn Fn(&Expr) -> bool, seen: &mut Vec<usize>) -> bool {
        if pred(expr) {
            return true;
        }
        if let ExprKind::Call {
            func: Some(callee), ..
        } = expr.kind()
        {
            if visit_func(callee, pred, seen) {
                return true;
            }
        }
        expr.children().iter().any(|c| visit_expr(c, pred, seen))
    }

    visit_func(func, pred, &mut Vec::new())
}

fn adjoint_dag_contains_let(func: &Func) -> bool {
    adjoint_dag_contains(func, &|e| matches!(e.kind(), ExprKind::Let { .. }))
}

fn adjoint_dag_contains_rvar(func: &Func) -> bool {
    adjoint_dag_contains(func, &|e| {
        matches!(e.kind(), ExprKind::Var { rdom: Some(_), .. })
    })
}
