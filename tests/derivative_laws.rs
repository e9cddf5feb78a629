//! Structural invariants and algebraic laws of the differentiation pass.

mod common;

use common::{approx_eq, init_logging};
use reverb::interp::Interp;
use reverb::{propagate_adjoints, DerivativeError, Expr, Func};

#[test]
fn test_one_adjoint_per_reachable_function() {
    init_logging();

    let f = Func::new("f");
    f.define(&["x"], 2.0f32);
    let g = Func::new("g");
    g.define(&["x"], f.at(&[Expr::var("x")]));
    // h is never read by the output.
    let h = Func::new("h");
    h.define(&["x"], 9.0f32);
    let out = Func::new("out");
    out.define(&["x"], g.at(&[Expr::var("x")]));

    let adjoints = propagate_adjoints(&out.at(&[0.into()])).unwrap();

    let mut names: Vec<&str> = adjoints.keys().map(|k| k.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, ["f", "g", "out"]);
}

#[test]
fn test_adjoint_shares_the_primal_argument_list() {
    init_logging();

    let f = Func::new("f");
    f.define(&["x", "y"], 1.0f32);
    let out = Func::new("out");
    out.define(&["u"], f.at(&[Expr::var("u"), Expr::var("u")]));

    let adjoints = propagate_adjoints(&out.at(&[0.into()])).unwrap();
    assert_eq!(adjoints["f"].args(), f.args());
    assert_eq!(adjoints["out"].args(), out.args());
}

#[test]
fn test_output_adjoint_is_the_identity_seed() {
    init_logging();

    let f = Func::new("f");
    f.define(&["x"], 2.0f32);
    let out = Func::new("out");
    out.define(&["x"], f.at(&[Expr::var("x")]) * 3.0);

    let adjoints = propagate_adjoints(&out.at(&[0.into()])).unwrap();

    let mut interp = Interp::new();
    assert!(approx_eq(
        interp.eval_func(&adjoints["out"], &[0]).unwrap(),
        1.0
    ));
}

#[test]
fn test_linearity() {
    init_logging();

    // out = 2*a(0) + 3*b(0): adjoints are the scale factors.
    let a = Func::new("a");
    a.define(&["x"], 5.0f32);
    let b = Func::new("b");
    b.define(&["x"], 7.0f32);
    let output = a.at(&[0.into()]) * 2.0 + b.at(&[0.into()]) * 3.0;

    let adjoints = propagate_adjoints(&output).unwrap();

    let mut interp = Interp::new();
    assert!(approx_eq(interp.eval_func(&adjoints["a"], &[0]).unwrap(), 2.0));
    assert!(approx_eq(interp.eval_func(&adjoints["b"], &[0]).unwrap(), 3.0));
}

#[test]
fn test_chain_rule() {
    init_logging();

    // h(x) = f(x) * f(x): d h / d f(0) = 2 * f(0).
    let f = Func::new("f");
    f.define(&["x"], 5.0f32);
    let h = Func::new("h");
    h.define(&["x"], f.at(&[Expr::var("x")]) * f.at(&[Expr::var("x")]));

    let adjoints = propagate_adjoints(&h.at(&[0.into()])).unwrap();

    let mut interp = Interp::new();
    assert!(approx_eq(interp.eval_func(&adjoints["f"], &[0]).unwrap(), 10.0));
}

#[test]
fn test_shared_node_adjoints_accumulate() {
    init_logging();

    // The same call node reused under two parents sums its contributions.
    let f = Func::new("f");
    f.define(&["x"], 4.0f32);
    let read = f.at(&[0.into()]);
    let output = &read * &read;

    let adjoints = propagate_adjoints(&output).unwrap();

    let mut interp = Interp::new();
    assert!(approx_eq(interp.eval_func(&adjoints["f"], &[0]).unwrap(), 8.0));
}

#[test]
fn test_reinvocation_is_idempotent() {
    init_logging();

    let f = Func::new("f");
    f.define(&["x"], 2.0f32);
    let out = Func::new("out");
    out.define(&["x"], f.at(&[Expr::var("x") + 1]) * 3.0);
    let output = out.at(&[0.into()]);

    let first = propagate_adjoints(&output).unwrap();
    let second = propagate_adjoints(&output).unwrap();

    let mut first_keys: Vec<&String> = first.keys().collect();
    let mut second_keys: Vec<&String> = second.keys().collect();
    first_keys.sort_unstable();
    second_keys.sort_unstable();
    assert_eq!(first_keys, second_keys);

    let mut interp = Interp::new();
    for key in first_keys {
        assert_eq!(
            first[key].num_update_definitions(),
            second[key].num_update_definitions()
        );
        assert_eq!(first[key].name(), second[key].name());
        let a = interp.eval_func(&first[key], &[1]).unwrap();
        let b = interp.eval_func(&second[key], &[1]).unwrap();
        assert!(approx_eq(a, b));
    }
}

#[test]
fn test_no_functions_yields_an_empty_map() {
    init_logging();

    let output = Expr::from(2.0f32) * 3.0;
    let adjoints = propagate_adjoints(&output).unwrap();
    assert!(adjoints.is_empty());
}

#[test]
fn test_unsupported_index_shape_is_fatal() {
    init_logging();

    let f = Func::new("f");
    f.define(&["x"], 1.0f32);
    let out = Func::new("out");
    out.define(&["x"], f.at(&[Expr::var("x") * 2]));

    let err = propagate_adjoints(&out.at(&[0.into()])).unwrap_err();
    assert!(matches!(err, DerivativeError::UnsupportedBoundsExpr { .. }));
}

#[test]
fn test_uninvertible_argument_is_fatal() {
    init_logging();

    let f = Func::new("f");
    f.define(&["x"], 1.0f32);
    let x = Expr::var("x");
    let out = Func::new("out");
    out.define(&["x"], f.at(&[&x + &x]));

    let err = propagate_adjoints(&out.at(&[0.into()])).unwrap_err();
    assert!(matches!(err, DerivativeError::UninvertibleArg { .. }));
}
