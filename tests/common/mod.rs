//! Common test utilities for derivative integration tests

pub const EPSILON: f32 = 1e-5;

pub fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
