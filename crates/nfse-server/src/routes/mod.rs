//! Route handlers

pub mod decode;
pub mod persist;
pub mod reconcile;

/// Liveness check.
pub async fn health() -> &'static str {
    "OK"
}
