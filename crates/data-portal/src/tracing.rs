//! # Observability & Tracing
//!
//! The data portal logs through the `tracing` crate. Every top-level
//! operation (`create`, `fetch_with`, `save`, `execute_with` and their
//! collection counterparts) opens a span carrying the model name, so child
//! cascades show up nested under the call that started them.
//!
//! | Level | What |
//! |-------|------|
//! | `info` | completed operations with `model`, `operation`, `state` |
//! | `warn` | rollbacks, failed closes, denials under `NoAccessBehavior::Warn` |
//! | `debug` | DAO calls with their arguments, skipped saves, validation failures |
//! | `trace` | child changes propagated to parents |
//!
//! ```bash
//! RUST_LOG=info cargo run -p portal-sample
//! RUST_LOG=data_portal=debug cargo run -p portal-sample
//! ```
//!
//! With `RUST_LOG=info` a save of an order with one new item reads:
//!
//! ```text
//! INFO save{model=BlanketOrder}: Saved model=BlanketOrder operation=update state=Some(Pristine)
//! ```

/// Installs a compact `fmt` subscriber filtered by `RUST_LOG`. Module paths
/// are hidden; the `model` field says where a line comes from.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
