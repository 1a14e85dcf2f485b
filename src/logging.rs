//! Logging utilities for the ekman engine.
//!
//! Structured logging helpers so sampling sessions and layer actions can
//! be traced through the host application's logs.

use tracing::debug;
use uuid::Uuid;

/// Initialize the tracing subscriber with the given log level
pub fn init_tracing(log_level: &str) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(val) => val,
        Err(_) => log_level.to_string(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Log progress of a sampling session
pub fn log_session_progress(session_id: &str, current: usize, total: usize) {
    debug!(
        session_id = session_id,
        current = current,
        total = total,
        "Sampling session progress"
    );
}

/// Generate a unique session ID
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}
