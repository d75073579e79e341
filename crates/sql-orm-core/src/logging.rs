// SPDX-FileCopyrightText: 2025-2026 The sql-orm authors
// SPDX-License-Identifier: MIT

//! Tracing-backed statement logging (spec §6's `Database::log_factory` and
//! the `trace_before_execute`/`trace_after_execute` observable events).

use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use crate::codec::Value;

/// Install a process-wide [`tracing_subscriber`] fmt layer at the given
/// maximum verbosity. Idempotent: a second call is a no-op if a global
/// subscriber is already set.
pub fn log_factory(level: tracing::Level) {
    let subscriber = tracing_subscriber::fmt().with_max_level(level).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Fired immediately before a statement is handed to the driver.
pub fn trace_before_execute(command_text: &str, parameters: &[Value]) -> Instant {
    trace!(command = command_text, param_count = parameters.len(), "before execute");
    Instant::now()
}

/// Fired immediately after a statement returns, successfully or not.
pub fn trace_after_execute(command_text: &str, started: Instant, outcome: Result<(), &str>) {
    let elapsed = started.elapsed();
    match outcome {
        Ok(()) => debug!(command = command_text, elapsed_us = elapsed.as_micros(), "after execute"),
        Err(cause) => {
            debug!(command = command_text, elapsed_us = elapsed.as_micros(), cause, "after execute (failed)")
        }
    }
}

/// Logged by the schema engine at `info` level before each DDL statement.
pub fn trace_ddl(statement: &str) {
    info!(statement, "applying schema change");
}

/// `true` if `elapsed` exceeds a slow-statement threshold worth a warning.
/// Exposed for callers that want to surface this as their own metric;
/// the core itself does not invent timeouts (spec §5).
pub fn is_slow(elapsed: Duration, threshold: Duration) -> bool {
    elapsed >= threshold
}
