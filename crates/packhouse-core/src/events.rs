// Copyright (c) Packhouse Contributors
// SPDX-License-Identifier: Apache-2.0

//! Optional event emission, per spec.md §4.6 / §9: business logic calls
//! `emit` unconditionally; when no message bus is configured the call is a
//! silent no-op rather than an error.

use serde_json::Value;

pub trait EventSink: Send + Sync {
    fn emit(&self, verb: &str, kind: &str, payload: Value);
}

/// Default sink: nothing is configured, so emission is a no-op.
#[derive(Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _verb: &str, _kind: &str, _payload: Value) {}
}

/// Emits as a structured tracing event, useful for local deployments that
/// have no external message bus but still want events in the log stream.
#[derive(Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, verb: &str, kind: &str, payload: Value) {
        tracing::info!(verb, kind, %payload, "event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sink_does_not_panic() {
        NullSink.emit("accept", "source", serde_json::json!({"name": "hello"}));
    }
}
