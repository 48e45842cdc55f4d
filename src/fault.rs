//! Latency and failure injection, applied before any rule evaluation.

use crate::model::MockDefinition;
use serde_json::{json, Value};
use tracing::info;

/// Generic body served when the probabilistic fault trips.
pub fn injected_fault_body() -> Value {
    json!({
        "status": "error",
        "code": "INJECTED_FAULT",
        "message": "Randomly simulated server error",
    })
}

/// Sleep the configured latency, then draw against `fail_rate`.
///
/// Returns `true` when the request must short-circuit to a fixed 500
/// before any matching or synthesis happens. The sleep suspends only this
/// request; other requests keep being served.
pub async fn apply(mock: &MockDefinition) -> bool {
    if mock.latency > 0 {
        tokio::time::sleep(tokio::time::Duration::from_millis(mock.latency)).await;
    }

    if mock.fail_rate > 0 {
        let draw = {
            use rand::Rng;
            rand::thread_rng().gen_range(0..100u8)
        };
        if draw < mock.fail_rate {
            info!(
                mock = %mock.id,
                method = %mock.method,
                path = %mock.path,
                "injected fault"
            );
            return true;
        }
    }

    false
}
