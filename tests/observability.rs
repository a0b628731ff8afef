//! Global subscriber installation. Kept in its own test binary so the
//! process-wide subscriber never replaces per-test log capture in the lib tests.

use jeeves_resilience::observability::init_tracing;
use jeeves_resilience::types::ObservabilityConfig;

#[test]
fn test_init_tracing_is_idempotent() {
    let config = ObservabilityConfig {
        log_level: "not a level [".to_string(),
        json_logs: true,
    };
    init_tracing(&config);
    init_tracing(&ObservabilityConfig::default());
    tracing::info!("tracing_initialized");
}
