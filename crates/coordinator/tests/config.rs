use std::sync::Arc;

use floe_coordinator::config::Settings;
use floe_coordinator::{AdHocCoordinator, CoordinatorError};
use floe_engine::testing::MockEngine;
use floe_engine::ExecutionEngine;

fn mock_engines(count: usize) -> Vec<Arc<dyn ExecutionEngine>> {
    (0..count)
        .map(|_| Arc::new(MockEngine::new()) as Arc<dyn ExecutionEngine>)
        .collect()
}

// Environment variables are process-wide, so everything touching them
// stays in this one test.
#[test]
fn settings_layer_defaults_and_environment() {
    std::env::set_var("FLOE_COORDINATOR_CONFIG_PATH", "/nonexistent/floe.toml");
    std::env::remove_var("FLOE_COORDINATOR__PARTITION_COUNT");
    std::env::remove_var("FLOE_COORDINATOR__DELEGATED_BACKEND");

    let settings = Settings::new().unwrap();
    assert_eq!(settings.partition_count, 1);
    assert!(!settings.delegated_backend);
    assert_eq!(settings.topology().unwrap().partition_count(), 1);

    std::env::set_var("FLOE_COORDINATOR__PARTITION_COUNT", "3");
    let settings = Settings::new().unwrap();
    assert_eq!(settings.partition_count, 3);

    assert!(AdHocCoordinator::from_env(mock_engines(3), None).is_ok());

    // Enabling the delegated backend without supplying one is refused.
    std::env::set_var("FLOE_COORDINATOR__DELEGATED_BACKEND", "true");
    let err = AdHocCoordinator::from_env(mock_engines(3), None).unwrap_err();
    assert!(matches!(err, CoordinatorError::Internal(_)));

    // A zero-partition override fails topology validation.
    std::env::remove_var("FLOE_COORDINATOR__DELEGATED_BACKEND");
    std::env::set_var("FLOE_COORDINATOR__PARTITION_COUNT", "0");
    let err = AdHocCoordinator::from_env(mock_engines(0), None).unwrap_err();
    assert!(matches!(err, CoordinatorError::Statement(_)));

    std::env::remove_var("FLOE_COORDINATOR__PARTITION_COUNT");
    std::env::remove_var("FLOE_COORDINATOR_CONFIG_PATH");
}
