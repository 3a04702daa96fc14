// ABOUTME: Tests for the BackendRegistry and BackendFactory pattern.
// ABOUTME: Validates runtime backend selection and creation.

use raduno_llm::backends::mock::MockBackend;
use raduno_llm::registry::{BackendFactory, BackendRegistry};
use raduno_llm::SharedBackend;
use serde_json::json;

#[test]
fn test_registry_creates_mock_backend() {
    let registry = BackendRegistry::default();
    let backend = registry.create("mock", &json!({})).unwrap();
    assert_eq!(backend.name(), "mock");
}

#[test]
fn test_registry_creates_openai_backend() {
    let registry = BackendRegistry::default();
    let config = json!({
        "api_key": "sk-test",
        "model": "gpt-4o-mini"
    });
    let backend = registry.create("openai", &config).unwrap();
    assert_eq!(backend.name(), "openai");
}

#[test]
fn test_registry_openai_without_key_errors() {
    let registry = BackendRegistry::default();
    assert!(registry.create("openai", &json!({})).is_err());
}

#[test]
fn test_registry_lists_available_backends() {
    let registry = BackendRegistry::default();
    assert_eq!(registry.available(), vec!["mock", "openai"]);
}

#[test]
fn test_registry_unknown_backend_errors() {
    let registry = BackendRegistry::default();
    match registry.create("nonexistent", &json!({})) {
        Err(err) => assert!(err
            .to_string()
            .contains("Unknown completion backend: nonexistent")),
        Ok(_) => panic!("Expected error for unknown backend"),
    }
}

#[test]
fn test_registry_custom_factory() {
    let factory: BackendFactory = Box::new(|_config| {
        let backend: SharedBackend = MockBackend::new()
            .on_prompt("ping")
            .respond_text("pong")
            .shared();
        Ok(backend)
    });

    let registry = BackendRegistry::new().register("custom", factory);
    let backend = registry.create("custom", &json!({})).unwrap();
    assert_eq!(backend.name(), "mock");
    assert_eq!(registry.available(), vec!["custom"]);
}
