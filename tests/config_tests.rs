// SPDX-License-Identifier: MPL-2.0

//! Integration tests for configuration module

use k4a_combo::sensor::types::TraceLevel;
use k4a_combo::{ComboMode, SdkConfig, SdkError};
use std::path::PathBuf;

fn temp_config_path() -> PathBuf {
    std::env::temp_dir()
        .join(format!("k4a-combo-config-{}", uuid::Uuid::new_v4()))
        .join("config.json")
}

#[test]
fn test_config_default() {
    // Test that default config can be created
    let config = SdkConfig::default();

    // Check sensible defaults
    assert_eq!(
        config.combo_mode,
        ComboMode::Azure,
        "Only the Azure backend should be initialized by default"
    );
    assert_eq!(config.trace_level, TraceLevel::Off);
    assert!(config.native_lib_root.is_none());
}

#[test]
fn test_native_lib_root_fallback() {
    // Without an explicit root the executable's directory is used
    let config = SdkConfig::default();
    assert!(
        !config.native_lib_root().as_os_str().is_empty(),
        "Fallback library root should not be empty"
    );

    let config = SdkConfig {
        native_lib_root: Some(PathBuf::from("/opt/k4a")),
        ..SdkConfig::default()
    };
    assert_eq!(config.native_lib_root(), PathBuf::from("/opt/k4a"));
}

#[test]
fn test_config_save_and_load() {
    let path = temp_config_path();
    let config = SdkConfig {
        combo_mode: ComboMode::Both,
        native_lib_root: Some(PathBuf::from("/opt/k4a")),
        trace_level: TraceLevel::Warning,
    };

    config.save(&path).expect("Config should be written with its directory");
    let loaded = SdkConfig::load(&path).unwrap();
    assert_eq!(loaded, config);

    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

#[test]
fn test_partial_config_uses_defaults() {
    // Files written by older versions may lack fields
    let path = temp_config_path();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, r#"{ "combo_mode": "Orbbec" }"#).unwrap();

    let loaded = SdkConfig::load(&path).unwrap();
    assert_eq!(loaded.combo_mode, ComboMode::Orbbec);
    assert_eq!(loaded.trace_level, TraceLevel::Off);

    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

#[test]
fn test_invalid_config_is_an_error() {
    let path = temp_config_path();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{ not json").unwrap();

    let err = SdkConfig::load(&path).unwrap_err();
    assert!(matches!(err, SdkError::Config(_)), "got {:?}", err);

    let missing = temp_config_path();
    assert!(matches!(SdkConfig::load(&missing), Err(SdkError::Config(_))));

    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

#[test]
fn test_default_path_location() {
    // Platforms without a config directory have no default path
    if let Some(path) = SdkConfig::default_path() {
        assert!(path.ends_with("k4a-combo/config.json"));
    }
}
