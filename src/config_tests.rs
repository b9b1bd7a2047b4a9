// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;

use super::*;

#[test]
fn test_defaults() {
    let config = EnvironmentConfig::default();
    assert_eq!(config.max_input_sequence_length, 1024);
    assert_eq!(config.max_decode_length, 1024);
    assert_eq!(config.batch_size, 32);
    assert_eq!(config.cache_sequence_length, 2048);
    assert_eq!(config.model_type, "llama-2-13b");
    assert_eq!(config.kv_cache_shard_axis, "num_attn_heads");
    assert_eq!(config.attention_kv_axis_names.len(), 4);
    assert!(config.bf16_enable);
    assert!(!config.enable_kv_quantization);
    assert!(config.validate().is_ok());
    assert_eq!(config.wide_dtype(), DType::Bf16);
}

#[test]
fn test_default_cache_shape_from_preset() {
    let config = EnvironmentConfig::default();
    assert_eq!(config.resolved_cache_shape().unwrap(), vec![32, 40, 2048, 128]);
    assert_eq!(config.model_dims().unwrap().num_layers, 40);
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let config = EnvironmentConfig::from_toml_str(
        r#"
        model_type = "gemma-2b"
        batch_size = 4
        bf16_enable = false

        [sharding_overrides]
        "layers.*.attention.wq.weight" = 0
        "norm.weight" = -1
        "#,
    )
    .unwrap();

    assert_eq!(config.batch_size, 4);
    assert_eq!(config.cache_sequence_length, 2048);
    assert_eq!(config.wide_dtype(), DType::F32);
    assert_eq!(config.resolved_cache_shape().unwrap(), vec![4, 1, 2048, 256]);
    assert_eq!(
        config.sharding_overrides.get("norm.weight"),
        Some(&AxisRule::Replicated)
    );
    assert_eq!(
        config.sharding_overrides.get("layers.*.attention.wq.weight"),
        Some(&AxisRule::Axis(0))
    );
}

#[test]
fn test_override_axis_past_max_rejected() {
    let result = EnvironmentConfig::from_toml_str(
        r#"
        [sharding_overrides]
        "w" = 9223372036854775807
        "#,
    );
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn test_explicit_dims_override_preset() {
    let config = EnvironmentConfig {
        num_layers: 2,
        head_dim: 64,
        ..Default::default()
    };
    let dims = config.model_dims().unwrap();
    assert_eq!(dims.num_layers, 2);
    assert_eq!(dims.num_kv_heads, 40);
    assert_eq!(dims.head_dim, 64);
}

#[test]
fn test_unknown_model_needs_dims() {
    let config = EnvironmentConfig {
        model_type: "mystery-1b".to_string(),
        ..Default::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::UnknownModel(_))));

    let config = EnvironmentConfig {
        num_layers: 4,
        num_kv_heads: 2,
        head_dim: 8,
        ..config
    };
    assert!(config.validate().is_ok());
}

#[test]
fn test_explicit_cache_shape() {
    let config = EnvironmentConfig {
        model_type: "custom".to_string(),
        num_layers: 3,
        cache_shape: vec![1, 2, 16, 8],
        ..Default::default()
    };
    assert!(config.validate().is_ok());
    assert_eq!(config.resolved_cache_shape().unwrap(), vec![1, 2, 16, 8]);
}

#[test]
fn test_validate_rejects_zero_fields() {
    for config in [
        EnvironmentConfig {
            batch_size: 0,
            ..Default::default()
        },
        EnvironmentConfig {
            cache_sequence_length: 0,
            ..Default::default()
        },
        EnvironmentConfig {
            device_count: 0,
            ..Default::default()
        },
        EnvironmentConfig {
            cache_shape: vec![1, 0, 4, 4],
            ..Default::default()
        },
    ] {
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidField { .. })
        ));
    }
}

#[test]
fn test_from_file_resolves_rules_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("env.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "sharding_config_path = \"rules.json\"").unwrap();

    let config = EnvironmentConfig::from_file(&path).unwrap();
    assert_eq!(config.sharding_config_path, Some(dir.path().join("rules.json")));
}

#[test]
fn test_from_file_errors() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.toml");
    assert!(matches!(
        EnvironmentConfig::from_file(&missing),
        Err(ConfigError::Io { .. })
    ));

    assert!(matches!(
        EnvironmentConfig::from_toml_str("batch_size = \"many\""),
        Err(ConfigError::Parse(_))
    ));
}
