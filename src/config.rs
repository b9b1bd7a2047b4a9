// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Environment configuration.
//!
//! One immutable record per inference session, loaded from TOML. Model
//! dimensions default to 0 and are then taken from the preset named by
//! `model_type`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::sharding::AxisRule;
use crate::tensor::DType;

/// Errors for loading and validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown model type '{0}': set num_layers, num_kv_heads and head_dim explicitly")]
    UnknownModel(String),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Layer count and attention geometry for a model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelDims {
    pub num_layers: usize,
    pub num_kv_heads: usize,
    pub head_dim: usize,
}

/// Known model presets, by `model_type`.
pub fn model_preset(model_type: &str) -> Option<ModelDims> {
    let (num_layers, num_kv_heads, head_dim) = match model_type {
        "llama-2-7b" => (32, 32, 128),
        "llama-2-13b" => (40, 40, 128),
        "llama-2-70b" => (80, 8, 128),
        "gemma-2b" => (18, 1, 256),
        "gemma-7b" => (28, 16, 256),
        _ => return None,
    };
    Some(ModelDims {
        num_layers,
        num_kv_heads,
        head_dim,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub model_type: String,
    pub max_input_sequence_length: usize,
    pub max_decode_length: usize,
    pub batch_size: usize,
    /// Positions per cache buffer.
    pub cache_sequence_length: usize,

    /// 0 means take it from the model preset.
    pub num_layers: usize,
    pub num_kv_heads: usize,
    pub head_dim: usize,
    /// Explicit `(batch, heads, capacity, head_dim)`; empty derives it.
    pub cache_shape: Vec<usize>,

    /// Names of the cache axes, in order.
    pub attention_kv_axis_names: Vec<String>,
    /// Axis name sharded across devices unless `shard_on_batch` is set.
    pub kv_cache_shard_axis: String,
    pub shard_on_batch: bool,

    pub enable_weight_quantization: bool,
    pub enable_kv_quantization: bool,
    pub bf16_enable: bool,
    pub qkv_fusion: bool,

    pub device_count: usize,

    /// Weight sharding rules layered over the rules document.
    pub sharding_overrides: BTreeMap<String, AxisRule>,
    /// Optional `.toml` or `.json` rules document.
    pub sharding_config_path: Option<PathBuf>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            model_type: "llama-2-13b".to_string(),
            max_input_sequence_length: 1024,
            max_decode_length: 1024,
            batch_size: 32,
            cache_sequence_length: 2048,
            num_layers: 0,
            num_kv_heads: 0,
            head_dim: 0,
            cache_shape: Vec::new(),
            attention_kv_axis_names: ["batch", "num_attn_heads", "sequence_length", "head_dim"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            kv_cache_shard_axis: "num_attn_heads".to_string(),
            shard_on_batch: false,
            enable_weight_quantization: false,
            enable_kv_quantization: false,
            bf16_enable: true,
            qkv_fusion: false,
            device_count: 1,
            sharding_overrides: BTreeMap::new(),
            sharding_config_path: None,
        }
    }
}

impl EnvironmentConfig {
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(document)?)
    }

    /// Load from a TOML file. A relative `sharding_config_path` is taken
    /// relative to the config file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let document = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&document)?;
        if let (Some(rules), Some(dir)) = (&config.sharding_config_path, path.parent()) {
            if rules.is_relative() {
                config.sharding_config_path = Some(dir.join(rules));
            }
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("batch_size", self.batch_size),
            ("cache_sequence_length", self.cache_sequence_length),
            ("device_count", self.device_count),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidField {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.attention_kv_axis_names.is_empty() {
            return Err(ConfigError::InvalidField {
                field: "attention_kv_axis_names",
                reason: "must name at least one axis".to_string(),
            });
        }
        if self.cache_shape.iter().any(|&d| d == 0) {
            return Err(ConfigError::InvalidField {
                field: "cache_shape",
                reason: format!("zero extent in {:?}", self.cache_shape),
            });
        }
        self.model_dims()?;
        Ok(())
    }

    /// Dtype of wide cache buffers and int8 scales.
    pub fn wide_dtype(&self) -> DType {
        if self.bf16_enable {
            DType::Bf16
        } else {
            DType::F32
        }
    }

    /// Model dims: explicit fields first, then an explicit `cache_shape`,
    /// then the preset for `model_type`.
    pub fn model_dims(&self) -> Result<ModelDims, ConfigError> {
        let preset = model_preset(&self.model_type);
        let pick = |explicit: usize, shape_axis: Option<usize>, preset: Option<usize>| {
            Some(explicit)
                .filter(|&v| v > 0)
                .or_else(|| shape_axis.and_then(|axis| self.cache_shape.get(axis).copied()))
                .or(preset)
        };

        let num_layers = pick(self.num_layers, None, preset.map(|p| p.num_layers));
        let num_kv_heads = pick(self.num_kv_heads, Some(1), preset.map(|p| p.num_kv_heads));
        let head_dim = pick(self.head_dim, Some(3), preset.map(|p| p.head_dim));

        match (num_layers, num_kv_heads, head_dim) {
            (Some(num_layers), Some(num_kv_heads), Some(head_dim)) => Ok(ModelDims {
                num_layers,
                num_kv_heads,
                head_dim,
            }),
            _ => Err(ConfigError::UnknownModel(self.model_type.clone())),
        }
    }

    /// The explicit `cache_shape`, or `(batch_size, num_kv_heads,
    /// cache_sequence_length, head_dim)`.
    pub fn resolved_cache_shape(&self) -> Result<Vec<usize>, ConfigError> {
        if !self.cache_shape.is_empty() {
            return Ok(self.cache_shape.clone());
        }
        let dims = self.model_dims()?;
        Ok(vec![
            self.batch_size,
            dims.num_kv_heads,
            self.cache_sequence_length,
            dims.head_dim,
        ])
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
