// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Environment construction and sharding resolution.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::EnvironmentError;
use crate::config::EnvironmentConfig;
use crate::memory::CacheShape;
use crate::sharding::{AxisRule, DeviceMesh, ShardedTensor, ShardingError, ShardingRules, ShardingSpec};

/// Everything one inference session needs to lay out its caches and weights.
///
/// Built once from an [`EnvironmentConfig`] and read-only afterwards, so it
/// can be shared freely between threads.
#[derive(Debug, Clone)]
pub struct Environment {
    pub(super) config: EnvironmentConfig,
    pub(super) mesh: Arc<DeviceMesh>,
    pub(super) cache_shape: CacheShape,
    pub(super) cache_sharding: ShardingSpec,
    pub(super) num_layers: usize,
    rules: ShardingRules,
}

impl Environment {
    /// Validate `config`, build the device mesh, resolve the cache shard
    /// axis and load weight sharding rules.
    ///
    /// Fails on an unknown shard axis name, an axis list that does not match
    /// the cache rank, an unreadable rules document, or a rule naming an
    /// axis past [`MAX_AXIS`](crate::sharding::MAX_AXIS).
    pub fn new(config: EnvironmentConfig) -> Result<Self, EnvironmentError> {
        config.validate()?;
        let dims = config.model_dims()?;
        let shape = config.resolved_cache_shape()?;

        let names = &config.attention_kv_axis_names;
        if names.len() != shape.len() {
            return Err(EnvironmentError::AxisRankMismatch {
                names: names.len(),
                rank: shape.len(),
            });
        }
        let cache_shape = CacheShape::from_dims(&shape)?;
        if cache_shape.batch != config.batch_size {
            return Err(EnvironmentError::BatchMismatch {
                batch_size: config.batch_size,
                cache_batch: cache_shape.batch,
            });
        }

        let mesh = Arc::new(DeviceMesh::new(config.device_count)?);
        let axis = resolve_cache_axis(&config, &shape)?;
        let cache_sharding = ShardingSpec::by_axis(mesh.clone(), Some(axis));
        if !cache_sharding.divides_evenly(&shape) {
            warn!(
                axis,
                extent = shape[axis],
                devices = mesh.device_count(),
                "cache axis does not divide evenly across devices"
            );
        }

        let mut rules = match &config.sharding_config_path {
            Some(path) => ShardingRules::from_file(path)?,
            None => ShardingRules::new(),
        };
        rules.merge(&config.sharding_overrides);
        rules.validate()?;

        info!(
            devices = mesh.device_count(),
            cache_shape = ?shape,
            cache_axis = axis,
            layers = dims.num_layers,
            rules = rules.len(),
            "environment ready"
        );

        Ok(Self {
            num_layers: dims.num_layers,
            config,
            mesh,
            cache_shape,
            cache_sharding,
            rules,
        })
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    pub fn mesh(&self) -> &Arc<DeviceMesh> {
        &self.mesh
    }

    pub fn cache_shape(&self) -> CacheShape {
        self.cache_shape
    }

    pub fn cache_sharding(&self) -> &ShardingSpec {
        &self.cache_sharding
    }

    /// Axis of the cache buffers partitioned across devices.
    pub fn cache_sharding_axis(&self) -> usize {
        // Always set by `new`.
        self.cache_sharding.sharded_axis().unwrap_or(0)
    }

    pub fn num_layers(&self) -> usize {
        self.num_layers
    }

    /// Prompt length the session was configured for.
    pub fn seq_len(&self) -> usize {
        self.config.max_input_sequence_length
    }

    pub fn rules(&self) -> &ShardingRules {
        &self.rules
    }

    /// Axis 0 partitioned along `x`.
    pub fn x_sharding(&self) -> ShardingSpec {
        self.sharding_by_axis(Some(0))
    }

    /// Axis 1 partitioned along `x`.
    pub fn y_sharding(&self) -> ShardingSpec {
        self.sharding_by_axis(Some(1))
    }

    pub fn replicated(&self) -> ShardingSpec {
        self.sharding_by_axis(None)
    }

    /// `None` replicates; `Some(axis)` partitions that axis along `x`.
    pub fn sharding_by_axis(&self, axis: Option<usize>) -> ShardingSpec {
        ShardingSpec::by_axis(self.mesh.clone(), axis)
    }

    pub fn sharding_by_rule(&self, rule: AxisRule) -> ShardingSpec {
        self.sharding_by_axis(rule.axis())
    }

    /// Sharding for a weight tensor, looked up by name.
    ///
    /// In batch-sharding mode every weight shards axis 0. Otherwise the
    /// literal name is tried first, then the name with numeric segments
    /// replaced by `*`. No rule is an error.
    pub fn sharding_by_name(&self, name: &str) -> Result<ShardingSpec, ShardingError> {
        if self.config.shard_on_batch {
            return Ok(self.sharding_by_axis(Some(0)));
        }
        let rule = self.rules.resolve(name)?;
        debug!(name, ?rule, "resolved weight sharding");
        Ok(self.sharding_by_rule(rule))
    }

    /// Resolve every name up front, failing on the first without a rule.
    pub fn resolve_weight_shardings<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<Vec<(String, ShardingSpec)>, ShardingError> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                Ok((name.to_string(), self.sharding_by_name(name)?))
            })
            .collect()
    }

    /// Re-annotate an activation with the sharding for `axis`.
    pub fn apply_sharding(&self, tensor: &mut ShardedTensor, axis: Option<usize>) {
        tensor.set_sharding(self.sharding_by_axis(axis));
    }
}

/// Axis 0 when sharding on batch, else the configured named axis. An axis of
/// extent 1 cannot be split, so the last axis is used instead.
fn resolve_cache_axis(config: &EnvironmentConfig, shape: &[usize]) -> Result<usize, EnvironmentError> {
    let names = &config.attention_kv_axis_names;
    let axis = if config.shard_on_batch {
        0
    } else {
        names
            .iter()
            .position(|name| *name == config.kv_cache_shard_axis)
            .ok_or_else(|| EnvironmentError::UnknownShardAxis {
                axis: config.kv_cache_shard_axis.clone(),
                names: names.clone(),
            })?
    };

    if shape[axis] == 1 {
        let last = shape.len() - 1;
        warn!(
            axis,
            name = names[axis].as_str(),
            fallback = last,
            "cache axis has extent 1, sharding the last axis instead"
        );
        return Ok(last);
    }
    Ok(axis)
}
