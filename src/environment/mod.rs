// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Session environment: resolves configuration into cache shapes, sharding
//! and empty per-layer caches.
//!
//! Split into submodules:
//! - `env_core`: construction, axis resolution and sharding lookups
//! - `env_caches`: cache factories, memory estimate and plan

mod env_caches;
mod env_core;

pub use env_caches::EnvironmentPlan;
pub use env_core::Environment;

use crate::config::ConfigError;
use crate::memory::KvCacheError;
use crate::sharding::ShardingError;

/// Errors raised while building or using an environment.
#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sharding(#[from] ShardingError),

    #[error(transparent)]
    Cache(#[from] KvCacheError),

    #[error("Shard axis '{axis}' is not one of the attention axes {names:?}")]
    UnknownShardAxis { axis: String, names: Vec<String> },

    #[error("{names} attention axis names for a cache shape of rank {rank}")]
    AxisRankMismatch { names: usize, rank: usize },

    #[error("Cache shape batch {cache_batch} does not match batch_size {batch_size}")]
    BatchMismatch { batch_size: usize, cache_batch: usize },
}

#[cfg(test)]
#[path = "environment_tests.rs"]
mod tests;
