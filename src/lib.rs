// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! GG-CORE KV cache layer.
//!
//! Per-layer attention key/value caches for prefill and decode, int8 KV
//! quantization, and the session environment that resolves cache shapes and
//! device sharding from configuration.
//!
//! ```no_run
//! use gg_kvcache::{Environment, EnvironmentConfig};
//!
//! let env = Environment::new(EnvironmentConfig::default())?;
//! let caches = env.make_generate_caches()?;
//! assert_eq!(caches.len(), env.num_layers());
//! # Ok::<(), gg_kvcache::EnvironmentError>(())
//! ```

pub mod config;
pub mod environment;
pub mod logging;
pub mod memory;
pub mod sharding;
pub mod tensor;

pub use config::{model_preset, ConfigError, EnvironmentConfig, ModelDims};
pub use environment::{Environment, EnvironmentError, EnvironmentPlan};
pub use memory::{
    CacheAux, CacheKind, CacheShape, CacheView, GenerateCache, Int8GenerateCache, KvCache,
    KvCacheError, PlainParts, PrefillCache,
};
pub use sharding::{
    AxisRule, DeviceMesh, MeshAxis, PartitionSpec, ShardedTensor, ShardingError, ShardingRules,
    ShardingSpec,
};
pub use tensor::{DType, Shape, Tensor, TensorError};
