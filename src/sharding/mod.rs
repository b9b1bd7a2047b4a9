// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Device mesh and sharding descriptions.
//!
//! Nothing here moves data between devices. These types only describe how a
//! tensor is meant to be partitioned over a 2-D mesh so the execution layer
//! can enforce it.

mod mesh;
mod partition;
mod rules;
mod sharded;

use std::path::PathBuf;

pub use mesh::{DeviceMesh, MeshAxis};
pub use partition::{PartitionSpec, ShardingSpec};
pub use rules::{normalize_name, AxisRule, ShardingRules, MAX_AXIS};
pub use sharded::ShardedTensor;

/// Errors for sharding resolution.
#[derive(Debug, thiserror::Error)]
pub enum ShardingError {
    #[error("Sharding for tensor '{0}' not specified")]
    MissingRule(String),

    #[error("Invalid sharding axis {0}: expected an axis from 0 to {}, -1 or null", MAX_AXIS)]
    InvalidAxis(i64),

    #[error("Device mesh needs at least one device")]
    NoDevices,

    #[error("Failed to read sharding config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse sharding config: {0}")]
    Parse(String),

    #[error("Unsupported sharding config format: {0}")]
    UnsupportedFormat(String),
}

#[cfg(test)]
#[path = "sharding_tests.rs"]
mod tests;
