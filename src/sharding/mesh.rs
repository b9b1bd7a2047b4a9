// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ShardingError;

/// Named axis of the device mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshAxis {
    /// Partitioned axis, one entry per device.
    X,
    /// Unpartitioned axis of extent 1.
    Y,
}

impl MeshAxis {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeshAxis::X => "x",
            MeshAxis::Y => "y",
        }
    }
}

impl fmt::Display for MeshAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical `(device_count, 1)` grid of devices with axes `x` and `y`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMesh {
    shape: [usize; 2],
}

impl DeviceMesh {
    /// Lay `device_count` devices out along `x`.
    pub fn new(device_count: usize) -> Result<Self, ShardingError> {
        if device_count == 0 {
            return Err(ShardingError::NoDevices);
        }
        Ok(Self {
            shape: [device_count, 1],
        })
    }

    pub fn device_count(&self) -> usize {
        self.shape[0] * self.shape[1]
    }

    pub fn shape(&self) -> [usize; 2] {
        self.shape
    }

    pub fn axis_size(&self, axis: MeshAxis) -> usize {
        match axis {
            MeshAxis::X => self.shape[0],
            MeshAxis::Y => self.shape[1],
        }
    }
}
