// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::{DeviceMesh, MeshAxis};

/// Per-axis partition markers. Unset markers, and any axis past the end of
/// the list, are replicated.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct PartitionSpec(Vec<Option<MeshAxis>>);

impl PartitionSpec {
    pub fn replicated() -> Self {
        Self(Vec::new())
    }

    /// Partition `axis` along mesh axis `x`.
    pub fn on_axis(axis: usize) -> Self {
        let mut markers = vec![None; axis + 1];
        markers[axis] = Some(MeshAxis::X);
        Self(markers)
    }

    pub fn markers(&self) -> &[Option<MeshAxis>] {
        &self.0
    }

    pub fn is_replicated(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }

    pub fn sharded_axis(&self) -> Option<usize> {
        self.0.iter().position(Option::is_some)
    }
}

impl fmt::Display for PartitionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P(")?;
        for (i, marker) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match marker {
                Some(axis) => write!(f, "{}", axis)?,
                None => write!(f, "None")?,
            }
        }
        write!(f, ")")
    }
}

/// A partition spec bound to the mesh it refers to.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardingSpec {
    mesh: Arc<DeviceMesh>,
    partition: PartitionSpec,
}

impl ShardingSpec {
    pub fn new(mesh: Arc<DeviceMesh>, partition: PartitionSpec) -> Self {
        Self { mesh, partition }
    }

    pub fn replicated(mesh: Arc<DeviceMesh>) -> Self {
        Self::new(mesh, PartitionSpec::replicated())
    }

    /// `None` replicates; `Some(axis)` partitions that axis along `x`.
    pub fn by_axis(mesh: Arc<DeviceMesh>, axis: Option<usize>) -> Self {
        match axis {
            Some(axis) => Self::new(mesh, PartitionSpec::on_axis(axis)),
            None => Self::replicated(mesh),
        }
    }

    pub fn mesh(&self) -> &Arc<DeviceMesh> {
        &self.mesh
    }

    pub fn partition(&self) -> &PartitionSpec {
        &self.partition
    }

    pub fn sharded_axis(&self) -> Option<usize> {
        self.partition.sharded_axis()
    }

    pub fn is_replicated(&self) -> bool {
        self.partition.is_replicated()
    }

    /// Number of pieces the sharded axis is split into.
    pub fn num_shards(&self) -> usize {
        match self.sharded_axis() {
            Some(_) => self.mesh.axis_size(MeshAxis::X),
            None => 1,
        }
    }

    /// Extent each device holds for a tensor of shape `global`.
    ///
    /// Uneven extents round up, so the last device may hold padding.
    pub fn local_shape(&self, global: &[usize]) -> Vec<usize> {
        let mut local = global.to_vec();
        if let Some(axis) = self.sharded_axis() {
            if let Some(extent) = local.get_mut(axis) {
                *extent = extent.div_ceil(self.num_shards());
            }
        }
        local
    }

    pub fn divides_evenly(&self, global: &[usize]) -> bool {
        match self.sharded_axis().and_then(|axis| global.get(axis)) {
            Some(extent) => extent % self.num_shards() == 0,
            None => true,
        }
    }

    /// The same sharding for a tensor of shape `dims`, replicated instead if
    /// the sharded axis is missing or has extent 1 there.
    pub fn restricted_to(&self, dims: &[usize]) -> ShardingSpec {
        match self.sharded_axis().and_then(|axis| dims.get(axis)) {
            Some(&extent) if extent > 1 => self.clone(),
            _ => Self::replicated(self.mesh.clone()),
        }
    }
}

impl fmt::Display for ShardingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x, y] = self.mesh.shape();
        write!(f, "{} over mesh(x={}, y={})", self.partition, x, y)
    }
}
