// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::tensor::Tensor;

use super::ShardingSpec;

/// A tensor annotated with the sharding the execution layer should apply.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardedTensor {
    tensor: Tensor,
    sharding: ShardingSpec,
}

impl ShardedTensor {
    pub fn new(tensor: Tensor, sharding: ShardingSpec) -> Self {
        Self { tensor, sharding }
    }

    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    pub(crate) fn tensor_mut(&mut self) -> &mut Tensor {
        &mut self.tensor
    }

    pub fn sharding(&self) -> &ShardingSpec {
        &self.sharding
    }

    pub fn set_sharding(&mut self, sharding: ShardingSpec) {
        self.sharding = sharding;
    }

    /// Strip the annotation.
    pub fn into_inner(self) -> Tensor {
        self.tensor
    }
}
