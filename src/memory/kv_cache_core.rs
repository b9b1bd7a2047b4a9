// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Wide-dtype generate cache with a preallocated, position-addressed buffer.

use tracing::debug;

use super::kv_cache_config::{CacheShape, CacheView, KvCacheError};
use super::kv_cache_ops::{batch_rows, check_positions, check_step};
use super::kv_cache_parts::{buffer_shape, check_restored_positions, expect_same_dims, take_parts, GenerateAux, PlainParts};
use crate::sharding::{ShardedTensor, ShardingSpec};
use crate::tensor::{write_at, DType, Tensor};

/// Decode-phase cache holding keys and values in f32 or bf16.
///
/// Each update writes one position per batch row and returns the whole
/// buffer, including slots not yet written (still zero). The caller masks
/// those out of attention.
#[derive(Debug, Clone)]
pub struct GenerateCache {
    cache_k: ShardedTensor,
    cache_v: ShardedTensor,
    positions: Vec<usize>,
    rows: Vec<usize>,
    shape: CacheShape,
}

impl GenerateCache {
    /// Allocate zeroed buffers. This is the only allocation the cache makes.
    pub fn empty(shape: CacheShape, sharding: ShardingSpec, dtype: DType) -> Result<Self, KvCacheError> {
        if !dtype.is_wide() {
            return Err(KvCacheError::NotWide(dtype));
        }
        debug!(?shape, %dtype, "allocating generate cache");
        let cache_k = ShardedTensor::new(Tensor::zeros(shape.to_shape(), dtype), sharding.clone());
        let cache_v = ShardedTensor::new(Tensor::zeros(shape.to_shape(), dtype), sharding);
        Ok(Self {
            cache_k,
            cache_v,
            positions: vec![0; shape.batch],
            rows: batch_rows(shape.batch),
            shape,
        })
    }

    /// Write `key[b, :, 0, :]` and `value[b, :, 0, :]` at `positions[b]`.
    ///
    /// `key` and `value` are `(batch, heads, 1, head_dim)` in the cache dtype.
    /// Positions outside `[0, capacity)` are rejected, never wrapped.
    pub fn update(&mut self, key: &Tensor, value: &Tensor, positions: &[usize]) -> Result<CacheView<'_>, KvCacheError> {
        check_step(&self.shape, key, value)?;
        if key.dtype() != self.dtype() {
            return Err(KvCacheError::DTypeMismatch {
                what: "key",
                expected: self.dtype(),
                got: key.dtype(),
            });
        }
        check_positions(&self.shape, positions)?;

        write_at(self.cache_k.tensor_mut(), &self.rows, positions, key)?;
        write_at(self.cache_v.tensor_mut(), &self.rows, positions, value)?;
        self.positions.copy_from_slice(positions);

        Ok(CacheView::Wide {
            keys: self.cache_k.tensor(),
            values: self.cache_v.tensor(),
        })
    }

    /// `(keys, values)` without the sharding annotation.
    pub fn state(&self) -> (&Tensor, &Tensor) {
        (self.cache_k.tensor(), self.cache_v.tensor())
    }

    /// Positions written by the last update (zeros before the first).
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    pub fn shape(&self) -> CacheShape {
        self.shape
    }

    pub fn dtype(&self) -> DType {
        self.cache_k.tensor().dtype()
    }

    pub fn sharding(&self) -> &ShardingSpec {
        self.cache_k.sharding()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.cache_k.tensor().size_in_bytes() + self.cache_v.tensor().size_in_bytes()
    }
}

impl PlainParts for GenerateCache {
    type Aux = GenerateAux;

    fn into_plain_parts(self) -> (Vec<Tensor>, GenerateAux) {
        let aux = GenerateAux {
            positions: self.positions,
            sharding: self.cache_k.sharding().clone(),
        };
        (vec![self.cache_k.into_inner(), self.cache_v.into_inner()], aux)
    }

    fn from_plain_parts(aux: GenerateAux, parts: Vec<Tensor>) -> Result<Self, KvCacheError> {
        let [k, v] = take_parts::<2>(parts)?;
        let shape = buffer_shape(&k, None)?;
        expect_same_dims("value buffer", k.dims(), &v)?;
        if v.dtype() != k.dtype() {
            return Err(KvCacheError::DTypeMismatch {
                what: "value buffer",
                expected: k.dtype(),
                got: v.dtype(),
            });
        }
        check_restored_positions(&shape, &aux.positions)?;
        Ok(Self {
            cache_k: ShardedTensor::new(k, aux.sharding.clone()),
            cache_v: ShardedTensor::new(v, aux.sharding),
            positions: aux.positions,
            rows: batch_rows(shape.batch),
            shape,
        })
    }
}
