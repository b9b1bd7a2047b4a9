// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Int8 generate cache with per-position dequantization scales.

use tracing::debug;

use super::kv_cache_config::{CacheShape, CacheView, KvCacheError};
use super::kv_cache_ops::{batch_rows, check_positions, check_step};
use super::kv_cache_parts::{buffer_shape, check_restored_positions, expect_same_dims, take_parts, GenerateAux, PlainParts};
use super::kv_quant::quantize;
use crate::sharding::{ShardedTensor, ShardingSpec};
use crate::tensor::{write_at, DType, Tensor};

/// Decode-phase cache storing keys and values as int8 codes.
///
/// Alongside each code buffer sits a `(batch, 1, capacity, 1)` scale buffer;
/// `code * scale` recovers the original value at that position.
#[derive(Debug, Clone)]
pub struct Int8GenerateCache {
    cache_k: ShardedTensor,
    cache_v: ShardedTensor,
    k_scales: ShardedTensor,
    v_scales: ShardedTensor,
    positions: Vec<usize>,
    rows: Vec<usize>,
    shape: CacheShape,
}

impl Int8GenerateCache {
    /// Allocate zeroed code buffers and unit scale buffers of `scale_dtype`.
    pub fn empty(shape: CacheShape, sharding: ShardingSpec, scale_dtype: DType) -> Result<Self, KvCacheError> {
        if !scale_dtype.is_wide() {
            return Err(KvCacheError::NotWide(scale_dtype));
        }
        debug!(?shape, %scale_dtype, "allocating int8 generate cache");
        let scale_shape = shape.scale_shape();
        let scale_sharding = sharding.restricted_to(scale_shape.dims());
        let codes = || Tensor::zeros(shape.to_shape(), DType::I8);
        let ones = || Tensor::ones(scale_shape.clone(), scale_dtype);
        Ok(Self {
            cache_k: ShardedTensor::new(codes(), sharding.clone()),
            cache_v: ShardedTensor::new(codes(), sharding),
            k_scales: ShardedTensor::new(ones(), scale_sharding.clone()),
            v_scales: ShardedTensor::new(ones(), scale_sharding),
            positions: vec![0; shape.batch],
            rows: batch_rows(shape.batch),
            shape,
        })
    }

    /// Quantize one step of `key` and `value` and write codes and scales at
    /// `positions[b]` for each batch row.
    pub fn update(&mut self, key: &Tensor, value: &Tensor, positions: &[usize]) -> Result<CacheView<'_>, KvCacheError> {
        check_step(&self.shape, key, value)?;
        check_positions(&self.shape, positions)?;

        let scale_dtype = self.scale_dtype();
        let k = quantize(key)?;
        let v = quantize(value)?;
        let k_scale = k.scales.to_dtype(scale_dtype);
        let v_scale = v.scales.to_dtype(scale_dtype);

        write_at(self.cache_k.tensor_mut(), &self.rows, positions, &k.values)?;
        write_at(self.cache_v.tensor_mut(), &self.rows, positions, &v.values)?;
        write_at(self.k_scales.tensor_mut(), &self.rows, positions, &k_scale)?;
        write_at(self.v_scales.tensor_mut(), &self.rows, positions, &v_scale)?;
        self.positions.copy_from_slice(positions);

        Ok(CacheView::Quantized {
            keys: self.cache_k.tensor(),
            values: self.cache_v.tensor(),
            key_scales: self.k_scales.tensor(),
            value_scales: self.v_scales.tensor(),
        })
    }

    /// `(key_codes, value_codes)` without the sharding annotation.
    pub fn state(&self) -> (&Tensor, &Tensor) {
        (self.cache_k.tensor(), self.cache_v.tensor())
    }

    /// `(key_scales, value_scales)` without the sharding annotation.
    pub fn scales(&self) -> (&Tensor, &Tensor) {
        (self.k_scales.tensor(), self.v_scales.tensor())
    }

    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    pub fn shape(&self) -> CacheShape {
        self.shape
    }

    pub fn scale_dtype(&self) -> DType {
        self.k_scales.tensor().dtype()
    }

    pub fn sharding(&self) -> &ShardingSpec {
        self.cache_k.sharding()
    }

    pub fn size_in_bytes(&self) -> usize {
        [&self.cache_k, &self.cache_v, &self.k_scales, &self.v_scales]
            .iter()
            .map(|t| t.tensor().size_in_bytes())
            .sum()
    }
}

impl PlainParts for Int8GenerateCache {
    type Aux = GenerateAux;

    fn into_plain_parts(self) -> (Vec<Tensor>, GenerateAux) {
        let aux = GenerateAux {
            positions: self.positions,
            sharding: self.cache_k.sharding().clone(),
        };
        let parts = vec![
            self.cache_k.into_inner(),
            self.cache_v.into_inner(),
            self.k_scales.into_inner(),
            self.v_scales.into_inner(),
        ];
        (parts, aux)
    }

    fn from_plain_parts(aux: GenerateAux, parts: Vec<Tensor>) -> Result<Self, KvCacheError> {
        let [k, v, ks, vs] = take_parts::<4>(parts)?;
        let shape = buffer_shape(&k, Some(DType::I8))?;
        buffer_shape(&v, Some(DType::I8))?;
        expect_same_dims("value buffer", k.dims(), &v)?;

        let scale_shape = shape.scale_shape();
        expect_same_dims("key scales", scale_shape.dims(), &ks)?;
        expect_same_dims("value scales", scale_shape.dims(), &vs)?;
        if !ks.dtype().is_wide() {
            return Err(KvCacheError::NotWide(ks.dtype()));
        }
        if vs.dtype() != ks.dtype() {
            return Err(KvCacheError::DTypeMismatch {
                what: "value scales",
                expected: ks.dtype(),
                got: vs.dtype(),
            });
        }
        check_restored_positions(&shape, &aux.positions)?;

        let scale_sharding = aux.sharding.restricted_to(scale_shape.dims());
        Ok(Self {
            cache_k: ShardedTensor::new(k, aux.sharding.clone()),
            cache_v: ShardedTensor::new(v, aux.sharding),
            k_scales: ShardedTensor::new(ks, scale_sharding.clone()),
            v_scales: ShardedTensor::new(vs, scale_sharding),
            positions: aux.positions,
            rows: batch_rows(shape.batch),
            shape,
        })
    }
}
