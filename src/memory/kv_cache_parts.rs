// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Flatten caches to plain tensors and rebuild them.
//!
//! The distributed execution layer treats a cache as opaque leaves of a larger
//! tensor tree. It calls [`PlainParts::into_plain_parts`] to get the buffers
//! plus the small non-tensor state it must carry alongside, and
//! [`PlainParts::from_plain_parts`] to get the same cache back.

use super::kv_cache_config::{CacheShape, KvCacheError};
use super::kv_cache_ops::check_positions;
use crate::sharding::ShardingSpec;
use crate::tensor::{DType, Tensor};

pub trait PlainParts: Sized {
    /// Non-tensor state needed to rebuild the cache.
    type Aux: Clone + std::fmt::Debug;

    fn into_plain_parts(self) -> (Vec<Tensor>, Self::Aux);

    fn from_plain_parts(aux: Self::Aux, parts: Vec<Tensor>) -> Result<Self, KvCacheError>;

    /// Like [`into_plain_parts`](Self::into_plain_parts), keeping `self`.
    fn to_plain_parts(&self) -> (Vec<Tensor>, Self::Aux)
    where
        Self: Clone,
    {
        self.clone().into_plain_parts()
    }
}

/// Prefill caches only carry the quantization flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefillAux {
    pub kv_quantize: bool,
}

/// Generate caches carry their last positions and buffer sharding.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateAux {
    pub positions: Vec<usize>,
    pub sharding: ShardingSpec,
}

/// Take exactly `N` parts or fail.
pub(super) fn take_parts<const N: usize>(parts: Vec<Tensor>) -> Result<[Tensor; N], KvCacheError> {
    let got = parts.len();
    parts
        .try_into()
        .map_err(|_| KvCacheError::InvalidParts(format!("expected {} tensors, got {}", N, got)))
}

/// Cache shape from a rank-4 buffer with the expected dtype.
pub(super) fn buffer_shape(buffer: &Tensor, dtype: Option<DType>) -> Result<CacheShape, KvCacheError> {
    let shape = CacheShape::from_dims(buffer.dims())?;
    match dtype {
        Some(expected) if buffer.dtype() != expected => Err(KvCacheError::DTypeMismatch {
            what: "cache buffer",
            expected,
            got: buffer.dtype(),
        }),
        None if !buffer.dtype().is_wide() => Err(KvCacheError::NotWide(buffer.dtype())),
        _ => Ok(shape),
    }
}

/// Every buffer in a cache must share one shape.
pub(super) fn expect_same_dims(what: &'static str, expected: &[usize], got: &Tensor) -> Result<(), KvCacheError> {
    if got.dims() != expected {
        return Err(KvCacheError::ShapeMismatch {
            what,
            expected: expected.to_vec(),
            got: got.dims().to_vec(),
        });
    }
    Ok(())
}

pub(super) fn check_restored_positions(shape: &CacheShape, positions: &[usize]) -> Result<(), KvCacheError> {
    check_positions(shape, positions)
        .map_err(|e| KvCacheError::InvalidParts(format!("restored positions: {}", e)))
}
