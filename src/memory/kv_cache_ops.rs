// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Input validation shared by the cache variants.
//!
//! Every check runs before a buffer is touched, so a rejected update leaves
//! the cache exactly as it was.

use super::kv_cache_config::{CacheShape, KvCacheError};
use crate::tensor::Tensor;

/// Key and value must be rank-4 float tensors of identical shape and dtype.
pub(super) fn check_key_value(key: &Tensor, value: &Tensor) -> Result<(), KvCacheError> {
    key.shape().expect_rank(4)?;
    if value.dims() != key.dims() {
        return Err(KvCacheError::ShapeMismatch {
            what: "value",
            expected: key.dims().to_vec(),
            got: value.dims().to_vec(),
        });
    }
    if value.dtype() != key.dtype() {
        return Err(KvCacheError::DTypeMismatch {
            what: "value",
            expected: key.dtype(),
            got: value.dtype(),
        });
    }
    if !key.dtype().is_wide() {
        return Err(KvCacheError::NotWide(key.dtype()));
    }
    Ok(())
}

/// Key and value must each be exactly one decode step for `shape`.
pub(super) fn check_step(shape: &CacheShape, key: &Tensor, value: &Tensor) -> Result<(), KvCacheError> {
    check_key_value(key, value)?;
    let expected = shape.step_dims();
    if key.dims() != expected.as_slice() {
        return Err(KvCacheError::ShapeMismatch {
            what: "key step",
            expected: expected.to_vec(),
            got: key.dims().to_vec(),
        });
    }
    Ok(())
}

/// One in-range position per batch row.
pub(super) fn check_positions(shape: &CacheShape, positions: &[usize]) -> Result<(), KvCacheError> {
    if positions.len() != shape.batch {
        return Err(KvCacheError::PositionCountMismatch {
            expected: shape.batch,
            got: positions.len(),
        });
    }
    for (row, &position) in positions.iter().enumerate() {
        if position >= shape.capacity {
            return Err(KvCacheError::PositionOutOfBounds {
                row,
                position,
                capacity: shape.capacity,
            });
        }
    }
    Ok(())
}

/// Row indices `0..batch` used as the scatter's first index.
pub(super) fn batch_rows(batch: usize) -> Vec<usize> {
    (0..batch).collect()
}
