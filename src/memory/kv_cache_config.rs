// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! KV cache shape, views, and error definitions.

use serde::{Deserialize, Serialize};

use crate::tensor::{DType, Shape, Tensor, TensorError};

/// Shape of one layer's key (or value) buffer: `(batch, heads, capacity, head_dim)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheShape {
    pub batch: usize,
    pub heads: usize,
    /// Fixed number of positions; never changes after allocation.
    pub capacity: usize,
    pub head_dim: usize,
}

impl CacheShape {
    pub fn new(batch: usize, heads: usize, capacity: usize, head_dim: usize) -> Self {
        Self {
            batch,
            heads,
            capacity,
            head_dim,
        }
    }

    pub fn from_dims(dims: &[usize]) -> Result<Self, KvCacheError> {
        match *dims {
            [batch, heads, capacity, head_dim] => Ok(Self::new(batch, heads, capacity, head_dim)),
            _ => Err(TensorError::RankMismatch {
                expected: 4,
                got: dims.len(),
            }
            .into()),
        }
    }

    pub fn dims(&self) -> [usize; 4] {
        [self.batch, self.heads, self.capacity, self.head_dim]
    }

    pub fn to_shape(&self) -> Shape {
        Shape::from(self.dims())
    }

    /// Per-position scale buffer: `(batch, 1, capacity, 1)`.
    pub fn scale_shape(&self) -> Shape {
        Shape::from([self.batch, 1, self.capacity, 1])
    }

    /// One decode step of key or value: `(batch, heads, 1, head_dim)`.
    pub fn step_dims(&self) -> [usize; 4] {
        [self.batch, self.heads, 1, self.head_dim]
    }

    pub fn elem_count(&self) -> usize {
        self.dims().iter().product()
    }
}

/// What a cache hands to attention after an update.
#[derive(Debug, Clone, Copy)]
pub enum CacheView<'a> {
    Wide {
        keys: &'a Tensor,
        values: &'a Tensor,
    },
    Quantized {
        keys: &'a Tensor,
        values: &'a Tensor,
        key_scales: &'a Tensor,
        value_scales: &'a Tensor,
    },
}

impl<'a> CacheView<'a> {
    pub fn keys(&self) -> &'a Tensor {
        match *self {
            CacheView::Wide { keys, .. } | CacheView::Quantized { keys, .. } => keys,
        }
    }

    pub fn values(&self) -> &'a Tensor {
        match *self {
            CacheView::Wide { values, .. } | CacheView::Quantized { values, .. } => values,
        }
    }

    /// `(key_scales, value_scales)` for quantized views.
    pub fn scales(&self) -> Option<(&'a Tensor, &'a Tensor)> {
        match *self {
            CacheView::Wide { .. } => None,
            CacheView::Quantized {
                key_scales,
                value_scales,
                ..
            } => Some((key_scales, value_scales)),
        }
    }

    pub fn is_quantized(&self) -> bool {
        matches!(self, CacheView::Quantized { .. })
    }
}

/// Errors for KV cache operations.
#[derive(Debug, thiserror::Error)]
pub enum KvCacheError {
    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error("Expected {what} of shape {expected:?}, got {got:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Expected {what} dtype {expected}, got {got}")]
    DTypeMismatch {
        what: &'static str,
        expected: DType,
        got: DType,
    },

    #[error("Cache dtype must be f32 or bf16, got {0}")]
    NotWide(DType),

    #[error("Position {position} out of bounds for row {row} with capacity {capacity}")]
    PositionOutOfBounds {
        row: usize,
        position: usize,
        capacity: usize,
    },

    #[error("Expected {expected} positions (one per batch row), got {got}")]
    PositionCountMismatch { expected: usize, got: usize },

    #[error("Generate caches require one position per batch row")]
    PositionsRequired,

    #[error("Prefill caches do not take positions")]
    PositionsNotAccepted,

    #[error("Invalid plain parts: {0}")]
    InvalidParts(String),
}
