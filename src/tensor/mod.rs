// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Dense host tensors backing KV cache buffers.
//!
//! Tensors are row-major, owned, and typed at runtime by [`DType`]. The only
//! way to mutate a slice of a tensor in place is [`write_at`], which checks
//! every index before it touches a single element.

mod shape;
mod tensor_core;
mod write;

pub use shape::Shape;
pub use tensor_core::{DType, Element, Storage, Tensor};
pub use write::write_at;

/// Errors raised by tensor construction and indexed access.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TensorError {
    #[error("Element count {got} does not match shape {shape} ({expected} elements)")]
    ElementCount {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    #[error("Expected rank {expected}, got rank {got}")]
    RankMismatch { expected: usize, got: usize },

    #[error("Expected shape {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Expected dtype {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },

    #[error("Index {index} out of bounds for axis {axis} with extent {extent}")]
    IndexOutOfBounds {
        axis: usize,
        index: usize,
        extent: usize,
    },

    #[error("Axis {axis} out of range for rank {rank}")]
    AxisOutOfRange { axis: usize, rank: usize },

    #[error("Row index count {rows} does not match column index count {columns}")]
    IndexCountMismatch { rows: usize, columns: usize },
}

#[cfg(test)]
#[path = "tensor_tests.rs"]
mod tests;
