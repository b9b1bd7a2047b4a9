// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use serde::{Deserialize, Serialize};

use super::TensorError;

/// Extent of each tensor axis, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Extent of `axis`.
    pub fn dim(&self, axis: usize) -> Result<usize, TensorError> {
        self.0.get(axis).copied().ok_or(TensorError::AxisOutOfRange {
            axis,
            rank: self.rank(),
        })
    }

    pub fn elem_count(&self) -> usize {
        self.0.iter().product()
    }

    /// Flat offset of a full multi-dimensional index.
    pub fn offset(&self, index: &[usize]) -> Result<usize, TensorError> {
        if index.len() != self.rank() {
            return Err(TensorError::RankMismatch {
                expected: self.rank(),
                got: index.len(),
            });
        }
        let mut offset = 0;
        for (axis, (&i, &extent)) in index.iter().zip(self.0.iter()).enumerate() {
            if i >= extent {
                return Err(TensorError::IndexOutOfBounds {
                    axis,
                    index: i,
                    extent,
                });
            }
            offset = offset * extent + i;
        }
        Ok(offset)
    }

    pub(crate) fn expect_rank(&self, rank: usize) -> Result<(), TensorError> {
        if self.rank() != rank {
            return Err(TensorError::RankMismatch {
                expected: rank,
                got: self.rank(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, ")")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self(dims.to_vec())
    }
}
