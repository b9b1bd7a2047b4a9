// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Bounds-checked scatter into rank-4 buffers.

use super::{Storage, Tensor, TensorError};

/// Scatter `values` into `buffer` at `(rows[i], columns[i])` on axes 0 and 2.
///
/// `buffer` has shape `(R, H, C, D)` and `values` has shape `(N, H, 1, D)`
/// with `N == rows.len() == columns.len()`. For each `i`, the slab
/// `values[i, :, 0, :]` replaces `buffer[rows[i], :, columns[i], :]`; every
/// other cell of `buffer` is left untouched.
///
/// All indices, shapes and dtypes are checked before the first element is
/// written, so an error leaves `buffer` unchanged. Indices never wrap.
pub fn write_at(
    buffer: &mut Tensor,
    rows: &[usize],
    columns: &[usize],
    values: &Tensor,
) -> Result<(), TensorError> {
    buffer.shape().expect_rank(4)?;
    values.shape().expect_rank(4)?;
    if rows.len() != columns.len() {
        return Err(TensorError::IndexCountMismatch {
            rows: rows.len(),
            columns: columns.len(),
        });
    }

    let dims = [
        buffer.dims()[0],
        buffer.dims()[1],
        buffer.dims()[2],
        buffer.dims()[3],
    ];
    let expected = vec![rows.len(), dims[1], 1, dims[3]];
    if values.dims() != expected.as_slice() {
        return Err(TensorError::ShapeMismatch {
            expected,
            got: values.dims().to_vec(),
        });
    }
    if values.dtype() != buffer.dtype() {
        return Err(TensorError::DTypeMismatch {
            expected: buffer.dtype(),
            got: values.dtype(),
        });
    }
    for &row in rows {
        if row >= dims[0] {
            return Err(TensorError::IndexOutOfBounds {
                axis: 0,
                index: row,
                extent: dims[0],
            });
        }
    }
    for &column in columns {
        if column >= dims[2] {
            return Err(TensorError::IndexOutOfBounds {
                axis: 2,
                index: column,
                extent: dims[2],
            });
        }
    }

    match (buffer.storage_mut(), values.storage()) {
        (Storage::F32(dst), Storage::F32(src)) => scatter(dst, src, dims, rows, columns),
        (Storage::Bf16(dst), Storage::Bf16(src)) => scatter(dst, src, dims, rows, columns),
        (Storage::I8(dst), Storage::I8(src)) => scatter(dst, src, dims, rows, columns),
        (dst, src) => {
            return Err(TensorError::DTypeMismatch {
                expected: dst.dtype(),
                got: src.dtype(),
            })
        }
    }
    Ok(())
}

fn scatter<T: Copy>(dst: &mut [T], src: &[T], dims: [usize; 4], rows: &[usize], columns: &[usize]) {
    let [_, inner, capacity, depth] = dims;
    for (i, (&row, &column)) in rows.iter().zip(columns).enumerate() {
        for h in 0..inner {
            let from = (i * inner + h) * depth;
            let to = ((row * inner + h) * capacity + column) * depth;
            dst[to..to + depth].copy_from_slice(&src[from..from + depth]);
        }
    }
}
