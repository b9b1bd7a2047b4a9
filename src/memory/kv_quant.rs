// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Symmetric int8 quantization of KV steps.
//!
//! Each `(batch, position)` slab gets its own scale `max|x| / 127`, taken over
//! the heads and head_dim axes. A slab of zeros gets scale 0 and quantizes to
//! zeros; the consumer must not take the reciprocal of a scale.

use super::kv_cache_config::KvCacheError;
use crate::tensor::{DType, Tensor};

/// Largest magnitude an int8 code represents symmetrically.
pub const Q8_MAX: f32 = 127.0;

/// Quantized tensor with its per-(batch, position) scales.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantized {
    /// Int8 codes, same shape as the input.
    pub values: Tensor,
    /// F32 scales of shape `(batch, 1, seq, 1)`.
    pub scales: Tensor,
}

/// Q8 scale for a slab of values.
pub fn compute_scale(data: impl IntoIterator<Item = f32>) -> f32 {
    let max_abs = data.into_iter().map(f32::abs).fold(0.0f32, f32::max);
    max_abs / Q8_MAX
}

/// Round to the nearest code and clamp to `[-128, 127]`.
pub fn quantize_value(x: f32, scale: f32) -> i8 {
    if scale == 0.0 {
        return 0;
    }
    (x / scale).round().clamp(-128.0, 127.0) as i8
}

/// Quantize a `(batch, heads, seq, head_dim)` float tensor.
pub fn quantize(input: &Tensor) -> Result<Quantized, KvCacheError> {
    input.shape().expect_rank(4)?;
    if !input.dtype().is_wide() {
        return Err(KvCacheError::NotWide(input.dtype()));
    }
    let [batch, heads, seq, dim] = [
        input.dims()[0],
        input.dims()[1],
        input.dims()[2],
        input.dims()[3],
    ];
    let data = input.to_f32_vec();
    let mut codes = vec![0i8; data.len()];
    let mut scales = vec![0.0f32; batch * seq];

    for b in 0..batch {
        for s in 0..seq {
            let slab = |h: usize| ((b * heads + h) * seq + s) * dim;
            let scale = compute_scale(
                (0..heads).flat_map(|h| data[slab(h)..slab(h) + dim].iter().copied()),
            );
            scales[b * seq + s] = scale;
            for h in 0..heads {
                let start = slab(h);
                for i in start..start + dim {
                    codes[i] = quantize_value(data[i], scale);
                }
            }
        }
    }

    Ok(Quantized {
        values: Tensor::from_vec(codes, [batch, heads, seq, dim])?,
        scales: Tensor::from_vec(scales, [batch, 1, seq, 1])?,
    })
}

/// Reconstruct floats from codes and `(batch, 1, seq, 1)` scales.
pub fn dequantize(codes: &Tensor, scales: &Tensor) -> Result<Tensor, KvCacheError> {
    codes.shape().expect_rank(4)?;
    if codes.dtype() != DType::I8 {
        return Err(KvCacheError::DTypeMismatch {
            what: "quantized codes",
            expected: DType::I8,
            got: codes.dtype(),
        });
    }
    let [batch, heads, seq, dim] = [
        codes.dims()[0],
        codes.dims()[1],
        codes.dims()[2],
        codes.dims()[3],
    ];
    let expected = vec![batch, 1, seq, 1];
    if scales.dims() != expected.as_slice() {
        return Err(KvCacheError::ShapeMismatch {
            what: "scales",
            expected,
            got: scales.dims().to_vec(),
        });
    }

    let q = codes.as_slice::<i8>()?;
    let scale = scales.to_f32_vec();
    let mut out = vec![0.0f32; q.len()];
    for b in 0..batch {
        for h in 0..heads {
            for s in 0..seq {
                let start = ((b * heads + h) * seq + s) * dim;
                let sc = scale[b * seq + s];
                for i in start..start + dim {
                    out[i] = q[i] as f32 * sc;
                }
            }
        }
    }
    Ok(Tensor::from_vec(out, [batch, heads, seq, dim])?)
}

#[cfg(test)]
#[path = "kv_quant_tests.rs"]
mod tests;
