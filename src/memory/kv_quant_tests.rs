// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Tests for int8 KV quantization.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::*;

#[test]
fn test_compute_scale() {
    assert_eq!(compute_scale([1.0, -254.0, 3.0]), 2.0);
    assert_eq!(compute_scale([0.0, 0.0]), 0.0);
    assert_eq!(compute_scale(std::iter::empty()), 0.0);
}

#[test]
fn test_quantize_value_rounds_and_clamps() {
    assert_eq!(quantize_value(2.4, 1.0), 2);
    assert_eq!(quantize_value(2.5, 1.0), 3);
    assert_eq!(quantize_value(-2.5, 1.0), -3);
    assert_eq!(quantize_value(1000.0, 1.0), 127);
    assert_eq!(quantize_value(-1000.0, 1.0), -128);
    assert_eq!(quantize_value(5.0, 0.0), 0);
}

#[test]
fn test_scale_per_batch_and_position() {
    // (batch=2, heads=2, seq=2, dim=2)
    let data: Vec<f32> = vec![
        // b0 h0: s0, s1
        1.0, -2.0, 10.0, 0.0, //
        // b0 h1: s0, s1
        4.0, 0.5, -20.0, 1.0, //
        // b1 h0
        0.0, 0.0, 3.0, 3.0, //
        // b1 h1
        0.0, 0.0, -6.0, 2.0,
    ];
    let input = Tensor::from_vec(data, [2, 2, 2, 2]).unwrap();
    let q = quantize(&input).unwrap();

    assert_eq!(q.scales.dims(), &[2, 1, 2, 1]);
    let scales = q.scales.to_f32_vec();
    assert_eq!(scales[0], 4.0 / 127.0);
    assert_eq!(scales[1], 20.0 / 127.0);
    assert_eq!(scales[2], 0.0);
    assert_eq!(scales[3], 6.0 / 127.0);

    let codes = q.values.as_slice::<i8>().unwrap();
    // The max-magnitude element of each slab maps to +-127.
    assert_eq!(codes[4], 127);
    assert_eq!(codes[6], -127);
    assert_eq!(codes[14], -127);
    // Zero slab is all zeros.
    assert_eq!(&codes[8..10], &[0, 0]);
    assert_eq!(&codes[12..14], &[0, 0]);
}

#[test]
fn test_zero_tensor_quantizes_to_zero() {
    let input = Tensor::zeros([2, 4, 1, 8], DType::Bf16);
    let q = quantize(&input).unwrap();

    assert!(q.scales.to_f32_vec().iter().all(|&s| s == 0.0));
    assert!(q.values.as_slice::<i8>().unwrap().iter().all(|&c| c == 0));

    let restored = dequantize(&q.values, &q.scales).unwrap();
    assert!(restored.to_f32_vec().iter().all(|&x| x == 0.0));
}

#[test]
fn test_round_trip_within_one_step() {
    let mut rng = StdRng::seed_from_u64(7);
    let dims = [3, 4, 2, 16];
    let n: usize = dims.iter().product();
    let data: Vec<f32> = (0..n).map(|_| rng.gen_range(-8.0..8.0)).collect();
    let input = Tensor::from_vec(data.clone(), dims).unwrap();

    let q = quantize(&input).unwrap();
    let restored = dequantize(&q.values, &q.scales).unwrap().to_f32_vec();
    let scales = q.scales.to_f32_vec();

    for b in 0..dims[0] {
        for h in 0..dims[1] {
            for s in 0..dims[2] {
                let scale = scales[b * dims[2] + s];
                for d in 0..dims[3] {
                    let i = ((b * dims[1] + h) * dims[2] + s) * dims[3] + d;
                    let err = (restored[i] - data[i]).abs();
                    assert!(err <= scale, "element {i}: error {err} exceeds scale {scale}");
                }
            }
        }
    }
}

#[test]
fn test_round_trip_exact_on_multiples_of_scale() {
    // max |x| = 127 gives scale exactly 1.0.
    let data: Vec<f32> = (-63..65).map(|k| (k * 2 - 1) as f32).collect();
    assert_eq!(data.len(), 128);
    let input = Tensor::from_vec(data.clone(), [1, 4, 1, 32]).unwrap();

    let q = quantize(&input).unwrap();
    assert_eq!(q.scales.to_f32_vec(), vec![1.0]);
    let restored = dequantize(&q.values, &q.scales).unwrap();
    assert_eq!(restored.to_f32_vec(), data);
}

#[test]
fn test_quantize_rejects_int8_input() {
    let input = Tensor::zeros([1, 1, 1, 4], DType::I8);
    assert!(matches!(quantize(&input), Err(KvCacheError::NotWide(DType::I8))));
}

#[test]
fn test_dequantize_checks_scale_shape() {
    let codes = Tensor::zeros([2, 2, 3, 4], DType::I8);
    let scales = Tensor::ones([2, 1, 1, 1], DType::F32);
    assert!(matches!(
        dequantize(&codes, &scales),
        Err(KvCacheError::ShapeMismatch { what: "scales", .. })
    ));
}
