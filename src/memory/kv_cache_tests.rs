// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Tests for the KV cache variants.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use half::bf16;
use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};

use super::*;
use crate::memory::kv_quant::dequantize;
use crate::sharding::{DeviceMesh, ShardingSpec};
use crate::tensor::{DType, Tensor};

fn replicated() -> ShardingSpec {
    ShardingSpec::replicated(Arc::new(DeviceMesh::new(1).unwrap()))
}

fn step(shape: CacheShape, fill: impl Fn(usize) -> f32, dtype: DType) -> Tensor {
    let dims = shape.step_dims();
    let n: usize = dims.iter().product();
    let data: Vec<f32> = (0..n).map(fill).collect();
    Tensor::from_f32(&data, dims, dtype).unwrap()
}

#[test]
fn test_prefill_overwrites() {
    let mut cache = PrefillCache::new(false);
    assert!(cache.state().is_none());

    let k1 = Tensor::full(1.0, [1, 2, 5, 4], DType::F32);
    let v1 = Tensor::full(2.0, [1, 2, 5, 4], DType::F32);
    cache.update(k1, v1).unwrap();

    let k2 = Tensor::full(3.0, [1, 2, 7, 4], DType::F32);
    let v2 = Tensor::full(4.0, [1, 2, 7, 4], DType::F32);
    let view = cache.update(k2.clone(), v2.clone()).unwrap();
    assert!(!view.is_quantized());

    let (k, v) = cache.state().unwrap();
    assert_eq!(k, &k2);
    assert_eq!(v, &v2);
}

#[test]
fn test_prefill_quantized_signature() {
    let mut cache = PrefillCache::new(true);
    let key = Tensor::full(0.5, [2, 4, 6, 8], DType::Bf16);
    let value = Tensor::full(-0.5, [2, 4, 6, 8], DType::Bf16);

    let view = cache.update(key.clone(), value).unwrap();
    let (ks, vs) = view.scales().unwrap();
    assert_eq!(view.keys(), &key);
    assert_eq!(ks.dims(), &[2, 1, 6, 1]);
    assert_eq!(ks.dtype(), DType::Bf16);
    assert!(ks.as_slice::<bf16>().unwrap().iter().all(|s| *s == bf16::ONE));
    assert_eq!(ks, vs);
}

#[test]
fn test_prefill_rejects_mismatched_pair() {
    let mut cache = PrefillCache::new(false);
    let key = Tensor::zeros([1, 2, 3, 4], DType::F32);
    let value = Tensor::zeros([1, 2, 4, 4], DType::F32);
    assert!(matches!(
        cache.update(key.clone(), value),
        Err(KvCacheError::ShapeMismatch { what: "value", .. })
    ));

    let value = Tensor::zeros([1, 2, 3, 4], DType::Bf16);
    assert!(matches!(
        cache.update(key, value),
        Err(KvCacheError::DTypeMismatch { what: "value", .. })
    ));
    assert!(cache.state().is_none());
}

#[test]
fn test_generate_empty_is_zero() {
    let shape = CacheShape::new(2, 3, 8, 4);
    let cache = GenerateCache::empty(shape, replicated(), DType::Bf16).unwrap();

    let (k, v) = cache.state();
    assert_eq!(k.dims(), &[2, 3, 8, 4]);
    assert_eq!(k.dtype(), DType::Bf16);
    assert!(k.to_f32_vec().iter().all(|&x| x == 0.0));
    assert!(v.to_f32_vec().iter().all(|&x| x == 0.0));
    assert_eq!(cache.positions(), &[0, 0]);
    assert_eq!(cache.size_in_bytes(), 2 * 2 * 3 * 8 * 4 * 2);
}

#[test]
fn test_generate_rejects_int8_dtype() {
    let shape = CacheShape::new(1, 1, 4, 4);
    assert!(matches!(
        GenerateCache::empty(shape, replicated(), DType::I8),
        Err(KvCacheError::NotWide(DType::I8))
    ));
}

#[test]
fn test_generate_write_locality() {
    let shape = CacheShape::new(2, 2, 8, 3);
    let n = shape.elem_count();
    let pattern: Vec<f32> = (0..n).map(|i| i as f32 + 1.0).collect();
    let k = Tensor::from_vec(pattern.clone(), shape.dims()).unwrap();
    let v = Tensor::from_vec(pattern.iter().map(|x| -x).collect::<Vec<_>>(), shape.dims()).unwrap();
    let aux = GenerateAux {
        positions: vec![0, 0],
        sharding: replicated(),
    };
    let mut cache = GenerateCache::from_plain_parts(aux, vec![k.clone(), v]).unwrap();

    // Row 0 writes position 3; row 1 rewrites its position 5 with its own keys.
    let mut data = vec![100.0f32; 6];
    data.extend((0..2).flat_map(|h| (0..3).map(move |d| ((((2 + h) * 8) + 5) * 3 + d) as f32 + 1.0)));
    let key = Tensor::from_vec(data, shape.step_dims()).unwrap();
    let value = step(shape, |_| 0.0, DType::F32);

    cache.update(&key, &value, &[3, 5]).unwrap();
    let (after, _) = cache.state();

    for b in 0..2 {
        for h in 0..2 {
            for c in 0..8 {
                for d in 0..3 {
                    let idx = [b, h, c, d];
                    let got = after.get_f32(&idx).unwrap();
                    if b == 0 && c == 3 {
                        assert_eq!(got, 100.0);
                    } else {
                        assert_eq!(got, k.get_f32(&idx).unwrap(), "cell {idx:?} changed");
                    }
                }
            }
        }
    }
    assert_eq!(cache.positions(), &[3, 5]);
}

#[test]
fn test_generate_returns_full_history() {
    let shape = CacheShape::new(1, 1, 4, 2);
    let mut cache = GenerateCache::empty(shape, replicated(), DType::F32).unwrap();

    for pos in 0..3 {
        let key = step(shape, |d| (pos * 10 + d) as f32, DType::F32);
        let value = step(shape, |d| -((pos * 10 + d) as f32), DType::F32);
        cache.update(&key, &value, &[pos]).unwrap();
    }

    let (k, v) = cache.state();
    assert_eq!(k.to_f32_vec(), vec![0.0, 1.0, 10.0, 11.0, 20.0, 21.0, 0.0, 0.0]);
    assert_eq!(v.to_f32_vec(), vec![-0.0, -1.0, -10.0, -11.0, -20.0, -21.0, 0.0, 0.0]);
}

#[test]
fn test_generate_rejects_out_of_bounds_position() {
    let shape = CacheShape::new(2, 1, 4, 2);
    let mut cache = GenerateCache::empty(shape, replicated(), DType::F32).unwrap();
    let key = step(shape, |_| 1.0, DType::F32);
    let value = step(shape, |_| 1.0, DType::F32);

    let err = cache.update(&key, &value, &[0, 4]).unwrap_err();
    assert!(matches!(
        err,
        KvCacheError::PositionOutOfBounds {
            row: 1,
            position: 4,
            capacity: 4
        }
    ));
    assert!(cache.state().0.to_f32_vec().iter().all(|&x| x == 0.0));

    assert!(matches!(
        cache.update(&key, &value, &[0]),
        Err(KvCacheError::PositionCountMismatch { expected: 2, got: 1 })
    ));
}

#[test]
fn test_generate_rejects_bad_step() {
    let shape = CacheShape::new(1, 2, 4, 2);
    let mut cache = GenerateCache::empty(shape, replicated(), DType::Bf16).unwrap();

    let two_steps = Tensor::zeros([1, 2, 2, 2], DType::Bf16);
    assert!(matches!(
        cache.update(&two_steps, &two_steps, &[0]),
        Err(KvCacheError::ShapeMismatch { what: "key step", .. })
    ));

    let f32_step = step(shape, |_| 1.0, DType::F32);
    assert!(matches!(
        cache.update(&f32_step, &f32_step, &[0]),
        Err(KvCacheError::DTypeMismatch { what: "key", expected: DType::Bf16, got: DType::F32 })
    ));
}

#[test]
fn test_int8_empty_invariants() {
    let shape = CacheShape::new(2, 4, 8, 16);
    let cache = Int8GenerateCache::empty(shape, replicated(), DType::Bf16).unwrap();

    let (k, v) = cache.state();
    assert_eq!(k.dtype(), DType::I8);
    assert!(k.as_slice::<i8>().unwrap().iter().all(|&c| c == 0));
    assert!(v.as_slice::<i8>().unwrap().iter().all(|&c| c == 0));

    let (ks, vs) = cache.scales();
    assert_eq!(ks.dims(), &[2, 1, 8, 1]);
    assert!(ks.to_f32_vec().iter().all(|&s| s == 1.0));
    assert!(vs.to_f32_vec().iter().all(|&s| s == 1.0));
}

#[test]
fn test_int8_update_writes_codes_and_scales() {
    let shape = CacheShape::new(2, 2, 4, 2);
    let mut cache = Int8GenerateCache::empty(shape, replicated(), DType::F32).unwrap();

    // Row 0: max |x| = 127 -> scale 1. Row 1: all zero -> scale 0.
    let data: Vec<f32> = vec![127.0, -3.0, 5.0, 1.0, 0.0, 0.0, 0.0, 0.0];
    let key = Tensor::from_vec(data.clone(), shape.step_dims()).unwrap();
    let value = Tensor::from_vec(data.iter().map(|x| x * 2.0).collect::<Vec<_>>(), shape.step_dims()).unwrap();

    let view = cache.update(&key, &value, &[1, 3]).unwrap();
    assert!(view.is_quantized());
    let (ks, vs) = view.scales().unwrap();
    assert_eq!(ks.get_f32(&[0, 0, 1, 0]).unwrap(), 1.0);
    assert_eq!(vs.get_f32(&[0, 0, 1, 0]).unwrap(), 2.0);
    assert_eq!(ks.get_f32(&[1, 0, 3, 0]).unwrap(), 0.0);
    // Untouched positions keep the unit scale.
    assert_eq!(ks.get_f32(&[0, 0, 0, 0]).unwrap(), 1.0);
    assert_eq!(ks.get_f32(&[1, 0, 1, 0]).unwrap(), 1.0);

    let keys = view.keys();
    assert_eq!(keys.get_f32(&[0, 0, 1, 0]).unwrap(), 127.0);
    assert_eq!(keys.get_f32(&[0, 0, 1, 1]).unwrap(), -3.0);
    assert_eq!(keys.get_f32(&[0, 1, 1, 0]).unwrap(), 5.0);
    assert_eq!(keys.get_f32(&[1, 0, 3, 0]).unwrap(), 0.0);

    let restored = dequantize(cache.state().1, cache.scales().1).unwrap();
    assert_eq!(restored.get_f32(&[0, 0, 1, 0]).unwrap(), 254.0);
    assert_eq!(cache.positions(), &[1, 3]);
}

#[test]
fn test_int8_rejects_out_of_bounds_position() {
    let shape = CacheShape::new(1, 1, 2, 2);
    let mut cache = Int8GenerateCache::empty(shape, replicated(), DType::Bf16).unwrap();
    let key = step(shape, |_| 1.0, DType::Bf16);
    assert!(matches!(
        cache.update(&key, &key, &[2]),
        Err(KvCacheError::PositionOutOfBounds { .. })
    ));
    assert!(cache.scales().0.to_f32_vec().iter().all(|&s| s == 1.0));
}

#[test]
fn test_kv_cache_dispatch_positions() {
    let shape = CacheShape::new(1, 1, 4, 2);
    let key = step(shape, |_| 1.0, DType::F32);

    let mut prefill = KvCache::from(PrefillCache::new(false));
    assert!(matches!(
        prefill.update(key.clone(), key.clone(), Some(&[0][..])),
        Err(KvCacheError::PositionsNotAccepted)
    ));
    assert!(prefill.update(key.clone(), key.clone(), None).is_ok());
    assert_eq!(prefill.kind(), CacheKind::Prefill);
    assert!(prefill.positions().is_none());

    let mut generate = KvCache::from(GenerateCache::empty(shape, replicated(), DType::F32).unwrap());
    assert!(matches!(
        generate.update(key.clone(), key.clone(), None),
        Err(KvCacheError::PositionsRequired)
    ));
    let view = generate.update(key.clone(), key, Some(&[2][..])).unwrap();
    assert_eq!(view.keys().get_f32(&[0, 0, 2, 1]).unwrap(), 1.0);
    assert_eq!(generate.positions(), Some(&[2][..]));
    assert!(generate.scales().is_none());
    assert!(!generate.is_quantized());
}

/// Counts increments of `gg_kvcache_updates_total`.
struct UpdateCounter(Arc<AtomicU64>);

impl Recorder for UpdateCounter {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        if key.name() == "gg_kvcache_updates_total" {
            Counter::from_arc(self.0.clone())
        } else {
            Counter::noop()
        }
    }

    fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}

#[test]
fn test_rejected_updates_are_not_counted() {
    let shape = CacheShape::new(1, 1, 4, 2);
    let key = step(shape, |_| 1.0, DType::F32);
    let updates = Arc::new(AtomicU64::new(0));
    let recorder = UpdateCounter(updates.clone());

    metrics::with_local_recorder(&recorder, || {
        let mut prefill = KvCache::from(PrefillCache::new(false));
        assert!(prefill.update(key.clone(), key.clone(), Some(&[0][..])).is_err());

        let mut generate =
            KvCache::from(GenerateCache::empty(shape, replicated(), DType::F32).unwrap());
        assert!(generate.update(key.clone(), key.clone(), None).is_err());
        assert!(generate.update(key.clone(), key.clone(), Some(&[4][..])).is_err());
        assert_eq!(updates.load(Ordering::Relaxed), 0);
        assert_eq!(generate.positions(), Some(&[0][..]));

        assert!(generate.update(key.clone(), key.clone(), Some(&[1][..])).is_ok());
        assert!(prefill.update(key.clone(), key, None).is_ok());
    });
    assert_eq!(updates.load(Ordering::Relaxed), 2);
}

#[test]
fn test_plain_parts_round_trip() {
    let shape = CacheShape::new(2, 2, 4, 2);
    let sharding = ShardingSpec::by_axis(Arc::new(DeviceMesh::new(2).unwrap()), Some(1));
    let mut cache = KvCache::from(Int8GenerateCache::empty(shape, sharding.clone(), DType::Bf16).unwrap());
    let key = step(shape, |i| i as f32 - 3.0, DType::Bf16);
    cache.update(key.clone(), key, Some(&[2, 1][..])).unwrap();

    let (parts, aux) = cache.to_plain_parts();
    assert_eq!(parts.len(), 4);
    assert_eq!(
        aux,
        CacheAux::Int8Generate(GenerateAux {
            positions: vec![2, 1],
            sharding,
        })
    );

    let restored = KvCache::from_plain_parts(aux, parts).unwrap();
    assert_eq!(restored.kind(), CacheKind::Int8Generate);
    assert_eq!(restored.positions(), Some(&[2, 1][..]));
    assert_eq!(restored.state(), cache.state());
    assert_eq!(restored.scales(), cache.scales());
}

#[test]
fn test_plain_parts_prefill_flag() {
    let (parts, aux) = KvCache::from(PrefillCache::new(true)).into_plain_parts();
    assert!(parts.is_empty());
    let restored = KvCache::from_plain_parts(aux, parts).unwrap();
    assert!(restored.is_quantized());
    assert!(restored.state().is_none());

    let mut cache = PrefillCache::new(true);
    cache
        .update(Tensor::ones([1, 1, 3, 2], DType::F32), Tensor::ones([1, 1, 3, 2], DType::F32))
        .unwrap();
    let (parts, aux) = cache.into_plain_parts();
    let restored = PrefillCache::from_plain_parts(aux, parts).unwrap();
    assert!(restored.kv_quantize());
    assert_eq!(restored.state().unwrap().0.dims(), &[1, 1, 3, 2]);
}

#[test]
fn test_plain_parts_rejects_bad_input() {
    let aux = GenerateAux {
        positions: vec![0],
        sharding: replicated(),
    };
    let k = Tensor::zeros([1, 1, 4, 2], DType::F32);
    assert!(matches!(
        GenerateCache::from_plain_parts(aux.clone(), vec![k.clone()]),
        Err(KvCacheError::InvalidParts(_))
    ));

    let bad_pos = GenerateAux {
        positions: vec![9],
        sharding: replicated(),
    };
    assert!(matches!(
        GenerateCache::from_plain_parts(bad_pos, vec![k.clone(), k.clone()]),
        Err(KvCacheError::InvalidParts(_))
    ));

    let wide = Tensor::zeros([1, 1, 4, 2], DType::F32);
    let scales = Tensor::ones([1, 1, 4, 1], DType::F32);
    assert!(matches!(
        Int8GenerateCache::from_plain_parts(aux, vec![wide.clone(), wide, scales.clone(), scales]),
        Err(KvCacheError::DTypeMismatch { what: "cache buffer", .. })
    ));
}

#[test]
fn test_layers_update_in_parallel() {
    let shape = CacheShape::new(1, 2, 8, 4);
    let mut layers: Vec<KvCache> = (0..4)
        .map(|_| GenerateCache::empty(shape, replicated(), DType::F32).unwrap().into())
        .collect();

    std::thread::scope(|scope| {
        for (layer, cache) in layers.iter_mut().enumerate() {
            scope.spawn(move || {
                let key = step(shape, |_| layer as f32, DType::F32);
                cache.update(key.clone(), key, Some(&[layer][..])).unwrap();
            });
        }
    });

    for (layer, cache) in layers.iter().enumerate() {
        let (k, _) = cache.state().unwrap();
        assert_eq!(k.get_f32(&[0, 1, layer, 3]).unwrap(), layer as f32);
    }
}
