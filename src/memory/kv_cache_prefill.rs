// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Prefill cache: remembers the most recent full-prompt keys and values.

use super::kv_cache_config::{CacheView, KvCacheError};
use super::kv_cache_ops::check_key_value;
use super::kv_cache_parts::{take_parts, PlainParts, PrefillAux};
use crate::tensor::Tensor;

/// Holds one prompt's keys and values; each update replaces the last.
///
/// With `kv_quantize` set, updates also return unit scales shaped
/// `(batch, 1, seq, 1)` so callers see the same four-tensor signature as the
/// int8 generate cache.
#[derive(Debug, Clone, Default)]
pub struct PrefillCache {
    kv_quantize: bool,
    cache_k: Option<Tensor>,
    cache_v: Option<Tensor>,
    unit_scales: Option<Tensor>,
}

impl PrefillCache {
    pub fn new(kv_quantize: bool) -> Self {
        Self {
            kv_quantize,
            ..Default::default()
        }
    }

    pub fn kv_quantize(&self) -> bool {
        self.kv_quantize
    }

    /// Record `key` and `value` verbatim, dropping whatever was held before.
    pub fn update(&mut self, key: Tensor, value: Tensor) -> Result<CacheView<'_>, KvCacheError> {
        check_key_value(&key, &value)?;
        self.unit_scales = self.kv_quantize.then(|| unit_scales_for(&key));
        let keys = self.cache_k.insert(key);
        let values = self.cache_v.insert(value);
        Ok(match &self.unit_scales {
            Some(ones) => CacheView::Quantized {
                keys,
                values,
                key_scales: ones,
                value_scales: ones,
            },
            None => CacheView::Wide { keys, values },
        })
    }

    /// `(keys, values)` from the last update, if any.
    pub fn state(&self) -> Option<(&Tensor, &Tensor)> {
        self.cache_k.as_ref().zip(self.cache_v.as_ref())
    }
}

fn unit_scales_for(key: &Tensor) -> Tensor {
    let dims = key.dims();
    Tensor::ones([dims[0], 1, dims[2], 1], key.dtype())
}

impl PlainParts for PrefillCache {
    type Aux = PrefillAux;

    fn into_plain_parts(self) -> (Vec<Tensor>, PrefillAux) {
        let aux = PrefillAux {
            kv_quantize: self.kv_quantize,
        };
        let parts = match (self.cache_k, self.cache_v) {
            (Some(k), Some(v)) => vec![k, v],
            _ => Vec::new(),
        };
        (parts, aux)
    }

    fn from_plain_parts(aux: PrefillAux, parts: Vec<Tensor>) -> Result<Self, KvCacheError> {
        let mut cache = Self::new(aux.kv_quantize);
        if parts.is_empty() {
            return Ok(cache);
        }
        let count = parts.len();
        let [k, v] = take_parts::<2>(parts).map_err(|_| {
            KvCacheError::InvalidParts(format!(
                "prefill cache expects 0 or 2 tensors, got {}",
                count
            ))
        })?;
        check_key_value(&k, &v)?;
        cache.unit_scales = aux.kv_quantize.then(|| unit_scales_for(&k));
        cache.cache_k = Some(k);
        cache.cache_v = Some(v);
        Ok(cache)
    }
}
