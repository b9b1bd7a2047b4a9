// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-layer KV cache variants.
//!
//! Three implementations of one contract, selected by configuration:
//! - `PrefillCache` holds the last full-prompt keys/values, no preallocation.
//! - `GenerateCache` scatters each decode step into a fixed f32/bf16 buffer.
//! - `Int8GenerateCache` quantizes each step into int8 codes plus scales.
//!
//! Split into submodules:
//! - `kv_cache_config`: shapes, views and errors
//! - `kv_cache_prefill`, `kv_cache_core`, `kv_cache_int8`: the variants
//! - `kv_cache_parts`: flatten/unflatten for the execution layer

pub use super::kv_cache_config::{CacheShape, CacheView, KvCacheError};
pub use super::kv_cache_core::GenerateCache;
pub use super::kv_cache_int8::Int8GenerateCache;
pub use super::kv_cache_parts::{GenerateAux, PlainParts, PrefillAux};
pub use super::kv_cache_prefill::PrefillCache;

use crate::tensor::Tensor;

/// Which variant a [`KvCache`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Prefill,
    Generate,
    Int8Generate,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Prefill => "prefill",
            CacheKind::Generate => "generate",
            CacheKind::Int8Generate => "int8_generate",
        }
    }
}

/// One layer's cache, whichever variant configuration selected.
#[derive(Debug, Clone)]
pub enum KvCache {
    Prefill(PrefillCache),
    Generate(GenerateCache),
    Int8Generate(Int8GenerateCache),
}

impl KvCache {
    pub fn kind(&self) -> CacheKind {
        match self {
            KvCache::Prefill(_) => CacheKind::Prefill,
            KvCache::Generate(_) => CacheKind::Generate,
            KvCache::Int8Generate(_) => CacheKind::Int8Generate,
        }
    }

    /// Feed one step of keys and values and get back what attention reads.
    ///
    /// Generate variants need one position per batch row; prefill takes none.
    pub fn update(
        &mut self,
        key: Tensor,
        value: Tensor,
        positions: Option<&[usize]>,
    ) -> Result<CacheView<'_>, KvCacheError> {
        let kind = self.kind();
        let view = match (self, positions) {
            (KvCache::Prefill(cache), None) => cache.update(key, value),
            (KvCache::Prefill(_), Some(_)) => Err(KvCacheError::PositionsNotAccepted),
            (KvCache::Generate(cache), Some(pos)) => cache.update(&key, &value, pos),
            (KvCache::Int8Generate(cache), Some(pos)) => cache.update(&key, &value, pos),
            (_, None) => Err(KvCacheError::PositionsRequired),
        }?;
        metrics::counter!("gg_kvcache_updates_total", "variant" => kind.as_str()).increment(1);
        Ok(view)
    }

    /// Key and value buffers, stripped of sharding. `None` for a prefill
    /// cache that has not been updated yet.
    pub fn state(&self) -> Option<(&Tensor, &Tensor)> {
        match self {
            KvCache::Prefill(cache) => cache.state(),
            KvCache::Generate(cache) => Some(cache.state()),
            KvCache::Int8Generate(cache) => Some(cache.state()),
        }
    }

    /// Scale buffers of the int8 cache.
    pub fn scales(&self) -> Option<(&Tensor, &Tensor)> {
        match self {
            KvCache::Int8Generate(cache) => Some(cache.scales()),
            _ => None,
        }
    }

    /// Last positions written, for generate variants.
    pub fn positions(&self) -> Option<&[usize]> {
        match self {
            KvCache::Prefill(_) => None,
            KvCache::Generate(cache) => Some(cache.positions()),
            KvCache::Int8Generate(cache) => Some(cache.positions()),
        }
    }

    pub fn is_quantized(&self) -> bool {
        match self {
            KvCache::Prefill(cache) => cache.kv_quantize(),
            KvCache::Generate(_) => false,
            KvCache::Int8Generate(_) => true,
        }
    }
}

impl From<PrefillCache> for KvCache {
    fn from(cache: PrefillCache) -> Self {
        KvCache::Prefill(cache)
    }
}

impl From<GenerateCache> for KvCache {
    fn from(cache: GenerateCache) -> Self {
        KvCache::Generate(cache)
    }
}

impl From<Int8GenerateCache> for KvCache {
    fn from(cache: Int8GenerateCache) -> Self {
        KvCache::Int8Generate(cache)
    }
}

/// Non-tensor state of any [`KvCache`].
#[derive(Debug, Clone, PartialEq)]
pub enum CacheAux {
    Prefill(PrefillAux),
    Generate(GenerateAux),
    Int8Generate(GenerateAux),
}

impl PlainParts for KvCache {
    type Aux = CacheAux;

    fn into_plain_parts(self) -> (Vec<Tensor>, CacheAux) {
        match self {
            KvCache::Prefill(cache) => {
                let (parts, aux) = cache.into_plain_parts();
                (parts, CacheAux::Prefill(aux))
            }
            KvCache::Generate(cache) => {
                let (parts, aux) = cache.into_plain_parts();
                (parts, CacheAux::Generate(aux))
            }
            KvCache::Int8Generate(cache) => {
                let (parts, aux) = cache.into_plain_parts();
                (parts, CacheAux::Int8Generate(aux))
            }
        }
    }

    fn from_plain_parts(aux: CacheAux, parts: Vec<Tensor>) -> Result<Self, KvCacheError> {
        Ok(match aux {
            CacheAux::Prefill(aux) => PrefillCache::from_plain_parts(aux, parts)?.into(),
            CacheAux::Generate(aux) => GenerateCache::from_plain_parts(aux, parts)?.into(),
            CacheAux::Int8Generate(aux) => Int8GenerateCache::from_plain_parts(aux, parts)?.into(),
        })
    }
}

#[cfg(test)]
#[path = "kv_cache_tests.rs"]
mod tests;
