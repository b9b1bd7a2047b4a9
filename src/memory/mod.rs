// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! KV cache storage and quantization.

pub mod kv_cache;
mod kv_cache_config;
mod kv_cache_core;
mod kv_cache_int8;
mod kv_cache_ops;
mod kv_cache_parts;
mod kv_cache_prefill;
pub mod kv_quant;

pub use kv_cache::{
    CacheAux, CacheKind, CacheShape, CacheView, GenerateAux, GenerateCache, Int8GenerateCache,
    KvCache, KvCacheError, PlainParts, PrefillAux, PrefillCache,
};
pub use kv_quant::{dequantize, quantize, Quantized};
