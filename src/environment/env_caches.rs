// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-layer cache factories and the session plan.

use serde::Serialize;
use tracing::debug;

use super::{Environment, EnvironmentError};
use crate::memory::{CacheKind, GenerateCache, Int8GenerateCache, KvCache, PrefillCache};
use crate::sharding::PartitionSpec;
use crate::tensor::DType;

/// Serializable summary of how an environment lays out its caches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvironmentPlan {
    pub model_type: String,
    pub num_layers: usize,
    pub seq_len: usize,
    pub cache_kind: &'static str,
    pub cache_shape: [usize; 4],
    pub dtype: DType,
    pub scale_dtype: Option<DType>,
    pub cache_sharding_axis: usize,
    pub cache_axis_name: String,
    pub partition: PartitionSpec,
    pub mesh_shape: [usize; 2],
    pub local_cache_shape: Vec<usize>,
    pub divides_evenly: bool,
    pub bytes_per_layer: usize,
    pub total_bytes: usize,
}

impl Environment {
    /// Variant [`make_generate_caches`](Self::make_generate_caches) builds.
    pub fn generate_kind(&self) -> CacheKind {
        if self.config.enable_kv_quantization {
            CacheKind::Int8Generate
        } else {
            CacheKind::Generate
        }
    }

    /// One empty prefill cache per layer, in layer order.
    pub fn make_prefill_caches(&self) -> Vec<KvCache> {
        let kv_quantize = self.config.enable_kv_quantization;
        (0..self.num_layers)
            .map(|_| PrefillCache::new(kv_quantize).into())
            .collect()
    }

    /// One zeroed generate cache per layer, in layer order. Int8 when KV
    /// quantization is enabled, otherwise the wide dtype.
    pub fn make_generate_caches(&self) -> Result<Vec<KvCache>, EnvironmentError> {
        let dtype = self.config.wide_dtype();
        let kind = self.generate_kind();
        let mut caches = Vec::with_capacity(self.num_layers);
        for layer in 0..self.num_layers {
            debug!(layer, kind = kind.as_str(), "building cache");
            let sharding = self.cache_sharding.clone();
            let cache: KvCache = match kind {
                CacheKind::Int8Generate => Int8GenerateCache::empty(self.cache_shape, sharding, dtype)?.into(),
                _ => GenerateCache::empty(self.cache_shape, sharding, dtype)?.into(),
            };
            caches.push(cache);
        }

        metrics::counter!("gg_kvcache_layers_allocated_total", "variant" => kind.as_str())
            .increment(self.num_layers as u64);
        metrics::gauge!("gg_kvcache_allocated_bytes").set(self.total_cache_bytes() as f64);
        Ok(caches)
    }

    /// Bytes one layer's generate cache holds: keys plus values, and the two
    /// scale buffers when quantized.
    pub fn cache_bytes_per_layer(&self) -> usize {
        let shape = self.cache_shape;
        let wide = self.config.wide_dtype().size_in_bytes();
        match self.generate_kind() {
            CacheKind::Int8Generate => {
                let scales = shape.batch * shape.capacity;
                2 * shape.elem_count() * DType::I8.size_in_bytes() + 2 * scales * wide
            }
            _ => 2 * shape.elem_count() * wide,
        }
    }

    pub fn total_cache_bytes(&self) -> usize {
        self.cache_bytes_per_layer() * self.num_layers
    }

    pub fn plan(&self) -> EnvironmentPlan {
        let kind = self.generate_kind();
        let dims = self.cache_shape.dims();
        let axis = self.cache_sharding_axis();
        let wide = self.config.wide_dtype();
        let (dtype, scale_dtype) = match kind {
            CacheKind::Int8Generate => (DType::I8, Some(wide)),
            _ => (wide, None),
        };
        EnvironmentPlan {
            model_type: self.config.model_type.clone(),
            num_layers: self.num_layers,
            seq_len: self.seq_len(),
            cache_kind: kind.as_str(),
            cache_shape: dims,
            dtype,
            scale_dtype,
            cache_sharding_axis: axis,
            cache_axis_name: self
                .config
                .attention_kv_axis_names
                .get(axis)
                .cloned()
                .unwrap_or_default(),
            partition: self.cache_sharding.partition().clone(),
            mesh_shape: self.mesh.shape(),
            local_cache_shape: self.cache_sharding.local_shape(&dims),
            divides_evenly: self.cache_sharding.divides_evenly(&dims),
            bytes_per_layer: self.cache_bytes_per_layer(),
            total_bytes: self.total_cache_bytes(),
        }
    }
}
