// Copyright 2024-2026 GG-CORE Contributors
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use half::bf16;
use serde::{Deserialize, Serialize};

use super::{Shape, TensorError};

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    F32,
    Bf16,
    I8,
}

impl DType {
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F32 => 4,
            DType::Bf16 => 2,
            DType::I8 => 1,
        }
    }

    /// True for the float types a cache may hold unquantized.
    pub fn is_wide(&self) -> bool {
        matches!(self, DType::F32 | DType::Bf16)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::Bf16 => "bf16",
            DType::I8 => "i8",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backing storage, one variant per [`DType`].
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    F32(Vec<f32>),
    Bf16(Vec<bf16>),
    I8(Vec<i8>),
}

impl Storage {
    pub fn dtype(&self) -> DType {
        match self {
            Storage::F32(_) => DType::F32,
            Storage::Bf16(_) => DType::Bf16,
            Storage::I8(_) => DType::I8,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Storage::F32(v) => v.len(),
            Storage::Bf16(v) => v.len(),
            Storage::I8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn filled(dtype: DType, len: usize, value: f32) -> Self {
        match dtype {
            DType::F32 => Storage::F32(vec![value; len]),
            DType::Bf16 => Storage::Bf16(vec![bf16::from_f32(value); len]),
            DType::I8 => Storage::I8(vec![i8::from_f32(value); len]),
        }
    }

    fn from_f32_iter(dtype: DType, iter: impl Iterator<Item = f32>) -> Self {
        match dtype {
            DType::F32 => Storage::F32(iter.collect()),
            DType::Bf16 => Storage::Bf16(iter.map(bf16::from_f32).collect()),
            DType::I8 => Storage::I8(iter.map(i8::from_f32).collect()),
        }
    }

    fn to_f32_vec(&self) -> Vec<f32> {
        match self {
            Storage::F32(v) => v.clone(),
            Storage::Bf16(v) => v.iter().map(|x| x.to_f32()).collect(),
            Storage::I8(v) => v.iter().map(|&x| x as f32).collect(),
        }
    }
}

/// Scalar types a [`Tensor`] can hold.
pub trait Element: Copy + PartialEq + fmt::Debug + Send + Sync + 'static {
    const DTYPE: DType;

    fn to_f32(self) -> f32;

    /// Convert from f32, saturating for integer types.
    fn from_f32(value: f32) -> Self;

    fn slice(storage: &Storage) -> Option<&[Self]>;

    fn slice_mut(storage: &mut Storage) -> Option<&mut [Self]>;

    fn into_storage(data: Vec<Self>) -> Storage;
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;

    fn to_f32(self) -> f32 {
        self
    }

    fn from_f32(value: f32) -> Self {
        value
    }

    fn slice(storage: &Storage) -> Option<&[Self]> {
        match storage {
            Storage::F32(v) => Some(v),
            _ => None,
        }
    }

    fn slice_mut(storage: &mut Storage) -> Option<&mut [Self]> {
        match storage {
            Storage::F32(v) => Some(v),
            _ => None,
        }
    }

    fn into_storage(data: Vec<Self>) -> Storage {
        Storage::F32(data)
    }
}

impl Element for bf16 {
    const DTYPE: DType = DType::Bf16;

    fn to_f32(self) -> f32 {
        bf16::to_f32(self)
    }

    fn from_f32(value: f32) -> Self {
        bf16::from_f32(value)
    }

    fn slice(storage: &Storage) -> Option<&[Self]> {
        match storage {
            Storage::Bf16(v) => Some(v),
            _ => None,
        }
    }

    fn slice_mut(storage: &mut Storage) -> Option<&mut [Self]> {
        match storage {
            Storage::Bf16(v) => Some(v),
            _ => None,
        }
    }

    fn into_storage(data: Vec<Self>) -> Storage {
        Storage::Bf16(data)
    }
}

impl Element for i8 {
    const DTYPE: DType = DType::I8;

    fn to_f32(self) -> f32 {
        self as f32
    }

    fn from_f32(value: f32) -> Self {
        value.round().clamp(i8::MIN as f32, i8::MAX as f32) as i8
    }

    fn slice(storage: &Storage) -> Option<&[Self]> {
        match storage {
            Storage::I8(v) => Some(v),
            _ => None,
        }
    }

    fn slice_mut(storage: &mut Storage) -> Option<&mut [Self]> {
        match storage {
            Storage::I8(v) => Some(v),
            _ => None,
        }
    }

    fn into_storage(data: Vec<Self>) -> Storage {
        Storage::I8(data)
    }
}

/// Owned row-major tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Shape,
    storage: Storage,
}

impl Tensor {
    /// Wrap `data` with `shape`; the element count must match.
    pub fn from_vec<T: Element>(data: Vec<T>, shape: impl Into<Shape>) -> Result<Self, TensorError> {
        let shape = shape.into();
        let expected = shape.elem_count();
        if data.len() != expected {
            return Err(TensorError::ElementCount {
                shape,
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            shape,
            storage: T::into_storage(data),
        })
    }

    /// Build a tensor of `dtype` from f32 values, converting each element.
    pub fn from_f32(data: &[f32], shape: impl Into<Shape>, dtype: DType) -> Result<Self, TensorError> {
        let shape = shape.into();
        let expected = shape.elem_count();
        if data.len() != expected {
            return Err(TensorError::ElementCount {
                shape,
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            shape,
            storage: Storage::from_f32_iter(dtype, data.iter().copied()),
        })
    }

    pub fn full(value: f32, shape: impl Into<Shape>, dtype: DType) -> Self {
        let shape = shape.into();
        let storage = Storage::filled(dtype, shape.elem_count(), value);
        Self { shape, storage }
    }

    pub fn zeros(shape: impl Into<Shape>, dtype: DType) -> Self {
        Self::full(0.0, shape, dtype)
    }

    pub fn ones(shape: impl Into<Shape>, dtype: DType) -> Self {
        Self::full(1.0, shape, dtype)
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    pub fn elem_count(&self) -> usize {
        self.storage.len()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.elem_count() * self.dtype().size_in_bytes()
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub(crate) fn storage_mut(&mut self) -> &mut Storage {
        &mut self.storage
    }

    /// Borrow the elements as `T`, failing if the dtype differs.
    pub fn as_slice<T: Element>(&self) -> Result<&[T], TensorError> {
        T::slice(&self.storage).ok_or(TensorError::DTypeMismatch {
            expected: T::DTYPE,
            got: self.dtype(),
        })
    }

    pub fn to_f32_vec(&self) -> Vec<f32> {
        self.storage.to_f32_vec()
    }

    /// Copy converted to `dtype`. Conversion to i8 rounds and saturates.
    pub fn to_dtype(&self, dtype: DType) -> Tensor {
        if dtype == self.dtype() {
            return self.clone();
        }
        Self {
            shape: self.shape.clone(),
            storage: Storage::from_f32_iter(dtype, self.to_f32_vec().into_iter()),
        }
    }

    /// Read one element as f32.
    pub fn get_f32(&self, index: &[usize]) -> Result<f32, TensorError> {
        let offset = self.shape.offset(index)?;
        Ok(match &self.storage {
            Storage::F32(v) => v[offset],
            Storage::Bf16(v) => v[offset].to_f32(),
            Storage::I8(v) => v[offset] as f32,
        })
    }
}
