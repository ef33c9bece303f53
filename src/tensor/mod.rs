//! Host-runtime tensor model
//!
//! Tensors carry their data in one of two layout classes. A *public*
//! tensor is in the runtime's default arrangement and its shape is the
//! plain logical shape. An *internal* tensor is in a physical format
//! private to the primitive subsystem (possibly padded or reordered);
//! its allocation shape is a flat element count and the logical view
//! lives in the attached [`InternalMeta`].

use std::any::Any;

use half::f16;

use crate::dnn::{DataType, Element, MemoryFormat};
use crate::error::{DnnForgeError, ForgeResult};

/// Logical shape of a tensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorShape {
    dims: Vec<usize>,
}

impl TensorShape {
    pub fn from_dims(dims: &[usize]) -> Self {
        TensorShape {
            dims: dims.to_vec(),
        }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn element_count(&self) -> usize {
        self.dims.iter().copied().product()
    }
}

/// Metadata attached to internal-layout tensors: the logical dimensions
/// in the primitive library's order, the physical format of the buffer,
/// and the format tag describing the public-layout equivalent view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalMeta {
    pub dims: Vec<usize>,
    pub format: MemoryFormat,
    pub public_format: MemoryFormat,
}

/// Layout class of a tensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TensorLayout {
    Public,
    Internal(InternalMeta),
}

/// Element storage for the closed set of supported data types
#[derive(Debug, Clone)]
pub enum TensorData {
    F32(Vec<f32>),
    F16(Vec<f16>),
}

impl TensorData {
    fn data_type(&self) -> DataType {
        match self {
            TensorData::F32(_) => DataType::F32,
            TensorData::F16(_) => DataType::F16,
        }
    }

    fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::F16(v) => v.len(),
        }
    }

    fn as_any(&self) -> &dyn Any {
        match self {
            TensorData::F32(v) => v,
            TensorData::F16(v) => v,
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        match self {
            TensorData::F32(v) => v,
            TensorData::F16(v) => v,
        }
    }

    fn zeroed(data_type: DataType, count: usize) -> Self {
        match data_type {
            DataType::F32 => TensorData::F32(vec![0.0; count]),
            DataType::F16 => TensorData::F16(vec![f16::ZERO; count]),
        }
    }
}

impl From<Vec<f32>> for TensorData {
    fn from(v: Vec<f32>) -> Self {
        TensorData::F32(v)
    }
}

impl From<Vec<f16>> for TensorData {
    fn from(v: Vec<f16>) -> Self {
        TensorData::F16(v)
    }
}

/// A runtime tensor: element storage, a shape, and a layout tag
#[derive(Debug, Clone)]
pub struct Tensor {
    data: TensorData,
    shape: TensorShape,
    layout: TensorLayout,
}

impl Tensor {
    /// Build a public-layout tensor from element data
    pub fn from_vec<D: Into<TensorData>>(data: D, shape: TensorShape) -> ForgeResult<Self> {
        let data = data.into();
        if data.len() != shape.element_count() {
            return Err(DnnForgeError::InvalidTensorShape(format!(
                "{} elements do not fill shape {:?}",
                data.len(),
                shape.dims()
            )));
        }
        Ok(Tensor {
            data,
            shape,
            layout: TensorLayout::Public,
        })
    }

    /// Build an internal-layout tensor from element data already
    /// arranged in `meta.format`. The allocation shape is the flat
    /// padded element count.
    pub fn from_vec_internal<D: Into<TensorData>>(data: D, meta: InternalMeta) -> ForgeResult<Self> {
        let data = data.into();
        let padded = meta.format.padded_count(&meta.dims);
        if data.len() != padded {
            return Err(DnnForgeError::InvalidTensorShape(format!(
                "{} elements do not fill {:?} buffer of {} elements",
                data.len(),
                meta.format,
                padded
            )));
        }
        Ok(Tensor {
            shape: TensorShape::from_dims(&[data.len()]),
            data,
            layout: TensorLayout::Internal(meta),
        })
    }

    /// Allocate a zero-filled tensor
    pub fn zeroed(data_type: DataType, shape: TensorShape, layout: TensorLayout) -> Self {
        let count = shape.element_count();
        Tensor {
            data: TensorData::zeroed(data_type, count),
            shape,
            layout,
        }
    }

    pub fn shape(&self) -> &TensorShape {
        &self.shape
    }

    pub fn layout(&self) -> &TensorLayout {
        &self.layout
    }

    pub fn data_type(&self) -> DataType {
        self.data.data_type()
    }

    pub fn is_internal_layout(&self) -> bool {
        matches!(self.layout, TensorLayout::Internal(_))
    }

    pub fn internal_meta(&self) -> Option<&InternalMeta> {
        match &self.layout {
            TensorLayout::Internal(meta) => Some(meta),
            TensorLayout::Public => None,
        }
    }

    /// Rank of the logical view: the metadata dims for internal tensors,
    /// the plain shape otherwise
    pub fn logical_rank(&self) -> usize {
        match &self.layout {
            TensorLayout::Internal(meta) => meta.dims.len(),
            TensorLayout::Public => self.shape.rank(),
        }
    }

    /// Number of stored elements (padding included for internal layout)
    pub fn element_count(&self) -> usize {
        self.data.len()
    }

    /// Typed view of the element storage
    pub fn as_slice<T: Element>(&self) -> ForgeResult<&[T]> {
        self.data
            .as_any()
            .downcast_ref::<Vec<T>>()
            .map(Vec::as_slice)
            .ok_or_else(|| {
                DnnForgeError::ElementTypeMismatch(format!(
                    "tensor holds {:?}, requested {:?}",
                    self.data.data_type(),
                    T::DATA_TYPE
                ))
            })
    }

    /// Typed mutable view of the element storage
    pub fn as_mut_slice<T: Element>(&mut self) -> ForgeResult<&mut [T]> {
        let held = self.data.data_type();
        self.data
            .as_any_mut()
            .downcast_mut::<Vec<T>>()
            .map(Vec::as_mut_slice)
            .ok_or_else(|| {
                DnnForgeError::ElementTypeMismatch(format!(
                    "tensor holds {:?}, requested {:?}",
                    held,
                    T::DATA_TYPE
                ))
            })
    }
}
