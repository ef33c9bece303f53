//! Memory descriptors and bindable memory objects

use std::sync::atomic::{AtomicPtr, Ordering};

use crate::dnn::data_type::DataType;
use crate::dnn::error::{DnnError, DnnResult};
use crate::dnn::format::MemoryFormat;

/// Sentinel byte that unbound memory objects point at. Never read or
/// written; it only marks a slot as "not bound to caller data".
static DUMMY: u8 = 0;

/// The sentinel data handle
pub fn dummy_handle() -> *mut u8 {
    &DUMMY as *const u8 as *mut u8
}

/// Description of a memory object: logical dimensions, element type, and
/// physical format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryDesc {
    dims: Vec<usize>,
    data_type: DataType,
    format: MemoryFormat,
}

impl MemoryDesc {
    pub fn new(dims: Vec<usize>, data_type: DataType, format: MemoryFormat) -> DnnResult<Self> {
        if dims.len() != format.rank() {
            return Err(DnnError::invalid_arguments(format!(
                "format {:?} expects rank {}, got {} dims",
                format,
                format.rank(),
                dims.len()
            )));
        }
        if dims.iter().any(|&d| d == 0) {
            return Err(DnnError::invalid_arguments(format!(
                "zero-sized dimension in {:?}",
                dims
            )));
        }
        Ok(MemoryDesc {
            dims,
            data_type,
            format,
        })
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn format(&self) -> MemoryFormat {
        self.format
    }

    /// Element count of the physical buffer, padding included
    pub fn padded_count(&self) -> usize {
        self.format.padded_count(&self.dims)
    }

    /// Byte size of the physical buffer, padding included
    pub fn byte_size(&self) -> usize {
        self.padded_count() * self.data_type.size()
    }
}

/// A memory object: a descriptor plus a rebindable data handle.
///
/// Memory objects are created bound to the sentinel handle. Callers bind
/// real buffers around execution and rebind the sentinel afterwards, so
/// a prepared primitive never retains a pointer into caller data between
/// calls. The handle is atomic; serializing bind/execute/unbind against
/// concurrent users is the caller's responsibility.
#[derive(Debug)]
pub struct DnnMemory {
    desc: MemoryDesc,
    handle: AtomicPtr<u8>,
}

impl DnnMemory {
    /// Create a memory object bound to the sentinel handle
    pub fn with_dummy_handle(desc: MemoryDesc) -> Self {
        DnnMemory {
            desc,
            handle: AtomicPtr::new(dummy_handle()),
        }
    }

    pub fn desc(&self) -> &MemoryDesc {
        &self.desc
    }

    pub fn set_data_handle(&self, ptr: *mut u8) {
        self.handle.store(ptr, Ordering::Release);
    }

    /// Rebind the sentinel handle
    pub fn reset_data_handle(&self) {
        self.handle.store(dummy_handle(), Ordering::Release);
    }

    pub fn data_handle(&self) -> *mut u8 {
        self.handle.load(Ordering::Acquire)
    }

    pub fn is_bound(&self) -> bool {
        !std::ptr::eq(self.data_handle(), dummy_handle())
    }
}
