//! Softmax problem descriptors

use crate::dnn::MemoryFormat;

/// Frozen description of one softmax problem: logical dims in library
/// order, the physical format to prepare for, and the reduction axis.
///
/// The cache key is derived from dims and axis only. The layout resolver
/// makes the format a function of rank and layout class, so two
/// invocations agreeing on dims and axis always agree on format too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftmaxParams {
    pub dims: Vec<usize>,
    pub format: MemoryFormat,
    pub axis: usize,
}

impl SoftmaxParams {
    pub fn new(dims: Vec<usize>, format: MemoryFormat, axis: usize) -> Self {
        SoftmaxParams { dims, format, axis }
    }

    /// Canonical cache key: a fixed prefix, the dims, and the axis
    pub fn cache_key(&self) -> String {
        let mut key = String::from("softmax_fwd");
        for dim in &self.dims {
            key.push(':');
            key.push_str(&dim.to_string());
        }
        key.push(':');
        key.push_str(&self.axis.to_string());
        key
    }
}
