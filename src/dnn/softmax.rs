//! Forward softmax primitive
//!
//! A [`SoftmaxForward`] is prepared once for a fixed memory descriptor
//! and axis, then executed any number of times against memory objects
//! bound to real buffers. Preparation validates the problem and freezes
//! the source/destination descriptors; execution carries out the
//! numerics (max-subtraction, exponentiation, normalization) over the
//! physical layout the descriptor declares.

use rayon::prelude::*;

use crate::dnn::data_type::{DataType, Element};
use crate::dnn::engine::{DnnEngine, EngineKind};
use crate::dnn::error::{DnnError, DnnResult};
use crate::dnn::memory::{DnnMemory, MemoryDesc};

/// Rows shorter than this are not worth fanning out to the thread pool
const PARALLEL_ROW_THRESHOLD: usize = 64;

/// Description of a forward softmax computation
#[derive(Debug, Clone)]
pub struct SoftmaxForwardDesc {
    src: MemoryDesc,
    axis: usize,
}

impl SoftmaxForwardDesc {
    pub fn new(src: MemoryDesc, axis: usize) -> DnnResult<Self> {
        if axis >= src.dims().len() {
            return Err(DnnError::invalid_arguments(format!(
                "softmax axis {} out of range for rank {}",
                axis,
                src.dims().len()
            )));
        }
        Ok(SoftmaxForwardDesc { src, axis })
    }

    pub fn src(&self) -> &MemoryDesc {
        &self.src
    }

    pub fn axis(&self) -> usize {
        self.axis
    }
}

/// Prepared forward softmax primitive.
///
/// The destination descriptor is chosen by the primitive, not the
/// caller: softmax preserves the source's physical layout, so the
/// destination mirrors it, padding included.
#[derive(Debug)]
pub struct SoftmaxForward {
    src_md: MemoryDesc,
    dst_md: MemoryDesc,
    axis: usize,
}

impl SoftmaxForward {
    pub fn new(engine: &DnnEngine, desc: &SoftmaxForwardDesc) -> DnnResult<Self> {
        if engine.kind() != EngineKind::Cpu {
            return Err(DnnError::unimplemented(
                "softmax forward is only prepared for CPU engines",
            ));
        }
        let src_md = desc.src().clone();
        let dst_md = src_md.clone();
        Ok(SoftmaxForward {
            src_md,
            dst_md,
            axis: desc.axis(),
        })
    }

    pub fn src_desc(&self) -> &MemoryDesc {
        &self.src_md
    }

    pub fn dst_desc(&self) -> &MemoryDesc {
        &self.dst_md
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    /// Run the primitive over the buffers currently bound to `src` and
    /// `dst`.
    ///
    /// Buffer sizes are not validated here: the caller guarantees the
    /// bound buffers match the source/destination descriptor byte sizes.
    pub fn execute(&self, src: &DnnMemory, dst: &DnnMemory) -> DnnResult<()> {
        if !src.is_bound() || !dst.is_bound() {
            return Err(DnnError::runtime(
                "softmax forward executed with unbound memory",
            ));
        }
        match self.src_md.data_type() {
            DataType::F32 => self.run::<f32>(src.data_handle(), dst.data_handle()),
            DataType::F16 => self.run::<half::f16>(src.data_handle(), dst.data_handle()),
        }
    }

    fn run<T: Element>(&self, src: *mut u8, dst: *mut u8) -> DnnResult<()> {
        let dims = self.src_md.dims();
        let axis = self.axis;
        let axis_len = dims[axis];
        let fmt = self.src_md.format();

        // SAFETY: the execute() contract guarantees the bound handles
        // cover padded_count elements of T for src and dst respectively,
        // and that src/dst do not overlap.
        let src = unsafe {
            std::slice::from_raw_parts(src as *const T, self.src_md.padded_count())
        };
        let dst = unsafe {
            std::slice::from_raw_parts_mut(dst as *mut T, self.dst_md.padded_count())
        };

        if fmt.innermost_axis() == Some(axis) {
            // Reduction axis is contiguous: the buffer is exactly a
            // sequence of independent rows.
            if axis_len >= PARALLEL_ROW_THRESHOLD {
                src.par_chunks(axis_len)
                    .zip(dst.par_chunks_mut(axis_len))
                    .for_each(|(s, d)| softmax_row(s, d));
            } else {
                src.chunks(axis_len)
                    .zip(dst.chunks_mut(axis_len))
                    .for_each(|(s, d)| softmax_row(s, d));
            }
            return Ok(());
        }

        // Strided path: walk every index tuple outside the reduction
        // axis and gather along it through the format's offset map.
        let strides = fmt.strides(dims);
        let offset_of = |idx: &[usize]| -> usize {
            match &strides {
                Some(s) => idx.iter().zip(s.iter()).map(|(i, st)| i * st).sum(),
                None => fmt.offset(idx, dims),
            }
        };

        let outer_count: usize = dims
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != axis)
            .map(|(_, d)| d)
            .product();

        let mut idx = vec![0usize; dims.len()];
        for outer in 0..outer_count {
            // Decode `outer` into the non-axis coordinates
            let mut rem = outer;
            for i in (0..dims.len()).rev() {
                if i == axis {
                    continue;
                }
                idx[i] = rem % dims[i];
                rem /= dims[i];
            }

            let mut max = f32::NEG_INFINITY;
            for a in 0..axis_len {
                idx[axis] = a;
                let v = src[offset_of(&idx)].to_f32();
                if v > max {
                    max = v;
                }
            }

            let mut sum = 0.0f32;
            for a in 0..axis_len {
                idx[axis] = a;
                let off = offset_of(&idx);
                let v = src[off].to_f32();
                let e = if v == f32::NEG_INFINITY {
                    0.0
                } else {
                    (v - max).exp()
                };
                dst[off] = T::from_f32(e);
                sum += e;
            }

            if sum > 0.0 {
                for a in 0..axis_len {
                    idx[axis] = a;
                    let off = offset_of(&idx);
                    dst[off] = T::from_f32(dst[off].to_f32() / sum);
                }
            }
        }

        Ok(())
    }
}

/// Softmax over one contiguous row
fn softmax_row<T: Element>(src: &[T], dst: &mut [T]) {
    let mut max = f32::NEG_INFINITY;
    for v in src {
        let v = v.to_f32();
        if v > max {
            max = v;
        }
    }

    let mut sum = 0.0f32;
    for (s, d) in src.iter().zip(dst.iter_mut()) {
        let v = s.to_f32();
        let e = if v == f32::NEG_INFINITY {
            0.0
        } else {
            (v - max).exp()
        };
        *d = T::from_f32(e);
        sum += e;
    }

    if sum > 0.0 {
        for d in dst.iter_mut() {
            *d = T::from_f32(d.to_f32() / sum);
        }
    }
}
