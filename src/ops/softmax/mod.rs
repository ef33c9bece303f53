//! Forward softmax kernel
//!
//! The kernel entry point for the host runtime: resolves the input
//! tensor's layout, fetches or builds the matching compute plan, and
//! runs it against the invocation's buffers. Plans are cached
//! process-wide per element type, so repeated invocations with the same
//! shape pay the preparation cost once.

pub mod cache;
pub mod params;
pub mod plan;

use std::marker::PhantomData;
use std::sync::Arc;

use crate::dnn::{Element, MemoryFormat};
use crate::error::{DnnForgeError, ForgeResult};
use crate::ops::softmax::cache::global_plan_cache;
use crate::runtime::{OpContext, OpKernel};
use crate::tensor::{InternalMeta, Tensor, TensorLayout, TensorShape};

pub use cache::{DnnPlanBuilder, PlanBuilder, PlanCache, PlanCacheConfig};
pub use params::SoftmaxParams;
pub use plan::SoftmaxPlan;

/// Layout resolution for one invocation: the problem dims in library
/// order, the reduction axis, the physical format to prepare the plan
/// for, and the per-rank format tag for the output's public-equivalent
/// metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResolvedLayout {
    dims: Vec<usize>,
    axis: usize,
    format: MemoryFormat,
    public_tag: MemoryFormat,
}

/// Derive dims, axis, and formats from the input's layout class.
///
/// Internal-layout inputs reduce over the channel axis (index 1) and
/// keep the physical format their metadata records; the per-rank table
/// format only tags the output's public-equivalent view. Public-layout
/// inputs reduce over the last axis and use the table format directly.
fn resolve_layout(input: &Tensor) -> ForgeResult<ResolvedLayout> {
    let rank = input.logical_rank();
    let internal = input.is_internal_layout();

    let public_tag = match rank {
        1 => MemoryFormat::X,
        2 => MemoryFormat::Nc,
        3 => MemoryFormat::Tnc,
        4 => {
            if internal {
                MemoryFormat::Nhwc
            } else {
                MemoryFormat::Nchw
            }
        }
        5 => {
            if internal {
                MemoryFormat::Ndhwc
            } else {
                MemoryFormat::Ncdhw
            }
        }
        _ => {
            return Err(DnnForgeError::InvalidTensorShape(format!(
                "rank {} outside the supported 1..=5 range",
                rank
            )))
        }
    };

    match input.internal_meta() {
        Some(meta) => Ok(ResolvedLayout {
            dims: meta.dims.clone(),
            axis: 1,
            format: meta.format,
            public_tag,
        }),
        None => Ok(ResolvedLayout {
            dims: input.shape().dims().to_vec(),
            axis: rank - 1,
            format: public_tag,
            public_tag,
        }),
    }
}

/// Forward softmax kernel for one element type.
///
/// Instances share the process-wide plan cache for their element type,
/// so plans prepared through one instance are reused by every other.
/// `compute` is safe to call from concurrent scheduler threads.
pub struct SoftmaxKernel<T: Element> {
    cache: Arc<PlanCache>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Element> SoftmaxKernel<T> {
    pub fn new() -> Self {
        Self::with_cache(global_plan_cache(T::DATA_TYPE))
    }

    /// Use an explicit cache instead of the process-wide one. The cache
    /// must be for this kernel's element type.
    pub fn with_cache(cache: Arc<PlanCache>) -> Self {
        debug_assert_eq!(cache.data_type(), T::DATA_TYPE);
        SoftmaxKernel {
            cache,
            _marker: PhantomData,
        }
    }

    fn run(&self, ctx: &OpContext) -> ForgeResult<Tensor> {
        let input = ctx.input(0)?;
        let resolved = resolve_layout(input)?;

        let params = SoftmaxParams::new(resolved.dims.clone(), resolved.format, resolved.axis);
        let plan = self.cache.get_or_create(&params)?;

        // Output layout class follows the input's. Internal outputs are
        // allocated from the plan's destination byte size because the
        // primitive's chosen layout may pad; their logical view is the
        // resolved dims under the table format tag.
        let mut output = if input.is_internal_layout() {
            let elements = plan.dst_desc().byte_size() / T::DATA_TYPE.size();
            let meta = InternalMeta {
                dims: resolved.dims.clone(),
                format: plan.dst_desc().format(),
                public_format: resolved.public_tag,
            };
            Tensor::zeroed(
                T::DATA_TYPE,
                TensorShape::from_dims(&[elements]),
                TensorLayout::Internal(meta),
            )
        } else {
            Tensor::zeroed(
                T::DATA_TYPE,
                TensorShape::from_dims(&resolved.dims),
                TensorLayout::Public,
            )
        };

        let src = input.as_slice::<T>()?;
        let dst = output.as_mut_slice::<T>()?;
        // SAFETY: tensor construction guarantees the input buffer covers
        // src_desc and the freshly allocated output covers dst_desc;
        // the two tensors never share storage.
        unsafe {
            plan.execute(src.as_ptr() as *const u8, dst.as_mut_ptr() as *mut u8)?;
        }

        Ok(output)
    }
}

impl<T: Element> Default for SoftmaxKernel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element> OpKernel for SoftmaxKernel<T> {
    fn name(&self) -> &'static str {
        "Softmax"
    }

    fn compute(&self, ctx: &mut OpContext) {
        let rank = match ctx.input(0) {
            Ok(tensor) => tensor.logical_rank(),
            Err(err) => {
                ctx.abort(err.to_string());
                return;
            }
        };
        if !(1..=5).contains(&rank) {
            ctx.abort("input rank must be >= 1 and <= 5");
            return;
        }

        match self.run(ctx) {
            Ok(output) => ctx.set_output(output),
            Err(err) => ctx.abort(abort_message(&err)),
        }
    }
}

/// Render a failure as the runtime's aborted-operation message. Library
/// failures carry the library's numeric status and message plus a
/// source-location tag.
fn abort_message(err: &DnnForgeError) -> String {
    match err {
        DnnForgeError::Dnn(dnn) => format!(
            "operation received an exception: status: {}, message: {}, in {}:{}",
            dnn.status.code(),
            dnn.message,
            file!(),
            line!()
        ),
        other => format!("operation failed: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dnn::DataType;

    fn public_tensor(dims: &[usize]) -> Tensor {
        Tensor::zeroed(
            DataType::F32,
            TensorShape::from_dims(dims),
            TensorLayout::Public,
        )
    }

    fn internal_tensor(dims: Vec<usize>, format: MemoryFormat, public_format: MemoryFormat) -> Tensor {
        let meta = InternalMeta {
            format,
            public_format,
            dims,
        };
        let padded = meta.format.padded_count(&meta.dims);
        Tensor::zeroed(
            DataType::F32,
            TensorShape::from_dims(&[padded]),
            TensorLayout::Internal(meta),
        )
    }

    #[test]
    fn test_public_layout_reduces_over_last_axis() {
        let cases: [(&[usize], MemoryFormat); 5] = [
            (&[7], MemoryFormat::X),
            (&[2, 3], MemoryFormat::Nc),
            (&[2, 3, 4], MemoryFormat::Tnc),
            (&[2, 3, 4, 5], MemoryFormat::Nchw),
            (&[2, 3, 4, 5, 6], MemoryFormat::Ncdhw),
        ];
        for (dims, expected) in cases {
            let resolved = resolve_layout(&public_tensor(dims)).unwrap();
            assert_eq!(resolved.axis, dims.len() - 1);
            assert_eq!(resolved.format, expected);
            assert_eq!(resolved.public_tag, expected);
            assert_eq!(resolved.dims, dims);
        }
    }

    #[test]
    fn test_internal_layout_reduces_over_channels() {
        let t = internal_tensor(
            vec![2, 10, 3, 3],
            MemoryFormat::NChw8c,
            MemoryFormat::Nhwc,
        );
        let resolved = resolve_layout(&t).unwrap();
        assert_eq!(resolved.axis, 1);
        // The plan sees the recorded physical format, not the table tag
        assert_eq!(resolved.format, MemoryFormat::NChw8c);
        assert_eq!(resolved.public_tag, MemoryFormat::Nhwc);
        assert_eq!(resolved.dims, vec![2, 10, 3, 3]);
    }

    #[test]
    fn test_internal_rank5_tag_is_channel_last() {
        let t = internal_tensor(
            vec![1, 4, 2, 2, 2],
            MemoryFormat::Ndhwc,
            MemoryFormat::Ndhwc,
        );
        let resolved = resolve_layout(&t).unwrap();
        assert_eq!(resolved.public_tag, MemoryFormat::Ndhwc);
        assert_eq!(resolved.axis, 1);
    }

    #[test]
    fn test_unsupported_rank_is_rejected() {
        assert!(resolve_layout(&public_tensor(&[])).is_err());
        assert!(resolve_layout(&public_tensor(&[1, 2, 3, 4, 5, 6])).is_err());
    }

    #[test]
    fn test_abort_message_carries_library_status() {
        let err: DnnForgeError = crate::dnn::DnnError::runtime("engine fault").into();
        let message = abort_message(&err);
        assert!(message.contains("status: 4"));
        assert!(message.contains("engine fault"));
        assert!(message.contains(".rs:"));
    }
}
