//! DnnForge - cached DNN primitive kernels for CPU tensor runtimes
//!
//! DnnForge plugs optimized forward-inference primitives into a host
//! tensor runtime. Each kernel compiles an execution plan for the exact
//! problem shape it sees, caches that plan process-wide, and reuses it
//! for every later invocation with the same shape. Tensors flow through
//! the kernels either in the runtime's public layout or in the primitive
//! library's own optimized layout.

#![allow(clippy::needless_range_loop)] // Clearer for strided tensor loops

pub mod dnn;
pub mod error;
pub mod logging;
pub mod ops;
pub mod runtime;
pub mod tensor;

pub use dnn::{DataType, DnnEngine, Element, MemoryFormat};
pub use error::{DnnForgeError, ForgeResult};
pub use logging::init_logging_default;
pub use ops::softmax::{PlanCache, PlanCacheConfig, SoftmaxKernel, SoftmaxParams};
pub use runtime::{global_registry, KernelKey, KernelRegistry, OpContext, OpKernel, OpStatus};
pub use tensor::{InternalMeta, Tensor, TensorLayout, TensorShape};
