//! Optimized CPU primitive library
//!
//! This module is the boundary to the math library that carries out the
//! actual numerics. The rest of the crate treats it the way it would an
//! external vendor library: engines, memory descriptors, prepared
//! primitives, and a stream that runs an execution list to completion.
//! Errors carry a numeric status code and are surfaced as [`DnnError`];
//! nothing in here touches the host runtime's tensor or status types.

pub mod data_type;
pub mod engine;
pub mod error;
pub mod format;
pub mod memory;
pub mod softmax;
pub mod stream;

pub use data_type::{DataType, Element};
pub use engine::{DnnEngine, EngineKind};
pub use error::{DnnError, DnnResult, DnnStatus};
pub use format::MemoryFormat;
pub use memory::{DnnMemory, MemoryDesc};
pub use softmax::{SoftmaxForward, SoftmaxForwardDesc};
pub use stream::{DnnStream, ExecStep};
