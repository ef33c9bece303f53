//! Host-runtime kernel invocation surface
//!
//! The host runtime schedules operations by handing each registered
//! kernel an [`OpContext`] with the invocation's inputs. Kernels write
//! their output and status back into the context; a failed invocation
//! aborts with a status message and leaves the output unset. Kernels
//! must be safe to invoke concurrently from multiple scheduler threads.

pub mod registry;

use crate::error::{DnnForgeError, ForgeResult};
use crate::tensor::Tensor;

pub use registry::{global_registry, KernelKey, KernelRegistry, LAYOUT_DEPENDENT_LABEL};

/// Devices an operation can be registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Cpu,
}

/// Outcome of one kernel invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpStatus {
    Ok,
    Aborted(String),
}

impl OpStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, OpStatus::Ok)
    }
}

/// Per-invocation context handed to a kernel by the scheduler
#[derive(Debug)]
pub struct OpContext {
    inputs: Vec<Tensor>,
    output: Option<Tensor>,
    status: OpStatus,
}

impl OpContext {
    pub fn new(inputs: Vec<Tensor>) -> Self {
        OpContext {
            inputs,
            output: None,
            status: OpStatus::Ok,
        }
    }

    pub fn input(&self, index: usize) -> ForgeResult<&Tensor> {
        self.inputs.get(index).ok_or_else(|| {
            DnnForgeError::InternalError(format!(
                "input {} requested, {} available",
                index,
                self.inputs.len()
            ))
        })
    }

    pub fn set_output(&mut self, tensor: Tensor) {
        self.output = Some(tensor);
    }

    /// Mark the invocation failed. The output is cleared so a partially
    /// written tensor is never observable.
    pub fn abort(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(op_status = %message, "kernel invocation aborted");
        self.output = None;
        self.status = OpStatus::Aborted(message);
    }

    pub fn status(&self) -> &OpStatus {
        &self.status
    }

    pub fn output(&self) -> Option<&Tensor> {
        self.output.as_ref()
    }

    pub fn take_output(&mut self) -> Option<Tensor> {
        self.output.take()
    }
}

/// A registered operation implementation.
///
/// Implementations are shared across scheduler threads; `compute` takes
/// `&self` and any internal state must be synchronized.
pub trait OpKernel: Send + Sync {
    /// Operation name this kernel implements (e.g. "Softmax")
    fn name(&self) -> &'static str;

    /// Run one invocation against the context's inputs
    fn compute(&self, ctx: &mut OpContext);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dnn::DataType;
    use crate::tensor::{TensorLayout, TensorShape};

    #[test]
    fn test_abort_clears_output() {
        let mut ctx = OpContext::new(vec![]);
        ctx.set_output(Tensor::zeroed(
            DataType::F32,
            TensorShape::from_dims(&[2]),
            TensorLayout::Public,
        ));
        assert!(ctx.output().is_some());

        ctx.abort("invalid rank");
        assert!(ctx.output().is_none());
        assert_eq!(ctx.status(), &OpStatus::Aborted("invalid rank".to_string()));
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let ctx = OpContext::new(vec![]);
        assert!(ctx.input(0).is_err());
    }
}
