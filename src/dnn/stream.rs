//! Execution streams
//!
//! A stream runs an execution list synchronously to completion. Each
//! step pairs a prepared primitive with the memory objects it reads and
//! writes; the buffers those objects are bound to at submit time are the
//! ones the step touches.

use std::sync::Arc;

use crate::dnn::engine::DnnEngine;
use crate::dnn::error::DnnResult;
use crate::dnn::memory::DnnMemory;
use crate::dnn::softmax::SoftmaxForward;

/// One step of an execution list
#[derive(Debug, Clone)]
pub struct ExecStep {
    primitive: Arc<SoftmaxForward>,
    src: Arc<DnnMemory>,
    dst: Arc<DnnMemory>,
}

impl ExecStep {
    pub fn new(primitive: Arc<SoftmaxForward>, src: Arc<DnnMemory>, dst: Arc<DnnMemory>) -> Self {
        ExecStep {
            primitive,
            src,
            dst,
        }
    }

    fn execute(&self) -> DnnResult<()> {
        self.primitive.execute(&self.src, &self.dst)
    }
}

/// Synchronous execution stream on a compute engine
#[derive(Debug, Clone)]
pub struct DnnStream {
    engine: DnnEngine,
}

impl DnnStream {
    pub fn new(engine: &DnnEngine) -> Self {
        DnnStream {
            engine: engine.clone(),
        }
    }

    pub fn engine(&self) -> &DnnEngine {
        &self.engine
    }

    /// Run every step in order, stopping at the first failure
    pub fn submit(&self, steps: &[ExecStep]) -> DnnResult<()> {
        for step in steps {
            step.execute()?;
        }
        Ok(())
    }
}
