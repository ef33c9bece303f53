//! Cached softmax compute plans

use std::sync::{Arc, Mutex};

use crate::dnn::{
    DataType, DnnEngine, DnnMemory, DnnStream, ExecStep, MemoryDesc, SoftmaxForward,
    SoftmaxForwardDesc,
};
use crate::error::ForgeResult;
use crate::ops::softmax::params::SoftmaxParams;

/// A prepared softmax plan for one exact problem shape.
///
/// Building a plan is the expensive step: the primitive library
/// validates the problem, picks the destination layout, and prepares the
/// computation. A built plan is immutable apart from its two memory
/// slots, which are rebound to caller buffers around each run. Because
/// those slots live on the shared plan object, the bind/run/unbind
/// sequence is serialized by a per-plan lock.
#[derive(Debug)]
pub struct SoftmaxPlan {
    params: SoftmaxParams,
    src_mem: Arc<DnnMemory>,
    dst_mem: Arc<DnnMemory>,
    steps: Vec<ExecStep>,
    stream: DnnStream,
    exec_lock: Mutex<()>,
}

impl SoftmaxPlan {
    /// Prepare a plan for `params` on `engine`
    pub fn build(
        engine: &DnnEngine,
        data_type: DataType,
        params: &SoftmaxParams,
    ) -> ForgeResult<Self> {
        let src_md = MemoryDesc::new(params.dims.clone(), data_type, params.format)?;
        let fwd_desc = SoftmaxForwardDesc::new(src_md, params.axis)?;
        let primitive = Arc::new(SoftmaxForward::new(engine, &fwd_desc)?);

        // Slots sized per the primitive's own declared layouts; the
        // destination layout is the primitive's choice, not the caller's
        let src_mem = Arc::new(DnnMemory::with_dummy_handle(primitive.src_desc().clone()));
        let dst_mem = Arc::new(DnnMemory::with_dummy_handle(primitive.dst_desc().clone()));

        let steps = vec![ExecStep::new(
            primitive,
            src_mem.clone(),
            dst_mem.clone(),
        )];

        tracing::debug!(
            dims = ?params.dims,
            axis = params.axis,
            format = ?params.format,
            "built softmax plan"
        );

        Ok(SoftmaxPlan {
            params: params.clone(),
            src_mem,
            dst_mem,
            steps,
            stream: DnnStream::new(engine),
            exec_lock: Mutex::new(()),
        })
    }

    pub fn params(&self) -> &SoftmaxParams {
        &self.params
    }

    /// Source buffer descriptor the plan was prepared for
    pub fn src_desc(&self) -> &MemoryDesc {
        self.src_mem.desc()
    }

    /// Destination buffer descriptor the primitive chose
    pub fn dst_desc(&self) -> &MemoryDesc {
        self.dst_mem.desc()
    }

    /// Run the plan against caller buffers.
    ///
    /// Binds the slots, submits the execution list synchronously, and
    /// rebinds the sentinel handles whether or not the run succeeded.
    ///
    /// # Safety
    ///
    /// `src` must be valid for reads of `src_desc().byte_size()` bytes
    /// and `dst` for writes of `dst_desc().byte_size()` bytes, with no
    /// overlap. Sizes are not validated here.
    pub unsafe fn execute(&self, src: *const u8, dst: *mut u8) -> ForgeResult<()> {
        let _guard = self.exec_lock.lock()?;

        self.src_mem.set_data_handle(src as *mut u8);
        self.dst_mem.set_data_handle(dst);

        let result = self.stream.submit(&self.steps);

        self.src_mem.reset_data_handle();
        self.dst_mem.reset_data_handle();

        result?;
        Ok(())
    }
}
