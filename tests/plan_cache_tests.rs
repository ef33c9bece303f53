//! Plan cache behavior observed through the kernel entry point

use dnnforge::dnn::{DataType, DnnEngine};
use dnnforge::error::ForgeResult;
use dnnforge::ops::softmax::{
    PlanBuilder, PlanCache, PlanCacheConfig, SoftmaxKernel, SoftmaxParams, SoftmaxPlan,
};
use dnnforge::runtime::{global_registry, Device, KernelKey, OpContext, OpKernel, OpStatus};
use dnnforge::runtime::LAYOUT_DEPENDENT_LABEL;
use dnnforge::tensor::{Tensor, TensorShape};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Test double for the primitive library's build step: counts plan
/// constructions, then builds for real
struct CountingBuilder {
    builds: Arc<AtomicUsize>,
}

impl PlanBuilder for CountingBuilder {
    fn build(
        &self,
        engine: &DnnEngine,
        data_type: DataType,
        params: &SoftmaxParams,
    ) -> ForgeResult<SoftmaxPlan> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        SoftmaxPlan::build(engine, data_type, params)
    }
}

fn counting_kernel(config: PlanCacheConfig) -> (SoftmaxKernel<f32>, Arc<AtomicUsize>) {
    let builds = Arc::new(AtomicUsize::new(0));
    let cache = PlanCache::with_builder(
        DnnEngine::cpu(),
        DataType::F32,
        config,
        Box::new(CountingBuilder {
            builds: builds.clone(),
        }),
    );
    (SoftmaxKernel::with_cache(Arc::new(cache)), builds)
}

fn random_tensor(dims: &[usize], seed: u64) -> Tensor {
    let mut rng = StdRng::seed_from_u64(seed);
    let count: usize = dims.iter().product();
    let data: Vec<f32> = (0..count).map(|_| rng.gen_range(-3.0..3.0)).collect();
    Tensor::from_vec(data, TensorShape::from_dims(dims)).unwrap()
}

fn run(kernel: &SoftmaxKernel<f32>, input: Tensor) -> OpContext {
    let mut ctx = OpContext::new(vec![input]);
    kernel.compute(&mut ctx);
    ctx
}

#[test]
fn test_same_shape_builds_one_plan_across_invocations() {
    let (kernel, builds) = counting_kernel(PlanCacheConfig::default());

    let first = run(&kernel, random_tensor(&[4, 4], 1));
    let second = run(&kernel, random_tensor(&[4, 4], 2));
    assert!(first.status().is_ok());
    assert!(second.status().is_ok());

    assert_eq!(builds.load(Ordering::SeqCst), 1);
}

#[test]
fn test_different_data_same_shape_reuses_plan_with_different_results() -> anyhow::Result<()> {
    let (kernel, builds) = counting_kernel(PlanCacheConfig::default());

    let mut first = run(&kernel, random_tensor(&[3, 8], 10));
    let mut second = run(&kernel, random_tensor(&[3, 8], 20));
    assert_eq!(builds.load(Ordering::SeqCst), 1);

    let a = first.take_output().expect("output");
    let b = second.take_output().expect("output");
    assert_ne!(a.as_slice::<f32>()?, b.as_slice::<f32>()?);
    Ok(())
}

#[test]
fn test_distinct_shapes_and_axes_build_separate_plans() {
    let (kernel, builds) = counting_kernel(PlanCacheConfig::default());

    run(&kernel, random_tensor(&[4, 4], 1));
    run(&kernel, random_tensor(&[4, 5], 1));
    run(&kernel, random_tensor(&[5, 4], 1));
    // Rank change moves the reduction axis as well
    run(&kernel, random_tensor(&[4, 4, 4], 1));

    assert_eq!(builds.load(Ordering::SeqCst), 4);
}

#[test]
fn test_bounded_cache_rebuilds_after_eviction() {
    let (kernel, builds) = counting_kernel(PlanCacheConfig::new().with_capacity(1));

    run(&kernel, random_tensor(&[2, 4], 1));
    run(&kernel, random_tensor(&[2, 5], 1)); // evicts [2,4]
    run(&kernel, random_tensor(&[2, 4], 1)); // rebuilt

    assert_eq!(builds.load(Ordering::SeqCst), 3);
}

#[test]
fn test_concurrent_invocations_share_one_plan_and_stay_isolated() -> anyhow::Result<()> {
    let (kernel, builds) = counting_kernel(PlanCacheConfig::default());
    let kernel = Arc::new(kernel);

    // Single-threaded reference outputs, computed up front
    let mut references = Vec::new();
    {
        let (reference_kernel, _) = counting_kernel(PlanCacheConfig::default());
        for seed in 0..8u64 {
            let mut ctx = run(&reference_kernel, random_tensor(&[32, 16], seed));
            assert!(ctx.status().is_ok());
            references.push(
                ctx.take_output()
                    .expect("output")
                    .as_slice::<f32>()?
                    .to_vec(),
            );
        }
    }

    let handles: Vec<_> = (0..8u64)
        .map(|seed| {
            let kernel = kernel.clone();
            std::thread::spawn(move || {
                let mut ctx = run(&kernel, random_tensor(&[32, 16], seed));
                assert!(ctx.status().is_ok());
                ctx.take_output()
                    .expect("output")
                    .as_slice::<f32>()
                    .unwrap()
                    .to_vec()
            })
        })
        .collect();

    for (seed, handle) in handles.into_iter().enumerate() {
        let out = handle.join().expect("worker panicked");
        let reference = &references[seed];
        assert_eq!(out.len(), reference.len());
        for (x, y) in out.iter().zip(reference.iter()) {
            assert_eq!(x.to_bits(), y.to_bits(), "seed {} diverged", seed);
        }
    }

    // Everyone shared the one plan
    assert_eq!(builds.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
#[serial]
fn test_registered_softmax_kernel_is_invocable() -> anyhow::Result<()> {
    let key = KernelKey::new(
        "Softmax",
        Device::Cpu,
        DataType::F32,
        LAYOUT_DEPENDENT_LABEL,
    );
    let kernel = global_registry().lookup(&key).expect("registered kernel");
    assert_eq!(kernel.name(), "Softmax");

    // Only f32 is registered
    let f16_key = KernelKey::new("Softmax", Device::Cpu, DataType::F16, LAYOUT_DEPENDENT_LABEL);
    assert!(global_registry().lookup(&f16_key).is_none());

    let mut ctx = OpContext::new(vec![random_tensor(&[2, 6], 3)]);
    kernel.compute(&mut ctx);
    assert_eq!(ctx.status(), &OpStatus::Ok);

    let output = ctx.take_output().expect("output");
    for row in output.as_slice::<f32>()?.chunks(6) {
        let sum: f32 = row.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }
    Ok(())
}
