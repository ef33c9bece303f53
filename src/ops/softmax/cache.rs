//! Plan cache
//!
//! Get-or-create cache of prepared softmax plans, keyed by the
//! canonical `(dims, axis)` key. The cache owns every plan it hands
//! out; callers hold non-owning references for the duration of one
//! invocation. Unbounded by default; an optional capacity turns on
//! least-recently-used eviction without changing single-key behavior.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;

use crate::dnn::{DataType, DnnEngine};
use crate::error::ForgeResult;
use crate::ops::softmax::params::SoftmaxParams;
use crate::ops::softmax::plan::SoftmaxPlan;

/// Cache configuration
#[derive(Debug, Clone, Default)]
pub struct PlanCacheConfig {
    /// Maximum number of cached plans; `None` means unbounded
    pub capacity: Option<usize>,
}

impl PlanCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the cache, evicting the least recently used plan on
    /// overflow
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }
}

/// Builder seam for plan construction, so tests can observe or replace
/// the expensive build step
pub trait PlanBuilder: Send + Sync {
    fn build(
        &self,
        engine: &DnnEngine,
        data_type: DataType,
        params: &SoftmaxParams,
    ) -> ForgeResult<SoftmaxPlan>;
}

/// Production builder: delegate to the primitive library
#[derive(Debug, Default)]
pub struct DnnPlanBuilder;

impl PlanBuilder for DnnPlanBuilder {
    fn build(
        &self,
        engine: &DnnEngine,
        data_type: DataType,
        params: &SoftmaxParams,
    ) -> ForgeResult<SoftmaxPlan> {
        SoftmaxPlan::build(engine, data_type, params)
    }
}

struct CacheEntry {
    plan: Arc<SoftmaxPlan>,
    last_used: u64,
}

struct CacheState {
    plans: HashMap<String, CacheEntry>,
    tick: u64,
}

/// Process-lifetime cache of prepared plans for one element type
pub struct PlanCache {
    engine: DnnEngine,
    data_type: DataType,
    builder: Box<dyn PlanBuilder>,
    config: PlanCacheConfig,
    state: Mutex<CacheState>,
}

impl PlanCache {
    pub fn new(engine: DnnEngine, data_type: DataType, config: PlanCacheConfig) -> Self {
        Self::with_builder(engine, data_type, config, Box::new(DnnPlanBuilder))
    }

    pub fn with_builder(
        engine: DnnEngine,
        data_type: DataType,
        config: PlanCacheConfig,
        builder: Box<dyn PlanBuilder>,
    ) -> Self {
        PlanCache {
            engine,
            data_type,
            builder,
            config,
            state: Mutex::new(CacheState {
                plans: HashMap::new(),
                tick: 0,
            }),
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Return the plan for `params`, building and inserting it on first
    /// use.
    ///
    /// Lookup and insertion happen under one lock, so two concurrent
    /// first-time requests for the same key build exactly once; the
    /// second request waits and receives the first one's plan.
    pub fn get_or_create(&self, params: &SoftmaxParams) -> ForgeResult<Arc<SoftmaxPlan>> {
        let key = params.cache_key();
        let mut state = self.state.lock()?;
        state.tick += 1;
        let tick = state.tick;

        if let Some(entry) = state.plans.get_mut(&key) {
            entry.last_used = tick;
            tracing::trace!(%key, "softmax plan cache hit");
            return Ok(entry.plan.clone());
        }

        tracing::debug!(%key, "softmax plan cache miss");
        let plan = Arc::new(self.builder.build(&self.engine, self.data_type, params)?);

        if let Some(capacity) = self.config.capacity {
            while state.plans.len() >= capacity {
                let oldest = state
                    .plans
                    .iter()
                    .min_by_key(|(_, e)| e.last_used)
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(k) => {
                        tracing::debug!(key = %k, "evicting least recently used softmax plan");
                        state.plans.remove(&k);
                    }
                    None => break,
                }
            }
        }

        state.plans.insert(
            key,
            CacheEntry {
                plan: plan.clone(),
                last_used: tick,
            },
        );
        Ok(plan)
    }

    /// Number of cached plans
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.plans.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static GLOBAL_PLAN_CACHES: Lazy<Mutex<HashMap<DataType, Arc<PlanCache>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// The process-wide plan cache for one element type, created on first
/// use. Every kernel instance of that type shares it, so plans built by
/// one operation instance are reused by all others.
pub fn global_plan_cache(data_type: DataType) -> Arc<PlanCache> {
    let mut caches = GLOBAL_PLAN_CACHES
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    caches
        .entry(data_type)
        .or_insert_with(|| {
            Arc::new(PlanCache::new(
                DnnEngine::cpu(),
                data_type,
                PlanCacheConfig::default(),
            ))
        })
        .clone()
}
