//! Kernel registry
//!
//! Maps (operation, device, element type, label) to the kernel
//! implementation the scheduler should invoke. The process-wide registry
//! is lazily initialized with the built-in kernels on first use; tests
//! construct isolated registries.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::dnn::DataType;
use crate::error::{DnnForgeError, ForgeResult};
use crate::ops::softmax::SoftmaxKernel;
use crate::runtime::{Device, OpKernel};

/// Label carried by kernels that expect and produce the primitive
/// subsystem's internal tensor layout rather than the public one.
pub const LAYOUT_DEPENDENT_LABEL: &str = "dnn_layout_dependent";

/// Registration key for a kernel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KernelKey {
    pub op: String,
    pub device: Device,
    pub data_type: DataType,
    pub label: String,
}

impl KernelKey {
    pub fn new(op: &str, device: Device, data_type: DataType, label: &str) -> Self {
        KernelKey {
            op: op.to_string(),
            device,
            data_type,
            label: label.to_string(),
        }
    }
}

/// Registry of operation implementations
pub struct KernelRegistry {
    kernels: RwLock<HashMap<KernelKey, Arc<dyn OpKernel>>>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        KernelRegistry {
            kernels: RwLock::new(HashMap::new()),
        }
    }

    /// Register a kernel under a key. Double registration of the same
    /// key is a bug in the registrant.
    pub fn register(&self, key: KernelKey, kernel: Arc<dyn OpKernel>) -> ForgeResult<()> {
        let mut kernels = self.kernels.write()?;
        if kernels.contains_key(&key) {
            return Err(DnnForgeError::RegistrationFailed(format!(
                "kernel already registered for {:?}",
                key
            )));
        }
        tracing::debug!(op = %key.op, data_type = ?key.data_type, "registered kernel");
        kernels.insert(key, kernel);
        Ok(())
    }

    pub fn lookup(&self, key: &KernelKey) -> Option<Arc<dyn OpKernel>> {
        self.kernels.read().ok()?.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.kernels.read().map(|k| k.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for KernelRegistry {
    fn default() -> Self {
        KernelRegistry::new()
    }
}

/// Register the built-in kernels. Only the 32-bit float softmax is
/// registered; the f16 kernel type exists but stays unregistered.
fn register_default_kernels(registry: &KernelRegistry) {
    let key = KernelKey::new(
        "Softmax",
        Device::Cpu,
        DataType::F32,
        LAYOUT_DEPENDENT_LABEL,
    );
    if let Err(err) = registry.register(key, Arc::new(SoftmaxKernel::<f32>::new())) {
        tracing::error!(error = %err, "default kernel registration failed");
    }
}

static GLOBAL_REGISTRY: Lazy<KernelRegistry> = Lazy::new(|| {
    let registry = KernelRegistry::new();
    register_default_kernels(&registry);
    registry
});

/// The process-wide kernel registry, initialized with the built-in
/// kernels on first use
pub fn global_registry() -> &'static KernelRegistry {
    &GLOBAL_REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = KernelRegistry::new();
        let key = KernelKey::new(
            "Softmax",
            Device::Cpu,
            DataType::F32,
            LAYOUT_DEPENDENT_LABEL,
        );
        registry
            .register(key.clone(), Arc::new(SoftmaxKernel::<f32>::new()))
            .unwrap();

        assert!(registry.lookup(&key).is_some());
        assert_eq!(registry.len(), 1);

        let other = KernelKey::new("Softmax", Device::Cpu, DataType::F16, LAYOUT_DEPENDENT_LABEL);
        assert!(registry.lookup(&other).is_none());
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = KernelRegistry::new();
        let key = KernelKey::new(
            "Softmax",
            Device::Cpu,
            DataType::F32,
            LAYOUT_DEPENDENT_LABEL,
        );
        registry
            .register(key.clone(), Arc::new(SoftmaxKernel::<f32>::new()))
            .unwrap();
        assert!(registry
            .register(key, Arc::new(SoftmaxKernel::<f32>::new()))
            .is_err());
    }
}
