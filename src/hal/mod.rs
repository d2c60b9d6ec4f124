use std::sync::Arc;

use derive_more::Display;

pub mod cpu;
pub mod ocl;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelType {
    /// A regular compute kernel with generated source.
    Compute,
    /// A builtin zero-fill kernel; requires no source generation.
    Zero,
}

/// The underlying function of one or more kernels: its identity plus the
/// device source rendered by the code emitter, consumed here as opaque text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelFunc {
    pub name: String,
    pub source: String,
}

/// A generated kernel description. Owned by the caller; read-only here.
#[derive(Debug, Clone)]
pub struct KernelInfo {
    pub kname: String,
    pub ktype: KernelType,
    pub func: Arc<KernelFunc>,
    pub comments: String,
}

impl KernelInfo {
    pub fn new(
        kname: impl Into<String>,
        func: Arc<KernelFunc>,
        comments: impl Into<String>,
    ) -> Self {
        Self {
            kname: kname.into(),
            ktype: KernelType::Compute,
            func,
            comments: comments.into(),
        }
    }

    /// A zero-fill kernel carrying no source of its own.
    pub fn zero(kname: impl Into<String>) -> Self {
        let kname = kname.into();
        let func = Arc::new(KernelFunc {
            name: kname.clone(),
            source: String::new(),
        });
        Self {
            kname,
            ktype: KernelType::Zero,
            func,
            comments: String::new(),
        }
    }
}
