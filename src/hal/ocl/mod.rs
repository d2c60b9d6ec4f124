use std::sync::Arc;

use rustc_hash::FxHashSet as HashSet;
use thiserror::Error;

use crate::{hal::KernelInfo, trace::ActivityId};

pub use cache::SourceCache;
pub use compiler::{Compiler, Pending};
pub use driver::{BuildHandle, BuildNotify, BuildOptions, BuildStatus, DriverError, Toolchain};

pub mod cache;
pub mod compiler;
pub mod driver;
pub mod emit;

#[derive(Debug, Error)]
pub enum BuildError {
    /// The toolchain rejected the assembled source outright; no future is produced.
    #[error("toolchain rejected compilation unit: {0}")]
    Rejected(DriverError),
    /// The toolchain accepted the unit but reported build failure.
    #[error("program build failed:\n{0}")]
    Build(String),
    /// The build failed and the diagnostic log itself could not be retrieved.
    #[error("program build failed; could not retrieve diagnostic log: {0}")]
    Diagnostics(DriverError),
    /// The build record was dropped without ever completing.
    #[error("build result channel dropped")]
    Dropped,
}

/// Capabilities and identity of one accelerator device, plus its toolchain.
#[derive(Debug)]
pub struct DeviceState<T> {
    id: String,
    extensions: HashSet<String>,
    toolchain: T,
}

impl<T: Toolchain> DeviceState<T> {
    pub fn new<I, S>(id: impl Into<String>, extensions: I, toolchain: T) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = id.into();
        let extensions = extensions.into_iter().map(Into::into).collect();
        Self {
            id,
            extensions,
            toolchain,
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn toolchain(&self) -> &T {
        &self.toolchain
    }

    #[inline]
    pub fn has_extension(&self, extension: &str) -> bool {
        self.extensions.contains(extension)
    }
}

/// A loadable compiled unit: the built program handle together with the
/// kernels it contains and their per-kernel trace activity ids.
pub struct Library<T: Toolchain> {
    pub(crate) device: Arc<DeviceState<T>>,
    pub(crate) program: Option<T::Program>,
    pub(crate) kernels: Vec<KernelInfo>,
    pub(crate) kernel_ids: Vec<ActivityId>,
}

impl<T: Toolchain> Library<T> {
    #[inline]
    pub fn device(&self) -> &DeviceState<T> {
        &self.device
    }

    /// The built program handle; `None` for an empty library.
    #[inline]
    pub fn program(&self) -> Option<&T::Program> {
        self.program.as_ref()
    }

    #[inline]
    pub fn kernels(&self) -> &[KernelInfo] {
        &self.kernels
    }

    #[inline]
    pub fn kernel_ids(&self) -> &[ActivityId] {
        &self.kernel_ids
    }
}
