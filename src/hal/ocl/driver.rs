use std::sync::Arc;

use derive_more::{Deref, Display};
use thiserror::Error;

/// An error string reported by the native toolchain driver.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct DriverError(pub String);

/// Terminal status of a finished program build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Success,
    /// Driver-reported failure status code.
    Failure(i32),
}

/// Toolchain-level optimization flags. All of them are requested
/// unconditionally for every build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    pub fast_relaxed_math: bool,
    pub fused_multiply_add: bool,
    pub unsafe_math: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            fast_relaxed_math: true,
            fused_multiply_add: true,
            unsafe_math: true,
        }
    }
}

impl std::fmt::Display for BuildOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let flags = [
            (self.fast_relaxed_math, "-cl-fast-relaxed-math"),
            (self.fused_multiply_add, "-cl-mad-enable"),
            (self.unsafe_math, "-cl-unsafe-math-optimizations"),
        ];
        let mut flags = flags.iter().filter(|(on, _)| *on).map(|(_, flag)| *flag);
        if let Some(flag) = flags.next() {
            write!(f, "{flag}")?;
            for flag in flags {
                write!(f, " {flag}")?;
            }
        }
        Ok(())
    }
}

/// Opaque token keying a build in flight in the pending registry.
#[derive(Debug, Default, Display, Clone, Copy, PartialEq, Eq, Hash, Deref)]
pub struct BuildHandle(uid::Id<BuildHandle>);

impl BuildHandle {
    pub(crate) fn new() -> Self {
        Self(uid::Id::new())
    }
}

/// Completion callback handed to the toolchain; may be invoked from an
/// arbitrary toolchain-internal thread.
pub type BuildNotify = Arc<dyn Fn(BuildHandle) + Send + Sync>;

/// The external compiler toolchain's program interface.
pub trait Toolchain: Send + Sync + 'static {
    /// A refcounted handle to a device program.
    type Program: Clone + Send + Sync + 'static;

    /// Create a compilation unit from source text. Fails with a
    /// driver-reported error string on malformed source.
    fn create_program(&self, source: &str) -> Result<Self::Program, DriverError>;

    /// Start an asynchronous build. On success the toolchain invokes `notify`
    /// with `handle` exactly once upon completion; it does not invoke it when
    /// this call itself fails.
    fn build_program(
        &self,
        program: &Self::Program,
        options: &BuildOptions,
        handle: BuildHandle,
        notify: BuildNotify,
    ) -> Result<(), DriverError>;

    /// Query the terminal status of a finished build.
    fn build_status(&self, program: &Self::Program) -> Result<BuildStatus, DriverError>;

    /// Size in bytes of the build diagnostic log.
    fn build_log_size(&self, program: &Self::Program) -> Result<usize, DriverError>;

    /// Fill `buffer`, sized by [`Toolchain::build_log_size`], with the log.
    fn build_log_fill(
        &self,
        program: &Self::Program,
        buffer: &mut [u8],
    ) -> Result<(), DriverError>;
}

/// Retrieve the build diagnostic log via the size-then-fill protocol.
pub(crate) fn fetch_build_log<T: Toolchain>(
    toolchain: &T,
    program: &T::Program,
) -> Result<String, DriverError> {
    let len = toolchain.build_log_size(program)?;
    let mut buffer = vec![0; len];
    toolchain.build_log_fill(program, &mut buffer)?;
    let log = String::from_utf8_lossy(&buffer);
    Ok(log.trim_end_matches('\0').to_string())
}

#[cfg(test)]
mod tests {
    use super::BuildOptions;

    #[test]
    fn test_options_render() {
        let options = BuildOptions::default();
        assert_eq!(
            options.to_string(),
            "-cl-fast-relaxed-math -cl-mad-enable -cl-unsafe-math-optimizations"
        );
        let options = BuildOptions {
            fused_multiply_add: false,
            ..Default::default()
        };
        assert_eq!(
            options.to_string(),
            "-cl-fast-relaxed-math -cl-unsafe-math-optimizations"
        );
    }
}
