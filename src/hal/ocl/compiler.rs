use std::sync::{Arc, Mutex, PoisonError};

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

use super::{
    BuildError, DeviceState, Library,
    cache::SourceCache,
    driver::{BuildHandle, BuildNotify, BuildOptions, BuildStatus, Toolchain, fetch_build_log},
    emit::{self, with_line_numbers},
};
use crate::{
    hal::{KernelInfo, KernelType},
    trace::{Activity, BuildInfo, Context, KernelRecord, Metadata},
};

/// The result of a submitted build. Resolved exactly once; awaiting it is the
/// caller's only suspension point.
pub struct Pending<T: Toolchain> {
    receiver: flume::Receiver<Result<Library<T>, BuildError>>,
}

impl<T: Toolchain> Pending<T> {
    pub async fn wait(self) -> Result<Library<T>, BuildError> {
        self.receiver
            .recv_async()
            .await
            .map_err(|_| BuildError::Dropped)?
    }
}

/// A build in flight. Owns the compiled-program handle and the result promise
/// from submission until the completion callback consumes it exactly once.
struct Build<T: Toolchain> {
    activity: Activity,
    device: Arc<DeviceState<T>>,
    program: T::Program,
    library: Library<T>,
    info: BuildInfo,
    sender: flume::Sender<Result<Library<T>, BuildError>>,
}

/// Registry of builds in flight, keyed by opaque handles. The only state
/// mutated concurrently by multiple submissions.
struct PendingBuilds<T: Toolchain> {
    builds: Mutex<HashMap<BuildHandle, Build<T>>>,
}

impl<T: Toolchain> Default for PendingBuilds<T> {
    fn default() -> Self {
        let builds = Mutex::new(HashMap::default());
        Self { builds }
    }
}

impl<T: Toolchain> PendingBuilds<T> {
    fn acquire(&self, build: Build<T>) -> BuildHandle {
        let handle = BuildHandle::new();
        self.builds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, build);
        handle
    }

    fn release(&self, handle: BuildHandle) -> Option<Build<T>> {
        self.builds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle)
    }
}

/// Assembles one compilation unit per kernel set and drives the external
/// toolchain's asynchronous build to completion.
pub struct Compiler<T: Toolchain> {
    device: Arc<DeviceState<T>>,
    pending: Arc<PendingBuilds<T>>,
    cache: SourceCache,
}

impl<T: Toolchain> Compiler<T> {
    pub fn new(device: Arc<DeviceState<T>>) -> Self {
        let pending = Arc::new(PendingBuilds::default());
        let cache = SourceCache::from_env();
        Self {
            device,
            pending,
            cache,
        }
    }

    pub fn with_cache(mut self, cache: SourceCache) -> Self {
        self.cache = cache;
        self
    }

    /// Assemble the compilation unit for `kernels` and submit it.
    ///
    /// Returns immediately; the caller awaits the returned [`Pending`]. A
    /// malformed unit surfaces synchronously as [`BuildError::Rejected`] and
    /// produces no future.
    pub fn build(&self, ctx: &Context, kernels: &[KernelInfo]) -> Result<Pending<T>, BuildError> {
        if kernels.is_empty() {
            // nothing to assemble: an empty library, already resolved
            let (sender, receiver) = flume::bounded(1);
            let library = Library {
                device: self.device.clone(),
                program: None,
                kernels: Vec::new(),
                kernel_ids: Vec::new(),
            };
            _ = sender.send(Ok(library));
            return Ok(Pending { receiver });
        }

        let activity = Activity::new(ctx, "hal::ocl::build");
        let mut code = String::new();
        let mut kernel_ids = Vec::with_capacity(kernels.len());

        let fp16 = self.device.has_extension("cl_khr_fp16");
        if fp16 {
            code += "#pragma OPENCL EXTENSION cl_khr_fp16 : enable\n";
        }
        let fp64 = self.device.has_extension("cl_khr_fp64");
        if fp64 {
            code += "#pragma OPENCL EXTENSION cl_khr_fp64 : enable\n";
        }
        if self.device.has_extension("cl_intel_subgroups") {
            code += emit::SUBGROUP_MICROKERNELS;
        }
        code += &emit::emulation_preamble(fp16, fp64);

        let mut emitted = HashSet::default();
        for ki in kernels {
            let kbuild = Activity::new(activity.ctx(), "hal::ocl::build_kernel");

            let src = if ki.ktype == KernelType::Zero {
                "// builtin zero kernel".to_string()
            } else if emitted.insert(ki.func.name.clone()) {
                let fresh = format!("{}{}", ki.comments, ki.func.source);
                let src = self.cache.read_or_write(&ki.kname, fresh);
                code += &src;
                code += "\n\n";
                src
            } else {
                // the function body already exists earlier in the unit
                "// duplicate kernel, skipped".to_string()
            };

            kbuild.add_metadata(Metadata::Kernel(KernelRecord {
                kname: ki.kname.clone(),
                src,
            }));
            kernel_ids.push(kbuild.id());
        }

        let info = BuildInfo {
            device: self.device.id().to_string(),
            src: code.clone(),
            status: None,
            log: None,
        };
        log::debug!("compiling unit:\n{}", with_line_numbers(&code));

        let program = self
            .device
            .toolchain()
            .create_program(&code)
            .map_err(BuildError::Rejected)?;
        let library = Library {
            device: self.device.clone(),
            program: Some(program.clone()),
            kernels: kernels.to_vec(),
            kernel_ids,
        };
        Ok(Build::start(
            activity,
            self.device.clone(),
            self.pending.clone(),
            program,
            library,
            info,
        ))
    }
}

impl<T: Toolchain> Build<T> {
    /// Register the build record and hand the unit to the toolchain.
    fn start(
        activity: Activity,
        device: Arc<DeviceState<T>>,
        pending: Arc<PendingBuilds<T>>,
        program: T::Program,
        library: Library<T>,
        info: BuildInfo,
    ) -> Pending<T> {
        let (sender, receiver) = flume::bounded(1);
        let build = Build {
            activity,
            device: device.clone(),
            program: program.clone(),
            library,
            info,
            sender,
        };
        let handle = pending.acquire(build);

        let notify: BuildNotify = {
            let pending = pending.clone();
            Arc::new(move |handle| on_build_complete(&pending, handle))
        };
        let options = BuildOptions::default();
        if let Err(err) = device
            .toolchain()
            .build_program(&program, &options, handle, notify)
        {
            log::warn!("failed to submit program build: {err}");
            // the toolchain does not fire the callback after a hard submission
            // failure; invoking it here keeps the exactly-once guarantee
            on_build_complete(&pending, handle);
        }

        Pending { receiver }
    }
}

/// Completion path, invoked by the toolchain from an arbitrary thread. Must
/// not panic across that boundary.
fn on_build_complete<T: Toolchain>(pending: &PendingBuilds<T>, handle: BuildHandle) {
    // remove-before-resolve guarantees exactly-once completion
    let Some(mut build) = pending.release(handle) else {
        // this handle has already been processed
        return;
    };

    let toolchain = build.device.toolchain();
    let result = match toolchain.build_status(&build.program) {
        Ok(BuildStatus::Success) => Ok(build.library),
        Ok(BuildStatus::Failure(code)) => {
            build.info.status = Some(code);
            match fetch_build_log(toolchain, &build.program) {
                Ok(log) => {
                    let src = with_line_numbers(&build.info.src);
                    log::warn!("program build failed:\n{log}");
                    log::warn!("source was:\n{src}");
                    build.info.src = src;
                    build.info.log = Some(log.clone());
                    Err(BuildError::Build(log))
                }
                Err(err) => {
                    log::error!("failed to retrieve build log: {err}");
                    Err(BuildError::Diagnostics(err))
                }
            }
        }
        Err(err) => {
            log::error!("failed to query program build status: {err}");
            Err(BuildError::Diagnostics(err))
        }
    };

    // build metadata is recorded regardless of outcome
    build.activity.add_metadata(Metadata::Build(build.info.clone()));
    _ = build.sender.send(result);
}
