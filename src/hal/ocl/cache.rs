use std::path::PathBuf;

/// Environment override naming the cache root directory.
pub const CACHE_ENV: &str = "LOFT_KERNEL_CACHE";

/// On-disk kernel source cache.
///
/// Entries are keyed by kernel name only, stored as `<kname>.cl` holding raw
/// source text with no header or versioning. A hit always wins over a freshly
/// rendered kernel, even if the render logic has since changed; the staleness
/// trade-off favors reproducibility. Concurrent builds touching the same name
/// race benignly: last writer wins and readers see either state.
#[derive(Debug, Default, Clone)]
pub struct SourceCache {
    root: Option<PathBuf>,
}

impl SourceCache {
    /// Configure from the environment; disabled unless the override names a
    /// real directory.
    pub fn from_env() -> Self {
        match std::env::var(CACHE_ENV) {
            Ok(root) if !root.is_empty() => Self::with_root(root),
            _ => Self::default(),
        }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        match root.is_dir() {
            true => {
                log::debug!("using kernel source cache: {}", root.display());
                Self { root: Some(root) }
            }
            false => {
                log::warn!("kernel source cache is not a directory: {}", root.display());
                Self { root: None }
            }
        }
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.root.is_some()
    }

    fn path(&self, kname: &str) -> Option<PathBuf> {
        let root = self.root.as_ref()?;
        Some(root.join(kname).with_extension("cl"))
    }

    /// Return the cached source for `kname`, or populate the cache with the
    /// freshly rendered `fresh` and return it. Cache writes are best-effort: a
    /// failure must not fail the build.
    pub fn read_or_write(&self, kname: &str, fresh: String) -> String {
        let Some(path) = self.path(kname) else {
            return fresh;
        };
        if path.is_file() {
            match std::fs::read_to_string(&path) {
                Ok(src) => {
                    log::debug!("reading kernel source from cache: {}", path.display());
                    return src;
                }
                Err(err) => {
                    log::warn!("failed to read cached source {}: {err}", path.display())
                }
            }
        } else if let Err(err) = std::fs::write(&path, &fresh) {
            log::warn!("failed to write source cache {}: {err}", path.display());
        }
        fresh
    }
}
