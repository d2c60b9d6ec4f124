use std::sync::{PoisonError, RwLock};

use rustc_hash::FxHashMap as HashMap;
use thiserror::Error;

/// Support functions that JIT-compiled kernels link against and that cannot be
/// resolved from system libraries.
pub mod rt {
    use half::f16;

    use crate::num::Custom;

    /// No-op synchronization placeholder. The device path emits its own
    /// hardware barrier and never calls this.
    pub extern "C" fn barrier() {}

    /// Half bits to native float (`__gnu_h2f_ieee` ABI).
    pub extern "C" fn h2f(bits: u16) -> f32 {
        f16::from_bits(bits).to_f32()
    }

    /// Native float to half bits (`__gnu_f2h_ieee` ABI).
    pub extern "C" fn f2h(a: f32) -> u16 {
        f16::from_f32(a).to_bits()
    }

    pub extern "C" fn custom_add(a: Custom, b: Custom) -> Custom {
        a + b
    }

    pub extern "C" fn custom_sub(a: Custom, b: Custom) -> Custom {
        a - b
    }

    pub extern "C" fn custom_mul(a: Custom, b: Custom) -> Custom {
        a * b
    }

    pub extern "C" fn custom_mul_f32(a: Custom, b: f32) -> Custom {
        a * b
    }

    pub extern "C" fn custom_div(a: Custom, b: Custom) -> Custom {
        a / b
    }

    pub extern "C" fn custom_neg(a: Custom) -> Custom {
        -a
    }

    pub extern "C" fn custom_exp(a: Custom) -> Custom {
        a.exp()
    }

    pub extern "C" fn custom_log(a: Custom) -> Custom {
        a.ln()
    }

    pub extern "C" fn custom_sqrt(a: Custom) -> Custom {
        a.sqrt()
    }

    pub extern "C" fn custom_round(a: Custom) -> Custom {
        a.round()
    }

    pub extern "C" fn custom_lt(a: Custom, b: Custom) -> i32 {
        (a < b) as i32
    }

    pub extern "C" fn custom_eq(a: Custom, b: Custom) -> i32 {
        (a == b) as i32
    }

    pub extern "C" fn custom_select(a: Custom, b: Custom, cond: i32) -> Custom {
        Custom::select(a, b, cond != 0)
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to resolve external symbol reference: {0:?}")]
    UnresolvedSymbol(String),
}

/// A resolved callable address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol(usize);

impl Symbol {
    #[inline]
    pub fn new(addr: usize) -> Self {
        Self(addr)
    }

    #[inline]
    pub fn addr(self) -> usize {
        self.0
    }
}

type SearchFn = Box<dyn Fn(&str) -> Option<usize> + Send + Sync>;

/// Lazily-populated registry mapping external symbol names referenced by
/// JIT-compiled code to callable addresses.
///
/// Backed first by the [`rt`] builtins, then by a process-wide dynamic-linker
/// lookup with an underscore-stripping retry. One long-lived instance is
/// shared by whatever performs JIT loading.
pub struct Runtime {
    symbols: RwLock<HashMap<String, Symbol>>,
    search: SearchFn,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_search(search_process)
    }

    /// Construct with a custom dynamic-lookup function.
    pub fn with_search(search: impl Fn(&str) -> Option<usize> + Send + Sync + 'static) -> Self {
        let symbols = RwLock::new(builtins());
        let search = Box::new(search);
        Self { symbols, search }
    }

    /// Resolve `name` to a callable address.
    ///
    /// Successful dynamic lookups are memoized under the requested name, so
    /// repeat resolutions never re-query the linker.
    pub fn resolve(&self, name: &str) -> Result<Symbol, RuntimeError> {
        let symbols = self
            .symbols
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(&symbol) = symbols.get(name) {
            return Ok(symbol);
        }
        drop(symbols);

        log::debug!("resolving external symbol {name:?}");
        // If the direct lookup fails and the name starts with an underscore,
        // retry without it: the code may have been generated for a loader that
        // expects every symbol to carry an underscore prefix, while the
        // dynamic-lookup facility expects unprefixed names.
        let addr = (self.search)(name).or_else(|| match name.strip_prefix('_') {
            Some(rest) if !rest.is_empty() => (self.search)(rest),
            _ => None,
        });

        match addr {
            Some(addr) => {
                let symbol = Symbol::new(addr);
                let mut symbols = self
                    .symbols
                    .write()
                    .unwrap_or_else(PoisonError::into_inner);
                // another thread may have resolved the same name concurrently
                Ok(*symbols.entry(name.to_string()).or_insert(symbol))
            }
            None => {
                log::warn!("failed to resolve external symbol reference: {name:?}");
                Err(RuntimeError::UnresolvedSymbol(name.to_string()))
            }
        }
    }

    /// The runtime does not segment symbols into logical sub-libraries; this
    /// half of the JIT lookup interface always reports not-found.
    pub fn resolve_in_logical_dylib(&self, _name: &str) -> Option<Symbol> {
        None
    }
}

fn builtins() -> HashMap<String, Symbol> {
    let entries: &[(&str, *const u8)] = &[
        ("Barrier", rt::barrier as *const u8),
        ("__gnu_h2f_ieee", rt::h2f as *const u8),
        ("__gnu_f2h_ieee", rt::f2h as *const u8),
        ("___truncsfhf2", rt::f2h as *const u8),
        ("___extendhfsf2", rt::h2f as *const u8),
        ("custom_add", rt::custom_add as *const u8),
        ("custom_sub", rt::custom_sub as *const u8),
        ("custom_mul", rt::custom_mul as *const u8),
        ("custom_mul_f32", rt::custom_mul_f32 as *const u8),
        ("custom_div", rt::custom_div as *const u8),
        ("custom_neg", rt::custom_neg as *const u8),
        ("custom_exp", rt::custom_exp as *const u8),
        ("custom_log", rt::custom_log as *const u8),
        ("custom_sqrt", rt::custom_sqrt as *const u8),
        ("custom_round", rt::custom_round as *const u8),
        ("custom_lt", rt::custom_lt as *const u8),
        ("custom_eq", rt::custom_eq as *const u8),
        ("custom_select", rt::custom_select as *const u8),
    ];
    entries
        .iter()
        .map(|&(name, ptr)| (name.to_string(), Symbol::new(ptr as usize)))
        .collect()
}

/// Process-wide dynamic-linker lookup.
#[cfg(unix)]
fn search_process(name: &str) -> Option<usize> {
    let this = libloading::os::unix::Library::this();
    let symbol = unsafe { this.get::<*mut std::ffi::c_void>(name.as_bytes()) }.ok()?;
    let addr = symbol.into_raw() as usize;
    (addr != 0).then_some(addr)
}

/// Process-wide dynamic-linker lookup.
#[cfg(windows)]
fn search_process(name: &str) -> Option<usize> {
    let this = libloading::os::windows::Library::this().ok()?;
    let symbol = unsafe { this.get::<*mut std::ffi::c_void>(name.as_bytes()) }.ok()?;
    let addr = symbol.into_raw() as usize;
    (addr != 0).then_some(addr)
}
