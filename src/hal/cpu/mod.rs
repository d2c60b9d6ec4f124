pub use runtime::{Runtime, RuntimeError, Symbol};

pub mod runtime;
