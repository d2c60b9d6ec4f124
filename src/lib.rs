//! `loft` is the hardware-abstraction build layer of a tensor-program
//! compiler. It turns generated kernel source into executable device
//! programs and keeps narrow-float arithmetic consistent between the
//! host and the device.
//!
//! ## Key Components
//! 1. **Emulated Arithmetic** ([`num`]):
//!    - A software `Custom` scalar stored in binary16 precision.
//!    - One operation table driving both the native implementation and
//!      the device source renderer.
//! 2. **Hardware Abstraction** ([`hal`]):
//!    - CPU runtime symbol resolution for natively compiled kernels.
//!    - Compilation-unit assembly, source caching, and asynchronous
//!      program builds for command-queue devices.
//! 3. **Tracing** ([`trace`]):
//!    - Structured per-build and per-kernel records attached to a
//!      caller-supplied context.

pub mod hal;
pub mod num;
pub mod trace;
