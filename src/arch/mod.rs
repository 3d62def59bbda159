//! Hardware port selection.
//!
//! The Cortex-M4 port is the real thing. Every other build — in practice
//! the host, where the unit tests run — gets a no-op shim with the same
//! surface, which keeps the scheduler core testable off-target.

#[cfg(target_arch = "arm")]
pub mod cortex_m4;
#[cfg(target_arch = "arm")]
pub use self::cortex_m4 as port;

#[cfg(not(target_arch = "arm"))]
pub mod host;
#[cfg(not(target_arch = "arm"))]
pub use self::host as port;
