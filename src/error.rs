//! Error types surfaced by the kernel API.
//!
//! Only thread creation can fail; lookups that find nothing return
//! `Option::None` rather than an error.

use core::fmt;

/// Result alias for fallible kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

/// Errors reported by [`create`](crate::kernel::create).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KernelError {
    /// The thread name is empty, longer than
    /// [`MAX_NAME_LEN`](crate::config::MAX_NAME_LEN), or already taken by a
    /// live thread.
    InvalidName,
    /// The allocator could not provide a stack region.
    OutOfMemory,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::InvalidName => write!(f, "invalid or duplicate thread name"),
            KernelError::OutOfMemory => write!(f, "stack allocation failed"),
        }
    }
}
