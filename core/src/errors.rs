use crate::FaultFlags;

// KERNEL ERROR
// ================================================================================================

/// Errors returned by compound operations.
///
/// Arithmetic primitives never fail by return value (they saturate and raise
/// [`FaultFlags`] bits instead); this type covers everything above them:
/// argument validity, dimensional agreement, state readiness, buffer sizing,
/// and integrity violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("buffer for {context} holds {actual} elements but {needed} are required")]
    BufferTooSmall {
        context: &'static str,
        needed: usize,
        actual: usize,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    #[error("integrity check failed: {0} does not match")]
    HashMismatch(&'static str),
    #[error("operation rejected: fault flags {0:?} are set")]
    Faulted(FaultFlags),
    #[error("result exceeded the representable range")]
    Overflow,
    #[error("result fell below the representable range")]
    Underflow,
    #[error("division by zero")]
    DivZero,
    #[error("domain violation: {0}")]
    Domain(&'static str),
}
