use thiserror::Error;

/// Failures surfaced by a DART run or by the reconstruction engine it drives.
///
/// Nothing is retried internally: every variant is returned to the caller as
/// soon as it is detected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DartError {
    /// Bad parameters or inconsistent shapes (gray levels, probabilities,
    /// iteration counts, sinogram/geometry/mask dimensions).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An algorithm name outside the supported closed set, or one the engine
    /// cannot execute.
    #[error("unsupported reconstruction algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The engine produced non-finite values or failed internally.
    #[error("reconstruction failed: {0}")]
    ReconstructionFailure(String),
}

pub type Result<T> = std::result::Result<T, DartError>;

pub(crate) fn invalid(msg: impl Into<String>) -> DartError {
    DartError::InvalidConfiguration(msg.into())
}

pub(crate) fn ensure_shape(
    what: &str,
    actual: (usize, usize),
    expected: (usize, usize),
) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(invalid(format!(
            "{what} has shape {actual:?}, expected {expected:?}"
        )))
    }
}
