//! Error types for the AXI SPI controller

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AxiSpiError>;

/// Every failure a controller operation can report.
///
/// `Busy` is produced by the readiness checks while polling; the wait loop
/// turns repeated `Busy` into `Timeout`, so callers normally never see it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AxiSpiError {
    /// No register block is bound
    #[error("no AXI SPI device bound to this controller")]
    NoDevice,

    #[error("timed out after {timeout_ms} poll iterations")]
    Timeout { timeout_ms: u16 },

    #[error("AXI SPI resource busy")]
    Busy,

    /// The hardware is in a state that can never become ready
    #[error("invalid controller configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl AxiSpiError {
    /// Negative errno matching the result codes of the C driver ABI.
    pub fn errno(&self) -> i32 {
        match self {
            AxiSpiError::NoDevice => -libc::ENODEV,
            AxiSpiError::Timeout { .. } => -libc::ETIMEDOUT,
            AxiSpiError::Busy => -libc::EBUSY,
            AxiSpiError::InvalidConfig(_) | AxiSpiError::InvalidArgument(_) => -libc::EINVAL,
        }
    }
}
