//! Error types for the measurement reproduction engine.
//!
//! One variant per distinct failure kind, a single `thiserror::Error` enum
//! matched by callers that need the classification rather than a separate
//! error-code type.

use thiserror::Error;

/// Errors produced while reproducing MRTD/RTMR measurements.
#[derive(Error, Debug)]
pub enum MeasureError {
    #[error("firmware decode error: {0}")]
    FirmwareDecode(String),

    #[error("HOB build error: {0}")]
    Hob(String),

    #[error("PE/COFF decode error: {0}")]
    PeDecode(String),

    #[error("kernel header patch error: {0}")]
    KernelPatch(String),

    #[error("package length too large: {length:#x} bytes (max 2^28)")]
    PackageTooLarge { length: usize },
}
