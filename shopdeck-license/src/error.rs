//! Error types for the licensing core.
//!
//! Everything here fails closed: when an error reaches an access check,
//! the check denies. Nothing in this crate maps an error to a default
//! allow.

use shopdeck_storage::StorageError;
use thiserror::Error;

/// Result type for licensing operations.
pub type LicenseResult<T> = Result<T, LicenseError>;

/// Licensing-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// No license record is present; one must be issued.
    #[error("no license record present")]
    NoLicense,

    /// The validator could not complete an offline check.
    #[error("validation could not complete: {0}")]
    Validation(String),

    /// The record is bound to a different device fingerprint.
    #[error("license is bound to a different device")]
    HardwareBinding,

    /// The record's own fields are inconsistent, which means corruption
    /// or tampering.
    #[error("license record failed integrity checks: {0}")]
    StructuralIntegrity(String),

    /// The license is past its expiry date.
    #[error("license expired {days_past_expiry} day(s) ago")]
    Expired { days_past_expiry: i64 },

    /// Lockdown is engaged; only a privileged re-issuance clears it.
    #[error("lockdown active: {0}")]
    LockdownActive(String),

    /// The requested operation does not apply to this license type.
    #[error("license cannot be renewed: {0}")]
    NotRenewable(String),

    /// A requested validity period is out of range.
    #[error("invalid validity period: {0} day(s)")]
    InvalidDuration(u32),

    /// Error from the underlying license store.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
