//! License entitlement and offline security validation for Shopdeck.
//!
//! Decides, without a trusted network connection, whether this
//! installation is authorized to operate, for how long, and whether it
//! shows signs of tampering.
//!
//! # Design
//!
//! - **Offline-first**: every check runs against local state; no license
//!   server is in the loop.
//! - **Fail closed**: storage faults and corrupt data deny access;
//!   nothing defaults to allow.
//! - **Layered scoring**: hardware binding, clock plausibility and
//!   structural integrity are scored independently and combined into a
//!   weighted trust score. A hard fault in any layer disqualifies the
//!   check outright.
//! - **Injected collaborators**: storage, validation, fingerprinting and
//!   the clock are constructor dependencies, so tests can substitute all
//!   of them.
//!
//! # Example
//!
//! ```
//! use shopdeck_license::{IssueGrant, LicenseService, ShopContext};
//! use shopdeck_storage::MemoryStore;
//! use std::sync::Arc;
//!
//! let service = LicenseService::new(Arc::new(MemoryStore::new()));
//! let shop = ShopContext::new("shop-17", "Corner Goods");
//! let grant = IssueGrant::new("ops@shopdeck.example");
//!
//! service.issue_trial(&shop, &grant).unwrap();
//! assert!(service.can_access().permits_access());
//! ```

mod audit;
mod device;
mod error;
mod info;
mod record;
mod service;
mod validator;

pub use audit::AuditEntry;
pub use device::{DeviceFingerprint, DeviceInfo, FingerprintProvider, SystemFingerprint};
pub use error::{LicenseError, LicenseResult};
pub use info::{EXPIRING_SOON_DAYS, LicenseInfo, format_license_info};
pub use record::{
    DEFAULT_TRIAL_DAYS, DaysRemaining, LicenseId, LicenseRecord, LicenseStatus, LicenseType,
    Provenance, ShopContext, generate_license_key,
};
pub use service::{
    AccessDecision, AccessOutcome, AccessReason, Clock, IssueGrant, LicenseService,
    LifecycleState, ServiceConfig, SystemClock,
};
pub use validator::{
    LayerBreakdown, LayerResult, LockdownState, RiskLevel, SecurityValidator, ValidationPolicy,
    ValidationReport,
};

/// Storage keys owned by the licensing core.
pub mod keys {
    /// Serialized [`LicenseRecord`](crate::LicenseRecord).
    pub const RECORD: &str = "license.record";
    /// Serialized lockdown flag.
    pub const LOCKDOWN: &str = "license.lockdown";
    /// Validation-clock high-water mark.
    pub const CLOCK: &str = "license.clock";
    /// Bounded diagnostic usage log.
    pub const AUDIT: &str = "license.audit";
}
