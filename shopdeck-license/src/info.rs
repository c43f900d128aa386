//! Display-ready license summary.

use crate::record::{DaysRemaining, LicenseRecord, LicenseStatus, LicenseType};
use crate::validator::{RiskLevel, ValidationReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Remaining days at or below which the summary flags an imminent
/// expiry.
pub const EXPIRING_SOON_DAYS: u32 = 7;

/// Display-ready summary of a record plus its latest validation.
///
/// A pure projection for the settings screen and support bundles;
/// nothing here feeds back into entitlement decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseInfo {
    pub license_type: LicenseType,
    /// Status derived from the stored record and the clock, so an
    /// expired record reads as expired even before any mutation marks
    /// it.
    pub status: LicenseStatus,
    pub shop_name: String,
    pub days_remaining: DaysRemaining,
    pub is_trial: bool,
    pub is_unlimited: bool,
    pub is_expired: bool,
    pub is_expiring_soon: bool,
    pub risk_level: RiskLevel,
}

/// Projects a record and its validation report into a display summary.
#[must_use]
pub fn format_license_info(
    record: &LicenseRecord,
    report: &ValidationReport,
    now: DateTime<Utc>,
) -> LicenseInfo {
    let days_remaining = record.days_remaining_at(now);
    let is_expired = record.is_expired_at(now);
    let is_expiring_soon = match days_remaining {
        DaysRemaining::Unlimited => false,
        DaysRemaining::Days(days) => !is_expired && days <= EXPIRING_SOON_DAYS,
    };
    let status = if record.status == LicenseStatus::Revoked {
        LicenseStatus::Revoked
    } else if is_expired {
        LicenseStatus::Expired
    } else {
        record.status
    };
    LicenseInfo {
        license_type: record.license_type,
        status,
        shop_name: record.owner_shop_name.clone(),
        days_remaining,
        is_trial: record.is_trial(),
        is_unlimited: record.is_unlimited(),
        is_expired,
        is_expiring_soon,
        risk_level: report.risk_level,
    }
}
