//! License service: issuance, entitlement, renewal and boot-out.
//!
//! One instance per process, constructed with injected collaborators so
//! tests can substitute storage, validation, fingerprinting and the
//! clock. Reads (`can_access`) run concurrently; mutations serialize
//! behind a single mutex and persist by replacing the whole record.

use crate::device::{FingerprintProvider, SystemFingerprint};
use crate::error::{LicenseError, LicenseResult};
use crate::info::{LicenseInfo, format_license_info};
use crate::keys;
use crate::record::{
    DEFAULT_TRIAL_DAYS, DaysRemaining, LicenseId, LicenseRecord, LicenseStatus, LicenseType,
    Provenance, ShopContext, generate_license_key,
};
use crate::validator::{SecurityValidator, ValidationReport};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shopdeck_storage::KeyValueStore;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info, warn};

/// Source of the current instant. Injected so tests can simulate the
/// passage of time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Proof that an external authorizer approved a privileged issuance.
///
/// The service never compares credentials; it only records who granted
/// the operation. Construct one after the caller's own authorization
/// check has passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueGrant {
    authorized_by: String,
}

impl IssueGrant {
    /// Wraps the identity of the authorizer behind an issuance.
    pub fn new(authorized_by: impl Into<String>) -> Self {
        Self {
            authorized_by: authorized_by.into(),
        }
    }

    /// The authorizer recorded for audit display.
    #[must_use]
    pub fn authorized_by(&self) -> &str {
        &self.authorized_by
    }
}

/// Entitlement policy for the service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Days granted to a fresh trial.
    pub trial_days: u32,
    /// Days after expiry during which access continues with a renewal
    /// prompt.
    pub grace_days: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            trial_days: DEFAULT_TRIAL_DAYS,
            grace_days: 14,
        }
    }
}

/// The four user-visible access outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessOutcome {
    /// Full access.
    Granted,
    /// Access with a renewal prompt. The license is expired but inside
    /// its grace window.
    GrantedRenewalDue,
    /// No usable license; a new one must be issued.
    DeniedPendingReissue,
    /// Lockdown is engaged; only privileged re-issuance restores access.
    LockedOut,
}

impl AccessOutcome {
    /// True when the outcome lets the app run.
    #[must_use]
    pub fn permits_access(&self) -> bool {
        matches!(self, Self::Granted | Self::GrantedRenewalDue)
    }
}

/// Reason code attached to every decision. Callers see these instead of
/// raw error detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessReason {
    LicenseValid,
    RenewalDue,
    NoLicense,
    RecordUnreadable,
    ScoreBelowThreshold,
    BindingMismatch,
    ClockTamper,
    StructureInvalid,
    GraceLapsed,
    Revoked,
    Lockdown,
}

impl fmt::Display for AccessReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::LicenseValid => "license valid",
            Self::RenewalDue => "renewal due",
            Self::NoLicense => "no license issued",
            Self::RecordUnreadable => "license data unreadable",
            Self::ScoreBelowThreshold => "security score below threshold",
            Self::BindingMismatch => "device binding mismatch",
            Self::ClockTamper => "implausible clock state",
            Self::StructureInvalid => "license record inconsistent",
            Self::GraceLapsed => "grace period lapsed",
            Self::Revoked => "license revoked",
            Self::Lockdown => "lockdown engaged",
        };
        write!(f, "{text}")
    }
}

/// Decision returned by every access check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub outcome: AccessOutcome,
    pub reason: AccessReason,
    /// Remaining entitlement, when a record was readable.
    pub days_remaining: Option<DaysRemaining>,
    /// Display summary, when a record was readable and scored.
    pub info: Option<LicenseInfo>,
}

impl AccessDecision {
    /// True when the outcome lets the app run.
    #[must_use]
    pub fn permits_access(&self) -> bool {
        self.outcome.permits_access()
    }

    fn denied(reason: AccessReason) -> Self {
        Self {
            outcome: AccessOutcome::DeniedPendingReissue,
            reason,
            days_remaining: None,
            info: None,
        }
    }
}

/// Coarse lifecycle of the installation's licensing, derived from the
/// stored record and lockdown flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Nothing issued yet.
    NoRecord,
    /// A record exists and is inside its validity window.
    Active,
    /// A record exists but is past expiry.
    ExpiredGrace,
    /// Lockdown is engaged.
    LockedOut,
}

/// Orchestrates issuance, validation, renewal and boot-out over the
/// license store.
pub struct LicenseService {
    store: Arc<dyn KeyValueStore>,
    validator: Arc<SecurityValidator>,
    fingerprints: Arc<dyn FingerprintProvider>,
    clock: Arc<dyn Clock>,
    config: ServiceConfig,
    /// Serializes read-modify-persist mutations.
    mutation: Mutex<()>,
}

impl LicenseService {
    /// Creates a service over `store` with the default validator, the
    /// system fingerprint and the system clock.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let validator = Arc::new(SecurityValidator::new(Arc::clone(&store)));
        Self::with_parts(
            store,
            validator,
            Arc::new(SystemFingerprint),
            Arc::new(SystemClock),
            ServiceConfig::default(),
        )
    }

    /// Creates a service with explicit collaborators.
    pub fn with_parts(
        store: Arc<dyn KeyValueStore>,
        validator: Arc<SecurityValidator>,
        fingerprints: Arc<dyn FingerprintProvider>,
        clock: Arc<dyn Clock>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            validator,
            fingerprints,
            clock,
            config,
            mutation: Mutex::new(()),
        }
    }

    /// Returns the entitlement configuration.
    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Returns the validator, e.g. for usage tracking or lockdown
    /// inspection.
    #[must_use]
    pub fn validator(&self) -> &SecurityValidator {
        &self.validator
    }

    /// Checks whether the installation may run right now.
    ///
    /// This is the read path and is safe to call repeatedly and
    /// concurrently. Its only writes are diagnostics, the validator's
    /// clock high-water mark, and lockdown engagement when a check ends
    /// irrecoverably. Every failure inside maps to a denial; nothing
    /// here defaults to allow.
    pub fn can_access(&self) -> AccessDecision {
        let now = self.clock.now();

        let record = match self.load_record() {
            Ok(record) => record,
            Err(err) => {
                warn!(%err, "license record unreadable, failing closed");
                self.validator
                    .track_usage("access_check_failed", json!({ "error": err.to_string() }));
                return AccessDecision::denied(AccessReason::RecordUnreadable);
            }
        };

        let Some(record) = record else {
            // Lockdown outlives a cleared record after boot-out.
            match self.validator.lockdown() {
                Ok(Some(_)) => {
                    return AccessDecision {
                        outcome: AccessOutcome::LockedOut,
                        reason: AccessReason::Lockdown,
                        days_remaining: None,
                        info: None,
                    };
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(%err, "lockdown flag unreadable, failing closed");
                    return AccessDecision::denied(AccessReason::RecordUnreadable);
                }
            }
            self.validator
                .track_usage("access_check", json!({ "outcome": "no_license" }));
            return AccessDecision::denied(AccessReason::NoLicense);
        };

        let current = self.fingerprints.current();
        let report = match self.validator.validate_offline(&record, &current, now) {
            Ok(report) => report,
            Err(err) => {
                warn!(%err, "offline validation could not complete, failing closed");
                return AccessDecision::denied(AccessReason::RecordUnreadable);
            }
        };

        if !report.valid {
            return self.denial_for(&record, &report, now);
        }

        if record.status == LicenseStatus::Revoked {
            return AccessDecision {
                outcome: AccessOutcome::DeniedPendingReissue,
                reason: AccessReason::Revoked,
                days_remaining: Some(record.days_remaining_at(now)),
                info: Some(format_license_info(&record, &report, now)),
            };
        }

        match record.expires_at {
            Some(expires_at) if now >= expires_at => {
                let grace_ends = expires_at
                    .checked_add_signed(Duration::days(i64::from(self.config.grace_days)))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                let info = format_license_info(&record, &report, now);
                if now < grace_ends {
                    info!(license_id = %record.id, "license expired, inside grace window");
                    AccessDecision {
                        outcome: AccessOutcome::GrantedRenewalDue,
                        reason: AccessReason::RenewalDue,
                        days_remaining: Some(record.days_remaining_at(now)),
                        info: Some(info),
                    }
                } else {
                    warn!(license_id = %record.id, "grace window lapsed, engaging lockdown");
                    if let Err(err) = self
                        .validator
                        .trigger_lockdown("entitlement lapsed beyond the grace window")
                    {
                        error!(%err, "failed to persist lockdown");
                    }
                    AccessDecision {
                        outcome: AccessOutcome::LockedOut,
                        reason: AccessReason::GraceLapsed,
                        days_remaining: Some(record.days_remaining_at(now)),
                        info: Some(info),
                    }
                }
            }
            _ => AccessDecision {
                outcome: AccessOutcome::Granted,
                reason: AccessReason::LicenseValid,
                days_remaining: Some(record.days_remaining_at(now)),
                info: Some(format_license_info(&record, &report, now)),
            },
        }
    }

    /// Issues a fresh trial license, replacing any existing record.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured trial length is invalid or the
    /// record cannot be persisted.
    pub fn issue_trial(
        &self,
        shop: &ShopContext,
        grant: &IssueGrant,
    ) -> LicenseResult<LicenseRecord> {
        self.issue(
            shop,
            grant,
            LicenseType::Trial,
            Some(self.config.trial_days),
            Provenance::TrialSignup,
        )
    }

    /// Issues a paid license valid for `valid_days` days, replacing any
    /// existing record.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero-day or out-of-range period, or if the
    /// record cannot be persisted.
    pub fn issue_paid(
        &self,
        shop: &ShopContext,
        grant: &IssueGrant,
        valid_days: u32,
    ) -> LicenseResult<LicenseRecord> {
        self.issue(
            shop,
            grant,
            LicenseType::Paid,
            Some(valid_days),
            Provenance::Purchase,
        )
    }

    /// Issues a license that never expires, replacing any existing
    /// record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    pub fn issue_unlimited(
        &self,
        shop: &ShopContext,
        grant: &IssueGrant,
    ) -> LicenseResult<LicenseRecord> {
        self.issue(
            shop,
            grant,
            LicenseType::Unlimited,
            None,
            Provenance::PrivilegedGrant,
        )
    }

    /// Extends the current license by `additional_days`.
    ///
    /// Renewal counts from `max(now, current expiry)`, so renewing a
    /// long-expired license always lands in the future instead of
    /// producing another already-expired record. The first renewal of a
    /// trial converts it to a paid license, and the binding fingerprint
    /// is re-captured as an explicit, logged re-bind.
    ///
    /// # Errors
    ///
    /// Fails when no record exists, lockdown is engaged, the license is
    /// unlimited, or the extension is zero days or out of range.
    pub fn extend_license(&self, additional_days: u32) -> LicenseResult<LicenseRecord> {
        if additional_days == 0 {
            return Err(LicenseError::InvalidDuration(0));
        }
        let _guard = self.mutation.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(lockdown) = self.validator.lockdown()? {
            return Err(LicenseError::LockdownActive(lockdown.reason));
        }
        let mut record = self.load_record()?.ok_or(LicenseError::NoLicense)?;
        if record.is_unlimited() {
            return Err(LicenseError::NotRenewable(
                "unlimited licenses do not expire".into(),
            ));
        }
        let current_expiry = record.expires_at.ok_or_else(|| {
            LicenseError::StructuralIntegrity("renewable record carries no expiry".into())
        })?;

        let now = self.clock.now();
        let new_expiry = current_expiry
            .max(now)
            .checked_add_signed(Duration::days(i64::from(additional_days)))
            .ok_or(LicenseError::InvalidDuration(additional_days))?;

        let was_trial = record.is_trial();
        if was_trial {
            record.license_type = LicenseType::Paid;
            record.trial_days_used = None;
            record.max_trial_days = None;
        }
        record.expires_at = Some(new_expiry);
        record.status = LicenseStatus::Active;

        let fingerprint = self.fingerprints.current();
        let rebound = record.binding_fingerprint.as_deref() != Some(fingerprint.value());
        record.binding_fingerprint = Some(fingerprint.value().to_string());

        self.persist_record(&record)?;

        info!(
            license_id = %record.id,
            days = additional_days,
            new_expiry = %new_expiry,
            converted = was_trial,
            "license extended"
        );
        self.validator.track_usage(
            "license_extended",
            json!({
                "license_id": record.id.to_string(),
                "additional_days": additional_days,
                "new_expires_at": new_expiry.to_rfc3339(),
                "trial_converted": was_trial,
                "fingerprint_rebound": rebound,
            }),
        );
        Ok(record)
    }

    /// Clears the record entirely and engages lockdown.
    ///
    /// The hard removal path: recovery requires a fresh privileged
    /// issuance.
    ///
    /// # Errors
    ///
    /// Returns an error if the record or lockdown flag cannot be
    /// written.
    pub fn boot_user_out(&self, reason: &str) -> LicenseResult<()> {
        let _guard = self.mutation.lock().unwrap_or_else(PoisonError::into_inner);
        self.store.clear(keys::RECORD)?;
        self.validator.trigger_lockdown(reason)?;
        warn!(reason, "user booted out");
        self.validator
            .track_usage("boot_out", json!({ "reason": reason }));
        Ok(())
    }

    /// Returns the persisted record without validating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read or parsed.
    pub fn current_record(&self) -> LicenseResult<Option<LicenseRecord>> {
        self.load_record()
    }

    /// Coarse lifecycle summary for display and diagnostics.
    ///
    /// # Errors
    ///
    /// Returns an error if persisted state cannot be read.
    pub fn lifecycle_state(&self) -> LicenseResult<LifecycleState> {
        if self.validator.lockdown()?.is_some() {
            return Ok(LifecycleState::LockedOut);
        }
        let Some(record) = self.load_record()? else {
            return Ok(LifecycleState::NoRecord);
        };
        if record.is_expired_at(self.clock.now()) {
            Ok(LifecycleState::ExpiredGrace)
        } else {
            Ok(LifecycleState::Active)
        }
    }

    fn issue(
        &self,
        shop: &ShopContext,
        grant: &IssueGrant,
        license_type: LicenseType,
        valid_days: Option<u32>,
        provenance: Provenance,
    ) -> LicenseResult<LicenseRecord> {
        let _guard = self.mutation.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();
        let fingerprint = self.fingerprints.current();
        let is_trial = license_type == LicenseType::Trial;

        let expires_at = valid_days
            .map(|days| {
                if days == 0 {
                    return Err(LicenseError::InvalidDuration(0));
                }
                now.checked_add_signed(Duration::days(i64::from(days)))
                    .ok_or(LicenseError::InvalidDuration(days))
            })
            .transpose()?;

        let record = LicenseRecord {
            id: LicenseId::new(),
            license_type,
            status: LicenseStatus::Active,
            issued_at: now,
            activated_at: now,
            expires_at,
            owner_shop_id: shop.shop_id.clone(),
            owner_shop_name: shop.shop_name.clone(),
            license_key: generate_license_key(),
            binding_fingerprint: Some(fingerprint.value().to_string()),
            trial_days_used: is_trial.then_some(0),
            max_trial_days: is_trial.then_some(self.config.trial_days),
            issued_by: provenance,
        };

        // Re-issuance is the one path out of lockdown. The new record
        // lands first; a failed write leaves the hold in place.
        self.persist_record(&record)?;
        self.validator.clear_lockdown()?;

        info!(
            license_id = %record.id,
            license_type = %license_type,
            shop_id = %record.owner_shop_id,
            "license issued"
        );
        self.validator.track_usage(
            "license_issued",
            json!({
                "license_id": record.id.to_string(),
                "license_type": license_type,
                "shop_id": record.owner_shop_id,
                "authorized_by": grant.authorized_by(),
            }),
        );
        Ok(record)
    }

    fn denial_for(
        &self,
        record: &LicenseRecord,
        report: &ValidationReport,
        now: DateTime<Utc>,
    ) -> AccessDecision {
        let reason = if report.lockdown_active {
            AccessReason::Lockdown
        } else if !report.layers.hardware.valid {
            AccessReason::BindingMismatch
        } else if !report.layers.time.valid {
            AccessReason::ClockTamper
        } else if !report.layers.structure.valid {
            AccessReason::StructureInvalid
        } else {
            AccessReason::ScoreBelowThreshold
        };
        let outcome = if report.lockdown_active || report.layers.hard_disqualified() {
            AccessOutcome::LockedOut
        } else {
            AccessOutcome::DeniedPendingReissue
        };
        warn!(
            license_id = %record.id,
            ?outcome,
            %reason,
            score = report.security_score,
            "access denied"
        );
        AccessDecision {
            outcome,
            reason,
            days_remaining: Some(record.days_remaining_at(now)),
            info: Some(format_license_info(record, report, now)),
        }
    }

    fn load_record(&self) -> LicenseResult<Option<LicenseRecord>> {
        match self.store.get(keys::RECORD)? {
            None => Ok(None),
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        }
    }

    fn persist_record(&self, record: &LicenseRecord) -> LicenseResult<()> {
        self.store.set(keys::RECORD, &serde_json::to_vec(record)?)?;
        Ok(())
    }
}
