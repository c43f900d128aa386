//! Offline security validation.
//!
//! Scores a license record against the current device and clock without
//! any network round trip, across three weighted layers:
//!
//! - **hardware**: binding fingerprint vs. the current installation
//! - **time**: clock plausibility against a persisted high-water mark
//! - **structure**: internal consistency of the record itself
//!
//! The layers produce a 0-100 trust score, but a hard disqualification
//! in any layer (binding mismatch, clock rollback, structural fault)
//! fails the check outright no matter what the aggregate says. The
//! validator also owns the persisted lockdown flag, which forces every
//! later check to fail until a privileged re-issuance clears it.

use crate::audit::{AuditEntry, AuditLog};
use crate::device::DeviceFingerprint;
use crate::error::{LicenseError, LicenseResult};
use crate::keys;
use crate::record::LicenseRecord;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shopdeck_storage::KeyValueStore;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tunable weights and thresholds for offline validation.
///
/// These are policy, not constants: a deployment can tighten or relax
/// them without touching the scoring code.
#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    /// Relative weight of the hardware-binding layer.
    pub hardware_weight: f64,
    /// Relative weight of the clock-plausibility layer.
    pub time_weight: f64,
    /// Relative weight of the structural-integrity layer.
    pub structure_weight: f64,
    /// Minimum aggregate score for a passing check.
    pub pass_threshold: u8,
    /// Allowed backwards clock drift before rollback is flagged. Covers
    /// timezone changes and DST noise.
    pub clock_tolerance: Duration,
    /// Hardware score for a record with no stored fingerprint.
    pub unbound_hardware_score: u8,
    /// Hardware score for a fingerprint mismatch. Near zero; the hard
    /// disqualification does the real work.
    pub mismatch_hardware_score: u8,
    /// Maximum retained audit entries.
    pub audit_capacity: usize,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            hardware_weight: 0.40,
            time_weight: 0.30,
            structure_weight: 0.30,
            pass_threshold: 60,
            clock_tolerance: Duration::minutes(5),
            unbound_hardware_score: 60,
            mismatch_hardware_score: 5,
            audit_capacity: 256,
        }
    }
}

impl ValidationPolicy {
    /// Layer weights normalized to sum to 1.0, so configured weights
    /// need not form an exact split.
    fn normalized_weights(&self) -> (f64, f64, f64) {
        let sum = self.hardware_weight + self.time_weight + self.structure_weight;
        if sum <= f64::EPSILON {
            return (1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0);
        }
        (
            self.hardware_weight / sum,
            self.time_weight / sum,
            self.structure_weight / sum,
        )
    }
}

/// Risk classification of an offline check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Buckets an aggregate score: 85+ low, 60-84 medium, 30-59 high,
    /// below 30 critical.
    #[must_use]
    pub fn for_score(score: u8) -> Self {
        match score {
            85.. => Self::Low,
            60..=84 => Self::Medium,
            30..=59 => Self::High,
            _ => Self::Critical,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Outcome of a single validation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerResult {
    /// False marks a hard disqualification, not merely a low score.
    pub valid: bool,
    /// Layer score, 0-100.
    pub score: u8,
    /// Diagnostic note, set when the layer saw anything unusual.
    pub note: Option<String>,
}

impl LayerResult {
    fn pass(score: u8) -> Self {
        Self {
            valid: true,
            score,
            note: None,
        }
    }

    fn pass_with(score: u8, note: impl Into<String>) -> Self {
        Self {
            valid: true,
            score,
            note: Some(note.into()),
        }
    }

    fn fail(score: u8, note: impl Into<String>) -> Self {
        Self {
            valid: false,
            score,
            note: Some(note.into()),
        }
    }
}

/// Per-layer breakdown of a validation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerBreakdown {
    pub hardware: LayerResult,
    pub time: LayerResult,
    pub structure: LayerResult,
}

impl LayerBreakdown {
    /// True if any layer reported a hard disqualification.
    #[must_use]
    pub fn hard_disqualified(&self) -> bool {
        !self.hardware.valid || !self.time.valid || !self.structure.valid
    }
}

/// Result of an offline validation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Final verdict: offline validity gated by the lockdown flag.
    pub valid: bool,
    /// Verdict of the scored layers alone, ignoring lockdown.
    pub offline_valid: bool,
    /// Weighted aggregate of the layer scores, 0-100.
    pub security_score: u8,
    /// Risk classification. A hard disqualification escalates this to
    /// critical regardless of the numeric score.
    pub risk_level: RiskLevel,
    /// Whether the persisted lockdown flag was engaged when the check
    /// started.
    pub lockdown_active: bool,
    /// Per-layer detail.
    pub layers: LayerBreakdown,
}

/// Persisted lockdown flag. While present, every validation fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockdownState {
    /// Why lockdown was engaged.
    pub reason: String,
    /// When it was engaged.
    pub engaged_at: DateTime<Utc>,
}

/// Persisted high-water mark of observed validation instants. A clock
/// that falls behind it by more than the tolerance is implausible.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct ValidationClock {
    last_seen: DateTime<Utc>,
}

/// Offline validator over a license store.
///
/// Lockdown flag and clock high-water mark are read from the store on
/// every call, so state stays consistent across concurrent checks and
/// process restarts.
pub struct SecurityValidator {
    store: Arc<dyn KeyValueStore>,
    policy: ValidationPolicy,
    audit: AuditLog,
}

impl SecurityValidator {
    /// Creates a validator with the default policy.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_policy(store, ValidationPolicy::default())
    }

    /// Creates a validator with a custom policy.
    pub fn with_policy(store: Arc<dyn KeyValueStore>, policy: ValidationPolicy) -> Self {
        let audit = AuditLog::new(Arc::clone(&store), policy.audit_capacity);
        Self {
            store,
            policy,
            audit,
        }
    }

    /// Returns the active validation policy.
    #[must_use]
    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Scores `record` against the current device and clock.
    ///
    /// Advances the persisted clock high-water mark, and engages
    /// lockdown when the check lands at critical risk.
    ///
    /// # Errors
    ///
    /// Returns an error when persisted state cannot be read or written.
    /// Callers must treat that as a failed check, never as a pass.
    pub fn validate_offline(
        &self,
        record: &LicenseRecord,
        current_fingerprint: &DeviceFingerprint,
        now: DateTime<Utc>,
    ) -> LicenseResult<ValidationReport> {
        let lockdown = self.lockdown()?;
        let high_water = self.read_clock()?;

        let layers = LayerBreakdown {
            hardware: self.check_hardware(record, current_fingerprint),
            time: self.check_time(record, high_water, now),
            structure: check_structure(record),
        };

        let security_score = self.weighted_score(&layers);
        let hard_fail = layers.hard_disqualified();
        let offline_valid = !hard_fail && security_score >= self.policy.pass_threshold;
        let risk_level = if hard_fail {
            RiskLevel::Critical
        } else {
            RiskLevel::for_score(security_score)
        };
        let lockdown_active = lockdown.is_some();
        let valid = offline_valid && !lockdown_active;

        self.advance_clock(high_water, now)?;

        if risk_level == RiskLevel::Critical && lockdown.is_none() {
            self.trigger_lockdown(&critical_reason(&layers))?;
        }

        let report = ValidationReport {
            valid,
            offline_valid,
            security_score,
            risk_level,
            lockdown_active,
            layers,
        };

        if report.valid {
            debug!(
                license_id = %record.id,
                score = report.security_score,
                risk = %report.risk_level,
                "offline validation passed"
            );
        } else {
            warn!(
                license_id = %record.id,
                score = report.security_score,
                risk = %report.risk_level,
                lockdown = report.lockdown_active,
                "offline validation failed"
            );
        }
        self.audit.append(
            "offline_validation",
            json!({
                "license_id": record.id.to_string(),
                "score": report.security_score,
                "risk": report.risk_level,
                "valid": report.valid,
            }),
        );

        Ok(report)
    }

    /// Returns the persisted lockdown state, if engaged.
    ///
    /// # Errors
    ///
    /// Returns an error when the flag cannot be read or parsed. Treat
    /// that as locked, not as clear.
    pub fn lockdown(&self) -> LicenseResult<Option<LockdownState>> {
        match self.store.get(keys::LOCKDOWN)? {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                LicenseError::Validation(format!("lockdown flag unreadable: {e}"))
            }),
        }
    }

    /// Engages lockdown. Every later check fails until a privileged
    /// re-issuance clears the flag.
    pub fn trigger_lockdown(&self, reason: &str) -> LicenseResult<()> {
        let state = LockdownState {
            reason: reason.to_string(),
            engaged_at: Utc::now(),
        };
        self.store.set(keys::LOCKDOWN, &serde_json::to_vec(&state)?)?;
        warn!(reason, "lockdown engaged");
        self.audit
            .append("lockdown_engaged", json!({ "reason": reason }));
        Ok(())
    }

    /// Clears the lockdown flag. Reserved for privileged re-issuance.
    pub fn clear_lockdown(&self) -> LicenseResult<()> {
        self.store.clear(keys::LOCKDOWN)?;
        info!("lockdown cleared");
        self.audit.append("lockdown_cleared", json!({}));
        Ok(())
    }

    /// Appends a diagnostic event to the bounded usage log.
    ///
    /// Purely a side channel: entries never feed back into validation,
    /// and failures are swallowed after logging.
    pub fn track_usage(&self, event: &str, metadata: serde_json::Value) {
        self.audit.append(event, metadata);
    }

    /// Returns the retained usage entries, oldest first.
    pub fn usage_log(&self) -> LicenseResult<Vec<AuditEntry>> {
        self.audit.entries()
    }

    fn check_hardware(
        &self,
        record: &LicenseRecord,
        current: &DeviceFingerprint,
    ) -> LayerResult {
        match record.binding_fingerprint.as_deref() {
            None => LayerResult::pass_with(
                self.policy.unbound_hardware_score,
                "no stored fingerprint, binding degraded",
            ),
            Some(bound) if bound == current.value() => LayerResult::pass(100),
            Some(_) => LayerResult::fail(
                self.policy.mismatch_hardware_score,
                "bound to a different device",
            ),
        }
    }

    fn check_time(
        &self,
        record: &LicenseRecord,
        high_water: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> LayerResult {
        let tolerance = self.policy.clock_tolerance;

        // Covers both a rolled-back clock and a future-dated record.
        if now + tolerance < record.issued_at {
            return LayerResult::fail(0, "clock earlier than record issuance");
        }
        if record.activated_at > now + tolerance {
            return LayerResult::fail(0, "record activated in the future");
        }
        if let Some(mark) = high_water {
            if now + tolerance < mark {
                return LayerResult::fail(0, "clock behind the last observed validation");
            }
            if now < mark {
                // Within tolerance: timezone or DST noise, not tampering.
                return LayerResult::pass_with(80, "minor clock skew");
            }
        }
        LayerResult::pass(100)
    }

    fn weighted_score(&self, layers: &LayerBreakdown) -> u8 {
        let (hw, tw, sw) = self.policy.normalized_weights();
        let score = f64::from(layers.hardware.score) * hw
            + f64::from(layers.time.score) * tw
            + f64::from(layers.structure.score) * sw;
        score.round().clamp(0.0, 100.0) as u8
    }

    fn read_clock(&self) -> LicenseResult<Option<DateTime<Utc>>> {
        match self.store.get(keys::CLOCK)? {
            None => Ok(None),
            Some(bytes) => {
                let clock: ValidationClock = serde_json::from_slice(&bytes).map_err(|e| {
                    LicenseError::Validation(format!("validation clock unreadable: {e}"))
                })?;
                Ok(Some(clock.last_seen))
            }
        }
    }

    /// The mark only moves forward; a plausible older `now` leaves it
    /// untouched.
    fn advance_clock(
        &self,
        high_water: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> LicenseResult<()> {
        if high_water.is_none_or(|mark| now > mark) {
            let clock = ValidationClock { last_seen: now };
            self.store.set(keys::CLOCK, &serde_json::to_vec(&clock)?)?;
        }
        Ok(())
    }
}

/// Penalty per soft structural fault.
const SOFT_FAULT_PENALTY: u8 = 15;
/// Floor for the structure score when only soft faults are present.
const SOFT_FAULT_FLOOR: u8 = 40;

/// Checks the internal consistency of a record.
///
/// Hard faults (impossible type and expiry combinations, inverted
/// timestamps, broken trial bookkeeping) zero the layer and disqualify
/// the check. Soft faults (missing display fields) only dent the score.
fn check_structure(record: &LicenseRecord) -> LayerResult {
    let mut hard: Vec<&str> = Vec::new();
    let mut soft: Vec<&str> = Vec::new();

    match (record.license_type.expires(), record.expires_at) {
        (false, Some(_)) => hard.push("unlimited record carries an expiry"),
        (true, None) => hard.push("record carries no expiry"),
        _ => {}
    }
    if let Some(expires_at) = record.expires_at {
        if expires_at <= record.activated_at {
            hard.push("expiry not after activation");
        }
    }
    if record.activated_at < record.issued_at {
        hard.push("activated before issuance");
    }
    if record.is_trial() {
        if record.trial_days_used.is_none() || record.max_trial_days.is_none() {
            hard.push("trial bookkeeping missing");
        }
        if record.max_trial_days == Some(0) {
            hard.push("zero-day trial allowance");
        }
    } else if record.trial_days_used.is_some() || record.max_trial_days.is_some() {
        hard.push("trial bookkeeping on a non-trial record");
    }
    if record.id.as_uuid().is_nil() {
        hard.push("nil record id");
    }
    if record.license_key.is_empty() {
        hard.push("empty license key");
    }
    if record.owner_shop_id.is_empty() {
        soft.push("missing shop id");
    }
    if record.owner_shop_name.is_empty() {
        soft.push("missing shop name");
    }

    if !hard.is_empty() {
        return LayerResult::fail(0, hard.join("; "));
    }
    if !soft.is_empty() {
        let penalty = SOFT_FAULT_PENALTY.saturating_mul(soft.len() as u8);
        let score = 100u8.saturating_sub(penalty).max(SOFT_FAULT_FLOOR);
        return LayerResult::pass_with(score, soft.join("; "));
    }
    LayerResult::pass(100)
}

fn critical_reason(layers: &LayerBreakdown) -> String {
    let failing = [
        ("hardware", &layers.hardware),
        ("time", &layers.time),
        ("structure", &layers.structure),
    ]
    .into_iter()
    .find(|(_, layer)| !layer.valid);
    match failing {
        Some((name, layer)) => format!(
            "critical risk in {name} layer: {}",
            layer.note.as_deref().unwrap_or("unspecified")
        ),
        None => "critical risk from aggregate score".to_string(),
    }
}
