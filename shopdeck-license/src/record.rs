//! The license record data model.
//!
//! Exactly one record is current for an installation at any time; issuing
//! a new license replaces the prior record wholesale. Expiry, status and
//! trial bookkeeping are derived from timestamps here, never cached.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Days granted to a fresh trial license.
pub const DEFAULT_TRIAL_DAYS: u32 = 30;

/// Unique identifier for a license record.
/// Uses UUID v7 which embeds a timestamp for natural ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LicenseId(Uuid);

impl LicenseId {
    /// Creates a new license ID with the current timestamp.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a license ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parses a license ID from a string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for LicenseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LicenseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LicenseId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The commercial type of a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseType {
    /// Time-boxed evaluation license.
    Trial,
    /// Purchased license with a fixed validity period.
    Paid,
    /// License with no expiry date.
    Unlimited,
}

impl LicenseType {
    /// Returns true if licenses of this type carry an expiry date.
    #[must_use]
    pub fn expires(&self) -> bool {
        !matches!(self, Self::Unlimited)
    }
}

impl fmt::Display for LicenseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trial => write!(f, "trial"),
            Self::Paid => write!(f, "paid"),
            Self::Unlimited => write!(f, "unlimited"),
        }
    }
}

/// Persisted status of a record. Set only by the service; callers never
/// write it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    /// The record is in good standing.
    Active,
    /// The record lapsed and was marked during a mutation.
    Expired,
    /// The record was administratively revoked.
    Revoked,
}

/// Which issuance path created a record. Audit display only; validation
/// never reads this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    TrialSignup,
    Purchase,
    PrivilegedGrant,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TrialSignup => write!(f, "trial signup"),
            Self::Purchase => write!(f, "purchase"),
            Self::PrivilegedGrant => write!(f, "privileged grant"),
        }
    }
}

/// Remaining entitlement, with an explicit sentinel for licenses that
/// never expire. Callers must not treat unlimited as a large day count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaysRemaining {
    /// The record never expires.
    Unlimited,
    /// Whole days until expiry, clamped to zero once past it.
    Days(u32),
}

impl DaysRemaining {
    /// Returns true for the unlimited sentinel.
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }
}

impl fmt::Display for DaysRemaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlimited => write!(f, "unlimited"),
            Self::Days(days) => write!(f, "{days} day(s)"),
        }
    }
}

/// Snapshot of the shop profile consumed at issuance time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopContext {
    pub shop_id: String,
    pub shop_name: String,
}

impl ShopContext {
    /// Creates a shop context from its identifier and display name.
    pub fn new(shop_id: impl Into<String>, shop_name: impl Into<String>) -> Self {
        Self {
            shop_id: shop_id.into(),
            shop_name: shop_name.into(),
        }
    }
}

/// The central licensing entity.
///
/// Fields are public so the validator can inspect them and tests can
/// build malformed records; production code mutates records only through
/// the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRecord {
    pub id: LicenseId,
    pub license_type: LicenseType,
    pub status: LicenseStatus,
    /// When the record was created.
    pub issued_at: DateTime<Utc>,
    /// When the record became active on this installation.
    pub activated_at: DateTime<Utc>,
    /// Expiry instant. `None` only for unlimited licenses.
    pub expires_at: Option<DateTime<Utc>>,
    pub owner_shop_id: String,
    pub owner_shop_name: String,
    /// Human-readable reference key for support and display.
    pub license_key: String,
    /// Fingerprint of the installation this record is bound to. `None`
    /// for legacy records issued before binding existed.
    pub binding_fingerprint: Option<String>,
    /// Trial bookkeeping. Present exactly when `license_type` is trial.
    pub trial_days_used: Option<u32>,
    pub max_trial_days: Option<u32>,
    /// Which issuance path created this record.
    pub issued_by: Provenance,
}

impl LicenseRecord {
    /// Returns true for trial records.
    #[must_use]
    pub fn is_trial(&self) -> bool {
        self.license_type == LicenseType::Trial
    }

    /// Returns true for records that never expire.
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.license_type == LicenseType::Unlimited
    }

    /// Whether the record is past its expiry at `now`. Unlimited records
    /// never expire.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => false,
            Some(expires_at) => now >= expires_at,
        }
    }

    /// Whole days of entitlement left at `now`, clamped to zero.
    #[must_use]
    pub fn days_remaining_at(&self, now: DateTime<Utc>) -> DaysRemaining {
        match self.expires_at {
            None => DaysRemaining::Unlimited,
            Some(expires_at) => {
                let days = (expires_at - now).num_days().max(0);
                DaysRemaining::Days(days as u32)
            }
        }
    }

    /// Whole days past expiry at `now`. Zero when unexpired or unlimited.
    #[must_use]
    pub fn days_past_expiry_at(&self, now: DateTime<Utc>) -> i64 {
        match self.expires_at {
            None => 0,
            Some(expires_at) => (now - expires_at).num_days().max(0),
        }
    }

    /// Whole trial days consumed at `now`, capped at the trial allowance.
    /// Zero for non-trial records.
    #[must_use]
    pub fn trial_days_used_at(&self, now: DateTime<Utc>) -> u32 {
        if !self.is_trial() {
            return 0;
        }
        let used = (now - self.activated_at).num_days().max(0) as u32;
        match self.max_trial_days {
            Some(max) => used.min(max),
            None => used,
        }
    }
}

/// Alphabet for license keys. Ambiguous glyphs (0/O, 1/I) are excluded.
const KEY_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const KEY_GROUPS: usize = 4;
const KEY_GROUP_LEN: usize = 4;

/// Generates a human-readable reference key, e.g. `SDK-9F2M-K73P-XW4H-QZ8T`.
///
/// The key identifies a record for support and display. It carries no
/// cryptographic weight; tamper detection is the validator's job.
#[must_use]
pub fn generate_license_key() -> String {
    let mut rng = rand::thread_rng();
    let mut key = String::with_capacity(3 + KEY_GROUPS * (KEY_GROUP_LEN + 1));
    key.push_str("SDK");
    for _ in 0..KEY_GROUPS {
        key.push('-');
        for _ in 0..KEY_GROUP_LEN {
            let idx = rng.gen_range(0..KEY_ALPHABET.len());
            key.push(KEY_ALPHABET[idx] as char);
        }
    }
    key
}
