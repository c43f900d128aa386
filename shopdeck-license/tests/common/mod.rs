//! Shared test helpers for licensing tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use shopdeck_license::{
    Clock, DeviceFingerprint, FingerprintProvider, IssueGrant, LicenseId, LicenseRecord,
    LicenseService, LicenseStatus, LicenseType, Provenance, SecurityValidator, ServiceConfig,
    ShopContext, ValidationPolicy, generate_license_key,
};
use shopdeck_storage::{KeyValueStore, MemoryStore, StorageError, StorageResult};
use std::io;
use std::sync::{Arc, Mutex};

/// Fixed starting instant for simulated time.
pub fn test_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

pub fn shop() -> ShopContext {
    ShopContext::new("shop-0017", "Harbor Market")
}

pub fn grant() -> IssueGrant {
    IssueGrant::new("authz-service")
}

pub fn fp(value: &str) -> DeviceFingerprint {
    DeviceFingerprint::from_value(value)
}

/// Clock that tests can move at will.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn starting_at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += delta;
    }

    pub fn advance_days(&self, days: i64) {
        self.advance(Duration::days(days));
    }

    pub fn rewind(&self, delta: Duration) {
        let mut now = self.now.lock().unwrap();
        *now -= delta;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Store that can be made to fail writes to one key, simulating a disk
/// fault partway through an operation. Reads and other keys pass through
/// to an inner memory store.
pub struct FailingStore {
    inner: MemoryStore,
    failing_key: Mutex<Option<String>>,
}

impl FailingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            failing_key: Mutex::new(None),
        })
    }

    /// All later writes to `key` fail with an IO error.
    pub fn fail_writes_to(&self, key: &str) {
        *self.failing_key.lock().unwrap() = Some(key.to_string());
    }
}

impl KeyValueStore for FailingStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        if self.failing_key.lock().unwrap().as_deref() == Some(key) {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::StorageFull,
                "no space left on device",
            )));
        }
        self.inner.set(key, value)
    }

    fn clear(&self, key: &str) -> StorageResult<()> {
        self.inner.clear(key)
    }
}

/// Fingerprint provider pinned to a fixed value, switchable mid-test to
/// simulate the record landing on a different machine.
pub struct PinnedFingerprint {
    value: Mutex<String>,
}

impl PinnedFingerprint {
    pub fn new(value: &str) -> Arc<Self> {
        Arc::new(Self {
            value: Mutex::new(value.to_string()),
        })
    }

    pub fn switch_to(&self, value: &str) {
        *self.value.lock().unwrap() = value.to_string();
    }
}

impl FingerprintProvider for PinnedFingerprint {
    fn current(&self) -> DeviceFingerprint {
        DeviceFingerprint::from_value(self.value.lock().unwrap().clone())
    }
}

/// A full service rig over a shared in-memory store, with simulated time
/// and a pinned fingerprint (`device-a`).
pub struct Rig {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub fingerprints: Arc<PinnedFingerprint>,
    pub validator: Arc<SecurityValidator>,
    pub service: LicenseService,
}

pub fn rig() -> Rig {
    rig_with(ServiceConfig::default(), ValidationPolicy::default())
}

pub fn rig_with(config: ServiceConfig, policy: ValidationPolicy) -> Rig {
    let store = Arc::new(MemoryStore::new());
    let clock = ManualClock::starting_at(test_epoch());
    let fingerprints = PinnedFingerprint::new("device-a");
    let validator = Arc::new(SecurityValidator::with_policy(store.clone(), policy));
    let service = LicenseService::with_parts(
        store.clone(),
        Arc::clone(&validator),
        fingerprints.clone(),
        clock.clone(),
        config,
    );
    Rig {
        store,
        clock,
        fingerprints,
        validator,
        service,
    }
}

/// A fresh, internally consistent trial record bound to `device-a`.
pub fn trial_record(now: DateTime<Utc>) -> LicenseRecord {
    LicenseRecord {
        id: LicenseId::new(),
        license_type: LicenseType::Trial,
        status: LicenseStatus::Active,
        issued_at: now,
        activated_at: now,
        expires_at: Some(now + Duration::days(30)),
        owner_shop_id: "shop-0017".into(),
        owner_shop_name: "Harbor Market".into(),
        license_key: generate_license_key(),
        binding_fingerprint: Some("device-a".into()),
        trial_days_used: Some(0),
        max_trial_days: Some(30),
        issued_by: Provenance::TrialSignup,
    }
}

/// An unlimited record bound to `device-a`.
pub fn unlimited_record(now: DateTime<Utc>) -> LicenseRecord {
    LicenseRecord {
        id: LicenseId::new(),
        license_type: LicenseType::Unlimited,
        status: LicenseStatus::Active,
        issued_at: now,
        activated_at: now,
        expires_at: None,
        owner_shop_id: "shop-0017".into(),
        owner_shop_name: "Harbor Market".into(),
        license_key: generate_license_key(),
        binding_fingerprint: Some("device-a".into()),
        trial_days_used: None,
        max_trial_days: None,
        issued_by: Provenance::PrivilegedGrant,
    }
}

/// A standalone validator over its own in-memory store.
pub fn validator() -> (Arc<MemoryStore>, SecurityValidator) {
    let store = Arc::new(MemoryStore::new());
    let validator = SecurityValidator::new(store.clone());
    (store, validator)
}
