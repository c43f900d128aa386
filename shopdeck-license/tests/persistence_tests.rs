//! End-to-end persistence through the file-backed store, as the POS
//! shell runs it: state must survive process restarts byte-for-byte.

mod common;

use common::{ManualClock, PinnedFingerprint, grant, shop, test_epoch};
use shopdeck_license::{
    AccessOutcome, LicenseService, LicenseType, SecurityValidator, ServiceConfig,
};
use shopdeck_storage::FileStore;
use std::path::Path;
use std::sync::Arc;

fn service_at(dir: &Path, clock: &Arc<ManualClock>) -> LicenseService {
    let store = Arc::new(FileStore::open(dir).unwrap());
    let validator = Arc::new(SecurityValidator::new(store.clone()));
    LicenseService::with_parts(
        store,
        validator,
        PinnedFingerprint::new("device-a"),
        clock.clone(),
        ServiceConfig::default(),
    )
}

#[test]
fn record_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::starting_at(test_epoch());

    let issued = {
        let service = service_at(dir.path(), &clock);
        service.issue_paid(&shop(), &grant(), 90).unwrap()
    };

    let service = service_at(dir.path(), &clock);
    let record = service.current_record().unwrap().unwrap();
    assert_eq!(record.id, issued.id);
    assert_eq!(record.license_type, LicenseType::Paid);
    assert_eq!(service.can_access().outcome, AccessOutcome::Granted);
}

#[test]
fn lockdown_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::starting_at(test_epoch());

    {
        let service = service_at(dir.path(), &clock);
        service.issue_trial(&shop(), &grant()).unwrap();
        service.boot_user_out("chargeback").unwrap();
    }

    let service = service_at(dir.path(), &clock);
    assert_eq!(service.can_access().outcome, AccessOutcome::LockedOut);
    let lockdown = service.validator().lockdown().unwrap().unwrap();
    assert_eq!(lockdown.reason, "chargeback");
}

#[test]
fn clock_high_water_mark_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::starting_at(test_epoch());

    {
        let service = service_at(dir.path(), &clock);
        service.issue_trial(&shop(), &grant()).unwrap();
        clock.advance_days(10);
        assert_eq!(service.can_access().outcome, AccessOutcome::Granted);
    }

    // Day 8 is fine by the record alone; only the persisted day-10 mark
    // makes the rollback visible.
    clock.rewind(chrono::Duration::days(2));
    let service = service_at(dir.path(), &clock);
    assert_eq!(service.can_access().outcome, AccessOutcome::LockedOut);
}
