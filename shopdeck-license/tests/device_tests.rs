use shopdeck_license::{DeviceFingerprint, DeviceInfo, FingerprintProvider, SystemFingerprint};

#[test]
fn device_info_collection() {
    let info = DeviceInfo::collect();
    assert!(!info.os_name.is_empty());
    assert!(!info.arch.is_empty());
    assert!(!info.hostname.is_empty());
}

#[test]
fn device_info_serde() {
    let info = DeviceInfo::collect();
    let json = serde_json::to_string(&info).unwrap();
    let parsed: DeviceInfo = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.os_name, info.os_name);
    assert_eq!(parsed.arch, info.arch);
}

#[test]
fn fingerprint_generation() {
    let fp = DeviceFingerprint::generate();
    assert!(!fp.value().is_empty());
    assert!(fp.matches_current());
}

#[test]
fn fingerprint_stability() {
    let fp1 = DeviceFingerprint::generate();
    let fp2 = DeviceFingerprint::generate();
    assert_eq!(fp1.value(), fp2.value());
}

#[test]
fn fingerprint_from_value_is_verbatim() {
    let fp = DeviceFingerprint::from_value("device-a");
    assert_eq!(fp.value(), "device-a");
}

#[test]
fn foreign_value_does_not_match_current() {
    let fp = DeviceFingerprint::from_value("not-this-machine");
    assert!(!fp.matches_current());
}

#[test]
fn fingerprint_serialization_roundtrip() {
    let fp = DeviceFingerprint::generate();
    let json = serde_json::to_string(&fp).unwrap();
    let parsed: DeviceFingerprint = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, fp);
}

#[test]
fn system_provider_reports_current_device() {
    let fp = SystemFingerprint.current();
    assert!(fp.matches_current());
}
