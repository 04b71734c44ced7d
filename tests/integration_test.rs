//! End-to-end flows through the trust core boundary

use attendance_trust::{
    DECRYPT_FAILURE_PLACEHOLDER, Result, TrustCore,
    config::SecurityConfig,
    crypto::{EncryptedSecret, KeyRing},
    types::{AttendanceEvent, Coordinate, IntegrityStatus},
};
use chrono::{Duration, Utc};
use std::sync::Arc;

fn fixed_config() -> SecurityConfig {
    let mut config = SecurityConfig::for_testing();
    config.keys = KeyRing::from_fixed([1u8; 32], [2u8; 32], [3u8; 32]);
    config
}

#[test]
fn test_attendance_mark_and_tamper_workflow() -> Result<()> {
    println!("📝 Testing attendance mark and tamper detection...");

    let core = TrustCore::new(&fixed_config())?;

    // Employee 7 marks present on campus
    let lat = Coordinate::latitude("33.642")?;
    let lon = Coordinate::longitude("73.012")?;
    assert!(core.check_location(&lat, &lon));

    let event = AttendanceEvent::parse(7, "2024-05-01", "present", "33.642", "73.012")?;
    let mac = core.sign_attendance(&event);
    assert_eq!(hex::decode(&mac).expect("MAC is hex").len(), 32);
    println!("✅ Attendance signed: {}...", &mac[0..8]);

    // Same keys, same fields: same MAC
    let again = TrustCore::new(&fixed_config())?;
    assert_eq!(again.sign_attendance(&event), mac);

    assert!(core.verify_attendance(&event, &mac));

    // Someone edits the status directly in storage
    let edited = AttendanceEvent::parse(7, "2024-05-01", "absent", "33.642", "73.012")?;
    assert!(!core.verify_attendance(&edited, &mac));
    println!("✅ Status edit detected");

    // Every single-field mutation breaks the MAC
    let mutations = [
        AttendanceEvent::parse(8, "2024-05-01", "present", "33.642", "73.012")?,
        AttendanceEvent::parse(7, "2024-05-02", "present", "33.642", "73.012")?,
        AttendanceEvent::parse(7, "2024-05-01", "present", "33.643", "73.012")?,
        AttendanceEvent::parse(7, "2024-05-01", "present", "33.642", "73.013")?,
    ];
    for mutated in &mutations {
        assert!(!core.verify_attendance(mutated, &mac), "mutation verified: {mutated:?}");
    }
    println!("✅ All single-field mutations rejected");

    Ok(())
}

#[test]
fn test_attendance_listing_flags_rows() -> Result<()> {
    println!("📋 Testing attendance listing review...");

    let core = TrustCore::for_testing()?;
    let signed = AttendanceEvent::parse(7, "2024-05-01", "present", "33.642", "73.012")?;
    let forged = AttendanceEvent::parse(9, "2024-05-01", "present", "33.650", "73.100")?;
    let legacy = AttendanceEvent::parse(11, "2024-04-30", "absent", "33.61", "73.2")?;

    let mac = core.sign_attendance(&signed);
    let forged_mac = core.sign_attendance(&signed);

    let rows = vec![
        (&signed, Some(mac.as_str())),
        (&forged, Some(forged_mac.as_str())),
        (&legacy, None),
    ];
    let reviewed = core.review_batch(rows);

    assert_eq!(reviewed.len(), 3);
    assert_eq!(reviewed[0].integrity, IntegrityStatus::Verified);
    assert!(reviewed[1].tampered);
    assert_eq!(reviewed[2].integrity, IntegrityStatus::Unsigned);
    assert!(!reviewed[2].tampered);
    assert!(!reviewed[2].integrity_verified);
    println!("✅ Tampered row flagged, legacy row left unsigned");

    // Migration signs only the unsigned row
    let backfilled = core.backfill_signature(&legacy, None).expect("unsigned row should be signed");
    assert!(core.verify_attendance(&legacy, &backfilled));
    assert!(core.backfill_signature(&forged, Some(&forged_mac)).is_none());
    println!("✅ Backfill signed legacy row only");

    Ok(())
}

#[test]
fn test_national_id_storage_workflow() -> Result<()> {
    println!("🪪 Testing national ID encryption and lookup...");

    let core = TrustCore::new(&fixed_config())?;
    let national_id = "61101-1234567-1";

    let stored = core.encrypt_national_id(national_id)?;
    assert!(!stored.contains("1234567"));
    assert_eq!(core.decrypt_national_id(&stored)?, national_id);
    println!("✅ Round trip through stored text form");

    // Flip the last byte of the blob
    let mut blob = EncryptedSecret::from_encoded(&stored)?.into_bytes();
    let last = blob.len() - 1;
    blob[last] ^= 0x01;
    let tampered = EncryptedSecret::from_bytes(blob).to_encoded();

    let err = core.decrypt_national_id(&tampered).unwrap_err();
    assert!(err.is_integrity_failure());
    assert_eq!(core.display_national_id(&tampered), DECRYPT_FAILURE_PLACEHOLDER);
    println!("✅ Tampered ciphertext failed closed");

    // Lookup hash is stable across instances with the same key
    let other = TrustCore::new(&fixed_config())?;
    assert_eq!(
        core.national_id_lookup_hash(national_id),
        other.national_id_lookup_hash(national_id)
    );
    assert_ne!(
        core.national_id_lookup_hash(national_id),
        core.national_id_lookup_hash("61101-1234567-2")
    );
    println!("✅ Deterministic lookup hash supports duplicate detection");

    // Distinct plaintexts never share a lookup hash, even when only separators differ
    assert_ne!(
        core.national_id_lookup_hash(national_id),
        core.national_id_lookup_hash("6110112345671"),
        "distinct plaintexts produced the same lookup hash"
    );
    println!("✅ Differently formatted IDs hash differently");

    Ok(())
}

#[test]
fn test_credential_workflow() -> Result<()> {
    println!("🔒 Testing credential hashing...");

    let core = TrustCore::for_testing()?;
    let first = core.hash_secret("my first school")?;
    let second = core.hash_secret("my first school")?;

    assert_ne!(first, second);
    assert!(core.verify_secret("my first school", &first));
    assert!(core.verify_secret("my first school", &second));
    assert!(!core.verify_secret("my second school", &first));
    println!("✅ Salted hashes differ and both verify");

    Ok(())
}

#[test]
fn test_cleanup_service_purges_expired_codes() -> Result<()> {
    println!("🧹 Testing background purge of expired codes...");

    let core = TrustCore::for_testing()?;
    let manager = core.otp_manager();
    let long_ago = Utc::now() - Duration::hours(2);
    manager.issue_at("clerk@example.com", long_ago)?;
    manager.issue_at("guard@example.com", long_ago)?;
    let live = core.issue_otp("clerk@example.com")?;
    assert_eq!(manager.stats()?.expired_records, 2);

    let (stop_tx, stop_rx) = tokio::sync::mpsc::channel(1);
    let service = core.otp_cleanup_service(stop_rx);

    tokio_test::block_on(async {
        let handle = tokio::spawn(service.run());
        // The first interval tick fires immediately
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        stop_tx.send(()).await.expect("cleanup service receiver dropped");
        handle.await.expect("cleanup service panicked");
    });

    let stats = manager.stats()?;
    assert_eq!(stats.expired_records, 0);
    assert_eq!(stats.outstanding_records, 1);
    assert_eq!(stats.owners, 1);
    println!("✅ Expired codes purged, live code kept");

    assert!(core.consume_otp("CLERK@example.com", &live.code));
    println!("✅ Owner matching ignores case");
    Ok(())
}

#[tokio::test]
async fn test_otp_login_workflow() -> Result<()> {
    println!("📧 Testing OTP login workflow...");

    let core = Arc::new(TrustCore::for_testing()?);
    let owner = "admin@example.com";

    // User asks twice (resend); both codes stay valid
    let first = core.issue_otp(owner)?;
    let second = core.issue_otp(owner)?;
    println!("✅ Issued two codes, expiring at {}", second.expires_at);

    assert!(core.consume_otp(owner, &second.code));
    assert!(!core.consume_otp(owner, &second.code));
    assert!(core.consume_otp(owner, &first.code));
    println!("✅ Each code consumed exactly once");

    let stats = core.otp_manager().stats()?;
    assert_eq!(stats.used_records, 2);
    assert_eq!(stats.outstanding_records, 0);

    // Background cleanup starts and stops cleanly
    let (stop_tx, stop_rx) = tokio::sync::mpsc::channel(1);
    let handle = tokio::spawn(core.otp_cleanup_service(stop_rx).run());
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    stop_tx.send(()).await.expect("cleanup service receiver dropped");
    handle.await.expect("cleanup service panicked");
    println!("✅ Cleanup service stopped on signal");

    Ok(())
}
