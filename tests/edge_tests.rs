//! Edge cases: races, malformed input, rotation windows

use attendance_trust::{
    Error, Result, TrustCore,
    config::SecurityConfig,
    crypto::{
        CanonicalEncoder, IntegrityEngine, KeyBootstrap, KeyGeneration, KeyRing,
        OtpLifecycleManager, SecretKey,
    },
    types::{AttendanceEvent, IntegrityStatus, MacTag},
};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_otp_double_consume() -> Result<()> {
    println!("🏁 Testing concurrent consumption of one code...");

    let core = Arc::new(TrustCore::for_testing()?);
    let owner = "hr@example.com";

    for round in 0..5 {
        let issued = core.issue_otp(owner)?;
        let successes = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let core = core.clone();
            let code = issued.code.clone();
            let successes = successes.clone();
            handles.push(tokio::spawn(async move {
                if core.consume_otp(owner, &code) {
                    successes.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }

        for handle in handles {
            handle.await.expect("consumer task panicked");
        }

        let won = successes.load(Ordering::SeqCst);
        println!("   Round {round}: {won} winner(s)");
        assert_eq!(won, 1);
    }

    println!("✅ Exactly one consumer won every round");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_owners_do_not_interfere() -> Result<()> {
    println!("👥 Testing concurrent consumption across owners...");

    let manager = Arc::new(OtpLifecycleManager::for_testing()?);
    let mut handles = Vec::new();

    for i in 0..6 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            let owner = format!("user{i}@example.com");
            let issued = manager.issue(&owner)?;
            manager.consume(&owner, &issued.code)
        }));
    }

    for handle in handles {
        handle.await.expect("owner task panicked")?;
    }

    let stats = manager.stats()?;
    assert_eq!(stats.owners, 6);
    assert_eq!(stats.used_records, 6);
    println!("✅ All owners consumed their own code");
    Ok(())
}

#[test]
fn test_otp_expired_and_empty_sets_fail_uniformly() -> Result<()> {
    println!("⏰ Testing uniform OTP failures...");

    let manager = OtpLifecycleManager::for_testing()?;
    let owner = "hr@example.com";
    let now = Utc::now();
    let issued = manager.issue_at(owner, now)?;

    let expired = manager
        .consume_at(owner, &issued.code, issued.expires_at + Duration::seconds(5))
        .unwrap_err();
    let empty = manager.consume_at("nobody@example.com", "123456", now).unwrap_err();
    let padded = manager.consume_at(owner, " 12345 ", now).unwrap_err();

    assert!(matches!(expired, Error::InvalidOrExpiredOtp));
    assert_eq!(expired.to_string(), empty.to_string());
    assert_eq!(empty.to_string(), padded.to_string());

    // Surrounding whitespace on a correct code is tolerated
    manager.consume_at(owner, &format!(" {} ", issued.code), now)?;
    println!("✅ Expired, unknown and malformed candidates are indistinguishable");
    Ok(())
}

#[test]
fn test_malformed_attendance_input() {
    println!("🧪 Testing malformed attendance input...");

    let bad_rows = [
        (7, "2024-05-01", "", "33.642", "73.012"),
        (7, "2024-05-01", "PRESENT", "33.642", "73.012"),
        (7, "01/05/2024", "present", "33.642", "73.012"),
        (7, "2024-05-01", "present", "NaN", "73.012"),
        (7, "2024-05-01", "present", "33.642", "181"),
        (-1, "2024-05-01", "present", "33.642", "73.012"),
    ];

    for (id, date, status, lat, lon) in bad_rows {
        let result = AttendanceEvent::parse(id, date, status, lat, lon);
        assert!(
            matches!(result, Err(Error::Encoding { .. })),
            "accepted ({id}, {date}, {status}, {lat}, {lon})"
        );
    }

    // Field boundaries cannot be shifted to forge a collision
    let a = CanonicalEncoder::encode_fields(7, "2024-05-01", "present", "33.642", "73.012");
    let b = CanonicalEncoder::encode_fields(7, "2024-05-01", "present", "33.6427", "3.012");
    assert_ne!(a.unwrap(), b.unwrap());
    println!("✅ Malformed input rejected before signing");
}

#[test]
fn test_malformed_stored_mac() -> Result<()> {
    println!("🧪 Testing malformed stored MAC values...");

    let core = TrustCore::for_testing()?;
    let event = AttendanceEvent::parse(7, "2024-05-01", "present", "33.642", "73.012")?;
    let mac = core.sign_attendance(&event);

    assert!(matches!(MacTag::from_hex(&mac[..10]), Err(Error::MalformedTag { .. })));
    assert!(!core.verify_attendance(&event, &mac[..10]));
    assert!(!core.verify_attendance(&event, &format!("g{}", &mac[1..])));
    assert_eq!(core.review_attendance(&event, Some("   ")), IntegrityStatus::Unsigned);
    assert_eq!(core.review_attendance(&event, Some("not-a-mac")), IntegrityStatus::Tampered);
    println!("✅ Malformed MACs never verify");
    Ok(())
}

#[test]
fn test_mac_rotation_window() -> Result<()> {
    println!("🔄 Testing MAC key rotation window...");

    let mut keys = KeyRing::for_testing();
    let event = AttendanceEvent::parse(7, "2024-05-01", "present", "33.642", "73.012")?;
    let canonical = CanonicalEncoder::encode(&event);

    let old_tag = IntegrityEngine::new(&keys).sign(&canonical);

    keys.rotate_mac_key(SecretKey::generate());
    keys.rotate_mac_key(SecretKey::generate());
    let engine = IntegrityEngine::new(&keys);

    assert_eq!(engine.retired_key_count(), 2);
    assert_eq!(
        engine.verify_detailed(&canonical, &old_tag),
        Some(KeyGeneration::Retired(1))
    );
    let new_tag = engine.sign(&canonical);
    assert_eq!(engine.verify_detailed(&canonical, &new_tag), Some(KeyGeneration::Current));
    println!("✅ Old rows verify under retired key, new rows under current");

    // Window closes when the retired keys are dropped
    keys.retired_mac_keys.clear();
    assert!(!IntegrityEngine::new(&keys).verify(&canonical, &old_tag));
    println!("✅ Rotation window closed");
    Ok(())
}

#[test]
fn test_rotation_through_configuration() -> Result<()> {
    println!("🔄 Testing rotation via environment values...");

    let generated = KeyBootstrap::generate();
    let mut vars: HashMap<String, String> = generated
        .to_env_lines()
        .iter()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let before = TrustCore::new(&SecurityConfig::from_lookup(|name| vars.get(name).cloned())?)?;
    let event = AttendanceEvent::parse(7, "2024-05-01", "present", "33.642", "73.012")?;
    let old_mac = before.sign_attendance(&event);

    let current = vars
        .get("ATTENDANCE_MAC_KEY")
        .cloned()
        .expect("generated MAC key present");
    for line in KeyBootstrap::rotate_mac(&current, None)? {
        if let Some((k, v)) = line.split_once('=') {
            vars.insert(k.to_string(), v.to_string());
        }
    }

    let after = TrustCore::new(&SecurityConfig::from_lookup(|name| vars.get(name).cloned())?)?;
    assert!(after.verify_attendance(&event, &old_mac));
    assert_ne!(after.sign_attendance(&event), old_mac);
    println!("✅ Rotated configuration still verifies historical rows");
    Ok(())
}

#[test]
fn test_invalid_key_material() {
    println!("🔑 Testing invalid key material handling...");

    let generated = KeyBootstrap::generate();
    let mut vars: HashMap<String, String> = generated
        .to_env_lines()
        .iter()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    vars.insert("ATTENDANCE_ENCRYPTION_KEY".to_string(), "c2hvcnQ=".to_string());
    let result = SecurityConfig::from_lookup(|name| vars.get(name).cloned());
    assert!(matches!(result, Err(Error::KeyProvisioning { .. })));

    // Dev mode generates missing keys but never papers over invalid ones
    vars.insert("ATTENDANCE_DEV_MODE".to_string(), "true".to_string());
    let result = SecurityConfig::from_lookup(|name| vars.get(name).cloned());
    assert!(matches!(result, Err(Error::KeyProvisioning { .. })));

    vars.remove("ATTENDANCE_ENCRYPTION_KEY");
    assert!(SecurityConfig::from_lookup(|name| vars.get(name).cloned()).is_ok());
    println!("✅ Invalid keys are fatal in every mode");
}

#[test]
fn test_ciphertext_from_another_deployment() -> Result<()> {
    println!("🔐 Testing ciphertext under a foreign key...");

    let ours = TrustCore::for_testing()?;
    let theirs = TrustCore::for_testing()?;
    let stored = theirs.encrypt_national_id("61101-1234567-1")?;

    let err = ours.decrypt_national_id(&stored).unwrap_err();
    assert!(matches!(err, Error::Integrity));
    println!("✅ Foreign ciphertext rejected with the generic integrity error");
    Ok(())
}
