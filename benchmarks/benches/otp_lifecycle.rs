use attendance_trust::crypto::OtpLifecycleManager;
use chrono::{Duration, Utc};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn bench_issue(c: &mut Criterion) {
    let manager = OtpLifecycleManager::for_testing().expect("otp manager for testing");
    let mut group = c.benchmark_group("otp_issue");
    group.sample_size(20);

    group.bench_function("issue", |b| {
        b.iter(|| manager.issue(black_box("bench@example.com")))
    });

    group.finish();
}

/// Wrong-code cost grows with the number of outstanding codes for the owner
fn bench_consume(c: &mut Criterion) {
    let mut group = c.benchmark_group("otp_consume");
    group.sample_size(20);

    for outstanding in [1usize, 4] {
        let manager = OtpLifecycleManager::for_testing().expect("otp manager for testing");
        let now = Utc::now();
        let mut codes = Vec::new();
        for _ in 0..outstanding {
            let issued = manager
                .issue_at("bench@example.com", now)
                .expect("issue bench code");
            codes.push(issued.code);
        }
        let wrong = (0..1_000_000u32)
            .map(|n| format!("{n:06}"))
            .find(|candidate| !codes.contains(candidate))
            .expect("an unused code exists");

        group.bench_function(format!("wrong_code_{outstanding}_outstanding"), |b| {
            b.iter(|| manager.consume_at(black_box("bench@example.com"), black_box(&wrong), now))
        });
    }

    let manager = OtpLifecycleManager::for_testing().expect("otp manager for testing");
    group.bench_function("unknown_owner", |b| {
        b.iter(|| manager.consume(black_box("nobody@example.com"), black_box("123456")))
    });

    group.finish();
}

fn bench_stats(c: &mut Criterion) {
    let manager = OtpLifecycleManager::for_testing().expect("otp manager for testing");
    let issued_at = Utc::now() - Duration::hours(1);
    for i in 0..200 {
        manager
            .issue_at(&format!("user{i}@example.com"), issued_at)
            .expect("issue bench code");
    }

    c.bench_function("otp_stats_200", |b| b.iter(|| manager.stats()));
}

criterion_group!(benches, bench_issue, bench_consume, bench_stats);
criterion_main!(benches);
