// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::FakeClock;
use yare::parameterized;

fn breaker(clock: &FakeClock) -> CircuitBreaker<FakeClock> {
    CircuitBreaker::with_clock("config-store", BreakerConfig::default(), clock.clone())
}

fn trip(breaker: &CircuitBreaker<FakeClock>) {
    for _ in 0..breaker.config().failure_threshold {
        breaker.record_failure();
    }
}

#[test]
fn five_failures_open_the_breaker() {
    let clock = FakeClock::new();
    let breaker = breaker(&clock);

    for _ in 0..4 {
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.is_available());
    }
    breaker.record_failure();
    assert_eq!(breaker.state(), BreakerState::Open);
    assert!(!breaker.is_available());
}

#[test]
fn cooldown_then_exactly_one_trial_call() {
    let clock = FakeClock::new();
    let breaker = breaker(&clock);
    trip(&breaker);

    clock.advance(Duration::from_secs(29));
    assert!(!breaker.is_available());
    assert_eq!(breaker.state(), BreakerState::Open);

    clock.advance(Duration::from_secs(1));
    assert!(breaker.is_available());
    assert_eq!(breaker.state(), BreakerState::HalfOpen);
    assert!(!breaker.is_available());
}

#[test]
fn failed_trial_reopens_with_a_new_window() {
    let clock = FakeClock::new();
    let breaker = breaker(&clock);
    trip(&breaker);

    clock.advance(Duration::from_secs(30));
    assert!(breaker.is_available());
    breaker.record_failure();
    assert_eq!(breaker.state(), BreakerState::Open);

    clock.advance(Duration::from_secs(10));
    assert!(!breaker.is_available());
    clock.advance(Duration::from_secs(20));
    assert!(breaker.is_available());
}

#[test]
fn successful_trial_closes() {
    let clock = FakeClock::new();
    let breaker = breaker(&clock);
    trip(&breaker);

    clock.advance(Duration::from_secs(30));
    assert!(breaker.is_available());
    breaker.record_success();

    assert_eq!(breaker.state(), BreakerState::Closed);
    assert_eq!(breaker.status().consecutive_failures, 0);
    assert!(breaker.is_available());
}

#[test]
fn success_while_open_closes() {
    let clock = FakeClock::new();
    let breaker = breaker(&clock);
    trip(&breaker);

    breaker.record_success();
    assert_eq!(breaker.state(), BreakerState::Closed);
}

#[test]
fn success_resets_the_failure_streak() {
    let clock = FakeClock::new();
    let breaker = breaker(&clock);

    for _ in 0..4 {
        breaker.record_failure();
    }
    breaker.record_success();
    for _ in 0..4 {
        breaker.record_failure();
    }
    assert_eq!(breaker.state(), BreakerState::Closed);
}

#[test]
fn reset_forces_closed() {
    let clock = FakeClock::new();
    let breaker = breaker(&clock);
    trip(&breaker);

    breaker.reset();
    let status = breaker.status();
    assert_eq!(status.state, BreakerState::Closed);
    assert_eq!(status.consecutive_failures, 0);
    assert_eq!(status.opened_at_ms, None);
    assert!(breaker.is_available());
}

#[parameterized(
    single_trial = { 1 },
    two_trials = { 2 },
    three_trials = { 3 },
)]
fn half_open_budget_is_respected(budget: u32) {
    let clock = FakeClock::new();
    let config = BreakerConfig {
        half_open_probes: budget,
        ..BreakerConfig::default()
    };
    let breaker = CircuitBreaker::with_clock("dep", config, clock.clone());
    trip(&breaker);
    clock.advance(Duration::from_secs(30));

    let allowed = (0..10).filter(|_| breaker.is_available()).count();
    assert_eq!(allowed, budget as usize);
}

#[test]
fn zero_trial_budget_still_lets_one_call_through() {
    let clock = FakeClock::new();
    let config = BreakerConfig {
        half_open_probes: 0,
        ..BreakerConfig::default()
    };
    let breaker = CircuitBreaker::with_clock("dep", config, clock.clone());
    assert_eq!(breaker.config().half_open_probes, 1);
    trip(&breaker);
    clock.advance(Duration::from_secs(31));

    assert!(breaker.is_available());
    assert_eq!(breaker.state(), BreakerState::HalfOpen);
    assert!(!breaker.is_available());
    breaker.record_success();
    assert_eq!(breaker.state(), BreakerState::Closed);
}

#[test]
fn status_reports_remaining_cooldown() {
    let clock = FakeClock::new();
    let breaker = breaker(&clock);
    trip(&breaker);
    clock.advance(Duration::from_secs(12));

    let status = breaker.status();
    assert_eq!(status.state, BreakerState::Open);
    assert_eq!(status.retry_in_ms, Some(18_000));
    assert_eq!(status.opened_at_ms, Some(1_700_000_000_000));
    assert_eq!(status.last_failure_at_ms, Some(1_700_000_000_000));
    assert_eq!(status.cooldown_ms, 30_000);

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["state"], "OPEN");
}

#[tokio::test]
async fn call_helper_records_outcomes() {
    let clock = FakeClock::new();
    let breaker = breaker(&clock);

    let ok: Result<u32, BreakerError<String>> = breaker.call(|| async { Ok(7) }).await;
    assert_eq!(ok.unwrap(), 7);

    for _ in 0..5 {
        let err = breaker
            .call(|| async { Err::<u32, _>("unreachable".to_string()) })
            .await;
        assert!(matches!(err, Err(BreakerError::Inner(_))));
    }

    let open = breaker.call(|| async { Ok::<u32, String>(1) }).await;
    match open {
        Err(BreakerError::Open { name }) => assert_eq!(name, "config-store"),
        other => panic!("expected open breaker, got {other:?}"),
    }
}

#[test]
fn config_parses_humantime() {
    let config: BreakerConfig =
        serde_json::from_str(r#"{"failure_threshold": 3, "cooldown": "45s"}"#).unwrap();
    assert_eq!(config.failure_threshold, 3);
    assert_eq!(config.cooldown, Duration::from_secs(45));
    assert_eq!(config.half_open_probes, 1);
}
