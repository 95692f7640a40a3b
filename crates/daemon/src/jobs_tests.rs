// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fh_adapters::{FakeNotifyAdapter, FakeUnitFactory, UnitExit};
use fh_core::{Account, BreakerConfig, ControlMessage};
use fh_engine::{AccountRegistry, OrchestratorConfig, StaticAccounts, StaticConfigProvider};
use std::time::Duration;

type TestEngine = RuntimeEngine<FakeUnitFactory, FakeNotifyAdapter>;

fn engine(ids: &[&str]) -> (Arc<TestEngine>, FakeUnitFactory) {
    let factory = FakeUnitFactory::new();
    let accounts: Arc<dyn AccountRegistry> = Arc::new(StaticAccounts::new(
        ids.iter().map(|id| Account::new(*id, "code")).collect(),
    ));
    let engine = RuntimeEngine::new(
        factory.clone(),
        FakeNotifyAdapter::new(),
        accounts,
        Arc::new(StaticConfigProvider::new()),
        OrchestratorConfig::default(),
    );
    (Arc::new(engine), factory)
}

#[tokio::test]
async fn summary_counts_running_and_crashed_units() {
    let (engine, factory) = engine(&["a", "b", "c"]);
    let mut events = engine.subscribe();
    engine.start_account("a").await.unwrap();
    engine.start_account("b").await.unwrap();
    let _a = factory.accept().await;
    let b = factory.accept().await;
    b.exit(UnitExit::failed("boom"));
    while engine.is_account_running("b") {
        let _ = events.recv().await;
    }

    let breaker = CircuitBreaker::new("config-source", BreakerConfig::default());
    for _ in 0..5 {
        breaker.record_failure();
    }

    assert_eq!(
        fleet_summary(&engine, Some(&breaker)),
        FleetSummary {
            accounts: 3,
            running: 1,
            crashed: 1,
            breaker: Some(BreakerState::Open),
        }
    );
    assert_eq!(fleet_summary(&engine, None).breaker, None);
}

#[tokio::test]
async fn install_registers_summary_only_by_default() {
    let (engine, _) = engine(&[]);
    install(&engine, None, &JobSettings::default()).unwrap();

    let jobs = engine.jobs();
    assert_eq!(jobs.task_names(), vec![FLEET_SUMMARY_TASK]);
    let snapshot = jobs.snapshot();
    let task = snapshot.task(FLEET_SUMMARY_TASK).unwrap();
    assert_eq!(task.interval_ms, 60_000);
    assert!(task.prevent_overlap);
}

#[tokio::test]
async fn reinstall_without_refresh_cancels_it() {
    let (engine, _) = engine(&[]);
    let settings = JobSettings {
        config_refresh: Some(Duration::from_secs(30)),
        ..JobSettings::default()
    };
    install(&engine, None, &settings).unwrap();
    assert!(engine.jobs().has(CONFIG_REFRESH_TASK));

    install(&engine, None, &JobSettings::default()).unwrap();
    assert!(!engine.jobs().has(CONFIG_REFRESH_TASK));
    assert!(engine.jobs().has(FLEET_SUMMARY_TASK));
}

#[tokio::test(start_paused = true)]
async fn config_refresh_pushes_to_running_units() {
    let (engine, factory) = engine(&["a"]);
    engine.start_account("a").await.unwrap();
    let mut unit = factory.accept().await;

    let settings = JobSettings {
        config_refresh: Some(Duration::from_secs(10)),
        ..JobSettings::default()
    };
    install(&engine, None, &settings).unwrap();

    match unit.recv().await {
        Some(ControlMessage::ConfigSync { config }) => assert_eq!(config.account_id, "a"),
        other => panic!("expected config sync, got {:?}", other),
    }
    let snapshot = engine.jobs().snapshot();
    assert!(snapshot.task(CONFIG_REFRESH_TASK).unwrap().run_count >= 1);
}

#[tokio::test(start_paused = true)]
async fn fleet_summary_runs_on_its_interval() {
    let (engine, _) = engine(&["a"]);
    let settings = JobSettings {
        fleet_summary: Duration::from_secs(5),
        config_refresh: None,
    };
    install(&engine, None, &settings).unwrap();

    tokio::time::sleep(Duration::from_millis(10_500)).await;
    let snapshot = engine.jobs().snapshot();
    assert_eq!(snapshot.task(FLEET_SUMMARY_TASK).unwrap().run_count, 2);
}
