// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fh_adapters::{FakeNotifyAdapter, FakeUnitFactory, HttpSourceConfig, WebhookConfig};
use fh_core::{Account, BreakerState};
use serde_json::json;
use std::time::Duration;

fn settings_with(ids: &[&str]) -> Settings {
    let mut settings = Settings::default();
    settings.accounts = ids
        .iter()
        .map(|id| {
            let mut account = Account::new(*id, "code");
            account.config = json!({ "inline": id });
            account
        })
        .collect();
    settings
}

#[test]
fn notifier_follows_settings() {
    let settings = Settings::default();
    assert!(matches!(Notifier::from_settings(&settings), Notifier::NoOp(_)));

    let settings = Settings {
        notify: Some(WebhookConfig::new("http://127.0.0.1:1/hook")),
        ..Settings::default()
    };
    assert!(matches!(
        Notifier::from_settings(&settings),
        Notifier::Webhook(_)
    ));
}

#[tokio::test]
async fn inline_configuration_without_a_source() {
    let factory = FakeUnitFactory::new();
    let assembly = assemble(factory.clone(), FakeNotifyAdapter::new(), &settings_with(&["a", "b"]));
    assert!(assembly.breaker.is_none());

    let summary = assembly.engine.start_all_accounts().await;
    assert_eq!(summary.started, vec!["a", "b"]);

    let launched = factory.launched();
    let spec = launched.iter().find(|s| s.account_id() == "a").unwrap();
    assert_eq!(spec.config.revision, 1);
    assert_eq!(spec.config.data, json!({ "inline": "a" }));
}

#[tokio::test]
async fn unreachable_source_falls_back_to_inline_configuration() {
    let mut settings = settings_with(&["a"]);
    let mut source = HttpSourceConfig::new("http://127.0.0.1:1");
    source.timeout = Duration::from_millis(500);
    settings.config_source = Some(source);

    let factory = FakeUnitFactory::new();
    let assembly = assemble(factory.clone(), FakeNotifyAdapter::new(), &settings);
    let breaker = assembly.breaker.clone().unwrap();
    assert_eq!(breaker.name(), CONFIG_SOURCE_BREAKER);
    assert_eq!(breaker.config().failure_threshold, 5);

    assert!(assembly.engine.start_account("a").await.unwrap());

    let spec = factory.launched().pop().unwrap();
    assert_eq!(spec.config.data, json!({ "inline": "a" }));
    let status = breaker.status();
    assert_eq!(status.state, BreakerState::Closed);
    assert_eq!(status.consecutive_failures, 1);
}

#[tokio::test]
async fn build_engine_uses_configured_mode() {
    let assembly = build_engine(&settings_with(&["a"]), None).unwrap();
    assert_eq!(assembly.engine.kind(), fh_adapters::UnitKind::Thread);
    assert!(assembly.engine.units().is_empty());
    assert!(!assembly.engine.is_account_running("a"));
}
