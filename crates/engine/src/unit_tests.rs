// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fh_core::RegistrySnapshot;
use fh_transport::{FakeConnector, JsonHandshake, LinkError, RateLimitConfig};
use serde_json::json;
use std::sync::Mutex;
use tokio::task::JoinHandle;

/// Domain API that echoes and remembers applied config revisions
#[derive(Clone, Default)]
struct EchoApi {
    revisions: Arc<Mutex<Vec<u64>>>,
}

#[async_trait]
impl UnitApi for EchoApi {
    async fn apply_config(&self, config: &ConfigSnapshot) {
        self.revisions.lock().unwrap().push(config.revision);
    }

    async fn call(
        &self,
        method: &str,
        args: &[serde_json::Value],
    ) -> Result<serde_json::Value, String> {
        match method {
            "echo" => Ok(args.first().cloned().unwrap_or_default()),
            _ => Err(format!("unknown method: {}", method)),
        }
    }

    fn status(&self) -> serde_json::Value {
        json!({ "lands": 6 })
    }
}

struct Harness {
    control: mpsc::UnboundedSender<ControlMessage>,
    events: mpsc::UnboundedReceiver<UnitMessage>,
    unit: JoinHandle<Result<(), UnitError>>,
    next_id: u32,
}

impl Harness {
    async fn next_matching(&mut self, pred: impl Fn(&UnitMessage) -> bool) -> UnitMessage {
        loop {
            let message = self.events.recv().await.unwrap();
            if pred(&message) {
                return message;
            }
        }
    }

    async fn ready(&mut self) -> serde_json::Value {
        let status = self
            .next_matching(|m| {
                matches!(m, UnitMessage::Status { status } if status["phase"] == "ready")
            })
            .await;
        match status {
            UnitMessage::Status { status } => status,
            other => panic!("expected status, got {:?}", other),
        }
    }

    async fn call(&mut self, method: &str, args: Vec<serde_json::Value>) -> (bool, serde_json::Value, Option<String>) {
        self.next_id += 1;
        let id = format!("call-{}", self.next_id);
        self.control
            .send(ControlMessage::Call {
                id: id.clone(),
                method: method.to_string(),
                args,
            })
            .unwrap();
        let reply = self
            .next_matching(|m| matches!(m, UnitMessage::CallResult { id: got, .. } if *got == id))
            .await;
        match reply {
            UnitMessage::CallResult { ok, data, error, .. } => (ok, data, error),
            other => panic!("expected call result, got {:?}", other),
        }
    }
}

fn options(connector: &FakeConnector) -> UnitOptions<FakeConnector> {
    let transport = TransportConfig {
        rate: RateLimitConfig {
            min_interval: Duration::ZERO,
            ..RateLimitConfig::default()
        },
        ..TransportConfig::default()
    };
    UnitOptions::new(
        connector.clone(),
        Arc::new(JsonHandshake::default()),
        transport,
    )
}

fn launch<A: UnitApi>(options: UnitOptions<FakeConnector>, api: A) -> Harness {
    let mut account = Account::new("acc-1", "login-code");
    account.name = "Alice".to_string();
    let spec = UnitSpec::new(account, ConfigSnapshot::new("acc-1", 3, json!({ "auto": true })));

    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let endpoint = UnitEndpoint {
        control: control_rx,
        events: events_tx,
    };
    let unit = tokio::spawn(run_unit(spec, endpoint, options, move |_| api));
    Harness {
        control: control_tx,
        events: events_rx,
        unit,
        next_id: 0,
    }
}

#[tokio::test(start_paused = true)]
async fn unit_logs_in_reports_status_and_stops_cleanly() {
    let connector = FakeConnector::new();
    let mut harness = launch(options(&connector), EchoApi::default());

    let mut server = connector.accept().await;
    let login = server.accept_login().await;
    assert_eq!(login.method, "Login");
    assert_eq!(connector.opened()[0].code, "login-code");

    let status = harness.ready().await;
    assert_eq!(status["account_id"], "acc-1");
    assert_eq!(status["account_name"], "Alice");
    assert_eq!(status["config_revision"], 3);
    assert_eq!(status["domain"], json!({ "lands": 6 }));

    harness.control.send(ControlMessage::Stop).unwrap();
    harness.unit.await.unwrap().unwrap();

    // Final report after teardown
    let mut last_phase = None;
    while let Ok(message) = harness.events.try_recv() {
        if let UnitMessage::Status { status } = message {
            last_phase = Some(status["phase"].clone());
        }
    }
    assert_eq!(last_phase, Some(json!("shutdown")));
}

#[tokio::test(start_paused = true)]
async fn builtin_methods_expose_schedulers_and_status() {
    let connector = FakeConnector::new();
    let mut harness = launch(options(&connector), NullApi);
    let mut server = connector.accept().await;
    server.accept_login().await;
    harness.ready().await;

    let (ok, data, _) = harness.call("getSchedulers", vec![]).await;
    assert!(ok);
    let snapshot: RegistrySnapshot = serde_json::from_value(data).unwrap();
    let transport = snapshot.namespace("transport").unwrap();
    assert!(transport.task("heartbeat_interval").is_some());
    let runtime = snapshot.namespace("unit-runtime").unwrap();
    assert!(runtime.task("status_report").is_some());

    let (ok, data, _) = harness.call("getStatus", vec![]).await;
    assert!(ok);
    assert_eq!(data["phase"], "ready");

    let (ok, _, error) = harness.call("getLands", vec![]).await;
    assert!(!ok);
    assert_eq!(error.as_deref(), Some("unknown method: getLands"));
}

#[tokio::test(start_paused = true)]
async fn domain_calls_and_config_sync_reach_the_api() {
    let connector = FakeConnector::new();
    let api = EchoApi::default();
    let mut harness = launch(options(&connector), api.clone());
    let mut server = connector.accept().await;
    server.accept_login().await;
    harness.ready().await;

    let (ok, data, _) = harness.call("echo", vec![json!({ "bag": [1, 2] })]).await;
    assert!(ok);
    assert_eq!(data, json!({ "bag": [1, 2] }));

    harness
        .control
        .send(ControlMessage::ConfigSync {
            config: ConfigSnapshot::new("acc-1", 4, json!({ "auto": false })),
        })
        .unwrap();
    let (_, status, _) = harness.call("getStatus", vec![]).await;
    assert_eq!(status["config_revision"], 4);
    assert_eq!(*api.revisions.lock().unwrap(), vec![3, 4]);
}

#[tokio::test(start_paused = true)]
async fn status_is_reported_periodically() {
    let connector = FakeConnector::new();
    let mut harness = launch(options(&connector), NullApi);
    let mut server = connector.accept().await;
    server.accept_login().await;
    harness.ready().await;

    // Answer heartbeats so the connection stays up
    let heartbeats = tokio::spawn(async move {
        while let Some(frame) = server.recv_frame().await {
            server.reply(&frame.meta, b"{}");
        }
    });

    let mut reports = 0;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(16);
    while tokio::time::Instant::now() < deadline {
        if let Ok(Some(UnitMessage::Status { .. })) =
            tokio::time::timeout_at(deadline, harness.events.recv()).await
        {
            reports += 1;
        }
    }
    assert!(reports >= 3, "expected periodic reports, got {}", reports);
    heartbeats.abort();
}

#[tokio::test(start_paused = true)]
async fn kickout_push_ends_the_unit() {
    let connector = FakeConnector::new();
    let harness = launch(options(&connector), NullApi);
    let mut server = connector.accept().await;
    server.accept_login().await;

    server.push("gamepb.userpb.Kickout", b"{}");

    let result = harness.unit.await.unwrap();
    assert_eq!(result, Err(UnitError::Kicked));
}

#[tokio::test(start_paused = true)]
async fn auth_halt_ends_the_unit() {
    let connector = FakeConnector::new();
    connector.fail_next(LinkError::Rejected {
        status: 400,
        message: "Bad Request".to_string(),
    });
    let mut harness = launch(options(&connector), NullApi);

    let result = harness.unit.await.unwrap();
    assert!(matches!(result, Err(UnitError::Halted(_))));
    assert_eq!(connector.open_count(), 1);

    let logged_halt = std::iter::from_fn(|| harness.events.try_recv().ok()).any(|m| {
        matches!(m, UnitMessage::AccountLog { entry } if entry.message.starts_with("halted"))
    });
    assert!(logged_halt);
}

#[tokio::test(start_paused = true)]
async fn auth_halt_can_keep_the_unit_alive() {
    let connector = FakeConnector::new();
    connector.fail_next(LinkError::Rejected {
        status: 401,
        message: "Unauthorized".to_string(),
    });
    let mut opts = options(&connector);
    opts.exit_on_halt = false;
    let mut harness = launch(opts, NullApi);

    harness
        .next_matching(|m| matches!(m, UnitMessage::Status { status } if status["phase"] == "halted"))
        .await;
    let (ok, data, _) = harness.call("getStatus", vec![]).await;
    assert!(ok);
    assert_eq!(data["phase"], "halted");

    drop(harness.control);
    assert_eq!(harness.unit.await.unwrap(), Ok(()));
}
