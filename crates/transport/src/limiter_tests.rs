// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> SendTask) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let make = move |label: &str| -> SendTask {
        let sink = Arc::clone(&sink);
        let label = label.to_string();
        Box::new(move || sink.lock().unwrap().push(label))
    };
    (log, make)
}

fn instant_config() -> RateLimitConfig {
    RateLimitConfig {
        min_interval: Duration::ZERO,
        ..RateLimitConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn urgent_goes_first_then_normal_in_fifo_order() {
    let limiter = RateLimiter::new(instant_config());
    let (log, task) = recorder();

    for i in 0..10 {
        limiter.enqueue(task(&format!("n{i}")));
    }
    limiter.enqueue_urgent(task("u0"));

    tokio::time::sleep(Duration::from_millis(10)).await;
    let log = log.lock().unwrap();
    assert_eq!(log[0], "u0");
    let normals: Vec<_> = log[1..].to_vec();
    let expected: Vec<_> = (0..10).map(|i| format!("n{i}")).collect();
    assert_eq!(normals, expected);
}

#[tokio::test(start_paused = true)]
async fn sustained_urgent_traffic_lets_normal_through() {
    let limiter = RateLimiter::new(instant_config());
    let (log, task) = recorder();

    for i in 0..3 {
        limiter.enqueue(task(&format!("n{i}")));
    }
    for i in 0..5 {
        limiter.enqueue_urgent(task(&format!("u{i}")));
    }

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(
        *log.lock().unwrap(),
        vec!["u0", "n0", "u1", "n1", "u2", "n2", "u3", "u4"]
    );
}

#[tokio::test(start_paused = true)]
async fn sends_are_spaced_by_the_minimum_interval() {
    let limiter = RateLimiter::new(RateLimitConfig::default());
    let times = Arc::new(Mutex::new(Vec::new()));

    for _ in 0..4 {
        let times = Arc::clone(&times);
        limiter.enqueue(Box::new(move || times.lock().unwrap().push(Instant::now())));
    }

    tokio::time::sleep(Duration::from_secs(2)).await;
    let times = times.lock().unwrap();
    assert_eq!(times.len(), 4);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(334));
    }
    assert_eq!(limiter.sent(), 4);
}

#[tokio::test(start_paused = true)]
async fn clear_discards_queued_tasks() {
    let limiter = RateLimiter::new(RateLimitConfig::default());
    let (log, task) = recorder();

    limiter.enqueue(task("first"));
    tokio::time::sleep(Duration::from_millis(1)).await;
    limiter.enqueue(task("second"));
    limiter.enqueue_urgent(task("third"));
    assert_eq!(limiter.depth(), (1, 1));

    assert_eq!(limiter.clear(), 2);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(*log.lock().unwrap(), vec!["first"]);

    // The limiter keeps working after a clear
    limiter.enqueue(task("fourth"));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(*log.lock().unwrap(), vec!["first", "fourth"]);
}

#[derive(Debug, Clone)]
enum Op {
    Urgent,
    Normal,
    Pick,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Urgent), Just(Op::Normal), Just(Op::Pick)]
}

proptest! {
    #[test]
    fn urgent_streak_is_bounded_while_normal_waits(
        ops in proptest::collection::vec(op(), 0..200),
        max_urgent in 1u32..4,
    ) {
        let mut lanes = Lanes::default();
        let mut next = 0u32;
        let mut streak = 0u32;
        let mut last_urgent = None;
        let mut last_normal = None;

        for op in ops {
            match op {
                Op::Urgent => { lanes.push(Lane::Urgent, next); next += 1; }
                Op::Normal => { lanes.push(Lane::Normal, next); next += 1; }
                Op::Pick => {
                    let (_, normal_waiting) = lanes.depth();
                    match lanes.pick(max_urgent) {
                        Some((Lane::Urgent, id)) => {
                            if normal_waiting > 0 {
                                streak += 1;
                                prop_assert!(streak <= max_urgent);
                            }
                            prop_assert!(last_urgent.is_none_or(|prev| prev < id));
                            last_urgent = Some(id);
                        }
                        Some((Lane::Normal, id)) => {
                            streak = 0;
                            prop_assert!(last_normal.is_none_or(|prev| prev < id));
                            last_normal = Some(id);
                        }
                        None => prop_assert!(lanes.is_empty()),
                    }
                }
            }
        }
    }
}

/// Log output written by the subscriber under test
#[derive(Clone, Default)]
struct CapturedLogs {
    logs: Arc<Mutex<Vec<u8>>>,
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.logs.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Queue `count` normal tasks at once, drain them, and return the log
fn drain_logs(count: usize) -> String {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_writer(logs.clone())
        .with_ansi(false)
        .without_time()
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap()
            .block_on(async {
                let limiter = RateLimiter::new(instant_config());
                let (sent, task) = recorder();
                for i in 0..count {
                    limiter.enqueue(task(&format!("n{i}")));
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
                assert_eq!(sent.lock().unwrap().len(), count);
            })
    });

    let logs = logs.logs.lock().unwrap();
    String::from_utf8_lossy(&logs).to_string()
}

#[test]
fn deep_queue_warns_on_every_iteration() {
    let logs = drain_logs(6);
    let warnings: Vec<&str> = logs
        .lines()
        .filter(|line| line.contains("send queue backing up"))
        .collect();
    assert_eq!(warnings.len(), 2, "{logs}");
    assert!(warnings[0].contains("depth=6"), "{logs}");
    assert!(warnings[1].contains("depth=5"), "{logs}");
    assert!(!logs.contains("depth=4"), "{logs}");
}

#[test]
fn shallow_queue_stays_quiet() {
    let logs = drain_logs(4);
    assert!(!logs.contains("send queue backing up"), "{logs}");
}
