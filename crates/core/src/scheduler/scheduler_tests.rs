// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::future::Ready;
use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};
use std::sync::Arc;
use std::time::Duration;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn counting(hits: &Arc<AtomicUsize>) -> impl FnMut() -> Ready<Result<(), String>> + Send + 'static {
    let hits = Arc::clone(hits);
    move || {
        hits.fetch_add(1, SeqCst);
        std::future::ready(Ok(()))
    }
}

#[tokio::test(start_paused = true)]
async fn reregistering_a_name_replaces_the_timer() {
    let registry = SchedulerRegistry::new();
    let scheduler = registry.scheduler("farm");
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    scheduler
        .set_recurring("tick", ms(100), RecurringOptions::default(), counting(&first))
        .unwrap();
    scheduler
        .set_recurring("tick", ms(250), RecurringOptions::default(), counting(&second))
        .unwrap();

    let snapshot = scheduler.snapshot();
    assert_eq!(snapshot.task_count, 1);
    assert_eq!(snapshot.task("tick").unwrap().interval_ms, 250);

    tokio::time::sleep(ms(1100)).await;
    assert_eq!(first.load(SeqCst), 0);
    assert_eq!(second.load(SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn overlap_prevention_skips_ticks_while_running() {
    let registry = SchedulerRegistry::new();
    let scheduler = registry.scheduler("farm");
    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));
    let started = Arc::new(AtomicUsize::new(0));

    let (a, m, s) = (active.clone(), max_active.clone(), started.clone());
    scheduler
        .set_recurring("slow", ms(100), RecurringOptions::default(), move || {
            let (a, m, s) = (a.clone(), m.clone(), s.clone());
            async move {
                s.fetch_add(1, SeqCst);
                let now = a.fetch_add(1, SeqCst) + 1;
                m.fetch_max(now, SeqCst);
                tokio::time::sleep(ms(250)).await;
                a.fetch_sub(1, SeqCst);
                Ok::<(), String>(())
            }
        })
        .unwrap();

    tokio::time::sleep(ms(1050)).await;

    // Runs start at 100, 400, 700, 1000
    assert_eq!(started.load(SeqCst), 4);
    assert_eq!(max_active.load(SeqCst), 1);
    let task = scheduler.snapshot().task("slow").cloned().unwrap();
    assert_eq!(task.run_count, 4);
    assert!(task.running);
}

#[tokio::test(start_paused = true)]
async fn overlap_can_be_allowed() {
    let registry = SchedulerRegistry::new();
    let scheduler = registry.scheduler("farm");
    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));

    let (a, m) = (active.clone(), max_active.clone());
    scheduler
        .set_recurring(
            "slow",
            ms(100),
            RecurringOptions::default().allow_overlap(),
            move || {
                let (a, m) = (a.clone(), m.clone());
                async move {
                    let now = a.fetch_add(1, SeqCst) + 1;
                    m.fetch_max(now, SeqCst);
                    tokio::time::sleep(ms(250)).await;
                    a.fetch_sub(1, SeqCst);
                    Ok::<(), String>(())
                }
            },
        )
        .unwrap();

    tokio::time::sleep(ms(550)).await;
    assert!(max_active.load(SeqCst) >= 2);
}

#[tokio::test(start_paused = true)]
async fn one_shot_fires_once_and_is_removed() {
    let registry = SchedulerRegistry::new();
    let scheduler = registry.scheduler("jobs");
    let hits = Arc::new(AtomicUsize::new(0));

    scheduler.set_once("once", ms(50), counting(&hits)).unwrap();
    assert!(scheduler.has("once"));

    tokio::time::sleep(ms(200)).await;
    assert_eq!(hits.load(SeqCst), 1);
    assert!(!scheduler.has("once"));
}

#[tokio::test(start_paused = true)]
async fn failing_one_shot_is_still_removed() {
    let registry = SchedulerRegistry::new();
    let scheduler = registry.scheduler("jobs");

    scheduler
        .set_once("broken", ms(10), || async { Err::<(), _>("boom") })
        .unwrap();

    tokio::time::sleep(ms(50)).await;
    assert!(!scheduler.has("broken"));
}

#[tokio::test(start_paused = true)]
async fn failing_recurring_task_keeps_firing() {
    let registry = SchedulerRegistry::new();
    let scheduler = registry.scheduler("jobs");
    let hits = Arc::new(AtomicUsize::new(0));

    let h = hits.clone();
    scheduler
        .set_recurring("flaky", ms(100), RecurringOptions::default(), move || {
            h.fetch_add(1, SeqCst);
            async { Err::<(), _>("remote said no") }
        })
        .unwrap();

    tokio::time::sleep(ms(350)).await;
    assert_eq!(hits.load(SeqCst), 3);
    assert!(scheduler.has("flaky"));
}

#[tokio::test(start_paused = true)]
async fn panicking_task_does_not_affect_siblings() {
    let registry = SchedulerRegistry::new();
    let scheduler = registry.scheduler("jobs");
    let panics = Arc::new(AtomicUsize::new(0));
    let healthy = Arc::new(AtomicUsize::new(0));

    let p = panics.clone();
    scheduler
        .set_recurring("explodes", ms(100), RecurringOptions::default(), move || {
            p.fetch_add(1, SeqCst);
            async {
                if true {
                    panic!("task blew up");
                }
                Ok::<(), String>(())
            }
        })
        .unwrap();
    scheduler
        .set_recurring("steady", ms(100), RecurringOptions::default(), counting(&healthy))
        .unwrap();

    tokio::time::sleep(ms(350)).await;
    assert_eq!(panics.load(SeqCst), 3);
    assert_eq!(healthy.load(SeqCst), 3);
    assert!(scheduler.has("explodes"));
    assert!(!scheduler.snapshot().task("explodes").unwrap().running);
}

#[tokio::test(start_paused = true)]
async fn cancel_lets_the_running_invocation_finish() {
    let registry = SchedulerRegistry::new();
    let scheduler = registry.scheduler("farm");
    let started = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));

    let (s, f) = (started.clone(), finished.clone());
    scheduler
        .set_recurring("harvest", ms(100), RecurringOptions::default(), move || {
            let (s, f) = (s.clone(), f.clone());
            async move {
                s.fetch_add(1, SeqCst);
                tokio::time::sleep(ms(50)).await;
                f.fetch_add(1, SeqCst);
                Ok::<(), String>(())
            }
        })
        .unwrap();

    tokio::time::sleep(ms(120)).await;
    assert!(scheduler.cancel("harvest"));
    assert!(!scheduler.cancel("harvest"));

    tokio::time::sleep(ms(300)).await;
    assert_eq!(started.load(SeqCst), 1);
    assert_eq!(finished.load(SeqCst), 1);
    assert!(!scheduler.has("harvest"));
}

#[tokio::test(start_paused = true)]
async fn cancel_all_clears_the_namespace_only() {
    let registry = SchedulerRegistry::new();
    let farm = registry.scheduler("farm");
    let friends = registry.scheduler("friends");
    let hits = Arc::new(AtomicUsize::new(0));

    for name in ["a", "b", "c"] {
        farm.set_recurring(name, ms(100), RecurringOptions::default(), counting(&hits))
            .unwrap();
    }
    friends
        .set_recurring("visit", ms(100), RecurringOptions::default(), counting(&hits))
        .unwrap();

    assert_eq!(farm.cancel_all(), 3);
    assert!(farm.task_names().is_empty());
    assert_eq!(friends.task_names(), vec!["visit".to_string()]);
    assert!(registry.namespaces().contains(&"farm".to_string()));

    tokio::time::sleep(ms(250)).await;
    assert_eq!(hits.load(SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn run_immediately_does_not_shift_the_first_tick() {
    let registry = SchedulerRegistry::new();
    let scheduler = registry.scheduler("jobs");
    let hits = Arc::new(AtomicUsize::new(0));

    scheduler
        .set_recurring("daily", ms(1000), RecurringOptions::immediately(), counting(&hits))
        .unwrap();

    tokio::time::sleep(ms(10)).await;
    assert_eq!(hits.load(SeqCst), 1);

    tokio::time::sleep(ms(995)).await;
    assert_eq!(hits.load(SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn one_shot_can_reschedule_itself() {
    fn reschedule(scheduler: Scheduler, hits: Arc<AtomicUsize>) {
        scheduler
            .clone()
            .set_once("loop", ms(100), move || async move {
                if hits.fetch_add(1, SeqCst) + 1 < 3 {
                    reschedule(scheduler, hits);
                }
                Ok::<(), String>(())
            })
            .unwrap();
    }

    let registry = SchedulerRegistry::new();
    let scheduler = registry.scheduler("farm");
    let hits = Arc::new(AtomicUsize::new(0));
    reschedule(scheduler.clone(), hits.clone());

    tokio::time::sleep(ms(250)).await;
    assert_eq!(hits.load(SeqCst), 2);
    assert!(scheduler.has("loop"));

    tokio::time::sleep(ms(500)).await;
    assert_eq!(hits.load(SeqCst), 3);
    assert!(!scheduler.has("loop"));
}

#[tokio::test]
async fn empty_name_is_rejected() {
    let registry = SchedulerRegistry::new();
    let scheduler = registry.scheduler("jobs");
    let hits = Arc::new(AtomicUsize::new(0));

    assert_eq!(
        scheduler.set_recurring("", ms(10), RecurringOptions::default(), counting(&hits)),
        Err(SchedulerError::EmptyName)
    );
    assert_eq!(
        scheduler.set_once("", ms(10), counting(&hits)),
        Err(SchedulerError::EmptyName)
    );
}

#[tokio::test(start_paused = true)]
async fn tiny_intervals_are_clamped() {
    let registry = SchedulerRegistry::new();
    let scheduler = registry.scheduler("jobs");
    let hits = Arc::new(AtomicUsize::new(0));

    scheduler
        .set_recurring("spin", Duration::ZERO, RecurringOptions::default(), counting(&hits))
        .unwrap();
    assert_eq!(scheduler.snapshot().task("spin").unwrap().interval_ms, 1);
}

#[tokio::test(start_paused = true)]
async fn registry_snapshot_is_sorted_and_filterable() {
    let registry = SchedulerRegistry::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let zeta = registry.scheduler("zeta");
    let alpha = registry.scheduler("alpha");

    zeta.set_recurring("b", ms(500), RecurringOptions::default(), counting(&hits))
        .unwrap();
    zeta.set_recurring("a", ms(200), RecurringOptions::default(), counting(&hits))
        .unwrap();
    alpha
        .set_once("later", ms(5000), counting(&hits))
        .unwrap();

    tokio::time::sleep(ms(450)).await;

    let all = registry.snapshot(None);
    assert_eq!(all.scheduler_count, 2);
    let namespaces: Vec<_> = all.schedulers.iter().map(|s| s.namespace.as_str()).collect();
    assert_eq!(namespaces, vec!["alpha", "zeta"]);

    let zeta_view = all.namespace("zeta").unwrap();
    let names: Vec<_> = zeta_view.tasks.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    let a = zeta_view.task("a").unwrap();
    assert_eq!(a.kind, TaskKind::Recurring);
    assert_eq!(a.run_count, 2);
    assert!(a.last_run_at_ms.is_some());

    let later = all.namespace("alpha").unwrap().task("later").unwrap();
    assert_eq!(later.kind, TaskKind::OneShot);
    assert_eq!(later.run_count, 0);
    assert!(later.next_run_at_ms.is_some());

    let only = registry.snapshot(Some("alpha"));
    assert_eq!(only.scheduler_count, 1);
    assert!(registry.snapshot(Some("missing")).schedulers.is_empty());
}

#[tokio::test(start_paused = true)]
async fn removing_a_namespace_stops_its_timers() {
    let registry = SchedulerRegistry::new();
    let scheduler = registry.scheduler("unit-a");
    let hits = Arc::new(AtomicUsize::new(0));
    scheduler
        .set_recurring("tick", ms(100), RecurringOptions::default(), counting(&hits))
        .unwrap();

    tokio::time::sleep(ms(150)).await;
    assert!(registry.remove_namespace("unit-a"));
    tokio::time::sleep(ms(500)).await;

    assert_eq!(hits.load(SeqCst), 1);
    assert!(registry.snapshot(Some("unit-a")).schedulers.is_empty());
}

#[tokio::test]
async fn empty_namespace_maps_to_default() {
    let registry = SchedulerRegistry::new();
    assert_eq!(registry.scheduler("").namespace(), "default");
}
