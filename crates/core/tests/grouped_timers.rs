// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Grouped timers on real worker threads
//!
//! Short real durations; every wait is bounded.

use courier_core::{
    OneShotWork, PeriodicWork, Scheduler, SchedulerConfig, TaskHandle, TaskState,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const TICK: Duration = Duration::from_millis(10);
const PATIENCE: Duration = Duration::from_secs(5);

fn scheduler() -> Scheduler {
    Scheduler::with_system_clock(SchedulerConfig::new().with_thread_prefix("it"))
}

/// Poll `condition` until it holds or patience runs out
fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + PATIENCE;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(TICK);
    }
    condition()
}

#[test]
fn work_runs_on_the_group_worker_thread() {
    let scheduler = scheduler();
    let group = scheduler.add_task_group("imports");
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    scheduler
        .add_work(
            group,
            Arc::new(OneShotWork::new("probe", TICK, move |_| {
                let name = thread::current().name().map(str::to_string);
                tx.lock().unwrap().send(name).ok();
                Ok(())
            })),
        )
        .unwrap();

    let name = rx.recv_timeout(PATIENCE).unwrap();
    assert_eq!(name.as_deref(), Some("it-group-1"));

    let group = scheduler.group(group).unwrap();
    assert!(eventually(|| group.is_empty() && !group.has_timer()));
    scheduler.shutdown();
}

#[test]
fn cancel_from_another_thread_waits_for_running_work() {
    let scheduler = scheduler();
    let group_id = scheduler.add_task_group("slow");
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let started_tx = Mutex::new(started_tx);
    let release_rx = Mutex::new(release_rx);

    let task = scheduler
        .add_work(
            group_id,
            Arc::new(
                PeriodicWork::fixed_delay("blocking", Duration::from_secs(60), move |_| {
                    started_tx.lock().unwrap().send(()).ok();
                    release_rx.lock().unwrap().recv_timeout(PATIENCE).ok();
                    Ok(())
                })
                .with_initial_delay(TICK),
            ),
        )
        .unwrap();

    started_rx.recv_timeout(PATIENCE).unwrap();
    let group = scheduler.group(group_id).unwrap();
    assert_eq!(group.running_task(), Some(task));

    scheduler.remove_task(group_id, task);

    assert_eq!(group.task_state(task), Some(TaskState::PendingRemoval));
    assert_eq!(group.len(), 1);
    assert!(group.has_timer());

    release_tx.send(()).unwrap();
    assert!(eventually(|| group.is_empty()));
    assert!(!group.has_timer());
}

#[test]
fn self_cancel_on_worker_thread_tears_down_timer_after_return() {
    let scheduler = scheduler();
    let group_id = scheduler.add_task_group("self");
    let observed = Arc::new(Mutex::new(None));
    let seen = Arc::clone(&observed);

    scheduler
        .add_work(
            group_id,
            Arc::new(
                PeriodicWork::fixed_rate("quit", Duration::from_secs(60), move |task: &TaskHandle| {
                    task.cancel();
                    let group = task.group().ok_or("group gone")?;
                    *seen.lock().unwrap() = Some((group.len(), group.has_timer()));
                    Ok(())
                })
                .with_initial_delay(TICK),
            ),
        )
        .unwrap();

    let group = scheduler.group(group_id).unwrap();
    assert!(eventually(|| group.is_empty()));
    assert_eq!(*observed.lock().unwrap(), Some((1, true)));
    assert!(!group.has_timer());
}

#[test]
fn removing_one_group_leaves_another_firing() {
    let scheduler = scheduler();
    let a = scheduler.add_task_group("a");
    let b = scheduler.add_task_group("b");
    let fired_a = Arc::new(AtomicUsize::new(0));
    let fired_b = Arc::new(AtomicUsize::new(0));

    for (group, counter) in [(a, &fired_a), (b, &fired_b)] {
        let counter = Arc::clone(counter);
        scheduler
            .add_work(
                group,
                Arc::new(PeriodicWork::fixed_rate("count", TICK, move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })),
            )
            .unwrap();
    }

    assert!(eventually(|| fired_b.load(Ordering::SeqCst) > 0));
    scheduler.remove_task_group(b);
    let frozen_b = fired_b.load(Ordering::SeqCst);
    let before_a = fired_a.load(Ordering::SeqCst);

    assert!(eventually(|| fired_a.load(Ordering::SeqCst) > before_a + 3));
    // At most one firing of b was already in flight
    assert!(fired_b.load(Ordering::SeqCst) <= frozen_b + 1);
    assert_eq!(scheduler.group_ids(), vec![a]);
    scheduler.shutdown();
}

#[test]
fn churning_group_recreates_its_timer() {
    let scheduler = scheduler();
    let group_id = scheduler.add_task_group("churn");
    let group = scheduler.group(group_id).unwrap();
    let fired = Arc::new(AtomicUsize::new(0));

    for round in 1..=3 {
        let counter = Arc::clone(&fired);
        scheduler
            .add_work(
                group_id,
                Arc::new(OneShotWork::new("once", TICK, move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })),
            )
            .unwrap();
        assert!(eventually(|| fired.load(Ordering::SeqCst) == round));
        assert!(eventually(|| !group.has_timer()));
    }
}
