// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::{Clock, FakeClock};
use crate::launcher::OneTimeLauncher;
use crate::test_support::{Call, RecordingListener};
use crate::window::{AlwaysActive, CalendarWindow, FixedWindow};
use chrono::{NaiveTime, Weekday};
use proptest::prelude::*;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

fn dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn manual_timer(now: &str) -> (FakeClock, Timer) {
    let clock = FakeClock::new(dt(now));
    let timer = Timer::manual("levels", clock.shared());
    (clock, timer)
}

fn ten_to_noon() -> FixedWindow {
    FixedWindow::new(dt("2026-03-04 10:00:00"), dt("2026-03-04 12:00:00"))
}

#[test]
fn start_inside_window_starts_children_and_arms_stop() {
    let (clock, timer) = manual_timer("2026-03-04 11:00:00");
    let child = RecordingListener::new("leaf");
    let level = ScheduleLevel::new("morning", ten_to_noon(), timer.clone()).with_child(child.clone());

    level.start(clock.now()).unwrap();

    assert_eq!(child.calls(), vec![Call::Start(dt("2026-03-04 10:00:00"))]);
    assert!(level.is_active());
    assert_eq!(timer.next_due(), Some(dt("2026-03-04 12:00:00")));

    clock.set(dt("2026-03-04 11:59:59"));
    timer.run_pending();
    assert_eq!(child.calls().len(), 1);

    clock.set(dt("2026-03-04 12:00:00"));
    timer.run_pending();
    assert_eq!(
        child.calls(),
        vec![Call::Start(dt("2026-03-04 10:00:00")), Call::Stop]
    );
    assert!(!level.is_active());
    // A fixed window never reopens
    assert!(!level.has_pending_transition());
    assert_eq!(timer.pending(), 0);
}

#[test]
fn start_before_window_waits_for_opening() {
    let (clock, timer) = manual_timer("2026-03-04 09:00:00");
    let child = RecordingListener::new("leaf");
    let level = ScheduleLevel::new("morning", ten_to_noon(), timer.clone()).with_child(child.clone());

    level.start(clock.now()).unwrap();
    assert!(child.calls().is_empty());
    assert!(level.has_pending_transition());

    clock.set(dt("2026-03-04 10:00:00"));
    timer.run_pending();

    assert_eq!(child.calls(), vec![Call::Start(dt("2026-03-04 10:00:00"))]);
    assert_eq!(timer.next_due(), Some(dt("2026-03-04 12:00:00")));
}

#[test]
fn daily_window_cycles() {
    let (clock, timer) = manual_timer("2026-03-04 15:00:00");
    let child = RecordingListener::new("leaf");
    let level = ScheduleLevel::new(
        "evening",
        CalendarWindow::daily(hm(16, 0), hm(20, 0)),
        timer.clone(),
    )
    .with_child(child.clone());

    level.start(clock.now()).unwrap();
    for at in [
        "2026-03-04 16:00:00",
        "2026-03-04 20:00:00",
        "2026-03-05 16:00:00",
        "2026-03-05 20:00:00",
    ] {
        clock.set(dt(at));
        timer.run_pending();
    }

    assert_eq!(
        child.calls(),
        vec![
            Call::Start(dt("2026-03-04 16:00:00")),
            Call::Stop,
            Call::Start(dt("2026-03-05 16:00:00")),
            Call::Stop,
        ]
    );
    assert_eq!(timer.next_due(), Some(dt("2026-03-06 16:00:00")));
}

#[test]
fn repeated_start_is_a_no_op_while_active() {
    let (clock, timer) = manual_timer("2026-03-04 11:00:00");
    let child = RecordingListener::new("leaf");
    let level = ScheduleLevel::new("morning", ten_to_noon(), timer.clone()).with_child(child.clone());

    level.start(clock.now()).unwrap();
    level.start(clock.now()).unwrap();

    assert_eq!(child.calls().len(), 1);
    assert_eq!(timer.pending(), 1);
}

#[test]
fn repeated_start_while_waiting_keeps_one_pending_entry() {
    let (clock, timer) = manual_timer("2026-03-04 09:00:00");
    let level = ScheduleLevel::new("morning", ten_to_noon(), timer.clone());

    level.start(clock.now()).unwrap();
    level.start(clock.now()).unwrap();

    assert_eq!(timer.pending(), 1);
}

#[test]
fn stop_is_idempotent_and_disarms() {
    let (clock, timer) = manual_timer("2026-03-04 11:00:00");
    let child = RecordingListener::new("leaf");
    let level = ScheduleLevel::new("morning", ten_to_noon(), timer.clone()).with_child(child.clone());

    level.stop();
    assert!(child.calls().is_empty());

    level.start(clock.now()).unwrap();
    level.stop();
    level.stop();

    assert_eq!(
        child.calls(),
        vec![Call::Start(dt("2026-03-04 10:00:00")), Call::Stop]
    );
    assert!(!level.has_pending_transition());
    assert_eq!(timer.pending(), 0);

    clock.set(dt("2026-03-04 12:00:00"));
    assert_eq!(timer.run_pending(), 0);
}

#[test]
fn stop_while_waiting_cancels_wake_up() {
    let (clock, timer) = manual_timer("2026-03-04 09:00:00");
    let child = RecordingListener::new("leaf");
    let level = ScheduleLevel::new("morning", ten_to_noon(), timer.clone()).with_child(child.clone());

    level.start(clock.now()).unwrap();
    level.stop();
    clock.set(dt("2026-03-04 10:00:00"));
    timer.run_pending();

    assert!(child.calls().is_empty());
}

#[test]
fn always_active_window_arms_nothing() {
    let (clock, timer) = manual_timer("2026-03-04 11:00:00");
    let child = RecordingListener::new("leaf");
    let level = ScheduleLevel::new("always", AlwaysActive, timer.clone()).with_child(child.clone());

    level.start(clock.now()).unwrap();

    assert_eq!(child.calls(), vec![Call::Start(dt("2026-03-04 11:00:00"))]);
    assert!(!level.has_pending_transition());
    assert_eq!(timer.pending(), 0);
}

#[test]
fn closed_for_good_window_arms_nothing() {
    let (clock, timer) = manual_timer("2026-03-05 11:00:00");
    let child = RecordingListener::new("leaf");
    let level = ScheduleLevel::new("past", ten_to_noon(), timer.clone()).with_child(child.clone());

    level.start(clock.now()).unwrap();

    assert!(child.calls().is_empty());
    assert_eq!(timer.pending(), 0);
}

#[test]
fn nested_levels_pass_window_start_down() {
    // Wednesday 17:00
    let (clock, timer) = manual_timer("2026-03-04 17:00:00");
    let leaf = RecordingListener::new("leaf");
    let evening = ScheduleLevel::new(
        "evening",
        CalendarWindow::daily(hm(16, 0), hm(20, 0)),
        timer.clone(),
    )
    .with_child(leaf.clone());
    let midweek = ScheduleLevel::new(
        "midweek",
        CalendarWindow::weekdays(Weekday::Wed, Weekday::Thu),
        timer.clone(),
    )
    .with_child(evening.clone());

    midweek.start(clock.now()).unwrap();

    assert!(midweek.is_active());
    assert!(evening.is_active());
    assert_eq!(leaf.calls(), vec![Call::Start(dt("2026-03-04 16:00:00"))]);

    // The outer window closes Friday 00:00 and takes the subtree down
    clock.set(dt("2026-03-05 20:00:00"));
    timer.run_pending();
    clock.set(dt("2026-03-06 00:00:00"));
    timer.run_pending();

    assert!(!midweek.is_active());
    assert!(!evening.is_active());
    assert!(!evening.has_pending_transition());
    assert_eq!(leaf.calls().last(), Some(&Call::Stop));
}

#[test]
fn failing_child_still_arms_stop() {
    let (clock, timer) = manual_timer("2026-03-04 11:00:00");
    let bad = RecordingListener::failing("bad");
    let good = RecordingListener::new("good");
    let level = ScheduleLevel::new("morning", ten_to_noon(), timer.clone())
        .with_child(bad.clone())
        .with_child(good.clone());

    assert!(level.start(clock.now()).is_err());

    assert!(level.is_active());
    assert_eq!(good.calls().len(), 1);
    assert!(level.has_pending_transition());
}

#[test]
fn dropped_level_ignores_its_transition() {
    let (clock, timer) = manual_timer("2026-03-04 09:00:00");
    let level = ScheduleLevel::new("morning", ten_to_noon(), timer.clone());
    level.start(clock.now()).unwrap();
    drop(level);

    clock.set(dt("2026-03-04 10:00:00"));
    assert_eq!(timer.run_pending(), 1);
    assert_eq!(timer.pending(), 0);
}

#[test]
fn panicking_child_does_not_wedge_daily_cycle() {
    let (clock, timer) = manual_timer("2026-03-04 09:00:00");
    let sibling = RecordingListener::new("sibling");
    let level = ScheduleLevel::new(
        "morning",
        CalendarWindow::daily(hm(10, 0), hm(12, 0)),
        timer.clone(),
    )
    .with_child(OneTimeLauncher::new("explodes", || panic!("boom")))
    .with_child(sibling.clone());

    level.start(clock.now()).unwrap();
    clock.set(dt("2026-03-04 10:00:00"));
    timer.run_pending();

    assert!(level.is_active());
    assert!(level.has_pending_transition());
    assert_eq!(sibling.calls(), vec![Call::Start(dt("2026-03-04 10:00:00"))]);

    for at in ["2026-03-04 12:00:00", "2026-03-05 10:00:00"] {
        clock.set(dt(at));
        timer.run_pending();
    }

    assert_eq!(
        sibling.calls(),
        vec![
            Call::Start(dt("2026-03-04 10:00:00")),
            Call::Stop,
            Call::Start(dt("2026-03-05 10:00:00")),
        ]
    );
    assert_eq!(timer.next_due(), Some(dt("2026-03-05 12:00:00")));
}

#[test]
fn child_work_can_read_its_level() {
    let (clock, timer) = manual_timer("2026-03-04 11:00:00");
    let level = ScheduleLevel::new("morning", ten_to_noon(), timer);
    let parent = Arc::downgrade(&level);
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    level.add_child(OneTimeLauncher::new("peek", move || {
        *sink.lock().unwrap() = parent.upgrade().map(|level| level.is_active());
        Ok(())
    }));

    let (tx, rx) = mpsc::channel();
    let starter = Arc::clone(&level);
    thread::spawn(move || {
        let _ = tx.send(starter.start(clock.now()).is_ok());
    });

    assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(true));
    assert_eq!(*seen.lock().unwrap(), Some(true));
}

#[test]
fn child_stopping_its_level_during_start_is_applied_after() {
    let (clock, timer) = manual_timer("2026-03-04 11:00:00");
    let level = ScheduleLevel::new("morning", ten_to_noon(), timer.clone());
    let parent = Arc::downgrade(&level);
    let sibling = RecordingListener::new("sibling");
    level.add_child(OneTimeLauncher::new("halt", move || {
        if let Some(level) = parent.upgrade() {
            level.stop();
        }
        Ok(())
    }));
    level.add_child(sibling.clone());

    level.start(clock.now()).unwrap();

    assert_eq!(
        sibling.calls(),
        vec![Call::Start(dt("2026-03-04 10:00:00")), Call::Stop]
    );
    assert!(!level.is_active());
    assert!(!level.has_pending_transition());
    assert_eq!(timer.pending(), 0);
}

#[derive(Debug, Clone)]
enum Op {
    Start,
    Stop,
    Advance(u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Start),
        Just(Op::Stop),
        (1u64..(36 * 60)).prop_map(Op::Advance),
    ]
}

proptest! {
    #[test]
    fn children_see_strict_alternation(ops in prop::collection::vec(op(), 1..60)) {
        let (clock, timer) = manual_timer("2026-03-04 12:00:00");
        let child = RecordingListener::new("leaf");
        let level = ScheduleLevel::new(
            "evening",
            CalendarWindow::daily(hm(16, 0), hm(20, 0)),
            timer.clone(),
        )
        .with_child(child.clone());

        for op in ops {
            match op {
                Op::Start => {
                    let _ = level.start(clock.now());
                }
                Op::Stop => level.stop(),
                Op::Advance(minutes) => {
                    clock.advance(Duration::from_secs(minutes * 60));
                    timer.run_pending();
                }
            }
            prop_assert!(timer.pending() <= 1);
        }

        let calls = child.calls();
        for (i, call) in calls.iter().enumerate() {
            let expect_start = i % 2 == 0;
            prop_assert_eq!(matches!(call, Call::Start(_)), expect_start);
        }
        prop_assert_eq!(level.is_active(), calls.len() % 2 == 1);
    }
}
