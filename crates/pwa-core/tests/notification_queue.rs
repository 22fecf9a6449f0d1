//! Notification queue behaviour against a recording presenter.
//!
//! Time is virtual: every timer fires exactly when the test advances the
//! `ManualClock` past it.

use proptest::prelude::*;
use pwa_core::{
    DismissReason, NotificationConfig, NotificationQueue, NotificationRequest, TokioClock,
};
use pwa_test_utils::{manual_queue, RecordingPresenter};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn numbered(i: usize, duration_ms: u64) -> NotificationRequest {
    NotificationRequest::info(format!("n{i}")).with_duration(Duration::from_millis(duration_ms))
}

/// Tenet: with immediate dismissal every request is shown exactly once, in order.
#[test]
fn immediate_dismissal_shows_everything_once() {
    let presenter = RecordingPresenter::closing_immediately();
    let (queue, _clock) = manual_queue(3, presenter.clone());

    for i in 0..25 {
        queue.enqueue(numbered(i, 5000));
    }

    let expected: Vec<String> = (0..25).map(|i| format!("n{i}")).collect();
    assert_eq!(presenter.messages(), expected);
    assert_eq!(presenter.dismissed().len(), 25);
    assert!(queue.is_idle());
    assert!(presenter.peak_on_screen() <= 3);
}

/// Tenet: closing a notification before its timer frees exactly one slot.
#[test]
fn manual_dismissal_before_timer_decrements_once() {
    let presenter = RecordingPresenter::new();
    let (queue, clock) = manual_queue(2, presenter.clone());

    let first = queue.enqueue(numbered(0, 1000));
    queue.enqueue(numbered(1, 5000));
    queue.enqueue(numbered(2, 5000));
    queue.enqueue(numbered(3, 5000));
    assert_eq!(queue.active_count(), 2);

    let handle = presenter.handle(first).unwrap();
    assert!(handle.dismiss());
    assert!(!handle.dismiss());
    assert_eq!(queue.active_count(), 2);
    assert_eq!(queue.pending_len(), 1);
    assert_eq!(clock.pending_timers(), 2);

    // n0's timer would have fired here; it was canceled.
    clock.advance(Duration::from_millis(1000));
    assert_eq!(queue.active_count(), 2);
    assert_eq!(queue.pending_len(), 1);
    assert_eq!(presenter.messages(), vec!["n0", "n1", "n2"]);
    assert_eq!(presenter.dismissed(), vec![(first, DismissReason::User)]);
    assert_eq!(queue.stats().dismissed(), 1);
}

#[test]
fn staggered_durations_drain_in_arrival_order() {
    let presenter = RecordingPresenter::new();
    let (queue, clock) = manual_queue(3, presenter.clone());

    // Short-lived notifications behind long-lived ones still wait their turn.
    let durations = [3000, 100, 2000, 50, 50, 10, 400];
    for (i, d) in durations.iter().enumerate() {
        queue.enqueue(numbered(i, *d));
    }

    clock.advance(Duration::from_secs(60));

    let expected: Vec<String> = (0..durations.len()).map(|i| format!("n{i}")).collect();
    assert_eq!(presenter.messages(), expected);
    assert!(queue.is_idle());
    assert_eq!(presenter.peak_on_screen(), 3);
}

#[test]
fn persistent_notification_holds_its_slot() {
    let presenter = RecordingPresenter::new();
    let (queue, clock) = manual_queue(1, presenter.clone());

    let sticky = queue.enqueue(NotificationRequest::warning("offline").persistent());
    queue.enqueue(numbered(1, 100));

    clock.advance(Duration::from_secs(600));
    assert_eq!(presenter.messages(), vec!["offline"]);

    assert!(queue.dismiss(sticky));
    assert_eq!(presenter.messages(), vec!["offline", "n1"]);
}

/// Tenet: a user close racing the timer on real threads still frees one slot.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn user_close_racing_timer_dismisses_once() {
    const COUNT: usize = 64;
    let presenter = RecordingPresenter::new();
    let config = NotificationConfig {
        max_concurrent: COUNT,
        dismiss_grace_ms: 0,
        ..NotificationConfig::default()
    };
    let queue = NotificationQueue::new(&config, presenter.clone(), Arc::new(TokioClock::current()));

    let ids: Vec<_> = (0..COUNT).map(|i| queue.enqueue(numbered(i, 5))).collect();
    let closers: Vec<_> = ids
        .iter()
        .map(|id| {
            let handle = presenter.handle(*id).unwrap();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                handle.dismiss()
            })
        })
        .collect();
    for closer in closers {
        closer.await.unwrap();
    }

    tokio::time::timeout(Duration::from_secs(5), async {
        while !queue.is_idle() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("queue never drained");
    // Let any timer that lost the race finish running.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let stats = queue.stats();
    assert_eq!(stats.dismissed(), COUNT as u64);
    assert_eq!(stats.dismissed_by_user + stats.dismissed_by_timer, COUNT as u64);

    let dismissed = presenter.dismissed();
    assert_eq!(dismissed.len(), COUNT);
    let unique: HashSet<_> = dismissed.iter().map(|(id, _)| *id).collect();
    assert_eq!(unique, ids.into_iter().collect::<HashSet<_>>());
}

#[derive(Debug, Clone)]
enum Op {
    Enqueue(u64),
    Advance(u64),
    Close(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => prop_oneof![Just(0u64), 1u64..2_000].prop_map(Op::Enqueue),
        3 => (1u64..1_500).prop_map(Op::Advance),
        2 => (0usize..8).prop_map(Op::Close),
    ]
}

proptest! {
    /// Capacity is never exceeded and display order equals enqueue order,
    /// whatever the mix of timeouts and manual closes.
    #[test]
    fn capacity_and_fifo_hold(max in 1usize..5, ops in proptest::collection::vec(op(), 1..80)) {
        let presenter = RecordingPresenter::new();
        let (queue, clock) = manual_queue(max, presenter.clone());
        let mut enqueued = 0usize;

        for op in ops {
            match op {
                Op::Enqueue(d) => {
                    queue.enqueue(numbered(enqueued, d));
                    enqueued += 1;
                }
                Op::Advance(ms) => clock.advance(Duration::from_millis(ms)),
                Op::Close(n) => {
                    presenter.close_nth(n);
                }
            }
            prop_assert!(queue.active_count() <= max);
            prop_assert!(presenter.on_screen() <= max);
        }

        // Flush: let timers run and close anything persistent.
        for _ in 0..=enqueued {
            if queue.is_idle() {
                break;
            }
            clock.advance(Duration::from_secs(10));
            while presenter.close_oldest().is_some() {}
        }

        prop_assert!(queue.is_idle());
        prop_assert!(presenter.peak_on_screen() <= max);
        let expected: Vec<String> = (0..enqueued).map(|i| format!("n{i}")).collect();
        prop_assert_eq!(presenter.messages(), expected);
        prop_assert_eq!(presenter.dismissed().len(), enqueued);
    }
}
