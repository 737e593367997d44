//! Property-based tests for the task engine rules.
//!
//! Uses proptest to verify:
//! 1. Committing a Create draft stores exactly one open task stamped with the
//!    commit time when the text has any non-whitespace character, and stores
//!    nothing (without calling the store) when it does not.
//! 2. The cache lists tasks by ascending due date for any feed order, keeping
//!    feed order among equal due dates.
//! 3. A repeating task's trigger depends only on its local time of day, never
//!    on the calendar date, and daily and weekly agree.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use proptest::prelude::*;
use uuid::Uuid;
use zilzzz::clock::{Clock, FixedClock, LocalZone, epoch_millis};
use zilzzz::identity::StaticIdentity;
use zilzzz::notify::{NotificationScheduler, RecordingNotifier, Trigger, trigger_for};
use zilzzz::remote::InMemoryTaskStore;
use zilzzz::tasks::{EditMode, LocalTaskCache, TaskController, TaskError};
use zilzzz_proto::task::{OwnerId, Repeat, Snapshot, Task, TaskId};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn alice() -> OwnerId {
    OwnerId::new("alice")
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 31, 12, 0, 0).unwrap()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Runs one Create commit with `text` against a fresh in-memory store.
fn commit_text(text: &str, now: DateTime<Utc>) -> (Result<(), TaskError>, InMemoryTaskStore) {
    let store = InMemoryTaskStore::new();
    let mut controller = TaskController::new(
        store.channel_for(alice()),
        Arc::new(StaticIdentity::new(alice())),
        NotificationScheduler::new(RecordingNotifier::new(), FixedOffset::east_opt(0).unwrap()),
        Arc::new(FixedClock::new(now)) as Arc<dyn Clock>,
    );
    let result = runtime().block_on(async {
        controller.begin(EditMode::Create);
        controller.set_text(text)?;
        controller.commit().await.map(|_| ())
    });
    (result, store)
}

fn task(n: usize, due_hour: i64) -> Task {
    Task {
        id: TaskId::from_uuid(Uuid::from_u128(n as u128 + 1)),
        text: format!("task {n}"),
        owner_id: alice(),
        due_date: start() + Duration::hours(due_hour),
        repeat: Repeat::None,
        completed: false,
        created_at: 0,
    }
}

fn arb_feed() -> impl Strategy<Value = Vec<Task>> {
    // Few distinct due dates, so ties are common.
    prop::collection::vec(-3_i64..4, 0..24)
        .prop_map(|hours| {
            hours
                .into_iter()
                .enumerate()
                .map(|(n, h)| task(n, h))
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

fn arb_zone() -> impl Strategy<Value = LocalZone> {
    // Whole quarter hours between -12:00 and +14:00.
    (-48_i32..=56).prop_map(|quarters| {
        LocalZone::Fixed(FixedOffset::east_opt(quarters * 15 * 60).unwrap())
    })
}

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (0_i64..40_000).prop_map(|days| {
        NaiveDate::from_ymd_opt(1990, 1, 1).unwrap() + Duration::days(days)
    })
}

fn repeating(due_date: DateTime<Utc>, repeat: Repeat) -> Task {
    Task {
        repeat,
        due_date,
        ..task(0, 0)
    }
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #[test]
    fn non_blank_text_creates_exactly_one_open_task(
        text in "[ \t]{0,3}[^\\s\\x00][^\\x00]{0,40}",
        offset_secs in 0_i64..1_000_000,
    ) {
        let now = start() + Duration::seconds(offset_secs);
        let (result, store) = commit_text(&text, now);
        prop_assert!(result.is_ok());

        let tasks = store.tasks_of(&alice());
        prop_assert_eq!(tasks.len(), 1);
        prop_assert_eq!(&tasks[0].text, &text);
        prop_assert!(!tasks[0].completed);
        prop_assert_eq!(tasks[0].created_at, epoch_millis(now));
        prop_assert_eq!(&tasks[0].owner_id, &alice());
    }

    #[test]
    fn blank_text_creates_nothing(text in "[ \t\r\n\\x{3000}]{0,12}") {
        let (result, store) = commit_text(&text, start());
        prop_assert!(matches!(result, Err(TaskError::TextEmpty)));
        prop_assert!(store.is_empty());
        prop_assert_eq!(store.write_calls(), 0);
    }

    #[test]
    fn list_is_sorted_for_any_feed_order(feed in arb_feed()) {
        let mut cache = LocalTaskCache::new(alice());
        cache.apply(&Snapshot::new(feed.clone()));
        let listed = cache.list();

        prop_assert_eq!(listed.len(), feed.len());
        prop_assert!(listed.windows(2).all(|w| w[0].due_date <= w[1].due_date));

        let feed_position = |t: &Task| feed.iter().position(|f| f.id == t.id).unwrap();
        for pair in listed.windows(2) {
            if pair[0].due_date == pair[1].due_date {
                prop_assert!(feed_position(&pair[0]) < feed_position(&pair[1]));
            }
        }
    }

    #[test]
    fn recurring_trigger_ignores_calendar_date(
        zone in arb_zone(),
        first in arb_date(),
        second in arb_date(),
        hour in 0_u32..24,
        minute in 0_u32..60,
    ) {
        let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap();
        let due = |date: NaiveDate| {
            zone.from_local_datetime(&date.and_time(time))
                .single()
                .unwrap()
                .with_timezone(&Utc)
        };
        let expected = Trigger::Recurring { hour, minute };

        prop_assert_eq!(trigger_for(&repeating(due(first), Repeat::Daily), &zone), expected);
        prop_assert_eq!(trigger_for(&repeating(due(second), Repeat::Daily), &zone), expected);
        prop_assert_eq!(trigger_for(&repeating(due(second), Repeat::Weekly), &zone), expected);
    }
}
