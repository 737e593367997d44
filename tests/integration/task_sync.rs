//! Integration tests for the reminder task lifecycle.
//!
//! Drives `TaskController` and `LiveTaskCache` against the in-memory store,
//! with a recording notifier and a fixed clock, and checks what ends up in
//! the store, the cache and the notifier.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::missing_panics_doc
)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use zilzzz::clock::{Clock, FixedClock, epoch_millis};
use zilzzz::identity::StaticIdentity;
use zilzzz::notify::{NotificationScheduler, RecordingNotifier, Trigger};
use zilzzz::remote::{InMemoryTaskChannel, InMemoryTaskStore, RemoteError};
use zilzzz::tasks::{CommitOutcome, EditMode, LiveTaskCache, TaskController, TaskError};
use zilzzz_proto::task::{OwnerId, Repeat, Task, TaskId};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

struct Fixture {
    store: InMemoryTaskStore,
    notifier: RecordingNotifier,
    clock: Arc<FixedClock>,
    controller: TaskController<InMemoryTaskChannel, RecordingNotifier>,
    cache: LiveTaskCache,
}

fn alice() -> OwnerId {
    OwnerId::new("alice")
}

fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap()
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 31, 12, 0, 0).unwrap()
}

async fn fixture() -> Fixture {
    let store = InMemoryTaskStore::new();
    let notifier = RecordingNotifier::new();
    let clock = Arc::new(FixedClock::new(now()));
    let channel = store.channel_for(alice());
    let controller = TaskController::new(
        channel.clone(),
        Arc::new(StaticIdentity::new(alice())),
        NotificationScheduler::new(notifier.clone(), utc()),
        Arc::clone(&clock) as Arc<dyn Clock>,
    );
    let mut cache = LiveTaskCache::new(alice());
    cache.activate(&channel).await.unwrap();
    Fixture {
        store,
        notifier,
        clock,
        controller,
        cache,
    }
}

async fn wait_for(cache: &LiveTaskCache, mut check: impl FnMut(&[Task]) -> bool) {
    for _ in 0..200 {
        if check(&cache.snapshot_list()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("cache never reached the expected state: {:?}", cache.snapshot_list());
}

/// Runs a full create through the picker: date, then time.
async fn create(
    f: &mut Fixture,
    text: &str,
    date: NaiveDate,
    hour: u32,
    minute: u32,
    repeat: Repeat,
) -> CommitOutcome {
    f.controller.begin(EditMode::Create);
    f.controller.set_text(text).unwrap();
    f.controller.begin_due_date_pick().unwrap();
    f.controller.choose_date(date).unwrap();
    f.controller.choose_time(hour, minute).unwrap();
    f.controller.set_repeat(repeat).unwrap();
    f.controller.commit().await.unwrap()
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ===========================================================================
// Scenarios
// ===========================================================================

#[tokio::test]
async fn buy_milk_fires_once_at_due_instant() {
    let mut f = fixture().await;
    let outcome = create(&mut f, "Buy milk", ymd(2024, 6, 1), 8, 30, Repeat::None).await;
    assert!(matches!(outcome, CommitOutcome::Created { reminder: Ok(_), .. }));

    wait_for(&f.cache, |tasks| tasks.len() == 1).await;
    let task = &f.cache.snapshot_list()[0];
    let due = Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap();
    assert_eq!(task.text, "Buy milk");
    assert_eq!(task.due_date, due);
    assert!(!task.completed);
    assert_eq!(task.created_at, epoch_millis(now()));
    assert_eq!(task.owner_id, alice());

    let jobs = f.notifier.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].trigger, Trigger::Absolute(due));
    assert_eq!(jobs[0].body, "Buy milk");
}

#[tokio::test]
async fn stretch_daily_fires_every_day_at_seven() {
    let mut f = fixture().await;
    create(&mut f, "Stretch", ymd(2031, 2, 14), 7, 0, Repeat::Daily).await;

    let jobs = f.notifier.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].trigger, Trigger::Recurring { hour: 7, minute: 0 });
}

#[tokio::test]
async fn weekly_reminder_uses_same_daily_trigger() {
    let mut f = fixture().await;
    create(&mut f, "Bins", ymd(2024, 6, 4), 19, 15, Repeat::Weekly).await;
    assert_eq!(
        f.notifier.jobs()[0].trigger,
        Trigger::Recurring {
            hour: 19,
            minute: 15
        }
    );
}

#[tokio::test]
async fn blank_text_creates_nothing() {
    let mut f = fixture().await;
    for text in ["", " ", "\t\n  "] {
        f.controller.begin(EditMode::Create);
        f.controller.set_text(text).unwrap();
        assert!(matches!(
            f.controller.commit().await,
            Err(TaskError::TextEmpty)
        ));
    }
    assert_eq!(f.store.write_calls(), 0);
    assert!(f.store.is_empty());
    assert!(f.notifier.jobs().is_empty());
}

#[tokio::test]
async fn edit_keeps_count_owner_and_creation_time() {
    let mut f = fixture().await;
    create(&mut f, "Buy milk", ymd(2024, 6, 1), 8, 30, Repeat::None).await;
    wait_for(&f.cache, |tasks| tasks.len() == 1).await;
    let original = f.cache.snapshot_list()[0].clone();

    f.clock.advance(chrono::Duration::days(1));
    f.controller.begin(EditMode::Edit(original.clone()));
    f.controller.set_text("Buy oat milk").unwrap();
    let outcome = f.controller.commit().await.unwrap();
    assert_eq!(outcome.id(), &original.id);

    wait_for(&f.cache, |tasks| tasks[0].text == "Buy oat milk").await;
    let edited = &f.cache.snapshot_list()[0];
    assert_eq!(f.cache.len(), 1);
    assert_eq!(edited.owner_id, original.owner_id);
    assert_eq!(edited.created_at, original.created_at);
    assert_eq!(edited.due_date, original.due_date);
    assert_eq!(f.notifier.jobs().len(), 1, "edit must not schedule");
}

#[tokio::test]
async fn cancelled_edit_changes_nothing() {
    let mut f = fixture().await;
    create(&mut f, "Buy milk", ymd(2024, 6, 1), 8, 30, Repeat::None).await;
    wait_for(&f.cache, |tasks| tasks.len() == 1).await;
    let original = f.cache.snapshot_list()[0].clone();
    let writes = f.store.write_calls();

    f.controller.begin(EditMode::Edit(original.clone()));
    f.controller.set_text("something else").unwrap();
    f.controller.set_repeat(Repeat::Weekly).unwrap();
    assert!(f.controller.cancel());

    assert_eq!(f.store.write_calls(), writes);
    assert_eq!(f.store.tasks_of(&alice()), vec![original]);
}

#[tokio::test]
async fn toggling_twice_restores_the_task() {
    let mut f = fixture().await;
    create(&mut f, "Buy milk", ymd(2024, 6, 1), 8, 30, Repeat::None).await;
    wait_for(&f.cache, |tasks| tasks.len() == 1).await;
    let original = f.cache.snapshot_list()[0].clone();

    assert!(f.controller.toggle_completion(&original).await.unwrap());
    wait_for(&f.cache, |tasks| tasks[0].completed).await;
    let toggled = f.cache.snapshot_list()[0].clone();

    assert!(!f.controller.toggle_completion(&toggled).await.unwrap());
    wait_for(&f.cache, |tasks| !tasks[0].completed).await;
    assert_eq!(f.cache.snapshot_list()[0], original);
}

#[tokio::test]
async fn deleting_unknown_id_leaves_cache_alone() {
    let mut f = fixture().await;
    create(&mut f, "Buy milk", ymd(2024, 6, 1), 8, 30, Repeat::None).await;
    wait_for(&f.cache, |tasks| tasks.len() == 1).await;
    let before = f.cache.snapshot_list();
    let version = f.cache.version();

    let missing = TaskId::new();
    let result = f.controller.delete_task(&missing).await;
    assert!(matches!(
        result,
        Err(TaskError::Remote(RemoteError::NotFound(ref id))) if *id == missing
    ));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(f.cache.snapshot_list(), before);
    assert_eq!(f.cache.version(), version);
}

#[tokio::test]
async fn delete_removes_from_cache() {
    let mut f = fixture().await;
    create(&mut f, "Buy milk", ymd(2024, 6, 1), 8, 30, Repeat::None).await;
    wait_for(&f.cache, |tasks| tasks.len() == 1).await;
    let id = f.cache.snapshot_list()[0].id.clone();

    f.controller.delete_task(&id).await.unwrap();
    wait_for(&f.cache, <[Task]>::is_empty).await;
}

#[tokio::test]
async fn list_is_sorted_by_due_date_regardless_of_creation_order() {
    let mut f = fixture().await;
    create(&mut f, "third", ymd(2024, 6, 3), 9, 0, Repeat::None).await;
    create(&mut f, "first", ymd(2024, 6, 1), 9, 0, Repeat::None).await;
    create(&mut f, "second-a", ymd(2024, 6, 2), 9, 0, Repeat::None).await;
    create(&mut f, "second-b", ymd(2024, 6, 2), 9, 0, Repeat::None).await;

    wait_for(&f.cache, |tasks| tasks.len() == 4).await;
    let texts: Vec<String> = f
        .cache
        .snapshot_list()
        .into_iter()
        .map(|t| t.text)
        .collect();
    assert_eq!(texts, vec!["first", "second-a", "second-b", "third"]);
}

#[tokio::test]
async fn denied_notifications_still_create_the_task() {
    let mut f = fixture().await;
    f.notifier.deny_permission(true);
    let outcome = create(&mut f, "Buy milk", ymd(2024, 6, 1), 8, 30, Repeat::None).await;
    assert!(matches!(
        outcome,
        CommitOutcome::Created {
            reminder: Err(_),
            ..
        }
    ));
    wait_for(&f.cache, |tasks| tasks.len() == 1).await;
}

#[tokio::test]
async fn other_owners_tasks_never_reach_the_cache() {
    let f = fixture().await;
    let bob = f.store.channel_for(OwnerId::new("bob"));
    let mut bob_cache = LiveTaskCache::new(OwnerId::new("bob"));
    bob_cache.activate(&bob).await.unwrap();

    f.store.insert(Task {
        id: TaskId::new(),
        text: "Bob's task".to_string(),
        owner_id: OwnerId::new("bob"),
        due_date: now(),
        repeat: Repeat::None,
        completed: false,
        created_at: 0,
    });

    wait_for(&bob_cache, |tasks| tasks.len() == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(f.cache.is_empty());
}

#[tokio::test]
async fn dropping_the_cache_releases_the_subscription() {
    let f = fixture().await;
    assert_eq!(f.store.listener_count(), 1);
    drop(f.cache);
    for _ in 0..100 {
        if f.store.listener_count() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("subscription was not released");
}
