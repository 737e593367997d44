//! Integration tests for syncing against a running store server.
//!
//! Starts `zilzzz-store` on an ephemeral port and drives the client over a
//! real WebSocket: `WsTaskChannel` for writes, `LiveTaskCache` for the feed.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::missing_panics_doc
)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, TimeZone, Utc};
use zilzzz::clock::{Clock, FixedClock};
use zilzzz::identity::StaticIdentity;
use zilzzz::notify::{NotificationScheduler, RecordingNotifier, Trigger};
use zilzzz::remote::{RemoteError, RemoteTaskChannel, WsTaskChannel};
use zilzzz::tasks::{CommitOutcome, EditMode, LiveTaskCache, TaskController, TaskError};
use zilzzz_proto::task::{OwnerId, Repeat, Task, TaskFields, TaskId};
use zilzzz_store::server::{ServerState, start_server_with_state};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

const TIMEOUT: Duration = Duration::from_secs(5);

async fn start_store() -> (String, Arc<ServerState>) {
    let state = Arc::new(ServerState::new());
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();
    (format!("ws://{addr}/ws"), state)
}

async fn connect(url: &str, owner: &str) -> WsTaskChannel {
    WsTaskChannel::connect(url, OwnerId::new(owner), TIMEOUT, TIMEOUT)
        .await
        .unwrap()
}

async fn wait_for(cache: &LiveTaskCache, mut check: impl FnMut(&[Task]) -> bool) {
    for _ in 0..300 {
        if check(&cache.snapshot_list()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("cache never reached the expected state: {:?}", cache.snapshot_list());
}

fn fields(owner: &str, text: &str, day: u32) -> TaskFields {
    TaskFields {
        text: text.to_string(),
        owner_id: OwnerId::new(owner),
        due_date: Utc.with_ymd_and_hms(2024, 6, day, 9, 0, 0).unwrap(),
        repeat: Repeat::None,
        completed: false,
        created_at: 1,
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[tokio::test]
async fn controller_commit_reaches_cache_through_server() {
    let (url, _state) = start_store().await;
    let channel = connect(&url, "alice").await;

    let mut cache = LiveTaskCache::new(OwnerId::new("alice"));
    cache.activate(&channel).await.unwrap();

    let notifier = RecordingNotifier::new();
    let now = Utc.with_ymd_and_hms(2024, 5, 31, 12, 0, 0).unwrap();
    let mut controller = TaskController::new(
        channel,
        Arc::new(StaticIdentity::new(OwnerId::new("alice"))),
        NotificationScheduler::new(notifier.clone(), FixedOffset::east_opt(0).unwrap()),
        Arc::new(FixedClock::new(now)) as Arc<dyn Clock>,
    );

    controller.begin(EditMode::Create);
    controller.set_text("Stretch").unwrap();
    controller.set_repeat(Repeat::Daily).unwrap();
    controller
        .set_due_date(Utc.with_ymd_and_hms(2024, 6, 1, 7, 0, 0).unwrap())
        .unwrap();
    let outcome = controller.commit().await.unwrap();
    let CommitOutcome::Created { id, reminder } = outcome else {
        panic!("expected Created");
    };
    assert!(reminder.is_ok());
    assert_eq!(
        notifier.jobs()[0].trigger,
        Trigger::Recurring { hour: 7, minute: 0 }
    );

    wait_for(&cache, |tasks| tasks.len() == 1).await;
    let task = cache.get(&id).unwrap();
    assert_eq!(task.text, "Stretch");
    assert_eq!(task.repeat, Repeat::Daily);

    assert!(controller.toggle_completion(&task).await.unwrap());
    wait_for(&cache, |tasks| tasks[0].completed).await;

    controller.delete_task(&id).await.unwrap();
    wait_for(&cache, <[Task]>::is_empty).await;
}

#[tokio::test]
async fn two_connections_of_one_owner_see_each_others_writes() {
    let (url, _state) = start_store().await;
    let phone = connect(&url, "alice").await;
    let laptop = connect(&url, "alice").await;

    let mut laptop_cache = LiveTaskCache::new(OwnerId::new("alice"));
    laptop_cache.activate(&laptop).await.unwrap();

    phone.create(fields("alice", "later", 9)).await.unwrap();
    phone.create(fields("alice", "sooner", 2)).await.unwrap();

    wait_for(&laptop_cache, |tasks| tasks.len() == 2).await;
    let texts: Vec<String> = laptop_cache
        .snapshot_list()
        .into_iter()
        .map(|t| t.text)
        .collect();
    assert_eq!(texts, vec!["sooner", "later"]);
}

#[tokio::test]
async fn owners_are_isolated() {
    let (url, _state) = start_store().await;
    let alice = connect(&url, "alice").await;
    let bob = connect(&url, "bob").await;

    let mut alice_cache = LiveTaskCache::new(OwnerId::new("alice"));
    alice_cache.activate(&alice).await.unwrap();
    let mut bob_cache = LiveTaskCache::new(OwnerId::new("bob"));
    bob_cache.activate(&bob).await.unwrap();

    bob.create(fields("bob", "bob's", 1)).await.unwrap();
    wait_for(&bob_cache, |tasks| tasks.len() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(alice_cache.is_empty());

    let bobs_id = bob_cache.snapshot_list()[0].id.clone();
    assert!(matches!(
        alice.delete(&bobs_id).await,
        Err(RemoteError::NotFound(_))
    ));
    assert!(matches!(
        alice.create(fields("bob", "sneaky", 1)).await,
        Err(RemoteError::Forbidden(_))
    ));
}

#[tokio::test]
async fn unknown_id_update_is_not_found() {
    let (url, _state) = start_store().await;
    let channel = connect(&url, "alice").await;
    let missing = TaskId::new();
    let result = channel
        .update(&missing, zilzzz_proto::task::TaskPatch::completion(true))
        .await;
    assert!(matches!(result, Err(RemoteError::NotFound(ref id)) if *id == missing));
}

#[tokio::test]
async fn blank_text_is_rejected_by_server() {
    let (url, state) = start_store().await;
    let channel = connect(&url, "alice").await;
    assert!(matches!(
        channel.create(fields("alice", "   ", 1)).await,
        Err(RemoteError::Rejected(_))
    ));
    assert!(state.store.is_empty().await);
}

#[tokio::test]
async fn deactivating_cache_unsubscribes_on_server() {
    let (url, state) = start_store().await;
    let channel = connect(&url, "alice").await;
    let alice = OwnerId::new("alice");

    let mut cache = LiveTaskCache::new(alice.clone());
    cache.activate(&channel).await.unwrap();
    for _ in 0..100 {
        if state.subscriber_count(&alice).await == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state.subscriber_count(&alice).await, 1);

    assert!(cache.deactivate());
    for _ in 0..100 {
        if state.subscriber_count(&alice).await == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("server still holds the subscription");
}

#[tokio::test]
async fn signed_out_controller_cannot_create() {
    let (url, state) = start_store().await;
    let channel = connect(&url, "alice").await;
    let mut controller = TaskController::new(
        channel,
        Arc::new(StaticIdentity::signed_out()),
        NotificationScheduler::new(RecordingNotifier::new(), FixedOffset::east_opt(0).unwrap()),
        Arc::new(FixedClock::new(Utc::now())) as Arc<dyn Clock>,
    );
    controller.begin(EditMode::Create);
    controller.set_text("Buy milk").unwrap();
    assert!(matches!(
        controller.commit().await,
        Err(TaskError::NotSignedIn)
    ));
    assert!(state.store.is_empty().await);
}
