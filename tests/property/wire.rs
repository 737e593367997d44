//! Property-based tests for the store wire protocol.
//!
//! Uses proptest to verify:
//! 1. Any valid `Task` survives a postcard encode → decode round-trip inside
//!    a `Snapshot` frame.
//! 2. Random bytes never cause a panic in `decode` (returns `Err` gracefully).
//! 3. `TaskPatch::apply` never alters the immutable fields of a task.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use uuid::Uuid;
use zilzzz_proto::store::{self, StoreMessage};
use zilzzz_proto::task::{OwnerId, Repeat, Task, TaskId, TaskPatch};

fn arb_instant() -> impl Strategy<Value = DateTime<Utc>> {
    // 1970 .. 2100, whole seconds.
    (0_i64..4_102_444_800).prop_map(|secs| {
        Utc.timestamp_opt(secs, 0)
            .single()
            .unwrap_or(DateTime::UNIX_EPOCH)
    })
}

fn arb_repeat() -> impl Strategy<Value = Repeat> {
    prop_oneof![Just(Repeat::None), Just(Repeat::Daily), Just(Repeat::Weekly)]
}

fn arb_task() -> impl Strategy<Value = Task> {
    (
        any::<u128>(),
        "[^\x00]{1,200}",
        "[a-z0-9]{1,16}",
        arb_instant(),
        arb_repeat(),
        any::<bool>(),
        any::<u64>(),
    )
        .prop_map(
            |(id, text, owner, due_date, repeat, completed, created_at)| Task {
                id: TaskId::from_uuid(Uuid::from_u128(id)),
                text,
                owner_id: OwnerId::new(owner),
                due_date,
                repeat,
                completed,
                created_at,
            },
        )
}

fn arb_patch() -> impl Strategy<Value = TaskPatch> {
    (
        proptest::option::of("[^\x00]{1,50}"),
        proptest::option::of(arb_instant()),
        proptest::option::of(arb_repeat()),
        proptest::option::of(any::<bool>()),
    )
        .prop_map(|(text, due_date, repeat, completed)| TaskPatch {
            text,
            due_date,
            repeat,
            completed,
        })
}

proptest! {
    #[test]
    fn snapshot_frame_round_trip(tasks in prop::collection::vec(arb_task(), 0..8)) {
        let msg = StoreMessage::Snapshot { tasks };
        let bytes = store::encode(&msg).unwrap();
        let decoded = store::decode(&bytes).unwrap();
        prop_assert_eq!(msg, decoded);
    }

    #[test]
    fn decode_random_bytes_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = store::decode(&bytes);
    }

    #[test]
    fn patch_preserves_identity_fields(mut task in arb_task(), patch in arb_patch()) {
        let id = task.id.clone();
        let owner = task.owner_id.clone();
        let created_at = task.created_at;
        patch.apply(&mut task);
        prop_assert_eq!(task.id, id);
        prop_assert_eq!(task.owner_id, owner);
        prop_assert_eq!(task.created_at, created_at);
    }
}
