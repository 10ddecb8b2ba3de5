/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! End-to-end tests for the mailbox engine: UID consistency, access
//! control, quota atomicity, namespaces and synchronization.

use chrono::{Duration, Utc};
use mailbox::auth::hash_credential;
use mailbox::{Engine, EngineConfig, EngineError, FlagMode, Session};
use store::messages::NewMessage;
use store::{NamespaceMode, Permission, Store};

struct Fixture {
    engine: Engine,
    alice: Session,
    bob: Session,
    /// Alice's mailbox in the primary domain.
    mailbox_a: i64,
    /// Alice's mailbox in the secondary domain.
    mailbox_b: i64,
    inbox_a: i64,
    archive_a: i64,
}

async fn fixture() -> Fixture {
    // Engine logs go to the captured test output when a test fails.
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();

    let store = Store::open_memory().await.unwrap();
    let org = store.create_organization("acme").await.unwrap();
    let domain_a = store.create_domain(org.id, "a.com").await.unwrap();
    let domain_b = store.create_domain(org.id, "b.com").await.unwrap();

    let hash = hash_credential("salt", "secret");
    let alice = store
        .create_user("alice@a.com", "Alice", "salt", &hash, domain_a.id, true)
        .await
        .unwrap();
    let bob = store
        .create_user("bob@a.com", "Bob", "salt", &hash, domain_a.id, true)
        .await
        .unwrap();

    let mailbox_a = store
        .create_mailbox(alice.id, domain_a.id, "alice@a.com", "Alice", 0)
        .await
        .unwrap();
    let mailbox_b = store
        .create_mailbox(alice.id, domain_b.id, "alice@b.com", "Alice", 0)
        .await
        .unwrap();
    store
        .create_mailbox(bob.id, domain_a.id, "bob@a.com", "Bob", 0)
        .await
        .unwrap();

    let inbox_a = store
        .folder_by_path(mailbox_a.id, "INBOX")
        .await
        .unwrap()
        .unwrap()
        .id;
    let archive_a = store
        .folder_by_path(mailbox_a.id, "Archive")
        .await
        .unwrap()
        .unwrap()
        .id;

    let config = EngineConfig {
        cache_refresh_secs: 3600,
        ..Default::default()
    };
    let engine = Engine::with_store(store, config).await.unwrap();

    let alice = engine
        .login("alice@a.com", "secret", "198.51.100.7")
        .await
        .unwrap();
    let bob = engine
        .login("bob@a.com", "secret", "198.51.100.8")
        .await
        .unwrap();

    Fixture {
        engine,
        alice,
        bob,
        mailbox_a: mailbox_a.id,
        mailbox_b: mailbox_b.id,
        inbox_a,
        archive_a,
    }
}

fn message(subject: &str, size: i64) -> NewMessage {
    NewMessage {
        subject: subject.to_string(),
        from_addr: "sender@elsewhere.net".to_string(),
        body: format!("body of {subject}"),
        flags: Vec::new(),
        size_bytes: size,
        internal_date: Utc::now(),
    }
}

async fn deliver_n(fx: &Fixture, count: usize) {
    for i in 0..count {
        fx.engine
            .deliver("alice@a.com", message(&format!("m{i}"), 100))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn copy_allocates_monotonic_uids_and_returns_copyuid_mapping() {
    let fx = fixture().await;
    deliver_n(&fx, 3).await;

    let before = fx
        .engine
        .select_folder(&fx.alice, fx.mailbox_a, "Archive")
        .await
        .unwrap();
    assert_eq!(before.uid_next, 1);

    let mapping = fx
        .engine
        .copy_messages(&fx.alice, fx.inbox_a, fx.archive_a, &[1, 2, 3])
        .await
        .unwrap();

    let dest_uids: Vec<u32> = mapping.iter().map(|m| m.dest_uid).collect();
    assert_eq!(dest_uids, vec![1, 2, 3]);

    let after = fx
        .engine
        .select_folder(&fx.alice, fx.mailbox_a, "Archive")
        .await
        .unwrap();
    assert_eq!(after.uid_next, 4);
    assert_eq!(after.message_count, 3);
    assert!(after.highest_modseq > before.highest_modseq);
}

#[tokio::test]
async fn two_copies_produce_distinct_rows_never_a_merge() {
    let fx = fixture().await;
    deliver_n(&fx, 1).await;

    let first = fx
        .engine
        .copy_messages(&fx.alice, fx.inbox_a, fx.archive_a, &[1])
        .await
        .unwrap();
    let second = fx
        .engine
        .copy_messages(&fx.alice, fx.inbox_a, fx.archive_a, &[1])
        .await
        .unwrap();

    assert_eq!(first[0].dest_uid, 1);
    assert_eq!(second[0].dest_uid, 2);

    let rows = fx.engine.fetch(&fx.alice, fx.archive_a, "1:*").await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_ne!(rows[0].id, rows[1].id);
}

#[tokio::test]
async fn concurrent_copies_never_duplicate_uids() {
    let fx = fixture().await;
    deliver_n(&fx, 4).await;

    let engine_a = fx.engine.clone();
    let engine_b = fx.engine.clone();
    let session_a = fx.alice.clone();
    let session_b = fx.alice.clone();
    let (inbox, archive) = (fx.inbox_a, fx.archive_a);

    let (left, right) = tokio::join!(
        tokio::spawn(async move {
            engine_a
                .copy_messages(&session_a, inbox, archive, &[1, 2])
                .await
        }),
        tokio::spawn(async move {
            engine_b
                .copy_messages(&session_b, inbox, archive, &[3, 4])
                .await
        }),
    );

    let mut uids: Vec<u32> = left
        .unwrap()
        .unwrap()
        .into_iter()
        .chain(right.unwrap().unwrap())
        .map(|m| m.dest_uid)
        .collect();
    uids.sort_unstable();
    assert_eq!(uids, vec![1, 2, 3, 4]);

    let status = fx
        .engine
        .select_folder(&fx.alice, fx.mailbox_a, "Archive")
        .await
        .unwrap();
    assert_eq!(status.uid_next, 5);
    assert_eq!(status.message_count, 4);
}

#[tokio::test]
async fn stale_uids_are_skipped_not_fatal() {
    let fx = fixture().await;
    deliver_n(&fx, 2).await;

    let mapping = fx
        .engine
        .copy_messages(&fx.alice, fx.inbox_a, fx.archive_a, &[2, 7, 9])
        .await
        .unwrap();
    assert_eq!(mapping.len(), 1);
    assert_eq!(mapping[0].src_uid, 2);
}

#[tokio::test]
async fn move_preserves_content_and_removes_source() {
    let fx = fixture().await;
    deliver_n(&fx, 2).await;

    let original = fx
        .engine
        .fetch(&fx.alice, fx.inbox_a, "2")
        .await
        .unwrap()
        .remove(0);

    let mapping = fx
        .engine
        .move_messages(&fx.alice, fx.inbox_a, fx.archive_a, &[2])
        .await
        .unwrap();
    assert_eq!(mapping.len(), 1);

    let moved = fx
        .engine
        .fetch(&fx.alice, fx.archive_a, &mapping[0].dest_uid.to_string())
        .await
        .unwrap()
        .remove(0);
    assert_eq!(moved.subject, original.subject);
    assert_eq!(moved.from_addr, original.from_addr);
    assert_eq!(moved.body, original.body);

    assert!(fx.engine.fetch(&fx.alice, fx.inbox_a, "2").await.unwrap().is_empty());
    let src = fx
        .engine
        .select_folder(&fx.alice, fx.mailbox_a, "INBOX")
        .await
        .unwrap();
    assert_eq!(src.message_count, 1);
}

#[tokio::test]
async fn cross_domain_move_applies_the_same_rules() {
    let fx = fixture().await;
    deliver_n(&fx, 1).await;
    let store = fx.engine.store().clone();
    let inbox_b = store
        .folder_by_path(fx.mailbox_b, "INBOX")
        .await
        .unwrap()
        .unwrap()
        .id;

    let mapping = fx
        .engine
        .move_messages(&fx.alice, fx.inbox_a, inbox_b, &[1])
        .await
        .unwrap();
    assert_eq!(mapping[0].dest_uid, 1);

    let mailbox_b = store.mailbox_by_id(fx.mailbox_b).await.unwrap().unwrap();
    assert_eq!(mailbox_b.used_bytes, 100);
    let mailbox_a = store.mailbox_by_id(fx.mailbox_a).await.unwrap().unwrap();
    assert_eq!(mailbox_a.used_bytes, 0);
}

#[tokio::test]
async fn quota_overflow_rolls_back_whole_copy() {
    let fx = fixture().await;
    deliver_n(&fx, 3).await;
    let store = fx.engine.store().clone();

    // Archive lives in mailbox_a; cap the mailbox so only two more copies fit.
    store.set_quota(fx.mailbox_a, 500).await.unwrap();

    let before_status = fx
        .engine
        .select_folder(&fx.alice, fx.mailbox_a, "Archive")
        .await
        .unwrap();
    let before_used = store
        .mailbox_by_id(fx.mailbox_a)
        .await
        .unwrap()
        .unwrap()
        .used_bytes;

    match fx
        .engine
        .copy_messages(&fx.alice, fx.inbox_a, fx.archive_a, &[1, 2, 3])
        .await
    {
        Err(EngineError::QuotaExceeded {
            requested,
            available,
        }) => {
            assert_eq!(requested, 300);
            assert_eq!(available, 200);
        }
        other => panic!("expected QuotaExceeded, got {other:?}"),
    }

    let after_status = fx
        .engine
        .select_folder(&fx.alice, fx.mailbox_a, "Archive")
        .await
        .unwrap();
    assert_eq!(after_status.uid_next, before_status.uid_next);
    assert_eq!(after_status.message_count, before_status.message_count);
    assert!(fx.engine.fetch(&fx.alice, fx.archive_a, "1:*").await.unwrap().is_empty());

    let after_used = store
        .mailbox_by_id(fx.mailbox_a)
        .await
        .unwrap()
        .unwrap()
        .used_bytes;
    assert_eq!(after_used, before_used);
}

#[tokio::test]
async fn read_grant_gets_not_found_on_writes_admin_succeeds() {
    let fx = fixture().await;
    deliver_n(&fx, 2).await;
    let store = fx.engine.store().clone();

    store
        .grant_access(fx.mailbox_a, fx.bob.user.id, &[Permission::Read], None)
        .await
        .unwrap();

    // Bob can read Alice's INBOX...
    let seen = fx.engine.fetch(&fx.bob, fx.inbox_a, "1:*").await.unwrap();
    assert_eq!(seen.len(), 2);

    // ...but writing into it reports NotFound, not a permission error.
    let bob_inbox = {
        let bob_mailbox = store.mailbox_by_email("bob@a.com").await.unwrap().unwrap();
        store
            .folder_by_path(bob_mailbox.id, "INBOX")
            .await
            .unwrap()
            .unwrap()
            .id
    };
    match fx
        .engine
        .copy_messages(&fx.bob, bob_inbox, fx.inbox_a, &[1])
        .await
    {
        Err(EngineError::NotFound) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
    match fx
        .engine
        .update_flags(&fx.bob, seen[0].id, &["\\Seen".to_string()], FlagMode::Add)
        .await
    {
        Err(EngineError::NotFound) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }

    // An admin grant clears every check.
    store
        .grant_access(fx.mailbox_a, fx.bob.user.id, &[Permission::Admin], None)
        .await
        .unwrap();
    fx.engine
        .update_flags(&fx.bob, seen[0].id, &["\\Seen".to_string()], FlagMode::Add)
        .await
        .unwrap();
}

#[tokio::test]
async fn expired_grant_is_invisible_everywhere() {
    let fx = fixture().await;
    deliver_n(&fx, 1).await;
    let store = fx.engine.store().clone();

    store
        .grant_access(
            fx.mailbox_a,
            fx.bob.user.id,
            &[Permission::Admin],
            Some(Utc::now() - Duration::hours(1)),
        )
        .await
        .unwrap();

    match fx.engine.fetch(&fx.bob, fx.inbox_a, "1:*").await {
        Err(EngineError::NotFound) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
    let namespace = fx.engine.namespace(&fx.bob).await.unwrap();
    assert!(namespace.entry("Shared/alice@a.com/INBOX").is_none());
}

#[tokio::test]
async fn namespace_modes_project_the_same_folders_differently() {
    let fx = fixture().await;

    let separated = fx.engine.namespace(&fx.alice).await.unwrap();
    assert!(separated.entry("INBOX").is_some());
    assert!(separated.entry("b.com/INBOX").is_some());

    fx.engine
        .set_namespace_mode(&fx.alice, NamespaceMode::Unified)
        .await
        .unwrap();
    let alice = fx
        .engine
        .login("alice@a.com", "secret", "198.51.100.7")
        .await
        .unwrap();
    let unified = fx.engine.namespace(&alice).await.unwrap();

    let inbox = unified.entry("INBOX").expect("merged INBOX");
    assert_eq!(inbox.targets.len(), 2);
    assert!(unified.entry("b.com/INBOX").is_none());
}

#[tokio::test]
async fn shared_mailboxes_appear_under_the_fixed_shared_root() {
    let fx = fixture().await;
    let store = fx.engine.store().clone();
    store
        .grant_access(fx.mailbox_a, fx.bob.user.id, &[Permission::Read], None)
        .await
        .unwrap();

    let namespace = fx.engine.namespace(&fx.bob).await.unwrap();
    assert!(namespace.entry("Shared/alice@a.com/INBOX").is_some());
    assert_eq!(namespace.shared[0].prefix, "Shared/");
}

#[tokio::test]
async fn flag_update_is_idempotent_but_modseq_advances() {
    let fx = fixture().await;
    deliver_n(&fx, 1).await;

    let msg = fx.engine.fetch(&fx.alice, fx.inbox_a, "1").await.unwrap().remove(0);
    let seen = vec!["\\Seen".to_string()];

    let first = fx
        .engine
        .update_flags(&fx.alice, msg.id, &seen, FlagMode::Add)
        .await
        .unwrap();
    let after_first = fx.engine.fetch(&fx.alice, fx.inbox_a, "1").await.unwrap().remove(0);

    let second = fx
        .engine
        .update_flags(&fx.alice, msg.id, &seen, FlagMode::Add)
        .await
        .unwrap();
    let after_second = fx.engine.fetch(&fx.alice, fx.inbox_a, "1").await.unwrap().remove(0);

    assert_eq!(after_first.flags, after_second.flags);
    assert!(second > first);

    let status = fx
        .engine
        .select_folder(&fx.alice, fx.mailbox_a, "INBOX")
        .await
        .unwrap();
    assert_eq!(status.unseen_count, 0);
}

#[tokio::test]
async fn resume_sync_detects_uidvalidity_conflict_and_honors_modseq_floor() {
    let fx = fixture().await;
    deliver_n(&fx, 2).await;

    let status = fx
        .engine
        .select_folder(&fx.alice, fx.mailbox_a, "INBOX")
        .await
        .unwrap();

    // No changes past the current watermark.
    let quiet = fx
        .engine
        .resume_sync(&fx.alice, fx.inbox_a, status.uid_validity, status.highest_modseq)
        .await
        .unwrap();
    assert!(quiet.is_empty());

    let msg = fx.engine.fetch(&fx.alice, fx.inbox_a, "1").await.unwrap().remove(0);
    fx.engine
        .update_flags(&fx.alice, msg.id, &["\\Seen".to_string()], FlagMode::Add)
        .await
        .unwrap();
    let changed = fx
        .engine
        .resume_sync(&fx.alice, fx.inbox_a, status.uid_validity, status.highest_modseq)
        .await
        .unwrap();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].uid, 1);

    match fx
        .engine
        .resume_sync(&fx.alice, fx.inbox_a, status.uid_validity + 1, 0)
        .await
    {
        Err(EngineError::Conflict { expected, actual }) => {
            assert_eq!(expected, status.uid_validity + 1);
            assert_eq!(actual, status.uid_validity);
        }
        other => panic!("expected Conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_operations_still_leave_an_audit_row() {
    let fx = fixture().await;
    deliver_n(&fx, 1).await;
    let store = fx.engine.store().clone();

    // Bob has no grant at all; the copy fails as NotFound.
    let result = fx
        .engine
        .copy_messages(&fx.bob, fx.inbox_a, fx.archive_a, &[1])
        .await;
    assert!(matches!(result, Err(EngineError::NotFound)));

    let entries = store.audit_entries_for(fx.bob.user.id, 10).await.unwrap();
    let copy_entry = entries
        .iter()
        .find(|entry| entry.action == "copy")
        .expect("audit row for the failed copy");
    assert!(!copy_entry.success);
    assert_eq!(copy_entry.uids, vec![1]);
    assert_eq!(copy_entry.remote_addr, "198.51.100.8");
}

#[tokio::test]
async fn recompute_corrects_manufactured_counter_drift() {
    let fx = fixture().await;
    deliver_n(&fx, 3).await;
    let store = fx.engine.store().clone();

    // Manufacture drift by deleting rows underneath the counters.
    let mut tx = store.begin().await.unwrap();
    Store::delete_by_uids_tx(&mut tx, fx.inbox_a, &[1, 2]).await.unwrap();
    tx.commit().await.unwrap();

    let drifted = fx
        .engine
        .select_folder(&fx.alice, fx.mailbox_a, "INBOX")
        .await
        .unwrap();
    assert_eq!(drifted.message_count, 3);

    let repaired = fx.engine.recompute_folder(&fx.alice, fx.inbox_a).await.unwrap();
    assert_eq!(repaired.message_count, 1);
    assert_eq!(repaired.unseen_count, 1);
}

#[tokio::test]
async fn quota_is_reported_per_mailbox() {
    let fx = fixture().await;
    deliver_n(&fx, 2).await;
    let store = fx.engine.store().clone();
    store.set_quota(fx.mailbox_a, 1000).await.unwrap();

    let quota = fx.engine.get_quota(&fx.alice, fx.mailbox_a).await.unwrap();
    assert_eq!(quota.used_bytes, 200);
    assert_eq!(quota.quota_bytes, 1000);

    // Bob cannot even learn the quota exists.
    match fx.engine.get_quota(&fx.bob, fx.mailbox_a).await {
        Err(EngineError::NotFound) => {}
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_delivery_is_audited_against_the_owner() {
    let fx = fixture().await;
    let store = fx.engine.store().clone();
    store.set_quota(fx.mailbox_a, 50).await.unwrap();

    let result = fx.engine.deliver("alice@a.com", message("too big", 100)).await;
    assert!(matches!(result, Err(EngineError::QuotaExceeded { .. })));

    let entries = store
        .audit_entries_for(fx.alice.user.id, 10)
        .await
        .unwrap();
    let entry = entries
        .iter()
        .find(|entry| entry.action == "deliver")
        .expect("audit row for the failed delivery");
    assert!(!entry.success);
    assert_eq!(entry.detail, "quota-exceeded");
    assert_eq!(entry.remote_addr, "acceptance");
}

#[tokio::test]
async fn audit_trail_is_capped_by_the_configured_limit() {
    let fx = fixture().await;
    deliver_n(&fx, 3).await;

    let capped = Engine::with_store(
        fx.engine.store().clone(),
        EngineConfig {
            cache_refresh_secs: 3600,
            audit_query_limit: 2,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let trail = capped.audit_trail(&fx.alice).await.unwrap();
    assert_eq!(trail.len(), 2);
    assert!(trail.iter().all(|entry| entry.action == "deliver"));
}

#[tokio::test]
async fn delivery_respects_quota_atomically() {
    let fx = fixture().await;
    let store = fx.engine.store().clone();
    store.set_quota(fx.mailbox_a, 150).await.unwrap();

    fx.engine
        .deliver("alice@a.com", message("fits", 100))
        .await
        .unwrap();
    match fx.engine.deliver("alice@a.com", message("too big", 100)).await {
        Err(EngineError::QuotaExceeded { .. }) => {}
        other => panic!("expected QuotaExceeded, got {other:?}"),
    }

    let status = fx
        .engine
        .select_folder(&fx.alice, fx.mailbox_a, "INBOX")
        .await
        .unwrap();
    assert_eq!(status.message_count, 1);
    assert_eq!(status.uid_next, 2);
}
