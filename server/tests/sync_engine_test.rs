//! Integration tests for sync runs against an in-memory directory.

mod common;

use bizsync_engine::{
    ClientFields, ConflictPolicy, ResourceType, SyncDirection, SyncError, SyncOptions,
    SyncOutcome, SyncResult, SyncStatus, SyncWatermark,
};
use bizsync_server::sync::{sync_all, RunRegistry, SyncEngine};
use chrono::{Duration, Utc};
use common::*;

async fn run(engine: &SyncEngine, options: SyncOptions) -> SyncResult {
    match engine.run_sync(ORG, ResourceType::Contacts, options).await {
        Ok(SyncOutcome::Completed(result)) => result,
        other => panic!("expected a completed run, got {:?}", other),
    }
}

fn with_policy(policy: ConflictPolicy) -> SyncOptions {
    SyncOptions {
        full_sync: false,
        conflict_resolution: policy,
    }
}

fn remote_client(name: &str, email: &str) -> ClientFields {
    ClientFields {
        name: name.into(),
        email: Some(email.into()),
        ..Default::default()
    }
}

#[cfg(test)]
mod push_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_second_run_creates_nothing() {
        let store = MemoryStore::new();
        let directory = FakeDirectory::new();
        let an_hour_ago = Utc::now() - Duration::hours(1);
        store.seed(client("Ada Lovelace", "ada@example.com"), an_hour_ago);
        store.seed(client("Grace Hopper", "grace@example.com"), an_hour_ago);
        let engine = engine(&directory, &store);

        let first = run(&engine, SyncOptions::default()).await;
        assert!(first.success);
        assert_eq!(first.created, 2);
        assert_eq!(directory.live_count(), 2);
        assert!(store.entities().iter().all(|e| e.is_linked()));

        let second = run(&engine, SyncOptions::default()).await;
        assert!(second.success);
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 0);
        assert_eq!(directory.calls().creates, 2);
        assert_eq!(directory.live_count(), 2);
        assert_eq!(store.entities().len(), 2);
    }

    #[tokio::test]
    async fn test_one_rejected_record_does_not_stop_the_run() {
        let store = MemoryStore::new();
        let directory = FakeDirectory::new();
        let an_hour_ago = Utc::now() - Duration::hours(1);
        store.seed(client("Ada Lovelace", "ada@example.com"), an_hour_ago);
        let broken = store.seed(client("Broken", "broken@example.com"), an_hour_ago);
        store.seed(client("Grace Hopper", "grace@example.com"), an_hour_ago);
        directory.reject_name("Broken");
        let engine = engine(&directory, &store);

        let result = run(&engine, SyncOptions::default()).await;

        assert!(!result.success);
        assert_eq!(result.created, 2);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].context.contains("Broken"));
        assert!(!store.entity(&broken).is_linked());

        let failures: Vec<_> = store
            .log_entries()
            .into_iter()
            .filter(|e| e.status == SyncStatus::Failed)
            .collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].entity_id.as_deref(), Some(broken.as_str()));
    }

    #[tokio::test]
    async fn test_existing_remote_contact_is_adopted_not_duplicated() {
        let store = MemoryStore::new();
        let directory = FakeDirectory::new();
        directory.put(
            "people/c77",
            remote_client("Ada L.", "ada@example.com"),
            "etag-77",
            Some(Utc::now() - Duration::days(3)),
        );
        let local = store.seed(
            client("Ada Lovelace", "ADA@example.com"),
            Utc::now() - Duration::hours(1),
        );
        let engine = engine(&directory, &store);

        let result = run(&engine, SyncOptions::default()).await;

        assert!(result.success);
        assert_eq!(result.created, 0);
        assert_eq!(directory.calls().creates, 0);
        assert_eq!(directory.live_count(), 1);
        assert_eq!(store.entities().len(), 1);

        let entity = store.entity(&local);
        assert_eq!(entity.remote_id.as_deref(), Some("people/c77"));
        assert_eq!(entity.remote_version_tag.as_deref(), Some("etag-77"));
        assert_eq!(client_fields(&entity.fields).name, "Ada Lovelace");
    }

    #[tokio::test]
    async fn test_stale_tag_on_push_is_a_conflict() {
        let store = MemoryStore::new();
        let directory = FakeDirectory::new();
        let now = Utc::now();
        directory.put(
            "people/c1",
            remote_client("Ada (remote edit)", "ada@example.com"),
            "etag-remote",
            Some(now - Duration::minutes(30)),
        );
        let local = store.seed_linked(
            client("Ada (local edit)", "ada@example.com"),
            "people/c1",
            "etag-old",
            now,
            now - Duration::hours(1),
        );
        let engine = engine(&directory, &store);

        let result = run(&engine, with_policy(ConflictPolicy::LocalWins)).await;

        assert!(result.success);
        // One from the refused push, one from the pull keeping local fields.
        assert_eq!(result.conflicts, 2);
        assert_eq!(result.updated, 0);
        assert_eq!(
            directory.fields("people/c1").unwrap().name,
            "Ada (remote edit)"
        );

        let entity = store.entity(&local);
        assert_eq!(client_fields(&entity.fields).name, "Ada (local edit)");
        assert_eq!(entity.remote_version_tag.as_deref(), Some("etag-remote"));
        assert!(entity.needs_push());

        let push_conflicts = store
            .log_entries()
            .into_iter()
            .filter(|e| e.direction == SyncDirection::ToRemote && e.status == SyncStatus::Conflict)
            .count();
        assert_eq!(push_conflicts, 1);

        // The advanced tag lets the next run push the kept local fields.
        let next = run(&engine, with_policy(ConflictPolicy::LocalWins)).await;
        assert!(next.success);
        assert_eq!(next.updated, 1);
        assert_eq!(next.conflicts, 0);
        assert_eq!(
            directory.fields("people/c1").unwrap().name,
            "Ada (local edit)"
        );
        assert!(!store.entity(&local).needs_push());
    }

    #[tokio::test]
    async fn test_permission_refused_on_one_record_does_not_stop_the_run() {
        let store = MemoryStore::new();
        let directory = FakeDirectory::new();
        let now = Utc::now();
        directory.put("people/c1", remote_client("Ada", "ada@example.com"), "etag-1", None);
        directory.put("people/c2", remote_client("Grace", "grace@example.com"), "etag-2", None);
        let locked = store.seed_linked(
            client("Ada Lovelace", "ada@example.com"),
            "people/c1",
            "etag-1",
            now,
            now - Duration::hours(1),
        );
        store.seed_linked(
            client("Grace Hopper", "grace@example.com"),
            "people/c2",
            "etag-2",
            now,
            now - Duration::hours(1),
        );
        directory.forbid("people/c1");
        let engine = engine(&directory, &store);

        let result = run(&engine, SyncOptions::default()).await;

        assert!(!result.success);
        assert_eq!(result.updated, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("sufficient permissions"));
        assert_eq!(directory.fields("people/c2").unwrap().name, "Grace Hopper");
        assert_eq!(directory.fields("people/c1").unwrap().name, "Ada");
        assert!(store.entity(&locked).needs_push());
        assert!(store.watermark(ResourceType::Contacts).is_some());
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let store = MemoryStore::new();
        let directory = FakeDirectory::new();
        store.seed(
            client("Ada Lovelace", "ada@example.com"),
            Utc::now() - Duration::hours(1),
        );
        directory.fail_creates_transiently(2);
        let engine = engine(&directory, &store);

        let result = run(&engine, SyncOptions::default()).await;

        assert!(result.success);
        assert_eq!(result.created, 1);
        assert_eq!(result.retries, 2);
        assert_eq!(directory.calls().creates, 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_recorded_per_record() {
        let store = MemoryStore::new();
        let directory = FakeDirectory::new();
        store.seed(
            client("Ada Lovelace", "ada@example.com"),
            Utc::now() - Duration::hours(1),
        );
        directory.fail_creates_transiently(10);
        let engine = engine(&directory, &store);

        let result = run(&engine, SyncOptions::default()).await;

        assert!(!result.success);
        assert_eq!(result.created, 0);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(directory.calls().creates, 3);
    }
}

#[cfg(test)]
mod pull_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// A linked entity edited locally after its remote counterpart changed.
    fn diverged(store: &MemoryStore, directory: &FakeDirectory, remote_age: Duration) -> String {
        let now = Utc::now();
        directory.put(
            "people/c1",
            remote_client("Ada (remote edit)", "ada@example.com"),
            "etag-remote",
            Some(now - remote_age),
        );
        store.seed_linked(
            client("Ada (local edit)", "ada@example.com"),
            "people/c1",
            "etag-old",
            now - Duration::minutes(10),
            now - Duration::minutes(10),
        )
    }

    #[tokio::test]
    async fn test_newest_wins_keeps_newer_local_fields() {
        let store = MemoryStore::new();
        let directory = FakeDirectory::new();
        let local = diverged(&store, &directory, Duration::hours(2));
        let engine = engine(&directory, &store);

        let result = run(&engine, with_policy(ConflictPolicy::NewestWins)).await;

        assert_eq!(result.conflicts, 1);
        assert_eq!(result.updated, 0);
        let entity = store.entity(&local);
        assert_eq!(client_fields(&entity.fields).name, "Ada (local edit)");
        assert_eq!(entity.remote_version_tag.as_deref(), Some("etag-remote"));

        let entry = store
            .log_entries()
            .into_iter()
            .find(|e| e.status == SyncStatus::Conflict)
            .unwrap();
        assert_eq!(entry.conflict_resolution.as_deref(), Some("local_wins"));
        assert!(entry.local_snapshot.is_some());
        assert!(entry.remote_snapshot.is_some());
    }

    #[tokio::test]
    async fn test_newest_wins_takes_newer_remote_fields() {
        let store = MemoryStore::new();
        let directory = FakeDirectory::new();
        let local = diverged(&store, &directory, Duration::minutes(1));
        let engine = engine(&directory, &store);

        let result = run(&engine, with_policy(ConflictPolicy::NewestWins)).await;

        assert_eq!(result.conflicts, 0);
        assert_eq!(result.updated, 1);
        let entity = store.entity(&local);
        assert_eq!(client_fields(&entity.fields).name, "Ada (remote edit)");
    }

    #[tokio::test]
    async fn test_local_wins_never_overwrites() {
        let store = MemoryStore::new();
        let directory = FakeDirectory::new();
        let local = diverged(&store, &directory, Duration::minutes(1));
        let engine = engine(&directory, &store);

        let result = run(&engine, with_policy(ConflictPolicy::LocalWins)).await;

        assert_eq!(result.conflicts, 1);
        let entity = store.entity(&local);
        assert_eq!(client_fields(&entity.fields).name, "Ada (local edit)");
        assert_eq!(entity.remote_version_tag.as_deref(), Some("etag-remote"));
    }

    #[tokio::test]
    async fn test_kept_local_fields_reach_the_remote_on_the_next_run() {
        let store = MemoryStore::new();
        let directory = FakeDirectory::new();
        let local = diverged(&store, &directory, Duration::minutes(1));
        let engine = engine(&directory, &store);

        let first = run(&engine, with_policy(ConflictPolicy::LocalWins)).await;
        assert_eq!(first.conflicts, 1);
        assert_eq!(directory.calls().updates, 0);
        assert!(store.entity(&local).needs_push());

        let second = run(&engine, with_policy(ConflictPolicy::LocalWins)).await;
        assert!(second.success);
        assert_eq!(second.updated, 1);
        assert_eq!(second.conflicts, 0);
        assert_eq!(directory.calls().updates, 1);
        assert_eq!(
            directory.fields("people/c1").unwrap().name,
            "Ada (local edit)"
        );

        let third = run(&engine, with_policy(ConflictPolicy::LocalWins)).await;
        assert_eq!(third.updated, 0);
        assert_eq!(third.conflicts, 0);
        assert_eq!(directory.calls().updates, 1);
        let entity = store.entity(&local);
        assert_eq!(entity.remote_version_tag, directory.tag("people/c1"));
        assert!(!entity.needs_push());
    }

    #[tokio::test]
    async fn test_remote_wins_always_overwrites() {
        let store = MemoryStore::new();
        let directory = FakeDirectory::new();
        let local = diverged(&store, &directory, Duration::hours(2));
        let engine = engine(&directory, &store);

        let result = run(&engine, with_policy(ConflictPolicy::RemoteWins)).await;

        assert_eq!(result.conflicts, 0);
        assert_eq!(result.updated, 1);
        let entity = store.entity(&local);
        assert_eq!(client_fields(&entity.fields).name, "Ada (remote edit)");
        assert_eq!(entity.remote_version_tag.as_deref(), Some("etag-remote"));

        let entry = store
            .log_entries()
            .into_iter()
            .find(|e| e.direction == SyncDirection::FromRemote && e.entity_id.is_some())
            .unwrap();
        assert_eq!(entry.conflict_resolution.as_deref(), Some("remote_wins"));
    }

    #[tokio::test]
    async fn test_unknown_remote_contacts_become_local_entities() {
        let store = MemoryStore::new();
        let directory = FakeDirectory::new();
        directory.put("people/c1", remote_client("Ada", "ada@example.com"), "etag-1", None);
        directory.put("people/c2", remote_client("Grace", "grace@example.com"), "etag-2", None);
        let engine = engine(&directory, &store);

        let result = run(&engine, SyncOptions::default()).await;

        assert!(result.success);
        assert!(result.full_sync);
        assert_eq!(result.created, 2);
        let entities = store.entities();
        assert_eq!(entities.len(), 2);
        assert!(entities.iter().all(|e| !e.needs_push()));
    }

    #[tokio::test]
    async fn test_failed_create_is_settled_by_identity_link_on_pull() {
        let store = MemoryStore::new();
        let directory = FakeDirectory::new();
        directory.put("people/c5", remote_client("Ada L.", "ada@example.com"), "etag-5", None);
        directory.lag_search();
        directory.reject_name("Ada Lovelace");
        let local = store.seed(
            client("Ada Lovelace", "ada@example.com"),
            Utc::now() - Duration::hours(1),
        );
        let engine = engine(&directory, &store);

        let result = run(&engine, SyncOptions::default()).await;

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.created, 0);
        assert_eq!(result.updated, 1);
        assert_eq!(store.entities().len(), 1);

        let entity = store.entity(&local);
        assert_eq!(entity.remote_id.as_deref(), Some("people/c5"));
        assert_eq!(client_fields(&entity.fields).name, "Ada Lovelace");

        let linked = store
            .log_entries()
            .into_iter()
            .filter(|e| e.conflict_resolution.as_deref() == Some("linked"))
            .count();
        assert_eq!(linked, 1);
    }

    #[tokio::test]
    async fn test_remote_deletions_never_delete_locally() {
        let store = MemoryStore::new();
        let directory = FakeDirectory::new();
        directory.put("people/c1", remote_client("Ada", "ada@example.com"), "etag-1", None);
        let engine = engine(&directory, &store);
        run(&engine, SyncOptions::default()).await;

        directory.remove("people/c1");
        let result = run(&engine, SyncOptions::default()).await;

        assert!(result.success);
        assert_eq!(result.deleted, 0);
        assert_eq!(store.entities().len(), 1);
        let skipped = store
            .log_entries()
            .into_iter()
            .filter(|e| e.conflict_resolution.as_deref() == Some("remote_deleted"))
            .count();
        assert_eq!(skipped, 1);
    }

    #[tokio::test]
    async fn test_all_pages_are_pulled() {
        let store = MemoryStore::new();
        let directory = FakeDirectory::new();
        for i in 0..7 {
            directory.put(
                &format!("people/c{}", i),
                remote_client(&format!("Contact {}", i), &format!("c{}@example.com", i)),
                &format!("etag-{}", i),
                None,
            );
        }
        directory.limit_pages(3);
        let engine = engine(&directory, &store);

        let result = run(&engine, SyncOptions::default()).await;

        assert_eq!(result.created, 7);
        assert_eq!(directory.calls().lists, 3);
        assert!(store.watermark(ResourceType::Contacts).unwrap().sync_token.is_some());
    }
}

#[cfg(test)]
mod watermark_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_full_run_then_incremental_run() {
        let store = MemoryStore::new();
        let directory = FakeDirectory::new();
        directory.put("people/c1", remote_client("Ada", "ada@example.com"), "etag-1", None);
        directory.put("people/c2", remote_client("Grace", "grace@example.com"), "etag-2", None);
        let engine = engine(&directory, &store);

        let first = run(&engine, SyncOptions::default()).await;
        assert!(first.full_sync);
        let after_first = store.watermark(ResourceType::Contacts).unwrap();
        assert_eq!(after_first.sync_token.as_deref(), Some("2"));
        assert!(after_first.last_full_sync_at.is_some());

        directory.put("people/c3", remote_client("Alan", "alan@example.com"), "etag-3", None);
        let second = run(&engine, SyncOptions::default()).await;

        assert!(!second.full_sync);
        assert_eq!(second.created, 1);
        let after_second = store.watermark(ResourceType::Contacts).unwrap();
        assert_eq!(after_second.sync_token.as_deref(), Some("3"));
        assert_eq!(after_second.last_full_sync_at, after_first.last_full_sync_at);
        assert!(after_second.last_incremental_sync_at >= after_first.last_incremental_sync_at);

        // Only the new contact was listed: no second "unchanged" entry for c1 or c2.
        let unchanged = store
            .log_entries()
            .into_iter()
            .filter(|e| e.conflict_resolution.as_deref() == Some("unchanged"))
            .count();
        assert_eq!(unchanged, 0);
    }

    #[tokio::test]
    async fn test_requested_full_sync_ignores_stored_token() {
        let store = MemoryStore::new();
        let directory = FakeDirectory::new();
        directory.put("people/c1", remote_client("Ada", "ada@example.com"), "etag-1", None);
        let engine = engine(&directory, &store);
        run(&engine, SyncOptions::default()).await;

        let result = run(
            &engine,
            SyncOptions {
                full_sync: true,
                ..Default::default()
            },
        )
        .await;

        assert!(result.full_sync);
        assert_eq!(result.created, 0);
        let unchanged = store
            .log_entries()
            .into_iter()
            .filter(|e| e.conflict_resolution.as_deref() == Some("unchanged"))
            .count();
        assert_eq!(unchanged, 1);
    }

    #[tokio::test]
    async fn test_expired_token_falls_back_to_full_listing() {
        let store = MemoryStore::new();
        let directory = FakeDirectory::new();
        directory.put("people/c1", remote_client("Ada", "ada@example.com"), "etag-1", None);
        directory.put("people/c2", remote_client("Grace", "grace@example.com"), "etag-2", None);
        store.put_watermark(SyncWatermark {
            org_id: ORG.into(),
            resource: ResourceType::Contacts,
            sync_token: Some("1".into()),
            last_full_sync_at: None,
            last_incremental_sync_at: Utc::now() - Duration::days(30),
        });
        directory.expire_token("1");
        let engine = engine(&directory, &store);

        let result = run(&engine, SyncOptions::default()).await;

        assert!(result.success);
        assert!(result.full_sync);
        // A full listing sees both contacts, not just the one changed after step 1.
        assert_eq!(result.created, 2);
        let watermark = store.watermark(ResourceType::Contacts).unwrap();
        assert_eq!(watermark.sync_token.as_deref(), Some("2"));
        assert!(watermark.last_full_sync_at.is_some());
    }

    #[tokio::test]
    async fn test_watermark_resumes_after_restart() {
        let store = MemoryStore::new();
        let directory = FakeDirectory::new();
        directory.put("people/c1", remote_client("Ada", "ada@example.com"), "etag-1", None);
        run(&engine(&directory, &store), SyncOptions::default()).await;

        // A fresh engine over the same stores picks up the saved token.
        let restarted = engine(&directory, &store);
        let result = run(&restarted, SyncOptions::default()).await;

        assert!(!result.full_sync);
        assert_eq!(result.created, 0);
    }
}

#[cfg(test)]
mod failure_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_unconfigured_directory_skips_without_side_effects() {
        let store = MemoryStore::new();
        let directory = FakeDirectory::new();
        let local = store.seed(
            client("Ada Lovelace", "ada@example.com"),
            Utc::now() - Duration::hours(1),
        );
        let engine = engine_with(&directory, &store, false);

        let outcome = engine
            .run_sync(ORG, ResourceType::Contacts, SyncOptions::default())
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            SyncOutcome::Skipped {
                resource: ResourceType::Contacts,
                ..
            }
        ));
        assert!(outcome.result().is_none());
        assert!(!store.entity(&local).is_linked());
        assert!(store.watermark(ResourceType::Contacts).is_none());
        assert!(store.log_entries().is_empty());
        assert_eq!(directory.calls(), Calls::default());
    }

    #[tokio::test]
    async fn test_auth_failure_aborts_without_watermark() {
        let store = MemoryStore::new();
        let directory = FakeDirectory::new();
        store.seed(
            client("Ada Lovelace", "ada@example.com"),
            Utc::now() - Duration::hours(1),
        );
        directory.revoke_auth();
        let engine = engine(&directory, &store);

        let outcome = engine
            .run_sync(ORG, ResourceType::Contacts, SyncOptions::default())
            .await;

        assert!(matches!(outcome, Err(SyncError::AuthFailure(_))));
        assert!(store.watermark(ResourceType::Contacts).is_none());
        assert_eq!(directory.calls().creates, 0);
    }

    #[tokio::test]
    async fn test_local_store_outage_is_collected() {
        let store = MemoryStore::new();
        let directory = FakeDirectory::new();
        store.fail_listing(true);
        let engine = engine(&directory, &store);

        let result = run(&engine, SyncOptions::default()).await;

        assert!(!result.success);
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors.iter().all(|e| e.context == "local store"));
        // No pull happened, so the full-sync time stays unset.
        let watermark = store.watermark(ResourceType::Contacts).unwrap();
        assert!(watermark.last_full_sync_at.is_none());
    }
}

#[cfg(test)]
mod scheduler_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_busy_organization_is_skipped() {
        let store = MemoryStore::new();
        let directory = FakeDirectory::new();
        store.seed(
            client("Ada Lovelace", "ada@example.com"),
            Utc::now() - Duration::hours(1),
        );
        let engine = engine(&directory, &store);
        let runs = RunRegistry::new();
        let _held = runs.try_acquire("org-busy", ResourceType::Contacts).unwrap();

        let orgs = vec![ORG.to_string(), "org-busy".to_string()];
        let reports = sync_all(&engine, &runs, &orgs, &[ResourceType::Contacts]).await;

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].org_id, ORG);
        assert_eq!(reports[0].completed, vec![ResourceType::Contacts]);
        assert!(!reports[0].busy);
        assert!(reports[1].busy);
        assert!(reports[1].completed.is_empty());
        assert!(!runs.is_running(ORG));
    }

    #[tokio::test]
    async fn test_auth_failure_ends_the_organization_pass() {
        let store = MemoryStore::new();
        let directory = FakeDirectory::new();
        directory.revoke_auth();
        let engine = engine(&directory, &store);
        let runs = RunRegistry::new();

        let reports = sync_all(
            &engine,
            &runs,
            &[ORG.to_string()],
            &[ResourceType::Contacts, ResourceType::Tasks],
        )
        .await;

        assert_eq!(reports[0].failed, vec![ResourceType::Contacts]);
        assert!(reports[0].completed.is_empty());
    }
}
