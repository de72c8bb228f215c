//! The sync orchestrator: one push phase, then one pull phase.
//!
//! Per-record failures are collected and the run carries on. Only an
//! authentication failure aborts a run, in which case no watermark is
//! written. A run finds nothing to do when the directory is not configured.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use bizsync_engine::{
    plan_push, ConflictResolution, LocalEntity, PullDecision, PushAction, Reconciler, RemoteId,
    RemoteLink, RemoteRecord, ResourceType, Result, RunPlan, SkipReason, SyncDirection,
    SyncError, SyncLogEntry, SyncOptions, SyncOutcome, SyncStatus, SyncTally,
};
use chrono::Utc;

use super::retry::{with_retry, RetryPolicy, RetryStats};
use crate::adapters::{AdapterProvider, ListRequest, RemoteAdapter};
use crate::store::{LocalStore, SyncLogSink, WatermarkStore};

/// Number of error messages included in a run's log summary.
const SUMMARY_SAMPLE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub page_size: u32,
    pub retry: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            page_size: 200,
            retry: RetryPolicy::default(),
        }
    }
}

pub struct SyncEngine {
    adapters: Arc<dyn AdapterProvider>,
    store: Arc<dyn LocalStore>,
    watermarks: Arc<dyn WatermarkStore>,
    log: Arc<dyn SyncLogSink>,
    settings: EngineSettings,
}

impl SyncEngine {
    pub fn new(
        adapters: Arc<dyn AdapterProvider>,
        store: Arc<dyn LocalStore>,
        watermarks: Arc<dyn WatermarkStore>,
        log: Arc<dyn SyncLogSink>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            adapters,
            store,
            watermarks,
            log,
            settings,
        }
    }

    pub fn is_available(&self) -> bool {
        self.adapters.is_available()
    }

    /// Run one push-then-pull cycle for an organization and resource type.
    #[tracing::instrument(skip(self, options), fields(full_sync = options.full_sync))]
    pub async fn run_sync(
        &self,
        org_id: &str,
        resource: ResourceType,
        options: SyncOptions,
    ) -> Result<SyncOutcome> {
        if !self.adapters.is_available() {
            tracing::info!("directory sync not configured, skipping run");
            return Ok(skipped(resource));
        }

        let adapter = match self.adapters.adapter(resource).await {
            Ok(adapter) => adapter,
            Err(SyncError::Unavailable) => return Ok(skipped(resource)),
            Err(error) => {
                tracing::error!(error = %error, "could not obtain directory client");
                return Err(error);
            }
        };

        let started_at = Utc::now();
        let mut run = Run {
            org_id,
            resource,
            adapter: adapter.as_ref(),
            store: self.store.as_ref(),
            log: self.log.as_ref(),
            reconciler: Reconciler::new(options.conflict_resolution),
            settings: self.settings,
            stats: RetryStats::default(),
            tally: SyncTally::new(),
        };

        let stored = match self.watermarks.load(org_id, resource).await {
            Ok(stored) => stored,
            Err(error) => {
                tracing::warn!(error = %error, "could not load watermark, listing everything");
                run.tally.error("watermark", &error);
                None
            }
        };
        let mut plan = RunPlan::resolve(stored, options.full_sync);
        tracing::info!(
            policy = options.conflict_resolution.as_str(),
            full_sync = plan.full_sync,
            "starting sync run"
        );

        run.push().await?;
        let pull = run.pull(&mut plan).await?;

        let finished_at = Utc::now();
        let watermark = plan.advance(
            org_id,
            resource,
            pull.fresh_token,
            pull.completed,
            finished_at,
        );
        if let Err(error) = self.watermarks.save(&watermark).await {
            tracing::error!(error = %error, "could not persist watermark");
            run.tally.error("watermark", &error);
        }

        let retries = run.stats.retries();
        let result = run
            .tally
            .finish(resource, plan.full_sync, retries, started_at, finished_at);
        if result.success {
            tracing::info!(summary = %result.summary(0), retries, "sync run finished");
        } else {
            tracing::warn!(
                summary = %result.summary(SUMMARY_SAMPLE),
                retries,
                "sync run finished with errors"
            );
        }

        Ok(SyncOutcome::Completed(result))
    }
}

fn skipped(resource: ResourceType) -> SyncOutcome {
    SyncOutcome::Skipped {
        resource,
        reason: SyncError::Unavailable.to_string(),
    }
}

/// Return run-fatal errors, hand back everything else for recording.
fn escalate(error: SyncError) -> Result<SyncError> {
    if error.is_fatal_for_run() {
        tracing::error!(error = %error, "aborting sync run");
        Err(error)
    } else {
        Ok(error)
    }
}

#[derive(Debug, Default)]
struct PullProgress {
    fresh_token: Option<String>,
    completed: bool,
}

/// State of one run in flight.
struct Run<'a> {
    org_id: &'a str,
    resource: ResourceType,
    adapter: &'a dyn RemoteAdapter,
    store: &'a dyn LocalStore,
    log: &'a dyn SyncLogSink,
    reconciler: Reconciler,
    settings: EngineSettings,
    stats: RetryStats,
    tally: SyncTally,
}

impl<'a> Run<'a> {
    async fn retry<T, F, Fut>(&self, label: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        with_retry(&self.settings.retry, &self.stats, label, op).await
    }

    fn entry(&self, direction: SyncDirection, status: SyncStatus) -> SyncLogEntry {
        SyncLogEntry::new(self.org_id, self.resource, direction, status, Utc::now())
    }

    async fn append(&self, entry: SyncLogEntry) {
        if let Err(error) = self.log.append(&entry).await {
            tracing::warn!(error = %error, "could not write sync log entry");
        }
    }

    async fn fail_push(&mut self, entity: &LocalEntity, error: SyncError) {
        tracing::warn!(entity = %entity.context(), error = %error, "push failed");
        self.tally.error(entity.context(), &error);
        let entry = self
            .entry(SyncDirection::ToRemote, SyncStatus::Failed)
            .with_local(entity)
            .with_error(error.to_string());
        self.append(entry).await;
    }

    async fn fail_pull(&mut self, record: &RemoteRecord, label: &str, error: SyncError) {
        tracing::warn!(remote_id = %record.remote_id, error = %error, "pull failed");
        let context = if label.is_empty() {
            record.remote_id.clone()
        } else {
            format!("{} ({})", label, record.remote_id)
        };
        self.tally.error(context, &error);
        let entry = self
            .entry(SyncDirection::FromRemote, SyncStatus::Failed)
            .with_remote(record)
            .with_error(error.to_string());
        self.append(entry).await;
    }

    async fn push(&mut self) -> Result<()> {
        let entities = match self.store.list_entities(self.org_id, self.resource).await {
            Ok(entities) => entities,
            Err(error) => {
                tracing::error!(error = %error, "could not list local entities for push");
                self.tally.error("local store", &error);
                return Ok(());
            }
        };
        let mut linked: HashSet<RemoteId> =
            entities.iter().filter_map(|e| e.remote_id.clone()).collect();

        for entity in &entities {
            match plan_push(entity) {
                PushAction::Skip => {}
                PushAction::Create => self.push_create(entity, &mut linked).await?,
                PushAction::Update {
                    remote_id,
                    expected_tag,
                } => {
                    self.push_update(entity, &remote_id, expected_tag.as_deref())
                        .await?
                }
            }
        }
        Ok(())
    }

    async fn push_create(
        &mut self,
        entity: &LocalEntity,
        linked: &mut HashSet<RemoteId>,
    ) -> Result<()> {
        let adapter = self.adapter;

        // Adopt a remote record with the same identity instead of duplicating it.
        if let Some(identity) = entity.fields.identity() {
            let existing = self
                .retry("find_by_exact_field", || adapter.find_by_exact_field(&identity))
                .await;
            match existing {
                Ok(Some(record)) if !linked.contains(&record.remote_id) => {
                    return self.adopt(entity, record, linked).await;
                }
                Ok(_) => {}
                Err(error) => {
                    let error = escalate(error)?;
                    self.fail_push(entity, error).await;
                    return Ok(());
                }
            }
        }

        let created = match self.retry("create", || adapter.create(&entity.fields)).await {
            Ok(created) => created,
            Err(error) => {
                let error = escalate(error)?;
                self.fail_push(entity, error).await;
                return Ok(());
            }
        };

        let link = RemoteLink::new(created.remote_id, created.version_tag);
        if let Err(error) = self.store.link_remote(&entity.id, &link, Utc::now()).await {
            self.fail_push(entity, error).await;
            return Ok(());
        }

        tracing::debug!(
            entity = %entity.display_name(),
            remote_id = %link.remote_id,
            "created remote record"
        );
        linked.insert(link.remote_id.clone());
        self.tally.created();
        let entry = self
            .entry(SyncDirection::ToRemote, SyncStatus::Success)
            .with_local(entity)
            .with_remote_id(link.remote_id)
            .with_note("created");
        self.append(entry).await;
        Ok(())
    }

    async fn adopt(
        &mut self,
        entity: &LocalEntity,
        record: RemoteRecord,
        linked: &mut HashSet<RemoteId>,
    ) -> Result<()> {
        if let Err(error) = self.store.link_remote(&entity.id, &record.link(), Utc::now()).await {
            self.fail_push(entity, error).await;
            return Ok(());
        }

        tracing::debug!(
            entity = %entity.display_name(),
            remote_id = %record.remote_id,
            "linked to existing remote record"
        );
        linked.insert(record.remote_id.clone());
        self.tally.updated();
        let entry = self
            .entry(SyncDirection::ToRemote, SyncStatus::Success)
            .with_local(entity)
            .with_remote(&record)
            .with_note("linked");
        self.append(entry).await;
        Ok(())
    }

    async fn push_update(
        &mut self,
        entity: &LocalEntity,
        remote_id: &str,
        expected_tag: Option<&str>,
    ) -> Result<()> {
        let adapter = self.adapter;
        let outcome = self
            .retry("update", || adapter.update(remote_id, &entity.fields, expected_tag))
            .await;

        let version_tag = match outcome {
            Ok(tag) => tag,
            Err(SyncError::VersionConflict(message)) => {
                // Local state stays as it is; the pull phase settles the divergence.
                tracing::info!(entity = %entity.context(), "remote changed since last sync");
                self.tally.conflict();
                let entry = self
                    .entry(SyncDirection::ToRemote, SyncStatus::Conflict)
                    .with_local(entity)
                    .with_error(message);
                self.append(entry).await;
                return Ok(());
            }
            Err(error) => {
                let error = escalate(error)?;
                self.fail_push(entity, error).await;
                return Ok(());
            }
        };

        let link = RemoteLink::new(remote_id, version_tag);
        if let Err(error) = self.store.link_remote(&entity.id, &link, Utc::now()).await {
            self.fail_push(entity, error).await;
            return Ok(());
        }

        self.tally.updated();
        let entry = self
            .entry(SyncDirection::ToRemote, SyncStatus::Success)
            .with_local(entity)
            .with_note("updated");
        self.append(entry).await;
        Ok(())
    }

    async fn pull(&mut self, plan: &mut RunPlan) -> Result<PullProgress> {
        // Re-read so links made by the push phase are visible.
        let entities = match self.store.list_entities(self.org_id, self.resource).await {
            Ok(entities) => entities,
            Err(error) => {
                tracing::error!(error = %error, "could not list local entities for pull");
                self.tally.error("local store", &error);
                return Ok(PullProgress::default());
            }
        };
        let mut by_remote: HashMap<RemoteId, LocalEntity> = entities
            .into_iter()
            .filter_map(|e| e.remote_id.clone().map(|id| (id, e)))
            .collect();

        let adapter = self.adapter;
        let page_size = self.settings.page_size;
        let mut page_token: Option<String> = None;
        let mut fresh_token: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let request = ListRequest {
                page_size,
                page_token: page_token.as_deref(),
                change_token: plan.change_token.as_deref(),
            };
            let page = match self.retry("list", || adapter.list(request)).await {
                Ok(page) => page,
                Err(error) => {
                    let error = escalate(error)?;
                    tracing::warn!(error = %error, pages, "remote listing failed");
                    self.tally.error("remote listing", &error);
                    // A partial high-water mark could skip records on unread pages.
                    return Ok(PullProgress {
                        fresh_token: None,
                        completed: false,
                    });
                }
            };
            pages += 1;

            if page.token_reset && plan.change_token.is_some() {
                tracing::warn!("change token rejected, continuing with a full listing");
                plan.fall_back_to_full();
            }

            for record in &page.records {
                self.pull_record(record, &mut by_remote).await?;
            }

            if let Some(token) = page.next_change_token {
                fresh_token = Some(token);
            }
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        tracing::debug!(pages, "remote listing complete");
        Ok(PullProgress {
            fresh_token,
            completed: true,
        })
    }

    async fn pull_record(
        &mut self,
        record: &RemoteRecord,
        by_remote: &mut HashMap<RemoteId, LocalEntity>,
    ) -> Result<()> {
        let mapped = self.adapter.to_local(record);
        let linked = by_remote.get(&record.remote_id).cloned();

        let identity_match = match (&linked, record.deleted, mapped.identity()) {
            (None, false, Some(identity)) => {
                match self
                    .store
                    .find_by_identity(self.org_id, self.resource, &identity)
                    .await
                {
                    Ok(candidate) => candidate,
                    Err(error) => {
                        self.fail_pull(record, mapped.display_name(), error).await;
                        return Ok(());
                    }
                }
            }
            _ => None,
        };

        let decision = self
            .reconciler
            .decide(record, linked.as_ref(), identity_match.as_ref());
        let now = Utc::now();

        match decision {
            PullDecision::Skip(reason) => {
                let note = match reason {
                    SkipReason::Unchanged => "unchanged",
                    SkipReason::RemoteDeleted => "remote_deleted",
                };
                let mut entry = self
                    .entry(SyncDirection::FromRemote, SyncStatus::Success)
                    .with_remote(record)
                    .with_note(note);
                if let Some(local) = &linked {
                    entry = entry.with_local(local);
                }
                self.append(entry).await;
            }

            PullDecision::Overwrite {
                entity_id,
                resolution,
            } => {
                if let Err(error) = self
                    .store
                    .update_from_remote(&entity_id, &mapped, &record.version_tag, now)
                    .await
                {
                    self.fail_pull(record, mapped.display_name(), error).await;
                    return Ok(());
                }

                self.tally.updated();
                let mut entry = self
                    .entry(SyncDirection::FromRemote, SyncStatus::Success)
                    .with_remote(record)
                    .with_resolution(resolution);
                if let Some(local) = by_remote.get_mut(&record.remote_id) {
                    entry = entry.with_local(local);
                    local.fields = mapped;
                    local.remote_version_tag = Some(record.version_tag.clone());
                    local.updated_at = now;
                    local.last_synced_at = Some(now);
                }
                self.append(entry).await;
            }

            PullDecision::KeepLocal { entity_id } => {
                if let Err(error) = self
                    .store
                    .record_remote_version(&entity_id, &record.version_tag)
                    .await
                {
                    self.fail_pull(record, mapped.display_name(), error).await;
                    return Ok(());
                }

                tracing::info!(
                    remote_id = %record.remote_id,
                    "kept local fields over remote change"
                );
                self.tally.conflict();
                let mut entry = self
                    .entry(SyncDirection::FromRemote, SyncStatus::Conflict)
                    .with_remote(record)
                    .with_resolution(ConflictResolution::LocalWins);
                if let Some(local) = by_remote.get_mut(&record.remote_id) {
                    entry = entry.with_local(local);
                    local.remote_version_tag = Some(record.version_tag.clone());
                    local.last_synced_at = None;
                }
                self.append(entry).await;
            }

            PullDecision::Link { entity_id } => {
                let link = record.link();
                if let Err(error) = self.store.link_remote(&entity_id, &link, now).await {
                    self.fail_pull(record, mapped.display_name(), error).await;
                    return Ok(());
                }

                self.tally.updated();
                let mut entry = self
                    .entry(SyncDirection::FromRemote, SyncStatus::Success)
                    .with_remote(record)
                    .with_note("linked");
                if let Some(mut candidate) = identity_match {
                    candidate.link(link, now);
                    entry = entry.with_local(&candidate);
                    by_remote.insert(record.remote_id.clone(), candidate);
                }
                self.append(entry).await;
            }

            PullDecision::Create => {
                let link = record.link();
                let created = match self
                    .store
                    .upsert_entity(self.org_id, &mapped, Some(&link), now)
                    .await
                {
                    Ok(created) => created,
                    Err(error) => {
                        self.fail_pull(record, mapped.display_name(), error).await;
                        return Ok(());
                    }
                };

                self.tally.created();
                let entry = self
                    .entry(SyncDirection::FromRemote, SyncStatus::Success)
                    .with_local(&created)
                    .with_remote(record)
                    .with_note("created");
                by_remote.insert(record.remote_id.clone(), created);
                self.append(entry).await;
            }
        }

        Ok(())
    }
}
