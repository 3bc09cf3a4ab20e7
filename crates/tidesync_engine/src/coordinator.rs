//! The sync coordinator.
//!
//! One coordinator serves one entity collection. It owns the push-then-pull
//! cycle, the conflict resolution step and the local CRUD surface, and it
//! is the only writer of its local store and operation log.

use crate::cancel::CancelToken;
use crate::config::SyncConfig;
use crate::connectivity::Connectivity;
use crate::error::{SyncError, SyncResult};
use crate::gateway::RemoteGateway;
use crate::report::{RejectedOperation, SyncReport, SyncState, SyncStats, SyncStatus};
use crate::store::{LocalStore, OperationLog};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tidesync_protocol::{
    ChangeSet, Checkpoint, CheckpointKey, ConflictPolicy, ConflictRecord, ConflictResolver,
    Entity, EntityData, EntityId, OperationKind, PendingOperation, Query, ResolutionAction,
    SubmitOutcome,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cycle {
    Full,
    PushOnly,
    PullOnly,
}

impl Cycle {
    fn pushes(self) -> bool {
        !matches!(self, Cycle::PullOnly)
    }

    fn pulls(self) -> bool {
        !matches!(self, Cycle::PushOnly)
    }
}

/// How a phase ended. Local-store failures travel as `Err` instead.
enum Phase {
    Completed,
    Halted(SyncError),
}

/// Keeps one local collection in sync with the remote store.
///
/// # Concurrency
///
/// At most one cycle (`sync`, `push_only`, `pull`) runs at a time; further
/// calls wait for the running one to finish. Store and log mutations are
/// applied under a short write lock shared with the CRUD methods, so a
/// local write never interleaves with the application of a gateway answer.
pub struct SyncCoordinator<T: EntityData> {
    config: SyncConfig,
    gateway: Arc<dyn RemoteGateway<T>>,
    store: Arc<dyn LocalStore<T>>,
    log: Arc<dyn OperationLog<T>>,
    connectivity: Arc<dyn Connectivity>,
    resolver: Arc<dyn ConflictResolver<T>>,
    cycle_gate: tokio::sync::Mutex<()>,
    write_lock: Mutex<()>,
    state: RwLock<SyncState>,
    last_sync: RwLock<Option<Instant>>,
    stats: RwLock<SyncStats>,
}

impl<T: EntityData> SyncCoordinator<T> {
    /// Creates a coordinator with the local-wins resolver.
    pub fn new(
        config: SyncConfig,
        gateway: Arc<dyn RemoteGateway<T>>,
        store: Arc<dyn LocalStore<T>>,
        log: Arc<dyn OperationLog<T>>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        Self {
            config,
            gateway,
            store,
            log,
            connectivity,
            resolver: Arc::new(ConflictPolicy::LocalWins),
            cycle_gate: tokio::sync::Mutex::new(()),
            write_lock: Mutex::new(()),
            state: RwLock::new(SyncState::Idle),
            last_sync: RwLock::new(None),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Replaces the conflict resolver.
    pub fn with_resolver<R>(mut self, resolver: R) -> Self
    where
        R: ConflictResolver<T> + 'static,
    {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the connectivity source.
    pub fn connectivity(&self) -> &Arc<dyn Connectivity> {
        &self.connectivity
    }

    /// Returns what the coordinator is doing right now.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Returns accumulated statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns when the last full sync completed.
    pub fn last_sync_time(&self) -> Option<Instant> {
        *self.last_sync.read()
    }

    /// Returns the number of queued local operations.
    pub fn pending_operations_count(&self) -> usize {
        self.log.pending_count()
    }

    /// Returns the queued local operations in sequence order.
    pub fn pending_operations(&self) -> SyncResult<Vec<PendingOperation<T>>> {
        self.log.pending()
    }

    /// Returns true if a reconnect should start a cycle.
    ///
    /// False while the last completed sync is within the debounce window.
    pub fn should_sync_on_reconnect(&self) -> bool {
        match *self.last_sync.read() {
            None => true,
            Some(at) => at.elapsed() > self.config.reconnect_debounce,
        }
    }

    // =========================================================================
    // Cycles
    // =========================================================================

    /// Pushes queued operations, then pulls remote changes.
    ///
    /// Connectivity is checked once at entry. The last-sync timestamp is
    /// stamped only when the cycle completes.
    pub async fn sync(&self, cancel: &CancelToken) -> SyncResult<SyncReport<T>> {
        self.run(cancel, Cycle::Full).await
    }

    /// Pushes queued operations without pulling.
    ///
    /// Returns `Offline` when disconnected and `Idle` when nothing is queued,
    /// without contacting the gateway.
    pub async fn push_only(&self, cancel: &CancelToken) -> SyncResult<SyncReport<T>> {
        self.run(cancel, Cycle::PushOnly).await
    }

    /// Pulls remote changes into the local store.
    pub async fn pull(&self) -> SyncResult<SyncReport<T>> {
        self.run(&CancelToken::new(), Cycle::PullOnly).await
    }

    /// Runs `sync`, retrying retryable transport failures with backoff.
    pub async fn sync_with_retry(&self, cancel: &CancelToken) -> SyncResult<SyncReport<T>> {
        let retry = &self.config.retry;
        let mut attempt = 0;

        loop {
            let report = self.sync(cancel).await?;
            attempt += 1;

            let retryable = report.status == SyncStatus::TransportFailed
                && report.error.as_ref().is_some_and(SyncError::is_retryable);
            if !retryable || attempt >= retry.max_attempts {
                return Ok(report);
            }

            let delay = retry.delay_for_attempt(attempt);
            debug!(
                collection = T::COLLECTION,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying sync"
            );
            self.stats.write().retries += 1;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Ok(SyncReport::new(SyncStatus::Cancelled).finish(Instant::now()));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn run(&self, cancel: &CancelToken, cycle: Cycle) -> SyncResult<SyncReport<T>> {
        let started = Instant::now();

        let _gate = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Ok(SyncReport::new(SyncStatus::Cancelled).finish(started));
            }
            gate = self.cycle_gate.lock() => gate,
        };

        if cancel.is_cancelled() {
            return Ok(SyncReport::new(SyncStatus::Cancelled).finish(started));
        }
        if cycle.pushes() && !self.connectivity.is_connected() {
            debug!(collection = T::COLLECTION, ?cycle, "offline, cycle skipped");
            return Ok(SyncReport::new(SyncStatus::Offline).finish(started));
        }
        if cycle == Cycle::PushOnly && self.log.pending_count() == 0 {
            return Ok(SyncReport::new(SyncStatus::Idle).finish(started));
        }

        self.stats.write().cycles_started += 1;
        let result = self.run_phases(cancel, cycle).await;
        self.set_state(SyncState::Idle);

        let report = match result {
            Ok(report) => report.finish(started),
            Err(error) => {
                warn!(collection = T::COLLECTION, %error, "local store failed during sync");
                self.stats.write().last_error = Some(error.to_string());
                return Err(error);
            }
        };

        if cycle == Cycle::Full && report.status.is_complete() {
            *self.last_sync.write() = Some(Instant::now());
        }
        self.stats.write().record(&report);

        info!(
            collection = T::COLLECTION,
            ?cycle,
            status = ?report.status,
            pushed = report.pushed,
            pulled = report.pulled,
            resolved = report.resolved.len(),
            unresolved = report.unresolved.len(),
            rejected = report.rejected.len(),
            "sync cycle finished"
        );
        Ok(report)
    }

    async fn run_phases(&self, cancel: &CancelToken, cycle: Cycle) -> SyncResult<SyncReport<T>> {
        let mut report = SyncReport::new(SyncStatus::Success);
        let mut held = HashSet::new();

        if cycle.pushes() {
            self.set_state(SyncState::Pushing);
            if let Phase::Halted(error) = self.push_phase(cancel, &mut report, &mut held).await? {
                report.halt(error);
                return Ok(report);
            }
        }

        if cycle.pulls() {
            if cancel.is_cancelled() {
                report.halt(SyncError::Cancelled);
                return Ok(report);
            }
            self.set_state(SyncState::Pulling);
            if let Phase::Halted(error) = self.pull_phase(cancel, &mut report, &mut held).await? {
                report.halt(error);
            }
        }

        Ok(report)
    }

    /// Bounds one gateway call by the request timeout and the cancel token.
    async fn call<R, F>(&self, cancel: &CancelToken, request: F) -> SyncResult<R>
    where
        F: Future<Output = SyncResult<R>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SyncError::Cancelled),
            result = tokio::time::timeout(self.config.request_timeout, request) => {
                result.unwrap_or_else(|_| Err(SyncError::Timeout))
            }
        }
    }

    // =========================================================================
    // Push
    // =========================================================================

    /// Transmits queued operations one at a time in sequence order.
    ///
    /// `held` collects identities with an unsettled operation; their later
    /// operations wait for the next cycle so the gateway never sees them
    /// out of order.
    async fn push_phase(
        &self,
        cancel: &CancelToken,
        report: &mut SyncReport<T>,
        held: &mut HashSet<EntityId>,
    ) -> SyncResult<Phase> {
        let sequences: Vec<u64> = self.log.pending()?.iter().map(|op| op.sequence).collect();
        debug!(
            collection = T::COLLECTION,
            pending = sequences.len(),
            "push started"
        );

        for sequence in sequences {
            // re-read: an earlier acknowledgement may have rebased this entry
            let Some(op) = self.log.get(sequence)? else {
                continue;
            };
            if held.contains(op.entity_id()) {
                continue;
            }

            let outcome = match self.call(cancel, self.gateway.submit(&op)).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    warn!(
                        collection = T::COLLECTION,
                        sequence,
                        %error,
                        "push interrupted"
                    );
                    return Ok(Phase::Halted(error));
                }
            };

            match outcome {
                SubmitOutcome::Accepted(row) => {
                    self.settle_accepted(&op, row)?;
                    report.pushed += 1;
                }
                SubmitOutcome::Conflict { server, version } => {
                    debug!(
                        collection = T::COLLECTION,
                        sequence,
                        entity = %op.entity.id,
                        server_version = %version,
                        "version conflict"
                    );
                    let conflict =
                        ConflictRecord::new(op.sequence, op.kind, op.entity, server, version);
                    if let Phase::Halted(error) =
                        self.resolve_conflict(cancel, conflict, report, held).await?
                    {
                        return Ok(Phase::Halted(error));
                    }
                }
                SubmitOutcome::Rejected { reason } => {
                    self.record_rejection(&op, reason, report, held);
                }
            }
        }

        Ok(Phase::Completed)
    }

    async fn resolve_conflict(
        &self,
        cancel: &CancelToken,
        conflict: ConflictRecord<T>,
        report: &mut SyncReport<T>,
        held: &mut HashSet<EntityId>,
    ) -> SyncResult<Phase> {
        let previous = std::mem::replace(&mut *self.state.write(), SyncState::Resolving);
        let result = self.carry_out_resolution(cancel, conflict, report, held).await;
        self.set_state(previous);
        result
    }

    async fn carry_out_resolution(
        &self,
        cancel: &CancelToken,
        conflict: ConflictRecord<T>,
        report: &mut SyncReport<T>,
        held: &mut HashSet<EntityId>,
    ) -> SyncResult<Phase> {
        match self.resolver.resolve(&conflict) {
            ResolutionAction::Resubmit { kind, entity } => {
                let retry = PendingOperation::new(conflict.sequence, kind, entity);
                let outcome = match self.call(cancel, self.gateway.submit(&retry)).await {
                    Ok(outcome) => outcome,
                    Err(error) => return Ok(Phase::Halted(error)),
                };

                match outcome {
                    SubmitOutcome::Accepted(row) => {
                        self.settle_accepted(&retry, row)?;
                        report.pushed += 1;
                        report.resolved.push(conflict);
                    }
                    SubmitOutcome::Conflict { server, version } => {
                        // exactly one resubmission per conflict
                        self.requeue(&retry)?;
                        warn!(
                            collection = T::COLLECTION,
                            sequence = retry.sequence,
                            entity = %retry.entity.id,
                            "resubmission conflicted again"
                        );
                        held.insert(retry.entity.id.clone());
                        report.unresolved.push(ConflictRecord::new(
                            retry.sequence,
                            retry.kind,
                            retry.entity,
                            server,
                            version,
                        ));
                    }
                    SubmitOutcome::Rejected { reason } => {
                        self.requeue(&retry)?;
                        self.record_rejection(&retry, reason, report, held);
                    }
                }
            }
            ResolutionAction::AcceptServer => {
                self.settle_server_wins(&conflict)?;
                report.resolved.push(conflict);
            }
            ResolutionAction::Skip => {
                held.insert(conflict.local.id.clone());
                report.unresolved.push(conflict);
            }
        }
        Ok(Phase::Completed)
    }

    fn record_rejection(
        &self,
        op: &PendingOperation<T>,
        reason: String,
        report: &mut SyncReport<T>,
        held: &mut HashSet<EntityId>,
    ) {
        warn!(
            collection = T::COLLECTION,
            sequence = op.sequence,
            entity = %op.entity.id,
            %reason,
            "operation rejected"
        );
        held.insert(op.entity.id.clone());
        report.rejected.push(RejectedOperation {
            sequence: op.sequence,
            entity_id: op.entity.id.clone(),
            kind: op.kind,
            reason,
        });
    }

    /// Applies an acknowledgement to the log and the local store.
    fn settle_accepted(
        &self,
        op: &PendingOperation<T>,
        row: Option<Entity<T>>,
    ) -> SyncResult<()> {
        let _guard = self.write_lock.lock();
        if !self.log.acknowledge(op.sequence)? {
            // discarded while in flight
            return Ok(());
        }

        let id = op.entity_id();
        let still_pending = self.log.has_pending_for(id);
        match (op.kind, row) {
            (OperationKind::Delete, _) => {
                if !still_pending {
                    self.store.remove(id)?;
                }
            }
            (_, Some(row)) if still_pending => {
                if let Some(version) = row.version {
                    self.log.rebase(id, &version)?;
                    if let Some(local) = self.store.get(id)? {
                        self.store.upsert(local.with_version(version).into_dirty())?;
                    }
                }
            }
            (_, Some(row)) => self.store.upsert(row.into_clean())?,
            (_, None) => {
                if !still_pending {
                    if let Some(local) = self.store.get(id)? {
                        self.store.upsert(local.into_clean())?;
                    }
                }
            }
        }
        Ok(())
    }

    fn settle_server_wins(&self, conflict: &ConflictRecord<T>) -> SyncResult<()> {
        let _guard = self.write_lock.lock();
        if !self.log.acknowledge(conflict.sequence)? {
            return Ok(());
        }

        let id = &conflict.local.id;
        if self.log.has_pending_for(id) {
            return Ok(());
        }
        match &conflict.server {
            Some(row) => self.store.upsert(
                row.clone()
                    .with_version(conflict.server_version.clone())
                    .into_clean(),
            )?,
            None => {
                self.store.remove(id)?;
            }
        }
        Ok(())
    }

    fn requeue(&self, op: &PendingOperation<T>) -> SyncResult<()> {
        let _guard = self.write_lock.lock();
        self.log.replace(op.sequence, op.kind, op.entity.clone())?;
        Ok(())
    }

    // =========================================================================
    // Pull
    // =========================================================================

    fn pull_key(&self) -> CheckpointKey {
        CheckpointKey::new(T::COLLECTION, self.config.pull_label(T::COLLECTION))
    }

    async fn pull_phase(
        &self,
        cancel: &CancelToken,
        report: &mut SyncReport<T>,
        held: &mut HashSet<EntityId>,
    ) -> SyncResult<Phase> {
        let key = self.pull_key();

        loop {
            let checkpoint = self.store.checkpoint(&key)?;
            let fetch = self.gateway.fetch_changes(checkpoint.as_ref(), &key.query);
            let changes = match self.call(cancel, fetch).await {
                Ok(changes) => changes,
                Err(error) => {
                    warn!(collection = T::COLLECTION, %error, "pull interrupted");
                    return Ok(Phase::Halted(error));
                }
            };

            let ChangeSet {
                rows,
                deleted,
                checkpoint: next,
                has_more,
                push_conflicts,
            } = changes;

            if has_more && checkpoint.as_ref() == Some(&next) {
                return Ok(Phase::Halted(SyncError::Protocol(format!(
                    "checkpoint {next} did not advance"
                ))));
            }

            report.pulled += self.apply_page(&key, rows, deleted, next)?;

            for conflict in push_conflicts {
                if held.contains(&conflict.local.id) || self.log.get(conflict.sequence)?.is_none()
                {
                    debug!(
                        collection = T::COLLECTION,
                        sequence = conflict.sequence,
                        "embedded conflict no longer applies"
                    );
                    continue;
                }
                if let Phase::Halted(error) =
                    self.resolve_conflict(cancel, conflict, report, held).await?
                {
                    return Ok(Phase::Halted(error));
                }
            }

            if !has_more {
                return Ok(Phase::Completed);
            }
        }
    }

    /// Applies one page and persists its checkpoint.
    ///
    /// Rows with queued local operations keep their local copy.
    fn apply_page(
        &self,
        key: &CheckpointKey,
        rows: Vec<Entity<T>>,
        deleted: Vec<EntityId>,
        checkpoint: Checkpoint,
    ) -> SyncResult<usize> {
        let _guard = self.write_lock.lock();
        let received = rows.len() + deleted.len();

        let rows: Vec<Entity<T>> = rows
            .into_iter()
            .filter(|row| !self.log.has_pending_for(&row.id))
            .collect();
        let deleted: Vec<EntityId> = deleted
            .into_iter()
            .filter(|id| !self.log.has_pending_for(id))
            .collect();
        let applied = rows.len() + deleted.len();

        self.store.apply_remote(rows, &deleted)?;
        self.store.set_checkpoint(key, checkpoint)?;

        debug!(
            collection = T::COLLECTION,
            applied,
            skipped = received - applied,
            "pulled page applied"
        );
        Ok(applied)
    }

    // =========================================================================
    // Local CRUD
    // =========================================================================

    /// Inserts a new entity and queues it for push.
    ///
    /// An empty id is replaced by a generated one. With `push_on_create`
    /// set and connectivity up, a push is attempted right away.
    pub async fn create_item(&self, entity: Entity<T>) -> SyncResult<Entity<T>> {
        let created = self.record_insert(entity)?;

        if self.config.push_on_create && self.connectivity.is_connected() {
            match self.push_only(&CancelToken::new()).await {
                Ok(report) => debug!(
                    collection = T::COLLECTION,
                    status = ?report.status,
                    "push after create"
                ),
                Err(error) => warn!(
                    collection = T::COLLECTION,
                    %error,
                    "push after create failed"
                ),
            }
        }

        Ok(self.read_item(&created.id)?.unwrap_or(created))
    }

    fn record_insert(&self, mut entity: Entity<T>) -> SyncResult<Entity<T>> {
        if entity.id.is_empty() {
            entity.id = EntityId::generate();
        }

        let _guard = self.write_lock.lock();
        if self.store.get(&entity.id)?.is_some() {
            return Err(SyncError::AlreadyExists(entity.id.to_string()));
        }
        let entity = entity.into_dirty();
        self.record(OperationKind::Insert, entity.clone())?;
        Ok(entity.into_clean())
    }

    /// Replaces an existing entity and queues the update.
    ///
    /// Without a version token the stored one is used as the base version.
    pub fn update_item(&self, entity: Entity<T>) -> SyncResult<Entity<T>> {
        let _guard = self.write_lock.lock();
        let current = self
            .store
            .get(&entity.id)?
            .ok_or_else(|| SyncError::NotFound(entity.id.to_string()))?;

        let mut entity = entity.into_dirty();
        if entity.version.is_none() {
            entity.version = current.version;
        }
        self.record(OperationKind::Update, entity.clone())?;
        Ok(entity.into_clean())
    }

    /// Deletes an entity locally and queues the delete.
    pub fn delete_item(&self, id: &EntityId) -> SyncResult<()> {
        let _guard = self.write_lock.lock();
        let current = self
            .store
            .get(id)?
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
        self.record(OperationKind::Delete, current.into_dirty())?;
        Ok(())
    }

    /// Appends to the log, then applies to the store. Caller holds the write lock.
    fn record(&self, kind: OperationKind, entity: Entity<T>) -> SyncResult<u64> {
        let id = entity.id.clone();
        let sequence = self.log.append(kind, entity.clone())?;

        let applied = match kind {
            OperationKind::Delete => self.store.remove(&id).map(|_| ()),
            OperationKind::Insert | OperationKind::Update => self.store.upsert(entity),
        };
        if let Err(error) = applied {
            self.log
                .discard_matching(&|op: &PendingOperation<T>| op.sequence == sequence)?;
            return Err(error);
        }

        debug!(
            collection = T::COLLECTION,
            entity = %id,
            sequence,
            kind = kind.as_str(),
            "local write queued"
        );
        Ok(sequence)
    }

    /// Removes one entity from the local cache.
    ///
    /// Refused while the entity has queued operations. Returns false if it
    /// was not cached.
    pub fn purge_item(&self, id: &EntityId) -> SyncResult<bool> {
        Ok(self.purge(&Query::by_id(id.clone()), false)? > 0)
    }

    /// Removes the entities selected by `query` from the local cache.
    ///
    /// Without `force`, fails with [`SyncError::PendingOperations`] if any
    /// selected entity has queued operations. With `force`, those operations
    /// are discarded. Purging the whole collection resets all of its pull
    /// checkpoints; purging a named query resets that query's checkpoint.
    pub fn purge(&self, query: &Query<T>, force: bool) -> SyncResult<usize> {
        let _guard = self.write_lock.lock();

        let ids: HashSet<EntityId> = self
            .store
            .query(query)?
            .into_iter()
            .map(|entity| entity.id)
            .collect();
        let paged = query.skipped() > 0 || query.limit().is_some();
        let selected = |op: &PendingOperation<T>| {
            ids.contains(op.entity_id()) || (!paged && query.matches(&op.entity))
        };

        let pending = self
            .log
            .pending()?
            .iter()
            .filter(|op| selected(*op))
            .count();
        if pending > 0 {
            if !force {
                return Err(SyncError::PendingOperations { count: pending });
            }
            let discarded = self.log.discard_matching(&selected)?;
            warn!(
                collection = T::COLLECTION,
                discarded = discarded.len(),
                "forced purge discarded pending operations"
            );
        }

        let purged = self.store.purge(query)?;
        let cleared = if query.is_unrestricted() {
            self.store.clear_checkpoints(T::COLLECTION, None)?
        } else if let Some(name) = query.name() {
            self.store.clear_checkpoints(T::COLLECTION, Some(name))?
        } else {
            0
        };

        info!(
            collection = T::COLLECTION,
            purged,
            checkpoints_cleared = cleared,
            "local rows purged"
        );
        Ok(purged)
    }

    /// Removes a queued operation, typically one the remote store rejected.
    ///
    /// Once no operation is left for the entity, its local copy is dropped
    /// and the collection's checkpoints are reset, so the next pull brings
    /// back whatever the remote store holds for it.
    pub fn discard_operation(&self, sequence: u64) -> SyncResult<Option<PendingOperation<T>>> {
        let _guard = self.write_lock.lock();
        let removed = self
            .log
            .discard_matching(&|op: &PendingOperation<T>| op.sequence == sequence)?
            .pop();

        if let Some(op) = &removed {
            let id = op.entity_id();
            if !self.log.has_pending_for(id) {
                self.store.remove(id)?;
                let cleared = self.store.clear_checkpoints(T::COLLECTION, None)?;
                debug!(
                    collection = T::COLLECTION,
                    entity = %id,
                    cleared,
                    "local copy dropped, collection will re-pull"
                );
            }
            info!(
                collection = T::COLLECTION,
                sequence,
                entity = %id,
                "pending operation discarded"
            );
        }
        Ok(removed)
    }

    /// Reads one entity.
    pub fn read_item(&self, id: &EntityId) -> SyncResult<Option<Entity<T>>> {
        Ok(self.store.get(id)?.map(Entity::into_clean))
    }

    /// Reads the first entity selected by `query`.
    pub fn read_item_where(&self, query: &Query<T>) -> SyncResult<Option<Entity<T>>> {
        Ok(self.read_items_where(&query.clone().take(1))?.into_iter().next())
    }

    /// Reads up to `count` entities starting at `start`, in identity order.
    pub fn read_items(&self, start: usize, count: usize) -> SyncResult<Vec<Entity<T>>> {
        self.read_items_where(&Query::all().skip(start).take(count))
    }

    /// Reads every entity selected by `query`.
    pub fn read_items_where(&self, query: &Query<T>) -> SyncResult<Vec<Entity<T>>> {
        Ok(self
            .store
            .query(query)?
            .into_iter()
            .map(Entity::into_clean)
            .collect())
    }

    /// Reads the whole local collection.
    pub fn read_all_items(&self) -> SyncResult<Vec<Entity<T>>> {
        self.read_items_where(&Query::all())
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }
}
