use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::local::{is_accepted, LocalFile};
use super::policy::{Eligibility, ReferencePolicy};
use super::schema::{FileSlot, SlotId, SlotRole};
use super::store::{HydrationReport, Reconciliation, RemovalPlan, SessionStore};
use crate::error::{FaultKind, RunError, SessionFault, StoreError, TransportError};
use crate::gateway::{FileGateway, ValidationGateway};
use crate::validation::{RunnerStatus, ValidationResult, ValidationRunner};

/// Handle to an upload running in the background.
#[derive(Debug)]
pub struct PendingUpload {
    pub id: SlotId,
    handle: JoinHandle<()>,
}

impl PendingUpload {
    /// Wait until the upload has been reconciled, including any orphan
    /// cleanup and the delete of the input it replaced.
    pub async fn settled(self) {
        if let Err(err) = self.handle.await {
            error!(slot_id = %self.id, error = %err, "upload task aborted");
        }
    }
}

/// Handle to a removal; local removals are already settled.
#[derive(Debug)]
pub struct PendingRemoval {
    pub id: SlotId,
    handle: Option<JoinHandle<()>>,
}

impl PendingRemoval {
    pub fn is_local(&self) -> bool {
        self.handle.is_none()
    }

    pub async fn settled(self) {
        if let Some(handle) = self.handle {
            if let Err(err) = handle.await {
                error!(slot_id = %self.id, error = %err, "removal task aborted");
            }
        }
    }
}

/// Read-only copy of the session for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub input: Option<FileSlot>,
    pub references: Vec<FileSlot>,
    pub selected_reference: Option<SlotId>,
    pub fault: Option<SessionFault>,
    pub eligibility: Eligibility,
    pub runner: RunnerStatus,
}

struct Inner {
    store: Mutex<SessionStore>,
    files: Arc<dyn FileGateway>,
    runner: ValidationRunner,
    accepted_extensions: Vec<String>,
}

/// Drives a [`SessionStore`] against the remote gateways.
///
/// Mutations are applied to the store synchronously under its lock; gateway
/// calls run as spawned tasks and reconcile by slot id when they settle, so
/// completions may arrive in any order. Must be used inside a Tokio runtime.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    pub fn new(
        files: Arc<dyn FileGateway>,
        validator: Arc<dyn ValidationGateway>,
        policy: ReferencePolicy,
        accepted_extensions: Vec<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: Mutex::new(SessionStore::new(policy)),
                files,
                runner: ValidationRunner::new(validator),
                accepted_extensions,
            }),
        }
    }

    /// Load the files the server already holds. Calling it again after a
    /// successful hydration does nothing and reports nothing loaded.
    pub async fn hydrate(&self) -> Result<HydrationReport, TransportError> {
        if self.inner.store.lock().is_hydrated() {
            return Ok(HydrationReport::default());
        }

        let listing = match self.inner.files.list_existing().await {
            Ok(listing) => listing,
            Err(err) => {
                warn!(error = %err, "could not load existing files");
                self.inner
                    .store
                    .lock()
                    .record_fault(SessionFault::new(FaultKind::Listing, err.to_string()));
                return Err(err);
            }
        };

        let report = match self.inner.store.lock().hydrate(listing) {
            Ok(report) => report,
            Err(_) => HydrationReport::default(),
        };
        info!(
            input = report.input_loaded,
            references = report.references_loaded,
            stale_inputs = report.stale_inputs,
            "loaded existing files"
        );
        Ok(report)
    }

    /// Put `file` in a new slot and start uploading it. Returns as soon as
    /// the slot exists; the upload proceeds concurrently. A replaced input
    /// is deleted alongside the upload and both settle together.
    pub fn upload(&self, role: SlotRole, file: LocalFile) -> Result<PendingUpload, StoreError> {
        if !is_accepted(&file.name, &self.inner.accepted_extensions) {
            return Err(StoreError::RejectedFile {
                name: file.name,
                accepted: self.inner.accepted_extensions.join(", "),
            });
        }

        let ticket = self
            .inner
            .store
            .lock()
            .begin_upload(role, &file.name, file.size_bytes());

        let evicted_path = ticket.evicted.and_then(|eviction| eviction.delete_path);

        let session = self.clone();
        let id = ticket.id.clone();
        let handle = tokio::spawn(async move {
            let evict = async {
                if let Some(remote_path) = &evicted_path {
                    session.delete_or_record(remote_path, FaultKind::Eviction).await;
                }
            };
            tokio::join!(session.finish_upload(id, role, file), evict);
        });

        Ok(PendingUpload { id: ticket.id, handle })
    }

    async fn finish_upload(&self, id: SlotId, role: SlotRole, file: LocalFile) {
        let result = self.inner.files.upload(role, &file).await;

        let outcome = {
            let mut store = self.inner.store.lock();
            match result {
                Ok(meta) => store.complete_upload(&id, meta, Utc::now()),
                Err(err) => store.fail_upload(&id, err.message),
            }
        };

        match outcome {
            Reconciliation::Applied => {
                info!(slot_id = %id, %role, name = %file.name, "upload settled")
            }
            Reconciliation::Ignored => {}
            Reconciliation::Orphaned { remote_path } => {
                warn!(slot_id = %id, %remote_path, "deleting upload whose slot was removed");
                self.delete_or_record(&remote_path, FaultKind::Cleanup).await;
            }
        }
    }

    /// Start removing a slot.
    pub fn remove(&self, id: &SlotId) -> Result<PendingRemoval, StoreError> {
        let plan = self.inner.store.lock().begin_removal(id)?;
        let handle = match plan {
            RemovalPlan::Local => None,
            RemovalPlan::Remote { remote_path } => {
                let session = self.clone();
                let id = id.clone();
                Some(tokio::spawn(async move {
                    session.finish_removal(id, remote_path).await;
                }))
            }
        };
        Ok(PendingRemoval { id: id.clone(), handle })
    }

    async fn finish_removal(&self, id: SlotId, remote_path: String) {
        let result = self.inner.files.delete_by_path(&remote_path).await;
        let mut store = self.inner.store.lock();
        match result {
            Ok(()) => {
                store.complete_removal(&id);
                info!(slot_id = %id, %remote_path, "file removed");
            }
            Err(err) => {
                warn!(slot_id = %id, %remote_path, error = %err, "file removal failed");
                store.fail_removal(&id, err.message);
            }
        }
    }

    async fn delete_or_record(&self, remote_path: &str, kind: FaultKind) {
        if let Err(err) = self.inner.files.delete_by_path(remote_path).await {
            error!(%remote_path, %kind, error = %err, "background delete failed");
            self.inner
                .store
                .lock()
                .record_fault(SessionFault::new(kind, format!("{remote_path}: {}", err.message)));
        }
    }

    pub fn select_reference(&self, id: &SlotId) -> Result<(), StoreError> {
        self.inner.store.lock().select_reference(id)
    }

    pub fn eligibility(&self) -> Eligibility {
        self.inner.store.lock().eligibility()
    }

    /// Validate the current eligible slots. Transport failures are also
    /// recorded as the session fault.
    pub async fn run_validation(&self, instructions: &str) -> Result<ValidationResult, RunError> {
        let targets = match self.eligibility() {
            Eligibility::Ready(targets) => targets,
            Eligibility::Blocked(reason) => return Err(RunError::NotEligible(reason.to_string())),
        };

        let result = self.inner.runner.run(targets, instructions).await;
        if let Err(RunError::Transport(err)) = &result {
            self.inner
                .store
                .lock()
                .record_fault(SessionFault::new(FaultKind::Transport, err.to_string()));
        }
        result
    }

    pub fn runner_status(&self) -> RunnerStatus {
        self.inner.runner.status()
    }

    pub fn last_result(&self) -> Option<ValidationResult> {
        self.inner.runner.last_result()
    }

    pub fn slot(&self, id: &SlotId) -> Option<FileSlot> {
        self.inner.store.lock().slot(id).cloned()
    }

    /// Find a slot by remote path or by local file name.
    pub fn find_slot(&self, needle: &str) -> Option<SlotId> {
        let store = self.inner.store.lock();
        store
            .input()
            .into_iter()
            .chain(store.references())
            .find(|slot| slot.remote_path.as_deref() == Some(needle) || slot.local_name == needle)
            .map(|slot| slot.id.clone())
    }

    pub fn take_fault(&self) -> Option<SessionFault> {
        self.inner.store.lock().take_fault()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let store = self.inner.store.lock();
        SessionSnapshot {
            input: store.input().cloned(),
            references: store.references().to_vec(),
            selected_reference: store.selected_reference().cloned(),
            fault: store.fault().cloned(),
            eligibility: store.eligibility(),
            runner: self.inner.runner.status(),
        }
    }
}
