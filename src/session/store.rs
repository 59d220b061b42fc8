use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::policy::{self, Eligibility, ReferencePolicy};
use super::schema::{
    FileSlot, RemoteFile, RemoteListing, SlotId, SlotRole, SlotStatus, UploadedFile,
};
use crate::error::{FaultKind, SessionFault, StoreError};

/// Returned by [`SessionStore::begin_upload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTicket {
    pub id: SlotId,
    /// The input slot that was pushed out by this selection, if any.
    pub evicted: Option<Eviction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eviction {
    pub slot: FileSlot,
    /// Set when the evicted slot owns a remote file nobody else is deleting.
    pub delete_path: Option<String>,
}

/// What the caller must do after [`SessionStore::begin_removal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalPlan {
    /// The slot never reached the server and is already gone.
    Local,
    /// The slot is `removing`; issue a delete for this path.
    Remote { remote_path: String },
}

/// Result of applying a gateway completion to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    Applied,
    /// Target slot is gone or no longer in the expected state.
    Ignored,
    /// An upload finished for a slot that no longer exists; the remote file
    /// at this path has no owner and should be deleted.
    Orphaned { remote_path: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HydrationReport {
    pub input_loaded: bool,
    pub stale_inputs: usize,
    pub references_loaded: usize,
}

/// The single mutable resource of a session: one optional input slot, the
/// ordered reference slots and the last session-level fault.
///
/// Every method is a whole-state transition completed within one call, so
/// callers holding it behind a mutex never observe a half-applied change.
#[derive(Debug, Default)]
pub struct SessionStore {
    policy: ReferencePolicy,
    input: Option<FileSlot>,
    references: Vec<FileSlot>,
    selected_reference: Option<SlotId>,
    fault: Option<SessionFault>,
    hydrated: bool,
}

impl SessionStore {
    pub fn new(policy: ReferencePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> ReferencePolicy {
        self.policy
    }

    pub fn input(&self) -> Option<&FileSlot> {
        self.input.as_ref()
    }

    pub fn references(&self) -> &[FileSlot] {
        &self.references
    }

    pub fn slot(&self, id: &SlotId) -> Option<&FileSlot> {
        self.input
            .iter()
            .chain(self.references.iter())
            .find(|slot| &slot.id == id)
    }

    pub fn selected_reference(&self) -> Option<&SlotId> {
        self.selected_reference.as_ref()
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    /// Populate the store from the startup listing.
    ///
    /// Only the newest input candidate is kept; older ones are ignored
    /// locally and left on the server. Files already tracked by a slot (by
    /// remote path) are skipped, and an input chosen before the listing
    /// arrived wins over every remote candidate.
    pub fn hydrate(&mut self, listing: RemoteListing) -> Result<HydrationReport, StoreError> {
        if self.hydrated {
            return Err(StoreError::AlreadyHydrated);
        }
        self.hydrated = true;

        let mut report = HydrationReport::default();
        let candidates: Vec<RemoteFile> = listing
            .inputs
            .into_iter()
            .filter(|file| !self.tracks_remote_path(&file.remote_path))
            .collect();

        if self.input.is_none() {
            let latest = candidates
                .iter()
                .enumerate()
                .max_by(|(ia, a), (ib, b)| a.uploaded_at.cmp(&b.uploaded_at).then(ia.cmp(ib)))
                .map(|(index, _)| index);
            if let Some(index) = latest {
                report.stale_inputs = candidates.len() - 1;
                let chosen = candidates.into_iter().nth(index);
                self.input = chosen.map(|file| FileSlot::preexisting(SlotRole::Input, file));
                report.input_loaded = self.input.is_some();
            }
        } else {
            report.stale_inputs = candidates.len();
        }

        let mut references: Vec<RemoteFile> = listing
            .references
            .into_iter()
            .filter(|file| !self.tracks_remote_path(&file.remote_path))
            .collect();
        references.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at));
        report.references_loaded = references.len();

        let mut ordered: Vec<FileSlot> = references
            .into_iter()
            .map(|file| FileSlot::preexisting(SlotRole::Reference, file))
            .collect();
        ordered.append(&mut self.references);
        self.references = ordered;

        debug!(
            input_loaded = report.input_loaded,
            stale_inputs = report.stale_inputs,
            references = report.references_loaded,
            "session hydrated"
        );
        Ok(report)
    }

    /// Create a slot in `uploading` for a freshly chosen file.
    ///
    /// Choosing an input evicts the current input slot outright. If that
    /// slot owns a remote file and is not already being removed, the ticket
    /// carries the path the caller must delete.
    pub fn begin_upload(
        &mut self,
        role: SlotRole,
        local_name: &str,
        size_bytes: u64,
    ) -> UploadTicket {
        let slot = FileSlot::uploading(role, local_name, size_bytes);
        let id = slot.id.clone();
        debug!(slot_id = %id, %role, name = local_name, "upload started");

        let evicted = match role {
            SlotRole::Input => self.input.replace(slot).map(|old| {
                let delete_path = match old.status {
                    SlotStatus::Removing => None,
                    _ => old.remote_path.clone(),
                };
                debug!(slot_id = %old.id, "input slot evicted");
                Eviction {
                    slot: old,
                    delete_path,
                }
            }),
            SlotRole::Reference => {
                self.references.push(slot);
                None
            }
        };

        UploadTicket { id, evicted }
    }

    pub fn complete_upload(
        &mut self,
        id: &SlotId,
        meta: UploadedFile,
        at: DateTime<Utc>,
    ) -> Reconciliation {
        match self.slot_mut(id) {
            None => {
                warn!(
                    slot_id = %id,
                    remote_path = %meta.remote_path,
                    "upload finished for a removed slot"
                );
                Reconciliation::Orphaned {
                    remote_path: meta.remote_path,
                }
            }
            Some(slot) if slot.status != SlotStatus::Uploading => {
                warn!(slot_id = %id, status = ?slot.status, "ignoring stale upload completion");
                Reconciliation::Ignored
            }
            Some(slot) => {
                debug!(slot_id = %id, remote_path = %meta.remote_path, "upload completed");
                slot.complete(meta, at);
                Reconciliation::Applied
            }
        }
    }

    pub fn fail_upload(&mut self, id: &SlotId, message: impl Into<String>) -> Reconciliation {
        match self.slot_mut(id) {
            Some(slot) if slot.status == SlotStatus::Uploading => {
                let message = message.into();
                debug!(slot_id = %id, %message, "upload failed");
                slot.fail(message);
                Reconciliation::Applied
            }
            _ => {
                debug!(slot_id = %id, "ignoring upload failure for missing or settled slot");
                Reconciliation::Ignored
            }
        }
    }

    /// Start removing a slot. Slots without a remote file are dropped on the
    /// spot; an upload still in flight for them is later treated as orphaned.
    pub fn begin_removal(&mut self, id: &SlotId) -> Result<RemovalPlan, StoreError> {
        let slot = self
            .slot_mut(id)
            .ok_or_else(|| StoreError::UnknownSlot(id.clone()))?;

        match (slot.status, slot.remote_path.clone()) {
            (SlotStatus::Removing, _) => Err(StoreError::AlreadyRemoving(id.clone())),
            (SlotStatus::Uploading, _) | (_, None) => {
                self.detach(id);
                debug!(slot_id = %id, "slot removed locally");
                Ok(RemovalPlan::Local)
            }
            (_, Some(remote_path)) => {
                slot.mark_removing();
                debug!(slot_id = %id, %remote_path, "removal started");
                Ok(RemovalPlan::Remote { remote_path })
            }
        }
    }

    pub fn complete_removal(&mut self, id: &SlotId) -> Reconciliation {
        match self.slot(id).map(|slot| slot.status) {
            Some(SlotStatus::Removing) => {
                self.detach(id);
                debug!(slot_id = %id, "removal completed");
                Reconciliation::Applied
            }
            _ => Reconciliation::Ignored,
        }
    }

    /// Roll a `removing` slot back and record the failure as the session
    /// fault. The fault is recorded even when the slot has since gone, since
    /// the remote file still exists.
    pub fn fail_removal(&mut self, id: &SlotId, message: impl Into<String>) -> Reconciliation {
        let message = message.into();
        self.record_fault(SessionFault::new(FaultKind::Removal, message.clone()));

        match self.slot_mut(id) {
            Some(slot) if slot.status == SlotStatus::Removing => {
                let restored = slot.roll_back_removal(message);
                warn!(slot_id = %id, ?restored, "removal failed, slot restored");
                Reconciliation::Applied
            }
            _ => Reconciliation::Ignored,
        }
    }

    /// Pick the reference sent under [`ReferencePolicy::SingleSelected`].
    pub fn select_reference(&mut self, id: &SlotId) -> Result<(), StoreError> {
        match self.slot(id) {
            None => Err(StoreError::UnknownSlot(id.clone())),
            Some(slot) if slot.role != SlotRole::Reference => {
                Err(StoreError::NotAReference(id.clone()))
            }
            Some(_) => {
                self.selected_reference = Some(id.clone());
                Ok(())
            }
        }
    }

    pub fn eligibility(&self) -> Eligibility {
        policy::evaluate(
            self.policy,
            self.input.as_ref(),
            &self.references,
            self.selected_reference.as_ref(),
        )
    }

    pub fn record_fault(&mut self, fault: SessionFault) {
        self.fault = Some(fault);
    }

    pub fn fault(&self) -> Option<&SessionFault> {
        self.fault.as_ref()
    }

    pub fn take_fault(&mut self) -> Option<SessionFault> {
        self.fault.take()
    }

    fn tracks_remote_path(&self, remote_path: &str) -> bool {
        self.input
            .iter()
            .chain(self.references.iter())
            .any(|slot| slot.remote_path.as_deref() == Some(remote_path))
    }

    fn slot_mut(&mut self, id: &SlotId) -> Option<&mut FileSlot> {
        self.input
            .iter_mut()
            .chain(self.references.iter_mut())
            .find(|slot| &slot.id == id)
    }

    fn detach(&mut self, id: &SlotId) -> Option<FileSlot> {
        if self.selected_reference.as_ref() == Some(id) {
            self.selected_reference = None;
        }
        if self.input.as_ref().is_some_and(|slot| &slot.id == id) {
            return self.input.take();
        }
        let index = self.references.iter().position(|slot| &slot.id == id)?;
        Some(self.references.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use proptest::prelude::*;

    use super::*;
    use crate::session::policy::BlockReason;
    use crate::session::SlotOrigin;

    fn meta(path: &str) -> UploadedFile {
        UploadedFile {
            remote_path: path.into(),
            remote_id: format!("id-{path}"),
            original_name: path.into(),
            size_bytes: 1,
        }
    }

    fn remote(path: &str, hour: Option<u32>) -> RemoteFile {
        RemoteFile {
            remote_path: path.into(),
            original_name: format!("{path}.pdf"),
            size_bytes: 42,
            uploaded_at: hour.map(|h| Utc.with_ymd_and_hms(2025, 3, 1, h, 0, 0).unwrap()),
        }
    }

    fn completed(store: &mut SessionStore, role: SlotRole, path: &str) -> SlotId {
        let ticket = store.begin_upload(role, path, 1);
        assert_eq!(
            store.complete_upload(&ticket.id, meta(path), Utc::now()),
            Reconciliation::Applied
        );
        ticket.id
    }

    #[test]
    fn hydrate_keeps_latest_input_and_orders_references_by_time() {
        let mut store = SessionStore::new(ReferencePolicy::AllCompleted);
        let report = store
            .hydrate(RemoteListing {
                inputs: vec![
                    remote("in-old", Some(1)),
                    remote("in-new", Some(9)),
                    remote("in-mid", Some(5)),
                ],
                references: vec![remote("ref-b", Some(7)), remote("ref-a", Some(2))],
            })
            .unwrap();

        assert!(report.input_loaded);
        assert_eq!(report.stale_inputs, 2);
        let input = store.input().unwrap();
        assert_eq!(input.remote_path.as_deref(), Some("in-new"));
        assert_eq!(input.status, SlotStatus::Completed);
        assert_eq!(input.origin, SlotOrigin::Preexisting);

        let order: Vec<_> = store
            .references()
            .iter()
            .map(|s| s.remote_path.clone().unwrap())
            .collect();
        assert_eq!(order, vec!["ref-a", "ref-b"]);
        assert!(store.eligibility().is_ready());
    }

    #[test]
    fn hydrate_twice_is_rejected() {
        let mut store = SessionStore::default();
        store.hydrate(RemoteListing::default()).unwrap();
        assert_eq!(store.hydrate(RemoteListing::default()), Err(StoreError::AlreadyHydrated));
    }

    #[test]
    fn hydrate_does_not_replace_an_input_chosen_first() {
        let mut store = SessionStore::default();
        let ticket = store.begin_upload(SlotRole::Input, "mine.pdf", 3);
        store.begin_upload(SlotRole::Reference, "local-ref.pdf", 3);

        let report = store
            .hydrate(RemoteListing {
                inputs: vec![remote("server-input", Some(3))],
                references: vec![remote("server-ref", Some(3))],
            })
            .unwrap();

        assert!(!report.input_loaded);
        assert_eq!(report.stale_inputs, 1);
        assert_eq!(store.input().unwrap().id, ticket.id);
        assert_eq!(store.references()[0].remote_path.as_deref(), Some("server-ref"));
        assert_eq!(store.references()[1].local_name, "local-ref.pdf");
    }

    #[test]
    fn new_input_evicts_completed_input_with_delete() {
        let mut store = SessionStore::default();
        let old = completed(&mut store, SlotRole::Input, "input/old.pdf");

        let ticket = store.begin_upload(SlotRole::Input, "new.pdf", 5);
        let eviction = ticket.evicted.unwrap();
        assert_eq!(eviction.slot.id, old);
        assert_eq!(eviction.delete_path.as_deref(), Some("input/old.pdf"));
        assert_eq!(store.input().unwrap().id, ticket.id);
        assert_eq!(store.input().unwrap().status, SlotStatus::Uploading);
    }

    #[test]
    fn evicting_an_uploading_input_orphans_its_upload() {
        let mut store = SessionStore::default();
        let first = store.begin_upload(SlotRole::Input, "a.pdf", 1);
        let second = store.begin_upload(SlotRole::Input, "b.pdf", 1);
        assert_eq!(second.evicted.unwrap().delete_path, None);

        assert_eq!(
            store.complete_upload(&first.id, meta("input/a.pdf"), Utc::now()),
            Reconciliation::Orphaned {
                remote_path: "input/a.pdf".into()
            }
        );
        assert_eq!(store.input().unwrap().id, second.id);
        assert_eq!(store.input().unwrap().status, SlotStatus::Uploading);
    }

    #[test]
    fn evicting_a_removing_input_does_not_delete_twice() {
        let mut store = SessionStore::default();
        let old = completed(&mut store, SlotRole::Input, "input/old.pdf");
        store.begin_removal(&old).unwrap();

        let ticket = store.begin_upload(SlotRole::Input, "new.pdf", 1);
        assert_eq!(ticket.evicted.unwrap().delete_path, None);
        assert_eq!(store.complete_removal(&old), Reconciliation::Ignored);
    }

    #[test]
    fn removing_an_uploading_slot_is_local_and_final() {
        let mut store = SessionStore::default();
        let ticket = store.begin_upload(SlotRole::Reference, "r.pdf", 1);
        assert_eq!(store.begin_removal(&ticket.id), Ok(RemovalPlan::Local));
        assert!(store.references().is_empty());

        let outcome = store.complete_upload(&ticket.id, meta("ref/r.pdf"), Utc::now());
        assert!(matches!(outcome, Reconciliation::Orphaned { .. }));
        assert!(store.slot(&ticket.id).is_none());
        assert_eq!(store.fail_upload(&ticket.id, "late"), Reconciliation::Ignored);
    }

    #[test]
    fn error_slot_removal_is_local() {
        let mut store = SessionStore::default();
        let ticket = store.begin_upload(SlotRole::Reference, "r.pdf", 1);
        store.fail_upload(&ticket.id, "Upload failed");
        assert_eq!(store.begin_removal(&ticket.id), Ok(RemovalPlan::Local));
        assert!(store.slot(&ticket.id).is_none());
    }

    #[test]
    fn completed_removal_round_trip() {
        let mut store = SessionStore::default();
        let id = completed(&mut store, SlotRole::Reference, "ref/a.pdf");

        assert_eq!(
            store.begin_removal(&id),
            Ok(RemovalPlan::Remote {
                remote_path: "ref/a.pdf".into()
            })
        );
        assert_eq!(store.slot(&id).unwrap().status, SlotStatus::Removing);
        assert_eq!(store.begin_removal(&id), Err(StoreError::AlreadyRemoving(id.clone())));

        assert_eq!(store.complete_removal(&id), Reconciliation::Applied);
        assert!(store.slot(&id).is_none());
        assert_eq!(store.complete_removal(&id), Reconciliation::Ignored);
    }

    #[test]
    fn failed_removal_rolls_back_and_records_fault() {
        let mut store = SessionStore::default();
        let id = completed(&mut store, SlotRole::Input, "input/a.pdf");
        store.begin_removal(&id).unwrap();

        assert_eq!(store.fail_removal(&id, "Failed to delete file"), Reconciliation::Applied);
        let slot = store.slot(&id).unwrap();
        assert_eq!(slot.status, SlotStatus::Completed);
        assert_eq!(slot.remote_path.as_deref(), Some("input/a.pdf"));

        let fault = store.take_fault().unwrap();
        assert_eq!(fault.kind, FaultKind::Removal);
        assert_eq!(fault.message, "Failed to delete file");
        assert!(store.fault().is_none());
    }

    #[test]
    fn unknown_slot_removal_is_an_error() {
        let mut store = SessionStore::default();
        let id = SlotId::new();
        assert_eq!(store.begin_removal(&id), Err(StoreError::UnknownSlot(id)));
    }

    #[test]
    fn eligibility_tracks_contributing_slots() {
        let mut store = SessionStore::new(ReferencePolicy::AllCompleted);
        assert_eq!(store.eligibility(), Eligibility::Blocked(BlockReason::NoInput));

        let input = store.begin_upload(SlotRole::Input, "in.pdf", 1).id;
        assert_eq!(store.eligibility(), Eligibility::Blocked(BlockReason::InputNotReady));
        store.complete_upload(&input, meta("input/in.pdf"), Utc::now());
        assert_eq!(store.eligibility(), Eligibility::Blocked(BlockReason::NoCompletedReference));

        let pending = store.begin_upload(SlotRole::Reference, "pending.pdf", 1).id;
        let reference = completed(&mut store, SlotRole::Reference, "ref/r.pdf");
        let targets = store.eligibility().targets().cloned().unwrap();
        assert_eq!(targets.input_path, "input/in.pdf");
        assert_eq!(targets.reference_paths, vec!["ref/r.pdf".to_string()]);

        store.begin_removal(&reference).unwrap();
        assert!(!store.eligibility().is_ready());

        store.complete_upload(&pending, meta("ref/pending.pdf"), Utc::now());
        assert!(store.eligibility().is_ready());

        store.begin_removal(&input).unwrap();
        assert_eq!(store.eligibility(), Eligibility::Blocked(BlockReason::InputNotReady));
    }

    #[test]
    fn single_selected_policy_needs_a_completed_selection() {
        let mut store = SessionStore::new(ReferencePolicy::SingleSelected);
        completed(&mut store, SlotRole::Input, "input/in.pdf");
        let first = completed(&mut store, SlotRole::Reference, "ref/one.pdf");
        let second = completed(&mut store, SlotRole::Reference, "ref/two.pdf");
        assert_eq!(store.eligibility(), Eligibility::Blocked(BlockReason::NoReferenceSelected));

        store.select_reference(&second).unwrap();
        let targets = store.eligibility().targets().cloned().unwrap();
        assert_eq!(targets.reference_paths, vec!["ref/two.pdf".to_string()]);

        store.begin_removal(&second).unwrap();
        assert_eq!(
            store.eligibility(),
            Eligibility::Blocked(BlockReason::SelectedReferenceNotReady)
        );
        store.complete_removal(&second);
        assert_eq!(store.selected_reference(), None);

        let input = store.input().unwrap().id.clone();
        assert_eq!(store.select_reference(&input), Err(StoreError::NotAReference(input)));
        store.select_reference(&first).unwrap();
        assert!(store.eligibility().is_ready());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Upload(bool),
        Complete(usize),
        Fail(usize),
        Remove(usize),
        RemoveOk(usize),
        RemoveFail(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<bool>().prop_map(Op::Upload),
            (0usize..8).prop_map(Op::Complete),
            (0usize..8).prop_map(Op::Fail),
            (0usize..8).prop_map(Op::Remove),
            (0usize..8).prop_map(Op::RemoveOk),
            (0usize..8).prop_map(Op::RemoveFail),
        ]
    }

    fn assert_invariants(store: &SessionStore) {
        if let Some(input) = store.input() {
            assert_eq!(input.role, SlotRole::Input);
        }
        assert!(store.references().iter().all(|slot| slot.role == SlotRole::Reference));

        for slot in store.input().iter().copied().chain(store.references()) {
            match slot.status {
                SlotStatus::Uploading => {
                    assert!(slot.error_message.is_none());
                    assert!(slot.remote_path.is_none());
                }
                SlotStatus::Removing => {
                    assert!(slot.error_message.is_none());
                    assert!(slot.remote_path.is_some());
                }
                SlotStatus::Completed => assert!(slot.remote_path.is_some()),
                SlotStatus::Error => assert!(slot.error_message.is_some()),
            }
        }

        let input_ready = store.input().is_some_and(FileSlot::is_completed);
        let reference_ready = store.references().iter().any(FileSlot::is_completed);
        assert_eq!(store.eligibility().is_ready(), input_ready && reference_ready);
    }

    proptest! {
        #[test]
        fn interleaved_operations_keep_invariants(ops in proptest::collection::vec(op(), 1..60)) {
            let mut store = SessionStore::new(ReferencePolicy::AllCompleted);
            let mut issued: Vec<SlotId> = Vec::new();

            for (step, op) in ops.into_iter().enumerate() {
                let pick = |n: usize| issued.get(n % issued.len().max(1)).cloned();
                match op {
                    Op::Upload(is_input) => {
                        let role = if is_input { SlotRole::Input } else { SlotRole::Reference };
                        issued.push(store.begin_upload(role, "doc.pdf", 1).id);
                    }
                    Op::Complete(n) => if let Some(id) = pick(n) {
                        let before = store.slot(&id).cloned();
                        let outcome =
                            store.complete_upload(&id, meta(&format!("p{step}")), Utc::now());
                        if before.is_none() {
                            prop_assert!(
                                matches!(outcome, Reconciliation::Orphaned { .. }),
                                "completion for a removed slot must be orphaned"
                            );
                            prop_assert!(store.slot(&id).is_none());
                        }
                    },
                    Op::Fail(n) => if let Some(id) = pick(n) {
                        let existed = store.slot(&id).is_some();
                        store.fail_upload(&id, "upload failed");
                        prop_assert_eq!(existed, store.slot(&id).is_some());
                    },
                    Op::Remove(n) => if let Some(id) = pick(n) {
                        let _ = store.begin_removal(&id);
                    },
                    Op::RemoveOk(n) => if let Some(id) = pick(n) {
                        store.complete_removal(&id);
                    },
                    Op::RemoveFail(n) => if let Some(id) = pick(n) {
                        store.fail_removal(&id, "Failed to remove file");
                    },
                }
                assert_invariants(&store);
            }
        }
    }
}
