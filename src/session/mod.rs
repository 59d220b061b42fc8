//! Upload session: file slots, the session store and its async driver.
//!
//! The store is a synchronous state machine; [`Session`] owns it behind a
//! mutex and runs every gateway call as an independent task that reconciles
//! back into the store when it settles.

pub mod describe;
pub mod handle;
pub mod local;
pub mod policy;
pub mod schema;
pub mod store;

pub use handle::{PendingRemoval, PendingUpload, Session, SessionSnapshot};
pub use local::LocalFile;
pub use policy::{BlockReason, Eligibility, ReferencePolicy, ValidationTargets};
pub use schema::{
    FileSlot, RemoteFile, RemoteListing, SlotId, SlotOrigin, SlotRole, SlotStatus, UploadedFile,
};
pub use store::{Eviction, HydrationReport, Reconciliation, RemovalPlan, SessionStore, UploadTicket};
