//! Client-side session manager for a remote document validation service.
//!
//! Upload one input document and any number of reference documents, run a
//! validation against them and turn the returned findings into a grouped,
//! filterable view.

pub mod config;
pub mod error;
pub mod gateway;
pub mod session;
pub mod validation;

pub use config::Config;
pub use error::{
    ConfigError, DeleteError, FaultKind, RunError, SessionFault, StoreError, TransportError,
    UploadError,
};
pub use gateway::{FileGateway, HttpGateway, ValidationGateway, ValidationRequest};
pub use session::{FileSlot, LocalFile, Session, SessionStore, SlotId, SlotRole, SlotStatus};
pub use validation::{
    build_view, Finding, FindingsViewModel, Severity, SeverityFilter, ValidationResult,
};
