//! Contracts with the remote validation service.
//!
//! The session core only talks to these traits; [`HttpGateway`] is the
//! production implementation and tests substitute in-memory stubs.

pub mod http;
pub mod wire;

use async_trait::async_trait;

use crate::error::{DeleteError, TransportError, UploadError};
use crate::session::{LocalFile, RemoteListing, SlotRole, UploadedFile};
use crate::validation::ValidationResult;

pub use http::HttpGateway;

/// Everything the validate call needs, with remote paths already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRequest {
    pub input_path: String,
    pub reference_paths: Vec<String>,
    pub instructions: String,
}

/// Remote file storage. Stateless; calls may overlap freely.
#[async_trait]
pub trait FileGateway: Send + Sync {
    async fn list_existing(&self) -> Result<RemoteListing, TransportError>;

    async fn upload(&self, role: SlotRole, file: &LocalFile) -> Result<UploadedFile, UploadError>;

    async fn delete_by_path(&self, remote_path: &str) -> Result<(), DeleteError>;

    /// Backend liveness, e.g. `"healthy"`.
    async fn health(&self) -> Result<String, TransportError> {
        Ok("unknown".to_string())
    }
}

#[async_trait]
pub trait ValidationGateway: Send + Sync {
    async fn validate(
        &self,
        request: &ValidationRequest,
    ) -> Result<ValidationResult, TransportError>;
}
