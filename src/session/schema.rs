use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Locally generated slot identifier. Never derived from the file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotId(String);

impl SlotId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SlotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotRole {
    Input,
    Reference,
}

impl SlotRole {
    pub fn as_str(self) -> &'static str {
        match self {
            SlotRole::Input => "input",
            SlotRole::Reference => "reference",
        }
    }
}

impl fmt::Display for SlotRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Uploading,
    Completed,
    Error,
    Removing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotOrigin {
    /// Chosen in this session.
    New,
    /// Discovered through the startup listing.
    Preexisting,
}

/// One tracked file's lifecycle record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSlot {
    pub id: SlotId,
    pub role: SlotRole,
    pub status: SlotStatus,
    pub local_name: String,
    pub size_bytes: u64,
    pub remote_path: Option<String>,
    pub remote_id: Option<String>,
    pub error_message: Option<String>,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub origin: SlotOrigin,
    /// Status to restore if an in-flight removal fails.
    #[serde(skip)]
    pub(crate) before_removal: Option<SlotStatus>,
}

impl FileSlot {
    pub(crate) fn uploading(role: SlotRole, local_name: &str, size_bytes: u64) -> Self {
        Self {
            id: SlotId::new(),
            role,
            status: SlotStatus::Uploading,
            local_name: local_name.to_string(),
            size_bytes,
            remote_path: None,
            remote_id: None,
            error_message: None,
            uploaded_at: None,
            origin: SlotOrigin::New,
            before_removal: None,
        }
    }

    pub(crate) fn preexisting(role: SlotRole, file: RemoteFile) -> Self {
        Self {
            id: SlotId::new(),
            role,
            status: SlotStatus::Completed,
            local_name: file.original_name,
            size_bytes: file.size_bytes,
            remote_path: Some(file.remote_path),
            remote_id: None,
            error_message: None,
            uploaded_at: file.uploaded_at,
            origin: SlotOrigin::Preexisting,
            before_removal: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == SlotStatus::Completed
    }

    /// `uploading -> completed`
    pub(crate) fn complete(&mut self, meta: UploadedFile, at: DateTime<Utc>) {
        self.status = SlotStatus::Completed;
        self.remote_path = Some(meta.remote_path);
        self.remote_id = Some(meta.remote_id);
        self.error_message = None;
        self.uploaded_at = Some(at);
    }

    /// `uploading -> error`
    pub(crate) fn fail(&mut self, message: String) {
        self.status = SlotStatus::Error;
        self.error_message = Some(message);
    }

    /// `completed | error -> removing`
    pub(crate) fn mark_removing(&mut self) {
        self.before_removal = Some(self.status);
        self.status = SlotStatus::Removing;
        self.error_message = None;
    }

    /// `removing -> completed | error`. A slot that was `completed` keeps its
    /// remote artifact and shows as ready again; the removal message is only
    /// attached when the slot goes back to `error`.
    pub(crate) fn roll_back_removal(&mut self, message: String) -> SlotStatus {
        let restored = self.before_removal.take().unwrap_or(SlotStatus::Completed);
        self.status = restored;
        self.error_message = match restored {
            SlotStatus::Error => Some(message),
            _ => None,
        };
        restored
    }
}

/// A file the server already holds, as reported by the listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub remote_path: String,
    pub original_name: String,
    pub size_bytes: u64,
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// Result of the startup listing call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteListing {
    pub inputs: Vec<RemoteFile>,
    pub references: Vec<RemoteFile>,
}

/// What the server returns for a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub remote_path: String,
    pub remote_id: String,
    pub original_name: String,
    pub size_bytes: u64,
}
