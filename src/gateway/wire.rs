//! JSON bodies exchanged with the validation backend.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::UploadError;
use crate::session::{RemoteFile, RemoteListing, UploadedFile};
use crate::validation::{Finding, Severity, ValidationResult};

const DEFAULT_CATEGORY: &str = "General";
const RAW_REPORT_CATEGORY: &str = "Report";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub file_path: String,
    #[serde(default)]
    pub original_filename: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub upload_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilesListing {
    #[serde(default)]
    pub input_files: Vec<FileInfo>,
    #[serde(default)]
    pub reference_files: Vec<FileInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub file_id: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub original_filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFinding {
    pub content: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub findings: Option<Vec<WireFinding>>,
    #[serde(default)]
    pub raw_output: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

/// Parse a backend timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|naive| naive.and_utc())
        })
}

/// Pull the human message out of an error body: `{"detail": "..."}` or
/// `{"detail": {"message": "..."}}`.
pub fn error_detail(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    match parsed.detail? {
        serde_json::Value::String(text) if !text.trim().is_empty() => Some(text),
        serde_json::Value::Object(map) => map
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
        _ => None,
    }
}

impl From<FileInfo> for RemoteFile {
    fn from(info: FileInfo) -> Self {
        let uploaded_at = info.upload_date.as_deref().and_then(parse_timestamp);
        let original_name = if info.original_filename.is_empty() {
            info.file_path
                .rsplit('/')
                .next()
                .unwrap_or(&info.file_path)
                .to_string()
        } else {
            info.original_filename
        };
        Self {
            remote_path: info.file_path,
            original_name,
            size_bytes: info.file_size,
            uploaded_at,
        }
    }
}

impl From<FilesListing> for RemoteListing {
    fn from(listing: FilesListing) -> Self {
        Self {
            inputs: listing.input_files.into_iter().map(RemoteFile::from).collect(),
            references: listing.reference_files.into_iter().map(RemoteFile::from).collect(),
        }
    }
}

impl UploadResponse {
    /// A `success: false` body or one without a path is an upload failure.
    pub fn into_uploaded(self) -> Result<UploadedFile, UploadError> {
        if !self.success {
            let message = if self.message.trim().is_empty() {
                "Upload failed".to_string()
            } else {
                self.message
            };
            return Err(UploadError::new(message));
        }
        if self.file_path.is_empty() {
            return Err(UploadError::new("Upload response did not include a file path"));
        }
        Ok(UploadedFile {
            remote_path: self.file_path,
            remote_id: self.file_id,
            original_name: self.original_filename,
            size_bytes: self.file_size,
        })
    }
}

impl From<WireFinding> for Finding {
    fn from(wire: WireFinding) -> Self {
        let category = wire
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
        Finding {
            content: wire.content,
            severity: Severity::parse_lenient(&wire.severity),
            category,
        }
    }
}

impl From<ValidateResponse> for ValidationResult {
    fn from(response: ValidateResponse) -> Self {
        let findings = match (response.findings, response.raw_output) {
            (Some(findings), _) => findings.into_iter().map(Finding::from).collect(),
            (None, Some(raw)) if !raw.trim().is_empty() => {
                vec![Finding::new(RAW_REPORT_CATEGORY, Severity::Info, raw)]
            }
            _ => Vec::new(),
        };
        ValidationResult {
            succeeded: response.success,
            summary_message: response.message,
            findings,
        }
    }
}
