use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// A document picked by the user, captured in full before upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl LocalFile {
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let mime_type = guess_mime_type(&name);
        Self {
            name,
            mime_type,
            bytes,
        }
    }

    /// Read a file from disk. `~` is expanded; the slot name is the file name
    /// without its directory.
    pub async fn read(path: &str) -> Result<Self> {
        let expanded = PathBuf::from(shellexpand::tilde(path).to_string());
        let bytes = fs::read(&expanded)
            .await
            .with_context(|| format!("Failed to read {}", expanded.display()))?;
        let name = expanded
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("{} has no file name", expanded.display()))?;
        Ok(Self::from_bytes(name, bytes))
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Whether `filename` has one of the accepted extensions. An empty list
/// accepts everything.
pub fn is_accepted(filename: &str, accepted: &[String]) -> bool {
    if accepted.is_empty() {
        return true;
    }
    let Some(ext) = Path::new(filename).extension().and_then(|e| e.to_str()) else {
        return false;
    };
    accepted
        .iter()
        .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

/// Guess MIME type from filename extension.
pub fn guess_mime_type(filename: &str) -> String {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "json" => "application/json",
        "xml" => "application/xml",
        "html" | "htm" => "text/html",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
    .to_string()
}
