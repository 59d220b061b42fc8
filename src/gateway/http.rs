use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::wire::{error_detail, FilesListing, HealthResponse, UploadResponse, ValidateResponse};
use super::{FileGateway, ValidationGateway, ValidationRequest};
use crate::config::ApiConfig;
use crate::error::{DeleteError, TransportError, UploadError};
use crate::session::{LocalFile, RemoteListing, SlotRole, UploadedFile};
use crate::validation::ValidationResult;

const USER_AGENT: &str = concat!("doc-validator/", env!("CARGO_PKG_VERSION"));

/// reqwest-backed client for the validation backend.
pub struct HttpGateway {
    client: Client,
    base_url: String,
    upload_timeout: Duration,
}

impl HttpGateway {
    pub fn new(config: &ApiConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            upload_timeout: Duration::from_secs(config.upload_timeout_secs),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-2xx response into a status error carrying the backend's
    /// `detail` text when there is one.
    async fn check(response: Response) -> Result<Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = error_detail(&body)
            .unwrap_or_else(|| format!("HTTP error! status: {}", status.as_u16()));
        Err(TransportError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, TransportError> {
        response
            .json::<T>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

fn network(err: reqwest::Error) -> TransportError {
    TransportError::Network(err.to_string())
}

#[async_trait]
impl FileGateway for HttpGateway {
    async fn list_existing(&self) -> Result<RemoteListing, TransportError> {
        let response = self.client.get(self.url("/files/all")).send().await.map_err(network)?;
        let listing: FilesListing = Self::decode(Self::check(response).await?).await?;
        debug!(
            inputs = listing.input_files.len(),
            references = listing.reference_files.len(),
            "fetched remote listing"
        );
        Ok(listing.into())
    }

    async fn upload(&self, role: SlotRole, file: &LocalFile) -> Result<UploadedFile, UploadError> {
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| UploadError::new(e.to_string()))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.url(&format!("/upload/{}", role.as_str())))
            .timeout(self.upload_timeout)
            .multipart(form)
            .send()
            .await
            .map_err(network)?;

        let body: UploadResponse = Self::decode(Self::check(response).await?).await?;
        body.into_uploaded()
    }

    async fn delete_by_path(&self, remote_path: &str) -> Result<(), DeleteError> {
        let response = self
            .client
            .delete(self.url("/files/delete"))
            .query(&[("file_path", remote_path)])
            .send()
            .await
            .map_err(network)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn health(&self) -> Result<String, TransportError> {
        let response = self.client.get(self.url("/health")).send().await.map_err(network)?;
        let body: HealthResponse = Self::decode(Self::check(response).await?).await?;
        Ok(body.status)
    }
}

#[async_trait]
impl ValidationGateway for HttpGateway {
    async fn validate(
        &self,
        request: &ValidationRequest,
    ) -> Result<ValidationResult, TransportError> {
        let mut form = Form::new().text("input_path", request.input_path.clone());
        for path in &request.reference_paths {
            form = form.text("reference_paths", path.clone());
        }
        form = form.text("instructions", request.instructions.clone());

        let response = self
            .client
            .post(self.url("/validate"))
            .multipart(form)
            .send()
            .await
            .map_err(network)?;
        let body: ValidateResponse = Self::decode(Self::check(response).await?).await?;
        Ok(body.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = ApiConfig {
            base_url: "http://localhost:8000/".into(),
            ..ApiConfig::default()
        };
        let gateway = HttpGateway::new(&config).unwrap();
        assert_eq!(gateway.base_url(), "http://localhost:8000");
        assert_eq!(gateway.url("/files/all"), "http://localhost:8000/files/all");
    }
}
