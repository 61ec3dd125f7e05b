use super::AssetService;
use crate::models::{strip_asset_path, AssetKind, AssetReference, FileUpload};
use crate::response::error_from_response;
use crate::validation::validate_filename;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// HTTP client for the asset storage service (`server` module).
pub struct AssetClient {
    client: Client,
    base_url: String,
}

/// The upload routes answer with different shapes per kind; every variant
/// carries the stored name in one of these fields.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    success: Option<bool>,
    filename: Option<String>,
    foto_perfil: Option<String>,
    cv_nombre: Option<String>,
    file: Option<UploadedFile>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    filename: Option<String>,
}

impl UploadResponse {
    fn stored_filename(&self) -> Option<&str> {
        self.filename
            .as_deref()
            .or(self.foto_perfil.as_deref())
            .or(self.cv_nombre.as_deref())
            .or(self.file.as_ref().and_then(|f| f.filename.as_deref()))
            .map(|name| {
                // A bare name is taken as-is; only served paths and URLs are cut down.
                if name.contains('/') {
                    strip_asset_path(name)
                } else {
                    name.trim()
                }
            })
            .filter(|name| !name.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    deleted: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    files: Vec<String>,
}

impl AssetClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::new_with_client(base_url, client))
    }

    pub fn new_with_client(base_url: String, client: Client) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn upload_route(kind: AssetKind) -> (&'static str, &'static str) {
        match kind {
            AssetKind::Photo => ("/api/upload", "foto"),
            AssetKind::Cv => ("/api/upload-cv", "cv"),
            AssetKind::ProjectImage => ("/api/proyectos/upload", "imagen"),
            AssetKind::CertificateImage => ("/api/certificados/upload", "imagen"),
        }
    }

    fn delete_route(kind: AssetKind) -> [&'static str; 3] {
        match kind {
            AssetKind::ProjectImage => ["api", "proyectos", "imagen"],
            AssetKind::CertificateImage => ["api", "certificados", "imagen"],
            _ => ["api", "assets", kind.slug()],
        }
    }

    /// The filename is pushed as one percent-encoded path segment.
    fn delete_url(&self, kind: AssetKind, filename: &str) -> Result<Url> {
        let invalid = || Error::Config(format!("Invalid asset service URL: {}", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(Self::delete_route(kind))
            .push(filename);
        Ok(url)
    }

    fn build_form(kind: AssetKind, field: &'static str, file: &FileUpload) -> Result<Form> {
        let mut part = Part::bytes(file.data.clone()).file_name(file.file_name.clone());
        if let Some(content_type) = file.content_type.as_deref() {
            part = part.mime_str(content_type)?;
        }

        let mut form = Form::new().part(field, part);
        if kind == AssetKind::Cv {
            if let Some(name) = file.desired_name.as_deref().filter(|n| !n.trim().is_empty()) {
                form = form.text("cv_nombre", name.to_string());
            }
        }
        Ok(form)
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse asset service response: {}\nBody: {}", e, body);
            Error::Request {
                status: None,
                message: format!("Unexpected asset service response: {}", e),
            }
        })
    }
}

#[async_trait]
impl AssetService for AssetClient {
    async fn upload(&self, kind: AssetKind, file: &FileUpload) -> Result<AssetReference> {
        let (path, field) = Self::upload_route(kind);
        let url = format!("{}{}", self.base_url, path);
        let form = Self::build_form(kind, field, file)?;

        tracing::debug!("Uploading {} '{}' to {}", kind, file.file_name, url);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send upload to asset service: {}", e);
                Error::UploadFailed(e.to_string())
            })?;

        if !response.status().is_success() {
            let err = error_from_response(response).await;
            tracing::error!("Asset service rejected {} upload: {}", kind, err);
            return Err(err);
        }

        let body: UploadResponse = Self::parse(response).await?;
        if body.success == Some(false) {
            return Err(Error::UploadFailed(
                body.error
                    .unwrap_or_else(|| "asset service reported failure".to_string()),
            ));
        }

        let filename = body.stored_filename().ok_or_else(|| {
            Error::UploadFailed("asset service response did not include a filename".to_string())
        })?;

        Ok(AssetReference::new(kind, filename))
    }

    async fn delete(&self, kind: AssetKind, filename: &str) -> Result<bool> {
        validate_filename(filename)?;
        let url = self.delete_url(kind, filename)?;

        let response = self.client.delete(url).send().await.map_err(|e| {
            tracing::error!("Failed to send delete to asset service: {}", e);
            e
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body: DeleteResponse = Self::parse(response).await?;
        Ok(body.deleted.unwrap_or(true))
    }

    async fn list(&self, kind: AssetKind) -> Result<Vec<String>> {
        let url = format!("{}/api/assets/{}", self.base_url, kind.slug());

        let response = self.client.get(&url).send().await.map_err(|e| {
            tracing::error!("Failed to list assets: {}", e);
            e
        })?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body: ListResponse = Self::parse(response).await?;
        Ok(body.files)
    }
}
