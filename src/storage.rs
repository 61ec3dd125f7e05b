//! Filesystem-backed asset storage
//!
//! One directory per asset kind under a common root. Files are written to a
//! temp file in the destination directory and renamed into place, so readers
//! never observe a partial file and an overwrite replaces the old content in
//! one step.

use crate::assets::AssetService;
use crate::config::AssetLimits;
use crate::models::{AssetKind, AssetReference, FileUpload};
use crate::validation::{validate, validate_filename};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Canonical stored name of the profile photo.
pub const PHOTO_FILENAME: &str = "foto.png";

const TEMP_PREFIX: &str = ".upload-";

pub struct AssetStore {
    root: PathBuf,
    limits: AssetLimits,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>, limits: AssetLimits) -> Self {
        Self {
            root: root.into(),
            limits,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn limits(&self) -> &AssetLimits {
        &self.limits
    }

    pub fn path_for(&self, kind: AssetKind, filename: &str) -> PathBuf {
        self.root.join(kind.directory()).join(filename)
    }

    /// Store the profile photo under its canonical name, replacing any
    /// previous photo.
    pub async fn upload_photo(&self, file: &FileUpload) -> Result<AssetReference> {
        validate(AssetKind::Photo, file, &self.limits)?;
        self.store(AssetKind::Photo, PHOTO_FILENAME, file).await
    }

    /// Store a CV as `desired_name.<ext>` (replacing an existing file of that
    /// name) or as `cv-<millis>.<ext>`.
    pub async fn upload_cv(
        &self,
        file: &FileUpload,
        desired_name: Option<&str>,
    ) -> Result<AssetReference> {
        validate(AssetKind::Cv, file, &self.limits)?;
        let filename = cv_filename(file, desired_name)?;
        self.store(AssetKind::Cv, &filename, file).await
    }

    pub async fn upload_project_image(&self, file: &FileUpload) -> Result<AssetReference> {
        validate(AssetKind::ProjectImage, file, &self.limits)?;
        let filename = unique_filename("proyecto", file);
        self.store(AssetKind::ProjectImage, &filename, file).await
    }

    pub async fn upload_certificate_image(&self, file: &FileUpload) -> Result<AssetReference> {
        validate(AssetKind::CertificateImage, file, &self.limits)?;
        let filename = unique_filename("certificado", file);
        self.store(AssetKind::CertificateImage, &filename, file).await
    }

    /// Remove a stored file. Returns `false` when it did not exist.
    pub async fn delete(&self, kind: AssetKind, filename: &str) -> Result<bool> {
        validate_filename(filename)?;
        let path = self.path_for(kind, filename);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted {} {}", kind, path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} {} already gone", kind, path.display());
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stored filenames of one kind, sorted. In-flight temp files are skipped.
    pub async fn list(&self, kind: AssetKind) -> Result<Vec<String>> {
        let dir = self.root.join(kind.directory());
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn store(
        &self,
        kind: AssetKind,
        filename: &str,
        file: &FileUpload,
    ) -> Result<AssetReference> {
        let dir = self.root.join(kind.directory());
        // The service may run before anything was ever uploaded.
        tokio::fs::create_dir_all(&dir).await?;

        let destination = dir.join(filename);
        let data = file.data.clone();
        tokio::task::spawn_blocking({
            let dir = dir.clone();
            let destination = destination.clone();
            move || write_atomic(&dir, &destination, &data)
        })
        .await
        .map_err(|e| Error::Generic(format!("Asset write task join error: {}", e)))??;

        info!(
            "Stored {} '{}' as {} ({} bytes)",
            kind,
            file.file_name,
            destination.display(),
            file.size()
        );
        Ok(AssetReference::new(kind, filename))
    }
}

/// Write to a temp file next to `destination`, then rename over it. The temp
/// file is removed if any step fails.
fn write_atomic(dir: &Path, destination: &Path, data: &[u8]) -> Result<()> {
    let mut temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(destination).map_err(|e| e.error)?;
    Ok(())
}

fn cv_filename(file: &FileUpload, desired_name: Option<&str>) -> Result<String> {
    let extension = document_extension(file);
    match desired_name.map(str::trim).filter(|name| !name.is_empty()) {
        Some(desired) => {
            validate_filename(desired)?;
            let stem = strip_document_extension(desired);
            Ok(format!("{}.{}", stem, extension))
        }
        None => Ok(format!("cv-{}.{}", Utc::now().timestamp_millis(), extension)),
    }
}

/// `cv-final.pdf` -> `cv-final`; other dots are part of the name.
fn strip_document_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && ["pdf", "doc", "docx"].contains(&ext.to_ascii_lowercase().as_str()) =>
        {
            stem
        }
        _ => name,
    }
}

fn document_extension(file: &FileUpload) -> String {
    if let Some(ext) = file.extension() {
        return ext;
    }
    let content_type = file
        .content_type
        .as_deref()
        .map(crate::mime::essence)
        .unwrap_or_default();
    match content_type.as_str() {
        crate::mime::DOC => "doc".to_string(),
        crate::mime::DOCX => "docx".to_string(),
        _ => "pdf".to_string(),
    }
}

/// `<prefix>-<millis>-<random>.<ext>`; unique across concurrent uploads.
fn unique_filename(prefix: &str, file: &FileUpload) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    let extension = file.extension().unwrap_or_else(|| "png".to_string());
    format!(
        "{}-{}-{}.{}",
        prefix,
        Utc::now().timestamp_millis(),
        suffix,
        extension
    )
}

/// In-process transport: lets the coordinator run against local storage
/// without the HTTP hop.
#[async_trait]
impl AssetService for AssetStore {
    async fn upload(&self, kind: AssetKind, file: &FileUpload) -> Result<AssetReference> {
        match kind {
            AssetKind::Photo => self.upload_photo(file).await,
            AssetKind::Cv => self.upload_cv(file, file.desired_name.as_deref()).await,
            AssetKind::ProjectImage => self.upload_project_image(file).await,
            AssetKind::CertificateImage => self.upload_certificate_image(file).await,
        }
    }

    async fn delete(&self, kind: AssetKind, filename: &str) -> Result<bool> {
        AssetStore::delete(self, kind, filename).await
    }

    async fn list(&self, kind: AssetKind) -> Result<Vec<String>> {
        AssetStore::list(self, kind).await
    }
}
