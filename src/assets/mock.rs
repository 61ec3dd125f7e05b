use super::AssetService;
use crate::config::AssetLimits;
use crate::models::{AssetKind, AssetReference, FileUpload};
use crate::storage::PHOTO_FILENAME;
use crate::validation::validate;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-memory asset service. Names files the way the real service does, with
/// a counter in place of timestamps so tests are deterministic.
#[derive(Clone)]
pub struct MockAssetClient {
    files: Arc<Mutex<HashMap<(AssetKind, String), Vec<u8>>>>,
    limits: AssetLimits,
    upload_count: Arc<Mutex<usize>>,
    delete_count: Arc<Mutex<usize>>,
    fail_uploads: Arc<Mutex<Option<String>>>,
    fail_deletes: Arc<Mutex<Option<String>>>,
}

impl MockAssetClient {
    pub fn new() -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            limits: AssetLimits::default(),
            upload_count: Arc::new(Mutex::new(0)),
            delete_count: Arc::new(Mutex::new(0)),
            fail_uploads: Arc::new(Mutex::new(None)),
            fail_deletes: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_file(self, kind: AssetKind, filename: &str, content: Vec<u8>) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert((kind, filename.to_string()), content);
        self
    }

    pub fn with_upload_failure(self, reason: &str) -> Self {
        *self.fail_uploads.lock().unwrap() = Some(reason.to_string());
        self
    }

    pub fn with_delete_failure(self, reason: &str) -> Self {
        *self.fail_deletes.lock().unwrap() = Some(reason.to_string());
        self
    }

    pub fn get_upload_count(&self) -> usize {
        *self.upload_count.lock().unwrap()
    }

    pub fn get_delete_count(&self) -> usize {
        *self.delete_count.lock().unwrap()
    }

    pub fn contains(&self, kind: AssetKind, filename: &str) -> bool {
        self.files
            .lock()
            .unwrap()
            .contains_key(&(kind, filename.to_string()))
    }

    pub fn get_file(&self, kind: AssetKind, filename: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(&(kind, filename.to_string()))
            .cloned()
    }

    fn filename_for(&self, kind: AssetKind, file: &FileUpload, sequence: usize) -> String {
        let extension = file.extension().unwrap_or_else(|| "bin".to_string());
        match kind {
            AssetKind::Photo => PHOTO_FILENAME.to_string(),
            AssetKind::Cv => match file.desired_name.as_deref().filter(|n| !n.is_empty()) {
                Some(name) => format!("{}.{}", name, extension),
                None => format!("cv-{}.{}", sequence, extension),
            },
            AssetKind::ProjectImage => format!("proyecto-{}.{}", sequence, extension),
            AssetKind::CertificateImage => format!("certificado-{}.{}", sequence, extension),
        }
    }
}

impl Default for MockAssetClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetService for MockAssetClient {
    async fn upload(&self, kind: AssetKind, file: &FileUpload) -> Result<AssetReference> {
        let sequence = {
            let mut count = self.upload_count.lock().unwrap();
            *count += 1;
            *count
        };

        if let Some(reason) = self.fail_uploads.lock().unwrap().clone() {
            return Err(Error::UploadFailed(reason));
        }
        validate(kind, file, &self.limits)?;

        let filename = self.filename_for(kind, file, sequence);
        self.files
            .lock()
            .unwrap()
            .insert((kind, filename.clone()), file.data.clone());
        Ok(AssetReference::new(kind, filename))
    }

    async fn delete(&self, kind: AssetKind, filename: &str) -> Result<bool> {
        let mut count = self.delete_count.lock().unwrap();
        *count += 1;

        if let Some(reason) = self.fail_deletes.lock().unwrap().clone() {
            return Err(Error::Request {
                status: Some(500),
                message: reason,
            });
        }

        Ok(self
            .files
            .lock()
            .unwrap()
            .remove(&(kind, filename.to_string()))
            .is_some())
    }

    async fn list(&self, kind: AssetKind) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .files
            .lock()
            .unwrap()
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(bytes: &[u8]) -> FileUpload {
        FileUpload::new("shot.png", Some("image/png".to_string()), bytes.to_vec())
    }

    #[tokio::test]
    async fn test_mock_upload_delete_list() {
        let client = MockAssetClient::new();

        let reference = client
            .upload(AssetKind::ProjectImage, &png(b"x"))
            .await
            .unwrap();
        assert_eq!(reference.filename, "proyecto-1.png");
        assert_eq!(client.get_upload_count(), 1);
        assert_eq!(
            client.list(AssetKind::ProjectImage).await.unwrap(),
            vec!["proyecto-1.png"]
        );

        assert!(client
            .delete(AssetKind::ProjectImage, "proyecto-1.png")
            .await
            .unwrap());
        assert!(!client
            .delete(AssetKind::ProjectImage, "proyecto-1.png")
            .await
            .unwrap());
        assert_eq!(client.get_delete_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_photo_overwrites() {
        let client = MockAssetClient::new();

        client.upload(AssetKind::Photo, &png(b"one")).await.unwrap();
        client.upload(AssetKind::Photo, &png(b"two")).await.unwrap();

        assert_eq!(client.list(AssetKind::Photo).await.unwrap(), vec!["foto.png"]);
        assert_eq!(
            client.get_file(AssetKind::Photo, "foto.png"),
            Some(b"two".to_vec())
        );
    }

    #[tokio::test]
    async fn test_mock_validates_before_storing() {
        let client = MockAssetClient::new();
        let text = FileUpload::new("notes.txt", Some("text/plain".to_string()), b"hi".to_vec());

        let err = client.upload(AssetKind::Photo, &text).await.unwrap_err();
        assert!(matches!(err, Error::InvalidFileType { .. }));
        assert!(client.list(AssetKind::Photo).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mock_failures() {
        let client = MockAssetClient::new()
            .with_file(AssetKind::Cv, "cv.pdf", b"%PDF".to_vec())
            .with_upload_failure("service down")
            .with_delete_failure("permission denied");

        let err = client.upload(AssetKind::Photo, &png(b"x")).await.unwrap_err();
        assert!(matches!(err, Error::UploadFailed(_)));

        assert!(client.delete(AssetKind::Cv, "cv.pdf").await.is_err());
        assert!(client.contains(AssetKind::Cv, "cv.pdf"));
    }
}
