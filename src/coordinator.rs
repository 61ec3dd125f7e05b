//! Two-phase upload-and-link.
//!
//! A file is uploaded to the asset service first; only once it has a
//! canonical filename is that filename written into the owning record. When
//! the record write fails the uploaded file is deleted again so no orphan is
//! left behind.

use crate::assets::{AssetClient, AssetService};
use crate::config::{AssetLimits, Config};
use crate::models::{AssetKind, AssetReference, CleanupOutcome, FileUpload, Record};
use crate::records::{RecordClient, RecordService, RecordStore};
use crate::validation::{require_fields, validate};
use crate::{Error, Result};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{info, warn};

/// A record after a successful link, with the reference that was written
/// into it (`None` when the asset was cleared).
#[derive(Debug, Clone)]
pub struct LinkedRecord<E> {
    pub record: E,
    pub reference: Option<AssetReference>,
    /// Strictly increasing per coordinator; appended to the asset URL so a
    /// file overwritten in place is refetched.
    pub cache_token: i64,
}

impl<E> LinkedRecord<E> {
    pub fn asset_url(&self) -> Option<String> {
        self.reference
            .as_ref()
            .map(|reference| format!("{}?t={}", reference.served_path, self.cache_token))
    }
}

/// Result of deleting a record together with the files it referenced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// `false` when the record was already gone.
    pub removed: bool,
    pub assets: Vec<(String, CleanupOutcome)>,
}

impl DeleteOutcome {
    pub fn asset_failures(&self) -> impl Iterator<Item = &(String, CleanupOutcome)> {
        self.assets.iter().filter(|(_, outcome)| outcome.is_failure())
    }
}

/// Injectable service bundle used to construct [`UploadCoordinator`].
pub struct CoordinatorServices {
    pub assets: Box<dyn AssetService>,
    pub records: Box<dyn RecordService>,
}

pub struct UploadCoordinator {
    assets: Box<dyn AssetService>,
    records: RecordStore,
    limits: AssetLimits,
    last_token: AtomicI64,
}

impl UploadCoordinator {
    pub fn with_services(services: CoordinatorServices, limits: AssetLimits) -> Self {
        Self {
            assets: services.assets,
            records: RecordStore::new(services.records),
            limits,
            last_token: AtomicI64::new(0),
        }
    }

    /// HTTP clients for both services, sharing one connection pool.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        info!("Record store: {}", config.record_api_url);
        info!("Asset service: {}", config.asset_api_url);

        let services = CoordinatorServices {
            assets: Box::new(AssetClient::new_with_client(
                config.asset_api_url.clone(),
                http_client.clone(),
            )),
            records: Box::new(RecordClient::new_with_client(
                config.record_api_url.clone(),
                http_client,
            )),
        };
        Ok(Self::with_services(services, config.limits))
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn assets(&self) -> &dyn AssetService {
        self.assets.as_ref()
    }

    /// Upload `file` and store its filename in `record`'s `kind` field.
    ///
    /// A record without an id is created, one with an id gets a PATCH of the
    /// asset field only. `file == None` clears the field without touching the
    /// asset service.
    pub async fn link_asset<E: Record>(
        &self,
        kind: AssetKind,
        file: Option<FileUpload>,
        record: E,
    ) -> Result<LinkedRecord<E>> {
        let field = E::asset_field(kind).ok_or_else(|| {
            Error::field(
                "kind",
                format!("{} records have no {} field", E::COLLECTION, kind),
            )
        })?;
        let previous = record
            .asset_filenames()
            .into_iter()
            .find(|(candidate, _)| *candidate == kind)
            .map(|(_, filename)| filename);

        let Some(mut file) = file else {
            return self.clear_asset(field, record).await;
        };

        validate(kind, &file, &self.limits)?;
        if record.id().is_none() {
            require_fields(&serde_json::to_value(&record)?, E::REQUIRED_FIELDS, &[field])?;
        }
        if kind == AssetKind::Cv && file.desired_name.is_none() {
            file.desired_name = previous.as_deref().map(|name| file_stem(name).to_string());
        }

        let reference = self.assets.upload(kind, &file).await.map_err(|e| {
            warn!("Upload of {} '{}' failed: {}", kind, file.file_name, e);
            match e {
                Error::UploadFailed(_) => e,
                other => Error::UploadFailed(other.to_string()),
            }
        })?;
        info!("Uploaded {} as {}", kind, reference.filename);

        let filename = Value::String(reference.filename.clone());
        let written = match record.id() {
            Some(id) => self.records.update::<E>(id, json!({ field: filename })).await,
            None => {
                let record = with_field(&record, field, filename)?;
                self.records.create(&record).await
            }
        };

        let written = match written {
            Ok(written) => written,
            Err(e) => {
                let cleanup = if previous.as_deref() == Some(reference.filename.as_str()) {
                    CleanupOutcome::Retained
                } else {
                    self.cleanup(kind, &reference.filename).await
                };
                warn!(
                    "Saving {} record failed after uploading {}: {} ({})",
                    E::COLLECTION,
                    reference.filename,
                    e,
                    cleanup
                );
                return Err(Error::LinkFailed {
                    reason: e.to_string(),
                    filename: reference.filename,
                    cleanup,
                });
            }
        };

        // Some endpoints echo the record without the field we just wrote.
        let echoed = written
            .asset_filenames()
            .into_iter()
            .any(|(candidate, _)| candidate == kind);
        let record = if echoed {
            written
        } else {
            with_field(&written, field, Value::String(reference.filename.clone()))?
        };

        Ok(LinkedRecord {
            record,
            reference: Some(reference),
            cache_token: self.next_cache_token(),
        })
    }

    async fn clear_asset<E: Record>(&self, field: &str, record: E) -> Result<LinkedRecord<E>> {
        let empty = Value::String(String::new());
        let record = match record.id() {
            Some(id) => self.records.update::<E>(id, json!({ field: empty })).await?,
            None => {
                let record = with_field(&record, field, empty)?;
                self.records.create(&record).await?
            }
        };

        Ok(LinkedRecord {
            record,
            reference: None,
            cache_token: self.next_cache_token(),
        })
    }

    pub async fn list_records<E: Record>(&self) -> Result<Vec<E>> {
        self.records.list::<E>().await
    }

    pub async fn create_record<E: Record>(&self, record: &E) -> Result<E> {
        self.records.create(record).await
    }

    pub async fn update_record<E: Record>(&self, id: u64, fields: Value) -> Result<E> {
        self.records.update::<E>(id, fields).await
    }

    pub async fn replace_record<E: Record>(&self, record: &E) -> Result<E> {
        self.records.replace(record).await
    }

    /// Delete the record, then best-effort delete every file it referenced.
    /// A failed file delete never undoes the record deletion.
    pub async fn delete_record<E: Record>(&self, record: &E) -> Result<DeleteOutcome> {
        let id = record
            .id()
            .ok_or_else(|| Error::field("id", "Only stored records can be deleted."))?;
        let removed = self.records.delete::<E>(id).await?;

        let mut assets = Vec::new();
        for (kind, filename) in record.asset_filenames() {
            let outcome = self.cleanup(kind, &filename).await;
            if outcome.is_failure() {
                warn!(
                    "{}/{} deleted but {} {} was not: {}",
                    E::COLLECTION,
                    id,
                    kind,
                    filename,
                    outcome
                );
            }
            assets.push((filename, outcome));
        }

        Ok(DeleteOutcome { removed, assets })
    }

    /// Fetch by id and delete with [`Self::delete_record`]. A record that no
    /// longer exists is reported as not removed.
    pub async fn delete_by_id<E: Record>(&self, id: u64) -> Result<DeleteOutcome> {
        match self.records.get::<E>(id).await {
            Ok(record) => self.delete_record(&record).await,
            Err(Error::NotFound(_)) => Ok(DeleteOutcome {
                removed: false,
                assets: Vec::new(),
            }),
            Err(e) => Err(e),
        }
    }

    async fn cleanup(&self, kind: AssetKind, filename: &str) -> CleanupOutcome {
        match self.assets.delete(kind, filename).await {
            Ok(true) => CleanupOutcome::Removed,
            Ok(false) => CleanupOutcome::AlreadyGone,
            Err(e) => {
                warn!("Failed to delete {} {}: {}", kind, filename, e);
                CleanupOutcome::Failed(e.to_string())
            }
        }
    }

    fn next_cache_token(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let previous = self
            .last_token
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(previous + 1)
    }
}

/// Copy of `record` with one wire field replaced.
fn with_field<E: Record>(record: &E, field: &str, value: Value) -> Result<E> {
    let mut body = serde_json::to_value(record)?;
    match body.as_object_mut() {
        Some(map) => {
            map.insert(field.to_string(), value);
        }
        None => {
            return Err(Error::Generic(format!(
                "{} record is not a JSON object",
                E::COLLECTION
            )))
        }
    }
    Ok(serde_json::from_value(body)?)
}

fn file_stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MockAssetClient;
    use crate::mime::PDF;
    use crate::models::{Certificate, Collection, PersonalData, Project, Skill};
    use crate::records::MockRecordClient;
    use pretty_assertions::assert_eq;

    struct Harness {
        coordinator: UploadCoordinator,
        assets: MockAssetClient,
        records: MockRecordClient,
    }

    fn harness(assets: MockAssetClient, records: MockRecordClient) -> Harness {
        let coordinator = UploadCoordinator::with_services(
            CoordinatorServices {
                assets: Box::new(assets.clone()),
                records: Box::new(records.clone()),
            },
            AssetLimits::default(),
        );
        Harness {
            coordinator,
            assets,
            records,
        }
    }

    fn png(bytes: &[u8]) -> FileUpload {
        FileUpload::new("shot.png", Some("image/png".to_string()), bytes.to_vec())
    }

    fn new_project() -> Project {
        Project {
            titulo: "X".to_string(),
            descripcion: "Y".to_string(),
            tecnologias: "Go,React".to_string(),
            fecha: "2024-03-01".to_string(),
            ..Default::default()
        }
    }

    fn personal_data_store(foto: &str, cv: &str) -> MockRecordClient {
        MockRecordClient::new().with_record(
            Collection::PersonalData,
            json!({
                "id": 1,
                "nombre": "Ada",
                "profesion": "Engineer",
                "email": "ada@example.com",
                "foto_perfil": foto,
                "cv": cv
            }),
        )
    }

    #[tokio::test]
    async fn test_create_project_with_image() {
        let h = harness(MockAssetClient::new(), MockRecordClient::new());

        let linked = h
            .coordinator
            .link_asset(AssetKind::ProjectImage, Some(png(b"img")), new_project())
            .await
            .unwrap();

        let filename = linked.reference.as_ref().unwrap().filename.clone();
        assert_eq!(linked.record.imagen.as_deref(), Some(filename.as_str()));
        assert_eq!(linked.record.id, Some(1));
        assert_eq!(h.assets.get_upload_count(), 1);
        assert_eq!(h.records.get_create_count(), 1);
        assert!(h.assets.contains(AssetKind::ProjectImage, &filename));

        let stored = h.records.get_record(Collection::Projects, 1).unwrap();
        assert_eq!(stored["imagen"], filename.as_str());
        assert_eq!(
            linked.asset_url().unwrap(),
            format!("/assets/Proyectos/{}?t={}", filename, linked.cache_token)
        );
    }

    #[tokio::test]
    async fn test_upload_failure_skips_record_write() {
        let h = harness(
            MockAssetClient::new().with_upload_failure("connection refused"),
            MockRecordClient::new(),
        );

        let err = h
            .coordinator
            .link_asset(AssetKind::ProjectImage, Some(png(b"img")), new_project())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UploadFailed(ref m) if m == "connection refused"));
        assert_eq!(h.records.get_create_count(), 0);
        assert_eq!(h.assets.get_delete_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_file_makes_no_requests() {
        let h = harness(MockAssetClient::new(), MockRecordClient::new());
        let text = FileUpload::new("notes.txt", Some("text/plain".to_string()), b"hi".to_vec());

        let err = h
            .coordinator
            .link_asset(AssetKind::ProjectImage, Some(text), new_project())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidFileType { .. }));
        assert_eq!(h.assets.get_upload_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_required_fields_checked_before_upload() {
        let h = harness(MockAssetClient::new(), MockRecordClient::new());
        let certificate = Certificate {
            titulo: "Rust".to_string(),
            fecha: "2024-01-01".to_string(),
            ..Default::default()
        };

        let err = h
            .coordinator
            .link_asset(AssetKind::CertificateImage, Some(png(b"c")), certificate)
            .await
            .unwrap_err();

        match err {
            Error::Validation(errors) => {
                assert!(errors.contains_key("institucion"));
                assert!(!errors.contains_key("imagen"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(h.assets.get_upload_count(), 0);
    }

    #[tokio::test]
    async fn test_record_failure_removes_uploaded_file() {
        let h = harness(
            MockAssetClient::new(),
            MockRecordClient::new()
                .with_record(Collection::Projects, json!({"id": 7, "titulo": "X"}))
                .with_update_failure(500, "Internal Server Error"),
        );
        let project = Project {
            id: Some(7),
            ..new_project()
        };

        let err = h
            .coordinator
            .link_asset(AssetKind::ProjectImage, Some(png(b"img")), project)
            .await
            .unwrap_err();

        match err {
            Error::LinkFailed {
                filename, cleanup, ..
            } => {
                assert_eq!(cleanup, CleanupOutcome::Removed);
                assert!(!h.assets.contains(AssetKind::ProjectImage, &filename));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(h.assets.list(AssetKind::ProjectImage).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_cleanup_keeps_original_reason() {
        let h = harness(
            MockAssetClient::new().with_delete_failure("permission denied"),
            MockRecordClient::new().with_create_failure(400, r#"{"fecha": ["Invalid date."]}"#),
        );

        let err = h
            .coordinator
            .link_asset(AssetKind::ProjectImage, Some(png(b"img")), new_project())
            .await
            .unwrap_err();

        match err {
            Error::LinkFailed {
                reason, cleanup, ..
            } => {
                assert!(reason.contains("Invalid date."));
                assert!(matches!(
                    cleanup,
                    CleanupOutcome::Failed(ref m) if m.contains("permission denied")
                ));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_photo_overwrite_gets_fresh_token() {
        let h = harness(MockAssetClient::new(), personal_data_store("", ""));
        let record: PersonalData = h.coordinator.records().get(1).await.unwrap();

        let first = h
            .coordinator
            .link_asset(AssetKind::Photo, Some(png(b"first")), record)
            .await
            .unwrap();
        let second = h
            .coordinator
            .link_asset(AssetKind::Photo, Some(png(b"second")), first.record.clone())
            .await
            .unwrap();

        assert_eq!(first.record.foto_perfil.as_deref(), Some("foto.png"));
        assert_eq!(second.record.foto_perfil.as_deref(), Some("foto.png"));
        assert!(second.cache_token > first.cache_token);
        assert_ne!(first.asset_url(), second.asset_url());
        assert_eq!(h.assets.list(AssetKind::Photo).await.unwrap(), vec!["foto.png"]);
        assert_eq!(
            h.assets.get_file(AssetKind::Photo, "foto.png"),
            Some(b"second".to_vec())
        );
    }

    #[tokio::test]
    async fn test_record_failure_retains_file_still_referenced() {
        let h = harness(
            MockAssetClient::new(),
            personal_data_store("foto.png", "").with_update_failure(503, ""),
        );
        let record: PersonalData = h.coordinator.records().get(1).await.unwrap();

        let err = h
            .coordinator
            .link_asset(AssetKind::Photo, Some(png(b"new")), record)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::LinkFailed {
                cleanup: CleanupOutcome::Retained,
                ..
            }
        ));
        assert!(h.assets.contains(AssetKind::Photo, "foto.png"));
        assert_eq!(h.assets.get_delete_count(), 0);
    }

    #[tokio::test]
    async fn test_cv_with_desired_name() {
        let h = harness(MockAssetClient::new(), personal_data_store("", ""));
        let record: PersonalData = h.coordinator.records().get(1).await.unwrap();
        let file = FileUpload::new("resume.pdf", Some(PDF.to_string()), b"%PDF".to_vec())
            .with_desired_name("cv-final");

        let linked = h
            .coordinator
            .link_asset(AssetKind::Cv, Some(file), record)
            .await
            .unwrap();

        assert_eq!(linked.record.cv.as_deref(), Some("cv-final.pdf"));
        assert_eq!(
            linked.reference.unwrap().served_path,
            "/assets/DatosPersonales/documento/cv-final.pdf"
        );
        let stored = h.records.get_record(Collection::PersonalData, 1).unwrap();
        assert_eq!(stored["cv"], "cv-final.pdf");
    }

    #[tokio::test]
    async fn test_cv_desired_name_with_url_delimiters_is_rejected() {
        let h = harness(MockAssetClient::new(), personal_data_store("", ""));
        let record: PersonalData = h.coordinator.records().get(1).await.unwrap();
        let file = FileUpload::new("resume.pdf", Some(PDF.to_string()), b"%PDF".to_vec())
            .with_desired_name("cv#2");

        let err = h
            .coordinator
            .link_asset(AssetKind::Cv, Some(file), record)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation(ref e) if e.contains_key("filename")));
        assert_eq!(h.assets.get_upload_count(), 0);
        assert_eq!(h.records.get_update_count(), 0);
    }

    #[tokio::test]
    async fn test_cv_defaults_to_current_name() {
        let h = harness(MockAssetClient::new(), personal_data_store("", "mi-cv.pdf"));
        let record: PersonalData = h.coordinator.records().get(1).await.unwrap();
        let file = FileUpload::new("new.pdf", Some(PDF.to_string()), b"%PDF".to_vec());

        let linked = h
            .coordinator
            .link_asset(AssetKind::Cv, Some(file), record)
            .await
            .unwrap();

        assert_eq!(linked.record.cv.as_deref(), Some("mi-cv.pdf"));
    }

    #[tokio::test]
    async fn test_clearing_asset_skips_asset_service() {
        let h = harness(MockAssetClient::new(), personal_data_store("foto.png", ""));
        let record: PersonalData = h.coordinator.records().get(1).await.unwrap();

        let linked = h
            .coordinator
            .link_asset(AssetKind::Photo, None, record)
            .await
            .unwrap();

        assert_eq!(linked.record.foto_perfil.as_deref(), Some(""));
        assert!(linked.asset_url().is_none());
        assert_eq!(h.assets.get_upload_count(), 0);
        assert_eq!(h.assets.get_delete_count(), 0);
    }

    #[tokio::test]
    async fn test_kind_must_belong_to_record() {
        let h = harness(MockAssetClient::new(), MockRecordClient::new());
        let skill = Skill {
            nombre: "Rust".to_string(),
            categoria: "Backend".to_string(),
            ..Default::default()
        };

        let err = h
            .coordinator
            .link_asset(AssetKind::Photo, Some(png(b"x")), skill)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ref e) if e.contains_key("kind")));
    }

    #[tokio::test]
    async fn test_delete_project_removes_image() {
        let h = harness(
            MockAssetClient::new().with_file(AssetKind::ProjectImage, "proyecto-1.png", vec![1]),
            MockRecordClient::new().with_record(
                Collection::Projects,
                json!({"id": 3, "titulo": "X", "imagen": "proyecto-1.png"}),
            ),
        );

        let outcome = h.coordinator.delete_by_id::<Project>(3).await.unwrap();

        assert!(outcome.removed);
        assert_eq!(
            outcome.assets,
            vec![("proyecto-1.png".to_string(), CleanupOutcome::Removed)]
        );
        assert!(h.records.get_records(Collection::Projects).is_empty());
        assert!(!h.assets.contains(AssetKind::ProjectImage, "proyecto-1.png"));
    }

    #[tokio::test]
    async fn test_delete_keeps_going_when_file_delete_fails() {
        let h = harness(
            MockAssetClient::new().with_delete_failure("disk busy"),
            MockRecordClient::new().with_record(
                Collection::Certificates,
                json!({"id": 2, "titulo": "T", "imagen": "/assets/Certificados/c.png"}),
            ),
        );
        let certificate: Certificate = h.coordinator.records().get(2).await.unwrap();

        let outcome = h.coordinator.delete_record(&certificate).await.unwrap();

        assert!(outcome.removed);
        assert_eq!(outcome.asset_failures().count(), 1);
        assert_eq!(outcome.assets[0].0, "c.png");
    }

    #[tokio::test]
    async fn test_delete_missing_record() {
        let h = harness(MockAssetClient::new(), MockRecordClient::new());

        let outcome = h.coordinator.delete_by_id::<Project>(42).await.unwrap();
        assert!(!outcome.removed);
        assert!(outcome.assets.is_empty());
    }

    #[test]
    fn test_cache_tokens_strictly_increase() {
        let h = harness(MockAssetClient::new(), MockRecordClient::new());
        let tokens: Vec<i64> = (0..100).map(|_| h.coordinator.next_cache_token()).collect();
        assert!(tokens.windows(2).all(|pair| pair[1] > pair[0]));
    }
}
