//! Data models and structures
//!
//! Defines the asset kinds handled by the storage service, the upload
//! payload exchanged with it, and the portfolio records persisted in the
//! remote record store.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Class of binary asset. Each kind owns one directory under the assets root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Photo,
    Cv,
    ProjectImage,
    CertificateImage,
}

impl AssetKind {
    pub const ALL: [AssetKind; 4] = [
        AssetKind::Photo,
        AssetKind::Cv,
        AssetKind::ProjectImage,
        AssetKind::CertificateImage,
    ];

    /// Directory relative to the assets root.
    pub fn directory(self) -> &'static str {
        match self {
            AssetKind::Photo => "DatosPersonales/foto",
            AssetKind::Cv => "DatosPersonales/documento",
            AssetKind::ProjectImage => "Proyectos",
            AssetKind::CertificateImage => "Certificados",
        }
    }

    /// Path segment used by the generic `/api/assets/:kind` routes.
    pub fn slug(self) -> &'static str {
        match self {
            AssetKind::Photo => "foto",
            AssetKind::Cv => "documento",
            AssetKind::ProjectImage => "proyectos",
            AssetKind::CertificateImage => "certificados",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.slug() == slug)
    }

    /// Public path the file is served from.
    pub fn served_path(self, filename: &str) -> String {
        format!("/assets/{}/{}", self.directory(), filename)
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AssetKind::Photo => "profile photo",
            AssetKind::Cv => "CV",
            AssetKind::ProjectImage => "project image",
            AssetKind::CertificateImage => "certificate image",
        };
        f.write_str(label)
    }
}

/// A stored asset. `served_path` is always derived from `kind` + `filename`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetReference {
    pub kind: AssetKind,
    pub filename: String,
    pub served_path: String,
}

impl AssetReference {
    pub fn new(kind: AssetKind, filename: impl Into<String>) -> Self {
        let filename = filename.into();
        Self {
            kind,
            served_path: kind.served_path(&filename),
            filename,
        }
    }
}

/// One file on its way to the storage service.
#[derive(Debug, Clone)]
pub struct FileUpload {
    /// Original client-side file name; only its extension is kept.
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
    /// Requested stored name (CV only), without extension.
    pub desired_name: Option<String>,
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, content_type: Option<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            data,
            desired_name: None,
        }
    }

    /// Read a file from disk, guessing its content type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::Generic(format!("Invalid file path: {}", path.display())))?
            .to_string();
        let content_type = mime_guess::from_path(path)
            .first()
            .map(|mime| mime.essence_str().to_string());

        Ok(Self::new(file_name, content_type, data))
    }

    pub fn with_desired_name(mut self, name: impl Into<String>) -> Self {
        self.desired_name = Some(name.into());
        self
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Lowercase extension of the original file name, without the dot.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .map(|ext| ext.to_ascii_lowercase())
    }
}

/// What happened to an uploaded file after its record write failed, or to a
/// record's files after the record was deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    Removed,
    AlreadyGone,
    /// Same filename the record already pointed at; deleting would orphan it.
    Retained,
    Failed(String),
}

impl CleanupOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, CleanupOutcome::Failed(_))
    }
}

impl fmt::Display for CleanupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanupOutcome::Removed => f.write_str("uploaded file removed"),
            CleanupOutcome::AlreadyGone => f.write_str("uploaded file was already gone"),
            CleanupOutcome::Retained => {
                f.write_str("uploaded file kept, it is still referenced by the record")
            }
            CleanupOutcome::Failed(reason) => {
                write!(f, "cleanup of uploaded file failed: {}", reason)
            }
        }
    }
}

/// Resource collection exposed by the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    PersonalData,
    Projects,
    Certificates,
    Skills,
    SocialLinks,
    Experience,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::PersonalData,
        Collection::Projects,
        Collection::Certificates,
        Collection::Skills,
        Collection::SocialLinks,
        Collection::Experience,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Collection::PersonalData => "datos-personales",
            Collection::Projects => "proyectos",
            Collection::Certificates => "certificados",
            Collection::Skills => "skills",
            Collection::SocialLinks => "redes-sociales",
            Collection::Experience => "experiencias",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Collection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|collection| collection.path() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|c| c.path()).collect();
                Error::Generic(format!(
                    "Unknown collection '{}'. Expected one of: {}",
                    s,
                    known.join(", ")
                ))
            })
    }
}

/// A portfolio entity stored in the record store.
///
/// Field lists are expressed in wire names so validation and date
/// normalization can run on the serialized JSON body.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;
    const REQUIRED_FIELDS: &'static [&'static str];
    const DATE_FIELDS: &'static [&'static str] = &[];
    const ASSET_FIELDS: &'static [(AssetKind, &'static str)] = &[];

    fn id(&self) -> Option<u64>;

    fn asset_field(kind: AssetKind) -> Option<&'static str> {
        Self::ASSET_FIELDS
            .iter()
            .find(|(candidate, _)| *candidate == kind)
            .map(|(_, field)| *field)
    }

    /// Non-empty asset filenames currently referenced by this record.
    fn asset_filenames(&self) -> Vec<(AssetKind, String)> {
        let Ok(serde_json::Value::Object(map)) = serde_json::to_value(self) else {
            return Vec::new();
        };

        Self::ASSET_FIELDS
            .iter()
            .filter_map(|(kind, field)| {
                map.get(*field)
                    .and_then(|value| value.as_str())
                    .map(strip_asset_path)
                    .filter(|name| !name.is_empty())
                    .map(|name| (*kind, name.to_string()))
            })
            .collect()
    }
}

/// Records sometimes carry a full URL or served path (with a cache-busting
/// query) instead of a bare filename.
pub fn strip_asset_path(value: &str) -> &str {
    let without_query = value.split(['?', '#']).next().unwrap_or_default();
    without_query
        .rsplit('/')
        .next()
        .unwrap_or(without_query)
        .trim()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PersonalData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub nombre: String,
    #[serde(default)]
    pub profesion: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telefono: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direccion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descripcion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foto_perfil: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv: Option<String>,
}

impl Record for PersonalData {
    const COLLECTION: Collection = Collection::PersonalData;
    const REQUIRED_FIELDS: &'static [&'static str] = &["nombre", "profesion", "email"];
    const ASSET_FIELDS: &'static [(AssetKind, &'static str)] =
        &[(AssetKind::Photo, "foto_perfil"), (AssetKind::Cv, "cv")];

    fn id(&self) -> Option<u64> {
        self.id
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Project {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub titulo: String,
    #[serde(default)]
    pub descripcion: String,
    #[serde(default)]
    pub tecnologias: String,
    #[serde(default)]
    pub fecha: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imagen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enlace_demo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enlace_codigo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
}

impl Record for Project {
    const COLLECTION: Collection = Collection::Projects;
    const REQUIRED_FIELDS: &'static [&'static str] =
        &["titulo", "descripcion", "tecnologias", "fecha"];
    const DATE_FIELDS: &'static [&'static str] = &["fecha"];
    const ASSET_FIELDS: &'static [(AssetKind, &'static str)] =
        &[(AssetKind::ProjectImage, "imagen")];

    fn id(&self) -> Option<u64> {
        self.id
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Certificate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub titulo: String,
    #[serde(default)]
    pub institucion: String,
    #[serde(default)]
    pub fecha: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imagen: Option<String>,
}

impl Record for Certificate {
    const COLLECTION: Collection = Collection::Certificates;
    const REQUIRED_FIELDS: &'static [&'static str] = &["titulo", "institucion", "fecha", "imagen"];
    const DATE_FIELDS: &'static [&'static str] = &["fecha"];
    const ASSET_FIELDS: &'static [(AssetKind, &'static str)] =
        &[(AssetKind::CertificateImage, "imagen")];

    fn id(&self) -> Option<u64> {
        self.id
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Skill {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub nombre: String,
    #[serde(default)]
    pub categoria: String,
}

impl Record for Skill {
    const COLLECTION: Collection = Collection::Skills;
    const REQUIRED_FIELDS: &'static [&'static str] = &["nombre", "categoria"];

    fn id(&self) -> Option<u64> {
        self.id
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SocialLink {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub plataforma: String,
    #[serde(default)]
    pub enlace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
}

impl Record for SocialLink {
    const COLLECTION: Collection = Collection::SocialLinks;
    const REQUIRED_FIELDS: &'static [&'static str] = &["plataforma", "enlace"];

    fn id(&self) -> Option<u64> {
        self.id
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Experience {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub puesto: String,
    #[serde(default)]
    pub empresa: String,
    #[serde(default)]
    pub fecha_inicio: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fecha_fin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actualmente: Option<bool>,
    #[serde(default)]
    pub descripcion: String,
}

impl Record for Experience {
    const COLLECTION: Collection = Collection::Experience;
    const REQUIRED_FIELDS: &'static [&'static str] =
        &["puesto", "empresa", "fecha_inicio", "descripcion"];
    const DATE_FIELDS: &'static [&'static str] = &["fecha_inicio", "fecha_fin"];

    fn id(&self) -> Option<u64> {
        self.id
    }
}
