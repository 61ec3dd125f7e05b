//! Upload, delete and listing handlers.

use super::error::ApiError;
use super::SharedState;
use crate::mime::sniff_content_type;
use crate::models::{AssetKind, FileUpload};
use axum::{
    extract::{multipart::MultipartRejection, Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use std::collections::HashMap;

/// A parsed multipart form: the single file part plus any text fields.
struct UploadForm {
    file: FileUpload,
    fields: HashMap<String, String>,
}

async fn read_form(
    state: &SharedState,
    kind: AssetKind,
    file_field: &str,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<UploadForm, ApiError> {
    let mut multipart =
        multipart.map_err(|e| ApiError::BadRequest(format!("Expected a multipart form: {}", e)))?;
    let limit = state.limits().max_bytes(kind);
    let too_large = |e: axum::extract::multipart::MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::BodyTooLarge { kind, limit }
        } else {
            ApiError::BadRequest(format!("Malformed multipart body: {}", e.body_text()))
        }
    };

    let mut file = None;
    let mut fields = HashMap::new();

    while let Some(field) = multipart.next_field().await.map_err(too_large)? {
        let name = field.name().unwrap_or_default().to_string();

        if field.file_name().is_none() {
            let text = field.text().await.map_err(too_large)?;
            fields.insert(name, text);
            continue;
        }

        if name != file_field {
            return Err(ApiError::BadRequest(format!(
                "Unexpected file field '{}', expected '{}'",
                name, file_field
            )));
        }
        if file.is_some() {
            return Err(ApiError::BadRequest(format!(
                "Only one file may be uploaded in '{}'",
                file_field
            )));
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let declared = field
            .content_type()
            .map(str::to_string)
            .filter(|ct| !ct.trim().is_empty());
        let data = field.bytes().await.map_err(too_large)?.to_vec();
        let content_type = declared.or_else(|| sniff_content_type(&data).map(str::to_string));

        file = Some(FileUpload::new(file_name, content_type, data));
    }

    let file = file.ok_or_else(|| {
        ApiError::BadRequest(format!("No file received in field '{}'", file_field))
    })?;
    Ok(UploadForm { file, fields })
}

fn parse_kind(slug: &str) -> Result<AssetKind, ApiError> {
    AssetKind::from_slug(slug).ok_or_else(|| ApiError::UnknownKind(slug.to_string()))
}

/// POST /api/upload - Replace the profile photo.
pub(crate) async fn upload_photo(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    // `carpeta` is sent by older dashboards and has no effect.
    let form = read_form(&state, AssetKind::Photo, "foto", multipart).await?;
    let reference = state.upload_photo(&form.file).await?;

    Ok(Json(json!({
        "success": true,
        "foto_perfil": reference.filename,
        "message": "Profile photo uploaded",
        "imageUrl": reference.served_path,
    })))
}

/// POST /api/upload-cv - Store a CV, optionally under the name in `cv_nombre`.
pub(crate) async fn upload_cv(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let form = read_form(&state, AssetKind::Cv, "cv", multipart).await?;
    let desired = form.fields.get("cv_nombre").map(String::as_str);
    let reference = state.upload_cv(&form.file, desired).await?;

    Ok(Json(json!({
        "success": true,
        "cv_nombre": reference.filename,
        "message": "CV uploaded",
        "cvUrl": reference.served_path,
    })))
}

/// POST /api/proyectos/upload - Store a project image under a generated name.
pub(crate) async fn upload_project_image(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let form = read_form(&state, AssetKind::ProjectImage, "imagen", multipart).await?;
    let reference = state.upload_project_image(&form.file).await?;

    Ok(Json(json!({
        "success": true,
        "filename": reference.filename,
        "originalname": form.file.file_name,
        "mimetype": form.file.content_type,
        "size": form.file.size(),
        "url": reference.served_path,
    })))
}

/// POST /api/certificados/upload - Store a certificate image.
pub(crate) async fn upload_certificate_image(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let form = read_form(&state, AssetKind::CertificateImage, "imagen", multipart).await?;
    let reference = state.upload_certificate_image(&form.file).await?;

    Ok(Json(json!({
        "success": true,
        "file": {
            "filename": reference.filename,
            "path": reference.served_path,
        },
    })))
}

/// DELETE /api/proyectos/imagen/{filename}
pub(crate) async fn delete_project_image(
    State(state): State<SharedState>,
    Path(filename): Path<String>,
) -> Result<Json<Value>, ApiError> {
    delete(&state, AssetKind::ProjectImage, &filename).await
}

/// DELETE /api/certificados/imagen/{filename}
pub(crate) async fn delete_certificate_image(
    State(state): State<SharedState>,
    Path(filename): Path<String>,
) -> Result<Json<Value>, ApiError> {
    delete(&state, AssetKind::CertificateImage, &filename).await
}

/// DELETE /api/assets/{kind}/{filename}
pub(crate) async fn delete_asset(
    State(state): State<SharedState>,
    Path((kind, filename)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let kind = parse_kind(&kind)?;
    delete(&state, kind, &filename).await
}

/// GET /api/assets/{kind} - Stored filenames of one kind.
pub(crate) async fn list_assets(
    State(state): State<SharedState>,
    Path(kind): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let kind = parse_kind(&kind)?;
    let files = state.list(kind).await?;
    Ok(Json(json!({ "success": true, "files": files })))
}

/// Deleting a file that is already gone still answers 200.
async fn delete(
    state: &SharedState,
    kind: AssetKind,
    filename: &str,
) -> Result<Json<Value>, ApiError> {
    let deleted = state.delete(kind, filename).await?;
    Ok(Json(json!({ "success": true, "deleted": deleted })))
}
