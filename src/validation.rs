//! Upload and record validation shared by the coordinator and the asset
//! server, so both sides reject exactly the same inputs.

use crate::config::AssetLimits;
use crate::mime::{self, DOC, DOCX, PDF};
use crate::models::{AssetKind, FileUpload};
use crate::{error::FieldErrors, Error, Result};
use serde_json::Value;

pub const REQUIRED_MESSAGE: &str = "This field is required.";

const CV_MIME_TYPES: &[&str] = &[PDF, DOC, DOCX];
const CV_EXTENSIONS: &[&str] = &["pdf", "doc", "docx"];
/// Content types browsers and OSes report when they do not know better.
const GENERIC_MIME_TYPES: &[&str] = &[
    "",
    "application/octet-stream",
    "application/zip",
    "application/x-zip-compressed",
];

const PROJECT_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
const CERTIFICATE_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif"];
const CERTIFICATE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

/// Check type and size constraints for `kind`.
pub fn validate(kind: AssetKind, file: &FileUpload, limits: &AssetLimits) -> Result<()> {
    check_type(kind, file)?;
    if kind == AssetKind::Cv {
        if let Some(desired) = file.desired_name.as_deref().map(str::trim) {
            if !desired.is_empty() {
                validate_filename(desired)?;
            }
        }
    }

    let limit = limits.max_bytes(kind);
    if file.size() > limit {
        return Err(Error::FileTooLarge {
            kind,
            size: file.size(),
            limit,
        });
    }

    Ok(())
}

fn check_type(kind: AssetKind, file: &FileUpload) -> Result<()> {
    let content_type = file
        .content_type
        .as_deref()
        .map(mime::essence)
        .unwrap_or_default();
    let extension = file.extension().unwrap_or_default();

    let accepted = match kind {
        AssetKind::Photo => content_type.starts_with("image/"),
        AssetKind::Cv => {
            CV_MIME_TYPES.contains(&content_type.as_str())
                || (GENERIC_MIME_TYPES.contains(&content_type.as_str())
                    && CV_EXTENSIONS.contains(&extension.as_str()))
        }
        AssetKind::ProjectImage => {
            content_type.starts_with("image/")
                && PROJECT_IMAGE_EXTENSIONS.contains(&extension.as_str())
        }
        AssetKind::CertificateImage => {
            CERTIFICATE_MIME_TYPES.contains(&content_type.as_str())
                && CERTIFICATE_EXTENSIONS.contains(&extension.as_str())
        }
    };

    if accepted {
        return Ok(());
    }

    let expected = match kind {
        AssetKind::Photo => "an image".to_string(),
        AssetKind::Cv => "a PDF or Word document (pdf, doc, docx)".to_string(),
        AssetKind::ProjectImage => format!("an image ({})", PROJECT_IMAGE_EXTENSIONS.join(", ")),
        AssetKind::CertificateImage => {
            format!("a JPEG, PNG or GIF image ({})", CERTIFICATE_EXTENSIONS.join(", "))
        }
    };
    let received = if content_type.is_empty() {
        "unknown type"
    } else {
        content_type.as_str()
    };

    Err(Error::InvalidFileType {
        kind,
        detail: format!("expected {}, got '{}' ({})", expected, file.file_name, received),
    })
}

/// Reject names that could escape the kind directory, collide with in-flight
/// temp files, or change meaning inside a URL path segment.
pub fn validate_filename(name: &str) -> Result<()> {
    let problem = if name.trim().is_empty() {
        Some("must not be empty")
    } else if name.contains(['/', '\\', '\0']) {
        Some("must not contain path separators")
    } else if name.contains(['#', '?', '%']) {
        Some("must not contain '#', '?' or '%'")
    } else if name.starts_with('.') {
        Some("must not start with a dot")
    } else {
        None
    };

    match problem {
        Some(problem) => Err(Error::field(
            "filename",
            format!("Invalid filename '{}': {}", name, problem),
        )),
        None => Ok(()),
    }
}

/// Every field in `required` must be present, non-null and non-blank in
/// `body`, unless listed in `satisfied` (an asset about to be uploaded).
pub fn require_fields(body: &Value, required: &[&str], satisfied: &[&str]) -> Result<()> {
    let mut errors = FieldErrors::new();

    for field in required {
        if satisfied.contains(field) {
            continue;
        }
        let present = match body.get(*field) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        };
        if !present {
            errors.insert(field.to_string(), vec![REQUIRED_MESSAGE.to_string()]);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(errors))
    }
}
