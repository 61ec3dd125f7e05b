//! Environment-driven configuration
//!
//! Values are read from the process environment after loading an optional
//! `.env` file. Unset variables fall back to defaults; malformed ones are an
//! error rather than a silent default.

use crate::models::AssetKind;
use crate::{Error, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const MB: u64 = 1024 * 1024;

/// Per-kind upload size limits in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetLimits {
    pub photo: u64,
    pub cv: u64,
    pub project_image: u64,
    pub certificate_image: u64,
}

impl AssetLimits {
    pub fn max_bytes(&self, kind: AssetKind) -> u64 {
        match kind {
            AssetKind::Photo => self.photo,
            AssetKind::Cv => self.cv,
            AssetKind::ProjectImage => self.project_image,
            AssetKind::CertificateImage => self.certificate_image,
        }
    }
}

impl Default for AssetLimits {
    fn default() -> Self {
        Self {
            photo: 5 * MB,
            cv: 10 * MB,
            project_image: 10 * MB,
            certificate_image: 10 * MB,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub record_api_url: String,
    pub asset_api_url: String,
    pub assets_dir: PathBuf,
    pub server_host: String,
    pub server_port: u16,
    pub limits: AssetLimits,
    pub http_timeout: Duration,
    pub notification_dismiss: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AssetLimits::default();

        Ok(Self {
            record_api_url: trim_slash(
                lookup("RECORD_API_URL")
                    .unwrap_or_else(|| "https://api-django-portafolio.fly.dev/api".to_string()),
            ),
            asset_api_url: trim_slash(
                lookup("ASSET_API_URL").unwrap_or_else(|| "http://localhost:5000".to_string()),
            ),
            assets_dir: PathBuf::from(
                lookup("ASSETS_DIR").unwrap_or_else(|| "public/assets".to_string()),
            ),
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: parse_var(&lookup, "SERVER_PORT", 5000)?,
            limits: AssetLimits {
                photo: parse_var(&lookup, "PHOTO_MAX_BYTES", defaults.photo)?,
                cv: parse_var(&lookup, "CV_MAX_BYTES", defaults.cv)?,
                project_image: parse_var(
                    &lookup,
                    "PROJECT_IMAGE_MAX_BYTES",
                    defaults.project_image,
                )?,
                certificate_image: parse_var(
                    &lookup,
                    "CERTIFICATE_IMAGE_MAX_BYTES",
                    defaults.certificate_image,
                )?,
            },
            http_timeout: Duration::from_secs(parse_var(&lookup, "HTTP_TIMEOUT_SECS", 30)?),
            notification_dismiss: Duration::from_secs(parse_var(
                &lookup,
                "NOTIFICATION_DISMISS_SECS",
                5,
            )?),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid {} value '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

fn trim_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
