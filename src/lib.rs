//! Administration back end for a personal portfolio
//!
//! Portfolio records (personal data, projects, certificates, skills, social
//! links, experience) live in a remote REST API; their binary assets (profile
//! photo, CV, project and certificate images) live in a local asset storage
//! service. The coordinator uploads an asset, writes its filename into the
//! owning record, and deletes the upload again if that write fails.

pub mod assets;
pub mod config;
pub mod coordinator;
pub mod dates;
pub mod error;
pub mod mime;
pub mod models;
pub mod notify;
pub mod records;
pub mod response;
pub mod server;
pub mod storage;
pub mod validation;

pub use error::{Error, Result};
