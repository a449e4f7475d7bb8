//! Remote storage (Google Drive) for MinuTAG.
//!
//! This module provides:
//! - `DriveClient`: the capability the upload orchestrator consumes
//! - `GoogleDrive`: Drive v3 over HTTPS
//! - `InMemoryDrive`: process-local implementation for tests and dry runs
//! - `Credential` / `TokenSource`: OAuth access tokens for `GoogleDrive`

pub mod credentials;
pub mod google;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::{DriveBackend, DriveConfig};
use crate::Result;

pub use credentials::{Credential, ServiceAccountKey, TokenSource};
pub use google::GoogleDrive;
pub use memory::{DriveCall, InMemoryDrive};

/// MIME type Drive uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// A file stored in Drive.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteFile {
    /// Drive file ID.
    pub id: String,
    /// File name as stored.
    pub name: String,
}

/// Folder lookup/creation and file upload against a remote store.
#[async_trait]
pub trait DriveClient: Send + Sync {
    /// IDs of non-trashed folders named exactly `name` directly under `parent_id`.
    async fn find_folders(&self, name: &str, parent_id: &str) -> Result<Vec<String>>;

    /// Create a folder named `name` under `parent_id` and return its ID.
    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String>;

    /// Store `content` as a plain-text file named `name` under `parent_id`.
    async fn upload_file(&self, name: &str, parent_id: &str, content: &str) -> Result<RemoteFile>;
}

/// Build the configured Drive client.
///
/// Returns `None` when the Google backend lacks credentials or a root folder;
/// the server still starts and uploads fail with a configuration error.
pub fn from_config(config: &DriveConfig) -> Result<Option<Arc<dyn DriveClient>>> {
    match config.backend {
        DriveBackend::Memory => {
            tracing::info!("Using in-memory Drive backend");
            Ok(Some(Arc::new(InMemoryDrive::new())))
        }
        DriveBackend::Google => {
            let Some(credential) = Credential::from_config(config)? else {
                return Ok(None);
            };
            if config.root_folder_id.is_empty() {
                return Ok(None);
            }
            tracing::info!(credential = credential.kind(), "Using Google Drive backend");
            Ok(Some(Arc::new(GoogleDrive::new(config, credential)?)))
        }
    }
}

/// Escape a value for use inside a single-quoted Drive query literal.
pub fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Build the Drive search query for an owner folder.
pub fn folder_query(name: &str, parent_id: &str) -> String {
    [
        format!("mimeType = '{}'", FOLDER_MIME_TYPE),
        "trashed = false".to_string(),
        format!("name = '{}'", escape_query_value(name)),
        format!("'{}' in parents", escape_query_value(parent_id)),
    ]
    .join(" and ")
}
