//! Process-local Drive implementation.
//!
//! Keeps folders and files in memory and records every call, which makes it
//! convenient for tests and for running the service without credentials.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::{MinutagError, Result};

use super::{DriveClient, RemoteFile};

/// A call received by [`InMemoryDrive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveCall {
    /// `find_folders(name, parent_id)`.
    FindFolders { name: String, parent_id: String },
    /// `create_folder(name, parent_id)`.
    CreateFolder { name: String, parent_id: String },
    /// `upload_file(name, parent_id, ..)`.
    UploadFile { name: String, parent_id: String },
}

/// A folder held by [`InMemoryDrive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFolder {
    /// Generated folder ID (`folder-N`).
    pub id: String,
    /// Folder name.
    pub name: String,
    /// ID of the containing folder.
    pub parent_id: String,
}

/// A file held by [`InMemoryDrive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Generated file ID (`file-N`).
    pub id: String,
    /// File name as uploaded.
    pub name: String,
    /// ID of the folder holding the file.
    pub parent_id: String,
    /// Text content.
    pub content: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    folders: Vec<StoredFolder>,
    files: Vec<StoredFile>,
    calls: Vec<DriveCall>,
    next_id: u64,
    upload_failure: Option<String>,
}

impl MemoryState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

/// In-memory [`DriveClient`].
#[derive(Debug, Default)]
pub struct InMemoryDrive {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
    stalled: bool,
}

impl InMemoryDrive {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every call hang forever after it is recorded.
    pub fn stalled(mut self) -> Self {
        self.stalled = true;
        self
    }

    /// Make the next upload fail with a `Remote` error.
    pub fn fail_next_upload(&self, message: impl Into<String>) {
        self.lock().upload_failure = Some(message.into());
    }

    /// Add a folder directly, bypassing the call log.
    pub fn insert_folder(&self, name: &str, parent_id: &str) -> String {
        let mut state = self.lock();
        let id = state.next_id("folder");
        state.folders.push(StoredFolder {
            id: id.clone(),
            name: name.to_string(),
            parent_id: parent_id.to_string(),
        });
        id
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<DriveCall> {
        self.lock().calls.clone()
    }

    /// All folders.
    pub fn folders(&self) -> Vec<StoredFolder> {
        self.lock().folders.clone()
    }

    /// All files.
    pub fn files(&self) -> Vec<StoredFile> {
        self.lock().files.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_network(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.stalled {
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl DriveClient for InMemoryDrive {
    async fn find_folders(&self, name: &str, parent_id: &str) -> Result<Vec<String>> {
        self.lock().calls.push(DriveCall::FindFolders {
            name: name.to_string(),
            parent_id: parent_id.to_string(),
        });
        self.simulate_network().await;

        Ok(self
            .lock()
            .folders
            .iter()
            .filter(|f| f.name == name && f.parent_id == parent_id)
            .map(|f| f.id.clone())
            .collect())
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String> {
        self.lock().calls.push(DriveCall::CreateFolder {
            name: name.to_string(),
            parent_id: parent_id.to_string(),
        });
        self.simulate_network().await;

        Ok(self.insert_folder(name, parent_id))
    }

    async fn upload_file(&self, name: &str, parent_id: &str, content: &str) -> Result<RemoteFile> {
        self.lock().calls.push(DriveCall::UploadFile {
            name: name.to_string(),
            parent_id: parent_id.to_string(),
        });
        self.simulate_network().await;

        let mut state = self.lock();
        if let Some(message) = state.upload_failure.take() {
            return Err(MinutagError::Remote(message));
        }

        let id = state.next_id("file");
        state.files.push(StoredFile {
            id: id.clone(),
            name: name.to_string(),
            parent_id: parent_id.to_string(),
            content: content.to_string(),
        });

        Ok(RemoteFile {
            id,
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_matches_exact_name_and_parent() {
        let drive = InMemoryDrive::new();
        let id = drive.insert_folder("Smith", "root");
        drive.insert_folder("smith", "root");
        drive.insert_folder("Smith", "other-root");

        let found = drive.find_folders("Smith", "root").await.unwrap();
        assert_eq!(found, vec![id]);
    }

    #[tokio::test]
    async fn test_create_then_upload() {
        let drive = InMemoryDrive::new();

        let folder = drive.create_folder("Smith", "root").await.unwrap();
        let file = drive.upload_file("a.txt", &folder, "hi").await.unwrap();

        assert_eq!(file.name, "a.txt");
        let files = drive.files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].parent_id, folder);
        assert_eq!(files[0].content, "hi");

        assert_eq!(
            drive.calls(),
            vec![
                DriveCall::CreateFolder {
                    name: "Smith".to_string(),
                    parent_id: "root".to_string()
                },
                DriveCall::UploadFile {
                    name: "a.txt".to_string(),
                    parent_id: folder.clone()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_fail_next_upload_only_once() {
        let drive = InMemoryDrive::new();
        drive.fail_next_upload("quota exceeded");

        let err = drive.upload_file("a.txt", "f", "x").await.unwrap_err();
        assert!(matches!(err, MinutagError::Remote(ref m) if m == "quota exceeded"));
        assert!(drive.upload_file("a.txt", "f", "x").await.is_ok());
    }

    #[tokio::test]
    async fn test_stalled_never_completes() {
        let drive = InMemoryDrive::new().stalled();
        let result = tokio::time::timeout(
            Duration::from_millis(20),
            drive.find_folders("Smith", "root"),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(drive.calls().len(), 1);
    }
}
