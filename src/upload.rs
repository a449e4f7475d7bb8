//! Upload orchestration.
//!
//! Validates an upload, waits for an admission slot, resolves the owner's
//! folder under the root folder (creating it if needed) and stores the
//! document there. All Drive traffic for one upload happens inside a single
//! slot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::admission::AdmissionController;
use crate::drive::DriveClient;
use crate::{MinutagError, Result};

/// Folder name used when an upload has no owner.
pub const UNNAMED_OWNER_FOLDER: &str = "SEM_NOME";

/// A validated document upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    filename: String,
    content: String,
    owner: Option<String>,
}

impl UploadTask {
    /// Build a task, rejecting an empty filename or empty content.
    pub fn new(
        filename: impl Into<String>,
        content: impl Into<String>,
        owner: Option<String>,
    ) -> Result<Self> {
        let filename = filename.into();
        let content = content.into();

        if filename.is_empty() || content.is_empty() {
            return Err(MinutagError::Validation(
                "filename and content are required".to_string(),
            ));
        }

        Ok(Self {
            filename,
            content,
            owner,
        })
    }

    /// File name to store.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Document content.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Owner label as given by the client.
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Name of the folder this task goes into.
    pub fn folder_name(&self) -> String {
        folder_name_for(self.owner.as_deref())
    }
}

/// Map an owner label to its folder name.
///
/// The label is trimmed; a missing or blank label maps to
/// [`UNNAMED_OWNER_FOLDER`].
pub fn folder_name_for(owner: Option<&str>) -> String {
    match owner.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => UNNAMED_OWNER_FOLDER.to_string(),
    }
}

/// A stored document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedDocument {
    /// Remote file ID.
    pub id: String,
    /// Remote file name.
    pub name: String,
}

/// Per-folder-name async locks.
///
/// Serializes find-or-create for the same owner within this process so a
/// brand-new folder is created once. Entries are dropped when unused.
#[derive(Debug, Default)]
struct FolderLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FolderLocks {
    fn entry<'a>(&'a self, name: &'a str) -> FolderLockEntry<'a> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = locks.entry(name.to_string()).or_default().clone();
        FolderLockEntry {
            locks: self,
            name,
            lock,
        }
    }

    /// Drop the entry for `name` if `held` is its last handle outside the map.
    fn prune(&self, name: &str, held: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(name)
            .is_some_and(|l| Arc::ptr_eq(l, held) && Arc::strong_count(l) == 2)
        {
            locks.remove(name);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}

/// A handle on one entry of [`FolderLocks`].
///
/// Dropping it prunes the entry once no other task holds it, including when
/// the owning future is cancelled mid-resolution.
struct FolderLockEntry<'a> {
    locks: &'a FolderLocks,
    name: &'a str,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl FolderLockEntry<'_> {
    fn mutex(&self) -> &tokio::sync::Mutex<()> {
        &self.lock
    }
}

impl Drop for FolderLockEntry<'_> {
    fn drop(&mut self) {
        self.locks.prune(self.name, &self.lock);
    }
}

/// Runs uploads against a remote store under admission control.
pub struct UploadOrchestrator {
    admission: Arc<AdmissionController>,
    drive: Option<Arc<dyn DriveClient>>,
    root_folder_id: String,
    folder_locks: FolderLocks,
}

impl std::fmt::Debug for UploadOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadOrchestrator")
            .field("admission", &self.admission.stats())
            .field("configured", &self.drive.is_some())
            .field("root_folder_id", &self.root_folder_id)
            .finish()
    }
}

impl UploadOrchestrator {
    /// Create an orchestrator.
    ///
    /// Pass `None` for `drive` when credentials are missing; every upload
    /// then fails with [`MinutagError::Config`].
    pub fn new(
        admission: Arc<AdmissionController>,
        drive: Option<Arc<dyn DriveClient>>,
        root_folder_id: impl Into<String>,
    ) -> Self {
        Self {
            admission,
            drive,
            root_folder_id: root_folder_id.into(),
            folder_locks: FolderLocks::default(),
        }
    }

    /// The admission controller guarding Drive calls.
    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    /// Whether uploads can reach a remote store.
    pub fn is_configured(&self) -> bool {
        self.drive.is_some() && !self.root_folder_id.is_empty()
    }

    /// Store one document in its owner's folder.
    pub async fn execute(&self, task: &UploadTask) -> Result<UploadedDocument> {
        let drive = match &self.drive {
            Some(drive) if !self.root_folder_id.is_empty() => drive.clone(),
            _ => {
                return Err(MinutagError::Config(
                    "Google Drive credentials or root folder are not configured".to_string(),
                ))
            }
        };

        info!(
            filename = task.filename(),
            owner = task.owner().unwrap_or("(none)"),
            length = task.content().len(),
            "Upload received"
        );

        let document = self
            .admission
            .with_slot(|| async {
                let folder_id = self.resolve_folder(drive.as_ref(), &task.folder_name()).await?;
                let file = drive
                    .upload_file(task.filename(), &folder_id, task.content())
                    .await?;
                Ok::<_, MinutagError>(UploadedDocument {
                    id: file.id,
                    name: file.name,
                })
            })
            .await?;

        info!(file_id = %document.id, file_name = %document.name, "Upload finished");
        Ok(document)
    }

    /// Find the owner folder under the root, creating it when absent.
    async fn resolve_folder(&self, drive: &dyn DriveClient, name: &str) -> Result<String> {
        let entry = self.folder_locks.entry(name);
        let _guard = entry.mutex().lock().await;
        self.find_or_create(drive, name).await
    }

    async fn find_or_create(&self, drive: &dyn DriveClient, name: &str) -> Result<String> {
        let existing = drive.find_folders(name, &self.root_folder_id).await?;
        if let Some(id) = existing.into_iter().next() {
            debug!(folder = name, folder_id = %id, "Owner folder found");
            return Ok(id);
        }

        let id = drive.create_folder(name, &self.root_folder_id).await?;
        info!(folder = name, folder_id = %id, "Owner folder created");
        Ok(id)
    }
}
