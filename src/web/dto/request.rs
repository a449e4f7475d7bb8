//! Request DTOs for the HTTP API.

use serde::Deserialize;
use validator::Validate;

use crate::upload::UploadTask;
use crate::Result;

/// Document upload request.
#[derive(Debug, Deserialize, Validate)]
pub struct UploadDocumentRequest {
    /// File name to store.
    #[serde(default)]
    #[validate(
        required(message = "filename is required"),
        length(min = 1, message = "filename is required")
    )]
    pub filename: Option<String>,
    /// Document content.
    #[serde(default)]
    #[validate(
        required(message = "content is required"),
        length(min = 1, message = "content is required")
    )]
    pub content: Option<String>,
    /// Owner label; older clients send it as `professor`.
    #[serde(default, alias = "professor")]
    pub owner: Option<String>,
}

impl UploadDocumentRequest {
    /// Convert into an upload task.
    pub fn into_task(self) -> Result<UploadTask> {
        UploadTask::new(
            self.filename.unwrap_or_default(),
            self.content.unwrap_or_default(),
            self.owner,
        )
    }
}
