//! Response DTOs for the HTTP API.

use serde::Serialize;

use crate::upload::UploadedDocument;

/// Successful upload response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadDocumentResponse {
    /// Always `true`.
    pub ok: bool,
    /// Remote file ID.
    pub file_id: String,
    /// Remote file name.
    pub file_name: String,
    /// Owner label as sent by the client, `null` when absent.
    pub owner: Option<String>,
}

impl UploadDocumentResponse {
    /// Build the response for a stored document.
    pub fn new(document: UploadedDocument, owner: Option<String>) -> Self {
        Self {
            ok: true,
            file_id: document.id,
            file_name: document.name,
            owner: owner.filter(|o| !o.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_camel_case() {
        let doc = UploadedDocument {
            id: "file-1".to_string(),
            name: "a.txt".to_string(),
        };
        let value = serde_json::to_value(UploadDocumentResponse::new(doc, None)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "ok": true,
                "fileId": "file-1",
                "fileName": "a.txt",
                "owner": null
            })
        );
    }

    #[test]
    fn test_empty_owner_is_null() {
        let doc = UploadedDocument {
            id: "f".to_string(),
            name: "n".to_string(),
        };
        let resp = UploadDocumentResponse::new(doc, Some(String::new()));
        assert!(resp.owner.is_none());
    }
}
