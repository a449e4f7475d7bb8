//! Document upload handler.

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::web::dto::{UploadDocumentRequest, UploadDocumentResponse, ValidatedJson};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// POST /upload-document - Store a text document in the owner's Drive folder.
///
/// Also mounted at the legacy path `/minutag/upload-txt`.
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    ValidatedJson(payload): ValidatedJson<UploadDocumentRequest>,
) -> Result<Json<UploadDocumentResponse>, ApiError> {
    let owner = payload.owner.clone();
    let task = payload.into_task()?;

    let document = state.orchestrator.execute(&task).await?;

    Ok(Json(UploadDocumentResponse::new(document, owner)))
}
