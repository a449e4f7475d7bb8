//! Google Drive v3 client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::config::DriveConfig;
use crate::{MinutagError, Result};

use super::credentials::{Credential, TokenSource};
use super::{folder_query, DriveClient, RemoteFile, FOLDER_MIME_TYPE};

/// User agent string for Drive requests.
const USER_AGENT: &str = concat!("minutag/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteFile>,
}

/// Drive v3 over HTTPS.
#[derive(Debug)]
pub struct GoogleDrive {
    http: Client,
    tokens: TokenSource,
    api_base: String,
    upload_base: String,
}

impl GoogleDrive {
    /// Create a client from configuration and a credential.
    pub fn new(config: &DriveConfig, credential: Credential) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| MinutagError::Config(format!("failed to create HTTP client: {e}")))?;

        let tokens = TokenSource::new(http.clone(), credential, config.token_uri.clone());

        Ok(Self {
            http,
            tokens,
            api_base: config.api_base_url.trim_end_matches('/').to_string(),
            upload_base: config.upload_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Turn a non-2xx response into a `Remote` error.
    async fn check(&self, response: Response, action: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            // Token was revoked or expired early; fetch a new one next time.
            self.tokens.invalidate().await;
        }

        let body = response.text().await.unwrap_or_default();
        Err(MinutagError::Remote(format!(
            "{} failed with HTTP {}: {}",
            action, status, body
        )))
    }
}

/// Build a `multipart/related` body carrying JSON metadata and text content.
fn multipart_related(boundary: &str, metadata: &serde_json::Value, content: &str) -> String {
    format!(
        "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n\
         --{b}\r\nContent-Type: text/plain; charset=UTF-8\r\n\r\n{content}\r\n\
         --{b}--\r\n",
        b = boundary,
        meta = metadata,
        content = content,
    )
}

#[async_trait]
impl DriveClient for GoogleDrive {
    async fn find_folders(&self, name: &str, parent_id: &str) -> Result<Vec<String>> {
        let token = self.tokens.access_token().await?;
        let query = folder_query(name, parent_id);

        let response = self
            .http
            .get(format!("{}/files", self.api_base))
            .bearer_auth(token)
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id,name)"),
                ("spaces", "drive"),
            ])
            .send()
            .await?;

        let list: FileList = self.check(response, "folder lookup").await?.json().await?;
        Ok(list.files.into_iter().map(|f| f.id).collect())
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String> {
        let token = self.tokens.access_token().await?;

        let response = self
            .http
            .post(format!("{}/files", self.api_base))
            .bearer_auth(token)
            .query(&[("fields", "id,name")])
            .json(&json!({
                "name": name,
                "mimeType": FOLDER_MIME_TYPE,
                "parents": [parent_id],
            }))
            .send()
            .await?;

        let folder: RemoteFile = self.check(response, "folder creation").await?.json().await?;
        Ok(folder.id)
    }

    async fn upload_file(&self, name: &str, parent_id: &str, content: &str) -> Result<RemoteFile> {
        let token = self.tokens.access_token().await?;
        let boundary = format!("minutag-{}", Uuid::new_v4().simple());
        let metadata = json!({
            "name": name,
            "parents": [parent_id],
        });

        let response = self
            .http
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(token)
            .query(&[("uploadType", "multipart"), ("fields", "id,name,parents")])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(multipart_related(&boundary, &metadata, content))
            .send()
            .await?;

        let file: RemoteFile = self.check(response, "file upload").await?.json().await?;
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Query, State},
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeDrive {
        queries: Vec<String>,
        created: Vec<serde_json::Value>,
        uploads: Vec<(String, String)>,
    }

    type Shared = Arc<Mutex<FakeDrive>>;

    async fn token() -> Json<serde_json::Value> {
        Json(json!({ "access_token": "fake-token", "expires_in": 3600 }))
    }

    async fn list_files(
        State(state): State<Shared>,
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
    ) -> std::result::Result<Json<serde_json::Value>, StatusCode> {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer fake-token") {
            return Err(StatusCode::UNAUTHORIZED);
        }
        let q = params.get("q").cloned().unwrap_or_default();
        state.lock().unwrap().queries.push(q.clone());
        if q.contains("name = 'Existing'") {
            Ok(Json(json!({ "files": [{ "id": "folder-existing", "name": "Existing" }] })))
        } else {
            Ok(Json(json!({ "files": [] })))
        }
    }

    async fn create_file(
        State(state): State<Shared>,
        Json(body): Json<serde_json::Value>,
    ) -> Json<serde_json::Value> {
        let name = body["name"].as_str().unwrap_or_default().to_string();
        state.lock().unwrap().created.push(body);
        Json(json!({ "id": "folder-new", "name": name }))
    }

    async fn upload(
        State(state): State<Shared>,
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
        body: String,
    ) -> std::result::Result<Json<serde_json::Value>, StatusCode> {
        if params.get("uploadType").map(String::as_str) != Some("multipart") {
            return Err(StatusCode::BAD_REQUEST);
        }
        let content_type = headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if body.contains("quota.txt") {
            return Err(StatusCode::FORBIDDEN);
        }
        state.lock().unwrap().uploads.push((content_type, body));
        Ok(Json(json!({ "id": "file-1", "name": "a.txt", "parents": ["folder-new"] })))
    }

    async fn spawn_fake_drive() -> (GoogleDrive, Shared) {
        let state: Shared = Arc::new(Mutex::new(FakeDrive::default()));
        let app = Router::new()
            .route("/token", post(token))
            .route("/drive/v3/files", get(list_files).post(create_file))
            .route("/upload/drive/v3/files", post(upload))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = DriveConfig {
            api_base_url: format!("http://{}/drive/v3", addr),
            upload_base_url: format!("http://{}/upload/drive/v3/", addr),
            token_uri: format!("http://{}/token", addr),
            ..Default::default()
        };
        let credential = Credential::RefreshToken {
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            refresh_token: "rt".to_string(),
        };
        (GoogleDrive::new(&config, credential).unwrap(), state)
    }

    #[test]
    fn test_multipart_related_body() {
        let body = multipart_related("b", &json!({ "name": "a.txt" }), "hello");
        assert_eq!(
            body,
            "--b\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{\"name\":\"a.txt\"}\r\n\
             --b\r\nContent-Type: text/plain; charset=UTF-8\r\n\r\nhello\r\n--b--\r\n"
        );
    }

    #[tokio::test]
    async fn test_find_folders() {
        let (drive, state) = spawn_fake_drive().await;

        let ids = drive.find_folders("Existing", "root").await.unwrap();
        assert_eq!(ids, vec!["folder-existing".to_string()]);

        let ids = drive.find_folders("Nobody", "root").await.unwrap();
        assert!(ids.is_empty());

        let guard = state.lock().unwrap();
        let queries = &guard.queries;
        assert_eq!(queries.len(), 2);
        assert!(queries[1].contains("'root' in parents"));
        assert!(queries[1].contains("trashed = false"));
    }

    #[tokio::test]
    async fn test_create_folder() {
        let (drive, state) = spawn_fake_drive().await;

        let id = drive.create_folder("Smith", "root").await.unwrap();
        assert_eq!(id, "folder-new");

        let guard = state.lock().unwrap();
        let created = &guard.created;
        assert_eq!(created.len(), 1);
        assert_eq!(created[0]["name"], "Smith");
        assert_eq!(created[0]["mimeType"], FOLDER_MIME_TYPE);
        assert_eq!(created[0]["parents"][0], "root");
    }

    #[tokio::test]
    async fn test_upload_file() {
        let (drive, state) = spawn_fake_drive().await;

        let file = drive.upload_file("a.txt", "folder-new", "hi").await.unwrap();
        assert_eq!(file.id, "file-1");
        assert_eq!(file.name, "a.txt");

        let guard = state.lock().unwrap();
        let uploads = &guard.uploads;
        assert_eq!(uploads.len(), 1);
        let (content_type, body) = &uploads[0];
        assert!(content_type.starts_with("multipart/related; boundary=minutag-"));
        assert!(body.contains("\"parents\":[\"folder-new\"]"));
        assert!(body.contains("text/plain; charset=UTF-8\r\n\r\nhi\r\n"));
    }

    #[tokio::test]
    async fn test_upload_error_is_remote() {
        let (drive, _state) = spawn_fake_drive().await;

        match drive.upload_file("quota.txt", "folder-new", "hi").await {
            Err(MinutagError::Remote(msg)) => {
                assert!(msg.contains("file upload"));
                assert!(msg.contains("403"));
            }
            other => panic!("expected Remote error, got {:?}", other),
        }
    }
}
