//! Web server for MinuTAG.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::admission::{AdmissionController, AdmissionLimits};
use crate::config::{Config, DriveBackend};
use crate::drive::{self, DriveClient};
use crate::upload::UploadOrchestrator;
use crate::{MinutagError, Result};

use super::handlers::AppState;
use super::router::{create_health_router, create_router};

/// Root folder used by the in-memory backend when none is configured.
const MEMORY_ROOT_FOLDER: &str = "root";

/// Web server for the upload API.
pub struct WebServer {
    /// Server address.
    addr: SocketAddr,
    /// Application state.
    app_state: Arc<AppState>,
    /// Maximum accepted request body.
    max_body_bytes: usize,
}

impl WebServer {
    /// Create a server from configuration, building the Drive client and
    /// admission controller it needs.
    pub fn new(config: &Config) -> Result<Self> {
        let drive = drive::from_config(&config.drive)?;
        let root_folder_id = match config.drive.backend {
            DriveBackend::Memory if config.drive.root_folder_id.is_empty() => {
                MEMORY_ROOT_FOLDER.to_string()
            }
            _ => config.drive.root_folder_id.clone(),
        };

        Self::with_drive(config, drive, root_folder_id)
    }

    /// Create a server with an explicit Drive client.
    pub fn with_drive(
        config: &Config,
        drive: Option<Arc<dyn DriveClient>>,
        root_folder_id: impl Into<String>,
    ) -> Result<Self> {
        let addr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|e| MinutagError::Config(format!("invalid server address: {e}")))?;

        let admission = Arc::new(AdmissionController::new(AdmissionLimits::from(
            &config.admission,
        )));
        let orchestrator = UploadOrchestrator::new(admission, drive, root_folder_id);

        if orchestrator.is_configured() {
            tracing::info!(
                max_concurrency = config.admission.max_concurrency,
                max_queue = config.admission.max_queue,
                "Upload orchestrator ready"
            );
        } else {
            tracing::warn!(
                "Google Drive is not configured (GDRIVE_* variables). Uploads will fail until it is."
            );
        }

        Ok(Self {
            addr,
            app_state: Arc::new(AppState::new(Arc::new(orchestrator))),
            max_body_bytes: config.server.max_body_bytes,
        })
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the application state.
    pub fn app_state(&self) -> &Arc<AppState> {
        &self.app_state
    }

    fn router(&self) -> axum::Router {
        create_router(self.app_state.clone(), self.max_body_bytes).merge(create_health_router())
    }

    /// Run the web server.
    pub async fn run(self) -> std::result::Result<(), std::io::Error> {
        let router = self.router();

        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("MinuTAG backend listening on http://{}", local_addr);

        axum::serve(listener, router).await
    }

    /// Run the server in the background and return the bound address.
    ///
    /// This is useful for testing when binding to port 0.
    pub async fn run_with_addr(self) -> std::result::Result<SocketAddr, std::io::Error> {
        let router = self.router();

        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("MinuTAG backend listening on http://{}", local_addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}
