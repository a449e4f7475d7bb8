//! MinuTAG - document uploader backend
//!
//! Accepts text documents over HTTP and stores them in a per-owner folder
//! under a root Google Drive folder, with bounded concurrency toward Drive.

pub mod admission;
pub mod config;
pub mod drive;
pub mod error;
pub mod logging;
pub mod upload;
pub mod web;

pub use admission::{AdmissionController, AdmissionLimits, AdmissionStats, SlotPermit};
pub use config::Config;
pub use drive::{DriveClient, GoogleDrive, InMemoryDrive, RemoteFile};
pub use error::{MinutagError, Result};
pub use upload::{UploadOrchestrator, UploadTask, UploadedDocument, UNNAMED_OWNER_FOLDER};
pub use web::WebServer;
