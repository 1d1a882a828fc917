pub mod classify;
pub mod config;
pub mod error;
pub mod models;
pub mod naming;
pub mod routes;
pub mod storage;

use anyhow::{Context, Result};
use classify::ContentClassifier;
use config::ServerConfig;
use naming::FilenameAllocator;
use std::sync::Arc;
use storage::UploadStore;

pub use routes::build_router;

pub struct AppState {
    pub store: UploadStore,
    pub allocator: FilenameAllocator,
    pub classifier: Arc<ContentClassifier>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let store = UploadStore::new(&config.uploads_dir).with_context(|| {
            format!(
                "Failed to resolve upload directory {}",
                config.uploads_dir.display()
            )
        })?;
        let classifier = ContentClassifier::new().context("Failed to compile classifier rules")?;

        Ok(Self {
            store,
            allocator: FilenameAllocator::new(config.naming),
            classifier: Arc::new(classifier),
            max_upload_bytes: config.max_upload_bytes,
        })
    }
}
