//! Shared router state.

use crate::{
    config::AppConfig,
    services::{
        chunk_receiver::{ChunkReceiver, ReceiverResult},
        resource_store::ResourceStore,
    },
};

/// Handed to every handler by axum. Cheap to clone: only paths and limits.
#[derive(Clone, Debug)]
pub struct AppState {
    pub receiver: ChunkReceiver,
    pub resources: ResourceStore,
    pub max_chunk_bytes: usize,
}

impl AppState {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            receiver: ChunkReceiver::new(cfg.staging_dir(), cfg.public_dir()),
            resources: ResourceStore::new(cfg.public_dir()),
            max_chunk_bytes: cfg.max_chunk_bytes,
        }
    }

    /// Create storage directories before the first request arrives.
    pub async fn prepare(&self) -> ReceiverResult<()> {
        self.receiver.ensure_dirs().await
    }
}
