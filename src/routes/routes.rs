//! Defines routes for chunked uploads and resource playback.
//!
//! ## Structure
//! - **Upload**
//!   - `POST /upload`: append one chunk; the last chunk finalizes the file
//!
//! - **Retrieval**
//!   - `GET  /video/{key}`: stream by retrieval identifier (range-aware)
//!   - `GET  /uploads/{file_name}`: stream by final file name (range-aware)
//!
//! - **Probes**
//!   - `GET  /healthz`, `GET /readyz`

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        stream_handlers::{get_upload, stream_video},
        upload_handlers::upload_chunk,
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build and return the router.
///
/// The router carries shared state (`AppState`) to all handlers. Serve it
/// with `into_make_service_with_connect_info::<SocketAddr>()`: the upload
/// handler falls back to the client address for staging keys.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/upload", post(upload_chunk))
        .route("/video/{key}", get(stream_video))
        .route("/uploads/{file_name}", get(get_upload))
}
