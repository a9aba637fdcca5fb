//! Streaming handlers for finalized resources.
//!
//! - `GET /video/{key}`: by retrieval identifier
//! - `GET /uploads/{file_name}`: by the `finalFilename` the upload returned
//!
//! Both honour a single `Range: bytes=` spec and stream straight from disk.

use crate::{
    errors::AppError,
    models::resource::Resource,
    services::{
        range::{RangeSelection, select_range},
        resource_store::ResourceStore,
    },
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Stream a resource by retrieval key.
pub async fn stream_video(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let resource = state.resources.locate_by_key(&key).await?;
    respond_with_range(&state.resources, &resource, &headers).await
}

/// Stream a resource by its full file name under the public root.
pub async fn get_upload(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let resource = state.resources.locate_file(&file_name).await?;
    respond_with_range(&state.resources, &resource, &headers).await
}

async fn respond_with_range(
    store: &ResourceStore,
    resource: &Resource,
    headers: &HeaderMap,
) -> Result<Response, AppError> {
    let range_header = headers.get(header::RANGE).and_then(|v| v.to_str().ok());

    match select_range(range_header, resource.size) {
        RangeSelection::Unsatisfiable => {
            debug!(
                "unsatisfiable range {:?} for {} ({} bytes)",
                range_header, resource.file_name, resource.size
            );
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::RANGE_NOT_SATISFIABLE;
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", resource.size)) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
            Ok(response)
        }
        RangeSelection::Partial(range) => {
            let reader = store.open_range(resource, Some(range)).await?;
            let mut response = Response::new(Body::from_stream(ReaderStream::new(reader)));
            *response.status_mut() = StatusCode::PARTIAL_CONTENT;
            set_resource_headers(response.headers_mut(), resource, range.len());
            if let Ok(value) = HeaderValue::from_str(&range.content_range(resource.size)) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
            Ok(response)
        }
        RangeSelection::Full => {
            let reader = store.open_range(resource, None).await?;
            let mut response = Response::new(Body::from_stream(ReaderStream::new(reader)));
            *response.status_mut() = StatusCode::OK;
            set_resource_headers(response.headers_mut(), resource, resource.size);
            Ok(response)
        }
    }
}

fn set_resource_headers(headers: &mut HeaderMap, resource: &Resource, length: u64) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(resource.content_type),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    if let Some(modified) = resource.last_modified {
        let http_date = modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        if let Ok(value) = HeaderValue::from_str(&http_date) {
            headers.insert(header::LAST_MODIFIED, value);
        }
    }
}
