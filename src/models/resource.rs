//! Represents a finalized resource under the public root.

use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// An immutable, fully uploaded file that can be streamed back.
///
/// Like the upload metadata, this describes the file; it never holds the
/// payload bytes themselves.
#[derive(Clone, Debug)]
pub struct Resource {
    /// File name under the public root (`resourceId.ext`).
    pub file_name: String,

    /// Absolute or root-relative path on disk.
    pub path: PathBuf,

    /// Size in bytes.
    pub size: u64,

    /// MIME type derived from the extension.
    pub content_type: &'static str,

    /// Filesystem modification time, when the platform reports one.
    pub last_modified: Option<DateTime<Utc>>,
}
