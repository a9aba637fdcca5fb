//! Upload client: splits files into fixed-size chunks and drives them
//! through the receiver one request at a time, one file at a time.

mod chunk_source;
mod retry;
mod scheduler;
mod transport;

pub use chunk_source::{ChunkPlan, ChunkSpan, FileDescriptor, read_span};
pub use retry::RetryPolicy;
pub use scheduler::{EntryState, QueueEntry, Step, UploadError, UploadScheduler};
pub use transport::{ChunkRequest, ChunkTransport, HttpTransport, TransportError};

/// Default chunk size: 5 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;
