//! Core data types for the chunked upload service.
//!
//! `upload` holds the protocol types exchanged between the upload client and
//! the chunk receiver; `resource` describes finalized files on disk.

pub mod resource;
pub mod upload;
