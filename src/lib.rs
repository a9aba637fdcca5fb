//! Resumable chunked uploads with HTTP range playback.
//!
//! The server side ([`services::chunk_receiver`]) appends chunks into a
//! staging file and promotes it to a public resource on the last chunk.
//! [`handlers::stream_handlers`] serves finalized resources with byte-range
//! support. The client side ([`client`]) drives one chunk at a time.

pub mod client;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
