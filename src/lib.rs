//! Streaming t-digest sketches held by key.
//!
//! - [`tdigest`]: the sketch engine (centroids, compressor, queries, codec).
//! - [`store`]: an explicit key space that owns digests by key and persists snapshots.
//! - [`commands`]: typed command descriptors and the dispatcher that maps them onto
//!   digest operations.
pub mod commands;
mod error;
pub mod store;
pub mod tdigest;

pub use error::{TdError, TdResult};
