//! # MetaSync Server
//!
//! The serving side of a MetaSync node.
//!
//! This crate provides:
//! - [`IngestHandler`]: the peer-to-peer ingestion endpoint, decoding
//!   POSTed change envelopes and applying them through the engine
//! - [`PushHub`]: the hub's long-lived push-session registry with
//!   heartbeat-based half-open detection, usable as the engine's
//!   [`metasync_engine::FrameSink`]
//!
//! # Wiring
//!
//! The HTTP framework is the embedder's choice. For the peer-to-peer
//! contract, route POST [`metasync_protocol::INGEST_PATH`] bodies (with the
//! [`metasync_protocol::ORIGIN_NODE_HEADER`] header) into
//! [`IngestHandler::handle_ingest`]. For the hub/spoke contract, on a spoke's
//! stream request call [`PushHub::connect`] with its manifest and write the
//! returned receiver's frames out as the long-lived event stream.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect() outside tests.
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod hub;
mod ingest;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use hub::PushHub;
pub use ingest::IngestHandler;
