//! shelf-rs: an OPDS catalog server for a plain directory of ebooks.
//!
//! The directory tree is served as-is: no database and no metadata
//! extraction. E-readers get OPDS Atom feeds, browsers get HTML pages,
//! and files can be downloaded in their stored format or converted on
//! demand by an external program.
//!
//! # Features
//!
//! - OPDS 1.x navigation and acquisition feeds
//! - HTML auto-index style pages for desktop and text browsers
//! - Recently modified files, bounded in memory
//! - Substring search over relative paths, with an OpenSearch description
//! - On-demand conversion with a bounded, single-flight artifact cache

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Configuration and CLI.
pub mod config;
/// External conversion and the artifact cache.
pub mod convert;
/// Error types.
pub mod error;
/// HTML rendering.
pub mod html;
/// Catalog tree, metadata guesses and recency.
pub mod library;
/// Client capability detection.
pub mod negotiate;
/// OPDS feed generation.
pub mod opds;
/// URL layout.
pub mod routes;
/// HTTP server.
pub mod server;

#[cfg(test)]
mod tests;

pub use config::{Cli, Command, Config};
pub use error::{AppError, Result};
pub use server::AppState;
