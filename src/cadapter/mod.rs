//! Object-store adapter (cadapter)
//!
//! Submodules:
//! - `client`: backend trait plus the cache-backed client the filesystem
//!   core talks to
//! - `s3`: S3-compatible adapter implementation
//! - `memory`: in-memory adapter for tests and local development
//!
//! Responsibilities summary:
//! - Provide an async API for whole-object put/get/delete, existence checks
//!   and prefix listings, plus bucket lifecycle.
//! - Keep wire-level concerns (credentials, retries/backoff, checksums)
//!   inside the backend implementations; callers never retry.
//! - Fold every backend failure into a single i/o error kind and report
//!   absence as data, not as an error.
pub mod client;
pub mod memory;
pub mod s3;
