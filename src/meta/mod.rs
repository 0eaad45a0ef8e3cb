//! Metadata caching
//!
//! Responsibilities:
//! - Keep time-bounded copies of listing/existence results so hot attribute
//!   and readdir paths do not hit the store on every call.
//! - Invalidate structurally on mutation: a write below a prefix must not
//!   leave an ancestor listing stale.
//!
//! Submodules:
//! - `cache`: the TTL cache domains and their invalidation rules
pub mod cache;
