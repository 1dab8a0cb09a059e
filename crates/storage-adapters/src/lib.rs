//! rusty-pothole/crates/storage-adapters/src/lib.rs
//!
//! Outbound adapters implementing the `domains` ports. Each backend sits
//! behind its own feature flag.

#[cfg(feature = "db-sqlite")]
pub mod sqlite;

#[cfg(feature = "media-local")]
pub mod media_local;

#[cfg(feature = "snap-osrm")]
pub mod osrm;

#[cfg(feature = "db-sqlite")]
pub use sqlite::SqliteStore;

#[cfg(feature = "media-local")]
pub use media_local::LocalImageStore;

#[cfg(feature = "snap-osrm")]
pub use osrm::OsrmSnapper;
