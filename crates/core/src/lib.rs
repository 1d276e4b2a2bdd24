//! Core domain types and shared logic for SheetVault.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Content hashing for change detection and content-addressed keys
//! - Logical files and their immutable versions
//! - Cell-level change records
//! - Write leases
//! - Configuration shared by the engine and the CLI

pub mod change;
pub mod config;
pub mod error;
pub mod file;
pub mod hash;
pub mod lock;
pub mod version;

pub use change::{CellChange, ChangeType};
pub use error::{Error, Result};
pub use file::{FileId, LogicalFile};
pub use hash::{ContentHash, ContentHasher};
pub use lock::{HolderId, Lease};
pub use version::{Version, VersionCounts, VersionId};

/// Default lock lease duration: 30 minutes.
pub const DEFAULT_LOCK_TTL_SECS: u64 = 30 * 60;

/// Longest accepted lease duration, in seconds (one year).
pub const MAX_LOCK_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Display name given to files uploaded without one.
pub const DEFAULT_DISPLAY_NAME: &str = "untitled";
