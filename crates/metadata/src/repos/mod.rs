//! Repository traits for metadata operations.

pub mod files;
pub mod locks;
pub mod versions;

pub use files::FileRepo;
pub use locks::LockRepo;
pub use versions::{CommitOutcome, VersionRepo};
