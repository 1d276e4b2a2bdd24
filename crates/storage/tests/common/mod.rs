//! Common test utilities and fixtures.

use bytes::Bytes;
use sheetvault_storage::{ContentStore, FilesystemBackend, ObjectStore};
use std::sync::Arc;
use tempfile::TempDir;

/// Filesystem-backed content store rooted in a temporary directory.
#[allow(dead_code)]
pub struct TestStore {
    pub objects: Arc<dyn ObjectStore>,
    pub content: ContentStore,
    pub dir: TempDir,
}

#[allow(dead_code)]
impl TestStore {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let backend = FilesystemBackend::new(dir.path())
            .await
            .expect("Failed to create backend");
        let objects: Arc<dyn ObjectStore> = Arc::new(backend);
        Self {
            content: ContentStore::new(objects.clone()),
            objects,
            dir,
        }
    }
}

/// Deterministic pseudo-random bytes.
#[allow(dead_code)]
pub fn payload(len: usize, seed: u8) -> Bytes {
    let mut state = u32::from(seed).wrapping_mul(2_654_435_761).max(1);
    let data: Vec<u8> = (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect();
    Bytes::from(data)
}
