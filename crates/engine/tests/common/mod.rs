//! Common test utilities and fixtures.

use async_trait::async_trait;
use bytes::Bytes;
use rust_xlsxwriter::Workbook;
use sheetvault_core::config::AppConfig;
use sheetvault_engine::{Engine, Upload, UploadResult};
use sheetvault_storage::{ObjectMeta, ObjectStore, StorageError, StorageResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;
use tokio::sync::{Mutex, oneshot};

pub const AUTHOR: &str = "alice@example.com";

/// An engine over a temporary blob root and SQLite database.
#[allow(dead_code)]
pub struct TestEngine {
    pub engine: Engine,
    pub config: AppConfig,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestEngine {
    /// `Tax` is configured as a critical column.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let mut config = AppConfig::for_testing(temp_dir.path());
        config.diff.critical_columns = vec!["Tax".to_string()];
        customize(&mut config);

        let engine = Engine::from_config(config.clone())
            .await
            .expect("Failed to build engine");
        Self {
            engine,
            config,
            _temp_dir: temp_dir,
        }
    }

    /// Engine whose blob store is `wrap` applied to the real backend.
    pub async fn with_objects(wrap: impl FnOnce(Arc<dyn ObjectStore>) -> Arc<dyn ObjectStore>) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let mut config = AppConfig::for_testing(temp_dir.path());
        config.diff.critical_columns = vec!["Tax".to_string()];

        let inner = sheetvault_storage::from_config(&config.storage).await.unwrap();
        let metadata = sheetvault_metadata::from_config(&config.metadata).await.unwrap();
        let engine = Engine::new(config.clone(), wrap(inner), metadata);
        Self {
            engine,
            config,
            _temp_dir: temp_dir,
        }
    }

    /// Upload `bytes` as the first version of a new file.
    pub async fn upload_new(&self, bytes: Vec<u8>) -> UploadResult {
        self.engine
            .upload(Upload::new(bytes, AUTHOR).named("A.xlsx"))
            .await
            .expect("upload failed")
    }
}

/// Build an xlsx workbook. Cells that parse as numbers are written as numbers
/// and empty strings are left blank.
#[allow(dead_code)]
pub fn xlsx(sheets: &[(&str, Vec<Vec<&str>>)]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    for (name, rows) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*name).unwrap();
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                let (r, c) = (r as u32, c as u16);
                if cell.is_empty() {
                    continue;
                } else if let Ok(n) = cell.parse::<f64>() {
                    worksheet.write_number(r, c, n).unwrap();
                } else {
                    worksheet.write_string(r, c, *cell).unwrap();
                }
            }
        }
    }
    workbook.save_to_buffer().unwrap()
}

/// Single-sheet invoice workbook with the given `(Item, Qty, Tax)` rows.
#[allow(dead_code)]
pub fn invoice(rows: &[(&str, &str, &str)]) -> Vec<u8> {
    let mut grid = vec![vec!["Item", "Qty", "Tax"]];
    grid.extend(rows.iter().map(|(item, qty, tax)| vec![*item, *qty, *tax]));
    xlsx(&[("Sheet1", grid)])
}

/// CSV with a header and `rows` generated data rows; `edit` overrides the
/// `Tax` column of selected rows.
#[allow(dead_code)]
pub fn generated_csv(rows: usize, edit: impl Fn(usize) -> Option<f64>) -> Vec<u8> {
    let mut out = String::with_capacity(rows * 32);
    out.push_str("Id,Name,Amount,Tax\n");
    for i in 0..rows {
        let tax = edit(i).unwrap_or((i % 1000) as f64 + 0.5);
        out.push_str(&format!("{i},name-{i},{},{tax}\n", i * 3));
    }
    out.into_bytes()
}

type Hold = (oneshot::Sender<()>, oneshot::Receiver<()>);

/// Object store wrapper that can fail writes or park the next write,
/// delegating everything else to a real backend.
#[allow(dead_code)]
pub struct FaultyObjectStore {
    inner: Arc<dyn ObjectStore>,
    fail_writes: AtomicBool,
    write_attempts: AtomicUsize,
    hold: Mutex<Option<Hold>>,
}

#[allow(dead_code)]
impl FaultyObjectStore {
    pub fn wrapping(inner: Arc<dyn ObjectStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_writes: AtomicBool::new(false),
            write_attempts: AtomicUsize::new(0),
            hold: Mutex::new(None),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    /// Park the next write until the returned sender fires. The returned
    /// receiver resolves once a write has been parked.
    pub async fn hold_next_write(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *self.hold.lock().await = Some((entered_tx, release_rx));
        (entered_rx, release_tx)
    }

    async fn before_write(&self, key: &str) -> StorageResult<()> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);

        let hold = self.hold.lock().await.take();
        if let Some((entered, release)) = hold {
            let _ = entered.send(());
            let _ = release.await;
        }

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other(format!(
                "injected write failure for {key}"
            ))));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FaultyObjectStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.before_write(key).await?;
        self.inner.put(key, data).await
    }

    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool> {
        self.before_write(key).await?;
        self.inner.put_if_not_exists(key, data).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list(prefix).await
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }
}
