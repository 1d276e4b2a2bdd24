//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for blobs.
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/blobs"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Filesystem { path } => {
                if path.as_os_str().is_empty() {
                    return Err("storage.path must not be empty".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path (`:memory:` for an ephemeral store).
        path: PathBuf,
        /// Advisory query timeout in seconds. SQLite cannot cancel statements,
        /// so this only bounds how long a writer waits on a busy database.
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(30)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Sqlite {
                path,
                query_timeout_secs,
            } => {
                if path.as_os_str().is_empty() {
                    return Err("metadata.path must not be empty".to_string());
                }
                if *query_timeout_secs == Some(0) {
                    return Err("metadata.query_timeout_secs must be greater than 0".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Lock manager configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LockConfig {
    /// Lease duration in seconds (default: 30 minutes).
    #[serde(default = "default_lock_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_lock_ttl_secs() -> u64 {
    crate::DEFAULT_LOCK_TTL_SECS
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_lock_ttl_secs(),
        }
    }
}

impl LockConfig {
    /// Lease duration as a Duration.
    pub fn ttl(&self) -> Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        let secs = i64::try_from(self.ttl_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }

    /// Validate lock configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.ttl_secs == 0 {
            return Err("locks.ttl_secs must be greater than 0".to_string());
        }
        if self.ttl_secs > crate::MAX_LOCK_TTL_SECS {
            return Err(format!(
                "locks.ttl_secs must be at most {} (one year)",
                crate::MAX_LOCK_TTL_SECS
            ));
        }
        Ok(())
    }
}

/// Diff engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Column names whose changes are flagged `is_critical`.
    #[serde(default)]
    pub critical_columns: Vec<String>,
    /// Upper bound on a single diff computation, in seconds.
    #[serde(default = "default_diff_timeout_secs")]
    pub timeout_secs: u64,
    /// Uploads larger than this run as background jobs.
    #[serde(default = "default_background_threshold_bytes")]
    pub background_threshold_bytes: u64,
}

fn default_diff_timeout_secs() -> u64 {
    120
}

fn default_background_threshold_bytes() -> u64 {
    8 * 1024 * 1024
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            critical_columns: Vec::new(),
            timeout_secs: default_diff_timeout_secs(),
            background_threshold_bytes: default_background_threshold_bytes(),
        }
    }
}

impl DiffConfig {
    /// Diff timeout as a std Duration (used with `tokio::time::timeout`).
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }

    /// Validate diff configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_secs == 0 {
            return Err("diff.timeout_secs must be greater than 0".to_string());
        }
        if self.critical_columns.iter().any(|c| c.trim().is_empty()) {
            return Err("diff.critical_columns must not contain empty names".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Blob storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Lock manager configuration.
    #[serde(default)]
    pub locks: LockConfig,
    /// Diff engine configuration.
    #[serde(default)]
    pub diff: DiffConfig,
}

impl AppConfig {
    /// Create a test configuration rooted at `dir`.
    ///
    /// **For testing only.**
    pub fn for_testing(dir: &std::path::Path) -> Self {
        Self {
            storage: StorageConfig::Filesystem {
                path: dir.join("blobs"),
            },
            metadata: MetadataConfig::Sqlite {
                path: dir.join("metadata.db"),
                query_timeout_secs: Some(5),
            },
            locks: LockConfig::default(),
            diff: DiffConfig::default(),
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.storage.validate()?;
        self.metadata.validate()?;
        self.locks.validate()?;
        self.diff.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_config_defaults_to_thirty_minutes() {
        let config = LockConfig::default();
        assert_eq!(config.ttl(), Duration::minutes(30));
    }

    #[test]
    fn test_app_config_deserialize_empty() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert!(config.validate().is_ok());
        assert!(config.diff.critical_columns.is_empty());
        assert_eq!(config.diff.timeout_secs, 120);
    }

    #[test]
    fn test_storage_config_tagged() {
        let json = r#"{"type":"filesystem","path":"/tmp/blobs"}"#;
        let config: StorageConfig = serde_json::from_str(json).unwrap();
        match config {
            StorageConfig::Filesystem { path } => assert_eq!(path, PathBuf::from("/tmp/blobs")),
        }
    }

    #[test]
    fn test_metadata_config_timeout_defaults_when_missing() {
        let json = r#"{"type":"sqlite","path":"meta.db"}"#;
        let config: MetadataConfig = serde_json::from_str(json).unwrap();
        match config {
            MetadataConfig::Sqlite {
                query_timeout_secs, ..
            } => assert_eq!(query_timeout_secs, Some(30)),
        }
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let config = LockConfig { ttl_secs: 0 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_caps_ttl_at_one_year() {
        let year = LockConfig {
            ttl_secs: crate::MAX_LOCK_TTL_SECS,
        };
        assert!(year.validate().is_ok());

        for ttl_secs in [crate::MAX_LOCK_TTL_SECS + 1, u64::MAX] {
            let err = LockConfig { ttl_secs }.validate().unwrap_err();
            assert!(err.contains("at most"), "{err}");
        }
    }

    #[test]
    fn test_validate_rejects_blank_critical_column() {
        let config = DiffConfig {
            critical_columns: vec!["Tax".to_string(), " ".to_string()],
            ..DiffConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
