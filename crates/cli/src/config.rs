//! Configuration loading.

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use sheetvault_core::config::AppConfig;
use std::path::Path;

/// Environment variable prefix; nested keys are separated by `__`
/// (`SHEETVAULT_DIFF__TIMEOUT_SECS=30`).
pub const ENV_PREFIX: &str = "SHEETVAULT_";

/// Load configuration from defaults, the optional TOML file at `path` and the
/// environment, in increasing precedence.
pub fn load(path: &Path) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if path.exists() {
        tracing::debug!(config_path = %path.display(), "loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!(config_path = %path.display(), "no config file, using defaults and environment");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .context("failed to load configuration")?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetvault_core::config::{MetadataConfig, StorageConfig};
    use std::path::PathBuf;

    #[test]
    fn test_missing_file_uses_defaults() {
        figment::Jail::expect_with(|jail| {
            let config = load(&jail.directory().join("absent.toml")).unwrap();
            assert_eq!(config.locks.ttl_secs, 1800);
            assert_eq!(config.diff.timeout_secs, 120);
            Ok(())
        });
    }

    #[test]
    fn test_file_and_env_merge() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "sheetvault.toml",
                r#"
                [storage]
                type = "filesystem"
                path = "/srv/blobs"

                [diff]
                critical_columns = ["Tax", "Total"]
                "#,
            )?;
            jail.set_env("SHEETVAULT_LOCKS__TTL_SECS", "60");
            jail.set_env("SHEETVAULT_METADATA__PATH", "/srv/meta.db");

            let config = load(&jail.directory().join("sheetvault.toml")).unwrap();
            let StorageConfig::Filesystem { path } = &config.storage;
            assert_eq!(path, &PathBuf::from("/srv/blobs"));
            let MetadataConfig::Sqlite { path, .. } = &config.metadata;
            assert_eq!(path, &PathBuf::from("/srv/meta.db"));
            assert_eq!(config.locks.ttl_secs, 60);
            assert_eq!(config.diff.critical_columns, ["Tax", "Total"]);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_values_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SHEETVAULT_LOCKS__TTL_SECS", "0");
            let err = load(&jail.directory().join("absent.toml")).unwrap_err();
            assert!(err.to_string().contains("locks.ttl_secs"));
            Ok(())
        });
    }

    #[test]
    fn test_oversized_lock_ttl_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SHEETVAULT_LOCKS__TTL_SECS", u64::MAX.to_string());
            let err = load(&jail.directory().join("absent.toml")).unwrap_err();
            assert!(err.to_string().contains("at most"), "{err}");
            Ok(())
        });
    }
}
