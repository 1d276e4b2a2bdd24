//! Time-boxed exclusive write leases.

use crate::file::FileId;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Maximum length of a holder identity.
pub const MAX_HOLDER_LEN: usize = 256;

/// Identity of a lock holder (an editor, a service instance, ...).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HolderId(String);

impl HolderId {
    /// Validate and wrap a holder identity. Surrounding whitespace is trimmed.
    pub fn new(s: impl AsRef<str>) -> crate::Result<Self> {
        let s = s.as_ref().trim();
        if s.is_empty() {
            return Err(crate::Error::InvalidHolder(
                "holder identity must not be empty".to_string(),
            ));
        }
        if s.len() > MAX_HOLDER_LEN {
            return Err(crate::Error::InvalidHolder(format!(
                "holder identity exceeds {MAX_HOLDER_LEN} bytes"
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HolderId({})", self.0)
    }
}

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A granted write lease on a logical file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub file_id: FileId,
    pub holder: HolderId,
    #[serde(with = "time::serde::rfc3339")]
    pub acquired_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl Lease {
    /// A lease is logically absent once `now` has reached its expiry.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Check against the wall clock.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }
}
