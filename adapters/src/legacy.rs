//! Legacy grants from a local tab-separated file

use async_trait::async_trait;
use std::path::PathBuf;
use usageguard_engine::{
    LegacyGrant, LegacyGrantSource, Result, UsageGuardError, parse_legacy_grants,
};

pub struct FileLegacyGrants {
    path: PathBuf,
}

impl FileLegacyGrants {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl LegacyGrantSource for FileLegacyGrants {
    async fn load(&self) -> Result<Vec<LegacyGrant>> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            UsageGuardError::dataset(format!(
                "failed to read legacy grants {}: {e}",
                self.path.display()
            ))
        })?;
        parse_legacy_grants(&text)
    }
}
