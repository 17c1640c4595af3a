//! Tool version lookup for the dump header.
//!
//! The version printed in the header comes from a [`VersionProvider`] handed
//! to the dumper. A provider that fails never fails the dump: the header
//! then says `unknown`.

use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;

/// Version text used when a provider cannot answer.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Supplies the tool version.
#[async_trait]
pub trait VersionProvider: Send + Sync {
    async fn version(&self) -> Result<String>;
}

/// Version of this crate, fixed at compile time.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageVersion;

#[async_trait]
impl VersionProvider for PackageVersion {
    async fn version(&self) -> Result<String> {
        Ok(env!("CARGO_PKG_VERSION").to_string())
    }
}

/// A fixed version string.
#[derive(Debug, Clone)]
pub struct StaticVersion(pub String);

#[async_trait]
impl VersionProvider for StaticVersion {
    async fn version(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Ask the provider, falling back to [`UNKNOWN_VERSION`].
pub async fn resolve_version(provider: &dyn VersionProvider) -> String {
    match provider.version().await {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        Ok(_) => {
            warn!("Version provider returned an empty version");
            UNKNOWN_VERSION.to_string()
        }
        Err(e) => {
            warn!("Could not determine tool version: {}", e);
            UNKNOWN_VERSION.to_string()
        }
    }
}

#[cfg(feature = "remote-version")]
pub use remote::GithubTagVersion;

#[cfg(feature = "remote-version")]
mod remote {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde::Deserialize;

    use super::VersionProvider;
    use crate::error::{DumpError, Result};

    const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

    #[derive(Deserialize)]
    struct Tag {
        name: String,
    }

    /// Newest tag of a GitHub repository, with any leading `v` removed.
    #[derive(Debug, Clone)]
    pub struct GithubTagVersion {
        owner: String,
        repo: String,
        client: reqwest::Client,
    }

    impl GithubTagVersion {
        pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
            Self {
                owner: owner.into(),
                repo: repo.into(),
                client: reqwest::Client::new(),
            }
        }

        fn url(&self) -> String {
            format!(
                "https://api.github.com/repos/{}/{}/tags",
                self.owner, self.repo
            )
        }
    }

    #[async_trait]
    impl VersionProvider for GithubTagVersion {
        async fn version(&self) -> Result<String> {
            let response = self
                .client
                .get(self.url())
                .header("User-Agent", concat!("pg-parallel-dump/", env!("CARGO_PKG_VERSION")))
                .timeout(REQUEST_TIMEOUT)
                .send()
                .await
                .map_err(|e| DumpError::Connection(format!("fetching tags: {}", e)))?;

            if !response.status().is_success() {
                return Err(DumpError::Connection(format!(
                    "tag lookup returned status {}",
                    response.status()
                )));
            }

            let tags: Vec<Tag> = response
                .json()
                .await
                .map_err(|e| DumpError::Connection(format!("decoding tags: {}", e)))?;

            tags.into_iter()
                .next()
                .map(|t| t.name.trim_start_matches('v').to_string())
                .ok_or_else(|| DumpError::Connection(format!("{} has no tags", self.url())))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_tags_url() {
            let provider = GithubTagVersion::new("acme", "dump");
            assert_eq!(provider.url(), "https://api.github.com/repos/acme/dump/tags");
        }
    }
}
