//! Configuration for the upstream client and cache policy.

use comproxy_core::{CacheController, CacheControllers, Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Upstream Composer repository settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the proxied repository.
    pub url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "https://repo.packagist.org/".to_string(),
            timeout_secs: 30,
            connect_timeout_secs: 10,
            user_agent: format!("comproxy/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl UpstreamConfig {
    /// Create a new config for an upstream URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Parse the upstream URL, normalised to end with `/` so relative
    /// paths join beneath it.
    pub fn base_url(&self) -> Result<Url> {
        let mut raw = self.url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw)
            .map_err(|e| Error::Config(format!("Invalid upstream url {:?}: {}", self.url, e)))?;
        if url.cannot_be_a_base() {
            return Err(Error::Config(format!("Upstream url {:?} cannot be a base", self.url)));
        }
        Ok(url)
    }
}

/// Freshness settings, in minutes. A negative age never expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CachePolicyConfig {
    pub metadata_max_age_minutes: i64,
    pub content_max_age_minutes: i64,
    /// Send conditional requests when a stored copy is stale.
    pub revalidate: bool,
    /// Serve stale copies when upstream is unreachable.
    pub stale_on_error: bool,
}

impl Default for CachePolicyConfig {
    fn default() -> Self {
        Self {
            metadata_max_age_minutes: 1440,
            content_max_age_minutes: 1440,
            revalidate: true,
            stale_on_error: false,
        }
    }
}

impl CachePolicyConfig {
    /// Build the per-cache-type controllers.
    pub fn controllers(&self) -> Result<CacheControllers> {
        let build = |minutes| -> Result<CacheController> {
            Ok(CacheController::from_minutes(minutes)?
                .with_revalidate(self.revalidate)
                .with_stale_on_error(self.stale_on_error))
        };
        Ok(CacheControllers::new(
            build(self.metadata_max_age_minutes)?,
            build(self.content_max_age_minutes)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comproxy_core::CacheType;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let config = UpstreamConfig::new("https://packages.example.com/composer");
        let base = config.base_url().unwrap();
        assert_eq!(base.as_str(), "https://packages.example.com/composer/");
        assert_eq!(
            base.join("p/acme/widget.json").unwrap().as_str(),
            "https://packages.example.com/composer/p/acme/widget.json"
        );
    }

    #[test]
    fn test_invalid_upstream_url() {
        assert!(matches!(
            UpstreamConfig::new("not a url").base_url(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_policy_controllers() {
        let config = CachePolicyConfig {
            metadata_max_age_minutes: 5,
            content_max_age_minutes: -1,
            revalidate: false,
            stale_on_error: true,
        };
        let controllers = config.controllers().unwrap();
        assert_eq!(
            controllers.get(CacheType::Metadata).max_age,
            Some(chrono::Duration::minutes(5))
        );
        assert_eq!(controllers.get(CacheType::Content).max_age, None);
        assert!(!controllers.get(CacheType::Content).revalidate);
        assert!(controllers.get(CacheType::Metadata).stale_on_error);
    }

    #[test]
    fn test_out_of_range_age_is_rejected() {
        let config = CachePolicyConfig {
            metadata_max_age_minutes: i64::MAX / 2,
            ..Default::default()
        };
        assert!(matches!(config.controllers(), Err(Error::Config(_))));

        let config = CachePolicyConfig {
            content_max_age_minutes: i64::MAX,
            ..Default::default()
        };
        assert!(matches!(config.controllers(), Err(Error::Config(_))));
    }
}
