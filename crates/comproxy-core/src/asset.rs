//! Asset classification and cache key paths.
//!
//! Every request the proxy understands is one of four [`AssetKind`]s. The
//! kind together with the path tokens extracted from the request forms an
//! [`Asset`], whose [`Asset::cache_key`] is both the content store key and
//! the path used for internal requests.

use crate::cache::CacheType;
use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

pub const PACKAGES_JSON: &str = "packages.json";
pub const LIST_JSON: &str = "packages/list.json";

pub const VENDOR_TOKEN: &str = "vendor";
pub const PROJECT_TOKEN: &str = "project";
pub const VERSION_TOKEN: &str = "version";
pub const FILENAME_TOKEN: &str = "filename";

/// Named tokens extracted from a request path.
pub type Tokens = HashMap<String, String>;

/// The closed set of artifact types served by the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    PackageIndex,
    PackageList,
    ProviderMetadata,
    DistributionArchive,
}

impl AssetKind {
    /// Cache type whose controller governs freshness for this kind.
    pub fn cache_type(self) -> CacheType {
        match self {
            AssetKind::PackageIndex | AssetKind::PackageList | AssetKind::ProviderMetadata => {
                CacheType::Metadata
            }
            AssetKind::DistributionArchive => CacheType::Content,
        }
    }

    /// MIME type of the served payload.
    pub fn content_type(self) -> &'static str {
        match self {
            AssetKind::DistributionArchive => "application/zip",
            _ => "application/json",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssetKind::PackageIndex => "package_index",
            AssetKind::PackageList => "package_list",
            AssetKind::ProviderMetadata => "provider_metadata",
            AssetKind::DistributionArchive => "distribution_archive",
        };
        f.write_str(name)
    }
}

/// A classified request: asset kind plus the tokens that kind requires.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Asset {
    PackageIndex,
    PackageList,
    ProviderMetadata {
        vendor: String,
        project: String,
    },
    DistributionArchive {
        vendor: String,
        project: String,
        version: String,
        filename: String,
    },
}

impl Asset {
    pub fn provider(vendor: impl Into<String>, project: impl Into<String>) -> Self {
        Asset::ProviderMetadata {
            vendor: vendor.into(),
            project: project.into(),
        }
    }

    pub fn archive(
        vendor: impl Into<String>,
        project: impl Into<String>,
        version: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Asset::DistributionArchive {
            vendor: vendor.into(),
            project: project.into(),
            version: version.into(),
            filename: filename.into(),
        }
    }

    /// Build an asset from a kind and the extracted token map.
    ///
    /// A token the kind requires being absent means the router handed over
    /// an inconsistent classification, which is a contract violation.
    pub fn from_tokens(kind: AssetKind, tokens: &Tokens) -> Result<Self> {
        let require = |name: &str| -> Result<String> {
            tokens.get(name).cloned().ok_or_else(|| {
                Error::ContractViolation(format!("{} request is missing the {} token", kind, name))
            })
        };

        Ok(match kind {
            AssetKind::PackageIndex => Asset::PackageIndex,
            AssetKind::PackageList => Asset::PackageList,
            AssetKind::ProviderMetadata => Asset::ProviderMetadata {
                vendor: require(VENDOR_TOKEN)?,
                project: require(PROJECT_TOKEN)?,
            },
            AssetKind::DistributionArchive => Asset::DistributionArchive {
                vendor: require(VENDOR_TOKEN)?,
                project: require(PROJECT_TOKEN)?,
                version: require(VERSION_TOKEN)?,
                filename: require(FILENAME_TOKEN)?,
            },
        })
    }

    pub fn kind(&self) -> AssetKind {
        match self {
            Asset::PackageIndex => AssetKind::PackageIndex,
            Asset::PackageList => AssetKind::PackageList,
            Asset::ProviderMetadata { .. } => AssetKind::ProviderMetadata,
            Asset::DistributionArchive { .. } => AssetKind::DistributionArchive,
        }
    }

    /// Logical storage key, also used as the internal request path.
    pub fn cache_key(&self) -> String {
        match self {
            Asset::PackageIndex => PACKAGES_JSON.to_string(),
            Asset::PackageList => LIST_JSON.to_string(),
            Asset::ProviderMetadata { vendor, project } => provider_path(vendor, project),
            Asset::DistributionArchive {
                vendor,
                project,
                version,
                filename,
            } => format!("{}/{}/{}/{}.zip", vendor, project, version, filename),
        }
    }

    /// `vendor/project` for assets that belong to a single package.
    pub fn package_name(&self) -> Option<String> {
        match self {
            Asset::ProviderMetadata { vendor, project }
            | Asset::DistributionArchive {
                vendor, project, ..
            } => Some(format!("{}/{}", vendor, project)),
            _ => None,
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.cache_key())
    }
}

/// Provider metadata path for a package.
pub fn provider_path(vendor: &str, project: &str) -> String {
    format!("p/{}/{}.json", vendor, project)
}

/// Conventional archive file name the proxy advertises for a package version.
pub fn archive_filename(vendor: &str, project: &str, version: &str) -> String {
    format!("{}-{}-{}", vendor, project, version)
}

static PACKAGES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^packages\.json$").expect("valid regex"));
static LIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^packages/list\.json$").expect("valid regex"));
static PROVIDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^p/(?P<vendor>[^/]+)/(?P<project>[^/]+)\.json$").expect("valid regex")
});
static ZIPBALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<vendor>[^/]+)/(?P<project>[^/]+)/(?P<version>[^/]+)/(?P<filename>[^/]+)\.zip$")
        .expect("valid regex")
});

/// Classify a request path into a kind and its tokens.
///
/// Leading slashes are ignored. Paths outside the four supported shapes, or
/// with tokens that could escape the key space, yield [`Error::NoRoute`].
pub fn match_path(path: &str) -> Result<(AssetKind, Tokens)> {
    let path = path.trim_start_matches('/');

    let (kind, captures) = if PACKAGES_RE.is_match(path) {
        (AssetKind::PackageIndex, None)
    } else if LIST_RE.is_match(path) {
        (AssetKind::PackageList, None)
    } else if let Some(caps) = PROVIDER_RE.captures(path) {
        (AssetKind::ProviderMetadata, Some((caps, &*PROVIDER_RE)))
    } else if let Some(caps) = ZIPBALL_RE.captures(path) {
        (AssetKind::DistributionArchive, Some((caps, &*ZIPBALL_RE)))
    } else {
        return Err(Error::NoRoute(path.to_string()));
    };

    let mut tokens = Tokens::new();
    if let Some((caps, re)) = captures {
        for name in re.capture_names().flatten() {
            if let Some(value) = caps.name(name) {
                if !is_valid_token(value.as_str()) {
                    return Err(Error::NoRoute(path.to_string()));
                }
                tokens.insert(name.to_string(), value.as_str().to_string());
            }
        }
    }

    Ok((kind, tokens))
}

/// Classify a request path straight into an [`Asset`].
pub fn classify(path: &str) -> Result<Asset> {
    let (kind, tokens) = match_path(path)?;
    Asset::from_tokens(kind, &tokens)
}

/// Whether a value can be used as a single path token.
pub fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && token != "."
        && !token.contains("..")
        && !token.contains(['/', '\\'])
        && !token.chars().any(char::is_control)
}
