//! Composer JSON document processing.
//!
//! Handles the three transformations the proxy needs:
//!
//! - synthesising `packages.json` from the upstream `packages/list.json`
//! - looking up the upstream `dist.url` of one version in a provider document
//! - rewriting provider documents so archive downloads come back through the proxy

use bytes::Bytes;
use comproxy_core::asset::{archive_filename, is_valid_token};
use comproxy_core::{Error, MetadataCodec, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Deserialize)]
struct PackageList {
    #[serde(rename = "packageNames")]
    package_names: Vec<String>,
}

#[derive(Serialize)]
struct PackageIndex {
    packages: Map<String, Value>,
    #[serde(rename = "providers-url")]
    providers_url: String,
    providers: BTreeMap<String, ProviderHash>,
}

#[derive(Serialize)]
struct ProviderHash {
    sha256: Option<String>,
}

/// [`MetadataCodec`] for Composer v1 repository documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComposerJsonCodec;

impl ComposerJsonCodec {
    pub fn new() -> Self {
        Self
    }

    /// Proxy URL under which an archive of `name` at `version` is served.
    pub fn archive_url(repository_url: &str, name: &str, version: &str) -> Option<String> {
        let (vendor, project) = name.split_once('/')?;
        if ![vendor, project, version].iter().all(|token| is_valid_token(token)) {
            return None;
        }
        Some(format!(
            "{}/{}/{}/{}/{}.zip",
            repository_url.trim_end_matches('/'),
            vendor,
            project,
            version,
            archive_filename(vendor, project, version)
        ))
    }
}

fn parse_document(raw: &[u8], what: &str) -> Result<Value> {
    serde_json::from_slice(raw)
        .map_err(|e| Error::MalformedContent(format!("Unparseable {}: {}", what, e)))
}

fn packages_of<'a>(document: &'a Value, what: &str) -> Result<&'a Map<String, Value>> {
    document
        .get("packages")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::MalformedContent(format!("{} has no packages object", what)))
}

impl MetadataCodec for ComposerJsonCodec {
    fn synthesize_package_index(&self, repository_url: &str, package_list: &[u8]) -> Result<Bytes> {
        let list: PackageList = serde_json::from_slice(package_list)
            .map_err(|e| Error::MalformedContent(format!("Unparseable package list: {}", e)))?;

        let index = PackageIndex {
            packages: Map::new(),
            providers_url: format!("{}/p/%package%.json", repository_url.trim_end_matches('/')),
            providers: list
                .package_names
                .into_iter()
                .map(|name| (name, ProviderHash { sha256: None }))
                .collect(),
        };

        Ok(Bytes::from(serde_json::to_vec(&index)?))
    }

    fn resolve_dist_url(
        &self,
        vendor: &str,
        project: &str,
        version: &str,
        provider: &[u8],
    ) -> Result<String> {
        let package = format!("{}/{}", vendor, project);
        let not_found = || Error::NotFoundInMetadata {
            package: package.clone(),
            version: version.to_string(),
        };

        let document = parse_document(provider, "provider metadata")?;
        let versions = packages_of(&document, "provider metadata")?
            .get(&package)
            .ok_or_else(not_found)?;
        let entry = versions
            .as_object()
            .ok_or_else(|| Error::MalformedContent(format!("{} versions is not an object", package)))?
            .get(version)
            .ok_or_else(not_found)?;

        // A version without a dist section has no archive to serve.
        entry
            .get("dist")
            .and_then(|dist| dist.get("url"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(not_found)
    }

    fn rewrite_provider(&self, repository_url: &str, provider: &[u8]) -> Result<Bytes> {
        let mut document = parse_document(provider, "provider metadata")?;
        packages_of(&document, "provider metadata")?;

        if let Some(packages) = document.get_mut("packages").and_then(Value::as_object_mut) {
            for (name, versions) in packages.iter_mut() {
                let Some(versions) = versions.as_object_mut() else {
                    continue;
                };
                for (version, entry) in versions.iter_mut() {
                    let Some(dist) = entry.get_mut("dist").and_then(Value::as_object_mut) else {
                        continue;
                    };
                    match Self::archive_url(repository_url, name, version) {
                        Some(url) => {
                            dist.insert("url".to_string(), Value::String(url));
                            dist.insert("type".to_string(), Value::String("zip".to_string()));
                        }
                        None => debug!(package = %name, version = %version, "Leaving dist url of unroutable version as is"),
                    }
                }
            }
        }

        Ok(Bytes::from(serde_json::to_vec(&document)?))
    }
}
