//! Sample Composer repository documents.

use serde_json::{Value, json};

/// Factory for upstream repository documents.
pub struct ComposerFixture;

impl ComposerFixture {
    /// `packages/list.json` naming the given packages.
    pub fn package_list(names: &[&str]) -> Value {
        json!({ "packageNames": names })
    }

    /// Provider document for `vendor/project` whose versions download from
    /// `{dist_base}/dist/{vendor}/{project}/{version}.zip`.
    pub fn provider(vendor: &str, project: &str, versions: &[&str], dist_base: &str) -> Value {
        let name = format!("{}/{}", vendor, project);
        let entries: serde_json::Map<String, Value> = versions
            .iter()
            .map(|version| {
                (
                    version.to_string(),
                    json!({
                        "name": name,
                        "version": version,
                        "dist": {
                            "type": "zip",
                            "url": Self::dist_url(vendor, project, version, dist_base),
                            "reference": format!("ref-{}", version),
                            "shasum": ""
                        }
                    }),
                )
            })
            .collect();
        let mut packages = serde_json::Map::new();
        packages.insert(name, Value::Object(entries));
        json!({ "packages": packages })
    }

    pub fn dist_path(vendor: &str, project: &str, version: &str) -> String {
        format!("/dist/{}/{}/{}.zip", vendor, project, version)
    }

    pub fn dist_url(vendor: &str, project: &str, version: &str, dist_base: &str) -> String {
        format!(
            "{}{}",
            dist_base.trim_end_matches('/'),
            Self::dist_path(vendor, project, version)
        )
    }

    /// Bytes standing in for an archive.
    pub fn archive(vendor: &str, project: &str, version: &str) -> Vec<u8> {
        let mut bytes = b"PK\x03\x04".to_vec();
        bytes.extend_from_slice(format!("{}/{}@{}", vendor, project, version).as_bytes());
        bytes
    }

    /// Proxy path of an archive, as advertised in rewritten provider documents.
    pub fn archive_path(vendor: &str, project: &str, version: &str) -> String {
        format!("/{0}/{1}/{2}/{0}-{1}-{2}.zip", vendor, project, version)
    }
}
