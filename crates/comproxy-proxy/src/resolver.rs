//! Distribution archive origin resolution.

use comproxy_core::asset::provider_path;
use comproxy_core::{Dispatch, DispatchAttributes, MetadataCodec, Result};
use std::sync::Arc;
use tracing::debug;

/// Finds the upstream download URL of a package version.
///
/// The provider document is looked up through the repository itself, so it
/// is cached and deduplicated like any client request. The lookup asks for
/// the raw document; a rewritten one would only point back at the proxy.
#[derive(Clone)]
pub struct ZipballResolver {
    codec: Arc<dyn MetadataCodec>,
}

impl ZipballResolver {
    pub fn new(codec: Arc<dyn MetadataCodec>) -> Self {
        Self { codec }
    }

    pub async fn resolve(
        &self,
        dispatcher: &dyn Dispatch,
        vendor: &str,
        project: &str,
        version: &str,
    ) -> Result<String> {
        let path = provider_path(vendor, project);
        let provider = dispatcher
            .dispatch(&path, DispatchAttributes::internal_raw())
            .await?;

        let url = self
            .codec
            .resolve_dist_url(vendor, project, version, &provider.content.payload)?;
        debug!(package = %format!("{}/{}", vendor, project), version, url = %url, "Resolved archive origin");
        Ok(url)
    }
}
