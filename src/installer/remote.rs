//! Remote endpoint contract and its HTTP implementation.
//!
//! The installer only requires that, given an OS identifier, the endpoint
//! can produce a manifest of artifacts and fetch each one by its source
//! location. The trait keeps the fetch engine independent of the wire, so
//! tests can substitute an in-process endpoint.

use std::path::Path;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::StreamExt;
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use url::Url;

use crate::error::InstallerError;

use super::platform::OperatingSystem;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
// No data for this long aborts the transfer rather than hanging the install.
const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(300);

/// One downloadable file required to run the services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSpec {
    /// File name the artifact is staged under.
    pub name: String,
    /// Download location.
    pub source: String,
    /// Hex-encoded SHA-256 of the artifact content.
    pub sha256: String,
    /// Whether this artifact is registered as a background service.
    #[serde(default)]
    pub service: bool,
    /// Human-readable service name; falls back to `name`.
    #[serde(default)]
    pub display_name: Option<String>,
}

impl ArtifactSpec {
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

/// Manifest of artifacts for one operating system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub artifacts: Vec<ArtifactSpec>,
}

/// Source of artifact manifests and artifact bytes.
pub trait RemoteEndpoint: Send + Sync {
    /// Retrieve the manifest of artifacts for `os`.
    fn manifest(&self, os: OperatingSystem) -> BoxFuture<'_, Result<Manifest, InstallerError>>;

    /// Download one artifact to `dest`, overwriting any existing file.
    fn download<'a>(
        &'a self,
        artifact: &'a ArtifactSpec,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<(), InstallerError>>;
}

/// Production endpoint talking to the MiningHQ API over HTTPS.
pub struct HttpEndpoint {
    base: Url,
    client: reqwest::Client,
}

impl HttpEndpoint {
    pub fn new(api_endpoint: &str) -> Result<Self, InstallerError> {
        let mut base = Url::parse(api_endpoint).map_err(|e| {
            InstallerError::Configuration(format!("invalid API endpoint '{api_endpoint}': {e}"))
        })?;
        if base.cannot_be_a_base() {
            return Err(InstallerError::Configuration(format!(
                "invalid API endpoint '{api_endpoint}': not a base URL"
            )));
        }
        // `Url::join` drops the last path segment unless the base ends in a
        // slash.
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("mhq-manager/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| InstallerError::System(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { base, client })
    }

    fn manifest_url(&self, os: OperatingSystem) -> Result<Url, InstallerError> {
        self.base
            .join(&format!("manifest/{os}"))
            .map_err(|e| InstallerError::Configuration(format!("invalid manifest URL: {e}")))
    }
}

impl RemoteEndpoint for HttpEndpoint {
    fn manifest(&self, os: OperatingSystem) -> BoxFuture<'_, Result<Manifest, InstallerError>> {
        Box::pin(async move {
            let url = self.manifest_url(os)?;
            debug!("fetching artifact manifest from {url}");

            let fetch = |e: reqwest::Error| InstallerError::Fetch {
                artifact: "manifest".to_string(),
                reason: e.to_string(),
            };

            let response = self.client.get(url).send().await.map_err(fetch)?;
            let response = response.error_for_status().map_err(fetch)?;
            response.json::<Manifest>().await.map_err(fetch)
        })
    }

    fn download<'a>(
        &'a self,
        artifact: &'a ArtifactSpec,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<(), InstallerError>> {
        Box::pin(async move {
            let fetch = |reason: String| InstallerError::Fetch {
                artifact: artifact.name.clone(),
                reason,
            };

            let response = self
                .client
                .get(&artifact.source)
                .send()
                .await
                .map_err(|e| fetch(e.to_string()))?
                .error_for_status()
                .map_err(|e| fetch(e.to_string()))?;

            let mut file = tokio::fs::File::create(dest)
                .await
                .map_err(|e| fetch(format!("failed to create {}: {e}", dest.display())))?;

            let mut stream = response.bytes_stream();
            loop {
                let chunk = match timeout(INACTIVITY_TIMEOUT, stream.next()).await {
                    Ok(Some(Ok(chunk))) => chunk,
                    Ok(Some(Err(e))) => return Err(fetch(e.to_string())),
                    Ok(None) => break,
                    Err(_) => {
                        return Err(fetch(format!(
                            "no data received for {} seconds",
                            INACTIVITY_TIMEOUT.as_secs()
                        )));
                    }
                };

                file.write_all(&chunk)
                    .await
                    .map_err(|e| fetch(format!("failed to write {}: {e}", dest.display())))?;
            }

            file.flush()
                .await
                .map_err(|e| fetch(format!("failed to flush {}: {e}", dest.display())))?;

            Ok(())
        })
    }
}
