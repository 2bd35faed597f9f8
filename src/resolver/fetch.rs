//! Transport for remote task definitions
//!
//! [`Fetcher`] is the seam between resolution logic and the network. The
//! default implementation shells out to `git` for repositories and pulls OCI
//! bundles with `oci-distribution`. Tests substitute their own fetcher.

use async_trait::async_trait;
use flate2::read::GzDecoder;
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::{Client, Reference};
use std::io::Read;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, trace};

/// Annotations Tekton writes on each bundle layer.
const ANNOTATION_KIND: &str = "dev.tekton.image.kind";
const ANNOTATION_NAME: &str = "dev.tekton.image.name";

/// A file at a revision of a git repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRequest {
    pub url: String,
    pub path_in_repo: String,
    pub revision: String,
}

/// One named object inside an OCI bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRequest {
    pub bundle: String,
    pub name: String,
    pub kind: String,
    pub service_account: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("invalid bundle reference {reference:?}: {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("registry error: {0}")]
    Registry(String),

    #[error("no {kind} named {name:?} in bundle {bundle}")]
    EntryNotFound {
        bundle: String,
        kind: String,
        name: String,
    },

    #[error("unreadable bundle layer: {0}")]
    Archive(String),
}

/// Retrieve raw document bytes for a remote reference.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_git(&self, request: &GitRequest) -> Result<Vec<u8>, FetchError>;

    async fn fetch_bundle(&self, request: &BundleRequest) -> Result<Vec<u8>, FetchError>;
}

/// `git` CLI and anonymous (or `GITHUB_TOKEN`) OCI pulls.
pub struct DefaultFetcher {
    git_binary: String,
    client: Client,
}

impl Default for DefaultFetcher {
    fn default() -> Self {
        Self::new("git")
    }
}

impl DefaultFetcher {
    pub fn new(git_binary: impl Into<String>) -> Self {
        let config = ClientConfig {
            protocol: ClientProtocol::Https,
            ..Default::default()
        };
        Self {
            git_binary: git_binary.into(),
            client: Client::new(config),
        }
    }

    async fn git(&self, dir: &std::path::Path, args: &[&str]) -> Result<Vec<u8>, FetchError> {
        trace!(?args, "Running git");
        let output = Command::new(&self.git_binary)
            .arg("-C")
            .arg(dir)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .await?;
        if !output.status.success() {
            return Err(FetchError::Git {
                command: args.first().copied().unwrap_or_default().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    fn auth(reference: &Reference) -> RegistryAuth {
        if reference.registry() == "ghcr.io" {
            if let Ok(token) = std::env::var("GITHUB_TOKEN") {
                return RegistryAuth::Basic(String::new(), token);
            }
        }
        RegistryAuth::Anonymous
    }
}

#[async_trait]
impl Fetcher for DefaultFetcher {
    async fn fetch_git(&self, request: &GitRequest) -> Result<Vec<u8>, FetchError> {
        debug!(url = %request.url, revision = %request.revision, path = %request.path_in_repo, "Fetching from git");
        let scratch = tempfile::tempdir()?;
        self.git(scratch.path(), &["init", "--quiet"]).await?;
        self.git(
            scratch.path(),
            &[
                "fetch",
                "--quiet",
                "--depth",
                "1",
                "--",
                request.url.as_str(),
                request.revision.as_str(),
            ],
        )
        .await?;
        let object = format!("FETCH_HEAD:{}", request.path_in_repo);
        self.git(scratch.path(), &["show", object.as_str()]).await
    }

    async fn fetch_bundle(&self, request: &BundleRequest) -> Result<Vec<u8>, FetchError> {
        let reference: Reference =
            request
                .bundle
                .parse()
                .map_err(|e: oci_distribution::ParseError| FetchError::InvalidReference {
                    reference: request.bundle.clone(),
                    reason: e.to_string(),
                })?;
        debug!(
            bundle = %request.bundle,
            kind = %request.kind,
            name = %request.name,
            service_account = %request.service_account,
            "Pulling bundle"
        );

        let auth = Self::auth(&reference);
        let (manifest, _digest, _config) = self
            .client
            .pull_manifest_and_config(&reference, &auth)
            .await
            .map_err(|e| FetchError::Registry(e.to_string()))?;

        let layer = manifest
            .layers
            .iter()
            .find(|layer| {
                layer.annotations.as_ref().is_some_and(|a| {
                    a.get(ANNOTATION_KIND)
                        .is_some_and(|k| k.eq_ignore_ascii_case(&request.kind))
                        && a.get(ANNOTATION_NAME) == Some(&request.name)
                })
            })
            .ok_or_else(|| FetchError::EntryNotFound {
                bundle: request.bundle.clone(),
                kind: request.kind.clone(),
                name: request.name.clone(),
            })?;

        let mut blob: Vec<u8> = Vec::new();
        self.client
            .pull_blob(&reference, layer, &mut blob)
            .await
            .map_err(|e| FetchError::Registry(e.to_string()))?;

        read_layer(&blob)
    }
}

/// Contents of the single file inside a (possibly gzipped) tar layer.
pub fn read_layer(blob: &[u8]) -> Result<Vec<u8>, FetchError> {
    let archive_err = |e: std::io::Error| FetchError::Archive(e.to_string());
    let tar_bytes = if blob.starts_with(&[0x1f, 0x8b]) {
        let mut out = Vec::new();
        GzDecoder::new(blob)
            .read_to_end(&mut out)
            .map_err(archive_err)?;
        out
    } else {
        blob.to_vec()
    };

    let mut archive = tar::Archive::new(tar_bytes.as_slice());
    let mut entries = archive.entries().map_err(archive_err)?;
    let mut entry = entries
        .next()
        .ok_or_else(|| FetchError::Archive("empty layer".to_string()))?
        .map_err(archive_err)?;
    let mut contents = Vec::new();
    entry.read_to_end(&mut contents).map_err(archive_err)?;
    Ok(contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn tar_with(name: &str, body: &[u8]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, body).unwrap();
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_read_plain_tar_layer() {
        let layer = tar_with("task", b"kind: Task\n");
        assert_eq!(read_layer(&layer).unwrap(), b"kind: Task\n");
    }

    #[test]
    fn test_read_gzipped_layer() {
        let layer = tar_with("task", b"kind: Task\n");
        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(&layer).unwrap();
        let compressed = gz.finish().unwrap();
        assert_eq!(read_layer(&compressed).unwrap(), b"kind: Task\n");
    }

    #[test]
    fn test_empty_layer_is_an_error() {
        let empty = tar::Builder::new(Vec::new()).into_inner().unwrap();
        assert!(matches!(read_layer(&empty), Err(FetchError::Archive(_))));
    }
}
