//! Task contract resolution
//!
//! A pipeline task's contract comes from one of four places, tried in order:
//!
//! 1. its embedded `taskSpec`
//! 2. the `bundles` resolver (OCI image)
//! 3. the `git` resolver (repository + path + revision)
//! 4. the local task directories, searched by `taskRef.name`
//!
//! Remote contracts are cached per [`TaskResolver`], which lives for one
//! document. Nothing is shared between files.

pub mod bundle;
pub mod fetch;
pub mod git;
pub mod local;

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::document::split_documents;
use crate::model::{Pipeline, PipelineTask, ParamSpec, Task, TaskSpec};
use crate::refs;
pub use fetch::{BundleRequest, DefaultFetcher, FetchError, Fetcher, GitRequest};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("custom Tasks are not supported")]
    CustomTask,

    #[error("unable to retrieve spec for pipeline task")]
    Unresolvable,

    #[error("unable to retrieve spec for pipeline task: resolver {0:?} is not supported")]
    UnsupportedResolver(String),

    #[error("git resolver parameter validation failed: {}", .0.join("; "))]
    GitParams(Vec<String>),

    #[error("unresolved parameter reference in {resolver} resolver parameter {name:?}: {value}")]
    Unresolved {
        resolver: &'static str,
        name: String,
        value: String,
    },

    #[error("failed to resolve task from git repository (url: {url}, revision: {revision}): {source}")]
    Git {
        url: String,
        revision: String,
        #[source]
        source: FetchError,
    },

    #[error("invalid git revision {0:?}: must not start with '-'")]
    InvalidRevision(String),

    #[error("bundle resolver requires parameter {0:?}")]
    BundleParam(String),

    #[error("failed to resolve task from bundle {bundle}: {source}")]
    Bundle {
        bundle: String,
        #[source]
        source: FetchError,
    },

    #[error("failed to unmarshal task from {origin}: {reason}")]
    Parse { origin: String, reason: String },
}

/// Values available for `$(params.x)` placeholders in resolver params.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub pipeline_params: &'a [ParamSpec],
    pub runtime_params: &'a BTreeMap<String, String>,
}

impl<'a> ResolveContext<'a> {
    pub fn new(
        pipeline_params: &'a [ParamSpec],
        runtime_params: &'a BTreeMap<String, String>,
    ) -> Self {
        Self {
            pipeline_params,
            runtime_params,
        }
    }

    /// Runtime values first, then string defaults of the pipeline params.
    pub fn substitute(&self, value: &str) -> String {
        refs::substitute_with(value, |name| {
            if let Some(v) = self.runtime_params.get(name) {
                return Some(v.clone());
            }
            self.pipeline_params
                .iter()
                .find(|p| p.name == name)
                .and_then(|p| p.default.as_ref())
                .map(|d| d.as_str().unwrap_or_default().to_string())
        })
    }
}

/// Resolves pipeline tasks to their contracts for one document.
pub struct TaskResolver {
    task_dirs: Vec<PathBuf>,
    fetcher: Arc<dyn Fetcher>,
    cache: DashMap<String, Arc<TaskSpec>>,
    default_revision: String,
    service_account: String,
}

impl Default for TaskResolver {
    fn default() -> Self {
        Self::new(Arc::new(DefaultFetcher::default()))
    }
}

impl TaskResolver {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            task_dirs: Vec::new(),
            fetcher,
            cache: DashMap::new(),
            default_revision: "main".to_string(),
            service_account: "none".to_string(),
        }
    }

    pub fn with_task_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.task_dirs = dirs;
        self
    }

    pub fn with_default_revision(mut self, revision: impl Into<String>) -> Self {
        self.default_revision = revision.into();
        self
    }

    pub fn with_service_account(mut self, service_account: impl Into<String>) -> Self {
        self.service_account = service_account.into();
        self
    }

    pub fn task_dirs(&self) -> &[PathBuf] {
        &self.task_dirs
    }

    /// Number of remote contracts fetched so far.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    #[instrument(skip_all, fields(task = %task.name))]
    pub async fn resolve(
        &self,
        task: &PipelineTask,
        ctx: &ResolveContext<'_>,
    ) -> Result<Arc<TaskSpec>, ResolveError> {
        if let Some(embedded) = &task.task_spec {
            if embedded.is_custom_task() {
                return Err(ResolveError::CustomTask);
            }
            debug!("Using embedded taskSpec");
            return Ok(Arc::new(embedded.task_spec.clone()));
        }

        let Some(task_ref) = &task.task_ref else {
            return Err(ResolveError::Unresolvable);
        };
        let is_set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        if is_set(&task_ref.api_version) && is_set(&task_ref.kind) {
            return Err(ResolveError::CustomTask);
        }

        match task_ref.resolver.as_deref().filter(|r| !r.is_empty()) {
            Some("bundles") => {
                let request = bundle::request(&task_ref.params, ctx, &self.service_account)?;
                let key = format!("bundle:{}:{}/{}", request.bundle, request.kind, request.name);
                self.cached_or(key, async {
                    let bytes = self.fetcher.fetch_bundle(&request).await.map_err(|source| {
                        ResolveError::Bundle {
                            bundle: request.bundle.clone(),
                            source,
                        }
                    })?;
                    parse_task(&bytes, "bundle")
                })
                .await
            }
            Some("git") => {
                let request = git::request(&task_ref.params, ctx, &self.default_revision)?;
                let key = format!(
                    "git:{}@{}:{}",
                    request.url, request.revision, request.path_in_repo
                );
                self.cached_or(key, async {
                    let bytes = self.fetcher.fetch_git(&request).await.map_err(|source| {
                        ResolveError::Git {
                            url: request.url.clone(),
                            revision: request.revision.clone(),
                            source,
                        }
                    })?;
                    parse_task(&bytes, "git repository")
                })
                .await
            }
            Some(other) => Err(ResolveError::UnsupportedResolver(other.to_string())),
            None => {
                let name = task_ref.name.as_deref().unwrap_or_default();
                if name.is_empty() || self.task_dirs.is_empty() {
                    return Err(ResolveError::Unresolvable);
                }
                match local::find_document(&self.task_dirs, "Task", name) {
                    Some(doc) => Ok(Arc::new(parse_task(doc.as_bytes(), "task directory")?)),
                    None => Err(ResolveError::Unresolvable),
                }
            }
        }
    }

    async fn cached_or<F>(&self, key: String, fetch: F) -> Result<Arc<TaskSpec>, ResolveError>
    where
        F: std::future::Future<Output = Result<TaskSpec, ResolveError>>,
    {
        if let Some(hit) = self.cache.get(&key) {
            debug!(%key, "Resolution cache hit");
            return Ok(Arc::clone(hit.value()));
        }
        let spec = Arc::new(fetch.await?);
        self.cache.insert(key, Arc::clone(&spec));
        Ok(spec)
    }

    /// A `tekton.dev/v1` Pipeline from the task directories, by name.
    pub fn find_pipeline(&self, name: &str) -> Result<Option<Pipeline>, ResolveError> {
        let Some(doc) = local::find_document(&self.task_dirs, "Pipeline", name) else {
            return Ok(None);
        };
        serde_yaml::from_str(&doc)
            .map(Some)
            .map_err(|e| ResolveError::Parse {
                origin: "task directory".to_string(),
                reason: e.to_string(),
            })
    }
}

fn parse_task(bytes: &[u8], origin: &str) -> Result<TaskSpec, ResolveError> {
    let text = String::from_utf8_lossy(bytes);
    let doc = split_documents(&text).into_iter().next().unwrap_or_default();
    serde_yaml::from_str::<Task>(doc)
        .map(|task| task.spec)
        .map_err(|e| ResolveError::Parse {
            origin: origin.to_string(),
            reason: e.to_string(),
        })
}
