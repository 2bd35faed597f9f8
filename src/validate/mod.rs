//! Validator entry point
//!
//! Loads one input file, applies PAC templating and runtime parameters,
//! dispatches on the document kind and fills a [`ValidationReport`]. Each
//! file gets its own [`TaskResolver`], so no resolution cache is shared
//! between files.

pub mod params;
pub mod pipeline;
pub mod results;
pub mod run;
pub mod task;
pub mod workspaces;

use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Settings;
use crate::document::{Document, DocumentKind, Source};
use crate::error::{Result, TekError};
use crate::errors::ValidationReport;
use crate::pac::PacContext;
use crate::resolver::{DefaultFetcher, Fetcher, TaskResolver};

pub use pipeline::{PipelineOutcome, PipelineValidator};

/// Validates files of any supported kind.
pub struct Validator {
    fetcher: Arc<dyn Fetcher>,
    task_dirs: Vec<PathBuf>,
    default_revision: String,
    service_account: String,
    concurrency: usize,
    batch_concurrency: usize,
    runtime_params: BTreeMap<String, String>,
    pac_params: BTreeMap<String, String>,
    print_resolved: bool,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(Arc::new(DefaultFetcher::default()))
    }
}

impl Validator {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            task_dirs: Vec::new(),
            default_revision: "main".to_string(),
            service_account: "none".to_string(),
            concurrency: 4,
            batch_concurrency: 4,
            runtime_params: BTreeMap::new(),
            pac_params: BTreeMap::new(),
            print_resolved: false,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let fetcher = Arc::new(DefaultFetcher::new(settings.git.binary.clone()));
        Self::new(fetcher)
            .with_task_dirs(settings.task_dir.iter().cloned().collect())
            .with_default_revision(settings.git.default_revision.clone())
            .with_service_account(settings.bundle.service_account.clone())
            .with_concurrency(settings.resolution.concurrency)
            .with_batch_concurrency(settings.batch.concurrency)
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

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch_concurrency = concurrency.max(1);
        self
    }

    /// Values substituted for `$(params.<key>)` before parsing.
    pub fn with_runtime_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.runtime_params = params;
        self
    }

    /// Values substituted for `{{ key }}` placeholders.
    pub fn with_pac_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.pac_params = params;
        self
    }

    /// Attach the resolved, substituted document to each report.
    pub fn with_print_resolved(mut self, enabled: bool) -> Self {
        self.print_resolved = enabled;
        self
    }

    /// Validate a file from disk, with git-derived PAC defaults.
    pub async fn validate_file(&self, path: &Path) -> Result<ValidationReport> {
        let display = path.display().to_string();
        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| TekError::ReadFile {
                    path: display.clone(),
                    source,
                })?;
        let pac = PacContext::discover(path, &self.pac_params);
        self.validate_source(display, &content, &pac).await
    }

    /// Validate in-memory text. Only explicit PAC params apply.
    pub async fn validate_text(&self, path: &str, content: &str) -> Result<ValidationReport> {
        let pac = PacContext::new(self.pac_params.clone());
        self.validate_source(path.to_string(), content, &pac).await
    }

    /// Validate many files concurrently; results keep the input order.
    pub async fn validate_files(
        &self,
        paths: &[PathBuf],
    ) -> Vec<(PathBuf, Result<ValidationReport>)> {
        stream::iter(paths)
            .map(|path| async move { (path.clone(), self.validate_file(path).await) })
            .buffered(self.batch_concurrency)
            .collect()
            .await
    }

    async fn validate_source(
        &self,
        path: String,
        content: &str,
        pac: &PacContext,
    ) -> Result<ValidationReport> {
        let templated = pac.template(content);
        let mut source = Source::from_text(path.clone(), &templated, &self.runtime_params)?;
        if source.kind == DocumentKind::PipelineRun {
            let selected = pac.select_run(&templated, source.meta.name())?;
            source = Source::from_text(path, &selected, &self.runtime_params)?;
        }
        info!(file = %source.path, kind = %source.kind, "Validating");

        let mut document = source.parse()?;
        if let Document::PipelineRun(run) = &mut document {
            pac.apply_to_run(run);
        }

        let mut report = ValidationReport::new(source.path.as_str());
        report.kind = Some(source.kind.to_string());
        report.name = Some(document.name().to_string());

        let resolver = self.resolver_for(pac);
        let validator = PipelineValidator::new(&resolver, &self.runtime_params)
            .with_concurrency(self.concurrency);
        let raw = source.raw_tree();

        let outcome = match &document {
            Document::Pipeline(pipeline) => validator.validate(pipeline, raw.as_ref()).await,
            Document::PipelineRun(run) => run::validate_run(run, raw.as_ref(), &validator).await,
            Document::Task(t) => PipelineOutcome {
                errors: task::validate_task(t),
                ..Default::default()
            },
        };
        debug!(cached = resolver.cached(), "Remote contracts fetched");

        report.task_count = outcome.task_count;
        report.extend(outcome.errors);
        if self.print_resolved {
            report.resolved = Some(document.resolved_copy(&outcome.resolved)?);
        }
        Ok(report)
    }

    /// A fresh resolver searching the configured directories plus `.tekton/`.
    fn resolver_for(&self, pac: &PacContext) -> TaskResolver {
        let mut dirs = self.task_dirs.clone();
        if let Some(dir) = pac.tekton_dir() {
            if !dirs.iter().any(|d| d == dir) {
                dirs.push(dir.to_path_buf());
            }
        }
        TaskResolver::new(Arc::clone(&self.fetcher))
            .with_task_dirs(dirs)
            .with_default_revision(self.default_revision.clone())
            .with_service_account(self.service_account.clone())
    }
}

/// 0 when valid, 1 with findings or a fatal error, 2 for an unsupported kind.
pub fn exit_code(result: &Result<ValidationReport>) -> i32 {
    match result {
        Ok(report) if report.is_valid() => 0,
        Ok(_) => 1,
        Err(e) => e.exit_code(),
    }
}
