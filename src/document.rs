//! Input documents
//!
//! A file is split on `---` separators; the first non-empty document decides
//! what is validated. Its `{apiVersion, kind}` pair is read from a generic map
//! before the typed parse so that unsupported kinds are rejected cheaply.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, TekError};
use crate::model::{EmbeddedTask, Pipeline, PipelineRun, PipelineSpec, Task, TaskSpec, TypeMeta};
use crate::refs;

static DOC_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^---\s*$").unwrap());

/// Supported `apiVersion/kind` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pipeline,
    PipelineRun,
    TaskV1,
    TaskV1Beta1,
}

impl DocumentKind {
    pub fn from_type_meta(meta: &TypeMeta) -> Result<Self> {
        match (meta.api_version.as_str(), meta.kind.as_str()) {
            ("tekton.dev/v1", "Pipeline") => Ok(DocumentKind::Pipeline),
            ("tekton.dev/v1", "PipelineRun") => Ok(DocumentKind::PipelineRun),
            ("tekton.dev/v1", "Task") => Ok(DocumentKind::TaskV1),
            ("tekton.dev/v1beta1", "Task") => Ok(DocumentKind::TaskV1Beta1),
            _ => Err(TekError::Unsupported {
                api_version: meta.api_version.clone(),
                kind: meta.kind.clone(),
            }),
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Pipeline => write!(f, "tekton.dev/v1/Pipeline"),
            DocumentKind::PipelineRun => write!(f, "tekton.dev/v1/PipelineRun"),
            DocumentKind::TaskV1 => write!(f, "tekton.dev/v1/Task"),
            DocumentKind::TaskV1Beta1 => write!(f, "tekton.dev/v1beta1/Task"),
        }
    }
}

/// A parsed document of a supported kind.
#[derive(Debug, Clone)]
pub enum Document {
    Pipeline(Pipeline),
    PipelineRun(PipelineRun),
    Task(Task),
}

impl Document {
    pub fn parse(kind: DocumentKind, text: &str, path: &str) -> Result<Self> {
        let wrap = |source| TekError::Parse {
            kind: kind.to_string(),
            path: path.to_string(),
            source,
        };
        Ok(match kind {
            DocumentKind::Pipeline => Document::Pipeline(serde_yaml::from_str(text).map_err(wrap)?),
            DocumentKind::PipelineRun => {
                Document::PipelineRun(serde_yaml::from_str(text).map_err(wrap)?)
            }
            DocumentKind::TaskV1 | DocumentKind::TaskV1Beta1 => {
                Document::Task(serde_yaml::from_str(text).map_err(wrap)?)
            }
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Document::Pipeline(p) => p.metadata.display_name(),
            Document::PipelineRun(r) => r.metadata.display_name(),
            Document::Task(t) => t.metadata.display_name(),
        }
    }

    /// Copy of the document with the given task specs inlined as `taskSpec`.
    pub fn resolved_copy(&self, specs: &BTreeMap<String, TaskSpec>) -> Result<serde_yaml::Value> {
        let value = match self {
            Document::Pipeline(p) => {
                let mut p = p.clone();
                inline_task_specs(&mut p.spec, specs);
                serde_yaml::to_value(p)?
            }
            Document::PipelineRun(r) => {
                let mut r = r.clone();
                if let Some(spec) = r.spec.pipeline_spec.as_mut() {
                    inline_task_specs(spec, specs);
                }
                serde_yaml::to_value(r)?
            }
            Document::Task(t) => serde_yaml::to_value(t)?,
        };
        Ok(value)
    }
}

fn inline_task_specs(spec: &mut PipelineSpec, specs: &BTreeMap<String, TaskSpec>) {
    for task in spec.tasks.iter_mut().chain(spec.finally.iter_mut()) {
        if task.task_spec.is_some() {
            continue;
        }
        if let Some(resolved) = specs.get(&task.name) {
            task.task_ref = None;
            task.task_spec = Some(EmbeddedTask {
                task_spec: resolved.clone(),
                ..Default::default()
            });
        }
    }
}

/// Non-empty documents of a multi-document YAML stream, trimmed.
pub fn split_documents(text: &str) -> Vec<&str> {
    DOC_SEPARATOR
        .split(text)
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .collect()
}

/// Read `apiVersion`, `kind` and `metadata.name` without a typed parse.
pub fn type_meta(doc: &str) -> Option<TypeMeta> {
    serde_yaml::from_str::<TypeMeta>(doc).ok()
}

/// One input file: raw text for reference scans, substituted text for parsing.
#[derive(Debug, Clone)]
pub struct Source {
    pub path: String,
    /// As read from disk, before runtime parameter substitution.
    pub raw: String,
    /// With `--param` values substituted.
    pub text: String,
    pub meta: TypeMeta,
    pub kind: DocumentKind,
}

impl Source {
    pub fn from_text(
        path: String,
        content: &str,
        runtime_params: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let raw = split_documents(content)
            .into_iter()
            .next()
            .ok_or_else(|| TekError::EmptyDocument { path: path.clone() })?
            .to_string();
        let text = if runtime_params.is_empty() {
            raw.clone()
        } else {
            refs::substitute_params(&raw, runtime_params)
        };
        let meta: TypeMeta = serde_yaml::from_str(&text)?;
        let kind = DocumentKind::from_type_meta(&meta)?;
        Ok(Self {
            path,
            raw,
            text,
            meta,
            kind,
        })
    }

    pub fn parse(&self) -> Result<Document> {
        Document::parse(self.kind, &self.text, &self.path)
    }

    /// Raw text as a generic YAML tree, for scope-aware reference scans.
    pub fn raw_tree(&self) -> Option<serde_yaml::Value> {
        serde_yaml::from_str(&self.raw).ok()
    }
}
