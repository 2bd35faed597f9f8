//! Process-fatal errors with fix suggestions
//!
//! Anything that is a finding about the document goes into
//! [`crate::errors::ValidationReport`] instead.

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

#[derive(Error, Debug)]
pub enum TekError {
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse {kind} from {path}: {source}")]
    Parse {
        kind: String,
        path: String,
        source: serde_yaml::Error,
    },

    #[error("{path} contains no document")]
    EmptyDocument { path: String },

    #[error("{api_version}/{kind} is not supported")]
    Unsupported { api_version: String, kind: String },

    #[error("invalid parameter format {0:?}, expected key=value")]
    InvalidParamFormat(String),

    #[error("empty parameter key in {0:?}")]
    EmptyParamKey(String),

    #[error("config error: {reason}")]
    Config { reason: String },

    #[error("could not find any PipelineRun")]
    NoPipelineRun,

    #[error("unable to find {0:?} pipelinerun after pac resolution")]
    PipelineRunNotFound(String),
}

impl TekError {
    /// 2 for an unsupported document kind, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            TekError::Unsupported { .. } => 2,
            _ => 1,
        }
    }
}

impl FixSuggestion for TekError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            TekError::YamlParse(_) | TekError::Parse { .. } => {
                Some("Check YAML syntax: indentation and quoting")
            }
            TekError::ReadFile { .. } => Some("Check file path and permissions"),
            TekError::EmptyDocument { .. } => {
                Some("Add a Pipeline, PipelineRun or Task document to the file")
            }
            TekError::Unsupported { .. } => Some(
                "Supported kinds: tekton.dev/v1 Pipeline, PipelineRun, Task and tekton.dev/v1beta1 Task",
            ),
            TekError::InvalidParamFormat(_) | TekError::EmptyParamKey(_) => {
                Some("Use --param key=value")
            }
            TekError::Config { .. } => Some("Fix or remove ~/.config/tekcheck/config.toml"),
            TekError::NoPipelineRun => Some("Check the file contains a kind: PipelineRun document"),
            TekError::PipelineRunNotFound(_) => {
                Some("Check metadata.name of the PipelineRun and the --pac-param values")
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, TekError>;
