//! tekcheck - static validation of Tekton Pipelines, PipelineRuns and Tasks
//!
//! Catches undefined parameters, type mismatches, dangling result references
//! and broken workspace bindings before a pipeline is submitted.

pub mod config;
pub mod document;
pub mod error;
pub mod errors;
pub mod model;
pub mod pac;
pub mod refs;
pub mod resolver;
pub mod structural;
pub mod validate;

pub use config::Settings;
pub use document::{Document, DocumentKind, Source};
pub use error::{FixSuggestion, TekError};
pub use errors::{ErrorCategory, ValidationError, ValidationReport};
pub use resolver::{Fetcher, TaskResolver};
pub use validate::{exit_code, Validator};
