//! Document well-formedness
//!
//! Each document kind implements [`Validate`] and returns every complaint as
//! a [`FieldError`]. A complaint may name several field paths; the report
//! gets one entry per path.

mod pipeline;
mod run;
mod task;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::ValidationError;
use crate::model::ParamType;

pub use pipeline::validate_pipeline_spec;
pub use task::validate_task_spec;

/// DNS-1123 label: lowercase alphanumerics and '-', at most 63 chars.
static DNS_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap());

/// Result and property names.
static KEY_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$").unwrap());

pub(crate) fn is_dns_label(name: &str) -> bool {
    name.len() <= 63 && DNS_LABEL.is_match(name)
}

pub(crate) fn is_key_name(name: &str) -> bool {
    KEY_NAME.is_match(name)
}

/// A well-formedness complaint about one or more fields.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub message: String,
    pub paths: Vec<String>,
    pub details: Option<String>,
}

impl FieldError {
    pub fn new(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            paths: vec![path.into()],
            details: None,
        }
    }

    pub fn missing(path: impl Into<String>) -> Self {
        Self::new("missing field(s)", path)
    }

    pub fn invalid_value(value: &str, path: impl Into<String>) -> Self {
        Self::new(format!("invalid value: {}", value), path)
    }

    pub fn both(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self {
            message: "expected exactly one, got both".to_string(),
            paths: vec![a.into(), b.into()],
            details: None,
        }
    }

    pub fn neither(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self {
            message: "expected exactly one, got neither".to_string(),
            paths: vec![a.into(), b.into()],
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn also_at(mut self, path: impl Into<String>) -> Self {
        self.paths.push(path.into());
        self
    }
}

/// Well-formedness contract of a document.
pub trait Validate {
    fn validate(&self) -> Vec<FieldError>;
}

/// Translate complaints into report entries, one per path.
pub fn to_validation_errors(errors: Vec<FieldError>) -> Vec<ValidationError> {
    let mut out = Vec::new();
    for e in errors {
        let message = e.message.trim_end_matches(": ").to_string();
        if e.paths.is_empty() {
            out.push(ValidationError::Structural {
                message,
                path: String::new(),
                details: e.details,
            });
            continue;
        }
        for path in e.paths {
            out.push(ValidationError::Structural {
                message: message.clone(),
                path,
                details: e.details.clone(),
            });
        }
    }
    out
}

/// Declared type must be one of the three Tekton types.
pub(crate) fn check_type(declared: Option<&ParamType>, path: String) -> Option<FieldError> {
    match declared {
        Some(t) if !t.is_known() => Some(
            FieldError::invalid_value(t.as_str(), path)
                .with_details("type must be one of string, array, object"),
        ),
        _ => None,
    }
}
