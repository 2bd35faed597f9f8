//! Validation findings
//!
//! Every finding is collected into a [`ValidationReport`]; nothing here aborts
//! a run. Each variant carries the scope it was found in (a pipeline task, a
//! PipelineRun, the pipeline results) plus the names needed to locate it.

use serde::Serialize;
use thiserror::Error;

/// Finding category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Structural,
    Reference,
    Resolution,
    Parameter,
    Result,
    Workspace,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Structural => write!(f, "structural"),
            ErrorCategory::Reference => write!(f, "reference"),
            ErrorCategory::Resolution => write!(f, "resolution"),
            ErrorCategory::Parameter => write!(f, "parameter"),
            ErrorCategory::Result => write!(f, "result"),
            ErrorCategory::Workspace => write!(f, "workspace"),
        }
    }
}

fn with_details(details: &Option<String>) -> String {
    details
        .as_deref()
        .filter(|d| !d.is_empty())
        .map(|d| format!(" {}", d))
        .unwrap_or_default()
}

/// A single validation finding with context
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    // Document well-formedness
    #[error("{message}: {path}{}", with_details(.details))]
    Structural {
        message: String,
        path: String,
        details: Option<String>,
    },

    #[error("parameter reference $(params.{name}) not defined in pipeline spec")]
    UndefinedParamReference { name: String },

    // Task contract could not be obtained
    #[error("retrieving task spec from {task} pipeline task: {reason}")]
    Resolution { task: String, reason: String },

    #[error("retrieving pipeline spec for {pipeline}: {reason}")]
    PipelineResolution { pipeline: String, reason: String },

    #[error("{scope}: {param:?} parameter is not defined by the {target}")]
    UndeclaredParam {
        scope: String,
        param: String,
        target: String,
    },

    #[error("{scope}: {param:?} parameter has the incorrect type, got {got:?}, want {want:?}")]
    ParamTypeMismatch {
        scope: String,
        param: String,
        got: String,
        want: String,
    },

    #[error("{scope}: {param:?} parameter is required")]
    MissingParam { scope: String, param: String },

    #[error("{scope}: {result} result from non-existent {producer} PipelineTask")]
    MissingProducer {
        scope: String,
        producer: String,
        result: String,
    },

    #[error("{scope}: non-existent {result} result from {producer} PipelineTask")]
    MissingResult {
        scope: String,
        producer: String,
        result: String,
    },

    #[error(
        "{scope}: result type mismatch: {result} result from {producer} PipelineTask is defined as type {defined:?} but used as type {expected:?} in {location} (usage: {usage})"
    )]
    ResultTypeMismatch {
        scope: String,
        producer: String,
        result: String,
        defined: String,
        expected: String,
        location: String,
        usage: String,
    },

    #[error("{scope}: required workspace {workspace:?} is not provided")]
    MissingWorkspace { scope: String, workspace: String },

    #[error(
        "{scope}: workspace binding {binding:?} references non-existent pipeline workspace {workspace:?}"
    )]
    UnknownPipelineWorkspace {
        scope: String,
        binding: String,
        workspace: String,
    },

    #[error(
        "{scope}: workspace {workspace:?}: task declares mountPath {mount_path:?} but binding uses absolute subPath {sub_path:?} which may cause conflicts"
    )]
    WorkspacePathConflict {
        scope: String,
        workspace: String,
        mount_path: String,
        sub_path: String,
    },

    #[error("{scope}: workspace binding {binding:?} does not match any task workspace declaration")]
    UnmatchedWorkspaceBinding { scope: String, binding: String },

    #[error("pipeline workspace {workspace:?} is declared but never used")]
    UnusedWorkspace { workspace: String },

    #[error("{scope}: workspace binding {binding:?} does not match any pipeline workspace declaration")]
    UndeclaredRunWorkspace { scope: String, binding: String },
}

impl ValidationError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ValidationError::Structural { .. } => ErrorCategory::Structural,
            ValidationError::UndefinedParamReference { .. } => ErrorCategory::Reference,
            ValidationError::Resolution { .. } | ValidationError::PipelineResolution { .. } => {
                ErrorCategory::Resolution
            }
            ValidationError::UndeclaredParam { .. }
            | ValidationError::ParamTypeMismatch { .. }
            | ValidationError::MissingParam { .. } => ErrorCategory::Parameter,
            ValidationError::MissingProducer { .. }
            | ValidationError::MissingResult { .. }
            | ValidationError::ResultTypeMismatch { .. } => ErrorCategory::Result,
            ValidationError::MissingWorkspace { .. }
            | ValidationError::UnknownPipelineWorkspace { .. }
            | ValidationError::WorkspacePathConflict { .. }
            | ValidationError::UnmatchedWorkspaceBinding { .. }
            | ValidationError::UnusedWorkspace { .. }
            | ValidationError::UndeclaredRunWorkspace { .. } => ErrorCategory::Workspace,
        }
    }

    /// Get suggestion for fixing this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            ValidationError::UndefinedParamReference { name } if !name.is_empty() => Some(
                format!("Declare '{}' under spec.params or fix the reference", name),
            ),
            ValidationError::UndefinedParamReference { .. } => {
                Some("Use $(params.<name>) with a non-empty name".to_string())
            }
            ValidationError::MissingParam { param, .. } => Some(format!(
                "Pass '{}' in the task's params or give it a default",
                param
            )),
            ValidationError::MissingProducer { producer, .. } => Some(format!(
                "Check the spelling of '{}' against spec.tasks",
                producer
            )),
            ValidationError::ResultTypeMismatch { defined, .. } if defined == "array" => {
                Some("Index the array result, e.g. [0], or pass it whole to an array param".to_string())
            }
            ValidationError::ResultTypeMismatch { defined, .. } if defined == "object" => Some(
                "Access a property, e.g. .field, or pass it whole to an object param".to_string(),
            ),
            ValidationError::MissingWorkspace { workspace, .. } => Some(format!(
                "Bind '{}' in the task's workspaces or mark it optional",
                workspace
            )),
            ValidationError::UnusedWorkspace { workspace } => Some(format!(
                "Remove '{}' from spec.workspaces or bind it to a task",
                workspace
            )),
            _ => None,
        }
    }
}

/// Outcome of validating one input file
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub file_path: String,
    /// `apiVersion/kind` of the validated document, once known.
    pub kind: Option<String>,
    pub name: Option<String>,
    pub task_count: usize,
    errors: Vec<ValidationError>,
    /// Document with runtime params substituted and task specs inlined.
    pub resolved: Option<serde_yaml::Value>,
}

impl ValidationReport {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            ..Default::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = ValidationError>) {
        self.errors.extend(errors);
    }

    /// Append another report's findings, keeping this report's metadata.
    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.task_count += other.task_count;
    }

    pub fn count(&self, category: ErrorCategory) -> usize {
        self.errors
            .iter()
            .filter(|e| e.category() == category)
            .count()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let errors: Vec<serde_json::Value> = self
            .errors
            .iter()
            .map(|e| {
                serde_json::json!({
                    "category": e.category(),
                    "message": e.to_string(),
                })
            })
            .collect();
        serde_json::json!({
            "file": self.file_path,
            "kind": self.kind,
            "name": self.name,
            "valid": self.is_valid(),
            "tasks": self.task_count,
            "errors": errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_display() {
        assert_eq!(format!("{}", ErrorCategory::Workspace), "workspace");
        assert_eq!(format!("{}", ErrorCategory::Result), "result");
    }

    #[test]
    fn test_messages_quote_names() {
        let error = ValidationError::MissingWorkspace {
            scope: "build PipelineTask".to_string(),
            workspace: "cache".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "build PipelineTask: required workspace \"cache\" is not provided"
        );
        assert_eq!(error.category(), ErrorCategory::Workspace);

        let error = ValidationError::ParamTypeMismatch {
            scope: "build PipelineTask".to_string(),
            param: "flags".to_string(),
            got: "string".to_string(),
            want: "array".to_string(),
        };
        assert!(error
            .to_string()
            .contains("\"flags\" parameter has the incorrect type, got \"string\", want \"array\""));
    }

    #[test]
    fn test_structural_details_are_optional() {
        let error = ValidationError::Structural {
            message: "missing field(s)".to_string(),
            path: "metadata.name".to_string(),
            details: None,
        };
        assert_eq!(error.to_string(), "missing field(s): metadata.name");

        let error = ValidationError::Structural {
            message: "invalid value: Invalid".to_string(),
            path: "spec.params.x.type".to_string(),
            details: Some("type must be one of string, array, object".to_string()),
        };
        assert!(error.to_string().ends_with("spec.params.x.type type must be one of string, array, object"));
    }

    #[test]
    fn test_report_accumulates() {
        let mut report = ValidationReport::new("pipeline.yaml");
        assert!(report.is_valid());

        report.push(ValidationError::UnusedWorkspace {
            workspace: "cache".to_string(),
        });
        let mut other = ValidationReport::new("pipeline.yaml");
        other.push(ValidationError::MissingParam {
            scope: "clone PipelineTask".to_string(),
            param: "url".to_string(),
        });
        report.merge(other);

        assert!(!report.is_valid());
        assert_eq!(report.len(), 2);
        assert_eq!(report.count(ErrorCategory::Parameter), 1);
        assert_eq!(report.count(ErrorCategory::Workspace), 1);
    }

    #[test]
    fn test_report_json() {
        let mut report = ValidationReport::new("p.yaml");
        report.kind = Some("tekton.dev/v1/Pipeline".to_string());
        report.push(ValidationError::UndefinedParamReference {
            name: "missing".to_string(),
        });

        let json = report.to_json();
        assert_eq!(json["valid"], false);
        assert_eq!(json["errors"][0]["category"], "reference");
        assert_eq!(
            json["errors"][0]["message"],
            "parameter reference $(params.missing) not defined in pipeline spec"
        );
    }

    #[test]
    fn test_suggestions() {
        let error = ValidationError::UnusedWorkspace {
            workspace: "cache".to_string(),
        };
        assert!(error.suggestion().unwrap().contains("cache"));

        let error = ValidationError::UnmatchedWorkspaceBinding {
            scope: "t".to_string(),
            binding: "x".to_string(),
        };
        assert!(error.suggestion().is_none());
    }
}
