//! PipelineRun validation
//!
//! The run's pipeline, embedded or found in the task directories, goes
//! through the full pipeline orchestrator. The run's own params and
//! workspace bindings are then checked against that pipeline's contract.

use serde_yaml::Value;
use tracing::{debug, warn};

use super::params::{direct, validate_params};
use super::pipeline::{PipelineOutcome, PipelineValidator};
use crate::errors::ValidationError;
use crate::model::{ObjectMeta, Pipeline, PipelineRun, PipelineSpec};
use crate::structural::{to_validation_errors, Validate};

/// Name given to a pipeline embedded in a run.
const EMBEDDED_PIPELINE: &str = "noname";

pub async fn validate_run(
    run: &PipelineRun,
    raw: Option<&Value>,
    validator: &PipelineValidator<'_>,
) -> PipelineOutcome {
    let scope = format!("PipelineRun {}", run.metadata.display_name());
    let mut errors = to_validation_errors(run.validate());

    let pipeline = match run_pipeline(run, validator) {
        Ok(Some(pipeline)) => pipeline,
        Ok(None) => {
            return PipelineOutcome {
                errors,
                ..Default::default()
            }
        }
        Err(finding) => {
            errors.push(finding);
            return PipelineOutcome {
                errors,
                ..Default::default()
            };
        }
    };

    // A referenced pipeline lives in another file, so the run's raw text
    // says nothing about its parameter references.
    let referenced_tree = match &pipeline {
        RunPipeline::Embedded(_) => None,
        RunPipeline::Referenced(p) => serde_yaml::to_value(p).ok(),
    };
    let tree = referenced_tree.as_ref().or(raw);
    let pipeline = pipeline.into_inner();

    let mut outcome = validator.validate(&pipeline, tree).await;
    errors.extend(run_bindings(&scope, run, &pipeline.spec));
    outcome.errors.splice(0..0, errors);
    outcome
}

enum RunPipeline {
    Embedded(Pipeline),
    Referenced(Pipeline),
}

impl RunPipeline {
    fn into_inner(self) -> Pipeline {
        match self {
            RunPipeline::Embedded(p) | RunPipeline::Referenced(p) => p,
        }
    }
}

/// The pipeline a run executes, if it can be found locally.
fn run_pipeline(
    run: &PipelineRun,
    validator: &PipelineValidator<'_>,
) -> Result<Option<RunPipeline>, ValidationError> {
    if let Some(spec) = &run.spec.pipeline_spec {
        return Ok(Some(RunPipeline::Embedded(Pipeline {
            api_version: "tekton.dev/v1".to_string(),
            kind: "Pipeline".to_string(),
            metadata: ObjectMeta::named(EMBEDDED_PIPELINE),
            spec: spec.clone(),
        })));
    }
    let Some(pipeline_ref) = &run.spec.pipeline_ref else {
        return Ok(None);
    };
    let name = pipeline_ref.name.as_deref().unwrap_or_default();
    if pipeline_ref.resolver.as_deref().is_some_and(|r| !r.is_empty()) {
        warn!(
            resolver = ?pipeline_ref.resolver,
            "Remote pipelineRef is not resolved, skipping pipeline checks"
        );
        return Ok(None);
    }
    if name.is_empty() || validator.resolver().task_dirs().is_empty() {
        debug!(pipeline = %name, "No task directory, skipping pipeline checks");
        return Ok(None);
    }
    let finding = |reason: String| ValidationError::PipelineResolution {
        pipeline: name.to_string(),
        reason,
    };
    match validator.resolver().find_pipeline(name) {
        Ok(Some(pipeline)) => Ok(Some(RunPipeline::Referenced(pipeline))),
        Ok(None) => Err(finding("not found in task directories".to_string())),
        Err(e) => Err(finding(e.to_string())),
    }
}

/// Run params and workspace bindings against the pipeline contract.
fn run_bindings(scope: &str, run: &PipelineRun, pipeline: &PipelineSpec) -> Vec<ValidationError> {
    let mut errors = validate_params(scope, "Pipeline", &direct(&run.spec.params), &pipeline.params);

    for decl in pipeline.workspaces.iter().filter(|w| !w.optional) {
        if !run.spec.workspaces.iter().any(|b| b.name == decl.name) {
            errors.push(ValidationError::MissingWorkspace {
                scope: scope.to_string(),
                workspace: decl.name.clone(),
            });
        }
    }
    for binding in &run.spec.workspaces {
        if !pipeline.workspaces.iter().any(|w| w.name == binding.name) {
            errors.push(ValidationError::UndeclaredRunWorkspace {
                scope: scope.to_string(),
                binding: binding.name.clone(),
            });
        }
    }
    errors
}
