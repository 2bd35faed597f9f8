//! Pipeline orchestrator
//!
//! Runs every stage over one pipeline and collects all findings:
//!
//! 1. parameter references in the raw document
//! 2. structural rules
//! 3. per-task resolution, then parameter checks
//! 4. result references
//! 5. workspaces
//! 6. pipeline results
//!
//! No stage is skipped because an earlier one failed. A task whose contract
//! cannot be resolved is left out of every contract check; its siblings are
//! not affected.

use futures::stream::{self, StreamExt};
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

use super::params::{accepted_type, assignments, validate_params, Assignment};
use super::results::{self, dedup, uses_in_text, uses_in_value, Producers, ResultUse};
use super::workspaces::validate_workspaces;
use crate::errors::ValidationError;
use crate::model::{ParamSpec, ParamType, Pipeline, PipelineSpec, PipelineTask, TaskSpec};
use crate::refs;
use crate::resolver::{ResolveContext, TaskResolver};
use crate::structural::{to_validation_errors, Validate};

/// One pipeline task with its resolved contract, if any.
#[derive(Debug, Clone)]
pub struct TaskNode<'a> {
    pub task: &'a PipelineTask,
    pub is_finally: bool,
    pub spec: Option<Arc<TaskSpec>>,
}

impl<'a> TaskNode<'a> {
    pub fn name(&self) -> &'a str {
        self.task.name.as_str()
    }

    pub fn assignments(&self) -> Vec<Assignment<'a>> {
        assignments(self.task)
    }
}

/// Findings for one pipeline plus the contracts that were resolved.
#[derive(Debug, Default)]
pub struct PipelineOutcome {
    pub errors: Vec<ValidationError>,
    pub resolved: BTreeMap<String, TaskSpec>,
    pub task_count: usize,
}

pub struct PipelineValidator<'a> {
    resolver: &'a TaskResolver,
    runtime_params: &'a BTreeMap<String, String>,
    concurrency: usize,
}

impl<'a> PipelineValidator<'a> {
    pub fn new(resolver: &'a TaskResolver, runtime_params: &'a BTreeMap<String, String>) -> Self {
        Self {
            resolver,
            runtime_params,
            concurrency: 4,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn resolver(&self) -> &'a TaskResolver {
        self.resolver
    }

    /// Validate `pipeline`. `raw` is the un-substituted document tree used
    /// for the parameter reference scan.
    pub async fn validate(&self, pipeline: &Pipeline, raw: Option<&Value>) -> PipelineOutcome {
        let spec = &pipeline.spec;
        info!(
            pipeline = %pipeline.metadata.display_name(),
            tasks = spec.task_count(),
            "Validating pipeline"
        );
        let mut errors = Vec::new();

        match raw {
            Some(tree) => errors.extend(undefined_param_refs(tree, &spec.params)),
            None => debug!("No raw document, skipping parameter reference scan"),
        }

        debug!("Stage: structural");
        errors.extend(to_validation_errors(pipeline.validate()));

        debug!("Stage: resolution and parameters");
        let nodes = self.resolve_nodes(spec, &mut errors).await;
        for node in &nodes {
            let Some(task_spec) = &node.spec else {
                continue;
            };
            errors.extend(validate_params(
                &format!("{} PipelineTask", node.name()),
                "Task",
                &node.assignments(),
                &task_spec.params,
            ));
        }

        debug!("Stage: results");
        let producers: Producers = nodes
            .iter()
            .map(|n| (n.name(), n.spec.as_deref().map(|s| s.results.as_slice())))
            .collect();
        for node in &nodes {
            let uses = dedup(task_result_uses(node));
            errors.extend(results::validate_references(
                &format!("{} PipelineTask results", node.name()),
                &uses,
                &producers,
            ));
        }

        debug!("Stage: workspaces");
        errors.extend(validate_workspaces(
            spec,
            nodes
                .iter()
                .filter_map(|n| n.spec.as_deref().map(|s| (n.task, s))),
        ));

        debug!("Stage: pipeline results");
        let mut pipeline_uses = Vec::new();
        for result in &spec.results {
            let Some(value) = &result.value else {
                continue;
            };
            pipeline_uses.extend(uses_in_value(
                value,
                Some(&ParamType::String),
                &format!("Pipeline result {}", result.name),
            ));
        }
        errors.extend(results::validate_references(
            "pipeline results",
            &dedup(pipeline_uses),
            &producers,
        ));

        let resolved = nodes
            .iter()
            .filter_map(|n| n.spec.as_deref().map(|s| (n.name().to_string(), s.clone())))
            .collect();
        debug!(errors = errors.len(), "Pipeline validation finished");
        PipelineOutcome {
            errors,
            resolved,
            task_count: spec.task_count(),
        }
    }

    /// Resolve every task (ordinary, then finally) with bounded fan-out,
    /// recording failures and keeping declaration order.
    async fn resolve_nodes<'s>(
        &self,
        spec: &'s PipelineSpec,
        errors: &mut Vec<ValidationError>,
    ) -> Vec<TaskNode<'s>> {
        let ctx = ResolveContext::new(&spec.params, self.runtime_params);
        let ctx = &ctx;
        let resolver = self.resolver;
        let outcomes: Vec<_> = stream::iter(spec.all_tasks())
            .map(|(task, is_finally)| async move {
                let outcome = resolver.resolve(task, ctx).await;
                (task, is_finally, outcome)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        outcomes
            .into_iter()
            .map(|(task, is_finally, outcome)| {
                let spec = match outcome {
                    Ok(spec) => Some(spec),
                    Err(e) => {
                        debug!(task = %task.name, error = %e, "Resolution failed");
                        errors.push(ValidationError::Resolution {
                            task: task.name.clone(),
                            reason: e.to_string(),
                        });
                        None
                    }
                };
                TaskNode {
                    task,
                    is_finally,
                    spec,
                }
            })
            .collect()
    }
}

/// Result references a task consumes, with usage for its direct params.
fn task_result_uses(node: &TaskNode<'_>) -> Vec<ResultUse> {
    let declared: &[ParamSpec] = node.spec.as_deref().map(|s| s.params.as_slice()).unwrap_or(&[]);
    let mut uses = Vec::new();
    for assignment in node.assignments() {
        let param = assignment.param();
        let location = match assignment {
            Assignment::Direct(_) => {
                format!("PipelineTask {} parameter {}", node.name(), param.name)
            }
            Assignment::MatrixSupplied(_) => {
                format!("PipelineTask {} matrix parameter {}", node.name(), param.name)
            }
        };
        let accepted = accepted_type(&assignment, declared);
        uses.extend(uses_in_value(&param.value, accepted.as_ref(), &location));
    }
    // Matrix include entries may repeat names; scan them for existence only.
    if let Some(matrix) = &node.task.matrix {
        for include in &matrix.include {
            for param in &include.params {
                uses.extend(param.value.strings().into_iter().flat_map(uses_in_text));
            }
        }
    }
    for when in &node.task.when {
        let texts = when
            .input
            .iter()
            .chain(when.values.iter())
            .chain(when.cel.iter());
        uses.extend(texts.flat_map(|t| uses_in_text(t)));
    }
    if let Some(display) = &node.task.display_name {
        uses.extend(uses_in_text(display));
    }
    uses
}

/// `$(params.x)` references that name no parameter in scope.
///
/// The scope starts as the pipeline's params. Inside a `taskSpec` mapping it
/// also holds that embedded task's own params. Names are reported once, in
/// the order first seen.
pub fn undefined_param_refs(tree: &Value, pipeline_params: &[ParamSpec]) -> Vec<ValidationError> {
    let scope: BTreeSet<String> = pipeline_params.iter().map(|p| p.name.clone()).collect();
    let mut undefined: Vec<String> = Vec::new();
    scan(tree, &scope, &mut undefined);
    undefined
        .into_iter()
        .map(|name| ValidationError::UndefinedParamReference { name })
        .collect()
}

fn scan(value: &Value, scope: &BTreeSet<String>, undefined: &mut Vec<String>) {
    match value {
        Value::String(text) => {
            for reference in refs::param_refs(text) {
                let known = !reference.name.is_empty() && scope.contains(&reference.name);
                if !known && !undefined.contains(&reference.name) {
                    undefined.push(reference.name);
                }
            }
        }
        Value::Sequence(items) => {
            for item in items {
                scan(item, scope, undefined);
            }
        }
        Value::Mapping(map) => {
            for (key, child) in map {
                if key.as_str() == Some("taskSpec") {
                    let inner = embedded_scope(child, scope);
                    scan(child, &inner, undefined);
                } else {
                    scan(child, scope, undefined);
                }
            }
        }
        Value::Tagged(tagged) => scan(&tagged.value, scope, undefined),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

fn embedded_scope(task_spec: &Value, outer: &BTreeSet<String>) -> BTreeSet<String> {
    let mut scope = outer.clone();
    if let Some(Value::Sequence(params)) = task_spec.get("params") {
        scope.extend(
            params
                .iter()
                .filter_map(|p| p.get("name").and_then(Value::as_str))
                .map(str::to_string),
        );
    }
    scope
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::fetch::{BundleRequest, FetchError, Fetcher, GitRequest};
    use async_trait::async_trait;

    struct NoNetwork;

    #[async_trait]
    impl Fetcher for NoNetwork {
        async fn fetch_git(&self, _request: &GitRequest) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::Registry("offline".to_string()))
        }

        async fn fetch_bundle(&self, _request: &BundleRequest) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::Registry("offline".to_string()))
        }
    }

    async fn validate(yaml: &str) -> Vec<String> {
        let pipeline: Pipeline = serde_yaml::from_str(yaml).unwrap();
        let raw: Value = serde_yaml::from_str(yaml).unwrap();
        let resolver = TaskResolver::new(Arc::new(NoNetwork));
        let runtime = BTreeMap::new();
        PipelineValidator::new(&resolver, &runtime)
            .validate(&pipeline, Some(&raw))
            .await
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_matrix_params_satisfy_embedded_task() {
        let errors = validate(
            r#"
apiVersion: tekton.dev/v1
kind: Pipeline
metadata:
  name: matrix-pipeline
spec:
  tasks:
    - name: run
      taskSpec:
        params:
          - name: img
            type: string
          - name: tags
            type: array
        steps:
          - name: s
            image: "$(params.img)"
            script: |
              echo processing
      matrix:
        params:
          - name: img
            value:
              - alpine:3.18
              - alpine:3.19
          - name: tags
            value:
              - latest
              - edge
"#,
        )
        .await;
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[tokio::test]
    async fn test_resolution_failure_does_not_stop_siblings() {
        let errors = validate(
            r#"
apiVersion: tekton.dev/v1
kind: Pipeline
metadata:
  name: mixed
spec:
  tasks:
    - name: remote
      taskRef:
        resolver: git
        params:
          - name: url
            value: https://github.com/org/catalog.git
          - name: pathInRepo
            value: task.yaml
    - name: local
      params:
        - name: extra
          value: x
      taskSpec:
        steps:
          - image: alpine
"#,
        )
        .await;
        assert_eq!(errors.len(), 2, "{:?}", errors);
        assert!(errors[0].starts_with("retrieving task spec from remote pipeline task: failed to resolve task from git repository"));
        assert_eq!(
            errors[1],
            "local PipelineTask: \"extra\" parameter is not defined by the Task"
        );
    }

    #[tokio::test]
    async fn test_references_to_unresolved_tasks_are_not_dangling() {
        let errors = validate(
            r#"
apiVersion: tekton.dev/v1
kind: Pipeline
metadata:
  name: p
spec:
  tasks:
    - name: remote
      taskRef:
        name: somewhere
    - name: use
      params:
        - name: v
          value: $(tasks.remote.results.out)
      taskSpec:
        params:
          - name: v
        steps:
          - image: alpine
"#,
        )
        .await;
        assert_eq!(
            errors,
            vec!["retrieving task spec from remote pipeline task: unable to retrieve spec for pipeline task".to_string()]
        );
    }

    #[tokio::test]
    async fn test_pipeline_result_must_be_string_usage() {
        let errors = validate(
            r#"
apiVersion: tekton.dev/v1
kind: Pipeline
metadata:
  name: p
spec:
  tasks:
    - name: scan
      taskSpec:
        results:
          - name: files
            type: array
          - name: meta
            type: object
        steps:
          - image: alpine
  results:
    - name: all
      value: $(tasks.scan.results.files)
    - name: first
      value: $(tasks.scan.results.files[0])
    - name: owner
      value: $(tasks.scan.results.meta.owner)
"#,
        )
        .await;
        assert_eq!(errors.len(), 1, "{:?}", errors);
        assert!(errors[0].starts_with("pipeline results: result type mismatch: files result from scan PipelineTask is defined as type \"array\" but used as type \"string\" in Pipeline result all"));
    }

    #[test]
    fn test_param_scan_is_scope_aware() {
        let raw: Value = serde_yaml::from_str(
            r#"
spec:
  params:
    - name: revision
  tasks:
    - name: build
      params:
        - name: rev
          value: $(params.revision)
        - name: broken
          value: $(params.missing) $(params.) $(params.missing)
      taskSpec:
        params:
          - name: rev
        steps:
          - script: echo $(params.rev) $(params.revision) $(params["rev"])
    - name: other
      taskSpec:
        steps:
          - script: echo $(params.rev)
"#,
        )
        .unwrap();
        let specs: Vec<ParamSpec> = serde_yaml::from_str("- name: revision\n").unwrap();

        let names: Vec<String> = undefined_param_refs(&raw, &specs)
            .iter()
            .map(|e| e.to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "parameter reference $(params.missing) not defined in pipeline spec".to_string(),
                "parameter reference $(params.) not defined in pipeline spec".to_string(),
                "parameter reference $(params.rev) not defined in pipeline spec".to_string(),
            ]
        );
    }
}
