//! Workspace declarations, bindings and pipeline-level workspaces
//!
//! Both directions are checked per task: every required declaration needs a
//! binding, and every binding needs a declaration. Pipeline workspaces that
//! no binding uses are reported once all tasks have been seen.

use std::collections::HashSet;

use crate::errors::ValidationError;
use crate::model::{PipelineSpec, PipelineTask, TaskSpec, WorkspacePipelineTaskBinding};

/// Check one task's bindings against its resolved contract.
pub fn validate_task_workspaces(
    task: &PipelineTask,
    spec: &TaskSpec,
    pipeline_workspaces: &HashSet<&str>,
) -> Vec<ValidationError> {
    let scope = format!("task {} workspace validation", task.name);
    let mut errors = Vec::new();

    for decl in &spec.workspaces {
        let Some(binding) = task.workspaces.iter().find(|b| b.name == decl.name) else {
            if !decl.optional {
                errors.push(ValidationError::MissingWorkspace {
                    scope: scope.clone(),
                    workspace: decl.name.clone(),
                });
            }
            continue;
        };

        if let Some(target) = binding.pipeline_workspace() {
            if !pipeline_workspaces.contains(target) {
                errors.push(ValidationError::UnknownPipelineWorkspace {
                    scope: scope.clone(),
                    binding: decl.name.clone(),
                    workspace: target.to_string(),
                });
            }
        }

        if let Some(conflict) = path_conflict(&scope, decl.mount_path.as_deref(), binding) {
            errors.push(conflict);
        }
    }

    for binding in &task.workspaces {
        if spec.workspace(&binding.name).is_none() {
            errors.push(ValidationError::UnmatchedWorkspaceBinding {
                scope: scope.clone(),
                binding: binding.name.clone(),
            });
        }
    }

    errors
}

/// An absolute `subPath` under a fixed `mountPath` escapes the mount.
fn path_conflict(
    scope: &str,
    mount_path: Option<&str>,
    binding: &WorkspacePipelineTaskBinding,
) -> Option<ValidationError> {
    let mount_path = mount_path.filter(|m| !m.is_empty())?;
    let sub_path = binding.sub_path.as_deref().filter(|s| s.starts_with('/'))?;
    Some(ValidationError::WorkspacePathConflict {
        scope: scope.to_string(),
        workspace: binding.name.clone(),
        mount_path: mount_path.to_string(),
        sub_path: sub_path.to_string(),
    })
}

/// Pipeline workspaces no task binding refers to, in declaration order.
pub fn unused_workspaces(spec: &PipelineSpec) -> Vec<ValidationError> {
    let used: HashSet<&str> = spec
        .all_tasks()
        .flat_map(|(task, _)| task.workspaces.iter())
        .filter_map(|b| b.pipeline_workspace())
        .collect();
    spec.workspaces
        .iter()
        .filter(|w| !used.contains(w.name.as_str()))
        .map(|w| ValidationError::UnusedWorkspace {
            workspace: w.name.clone(),
        })
        .collect()
}

/// Run every workspace check over the tasks whose contract is known.
pub fn validate_workspaces<'a>(
    spec: &PipelineSpec,
    resolved: impl IntoIterator<Item = (&'a PipelineTask, &'a TaskSpec)>,
) -> Vec<ValidationError> {
    let declared: HashSet<&str> = spec.workspaces.iter().map(|w| w.name.as_str()).collect();
    let mut errors: Vec<ValidationError> = resolved
        .into_iter()
        .flat_map(|(task, task_spec)| validate_task_workspaces(task, task_spec, &declared))
        .collect();
    errors.extend(unused_workspaces(spec));
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(yaml: &str) -> PipelineSpec {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn spec(yaml: &str) -> TaskSpec {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn run(p: &PipelineSpec, task_spec: &TaskSpec) -> Vec<String> {
        validate_workspaces(p, p.all_tasks().map(|(t, _)| (t, task_spec)))
            .iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn test_optional_workspace_needs_no_binding() {
        let p = pipeline("tasks:\n  - name: build\n    taskRef:\n      name: b\n");
        let optional = spec("workspaces:\n  - name: cache\n    optional: true\n");
        assert!(run(&p, &optional).is_empty());

        let required = spec("workspaces:\n  - name: cache\n");
        assert_eq!(
            run(&p, &required),
            vec!["task build workspace validation: required workspace \"cache\" is not provided"
                .to_string()]
        );
    }

    #[test]
    fn test_binding_to_unknown_pipeline_workspace() {
        let p = pipeline(
            r#"
workspaces:
  - name: source
tasks:
  - name: build
    taskRef:
      name: b
    workspaces:
      - name: output
        workspace: src
"#,
        );
        let errors = run(&p, &spec("workspaces:\n  - name: output\n"));
        assert!(errors.contains(
            &"task build workspace validation: workspace binding \"output\" references non-existent pipeline workspace \"src\""
                .to_string()
        ));
        assert!(errors.contains(
            &"pipeline workspace \"source\" is declared but never used".to_string()
        ));
    }

    #[test]
    fn test_unused_workspace_reported_once() {
        let p = pipeline(
            r#"
workspaces:
  - name: source
  - name: cache
tasks:
  - name: build
    taskRef:
      name: b
    workspaces:
      - name: output
        workspace: source
finally:
  - name: report
    taskRef:
      name: b
    workspaces:
      - name: output
        workspace: source
"#,
        );
        let errors = run(&p, &spec("workspaces:\n  - name: output\n"));
        assert_eq!(
            errors,
            vec!["pipeline workspace \"cache\" is declared but never used".to_string()]
        );
    }

    #[test]
    fn test_absolute_subpath_conflicts_with_mount_path() {
        let p = pipeline(
            r#"
workspaces:
  - name: shared
tasks:
  - name: build
    taskRef:
      name: b
    workspaces:
      - name: output
        workspace: shared
        subPath: /etc
"#,
        );
        let errors = run(
            &p,
            &spec("workspaces:\n  - name: output\n    mountPath: /workspace/out\n"),
        );
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("task declares mountPath \"/workspace/out\" but binding uses absolute subPath \"/etc\""));
    }

    #[test]
    fn test_binding_without_declaration() {
        let p = pipeline(
            r#"
workspaces:
  - name: shared
tasks:
  - name: build
    taskRef:
      name: b
    workspaces:
      - name: output
        workspace: shared
      - name: extra
        workspace: shared
"#,
        );
        let errors = run(&p, &spec("workspaces:\n  - name: output\n"));
        assert_eq!(
            errors,
            vec!["task build workspace validation: workspace binding \"extra\" does not match any task workspace declaration".to_string()]
        );
    }
}
