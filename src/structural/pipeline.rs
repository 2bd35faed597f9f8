use std::collections::{HashMap, HashSet};

use super::task::validate_task_spec;
use super::{check_type, is_dns_label, FieldError, Validate};
use crate::model::{ParamType, Pipeline, PipelineSpec, PipelineTask};
use crate::refs;

const TASK_NAME_DETAILS: &str = "Pipeline Task name must be a valid DNS Label, \
    For more info refer to https://kubernetes.io/docs/concepts/overview/working-with-objects/names/#names";

impl Validate for Pipeline {
    fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if self.metadata.name.as_deref().unwrap_or("").is_empty() {
            errors.push(FieldError::missing("metadata.name"));
        }
        errors.extend(validate_pipeline_spec(&self.spec, "spec"));
        errors
    }
}

pub fn validate_pipeline_spec(spec: &PipelineSpec, prefix: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if spec.tasks.is_empty() {
        errors.push(FieldError::new(
            "expected at least one, got none",
            format!("{}.tasks", prefix),
        ));
    }

    let ordinary: HashSet<&str> = spec.tasks.iter().map(|t| t.name.as_str()).collect();
    let mut seen = HashSet::new();
    for (section, tasks) in [("tasks", &spec.tasks), ("finally", &spec.finally)] {
        for (i, task) in tasks.iter().enumerate() {
            let path = format!("{}.{}[{}]", prefix, section, i);
            if !is_dns_label(&task.name) {
                errors.push(
                    FieldError::invalid_value(&task.name, format!("{}.name", path))
                        .with_details(TASK_NAME_DETAILS),
                );
            } else if !seen.insert(task.name.as_str()) {
                errors.push(FieldError::invalid_value(
                    &format!("{} should be unique", task.name),
                    format!("{}.name", path),
                ));
            }
            errors.extend(validate_task_reference(task, &path));
            errors.extend(validate_matrix(task, &path));

            if section == "finally" && !task.run_after.is_empty() {
                errors.push(FieldError::invalid_value(
                    &format!(
                        "no runAfter allowed under {}.finally, final task {} has runAfter specified",
                        prefix, task.name
                    ),
                    path.clone(),
                ));
            }
            for target in &task.run_after {
                if section == "tasks" && !ordinary.contains(target.as_str()) {
                    errors.push(FieldError::invalid_value(
                        &format!("runAfter task {:?} is not defined in the pipeline", target),
                        format!("{}.runAfter", path),
                    ));
                }
            }
        }
    }

    if let Some(cycle) = find_cycle(&spec.tasks) {
        errors.push(FieldError::invalid_value(
            &format!("cycle detected: {}", cycle),
            format!("{}.tasks", prefix),
        ));
    }

    let mut param_names = HashSet::new();
    for param in &spec.params {
        if !param_names.insert(param.name.as_str()) {
            errors.push(FieldError::new(
                "parameter appears more than once",
                format!("{}.params[{}]", prefix, param.name),
            ));
        }
        if let Some(e) = check_type(
            param.r#type.as_ref(),
            format!("{}.params.{}.type", prefix, param.name),
        ) {
            errors.push(e);
        }
    }

    let mut workspace_names = HashSet::new();
    for (i, ws) in spec.workspaces.iter().enumerate() {
        if !workspace_names.insert(ws.name.as_str()) {
            errors.push(FieldError::new(
                format!("workspace with name {:?} appears more than once", ws.name),
                format!("{}.workspaces[{}]", prefix, i),
            ));
        }
    }

    for (i, result) in spec.results.iter().enumerate() {
        let empty = match &result.value {
            None => true,
            Some(v) => v.strings().iter().all(|s| s.is_empty()),
        };
        if empty {
            errors.push(FieldError::missing(format!("{}.results[{}].value", prefix, i)));
        }
    }

    errors
}

fn validate_task_reference(task: &PipelineTask, path: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();
    match (&task.task_ref, &task.task_spec) {
        (Some(_), Some(_)) => errors.push(FieldError::both(
            format!("{}.taskRef", path),
            format!("{}.taskSpec", path),
        )),
        (None, None) => errors.push(FieldError::neither(
            format!("{}.taskRef", path),
            format!("{}.taskSpec", path),
        )),
        (Some(task_ref), None) => {
            let named = task_ref.name.as_deref().is_some_and(|n| !n.is_empty());
            let resolved = task_ref.resolver.as_deref().is_some_and(|r| !r.is_empty());
            if !named && !resolved {
                errors.push(FieldError::missing(format!("{}.taskRef.name", path)));
            }
        }
        (None, Some(embedded)) => {
            if !embedded.is_custom_task() {
                errors.extend(validate_task_spec(
                    &embedded.task_spec,
                    &format!("{}.taskSpec", path),
                ));
            }
        }
    }
    errors
}

fn validate_matrix(task: &PipelineTask, path: &str) -> Vec<FieldError> {
    let Some(matrix) = &task.matrix else {
        return Vec::new();
    };
    let direct: HashSet<&str> = task.params.iter().map(|p| p.name.as_str()).collect();
    let mut errors = Vec::new();
    for param in &matrix.params {
        let param_path = format!("{}.matrix.params[{}]", path, param.name);
        let is_reference = param.value.as_str().is_some_and(refs::is_placeholder);
        if param.value.effective_type() != ParamType::Array && !is_reference {
            errors.push(FieldError::invalid_value(
                "parameters of type array only are allowed in matrix",
                param_path.clone(),
            ));
        }
        if direct.contains(param.name.as_str()) {
            errors.push(FieldError::new(
                format!(
                    "parameter names must be unique, the parameter {:?} is also defined in",
                    param.name
                ),
                param_path,
            ));
        }
    }
    errors
}

/// First dependency cycle among ordinary tasks, as `a → b → a`.
///
/// Edges come from `runAfter` and from result references. Edges to tasks
/// that do not exist are dropped; those are reported elsewhere.
fn find_cycle(tasks: &[PipelineTask]) -> Option<String> {
    let names: HashSet<&str> = tasks.iter().map(|t| t.name.as_str()).collect();
    let mut outgoing: HashMap<&str, Vec<String>> = HashMap::new();
    for task in tasks {
        let mut deps: Vec<String> = task.run_after.clone();
        for source in task.reference_sources() {
            deps.extend(refs::result_refs(source).into_iter().map(|r| r.task));
        }
        deps.retain(|d| names.contains(d.as_str()));
        deps.dedup();
        outgoing.insert(task.name.as_str(), deps);
    }

    fn detect_cycle<'a>(
        node: &'a str,
        outgoing: &'a HashMap<&'a str, Vec<String>>,
        visited: &mut HashSet<&'a str>,
        rec_stack: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Option<String> {
        visited.insert(node);
        rec_stack.insert(node);
        path.push(node);

        if let Some(neighbors) = outgoing.get(node) {
            for neighbor in neighbors {
                let neighbor = neighbor.as_str();
                if !visited.contains(neighbor) {
                    if let Some(cycle) = detect_cycle(neighbor, outgoing, visited, rec_stack, path)
                    {
                        return Some(cycle);
                    }
                } else if rec_stack.contains(neighbor) {
                    let start = path.iter().position(|&n| n == neighbor).unwrap_or(0);
                    return Some(format!("{} → {}", path[start..].join(" → "), neighbor));
                }
            }
        }

        rec_stack.remove(node);
        path.pop();
        None
    }

    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();
    for task in tasks {
        if !visited.contains(task.name.as_str()) {
            if let Some(cycle) = detect_cycle(
                task.name.as_str(),
                &outgoing,
                &mut visited,
                &mut rec_stack,
                &mut path,
            ) {
                return Some(cycle);
            }
        }
    }
    None
}
