use std::collections::HashSet;

use super::{check_type, is_dns_label, is_key_name, FieldError, Validate};
use crate::model::{ParamType, Task, TaskSpec};
use crate::refs;

const STEP_NAME_DETAILS: &str = "Task step name must be a valid DNS Label, \
    For more info refer to https://kubernetes.io/docs/concepts/overview/working-with-objects/names/#names";

const KEY_NAME_DETAILS: &str = "Name must consist of alphanumeric characters, '-', '_' or '.', \
    and must start and end with an alphanumeric character";

impl Validate for Task {
    fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if self.metadata.name.as_deref().unwrap_or("").is_empty() {
            errors.push(FieldError::missing("metadata.name"));
        }
        errors.extend(validate_task_spec(&self.spec, "spec"));
        errors.extend(step_param_refs(&self.spec, "spec"));
        errors
    }
}

/// Checks shared by Task documents and embedded `taskSpec` blocks.
pub fn validate_task_spec(spec: &TaskSpec, prefix: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if spec.steps.is_empty() {
        errors.push(FieldError::missing(format!("{}.steps", prefix)));
    }

    let template_image = spec
        .step_template
        .as_ref()
        .and_then(|t| t.image.as_deref())
        .is_some_and(|i| !i.is_empty());
    let mut step_names = HashSet::new();
    for (i, step) in spec.steps.iter().enumerate() {
        let path = format!("{}.steps[{}]", prefix, i);
        if !step.name.is_empty() {
            if !is_dns_label(&step.name) {
                errors.push(
                    FieldError::invalid_value(&step.name, format!("{}.name", path))
                        .with_details(STEP_NAME_DETAILS),
                );
            } else if !step_names.insert(step.name.as_str()) {
                errors.push(FieldError::invalid_value(
                    &step.name,
                    format!("{}.name", path),
                ));
            }
        }
        if step.image.as_deref().unwrap_or("").is_empty() && !template_image {
            errors.push(FieldError::missing(format!("{}.image", path)));
        }
        if step.script.is_some() && !step.command.is_empty() {
            errors.push(FieldError::both(
                format!("{}.script", path),
                format!("{}.command", path),
            ));
        }
    }

    let mut param_names = HashSet::new();
    for param in &spec.params {
        if !param_names.insert(param.name.as_str()) {
            errors.push(FieldError::new(
                "parameter appears more than once",
                format!("{}.params[{}]", prefix, param.name),
            ));
        }
        let type_path = format!("{}.params.{}.type", prefix, param.name);
        if let Some(e) = check_type(param.r#type.as_ref(), type_path.clone()) {
            errors.push(e);
            continue;
        }
        let declared = param.effective_type();
        if declared == ParamType::Object && param.properties.is_none() {
            errors.push(FieldError::missing(format!(
                "{}.params.{}.properties",
                prefix, param.name
            )));
        }
        if let Some(default) = &param.default {
            let default_type = default.literal_type();
            if default_type != declared {
                errors.push(
                    FieldError::new(
                        format!(
                            "{:?} type does not match default value's type: {:?}",
                            declared.as_str(),
                            default_type.as_str()
                        ),
                        type_path,
                    )
                    .also_at(format!("{}.params.{}.default.type", prefix, param.name)),
                );
            }
        }
    }

    for (i, result) in spec.results.iter().enumerate() {
        if !is_key_name(&result.name) {
            errors.push(
                FieldError::new(
                    format!("invalid key name {:?}", result.name),
                    format!("{}.results[{}].name", prefix, i),
                )
                .with_details(KEY_NAME_DETAILS),
            );
        }
        if let Some(e) = check_type(
            result.r#type.as_ref(),
            format!("{}.results[{}].type", prefix, i),
        ) {
            errors.push(e);
        }
    }

    let mut workspace_names = HashSet::new();
    for (i, ws) in spec.workspaces.iter().enumerate() {
        if !workspace_names.insert(ws.name.as_str()) {
            errors.push(FieldError::new(
                format!("workspace name {:?} must be unique", ws.name),
                format!("{}.workspaces[{}].name", prefix, i),
            ));
        }
    }

    errors
}

/// `$(params.x)` inside steps must name a declared task param.
fn step_param_refs(spec: &TaskSpec, prefix: &str) -> Vec<FieldError> {
    let declared: HashSet<&str> = spec.params.iter().map(|p| p.name.as_str()).collect();
    let mut errors = Vec::new();
    for (i, step) in spec.steps.iter().enumerate() {
        for (field, text) in step.text_fields() {
            if refs::param_refs(text)
                .iter()
                .any(|r| !declared.contains(r.name.as_str()))
            {
                errors.push(FieldError::new(
                    format!("non-existent variable in {:?}", text),
                    format!("{}.steps[{}].{}", prefix, i, field),
                ));
            }
        }
    }
    errors
}
