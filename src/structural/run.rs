use std::collections::HashSet;

use super::{FieldError, Validate};
use crate::model::PipelineRun;

/// The embedded `pipelineSpec` is checked as a Pipeline by the caller.
impl Validate for PipelineRun {
    fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        match (&self.spec.pipeline_ref, &self.spec.pipeline_spec) {
            (Some(_), Some(_)) => {
                errors.push(FieldError::both("spec.pipelineRef", "spec.pipelineSpec"))
            }
            (None, None) => {
                errors.push(FieldError::neither("spec.pipelineRef", "spec.pipelineSpec"))
            }
            (Some(pipeline_ref), None) => {
                let named = pipeline_ref.name.as_deref().is_some_and(|n| !n.is_empty());
                let resolved = pipeline_ref
                    .resolver
                    .as_deref()
                    .is_some_and(|r| !r.is_empty());
                if !named && !resolved {
                    errors.push(FieldError::missing("spec.pipelineRef.name"));
                }
            }
            (None, Some(_)) => {}
        }

        let mut names = HashSet::new();
        for param in &self.spec.params {
            if !names.insert(param.name.as_str()) {
                errors.push(FieldError::new(
                    "parameter appears more than once",
                    format!("spec.params[{}]", param.name),
                ));
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structural::to_validation_errors;

    fn messages(yaml: &str) -> Vec<String> {
        let run: PipelineRun = serde_yaml::from_str(yaml).unwrap();
        to_validation_errors(run.validate())
            .into_iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn test_ref_and_spec_both_set() {
        let errors = messages(
            r#"
apiVersion: tekton.dev/v1
kind: PipelineRun
metadata:
  name: run
spec:
  pipelineRef:
    name: ci
  pipelineSpec:
    tasks: []
"#,
        );
        assert_eq!(
            errors,
            vec![
                "expected exactly one, got both: spec.pipelineRef".to_string(),
                "expected exactly one, got both: spec.pipelineSpec".to_string(),
            ]
        );
    }

    #[test]
    fn test_neither_and_duplicate_params() {
        let errors = messages(
            r#"
apiVersion: tekton.dev/v1
kind: PipelineRun
metadata:
  name: run
spec:
  params:
    - name: url
      value: a
    - name: url
      value: b
"#,
        );
        assert!(errors.contains(&"expected exactly one, got neither: spec.pipelineRef".to_string()));
        assert!(errors.contains(&"parameter appears more than once: spec.params[url]".to_string()));
    }
}
