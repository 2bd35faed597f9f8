//! Task documents are checked for well-formedness only: a standalone Task
//! has no caller whose bindings could be compared against its contract.

use crate::errors::ValidationError;
use crate::model::Task;
use crate::structural::{to_validation_errors, Validate};

pub fn validate_task(task: &Task) -> Vec<ValidationError> {
    to_validation_errors(task.validate())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(yaml: &str) -> Vec<String> {
        let task: Task = serde_yaml::from_str(yaml).unwrap();
        validate_task(&task).iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn test_valid_task() {
        let errors = messages(
            r#"
apiVersion: tekton.dev/v1
kind: Task
metadata:
  name: echo
spec:
  params:
    - name: message
  results:
    - name: out
  steps:
    - name: say
      image: alpine
      script: echo "$(params.message)" > $(results.out.path)
"#,
        );
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn test_step_reference_to_undeclared_param() {
        let errors = messages(
            r#"
apiVersion: tekton.dev/v1beta1
kind: Task
metadata:
  name: echo
spec:
  steps:
    - name: say
      image: alpine
      script: echo $(params.missing)
"#,
        );
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("non-existent variable"), "{}", errors[0]);
        assert!(errors[0].contains("spec.steps[0].script"), "{}", errors[0]);
    }

    #[test]
    fn test_every_complaint_reported() {
        let errors = messages(
            r#"
apiVersion: tekton.dev/v1
kind: Task
metadata: {}
spec:
  params:
    - name: flag
    - name: flag
  steps:
    - name: Build
      script: make
"#,
        );
        assert!(errors.contains(&"missing field(s): metadata.name".to_string()));
        assert!(errors.contains(&"missing field(s): spec.steps[0].image".to_string()));
        assert!(errors
            .iter()
            .any(|e| e.starts_with("parameter appears more than once")));
        assert!(errors.iter().any(|e| e.starts_with("invalid value: Build")));
    }
}
