//! Result references against the results upstream tasks declare
//!
//! Each reference is checked for existence first. When the caller knows how
//! the reference is consumed (a [`Usage`]), its declared type must also be
//! compatible with that usage.

use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::errors::ValidationError;
use crate::model::{ParamType, ParamValue, ResultSpec};
use crate::refs::{self, ResultRef};

/// How a reference's value is consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct Usage {
    pub expected: ParamType,
    /// e.g. `PipelineTask build parameter revision`.
    pub location: String,
    /// The literal text the reference appears in.
    pub text: String,
}

/// A reference plus, when known, how it is used.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultUse {
    pub reference: ResultRef,
    pub usage: Option<Usage>,
}

/// What a task produces. `None` when its contract could not be resolved.
pub type Producers<'a> = BTreeMap<&'a str, Option<&'a [ResultSpec]>>;

/// Can a result declared as `defined` be consumed as `expected` by `usage`?
pub fn is_compatible(defined: &ParamType, expected: &ParamType, usage: &str) -> bool {
    let defined = defined.clone().lenient();
    if defined == *expected {
        return true;
    }
    match (&defined, expected) {
        (ParamType::Array, ParamType::String) => refs::has_index_accessor(usage),
        (ParamType::Object, ParamType::String) => refs::has_property_access(usage),
        _ => false,
    }
}

pub fn validate_references(
    scope: &str,
    uses: &[ResultUse],
    producers: &Producers<'_>,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut missing: HashSet<String> = HashSet::new();
    for ResultUse { reference, usage } in uses {
        let Some(declared) = producers.get(reference.task.as_str()) else {
            if !missing.insert(reference.key()) {
                continue;
            }
            errors.push(ValidationError::MissingProducer {
                scope: scope.to_string(),
                producer: reference.task.clone(),
                result: reference.result.clone(),
            });
            continue;
        };
        let Some(declared) = declared else {
            debug!(producer = %reference.task, "Skipping reference to unresolved task");
            continue;
        };
        let Some(result) = declared.iter().find(|r| r.name == reference.result) else {
            if !missing.insert(reference.key()) {
                continue;
            }
            errors.push(ValidationError::MissingResult {
                scope: scope.to_string(),
                producer: reference.task.clone(),
                result: reference.result.clone(),
            });
            continue;
        };

        let Some(usage) = usage else {
            continue;
        };
        let defined = result.effective_type();
        if !is_compatible(&defined, &usage.expected, &usage.text) {
            errors.push(ValidationError::ResultTypeMismatch {
                scope: scope.to_string(),
                producer: reference.task.clone(),
                result: reference.result.clone(),
                defined: defined.lenient().to_string(),
                expected: usage.expected.to_string(),
                location: usage.location.clone(),
                usage: usage.text.clone(),
            });
        }
    }
    errors
}

/// References inside a param value, with usage derived from `accepted`.
///
/// `accepted` is the declared type the value was checked against; `None`
/// means the value was not type-compatible with its declaration (or was
/// matrix-supplied) and only existence is checked.
pub fn uses_in_value(
    value: &ParamValue,
    accepted: Option<&ParamType>,
    location: &str,
) -> Vec<ResultUse> {
    let mut out = Vec::new();
    let mut push = |text: &str, whole: Option<ParamType>| {
        for reference in refs::result_refs(text) {
            let usage = whole.as_ref().map(|whole| Usage {
                expected: if reference.has_index() || reference.has_property() {
                    ParamType::String
                } else {
                    whole.clone()
                },
                location: location.to_string(),
                text: text.to_string(),
            });
            out.push(ResultUse { reference, usage });
        }
    };

    match value {
        ParamValue::String(s) => push(s, accepted.cloned()),
        ParamValue::Array(items) => {
            for item in items {
                push(item, accepted.map(|_| ParamType::String));
            }
        }
        ParamValue::Object(map) => {
            for v in map.values() {
                push(v, accepted.map(|_| ParamType::String));
            }
        }
    }
    out
}

/// References in free text with no usage context.
pub fn uses_in_text(text: &str) -> Vec<ResultUse> {
    refs::result_refs(text)
        .into_iter()
        .map(|reference| ResultUse {
            reference,
            usage: None,
        })
        .collect()
}

/// Drop exact repeats, and context-free uses of a `task.result` that is
/// also used with a known context.
pub fn dedup(uses: Vec<ResultUse>) -> Vec<ResultUse> {
    let typed: HashSet<String> = uses
        .iter()
        .filter(|u| u.usage.is_some())
        .map(|u| u.reference.key())
        .collect();
    let mut out: Vec<ResultUse> = Vec::new();
    for u in uses {
        if u.usage.is_none() && typed.contains(&u.reference.key()) {
            continue;
        }
        let repeated = out
            .iter()
            .any(|seen| seen.reference.key() == u.reference.key() && seen.usage == u.usage);
        if !repeated {
            out.push(u);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(yaml: &str) -> Vec<ResultSpec> {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_same_type_always_compatible() {
        for t in [ParamType::String, ParamType::Array, ParamType::Object] {
            assert!(is_compatible(&t, &t, "anything"));
            assert!(is_compatible(&t, &t, ""));
        }
    }

    #[test]
    fn test_array_needs_index_to_be_string() {
        assert!(is_compatible(
            &ParamType::Array,
            &ParamType::String,
            "$(tasks.t.results.r[0])"
        ));
        assert!(is_compatible(
            &ParamType::Array,
            &ParamType::String,
            "$(tasks.t.results.r[*])"
        ));
        assert!(!is_compatible(
            &ParamType::Array,
            &ParamType::String,
            "$(tasks.t.results.r)"
        ));
    }

    #[test]
    fn test_object_needs_property_to_be_string() {
        assert!(is_compatible(
            &ParamType::Object,
            &ParamType::String,
            "$(tasks.t.results.r.field)"
        ));
        assert!(!is_compatible(
            &ParamType::Object,
            &ParamType::String,
            "$(tasks.t.results.r)"
        ));
    }

    #[test]
    fn test_other_combinations_incompatible() {
        assert!(!is_compatible(&ParamType::String, &ParamType::Array, "$(tasks.t.results.r)"));
        assert!(!is_compatible(&ParamType::String, &ParamType::Object, "$(tasks.t.results.r)"));
        assert!(!is_compatible(&ParamType::Array, &ParamType::Object, "$(tasks.t.results.r[0])"));
    }

    #[test]
    fn test_unknown_defined_type_is_string() {
        let odd = ParamType::Other("blob".to_string());
        assert!(is_compatible(&odd, &ParamType::String, "$(tasks.t.results.r)"));
        assert!(!is_compatible(&odd, &ParamType::Array, "$(tasks.t.results.r)"));
    }

    #[test]
    fn test_existence_errors_name_producer_and_result() {
        let clone = results("- name: commit\n");
        let mut producers: Producers = BTreeMap::new();
        producers.insert("clone", Some(clone.as_slice()));

        let uses = uses_in_text("$(tasks.clone.results.sha) $(tasks.fetch.results.commit)");
        let errors: Vec<String> = validate_references("build PipelineTask results", &uses, &producers)
            .iter()
            .map(|e| e.to_string())
            .collect();
        assert_eq!(
            errors,
            vec![
                "build PipelineTask results: non-existent sha result from clone PipelineTask".to_string(),
                "build PipelineTask results: commit result from non-existent fetch PipelineTask"
                    .to_string(),
            ]
        );
    }

    #[test]
    fn test_unresolved_producer_is_skipped() {
        let mut producers: Producers = BTreeMap::new();
        producers.insert("clone", None);
        let uses = uses_in_text("$(tasks.clone.results.anything)");
        assert!(validate_references("s", &uses, &producers).is_empty());
    }

    #[test]
    fn test_whole_array_used_as_string_reports_usage() {
        let scan = results("- name: files\n  type: array\n");
        let mut producers: Producers = BTreeMap::new();
        producers.insert("scan", Some(scan.as_slice()));

        let value = ParamValue::String("$(tasks.scan.results.files)".to_string());
        let uses = uses_in_value(&value, Some(&ParamType::String), "PipelineTask lint parameter files");
        let errors = validate_references("lint PipelineTask results", &uses, &producers);
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].to_string(),
            "lint PipelineTask results: result type mismatch: files result from scan PipelineTask is defined as type \"array\" but used as type \"string\" in PipelineTask lint parameter files (usage: $(tasks.scan.results.files))"
        );
    }

    #[test]
    fn test_array_param_elements_expect_strings() {
        let value = ParamValue::Array(vec![
            "$(tasks.scan.results.first)".to_string(),
            "$(tasks.scan.results.files[*])".to_string(),
        ]);
        let uses = uses_in_value(&value, Some(&ParamType::Array), "here");
        assert_eq!(uses.len(), 2);
        assert!(uses
            .iter()
            .all(|u| u.usage.as_ref().unwrap().expected == ParamType::String));
    }

    #[test]
    fn test_no_usage_when_assignment_rejected() {
        let value = ParamValue::String("$(tasks.clone.results.commit)".to_string());
        let uses = uses_in_value(&value, None, "here");
        assert_eq!(uses.len(), 1);
        assert!(uses[0].usage.is_none());
    }

    #[test]
    fn test_dedup_prefers_usage() {
        let mut uses = uses_in_text("$(tasks.a.results.r)");
        uses.extend(uses_in_value(
            &ParamValue::String("$(tasks.a.results.r)".to_string()),
            Some(&ParamType::String),
            "p",
        ));
        uses.extend(uses_in_value(
            &ParamValue::String("$(tasks.a.results.r)".to_string()),
            Some(&ParamType::String),
            "p",
        ));
        let deduped = dedup(uses);
        assert_eq!(deduped.len(), 1);
        assert!(deduped[0].usage.is_some());
    }

    #[test]
    fn test_missing_producer_reported_once_per_reference() {
        let producers: Producers = BTreeMap::new();
        let mut uses = uses_in_value(
            &ParamValue::String("$(tasks.x.results.r)".to_string()),
            Some(&ParamType::String),
            "PipelineTask b parameter one",
        );
        uses.extend(uses_in_value(
            &ParamValue::Array(vec!["$(tasks.x.results.r)".to_string()]),
            Some(&ParamType::Array),
            "PipelineTask b parameter two",
        ));
        let uses = dedup(uses);
        assert_eq!(uses.len(), 2);

        let errors = validate_references("b PipelineTask results", &uses, &producers);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("non-existent x PipelineTask"));
    }
}
