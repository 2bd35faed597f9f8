//! Parameter assignments against declared parameter contracts
//!
//! Matrix-supplied parameters count as present but their values are only
//! known per iteration, so they are never type-checked here.

use crate::errors::ValidationError;
use crate::model::{Param, ParamSpec, ParamType, PipelineTask};

/// How a parameter reaches a task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Assignment<'a> {
    /// Listed under the pipeline task's `params`.
    Direct(&'a Param),
    /// Supplied per iteration by the task's `matrix`.
    MatrixSupplied(&'a Param),
}

impl<'a> Assignment<'a> {
    pub fn param(&self) -> &'a Param {
        match self {
            Assignment::Direct(p) | Assignment::MatrixSupplied(p) => p,
        }
    }

    pub fn name(&self) -> &'a str {
        self.param().name.as_str()
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, Assignment::Direct(_))
    }
}

/// Direct params followed by matrix params not already assigned directly.
pub fn assignments(task: &PipelineTask) -> Vec<Assignment<'_>> {
    let mut out: Vec<Assignment<'_>> = task.params.iter().map(Assignment::Direct).collect();
    for param in task.matrix_params() {
        if !out.iter().any(|a| a.name() == param.name) {
            out.push(Assignment::MatrixSupplied(param));
        }
    }
    out
}

/// Plain assignments, as supplied by a PipelineRun.
pub fn direct(params: &[Param]) -> Vec<Assignment<'_>> {
    params.iter().map(Assignment::Direct).collect()
}

/// Check `assignments` against `declared`.
///
/// `scope` prefixes every message, `target` names the declaring document
/// kind ("Task" or "Pipeline").
pub fn validate_params(
    scope: &str,
    target: &str,
    assignments: &[Assignment<'_>],
    declared: &[ParamSpec],
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for assignment in assignments {
        let Some(spec) = declared.iter().find(|s| s.name == assignment.name()) else {
            errors.push(ValidationError::UndeclaredParam {
                scope: scope.to_string(),
                param: assignment.name().to_string(),
                target: target.to_string(),
            });
            continue;
        };
        let Assignment::Direct(param) = assignment else {
            continue;
        };

        let want = spec.effective_type().lenient();
        let got = param.value.effective_type();
        if got != want {
            errors.push(ValidationError::ParamTypeMismatch {
                scope: scope.to_string(),
                param: param.name.clone(),
                got: got.to_string(),
                want: want.to_string(),
            });
        }
    }

    for spec in declared.iter().filter(|s| s.is_required()) {
        if !assignments.iter().any(|a| a.name() == spec.name) {
            errors.push(ValidationError::MissingParam {
                scope: scope.to_string(),
                param: spec.name.clone(),
            });
        }
    }

    errors
}

/// The declared type an assignment is checked against, if it passes.
pub fn accepted_type(assignment: &Assignment<'_>, declared: &[ParamSpec]) -> Option<ParamType> {
    let Assignment::Direct(param) = assignment else {
        return None;
    };
    let want = declared
        .iter()
        .find(|s| s.name == param.name)?
        .effective_type()
        .lenient();
    (param.value.effective_type() == want).then_some(want)
}
