//! Git resolver parameters
//!
//! `url` and `pathInRepo` are required; `revision` falls back to the
//! configured default. Each of `url` and `pathInRepo` must look right on its
//! own, or be a single `$(...)` placeholder that is substituted later.

use super::fetch::GitRequest;
use super::{ResolveContext, ResolveError};
use crate::model::param::{string_value, Param};
use crate::refs;

const REQUIRED: [&str; 2] = ["url", "pathInRepo"];

/// Static checks made before any substitution or network access.
pub fn validate_params(params: &[Param]) -> Vec<String> {
    let mut problems = Vec::new();
    for required in REQUIRED {
        if !params.iter().any(|p| p.name == required) {
            problems.push(format!("required parameter {:?} is missing", required));
        }
    }
    if let Some(url) = string_value(params, "url").filter(|u| !u.is_empty()) {
        if !(refs::is_placeholder(url) || is_git_url(url)) {
            problems.push(format!(
                "invalid git URL format or parameter reference: {}",
                url
            ));
        }
    }
    if let Some(path) = string_value(params, "pathInRepo").filter(|p| !p.is_empty()) {
        if !(refs::is_placeholder(path) || is_repo_path(path)) {
            problems.push(format!(
                "invalid path format or parameter reference: {}",
                path
            ));
        }
    }
    problems
}

pub fn is_git_url(url: &str) -> bool {
    ["http://", "https://", "git@", "ssh://"]
        .iter()
        .any(|prefix| url.starts_with(prefix))
}

pub fn is_repo_path(path: &str) -> bool {
    !path.is_empty() && !path.starts_with('/')
}

/// Validated, substituted request ready for the fetcher.
pub fn request(
    params: &[Param],
    ctx: &ResolveContext<'_>,
    default_revision: &str,
) -> Result<GitRequest, ResolveError> {
    let problems = validate_params(params);
    if !problems.is_empty() {
        return Err(ResolveError::GitParams(problems));
    }

    let value = |name: &str| -> Result<Option<String>, ResolveError> {
        let Some(raw) = string_value(params, name) else {
            return Ok(None);
        };
        let substituted = ctx.substitute(raw);
        if refs::contains_param_ref(&substituted) {
            return Err(ResolveError::Unresolved {
                resolver: "git",
                name: name.to_string(),
                value: substituted,
            });
        }
        Ok(Some(substituted))
    };

    let revision = value("revision")?
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| default_revision.to_string());
    // Passed to `git fetch` as a positional argument.
    if revision.starts_with('-') {
        return Err(ResolveError::InvalidRevision(revision));
    }

    Ok(GitRequest {
        url: value("url")?.unwrap_or_default(),
        path_in_repo: value("pathInRepo")?.unwrap_or_default(),
        revision,
    })
}
