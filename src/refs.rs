//! Reference scanning over raw text
//!
//! Parameter and result references live in free-form strings (scripts, env
//! values, param values, when expressions). They are found by pattern
//! matching rather than by walking typed fields:
//!
//! - `$(params.<name>)` and `$(params["<name>"])`
//! - `$(tasks.<task>.results.<result><suffix>)` where the suffix is an index
//!   (`[0]`, `[*]`) or a property access (`.field`)

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;

static PARAM_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\(params\.([^)]*)\)").unwrap());

static PARAM_BRACKET_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\$\(params\[\s*['"]([^'"]*)['"]\s*\][^)]*\)"#).unwrap());

static RESULT_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\(tasks\.([^.]+)\.results\.([^).\[\s]+)([^)]*)\)").unwrap()
});

static ARRAY_INDEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+|\*)\]").unwrap());

static WHOLE_ARRAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\$\((?:params\.[^)\[]+|tasks\.[^.)]+\.results\.[^)\[]+)\[\*\]\)$").unwrap()
});

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\$\([^)]+\)$").unwrap());

/// `$(tasks.<task>.results.<result>…)` found in some text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRef {
    pub task: String,
    pub result: String,
    /// Everything between the result name and the closing `)`.
    pub suffix: String,
    /// The full matched `$(...)` expression.
    pub expression: String,
}

impl ResultRef {
    pub fn key(&self) -> String {
        format!("{}.{}", self.task, self.result)
    }

    pub fn has_index(&self) -> bool {
        has_index_accessor(&self.expression)
    }

    pub fn has_property(&self) -> bool {
        has_property_access(&self.expression)
    }
}

/// `$(params.<name>…)` found in some text, with the name normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamRef {
    /// Name without index or property suffix. May be empty.
    pub name: String,
    pub expression: String,
}

pub fn result_refs(text: &str) -> Vec<ResultRef> {
    RESULT_REF
        .captures_iter(text)
        .map(|caps| ResultRef {
            task: caps[1].to_string(),
            result: caps[2].to_string(),
            suffix: caps[3].to_string(),
            expression: caps[0].to_string(),
        })
        .collect()
}

pub fn param_refs(text: &str) -> Vec<ParamRef> {
    let dotted = PARAM_REF.captures_iter(text).map(|caps| ParamRef {
        name: normalize_param_name(&caps[1]).to_string(),
        expression: caps[0].to_string(),
    });
    let bracketed = PARAM_BRACKET_REF.captures_iter(text).map(|caps| ParamRef {
        name: caps[1].to_string(),
        expression: caps[0].to_string(),
    });
    dotted.chain(bracketed).collect()
}

/// `list[*]` → `list`, `config.key` → `config`.
fn normalize_param_name(raw: &str) -> &str {
    let end = raw.find(['[', '.']).unwrap_or(raw.len());
    raw[..end].trim()
}

/// True for `[<digits>]` or `[*]` anywhere in the usage text.
pub fn has_index_accessor(usage: &str) -> bool {
    ARRAY_INDEX.is_match(usage)
}

/// True when something follows `results.<name>` after a further dot.
pub fn has_property_access(usage: &str) -> bool {
    let Some(pos) = usage.find("results.") else {
        return false;
    };
    let rest = usage[pos + "results.".len()..].trim_end_matches([')', ' ']);
    rest.contains('.')
}

/// The whole string is one `$(params.x[*])` or `$(tasks.t.results.r[*])`.
pub fn is_whole_array_expansion(value: &str) -> bool {
    WHOLE_ARRAY.is_match(value.trim())
}

/// The whole string is one unresolved `$(...)` expression.
pub fn is_placeholder(value: &str) -> bool {
    PLACEHOLDER.is_match(value)
}

pub fn contains_param_ref(value: &str) -> bool {
    PARAM_REF.is_match(value)
}

/// Replace each literal `$(params.<key>)` with the runtime value.
pub fn substitute_params(text: &str, values: &BTreeMap<String, String>) -> String {
    substitute_with(text, |name| values.get(name).cloned())
}

/// Replace `$(params.<name>)` wherever `lookup` knows the name; leave the
/// rest untouched.
pub fn substitute_with<F>(text: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    PARAM_REF
        .replace_all(text, |caps: &Captures| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_refs_with_suffixes() {
        let text = "echo $(tasks.clone.results.commit) $(tasks.scan.results.images[0]) \
                    $(tasks.meta.results.info.owner)";
        let refs = result_refs(text);
        assert_eq!(refs.len(), 3);

        assert_eq!(refs[0].task, "clone");
        assert_eq!(refs[0].result, "commit");
        assert_eq!(refs[0].suffix, "");
        assert!(!refs[0].has_index());
        assert!(!refs[0].has_property());

        assert_eq!(refs[1].result, "images");
        assert_eq!(refs[1].suffix, "[0]");
        assert!(refs[1].has_index());

        assert_eq!(refs[2].result, "info");
        assert_eq!(refs[2].suffix, ".owner");
        assert!(refs[2].has_property());
        assert_eq!(refs[2].key(), "meta.info");
    }

    #[test]
    fn test_param_refs_are_normalized() {
        let refs = param_refs(
            r#"$(params.url) $(params.flags[*]) $(params.config.env) $(params.) $(params["dotted.name"])"#,
        );
        let names: Vec<&str> = refs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["url", "flags", "config", "", "dotted.name"]);
    }

    #[test]
    fn test_whole_array_expansion() {
        assert!(is_whole_array_expansion("$(params.flags[*])"));
        assert!(is_whole_array_expansion("$(tasks.scan.results.images[*])"));
        assert!(!is_whole_array_expansion("$(tasks.scan.results.images[0])"));
        assert!(!is_whole_array_expansion("prefix-$(params.flags[*])"));
    }

    #[test]
    fn test_placeholder() {
        assert!(is_placeholder("$(params.repo-url)"));
        assert!(!is_placeholder("https://github.com/$(params.org)/repo"));
        assert!(!is_placeholder("main"));
    }

    #[test]
    fn test_substitute_params() {
        let mut values = BTreeMap::new();
        values.insert("revision".to_string(), "v1.2.0".to_string());
        let out = substitute_params("git checkout $(params.revision) $(params.other)", &values);
        assert_eq!(out, "git checkout v1.2.0 $(params.other)");
    }

    #[test]
    fn test_property_access_ignores_trailing_paren() {
        assert!(has_property_access("$(tasks.t.results.r.field)"));
        assert!(!has_property_access("$(tasks.t.results.r)"));
        assert!(!has_property_access("$(tasks.t.results.r )"));
    }
}
