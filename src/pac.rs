//! Pipelines-as-Code templating
//!
//! PipelineRuns kept under a repository's `.tekton/` directory carry
//! `{{ key }}` placeholders that Pipelines-as-Code fills in from the git
//! event. Defaults for `revision`, `repo_url`, `repo_owner` and `repo_name`
//! are read from the enclosing repository; `--pac-param` values win.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::document::{split_documents, type_meta};
use crate::error::{Result, TekError};
use crate::model::{Param, ParamValue, PipelineRun, PipelineTask};
use crate::refs;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").unwrap());

/// What could be read from a repository's `.git` directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GitInfo {
    pub top_level: PathBuf,
    pub sha: Option<String>,
    pub url: Option<String>,
}

/// Templating parameters and the `.tekton/` directory for one input file.
#[derive(Debug, Clone, Default)]
pub struct PacContext {
    params: BTreeMap<String, String>,
    tekton_dir: Option<PathBuf>,
}

impl PacContext {
    /// Only the given parameters, no repository.
    pub fn new(params: BTreeMap<String, String>) -> Self {
        Self {
            params,
            tekton_dir: None,
        }
    }

    /// Git-derived defaults for the repository containing `file`, overridden
    /// by `overrides`.
    pub fn discover(file: &Path, overrides: &BTreeMap<String, String>) -> Self {
        let start = file
            .canonicalize()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        let mut params = BTreeMap::new();
        let mut tekton_dir = None;
        if let Some(info) = git_info(&start) {
            debug!(top_level = %info.top_level.display(), "Found git repository");
            if let Some(sha) = &info.sha {
                params.insert("revision".to_string(), sha.clone());
            }
            if let Some(url) = &info.url {
                params.insert("repo_url".to_string(), url.clone());
                match repo_owner_and_name(url) {
                    Some((owner, name)) => {
                        params.insert("repo_owner".to_string(), owner);
                        params.insert("repo_name".to_string(), name);
                    }
                    None => warn!(%url, "Cannot read repository owner from origin URL"),
                }
            }
            let dir = info.top_level.join(".tekton");
            if dir.is_dir() {
                tekton_dir = Some(dir);
            }
        }
        params.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

        Self { params, tekton_dir }
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn tekton_dir(&self) -> Option<&Path> {
        self.tekton_dir.as_deref()
    }

    /// Replace every known `{{ key }}`; unknown keys stay as written.
    pub fn template(&self, text: &str) -> String {
        if self.params.is_empty() {
            return text.to_string();
        }
        PLACEHOLDER
            .replace_all(text, |caps: &Captures| {
                self.params
                    .get(&caps[1])
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    /// Find the PipelineRun called `name` in the templated input, then in
    /// the `.tekton/` directory.
    pub fn select_run(&self, input: &str, name: &str) -> Result<String> {
        let mut found_any = false;
        let mut candidates: Vec<String> = split_documents(input)
            .into_iter()
            .map(str::to_string)
            .collect();
        candidates.extend(self.tekton_documents());

        for doc in candidates {
            let Some(meta) = type_meta(&doc) else {
                continue;
            };
            if meta.kind != "PipelineRun" {
                continue;
            }
            found_any = true;
            if meta.name() == name {
                return Ok(doc);
            }
        }

        if found_any {
            Err(TekError::PipelineRunNotFound(name.to_string()))
        } else {
            Err(TekError::NoPipelineRun)
        }
    }

    fn tekton_documents(&self) -> Vec<String> {
        let Some(dir) = &self.tekton_dir else {
            return Vec::new();
        };
        let mut docs = Vec::new();
        for entry in WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yaml" || e == "yml");
            if !entry.file_type().is_file() || !is_yaml {
                continue;
            }
            match fs::read_to_string(path) {
                Ok(content) => docs.extend(
                    split_documents(&self.template(&content))
                        .into_iter()
                        .map(str::to_string),
                ),
                Err(e) => debug!(path = %path.display(), error = %e, "Skipping unreadable file"),
            }
        }
        docs
    }

    /// Substitute `$(params.<key>)` with PAC values in run params and in
    /// the params and taskRef params of every embedded pipeline task.
    pub fn apply_to_run(&self, run: &mut PipelineRun) {
        if self.params.is_empty() {
            return;
        }
        substitute_strings(&mut run.spec.params, &self.params);
        let Some(spec) = run.spec.pipeline_spec.as_mut() else {
            return;
        };
        for task in spec.tasks.iter_mut().chain(spec.finally.iter_mut()) {
            substitute_task(task, &self.params);
        }
    }
}

fn substitute_task(task: &mut PipelineTask, values: &BTreeMap<String, String>) {
    substitute_strings(&mut task.params, values);
    if let Some(task_ref) = task.task_ref.as_mut() {
        substitute_strings(&mut task_ref.params, values);
    }
}

fn substitute_strings(params: &mut [Param], values: &BTreeMap<String, String>) {
    for param in params {
        if let ParamValue::String(s) = &mut param.value {
            *s = refs::substitute_params(s, values);
        }
    }
}

/// Metadata of the checkout containing `start`, linked worktrees included.
pub fn git_info(start: &Path) -> Option<GitInfo> {
    let repo = match gix::discover(start) {
        Ok(repo) => repo,
        Err(e) => {
            debug!(error = %e, "No git repository");
            return None;
        }
    };
    let top_level = repo.workdir()?.to_path_buf();
    let sha = repo.head_id().ok().map(|id| id.to_string());
    let url = repo.find_remote("origin").ok().and_then(|remote| {
        remote
            .url(gix::remote::Direction::Fetch)
            .map(|url| url.to_bstring().to_string())
    });
    Some(GitInfo {
        top_level,
        sha,
        url,
    })
}

/// Owner and repository name from an https, ssh or scp-style git URL.
pub fn repo_owner_and_name(repo_url: &str) -> Option<(String, String)> {
    let path = match url::Url::parse(repo_url) {
        Ok(parsed) if parsed.has_host() => parsed.path().to_string(),
        // scp form: git@github.com:owner/repo.git
        _ => repo_url.split_once(':')?.1.to_string(),
    };
    let mut segments = path
        .trim_matches('/')
        .trim_end_matches(".git")
        .split('/')
        .filter(|s| !s.is_empty());
    let owner = segments.next()?.to_string();
    let name = segments.next()?.to_string();
    Some((owner, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const RUN: &str = r#"apiVersion: tekton.dev/v1
kind: PipelineRun
metadata:
  name: on-push
spec:
  params:
    - name: revision
      value: "{{ revision }}"
    - name: repo
      value: "{{repo_url}}"
  pipelineRef:
    name: build
"#;

    fn git(dir: &Path, args: &[&str]) -> String {
        let output = std::process::Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .expect("Failed to run git");
        assert!(output.status.success(), "git {:?}: {}", args, String::from_utf8_lossy(&output.stderr));
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    /// A repository with one commit and an `origin` remote; returns the HEAD sha.
    fn init_repo(dir: &Path) -> String {
        git(dir, &["init", "--quiet"]);
        git(dir, &["config", "user.email", "test@test.com"]);
        git(dir, &["config", "user.name", "Test"]);
        git(dir, &["config", "commit.gpgsign", "false"]);
        git(dir, &["remote", "add", "origin", "https://github.com/acme/widgets.git"]);
        fs::write(dir.join("README.md"), "# widgets").unwrap();
        git(dir, &["add", "README.md"]);
        git(dir, &["commit", "--quiet", "-m", "Initial commit"]);
        git(dir, &["rev-parse", "HEAD"])
    }

    #[test]
    fn test_template_known_keys_only() {
        let mut params = BTreeMap::new();
        params.insert("revision".to_string(), "abc".to_string());
        let pac = PacContext::new(params);
        assert_eq!(
            pac.template("{{ revision }} {{revision}} {{ unknown }}"),
            "abc abc {{ unknown }}"
        );
    }

    #[test]
    fn test_repo_owner_and_name() {
        assert_eq!(
            repo_owner_and_name("https://github.com/acme/widgets.git"),
            Some(("acme".to_string(), "widgets".to_string()))
        );
        assert_eq!(
            repo_owner_and_name("git@github.com:acme/widgets.git"),
            Some(("acme".to_string(), "widgets".to_string()))
        );
        assert_eq!(
            repo_owner_and_name("ssh://git@gitlab.com/group/project"),
            Some(("group".to_string(), "project".to_string()))
        );
        assert_eq!(repo_owner_and_name("https://github.com/acme"), None);
    }

    #[test]
    fn test_discover_reads_git_and_overrides_win() {
        let dir = TempDir::new().unwrap();
        let sha = init_repo(dir.path());
        fs::create_dir_all(dir.path().join(".tekton")).unwrap();
        let file = dir.path().join(".tekton/run.yaml");
        fs::write(&file, RUN).unwrap();

        let mut overrides = BTreeMap::new();
        overrides.insert("repo_name".to_string(), "gadgets".to_string());
        let pac = PacContext::discover(&file, &overrides);

        assert_eq!(pac.params()["revision"], sha);
        assert_eq!(pac.params()["repo_url"], "https://github.com/acme/widgets.git");
        assert_eq!(pac.params()["repo_owner"], "acme");
        assert_eq!(pac.params()["repo_name"], "gadgets");
        assert!(pac.tekton_dir().unwrap().ends_with(".tekton"));
    }

    #[test]
    fn test_linked_worktree_has_revision() {
        let dir = TempDir::new().unwrap();
        let sha = init_repo(dir.path());
        git(dir.path(), &["worktree", "add", "--quiet", "-b", "feature", "wt"]);

        let info = git_info(&dir.path().join("wt")).unwrap();
        assert_eq!(info.sha.as_deref(), Some(sha.as_str()));
        assert!(info.top_level.ends_with("wt"));
        assert_eq!(info.url.as_deref(), Some("https://github.com/acme/widgets.git"));
    }

    #[test]
    fn test_detached_head_and_missing_origin() {
        let dir = TempDir::new().unwrap();
        let sha = init_repo(dir.path());
        git(dir.path(), &["remote", "remove", "origin"]);
        git(dir.path(), &["checkout", "--quiet", "--detach"]);

        let info = git_info(dir.path()).unwrap();
        assert_eq!(info.sha, Some(sha));
        assert_eq!(info.url, None);
    }

    #[test]
    fn test_no_repository_means_overrides_only() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("run.yaml");
        fs::write(&file, RUN).unwrap();
        let pac = PacContext::discover(&file, &BTreeMap::new());
        // A temp dir may sit inside a repository; only assert on the file's own tree.
        if git_info(dir.path()).is_none() {
            assert!(pac.params().is_empty());
            assert!(pac.tekton_dir().is_none());
        }
    }

    #[test]
    fn test_select_run_by_name() {
        let pac = PacContext::new(BTreeMap::new());
        let input = format!("{}---\n{}", RUN, RUN.replace("on-push", "on-pr"));
        let doc = pac.select_run(&input, "on-pr").unwrap();
        assert!(doc.contains("name: on-pr"));

        let err = pac.select_run(&input, "nightly").unwrap_err();
        assert_eq!(
            err.to_string(),
            "unable to find \"nightly\" pipelinerun after pac resolution"
        );

        let err = pac
            .select_run("apiVersion: v1\nkind: ConfigMap\n", "on-pr")
            .unwrap_err();
        assert!(matches!(err, TekError::NoPipelineRun));
    }

    #[test]
    fn test_select_run_searches_tekton_dir() {
        let dir = TempDir::new().unwrap();
        let sha = init_repo(dir.path());
        let tekton = dir.path().join(".tekton");
        fs::create_dir_all(&tekton).unwrap();
        fs::write(tekton.join("push.yaml"), RUN).unwrap();
        let elsewhere = dir.path().join("other.yaml");
        fs::write(&elsewhere, RUN.replace("on-push", "local")).unwrap();

        let pac = PacContext::discover(&elsewhere, &BTreeMap::new());
        let doc = pac.select_run(&fs::read_to_string(&elsewhere).unwrap(), "on-push").unwrap();
        assert!(doc.contains(&format!("value: \"{}\"", sha)));
    }

    #[test]
    fn test_apply_to_run_substitutes_param_refs() {
        let mut params = BTreeMap::new();
        params.insert("revision".to_string(), "v1.2".to_string());
        let pac = PacContext::new(params);
        let mut run: PipelineRun = serde_yaml::from_str(
            r#"
apiVersion: tekton.dev/v1
kind: PipelineRun
metadata:
  name: r
spec:
  params:
    - name: rev
      value: $(params.revision)
  pipelineSpec:
    tasks:
      - name: clone
        params:
          - name: ref
            value: $(params.revision)
        taskRef:
          resolver: git
          params:
            - name: revision
              value: $(params.revision)
"#,
        )
        .unwrap();
        pac.apply_to_run(&mut run);

        assert_eq!(run.spec.params[0].value.as_str(), Some("v1.2"));
        let task = &run.spec.pipeline_spec.as_ref().unwrap().tasks[0];
        assert_eq!(task.params[0].value.as_str(), Some("v1.2"));
        assert_eq!(task.task_ref.as_ref().unwrap().params[0].value.as_str(), Some("v1.2"));
    }
}
