#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use ruledag::config::{WorkflowDefinition, parse_str};
use ruledag::rules::{FileHandle, Job, JobBody, JobDag};
use ruledag::types::ResourceRequest;

/// Builder for rule-definition TOML to simplify test setup.
///
/// Sections are emitted in a fixed order, so the same calls always yield the
/// same document.
pub struct WorkflowBuilder {
    name: String,
    version: String,
    targets: Vec<String>,
    config: Vec<(String, String)>,
    poll: Vec<(String, String)>,
    retry: Vec<(String, String)>,
    params: Vec<(String, ParamBuilder)>,
    wildcards: Vec<(String, String)>,
    rules: Vec<(String, RuleBuilder)>,
}

impl WorkflowBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            targets: vec![],
            config: vec![],
            poll: vec![],
            retry: vec![],
            params: vec![],
            wildcards: vec![],
            rules: vec![],
        }
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn target(mut self, target: &str) -> Self {
        self.targets.push(target.to_string());
        self
    }

    /// Raw `[config]` entry; `value` is a TOML literal.
    pub fn config(mut self, key: &str, value: &str) -> Self {
        self.config.push((key.to_string(), value.to_string()));
        self
    }

    pub fn owner(self, owner: &str) -> Self {
        let value = quote(owner);
        self.config("owner", &value)
    }

    pub fn reuse_existing_versions(self) -> Self {
        self.config("on_existing_version", "\"reuse\"")
    }

    /// Fast `[config.poll]` for tests: `max_attempts` lookups, 1ms apart.
    pub fn poll_attempts(mut self, max_attempts: u32) -> Self {
        self.poll = fast_backoff(max_attempts);
        self
    }

    /// Fast `[config.retry]` for tests.
    pub fn retry_attempts(mut self, max_attempts: u32) -> Self {
        self.retry = fast_backoff(max_attempts);
        self
    }

    pub fn param(mut self, name: &str, param: ParamBuilder) -> Self {
        self.params.push((name.to_string(), param));
        self
    }

    pub fn wildcard_values(mut self, name: &str, values: &[&str]) -> Self {
        let list = values.iter().map(|v| quote(v)).collect::<Vec<_>>().join(", ");
        self.wildcards
            .push((name.to_string(), format!("values = [{list}]")));
        self
    }

    pub fn wildcard_param(mut self, name: &str, param: &str) -> Self {
        self.wildcards
            .push((name.to_string(), format!("param = {}", quote(param))));
        self
    }

    pub fn wildcard_glob(mut self, name: &str, glob: &str) -> Self {
        self.wildcards
            .push((name.to_string(), format!("glob = {}", quote(glob))));
        self
    }

    pub fn rule(mut self, name: &str, rule: RuleBuilder) -> Self {
        self.rules.push((name.to_string(), rule));
        self
    }

    pub fn to_toml(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "[workflow]");
        let _ = writeln!(out, "name = {}", quote(&self.name));
        let _ = writeln!(out, "version = {}", quote(&self.version));
        if !self.targets.is_empty() {
            let _ = writeln!(out, "targets = {}", quote_list(&self.targets));
        }

        if !self.config.is_empty() || !self.poll.is_empty() || !self.retry.is_empty() {
            let _ = writeln!(out, "\n[config]");
            for (key, value) in &self.config {
                let _ = writeln!(out, "{key} = {value}");
            }
            for (section, entries) in [("poll", &self.poll), ("retry", &self.retry)] {
                if entries.is_empty() {
                    continue;
                }
                let _ = writeln!(out, "\n[config.{section}]");
                for (key, value) in entries {
                    let _ = writeln!(out, "{key} = {value}");
                }
            }
        }

        for (name, param) in &self.params {
            let _ = writeln!(out, "\n[params.{name}]");
            out.push_str(&param.to_toml());
        }

        for (name, body) in &self.wildcards {
            let _ = writeln!(out, "\n[wildcards.{name}]");
            let _ = writeln!(out, "{body}");
        }

        for (name, rule) in &self.rules {
            let _ = writeln!(out, "\n[rule.{name}]");
            out.push_str(&rule.to_toml());
        }
        out
    }

    pub fn build(self) -> WorkflowDefinition {
        parse_str(&self.to_toml()).expect("Failed to build valid workflow from builder")
    }
}

/// Builder for a `[params.<name>]` section.
pub struct ParamBuilder {
    kind: String,
    list: bool,
    path: Option<String>,
    default: Option<String>,
}

impl ParamBuilder {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            list: false,
            path: None,
            default: None,
        }
    }

    pub fn file(path: &str) -> Self {
        Self::new("file").path(path)
    }

    pub fn directory(path: &str) -> Self {
        Self::new("directory").path(path)
    }

    pub fn list(mut self) -> Self {
        self.list = true;
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }

    /// `value` is a TOML literal, e.g. `"\"a\""` or `"[1, 2]"`.
    pub fn default_value(mut self, value: &str) -> Self {
        self.default = Some(value.to_string());
        self
    }

    fn to_toml(&self) -> String {
        let mut out = format!("type = {}\n", quote(&self.kind));
        if self.list {
            out.push_str("list = true\n");
        }
        if let Some(path) = &self.path {
            let _ = writeln!(out, "path = {}", quote(path));
        }
        if let Some(default) = &self.default {
            let _ = writeln!(out, "default = {default}");
        }
        out
    }
}

/// Builder for a `[rule.<name>]` section.
#[derive(Default)]
pub struct RuleBuilder {
    input: Vec<String>,
    output: Vec<String>,
    log: Vec<String>,
    shell: Option<String>,
    script: Option<String>,
    resources: Option<(u32, u64, u32)>,
    constraints: Vec<(String, String)>,
}

impl RuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shell(cmd: &str) -> Self {
        Self {
            shell: Some(cmd.to_string()),
            ..Self::default()
        }
    }

    pub fn script(path: &str) -> Self {
        Self {
            script: Some(path.to_string()),
            ..Self::default()
        }
    }

    pub fn input(mut self, pattern: &str) -> Self {
        self.input.push(quote(pattern));
        self
    }

    pub fn output(mut self, pattern: &str) -> Self {
        self.output.push(quote(pattern));
        self
    }

    pub fn output_dir(mut self, pattern: &str) -> Self {
        self.output
            .push(format!("{{ path = {}, directory = true }}", quote(pattern)));
        self
    }

    pub fn log(mut self, pattern: &str) -> Self {
        self.log.push(quote(pattern));
        self
    }

    pub fn resources(mut self, cpu: u32, mem_mb: u64, gpu: u32) -> Self {
        self.resources = Some((cpu, mem_mb, gpu));
        self
    }

    pub fn constraint(mut self, wildcard: &str, regex: &str) -> Self {
        self.constraints.push((wildcard.to_string(), regex.to_string()));
        self
    }

    fn to_toml(&self) -> String {
        let mut out = String::new();
        for (key, items) in [("input", &self.input), ("output", &self.output), ("log", &self.log)] {
            if !items.is_empty() {
                let _ = writeln!(out, "{key} = [{}]", items.join(", "));
            }
        }
        if let Some(shell) = &self.shell {
            let _ = writeln!(out, "shell = {}", quote(shell));
        }
        if let Some(script) = &self.script {
            let _ = writeln!(out, "script = {}", quote(script));
        }
        if let Some((cpu, mem_mb, gpu)) = self.resources {
            let _ = writeln!(
                out,
                "resources = {{ cpu = {cpu}, mem_mb = {mem_mb}, gpu = {gpu} }}"
            );
        }
        if !self.constraints.is_empty() {
            let pairs = self
                .constraints
                .iter()
                .map(|(k, v)| format!("{k} = {}", quote(v)))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(out, "wildcard_constraints = {{ {pairs} }}");
        }
        out
    }
}

fn fast_backoff(max_attempts: u32) -> Vec<(String, String)> {
    vec![
        ("max_attempts".to_string(), max_attempts.to_string()),
        ("initial_delay_ms".to_string(), "1".to_string()),
        ("max_delay_ms".to_string(), "2".to_string()),
        ("factor".to_string(), "2.0".to_string()),
    ]
}

/// TOML basic string.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn quote_list(items: &[String]) -> String {
    let quoted = items.iter().map(|s| quote(s)).collect::<Vec<_>>().join(", ");
    format!("[{quoted}]")
}

/// Builder for a concrete `Job`, bypassing rule extraction.
///
/// Useful for handing the compiler DAGs that extraction would never build,
/// such as two jobs writing the same file.
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new(rule: &str) -> Self {
        Self {
            job: Job {
                id: 0,
                rule: rule.to_string(),
                wildcards: BTreeMap::new(),
                inputs: vec![],
                outputs: vec![],
                logs: vec![],
                resources: ResourceRequest::default(),
                body: JobBody::Shell(format!("run {rule}")),
                upstream: BTreeSet::new(),
            },
        }
    }

    pub fn input(mut self, path: &str) -> Self {
        self.job.inputs.push(FileHandle::file(path));
        self
    }

    pub fn output(mut self, path: &str) -> Self {
        self.job.outputs.push(FileHandle::file(path));
        self
    }

    pub fn output_dir(mut self, path: &str) -> Self {
        self.job.outputs.push(FileHandle::dir(path));
        self
    }

    pub fn log(mut self, path: &str) -> Self {
        self.job.logs.push(FileHandle::file(path));
        self
    }

    pub fn wildcard(mut self, name: &str, value: &str) -> Self {
        self.job.wildcards.insert(name.to_string(), value.to_string());
        self
    }

    pub fn shell(mut self, cmd: &str) -> Self {
        self.job.body = JobBody::Shell(cmd.to_string());
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

/// Build a `JobDag` from jobs and target paths.
pub fn job_dag(jobs: Vec<Job>, targets: &[&str]) -> JobDag {
    let targets = targets.iter().map(|t| FileHandle::file(t)).collect();
    JobDag::new(jobs, targets).expect("jobs must form a DAG")
}
