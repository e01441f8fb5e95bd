// src/rules/extract.rs

//! Rule graph extraction: targets -> jobs -> [`JobDag`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use tracing::{debug, info};

use crate::config::model::WorkflowDefinition;
use crate::errors::CompileError;
use crate::fs::FileSystem;
use crate::rules::body::{BodyContext, render_body};
use crate::rules::dag::JobDag;
use crate::rules::handle::FileHandle;
use crate::rules::job::{Job, JobBody};
use crate::rules::pattern::WildcardPattern;
use crate::rules::rule::{Rule, RuleBody};
use crate::rules::targets::{TargetExpander, TargetSelection};
use crate::types::ParamValue;

/// Deepest chain of producers followed from a target before giving up.
pub const MAX_RESOLUTION_DEPTH: usize = 256;

/// Builds the job DAG for one compilation pass.
///
/// Holds no state between calls to [`Extractor::extract`]; every call starts
/// from an empty job set.
pub struct Extractor<'a> {
    def: &'a WorkflowDefinition,
    fs: &'a dyn FileSystem,
    values: BTreeMap<String, ParamValue>,
}

impl<'a> Extractor<'a> {
    /// `concrete` holds launch-time parameter values; declared defaults fill
    /// the rest.
    pub fn new(
        def: &'a WorkflowDefinition,
        fs: &'a dyn FileSystem,
        concrete: &BTreeMap<String, ParamValue>,
    ) -> Self {
        Self {
            def,
            fs,
            values: def.effective_values(concrete),
        }
    }

    /// Parameter values in effect for this extraction.
    pub fn values(&self) -> &BTreeMap<String, ParamValue> {
        &self.values
    }

    pub fn extract(&self, selection: &TargetSelection) -> Result<JobDag, CompileError> {
        let raw = selection.raw(self.def);
        let targets = TargetExpander::new(self.def, self.fs, &self.values).expand(raw)?;

        info!(
            workflow = self.def.name(),
            targets = targets.len(),
            "extracting job DAG"
        );

        let mut state = Resolution::default();
        for target in &targets {
            self.resolve(target, 0, &mut state)?;
        }

        info!(jobs = state.jobs.len(), "extracted jobs");
        JobDag::new(state.jobs, targets)
    }

    fn resolve(
        &self,
        handle: &FileHandle,
        depth: usize,
        state: &mut Resolution,
    ) -> Result<(), CompileError> {
        if !state.seen.insert(handle.clone()) {
            return Ok(());
        }

        let Some((rule, wildcards)) = self.find_producer(handle)? else {
            debug!(path = %handle, "leaf input");
            return Ok(());
        };

        if depth >= MAX_RESOLUTION_DEPTH {
            return Err(CompileError::ResolutionDepthExceeded {
                rule: rule.name().to_string(),
                path: PathBuf::from(handle.as_str()),
                depth,
            });
        }

        let key = (rule.name().to_string(), wildcards.clone());
        if state.instantiated.contains_key(&key) {
            return Ok(());
        }

        let job = self.instantiate(rule, wildcards)?;
        debug!(job = %job.label(), inputs = job.inputs.len(), "instantiated job");
        let inputs = job.inputs.clone();
        state.instantiated.insert(key, state.jobs.len());
        state.jobs.push(job);

        for input in &inputs {
            self.resolve(input, depth + 1, state)?;
        }
        Ok(())
    }

    /// The single rule whose outputs or logs match `handle`, if any.
    fn find_producer(
        &self,
        handle: &FileHandle,
    ) -> Result<Option<(&'a Rule, BTreeMap<String, String>)>, CompileError> {
        let mut matches: Vec<(&'a Rule, BTreeMap<String, String>)> = Vec::new();
        for rule in self.def.rules() {
            if let Some(wildcards) = rule.products().find_map(|p| p.matches(handle.as_str())) {
                matches.push((rule, wildcards));
            }
        }

        if matches.len() > 1 {
            return Err(CompileError::AmbiguousProducer {
                path: PathBuf::from(handle.as_str()),
                producers: matches.iter().map(|(r, _)| r.name().to_string()).collect(),
            });
        }
        Ok(matches.pop())
    }

    fn instantiate(
        &self,
        rule: &Rule,
        wildcards: BTreeMap<String, String>,
    ) -> Result<Job, CompileError> {
        let inputs = concretize(rule, rule.inputs(), &wildcards)?;
        let outputs = concretize(rule, rule.outputs(), &wildcards)?;
        let logs = concretize(rule, rule.logs(), &wildcards)?;

        let ctx = BodyContext {
            rule: rule.name(),
            inputs: &inputs,
            outputs: &outputs,
            logs: &logs,
            wildcards: &wildcards,
            params: &self.values,
            resources: rule.resources(),
        };
        let body = match rule.body() {
            RuleBody::Shell(cmd) => JobBody::Shell(render_body(cmd, &ctx)?),
            RuleBody::Script(path) => JobBody::Script(render_body(path, &ctx)?),
        };

        Ok(Job {
            id: 0,
            rule: rule.name().to_string(),
            wildcards,
            inputs,
            outputs,
            logs,
            resources: rule.resources(),
            body,
            upstream: Default::default(),
        })
    }
}

#[derive(Default)]
struct Resolution {
    jobs: Vec<Job>,
    instantiated: HashMap<(String, BTreeMap<String, String>), usize>,
    seen: HashSet<FileHandle>,
}

fn concretize(
    rule: &Rule,
    patterns: &[WildcardPattern],
    wildcards: &BTreeMap<String, String>,
) -> Result<Vec<FileHandle>, CompileError> {
    patterns
        .iter()
        .map(|pattern| {
            pattern
                .substitute(wildcards)
                .map(|path| FileHandle::new(path, pattern.is_dir()))
                .map_err(|missing| CompileError::UnresolvedWildcards {
                    rule: rule.name().to_string(),
                    detail: format!(
                        "'{}' uses {} which the matched output does not bind",
                        pattern.raw(),
                        missing.join(", ")
                    ),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_str;
    use crate::fs::mock::MockFileSystem;

    const TOML: &str = r#"
[workflow]
name = "demo"
targets = ["final/{sample}.txt"]

[wildcards.sample]
values = ["a", "b"]

[rule.prep]
input = ["raw/{sample}.txt"]
output = ["mid/{sample}.txt"]
shell = "cp {input} {output}"

[rule.finish]
input = ["mid/{sample}.txt"]
output = ["final/{sample}.txt"]
log = ["logs/{sample}.log"]
shell = "tr a-z A-Z < {input} > {output} 2> {log}"
"#;

    #[test]
    fn expands_wildcards_and_links_jobs() {
        let def = parse_str(TOML).unwrap();
        let fs = MockFileSystem::new();
        let dag = Extractor::new(&def, &fs, &BTreeMap::new())
            .extract(&TargetSelection::Default)
            .unwrap();

        assert_eq!(dag.len(), 4);
        assert_eq!(dag.targets().len(), 2);
        for job in dag.jobs().iter().filter(|j| j.rule == "finish") {
            let ups = dag.dependencies_of(job.id).unwrap();
            assert_eq!(ups.len(), 1);
            let up = dag.job(*ups.iter().next().unwrap()).unwrap();
            assert_eq!(up.rule, "prep");
            assert_eq!(up.wildcards, job.wildcards);
        }
        let finish_a = dag
            .jobs()
            .iter()
            .find(|j| j.rule == "finish" && j.wildcards["sample"] == "a")
            .unwrap();
        assert_eq!(
            finish_a.body,
            JobBody::Shell("tr a-z A-Z < mid/a.txt > final/a.txt 2> logs/a.log".to_string())
        );
    }

    #[test]
    fn unbound_input_wildcard_is_an_error() {
        let def = parse_str(
            r#"
[workflow]
name = "bad"
targets = ["out.txt"]

[rule.x]
input = ["in/{what}.txt"]
output = ["out.txt"]
shell = "cat {input} > {output}"
"#,
        )
        .unwrap();
        let fs = MockFileSystem::new();
        let err = Extractor::new(&def, &fs, &BTreeMap::new())
            .extract(&TargetSelection::Default)
            .unwrap_err();
        match err {
            CompileError::UnresolvedWildcards { rule, .. } => assert_eq!(rule, "x"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn runaway_wildcard_recursion_is_bounded() {
        let def = parse_str(
            r#"
[workflow]
name = "grow"
targets = ["x"]

[rule.grow]
input = ["{n}.1"]
output = ["{n}"]
shell = "cp {input} {output}"
"#,
        )
        .unwrap();
        let fs = MockFileSystem::new();
        let err = Extractor::new(&def, &fs, &BTreeMap::new())
            .extract(&TargetSelection::Default)
            .unwrap_err();
        assert!(matches!(err, CompileError::ResolutionDepthExceeded { .. }));
    }

    #[test]
    fn no_targets_is_an_error() {
        let def = parse_str(
            r#"
[workflow]
name = "empty"

[rule.x]
output = ["out.txt"]
shell = "touch {output}"
"#,
        )
        .unwrap();
        let fs = MockFileSystem::new();
        let err = Extractor::new(&def, &fs, &BTreeMap::new())
            .extract(&TargetSelection::Default)
            .unwrap_err();
        assert_eq!(err, CompileError::NoTargets);
    }

    #[test]
    fn glob_discovers_wildcard_values() {
        let def = parse_str(
            r#"
[workflow]
name = "glob"
targets = ["out/{s}.txt"]

[wildcards.s]
glob = "data/{s}.fq"

[rule.copy]
input = ["data/{s}.fq"]
output = ["out/{s}.txt"]
shell = "cp {input} {output}"
"#,
        )
        .unwrap();
        let fs = MockFileSystem::new();
        fs.add_file("data/x.fq", "");
        fs.add_file("data/y.fq", "");
        fs.add_file("data/notes.md", "");

        let dag = Extractor::new(&def, &fs, &BTreeMap::new())
            .extract(&TargetSelection::Default)
            .unwrap();
        let targets: Vec<&str> = dag.targets().iter().map(|t| t.as_str()).collect();
        assert_eq!(targets, vec!["out/x.txt", "out/y.txt"]);
    }
}
