// src/rules/rule.rs

//! Compiled rule definitions.

use crate::config::model::{PathSpec, RuleConfig};
use crate::errors::CompileError;
use crate::rules::pattern::WildcardPattern;
use crate::types::ResourceRequest;

/// Body of a rule before wildcard substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleBody {
    Shell(String),
    Script(String),
}

/// A rule with its path patterns compiled.
#[derive(Debug, Clone)]
pub struct Rule {
    name: String,
    inputs: Vec<WildcardPattern>,
    outputs: Vec<WildcardPattern>,
    logs: Vec<WildcardPattern>,
    body: RuleBody,
    resources: ResourceRequest,
}

impl Rule {
    /// Compile a `[rule.<name>]` section.
    pub fn compile(name: &str, cfg: &RuleConfig) -> Result<Self, CompileError> {
        let body = match (&cfg.shell, &cfg.script) {
            (Some(cmd), None) => RuleBody::Shell(cmd.clone()),
            (None, Some(script)) => RuleBody::Script(script.clone()),
            (Some(_), Some(_)) => {
                return Err(CompileError::InvalidPattern {
                    rule: name.to_string(),
                    pattern: "shell/script".to_string(),
                    detail: "a rule declares either `shell` or `script`, not both".to_string(),
                });
            }
            (None, None) => RuleBody::Shell(String::new()),
        };

        let compile_all = |specs: &[PathSpec]| -> Result<Vec<WildcardPattern>, CompileError> {
            specs
                .iter()
                .map(|spec| compile_spec(name, spec, cfg))
                .collect()
        };

        Ok(Self {
            name: name.to_string(),
            inputs: compile_all(&cfg.input)?,
            outputs: compile_all(&cfg.output)?,
            logs: compile_all(&cfg.log)?,
            body,
            resources: cfg.resources,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[WildcardPattern] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[WildcardPattern] {
        &self.outputs
    }

    pub fn logs(&self) -> &[WildcardPattern] {
        &self.logs
    }

    pub fn body(&self) -> &RuleBody {
        &self.body
    }

    pub fn resources(&self) -> ResourceRequest {
        self.resources
    }

    /// Whether the rule produces anything a target could depend on.
    pub fn has_products(&self) -> bool {
        !self.outputs.is_empty() || !self.logs.is_empty()
    }

    /// Outputs and logs, in declaration order.
    pub fn products(&self) -> impl Iterator<Item = &WildcardPattern> {
        self.outputs.iter().chain(self.logs.iter())
    }
}

fn compile_spec(
    rule: &str,
    spec: &PathSpec,
    cfg: &RuleConfig,
) -> Result<WildcardPattern, CompileError> {
    let raw = if spec.is_dir() && !spec.path().ends_with('/') {
        format!("{}/", spec.path())
    } else {
        spec.path().to_string()
    };
    WildcardPattern::parse(&raw, &cfg.wildcard_constraints).map_err(|detail| {
        CompileError::InvalidPattern {
            rule: rule.to_string(),
            pattern: spec.path().to_string(),
            detail,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_flag_survives_compilation() {
        let cfg = RuleConfig {
            output: vec![PathSpec::Detailed {
                path: "index".to_string(),
                directory: true,
            }],
            shell: Some("mkdir -p {output}".to_string()),
            ..RuleConfig::default()
        };
        let rule = Rule::compile("index", &cfg).unwrap();
        assert!(rule.outputs()[0].is_dir());
    }

    #[test]
    fn shell_and_script_are_exclusive() {
        let cfg = RuleConfig {
            shell: Some("true".to_string()),
            script: Some("x.py".to_string()),
            ..RuleConfig::default()
        };
        let err = Rule::compile("both", &cfg).unwrap_err();
        assert!(matches!(err, CompileError::InvalidPattern { .. }));
    }
}
