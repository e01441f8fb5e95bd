// src/config/validate.rs

use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow};

use crate::config::model::{
    BackoffConfig, ParamDecl, RawWorkflowFile, WildcardConfig, WildcardSource, WorkflowDefinition,
};
use crate::rules::Rule;
use crate::types::ParamType;

/// Semantic validation of a raw workflow file.
///
/// This checks:
/// - `[workflow].name` and `version` are non-empty
/// - there is at least one rule
/// - every rule with outputs declares `shell` or `script` (never both)
/// - every path pattern compiles
/// - `[params]`: `file`/`directory` scalars declare `path`, lists do not
/// - `[wildcards]`: exactly one source each, `param` sources are declared
/// - `[config]`: `timeout_secs >= 1`, backoff `max_attempts >= 1` and `factor >= 1.0`
///
/// It does **not** check that targets resolve or that the rule graph is
/// acyclic; both depend on the target selection and are compile errors.
impl TryFrom<RawWorkflowFile> for WorkflowDefinition {
    type Error = anyhow::Error;

    fn try_from(raw: RawWorkflowFile) -> Result<Self> {
        validate_workflow_section(&raw)?;
        validate_global_config(&raw)?;
        let params = validate_params(&raw)?;
        let wildcards = validate_wildcards(&raw, &params)?;
        let rules = compile_rules(&raw)?;

        Ok(WorkflowDefinition::new_unchecked(
            raw.workflow,
            raw.config,
            params,
            wildcards,
            rules,
        ))
    }
}

fn validate_workflow_section(raw: &RawWorkflowFile) -> Result<()> {
    if raw.workflow.name.trim().is_empty() {
        return Err(anyhow!("[workflow].name must not be empty"));
    }
    if raw.workflow.version.trim().is_empty() {
        return Err(anyhow!("[workflow].version must not be empty"));
    }
    if raw.rule.is_empty() {
        return Err(anyhow!(
            "workflow must contain at least one [rule.<name>] section"
        ));
    }
    Ok(())
}

fn validate_global_config(raw: &RawWorkflowFile) -> Result<()> {
    if raw.config.timeout_secs == 0 {
        return Err(anyhow!("[config].timeout_secs must be >= 1 (got 0)"));
    }
    validate_backoff(&raw.config.poll).context("invalid [config.poll]")?;
    validate_backoff(&raw.config.retry).context("invalid [config.retry]")?;
    Ok(())
}

fn validate_backoff(cfg: &BackoffConfig) -> Result<()> {
    if cfg.max_attempts == 0 {
        return Err(anyhow!("max_attempts must be >= 1 (got 0)"));
    }
    if !cfg.factor.is_finite() || cfg.factor < 1.0 {
        return Err(anyhow!("factor must be >= 1.0 (got {})", cfg.factor));
    }
    if cfg.initial_delay_ms > cfg.max_delay_ms {
        return Err(anyhow!(
            "initial_delay_ms ({}) exceeds max_delay_ms ({})",
            cfg.initial_delay_ms,
            cfg.max_delay_ms
        ));
    }
    Ok(())
}

fn validate_params(raw: &RawWorkflowFile) -> Result<BTreeMap<String, ParamDecl>> {
    let mut params = BTreeMap::new();
    for (name, cfg) in &raw.params {
        if cfg.kind.is_path() && !cfg.list && cfg.path.is_none() {
            return Err(anyhow!(
                "parameter '{}' of type {:?} must declare `path`",
                name,
                cfg.kind
            ));
        }
        if cfg.list && cfg.path.is_some() {
            return Err(anyhow!(
                "list parameter '{}' cannot declare `path`",
                name
            ));
        }
        if !cfg.kind.is_path() && cfg.path.is_some() {
            return Err(anyhow!(
                "parameter '{}' declares `path` but is not a file or directory",
                name
            ));
        }

        let decl = ParamDecl {
            name: name.clone(),
            ty: ParamType::from_kind(cfg.kind, cfg.list),
            path: cfg.path.clone(),
            default: cfg.default.clone(),
            description: cfg.description.clone(),
        };
        if let Some(default) = &decl.default {
            decl.check_value(default)
                .map_err(|e| anyhow!(e))
                .with_context(|| format!("invalid default for parameter '{name}'"))?;
        }
        params.insert(name.clone(), decl);
    }
    Ok(params)
}

fn validate_wildcards(
    raw: &RawWorkflowFile,
    params: &BTreeMap<String, ParamDecl>,
) -> Result<BTreeMap<String, WildcardSource>> {
    let mut wildcards = BTreeMap::new();
    for (name, cfg) in &raw.wildcards {
        let source = wildcard_source(name, cfg)?;
        if let WildcardSource::Param(param) = &source {
            match params.get(param) {
                None => {
                    return Err(anyhow!(
                        "wildcard '{}' refers to unknown parameter '{}'",
                        name,
                        param
                    ));
                }
                Some(decl) if !matches!(decl.ty, ParamType::List(_)) => {
                    return Err(anyhow!(
                        "wildcard '{}' takes its values from parameter '{}', which is not a list (type {})",
                        name,
                        param,
                        decl.ty
                    ));
                }
                Some(_) => {}
            }
        }
        wildcards.insert(name.clone(), source);
    }
    Ok(wildcards)
}

fn wildcard_source(name: &str, cfg: &WildcardConfig) -> Result<WildcardSource> {
    match (&cfg.values, &cfg.param, &cfg.glob) {
        (Some(values), None, None) => Ok(WildcardSource::Values(values.clone())),
        (None, Some(param), None) => Ok(WildcardSource::Param(param.clone())),
        (None, None, Some(glob)) => Ok(WildcardSource::Glob(glob.clone())),
        _ => Err(anyhow!(
            "wildcard '{}' must set exactly one of `values`, `param` or `glob`",
            name
        )),
    }
}

fn compile_rules(raw: &RawWorkflowFile) -> Result<Vec<Rule>> {
    let mut rules = Vec::with_capacity(raw.rule.len());
    for (name, cfg) in &raw.rule {
        let rule = Rule::compile(name, cfg).with_context(|| format!("invalid rule '{name}'"))?;
        if rule.has_products() && cfg.shell.is_none() && cfg.script.is_none() {
            return Err(anyhow!(
                "rule '{}' declares outputs but neither `shell` nor `script`",
                name
            ));
        }
        rules.push(rule);
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use crate::config::parse_str;

    fn err_of(toml: &str) -> String {
        format!("{:#}", parse_str(toml).unwrap_err())
    }

    #[test]
    fn rejects_missing_rules() {
        let msg = err_of("[workflow]\nname = \"x\"\n");
        assert!(msg.contains("at least one [rule.<name>]"), "{msg}");
    }

    #[test]
    fn file_params_need_a_path() {
        let msg = err_of(
            r#"
[workflow]
name = "x"
[params.genome]
type = "file"
[rule.a]
output = ["o"]
shell = "touch {output}"
"#,
        );
        assert!(msg.contains("must declare `path`"), "{msg}");
    }

    #[test]
    fn wildcard_needs_exactly_one_source() {
        let msg = err_of(
            r#"
[workflow]
name = "x"
[wildcards.s]
values = ["a"]
glob = "data/{s}.txt"
[rule.a]
output = ["o"]
shell = "touch {output}"
"#,
        );
        assert!(msg.contains("exactly one of"), "{msg}");
    }

    #[test]
    fn outputs_need_a_body() {
        let msg = err_of(
            r#"
[workflow]
name = "x"
[rule.a]
output = ["o"]
"#,
        );
        assert!(msg.contains("neither `shell` nor `script`"), "{msg}");
    }

    #[test]
    fn backoff_factor_must_not_shrink() {
        let msg = err_of(
            r#"
[workflow]
name = "x"
[config.poll]
factor = 0.5
[rule.a]
output = ["o"]
shell = "touch {output}"
"#,
        );
        assert!(msg.contains("[config.poll]"), "{msg}");
        assert!(msg.contains("factor must be >= 1.0"), "{msg}");
    }

    #[test]
    fn default_must_match_declared_type() {
        let msg = err_of(
            r#"
[workflow]
name = "x"
[params.depth]
type = "integer"
default = "deep"
[rule.a]
output = ["o"]
shell = "touch {output}"
"#,
        );
        assert!(msg.contains("invalid default for parameter 'depth'"), "{msg}");
    }
}
