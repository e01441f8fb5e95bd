// src/rules/body.rs

//! Placeholder substitution for rule bodies.
//!
//! Supported placeholders:
//! `{input}`, `{input[i]}`, `{output}`, `{output[i]}`, `{log}`, `{log[i]}`,
//! `{wildcards.NAME}`, `{params.NAME}`, `{resources.cpu|mem_mb|gpu}`,
//! `{threads}`. `{{` and `}}` produce literal braces.

use std::collections::BTreeMap;

use crate::errors::CompileError;
use crate::rules::handle::FileHandle;
use crate::types::{ParamValue, ResourceRequest};

/// Values available to a body template.
#[derive(Debug, Clone, Copy)]
pub struct BodyContext<'a> {
    pub rule: &'a str,
    pub inputs: &'a [FileHandle],
    pub outputs: &'a [FileHandle],
    pub logs: &'a [FileHandle],
    pub wildcards: &'a BTreeMap<String, String>,
    pub params: &'a BTreeMap<String, ParamValue>,
    pub resources: ResourceRequest,
}

/// Substitute every placeholder in `template`.
pub fn render_body(template: &str, ctx: &BodyContext<'_>) -> Result<String, CompileError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
        } else if tail.starts_with('}') {
            return Err(invalid(ctx, template, "unmatched '}'"));
        } else {
            let end = tail
                .find('}')
                .ok_or_else(|| invalid(ctx, template, "unterminated '{'"))?;
            let key = tail[1..end].trim();
            out.push_str(&lookup(key, ctx, template)?);
            rest = &tail[end + 1..];
        }
    }

    out.push_str(rest);
    Ok(out)
}

fn lookup(key: &str, ctx: &BodyContext<'_>, template: &str) -> Result<String, CompileError> {
    if let Some(name) = key.strip_prefix("wildcards.") {
        return ctx.wildcards.get(name).cloned().ok_or_else(|| {
            CompileError::UnresolvedWildcards {
                rule: ctx.rule.to_string(),
                detail: format!("body references unknown wildcard '{name}'"),
            }
        });
    }

    if let Some(name) = key.strip_prefix("params.") {
        return ctx
            .params
            .get(name)
            .map(|v| v.to_string())
            .ok_or_else(|| CompileError::MissingParameter {
                name: name.to_string(),
                referenced_by: format!("rule {}", ctx.rule),
            });
    }

    if let Some(field) = key.strip_prefix("resources.") {
        return match field {
            "cpu" => Ok(ctx.resources.cpu.to_string()),
            "mem_mb" => Ok(ctx.resources.mem_mb.to_string()),
            "gpu" => Ok(ctx.resources.gpu.to_string()),
            other => Err(invalid(ctx, template, &format!("unknown resource '{other}'"))),
        };
    }

    if key == "threads" {
        return Ok(ctx.resources.cpu.to_string());
    }

    let (base, index) = match key.split_once('[') {
        Some((base, idx)) => {
            let idx = idx
                .strip_suffix(']')
                .and_then(|i| i.trim().parse::<usize>().ok())
                .ok_or_else(|| invalid(ctx, template, &format!("bad index in '{{{key}}}'")))?;
            (base.trim(), Some(idx))
        }
        None => (key, None),
    };

    let handles = match base {
        "input" => ctx.inputs,
        "output" => ctx.outputs,
        "log" => ctx.logs,
        other => {
            return Err(invalid(ctx, template, &format!("unknown placeholder '{{{other}}}'")));
        }
    };

    match index {
        None => Ok(handles
            .iter()
            .map(|h| h.as_str())
            .collect::<Vec<_>>()
            .join(" ")),
        Some(i) => handles.get(i).map(|h| h.as_str().to_string()).ok_or_else(|| {
            invalid(
                ctx,
                template,
                &format!("{base}[{i}] out of range ({} declared)", handles.len()),
            )
        }),
    }
}

fn invalid(ctx: &BodyContext<'_>, template: &str, detail: &str) -> CompileError {
    CompileError::InvalidPattern {
        rule: ctx.rule.to_string(),
        pattern: template.to_string(),
        detail: detail.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(
        inputs: &'a [FileHandle],
        outputs: &'a [FileHandle],
        wildcards: &'a BTreeMap<String, String>,
        params: &'a BTreeMap<String, ParamValue>,
    ) -> BodyContext<'a> {
        BodyContext {
            rule: "align",
            inputs,
            outputs,
            logs: &[],
            wildcards,
            params,
            resources: ResourceRequest::default(),
        }
    }

    #[test]
    fn substitutes_lists_indices_and_wildcards() {
        let inputs = vec![FileHandle::file("a.fq"), FileHandle::file("ref.fa")];
        let outputs = vec![FileHandle::file("a.bam")];
        let mut wc = BTreeMap::new();
        wc.insert("sample".to_string(), "a".to_string());
        let params = BTreeMap::new();
        let c = ctx(&inputs, &outputs, &wc, &params);

        let body = render_body(
            "bwa {input[1]} {input} > {output} # {wildcards.sample} t={threads}",
            &c,
        )
        .unwrap();
        assert_eq!(body, "bwa ref.fa a.fq ref.fa > a.bam # a t=1");
    }

    #[test]
    fn escapes_and_params() {
        let mut params = BTreeMap::new();
        params.insert("depth".to_string(), ParamValue::Int(30));
        let wc = BTreeMap::new();
        let c = ctx(&[], &[], &wc, &params);
        let body = render_body("awk '{{print $1}}' --depth {params.depth}", &c).unwrap();
        assert_eq!(body, "awk '{print $1}' --depth 30");
    }

    #[test]
    fn missing_param_and_bad_index_fail() {
        let wc = BTreeMap::new();
        let params = BTreeMap::new();
        let c = ctx(&[], &[], &wc, &params);
        assert!(matches!(
            render_body("{params.nope}", &c),
            Err(CompileError::MissingParameter { .. })
        ));
        assert!(matches!(
            render_body("{input[3]}", &c),
            Err(CompileError::InvalidPattern { .. })
        ));
    }
}
