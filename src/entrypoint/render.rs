// src/entrypoint/render.rs

//! Text rendering of entrypoints.
//!
//! Kept apart from [`generate`](super::generate): the graph model and the
//! descriptions are tested without producing any text.

use anyhow::{Context, Result};
use minijinja::Environment;
use serde::Serialize;

use crate::config::model::TransferConfig;
use crate::entrypoint::description::{ExecutableDescription, PublishDestination};
use crate::rules::JobBody;

const TEMPLATE_NAME: &str = "entrypoint.sh";

const TEMPLATE: &str = r#"#!/usr/bin/env bash
# {{ name }}: rule {{ rule }} (cpu={{ cpu }}, mem_mb={{ mem_mb }}, gpu={{ gpu }})
set -euo pipefail

origin=$(pwd)
fetch=${RULEDAG_FETCH:-{{ fetch | shell_quote }}}
push=${RULEDAG_PUSH:-{{ push | shell_quote }}}
scratch=${RULEDAG_SCRATCH:-$origin/.ruledag/scratch}
results=${RULEDAG_RESULTS:-$origin/.ruledag/results}
outputs=${RULEDAG_OUTPUTS:-$origin/.ruledag/outputs}
export RULEDAG_THREADS={{ cpu }}

workdir=$(mktemp -d)
trap 'rm -rf "$workdir"' EXIT
cd "$workdir"

{% for step in materialize %}
mkdir -p "$(dirname {{ step.path | shell_quote }})"
$fetch "${{ step.identifier }}" {{ step.path | shell_quote }}
{% endfor %}
{% for dir in prepare_dirs %}
mkdir -p {{ dir | shell_quote }}
{% endfor %}

{{ command }}

mkdir -p "$outputs"
{% for step in publish %}
dest="${{ step.root }}"/{{ step.relative | shell_quote }}
mkdir -p "$(dirname "$dest")"
$push {{ step.path | shell_quote }} "$dest"
printf '%s\n' "$dest" > "$outputs/{{ step.identifier }}"
{% endfor %}
"#;

const LAUNCHER_TEMPLATE_NAME: &str = "launcher.sh";

const LAUNCHER_TEMPLATE: &str = r#"#!/usr/bin/env bash
# Launcher for {{ workflow }} {{ version }}
set -euo pipefail

args=()
{% for p in params %}
args+=(--param {{ p.name }}="${{ p.identifier }}")
{% endfor %}
"${RULEDAG_BIN:-ruledag}" --config {{ config_path | shell_quote }} jit \
  --execution-id "${RULEDAG_EXECUTION_ID:?RULEDAG_EXECUTION_ID is not set}" \
  ${args[@]+"${args[@]}"}

outputs=${RULEDAG_OUTPUTS:-.ruledag/outputs}
mkdir -p "$outputs"
printf 'true\n' > "$outputs/success"
"#;

#[derive(Serialize)]
struct LauncherView<'a> {
    workflow: &'a str,
    version: &'a str,
    config_path: &'a str,
    params: Vec<LauncherParamView<'a>>,
}

#[derive(Serialize)]
struct LauncherParamView<'a> {
    name: &'a str,
    identifier: &'a str,
}

#[derive(Serialize)]
struct ScriptView<'a> {
    name: &'a str,
    rule: &'a str,
    cpu: u32,
    mem_mb: u64,
    gpu: u32,
    fetch: &'a str,
    push: &'a str,
    materialize: Vec<MaterializeView<'a>>,
    prepare_dirs: &'a [String],
    command: String,
    publish: Vec<PublishView<'a>>,
}

#[derive(Serialize)]
struct MaterializeView<'a> {
    identifier: &'a str,
    path: &'a str,
}

#[derive(Serialize)]
struct PublishView<'a> {
    identifier: &'a str,
    path: &'a str,
    root: &'static str,
    relative: &'a str,
}

/// Render a description as a bash script.
///
/// Inputs are read from environment variables named after their parameter
/// identifiers; each published location is written to
/// `$RULEDAG_OUTPUTS/<identifier>`.
pub fn render_script(desc: &ExecutableDescription, transfer: &TransferConfig) -> Result<String> {
    let env = environment()?;
    let view = ScriptView {
        name: &desc.name,
        rule: &desc.rule,
        cpu: desc.resources.cpu,
        mem_mb: desc.resources.mem_mb,
        gpu: desc.resources.gpu,
        fetch: &transfer.fetch,
        push: &transfer.push,
        materialize: desc
            .materialize
            .iter()
            .map(|m| MaterializeView {
                identifier: m.identifier.as_str(),
                path: &m.path,
            })
            .collect(),
        prepare_dirs: &desc.prepare_dirs,
        command: command_line(&desc.body),
        publish: desc
            .publish
            .iter()
            .map(|p| {
                let (root, relative) = match &p.destination {
                    PublishDestination::Target { relative } => ("results", relative.as_str()),
                    PublishDestination::Intermediate { key } => ("scratch", key.as_str()),
                };
                PublishView {
                    identifier: p.identifier.as_str(),
                    path: &p.path,
                    root,
                    relative,
                }
            })
            .collect(),
    };

    env.get_template(TEMPLATE_NAME)?
        .render(&view)
        .with_context(|| format!("rendering entrypoint for {}", desc.name))
}

/// Render the launcher task's script.
///
/// `params` are `(declared name, identifier)` pairs; each value arrives in the
/// environment variable named by its identifier and is forwarded to
/// `ruledag jit` as `--param name=value`.
pub fn render_launcher(
    workflow: &str,
    version: &str,
    config_path: &str,
    params: &[(String, String)],
) -> Result<String> {
    let view = LauncherView {
        workflow,
        version,
        config_path,
        params: params
            .iter()
            .map(|(name, identifier)| LauncherParamView { name, identifier })
            .collect(),
    };
    environment()?
        .get_template(LAUNCHER_TEMPLATE_NAME)?
        .render(&view)
        .with_context(|| format!("rendering launcher for {workflow}"))
}

fn environment() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.add_filter("shell_quote", |value: String| shell_quote(&value));
    env.add_template(TEMPLATE_NAME, TEMPLATE)
        .context("loading entrypoint template")?;
    env.add_template(LAUNCHER_TEMPLATE_NAME, LAUNCHER_TEMPLATE)
        .context("loading launcher template")?;
    Ok(env)
}

/// Quote for POSIX shells using single quotes.
pub fn shell_quote(raw: &str) -> String {
    if !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+=:,@%".contains(c))
    {
        return raw.to_string();
    }
    format!("'{}'", raw.replace('\'', r#"'\''"#))
}

fn command_line(body: &JobBody) -> String {
    match body {
        JobBody::Shell(cmd) => cmd.clone(),
        JobBody::Script(path) => {
            let script = if path.starts_with('/') {
                shell_quote(path)
            } else {
                format!("\"$origin\"/{}", shell_quote(path))
            };
            match interpreter_for(path) {
                Some(interp) => format!("{interp} {script}"),
                None => script,
            }
        }
    }
}

/// Interpreter chosen by script extension; `None` runs the file directly.
pub fn interpreter_for(script: &str) -> Option<&'static str> {
    let ext = script.rsplit_once('.').map(|(_, ext)| ext)?;
    match ext {
        "py" => Some("python3"),
        "R" | "r" => Some("Rscript"),
        "sh" | "bash" => Some("bash"),
        "jl" => Some("julia"),
        "rb" => Some("ruby"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entrypoint::description::{MaterializeStep, PublishStep};
    use crate::ident::IdentifierResolver;
    use crate::rules::FileHandle;
    use crate::types::ResourceRequest;

    fn description(body: JobBody) -> ExecutableDescription {
        let mut ids = IdentifierResolver::new();
        let input = ids.resolve(&FileHandle::file("data/a b.txt")).unwrap();
        let output = ids.resolve(&FileHandle::file("out/a.txt")).unwrap();
        ExecutableDescription {
            node: 0,
            name: "n0_copy".to_string(),
            rule: "copy".to_string(),
            materialize: vec![MaterializeStep {
                identifier: input,
                path: "data/a b.txt".to_string(),
                is_dir: false,
            }],
            prepare_dirs: vec!["out".to_string()],
            body,
            resources: ResourceRequest::default(),
            publish: vec![PublishStep {
                identifier: output,
                path: "out/a.txt".to_string(),
                is_dir: false,
                destination: PublishDestination::Target {
                    relative: "out/a.txt".to_string(),
                },
            }],
        }
    }

    #[test]
    fn renders_materialize_body_and_publish() {
        let script = render_script(
            &description(JobBody::Shell("cp 'data/a b.txt' out/a.txt".to_string())),
            &TransferConfig::default(),
        )
        .unwrap();

        assert!(script.starts_with("#!/usr/bin/env bash\n"));
        assert!(script.contains("fetch=${RULEDAG_FETCH:-'cp -R'}"));
        assert!(script.contains("$fetch \"$r_data_sa_u20_b_dtxt\" 'data/a b.txt'"));
        assert!(script.contains("\ncp 'data/a b.txt' out/a.txt\n"));
        assert!(script.contains("dest=\"$results\"/out/a.txt"));
        assert!(script.contains("\"$outputs/r_out_sa_dtxt\""));
    }

    #[test]
    fn scripts_run_through_their_interpreter() {
        let script = render_script(
            &description(JobBody::Script("scripts/plot.py".to_string())),
            &TransferConfig::default(),
        )
        .unwrap();
        assert!(script.contains("python3 \"$origin\"/scripts/plot.py"));
    }

    #[test]
    fn launcher_forwards_params() {
        let script = render_launcher(
            "demo",
            "0.1.0",
            "Ruledag.toml",
            &[("genome".to_string(), "p_genome".to_string())],
        )
        .unwrap();
        assert!(script.contains("args+=(--param genome=\"$p_genome\")"));
        assert!(script.contains("--config Ruledag.toml jit"));
        assert!(script.contains("printf 'true\\n' > \"$outputs/success\""));
    }

    #[test]
    fn quoting() {
        assert_eq!(shell_quote("plain/path.txt"), "plain/path.txt");
        assert_eq!(shell_quote("it's"), r#"'it'\''s'"#);
        assert_eq!(shell_quote(""), "''");
        assert_eq!(interpreter_for("x.R"), Some("Rscript"));
        assert_eq!(interpreter_for("run"), None);
    }
}
