use std::io::Write;

use ruledag::config::load_and_validate;
use ruledag::errors::CompileError;
use tempfile::NamedTempFile;

mod common;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn test_valid_file_loads() {
    let file = write_config(
        r#"
[workflow]
name = "ok"
targets = ["out.txt"]

[rule.make]
output = ["out.txt"]
shell = "touch {output}"
"#,
    );

    let def = load_and_validate(file.path()).unwrap();
    assert_eq!(def.name(), "ok");
    assert_eq!(def.version(), "0.1.0");
    assert_eq!(def.rules().len(), 1);
}

#[test]
fn test_invalid_pattern_names_the_rule() {
    let file = write_config(
        r#"
[workflow]
name = "bad"

[rule.broken]
output = ["out/{sample"]
shell = "touch {output}"
"#,
    );

    let err = load_and_validate(file.path()).unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("invalid rule 'broken'"), "{msg}");
}

#[test]
fn test_shell_and_script_are_exclusive() {
    let file = write_config(
        r#"
[workflow]
name = "bad"

[rule.both]
output = ["out.txt"]
shell = "touch {output}"
script = "make.py"
"#,
    );

    let msg = format!("{:#}", load_and_validate(file.path()).unwrap_err());
    assert!(msg.contains("either `shell` or `script`"), "{msg}");
}

#[test]
fn test_unknown_wildcard_param_is_rejected() {
    let file = write_config(
        r#"
[workflow]
name = "bad"

[wildcards.sample]
param = "samples"

[rule.make]
output = ["out/{sample}.txt"]
shell = "touch {output}"
"#,
    );

    let msg = format!("{:#}", load_and_validate(file.path()).unwrap_err());
    assert!(msg.contains("unknown parameter 'samples'"), "{msg}");
}

#[test]
fn test_wildcard_param_must_be_a_list() {
    let file = write_config(
        r#"
[workflow]
name = "bad"

[params.samples]
type = "string"

[wildcards.sample]
param = "samples"

[rule.make]
output = ["out/{sample}.txt"]
shell = "touch {output}"
"#,
    );

    let msg = format!("{:#}", load_and_validate(file.path()).unwrap_err());
    assert!(msg.contains("parameter 'samples', which is not a list"), "{msg}");
}

#[test]
fn test_malformed_toml_reports_path() {
    let file = write_config("[workflow\nname = ");
    let msg = format!("{:#}", load_and_validate(file.path()).unwrap_err());
    assert!(msg.contains("parsing TOML workflow"), "{msg}");
}

#[test]
fn test_unbound_input_wildcard_names_the_rule() {
    let def = ruledag_test_utils::builders::WorkflowBuilder::new("x")
        .target("out.txt")
        .rule(
            "gather",
            ruledag_test_utils::builders::RuleBuilder::shell("cat {input} > {output}")
                .input("parts/{part}.txt")
                .output("out.txt"),
        )
        .build();

    match common::compile_defaults(&def) {
        Err(CompileError::UnresolvedWildcards { rule, detail }) => {
            assert_eq!(rule, "gather");
            assert!(detail.contains("part"), "{detail}");
        }
        other => panic!("expected UnresolvedWildcards, got {other:?}"),
    }
}

#[test]
fn test_no_targets_is_an_error() {
    let def = ruledag_test_utils::builders::WorkflowBuilder::new("x")
        .rule(
            "make",
            ruledag_test_utils::builders::RuleBuilder::shell("touch {output}").output("out.txt"),
        )
        .build();

    assert_eq!(common::compile_defaults(&def), Err(CompileError::NoTargets));
}

#[test]
fn test_missing_wildcard_param_value() {
    let def = ruledag_test_utils::builders::WorkflowBuilder::new("x")
        .target("out/{s}.txt")
        .param(
            "samples",
            ruledag_test_utils::builders::ParamBuilder::new("string").list(),
        )
        .wildcard_param("s", "samples")
        .rule(
            "make",
            ruledag_test_utils::builders::RuleBuilder::shell("touch {output}")
                .output("out/{s}.txt"),
        )
        .build();

    match common::compile_defaults(&def) {
        Err(CompileError::MissingParameter { name, .. }) => assert_eq!(name, "samples"),
        other => panic!("expected MissingParameter, got {other:?}"),
    }
}
