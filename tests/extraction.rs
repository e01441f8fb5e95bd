mod common;

use std::collections::BTreeMap;
use std::fs;

use ruledag::errors::CompileError;
use ruledag::fs::RealFileSystem;
use ruledag::fs::mock::MockFileSystem;
use ruledag::rules::{Extractor, TargetSelection};
use ruledag_test_utils::builders::{RuleBuilder, WorkflowBuilder};
use tempfile::TempDir;

#[test]
fn glob_wildcards_are_discovered_on_disk() {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    fs::create_dir_all(data.join("nested")).unwrap();
    fs::write(data.join("a.txt"), "A").unwrap();
    fs::write(data.join("b.txt"), "B").unwrap();
    fs::write(data.join("notes.md"), "ignored").unwrap();
    fs::write(data.join("nested").join("c.txt"), "C").unwrap();

    let glob = format!("{}/data/{{s,[^/]+}}.txt", tmp.path().display());
    let def = WorkflowBuilder::new("discover")
        .target("out/{s}.txt")
        .wildcard_glob("s", &glob)
        .rule("make", RuleBuilder::shell("touch {output}").output("out/{s}.txt"))
        .build();

    let dag = Extractor::new(&def, &RealFileSystem, &BTreeMap::new())
        .extract(&TargetSelection::Default)
        .unwrap();

    let labels: Vec<String> = dag.jobs().iter().map(|j| j.label()).collect();
    assert_eq!(labels, vec!["make[s=a]", "make[s=b]"]);
}

#[test]
fn glob_over_missing_directory_is_unresolved() {
    let def = WorkflowBuilder::new("discover")
        .target("out/{s}.txt")
        .wildcard_glob("s", "nothing-here/{s}.txt")
        .rule("make", RuleBuilder::shell("touch {output}").output("out/{s}.txt"))
        .build();

    let fs = MockFileSystem::new();
    let err = Extractor::new(&def, &fs, &BTreeMap::new())
        .extract(&TargetSelection::Default)
        .unwrap_err();
    match err {
        CompileError::UnresolvedWildcards { rule, detail } => {
            assert_eq!(rule, "out/{s}.txt");
            assert!(detail.contains("no values"), "{detail}");
        }
        other => panic!("expected UnresolvedWildcards, got {other:?}"),
    }
}

#[test]
fn shared_intermediate_is_instantiated_once() {
    let def = WorkflowBuilder::new("diamond")
        .target("left.txt")
        .target("right.txt")
        .rule("base", RuleBuilder::shell("echo > {output}").output("base.txt"))
        .rule(
            "left",
            RuleBuilder::shell("cp {input} {output}")
                .input("base.txt")
                .output("left.txt"),
        )
        .rule(
            "right",
            RuleBuilder::shell("cp {input} {output}")
                .input("base.txt")
                .output("right.txt"),
        )
        .build();

    let fs = MockFileSystem::new();
    let dag = Extractor::new(&def, &fs, &BTreeMap::new())
        .extract(&TargetSelection::Default)
        .unwrap();

    assert_eq!(dag.len(), 3);
    let base = dag.jobs().iter().find(|j| j.rule == "base").unwrap();
    assert_eq!(dag.dependents_of(base.id).unwrap().len(), 2);
}

#[test]
fn constraints_disambiguate_overlapping_outputs() {
    let def = WorkflowBuilder::new("constrained")
        .target("out/7.txt")
        .target("out/x.txt")
        .rule(
            "number",
            RuleBuilder::shell("echo {wildcards.n} > {output}")
                .output("out/{n}.txt")
                .constraint("n", "[0-9]+"),
        )
        .rule(
            "text",
            RuleBuilder::shell("echo {wildcards.name} > {output}")
                .output("out/{name}.txt")
                .constraint("name", "[a-z]+"),
        )
        .build();

    let fs = MockFileSystem::new();
    let dag = Extractor::new(&def, &fs, &BTreeMap::new())
        .extract(&TargetSelection::Default)
        .unwrap();
    let labels: Vec<String> = dag.jobs().iter().map(|j| j.label()).collect();
    assert_eq!(labels, vec!["number[n=7]", "text[name=x]"]);
}

#[test]
fn unknown_rule_target_is_reported() {
    let def = WorkflowBuilder::new("x")
        .target("rule:nope")
        .rule("make", RuleBuilder::shell("touch {output}").output("out.txt"))
        .build();

    let fs = MockFileSystem::new();
    let err = Extractor::new(&def, &fs, &BTreeMap::new())
        .extract(&TargetSelection::Default)
        .unwrap_err();
    assert_eq!(err, CompileError::UnknownRule("nope".to_string()));
}

#[test]
fn mutually_dependent_rules_form_a_cycle() {
    let def = WorkflowBuilder::new("loop")
        .target("a.txt")
        .rule(
            "a",
            RuleBuilder::shell("cp {input} {output}")
                .input("b.txt")
                .output("a.txt"),
        )
        .rule(
            "b",
            RuleBuilder::shell("cp {input} {output}")
                .input("a.txt")
                .output("b.txt"),
        )
        .build();

    let fs = MockFileSystem::new();
    let err = Extractor::new(&def, &fs, &BTreeMap::new())
        .extract(&TargetSelection::Default)
        .unwrap_err();
    match err {
        CompileError::Cycle { jobs } => assert_eq!(jobs, vec!["a", "b"]),
        other => panic!("expected Cycle, got {other:?}"),
    }
}
