mod common;

use std::collections::BTreeMap;
use std::path::PathBuf;

use ruledag::compile::{BindingSource, Compiler, compile_workflow};
use ruledag::errors::CompileError;
use ruledag::fs::mock::MockFileSystem;
use ruledag::rules::TargetSelection;
use ruledag::types::{ParamType, ParamValue};
use ruledag_test_utils::builders::{JobBuilder, ParamBuilder, RuleBuilder, WorkflowBuilder, job_dag};

use common::{compile_defaults, sample_pipeline, two_step_chain};

#[test]
fn chain_compiles_in_dependency_order_with_internal_binding() {
    let def = two_step_chain();
    let graph = compile_defaults(&def).unwrap();

    let rules: Vec<&str> = graph.nodes().iter().map(|n| n.job.rule.as_str()).collect();
    assert_eq!(rules, vec!["jobA", "jobB"]);

    let job_b = &graph.nodes()[1];
    assert_eq!(job_b.bindings.len(), 1);
    match &job_b.bindings[0].source {
        BindingSource::Internal { node, output } => {
            assert_eq!(*node, 0);
            assert_eq!(output.as_str(), "r_out_dtxt");
        }
        other => panic!("expected internal binding, got {other:?}"),
    }
    let consumed = &job_b.inputs[0].identifier;
    assert!(job_b.binding_for(consumed).is_some_and(|b| b.is_internal()));
    assert_eq!(graph.producer_of(consumed).map(|n| n.id), Some(0));

    assert_eq!(graph.outputs().len(), 1);
    let out = &graph.outputs()[0];
    assert_eq!(out.identifier.as_str(), "r_final_dtxt");
    assert_eq!(out.node, 1);
    assert_eq!(out.path.as_str(), "final.txt");
    assert!(job_b.is_target);
    assert!(!graph.nodes()[0].is_target);
    assert!(graph.inputs().is_empty());
}

#[test]
fn two_rules_writing_the_same_file_are_ambiguous() {
    let def = WorkflowBuilder::new("dup")
        .target("final.txt")
        .rule("jobA", RuleBuilder::shell("echo a > {output}").output("shared.txt"))
        .rule("jobC", RuleBuilder::shell("echo c > {output}").output("shared.txt"))
        .rule(
            "jobB",
            RuleBuilder::shell("cp {input} {output}")
                .input("shared.txt")
                .output("final.txt"),
        )
        .build();

    match compile_defaults(&def) {
        Err(CompileError::AmbiguousProducer { path, producers }) => {
            assert_eq!(path, PathBuf::from("shared.txt"));
            assert_eq!(producers, vec!["jobA".to_string(), "jobC".to_string()]);
        }
        other => panic!("expected AmbiguousProducer, got {other:?}"),
    }
}

#[test]
fn compiler_rejects_duplicate_producers_in_a_hand_built_dag() {
    let def = two_step_chain();
    let dag = job_dag(
        vec![
            JobBuilder::new("jobA").output("shared.txt").build(),
            JobBuilder::new("jobC").output("shared.txt").build(),
            JobBuilder::new("jobB")
                .input("shared.txt")
                .output("final.txt")
                .build(),
        ],
        &["final.txt"],
    );

    let err = Compiler::new(&def).compile(&dag).unwrap_err();
    assert!(
        matches!(err, CompileError::AmbiguousProducer { .. }),
        "unexpected error: {err:?}"
    );
    assert!(err.to_string().contains("ambiguous producer"));
}

#[test]
fn consumer_of_a_directory_output_sees_a_directory() {
    let def = WorkflowBuilder::new("index")
        .target("aligned.bam")
        .rule("build_index", RuleBuilder::shell("mkindex {output}").output_dir("idx"))
        .rule(
            "align",
            RuleBuilder::shell("align --index {input} > {output}")
                .input("idx")
                .output("aligned.bam"),
        )
        .build();

    let graph = compile_defaults(&def).unwrap();
    let producer = &graph.nodes()[0];
    let consumer = &graph.nodes()[1];
    assert_eq!(producer.job.rule, "build_index");
    assert_eq!(producer.outputs[0].ty, ParamType::Directory);
    assert_eq!(consumer.inputs[0].identifier, producer.outputs[0].identifier);
    assert_eq!(consumer.inputs[0].ty, ParamType::Directory);
    assert!(consumer.inputs[0].path.is_dir());

    let descriptions = ruledag::entrypoint::generate(&graph);
    assert!(descriptions[&consumer.id].materialize[0].is_dir);
}

#[test]
fn target_nobody_produces_is_reported() {
    let def = WorkflowBuilder::new("missing")
        .target("nowhere.txt")
        .rule("jobA", RuleBuilder::shell("echo a > {output}").output("out.txt"))
        .build();

    match compile_defaults(&def) {
        Err(CompileError::NoProducerForTarget { path }) => {
            assert_eq!(path, PathBuf::from("nowhere.txt"));
        }
        other => panic!("expected NoProducerForTarget, got {other:?}"),
    }
}

#[test]
fn undeclared_leaf_input_is_dangling() {
    let def = WorkflowBuilder::new("dangling")
        .target("out.txt")
        .rule(
            "jobA",
            RuleBuilder::shell("cp {input} {output}")
                .input("raw.txt")
                .output("out.txt"),
        )
        .build();

    match compile_defaults(&def) {
        Err(CompileError::DanglingInput { rule, path }) => {
            assert_eq!(rule, "jobA");
            assert_eq!(path, PathBuf::from("raw.txt"));
        }
        other => panic!("expected DanglingInput, got {other:?}"),
    }
}

#[test]
fn leaf_under_directory_param_binds_externally() {
    let def = sample_pipeline();
    let graph = compile_defaults(&def).unwrap();

    // clean[a], clean[b], summarize[a], summarize[b]
    assert_eq!(graph.nodes().len(), 4);
    assert_eq!(graph.inputs().len(), 1);
    let (identifier, input) = graph.inputs().iter().next().unwrap();
    assert_eq!(identifier.as_str(), "p_raw");
    assert_eq!(input.param, "raw");
    assert_eq!(input.ty, ParamType::Directory);

    for node in graph.nodes().iter().filter(|n| n.job.rule == "clean") {
        assert_eq!(node.bindings.len(), 1);
        assert_eq!(
            node.bindings[0].source,
            BindingSource::External {
                param: identifier.clone()
            }
        );
        // output and log
        assert_eq!(node.outputs.len(), 2);
    }

    let targets: Vec<&str> = graph.outputs().iter().map(|o| o.path.as_str()).collect();
    assert_eq!(targets, vec!["results/a.txt", "results/b.txt"]);
}

#[test]
fn default_parameter_values_reach_job_bodies() {
    let def = sample_pipeline();
    let graph = compile_defaults(&def).unwrap();
    let clean = graph
        .nodes()
        .iter()
        .find(|n| n.job.label() == "clean[sample=a]")
        .unwrap();
    assert_eq!(
        clean.job.body,
        ruledag::rules::JobBody::Shell("clean --min 5 raw/a.txt > clean/a.txt".to_string())
    );
}

#[test]
fn launch_values_override_wildcard_lists() {
    let def = sample_pipeline();
    let fs = MockFileSystem::new();
    let mut values = BTreeMap::new();
    values.insert(
        "samples".to_string(),
        ParamValue::List(vec![ParamValue::Str("z".into())]),
    );

    let graph = compile_workflow(&def, &fs, &values, &TargetSelection::Default).unwrap();
    let labels: Vec<String> = graph.nodes().iter().map(|n| n.job.label()).collect();
    assert_eq!(labels, vec!["clean[sample=z]", "summarize[sample=z]"]);
}

#[test]
fn rule_target_selects_its_inputs() {
    let def = WorkflowBuilder::new("all")
        .target("rule:all")
        .wildcard_values("n", &["1", "2"])
        .rule("all", RuleBuilder::new().input("out/{n}.txt"))
        .rule("make", RuleBuilder::shell("seq {wildcards.n} > {output}").output("out/{n}.txt"))
        .build();

    let graph = compile_defaults(&def).unwrap();
    let rules: Vec<&str> = graph.nodes().iter().map(|n| n.job.rule.as_str()).collect();
    assert_eq!(rules, vec!["make", "make"]);
    assert_eq!(graph.outputs().len(), 2);
}

#[test]
fn explicit_targets_replace_defaults() {
    let def = sample_pipeline();
    let fs = MockFileSystem::new();
    let graph = compile_workflow(
        &def,
        &fs,
        &BTreeMap::new(),
        &TargetSelection::explicit(["clean/b.txt"]),
    )
    .unwrap();
    assert_eq!(graph.nodes().len(), 1);
    assert_eq!(graph.nodes()[0].job.label(), "clean[sample=b]");
    assert!(graph.nodes()[0].is_target);
}

#[test]
fn file_param_binds_by_exact_path() {
    let def = WorkflowBuilder::new("ref")
        .target("aligned.bam")
        .param("genome", ParamBuilder::file("ref/genome.fa"))
        .rule(
            "align",
            RuleBuilder::shell("align {input} > {output}")
                .input("ref/genome.fa")
                .output("aligned.bam"),
        )
        .build();

    let graph = compile_defaults(&def).unwrap();
    let node = &graph.nodes()[0];
    assert_eq!(node.inputs[0].identifier.as_str(), "p_genome");
    assert_eq!(node.inputs[0].ty, ParamType::File);
    assert_eq!(node.inputs[0].path.as_str(), "ref/genome.fa");
}

#[test]
fn repeated_compilations_are_identical() {
    let def = sample_pipeline();
    let first = compile_defaults(&def).unwrap();
    let second = compile_defaults(&def).unwrap();
    assert_eq!(first, second);
}
