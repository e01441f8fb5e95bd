// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::rules::Rule;
use crate::types::{ExistingVersionPolicy, ParamKind, ParamType, ParamValue, ResourceRequest};

/// Top-level rule-definition file as read from TOML, before validation.
///
/// ```toml
/// [workflow]
/// name = "variant-calling"
/// targets = ["results/{sample}.vcf"]
///
/// [params.genome]
/// type = "file"
/// path = "ref/genome.fa"
///
/// [wildcards.sample]
/// values = ["a", "b"]
///
/// [rule.call]
/// input = ["aligned/{sample}.bam", "ref/genome.fa"]
/// output = ["results/{sample}.vcf"]
/// shell = "caller {input} > {output}"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawWorkflowFile {
    pub workflow: WorkflowSection,

    /// Controller settings from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Externally-visible parameters from `[params.<name>]`.
    #[serde(default)]
    pub params: BTreeMap<String, ParamConfig>,

    /// Wildcard value sources from `[wildcards.<name>]`.
    #[serde(default)]
    pub wildcards: BTreeMap<String, WildcardConfig>,

    /// All rules from `[rule.<name>]`.
    #[serde(default)]
    pub rule: BTreeMap<String, RuleConfig>,
}

/// `[workflow]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowSection {
    pub name: String,

    /// Base version under which the static launcher is registered.
    #[serde(default = "default_version")]
    pub version: String,

    /// Default target selection; overridden by explicit targets.
    #[serde(default)]
    pub targets: Vec<String>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

/// `[config]` section: everything the JIT controller and the generated
/// entrypoints need to know about their environment.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Owner under which workflows are registered.
    #[serde(default = "default_owner")]
    pub owner: String,

    /// Base URL of the registration / execution service.
    #[serde(default)]
    pub registry_url: Option<String>,

    /// Base URL of the artifact store. When unset, artifacts are written to
    /// `artifact_dir` on the local filesystem.
    #[serde(default)]
    pub artifact_url: Option<String>,

    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,

    /// Path prefix under which generated entrypoints are stored.
    #[serde(default = "default_artifact_prefix")]
    pub artifact_prefix: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub on_existing_version: ExistingVersionPolicy,

    /// Visibility polling after registration.
    #[serde(default = "BackoffConfig::poll_defaults")]
    pub poll: BackoffConfig,

    /// Transport retries for upload / register / launch calls.
    #[serde(default)]
    pub retry: BackoffConfig,

    #[serde(default)]
    pub transfer: TransferConfig,
}

fn default_owner() -> String {
    "default".to_string()
}

fn default_artifact_dir() -> String {
    ".ruledag/artifacts".to_string()
}

fn default_artifact_prefix() -> String {
    "entrypoints".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            registry_url: None,
            artifact_url: None,
            artifact_dir: default_artifact_dir(),
            artifact_prefix: default_artifact_prefix(),
            timeout_secs: default_timeout_secs(),
            on_existing_version: ExistingVersionPolicy::default(),
            poll: BackoffConfig::poll_defaults(),
            retry: BackoffConfig::default(),
            transfer: TransferConfig::default(),
        }
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_factor")]
    pub factor: f64,
}

fn default_max_attempts() -> u32 {
    4
}

fn default_initial_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_factor() -> f64 {
    2.0
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            factor: default_factor(),
        }
    }
}

impl BackoffConfig {
    pub fn poll_defaults() -> Self {
        Self {
            max_attempts: 20,
            initial_delay_ms: 500,
            max_delay_ms: 15_000,
            factor: 2.0,
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// `[config.transfer]`: commands the generated entrypoints use to move data.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_transfer_cmd")]
    pub fetch: String,
    #[serde(default = "default_transfer_cmd")]
    pub push: String,
}

fn default_transfer_cmd() -> String {
    "cp -R".to_string()
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            fetch: default_transfer_cmd(),
            push: default_transfer_cmd(),
        }
    }
}

/// `[params.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ParamConfig {
    #[serde(rename = "type")]
    pub kind: ParamKind,

    #[serde(default)]
    pub list: bool,

    /// Location jobs expect the data at (`file` / `directory` only).
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub default: Option<ParamValue>,

    #[serde(default)]
    pub description: Option<String>,
}

/// `[wildcards.<name>]` section. Exactly one source must be set.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct WildcardConfig {
    #[serde(default)]
    pub values: Option<Vec<String>>,
    #[serde(default)]
    pub param: Option<String>,
    #[serde(default)]
    pub glob: Option<String>,
}

/// A path entry in `input` / `output` / `log`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PathSpec {
    Plain(String),
    Detailed {
        path: String,
        #[serde(default)]
        directory: bool,
    },
}

impl PathSpec {
    pub fn path(&self) -> &str {
        match self {
            PathSpec::Plain(p) => p,
            PathSpec::Detailed { path, .. } => path,
        }
    }

    pub fn is_dir(&self) -> bool {
        match self {
            PathSpec::Plain(p) => p.len() > 1 && p.ends_with('/'),
            PathSpec::Detailed { path, directory } => *directory || path.ends_with('/'),
        }
    }
}

/// `[rule.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RuleConfig {
    #[serde(default)]
    pub input: Vec<PathSpec>,

    #[serde(default)]
    pub output: Vec<PathSpec>,

    #[serde(default)]
    pub log: Vec<PathSpec>,

    /// Inline shell command.
    #[serde(default)]
    pub shell: Option<String>,

    /// Script run instead of `shell`; the interpreter follows the extension.
    #[serde(default)]
    pub script: Option<String>,

    #[serde(default)]
    pub resources: ResourceRequest,

    #[serde(default)]
    pub wildcard_constraints: BTreeMap<String, String>,
}

/// A validated parameter declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    pub ty: ParamType,
    pub path: Option<String>,
    pub default: Option<ParamValue>,
    pub description: Option<String>,
}

impl ParamDecl {
    /// Check that `value` has this parameter's type.
    pub fn check_value(&self, value: &ParamValue) -> Result<(), String> {
        check_type(&self.ty, value)
            .map_err(|found| format!("expected {}, got {found}", self.ty))
    }

    /// Parse a command-line value (`--param name=value`) by declared type.
    ///
    /// Lists accept a JSON array or a comma-separated string.
    pub fn parse_value(&self, raw: &str) -> Result<ParamValue, String> {
        let value = match &self.ty {
            ParamType::List(inner) => {
                let trimmed = raw.trim();
                if trimmed.starts_with('[') {
                    serde_json::from_str::<ParamValue>(trimmed)
                        .map_err(|e| format!("parameter '{}': {e}", self.name))?
                } else {
                    let items = trimmed
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(|item| parse_scalar(inner, item))
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(|e| format!("parameter '{}': {e}", self.name))?;
                    ParamValue::List(items)
                }
            }
            scalar => parse_scalar(scalar, raw)
                .map_err(|e| format!("parameter '{}': {e}", self.name))?,
        };
        self.check_value(&value)
            .map_err(|e| format!("parameter '{}': {e}", self.name))?;
        Ok(value)
    }
}

fn parse_scalar(ty: &ParamType, raw: &str) -> Result<ParamValue, String> {
    match ty {
        ParamType::Integer => raw
            .trim()
            .parse::<i64>()
            .map(ParamValue::Int)
            .map_err(|_| format!("'{raw}' is not an integer")),
        ParamType::Float => raw
            .trim()
            .parse::<f64>()
            .map(ParamValue::Float)
            .map_err(|_| format!("'{raw}' is not a float")),
        ParamType::Boolean => match raw.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(ParamValue::Bool(true)),
            "false" | "no" | "0" => Ok(ParamValue::Bool(false)),
            _ => Err(format!("'{raw}' is not a boolean")),
        },
        ParamType::List(_) => Err("nested lists are not supported".to_string()),
        _ => Ok(ParamValue::Str(raw.to_string())),
    }
}

/// `Err` carries a short description of what was found instead.
fn check_type(ty: &ParamType, value: &ParamValue) -> Result<(), &'static str> {
    match (ty, value) {
        (ParamType::File | ParamType::Directory | ParamType::String, ParamValue::Str(_)) => Ok(()),
        (ParamType::Integer, ParamValue::Int(_)) => Ok(()),
        (ParamType::Float, ParamValue::Float(_) | ParamValue::Int(_)) => Ok(()),
        (ParamType::Boolean, ParamValue::Bool(_)) => Ok(()),
        (ParamType::List(inner), ParamValue::List(items)) => {
            items.iter().try_for_each(|item| check_type(inner, item))
        }
        (_, ParamValue::Str(_)) => Err("a string"),
        (_, ParamValue::Int(_)) => Err("an integer"),
        (_, ParamValue::Float(_)) => Err("a float"),
        (_, ParamValue::Bool(_)) => Err("a boolean"),
        (_, ParamValue::List(_)) => Err("a list"),
    }
}

/// Where the values of a wildcard come from when expanding targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WildcardSource {
    Values(Vec<String>),
    Param(String),
    Glob(String),
}

/// Validated workflow definition.
///
/// This is the explicit configuration object threaded through extraction,
/// compilation, generation and the JIT controller. It is only constructed
/// via `TryFrom<RawWorkflowFile>` (see `config::validate`).
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    name: String,
    version: String,
    default_targets: Vec<String>,
    config: ConfigSection,
    params: BTreeMap<String, ParamDecl>,
    wildcards: BTreeMap<String, WildcardSource>,
    rules: Vec<Rule>,
}

impl WorkflowDefinition {
    pub(crate) fn new_unchecked(
        workflow: WorkflowSection,
        config: ConfigSection,
        params: BTreeMap<String, ParamDecl>,
        wildcards: BTreeMap<String, WildcardSource>,
        rules: Vec<Rule>,
    ) -> Self {
        Self {
            name: workflow.name,
            version: workflow.version,
            default_targets: workflow.targets,
            config,
            params,
            wildcards,
            rules,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn default_targets(&self) -> &[String] {
        &self.default_targets
    }

    pub fn config(&self) -> &ConfigSection {
        &self.config
    }

    pub fn params(&self) -> &BTreeMap<String, ParamDecl> {
        &self.params
    }

    pub fn wildcards(&self) -> &BTreeMap<String, WildcardSource> {
        &self.wildcards
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name() == name)
    }

    /// Declared defaults merged under the given concrete values.
    pub fn effective_values(
        &self,
        concrete: &BTreeMap<String, ParamValue>,
    ) -> BTreeMap<String, ParamValue> {
        let mut values: BTreeMap<String, ParamValue> = self
            .params
            .values()
            .filter_map(|p| p.default.clone().map(|d| (p.name.clone(), d)))
            .collect();
        for (name, value) in concrete {
            values.insert(name.clone(), value.clone());
        }
        values
    }
}
