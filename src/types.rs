use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Scalar kind of a declared workflow parameter, as written in `type = "..."`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    File,
    Directory,
    String,
    Integer,
    Float,
    Boolean,
}

impl ParamKind {
    /// Whether values of this kind are addressed by location (and so need a
    /// `path` telling jobs where to find them).
    pub fn is_path(self) -> bool {
        matches!(self, ParamKind::File | ParamKind::Directory)
    }
}

/// Type of a task or graph parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    File,
    Directory,
    String,
    Integer,
    Float,
    Boolean,
    List(Box<ParamType>),
}

impl ParamType {
    pub fn from_kind(kind: ParamKind, list: bool) -> Self {
        let scalar = match kind {
            ParamKind::File => ParamType::File,
            ParamKind::Directory => ParamType::Directory,
            ParamKind::String => ParamType::String,
            ParamKind::Integer => ParamType::Integer,
            ParamKind::Float => ParamType::Float,
            ParamKind::Boolean => ParamType::Boolean,
        };
        if list {
            ParamType::List(Box::new(scalar))
        } else {
            scalar
        }
    }

    pub fn file_or_dir(is_dir: bool) -> Self {
        if is_dir {
            ParamType::Directory
        } else {
            ParamType::File
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::File => write!(f, "file"),
            ParamType::Directory => write!(f, "directory"),
            ParamType::String => write!(f, "string"),
            ParamType::Integer => write!(f, "integer"),
            ParamType::Float => write!(f, "float"),
            ParamType::Boolean => write!(f, "boolean"),
            ParamType::List(inner) => write!(f, "list<{inner}>"),
        }
    }
}

/// A concrete parameter value supplied at launch time.
///
/// File and directory parameters carry the remote location of the data as a
/// string.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ParamValue>),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Flatten into the list of strings used for wildcard expansion.
    pub fn to_wildcard_values(&self) -> Vec<String> {
        match self {
            ParamValue::List(items) => items.iter().map(|v| v.to_string()).collect(),
            other => vec![other.to_string()],
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Str(s) => write!(f, "{s}"),
            ParamValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", parts.join(" "))
            }
        }
    }
}

/// Resource request declared on a rule (`resources = { cpu = 2, ... }`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResourceRequest {
    #[serde(default = "default_cpu")]
    pub cpu: u32,
    #[serde(default = "default_mem_mb")]
    pub mem_mb: u64,
    #[serde(default)]
    pub gpu: u32,
}

fn default_cpu() -> u32 {
    1
}

fn default_mem_mb() -> u64 {
    1024
}

impl Default for ResourceRequest {
    fn default() -> Self {
        Self {
            cpu: default_cpu(),
            mem_mb: default_mem_mb(),
            gpu: 0,
        }
    }
}

/// What the JIT controller does when the registry already holds the version
/// it is about to register.
///
/// - `Fail`: terminal `Failed` transition with "this version already exists"
///   (default).
/// - `Reuse`: treat the existing registration as ours and continue polling
///   for visibility. Useful when the platform retries the launcher task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingVersionPolicy {
    Fail,
    Reuse,
}

impl Default for ExistingVersionPolicy {
    fn default() -> Self {
        ExistingVersionPolicy::Fail
    }
}

impl FromStr for ExistingVersionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail" => Ok(ExistingVersionPolicy::Fail),
            "reuse" => Ok(ExistingVersionPolicy::Reuse),
            other => Err(format!(
                "invalid on_existing_version: {other} (expected \"fail\" or \"reuse\")"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_type_display_nests() {
        let ty = ParamType::from_kind(ParamKind::String, true);
        assert_eq!(ty.to_string(), "list<string>");
    }

    #[test]
    fn param_value_untagged_parsing() {
        let v: ParamValue = serde_json::from_str(r#"["a", "b"]"#).unwrap();
        assert_eq!(v.to_wildcard_values(), vec!["a".to_string(), "b".to_string()]);

        let v: ParamValue = serde_json::from_str("3").unwrap();
        assert_eq!(v, ParamValue::Int(3));
    }

    #[test]
    fn existing_version_policy_from_str() {
        assert_eq!(
            "Reuse".parse::<ExistingVersionPolicy>().unwrap(),
            ExistingVersionPolicy::Reuse
        );
        assert!("sometimes".parse::<ExistingVersionPolicy>().is_err());
    }
}
