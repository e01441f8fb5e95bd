// src/rules/pattern.rs

//! Wildcard path patterns such as `aligned/{sample}.bam`.
//!
//! A pattern is a sequence of literal text and `{name}` / `{name,regex}`
//! placeholders. `{{` and `}}` are literal braces. Patterns are compiled once
//! into an anchored regex used to match concrete paths and recover wildcard
//! values.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;

/// Default regex for a wildcard without a constraint.
const DEFAULT_WILDCARD_REGEX: &str = ".+";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Wildcard { name: String },
}

/// A compiled wildcard pattern.
#[derive(Clone)]
pub struct WildcardPattern {
    raw: String,
    segments: Vec<Segment>,
    regex: Regex,
    /// Regex group name -> wildcard name, in order of appearance.
    groups: Vec<(String, String)>,
    is_dir: bool,
}

impl fmt::Debug for WildcardPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WildcardPattern")
            .field("raw", &self.raw)
            .finish_non_exhaustive()
    }
}

impl WildcardPattern {
    /// Parse a pattern. `constraints` supplies per-wildcard regexes declared on
    /// the rule; an inline `{name,regex}` constraint takes precedence.
    pub fn parse(raw: &str, constraints: &BTreeMap<String, String>) -> Result<Self, String> {
        let is_dir = raw.len() > 1 && raw.ends_with('/');
        let mut trimmed = raw.trim_end_matches('/');
        while let Some(rest) = trimmed.strip_prefix("./") {
            trimmed = rest;
        }
        if trimmed.is_empty() {
            return Err("empty path pattern".to_string());
        }

        let (segments, inline) = tokenize(trimmed)?;

        let mut regex_src = String::from("^");
        let mut groups = Vec::new();
        for segment in &segments {
            match segment {
                Segment::Literal(text) => regex_src.push_str(&regex::escape(text)),
                Segment::Wildcard { name } => {
                    let group = format!("w{}", groups.len());
                    let constraint = inline
                        .get(name)
                        .or_else(|| constraints.get(name))
                        .map(String::as_str)
                        .unwrap_or(DEFAULT_WILDCARD_REGEX);
                    regex_src.push_str(&format!("(?P<{group}>(?:{constraint}))"));
                    groups.push((group, name.clone()));
                }
            }
        }
        regex_src.push('$');

        let regex = Regex::new(&regex_src)
            .map_err(|e| format!("invalid wildcard constraint: {e}"))?;

        Ok(Self {
            raw: raw.to_string(),
            segments,
            regex,
            groups,
            is_dir,
        })
    }

    /// The pattern as written.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Whether the pattern was written with a trailing `/`.
    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// Distinct wildcard names, in order of first appearance.
    pub fn wildcard_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (_, name) in &self.groups {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }

    /// Match a concrete (normalized) path, returning the wildcard values.
    ///
    /// A wildcard that appears more than once must capture the same text
    /// everywhere, otherwise the path does not match.
    pub fn matches(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let caps = self.regex.captures(path)?;
        let mut values: BTreeMap<String, String> = BTreeMap::new();
        for (group, name) in &self.groups {
            let value = caps.name(group)?.as_str();
            match values.get(name) {
                Some(existing) if existing != value => return None,
                Some(_) => {}
                None => {
                    values.insert(name.clone(), value.to_string());
                }
            }
        }
        Some(values)
    }

    /// Fill the placeholders. Returns the names that had no value on failure.
    pub fn substitute(&self, values: &BTreeMap<String, String>) -> Result<String, Vec<String>> {
        let mut out = String::new();
        let mut missing = Vec::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Wildcard { name } => match values.get(name) {
                    Some(v) => out.push_str(v),
                    None => {
                        if !missing.contains(name) {
                            missing.push(name.clone());
                        }
                    }
                },
            }
        }
        if missing.is_empty() {
            Ok(out)
        } else {
            Err(missing)
        }
    }

    /// Literal directory prefix before the first wildcard (`data/raw/` for
    /// `data/raw/{sample}.fq`). Used to bound filesystem discovery.
    pub fn literal_dir_prefix(&self) -> String {
        let mut prefix = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => prefix.push_str(text),
                Segment::Wildcard { .. } => break,
            }
        }
        match prefix.rfind('/') {
            Some(idx) => prefix[..=idx].to_string(),
            None => String::new(),
        }
    }
}

type Tokens = (Vec<Segment>, BTreeMap<String, String>);

fn tokenize(raw: &str) -> Result<Tokens, String> {
    let mut segments = Vec::new();
    let mut inline = BTreeMap::new();
    let mut literal = String::new();
    let chars: Vec<char> = raw.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                literal.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                literal.push('}');
                i += 2;
            }
            '}' => return Err(format!("unmatched '}}' at offset {i}")),
            '{' => {
                // Scan to the matching close brace; constraints may nest braces.
                let start = i + 1;
                let mut depth = 1;
                let mut j = start;
                while j < chars.len() && depth > 0 {
                    match chars[j] {
                        '{' => depth += 1,
                        '}' => depth -= 1,
                        _ => {}
                    }
                    j += 1;
                }
                if depth != 0 {
                    return Err(format!("unterminated '{{' at offset {i}"));
                }
                let body: String = chars[start..j - 1].iter().collect();
                let (name, constraint) = match body.split_once(',') {
                    Some((n, c)) => (n.trim().to_string(), Some(c.trim().to_string())),
                    None => (body.trim().to_string(), None),
                };
                if !is_wildcard_name(&name) {
                    return Err(format!("invalid wildcard name '{name}'"));
                }
                if let Some(c) = constraint {
                    inline.insert(name.clone(), c);
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Wildcard { name });
                i = j;
            }
            c => {
                literal.push(c);
                i += 1;
            }
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok((segments, inline))
}

fn is_wildcard_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(raw: &str) -> WildcardPattern {
        WildcardPattern::parse(raw, &BTreeMap::new()).unwrap()
    }

    #[test]
    fn matches_and_extracts_values() {
        let p = pattern("aligned/{sample}.{ext}");
        let values = p.matches("aligned/s1.bam").unwrap();
        assert_eq!(values["sample"], "s1");
        assert_eq!(values["ext"], "bam");
        assert!(p.matches("other/s1.bam").is_none());
    }

    #[test]
    fn repeated_wildcard_must_agree() {
        let p = pattern("{s}/{s}.txt");
        assert!(p.matches("a/a.txt").is_some());
        assert!(p.matches("a/b.txt").is_none());
    }

    #[test]
    fn inline_constraint_wins_over_rule_constraint() {
        let mut constraints = BTreeMap::new();
        constraints.insert("n".to_string(), "[a-z]+".to_string());
        let p = WildcardPattern::parse("x/{n,[0-9]{2}}.txt", &constraints).unwrap();
        assert!(p.matches("x/42.txt").is_some());
        assert!(p.matches("x/ab.txt").is_none());

        let q = WildcardPattern::parse("x/{n}.txt", &constraints).unwrap();
        assert!(q.matches("x/ab.txt").is_some());
        assert!(q.matches("x/42.txt").is_none());
    }

    #[test]
    fn substitute_reports_missing_names() {
        let p = pattern("logs/{rule}/{sample}.log");
        let mut values = BTreeMap::new();
        values.insert("sample".to_string(), "a".to_string());
        assert_eq!(p.substitute(&values), Err(vec!["rule".to_string()]));
        values.insert("rule".to_string(), "align".to_string());
        assert_eq!(p.substitute(&values).unwrap(), "logs/align/a.log");
    }

    #[test]
    fn escaped_braces_are_literal() {
        let p = pattern("weird{{x}}/{a}");
        assert_eq!(p.wildcard_names(), vec!["a"]);
        assert!(p.matches("weird{x}/1").is_some());
    }

    #[test]
    fn rejects_malformed_patterns() {
        assert!(WildcardPattern::parse("a/{b", &BTreeMap::new()).is_err());
        assert!(WildcardPattern::parse("a/}b", &BTreeMap::new()).is_err());
        assert!(WildcardPattern::parse("a/{1x}", &BTreeMap::new()).is_err());
    }

    #[test]
    fn directory_patterns_and_prefix() {
        let p = pattern("./out/{sample}/");
        assert!(p.is_dir());
        assert_eq!(p.literal_dir_prefix(), "out/");
        assert!(p.matches("out/a").is_some());
    }
}
