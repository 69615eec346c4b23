//! Pre-parsing: query options and a normalized cache key.
//!
//! Recognizes leading `EXPLAIN` / `PROFILE` and `CYPHER [version]
//! key=value ...` before handing the statement to the real parser.

use std::fmt;

use serde::Serialize;

use crate::types::{PenumbraError, Result};

/// How the query is run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize)]
pub enum ExecutionMode {
    /// Plain execution.
    #[default]
    Normal,
    /// Plan only.
    Explain,
    /// Execute with per-operator statistics.
    Profile,
}

/// `planner=` option.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize)]
pub enum PlannerOption {
    /// Engine default.
    #[default]
    Default,
    /// Cost-based planner with budgeted IDP.
    Cost,
    /// Iterative dynamic programming.
    Idp,
    /// Exhaustive dynamic programming.
    Dp,
}

/// `runtime=` option.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize)]
pub enum RuntimeOption {
    /// Engine default.
    #[default]
    Default,
    /// Interpreted runtime.
    Interpreted,
    /// Slotted runtime.
    Slotted,
    /// Pipelined runtime.
    Pipelined,
    /// Parallel runtime.
    Parallel,
}

/// `replan=` option.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize)]
pub enum ReplanOption {
    /// Use caches and staleness checks.
    #[default]
    Default,
    /// Always recompile, bypassing the caches.
    Force,
    /// Reuse cached plans without staleness checks.
    Skip,
}

/// Options collected from the query prefix.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize)]
pub struct QueryOptions {
    /// `EXPLAIN` / `PROFILE`.
    pub execution_mode: ExecutionMode,
    /// Language version after `CYPHER`.
    pub version: Option<String>,
    /// Planner choice.
    pub planner: PlannerOption,
    /// Runtime choice.
    pub runtime: RuntimeOption,
    /// Replan choice.
    pub replan: ReplanOption,
}

impl QueryOptions {
    /// Prefix of the cache key. Replanning and `EXPLAIN` never change the
    /// compiled query, so they are left out.
    fn cache_key_prefix(&self) -> String {
        let mut parts = Vec::new();
        if let Some(version) = &self.version {
            parts.push(format!("CYPHER {version}"));
        }
        if self.planner != PlannerOption::Default {
            parts.push(format!("planner={}", option_name(&self.planner)));
        }
        if self.runtime != RuntimeOption::Default {
            parts.push(format!("runtime={}", option_name(&self.runtime)));
        }
        if self.execution_mode == ExecutionMode::Profile {
            parts.push("PROFILE".into());
        }
        let mut prefix = parts.join(" ");
        if !prefix.is_empty() {
            prefix.push(' ');
        }
        prefix
    }
}

fn option_name(option: &impl fmt::Debug) -> String {
    format!("{option:?}").to_ascii_lowercase()
}

/// Result of pre-parsing.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize)]
pub struct PreParsedQuery {
    /// Statement without the option prefix, whitespace normalized.
    pub statement: String,
    /// Collected options.
    pub options: QueryOptions,
    /// Key for the syntax-tree tier.
    pub cache_key: String,
}

/// Splits query text into options and statement.
#[derive(Clone, Copy, Debug, Default)]
pub struct PreParser;

impl PreParser {
    /// Creates a pre-parser.
    pub fn new() -> Self {
        Self
    }

    /// Pre-parses `text`.
    pub fn pre_parse(&self, text: &str) -> Result<PreParsedQuery> {
        let mut options = QueryOptions::default();
        let mut seen_keys: Vec<(String, String)> = Vec::new();
        let mut rest = text.trim_start();

        loop {
            let (word, tail) = next_word(rest);
            if word.eq_ignore_ascii_case("EXPLAIN") || word.eq_ignore_ascii_case("PROFILE") {
                let mode = if word.eq_ignore_ascii_case("EXPLAIN") {
                    ExecutionMode::Explain
                } else {
                    ExecutionMode::Profile
                };
                if options.execution_mode != ExecutionMode::Normal && options.execution_mode != mode
                {
                    return Err(PenumbraError::InvalidQueryOption(
                        "EXPLAIN and PROFILE cannot be combined".into(),
                    ));
                }
                options.execution_mode = mode;
                rest = tail;
            } else if word.eq_ignore_ascii_case("CYPHER") {
                rest = tail;
                let (candidate, tail) = next_word(rest);
                if is_version(candidate) {
                    if options.version.as_deref().is_some_and(|v| v != candidate) {
                        return Err(PenumbraError::InvalidQueryOption(format!(
                            "conflicting CYPHER versions {} and {candidate}",
                            options.version.as_deref().unwrap_or_default()
                        )));
                    }
                    options.version = Some(candidate.to_owned());
                    rest = tail;
                }
                loop {
                    let (pair, tail) = next_word(rest);
                    let Some((key, value)) = pair.split_once('=') else {
                        break;
                    };
                    apply_option(&mut options, &mut seen_keys, key, value)?;
                    rest = tail;
                }
            } else {
                break;
            }
        }

        let statement = normalize_whitespace(rest);
        let cache_key = format!("{}{}", options.cache_key_prefix(), statement);
        Ok(PreParsedQuery {
            statement,
            options,
            cache_key,
        })
    }
}

fn apply_option(
    options: &mut QueryOptions,
    seen: &mut Vec<(String, String)>,
    key: &str,
    value: &str,
) -> Result<()> {
    let key = key.to_ascii_lowercase();
    let value = value.to_ascii_lowercase();
    if let Some((_, previous)) = seen.iter().find(|(k, _)| *k == key) {
        if *previous != value {
            return Err(PenumbraError::InvalidQueryOption(format!(
                "conflicting values for {key}: {previous} and {value}"
            )));
        }
        return Ok(());
    }
    let invalid = || PenumbraError::InvalidQueryOption(format!("{key}={value}"));
    match key.as_str() {
        "planner" => {
            options.planner = match value.as_str() {
                "cost" => PlannerOption::Cost,
                "idp" => PlannerOption::Idp,
                "dp" => PlannerOption::Dp,
                "default" => PlannerOption::Default,
                _ => return Err(invalid()),
            }
        }
        "runtime" => {
            options.runtime = match value.as_str() {
                "interpreted" => RuntimeOption::Interpreted,
                "slotted" => RuntimeOption::Slotted,
                "pipelined" => RuntimeOption::Pipelined,
                "parallel" => RuntimeOption::Parallel,
                "default" => RuntimeOption::Default,
                _ => return Err(invalid()),
            }
        }
        "replan" => {
            options.replan = match value.as_str() {
                "force" => ReplanOption::Force,
                "skip" => ReplanOption::Skip,
                "default" => ReplanOption::Default,
                _ => return Err(invalid()),
            }
        }
        _ => {
            return Err(PenumbraError::InvalidQueryOption(format!(
                "unknown option {key}"
            )))
        }
    }
    seen.push((key, value));
    Ok(())
}

fn next_word(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(end) => (&text[..end], text[end..].trim_start()),
        None => (text, ""),
    }
}

fn is_version(word: &str) -> bool {
    !word.is_empty() && word.chars().all(|c| c.is_ascii_digit() || c == '.')
}

/// Collapses whitespace runs to one space outside string literals and
/// backtick-quoted names, and trims both ends. `//` line comments and
/// `/* */` block comments count as whitespace.
fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut pending_space = false;
    let mut chars = text.trim().chars().peekable();
    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match (c, chars.peek().copied()) {
            (c, _) if c.is_whitespace() => pending_space = true,
            ('/', Some('/')) => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        break;
                    }
                }
                pending_space = true;
            }
            ('/', Some('*')) => {
                chars.next();
                let mut star = false;
                for skipped in chars.by_ref() {
                    if star && skipped == '/' {
                        break;
                    }
                    star = skipped == '*';
                }
                pending_space = true;
            }
            (c, _) => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                if matches!(c, '\'' | '"' | '`') {
                    quote = Some(c);
                }
                out.push(c);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_options_and_normalizes_statement() {
        let parsed = PreParser::new()
            .pre_parse("  CYPHER 5 runtime=slotted replan=force\n MATCH (n)\t\tRETURN  'a  b'  ")
            .expect("pre-parse");
        assert_eq!(parsed.statement, "MATCH (n) RETURN 'a  b'");
        assert_eq!(parsed.options.version.as_deref(), Some("5"));
        assert_eq!(parsed.options.runtime, RuntimeOption::Slotted);
        assert_eq!(parsed.options.replan, ReplanOption::Force);
        assert_eq!(parsed.cache_key, "CYPHER 5 runtime=slotted MATCH (n) RETURN 'a  b'");
    }

    #[test]
    fn comments_are_dropped_without_swallowing_following_clauses() {
        let parser = PreParser::new();
        let line = parser
            .pre_parse("MATCH (n) // all nodes\nRETURN n")
            .expect("line comment");
        let block = parser
            .pre_parse("MATCH (n) /* all\n nodes */ RETURN n")
            .expect("block comment");
        let commented_out = parser
            .pre_parse("MATCH (n) // all nodes RETURN n")
            .expect("trailing comment");
        assert_eq!(line.statement, "MATCH (n) RETURN n");
        assert_eq!(block.cache_key, line.cache_key);
        assert_eq!(commented_out.statement, "MATCH (n)");
        assert_ne!(commented_out.cache_key, line.cache_key);

        let quoted = parser
            .pre_parse("RETURN '// kept' /* gone */, `a/*b*/`")
            .expect("quoted");
        assert_eq!(quoted.statement, "RETURN '// kept' , `a/*b*/`");
    }

    #[test]
    fn explain_shares_cache_key_but_profile_does_not() {
        let parser = PreParser::new();
        let plain = parser.pre_parse("MATCH (n) RETURN n").expect("plain");
        let explain = parser.pre_parse("EXPLAIN MATCH (n) RETURN n").expect("explain");
        let profile = parser.pre_parse("profile MATCH (n) RETURN n").expect("profile");
        assert_eq!(explain.options.execution_mode, ExecutionMode::Explain);
        assert_eq!(plain.cache_key, explain.cache_key);
        assert_ne!(plain.cache_key, profile.cache_key);
    }

    #[test]
    fn rejects_unknown_and_conflicting_options() {
        let parser = PreParser::new();
        for text in [
            "CYPHER colour=red MATCH (n) RETURN n",
            "CYPHER runtime=slotted runtime=parallel MATCH (n) RETURN n",
            "CYPHER replan=sometimes MATCH (n) RETURN n",
            "EXPLAIN PROFILE MATCH (n) RETURN n",
        ] {
            let err = parser.pre_parse(text).expect_err(text);
            assert!(matches!(err, PenumbraError::InvalidQueryOption(_)), "{text}");
        }
        parser
            .pre_parse("CYPHER runtime=slotted CYPHER runtime=slotted RETURN 1")
            .expect("repeated identical option");
    }
}
