//! Index rules: `indices` and the rewriting `indices_rewrite`.
//!
//! `indices_rewrite` derives a new context; `indices` must therefore run after
//! it so the match sees the rewritten names. The precedence table in
//! [`crate::acl::ordering`] guarantees that.

use super::{params, RuleMatch, SyncRule};
use crate::acl::patterns::PatternSet;
use crate::acl::RequestContext;
use crate::error::{IndexGateError, Result};

use regex::Regex;
use serde_json::Value;

pub const INDICES: &str = "indices";
pub const INDICES_REWRITE: &str = "indices_rewrite";

/// Matches when every requested index is covered by one of the patterns.
/// Requests that involve no indices always match.
#[derive(Debug, Clone)]
pub struct IndicesRule {
    allowed: PatternSet,
}

impl IndicesRule {
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(Self {
            allowed: PatternSet::compile(params::string_list(INDICES, value)?),
        })
    }
}

impl SyncRule for IndicesRule {
    fn key(&self) -> &str {
        INDICES
    }

    fn check(&self, context: &RequestContext) -> Result<RuleMatch> {
        if !context.involves_indices() {
            return Ok(RuleMatch::Matched);
        }

        Ok(if context.indices.iter().all(|index| self.allowed.matches(index)) {
            RuleMatch::Matched
        } else {
            RuleMatch::NotMatched
        })
    }
}

/// `[regex, ..., replacement]`: every requested index matching one of the
/// regexes is replaced. `$1`-style group references are expanded.
#[derive(Debug, Clone)]
pub struct IndicesRewriteRule {
    patterns: Vec<Regex>,
    replacement: String,
}

impl IndicesRewriteRule {
    pub fn from_value(value: &Value) -> Result<Self> {
        let mut items = params::string_list(INDICES_REWRITE, value)?;
        if items.len() < 2 {
            return Err(IndexGateError::invalid_parameter(
                INDICES_REWRITE,
                "expected at least one pattern followed by a replacement",
            ));
        }

        let replacement = expand_group_references(&items.pop().unwrap_or_default());
        let patterns = items
            .iter()
            .map(|p| {
                Regex::new(&anchor(p))
                    .map_err(|e| IndexGateError::invalid_parameter(INDICES_REWRITE, e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            patterns,
            replacement,
        })
    }

    fn rewrite(&self, index: &str) -> String {
        match self.patterns.iter().find(|p| p.is_match(index)) {
            Some(pattern) => pattern.replace(index, self.replacement.as_str()).into_owned(),
            None => index.to_string(),
        }
    }
}

// Patterns describe whole index names, not substrings.
fn anchor(pattern: &str) -> String {
    let body = pattern.strip_prefix('^').unwrap_or(pattern);
    let body = match body.strip_suffix('$') {
        Some(stripped) if !stripped.ends_with('\\') => stripped,
        _ => body,
    };
    format!("^(?:{})$", body)
}

// `$1_x` would name a group `1_x`; brace bare group numbers so they stay numeric.
fn expand_group_references(replacement: &str) -> String {
    let mut expanded = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            expanded.push(c);
            continue;
        }

        match chars.peek() {
            Some('$') => {
                chars.next();
                expanded.push_str("$$");
            }
            Some(d) if d.is_ascii_digit() => {
                let mut group = String::new();
                while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    group.push(*d);
                    chars.next();
                }
                expanded.push_str("${");
                expanded.push_str(&group);
                expanded.push('}');
            }
            _ => expanded.push('$'),
        }
    }

    expanded
}

impl SyncRule for IndicesRewriteRule {
    fn key(&self) -> &str {
        INDICES_REWRITE
    }

    fn check(&self, context: &RequestContext) -> Result<RuleMatch> {
        if !context.involves_indices() {
            return Ok(RuleMatch::Matched);
        }

        let rewritten: Vec<String> = context.indices.iter().map(|i| self.rewrite(i)).collect();
        if rewritten == context.indices {
            return Ok(RuleMatch::Matched);
        }

        Ok(RuleMatch::Rewritten(context.with_indices(rewritten)))
    }
}
