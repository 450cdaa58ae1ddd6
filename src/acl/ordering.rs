//! Rule Ordering
//!
//! Blocks receive their rules as an unordered map. The evaluation sequence is
//! derived from a fixed precedence table so that it never depends on how the
//! configuration happened to list the keys.

use super::rules::Rule;

use std::cmp::Ordering;
use std::collections::HashMap;

/// Evaluation precedence of the built-in rules, first to last.
///
/// Cheap authentication first, then request inspection, then index rewriting
/// followed by index matching, and directory authentication last.
pub const PRECEDENCE: [&str; 12] = [
    "auth_key",
    "auth_key_sha256",
    "proxy_auth",
    "hosts",
    "x_forwarded_for",
    "methods",
    "uri_re",
    "max_body_length",
    "actions",
    "indices_rewrite",
    "indices",
    "ldap_auth",
];

/// Position of `key` in the precedence table, `None` for keys outside it.
pub fn rank(key: &str) -> Option<usize> {
    PRECEDENCE.iter().position(|k| *k == key)
}

/// Total order over rule keys: table rank first, unranked keys after every
/// ranked key, ties broken by key.
pub fn compare_keys(a: &str, b: &str) -> Ordering {
    match (rank(a), rank(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Sort rule keys into evaluation order.
pub fn order_keys<'a, I>(keys: I) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut keys: Vec<&str> = keys.into_iter().collect();
    keys.sort_by(|a, b| compare_keys(a, b));
    keys
}

/// Resolve a block's rules into their evaluation sequence.
pub fn resolve(rules: HashMap<String, Rule>) -> Vec<Rule> {
    let mut entries: Vec<(String, Rule)> = rules.into_iter().collect();
    entries.sort_by(|(a, _), (b, _)| compare_keys(a, b));
    entries.into_iter().map(|(_, rule)| rule).collect()
}
