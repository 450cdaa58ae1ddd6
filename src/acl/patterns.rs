//! Name and Address Patterns for Rule Matching

use crate::error::{IndexGateError, Result};

use ipnet::IpNet;
use std::net::{AddrParseError, IpAddr};
use std::str::FromStr;

/// Compiled wildcard pattern for index, user and action names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompiledPattern {
    /// Exact string match
    Exact(String),

    /// Wildcard pattern (e.g., "logs-*", "indices:data/*/search")
    Wildcard { segments: Vec<String> },

    /// Match all pattern
    All,
}

impl CompiledPattern {
    /// Compile a pattern string into an efficient matcher
    pub fn compile(pattern: &str) -> Self {
        if pattern == "*" {
            return CompiledPattern::All;
        }

        if pattern.contains('*') {
            return CompiledPattern::Wildcard {
                segments: pattern.split('*').map(str::to_string).collect(),
            };
        }

        CompiledPattern::Exact(pattern.to_string())
    }

    /// Test if this pattern matches a given string
    pub fn matches(&self, text: &str) -> bool {
        match self {
            CompiledPattern::Exact(exact) => text == exact,
            CompiledPattern::All => true,
            CompiledPattern::Wildcard { segments } => wildcard_match(segments, text),
        }
    }
}

// `segments` come from splitting on '*', so there are always at least two.
fn wildcard_match(segments: &[String], text: &str) -> bool {
    let (first, rest) = match segments.split_first() {
        Some(split) => split,
        None => return text.is_empty(),
    };
    let (last, middle) = match rest.split_last() {
        Some(split) => split,
        None => return text == first,
    };

    if !text.starts_with(first.as_str()) {
        return false;
    }
    let mut remaining = &text[first.len()..];

    for segment in middle {
        match remaining.find(segment.as_str()) {
            Some(pos) => remaining = &remaining[pos + segment.len()..],
            None => return false,
        }
    }

    remaining.len() >= last.len() && remaining.ends_with(last.as_str())
}

/// Set of patterns; matches when any member does
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternSet {
    patterns: Vec<CompiledPattern>,
}

impl PatternSet {
    pub fn compile<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| CompiledPattern::compile(p.as_ref()))
                .collect(),
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(text))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Single address or CIDR network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpMatcher {
    network: IpNet,
}

impl IpMatcher {
    pub fn contains(&self, address: &IpAddr) -> bool {
        match (self.network, address) {
            // IPv4 clients reaching a dual-stack listener arrive as ::ffff:a.b.c.d
            (IpNet::V4(net), IpAddr::V6(addr)) => addr
                .to_ipv4_mapped()
                .map_or(false, |mapped| net.contains(&mapped)),
            (network, address) => network.contains(address),
        }
    }
}

impl FromStr for IpMatcher {
    type Err = IndexGateError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = |reason: String| IndexGateError::InvalidConfig(format!("invalid address '{}': {}", s, reason));

        let network = if s.contains('/') {
            s.parse::<IpNet>().map_err(|e| invalid(e.to_string()))?
        } else {
            let address: IpAddr = s.parse().map_err(|e: AddrParseError| invalid(e.to_string()))?;
            let host_len = if address.is_ipv4() { 32 } else { 128 };
            IpNet::new(address, host_len).map_err(|e| invalid(e.to_string()))?
        };

        Ok(Self { network })
    }
}
