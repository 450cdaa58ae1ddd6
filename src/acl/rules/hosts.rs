//! Address rules: `hosts` and `x_forwarded_for`.

use super::{params, RuleMatch, SyncRule};
use crate::acl::patterns::IpMatcher;
use crate::acl::RequestContext;
use crate::error::{IndexGateError, Result};

use serde_json::Value;
use std::net::IpAddr;

pub const HOSTS: &str = "hosts";
pub const X_FORWARDED_FOR: &str = "x_forwarded_for";

fn parse_matchers(rule: &str, value: &Value) -> Result<Vec<IpMatcher>> {
    params::string_list(rule, value)?
        .iter()
        .map(|entry| {
            entry
                .parse::<IpMatcher>()
                .map_err(|e| IndexGateError::invalid_parameter(rule, e.to_string()))
        })
        .collect()
}

fn any_contains(matchers: &[IpMatcher], address: &IpAddr) -> bool {
    matchers.iter().any(|m| m.contains(address))
}

/// Matches on the address of the connecting peer.
#[derive(Debug, Clone)]
pub struct HostsRule {
    allowed: Vec<IpMatcher>,
}

impl HostsRule {
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(Self {
            allowed: parse_matchers(HOSTS, value)?,
        })
    }
}

impl SyncRule for HostsRule {
    fn key(&self) -> &str {
        HOSTS
    }

    fn check(&self, context: &RequestContext) -> Result<RuleMatch> {
        Ok(if any_contains(&self.allowed, &context.remote_address) {
            RuleMatch::Matched
        } else {
            RuleMatch::NotMatched
        })
    }
}

/// Matches on the originating client reported in `X-Forwarded-For`.
#[derive(Debug, Clone)]
pub struct XForwardedForRule {
    allowed: Vec<IpMatcher>,
}

impl XForwardedForRule {
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(Self {
            allowed: parse_matchers(X_FORWARDED_FOR, value)?,
        })
    }
}

impl SyncRule for XForwardedForRule {
    fn key(&self) -> &str {
        X_FORWARDED_FOR
    }

    fn check(&self, context: &RequestContext) -> Result<RuleMatch> {
        Ok(match context.forwarded_for() {
            Some(address) if any_contains(&self.allowed, &address) => RuleMatch::Matched,
            _ => RuleMatch::NotMatched,
        })
    }
}
