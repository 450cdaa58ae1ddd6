//! Request inspection rules: `methods`, `uri_re`, `max_body_length`, `actions`.

use super::{params, RuleMatch, SyncRule};
use crate::acl::patterns::PatternSet;
use crate::acl::RequestContext;
use crate::error::{IndexGateError, Result};

use regex::Regex;
use serde_json::Value;

pub const METHODS: &str = "methods";
pub const URI_RE: &str = "uri_re";
pub const MAX_BODY_LENGTH: &str = "max_body_length";
pub const ACTIONS: &str = "actions";

fn matched_if(condition: bool) -> RuleMatch {
    if condition {
        RuleMatch::Matched
    } else {
        RuleMatch::NotMatched
    }
}

#[derive(Debug, Clone)]
pub struct MethodsRule {
    methods: Vec<String>,
}

impl MethodsRule {
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(Self {
            methods: params::string_list(METHODS, value)?
                .into_iter()
                .map(|m| m.trim().to_ascii_uppercase())
                .collect(),
        })
    }
}

impl SyncRule for MethodsRule {
    fn key(&self) -> &str {
        METHODS
    }

    fn check(&self, context: &RequestContext) -> Result<RuleMatch> {
        Ok(matched_if(
            self.methods
                .iter()
                .any(|m| m.eq_ignore_ascii_case(context.method.trim())),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct UriReRule {
    pattern: Regex,
}

impl UriReRule {
    pub fn from_value(value: &Value) -> Result<Self> {
        let source = params::string(URI_RE, value)?;
        let pattern = Regex::new(&source)
            .map_err(|e| IndexGateError::invalid_parameter(URI_RE, e.to_string()))?;
        Ok(Self { pattern })
    }
}

impl SyncRule for UriReRule {
    fn key(&self) -> &str {
        URI_RE
    }

    fn check(&self, context: &RequestContext) -> Result<RuleMatch> {
        Ok(matched_if(self.pattern.is_match(&context.uri)))
    }
}

#[derive(Debug, Clone)]
pub struct MaxBodyLengthRule {
    max_length: u64,
}

impl MaxBodyLengthRule {
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(Self {
            max_length: params::unsigned(MAX_BODY_LENGTH, value)?,
        })
    }
}

impl SyncRule for MaxBodyLengthRule {
    fn key(&self) -> &str {
        MAX_BODY_LENGTH
    }

    fn check(&self, context: &RequestContext) -> Result<RuleMatch> {
        Ok(matched_if(context.content_length <= self.max_length))
    }
}

#[derive(Debug, Clone)]
pub struct ActionsRule {
    actions: PatternSet,
}

impl ActionsRule {
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(Self {
            actions: PatternSet::compile(params::string_list(ACTIONS, value)?),
        })
    }
}

impl SyncRule for ActionsRule {
    fn key(&self) -> &str {
        ACTIONS
    }

    fn check(&self, context: &RequestContext) -> Result<RuleMatch> {
        Ok(matched_if(self.actions.matches(&context.action)))
    }
}
