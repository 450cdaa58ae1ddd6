//! ACL Rules
//!
//! A rule is one match condition inside a block. Synchronous rules are pure
//! functions of the request context; asynchronous rules may talk to a
//! directory service. [`Rule`] tags the two so the block evaluator only has to
//! branch once per rule to decide whether to await.
//!
//! Rule implementations report faults by returning `Err` (or, in the worst
//! case, by panicking). [`Rule::evaluate`] turns both into
//! [`RuleOutcome::Fault`], which blocks treat as a failed match.

pub mod auth_key;
pub mod hosts;
pub mod indices;
pub mod ldap_auth;
pub mod params;
pub mod proxy_auth;
pub mod registry;
pub mod request;

pub use registry::{Directories, RuleBuildContext, RuleFactory, RuleRegistry};

use super::RequestContext;
use crate::error::Result;
use crate::ldap::AuthenticationOutcome;

use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Result of a synchronous rule check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleMatch {
    Matched,
    /// Matched, and later rules must see this context instead
    Rewritten(RequestContext),
    NotMatched,
}

/// Result of an asynchronous rule check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncRuleMatch {
    pub matched: bool,
    /// Directory outcome, when the rule got as far as asking one
    pub authentication: Option<AuthenticationOutcome>,
}

impl AsyncRuleMatch {
    pub fn matched(authentication: AuthenticationOutcome) -> Self {
        Self {
            matched: true,
            authentication: Some(authentication),
        }
    }

    pub fn not_matched(authentication: Option<AuthenticationOutcome>) -> Self {
        Self {
            matched: false,
            authentication,
        }
    }
}

pub trait SyncRule: Send + Sync + fmt::Debug {
    fn key(&self) -> &str;

    fn check(&self, context: &RequestContext) -> Result<RuleMatch>;
}

#[async_trait]
pub trait AsyncRule: Send + Sync + fmt::Debug {
    fn key(&self) -> &str;

    async fn check(&self, context: &RequestContext) -> Result<AsyncRuleMatch>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleVariant {
    Sync,
    Async,
}

#[derive(Debug)]
pub enum Rule {
    Sync(Box<dyn SyncRule>),
    Async(Box<dyn AsyncRule>),
}

/// What a block sees after running one rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Match {
        rewritten: Option<RequestContext>,
        authentication: Option<AuthenticationOutcome>,
    },
    NoMatch {
        authentication: Option<AuthenticationOutcome>,
    },
    Fault {
        reason: String,
    },
}

impl RuleOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, RuleOutcome::Match { .. })
    }
}

impl Rule {
    pub fn sync(rule: impl SyncRule + 'static) -> Self {
        Rule::Sync(Box::new(rule))
    }

    pub fn async_rule(rule: impl AsyncRule + 'static) -> Self {
        Rule::Async(Box::new(rule))
    }

    pub fn key(&self) -> &str {
        match self {
            Rule::Sync(rule) => rule.key(),
            Rule::Async(rule) => rule.key(),
        }
    }

    pub fn variant(&self) -> RuleVariant {
        match self {
            Rule::Sync(_) => RuleVariant::Sync,
            Rule::Async(_) => RuleVariant::Async,
        }
    }

    /// Run the rule against `context`, containing errors and panics.
    pub async fn evaluate(&self, context: &RequestContext) -> RuleOutcome {
        match self {
            Rule::Sync(rule) => match catch_unwind(AssertUnwindSafe(|| rule.check(context))) {
                Ok(Ok(RuleMatch::Matched)) => RuleOutcome::Match {
                    rewritten: None,
                    authentication: None,
                },
                Ok(Ok(RuleMatch::Rewritten(next))) => RuleOutcome::Match {
                    rewritten: Some(next),
                    authentication: None,
                },
                Ok(Ok(RuleMatch::NotMatched)) => RuleOutcome::NoMatch { authentication: None },
                Ok(Err(e)) => RuleOutcome::Fault { reason: e.to_string() },
                Err(panic) => RuleOutcome::Fault {
                    reason: panic_message(panic),
                },
            },
            Rule::Async(rule) => match AssertUnwindSafe(rule.check(context)).catch_unwind().await {
                Ok(Ok(result)) if result.matched => RuleOutcome::Match {
                    rewritten: None,
                    authentication: result.authentication,
                },
                Ok(Ok(result)) => RuleOutcome::NoMatch {
                    authentication: result.authentication,
                },
                Ok(Err(e)) => RuleOutcome::Fault { reason: e.to_string() },
                Err(panic) => RuleOutcome::Fault {
                    reason: panic_message(panic),
                },
            },
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("rule panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("rule panicked: {}", s)
    } else {
        "rule panicked".to_string()
    }
}
