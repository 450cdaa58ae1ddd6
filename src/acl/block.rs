//! ACL Blocks
//!
//! A block is a named, policy-tagged conjunction of rules. Its rule sequence is
//! fixed when the block is built and never changes afterwards, so one block can
//! be evaluated by any number of requests at once.

use super::ordering;
use super::rules::{Directories, Rule, RuleBuildContext, RuleOutcome, RuleRegistry};
use super::{Policy, RequestContext};
use crate::config::BlockSettings;
use crate::error::{IndexGateError, Result};
use crate::ldap::AuthenticationOutcome;

use std::collections::HashMap;
use tracing::{debug, trace, warn};

#[derive(Debug)]
pub struct Block {
    name: String,
    policy: Policy,
    rules: Vec<Rule>,
}

/// Result of evaluating one block against a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Every rule matched; `context` carries all rewrites.
    Matched { context: RequestContext },
    /// Evaluation stopped at `rule`.
    NotMatched {
        rule: String,
        authentication: Option<AuthenticationOutcome>,
        fault: Option<String>,
    },
}

impl BlockOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, BlockOutcome::Matched { .. })
    }
}

impl Block {
    /// Build a block from already constructed rules.
    pub fn new(name: impl Into<String>, policy: Policy, rules: HashMap<String, Rule>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(IndexGateError::EmptyBlockName);
        }
        if rules.is_empty() {
            return Err(IndexGateError::InvalidConfig(format!(
                "block '{}' must define at least one rule",
                name
            )));
        }

        Ok(Self {
            name,
            policy,
            rules: ordering::resolve(rules),
        })
    }

    /// Build a block from its raw settings.
    pub fn from_settings(
        settings: &BlockSettings,
        registry: &RuleRegistry,
        directories: &Directories,
    ) -> Result<Self> {
        if settings.name.trim().is_empty() {
            return Err(IndexGateError::EmptyBlockName);
        }

        let context = RuleBuildContext {
            block: &settings.name,
            directories,
        };

        let mut rules = HashMap::with_capacity(settings.rules.len());
        for (key, value) in &settings.rules {
            let rule = registry.build(key, value, &context)?;
            rules.insert(key.clone(), rule);
        }

        let block = Self::new(settings.name.clone(), settings.policy, rules)?;
        debug!(
            "Built {} block '{}' with rules {:?}",
            block.policy,
            block.name,
            block.rule_keys()
        );
        Ok(block)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Rule keys in evaluation order.
    pub fn rule_keys(&self) -> Vec<&str> {
        self.rules.iter().map(Rule::key).collect()
    }

    /// Run the rules in order, stopping at the first one that does not match.
    pub async fn evaluate(&self, context: &RequestContext) -> BlockOutcome {
        let mut current = context.clone();

        for rule in &self.rules {
            match rule.evaluate(&current).await {
                RuleOutcome::Match { rewritten, .. } => {
                    trace!("[{}] block '{}': rule {} matched", current.id, self.name, rule.key());
                    if let Some(next) = rewritten {
                        current = next;
                    }
                }
                RuleOutcome::NoMatch { authentication } => {
                    trace!("[{}] block '{}': rule {} did not match", current.id, self.name, rule.key());
                    return BlockOutcome::NotMatched {
                        rule: rule.key().to_string(),
                        authentication,
                        fault: None,
                    };
                }
                RuleOutcome::Fault { reason } => {
                    warn!(
                        "[{}] block '{}': rule {} failed, treating as no match: {}",
                        current.id,
                        self.name,
                        rule.key(),
                        reason
                    );
                    return BlockOutcome::NotMatched {
                        rule: rule.key().to_string(),
                        authentication: None,
                        fault: Some(reason),
                    };
                }
            }
        }

        BlockOutcome::Matched { context: current }
    }
}
