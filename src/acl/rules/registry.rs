//! Rule factories keyed by configuration name.

use super::auth_key::{AuthKeyRule, AuthKeySha256Rule, AUTH_KEY, AUTH_KEY_SHA256};
use super::hosts::{HostsRule, XForwardedForRule, HOSTS, X_FORWARDED_FOR};
use super::indices::{IndicesRewriteRule, IndicesRule, INDICES, INDICES_REWRITE};
use super::ldap_auth::{LdapAuthRule, LDAP_AUTH};
use super::proxy_auth::{ProxyAuthRule, PROXY_AUTH};
use super::request::{
    ActionsRule, MaxBodyLengthRule, MethodsRule, UriReRule, ACTIONS, MAX_BODY_LENGTH, METHODS,
    URI_RE,
};
use super::Rule;
use crate::error::{IndexGateError, Result};
use crate::ldap::DirectoryClient;

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Directory clients by connector name.
pub type Directories = HashMap<String, Arc<dyn DirectoryClient>>;

/// What a factory may look at besides the raw value.
pub struct RuleBuildContext<'a> {
    pub block: &'a str,
    pub directories: &'a Directories,
}

pub type RuleFactory = Arc<dyn Fn(&Value, &RuleBuildContext<'_>) -> Result<Rule> + Send + Sync>;

fn factory<F>(f: F) -> RuleFactory
where
    F: Fn(&Value, &RuleBuildContext<'_>) -> Result<Rule> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Clone)]
pub struct RuleRegistry {
    factories: HashMap<String, RuleFactory>,
}

impl RuleRegistry {
    /// A registry without any rules.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// A registry with every built-in rule.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        let builtins: [(&str, RuleFactory); 12] = [
            (AUTH_KEY, factory(|v, _| Ok(Rule::sync(AuthKeyRule::from_value(v)?)))),
            (AUTH_KEY_SHA256, factory(|v, _| Ok(Rule::sync(AuthKeySha256Rule::from_value(v)?)))),
            (PROXY_AUTH, factory(|v, _| Ok(Rule::sync(ProxyAuthRule::from_value(v)?)))),
            (HOSTS, factory(|v, _| Ok(Rule::sync(HostsRule::from_value(v)?)))),
            (X_FORWARDED_FOR, factory(|v, _| Ok(Rule::sync(XForwardedForRule::from_value(v)?)))),
            (METHODS, factory(|v, _| Ok(Rule::sync(MethodsRule::from_value(v)?)))),
            (URI_RE, factory(|v, _| Ok(Rule::sync(UriReRule::from_value(v)?)))),
            (MAX_BODY_LENGTH, factory(|v, _| Ok(Rule::sync(MaxBodyLengthRule::from_value(v)?)))),
            (ACTIONS, factory(|v, _| Ok(Rule::sync(ActionsRule::from_value(v)?)))),
            (INDICES_REWRITE, factory(|v, _| Ok(Rule::sync(IndicesRewriteRule::from_value(v)?)))),
            (INDICES, factory(|v, _| Ok(Rule::sync(IndicesRule::from_value(v)?)))),
            (
                LDAP_AUTH,
                factory(|v, ctx| Ok(Rule::async_rule(LdapAuthRule::from_value(v, ctx.directories)?))),
            ),
        ];

        for (key, factory) in builtins {
            registry.factories.insert(key.to_string(), factory);
        }
        registry
    }

    /// Register a custom rule. Keys are unique; built-ins cannot be replaced.
    pub fn register<F>(&mut self, key: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(&Value, &RuleBuildContext<'_>) -> Result<Rule> + Send + Sync + 'static,
    {
        let key = key.into();
        if self.factories.contains_key(&key) {
            return Err(IndexGateError::DuplicateRule(key));
        }
        self.factories.insert(key, Arc::new(factory));
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build the rule configured under `key`.
    pub fn build(&self, key: &str, value: &Value, context: &RuleBuildContext<'_>) -> Result<Rule> {
        let factory = self.factories.get(key).ok_or_else(|| IndexGateError::UnknownRule {
            block: context.block.to_string(),
            key: key.to_string(),
        })?;
        factory(value, context)
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("RuleRegistry").field("rules", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::rules::{RuleMatch, RuleVariant, SyncRule};
    use crate::acl::RequestContext;
    use serde_json::json;

    #[derive(Debug)]
    struct AlwaysMatch;

    impl SyncRule for AlwaysMatch {
        fn key(&self) -> &str {
            "always"
        }

        fn check(&self, _context: &RequestContext) -> Result<RuleMatch> {
            Ok(RuleMatch::Matched)
        }
    }

    fn build_context(directories: &Directories) -> RuleBuildContext<'_> {
        RuleBuildContext {
            block: "test block",
            directories,
        }
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = RuleRegistry::builtin();
        for key in ["auth_key", "proxy_auth", "hosts", "indices", "indices_rewrite", "ldap_auth"] {
            assert!(registry.contains(key), "missing {}", key);
        }
        assert_eq!(registry.keys().count(), 12);
    }

    #[test]
    fn test_unknown_key_names_the_block() {
        let registry = RuleRegistry::builtin();
        let directories = Directories::new();
        let err = registry
            .build("kibana_access", &json!("ro"), &build_context(&directories))
            .unwrap_err();
        match err {
            IndexGateError::UnknownRule { block, key } => {
                assert_eq!(block, "test block");
                assert_eq!(key, "kibana_access");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_register_custom_rule() {
        let mut registry = RuleRegistry::builtin();
        registry.register("always", |_, _| Ok(Rule::sync(AlwaysMatch))).unwrap();

        let directories = Directories::new();
        let rule = registry
            .build("always", &json!(true), &build_context(&directories))
            .unwrap();
        assert_eq!(rule.key(), "always");
        assert_eq!(rule.variant(), RuleVariant::Sync);

        let err = registry.register("hosts", |_, _| Ok(Rule::sync(AlwaysMatch))).unwrap_err();
        assert!(matches!(err, IndexGateError::DuplicateRule(ref key) if key == "hosts"));
    }

    #[test]
    fn test_parameter_errors_propagate() {
        let registry = RuleRegistry::builtin();
        let directories = Directories::new();
        let err = registry
            .build("max_body_length", &json!("lots"), &build_context(&directories))
            .unwrap_err();
        assert!(matches!(err, IndexGateError::InvalidRuleParameter { .. }));
    }
}
