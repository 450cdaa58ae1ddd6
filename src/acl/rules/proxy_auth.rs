//! `proxy_auth`: trust a user name set by an authenticating proxy.

use super::{params, RuleMatch, SyncRule};
use crate::acl::patterns::PatternSet;
use crate::acl::RequestContext;
use crate::error::{IndexGateError, Result};

use serde_json::Value;

pub const PROXY_AUTH: &str = "proxy_auth";
pub const DEFAULT_USER_ID_HEADER: &str = "X-Forwarded-User";

/// Accepts either a user pattern, a list of them, or
/// `{ users = [...], user_id_header = "..." }`.
#[derive(Debug, Clone)]
pub struct ProxyAuthRule {
    users: PatternSet,
    user_id_header: String,
}

impl ProxyAuthRule {
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => {
                let users = map
                    .get("users")
                    .ok_or_else(|| IndexGateError::invalid_parameter(PROXY_AUTH, "missing 'users'"))?;
                let header = match map.get("user_id_header") {
                    Some(header) => params::string(PROXY_AUTH, header)?,
                    None => DEFAULT_USER_ID_HEADER.to_string(),
                };
                Ok(Self::new(params::string_list(PROXY_AUTH, users)?, header))
            }
            other => Ok(Self::new(
                params::string_list(PROXY_AUTH, other)?,
                DEFAULT_USER_ID_HEADER.to_string(),
            )),
        }
    }

    pub fn new(users: Vec<String>, user_id_header: String) -> Self {
        Self {
            users: PatternSet::compile(users),
            user_id_header,
        }
    }
}

impl SyncRule for ProxyAuthRule {
    fn key(&self) -> &str {
        PROXY_AUTH
    }

    fn check(&self, context: &RequestContext) -> Result<RuleMatch> {
        Ok(match context.header(&self.user_id_header) {
            Some(user) if !user.trim().is_empty() && self.users.matches(user.trim()) => {
                RuleMatch::Matched
            }
            _ => RuleMatch::NotMatched,
        })
    }
}
