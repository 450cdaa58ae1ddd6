//! `ldap_auth`: basic-auth credentials verified against a directory.

use super::{params, AsyncRule, AsyncRuleMatch, Directories};
use crate::acl::RequestContext;
use crate::error::{IndexGateError, Result};
use crate::ldap::{AuthenticationOutcome, DirectoryClient};

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub const LDAP_AUTH: &str = "ldap_auth";

/// `{ name = "<connector>", groups = [...] }`. Without `groups` a successful
/// bind is enough; with them the user must belong to at least one.
pub struct LdapAuthRule {
    directory: Arc<dyn DirectoryClient>,
    groups: Vec<String>,
}

impl LdapAuthRule {
    pub fn new(directory: Arc<dyn DirectoryClient>, groups: Vec<String>) -> Self {
        Self { directory, groups }
    }

    pub fn from_value(value: &Value, directories: &Directories) -> Result<Self> {
        let settings = value.as_object().ok_or_else(|| {
            IndexGateError::invalid_parameter(LDAP_AUTH, "expected { name, groups }")
        })?;

        let name = settings
            .get("name")
            .ok_or_else(|| IndexGateError::invalid_parameter(LDAP_AUTH, "missing 'name'"))
            .and_then(|v| params::string(LDAP_AUTH, v))?;

        let groups = match settings.get("groups") {
            Some(groups) => params::string_list(LDAP_AUTH, groups)?,
            None => Vec::new(),
        };

        let directory = directories
            .get(&name)
            .cloned()
            .ok_or(IndexGateError::UnknownDirectory(name))?;

        Ok(Self::new(directory, groups))
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }
}

impl fmt::Debug for LdapAuthRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapAuthRule")
            .field("directory", &self.directory.name())
            .field("groups", &self.groups)
            .finish()
    }
}

#[async_trait]
impl AsyncRule for LdapAuthRule {
    fn key(&self) -> &str {
        LDAP_AUTH
    }

    async fn check(&self, context: &RequestContext) -> Result<AsyncRuleMatch> {
        let credentials = match context.basic_auth() {
            Some(credentials) => credentials,
            None => return Ok(AsyncRuleMatch::not_matched(None)),
        };

        let user_dn = self.directory.user_dn(&credentials.user);
        let outcome = self.directory.bind(&user_dn, &credentials.password).await;
        if !outcome.is_success() {
            return Ok(AsyncRuleMatch::not_matched(Some(outcome)));
        }

        if self.groups.is_empty() {
            return Ok(AsyncRuleMatch::matched(outcome));
        }

        for group in &self.groups {
            match self.directory.check_membership(&user_dn, group).await {
                Ok(true) => return Ok(AsyncRuleMatch::matched(outcome)),
                Ok(false) => continue,
                Err(e) => {
                    debug!("Membership check of {} in '{}' failed: {}", user_dn, group, e);
                    return Ok(AsyncRuleMatch::not_matched(Some(AuthenticationOutcome::from(&e))));
                }
            }
        }

        debug!("{} is not a member of any of {:?}", user_dn, self.groups);
        Ok(AsyncRuleMatch::not_matched(Some(outcome)))
    }
}
