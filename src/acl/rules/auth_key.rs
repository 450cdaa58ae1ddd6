//! Static credential rules: `auth_key` and `auth_key_sha256`.

use super::{params, RuleMatch, SyncRule};
use crate::acl::RequestContext;
use crate::error::{IndexGateError, Result};

use serde_json::Value;
use sha2::{Digest, Sha256};

pub const AUTH_KEY: &str = "auth_key";
pub const AUTH_KEY_SHA256: &str = "auth_key_sha256";

/// Matches when basic auth carries exactly `user:password`.
#[derive(Debug, Clone)]
pub struct AuthKeyRule {
    digest: [u8; 32],
}

impl AuthKeyRule {
    pub fn from_value(value: &Value) -> Result<Self> {
        let key = params::string(AUTH_KEY, value)?;
        if !key.contains(':') {
            return Err(IndexGateError::invalid_parameter(
                AUTH_KEY,
                "expected 'user:password'",
            ));
        }
        Ok(Self { digest: sha256(&key) })
    }
}

impl SyncRule for AuthKeyRule {
    fn key(&self) -> &str {
        AUTH_KEY
    }

    fn check(&self, context: &RequestContext) -> Result<RuleMatch> {
        Ok(match context.basic_auth_pair() {
            Some(pair) if sha256(&pair) == self.digest => RuleMatch::Matched,
            _ => RuleMatch::NotMatched,
        })
    }
}

/// Matches when the sha256 of basic auth `user:password` equals the
/// configured hex digest.
#[derive(Debug, Clone)]
pub struct AuthKeySha256Rule {
    digest: [u8; 32],
}

impl AuthKeySha256Rule {
    pub fn from_value(value: &Value) -> Result<Self> {
        let encoded = params::string(AUTH_KEY_SHA256, value)?;
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| IndexGateError::invalid_parameter(AUTH_KEY_SHA256, e.to_string()))?;
        let digest: [u8; 32] = bytes.try_into().map_err(|_| {
            IndexGateError::invalid_parameter(AUTH_KEY_SHA256, "expected a 64 character hex digest")
        })?;
        Ok(Self { digest })
    }
}

impl SyncRule for AuthKeySha256Rule {
    fn key(&self) -> &str {
        AUTH_KEY_SHA256
    }

    fn check(&self, context: &RequestContext) -> Result<RuleMatch> {
        Ok(match context.basic_auth_pair() {
            Some(pair) if sha256(&pair) == self.digest => RuleMatch::Matched,
            _ => RuleMatch::NotMatched,
        })
    }
}

fn sha256(text: &str) -> [u8; 32] {
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&Sha256::digest(text.as_bytes()));
    digest
}
