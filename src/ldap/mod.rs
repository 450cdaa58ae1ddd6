//! Directory Authentication
//!
//! LDAP-backed credential and group verification used by asynchronous rules.
//! The engine only ever talks to a directory through [`DirectoryClient`], so
//! rules can be exercised against an in-memory fake as easily as against a
//! live server.

pub mod client;
pub mod dn;
pub mod ldif;

pub use client::{ConnectionState, LdapClient};
pub use dn::{domain_to_dn, user_dn};
pub use ldif::{LdifEntry, LdifReader};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result of a directory bind or group check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthenticationOutcome {
    Success,
    InvalidCredentials,
    ConnectionFailure,
    Timeout,
}

impl AuthenticationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AuthenticationOutcome::Success)
    }

    /// Stable label for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthenticationOutcome::Success => "success",
            AuthenticationOutcome::InvalidCredentials => "invalid_credentials",
            AuthenticationOutcome::ConnectionFailure => "connection_failure",
            AuthenticationOutcome::Timeout => "timeout",
        }
    }
}

impl fmt::Display for AuthenticationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure talking to a directory service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("cannot connect to directory {address}: {reason}")]
    ConnectionFailure { address: String, reason: String },

    #[error("directory operation timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("bind rejected with result code {code}")]
    BindFailed { code: u32 },

    /// The server answered but refused the operation, e.g. `noSuchObject`
    /// (32) for a search base that does not exist.
    #[error("directory {operation} failed with result code {code}: {message}")]
    OperationFailed {
        operation: String,
        code: u32,
        message: String,
    },

    #[error("directory protocol error: {0}")]
    Protocol(String),
}

impl From<&DirectoryError> for AuthenticationOutcome {
    fn from(error: &DirectoryError) -> Self {
        match error {
            DirectoryError::ConnectionFailure { .. }
            | DirectoryError::OperationFailed { .. }
            | DirectoryError::Protocol(_) => {
                AuthenticationOutcome::ConnectionFailure
            }
            DirectoryError::Timeout { .. } => AuthenticationOutcome::Timeout,
            DirectoryError::BindFailed { .. } => AuthenticationOutcome::InvalidCredentials,
        }
    }
}

/// Narrow interface over a directory service.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Connector name, as referenced by `ldap_auth` rules.
    fn name(&self) -> &str;

    /// Distinguished name of the entry a user id authenticates as.
    fn user_dn(&self, user_id: &str) -> String;

    /// Verify `password` for `dn` with a simple bind.
    async fn bind(&self, dn: &str, password: &str) -> AuthenticationOutcome;

    /// Whether `dn` is a member of `group`.
    async fn check_membership(&self, dn: &str, group: &str) -> Result<bool, DirectoryError>;
}
