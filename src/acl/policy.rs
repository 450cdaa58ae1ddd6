//! Block Policies and Verdicts

use super::RequestContext;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Policy a block applies when all of its rules match
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Allow the request
    Allow,

    /// Forbid the request
    Forbid,
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::Allow => f.write_str("allow"),
            Policy::Forbid => f.write_str("forbid"),
        }
    }
}

/// Final decision for a request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// A block with an allow policy matched
    Allow,

    /// A block with a forbid policy matched
    Forbid,

    /// No block matched
    DefaultDeny,
}

impl From<Policy> for Verdict {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Allow => Verdict::Allow,
            Policy::Forbid => Verdict::Forbid,
        }
    }
}

impl Verdict {
    /// Only an explicit allow lets a request through.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }

    pub fn is_denied(&self) -> bool {
        !self.is_allowed()
    }

    /// Stable label for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Allow => "allow",
            Verdict::Forbid => "forbid",
            Verdict::DefaultDeny => "default_deny",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict plus what the host needs to enforce and log it
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub verdict: Verdict,

    /// Name of the deciding block. Observability only.
    pub block: Option<String>,

    /// Context after the deciding block's rewrites; the input context on a
    /// default deny.
    pub context: RequestContext,

    pub decided_at: DateTime<Utc>,
}

impl Decision {
    pub fn matched(policy: Policy, block: &str, context: RequestContext) -> Self {
        Self {
            verdict: policy.into(),
            block: Some(block.to_string()),
            context,
            decided_at: Utc::now(),
        }
    }

    pub fn default_deny(context: RequestContext) -> Self {
        Self {
            verdict: Verdict::DefaultDeny,
            block: None,
            context,
            decided_at: Utc::now(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.verdict.is_allowed()
    }

    /// Reason text for a refused request.
    pub fn denial_reason(&self) -> Option<String> {
        match (self.verdict, &self.block) {
            (Verdict::Allow, _) => None,
            (Verdict::Forbid, Some(block)) => Some(format!("forbidden by block '{}'", block)),
            (Verdict::Forbid, None) => Some("forbidden".to_string()),
            (Verdict::DefaultDeny, _) => Some("no matching access control block".to_string()),
        }
    }
}
