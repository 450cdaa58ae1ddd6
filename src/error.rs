use crate::ldap::DirectoryError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexGateError>;

#[derive(Error, Debug)]
pub enum IndexGateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown rule '{key}' in block '{block}'")]
    UnknownRule { block: String, key: String },

    #[error("Invalid parameter for rule '{rule}': {reason}")]
    InvalidRuleParameter { rule: String, reason: String },

    #[error("Block name cannot be empty")]
    EmptyBlockName,

    #[error("Duplicate block name: {0}")]
    DuplicateBlock(String),

    #[error("Unknown directory connector: {0}")]
    UnknownDirectory(String),

    #[error("Rule already registered: {0}")]
    DuplicateRule(String),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Rule evaluation error: {0}")]
    RuleEvaluation(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Operation timeout")]
    Timeout,
}

impl IndexGateError {
    /// Shorthand used by rule factories when a raw setting has the wrong shape.
    pub fn invalid_parameter(rule: &str, reason: impl Into<String>) -> Self {
        IndexGateError::InvalidRuleParameter {
            rule: rule.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors raised while building blocks from configuration.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            IndexGateError::Config(_)
                | IndexGateError::InvalidConfig(_)
                | IndexGateError::UnknownRule { .. }
                | IndexGateError::InvalidRuleParameter { .. }
                | IndexGateError::EmptyBlockName
                | IndexGateError::DuplicateBlock(_)
                | IndexGateError::UnknownDirectory(_)
                | IndexGateError::DuplicateRule(_)
        )
    }
}
