//! Access Control
//!
//! Ordered blocks of rules evaluated against a request context. Blocks are
//! tried in configuration order and the first one whose rules all match
//! decides the verdict; a request no block matches is denied.

pub mod block;
pub mod context;
pub mod engine;
pub mod ordering;
pub mod patterns;
pub mod policy;
pub mod rules;

pub use block::{Block, BlockOutcome};
pub use context::{BasicCredentials, RequestContext, RequestContextBuilder};
pub use engine::{build_blocks, decide, AclEngine};
pub use patterns::{CompiledPattern, IpMatcher, PatternSet};
pub use policy::{Decision, Policy, Verdict};
pub use rules::{
    AsyncRule, AsyncRuleMatch, Rule, RuleMatch, RuleOutcome, RuleRegistry, RuleVariant, SyncRule,
};
