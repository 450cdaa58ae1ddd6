//! ACL Engine
//!
//! Holds the current block snapshot and turns request contexts into
//! decisions. The first block whose rules all match decides; when none does
//! the request is denied.

use super::block::{Block, BlockOutcome};
use super::rules::{Directories, RuleRegistry};
use super::{Decision, RequestContext, Verdict};
use crate::config::{BlockSettings, Config, EngineConfig};
use crate::error::{IndexGateError, Result};
use crate::ldap::{DirectoryClient, LdapClient};
use crate::metrics::AclMetrics;

use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

pub struct AclEngine {
    decision_timeout: Option<Duration>,
    registry: RuleRegistry,
    directories: Directories,
    blocks: RwLock<Arc<Vec<Block>>>,
    metrics: Arc<AclMetrics>,
}

impl AclEngine {
    /// Build the engine from configuration, creating an LDAP client for every
    /// configured connector.
    pub async fn from_config(config: &Config, registry: RuleRegistry) -> Result<Self> {
        config.validate()?;

        let mut directories = Directories::new();
        for connector in &config.ldaps {
            let client = LdapClient::new(connector.clone());
            if config.engine.check_directories_on_startup {
                let startup_timeout = Duration::from_millis(config.engine.startup_timeout_ms);
                client.wait_until_ready(startup_timeout).await?;
            }
            directories.insert(connector.name.clone(), Arc::new(client) as Arc<dyn DirectoryClient>);
        }

        Self::with_directories(config, registry, directories)
    }

    /// Build the engine against caller-supplied directory clients.
    pub fn with_directories(
        config: &Config,
        registry: RuleRegistry,
        directories: Directories,
    ) -> Result<Self> {
        config.validate()?;
        let blocks = build_blocks(&config.access_control_rules, &registry, &directories)?;
        let metrics = AclMetrics::new()?;

        info!(
            "ACL engine ready with {} block(s) and {} directory connector(s)",
            blocks.len(),
            directories.len()
        );

        Ok(Self {
            decision_timeout: config.engine.decision_timeout(),
            registry,
            directories,
            blocks: RwLock::new(Arc::new(blocks)),
            metrics,
        })
    }

    /// An engine over already built blocks, with no directory connectors.
    pub fn from_blocks(blocks: Vec<Block>, engine: &EngineConfig) -> Result<Self> {
        engine.validate()?;
        ensure_unique_names(&blocks)?;

        Ok(Self {
            decision_timeout: engine.decision_timeout(),
            registry: RuleRegistry::builtin(),
            directories: Directories::new(),
            blocks: RwLock::new(Arc::new(blocks)),
            metrics: AclMetrics::new()?,
        })
    }

    pub fn metrics(&self) -> &Arc<AclMetrics> {
        &self.metrics
    }

    pub fn directories(&self) -> &Directories {
        &self.directories
    }

    /// Snapshot of the current blocks.
    pub fn blocks(&self) -> Arc<Vec<Block>> {
        self.blocks.read().clone()
    }

    /// Swap in a new block set. Decisions already running keep the snapshot
    /// they started with.
    pub fn reload(&self, blocks: Vec<Block>) -> Result<()> {
        ensure_unique_names(&blocks)?;
        let count = blocks.len();
        *self.blocks.write() = Arc::new(blocks);
        info!("ACL reloaded with {} block(s)", count);
        Ok(())
    }

    /// Rebuild blocks from raw settings and swap them in. On error the
    /// current blocks stay in place.
    pub fn reload_settings(&self, settings: &[BlockSettings]) -> Result<()> {
        let blocks = build_blocks(settings, &self.registry, &self.directories)?;
        self.reload(blocks)
    }

    /// Decide on one request.
    pub async fn decide(&self, context: &RequestContext) -> Decision {
        let blocks = self.blocks();
        let timer = self.metrics.decision_latency.start_timer();

        let decision = match self.decision_timeout {
            Some(budget) => match timeout(budget, evaluate(&blocks, context, Some(self.metrics.as_ref()))).await {
                Ok(decision) => decision,
                Err(_) => {
                    warn!(
                        "[{}] ACL decision exceeded {:?}, denying",
                        context.id, budget
                    );
                    self.metrics.decision_timeouts.inc();
                    Decision::default_deny(context.clone())
                }
            },
            None => evaluate(&blocks, context, Some(self.metrics.as_ref())).await,
        };

        timer.observe_duration();
        self.metrics.record_verdict(decision.verdict);
        decision
    }
}

/// Evaluate `blocks` in order against `context`: the first matching block
/// decides, otherwise the request is denied by default.
pub async fn decide(blocks: &[Block], context: &RequestContext) -> Decision {
    evaluate(blocks, context, None).await
}

async fn evaluate(blocks: &[Block], context: &RequestContext, metrics: Option<&AclMetrics>) -> Decision {
    for block in blocks {
        match block.evaluate(context).await {
            BlockOutcome::Matched { context: final_context } => {
                let decision = Decision::matched(block.policy(), block.name(), final_context);
                debug!(
                    "[{}] {} by block '{}'",
                    context.id,
                    decision.verdict,
                    block.name()
                );
                return decision;
            }
            BlockOutcome::NotMatched {
                rule,
                authentication,
                fault,
            } => {
                debug!(
                    "[{}] block '{}' not matched at rule {}",
                    context.id,
                    block.name(),
                    rule
                );
                if let Some(metrics) = metrics {
                    if fault.is_some() {
                        metrics.record_rule_fault(&rule);
                    }
                    if let Some(outcome) = authentication {
                        metrics.record_directory_outcome(outcome);
                    }
                }
            }
        }
    }

    debug!("[{}] {}: no block matched", context.id, Verdict::DefaultDeny);
    Decision::default_deny(context.clone())
}

/// Build every block, rejecting duplicate names.
pub fn build_blocks(
    settings: &[BlockSettings],
    registry: &RuleRegistry,
    directories: &Directories,
) -> Result<Vec<Block>> {
    let blocks = settings
        .iter()
        .map(|s| Block::from_settings(s, registry, directories))
        .collect::<Result<Vec<_>>>()?;
    ensure_unique_names(&blocks)?;
    Ok(blocks)
}

fn ensure_unique_names(blocks: &[Block]) -> Result<()> {
    let mut seen = HashSet::new();
    for block in blocks {
        if !seen.insert(block.name()) {
            return Err(IndexGateError::DuplicateBlock(block.name().to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::Policy;
    use serde_json::json;

    fn settings() -> Vec<BlockSettings> {
        vec![
            BlockSettings::new("forbid secrets", Policy::Forbid).with_rule("indices", json!("secret*")),
            BlockSettings::new("localhost", Policy::Allow).with_rule("hosts", json!("127.0.0.1")),
        ]
    }

    fn engine() -> AclEngine {
        let config = Config {
            access_control_rules: settings(),
            ..Default::default()
        };
        AclEngine::with_directories(&config, RuleRegistry::builtin(), Directories::new()).unwrap()
    }

    #[tokio::test]
    async fn test_first_matching_block_wins() {
        let engine = engine();

        let secret = RequestContext::builder().index("secret-plans").build();
        let decision = engine.decide(&secret).await;
        assert_eq!(decision.verdict, Verdict::Forbid);
        assert_eq!(decision.block.as_deref(), Some("forbid secrets"));

        let logs = RequestContext::builder().index("logs").build();
        let decision = engine.decide(&logs).await;
        assert_eq!(decision.verdict, Verdict::Allow);
        assert_eq!(decision.block.as_deref(), Some("localhost"));
    }

    #[tokio::test]
    async fn test_no_match_is_default_deny() {
        let engine = engine();
        let remote = RequestContext::builder()
            .remote_address("203.0.113.9".parse().unwrap())
            .index("logs")
            .build();
        let decision = engine.decide(&remote).await;
        assert_eq!(decision.verdict, Verdict::DefaultDeny);
        assert!(decision.block.is_none());
        assert_eq!(
            engine.metrics().decisions.with_label_values(&["default_deny"]).get(),
            1
        );
    }

    #[tokio::test]
    async fn test_reload_swaps_blocks() {
        let engine = engine();
        let remote = RequestContext::builder()
            .remote_address("203.0.113.9".parse().unwrap())
            .index("logs")
            .build();
        assert_eq!(engine.decide(&remote).await.verdict, Verdict::DefaultDeny);

        let before = engine.blocks();
        engine
            .reload_settings(&[BlockSettings::new("everyone", Policy::Allow)
                .with_rule("hosts", json!(["0.0.0.0/0", "::/0"]))])
            .unwrap();

        assert_eq!(engine.decide(&remote).await.verdict, Verdict::Allow);
        assert_eq!(before.len(), 2);
        assert_eq!(engine.blocks().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_current_blocks() {
        let engine = engine();
        let err = engine
            .reload_settings(&[
                BlockSettings::new("dup", Policy::Allow).with_rule("hosts", json!("127.0.0.1")),
                BlockSettings::new("dup", Policy::Forbid).with_rule("hosts", json!("127.0.0.1")),
            ])
            .unwrap_err();
        assert!(matches!(err, IndexGateError::DuplicateBlock(ref name) if name == "dup"));
        assert_eq!(engine.blocks().len(), 2);
    }

    #[tokio::test]
    async fn test_from_blocks() {
        let registry = RuleRegistry::builtin();
        let directories = Directories::new();
        let build = || build_blocks(&settings(), &registry, &directories).unwrap();

        let engine = AclEngine::from_blocks(build(), &EngineConfig::default()).unwrap();
        let secret = RequestContext::builder().index("secret").build();
        assert_eq!(engine.decide(&secret).await.verdict, Verdict::Forbid);

        let mut doubled = build();
        doubled.extend(build());
        assert!(matches!(
            AclEngine::from_blocks(doubled, &EngineConfig::default()),
            Err(IndexGateError::DuplicateBlock(_))
        ));
    }
}
