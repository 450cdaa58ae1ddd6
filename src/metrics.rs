use crate::acl::Verdict;
use crate::error::Result;
use crate::ldap::AuthenticationOutcome;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

pub struct AclMetrics {
    pub decisions: IntCounterVec,
    pub rule_faults: IntCounterVec,
    pub directory_outcomes: IntCounterVec,
    pub decision_timeouts: IntCounter,
    pub decision_latency: Histogram,
    pub registry: Registry,
}

impl AclMetrics {
    pub fn new() -> Result<Arc<Self>> {
        let registry = Registry::new();

        let decisions = IntCounterVec::new(
            Opts::new("acl_decisions_total", "Access control decisions by verdict"),
            &["verdict"],
        )?;

        let rule_faults = IntCounterVec::new(
            Opts::new(
                "acl_rule_faults_total",
                "Rule evaluations that failed and were treated as no match",
            ),
            &["rule"],
        )?;

        let directory_outcomes = IntCounterVec::new(
            Opts::new(
                "acl_directory_outcomes_total",
                "Directory authentication outcomes seen by rules",
            ),
            &["outcome"],
        )?;

        let decision_timeouts = IntCounter::new(
            "acl_decision_timeouts_total",
            "Decisions that exceeded the decision timeout",
        )?;

        let decision_latency = Histogram::with_opts(HistogramOpts::new(
            "acl_decision_latency_seconds",
            "Time to reach an access control decision",
        ))?;

        registry.register(Box::new(decisions.clone()))?;
        registry.register(Box::new(rule_faults.clone()))?;
        registry.register(Box::new(directory_outcomes.clone()))?;
        registry.register(Box::new(decision_timeouts.clone()))?;
        registry.register(Box::new(decision_latency.clone()))?;

        Ok(Arc::new(Self {
            decisions,
            rule_faults,
            directory_outcomes,
            decision_timeouts,
            decision_latency,
            registry,
        }))
    }

    pub fn record_verdict(&self, verdict: Verdict) {
        self.decisions.with_label_values(&[verdict.as_str()]).inc();
    }

    pub fn record_rule_fault(&self, rule: &str) {
        self.rule_faults.with_label_values(&[rule]).inc();
    }

    pub fn record_directory_outcome(&self, outcome: AuthenticationOutcome) {
        self.directory_outcomes
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    /// Text exposition of every registered metric.
    pub fn gather_text(&self) -> Result<String> {
        use prometheus::Encoder;

        let mut buffer = Vec::new();
        prometheus::TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::error::IndexGateError::RuleEvaluation(e.to_string()))
    }
}
