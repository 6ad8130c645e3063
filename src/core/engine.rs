//! Apply-if-absent rule application
//!
//! [`RuleEngine`] decides, per rule, whether the compiled rule is already in
//! the active rule set and only executes it when it is not. The decision is a
//! pure function of the rule and a [`RuleSnapshot`] ([`decide`]); the engine
//! adds fetching, storing the latest snapshot, and execution.
//!
//! Batches fetch once. Rules in the same batch are all checked against that
//! one snapshot, so a batch containing the same new rule twice applies it
//! twice.
//!
//! # Example
//!
//! ```no_run
//! use iptsafe::core::backend::IptablesCommand;
//! use iptsafe::core::engine::RuleEngine;
//! use iptsafe::core::rule::RuleSpec;
//! use iptsafe::core::template::Replacements;
//!
//! # async fn example() -> iptsafe::Result<()> {
//! let mut engine = RuleEngine::new(IptablesCommand::from_env());
//! let rules = vec![
//!     RuleSpec::new()
//!         .with("table", "nat")
//!         .with("append", "POSTROUTING")
//!         .with("out_interface", "WAN")
//!         .with("jump", "MASQUERADE"),
//! ];
//! let map = Replacements::from_iter([("WAN", "eth0")]);
//! engine.apply_rules_safely(&rules, &map).await?;
//! # Ok(())
//! # }
//! ```

use crate::core::backend::RuleBackend;
use crate::core::compiler::{CompiledRule, compile};
use crate::core::error::Result;
use crate::core::rule::RuleSpec;
use crate::core::snapshot::RuleSnapshot;
use crate::core::template::{Replacements, expand};
use tracing::{debug, info};

/// What happened (or would happen) to a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ApplyOutcome {
    /// The rule was absent and has been executed
    #[strum(serialize = "applied")]
    Applied,
    /// The rule was already active; nothing was executed
    #[strum(serialize = "skipped")]
    Skipped,
}

/// A compiled rule and the decision taken for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRule {
    pub rule: CompiledRule,
    pub outcome: ApplyOutcome,
}

/// Expands `rule` with `replacements` (when non-empty) and compiles it.
pub fn prepare(rule: &RuleSpec, replacements: &Replacements) -> Result<CompiledRule> {
    if replacements.is_empty() {
        compile(rule)
    } else {
        compile(&expand(rule, replacements)?)
    }
}

/// Decides whether `rule` needs applying against `snapshot`.
///
/// Nat rules are looked up in the nat listing only, everything else in the
/// filter listing only.
pub fn decide(
    snapshot: &RuleSnapshot,
    rule: &RuleSpec,
    replacements: &Replacements,
) -> Result<PlannedRule> {
    let rule = prepare(rule, replacements)?;
    let outcome = if snapshot.contains(&rule) {
        ApplyOutcome::Skipped
    } else {
        ApplyOutcome::Applied
    };
    Ok(PlannedRule { rule, outcome })
}

/// Idempotent rule applier over a [`RuleBackend`].
///
/// Holds the most recently fetched snapshot; it starts out empty.
#[derive(Debug)]
pub struct RuleEngine<B> {
    backend: B,
    snapshot: RuleSnapshot,
}

impl<B: RuleBackend> RuleEngine<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            snapshot: RuleSnapshot::empty(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The snapshot the next non-refreshing check will use.
    pub fn snapshot(&self) -> &RuleSnapshot {
        &self.snapshot
    }

    /// Fetches both tables and replaces the stored snapshot.
    ///
    /// # Errors
    ///
    /// Propagates the backend's error; the stored snapshot is left exactly as
    /// it was.
    pub async fn refresh(&mut self) -> Result<&RuleSnapshot> {
        self.snapshot = RuleSnapshot::fetch(&self.backend).await?;
        Ok(&self.snapshot)
    }

    /// Applies `rule` unless it is already active.
    ///
    /// With `refresh_snapshot` the active rules are fetched first; otherwise
    /// the stored snapshot is used as is. With non-empty `replacements` the
    /// expanded rule is both checked and applied.
    ///
    /// # Errors
    ///
    /// - `Error::Parse` if the rule cannot be expanded or compiled
    /// - an execution error if listing or applying fails
    pub async fn apply_rule_safely(
        &mut self,
        rule: &RuleSpec,
        refresh_snapshot: bool,
        replacements: &Replacements,
    ) -> Result<ApplyOutcome> {
        if refresh_snapshot {
            self.refresh().await?;
        }

        let planned = decide(&self.snapshot, rule, replacements)?;
        match planned.outcome {
            ApplyOutcome::Applied => self.execute(&planned.rule).await?,
            ApplyOutcome::Skipped => {
                debug!(table = %planned.rule.table(), "Rule already active, skipping: {}", planned.rule);
            }
        }
        Ok(planned.outcome)
    }

    /// Fetches once, then safely applies each rule in order.
    ///
    /// Stops at the first failure; rules applied before it stay applied.
    pub async fn apply_rules_safely(
        &mut self,
        rules: &[RuleSpec],
        replacements: &Replacements,
    ) -> Result<Vec<ApplyOutcome>> {
        self.refresh().await?;

        let mut outcomes = Vec::with_capacity(rules.len());
        for rule in rules {
            outcomes.push(self.apply_rule_safely(rule, false, replacements).await?);
        }

        let applied = outcomes
            .iter()
            .filter(|o| **o == ApplyOutcome::Applied)
            .count();
        info!(
            "Batch complete: {applied} applied, {} already active",
            outcomes.len() - applied
        );
        Ok(outcomes)
    }

    /// Applies `rule` unconditionally.
    pub async fn apply_rule(&self, rule: &RuleSpec, replacements: &Replacements) -> Result<()> {
        let compiled = prepare(rule, replacements)?;
        self.execute(&compiled).await
    }

    /// Applies each rule unconditionally, in order, stopping at the first failure.
    pub async fn apply_rules(&self, rules: &[RuleSpec], replacements: &Replacements) -> Result<()> {
        for rule in rules {
            self.apply_rule(rule, replacements).await?;
        }
        Ok(())
    }

    /// Fetches once and reports what [`apply_rules_safely`](Self::apply_rules_safely)
    /// would do, without executing anything.
    pub async fn plan_rules(
        &mut self,
        rules: &[RuleSpec],
        replacements: &Replacements,
    ) -> Result<Vec<PlannedRule>> {
        self.refresh().await?;
        rules
            .iter()
            .map(|rule| decide(&self.snapshot, rule, replacements))
            .collect()
    }

    async fn execute(&self, rule: &CompiledRule) -> Result<()> {
        info!(table = %rule.table(), "Applying rule: {rule}");
        self.backend.execute(rule).await
    }
}
