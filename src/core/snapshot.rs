//! Point-in-time view of the active rules
//!
//! A [`RuleSnapshot`] holds the `iptables -S` lines of the filter and nat
//! tables exactly as listed (blank lines included). It is immutable: a
//! refresh produces a new snapshot rather than updating an old one.

use crate::core::backend::RuleBackend;
use crate::core::compiler::CompiledRule;
use crate::core::error::Result;
use crate::core::rule::Table;
use chrono::{DateTime, Utc};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSnapshot {
    filter: Vec<String>,
    nat: Vec<String>,
    taken_at: DateTime<Utc>,
}

impl Default for RuleSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl RuleSnapshot {
    /// A snapshot with no rules, as held by an engine that has never fetched.
    pub fn empty() -> Self {
        Self {
            filter: Vec::new(),
            nat: Vec::new(),
            taken_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Builds a snapshot from raw listing output of both tables.
    ///
    /// Lines are split on `'\n'` only, without trimming or filtering, so a
    /// trailing newline yields a trailing empty line.
    pub fn from_listings(filter: &str, nat: &str) -> Self {
        Self {
            filter: split_lines(filter),
            nat: split_lines(nat),
            taken_at: Utc::now(),
        }
    }

    /// Lists both tables through `backend`, filter first.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if either listing fails. Nothing is
    /// returned in that case, so a previously held snapshot stays intact.
    pub async fn fetch<B: RuleBackend>(backend: &B) -> Result<Self> {
        let filter = backend.list_rules(Table::Filter).await?;
        let nat = backend.list_rules(Table::Nat).await?;
        let snapshot = Self::from_listings(&filter, &nat);
        debug!(
            filter_lines = snapshot.filter.len(),
            nat_lines = snapshot.nat.len(),
            "Fetched rule snapshot"
        );
        Ok(snapshot)
    }

    pub fn rules(&self, table: Table) -> &[String] {
        match table {
            Table::Filter => &self.filter,
            Table::Nat => &self.nat,
        }
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Comment line introducing `table` in printed listings.
    pub fn header(&self, table: Table) -> String {
        format!(
            "# {table} (listed {})",
            self.taken_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }

    /// Exact-match membership of `rule` in its own table's listing.
    pub fn contains(&self, rule: &CompiledRule) -> bool {
        self.contains_line(rule.table(), &rule.canonical())
    }

    pub fn contains_line(&self, table: Table, line: &str) -> bool {
        self.rules(table).iter().any(|existing| existing == line)
    }
}

fn split_lines(blob: &str) -> Vec<String> {
    blob.split('\n').map(String::from).collect()
}
