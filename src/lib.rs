//! iptsafe - idempotent iptables rule application
//!
//! Applies filter and NAT rules only when they are not already active, so the
//! same rule file can be applied on every boot or every run without piling up
//! duplicate rules.
//!
//! # Architecture
//!
//! - [`core`] - Rule model, compiler, templating, snapshots and the engine
//! - [`elevation`] - Privilege escalation for iptables invocations
//! - [`validators`] - Option and replacement input validation
//! - [`config`] - Backend configuration
//!
//! # How a rule is checked
//!
//! 1. Placeholders are substituted ([`core::template`])
//! 2. The rule is compiled to its `iptables -S` form ([`core::compiler`])
//! 3. That line is looked up in the listing of the rule's table ([`core::snapshot`])
//! 4. Only if absent, the rule is executed ([`core::engine`])
//!
//! Matching is exact: a rule that iptables lists in a different form than it
//! was written in (extra `/32`, implicit `-m tcp`, different option order) is
//! not recognised and will be applied again.

#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod core;
pub mod elevation;
pub mod validators;

// Re-export commonly used types
pub use core::backend::{IptablesCommand, RuleBackend};
pub use core::engine::{ApplyOutcome, RuleEngine};
pub use core::error::{Error, Result};
pub use core::rule::{RuleSpec, Table};
pub use core::template::Replacements;
