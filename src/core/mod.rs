//! Core rule management functionality
//!
//! This module contains the types and logic for applying iptables rules
//! idempotently. It provides:
//!
//! - [`rule`]: Structured rule descriptions and the table they target
//! - [`compiler`]: Translation of rule descriptions into iptables arguments
//! - [`template`]: Placeholder substitution in rule descriptions
//! - [`snapshot`]: Point-in-time listing of the active filter and nat rules
//! - [`backend`]: The iptables collaborator (trait and process implementation)
//! - [`engine`]: Apply-if-absent single and batch application
//! - [`error`]: Error types for rule operations

pub mod backend;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod rule;
pub mod snapshot;
pub mod template;

#[cfg(test)]
pub mod test_helpers;
