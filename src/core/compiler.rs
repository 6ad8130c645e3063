//! Translation of a [`RuleSpec`] into iptables arguments
//!
//! The translation is fixed and mirrors what `iptables -S` prints back, so
//! that a compiled rule can be compared to listed rules as plain strings:
//!
//! - long aliases map to short flags (`append` → `-A`, `source` → `-s`, ...)
//! - other single letters are used as short flags (`A` → `-A`)
//! - anything else becomes a long option with `_` turned into `-`
//!   (`to_destination` → `--to-destination`)
//! - a value starting with `!` negates the option (`! -s 10.0.0.0/8`)
//! - `Flag(true)` emits the bare flag, `Flag(false)` emits nothing
//! - `table` (or `t`) selects [`CompiledRule::table`] and `sudo` requests
//!   elevation; neither is a rule argument
//!
//! # Example
//!
//! ```
//! use iptsafe::core::compiler::compile;
//! use iptsafe::core::rule::{RuleSpec, Table};
//!
//! let rule = RuleSpec::new()
//!     .with("table", "nat")
//!     .with("append", "ROUTER-INGRESS")
//!     .with("source", "192.168.5.1/32")
//!     .with("jump", "RETURN");
//!
//! let compiled = compile(&rule).unwrap();
//! assert_eq!(compiled.table(), Table::Nat);
//! assert_eq!(compiled.canonical(), "-A ROUTER-INGRESS -s 192.168.5.1/32 -j RETURN");
//! ```

use crate::core::error::{Error, Result};
use crate::core::rule::{OptionValue, RuleSpec, Table, is_table_option};
use std::borrow::Cow;
use std::fmt;

/// Program-name token that starts every argument sequence
pub const PROGRAM_NAME: &str = "iptables";

/// Option name that requests privilege elevation for a rule
pub const SUDO_OPTION: &str = "sudo";

/// A rule compiled to iptables arguments, tagged with its table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRule {
    table: Table,
    args: Vec<String>,
    elevate: bool,
}

impl CompiledRule {
    pub fn table(&self) -> Table {
        self.table
    }

    /// Rule arguments, without program name or table selector.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Whether the rule asked to be run with elevated privileges (`sudo: true`).
    pub fn wants_elevation(&self) -> bool {
        self.elevate
    }

    /// Full argument sequence: program name, table selector (non-default
    /// tables only), then the rule arguments.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 3);
        argv.push(PROGRAM_NAME.to_string());
        if self.table != Table::Filter {
            argv.push("-t".to_string());
            argv.push(self.table.as_str().to_string());
        }
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// The canonical rule string used as the rule's identity.
    ///
    /// Arguments are joined by single spaces. Empty arguments and arguments
    /// containing whitespace or quotes are double-quoted the way
    /// `iptables -S` prints them.
    pub fn canonical(&self) -> String {
        self.args
            .iter()
            .map(|arg| quote_arg(arg))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CompiledRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

fn quote_arg(arg: &str) -> Cow<'_, str> {
    if !arg.is_empty() && !arg.contains(|c: char| c.is_whitespace() || c == '"') {
        return Cow::Borrowed(arg);
    }
    let escaped = arg.replace('\\', "\\\\").replace('"', "\\\"");
    Cow::Owned(format!("\"{escaped}\""))
}

/// Maps an option name to the flag iptables expects.
fn flag_for(name: &str) -> Cow<'_, str> {
    let short = match name {
        "append" => "-A",
        "delete" => "-D",
        "insert" => "-I",
        "replace" => "-R",
        "list" => "-L",
        "list_rules" => "-S",
        "flush" => "-F",
        "zero" => "-Z",
        "new_chain" => "-N",
        "delete_chain" => "-X",
        "policy" => "-P",
        "rename_chain" => "-E",
        "protocol" => "-p",
        "source" => "-s",
        "destination" => "-d",
        "jump" => "-j",
        "goto" => "-g",
        "in_interface" => "-i",
        "out_interface" => "-o",
        "fragment" => "-f",
        "set_counters" => "-c",
        "match" => "-m",
        _ if name.len() == 1 => return Cow::Owned(format!("-{name}")),
        _ => return Cow::Owned(format!("--{}", name.replace('_', "-"))),
    };
    Cow::Borrowed(short)
}

/// Splits a leading `!` off a value.
fn split_negation(value: &str) -> (bool, &str) {
    match value.strip_prefix('!') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, value),
    }
}

/// Compiles a rule specification.
///
/// # Errors
///
/// Returns `Error::Parse` if:
/// - an option name or value fails validation
/// - the `table`/`t` option names an unsupported table, or they disagree
/// - `sudo` is text other than `true`/`false`
/// - the rule has no arguments besides `table`/`sudo`
pub fn compile(spec: &RuleSpec) -> Result<CompiledRule> {
    let table = spec.table()?;
    let mut args = Vec::with_capacity(spec.len() * 2);
    let mut elevate = false;

    for (name, value) in spec.iter() {
        crate::validators::validate_option_name(name).map_err(|msg| Error::parse(name, msg))?;

        if is_table_option(name) {
            continue;
        }
        if name == SUDO_OPTION {
            elevate = match value {
                OptionValue::Flag(b) => *b,
                OptionValue::Text(text) => text.trim().parse::<bool>().map_err(|_| {
                    Error::parse(name, format!("expected true or false, got '{text}'"))
                })?,
            };
            continue;
        }

        match value {
            OptionValue::Flag(false) => {}
            OptionValue::Flag(true) => args.push(flag_for(name).into_owned()),
            OptionValue::Text(text) => {
                crate::validators::validate_option_value(text)
                    .map_err(|msg| Error::parse(name, msg))?;

                let (negated, text) = split_negation(text);
                if negated {
                    args.push("!".to_string());
                }
                args.push(flag_for(name).into_owned());
                args.push(text.to_string());
            }
        }
    }

    if args.is_empty() {
        return Err(Error::parse("rule", "rule has no iptables arguments"));
    }

    Ok(CompiledRule {
        table,
        args,
        elevate,
    })
}
