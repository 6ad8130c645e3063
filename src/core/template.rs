//! Placeholder substitution in rule specifications
//!
//! Rule files are often written against symbolic names (`WAN`, `LAN`,
//! `GATEWAY_IP`) that are only known on the target machine. [`expand`]
//! substitutes them inside text option values before compilation.
//!
//! Substitution is a single left-to-right pass per value: at each position the
//! first token (in map order) that matches is replaced and scanning resumes
//! after it. Substituted text is never rescanned, so a value that happens to
//! contain another token is inserted verbatim.
//!
//! # Example
//!
//! ```
//! use iptsafe::core::rule::RuleSpec;
//! use iptsafe::core::template::{Replacements, expand};
//!
//! let rule = RuleSpec::new()
//!     .with("append", "ROUTER-FORWARD")
//!     .with("in_interface", "WAN")
//!     .with("out_interface", "LAN")
//!     .with("jump", "ACCEPT");
//! let map = Replacements::from_iter([("WAN", "eth0"), ("LAN", "eth1")]);
//!
//! let expanded = expand(&rule, &map).unwrap();
//! assert_eq!(expanded.get("in_interface").unwrap().as_text(), Some("eth0"));
//! assert_eq!(rule.get("in_interface").unwrap().as_text(), Some("WAN"));
//! ```

use crate::core::error::{Error, Result};
use crate::core::rule::{OptionValue, RuleSpec};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;

/// Ordered placeholder token → literal map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Replacements {
    entries: Vec<(String, String)>,
}

impl Replacements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a token. Empty tokens are ignored; re-inserting a token updates
    /// its value without moving it.
    pub fn insert(&mut self, token: impl Into<String>, value: impl Into<String>) {
        let token = token.into();
        if token.is_empty() {
            return;
        }
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(t, _)| *t == token) {
            slot.1 = value;
        } else {
            self.entries.push((token, value));
        }
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| t == token)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(t, v)| (t.as_str(), v.as_str()))
    }

    /// Substitutes every token occurrence in `text`.
    pub fn substitute(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        'scan: while !rest.is_empty() {
            for (token, value) in &self.entries {
                if let Some(after) = rest.strip_prefix(token.as_str()) {
                    out.push_str(value);
                    rest = after;
                    continue 'scan;
                }
            }
            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                out.push(c);
            }
            rest = chars.as_str();
        }

        out
    }
}

impl<K, V> FromIterator<(K, V)> for Replacements
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Replacements::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

// Hand-written so file order is kept as substitution order.
impl<'de> Deserialize<'de> for Replacements {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ReplacementsVisitor;

        impl<'de> Visitor<'de> for ReplacementsVisitor {
            type Value = Replacements;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of placeholder tokens to replacement strings")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Replacements, A::Error> {
                let mut map = Replacements::new();
                while let Some((token, value)) = access.next_entry::<String, String>()? {
                    map.insert(token, value);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(ReplacementsVisitor)
    }
}

/// Returns a copy of `spec` with placeholders substituted in every text value.
///
/// Flag values and option names are left untouched. The input is never
/// modified; with an empty map the copy is identical to the input.
///
/// # Errors
///
/// Returns `Error::Parse` if a substituted value is no longer a valid option
/// value (for example a replacement introduced a line break).
pub fn expand(spec: &RuleSpec, replacements: &Replacements) -> Result<RuleSpec> {
    if replacements.is_empty() {
        return Ok(spec.clone());
    }

    spec.try_map_values(|name, value| match value {
        OptionValue::Text(text) => {
            let expanded = replacements.substitute(text);
            crate::validators::validate_option_value(&expanded)
                .map_err(|msg| Error::parse(name, format!("after substitution: {msg}")))?;
            Ok(OptionValue::Text(expanded))
        }
        OptionValue::Flag(b) => Ok(OptionValue::Flag(*b)),
    })
}
