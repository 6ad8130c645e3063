//! Structured rule descriptions
//!
//! A [`RuleSpec`] is an ordered map of iptables option names to values, the
//! same shape the rule files use:
//!
//! ```json
//! { "table": "nat", "append": "ROUTER-INGRESS", "source": "GATEWAY_IP", "jump": "RETURN" }
//! ```
//!
//! Insertion order is significant: it is the order the compiled arguments
//! appear in, and therefore part of the rule's identity when compared against
//! `iptables -S` output.
//!
//! # Example
//!
//! ```
//! use iptsafe::core::rule::{RuleSpec, Table};
//!
//! let rule = RuleSpec::new()
//!     .with("table", "nat")
//!     .with("append", "PREROUTING")
//!     .with("jump", "MYCHAIN");
//!
//! assert_eq!(rule.table().unwrap(), Table::Nat);
//! ```

use crate::core::error::{Error, Result};
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Option name that selects the rule table
pub const TABLE_OPTION: &str = "table";

/// Short form of [`TABLE_OPTION`]
pub const TABLE_SHORT_OPTION: &str = "t";

/// Whether `name` selects the table rather than being a rule argument.
pub fn is_table_option(name: &str) -> bool {
    name == TABLE_OPTION || name == TABLE_SHORT_OPTION
}

/// Rule table a rule belongs to.
///
/// Only the tables covered by a [`RuleSnapshot`](crate::core::snapshot::RuleSnapshot)
/// are representable.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    /// The default packet-filtering table
    #[default]
    #[strum(serialize = "filter")]
    Filter,
    /// The address-translation table
    #[strum(serialize = "nat")]
    Nat,
}

impl Table {
    pub const fn as_str(self) -> &'static str {
        match self {
            Table::Filter => "filter",
            Table::Nat => "nat",
        }
    }
}

/// Value of a single rule option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// Emits `flag value`
    Text(String),
    /// `true` emits the bare flag, `false` emits nothing
    Flag(bool),
}

impl OptionValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            OptionValue::Text(s) => Some(s),
            OptionValue::Flag(_) => None,
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Text(value)
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Flag(value)
    }
}

impl Serialize for OptionValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            OptionValue::Text(s) => serializer.serialize_str(s),
            OptionValue::Flag(b) => serializer.serialize_bool(*b),
        }
    }
}

impl<'de> Deserialize<'de> for OptionValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ValueVisitor;

        impl Visitor<'_> for ValueVisitor {
            type Value = OptionValue;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string, number or boolean option value")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<OptionValue, E> {
                Ok(OptionValue::Flag(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<OptionValue, E> {
                Ok(OptionValue::Text(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<OptionValue, E> {
                Ok(OptionValue::Text(v))
            }

            // Ports and similar values are commonly written as bare numbers
            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<OptionValue, E> {
                Ok(OptionValue::Text(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<OptionValue, E> {
                Ok(OptionValue::Text(v.to_string()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<OptionValue, E> {
                Ok(OptionValue::Text(v.to_string()))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

/// Structured description of one firewall rule before compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSpec {
    options: Vec<(String, OptionValue)>,
}

impl RuleSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an option, replacing the value of an existing option with the
    /// same name in place (keeping its position).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<OptionValue>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.options.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.options.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.options
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.options.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Returns a copy with every value passed through `f`, order preserved.
    pub(crate) fn try_map_values<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(&str, &OptionValue) -> Result<OptionValue>,
    {
        let options = self
            .options
            .iter()
            .map(|(n, v)| Ok((n.clone(), f(n, v)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { options })
    }

    /// Determines the table from the declared `table` (or `t`) option.
    ///
    /// # Errors
    ///
    /// Returns `Error::Parse` if the option is a flag, names a table other
    /// than `filter` or `nat`, or `table` and `t` disagree.
    pub fn table(&self) -> Result<Table> {
        let mut declared: Option<Table> = None;
        for (name, value) in self.iter().filter(|(n, _)| is_table_option(n)) {
            let table = match value {
                OptionValue::Text(text) => text.parse::<Table>().map_err(|_| {
                    Error::parse(name, format!("unsupported table '{text}'"))
                })?,
                OptionValue::Flag(_) => {
                    return Err(Error::parse(
                        name,
                        "table must be given as a name, not a flag",
                    ));
                }
            };
            match declared {
                Some(previous) if previous != table => {
                    return Err(Error::parse(
                        name,
                        format!("conflicting tables '{previous}' and '{table}'"),
                    ));
                }
                _ => declared = Some(table),
            }
        }
        Ok(declared.unwrap_or_default())
    }

    /// Parses a single rule from a JSON object.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parses a batch of rules from a JSON array of objects.
    pub fn list_from_json(json: &str) -> Result<Vec<Self>> {
        Ok(serde_json::from_str(json)?)
    }
}

impl<N, V> FromIterator<(N, V)> for RuleSpec
where
    N: Into<String>,
    V: Into<OptionValue>,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut spec = RuleSpec::new();
        for (n, v) in iter {
            spec.set(n, v);
        }
        spec
    }
}

impl Serialize for RuleSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.options.len()))?;
        for (name, value) in &self.options {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

// Hand-written so key order survives deserialization (serde_json::Map sorts keys).
impl<'de> Deserialize<'de> for RuleSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct SpecVisitor;

        impl<'de> Visitor<'de> for SpecVisitor {
            type Value = RuleSpec;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of iptables option names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<RuleSpec, A::Error> {
                let mut spec = RuleSpec::new();
                while let Some((name, value)) = access.next_entry::<String, OptionValue>()? {
                    spec.set(name, value);
                }
                Ok(spec)
            }
        }

        deserializer.deserialize_map(SpecVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_defaults_to_filter() {
        let rule = RuleSpec::new().with("append", "INPUT").with("jump", "ACCEPT");
        assert_eq!(rule.table().unwrap(), Table::Filter);
    }

    #[test]
    fn test_table_nat() {
        let rule = RuleSpec::new().with("table", "nat").with("append", "PREROUTING");
        assert_eq!(rule.table().unwrap(), Table::Nat);
    }

    #[test]
    fn test_table_explicit_filter() {
        let rule = RuleSpec::new().with("table", "filter");
        assert_eq!(rule.table().unwrap(), Table::Filter);
    }

    #[test]
    fn test_unsupported_table() {
        let rule = RuleSpec::new().with("table", "mangle");
        let err = rule.table().unwrap_err();
        assert!(err.is_parse());
        assert!(err.to_string().contains("mangle"));
    }

    #[test]
    fn test_table_as_flag_rejected() {
        let rule = RuleSpec::new().with("table", true);
        assert!(rule.table().is_err());
    }

    #[test]
    fn test_short_table_option() {
        let rule = RuleSpec::new().with("t", "nat").with("A", "PREROUTING");
        assert_eq!(rule.table().unwrap(), Table::Nat);

        let agreeing = RuleSpec::new().with("table", "nat").with("t", "nat");
        assert_eq!(agreeing.table().unwrap(), Table::Nat);
    }

    #[test]
    fn test_conflicting_tables_rejected() {
        let rule = RuleSpec::new()
            .with("table", "nat")
            .with("t", "filter")
            .with("append", "INPUT");
        let err = rule.table().unwrap_err();
        assert!(matches!(err, Error::Parse { ref option, .. } if option == "t"));
        assert!(err.to_string().contains("conflicting"));
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut rule = RuleSpec::new()
            .with("append", "INPUT")
            .with("source", "10.0.0.1")
            .with("jump", "ACCEPT");
        rule.set("source", "10.0.0.2");

        let names: Vec<&str> = rule.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["append", "source", "jump"]);
        assert_eq!(rule.get("source"), Some(&OptionValue::from("10.0.0.2")));
    }

    #[test]
    fn test_json_preserves_key_order() {
        let rule = RuleSpec::from_json(
            r#"{"sudo": true, "table": "nat", "append": "ROUTER-INGRESS", "source": "192.168.5.1/32", "jump": "RETURN"}"#,
        )
        .unwrap();

        let names: Vec<&str> = rule.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["sudo", "table", "append", "source", "jump"]);
        assert_eq!(rule.get("sudo"), Some(&OptionValue::Flag(true)));
    }

    #[test]
    fn test_json_numbers_become_text() {
        let rule = RuleSpec::from_json(r#"{"append": "INPUT", "dport": 22}"#).unwrap();
        assert_eq!(rule.get("dport").and_then(OptionValue::as_text), Some("22"));
    }

    #[test]
    fn test_json_rejects_nested_values() {
        let result = RuleSpec::from_json(r#"{"append": ["INPUT"]}"#);
        assert!(matches!(result, Err(Error::Serialization(_))));
    }

    #[test]
    fn test_list_from_json() {
        let rules = RuleSpec::list_from_json(
            r#"[{"append": "INPUT", "jump": "ACCEPT"}, {"table": "nat", "append": "POSTROUTING", "jump": "MASQUERADE"}]"#,
        )
        .unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].table().unwrap(), Table::Nat);
    }

    #[test]
    fn test_serialize_keeps_order() {
        let rule = RuleSpec::new()
            .with("table", "nat")
            .with("append", "PREROUTING")
            .with("fragment", false);
        let json = serde_json::to_string(&rule).unwrap();
        assert_eq!(
            json,
            r#"{"table":"nat","append":"PREROUTING","fragment":false}"#
        );
    }
}
