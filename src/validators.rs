//! Input validation for rule options and replacement tokens
//!
//! Arguments are handed to iptables as an argv vector, never through a shell,
//! so the checks here are about keeping a rule representable as a single
//! `iptables -S` line rather than about quoting.

/// Longest option name accepted (longest real iptables long option is well below this)
const MAX_OPTION_NAME_LEN: usize = 64;

/// Validates an option name such as `append`, `in_interface` or `to-destination`.
///
/// # Errors
///
/// Returns `Err` if the name is empty, too long, starts with a dash, or
/// contains characters other than ASCII alphanumerics, `_` and `-`.
///
/// # Examples
///
/// ```
/// use iptsafe::validators::validate_option_name;
///
/// assert!(validate_option_name("in_interface").is_ok());
/// assert!(validate_option_name("--append").is_err());
/// assert!(validate_option_name("a b").is_err());
/// ```
pub fn validate_option_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Option name is empty".to_string());
    }

    if name.len() > MAX_OPTION_NAME_LEN {
        return Err(format!(
            "Option name too long (max {MAX_OPTION_NAME_LEN} characters)"
        ));
    }

    if name.starts_with('-') {
        return Err("Option name must not start with '-' (the flag prefix is added automatically)".to_string());
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
    {
        return Err("Option name contains invalid characters".to_string());
    }

    Ok(())
}

/// Validates an option value.
///
/// A value may contain spaces (comments do), but a line break or NUL byte
/// would split or truncate the rule's `iptables -S` line.
///
/// # Errors
///
/// Returns `Err` if the value contains `\n`, `\r` or `\0`.
pub fn validate_option_value(value: &str) -> Result<(), String> {
    if value.contains(['\n', '\r']) {
        return Err("Value contains a line break".to_string());
    }

    if value.contains('\0') {
        return Err("Value contains a NUL byte".to_string());
    }

    Ok(())
}

/// Parses a `TOKEN=VALUE` replacement assignment.
///
/// The value may itself contain `=`; only the first one separates.
///
/// # Errors
///
/// Returns `Err` if there is no `=` or the token is empty.
pub fn parse_replacement(input: &str) -> Result<(String, String), String> {
    let (token, value) = input
        .split_once('=')
        .ok_or_else(|| format!("Expected TOKEN=VALUE, got '{input}'"))?;

    if token.is_empty() {
        return Err("Replacement token is empty".to_string());
    }

    validate_option_value(value)?;

    Ok((token.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_option_names() {
        for name in ["A", "append", "in_interface", "to-destination", "ctstate", "m"] {
            assert!(validate_option_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_option_names() {
        assert!(validate_option_name("").is_err());
        assert!(validate_option_name("-A").is_err());
        assert!(validate_option_name("jump target").is_err());
        assert!(validate_option_name("source;rm").is_err());
        assert!(validate_option_name(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_option_values() {
        assert!(validate_option_value("192.168.1.0/24").is_ok());
        assert!(validate_option_value("allow ssh from lan").is_ok());
        assert!(validate_option_value("").is_ok());
        assert!(validate_option_value("eth0\n-A INPUT -j ACCEPT").is_err());
        assert!(validate_option_value("eth0\r").is_err());
        assert!(validate_option_value("eth\00").is_err());
    }

    #[test]
    fn test_parse_replacement() {
        assert_eq!(
            parse_replacement("WAN=eth0").unwrap(),
            ("WAN".to_string(), "eth0".to_string())
        );
        assert_eq!(
            parse_replacement("MARK=a=b").unwrap(),
            ("MARK".to_string(), "a=b".to_string())
        );
        assert_eq!(
            parse_replacement("EMPTY=").unwrap(),
            ("EMPTY".to_string(), String::new())
        );
        assert!(parse_replacement("WAN").is_err());
        assert!(parse_replacement("=eth0").is_err());
    }
}
