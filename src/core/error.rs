use thiserror::Error;

use crate::elevation::ElevationError;

/// Core error types for iptsafe
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed (spawning iptables, reading its pipes, reading files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// iptables command ran but exited unsuccessfully
    #[error("iptables error: {message}")]
    Execution {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    /// Privilege escalation could not be arranged
    #[error("Elevation error: {0}")]
    Elevation(#[from] ElevationError),

    /// Rule specification or template expansion is malformed
    #[error("Parse error in {option}: {message}")]
    Parse { option: String, message: String },
}

impl Error {
    pub(crate) fn parse(option: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            option: option.into(),
            message: message.into(),
        }
    }

    /// True for failures of the external iptables invocation
    /// (non-zero exit, spawn or pipe I/O, elevation unavailable).
    pub fn is_execution(&self) -> bool {
        matches!(
            self,
            Self::Execution { .. } | Self::Io(_) | Self::Elevation(_)
        )
    }

    /// True for malformed rule input (bad option, bad table, bad JSON).
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::Serialization(_))
    }

    /// Returns a user-facing translation of this error.
    pub fn translate(&self) -> ErrorTranslation {
        match self {
            Self::Execution {
                message, stderr, ..
            } => IptablesErrorPattern::match_error(stderr.as_deref().unwrap_or(message)),
            Self::Io(e) => IptablesErrorPattern::match_error(&e.to_string()),
            other => ErrorTranslation::new(other.to_string()),
        }
    }
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
    pub help_url: Option<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
            help_url: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_help(mut self, url: impl Into<String>) -> Self {
        self.help_url = Some(url.into());
        self
    }
}

/// Database of iptables error patterns and their translations
pub struct IptablesErrorPattern;

impl IptablesErrorPattern {
    /// Matches an error message against known patterns and returns a user-friendly translation.
    pub fn match_error(msg: &str) -> ErrorTranslation {
        let lower = msg.to_lowercase();

        // Permission errors
        if lower.contains("permission denied")
            || lower.contains("you must be root")
            || lower.contains("operation not permitted")
        {
            return ErrorTranslation::new("Insufficient permissions to modify firewall rules")
                .with_suggestion("Run as root or enable elevation (\"elevate\": true)")
                .with_suggestion("Set IPTSAFE_ELEVATION_METHOD=sudo for NOPASSWD sudoers setups")
                .with_suggestion("Check if CAP_NET_ADMIN capability is available")
                .with_help("https://man7.org/linux/man-pages/man8/iptables.8.html");
        }

        // Missing binary
        if lower.contains("no such file") || lower.contains("command not found") {
            return ErrorTranslation::new("iptables is not installed or not found in PATH")
                .with_suggestion("Install iptables: sudo apt install iptables  (Debian/Ubuntu)")
                .with_suggestion("Or: sudo dnf install iptables  (Fedora/RHEL)")
                .with_suggestion("Or: sudo pacman -S iptables  (Arch)")
                .with_suggestion("Or point IPTSAFE_IPTABLES_COMMAND at the binary");
        }

        // Concurrent modification
        if lower.contains("xtables lock") {
            return ErrorTranslation::new("Another process is holding the xtables lock")
                .with_suggestion("Another firewall tool is modifying iptables right now")
                .with_suggestion("Set \"wait_secs\" so iptables waits for the lock")
                .with_suggestion(
                    "Check for conflicting firewall managers: sudo systemctl status firewalld ufw",
                );
        }

        // Table missing (kernel module not loaded)
        if lower.contains("table does not exist") || lower.contains("can't initialize iptables table")
        {
            return ErrorTranslation::new("Firewall table does not exist")
                .with_suggestion("The kernel module for this table may not be loaded")
                .with_suggestion("Load the NAT module: sudo modprobe iptable_nat")
                .with_help("https://wiki.archlinux.org/title/Iptables");
        }

        // Chain or target missing
        if lower.contains("no chain/target/match by that name")
            || (lower.contains("chain") && lower.contains("does not exist"))
        {
            return ErrorTranslation::new("Firewall chain, target or match not found")
                .with_suggestion("Create the chain before appending rules to it (-N CHAIN)")
                .with_suggestion("Check the spelling of the jump target")
                .with_suggestion("Ensure the match extension module is available");
        }

        // Syntax errors
        if lower.contains("bad argument")
            || lower.contains("unknown option")
            || lower.contains("invalid argument")
            || lower.contains("try `iptables -h'")
        {
            return ErrorTranslation::new("Invalid firewall rule syntax")
                .with_suggestion("Check your rule options for typos")
                .with_suggestion("Verify option values have the expected form")
                .with_suggestion("Ensure replacement placeholders were all substituted");
        }

        // Invalid address
        if lower.contains("host/network") && lower.contains("not found") {
            return ErrorTranslation::new("Invalid IP address or network")
                .with_suggestion("Use proper IP format: 192.168.1.1 or 192.168.1.0/24")
                .with_suggestion("Check CIDR notation: /24 for IPv4")
                .with_help("https://en.wikipedia.org/wiki/Classless_Inter-Domain_Routing");
        }

        // Resource busy
        if lower.contains("resource busy") || lower.contains("resource temporarily unavailable") {
            return ErrorTranslation::new("Firewall resource is busy")
                .with_suggestion("Another process may be modifying iptables")
                .with_suggestion("Wait a moment and try again");
        }

        // Generic fallback
        ErrorTranslation::new(format!("Firewall error: {msg}"))
            .with_suggestion("Check the detailed error message for more information")
            .with_suggestion("Verify iptables is working: sudo iptables -S")
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iptables_missing_command() {
        let translation = IptablesErrorPattern::match_error("sudo: iptables: command not found");
        assert!(translation.user_message.contains("not installed"));
        assert!(translation.suggestions.len() >= 3); // Multiple distro options
    }

    #[test]
    fn test_permission_error() {
        let translation = IptablesErrorPattern::match_error(
            "iptables v1.8.7 (nf_tables): Could not fetch rule set generation id: Permission denied (you must be root)",
        );
        assert!(translation.user_message.contains("permissions"));
        assert!(translation.help_url.is_some());
    }

    #[test]
    fn test_missing_chain() {
        let translation = IptablesErrorPattern::match_error(
            "iptables: No chain/target/match by that name.",
        );
        assert!(translation.user_message.contains("chain"));
        assert!(translation.suggestions.iter().any(|s| s.contains("-N")));
    }

    #[test]
    fn test_xtables_lock() {
        let translation = IptablesErrorPattern::match_error(
            "Another app is currently holding the xtables lock. Perhaps you want to use the -w option?",
        );
        assert!(translation.user_message.contains("xtables lock"));
        assert!(translation.suggestions.iter().any(|s| s.contains("wait_secs")));
    }

    #[test]
    fn test_nat_table_missing() {
        let translation = IptablesErrorPattern::match_error(
            "iptables v1.8.7 (legacy): can't initialize iptables table `nat': Table does not exist",
        );
        assert!(translation.user_message.contains("table"));
        assert!(translation.suggestions.iter().any(|s| s.contains("modprobe")));
    }

    #[test]
    fn test_bad_argument() {
        let translation = IptablesErrorPattern::match_error("Bad argument `WAN'");
        assert!(translation.user_message.contains("syntax"));
    }

    #[test]
    fn test_generic_fallback() {
        let translation = IptablesErrorPattern::match_error("something odd");
        assert!(translation.user_message.contains("something odd"));
    }

    #[test]
    fn test_error_classification() {
        let exec = Error::Execution {
            message: "exit 1".to_string(),
            stderr: None,
            exit_code: Some(1),
        };
        assert!(exec.is_execution());
        assert!(!exec.is_parse());

        let io = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(io.is_execution());

        let parse = Error::parse("table", "unsupported table 'mangle'");
        assert!(parse.is_parse());
        assert!(!parse.is_execution());
        assert_eq!(
            parse.to_string(),
            "Parse error in table: unsupported table 'mangle'"
        );
    }

    #[test]
    fn test_translate_uses_stderr() {
        let err = Error::Execution {
            message: "iptables exited with status 4".to_string(),
            stderr: Some("Another app is currently holding the xtables lock".to_string()),
            exit_code: Some(4),
        };
        assert!(err.translate().user_message.contains("xtables lock"));
    }

    #[test]
    fn test_elevation_error_is_execution_kind() {
        let err = Error::from(ElevationError::MethodNotAvailable("run0".to_string()));
        assert!(err.is_execution());
        assert!(err.translate().user_message.contains("run0"));
    }
}
