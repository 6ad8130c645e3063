use crate::core::compiler::PROGRAM_NAME;
use crate::core::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Overrides the iptables program path (used by tests to inject a mock)
pub const IPTABLES_COMMAND_ENV: &str = "IPTSAFE_IPTABLES_COMMAND";

/// Settings for the process-backed iptables collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Program to run, by name (looked up in PATH) or path
    #[serde(default = "default_program")]
    pub program: String,
    /// Wrap every invocation in sudo/run0/pkexec (see [`crate::elevation`]).
    /// Rules with `"sudo": true` are elevated regardless.
    #[serde(default)]
    pub elevate: bool,
    /// Passed as `-w <secs>` so iptables waits for the xtables lock held by
    /// concurrent writers instead of failing immediately
    #[serde(default)]
    pub wait_secs: Option<u32>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            elevate: false,
            wait_secs: None,
        }
    }
}

fn default_program() -> String {
    PROGRAM_NAME.to_string()
}

impl BackendConfig {
    /// Applies `IPTSAFE_IPTABLES_COMMAND` if set and non-empty.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(program) = std::env::var(IPTABLES_COMMAND_ENV)
            && !program.is_empty()
        {
            self.program = program;
        }
        self
    }

    /// Global options placed before every command's own arguments.
    pub(crate) fn global_args(&self) -> Vec<String> {
        match self.wait_secs {
            Some(secs) => vec!["-w".to_string(), secs.to_string()],
            None => Vec::new(),
        }
    }
}

/// Loads a backend config from a JSON file, then applies environment overrides.
///
/// Missing fields take their defaults.
///
/// # Errors
///
/// Returns `Err` if the file cannot be read or is not valid JSON.
pub async fn load_config(path: &Path) -> Result<BackendConfig> {
    let json = tokio::fs::read_to_string(path).await?;
    let config: BackendConfig = serde_json::from_str(&json)?;
    Ok(config.with_env_overrides())
}
