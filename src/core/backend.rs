//! The iptables collaborator
//!
//! The engine never runs processes itself; it talks to a [`RuleBackend`],
//! which can list a table's active rules and execute a compiled rule.
//! [`IptablesCommand`] is the real implementation, spawning the iptables
//! binary (optionally through [`crate::elevation`]).

use crate::config::BackendConfig;
use crate::core::compiler::CompiledRule;
use crate::core::error::{Error, Result};
use crate::core::rule::Table;
use std::future::Future;
use std::process::Stdio;
use tracing::{debug, error};

/// Capabilities the engine needs from the packet filter.
pub trait RuleBackend {
    /// Returns the `-S` listing of `table`, one rule per line.
    fn list_rules(&self, table: Table) -> impl Future<Output = Result<String>> + Send;

    /// Runs the rule's full argument sequence.
    fn execute(&self, rule: &CompiledRule) -> impl Future<Output = Result<()>> + Send;
}

/// Process-backed [`RuleBackend`] running the iptables binary.
#[derive(Debug, Clone, Default)]
pub struct IptablesCommand {
    config: BackendConfig,
}

impl IptablesCommand {
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }

    /// Default config plus environment overrides.
    pub fn from_env() -> Self {
        Self::new(BackendConfig::default().with_env_overrides())
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Arguments for listing `table`.
    fn list_args(&self, table: Table) -> Vec<String> {
        let mut args = self.config.global_args();
        args.extend(["-t".to_string(), table.as_str().to_string(), "-S".to_string()]);
        args
    }

    /// Arguments for executing `rule` (its argv minus the program-name token).
    fn execute_args(&self, rule: &CompiledRule) -> Vec<String> {
        let mut args = self.config.global_args();
        args.extend(rule.argv().into_iter().skip(1));
        args
    }

    /// Runs the configured program and returns its stdout.
    async fn run(&self, args: Vec<String>, elevate: bool) -> Result<String> {
        let program = self.config.program.as_str();
        let mut cmd = if elevate {
            crate::elevation::create_elevated_command(program, &args)?
        } else {
            crate::elevation::create_command(program, &args)
        };

        debug!("Running {program} {}", args.join(" "));

        let child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                error!("Failed to spawn {program}: {e}");
                Error::Io(e)
            })?;

        let output = child.wait_with_output().await?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("{program} exited with {}", output.status)
            } else {
                stderr.clone()
            };
            error!("{program} failed: {message}");
            Err(Error::Execution {
                message,
                stderr: (!stderr.is_empty()).then_some(stderr),
                exit_code: output.status.code(),
            })
        }
    }
}

impl RuleBackend for IptablesCommand {
    async fn list_rules(&self, table: Table) -> Result<String> {
        self.run(self.list_args(table), self.config.elevate).await
    }

    async fn execute(&self, rule: &CompiledRule) -> Result<()> {
        let elevate = self.config.elevate || rule.wants_elevation();
        self.run(self.execute_args(rule), elevate).await.map(|_| ())
    }
}
