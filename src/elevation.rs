//! Privilege elevation for iptables invocations
//!
//! Modifying (and on most systems even listing) iptables rules requires root.
//! When a backend is configured to elevate, or a rule carries `"sudo": true`,
//! the iptables command is wrapped in an elevation helper.
//!
//! # Elevation Strategy
//!
//! - **Already root**: run iptables directly
//! - **Preferred**: `run0` when available (systemd v256+, no SUID)
//! - **Terminal fallback**: `sudo`
//! - **Non-interactive fallback**: `pkexec`
//!
//! # Environment Variables
//!
//! - `IPTSAFE_ELEVATION_METHOD`: Force a specific elevation method (`sudo`, `run0`, or `pkexec`).
//!   Useful for scripts with sudoers NOPASSWD rules.
//! - `IPTSAFE_TEST_NO_ELEVATION`: Bypass elevation entirely (for testing only).
//!
//! # Example
//!
//! ```no_run
//! use iptsafe::elevation::create_elevated_command;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let args = vec!["-t".to_string(), "nat".to_string(), "-S".to_string()];
//! let mut cmd = create_elevated_command("iptables", &args)?;
//! let output = cmd.output().await?;
//! # Ok(())
//! # }
//! ```

use tokio::process::Command;

/// Forces a specific elevation method
pub const ELEVATION_METHOD_ENV: &str = "IPTSAFE_ELEVATION_METHOD";

/// Disables elevation entirely when set
pub const NO_ELEVATION_ENV: &str = "IPTSAFE_TEST_NO_ELEVATION";

/// Error type for privilege elevation operations
#[derive(Debug, thiserror::Error)]
pub enum ElevationError {
    /// pkexec binary not found in PATH
    #[error("pkexec not found - please install PolicyKit")]
    PkexecNotFound,

    /// Requested elevation method is not available (binary not found)
    #[error("Elevation method '{0}' is not available (binary not found)")]
    MethodNotAvailable(String),

    /// Invalid value for `IPTSAFE_ELEVATION_METHOD`
    #[error("Invalid IPTSAFE_ELEVATION_METHOD '{0}'. Valid options: sudo, run0, pkexec")]
    InvalidMethod(String),
}

/// Checks if a binary exists in PATH
fn binary_exists(name: &str) -> bool {
    std::env::var_os("PATH")
        .is_some_and(|paths| std::env::split_paths(&paths).any(|dir| dir.join(name).is_file()))
}

fn wrapped(helper: &str, program: &str, args: &[String]) -> Command {
    let mut cmd = Command::new(helper);
    cmd.arg(program).args(args);
    cmd
}

fn direct(program: &str, args: &[String]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd
}

/// Creates a command that runs `program` with root privileges.
///
/// Arguments are passed directly without shell interpretation.
///
/// # Errors
///
/// Returns `Err` if the forced method is unknown or its binary is missing,
/// or if no usable helper exists in a non-interactive session.
pub fn create_elevated_command(program: &str, args: &[String]) -> Result<Command, ElevationError> {
    use std::os::fd::AsFd;

    // 1. Strict Test Mode Override (Highest Priority)
    if std::env::var(NO_ELEVATION_ENV).is_ok() {
        return Ok(direct(program, args));
    }

    // 2. Direct Root Execution (No prompt needed)
    if nix::unistd::getuid().is_root() {
        return Ok(direct(program, args));
    }

    // 3. Explicit elevation method override
    if let Ok(method) = std::env::var(ELEVATION_METHOD_ENV) {
        let method = method.to_lowercase();
        if !method.is_empty() {
            return match method.as_str() {
                "sudo" | "run0" | "pkexec" => {
                    if binary_exists(&method) {
                        Ok(wrapped(&method, program, args))
                    } else {
                        Err(ElevationError::MethodNotAvailable(method))
                    }
                }
                _ => Err(ElevationError::InvalidMethod(method)),
            };
        }
    }

    // 4. Automatic detection - prefer run0 (no SUID), fallback to sudo/pkexec
    if binary_exists("run0") {
        return Ok(wrapped("run0", program, args));
    }

    let is_atty = nix::unistd::isatty(std::io::stdin().as_fd()).unwrap_or(false);

    if is_atty {
        Ok(wrapped("sudo", program, args))
    } else {
        if !binary_exists("pkexec") {
            return Err(ElevationError::PkexecNotFound);
        }
        Ok(wrapped("pkexec", program, args))
    }
}

/// Creates a command that runs `program` as the current user.
pub fn create_command(program: &str, args: &[String]) -> Command {
    direct(program, args)
}
