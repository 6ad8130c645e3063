//! iptsafe - apply iptables rules without duplicating them
//!
//! # Usage
//!
//! ```bash
//! iptsafe list                                   # Show active filter and nat rules
//! iptsafe list --table nat                       # Only the nat table
//! iptsafe check rules.json --set WAN=eth0        # Show what apply would do
//! iptsafe apply rules.json --set WAN=eth0 --set LAN=eth1
//! iptsafe apply rules.json --force               # Apply without checking
//! ```
//!
//! A rule file holds one rule object or an array of them:
//!
//! ```json
//! [
//!   { "table": "nat", "append": "POSTROUTING", "out_interface": "WAN", "jump": "MASQUERADE" },
//!   { "append": "FORWARD", "in_interface": "LAN", "out_interface": "WAN", "jump": "ACCEPT" }
//! ]
//! ```

use clap::{Parser, Subcommand};
use iptsafe::config::{self, BackendConfig};
use iptsafe::core::engine::ApplyOutcome;
use iptsafe::{Error, IptablesCommand, Replacements, RuleEngine, RuleSpec, Table};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "iptsafe")]
#[command(about = "Idempotent iptables rule application", long_about = None)]
struct Cli {
    /// Backend config file (JSON)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run iptables through sudo/run0/pkexec
    #[arg(long, global = true)]
    elevate: bool,

    /// Log every iptables invocation
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the active rules
    List {
        /// Only list this table (filter or nat)
        #[arg(short, long)]
        table: Option<Table>,
    },
    /// Show which rules would be applied and which are already active
    Check {
        /// Rule file (JSON object or array of objects)
        rules: PathBuf,
        /// Placeholder substitution, repeatable
        #[arg(short, long = "set", value_name = "TOKEN=VALUE", value_parser = iptsafe::validators::parse_replacement)]
        set: Vec<(String, String)>,
    },
    /// Apply rules that are not already active
    Apply {
        /// Rule file (JSON object or array of objects)
        rules: PathBuf,
        /// Placeholder substitution, repeatable
        #[arg(short, long = "set", value_name = "TOKEN=VALUE", value_parser = iptsafe::validators::parse_replacement)]
        set: Vec<(String, String)>,
        /// Apply every rule without checking for existing ones
        #[arg(long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(handle_cli(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("iptsafe=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn report(error: &Error) {
    let translation = error.translate();
    eprintln!("Error: {error}");
    if translation.user_message != error.to_string() {
        eprintln!("  {}", translation.user_message);
    }
    for suggestion in &translation.suggestions {
        eprintln!("  - {suggestion}");
    }
    if let Some(url) = &translation.help_url {
        eprintln!("  See: {url}");
    }
}

async fn load_backend(cli: &Cli) -> iptsafe::Result<IptablesCommand> {
    let mut config = match &cli.config {
        Some(path) => config::load_config(path).await?,
        None => BackendConfig::default().with_env_overrides(),
    };
    if cli.elevate {
        config.elevate = true;
    }
    Ok(IptablesCommand::new(config))
}

async fn load_rules(path: &Path) -> iptsafe::Result<Vec<RuleSpec>> {
    let json = tokio::fs::read_to_string(path).await?;
    if json.trim_start().starts_with('[') {
        RuleSpec::list_from_json(&json)
    } else {
        Ok(vec![RuleSpec::from_json(&json)?])
    }
}

async fn handle_cli(cli: Cli) -> iptsafe::Result<()> {
    let backend = load_backend(&cli).await?;
    let mut engine = RuleEngine::new(backend);

    match cli.command {
        Commands::List { table } => {
            let snapshot = engine.refresh().await?;
            let tables = match table {
                Some(table) => vec![table],
                None => vec![Table::Filter, Table::Nat],
            };
            for table in tables {
                println!("{}", snapshot.header(table));
                for line in snapshot.rules(table).iter().filter(|l| !l.is_empty()) {
                    println!("{line}");
                }
            }
        }
        Commands::Check { rules, set } => {
            let rules = load_rules(&rules).await?;
            let replacements = Replacements::from_iter(set);
            let plan = engine.plan_rules(&rules, &replacements).await?;
            for planned in &plan {
                let marker = match planned.outcome {
                    ApplyOutcome::Applied => "+",
                    ApplyOutcome::Skipped => "=",
                };
                println!("{marker} [{}] {}", planned.rule.table(), planned.rule);
            }
            let pending = plan
                .iter()
                .filter(|p| p.outcome == ApplyOutcome::Applied)
                .count();
            println!("{pending} of {} rule(s) would be applied", plan.len());
        }
        Commands::Apply { rules, set, force } => {
            let rules = load_rules(&rules).await?;
            let replacements = Replacements::from_iter(set);
            if force {
                engine.apply_rules(&rules, &replacements).await?;
                println!("✓ Applied {} rule(s) without checking", rules.len());
            } else {
                let outcomes = engine.apply_rules_safely(&rules, &replacements).await?;
                let applied = outcomes
                    .iter()
                    .filter(|o| **o == ApplyOutcome::Applied)
                    .count();
                println!(
                    "✓ Applied {applied} rule(s), {} already active",
                    outcomes.len() - applied
                );
            }
        }
    }
    Ok(())
}
