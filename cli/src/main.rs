use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;

use lyra_resilience::config::ResilienceConfig;
use lyra_resilience::error::{ErrorCategory, ErrorDetails, Severity};
use lyra_resilience::events::ResetBus;
use lyra_resilience::logger::{ErrorLogger, ErrorStats};
use lyra_resilience::logging::{init_logging, LoggingConfig};
use lyra_resilience::network::{NetworkOrchestrator, RequestSpec, RetryOverrides};
use lyra_resilience::platform::Platform;
use lyra_resilience::recovery::{RecoveryManager, RecoveryResult, RecoveryStats};
use lyra_resilience::store::{FileStore, KeyValueStore};

#[derive(Parser)]
#[command(name = "lyra-resilience")]
#[command(author, version, about = "Inspect and exercise the Lyra resilience layer")]
#[command(after_help = "Examples:
  lyra-resilience stats                    Error log summary
  lyra-resilience recover full-wipe        Run one recovery strategy
  lyra-resilience probe https://x.test/    One orchestrated GET request
  lyra-resilience strategies --json        Catalog as JSON")]
struct Cli {
    /// Directory holding the local and session stores
    #[arg(short = 'd', long, value_name = "PATH", env = "LYRA_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// TOML configuration file (environment overrides still apply)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize the persisted error log
    Stats,
    /// Record an error in the persisted log
    Log {
        /// Error message
        message: String,
        /// Where the error was caught
        #[arg(long, default_value = "cli")]
        context: String,
        /// Stack text to classify along with the message
        #[arg(long)]
        stack: Option<String>,
    },
    /// Clear the persisted error log
    ClearLogs,
    /// Summarize recovery history
    RecoveryStats,
    /// Run a recovery strategy by id
    Recover {
        /// Strategy id (see `strategies`)
        strategy: String,
    },
    /// List recovery strategies, optionally only those relevant to a category
    Strategies {
        /// Error category (network, render, state, interaction, data, unknown)
        #[arg(long)]
        category: Option<ErrorCategory>,
    },
    /// Issue one orchestrated GET request
    Probe {
        url: String,
        /// Maximum attempts, the first one included
        #[arg(long)]
        retries: Option<u32>,
    },
}

struct Stores {
    local: Arc<dyn KeyValueStore>,
    session: Arc<dyn KeyValueStore>,
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
        .join("lyra-resilience")
}

fn open_stores(dir: &Path) -> Result<Stores> {
    let local = FileStore::open(dir, "local")
        .with_context(|| format!("Failed to open local store in {}", dir.display()))?;
    let session = FileStore::open(dir, "session")
        .with_context(|| format!("Failed to open session store in {}", dir.display()))?;
    Ok(Stores {
        local: Arc::new(local),
        session: Arc::new(session),
    })
}

fn load_config(path: Option<&Path>) -> Result<ResilienceConfig> {
    match path {
        Some(path) => ResilienceConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => ResilienceConfig::from_env().context("Failed to load config from environment"),
    }
}

fn build_logger(config: &ResilienceConfig, stores: &Stores) -> ErrorLogger {
    ErrorLogger::builder(config.logger.clone())
        .local_store(stores.local.clone())
        .session_store(stores.session.clone())
        .build()
}

fn build_recovery(config: &ResilienceConfig, stores: &Stores) -> RecoveryManager {
    let platform = Platform::headless().with_stores(stores.local.clone(), stores.session.clone());
    RecoveryManager::new(config.recovery.clone(), platform, ResetBus::new())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn severity_label(severity: Severity) -> ColoredString {
    let label = severity.as_str().to_uppercase();
    match severity {
        Severity::Critical => label.red().bold(),
        Severity::High => label.red(),
        Severity::Medium => label.yellow(),
        Severity::Low => label.blue(),
    }
}

fn print_error_stats(stats: &ErrorStats) {
    println!("{} {}", "Errors logged:".blue(), stats.total);
    if stats.total == 0 {
        return;
    }

    println!();
    println!("{}", "By category".bold());
    for (category, count) in &stats.by_category {
        println!("  {:<12} {}", category.as_str(), count);
    }

    println!();
    println!("{}", "By severity".bold());
    for (severity, count) in stats.by_severity.iter().rev() {
        println!("  {:<12} {}", severity_label(*severity), count);
    }

    println!();
    println!("{}", "Recent".bold());
    for record in &stats.recent {
        println!(
            "  {} [{}] {} {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            severity_label(record.severity),
            record.context.dimmed(),
            record.message
        );
    }
}

fn print_recovery_stats(stats: &RecoveryStats) {
    println!("{} {}", "Recovery attempts:".blue(), stats.total_attempts);
    if stats.total_attempts == 0 {
        return;
    }
    println!(
        "{} {:.0}%",
        "Success rate:".blue(),
        stats.success_rate * 100.0
    );
    println!(
        "{} {} ms",
        "Average duration:".blue(),
        stats.average_duration.as_millis()
    );

    println!();
    for (id, entry) in &stats.per_strategy {
        println!(
            "  {:<28} {:>3} attempts  {:>4.0}%  {:>6} ms",
            id,
            entry.attempts,
            entry.success_rate * 100.0,
            entry.average_duration.as_millis()
        );
    }
}

fn print_recovery_result(result: &RecoveryResult) {
    if result.success {
        println!(
            "{} {} completed in {} ms",
            "✓".green(),
            result.strategy,
            result.duration.as_millis()
        );
    } else {
        println!(
            "{} {} failed after {} ms: {}",
            "✗".red(),
            result.strategy,
            result.duration.as_millis(),
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let config = load_config(cli.config.as_deref())?;
    let state_dir = cli.state_dir.clone().unwrap_or_else(default_state_dir);

    match cli.command {
        Commands::Stats => {
            let stores = open_stores(&state_dir)?;
            let stats = build_logger(&config, &stores).get_error_stats();
            if cli.json {
                print_json(&stats)?;
            } else {
                print_error_stats(&stats);
            }
        }
        Commands::Log {
            message,
            context,
            stack,
        } => {
            let stores = open_stores(&state_dir)?;
            let logger = build_logger(&config, &stores);

            let mut details = ErrorDetails::new(message, context);
            if let Some(stack) = stack {
                details = details.with_stack(stack);
            }
            let record = logger.log_error(details).await;
            logger.shutdown().await;

            if cli.json {
                print_json(&record)?;
            } else {
                println!(
                    "{} {} ({} / {})",
                    "Logged".green(),
                    record.error_id,
                    record.category,
                    severity_label(record.severity)
                );
            }
        }
        Commands::ClearLogs => {
            let stores = open_stores(&state_dir)?;
            build_logger(&config, &stores).clear_logs();
            println!("{} error log cleared", "✓".green());
        }
        Commands::RecoveryStats => {
            let stores = open_stores(&state_dir)?;
            let stats = build_recovery(&config, &stores).get_recovery_stats();
            if cli.json {
                print_json(&stats)?;
            } else {
                print_recovery_stats(&stats);
            }
        }
        Commands::Recover { strategy } => {
            let stores = open_stores(&state_dir)?;
            let manager = build_recovery(&config, &stores);
            let result = manager.execute_by_id(&strategy).await?;

            if cli.json {
                print_json(&result)?;
            } else {
                print_recovery_result(&result);
            }
            return Ok(result.success);
        }
        Commands::Strategies { category } => {
            let stores = open_stores(&state_dir)?;
            let manager = build_recovery(&config, &stores);
            let strategies = match category {
                Some(category) => manager.recommended_strategies(category),
                None => manager.strategies(),
            };

            let summaries: Vec<_> = strategies.iter().map(|s| s.summary()).collect();
            if cli.json {
                print_json(&summaries)?;
            } else {
                for summary in summaries {
                    println!(
                        "  {:<26} {:>4.0}%  ~{}s  {}",
                        summary.id.bold(),
                        summary.success_rate * 100.0,
                        summary.estimated_time.as_secs(),
                        summary.description.dimmed()
                    );
                }
            }
        }
        Commands::Probe { url, retries } => {
            let orchestrator = NetworkOrchestrator::builder(config.network.clone())
                .build()
                .context("Failed to create HTTP client")?;
            let overrides = retries.map(|n| RetryOverrides::new().max_retries(n));

            match orchestrator.handle_request(RequestSpec::get(url), overrides).await {
                Ok(response) => {
                    if cli.json {
                        print_json(&serde_json::json!({
                            "status": response.status,
                            "bytes": response.body.len(),
                        }))?;
                    } else {
                        let status = response.status.to_string();
                        let status = if response.is_success() {
                            status.green()
                        } else {
                            status.yellow()
                        };
                        println!("{} {} ({} bytes)", "HTTP".blue(), status, response.body.len());
                    }
                    return Ok(response.is_success());
                }
                Err(err) => {
                    if cli.json {
                        print_json(&err)?;
                    } else {
                        println!("{} {}", "Error:".red(), err);
                    }
                    return Ok(false);
                }
            }
        }
    }

    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LoggingConfig::from_flags(cli.verbose, cli.quiet).crate_only(true));

    let succeeded = run(cli).await?;
    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}
