//! Rigdoc - truck diagnostics from the command line
//!
//! Thin front-end over the core orchestrator:
//! - `diagnose` runs the provider cascade for a set of symptoms
//! - `chat` asks the maintenance assistant a question
//! - `health` probes every provider once, or keeps probing with `--watch`
//! - `config` prints the effective configuration with secrets hidden

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use rigdoc_core::{
    AppConfig, ChatMessage, DiagnosisRequest, DiagnosisResult, FallbackResult, ProviderHealth,
    ProviderId, RequestOrchestrator, TruckInfo, Urgency,
};

/// Rigdoc - AI truck diagnostics with offline fallback
#[derive(Parser)]
#[command(name = "rigdoc")]
#[command(about = "Diagnose heavy-duty truck problems with AI provider fallback", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.rigdoc/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Diagnose a truck problem
    Diagnose {
        #[arg(long)]
        make: String,
        #[arg(long)]
        model: String,
        #[arg(long)]
        year: u16,
        #[arg(long)]
        engine: String,
        /// Repeat for each symptom
        #[arg(long = "symptom", required = true)]
        symptoms: Vec<String>,
        /// Free-text notes from the driver
        #[arg(long)]
        context: Option<String>,
        #[arg(long, default_value = "medium")]
        urgency: Urgency,
        /// Override the configured primary provider
        #[arg(long)]
        primary: Option<ProviderId>,
        /// Per-attempt timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Only try the primary provider before the offline answer
        #[arg(long)]
        no_fallback: bool,
        /// Print the full result envelope as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask the maintenance assistant a question
    Chat {
        #[arg(required = true)]
        message: Vec<String>,
        #[arg(long)]
        json: bool,
    },

    /// Probe every provider once
    Health {
        #[arg(long)]
        json: bool,
        /// Keep probing on the configured interval until Ctrl-C
        #[arg(long)]
        watch: bool,
    },

    /// Show the effective configuration (secrets redacted)
    Config,
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    let path = path.cloned().unwrap_or_else(AppConfig::default_path);
    AppConfig::load_with_env(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

fn print_diagnosis(outcome: &FallbackResult<DiagnosisResult>) {
    let result = &outcome.result;
    println!("Diagnosis ({}):", outcome.provider);
    println!("  {}", result.diagnosis);
    println!();
    println!(
        "Urgency: {}   Confidence: {:.0}%   Estimated cost: {}",
        result.urgency,
        result.confidence * 100.0,
        result.estimated_cost
    );

    let sections = [
        ("Possible causes", &result.possible_causes),
        ("Recommendations", &result.recommendations),
        ("Tools needed", &result.tools_needed),
        ("Safety", &result.safety_notes),
    ];
    for (title, items) in sections {
        if items.is_empty() {
            continue;
        }
        println!();
        println!("{}:", title);
        for (i, item) in items.iter().enumerate() {
            println!("  {}. {}", i + 1, item);
        }
    }

    print_attempts(outcome.fallback_used, outcome.cached, &outcome.errors);
}

fn print_attempts(fallback_used: bool, cached: bool, errors: &[rigdoc_core::AttemptError]) {
    if cached {
        println!();
        println!("(served from cache)");
    }
    if fallback_used && !errors.is_empty() {
        println!();
        println!("Fallback used after {} failed attempt(s):", errors.len());
        for attempt in errors {
            println!(
                "  - {} ({}): {}",
                attempt.provider.tag(),
                attempt.context,
                attempt.error
            );
        }
    }
}

fn print_health(health: &[ProviderHealth], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(health)?);
        return Ok(());
    }

    println!("Provider health:");
    for entry in health {
        let mark = if entry.healthy { "✓" } else { "✗" };
        let detail = match (&entry.latency_ms, &entry.error) {
            (Some(ms), _) => format!("{} ms", ms),
            (None, Some(err)) => err.clone(),
            (None, None) => "not probed".to_string(),
        };
        println!("  {} {:<14} {}", mark, entry.provider.tag(), detail);
    }
    Ok(())
}

/// Run the background monitor and print the table after each round
async fn watch_health(orchestrator: &RequestOrchestrator, json: bool) -> Result<()> {
    let handle = orchestrator.start_health_monitor();
    let monitor = orchestrator.monitor();

    // Read each round once its probes have had time to finish
    let first = tokio::time::Instant::now() + monitor.probe_timeout();
    let mut ticker = tokio::time::interval_at(first, monitor.interval());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                if !handle.is_running() {
                    tracing::warn!("Health monitor exited unexpectedly");
                    break;
                }
                print_health(&monitor.snapshot(), json)?;
            }
        }
    }

    handle.stop().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays parseable with --json
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Diagnose {
            make,
            model,
            year,
            engine,
            symptoms,
            context,
            urgency,
            primary,
            timeout_ms,
            no_fallback,
            json,
        } => {
            let orchestrator = RequestOrchestrator::from_config(&config)?;
            if let Some(primary) = primary {
                orchestrator.set_primary_provider(primary);
            }
            if let Some(ms) = timeout_ms {
                orchestrator.set_timeout(Duration::from_millis(ms))?;
            }
            if no_fallback {
                orchestrator.set_fallback_enabled(false);
            }

            let request = DiagnosisRequest {
                truck: TruckInfo {
                    make,
                    model,
                    year,
                    engine,
                },
                symptoms,
                context,
                urgency,
            };
            tracing::info!(truck = %request.truck, "Running diagnosis");
            let outcome = orchestrator.diagnose(&request).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_diagnosis(&outcome);
            }
        }
        Commands::Chat { message, json } => {
            let orchestrator = RequestOrchestrator::from_config(&config)?;
            let outcome = orchestrator
                .chat(&[ChatMessage::user(message.join(" "))])
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("[{}]", outcome.provider);
                println!("{}", outcome.result);
                print_attempts(outcome.fallback_used, false, &outcome.errors);
            }
        }
        Commands::Health { json, watch } => {
            let orchestrator = RequestOrchestrator::from_config(&config)?;
            if watch {
                watch_health(&orchestrator, json).await?;
            } else {
                print_health(&orchestrator.check_health().await, json)?;
            }
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config.redacted())?);
        }
    }

    Ok(())
}
