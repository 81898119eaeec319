//! Eliza Daemon entry point
//!
//! Parses the command line, loads configuration, initializes logging and
//! dispatches to the decision loop or one of the administrative commands.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use eliza_daemon::backend::Collaborators;
use eliza_daemon::cli::{Cli, Commands, ConfigSubcommand, PersonaSubcommand};
use eliza_daemon::config::{self, DaemonConfig};
use eliza_daemon::error::{Error, Result};
use eliza_daemon::ledger::PerformanceLedger;
use eliza_daemon::persona::{PersonaRegistry, PersonaStatus};
use eliza_daemon::scheduler::Daemon;
use eliza_daemon::store::{self, collections, DocumentStore, FileStore};
use eliza_daemon::types::DecisionRecord;
use eliza_daemon::{logging, version};

fn main() -> Result<()> {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    match &cli.command {
        Commands::Version => {
            version::print_version();
            return Ok(());
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            return handle_config_command(subcommand.clone(), cli.config.as_deref());
        }
        _ => {}
    }

    let config = match DaemonConfig::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprint!("{}", e.format_for_terminal());
            std::process::exit(e.exit_code());
        }
    };

    let result = match cli.command {
        Commands::Run { once } => {
            // The guards must be kept alive for the lifetime of the program
            let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

            let build = version::build_info();
            info!(
                version = %build.full_version(),
                target = %build.target,
                profile = %build.profile,
                "Starting Eliza Daemon"
            );
            run_daemon(config, once)
        }
        Commands::Persona { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            block_on(handle_persona_command(subcommand, config))
        }
        Commands::History { limit, persona } => {
            logging::init_simple(tracing::Level::WARN)?;
            block_on(show_history(config, limit, persona))
        }
        Commands::Version | Commands::Config { .. } => {
            // Already handled above
            unreachable!();
        }
    };

    if let Err(e) = result {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
    Ok(())
}

/// Run the decision loop on a multi-threaded runtime
fn run_daemon(config: DaemonConfig, once: bool) -> Result<()> {
    info!(
        name = %config.daemon_name(),
        period_secs = config.daemon.cycle_period_secs,
        provider = %config.reasoning.provider,
        dry_run = config.actions.dry_run,
        data_dir = %config.storage.data_dir,
        "Configuration loaded"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(num_cpus::get().min(8))
        .thread_name("eliza-daemon")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    runtime.block_on(async move {
        let collaborators = Collaborators::from_config(&config)?;
        let daemon = Daemon::start(&config, collaborators).await?;
        daemon.run(once).await
    })
}

/// Administrative commands run on a single-threaded runtime
fn block_on<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create runtime: {}", e)))?
        .block_on(future)
}

fn open_store(config: &DaemonConfig) -> Result<Arc<dyn DocumentStore>> {
    Ok(Arc::new(FileStore::open(config.data_dir())?))
}

/// Handle persona registry subcommands
async fn handle_persona_command(subcommand: PersonaSubcommand, config: DaemonConfig) -> Result<()> {
    let store = open_store(&config)?;
    let registry = Arc::new(PersonaRegistry::bootstrap(store.clone()).await?);

    let (id, status) = match subcommand {
        PersonaSubcommand::List => {
            let ledger = PerformanceLedger::load(registry.clone(), &config.ledger, store).await?;
            println!(
                "{:<24} {:<12} {:>9} {:<12} {:>8}",
                "ID", "ROLE", "AUTHORITY", "STATUS", "SUCCESS"
            );
            for persona in registry.list_all() {
                let rate = ledger
                    .success_rate(&persona.id)
                    .map(|r| format!("{:.0}%", r * 100.0))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<24} {:<12} {:>9} {:<12} {:>8}",
                    persona.id, persona.role, persona.authority_level, persona.status, rate
                );
            }
            return Ok(());
        }
        PersonaSubcommand::Show { id } => {
            let persona = registry.get(&id).ok_or_else(|| Error::unknown_persona(&id))?;
            let ledger = PerformanceLedger::load(registry.clone(), &config.ledger, store).await?;
            println!("{}", toml::to_string_pretty(&persona)?);
            println!("[performance]");
            println!("{}", toml::to_string_pretty(&ledger.metric(&id))?);
            return Ok(());
        }
        PersonaSubcommand::Activate { id } => (id, PersonaStatus::Active),
        PersonaSubcommand::Deactivate { id } => (id, PersonaStatus::Inactive),
        PersonaSubcommand::Suspend { id } => (id, PersonaStatus::Suspended),
        PersonaSubcommand::Maintenance { id } => (id, PersonaStatus::Maintenance),
    };

    let persona = registry.update_status(&id, status).await?;
    println!("{} is now {}", persona.id, persona.status);
    Ok(())
}

/// Print the most recent decision records
async fn show_history(config: DaemonConfig, limit: usize, persona: Option<String>) -> Result<()> {
    let store = open_store(&config)?;
    let mut records: Vec<DecisionRecord> =
        store::list_docs(store.as_ref(), collections::DECISIONS).await?;
    records.retain(|r| persona.as_deref().map_or(true, |p| r.persona_id == p));
    records.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at).then_with(|| a.id.cmp(&b.id)));

    if records.is_empty() {
        println!("No decisions recorded.");
        return Ok(());
    }

    for record in records.iter().take(limit) {
        println!(
            "{}  {:<22} {:<28} {:<20} {:<16} {:.2}",
            record.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            record.persona_id,
            record.topic,
            record.decision.action,
            record.outcome_status.as_str(),
            record.confidence
        );
    }
    Ok(())
}

/// Handle configuration subcommands
fn handle_config_command(subcommand: ConfigSubcommand, config_path: Option<&str>) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show => {
            let cfg = DaemonConfig::load(config_path)?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            config::init_config(path.as_deref(), force)?;
        }
        ConfigSubcommand::Validate => match DaemonConfig::load(config_path) {
            Ok(_) => {
                println!("Configuration is valid.");
            }
            Err(e) => {
                eprint!("{}", e.format_for_terminal());
                std::process::exit(e.exit_code());
            }
        },
    }

    Ok(())
}
