use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use pulse_service::monitoring::IntervalTimer;
use pulse_service::{Config, ForceScope, Settlement, Target, UptimeService};
use tracing::info;
use uuid::Uuid;

/// Pulse - keeps an eye on your sites and tells you how often they were up
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "pulse")]
struct Cli {
    /// Path to configuration file (defaults to $PULSE_CONFIG or the user config dir)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the effective configuration
    Config,
    #[command(flatten)]
    Site(SiteCommand),
}

/// Commands that work against the database
#[derive(Subcommand, Debug)]
enum SiteCommand {
    /// Run the scheduler until interrupted
    Run,
    /// Register a site
    Add {
        name: String,
        address: String,
        /// Minutes between checks (defaults to targets.default_interval_minutes)
        #[arg(short, long)]
        interval: Option<u32>,
    },
    /// List registered sites
    List {
        #[arg(long)]
        json: bool,
    },
    /// Remove a site and its history
    Remove { id: Uuid },
    /// Show the uptime percentage of a site
    Uptime {
        id: Uuid,
        /// Trailing window in days (defaults to uptime.window_days)
        #[arg(short, long)]
        days: Option<u32>,
    },
    /// Show per-day counters of a site
    History {
        id: Uuid,
        #[arg(short, long, default_value_t = 30)]
        days: u32,
    },
    /// Check now, ignoring intervals; all sites unless an id is given
    Check { id: Option<Uuid> },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logger::init_tracing();

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Config => println!("{config}"),
        Command::Site(command) => {
            let service = UptimeService::open(&config).await?;
            run_site_command(command, &service, &config).await?;
        }
    }

    Ok(())
}

async fn run_site_command(command: SiteCommand, service: &UptimeService, config: &Config) -> anyhow::Result<()> {
    match command {
        SiteCommand::Run => {
            info!("Starting pulse v{}", env!("CARGO_PKG_VERSION"));
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for shutdown signal: {}", e);
                }
            };
            service.scheduler().run(&IntervalTimer, shutdown).await;
        }
        SiteCommand::Add { name, address, interval } => {
            let interval = interval.unwrap_or(config.targets.default_interval_minutes);
            let target = service.add_target(&name, &address, interval).await?;
            print_target(&target);
        }
        SiteCommand::List { json } => {
            let targets = service.list_targets().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&targets)?);
            } else if targets.is_empty() {
                println!("No sites registered");
            } else {
                targets.iter().for_each(print_target);
            }
        }
        SiteCommand::Remove { id } => {
            if !service.remove_target(id).await? {
                bail!("No site with id {id}");
            }
            println!("Removed {id}");
        }
        SiteCommand::Uptime { id, days } => {
            let days = days.unwrap_or(config.uptime.window_days);
            match service.get_uptime_over(id, days).await? {
                Some(percent) => println!("{percent:.2}% over the last {days} days"),
                None => println!("No checks recorded yet"),
            }
        }
        SiteCommand::History { id, days } => {
            for bucket in service.daily_history(id, days).await? {
                println!("{}  checks={:<5} up={:<5} down={}", bucket.date, bucket.checks, bucket.up, bucket.down);
            }
        }
        SiteCommand::Check { id } => {
            let scope = id.map_or(ForceScope::All, ForceScope::Target);
            for settlement in service.force_check_now(scope).await? {
                print_settlement(&settlement);
            }
        }
    }

    Ok(())
}

fn print_target(target: &Target) {
    let last = target
        .last_check
        .map(|check| check.at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".into());
    println!(
        "{}  {:<7} every {:>3}m  last {}  {} <{}>",
        target.id,
        target.status(),
        target.interval_minutes,
        last,
        target.name,
        target.url
    );
}

fn print_settlement(settlement: &Settlement) {
    let id = settlement.target_id();
    match settlement {
        Settlement::Recorded { is_up, .. } => println!("{id}  {}", if *is_up { "up" } else { "down" }),
        Settlement::TargetGone { .. } => println!("{id}  removed during check"),
        Settlement::Unresolvable { .. } => println!("{id}  invalid stored address"),
        Settlement::StorageFailed { .. } => println!("{id}  outcome could not be saved"),
    }
}
