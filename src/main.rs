use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stash_rule::profile::DEFAULT_PROFILE_NAME;
use stash_rule::{AppConfig, StashService};

#[derive(Parser)]
#[command(name = "stash-rule")]
#[command(about = "Build Stash/Clash configs from proxy subscriptions", long_about = None)]
struct Cli {
    /// Config file (default: ~/.stash-rule/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the background refresh scheduler until Ctrl-C
    Run,
    /// Refresh every configured source now
    Refresh,
    /// Show per-source cache status
    Status,
    /// Render the config document
    Render {
        #[arg(short, long, default_value = DEFAULT_PROFILE_NAME)]
        profile: String,
        /// Render with the profile bound to this subscriber
        #[arg(short, long, conflicts_with = "profile")]
        subscriber: Option<String>,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Render the base document without any nodes or overlays
    Preview,
    /// Manage subscription sources
    Sources {
        #[command(subcommand)]
        command: SourcesCommand,
    },
    /// Manage overlay profiles
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },
    /// Manage subscriber → profile bindings
    Subscriber {
        #[command(subcommand)]
        command: SubscriberCommand,
    },
}

#[derive(Subcommand)]
enum SourcesCommand {
    List,
    /// Replace the source list
    Set { urls: Vec<String> },
}

#[derive(Subcommand)]
enum ProfileCommand {
    List,
    Show { name: String },
    /// Create a profile from a YAML file
    Create { name: String, file: PathBuf },
    /// Replace an existing profile from a YAML file
    Update { name: String, file: PathBuf },
}

#[derive(Subcommand)]
enum SubscriberCommand {
    /// Add a subscriber bound to a profile
    Add {
        username: String,
        #[arg(short, long, default_value = DEFAULT_PROFILE_NAME)]
        profile: String,
    },
    /// Bind an existing subscriber to another profile
    SetProfile { username: String, profile: String },
    List,
    Remove { username: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stash_rule=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    let service = StashService::from_config(&config)?;

    match cli.command {
        Commands::Run => run(service).await?,
        Commands::Refresh => print_json(&service.refresh_all().await?)?,
        Commands::Status => print_json(&service.cache_status()?)?,
        Commands::Render {
            profile,
            subscriber,
            output,
        } => {
            let yaml = match subscriber {
                Some(username) => service.render_for_subscriber(&username).await?,
                None => service.render_config(&profile).await?,
            };
            match output {
                Some(path) => {
                    tokio::fs::write(&path, yaml)
                        .await
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    tracing::info!("wrote config to {}", path.display());
                }
                None => print!("{yaml}"),
            }
        }
        Commands::Preview => print!("{}", service.preview_default()?),
        Commands::Sources { command } => match command {
            SourcesCommand::List => {
                for url in service.sources()? {
                    println!("{url}");
                }
            }
            SourcesCommand::Set { urls } => {
                let saved = service.set_sources(&urls)?;
                println!("saved {} source(s)", saved.len());
            }
        },
        Commands::Profile { command } => match command {
            ProfileCommand::List => print_json(&service.profiles().list()?)?,
            ProfileCommand::Show { name } => print!("{}", service.profiles().get(&name)?.content),
            ProfileCommand::Create { name, file } => {
                service.profiles().create(&name, &read_profile(&file).await?)?;
            }
            ProfileCommand::Update { name, file } => {
                service.profiles().update(&name, &read_profile(&file).await?)?;
            }
        },
        Commands::Subscriber { command } => match command {
            SubscriberCommand::Add { username, profile } => {
                print_json(&service.subscribers().add(&username, &profile)?)?;
            }
            SubscriberCommand::SetProfile { username, profile } => {
                service.subscribers().set_profile(&username, &profile)?;
            }
            SubscriberCommand::List => print_json(&service.subscribers().list()?)?,
            SubscriberCommand::Remove { username } => service.subscribers().remove(&username)?,
        },
    }

    Ok(())
}

async fn run(service: StashService) -> Result<()> {
    let token = CancellationToken::new();
    let scheduler = Arc::new(service.scheduler());
    let handle = scheduler.spawn(token.clone());
    tracing::info!("refresh scheduler started; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("shutting down");
    token.cancel();
    handle.await.context("refresh scheduler task panicked")?;
    Ok(())
}

async fn read_profile(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read profile file {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
