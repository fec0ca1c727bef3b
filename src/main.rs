//! Courier CLI entry point

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use courier::adapters::cli::{render, CliChannel};
use courier::adapters::telegram::TelegramChannel;
use courier::adapters::{Channel, ChannelRegistry};
use courier::auth::{OAuthFlowController, SqliteTokenStore};
use courier::config::Config;
use courier::server::{self, AppState};

#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "Courier - chat assistant with mail tools and per-user OAuth")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration to ~/.courier/config.json
    Init,

    /// Run the HTTP service (and Telegram, when enabled)
    Serve {
        /// Address to bind, overriding the config
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Chat with the assistant from the terminal
    Chat {
        /// Message to send; omit for interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// User id the conversation and credentials belong to
        #[arg(short, long, default_value = "local")]
        user: String,
    },

    /// Show configuration and sign-in status
    Status {
        #[arg(short, long)]
        user: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let path = courier::config::init()?;
            println!("Config written to {}", path.display());
            println!("\nNext steps:");
            println!("  1. Set public_base_url and an API key for your model provider");
            println!("  2. Add your Google OAuth client_id and client_secret");
            println!("  3. Run: courier serve");
        }

        Commands::Serve { bind } => {
            let mut config = load_config()?;
            if let Some(bind) = bind {
                config.bind = bind;
            }
            run_serve(config).await?;
        }

        Commands::Chat { message, user } => {
            let config = load_config()?;
            let state = AppState::from_config(&config)?;
            let channel = CliChannel::new(state.router, &user);

            match message {
                Some(message) => {
                    let reply = channel.run_once(&message).await?;
                    println!("{}", render(&reply));
                }
                None => {
                    println!("Interactive mode (type 'exit' to quit)");
                    channel.run_interactive().await?;
                }
            }
        }

        Commands::Status { user } => {
            let config = courier::config::load()?;
            print_status(&config, user.as_deref())?;
        }
    }

    Ok(())
}

/// Load and validate; configuration errors are fatal at startup
fn load_config() -> Result<Config> {
    let config = courier::config::load()?;
    config.validate()?;
    Ok(config)
}

async fn run_serve(config: Config) -> Result<()> {
    let state = AppState::from_config(&config)?;

    if config.telegram.enabled {
        let telegram = TelegramChannel::new(&config.telegram, state.router.clone());
        tokio::spawn(async move {
            if let Err(e) = telegram.start().await {
                tracing::error!("Telegram channel stopped: {}", e);
            }
        });
    }

    server::serve(state, &config.bind).await?;
    Ok(())
}

fn print_status(config: &Config, user: Option<&str>) -> Result<()> {
    println!("Courier Status\n");
    println!("Config: {}", courier::config::config_path().display());
    println!("Provider: {}", config.provider);
    println!("Model: {}", if config.model.is_empty() { "(default)" } else { &config.model });
    println!("Public URL: {}", config.public_base_url);
    println!("Bind: {}", config.bind);
    if let Err(e) = config.validate() {
        println!("Config problem: {}", e);
    }

    println!("\nChannels:");
    for name in ChannelRegistry::available() {
        let enabled = if ChannelRegistry::is_enabled(name, config) { "enabled" } else { "disabled" };
        println!("  {:<10} {} ({})", name, ChannelRegistry::description(name), enabled);
    }

    let providers = config.auth_providers();
    println!("\nAuth providers: {}", if providers.is_empty() { "none".to_string() } else { providers.join(", ") });

    if let Some(user) = user {
        let store = Arc::new(SqliteTokenStore::open(&config.oauth.db_path)?);
        let flow = OAuthFlowController::from_config(config, store);
        for provider in flow.providers() {
            let signed_in = flow.status(user, &provider)?;
            println!("  {} for {}: {}", provider, user, if signed_in { "signed in" } else { "not signed in" });
        }
    }

    Ok(())
}
