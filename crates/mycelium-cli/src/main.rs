use anyhow::Context as _;
use clap::Parser;
use mycelium_config::MyceliumConfig;
use mycelium_runner::{init_logging, Bot};
use serenity::http::Http;
use serenity::prelude::GatewayIntents;
use serenity::Client;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{error, info};

mod discord;

use discord::{Handler, SerenityPlatform};

const LATENCY_POLL: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/mycelium/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enables debug mode
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => MyceliumConfig::config_path()?,
    };
    let config = MyceliumConfig::load_or_default(&config_path)?;
    let _log_guard = init_logging("mycelium", &config.logging, cli.debug)?;

    let token = std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN not provided")?;

    let http = Arc::new(Http::new(&token));
    let platform = Arc::new(SerenityPlatform::new(http, Handle::current()));

    let bot = Bot::builder(config.clone())
        .with_platform(platform.clone())
        .start()
        .await?;

    let handler = Handler::new(
        Arc::clone(bot.dispatcher()),
        bot.events().clone(),
        config.bot.activity.clone(),
        config.commands.mod_prefix.clone(),
    );
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_VOICE_STATES;

    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .await
        .context("Failed to create Discord client")?;

    let shard_manager = client.shard_manager.clone();
    platform.track_latency(shard_manager.clone(), LATENCY_POLL);

    info!("Starting {}", config.bot.name);
    tokio::select! {
        result = client.start() => {
            if let Err(e) = result {
                error!("Discord client stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, disconnecting");
            shard_manager.shutdown_all().await;
        }
    }

    bot.shutdown().await;
    Ok(())
}
