//! linnet-bot: reference bot built on the linnet session engine.
//!
//! Loads a TOML session config (CLI flags override it), registers the
//! built-in plugins, and runs until the server disconnects, a plugin
//! quits the session, or Ctrl-C.

mod plugins;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use linnet_sdk::{PluginRegistry, SessionConfig, client};

use plugins::{Ctl, Greeter};

#[derive(Parser)]
#[command(name = "linnet-bot", about = "Plugin-driven IRC bot")]
struct Args {
    /// Path to a TOML session config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Server hostname
    #[arg(long)]
    host: Option<String>,

    /// Server port
    #[arg(long)]
    port: Option<u16>,

    /// Nickname (`?` characters are replaced with random digits)
    #[arg(long)]
    nick: Option<String>,

    /// Fallback nickname for collisions
    #[arg(long)]
    alt_nick: Option<String>,

    /// Use TLS
    #[arg(long)]
    tls: bool,

    /// Client certificate PEM (cert + key) for CertFP
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Channel to join after registration
    #[arg(long)]
    channel: Option<String>,
}

fn build_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => SessionConfig::default(),
    };

    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(nick) = &args.nick {
        config.nickname = nick.clone();
    }
    if let Some(alt) = &args.alt_nick {
        config.alt_nick = Some(alt.clone());
    }
    if args.tls {
        config.tls = true;
    }
    if let Some(cert) = &args.cert {
        config.cert = Some(cert.clone());
    }
    if let Some(channel) = &args.channel {
        config.channel = Some(channel.clone());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linnet_bot=info,linnet_sdk=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;

    let mut registry = PluginRegistry::new();
    registry.register("ctl", |_s| Box::new(Ctl));
    registry.register("greeter", |_s| Box::new(Greeter));

    let (handle, mut task) = client::connect(config, Arc::new(registry)).await?;

    tokio::select! {
        result = &mut task => {
            result.context("session task panicked")??;
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, quitting");
            handle.quit(Some("Byebye!")).await?;
        }
    }

    // Let the session flush its QUIT before exiting.
    task.await.context("session task panicked")??;
    Ok(())
}
