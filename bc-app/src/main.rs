//! bcbot: inline bc transfers over Telegram.

mod commands;
mod config;
mod gateway;
mod init;
mod registration;
mod routes;
mod server;
#[cfg(test)]
mod test_support;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Debug, Parser)]
#[command(name = "bcbot", version, about = "Inline bc transfer bot")]
struct Cli {
    /// Config file (default: ~/.bcbot/config.toml).
    #[arg(long, global = true, env = "BCBOT_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the bot (default).
    Serve,
    /// Initialize ~/.bcbot with config and locale templates (idempotent).
    Init,
    /// Validate config and locale without starting the bot.
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(error) = dotenvy::dotenv() {
        if !error.not_found() {
            return Err(anyhow::anyhow!("load .env: {error}"));
        }
    }
    init_tracing()?;
    install_panic_hook();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => server::serve(cli.config).await,
        Command::Init => {
            let report = init::initialize_default().await?;
            if report.created.is_empty() {
                println!("bcbot init: already initialized at {}", report.root.display());
            } else {
                println!("bcbot init: initialized {}", report.root.display());
                for path in &report.created {
                    println!("created {}", path.display());
                }
                if !report.skipped.is_empty() {
                    println!("kept {} existing file(s) unchanged", report.skipped.len());
                }
            }
            println!("next: set telegram.bot_token in {}", report.root.join("config.toml").display());
            Ok(())
        }
        Command::Doctor => server::doctor(cli.config).await,
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,bc_app=debug,bc_core=debug,bc_channels=debug,bc_ledger=debug")
    });
    let log_format = std::env::var("BCBOT_LOG_FORMAT")
        .unwrap_or_else(|_| "json".to_string())
        .to_ascii_lowercase();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);
    match log_format.as_str() {
        "json" => builder
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .init(),
        "pretty" => builder.pretty().init(),
        "compact" => builder.compact().init(),
        other => anyhow::bail!(
            "unsupported BCBOT_LOG_FORMAT={other:?}; expected json, pretty or compact"
        ),
    }

    tracing::debug!(%log_format, "tracing initialized");
    Ok(())
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_default();
        tracing::error!(location = ?info.location(), %payload, "panic");
        default_hook(info);
    }));
}
