//! `reminderctl` - operator CLI for the reminder bot's event storage

use anyhow::{bail, Context, Result};
use clap::Parser;
use reminder_app::utils::init_tracing;
use reminder_app::{execute, AppContext, Cli};
use reminder_domain::{Config, LogFormat};
use reminder_infra::config::{apply_env_overrides, load, load_from_file};

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = load_from_file(Some(path.clone()))?;
            apply_env_overrides(&mut config)?;
            config
        }
        None => load()?,
    };
    if cli.json_logs {
        config.logging.format = LogFormat::Json;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env must be applied before the config loader reads the environment
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = load_config(&cli).context("failed to load configuration")?;
    init_tracing(&config.logging);

    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env"),
        Err(err) => tracing::debug!(error = %err, "No .env file loaded"),
    }

    let context = AppContext::new_with_config(config);
    let output = execute(&context, &cli.command)
        .await
        .with_context(|| format!("{} failed", cli.command.name()))?;

    println!("{}", serde_json::to_string_pretty(&output.body)?);

    if !output.success {
        bail!("{} did not succeed", output.command);
    }
    Ok(())
}
