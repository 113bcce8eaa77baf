//! CLI argument parsing and commands.

use apipulse::Config;
use clap::{Parser, Subcommand};

/// apipulse CLI - configuration diagnostics for the telemetry SDK
#[derive(Parser, Debug)]
#[command(name = "apipulse")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the configuration as the SDK resolves it, credentials masked
    Debug,
}

impl Cli {
    pub async fn execute(self) -> anyhow::Result<()> {
        match self.command {
            Commands::Debug => debug_config().await,
        }
    }
}

/// Resolve configuration exactly the way the SDK would (environment
/// overrides included) and print it for inspection.
async fn debug_config() -> anyhow::Result<()> {
    let config = Config::builder().build().await;

    println!("=== apipulse SDK configuration ===");
    println!("SDK:                  {} {}", config.sdk_name, config.sdk_version);
    println!("API key:              {}", mask_credential(&config.api_key));
    println!("Project ID:           {}", mask_credential(&config.project_id));
    println!(
        "Collector endpoint:   {}",
        config
            .endpoint
            .as_deref()
            .unwrap_or("default replicas (load spread)")
    );
    println!("Dispatch:             {}", dispatch_mode(&config));
    println!(
        "Batched errors:       {}",
        if config.batch_errors_enabled {
            format!(
                "size {} / every {:?}",
                config.batch_size, config.flush_interval
            )
        } else {
            "disabled".to_string()
        }
    );
    println!("Masked fields:        {}", config.mask_rules.len());
    println!(
        "Environment:          {}{}",
        config.environment.as_deref().unwrap_or("(unset)"),
        if config.is_ignored_environment() {
            "  [capture disabled]"
        } else {
            ""
        }
    );
    println!(
        "Ignored environments: {}",
        config.ignored_environments.join(", ")
    );
    println!(
        "Host:                 {} {} ({})",
        config.server.os.name, config.server.os.release, config.server.os.architecture
    );
    println!(
        "Runtime:              {} {}",
        config.language.name, config.language.version
    );
    Ok(())
}

fn dispatch_mode(config: &Config) -> String {
    if config.async_dispatch {
        format!(
            "pooled, {} workers, queue {}",
            config.max_concurrency, config.queue_capacity
        )
    } else {
        "fire-and-forget".to_string()
    }
}

/// Show only the last four characters of a credential.
fn mask_credential(value: &str) -> String {
    if value.is_empty() {
        return "Not Set".to_string();
    }
    if value.len() <= 4 || !value.is_char_boundary(value.len() - 4) {
        return "****".to_string();
    }
    format!("****{}", &value[value.len() - 4..])
}
