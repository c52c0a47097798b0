#![deny(unsafe_code)]

//! repodigest CLI: one-shot digests, daemon control, cache maintenance.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use repodigest_config::AppConfig;
use repodigest_core::gateway::DigestOrigin;
use repodigest_core::ipc::IpcClient;
use repodigest_core::ipc::server::socket_path_from_config;
use repodigest_core::{AuthToken, CacheGateway, Daemon, DiskCacheStore, RepositoryIdentity};

/// repodigest: ranked, cached text digests of GitHub repositories.
#[derive(Parser, Debug)]
#[command(name = "repodigest", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "repodigest.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Produce the digest for a repository.
    Digest {
        /// Repository as `owner/repo`.
        repository: RepositoryIdentity,

        /// Ignore any cached digest and regenerate it.
        #[arg(long)]
        refresh: bool,

        /// Write the digest to a file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Start the repodigest daemon.
    Start,

    /// Stop a running repodigest daemon.
    Stop,

    /// Show daemon status.
    Status,

    /// Inspect or maintain the digest cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Record count, total size, oldest and newest entries.
    Stats,
    /// Delete expired records and orphaned temp files.
    Cleanup,
    /// Remove the cached digest for one repository.
    Clear {
        /// Repository as `owner/repo`.
        repository: RepositoryIdentity,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;

    let filter = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Digest {
            repository,
            refresh,
            output,
        } => cmd_digest(&config, &repository, refresh, output.as_deref()).await?,
        Commands::Start => cmd_start(config).await?,
        Commands::Stop => cmd_stop(&config).await?,
        Commands::Status => cmd_status(&config).await?,
        Commands::Cache { action } => cmd_cache(&config, action).await?,
        Commands::Config { show } => cmd_config(&cli.config, &config, show)?,
    }

    Ok(())
}

async fn cmd_digest(
    config: &AppConfig,
    repository: &RepositoryIdentity,
    refresh: bool,
    output: Option<&Path>,
) -> Result<()> {
    let gateway = CacheGateway::from_config(config)?;
    let token = AuthToken::from_env(&config.github.token_env);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, finishing with what has been fetched");
            on_interrupt.cancel();
        }
    });

    let outcome = gateway.resolve(repository, &token, &cancel, refresh).await;
    interrupt.abort();
    let outcome = outcome?;

    info!(
        repository = %repository,
        cache = outcome.origin.as_str(),
        bytes = outcome.text.len(),
        "digest ready"
    );
    if outcome.origin == DigestOrigin::Partial {
        warn!("digest is partial and was not cached");
    }

    match output {
        Some(path) => {
            tokio::fs::write(path, &outcome.text)
                .await
                .with_context(|| format!("failed to write digest to {}", path.display()))?;
            println!("Digest for {repository} written to {}", path.display());
        }
        None => print!("{}", outcome.text),
    }
    Ok(())
}

async fn cmd_start(config: AppConfig) -> Result<()> {
    info!("Starting repodigest daemon");

    let daemon = Daemon::new(config)?;
    daemon.run().await?;

    Ok(())
}

async fn cmd_stop(config: &AppConfig) -> Result<()> {
    let client = IpcClient::new(socket_path_from_config(config));
    if !client.daemon_available() {
        println!("repodigest daemon is not running.");
        return Ok(());
    }

    info!("Sending stop signal to repodigest daemon");
    let resp = client.stop().await?;
    println!("{}", resp.message);
    Ok(())
}

async fn cmd_status(config: &AppConfig) -> Result<()> {
    let client = IpcClient::new(socket_path_from_config(config));
    if !client.daemon_available() {
        println!("repodigest daemon is not running.");
        return Ok(());
    }

    let status = client.status().await?;
    println!("repodigest daemon");
    println!("  version:   {} ({})", status.version, status.git_hash);
    println!("  pid:       {}", status.pid);
    println!("  uptime:    {}s", status.uptime_secs);
    println!("  cache dir: {}", status.cache_dir);
    println!("  api:       {}", status.api_url);
    println!("  log level: {}", status.log_level);
    if let Some(remaining) = status.rate_limit.and_then(|r| r.remaining) {
        println!("  api quota: {remaining} calls left");
    }
    Ok(())
}

async fn cmd_cache(config: &AppConfig, action: CacheAction) -> Result<()> {
    let store = Arc::new(DiskCacheStore::open(&config.cache.dir)?);

    match action {
        CacheAction::Stats => {
            let stats = store.stats().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        CacheAction::Cleanup => {
            let report = store.cleanup().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        CacheAction::Clear { repository } => {
            if store.clear(&repository).await {
                println!("Removed cached digest for {repository}.");
            } else {
                println!("No cached digest for {repository}.");
            }
        }
    }
    Ok(())
}

fn cmd_config(config_path: &Path, config: &AppConfig, show: bool) -> Result<()> {
    if show {
        let toml_str = toml::to_string_pretty(config).context("failed to serialize config")?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(())
}

async fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        Ok(AppConfig::load(path).await?)
    } else {
        Ok(AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_digest_command() {
        let cli = Cli::try_parse_from([
            "repodigest",
            "-vv",
            "digest",
            "acme/widget",
            "--refresh",
            "--output",
            "out.md",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Digest {
                repository,
                refresh,
                output,
            } => {
                assert_eq!(repository.full_name(), "acme/widget");
                assert!(refresh);
                assert_eq!(output, Some(PathBuf::from("out.md")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_malformed_repository() {
        assert!(Cli::try_parse_from(["repodigest", "digest", "not-a-repo"]).is_err());
    }

    #[test]
    fn test_parse_cache_clear() {
        let cli =
            Cli::try_parse_from(["repodigest", "-c", "alt.toml", "cache", "clear", "acme/widget"])
                .unwrap();
        assert_eq!(cli.config, PathBuf::from("alt.toml"));
        assert!(matches!(
            cli.command,
            Commands::Cache {
                action: CacheAction::Clear { .. }
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_config_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).await.unwrap();
        assert_eq!(config.retry.metadata_attempts, 3);
    }

    #[tokio::test]
    async fn test_config_file_is_loaded() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("repodigest.toml");
        std::fs::write(&path, "[synth]\nmax_files = 5\n").unwrap();
        let config = load_config(&path).await.unwrap();
        assert_eq!(config.synth.max_files, 5);
    }

    #[tokio::test]
    async fn test_cache_commands_on_empty_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.cache.dir = dir.path().join("digests").display().to_string();

        cmd_cache(&config, CacheAction::Stats).await.unwrap();
        cmd_cache(&config, CacheAction::Cleanup).await.unwrap();
        cmd_cache(
            &config,
            CacheAction::Clear {
                repository: "acme/widget".parse().unwrap(),
            },
        )
        .await
        .unwrap();
        assert!(dir.path().join("digests").is_dir());
    }
}
