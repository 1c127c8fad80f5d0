//! CLI mode for precache: install, serve, fetch and list.

mod progress;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use reqwest::Method;
use tokio_util::sync::CancellationToken;

use crate::{
    AppConfig, Cache, CacheFirstWorker, CacheStorage, DiskStorage, HttpFetcher, InstallProgress,
    Request, Worker, WorkerHost, format_bytes, server,
};

use progress::{BarProgress, print_summary};

type DiskWorker = CacheFirstWorker<DiskStorage, HttpFetcher>;

/// Pre-cache a fixed asset list and serve it cache-first.
#[derive(Debug, Parser)]
#[command(name = "precache", version, about)]
pub struct Cli {
    /// Config file (created with defaults if missing).
    #[arg(short, long, env = "PRECACHE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the install handler once: fetch and store every configured asset.
    Install,
    /// Install, then proxy every request cache-first until interrupted.
    Serve {
        /// Override the bind host.
        #[arg(long)]
        host: Option<String>,
        /// Override the bind port.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Dispatch one fetch event and report where the response came from.
    Fetch {
        /// Path (resolved against the origin) or absolute URL.
        target: String,
        /// Request method.
        #[arg(long, default_value = "GET", value_parser = parse_method)]
        method: Method,
        /// Write the response body to stdout.
        #[arg(long)]
        body: bool,
    },
    /// List caches and the entries of the worker's cache.
    List,
}

fn parse_method(s: &str) -> Result<Method, String> {
    Method::from_bytes(s.to_ascii_uppercase().as_bytes()).map_err(|e| e.to_string())
}

/// Builds the disk-backed worker described by `config`.
fn build_worker(config: &AppConfig) -> crate::Result<DiskWorker> {
    let storage = DiskStorage::new(&config.paths.cache_dir);
    let fetcher = HttpFetcher::new(&config.http)?;
    CacheFirstWorker::new(config.worker.clone(), storage, fetcher)
}

/// Parses arguments, loads configuration and runs the chosen command.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded or the command fails.
pub async fn run() -> crate::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load_or_create(&config_path)?;
    log::debug!("Using config {}", config_path.display());

    match cli.command {
        Command::Install => install(&config).await,
        Command::Serve { host, port } => {
            let mut config = config;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await
        }
        Command::Fetch {
            target,
            method,
            body,
        } => fetch(&config, &target, method, body).await,
        Command::List => list(&config).await,
    }
}

/// Runs the install handler with a progress bar.
async fn install(config: &AppConfig) -> crate::Result<()> {
    let progress = Arc::new(BarProgress::new());
    let worker = build_worker(config)?
        .with_progress(Arc::clone(&progress) as Arc<dyn InstallProgress>);

    println!(
        "Pre-caching {} asset(s) from {} into {}...\n",
        config.worker.precache.len(),
        config.worker.origin,
        config.worker.cache_name
    );
    let result = worker.on_install().await;
    progress.finish();

    let stats = result?;
    print_summary(&stats);
    Ok(())
}

/// Hosts the worker and runs the proxy until SIGINT/SIGTERM.
async fn serve(config: AppConfig) -> crate::Result<()> {
    let origin = config.worker.origin_url()?;
    let host = Arc::new(WorkerHost::new(build_worker(&config)?));

    let stats = host.install().await?;
    println!(
        "Installed {} asset(s) ({}) into {}",
        stats.assets_cached,
        format_bytes(stats.total_bytes),
        stats.cache_name
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(shutdown.clone()));
    server::run_server(&config.server.bind_addr(), host, origin, shutdown).await
}

/// Cancels `token` on SIGINT or SIGTERM.
async fn shutdown_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => log::info!("Received SIGINT"),
                    _ = sigterm.recv() => log::info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                log::warn!("Could not register SIGTERM handler: {e}");
                tokio::signal::ctrl_c().await.ok();
                log::info!("Received SIGINT");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
        log::info!("Received SIGINT");
    }
    token.cancel();
}

/// Dispatches a single fetch event against the persisted cache.
async fn fetch(
    config: &AppConfig,
    target: &str,
    method: Method,
    write_body: bool,
) -> crate::Result<()> {
    let worker = build_worker(config)?;
    let request = Request::new(method, config.worker.resolve(target)?);
    let outcome = worker.on_fetch(&request).await?;
    let source = if outcome.is_cache_hit() { "cache" } else { "network" };
    let response = outcome.into_response();

    if write_body {
        std::io::stdout().write_all(&response.body)?;
    } else {
        println!(
            "{} {} -> {} from {source} ({})",
            request.method,
            request.url,
            response.status,
            format_bytes(response.len())
        );
    }
    Ok(())
}

/// Lists every cache and the keys of the worker's own cache.
async fn list(config: &AppConfig) -> crate::Result<()> {
    let storage = DiskStorage::new(&config.paths.cache_dir);
    let names = storage.keys().await?;
    if names.is_empty() {
        println!("No caches in {}", storage.root().display());
        return Ok(());
    }

    for name in names {
        if name != config.worker.cache_name {
            println!("{name}");
            continue;
        }
        let cache = storage.open(&name).await?;
        let keys = cache.keys().await?;
        println!("{name} (worker cache, {} entries)", keys.len());
        for key in keys {
            println!("  {key}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_fetch_with_method() {
        let cli = Cli::parse_from(["precache", "fetch", "/api/data.json", "--method", "post"]);
        match cli.command {
            Command::Fetch { target, method, body } => {
                assert_eq!(target, "/api/data.json");
                assert_eq!(method, Method::POST);
                assert!(!body);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_serve_overrides_and_global_config() {
        let cli = Cli::parse_from(["precache", "serve", "--port", "9000", "-c", "/tmp/p.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/p.toml")));
        assert!(matches!(
            cli.command,
            Command::Serve { host: None, port: Some(9000) }
        ));
    }

    #[test]
    fn rejects_invalid_method() {
        assert!(parse_method("GE T").is_err());
    }

    #[test]
    fn build_worker_uses_configured_cache_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.paths.cache_dir = dir.path().join("caches");
        let worker = build_worker(&config).unwrap();
        assert_eq!(worker.storage().root(), dir.path().join("caches"));
        assert_eq!(worker.config().cache_name, "mkr1010-cache");
    }
}
