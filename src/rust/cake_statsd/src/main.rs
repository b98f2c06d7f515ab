mod webserver;

use anyhow::Result;
use cake_config::{Config, CONFIG_PATH};
use cake_queue_tracker::{probe_tc_capability, spawn_queue_monitor, CollectorConfig, QueueTracker};
use clap::Parser;
use std::{path::PathBuf, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Serves live CAKE qdisc statistics over HTTP.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Address to bind, replacing the host part of `listen_address`
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, replacing the port part of `listen_address`
    #[arg(long)]
    port: Option<u16>,

    /// Poll interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Samples kept per interface
    #[arg(long)]
    history: Option<usize>,

    /// Configuration file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,
}

/// Log level when `RUST_LOG` is unset or can't be parsed.
const DEFAULT_LOG_FILTER: &str = "warn";

/// `RUST_LOG` accepts plain levels (`debug`) and per-target directives
/// (`cake_queue_tracker=trace`).
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn set_console_logging() -> Result<()> {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(log_filter(directives.as_deref()))
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Command-line values win over the file. The result is validated again
/// so an override can't sneak in a zero interval.
fn apply_overrides(mut config: Config, args: &Args) -> Result<Config> {
    if args.host.is_some() || args.port.is_some() {
        let (current_host, current_port) = config
            .listen_address
            .rsplit_once(':')
            .unwrap_or((config.listen_address.as_str(), ""));
        let host = args.host.clone().unwrap_or_else(|| current_host.to_string());
        let port = args
            .port
            .map(|p| p.to_string())
            .unwrap_or_else(|| current_port.to_string());
        config.listen_address = format!("{host}:{port}");
    }
    if let Some(interval_ms) = args.interval_ms {
        config.poll_interval_ms = interval_ms;
    }
    if let Some(history) = args.history {
        config.history_capacity = history;
    }
    Ok(config.validated()?)
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for SIGINT: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Unable to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
        _ = cancel.cancelled() => {}
    }
    cancel.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    set_console_logging()?;

    let config = apply_overrides(Config::load_from(&args.config)?, &args)?;
    info!("cake_statsd starting, polling tc every {:?}", config.poll_interval());

    let capability = probe_tc_capability(&config.tc_binary, config.collect_timeout()).await;
    let collector = CollectorConfig::from_config(&config, capability);
    let tracker = Arc::new(QueueTracker::new(config.history_capacity));
    let cancel = CancellationToken::new();

    let monitor = spawn_queue_monitor(tracker.clone(), collector, cancel.clone());
    let served = webserver::run_webserver(
        &config.listen_address,
        tracker,
        shutdown_signal(cancel.clone()),
    )
    .await;

    cancel.cancel();
    if let Err(e) = monitor.await {
        error!("Queue monitor task failed: {e}");
    }
    served
}

#[cfg(test)]
mod test {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["cake_statsd"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn defaults_without_flags() {
        let a = args(&[]);
        assert_eq!(a.config, PathBuf::from(CONFIG_PATH));
        let config = apply_overrides(Config::default(), &a).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn flags_override_file() {
        let a = args(&["--host", "127.0.0.1", "--interval-ms", "250", "--history", "1"]);
        let config = apply_overrides(Config::default(), &a).unwrap();
        assert_eq!(config.listen_address, "127.0.0.1:11112");
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.history_capacity, 2);
    }

    #[test]
    fn port_only() {
        let a = args(&["--port", "8080"]);
        let config = apply_overrides(Config::default(), &a).unwrap();
        assert_eq!(config.listen_address, "0.0.0.0:8080");
    }

    #[test]
    fn ipv6_host_keeps_port() {
        let mut file = Config::default();
        file.listen_address = "[::]:9000".to_string();
        let a = args(&["--host", "[::1]"]);
        let config = apply_overrides(file, &a).unwrap();
        assert_eq!(config.listen_address, "[::1]:9000");
    }

    #[test]
    fn log_filter_from_env() {
        use tracing::level_filters::LevelFilter;

        assert_eq!(log_filter(None).max_level_hint(), Some(LevelFilter::WARN));
        assert_eq!(log_filter(Some("debug")).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(
            log_filter(Some("cake_queue_tracker=trace")).max_level_hint(),
            Some(LevelFilter::TRACE)
        );
        assert_eq!(
            log_filter(Some("cake_statsd=loud")).max_level_hint(),
            Some(LevelFilter::WARN)
        );
    }

    #[test]
    fn zero_interval_is_rejected() {
        let a = args(&["--interval-ms", "0"]);
        assert!(apply_overrides(Config::default(), &a).is_err());
    }
}
