//! Discovery server
//!
//! Runs one discovery engine for a domain until interrupted.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use discovery_core::messages::Route;
use discovery_core::DomainIdentity;
use discovery_server::config::{AccumulateConfig, DiscoveryConfig};
use discovery_server::server::DiscoveryServer;
use discovery_server::transport::MailboxTransport;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "discovery-server")]
#[command(about = "Discovery coordination engine for one domain")]
struct Args {
    /// Name of the domain this engine serves
    #[arg(long, env = "DISCOVERY_DOMAIN", default_value = "domain")]
    domain: String,

    /// Accumulation window in milliseconds (0 disables batching)
    #[arg(long, env = "DISCOVERY_ACCUMULATE_MS", default_value_t = 50)]
    accumulate_ms: u64,

    /// Batch size that flushes immediately
    #[arg(long, env = "DISCOVERY_ACCUMULATE_LIMIT", default_value_t = 100)]
    accumulate_limit: usize,

    /// Service route, `service=alias[,alias...]`; repeatable
    #[arg(long = "route", value_parser = parse_route)]
    routes: Vec<Route>,

    #[arg(long, env = "DISCOVERY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Args {
    fn config(self) -> DiscoveryConfig {
        DiscoveryConfig {
            domain: DomainIdentity::new(self.domain),
            accumulate: AccumulateConfig {
                window: Duration::from_millis(self.accumulate_ms),
                limit: self.accumulate_limit,
            },
            routes: self.routes,
        }
    }
}

fn parse_route(value: &str) -> Result<Route, String> {
    let (service, aliases) = value
        .split_once('=')
        .ok_or_else(|| format!("expected service=alias[,alias...], got {value:?}"))?;
    let aliases: Vec<&str> = aliases
        .split(',')
        .map(str::trim)
        .filter(|alias| !alias.is_empty())
        .collect();
    if service.trim().is_empty() || aliases.is_empty() {
        return Err(format!("route {value:?} needs a service and at least one alias"));
    }
    Ok(Route::new(service.trim(), aliases))
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = args.config();
    info!(config = %serde_json::to_string(&config)?, "starting discovery server");

    let transport = Arc::new(MailboxTransport::new());
    let (server, handle) = DiscoveryServer::new(config, transport)?;
    let task = tokio::spawn(server.run());

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("interrupt received, draining");
            handle.shutdown()?;
        }
        () = handle.stopped() => {}
    }

    task.await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_flag_parses_aliases() {
        let route = parse_route("svc=public, other").unwrap();
        assert_eq!(route, Route::new("svc", ["public", "other"]));
    }

    #[test]
    fn route_flag_rejects_missing_alias() {
        assert!(parse_route("svc").is_err());
        assert!(parse_route("svc=").is_err());
        assert!(parse_route("=alias").is_err());
    }

    #[test]
    fn args_build_config() {
        let args = Args::parse_from([
            "discovery-server",
            "--domain",
            "north",
            "--accumulate-ms",
            "0",
            "--route",
            "svc=public",
        ]);
        let config = args.config();
        assert_eq!(config.domain.name, "north");
        assert_eq!(config.accumulate.window, Duration::ZERO);
        assert_eq!(config.routes, vec![Route::new("svc", ["public"])]);
    }
}
