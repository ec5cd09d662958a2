use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use spuddns_domain::AppConfig;
use spuddns_infrastructure::dns::server::DnsServerHandler;
use spuddns_infrastructure::metrics::run_metrics_server;
use spuddns_jobs::{CachePersistJob, HostsWatchJob, JobRunner, ResolvConfWatchJob};
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod bootstrap;
mod di;
mod server;

const METRICS_PORT: u16 = 2112;

#[derive(Parser)]
#[command(name = "spuddns")]
#[command(version)]
#[command(about = "Caching, forwarding DNS proxy with predictive refresh")]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<String>,

    /// Log level override (slog-style: -4 debug, 0 info, 4 warn, 8 error)
    #[arg(long)]
    log_level: Option<i32>,
}

fn listen_addr(config: &AppConfig, port: u16) -> Result<SocketAddr> {
    let bind = if config.bind_address.is_empty() {
        "0.0.0.0"
    } else {
        config.bind_address.as_str()
    };
    format!("{bind}:{port}")
        .parse()
        .with_context(|| format!("invalid bind address '{bind}:{port}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match bootstrap::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("config not loaded, starting with defaults: {e}");
            let mut config = AppConfig::default();
            config.prepare();
            config
        }
    };
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    bootstrap::init_logging(&config);
    info!("starting spuddns v{}", env!("CARGO_PKG_VERSION"));

    if config.upstream_resolvers.is_empty() && !config.respect_resolvconf {
        warn!("no upstream resolvers are configured");
    }

    let config = Arc::new(config);
    let shutdown = CancellationToken::new();
    let services = di::build_services(config.clone(), shutdown.clone())?;

    // Every socket is bound before privileges are dropped.
    let dns_socket = UdpSocket::bind(listen_addr(&config, config.dns_server_port)?)
        .await
        .context("failed to bind dns listener")?;

    let dot_listener = if config.dns_over_tls_enable {
        let tls_config = server::load_tls_config(
            &config.dns_over_tls_cert_file,
            &config.dns_over_tls_key_file,
        )?;
        let listener = TcpListener::bind(listen_addr(&config, config.dns_over_tls_port)?)
            .await
            .context("failed to bind dns over tls listener")?;
        Some((listener, tls_config))
    } else {
        None
    };

    let doh_listener = if config.dns_over_http_enable {
        let listener = TcpListener::bind(listen_addr(&config, config.dns_over_http_port)?)
            .await
            .context("failed to bind dns over http listener")?;
        Some(listener)
    } else {
        None
    };

    let metrics_listener = match &services.metrics {
        Some(_) => Some(listen_addr(&config, METRICS_PORT)?),
        None => None,
    };

    let mut jobs = JobRunner::new().with_shutdown_token(shutdown.clone());
    if config.respect_resolvconf {
        jobs = jobs.with_resolv_conf_watch(ResolvConfWatchJob::new(
            config.resolvconf_path.clone(),
            services.resolv_conf.clone(),
        ));
    }
    jobs = jobs.with_hosts_watch(HostsWatchJob::new(
        di::HOSTS_PATH.to_string(),
        services.hosts.clone(),
    ));
    if !config.persistent_cache_file.is_empty() {
        if let Some(cache) = &services.cache {
            jobs = jobs.with_cache_persist(CachePersistJob::new(
                cache.clone(),
                config.persistent_cache_file.clone(),
            ));
        }
    }
    jobs.start().await;

    let handler = Arc::new(DnsServerHandler::new(services.use_case.clone()));

    let dns_handler = handler.clone();
    tokio::spawn(async move {
        server::run_dns_server(dns_socket, dns_handler).await;
    });

    if let Some((listener, tls_config)) = dot_listener {
        let dot_handler = handler.clone();
        tokio::spawn(async move {
            server::run_dot_server(listener, tls_config, dot_handler).await;
        });
    }

    if let Some(listener) = doh_listener {
        let use_case = services.use_case.clone();
        tokio::spawn(async move {
            if let Err(e) = server::run_doh_server(listener, use_case).await {
                error!(error = %e, "dns over http server failed");
            }
        });
    }

    if let (Some(addr), Some(metrics)) = (metrics_listener, services.metrics.clone()) {
        tokio::spawn(async move {
            if let Err(e) = run_metrics_server(addr, metrics).await {
                error!(error = %e, "metrics server failed");
            }
        });
    }

    if let Err(e) = bootstrap::drop_privileges() {
        warn!(error = %e, "failed to drop privileges after initialization");
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for shutdown signal")?;
    info!("shutdown signal received, stopping");
    shutdown.cancel();

    Ok(())
}
