//! dns-health-proxy
//!
//! Forwards DNS queries to a pool of upstreams and keeps queries away from
//! upstreams whose HTTP health endpoint reports them down.
//!
//! ```text
//! startup:  load config → logging → metrics → Proxy::start → bind listener
//! running:  SIGHUP or file change → reconfigure
//! shutdown: SIGINT/SIGTERM → stop listener → stop probes
//! ```

use std::path::PathBuf;

use clap::Parser;

use dns_health_proxy::config::validation::validate_config;
use dns_health_proxy::config::watcher::ConfigWatcher;
use dns_health_proxy::config::{load_config, ConfigError, ProxyConfig};
use dns_health_proxy::lifecycle::{Shutdown, SignalKind, Signals};
use dns_health_proxy::observability::{init_logging, init_metrics};
use dns_health_proxy::{DnsServer, Proxy};

#[derive(Debug, Parser)]
#[command(name = "dns-health-proxy", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "dns-proxy.toml")]
    config: PathBuf,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

impl Cli {
    fn load(&self) -> Result<ProxyConfig, ConfigError> {
        let mut config = load_config(&self.config)?;
        self.apply_overrides(&mut config);
        validate_config(&config)?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut ProxyConfig) {
        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.load()?;

    if cli.check {
        println!("{}: configuration ok", cli.config.display());
        return Ok(());
    }

    init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "dns-health-proxy starting");

    tracing::info!(
        config = %cli.config.display(),
        bind_address = %config.listener.bind_address,
        upstreams = config.proxy.upstreams.len(),
        attempt_ms = config.timeouts.attempt_ms,
        query_ms = config.timeouts.query_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        init_metrics(addr)?;
    }

    let proxy = Proxy::start(&config)?;
    let server = DnsServer::bind(&config.listener).await?;
    tracing::info!(address = %server.local_addr()?, "Listening for DNS queries");

    let shutdown = Shutdown::new();
    let server_task = tokio::spawn(server.run(proxy.middleware(), shutdown.subscribe()));

    let (watcher, mut updates) = ConfigWatcher::new(&cli.config);
    let _watcher = match watcher.run() {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            tracing::warn!(error = %e, "Config watcher unavailable, reload on SIGHUP only");
            None
        }
    };

    let mut signals = Signals::new()?;
    loop {
        tokio::select! {
            signal = signals.recv() => match signal {
                SignalKind::Terminate => {
                    tracing::info!("Shutdown requested");
                    break;
                }
                SignalKind::Reload => match cli.load() {
                    Ok(new_config) => reload(&proxy, &config, new_config).await,
                    Err(e) => tracing::error!(error = %e, "Reload failed, keeping current topology"),
                },
            },
            Some(mut new_config) = updates.recv() => {
                cli.apply_overrides(&mut new_config);
                reload(&proxy, &config, new_config).await;
            }
        }
    }

    shutdown.trigger();
    if let Err(e) = server_task.await {
        tracing::error!(error = %e, "Listener task failed");
    }
    proxy.shutdown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn reload(proxy: &Proxy, running: &ProxyConfig, config: ProxyConfig) {
    if config.listener.bind_address != running.listener.bind_address {
        tracing::warn!(
            running = %running.listener.bind_address,
            configured = %config.listener.bind_address,
            "Listener address changes need a restart"
        );
    }

    match proxy.reconfigure(&config).await {
        Ok(()) => tracing::info!(upstreams = config.proxy.upstreams.len(), "Configuration reloaded"),
        Err(e) => tracing::error!(error = %e, "Reload rejected, keeping current topology"),
    }
}
