use crate::{
    handlers::{App, BasicAuth},
    metrics::Statsd,
    proxy::{balance::StrategyKind, Dispatcher, DispatcherConfig, ProxyClient},
    router,
    vault::{VaultClient, VaultConfig},
};
use anyhow::Result;
use clap::{Parser, ValueEnum};
use faas_provider_consul::{CachingResolver, HttpCatalog};
use faas_provider_core::{NoopStats, Resolver, Stats};
use faas_provider_nomad::{HttpJobs, Jobs, TlsSettings, TranslateConfig};
use futures::future;
use hyper::service::{make_service_fn, service_fn};
use std::{
    convert::Infallible,
    fs::File,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[clap(name = "faas-nomad", about = "OpenFaaS provider for the Nomad scheduler")]
pub struct Args {
    /// Port the provider listens on.
    #[clap(long, env = "PORT", default_value = "8080")]
    port: u16,

    #[clap(long, env = "LOGGER_LEVEL", default_value = "INFO", value_enum, ignore_case = true)]
    logger_level: LogLevel,

    #[clap(long, env = "LOGGER_FORMAT", default_value = "text", value_enum, ignore_case = true)]
    logger_format: LogFormat,

    /// File to write logs to instead of stderr.
    #[clap(long, env = "LOGGER_OUTPUT")]
    logger_output: Option<PathBuf>,

    /// statsd sink address (`host:port`); metrics are dropped when unset.
    #[clap(long, env = "STATSD_ADDR")]
    statsd_addr: Option<String>,

    #[clap(long, env = "NOMAD_ADDR", default_value = "http://localhost:4646")]
    nomad_addr: String,

    #[clap(long, env = "NOMAD_REGION", default_value = "global")]
    nomad_region: String,

    /// Datacenter used for jobs with no datacenter constraint.
    #[clap(long, env = "NOMAD_DATACENTER", default_value = "dc1")]
    nomad_datacenter: String,

    #[clap(long, env = "NOMAD_ACL")]
    nomad_acl: Option<String>,

    #[clap(long, env = "NOMAD_TLS_CA")]
    nomad_tls_ca: Option<PathBuf>,

    #[clap(long, env = "NOMAD_TLS_CERT")]
    nomad_tls_cert: Option<PathBuf>,

    #[clap(long, env = "NOMAD_TLS_KEY")]
    nomad_tls_key: Option<PathBuf>,

    #[clap(long, env = "NOMAD_TLS_SKIP_VERIFY")]
    nomad_tls_skip_verify: bool,

    #[clap(long, env = "CONSUL_ADDR", default_value = "http://localhost:8500")]
    consul_addr: String,

    #[clap(long, env = "CONSUL_ACL")]
    consul_acl: Option<String>,

    /// Hand the discovery host to functions as their DNS server.
    #[clap(long, env = "ENABLE_CONSUL_DNS")]
    enable_consul_dns: bool,

    /// Seconds before an in-flight invocation is abandoned. Also bounds
    /// dialing and each retry attempt.
    #[clap(long, env = "FUNCTION_TIMEOUT", default_value = "30")]
    function_timeout: u64,

    #[clap(long, env = "ENABLE_BASIC_AUTH")]
    enable_basic_auth: bool,

    #[clap(long, env = "BASIC_AUTH_SECRET_PATH", default_value = "/run/secrets")]
    basic_auth_secret_path: PathBuf,

    /// Secret store address; the secrets endpoint returns 500 when unset.
    #[clap(long, env = "VAULT_ADDR")]
    vault_addr: Option<String>,

    #[clap(long, env = "VAULT_DEFAULT_POLICY", default_value = "openfaas")]
    vault_default_policy: String,

    #[clap(long, env = "VAULT_SECRET_PATH_PREFIX", default_value = "secret/openfaas")]
    vault_secret_path_prefix: String,

    #[clap(long, env = "VAULT_APP_ROLE_ID")]
    vault_app_role_id: Option<String>,

    #[clap(long, env = "VAULT_APP_SECRET_ID")]
    vault_app_secret_id: Option<String>,

    /// Host substituted for loopback service addresses, for setups where
    /// the provider runs in a container on a developer host.
    #[clap(long, env = "PROXY_LOOPBACK_REWRITE")]
    proxy_loopback_rewrite: Option<String>,

    /// Endpoint selection strategy for the invoke path.
    #[clap(
        long,
        env = "LB_STRATEGY",
        default_value = "round-robin",
        value_enum,
        ignore_case = true
    )]
    lb_strategy: LbStrategy,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LbStrategy {
    RoundRobin,
    Random,
}

impl From<LbStrategy> for StrategyKind {
    fn from(strategy: LbStrategy) -> Self {
        match strategy {
            LbStrategy::RoundRobin => Self::RoundRobin,
            LbStrategy::Random => Self::Random,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

// === impl Args ===

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        init_tracing(
            self.logger_format,
            self.logger_level,
            self.logger_output.as_deref(),
        )?;

        let stats: Arc<dyn Stats> = match &self.statsd_addr {
            Some(addr) => Arc::new(Statsd::new(addr)?),
            None => Arc::new(NoopStats),
        };

        let catalog = Arc::new(HttpCatalog::new(&self.consul_addr, self.consul_acl.clone()));
        let resolver: Arc<dyn Resolver> = Arc::new(CachingResolver::new(
            catalog,
            self.proxy_loopback_rewrite.clone(),
        ));

        let tls = TlsSettings {
            ca: self.nomad_tls_ca.clone(),
            cert: self.nomad_tls_cert.clone(),
            key: self.nomad_tls_key.clone(),
            skip_verify: self.nomad_tls_skip_verify,
        };
        let jobs: Arc<dyn Jobs> = Arc::new(HttpJobs::new(
            &self.nomad_addr,
            Some(self.nomad_region.clone()),
            self.nomad_acl.clone(),
            &tls,
        )?);

        let vault = match &self.vault_addr {
            Some(addr) => {
                let client = Arc::new(VaultClient::new(VaultConfig {
                    addr: addr.clone(),
                    default_policy: self.vault_default_policy.clone(),
                    app_role_id: self.vault_app_role_id.clone().unwrap_or_default(),
                    app_secret_id: self.vault_app_secret_id.clone().unwrap_or_default(),
                }));
                match client.login().await {
                    Ok(lease) => client.clone().spawn_renewal(lease),
                    Err(error) => error!(%error, "secret store login failed"),
                }
                Some(client)
            }
            None => None,
        };

        let timeout = Duration::from_secs(self.function_timeout);
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(ProxyClient::new(timeout)),
            DispatcherConfig {
                timeout,
                strategy: self.lb_strategy.into(),
                ..DispatcherConfig::default()
            },
        ));
        dispatcher.clone().spawn_janitor();

        let basic_auth = if self.enable_basic_auth {
            Some(BasicAuth::load(&self.basic_auth_secret_path)?)
        } else {
            None
        };

        let app = Arc::new(App {
            jobs,
            resolver,
            dispatcher,
            stats,
            vault,
            translate: TranslateConfig {
                region: self.nomad_region.clone(),
                datacenter: self.nomad_datacenter.clone(),
                consul_dns_host: consul_dns_host(self.enable_consul_dns, &self.consul_addr),
                vault_default_policy: self.vault_default_policy.clone(),
                vault_secret_path_prefix: self.vault_secret_path_prefix.clone(),
                ..TranslateConfig::default()
            },
            basic_auth,
        });

        let (signal, watch) = drain::channel();
        tokio::spawn(async move {
            wait_for_shutdown().await;
            info!("shutting down");
            signal.drain().await;
        });

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let server = hyper::Server::bind(&addr).serve(make_service_fn(move |_conn| {
            let app = app.clone();
            future::ok::<_, Infallible>(service_fn(move |request| {
                let app = app.clone();
                async move { Ok::<_, Infallible>(router::handle(app, request).await) }
            }))
        }));
        info!(%addr, "provider listening");
        server
            .with_graceful_shutdown(async move {
                let _release = watch.signaled().await;
            })
            .await?;
        Ok(())
    }
}

fn consul_dns_host(enabled: bool, addr: &str) -> Option<String> {
    if !enabled {
        return None;
    }
    addr.parse::<hyper::Uri>()
        .ok()
        .and_then(|uri| uri.host().map(|host| host.to_string()))
}

fn init_tracing(format: LogFormat, level: LogLevel, output: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_new(level.directive())?;
    match (format, output) {
        (LogFormat::Text, None) => tracing_subscriber::fmt().with_env_filter(filter).init(),
        (LogFormat::Json, None) => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        (LogFormat::Text, Some(path)) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Arc::new(File::create(path)?))
            .init(),
        (LogFormat::Json, Some(path)) => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(Arc::new(File::create(path)?))
            .init(),
    }
    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
