// # sidekick - self-registration sidecar
//
// Thin integration layer. All registration and publishing logic lives in
// sidekick-core; this binary only:
// 1. Parses the command line (flags can also come from the environment)
// 2. Sets up logging and the runtime
// 3. Wires the local address source, the registry or DNS provider, and the
//    core engine together
// 4. Maps the outcome to an exit status
//
// ## Modes
//
// ### etcd
// Writes KEY with the formatted address, keeps it (and every directory below
// --expire-dir) alive with TTL refreshes, and deletes it on SIGINT/SIGTERM.
//
// ```bash
// sidekick etcd --etcd-endpoint http://10.0.0.2:2379 --cidr 10.0.0.0/8 \
//     --format 'http://$ip:8080' --expire-dir /services/ /services/web/instance-1
// ```
//
// ### dns
// Upserts a single A/AAAA record pointing at the selected address, then exits.
//
// ```bash
// export CLOUDFLARE_API_TOKEN=...
// sidekick dns --cidr 10.0.0.0/8 ZONE_ID web-1.example.com
//
// # AWS credentials from the usual environment/profile chain
// sidekick dns --provider route53 --cidr 10.0.0.0/8 Z0123456789 web-1.example.com
// ```

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand, ValueEnum};
use sidekick_core::config::{
    DEFAULT_CIDR, DEFAULT_ETCD_ENDPOINT, DEFAULT_RECORD_TTL_SECS, IP_PLACEHOLDER, PublishConfig,
    RegistrationConfig, parse_duration,
};
use sidekick_core::Error;
use sidekick_core::traits::DnsProvider;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for different termination scenarios
///
/// - 0: Clean shutdown, successful publish, or help/version output
/// - 1: Usage or configuration error
/// - 2: Operational failure (address selection, registry, or provider)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SidekickExitCode {
    CleanShutdown = 0,
    UsageError = 1,
    OperationalFailure = 2,
}

impl From<SidekickExitCode> for ExitCode {
    fn from(code: SidekickExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Debug, Parser)]
#[command(name = "sidekick", version)]
#[command(about = "Registers the workload's address in etcd or DNS")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        global = true,
        env = "SIDEKICK_LOG_LEVEL",
        default_value = "info",
        value_parser = parse_level
    )]
    log_level: Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Keep a key in etcd alive with the container's address
    Etcd(EtcdArgs),
    /// Upsert a DNS record with the container's address
    Dns(DnsArgs),
}

#[derive(Debug, Args)]
struct EtcdArgs {
    /// etcd endpoints (comma-separated)
    #[arg(short = 'e', long, env = "SIDEKICK_ETCD_ENDPOINT", default_value = DEFAULT_ETCD_ENDPOINT)]
    etcd_endpoint: String,

    /// CIDR the registered address must fall in
    #[arg(long, env = "SIDEKICK_CIDR", default_value = DEFAULT_CIDR)]
    cidr: String,

    /// Value written to the key; every '$ip' is replaced by the address
    #[arg(short, long, env = "SIDEKICK_FORMAT", default_value = IP_PLACEHOLDER)]
    format: String,

    /// Refresh TTLs of every directory below this path, not only the key
    #[arg(long, alias = "expireDir", env = "SIDEKICK_EXPIRE_DIR")]
    expire_dir: Option<String>,

    /// Refresh interval (e.g. 30s, 1m, 1m30s); entries expire after twice this
    #[arg(
        short,
        long,
        env = "SIDEKICK_INTERVAL",
        default_value = "1m",
        value_parser = parse_duration
    )]
    interval: Duration,

    /// Attach the TTL to the initial write as well
    #[arg(long, env = "SIDEKICK_INITIAL_TTL")]
    initial_ttl: bool,

    /// Retries per registry operation before giving up
    #[arg(long, env = "SIDEKICK_MAX_RETRIES", default_value_t = 0)]
    max_retries: usize,

    /// Delay between retries
    #[arg(long, env = "SIDEKICK_RETRY_DELAY", default_value = "5s", value_parser = parse_duration)]
    retry_delay: Duration,

    /// Key to register, e.g. /services/web/instance-1
    key: String,
}

impl EtcdArgs {
    fn into_config(self) -> RegistrationConfig {
        let endpoints = self
            .etcd_endpoint
            .split(',')
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();

        let mut config = RegistrationConfig::new(self.key)
            .with_endpoints(endpoints)
            .with_cidr(self.cidr)
            .with_value_template(self.format)
            .with_interval(self.interval)
            .with_retries(self.max_retries, self.retry_delay);
        if let Some(dir) = self.expire_dir {
            config = config.with_keep_root(dir);
        }
        config.initial_ttl = self.initial_ttl;
        config
    }
}

/// Route53 accepts any TTL; records are kept as short-lived as possible
const ROUTE53_RECORD_TTL_SECS: u32 = 1;

/// DNS provider backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DnsProviderKind {
    Cloudflare,
    Route53,
}

impl DnsProviderKind {
    /// Record TTL used when `--ttl` is not given
    fn default_ttl(self) -> u32 {
        match self {
            Self::Cloudflare => DEFAULT_RECORD_TTL_SECS,
            Self::Route53 => ROUTE53_RECORD_TTL_SECS,
        }
    }
}

#[derive(Debug, Args)]
struct DnsArgs {
    /// CIDR the published address must fall in
    #[arg(long, env = "SIDEKICK_CIDR", default_value = DEFAULT_CIDR)]
    cidr: String,

    /// DNS provider to publish through
    #[arg(
        long,
        value_enum,
        env = "SIDEKICK_DNS_PROVIDER",
        default_value_t = DnsProviderKind::Cloudflare
    )]
    provider: DnsProviderKind,

    /// Cloudflare API token (Zone:DNS:Edit)
    #[arg(long, env = "CLOUDFLARE_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Look up the record but do not change it (cloudflare only)
    #[arg(long, env = "SIDEKICK_DRY_RUN")]
    dry_run: bool,

    /// Record TTL in seconds [default: 60 for cloudflare, 1 for route53]
    #[arg(long, env = "SIDEKICK_RECORD_TTL")]
    ttl: Option<u32>,

    /// Zone identifier
    zone_id: String,

    /// Fully qualified record name
    hostname: String,
}

impl DnsArgs {
    fn to_config(&self) -> PublishConfig {
        let mut config = PublishConfig::new(self.zone_id.clone(), self.hostname.clone())
            .with_cidr(self.cidr.clone());
        config.ttl = self.ttl.unwrap_or(self.provider.default_ttl());
        config
    }
}

fn parse_level(s: &str) -> std::result::Result<Level, String> {
    match s.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(format!(
            "'{s}' is not a valid level. Valid levels: trace, debug, info, warn, error"
        )),
    }
}

/// Exit status for a failed run
fn exit_code_for(err: &anyhow::Error) -> SidekickExitCode {
    match err.downcast_ref::<Error>() {
        Some(e) if e.is_usage() => SidekickExitCode::UsageError,
        _ => SidekickExitCode::OperationalFailure,
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    SidekickExitCode::CleanShutdown
                }
                _ => SidekickExitCode::UsageError,
            };
            let _ = e.print();
            return code.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return SidekickExitCode::OperationalFailure.into();
    }

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return SidekickExitCode::OperationalFailure.into();
        }
    };

    let result = rt.block_on(async {
        match cli.command {
            Command::Etcd(args) => run_etcd(args).await,
            Command::Dns(args) => run_dns(args).await,
        }
    });

    match result {
        Ok(()) => SidekickExitCode::CleanShutdown.into(),
        Err(e) => {
            let code = exit_code_for(&e);
            if code == SidekickExitCode::UsageError {
                eprintln!("error: {e:#}\n\nFor more information, try '--help'.");
            } else {
                error!("{:#}", e);
            }
            code.into()
        }
    }
}

/// Register in etcd and keep the registration alive until a signal arrives
#[cfg(feature = "etcd")]
async fn run_etcd(args: EtcdArgs) -> Result<()> {
    use sidekick_core::{ShutdownSignal, select_address};
    use sidekick_ip_local::LocalAddressSource;
    use sidekick_registry_etcd::EtcdRegistry;

    let config = args.into_config();
    config.validate()?;

    // Installed before any registry call so an early signal is not lost
    let signal = ShutdownSignal::install()?;

    let registry = EtcdRegistry::new(&config.endpoints)?;
    let address = select_address(&LocalAddressSource::new(), &config.prefix()?)?;
    info!("Selected address {} (cidr {})", address, config.cidr);

    let engine = registration_engine(Box::new(registry), config, address)?;
    engine.run(signal).await?;

    info!("Shut down cleanly");
    Ok(())
}

/// Build the engine without an event listener
///
/// Nothing here reads engine events, so the receiver is dropped and the
/// engine stops emitting them.
#[cfg(feature = "etcd")]
fn registration_engine(
    registry: Box<dyn sidekick_core::traits::KeyValueRegistry>,
    config: RegistrationConfig,
    address: std::net::IpAddr,
) -> sidekick_core::Result<sidekick_core::RegistrationEngine> {
    let (engine, _) = sidekick_core::RegistrationEngine::new(registry, config, address)?;
    Ok(engine)
}

#[cfg(not(feature = "etcd"))]
async fn run_etcd(_args: EtcdArgs) -> Result<()> {
    Err(Error::usage("sidekick was built without etcd support").into())
}

/// Publish the DNS record once
async fn run_dns(args: DnsArgs) -> Result<()> {
    use sidekick_core::{RecordPublisher, select_address};
    use sidekick_ip_local::LocalAddressSource;

    let config = args.to_config();
    config.validate()?;

    let provider = dns_provider(&args).await?;
    let address = select_address(&LocalAddressSource::new(), &config.prefix()?)?;
    info!("Selected address {} (cidr {})", address, config.cidr);

    let publisher = RecordPublisher::from_config(provider, &config)?;
    let result = publisher.publish_config(&config, address).await?;
    info!("Publish finished: {:?}", result);
    Ok(())
}

async fn dns_provider(args: &DnsArgs) -> Result<Box<dyn DnsProvider>> {
    match args.provider {
        DnsProviderKind::Cloudflare => cloudflare_provider(args),
        DnsProviderKind::Route53 => route53_provider(args).await,
    }
}

#[cfg(feature = "cloudflare")]
fn cloudflare_provider(args: &DnsArgs) -> Result<Box<dyn DnsProvider>> {
    use sidekick_provider_cloudflare::CloudflareProvider;

    let token = args.api_token.clone().unwrap_or_default();
    Ok(Box::new(CloudflareProvider::new(token, args.dry_run)?))
}

#[cfg(not(feature = "cloudflare"))]
fn cloudflare_provider(_args: &DnsArgs) -> Result<Box<dyn DnsProvider>> {
    Err(Error::usage("sidekick was built without cloudflare support").into())
}

#[cfg(feature = "route53")]
async fn route53_provider(args: &DnsArgs) -> Result<Box<dyn DnsProvider>> {
    use sidekick_provider_route53::Route53Provider;

    if args.dry_run {
        return Err(Error::usage("--dry-run is not supported by the route53 provider").into());
    }
    Ok(Box::new(Route53Provider::from_env().await))
}

#[cfg(not(feature = "route53"))]
async fn route53_provider(_args: &DnsArgs) -> Result<Box<dyn DnsProvider>> {
    Err(Error::usage("sidekick was built without route53 support").into())
}
