// # cfddnsd - Cloudflare DDNS Daemon
//
// Thin integration layer: all update logic lives in cfddns-core.
//
// The daemon is responsible for:
// 1. Parsing command-line flags (no config file, no environment variables)
// 2. Initializing logging and the runtime
// 3. Building the IP source and the Cloudflare provider
// 4. Running the poll loop until SIGTERM / SIGINT
//
// ## Flags
//
// Required:
// - `-zone_identifier`: Cloudflare zone ID
// - `-filter`: substring matched against record comments
// - `-auth_key`: Cloudflare API token
//
// Optional:
// - `-interval_secs`: poll interval, default 120
// - `-ip_url`: IP lookup endpoint
// - `-api_base`: Cloudflare API base URL
// - `-skip_overlapping`: skip ticks while a cycle runs
// - `-dry_run`: list records but never PATCH them
// - `-log_level`: trace, debug, info, warn, error
//
// Flags take a single dash; the double-dash spelling works too. The argument
// after a value-taking flag is always its value, even when it starts with `-`.
//
// ## Example
//
// ```bash
// cfddnsd -zone_identifier 023e105f4ecef8ad9ca31a8372d0c353 \
//     -filter ddns -auth_key "$CF_TOKEN"
// ```

use anyhow::{Context, Result};
use cfddns_core::config::{
    DEFAULT_CLOUDFLARE_API_BASE, DEFAULT_IP_LOOKUP_URL, DdnsConfig, EngineConfig, IpSourceConfig,
    ProviderConfig,
};
use cfddns_core::{DdnsEngine, EngineEvent};
use cfddns_ip_http::IpifySource;
use cfddns_provider_cloudflare::CloudflareProvider;
use clap::{CommandFactory, Parser};
use std::ffi::OsString;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown (also used when required flags are missing)
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DdnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Command-line flags
#[derive(Parser, Debug)]
#[command(name = "cfddnsd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Keeps Cloudflare A records pointed at this host's public IPv4 address")]
struct Cli {
    /// Cloudflare zone identifier
    #[arg(long = "zone_identifier", allow_hyphen_values = true)]
    zone_identifier: Option<String>,

    /// Update every record whose comment contains this text
    #[arg(long = "filter", allow_hyphen_values = true)]
    filter: Option<String>,

    /// Cloudflare API token (Zone:DNS:Edit)
    #[arg(long = "auth_key", allow_hyphen_values = true)]
    auth_key: Option<String>,

    /// Seconds between IP checks
    #[arg(long = "interval_secs", default_value_t = 120)]
    interval_secs: u64,

    /// Public IP lookup endpoint returning {"ip": "..."}
    #[arg(long = "ip_url", default_value = DEFAULT_IP_LOOKUP_URL)]
    ip_url: String,

    /// Cloudflare API base URL
    #[arg(long = "api_base", default_value = DEFAULT_CLOUDFLARE_API_BASE)]
    api_base: String,

    /// Skip a tick while the previous check is still running
    #[arg(long = "skip_overlapping")]
    skip_overlapping: bool,

    /// List matching records but never modify them
    #[arg(long = "dry_run")]
    dry_run: bool,

    /// Log level: trace, debug, info, warn, error
    #[arg(long = "log_level", default_value = "info")]
    log_level: String,
}

impl Cli {
    /// Required flags that are absent or empty, in declaration order
    fn missing_required(&self) -> Vec<&'static str> {
        [
            ("-zone_identifier", &self.zone_identifier),
            ("-filter", &self.filter),
            ("-auth_key", &self.auth_key),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().is_none_or(str::is_empty))
        .map(|(flag, _)| flag)
        .collect()
    }

    /// Build the updater configuration
    ///
    /// Call only after `missing_required` came back empty.
    fn to_config(&self) -> Result<DdnsConfig> {
        let provider = ProviderConfig::new(
            self.zone_identifier.clone().unwrap_or_default(),
            self.filter.clone().unwrap_or_default(),
            self.auth_key.clone().unwrap_or_default(),
        )
        .with_api_base(self.api_base.clone())
        .with_dry_run(self.dry_run);

        let config = DdnsConfig {
            ip_source: IpSourceConfig {
                url: self.ip_url.clone(),
            },
            provider,
            engine: EngineConfig::default()
                .with_poll_interval_secs(self.interval_secs)
                .with_skip_overlapping_ticks(self.skip_overlapping),
        };

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

/// Long flags whose value is the following argument
const VALUE_FLAGS: &[&str] = &[
    "zone_identifier",
    "filter",
    "auth_key",
    "interval_secs",
    "ip_url",
    "api_base",
    "log_level",
];

/// Rewrite single-dash long flags (`-auth_key`) to the double-dash form
///
/// The program name, one-letter flags, flag values and anything after `--`
/// are left as is.
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut passthrough = false;
    let mut value_next = false;

    args.into_iter()
        .enumerate()
        .map(|(index, arg)| {
            if index == 0 || passthrough {
                return arg;
            }
            if value_next {
                value_next = false;
                return arg;
            }
            let Some(text) = arg.to_str() else {
                return arg;
            };
            if text == "--" {
                passthrough = true;
                return arg;
            }
            if !text.starts_with('-') {
                return arg;
            }

            let name = text.trim_start_matches('-');
            value_next = !name.contains('=') && VALUE_FLAGS.contains(&name);

            if text.len() > 2 && !text.starts_with("--") {
                return OsString::from(format!("-{}", text));
            }
            arg
        })
        .collect()
}

/// Error line and usage text printed when required flags are missing
fn missing_flags_usage(missing: &[&str]) -> String {
    format!(
        "Error: missing or empty required flags: {}\n{}",
        missing.join(", "),
        Cli::command().render_help()
    )
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "Log level '{}' is not valid. Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version land here too
            let _ = e.print();
            return if e.use_stderr() {
                DdnsExitCode::ConfigError
            } else {
                DdnsExitCode::CleanShutdown
            }
            .into();
        }
    };

    let missing = cli.missing_required();
    if !missing.is_empty() {
        println!("{}", missing_flags_usage(&missing));
        return DdnsExitCode::CleanShutdown.into();
    }

    let log_level = match parse_log_level(&cli.log_level) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    let config = match cli.to_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    info!("Starting cfddnsd daemon");
    info!(
        "Zone {}, filter {:?}, interval {}s{}",
        config.provider.zone_identifier,
        config.provider.filter,
        config.engine.poll_interval_secs,
        if config.provider.dry_run { " [DRY-RUN]" } else { "" }
    );

    let (engine, events) = match build_engine(&config) {
        Ok(parts) => parts,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(engine, events).await {
            error!("Daemon error: {:#}", e);
            DdnsExitCode::RuntimeError
        } else {
            DdnsExitCode::CleanShutdown
        }
    });

    info!("cfddnsd stopped");
    result.into()
}

/// Wire the IP source and provider into an engine
fn build_engine(config: &DdnsConfig) -> Result<(DdnsEngine, mpsc::Receiver<EngineEvent>)> {
    let ip_source =
        IpifySource::from_config(&config.ip_source).context("Failed to create IP source")?;
    let provider = CloudflareProvider::from_config(&config.provider)
        .context("Failed to create Cloudflare provider")?;

    DdnsEngine::new(
        Box::new(ip_source),
        Box::new(provider),
        config.engine.clone(),
    )
    .context("Failed to create engine")
}

/// Run the poll loop until a shutdown signal arrives
async fn run_daemon(engine: DdnsEngine, mut events: mpsc::Receiver<EngineEvent>) -> Result<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("Engine event: {:?}", event);
        }
    });

    #[cfg(unix)]
    {
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let received = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            };
            info!("Received shutdown signal: {}", received);
            let _ = shutdown_tx.send(());
        });

        engine.run_with_shutdown(Some(shutdown_rx)).await?;
    }

    #[cfg(not(unix))]
    engine.run().await?;

    Ok(())
}
