use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jetkvm_bridge::{candidate_handler, ClientConfig, KvmClient};

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// JetKVM bridge command line arguments
#[derive(Parser, Debug)]
#[command(name = "jetkvm-bridge")]
#[command(version, about = "WebRTC signaling client for JetKVM appliances", long_about = None)]
struct CliArgs {
    /// JSON configuration file
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Appliance host (overrides config file)
    #[arg(short = 'H', long, value_name = "HOST")]
    host: Option<String>,

    /// Native API port (overrides config file)
    #[arg(short = 'p', long, value_name = "PORT")]
    port: Option<u16>,

    /// Local login password (overrides config file and JETKVM_PASSWORD)
    #[arg(long, value_name = "PASSWORD")]
    password: Option<String>,

    /// Negotiate the SDP offer in FILE and print the answer
    #[arg(long, value_name = "FILE")]
    offer: Option<PathBuf>,

    /// Correlation id for the video session (generated when holding)
    #[arg(long, value_name = "ID", requires = "offer")]
    session_id: Option<String>,

    /// Keep the video session open for SECS, logging remote candidates
    #[arg(long, value_name = "SECS", requires = "offer")]
    hold: Option<u64>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting JetKVM bridge v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => ClientConfig::load(path)
            .await
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ClientConfig::default(),
    };

    // Apply CLI argument overrides to config (only if explicitly specified)
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.native_port = port;
    }
    if let Some(password) = args.password {
        config.password = Some(password);
    }
    config.apply_env();

    let client = KvmClient::new(config)?;
    tracing::info!(
        "Appliance: {} (video {})",
        client.config().native_base_url(),
        if client.has_video() { "enabled" } else { "disabled" }
    );

    let Some(offer_path) = args.offer else {
        client.ensure_authenticated().await?;
        tracing::info!("Authenticated with {}", client.host());
        return Ok(());
    };

    let offer_sdp = tokio::fs::read_to_string(&offer_path)
        .await
        .with_context(|| format!("failed to read offer from {}", offer_path.display()))?;

    let session_id = match (args.session_id, args.hold) {
        (Some(id), _) => Some(id),
        (None, Some(_)) => Some(uuid::Uuid::new_v4().to_string()),
        (None, None) => None,
    };

    let handler = session_id.as_ref().map(|id| {
        let id = id.clone();
        candidate_handler(move |candidate| {
            let id = id.clone();
            async move {
                tracing::info!(
                    "Remote candidate for {}: {}",
                    id,
                    serde_json::Value::Object(candidate)
                );
            }
        })
    });

    let result = client
        .negotiate(&offer_sdp, session_id.as_deref(), handler)
        .await;
    let answer = match result {
        Ok(answer) => answer,
        Err(e) => {
            client.close().await;
            return Err(e.into());
        }
    };

    tracing::info!("Answer received via {}", answer.transport);
    println!("{}", answer.answer_sdp);

    if let (Some(secs), Some(id)) = (args.hold, session_id.as_deref()) {
        if answer.session_registered {
            tracing::info!("Holding video session {} for {}s", id, secs);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted, closing session");
                }
            }
        } else {
            tracing::warn!("No video session was opened ({}), nothing to hold", answer.transport);
        }
    }

    client.close().await;
    Ok(())
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "jetkvm_bridge=error,reqwest=error",
        LogLevel::Warn => "jetkvm_bridge=warn,reqwest=warn",
        LogLevel::Info => "jetkvm_bridge=info,reqwest=warn",
        LogLevel::Verbose => "jetkvm_bridge=debug,reqwest=info",
        LogLevel::Debug => "jetkvm_bridge=debug,reqwest=debug,tungstenite=info",
        LogLevel::Trace => "jetkvm_bridge=trace,reqwest=debug,tungstenite=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    // Logs go to stderr so the answer on stdout stays clean
    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
