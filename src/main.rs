use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use channel_quota::config::{LoggingConfig, QuotaConfig};
use channel_quota::ratelimit::{BackendKind, ChannelRateLimiter, Limits};

/// Inspect and drive per-channel model quotas.
#[derive(Debug, Parser)]
#[command(name = "channel-quota", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check whether one more request would be admitted
    Check {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        limits: LimitArgs,
    },
    /// Record one completed request
    Record {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        limits: LimitArgs,
        /// Tokens consumed by the request
        #[arg(long, default_value_t = 0)]
        tokens: i64,
    },
    /// Show current RPM/TPM/RPD usage
    Usage {
        #[command(flatten)]
        target: Target,
        /// Print usage as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Args)]
struct Target {
    /// Channel id
    #[arg(long)]
    channel: i64,
    /// Model name
    #[arg(long)]
    model: String,
}

#[derive(Debug, Args)]
struct LimitArgs {
    /// Requests per minute (0 = unlimited)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    rpm: i64,
    /// Tokens per minute (0 = unlimited)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    tpm: i64,
    /// Requests per day (0 = unlimited)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    rpd: i64,
}

impl From<&LimitArgs> for Limits {
    fn from(args: &LimitArgs) -> Self {
        Limits::new(args.rpm, args.tpm, args.rpd)
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = QuotaConfig::load(cli.config.as_deref())?;
    init_tracing(&config.logging);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting channel-quota");

    let limiter = ChannelRateLimiter::from_config(&config).await?;
    if limiter.kind() == BackendKind::InProcess {
        warn!("No redis_url configured; usage will not outlive this process");
    }

    match cli.command {
        Command::Check { target, limits } => {
            match limiter
                .check(target.channel, &target.model, Limits::from(&limits))
                .await
            {
                Ok(()) => println!("ok"),
                Err(saturated) => {
                    println!("{}", saturated);
                    std::process::exit(2);
                }
            }
        }
        Command::Record {
            target,
            limits,
            tokens,
        } => {
            limiter
                .record(target.channel, &target.model, Limits::from(&limits), tokens)
                .await;
            info!(channel = target.channel, model = %target.model, tokens = tokens, "Recorded request");
        }
        Command::Usage { target, json } => {
            let usage = limiter.usage(target.channel, &target.model).await;
            if json {
                println!("{}", serde_json::to_string(&usage)?);
            } else {
                println!("rpm={} tpm={} rpd={}", usage.rpm, usage.tpm, usage.rpd);
            }
        }
    }

    Ok(())
}
