use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use rtpjitter::sim::{self, NetworkProfile};
use rtpjitter::{JitterBuffer, JitterConfig};

/// Parse command line arguments
struct Args {
    seconds: u64,
    loss: f64,
    max_delay_ms: u64,
    seed: Option<u64>,
    validate: bool,
    help: bool,
}

fn parse_args() -> Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    let defaults = NetworkProfile::default();
    let mut result = Args {
        seconds: 10,
        loss: defaults.loss,
        max_delay_ms: defaults.max_delay_ms,
        seed: None,
        validate: false,
        help: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--seconds" => result.seconds = flag_value(&args, &mut i)?,
            "--loss" => result.loss = flag_value(&args, &mut i)?,
            "--max-delay" => result.max_delay_ms = flag_value(&args, &mut i)?,
            "--seed" => result.seed = Some(flag_value(&args, &mut i)?),
            "--validate" => result.validate = true,
            "--help" | "-h" => result.help = true,
            other => bail!("Unknown argument: {} (see --help)", other),
        }
        i += 1;
    }

    Ok(result)
}

fn flag_value<T>(args: &[String], i: &mut usize) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let flag = &args[*i];
    *i += 1;
    let raw = args
        .get(*i)
        .with_context(|| format!("{} needs a value", flag))?;
    raw.parse()
        .with_context(|| format!("Invalid value for {}: {}", flag, raw))
}

fn print_help() {
    println!("rtpjitter - RTP jitter buffer simulator\n");
    println!("USAGE:");
    println!("    rtpjitter [OPTIONS]\n");
    println!("OPTIONS:");
    println!("    --seconds N         Length of the simulated call (default 10)");
    println!("    --loss P            Packet loss probability, 0.0-1.0 (default 0.02)");
    println!("    --max-delay MS      Maximum extra network delay (default 60)");
    println!("    --seed N            Seed for the impairment generator");
    println!("    --validate          Validate configuration and exit");
    println!("    --help, -h          Show this help message\n");
    println!("ENVIRONMENT:");
    println!("    JITTER_DEPTH_MS      Nominal playout delay (default 180)");
    println!("    JITTER_MAX_DEPTH_MS  Buffer cap, 0 for twice the depth (default 0)");
    println!("    JITTER_SAMPLE_RATE   RTP clock rate in Hz (default 8000)");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args()?;

    if args.help {
        print_help();
        return Ok(());
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rtpjitter=info".parse()?),
        )
        .init();

    info!("rtpjitter v{}", env!("CARGO_PKG_VERSION"));

    let config = JitterConfig::from_env()?;
    info!("Configuration loaded");
    info!("  Depth: {}ms (cap {}ms)", config.depth_ms, config.effective_max_depth_ms());
    info!("  Sample rate: {}Hz", config.sample_rate);

    if args.validate {
        info!("Validating configuration...");
        match config.validate() {
            Ok(()) => {
                info!("Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        }
    }
    config.validate()?;

    let profile = NetworkProfile {
        loss: args.loss,
        max_delay_ms: args.max_delay_ms,
        sample_rate: config.sample_rate,
        seed: args.seed.unwrap_or_else(rand::random),
        ..NetworkProfile::default()
    };
    info!(
        "Simulating {}s: loss={:.1}%, delay 0-{}ms, seed {}",
        args.seconds,
        profile.loss * 100.0,
        profile.max_delay_ms,
        profile.seed
    );

    let buffer = Arc::new(JitterBuffer::from_config(&config));
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl-C, stopping");
                cancel.cancel();
            }
        });
    }

    let report = sim::run(buffer, profile, Duration::from_secs(args.seconds), cancel).await?;

    info!(
        "Played {} ({} from redundancy), concealed {}, jitter {:.1}ms (max {:.1}ms)",
        report.played,
        report.played_redundant,
        report.concealed,
        report.buffer.jitter_ms,
        report.buffer.max_jitter_ms
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
