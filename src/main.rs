use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use burstgen::{
    Burstgen, CaptureBackend, GeneratorProfile, ProtocolKind, ReceiverProfile, RunProfile,
    TrafficError, UniformSource,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// More log output (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// YAML run profile; command-line options override its values
    #[arg(long, global = true)]
    profile: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send Poisson-paced timestamped traffic
    Generate(GenerateArgs),
    /// Capture traffic and report per-message delay
    Receive(ReceiveArgs),
    /// Generate and receive in-process, without touching the network
    Selftest(GenerateArgs),
}

#[derive(Args)]
struct GenerateArgs {
    /// Duration of the run in seconds
    #[arg(short = 't', long = "time", visible_alias = "duration")]
    duration: Option<u32>,
    /// Mean number of messages per second
    #[arg(short, long)]
    mean: Option<f64>,
    /// Destination address (broker host for MQTT)
    #[arg(long)]
    target: Option<String>,
    /// Destination port [default: 12345]
    #[arg(short, long)]
    port: Option<u16>,
    /// Interface to send from (required for crafted packets, i.e. all but MQTT)
    #[arg(short, long)]
    interface: Option<String>,
    /// Protocol: TCP, UDP, HTTP, MQTT or Custom
    #[arg(long)]
    protocol: Option<ProtocolKind>,
    /// MQTT topic (required for MQTT)
    #[arg(long)]
    topic: Option<String>,
    /// HTTP header as name:value; repeat for several (required for HTTP)
    #[arg(long = "header")]
    headers: Vec<String>,
    /// JSON schema file (required for Custom)
    #[arg(long = "custom")]
    schema: Option<PathBuf>,
    /// Source address written into crafted packets [default: routed address]
    #[arg(long)]
    source: Option<Ipv4Addr>,
    /// MQTT broker port [default: 1883]
    #[arg(long)]
    broker_port: Option<u16>,
    /// IPv4 protocol number for Custom records [default: 253]
    #[arg(long)]
    ip_protocol: Option<u8>,
    /// Per-send timeout in milliseconds [default: 2000]
    #[arg(long)]
    send_timeout_ms: Option<u64>,
    /// Seed for a reproducible arrival plan
    #[arg(long)]
    seed: Option<u64>,
}

impl GenerateArgs {
    fn overrides(&self) -> GeneratorProfile {
        GeneratorProfile {
            duration_secs: self.duration,
            mean_rate: self.mean,
            protocol: self.protocol,
            target: self.target.clone(),
            port: self.port,
            interface: self.interface.clone(),
            source: self.source,
            http_headers: self.headers.clone(),
            mqtt_topic: self.topic.clone(),
            broker_port: self.broker_port,
            schema_path: self.schema.clone(),
            custom_ip_protocol: self.ip_protocol,
            send_timeout_ms: self.send_timeout_ms,
        }
    }
}

#[derive(Args)]
struct ReceiveArgs {
    /// Protocol to listen for: TCP, UDP, HTTP, MQTT or Custom
    #[arg(long)]
    protocol: Option<ProtocolKind>,
    /// Destination port to match [default: 12345, or 80 for HTTP]
    #[arg(short, long)]
    port: Option<u16>,
    /// Interface to capture on
    #[arg(short, long)]
    interface: Option<String>,
    /// MQTT broker address (required for MQTT)
    #[arg(long, visible_alias = "source")]
    broker: Option<String>,
    /// MQTT broker port [default: 1883]
    #[arg(long)]
    broker_port: Option<u16>,
    /// MQTT topic (required for MQTT)
    #[arg(long)]
    topic: Option<String>,
    /// JSON schema file (required for Custom)
    #[arg(long = "custom")]
    schema: Option<PathBuf>,
    /// IPv4 protocol number carrying Custom records [default: 253]
    #[arg(long)]
    ip_protocol: Option<u8>,
    /// Capture backend for packet protocols
    #[arg(long, value_enum, default_value_t = Backend::Raw)]
    backend: Backend,
    /// Seconds between running statistics lines
    #[arg(long, default_value = "10")]
    stats_interval: u64,
}

impl ReceiveArgs {
    fn overrides(&self) -> ReceiverProfile {
        ReceiverProfile {
            protocol: self.protocol,
            port: self.port,
            interface: self.interface.clone(),
            broker: self.broker.clone(),
            broker_port: self.broker_port,
            topic: self.topic.clone(),
            schema_path: self.schema.clone(),
            custom_ip_protocol: self.ip_protocol,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    /// Raw IPv4 socket
    Raw,
    /// libpcap (needs the `pcap` feature)
    Pcap,
}

impl From<Backend> for CaptureBackend {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Raw => CaptureBackend::RawSocket,
            Backend::Pcap => CaptureBackend::Pcap,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        if let Some(error) = e.downcast_ref::<TrafficError>() {
            for suggestion in error.recovery_suggestions() {
                eprintln!("  - {suggestion}");
            }
        }
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(cli: Cli) -> Result<()> {
    let profile = match &cli.profile {
        Some(path) => RunProfile::from_file(path)
            .with_context(|| format!("loading profile {}", path.display()))?,
        None => RunProfile::default(),
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, stopping");
                on_signal.cancel();
            }
            Err(e) => warn!("cannot listen for Ctrl-C: {e}"),
        }
    });

    match cli.command {
        Commands::Generate(args) => generate(profile.generate, args, cancel).await,
        Commands::Receive(args) => receive(profile.receive, args, cancel).await,
        Commands::Selftest(args) => selftest(profile.generate, args, cancel).await,
    }
}

async fn generate(profile: GeneratorProfile, args: GenerateArgs, cancel: CancellationToken) -> Result<()> {
    let spec = profile.merge(args.overrides()).into_spec()?;

    let mut emitter = Burstgen::emitter(spec).await?.with_cancellation(cancel);
    if let Some(seed) = args.seed {
        emitter = emitter.with_random_source(UniformSource::seeded(seed));
    }

    let report = emitter.run().await?;
    println!("{report}");
    Ok(())
}

async fn receive(profile: ReceiverProfile, args: ReceiveArgs, cancel: CancellationToken) -> Result<()> {
    let config = profile.merge(args.overrides()).into_config()?;
    let receiver = Burstgen::receiver(config, args.backend.into()).await?;

    let period = Duration::from_secs(args.stats_interval.max(1));
    let mut updates = Box::pin(receiver.stats_updates(period));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            update = updates.next() => match update {
                Some(stats) => info!(%stats, "running totals"),
                None => break,
            },
        }
    }

    let stats = receiver.shutdown().await?;
    println!("{stats}");
    Ok(())
}

async fn selftest(profile: GeneratorProfile, args: GenerateArgs, cancel: CancellationToken) -> Result<()> {
    let mut overrides = args.overrides();
    if overrides.target.is_none() && profile.target.is_none() {
        overrides.target = Some(Ipv4Addr::LOCALHOST.to_string());
    }
    let spec = profile.merge(overrides).into_spec()?;

    let (report, stats) = match args.seed {
        Some(seed) => Burstgen::loopback_with_seed(spec, seed, cancel).await?,
        None => Burstgen::loopback_with_cancel(spec, cancel).await?,
    };
    println!("{report}");
    println!("{stats}");
    Ok(())
}
