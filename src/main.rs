//! RNG Devices CLI
//!
//! Command-line front end for reading shaped entropy from any configured
//! backend, either directly or through the async bridge.

use clap::{Parser, Subcommand};
use rng_devices::{
    analysis::{QualityThresholds, StatisticalTests},
    backend::{BackendFactory, PseudoConfig},
    config::{BackendKind, FileConfig},
    AsyncBridge, EntropyRequest, EntropySource, MetricsRegistry, RangeRequest,
};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

type CliResult<T> = Result<T, Box<dyn Error>>;

#[derive(Debug, Parser)]
#[command(
    name = "rng-devices",
    version,
    about = "Read shaped entropy from hardware and software sources"
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend to use: pseudo, rdseed or device.
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    /// Device node; selects the device backend unless --backend is given.
    #[arg(long, global = true)]
    device: Option<PathBuf>,

    /// Print Prometheus metrics after the command.
    #[arg(long, global = true)]
    metrics: bool,

    /// Route the request through the async bridge.
    #[arg(long = "async", global = true)]
    use_async: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check whether the backend can be opened.
    Probe,
    /// Print N random bytes as hex.
    Bytes {
        n: usize,
        /// XOR-fold passes (defaults to the configured value).
        #[arg(long)]
        folds: Option<u32>,
    },
    /// Print ceil(N/8) bytes carrying N random bits.
    Bits {
        n: usize,
        /// Zero the unused high bits of the last byte.
        #[arg(long)]
        exact: bool,
        #[arg(long)]
        folds: Option<u32>,
    },
    /// Print a uniform integer in [min, max), or a raw u32 without --max.
    Int {
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        min: i64,
        #[arg(long, allow_negative_numbers = true)]
        max: Option<i64>,
        #[arg(long)]
        folds: Option<u32>,
    },
    /// Run statistical sanity checks over a sample.
    Selftest {
        #[arg(long, default_value_t = 64 * 1024)]
        samples: usize,
    },
}

/// A command resolved against the configured defaults.
enum Action {
    Probe,
    Read(EntropyRequest),
    Sample(RangeRequest, u32),
    Selftest(EntropyRequest),
}

impl Action {
    fn resolve(command: &Command, default_folds: u32) -> Self {
        match *command {
            Command::Probe => Action::Probe,
            Command::Bytes { n, folds } => {
                Action::Read(EntropyRequest::bytes(n).with_folds(folds.unwrap_or(default_folds)))
            }
            Command::Bits { n, exact, folds } => {
                let request = if exact {
                    EntropyRequest::exact_bits(n)
                } else {
                    EntropyRequest::bits(n)
                };
                Action::Read(request.with_folds(folds.unwrap_or(default_folds)))
            }
            Command::Int { min, max, folds } => {
                Action::Sample(RangeRequest { min, max }, folds.unwrap_or(default_folds))
            }
            Command::Selftest { samples } => {
                Action::Selftest(EntropyRequest::bytes(samples).with_folds(default_folds))
            }
        }
    }
}

fn main() -> ExitCode {
    // Initialize logging; stdout is reserved for entropy output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    info!("RNG Devices v{}", rng_devices::VERSION);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> CliResult<()> {
    let mut config = match &cli.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    if let Some(path) = &cli.device {
        config.backend.device.path = path.clone();
        config.backend.kind = BackendKind::Device;
    }
    if let Some(kind) = cli.backend {
        config.backend.kind = kind;
    }
    config.validate()?;

    let metrics = if cli.metrics {
        Some(Arc::new(MetricsRegistry::new()?))
    } else {
        None
    };

    info!(backend = ?config.backend.kind, "Using backend");
    match config.backend.kind {
        BackendKind::Pseudo => execute(PseudoConfig::new(), cli, &config, metrics),
        BackendKind::Rdseed => {
            execute(config.backend.rdseed.to_rdseed_config(), cli, &config, metrics)
        }
        BackendKind::Device => {
            execute(config.backend.device.to_device_config(), cli, &config, metrics)
        }
    }
}

fn execute<F: BackendFactory + 'static>(
    factory: F,
    cli: &Cli,
    config: &FileConfig,
    metrics: Option<Arc<MetricsRegistry>>,
) -> CliResult<()> {
    let mut source = EntropySource::new(factory);
    if let Some(metrics) = &metrics {
        source = source.with_metrics(Arc::clone(metrics));
    }
    let action = Action::resolve(&cli.command, config.sampling.folds);

    let output = if cli.use_async {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let bridge = AsyncBridge::with_workers(source, config.bridge.workers)?;
        runtime.block_on(async {
            let output = perform_async(&bridge, action).await;
            bridge.shutdown().await;
            output
        })?
    } else {
        let output = perform(&source, action);
        source.close();
        output?
    };
    println!("{output}");

    if let Some(metrics) = metrics {
        print!("{}", metrics.encode()?);
    }
    Ok(())
}

fn perform<F: BackendFactory>(source: &EntropySource<F>, action: Action) -> CliResult<String> {
    Ok(match action {
        Action::Probe => availability(source.probe()),
        Action::Read(request) => hex(&source.read(&request)?),
        Action::Sample(request, folds) => source.sample(&request, folds)?.to_string(),
        Action::Selftest(request) => selftest(&source.read(&request)?)?,
    })
}

async fn perform_async<F: BackendFactory + 'static>(
    bridge: &AsyncBridge<F>,
    action: Action,
) -> CliResult<String> {
    Ok(match action {
        Action::Probe => availability(bridge.probe().await?),
        Action::Read(request) => hex(&bridge.request(request).await?),
        Action::Sample(request, folds) => bridge.sample(request, folds).await?.to_string(),
        Action::Selftest(request) => selftest(&bridge.request(request).await?)?,
    })
}

fn availability(available: bool) -> String {
    let status = if available { "available" } else { "unavailable" };
    status.to_string()
}

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

fn selftest(data: &[u8]) -> CliResult<String> {
    let stats = StatisticalTests::analyze(data);
    info!(
        "Sample of {} bytes: bias={:.4}, variance={:.1}, autocorrelation={:.4}, chi-square={:.1}",
        stats.sample_size,
        stats.bit_bias,
        stats.variance,
        stats.autocorrelation,
        stats.byte_chi_square
    );
    QualityThresholds::default().check(&stats)?;
    Ok("PASS".to_string())
}
