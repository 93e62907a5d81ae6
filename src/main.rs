use anyhow::Result;
use clap::Parser;
use doorbot::{DoorbotConfig, DoorbotOrchestrator, HttpDoorServer};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "doorbot")]
#[command(about = "Door unlock agent for Raspberry Pi")]
#[command(version)]
#[command(long_about = "Polls a door server for an unlock flag and drives the deadbolt motor, \
relay and limit switches through a timed unlock, hold and relock cycle, playing a sound clip \
while the door is open. Keeps the local sound cache under its size cap in the background.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "doorbot.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (debug level for doorbot only)
    #[arg(short, long, help = "Enable debug level logging for doorbot itself")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without touching the hardware")]
    validate_config: bool,

    /// With --validate-config, also check the server's /status and /health
    #[arg(long, requires = "validate_config")]
    check_server: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Use the in-memory hardware backend instead of GPIO
    #[arg(long)]
    simulate: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write a daily rolling log file into this directory
    #[arg(long, value_name = "DIR")]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_logging(&args)?;

    info!("Starting Doorbot v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match DoorbotConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        eprintln!("✗ Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    if args.validate_config {
        println!("✓ Configuration is valid");
        if args.check_server {
            let server = HttpDoorServer::new(&config.server);
            match server.check_liveness().await {
                Ok(()) => println!("✓ Server {} is reachable", server.url()),
                Err(e) => {
                    eprintln!("✗ Server {} check failed: {}", server.url(), e);
                    std::process::exit(1);
                }
            }
        }
        return Ok(());
    }

    if args.simulate {
        info!("Simulation mode - GPIO is not used");
    }

    let mut orchestrator = DoorbotOrchestrator::new(config, args.simulate).map_err(|e| {
        error!("Failed to create orchestrator: {}", e);
        e
    })?;

    orchestrator.initialize().await.map_err(|e| {
        error!("Failed to initialize system: {}", e);
        e
    })?;

    if let Err(e) = orchestrator.start().await {
        error!("Failed to start system: {}", e);
        drop(orchestrator);
        drop(_log_guard);
        std::process::exit(1);
    }

    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("System error during execution: {}", e);
        e
    })?;

    info!("Doorbot exited with code: {}", exit_code);

    // Flush file logs before exiting
    drop(orchestrator);
    drop(_log_guard);

    // Exit with appropriate code for the supervisor
    std::process::exit(exit_code);
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{
        fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
    };

    // Determine filter based on flags; --debug also opens up dependencies
    let directive = if args.debug {
        "debug"
    } else if args.verbose {
        "doorbot=debug"
    } else if args.quiet {
        "doorbot=error"
    } else {
        "doorbot=info"
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let console = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") | None => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_target(true).boxed()
        }
    };
    layers.push(console);

    let guard = match &args.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "doorbot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Doorbot Configuration File");
    println!("# This is the default configuration with all available options");
    println!("# Optional: [pins] closed_limit = <bcm pin>");
    println!("# Optional: [cache] sync_command = [\"rclone\", \"copy\", \"remote:sounds\", \"./sounds\"]");
    println!();
    println!("{}", toml::to_string_pretty(&DoorbotConfig::default())?);
    Ok(())
}
