use anyhow::{bail, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use gesturecam::{
    BodyRegion, EventFilter, EventReceiver, GestureEvent, GesturecamConfig,
    GesturecamOrchestrator, HeuristicDirectionScorer, KeypointSource, MockKeypointSource,
    ReplayKeypointSource,
};

#[derive(Parser, Debug)]
#[command(name = "gesturecam")]
#[command(about = "Rust-based real-time gesture detection pipeline for 3D body tracking")]
#[command(version)]
#[command(long_about = "Converts a stream of 3D body-joint samples into discrete gesture \
classifications: ready-pose gating, motion-triggered capture, and sliding-window \
classification with majority voting. Runs from recorded keypoint sample files; hardware \
body-tracking sources integrate through the KeypointSource trait.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "gesturecam.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Replay keypoint samples from a JSON Lines file
    #[arg(short, long, value_name = "FILE", help = "Replay samples from a JSONL recording")]
    replay: Option<String>,

    /// Pace replay at the configured source fps instead of free-running
    #[arg(long, help = "Pace replayed samples at the configured source fps")]
    realtime: bool,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the pipeline")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - initialize but don't start the pipeline
    #[arg(long, help = "Perform dry run - build the pipeline but don't start it")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    // Initialize logging
    init_logging(&args)?;

    info!("Starting Gesturecam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    // Load and validate configuration
    let config = match GesturecamConfig::load_from_file(&args.config) {
        Ok(config) => {
            info!("Configuration loaded successfully from: {}", args.config);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Validate configuration if requested
    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    let region = config.source.region;
    let source = build_source(&args, &config, region)?;

    // No trained model is bundled; the direction heuristic implements the
    // scoring contract from the mean wrist velocity
    let scorer = Arc::new(HeuristicDirectionScorer::new(&config.classifier.labels));

    let mut orchestrator = GesturecamOrchestrator::new(config, source, scorer).map_err(|e| {
        error!("Failed to create orchestrator: {}", e);
        e
    })?;

    // Handle dry run mode
    if args.dry_run {
        info!("Dry run mode - pipeline built but not started");
        println!("✓ Dry run completed successfully - pipeline initialized");
        return Ok(());
    }

    // Print classifications for the operator
    spawn_result_printer(&orchestrator);

    orchestrator.start().map_err(|e| {
        error!("Failed to start pipeline: {}", e);
        e
    })?;

    let exit_code = orchestrator.run().await.map_err(|e| {
        error!("Pipeline error during execution: {}", e);
        e
    })?;

    info!("Gesturecam exited with code: {}", exit_code);
    std::process::exit(exit_code);
}

fn build_source(
    args: &Args,
    config: &GesturecamConfig,
    region: BodyRegion,
) -> Result<Box<dyn KeypointSource>> {
    match &args.replay {
        Some(path) => {
            let mut source = ReplayKeypointSource::open(path, region)?;
            if args.realtime {
                source = source.with_pacing(config.source.fps);
            }
            Ok(Box::new(source))
        }
        None if args.dry_run => Ok(Box::new(MockKeypointSource::empty(region))),
        None => {
            bail!(
                "No keypoint source configured. Pass --replay <file> with a recorded \
                 sample file, or integrate a hardware source through the KeypointSource trait."
            );
        }
    }
}

/// Subscribe to classification events and print outcomes to stdout
fn spawn_result_printer(orchestrator: &GesturecamOrchestrator) {
    let mut events = EventReceiver::new(
        orchestrator.event_bus().subscribe(),
        EventFilter::EventTypes(vec!["classification_completed"]),
        "result_printer".to_string(),
    );

    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let GestureEvent::ClassificationCompleted { result, .. } = event {
                let stamp = chrono::Local::now().format("%H:%M:%S%.3f");
                match result {
                    Some(result) => match &result.alternate {
                        None => println!(
                            "[{}] GESTURE RECOGNIZED: {} ({:.2})",
                            stamp,
                            result.label.to_uppercase(),
                            result.confidence
                        ),
                        Some(alternate) => println!(
                            "[{}] Gesture unclear: {} (low confidence: {:.2})",
                            stamp, alternate, result.confidence
                        ),
                    },
                    None => println!("[{}] No consistent gesture detected", stamp),
                }
            }
        }
    });
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    // Create environment filter
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gesturecam={}", log_level)));

    // Configure format based on options
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Gesturecam Configuration File");
    println!("# Default values for every available option");
    println!();
    println!("{}", toml::to_string_pretty(&GesturecamConfig::default())?);
    Ok(())
}
