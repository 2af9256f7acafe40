//! rudder - a client-side request router for replicated backends
//!
//! Runs the router against a set of simulated backends and drives demo
//! traffic through it, keeping the metrics endpoint live afterwards.
//!
//! Usage:
//!     rudder --config <path>
//!
//! See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use rudder::config::{load_config, Config, DemoConfig};
use rudder::metrics::{MetricsServer, StatusSource};
use rudder::util::{init_logging, InvocationId, ShutdownSignal};
use rudder::{invoker_fn, BackendTarget, Balancer, BoxError, PolicyKind};

/// A client-side request router that balances opaque calls across replicated backends.
#[derive(Parser, Debug)]
#[command(name = "rudder")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Override the selection policy (round_robin, health_aware, load_aware)
    #[arg(short, long, value_name = "POLICY")]
    policy: Option<PolicyKind>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration
    let mut config = load_config(&cli.config).with_context(|| {
        format!(
            "failed to load configuration from '{}'",
            cli.config.display()
        )
    })?;

    // CLI overrides config
    if let Some(policy) = cli.policy {
        config.policy = policy;
    }
    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.global.log_level);

    // Initialize logging
    init_logging(log_level, &config.global.log_format);

    // If --validate flag, just validate and exit
    if cli.validate {
        info!("Configuration is valid");
        println!("Configuration is valid.");
        println!("  Policy: {}", config.policy);
        println!("  Backends: {}", config.backends.len());
        for address in &config.backends {
            let marker = if config.demo.fail_backends.contains(address) {
                " [demo: failing]"
            } else {
                ""
            };
            println!("    - {address}{marker}");
        }
        return Ok(());
    }

    // Log startup information
    info!(
        config_path = %cli.config.display(),
        run = %InvocationId::random(),
        policy = %config.policy,
        backends = config.backends.len(),
        "rudder starting"
    );

    // Run the router
    run(config)
}

/// Run the router with the given configuration.
fn run(config: Config) -> Result<()> {
    // Create tokio runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async { run_async(config).await })
}

/// Async entry point for the router.
async fn run_async(config: Config) -> Result<()> {
    let shutdown = ShutdownSignal::new();

    // Build simulated backends, each with a hit counter for the summary
    let mut hits = Vec::new();
    let mut targets = Vec::new();
    for address in &config.backends {
        let counter = Arc::new(AtomicU64::new(0));
        let fail = config.demo.fail_backends.contains(address);
        targets.push(sim_target(
            address,
            config.demo.latency,
            fail,
            Arc::clone(&counter),
        ));
        hits.push((address.clone(), counter));
    }

    let balancer = Arc::new(Balancer::new(
        config.policy,
        targets,
        config.balancer.clone(),
    ));

    // Start the metrics server
    let mut server_task = None;
    if config.global.metrics.enabled {
        let status: StatusSource = {
            let balancer = Arc::clone(&balancer);
            Arc::new(move || balancer.backend_status())
        };
        let server = MetricsServer::new(
            config.global.metrics.address,
            config.global.metrics.path.clone(),
            balancer.metrics().clone(),
            status,
        );
        server_task = Some(tokio::spawn(server.run(shutdown.subscribe())));
    }

    // Drive simulated traffic through the router
    let (succeeded, failed) = drive_traffic(&balancer, &config.demo).await;

    info!(succeeded, failed, "demo traffic complete");
    for (address, counter) in &hits {
        info!(
            backend = %address,
            hits = counter.load(Ordering::Relaxed),
            healthy = balancer.is_healthy(address).unwrap_or(false),
            "backend summary"
        );
    }

    info!("rudder is running; metrics stay live");
    info!("press Ctrl+C to stop");

    // Wait for shutdown signal
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("received shutdown signal");
        }
        Err(e) => {
            error!(error = %e, "failed to listen for shutdown signal");
        }
    }

    balancer.stop();
    shutdown.signal();
    if let Some(task) = server_task {
        let _ = task.await;
    }

    info!("rudder shut down complete");
    Ok(())
}

/// Fire the configured number of requests with bounded concurrency.
async fn drive_traffic(
    balancer: &Arc<Balancer<String, String>>,
    demo: &DemoConfig,
) -> (u64, u64) {
    let semaphore = Arc::new(Semaphore::new(demo.concurrency as usize));
    let mut tasks = Vec::new();

    for i in 0..demo.requests {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let balancer = Arc::clone(balancer);
        let id = InvocationId::next();

        tasks.push(tokio::spawn(async move {
            let _permit = permit;
            match balancer.invoke(format!("ping-{i}")).await {
                Ok(response) => {
                    info!(id = %id, response = %response, "invocation succeeded");
                    true
                }
                Err(error) => {
                    warn!(id = %id, error = %error, "invocation failed");
                    false
                }
            }
        }));
    }

    let mut succeeded = 0;
    let mut failed = 0;
    for task in tasks {
        match task.await {
            Ok(true) => succeeded += 1,
            _ => failed += 1,
        }
    }
    (succeeded, failed)
}

/// A simulated backend: echoes the request after a fixed latency, or
/// always fails when configured as a demo outage.
fn sim_target(
    address: &str,
    latency: Duration,
    fail: bool,
    hits: Arc<AtomicU64>,
) -> BackendTarget<String, String> {
    let addr = address.to_string();
    BackendTarget::new(
        address,
        invoker_fn(move |req: String| {
            let addr = addr.clone();
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(latency).await;
                if fail {
                    return Err::<String, BoxError>(format!("simulated outage at {addr}").into());
                }
                Ok(format!("addr: {addr}, req: {req}"))
            }
        }),
    )
}
