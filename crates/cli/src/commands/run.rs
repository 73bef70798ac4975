//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::{RoutingKey, ShipperConfig};
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Shipper, ShipperOptions};

/// Execute the `run` command
pub async fn run_shipper(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    // Validate config path
    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    // Load and parse configuration
    let mut config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Apply CLI overrides
    if let Some(linger_ms) = args.linger_ms {
        info!(linger_ms, "Overriding linger from CLI");
        config.producer.linger_ms = linger_ms;
    }
    if let Some(workers) = args.workers {
        info!(workers, "Overriding worker pool size from CLI");
        config.producer.worker_pool_size = workers;
    }
    config
        .producer
        .check()
        .context("Invalid configuration after CLI overrides")?;

    info!(
        transport = %config.transport.name,
        kind = ?config.transport.kind,
        soft_limit = config.producer.max_batch_size_bytes,
        linger_ms = config.producer.linger_ms,
        workers = config.producer.worker_pool_size,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    let file_name = args.file_name.clone().or_else(|| {
        args.input
            .as_ref()
            .filter(|p| p.as_os_str() != "-")
            .map(|p| p.display().to_string())
    });
    let mut key = RoutingKey::new(&args.topic).with_source(&args.source);
    if let Some(file_name) = file_name {
        key = key.with_file_name(file_name);
    }

    let options = ShipperOptions {
        config,
        input: args.input.clone(),
        key,
        max_entries: if args.max_entries == 0 {
            None
        } else {
            Some(args.max_entries)
        },
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    };

    info!("Starting shipper...");

    // First signal stops reading, a second one forces the close
    let stats = Shipper::new(options)
        .run(shutdown_signal(), || async {
            shutdown_signal().await;
            warn!("Second shutdown signal, forcing close");
        })
        .await
        .context("Shipping failed")?;

    info!(
        submitted = stats.entries_submitted,
        delivered = stats.producer.delivered_entries,
        failed = stats.producer.failed_entries,
        duration_secs = stats.duration.as_secs_f64(),
        "Shipper finished"
    );
    stats.print_summary();

    if stats.producer.failed_entries > 0 || stats.abandoned() > 0 {
        anyhow::bail!(
            "{} entries failed, {} abandoned",
            stats.producer.failed_entries,
            stats.abandoned()
        );
    }
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &ShipperConfig) {
    let producer = &config.producer;
    println!("\n=== Configuration Summary ===\n");
    println!("Batching:");
    println!("  Soft limit: {} bytes", producer.max_batch_size_bytes);
    println!("  Hard ceiling: {} bytes", producer.hard_size_ceiling_bytes);
    println!("  Max entries: {}", producer.max_batch_count);
    println!("  Linger: {} ms", producer.linger_ms);
    println!("  Format: {:?}", producer.format);

    println!("\nDelivery:");
    println!("  Workers: {}", producer.worker_pool_size);
    println!("  Task queue: {}", producer.task_queue_capacity);
    println!("  Submit queue: {}", producer.submit_queue_capacity);
    println!("  Max retries: {}", producer.max_retry_count);

    println!("\nTransport:");
    println!("  {} ({:?})", config.transport.name, config.transport.kind);
    for (key, value) in &config.transport.params {
        println!("    {key} = {value}");
    }

    println!();
}
