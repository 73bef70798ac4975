//! `info` command implementation.

use std::collections::HashMap;

use anyhow::{Context, Result};
use contracts::ShipperConfig;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    batching: BatchingInfo,
    delivery: DeliveryInfo,
    transport: TransportInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    retry_schedule_ms: Vec<u64>,
}

#[derive(Serialize)]
struct BatchingInfo {
    max_batch_size_bytes: u64,
    hard_size_ceiling_bytes: u64,
    max_batch_count: usize,
    linger_ms: u64,
    format: String,
}

#[derive(Serialize)]
struct DeliveryInfo {
    worker_pool_size: usize,
    task_queue_capacity: usize,
    submit_queue_capacity: usize,
    submit_wait_ms: u64,
    max_retry_count: u32,
    backoff_initial_ms: u64,
    backoff_max_ms: u64,
    backoff_multiplier: f64,
    backoff_jitter: bool,
}

#[derive(Serialize)]
struct TransportInfo {
    name: String,
    kind: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    params: HashMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&config, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config, args);
    }

    Ok(())
}

/// Un-jittered delay before each retry, in milliseconds
fn retry_schedule(config: &ShipperConfig) -> Vec<u64> {
    (1..=config.producer.max_retry_count)
        .map(|attempt| config.producer.backoff.base_delay(attempt).as_millis() as u64)
        .collect()
}

fn build_config_info(config: &ShipperConfig, args: &InfoArgs) -> ConfigInfo {
    let producer = &config.producer;

    ConfigInfo {
        batching: BatchingInfo {
            max_batch_size_bytes: producer.max_batch_size_bytes,
            hard_size_ceiling_bytes: producer.hard_size_ceiling_bytes,
            max_batch_count: producer.max_batch_count,
            linger_ms: producer.linger_ms,
            format: format!("{:?}", producer.format),
        },
        delivery: DeliveryInfo {
            worker_pool_size: producer.worker_pool_size,
            task_queue_capacity: producer.task_queue_capacity,
            submit_queue_capacity: producer.submit_queue_capacity,
            submit_wait_ms: producer.submit_wait_ms,
            max_retry_count: producer.max_retry_count,
            backoff_initial_ms: producer.backoff.initial_ms,
            backoff_max_ms: producer.backoff.max_ms,
            backoff_multiplier: producer.backoff.multiplier,
            backoff_jitter: producer.backoff.jitter,
        },
        transport: TransportInfo {
            name: config.transport.name.clone(),
            kind: format!("{:?}", config.transport.kind),
            params: if args.transport {
                config.transport.params.clone()
            } else {
                HashMap::new()
            },
        },
        retry_schedule_ms: if args.schedule {
            retry_schedule(config)
        } else {
            Vec::new()
        },
    }
}

fn print_config_info(config: &ShipperConfig, args: &InfoArgs) {
    let producer = &config.producer;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                 Log Shipper Configuration                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📦 Batching");
    println!("   ├─ Soft limit: {} bytes", producer.max_batch_size_bytes);
    println!("   ├─ Hard ceiling: {} bytes", producer.hard_size_ceiling_bytes);
    println!("   ├─ Max entries: {}", producer.max_batch_count);
    println!("   ├─ Linger: {} ms", producer.linger_ms);
    println!("   └─ Format: {:?}", producer.format);

    println!("\n🚚 Delivery");
    println!("   ├─ Workers: {}", producer.worker_pool_size);
    println!("   ├─ Task queue: {}", producer.task_queue_capacity);
    println!(
        "   ├─ Submit queue: {} (wait {} ms)",
        producer.submit_queue_capacity, producer.submit_wait_ms
    );
    println!("   ├─ Max retries: {}", producer.max_retry_count);
    println!(
        "   └─ Backoff: {} ms → {} ms (x{}, jitter {})",
        producer.backoff.initial_ms,
        producer.backoff.max_ms,
        producer.backoff.multiplier,
        if producer.backoff.jitter { "on" } else { "off" }
    );

    if args.schedule {
        let schedule = retry_schedule(config);
        println!("\n⏱️  Retry Schedule ({})", schedule.len());
        for (i, delay) in schedule.iter().enumerate() {
            let prefix = if i == schedule.len() - 1 { "└─" } else { "├─" };
            println!("   {} retry {}: {} ms", prefix, i + 1, delay);
        }
    }

    println!("\n📤 Transport");
    println!(
        "   └─ {} ({:?})",
        config.transport.name, config.transport.kind
    );
    if args.transport {
        let mut params: Vec<_> = config.transport.params.iter().collect();
        params.sort();
        for (i, (key, value)) in params.iter().enumerate() {
            let prefix = if i == params.len() - 1 { "└─" } else { "├─" };
            println!("      {} {} = {}", prefix, key, value);
        }
    }

    println!();
}
