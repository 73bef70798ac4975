//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{ShipperConfig, TransportKind};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    transport: String,
    transport_kind: String,
    format: String,
    max_batch_size_bytes: u64,
    max_batch_count: usize,
    linger_ms: u64,
    worker_pool_size: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    // Try to load and validate
    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            let producer = &config.producer;

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    transport: config.transport.name.clone(),
                    transport_kind: format!("{:?}", config.transport.kind),
                    format: format!("{:?}", producer.format),
                    max_batch_size_bytes: producer.max_batch_size_bytes,
                    max_batch_count: producer.max_batch_count,
                    linger_ms: producer.linger_ms,
                    worker_pool_size: producer.worker_pool_size,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &ShipperConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let producer = &config.producer;

    if producer.max_retry_count == 0 {
        warnings.push("max_retry_count is 0 - transient failures drop batches".to_string());
    }

    if producer.linger_ms > 60_000 {
        warnings.push(format!(
            "linger_ms is {} - entries may wait over a minute before shipping",
            producer.linger_ms
        ));
    }

    if producer.submit_wait_ms == 0 {
        warnings.push("submit_wait_ms is 0 - submit reports queue full without waiting".to_string());
    }

    if producer.task_queue_capacity < producer.worker_pool_size {
        warnings.push(format!(
            "task_queue_capacity ({}) is below worker_pool_size ({}) - workers may idle",
            producer.task_queue_capacity, producer.worker_pool_size
        ));
    }

    if config.transport.kind == TransportKind::Log {
        warnings.push("transport kind is 'log' - batches are only logged, not stored".to_string());
    }

    if config.transport.kind == TransportKind::File
        && !config.transport.params.contains_key("base_path")
    {
        warnings.push("file transport has no base_path - defaulting to ./output".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Transport: {} ({})", summary.transport, summary.transport_kind);
            println!("  Format: {}", summary.format);
            println!("  Soft limit: {} bytes", summary.max_batch_size_bytes);
            println!("  Max entries: {}", summary.max_batch_count);
            println!("  Linger: {} ms", summary.linger_ms);
            println!("  Workers: {}", summary.worker_pool_size);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
