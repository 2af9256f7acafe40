//! Configuration validation.

use crate::config::Config;
use std::collections::HashSet;

/// Validate the configuration.
///
/// Checks for:
/// - At least one backend
/// - Non-empty, unique backend addresses
/// - A failure threshold of at least one
/// - A positive sweep interval
/// - Demo settings that reference real backends
///
/// # Returns
///
/// `Ok(())` if valid, or an error message describing the problem.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut errors = Vec::new();

    // Check for at least one backend
    if config.backends.is_empty() {
        errors.push("at least one backend must be defined".to_string());
    }

    // Check for empty and duplicate addresses
    let mut addresses = HashSet::new();
    for address in &config.backends {
        if address.is_empty() {
            errors.push("backend address cannot be empty".to_string());
            continue;
        }

        if !addresses.insert(address.as_str()) {
            errors.push(format!("duplicate backend address: {address}"));
        }
    }

    // Check balancer tuning
    if config.balancer.failure_threshold == 0 {
        errors.push("failure_threshold must be at least 1".to_string());
    }

    if config.balancer.sweep_interval.is_zero() {
        errors.push("sweep_interval must be greater than zero".to_string());
    }

    // Check demo settings
    if config.demo.concurrency == 0 {
        errors.push("demo concurrency must be at least 1".to_string());
    }

    for address in &config.demo.fail_backends {
        if !addresses.contains(address.as_str()) {
            errors.push(format!(
                "demo fail_backends references unknown backend '{address}'"
            ));
        }
    }

    // Validate log level
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.global.log_level,
            valid_levels.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}
