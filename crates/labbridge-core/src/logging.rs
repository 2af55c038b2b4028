/*!
 * Logging functionality for labbridge.
 *
 * This module provides tracing setup and span helpers for consistent logging
 * across the labbridge crates.
 */
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Initialize the logging system with a specific filter
///
/// `RUST_LOG` takes precedence over `filter` when it is set.
///
/// # Arguments
///
/// * `filter` - The log filter string (e.g., "info", "debug", "labbridge_engine=trace")
pub fn init_with_filter(filter: &str) -> Result<()> {
    init_subscriber(filter, false)
}

/// Initialize the logging system from the `[logging]` configuration section
pub fn init_from_config(config: &LoggingConfig) -> Result<()> {
    init_subscriber(&config.level, config.json_format)
}

fn init_subscriber(filter: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| Error::runtime(format!("Failed to initialize logging: {}", e)))
}

/// A type alias for a tracing span
pub type Span = tracing::Span;

/// Create a new span for a component
///
/// # Arguments
///
/// * `name` - The name of the component
/// * `id` - An optional ID for the component instance
pub fn component_span(name: &str, id: Option<&str>) -> Span {
    match id {
        Some(id) => tracing::info_span!("component", name = %name, id = %id),
        None => tracing::info_span!("component", name = %name),
    }
}

/// Create a new span for everything happening to one physical device
///
/// # Arguments
///
/// * `order_code` - The device order code, e.g. "GDX-FOR"
/// * `serial_number` - The device serial number
pub fn device_span(order_code: &str, serial_number: &str) -> Span {
    tracing::info_span!("device", order_code = %order_code, serial = %serial_number)
}
