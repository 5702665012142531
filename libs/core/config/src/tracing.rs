use crate::Environment;
use tracing::{debug, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Install color-eyre with a project-standard configuration.
///
/// Call this early in the main() before any fallible operations to ensure
/// colored error output. Safe to call multiple times.
///
/// Configuration:
/// - Shows file:line where errors occur
/// - Hides environment variables (less noise)
pub fn install_color_eyre() {
    let _ = color_eyre::config::HookBuilder::default()
        .display_location_section(true)
        .display_env_section(false)
        .install();
}

/// Initialize tracing with environment-aware configuration and error span capture.
///
/// All output goes to **stderr**: stdout is reserved for the MCP stdio
/// protocol and must only ever carry JSON-RPC responses.
///
/// - **Production** (`APP_ENV=production`):
///   - JSON format (for log aggregation tools)
///   - Hides module targets for cleaner logs
///   - Defaults to `warn`
///
/// - **Development** (default):
///   - Pretty-printed format (human-readable)
///   - Defaults to `info`
///
/// Both include ErrorLayer so `color-eyre` reports carry span traces.
///
/// Environment variables:
/// - `APP_ENV`: Set to "production" for JSON logs (default: "development")
/// - `RUST_LOG`: Override log levels (e.g., "debug", "rabbitmq_mcp=trace")
///
/// # Multiple Calls
///
/// Safe to call multiple times: if tracing is already initialized
/// (common in tests) it silently continues.
pub fn init_tracing(environment: &Environment) {
    let is_production = environment.is_production();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(environment.default_log_filter()));

    let result = if is_production {
        // Production: JSON format for log aggregation
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(false) // Hide module paths in production
                    .flatten_event(true),
            )
            .with(tracing_error::ErrorLayer::default()) // Capture span traces on errors
            .with(filter)
            .try_init()
    } else {
        // Development: Pretty format for readability
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false)
                    .pretty(),
            )
            .with(tracing_error::ErrorLayer::default()) // Capture span traces on errors
            .with(filter)
            .try_init()
    };

    match result {
        Ok(_) => {
            info!(
                "Tracing initialized with ErrorLayer. Environment: {:?}",
                environment
            );
        }
        Err(_) => {
            // Tracing already initialized, which is fine (common in tests)
            debug!("Tracing already initialized, skipping re-initialization");
        }
    }
}
