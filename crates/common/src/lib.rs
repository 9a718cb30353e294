pub mod config;
pub mod logging;
mod spans;
pub mod telemetry;

pub use config::{Environment, env_optional, env_parse, env_string};
pub use logging::setup_logging;
pub use telemetry::TelemetryGuard;
