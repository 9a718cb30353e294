use crate::config::Environment;
use opentelemetry::global;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Registry, `RUST_LOG` filter, OpenTelemetry bridge and the formatter for `environment`.
///
/// Spans go to whatever tracer provider is globally installed at this point,
/// which is a no-op provider unless telemetry export was set up first.
pub(crate) fn install_subscriber(environment: Environment, tracer_name: &'static str) {
    let registry = tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_opentelemetry::layer().with_tracer(global::tracer(tracer_name)));

    match environment {
        Environment::Production => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_level(true))
                .init();
        }
        Environment::Development => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty().with_ansi(true))
                .init();
        }
    }
}

/// Initialize the global subscriber: pretty output in development, JSON in production.
///
/// Filtering follows `RUST_LOG` (default `info`). Use [`crate::TelemetryGuard`]
/// instead when spans and metrics should be exported.
pub fn setup_logging(environment: Environment) {
    install_subscriber(environment, env!("CARGO_PKG_NAME"));
}
