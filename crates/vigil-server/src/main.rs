//! Vigil service binary.
//!
//! Reads configuration from the environment, initializes logging and the
//! metrics registry, and serves until SIGTERM or SIGINT.

use anyhow::Context;
use vigil_middleware::Pipeline;
use vigil_server::{Router, Server, ServerConfig};
use vigil_telemetry::{init_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("failed to load configuration")?;

    let telemetry = TelemetryConfig::builder()
        .service_name(env!("CARGO_PKG_NAME"))
        .service_version(env!("CARGO_PKG_VERSION"))
        .logging(config.log_config())
        .build();
    let registry = init_telemetry(&telemetry).context("failed to initialize telemetry")?;

    let server = Server::builder(Pipeline::builder(registry).build())
        .config(config)
        .router(Router::new())
        .build();

    server.run().await.context("server failed")?;
    Ok(())
}
