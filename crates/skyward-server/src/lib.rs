//! HTTP surface of the Skyward weather gateway.

pub mod routes;

use std::future::Future;
use std::sync::Arc;

use skyward_core::{AppError, Config, ConfigError};
use skyward_weather::{Gateway, MaintenanceHandle};

pub use routes::{error_reply, routes};

/// Serve the gateway until `shutdown` resolves.
pub async fn run(
    config: Config,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AppError> {
    let addr = config
        .server
        .socket_addr()
        .map_err(|e| ConfigError::Invalid(format!("{:#}", e)))?;
    let gateway = Arc::new(Gateway::from_config(&config)?);

    let maintenance = config
        .maintenance
        .interval()
        .map(|every| MaintenanceHandle::spawn(Arc::clone(&gateway), every));

    let (bound, server) = warp::serve(routes(Arc::clone(&gateway)))
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .map_err(|e| AppError::Bind {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;

    tracing::info!("Skyward gateway listening on http://{}", bound);
    server.await;
    tracing::info!("Skyward gateway stopped");

    if let Some(handle) = maintenance {
        handle.shutdown().await;
    }
    Ok(())
}
