//! Metrics infrastructure.
//!
//! Pipeline code never calls the `metrics` macros directly; it emits
//! [`events::InternalEvent`] values through [`emit!`] so metric names and
//! labels live in one place.

pub mod events;

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;
use snafu::prelude::*;
use tracing::info;

use crate::error::{AddressParseSnafu, MetricsError, PrometheusInitSnafu};

/// Emit an internal event.
///
/// ```ignore
/// use floe_core::metrics::events::RecordsBuilt;
///
/// emit!(RecordsBuilt { count: 4, target: "logs.cloudtrail".into() });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}

pub use emit;

/// Install the global Prometheus recorder and its HTTP listener.
///
/// Must be called from within a tokio runtime.
pub fn init(address: &str) -> Result<(), MetricsError> {
    let addr: SocketAddr = address.parse().context(AddressParseSnafu)?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context(PrometheusInitSnafu)?;

    info!("Metrics exporter listening on {addr}");
    Ok(())
}
