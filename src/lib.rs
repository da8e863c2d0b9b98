/*!
Weft threads distributed-trace context through message-driven function
pipelines.

Every invocation of a registered function runs inside a span; propagation
headers are read from the inbound message and written to the outbound one,
with correct parent/child linkage across the function boundary. The tracing
backend sits behind small seams ([`api`]), with an OpenTelemetry adapter
([`otel`]) provided.

It provides:
 * an invocation wrapper with exactly one span per message boundary (via opentelemetry)
 * W3C `traceparent`/`tracestate` propagation on message headers
 * cached destination-name resolution with explicit invalidation
 * config file generation and loading (via Doku & Figment)
 * telemetry bootstrap for pipeline hosts (via tracing & opentelemetry)

### Tutorial

1. Add the *latest* versions of weft, serde, doku, and tokio to your
   Cargo.toml dependencies.

```toml
[dependencies]
weft = "0.1"
doku = "0.21"
serde = "1"
tokio = "1"
```

2. Create a Settings struct holding your pipeline bindings and the telemetry
   settings.

```rust
use doku::Document;
use serde::Deserialize;

/// Settings container
#[derive(Document, Deserialize)]
pub struct Settings {
    /// Pipeline bindings and destinations
    pub pipeline: weft::config::PipelineSettings,

    /// Telemetry settings.
    pub telemetry: weft::telemetry::TelemetrySettings,
}
```

3. Initialize telemetry and wrap your functions:

```rust,no_run
use std::sync::Arc;

use weft::api::Tracer;
use weft::handler::OtelMessageWrapper;
use weft::invoke::{BoxError, FunctionHandle, FunctionInvocationTracer};
use weft::message::{FunctionOutput, Message};
use weft::otel::OtelTracer;

struct Uppercase;

impl FunctionHandle for Uppercase {
    fn definition(&self) -> &str {
        "uppercase"
    }

    fn is_supplier(&self) -> bool {
        false
    }

    fn get(&self) -> Result<Option<FunctionOutput>, BoxError> {
        Ok(None)
    }

    fn apply(&self, message: Message) -> Result<Option<FunctionOutput>, BoxError> {
        Ok(Some(FunctionOutput::Payload(
            message.payload().to_ascii_uppercase(),
        )))
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let service_info = weft::service_info!();
    let settings = weft::telemetry::TelemetrySettings::default();
    let _telemetry = weft::telemetry::init(&service_info, &settings)?;

    let tracer: Arc<dyn Tracer> = Arc::new(OtelTracer::global());
    let wrapper = Arc::new(OtelMessageWrapper::w3c(Arc::clone(&tracer)));
    let properties = Arc::new(weft::config::PipelineSettings::default());
    let invocations = FunctionInvocationTracer::new(tracer, wrapper, properties);

    let inbound = Message::new(b"hello".to_vec()).with_header(
        "traceparent",
        "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
    );
    let outbound = invocations.invoke(Some(inbound), &Uppercase)?;
    println!("outbound headers: {:?}", outbound.map(|m| m.headers().clone()));

    Ok(())
}
```

On a configuration refresh, call
[`invoke::FunctionInvocationTracer::invalidate`] and the destination cache
repopulates lazily from the new configuration.

### Destination configuration

A function named `uppercase` reads from the destination bound to
`uppercase-in-0` and writes to the one bound to `uppercase-out-0`; with no
configuration both sides fall back to the function name. See
[`config::PipelineSettings`].
*/
#![deny(
    future_incompatible,
    deprecated_safe,
    rust_2018_compatibility,
    rust_2018_idioms,
    rust_2021_compatibility,
    rust_2024_compatibility
)]
// Document ALL THE THINGS!
#![deny(missing_docs)]

pub mod api;
pub mod config;
pub mod handler;
pub mod invoke;
pub mod message;
pub mod otel;
pub mod telemetry;

/// Configuration handling errors.
#[derive(Debug, snafu::Snafu)]
pub enum Error {
    /// Figment could not extract a config from the file with env overrides
    #[snafu(display("Could not load pipeline configuration: {source}"))]
    ConfigLoad {
        /// The source figment error
        source: figment::Error,
    },

    /// Writing to the config file was not possible
    #[snafu(display("Could not write to the config file at {path:?}: {source}"))]
    ConfigFileWrite {
        /// path where the config file was trying to be written to
        path: std::path::PathBuf,
        /// the IO error that occurred
        source: std::io::Error,
    },
}

/// Service information collected from the build.
///
/// Used to populate the `service.name` resource attribute on exported spans
/// and anything else a host wants to report about itself.
#[derive(Clone, Debug, Default)]
pub struct ServiceInfo {
    /// The name of the service.
    pub name: &'static str,

    /// The version of the service.
    pub version: &'static str,

    /// The description of the service.
    pub description: &'static str,
}

/// Creates [`ServiceInfo`] from the information in `Cargo.toml` manifest of
/// the service.
///
/// ```rust
/// let service_info = weft::service_info!();
/// assert!(!service_info.name.is_empty());
/// ```
#[macro_export]
macro_rules! service_info {
    () => {
        $crate::ServiceInfo {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            description: env!("CARGO_PKG_DESCRIPTION"),
        }
    };
}
