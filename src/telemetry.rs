//! Telemetry bootstrap: span export, propagation, and console logging.
//!
//! [`init`] installs everything an instrumented pipeline host needs: an
//! OTLP span exporter (when an endpoint is configured), the W3C
//! `traceparent`/`tracestate` codec as the global text-map propagator, and a
//! console `tracing` subscriber. The returned [`Telemetry`] guard shuts the
//! tracer provider down on drop, flushing buffered spans.

use doku::Document;
use opentelemetry::trace::TraceError;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::runtime::TokioCurrentThread;
use opentelemetry_sdk::{trace as sdktrace, Resource};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt as _, Snafu};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::ServiceInfo;

/// Telemetry initialization errors.
#[derive(Debug, Snafu)]
pub enum Error {
    /// The span exporter could not be built.
    #[snafu(display("Could not initialize tracing: {source}"))]
    InitTrace {
        /// The source OpenTelemetry error.
        source: TraceError,
    },
}

/// Span export settings.
#[derive(Default, Serialize, Deserialize, Document)]
pub struct TraceSettings {
    /// OTLP gRPC endpoint for span export; spans stay local when absent.
    #[doku(example = "http://localhost:4317")]
    pub endpoint: Option<String>,
}

/// Console logging settings.
#[derive(Default, Serialize, Deserialize, Document)]
pub struct LogSettings {
    /// `tracing` filter directive for console output.
    #[doku(example = "debug,yourcrate=trace")]
    pub console_level: String,
}

/// Telemetry settings for an instrumented pipeline host.
#[derive(Default, Serialize, Deserialize, Document)]
pub struct TelemetrySettings {
    /// Span export settings.
    pub trace: TraceSettings,
    /// Console logging settings.
    pub log: LogSettings,
}

/// Guard over the installed telemetry; shuts the tracer provider down on
/// drop.
pub struct Telemetry {
    tracer_provider: Option<sdktrace::TracerProvider>,
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        if let Some(tracer_provider) = self.tracer_provider.take() {
            if let Err(err) = tracer_provider.shutdown() {
                eprintln!("Error shutting down Telemetry tracer provider: {err}");
            }
        }
    }
}

fn init_traces(
    service_info: &ServiceInfo,
    settings: &TraceSettings,
) -> Result<Option<sdktrace::TracerProvider>, TraceError> {
    match &settings.endpoint {
        Some(endpoint) => {
            let exporter = SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()?;

            let resource = Resource::new(vec![KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                service_info.name.to_string(),
            )]);

            Ok(Some(
                sdktrace::TracerProvider::builder()
                    .with_resource(resource)
                    .with_batch_exporter(exporter, TokioCurrentThread)
                    .build(),
            ))
        }
        None => Ok(None),
    }
}

fn init_logs(settings: &LogSettings) {
    let filter_fmt = EnvFilter::new(&settings.console_level);
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_thread_names(true)
        .with_filter(filter_fmt);

    tracing_subscriber::registry().with(fmt_layer).init();
}

/// Installs the global tracer provider, the W3C text-map propagator, and
/// the console subscriber, per `settings`.
///
/// Call once at host startup; the returned guard must be kept alive for the
/// duration of the program.
///
/// # Errors
/// - `InitTrace` if the OTLP span exporter cannot be built.
pub fn init(service_info: &ServiceInfo, settings: &TelemetrySettings) -> Result<Telemetry, Error> {
    init_logs(&settings.log);

    // Propagation headers written and read by this crate use the W3C codec.
    global::set_text_map_propagator(TraceContextPropagator::new());

    let tracer_provider = init_traces(service_info, &settings.trace).context(InitTraceSnafu)?;
    if let Some(tracer_provider) = &tracer_provider {
        global::set_tracer_provider(tracer_provider.clone());
    }

    Ok(Telemetry { tracer_provider })
}
