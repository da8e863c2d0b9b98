use std::sync::Arc;

use doku::Document;
use serde::Deserialize;

use weft::api::Tracer;
use weft::handler::OtelMessageWrapper;
use weft::invoke::{BoxError, FunctionHandle, FunctionInvocationTracer};
use weft::message::{FunctionOutput, Message};
use weft::otel::OtelTracer;

/// Top Level Settings
#[derive(Default, Document, Deserialize)]
pub struct Settings {
    /// Pipeline bindings and destinations
    pub pipeline: weft::config::PipelineSettings,

    /// Telemetry settings.
    pub telemetry: weft::telemetry::TelemetrySettings,
}

/// Uppercases the payload of every message it receives.
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
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let service_info = weft::service_info!();

    // Load settings from pipeline.toml when present, with WEFT_-prefixed
    // environment overrides; otherwise run with defaults.
    let config_path = std::path::Path::new("pipeline.toml");
    let settings = if config_path.exists() {
        weft::config::Config::<Settings>::new(Some(config_path), Some("WEFT_"))?.config
    } else {
        Settings::default()
    };

    let _telemetry = weft::telemetry::init(&service_info, &settings.telemetry)?;

    let tracer: Arc<dyn Tracer> = Arc::new(OtelTracer::global());
    let wrapper = Arc::new(OtelMessageWrapper::w3c(Arc::clone(&tracer)));
    let invocations =
        FunctionInvocationTracer::new(tracer, wrapper, Arc::new(settings.pipeline));

    // A message as it would arrive from a broker, carrying upstream context.
    let inbound = Message::new(b"hello".to_vec()).with_header(
        "traceparent",
        "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
    );

    let outbound = invocations
        .invoke(Some(inbound), &Uppercase)?
        .expect("uppercase always produces a result");

    println!("payload:  {}", String::from_utf8_lossy(outbound.payload()));
    println!("headers:  {:?}", outbound.headers());

    Ok(())
}
