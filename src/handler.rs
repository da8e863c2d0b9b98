//! Message wrapping: propagation across the input and output boundaries.
//!
//! [`OtelMessageWrapper`] pairs each boundary crossing with a span. Inbound,
//! it extracts any upstream context from the message headers, opens a
//! `"<destination> receive"` span under it (a fresh root when nothing was
//! propagated), and hands back a `"<destination> process"` child for the
//! invocation itself. Outbound, it opens a `"<destination> send"` span
//! continuing from a given span and injects the send span's context into the
//! outgoing headers. Because the send span continues from the receive span,
//! it is a sibling of the process span, never its child.

use std::collections::HashMap;
use std::sync::Arc;

use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::trace::TraceContextExt as _;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use tracing::debug;

use crate::api::{Span, Tracer};
use crate::message::Message;
use crate::otel::OtelContext;

/// Product of wrapping an inbound message.
#[derive(Debug)]
pub struct MessageAndSpans {
    /// The message normalized for invocation (propagation headers removed).
    pub message: Message,
    /// The span covering the invocation itself.
    pub child_span: Box<dyn Span>,
    /// The receive span, already finished; retained as the linkage anchor
    /// for the eventual outbound span.
    pub parent_span: Box<dyn Span>,
}

/// Product of wrapping an outbound message.
#[derive(Debug)]
pub struct MessageAndSpan {
    /// The message with propagation headers injected.
    pub message: Message,
    /// The span covering the send.
    pub span: Box<dyn Span>,
}

/// Wraps messages crossing a function boundary with spans and propagation
/// headers.
pub trait MessageWrapper: Send + Sync {
    /// Extracts upstream context from `message`'s headers and produces the
    /// invocation child span, the receive parent span, and the normalized
    /// message. When no upstream context is found a fresh root span is
    /// created under this wrapper's own sampling policy.
    fn wrap_input(&self, message: Message, destination: &str) -> MessageAndSpans;

    /// Wraps `message` for sending: starts a send span continuing from
    /// `parent` and injects its context into the message headers.
    fn wrap_output(&self, message: Message, parent: &dyn Span, destination: &str)
        -> MessageAndSpan;

    /// Finalizes `span`, recording `error` on it first when present.
    fn after_handled(&self, span: &dyn Span, error: Option<&dyn std::error::Error>);
}

/// [`MessageWrapper`] over an OpenTelemetry text-map propagator.
pub struct OtelMessageWrapper {
    tracer: Arc<dyn Tracer>,
    propagator: Box<dyn TextMapPropagator + Send + Sync>,
}

impl OtelMessageWrapper {
    /// Wrapper using `propagator` for header encode/decode.
    pub fn new(
        tracer: Arc<dyn Tracer>,
        propagator: Box<dyn TextMapPropagator + Send + Sync>,
    ) -> Self {
        Self { tracer, propagator }
    }

    /// Wrapper using the W3C `traceparent`/`tracestate` codec.
    pub fn w3c(tracer: Arc<dyn Tracer>) -> Self {
        Self::new(tracer, Box::new(TraceContextPropagator::new()))
    }
}

impl MessageWrapper for OtelMessageWrapper {
    fn wrap_input(&self, mut message: Message, destination: &str) -> MessageAndSpans {
        let extracted = self
            .propagator
            .extract(&HeaderExtractor(message.headers()));
        let upstream = extracted.span().span_context().clone();

        let parent_span = if upstream.is_valid() {
            debug!(
                trace_id = %upstream.trace_id(),
                "continuing trace from inbound message headers"
            );
            self.tracer.next_span_with_parent(
                &format!("{destination} receive"),
                &OtelContext::from_otel(upstream),
            )
        } else {
            debug!("no upstream context on inbound message, starting a new trace");
            self.tracer.next_span(&format!("{destination} receive"))
        };

        let child_span = self
            .tracer
            .next_span_with_parent(&format!("{destination} process"), parent_span.context().as_ref());

        // The receive span covers only the hand-off to the invocation.
        parent_span.end();

        for field in self.propagator.fields() {
            message.headers_mut().remove(field);
        }

        MessageAndSpans {
            message,
            child_span,
            parent_span,
        }
    }

    fn wrap_output(
        &self,
        mut message: Message,
        parent: &dyn Span,
        destination: &str,
    ) -> MessageAndSpan {
        let span = self
            .tracer
            .next_span_with_parent(&format!("{destination} send"), parent.context().as_ref());
        let cx = OtelContext::to_context(span.context().as_ref());
        self.propagator
            .inject_context(&cx, &mut HeaderInjector(message.headers_mut()));
        MessageAndSpan { message, span }
    }

    fn after_handled(&self, span: &dyn Span, error: Option<&dyn std::error::Error>) {
        if let Some(error) = error {
            debug!(span = span.name(), %error, "finalizing span with error");
            span.record_error(error);
        }
        span.end();
    }
}

/// Reads propagation fields from a message header map.
struct HeaderExtractor<'a>(&'a HashMap<String, String>);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

/// Writes propagation fields into a message header map.
struct HeaderInjector<'a>(&'a mut HashMap<String, String>);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key.to_string(), value);
    }
}
