//! Backend-neutral tracing seams.
//!
//! The invocation tracer and the message wrapper talk to the tracing backend
//! exclusively through the traits in this module. One concrete adapter per
//! backend implements them; [`crate::otel`] provides the OpenTelemetry one.
//! Swapping backends never touches the core algorithm.
//!
//! The propagation codec seam is not duplicated here:
//! [`opentelemetry::propagation::TextMapPropagator`] is already an abstract,
//! object-safe trait and is used directly.

use std::any::Any;
use std::fmt;

/// A position in a trace: the coordinates that let a span be correlated
/// across process boundaries.
///
/// Implementations wrap a backend-specific representation. Fields the
/// representation cannot express return fixed neutral defaults rather than
/// erroring; each adapter documents which fields those are.
pub trait TraceContext: fmt::Debug + Send + Sync {
    /// High 64 bits of the 128-bit trace id.
    fn trace_id_high(&self) -> u64;

    /// Low 64 bits of the 128-bit trace id.
    fn trace_id(&self) -> u64;

    /// The 64-bit span id.
    fn span_id(&self) -> u64;

    /// The parent span id, when the underlying representation carries one.
    ///
    /// `None` means "no parent is known", which covers both genuine trace
    /// roots and representations that simply do not record parentage.
    fn parent_id(&self) -> Option<u64>;

    /// Tri-state sampling decision: `Some(true)` sampled, `Some(false)` not
    /// sampled, `None` unset.
    fn sampled(&self) -> Option<bool>;

    /// Whether this context is the local root of its trace, by the
    /// convention that a local root has its trace id equal to its span id.
    fn is_local_root(&self) -> bool;

    /// The span id of the local root of this trace. Neutral default (`0`)
    /// for backends that do not record it.
    fn local_root_id(&self) -> u64;

    /// Debug flag. Neutral default for backends without the notion.
    fn debug(&self) -> bool;

    /// Shared-span flag. Neutral default for backends without the notion.
    fn shared(&self) -> bool;

    /// Additional data attached to this context. Neutral default (empty)
    /// for backends without an additional-data list.
    fn extra(&self) -> &[Box<dyn Any + Send + Sync>];

    /// The trace id as a lowercase hex string (32 characters).
    fn trace_id_hex(&self) -> String;

    /// The span id as a lowercase hex string (16 characters).
    fn span_id_hex(&self) -> String;

    /// Downcast support for backend adapters.
    fn as_any(&self) -> &dyn Any;
}

/// Handle to one unit of traced work.
///
/// A span is created by a [`Tracer`], optionally activated as the current
/// span for a scope, and finalized exactly once per invocation path via
/// [`Span::end`]. Backends ignore repeated ends, but callers are expected
/// not to rely on that.
pub trait Span: fmt::Debug + Send + Sync {
    /// The name the span was started with.
    fn name(&self) -> &str;

    /// The trace context identifying this span.
    fn context(&self) -> Box<dyn TraceContext>;

    /// Records `error` on the span and marks the span as failed.
    fn record_error(&self, error: &dyn std::error::Error);

    /// Ends the span. Terminal: the span is finished once this returns.
    fn end(&self);

    /// Downcast support for backend adapters.
    fn as_any(&self) -> &dyn Any;
}

/// Activation token returned by [`Tracer::activate`].
///
/// While the token is alive the activated span is the current span of the
/// ambient execution context. Dropping the token restores the previous
/// binding, on every exit path, including under reentrant activations on the
/// same thread.
pub trait Scope {}

/// Creates and activates spans.
///
/// Implementations are shared across worker threads; all per-span state
/// lives in the returned handles.
pub trait Tracer: Send + Sync {
    /// Starts a new root span named `name` (no parent; a fresh trace).
    fn next_span(&self, name: &str) -> Box<dyn Span>;

    /// Starts a new span named `name` as a child of `parent`.
    fn next_span_with_parent(&self, name: &str, parent: &dyn TraceContext) -> Box<dyn Span>;

    /// Binds `span` as the current span until the returned token is dropped.
    ///
    /// # Panics
    ///
    /// Implementations panic if `span` was created by a different adapter
    /// implementation. That is a programming error, not a recoverable
    /// condition: callers must keep a single adapter family per pipeline.
    fn activate(&self, span: &dyn Span) -> Box<dyn Scope>;
}
