//! OpenTelemetry adapter for the [`crate::api`] seams.
//!
//! `OtelContext` bridges the backend-neutral [`TraceContext`] view onto an
//! [`opentelemetry::trace::SpanContext`]. The bridge is lossy in both
//! directions and says so: fields OpenTelemetry does not model (parent id on
//! raw contexts, shared/debug flags, extras) come back as fixed neutral
//! defaults, and the builder accepts-but-ignores setters for them.
//!
//! `OtelSpan` and `OtelTracer` carry live spans through the ambient
//! [`opentelemetry::Context`]; activation reuses the context guard, whose
//! drop restores the previous current span on every exit path.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};

use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::trace::{
    SpanContext, SpanId, Status, TraceContextExt as _, TraceFlags, TraceId, TraceState,
};
use opentelemetry::{Context, ContextGuard};

use crate::api::{Scope, Span, TraceContext, Tracer};

/// [`TraceContext`] over an OpenTelemetry [`SpanContext`].
///
/// Besides the span context itself, a value may carry the ambient
/// [`Context`] holding the live span it was taken from (absent on raw
/// conversions) and the parent span id captured when this crate's own tracer
/// created the span (OpenTelemetry span contexts do not record parentage).
#[derive(Clone, Debug)]
pub struct OtelContext {
    delegate: SpanContext,
    cx: Option<Context>,
    parent_span_id: Option<u64>,
}

impl OtelContext {
    /// Wraps a raw span context. No live span handle, no known parent.
    pub fn from_otel(delegate: SpanContext) -> Self {
        Self {
            delegate,
            cx: None,
            parent_span_id: None,
        }
    }

    /// Extracts the underlying span context from any [`TraceContext`]
    /// produced by this adapter family.
    ///
    /// # Panics
    ///
    /// Panics if `context` was produced by a different adapter
    /// implementation. That is a programming error, not a recoverable
    /// condition: callers must keep a single adapter family per pipeline.
    pub fn to_otel(context: &dyn TraceContext) -> SpanContext {
        context
            .as_any()
            .downcast_ref::<OtelContext>()
            .expect("trace context was not produced by the OpenTelemetry adapter")
            .delegate
            .clone()
    }

    /// Materializes an ambient [`Context`] for downstream propagation.
    ///
    /// When `context` carries a live span handle the returned context binds
    /// that span; otherwise the current ambient context is returned
    /// unchanged.
    pub fn to_context(context: &dyn TraceContext) -> Context {
        match context.as_any().downcast_ref::<OtelContext>() {
            Some(OtelContext { cx: Some(cx), .. }) => cx.clone(),
            _ => Context::current(),
        }
    }

    /// The underlying span context.
    pub fn span_context(&self) -> &SpanContext {
        &self.delegate
    }

    /// Starts a builder seeded from this context's underlying fields.
    pub fn to_builder(&self) -> OtelContextBuilder {
        OtelContextBuilder {
            trace_id: self.trace_id_u128(),
            span_id: u64::from_be_bytes(self.delegate.span_id().to_bytes()),
            trace_flags: self.delegate.trace_flags(),
            trace_state: self.delegate.trace_state().clone(),
            is_remote: self.delegate.is_remote(),
        }
    }

    fn trace_id_u128(&self) -> u128 {
        u128::from_be_bytes(self.delegate.trace_id().to_bytes())
    }

    /// Parent context for starting children: the live ambient context when
    /// one is attached, otherwise a fresh context carrying the span context
    /// as a remote parent.
    pub(crate) fn to_parent_context(context: &dyn TraceContext) -> Context {
        let otel = context
            .as_any()
            .downcast_ref::<OtelContext>()
            .expect("trace context was not produced by the OpenTelemetry adapter");
        match &otel.cx {
            Some(cx) => cx.clone(),
            None => Context::new().with_remote_span_context(otel.delegate.clone()),
        }
    }
}

impl TraceContext for OtelContext {
    fn trace_id_high(&self) -> u64 {
        (self.trace_id_u128() >> 64) as u64
    }

    fn trace_id(&self) -> u64 {
        self.trace_id_u128() as u64
    }

    fn span_id(&self) -> u64 {
        u64::from_be_bytes(self.delegate.span_id().to_bytes())
    }

    fn parent_id(&self) -> Option<u64> {
        self.parent_span_id.filter(|id| *id != 0)
    }

    fn sampled(&self) -> Option<bool> {
        if self.delegate.is_valid() {
            Some(self.delegate.is_sampled())
        } else {
            None
        }
    }

    fn is_local_root(&self) -> bool {
        self.trace_id_u128() == u128::from(self.span_id())
    }

    /// Always `0`: OpenTelemetry does not record the local root span id.
    fn local_root_id(&self) -> u64 {
        0
    }

    /// Always `false`: OpenTelemetry has no debug flag.
    fn debug(&self) -> bool {
        false
    }

    /// Always `false`: OpenTelemetry has no shared-span flag.
    fn shared(&self) -> bool {
        false
    }

    /// Always empty: OpenTelemetry has no additional-data list;
    /// [`OtelContextBuilder::add_extra`] is the matching no-op setter.
    fn extra(&self) -> &[Box<dyn Any + Send + Sync>] {
        &[]
    }

    fn trace_id_hex(&self) -> String {
        format!("{:032x}", self.trace_id_u128())
    }

    fn span_id_hex(&self) -> String {
        format!("{:016x}", self.span_id())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Equality delegates to the underlying span context; the live span handle
/// and captured parent id do not participate.
impl PartialEq for OtelContext {
    fn eq(&self, other: &Self) -> bool {
        self.delegate == other.delegate
    }
}

impl Eq for OtelContext {}

impl Hash for OtelContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.delegate.trace_id().to_bytes().hash(state);
        self.delegate.span_id().to_bytes().hash(state);
        self.delegate.trace_flags().to_u8().hash(state);
        self.delegate.is_remote().hash(state);
        self.delegate.trace_state().header().hash(state);
    }
}

/// Incremental construction of an [`OtelContext`].
///
/// Seeded from an existing context via [`OtelContext::to_builder`]. Setters
/// for fields the OpenTelemetry representation cannot carry are accepted and
/// silently ignored; each one documents this. `build` produces a context
/// with no associated live span.
#[derive(Clone, Debug)]
pub struct OtelContextBuilder {
    trace_id: u128,
    span_id: u64,
    trace_flags: TraceFlags,
    trace_state: TraceState,
    is_remote: bool,
}

impl OtelContextBuilder {
    /// Sets the high 64 bits of the trace id, preserving the low half.
    pub fn trace_id_high(mut self, high: u64) -> Self {
        self.trace_id = (u128::from(high) << 64) | (self.trace_id & u128::from(u64::MAX));
        self
    }

    /// Sets the low 64 bits of the trace id, preserving the high half.
    pub fn trace_id(mut self, low: u64) -> Self {
        self.trace_id = (self.trace_id & !u128::from(u64::MAX)) | u128::from(low);
        self
    }

    /// Sets the span id.
    pub fn span_id(mut self, span_id: u64) -> Self {
        self.span_id = span_id;
        self
    }

    /// Sets the sampling decision.
    pub fn sampled(mut self, sampled: bool) -> Self {
        self.trace_flags = if sampled {
            TraceFlags::SAMPLED
        } else {
            TraceFlags::default()
        };
        self
    }

    /// No-op: OpenTelemetry span contexts do not carry a parent id.
    pub fn parent_id(self, _parent_id: Option<u64>) -> Self {
        self
    }

    /// No-op: OpenTelemetry has no debug flag.
    pub fn debug(self, _debug: bool) -> Self {
        self
    }

    /// No-op: OpenTelemetry has no shared-span flag.
    pub fn shared(self, _shared: bool) -> Self {
        self
    }

    /// No-op: OpenTelemetry has no additional-data list.
    pub fn add_extra<T: Any>(self, _extra: T) -> Self {
        self
    }

    /// Produces an immutable context from the accumulated fields.
    pub fn build(self) -> OtelContext {
        OtelContext::from_otel(SpanContext::new(
            TraceId::from_bytes(self.trace_id.to_be_bytes()),
            SpanId::from_bytes(self.span_id.to_be_bytes()),
            self.trace_flags,
            self.is_remote,
            self.trace_state,
        ))
    }
}

/// [`Span`] over an ambient [`Context`] carrying the live OpenTelemetry
/// span.
pub struct OtelSpan {
    name: String,
    cx: Context,
    parent_span_id: Option<u64>,
}

impl fmt::Debug for OtelSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtelSpan")
            .field("name", &self.name)
            .field("span_context", self.cx.span().span_context())
            .finish()
    }
}

impl Span for OtelSpan {
    fn name(&self) -> &str {
        &self.name
    }

    fn context(&self) -> Box<dyn TraceContext> {
        Box::new(OtelContext {
            delegate: self.cx.span().span_context().clone(),
            cx: Some(self.cx.clone()),
            parent_span_id: self.parent_span_id,
        })
    }

    fn record_error(&self, error: &dyn std::error::Error) {
        let span = self.cx.span();
        span.record_error(error);
        span.set_status(Status::error(error.to_string()));
    }

    fn end(&self) {
        self.cx.span().end();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct OtelScope {
    _guard: ContextGuard,
}

impl Scope for OtelScope {}

/// [`Tracer`] over any OpenTelemetry tracer.
pub struct OtelTracer<T> {
    tracer: T,
}

impl OtelTracer<BoxedTracer> {
    /// Tracer backed by the globally installed provider.
    pub fn global() -> Self {
        Self {
            tracer: global::tracer("weft"),
        }
    }
}

impl<T> OtelTracer<T> {
    /// Wraps `tracer`.
    pub fn new(tracer: T) -> Self {
        Self { tracer }
    }
}

impl<T> Tracer for OtelTracer<T>
where
    T: opentelemetry::trace::Tracer + Send + Sync,
    T::Span: Send + Sync + 'static,
{
    fn next_span(&self, name: &str) -> Box<dyn Span> {
        let parent_cx = Context::new();
        let span = self.tracer.start_with_context(name.to_string(), &parent_cx);
        Box::new(OtelSpan {
            name: name.to_string(),
            cx: parent_cx.with_span(span),
            parent_span_id: None,
        })
    }

    fn next_span_with_parent(&self, name: &str, parent: &dyn TraceContext) -> Box<dyn Span> {
        let parent_cx = OtelContext::to_parent_context(parent);
        let parent_span_id = {
            let parent_span = parent_cx.span();
            let sc = parent_span.span_context();
            sc.is_valid()
                .then(|| u64::from_be_bytes(sc.span_id().to_bytes()))
        };
        let span = self.tracer.start_with_context(name.to_string(), &parent_cx);
        Box::new(OtelSpan {
            name: name.to_string(),
            cx: parent_cx.with_span(span),
            parent_span_id,
        })
    }

    /// # Panics
    ///
    /// Panics if `span` was created by a different adapter implementation.
    /// That is a programming error, not a recoverable condition: callers
    /// must keep a single adapter family per pipeline.
    fn activate(&self, span: &dyn Span) -> Box<dyn Scope> {
        let otel = span
            .as_any()
            .downcast_ref::<OtelSpan>()
            .expect("span was not created by the OpenTelemetry adapter");
        Box::new(OtelScope {
            _guard: otel.cx.clone().attach(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(trace_id: u128, span_id: u64, flags: TraceFlags) -> OtelContext {
        OtelContext::from_otel(SpanContext::new(
            TraceId::from_bytes(trace_id.to_be_bytes()),
            SpanId::from_bytes(span_id.to_be_bytes()),
            flags,
            true,
            TraceState::default(),
        ))
    }

    #[test]
    fn trace_id_splits_into_halves() {
        let ctx = context(0x0123_4567_89ab_cdef_fedc_ba98_7654_3210, 0x42, TraceFlags::SAMPLED);
        assert_eq!(ctx.trace_id_high(), 0x0123_4567_89ab_cdef);
        assert_eq!(ctx.trace_id(), 0xfedc_ba98_7654_3210);
        assert_eq!(ctx.trace_id_hex(), "0123456789abcdeffedcba9876543210");
        assert_eq!(ctx.span_id_hex(), "0000000000000042");
    }

    #[test]
    fn local_root_is_trace_id_equal_to_span_id() {
        assert!(context(42, 42, TraceFlags::SAMPLED).is_local_root());
        assert!(!context(0x0100_0000_0000_0000_002a, 0x2a, TraceFlags::SAMPLED).is_local_root());

        // All-zero ids compare equal; maximum-value ids do not (128 vs 64 bits).
        assert!(context(0, 0, TraceFlags::default()).is_local_root());
        assert!(!context(u128::MAX, u64::MAX, TraceFlags::SAMPLED).is_local_root());
    }

    #[test]
    fn sampling_is_tri_state() {
        assert_eq!(context(1, 2, TraceFlags::SAMPLED).sampled(), Some(true));
        assert_eq!(context(1, 2, TraceFlags::default()).sampled(), Some(false));

        let unset = OtelContext::from_otel(SpanContext::empty_context());
        assert_eq!(unset.sampled(), None);
    }

    #[test]
    fn unsupported_fields_return_neutral_defaults() {
        let ctx = context(1, 2, TraceFlags::SAMPLED);
        assert!(!ctx.debug());
        assert!(!ctx.shared());
        assert_eq!(ctx.parent_id(), None);
        assert_eq!(ctx.local_root_id(), 0);
        assert!(ctx.extra().is_empty());
    }

    #[test]
    fn builder_round_trip_preserves_supported_fields() {
        let state = TraceState::from_key_value([("vendor", "value")]).unwrap();
        let original = OtelContext::from_otel(SpanContext::new(
            TraceId::from_bytes(7u128.to_be_bytes()),
            SpanId::from_bytes(9u64.to_be_bytes()),
            TraceFlags::SAMPLED,
            true,
            state,
        ));

        let rebuilt = original.to_builder().build();
        assert_eq!(rebuilt, original);
        assert_eq!(
            rebuilt.span_context().trace_state().header(),
            original.span_context().trace_state().header()
        );
    }

    #[test]
    fn unsupported_setters_change_nothing() {
        let original = context(7, 9, TraceFlags::SAMPLED);
        let rebuilt = original
            .to_builder()
            .parent_id(Some(1234))
            .debug(true)
            .shared(true)
            .add_extra("ignored")
            .build();
        assert_eq!(rebuilt, original);
        assert_eq!(rebuilt.parent_id(), None);
    }

    #[test]
    fn builder_half_setters_preserve_the_other_half() {
        let seeded = context(0x0123_4567_89ab_cdef_fedc_ba98_7654_3210, 9, TraceFlags::SAMPLED);

        let high_changed = seeded.to_builder().trace_id_high(0xdead_beef).build();
        assert_eq!(high_changed.trace_id_high(), 0xdead_beef);
        assert_eq!(high_changed.trace_id(), 0xfedc_ba98_7654_3210);

        let low_changed = seeded.to_builder().trace_id(0xcafe).build();
        assert_eq!(low_changed.trace_id_high(), 0x0123_4567_89ab_cdef);
        assert_eq!(low_changed.trace_id(), 0xcafe);
    }

    #[test]
    fn builder_sampled_setter_toggles_flags() {
        let ctx = context(7, 9, TraceFlags::default());
        assert_eq!(ctx.to_builder().sampled(true).build().sampled(), Some(true));
        let resampled = context(7, 9, TraceFlags::SAMPLED);
        assert_eq!(
            resampled.to_builder().sampled(false).build().sampled(),
            Some(false)
        );
    }

    #[test]
    fn equality_ignores_span_handle_and_parent() {
        let delegate = SpanContext::new(
            TraceId::from_bytes(7u128.to_be_bytes()),
            SpanId::from_bytes(9u64.to_be_bytes()),
            TraceFlags::SAMPLED,
            false,
            TraceState::default(),
        );
        let bare = OtelContext::from_otel(delegate.clone());
        let with_parent = OtelContext {
            delegate,
            cx: None,
            parent_span_id: Some(3),
        };
        assert_eq!(bare, with_parent);
    }

    #[test]
    fn to_otel_round_trips_the_delegate() {
        let ctx = context(7, 9, TraceFlags::SAMPLED);
        let raw = OtelContext::to_otel(&ctx);
        assert_eq!(&raw, ctx.span_context());
    }

    #[test]
    #[should_panic(expected = "OpenTelemetry adapter")]
    fn to_otel_rejects_foreign_contexts() {
        #[derive(Debug)]
        struct Foreign;

        impl TraceContext for Foreign {
            fn trace_id_high(&self) -> u64 {
                0
            }
            fn trace_id(&self) -> u64 {
                0
            }
            fn span_id(&self) -> u64 {
                0
            }
            fn parent_id(&self) -> Option<u64> {
                None
            }
            fn sampled(&self) -> Option<bool> {
                None
            }
            fn is_local_root(&self) -> bool {
                true
            }
            fn local_root_id(&self) -> u64 {
                0
            }
            fn debug(&self) -> bool {
                false
            }
            fn shared(&self) -> bool {
                false
            }
            fn extra(&self) -> &[Box<dyn Any + Send + Sync>] {
                &[]
            }
            fn trace_id_hex(&self) -> String {
                String::new()
            }
            fn span_id_hex(&self) -> String {
                String::new()
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
        }

        OtelContext::to_otel(&Foreign);
    }
}
