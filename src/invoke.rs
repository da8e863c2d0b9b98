//! The invocation-wrapping core.
//!
//! [`FunctionInvocationTracer`] guarantees that every function invocation is
//! covered by exactly one span per inbound boundary and one span per
//! outbound boundary, with correct parent/child linkage, for every
//! invocation shape: producer (no input message), consumer (no result), and
//! request/response.

use std::sync::Arc;

use dashmap::DashMap;
use snafu::Snafu;
use tracing::debug;

use crate::api::{Span, Tracer};
use crate::config::{PropertySource, BINDING_DESTINATION_SUFFIX, BINDINGS_PREFIX, FUNCTION_BINDINGS_PREFIX};
use crate::handler::{MessageAndSpans, MessageWrapper};
use crate::message::{FunctionOutput, Message};

/// Boxed error type invocations propagate. User errors pass through the
/// tracer unchanged.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by [`FunctionInvocationTracer`] itself (never by user
/// function code).
#[derive(Debug, Snafu)]
pub enum InvokeError {
    /// A non-supplier function was invoked without an input message.
    #[snafu(display("function '{function}' is not a supplier but no input message was provided"))]
    MissingInputMessage {
        /// The function definition name.
        function: String,
    },
}

/// Handle to the target function of an invocation.
///
/// Exposes the definition name, whether the function is a supplier
/// (producer-style, no input), and zero- and one-argument invocation.
pub trait FunctionHandle: Send + Sync {
    /// The function definition name, also the default destination name.
    fn definition(&self) -> &str;

    /// Whether this is a supplier (invoked with no input message).
    fn is_supplier(&self) -> bool;

    /// Zero-argument invocation, used for suppliers.
    fn get(&self) -> Result<Option<FunctionOutput>, BoxError>;

    /// One-argument invocation with the normalized inbound message.
    fn apply(&self, message: Message) -> Result<Option<FunctionOutput>, BoxError>;
}

/// Destination names resolved per function, separately for the input and
/// output sides, computed once and kept until [`DestinationCache::invalidate`].
///
/// Concurrent misses for the same key may each run the lookup, but an entry
/// is only ever written under the map's own lock, so a clear followed by a
/// repopulate always reflects a fresh computation.
struct DestinationCache {
    inputs: DashMap<String, String>,
    outputs: DashMap<String, String>,
}

impl DestinationCache {
    fn new() -> Self {
        Self {
            inputs: DashMap::new(),
            outputs: DashMap::new(),
        }
    }

    fn resolve_input(&self, properties: &dyn PropertySource, function: &str) -> String {
        Self::resolve(&self.inputs, properties, function, "in-0")
    }

    fn resolve_output(&self, properties: &dyn PropertySource, function: &str) -> String {
        Self::resolve(&self.outputs, properties, function, "out-0")
    }

    fn resolve(
        cache: &DashMap<String, String>,
        properties: &dyn PropertySource,
        function: &str,
        suffix: &str,
    ) -> String {
        cache
            .entry(function.to_string())
            .or_insert_with(|| {
                let binding = properties
                    .property(&format!("{FUNCTION_BINDINGS_PREFIX}{function}-{suffix}"))
                    .unwrap_or_else(|| format!("{function}-{suffix}"));
                properties
                    .property(&format!(
                        "{BINDINGS_PREFIX}{binding}{BINDING_DESTINATION_SUFFIX}"
                    ))
                    .unwrap_or_else(|| function.to_string())
            })
            .value()
            .clone()
    }

    /// Wholesale clear; entries are never evicted individually.
    fn invalidate(&self) {
        self.inputs.clear();
        self.outputs.clear();
    }
}

/// Wraps function invocations with spans and propagation headers.
///
/// Shared freely across worker threads: per-invocation state is local to the
/// call, and the destination cache is safe for concurrent compute-on-miss.
pub struct FunctionInvocationTracer {
    tracer: Arc<dyn Tracer>,
    wrapper: Arc<dyn MessageWrapper>,
    properties: Arc<dyn PropertySource>,
    destinations: DestinationCache,
}

impl FunctionInvocationTracer {
    /// Tracer over the given backend seams and configuration source.
    pub fn new(
        tracer: Arc<dyn Tracer>,
        wrapper: Arc<dyn MessageWrapper>,
        properties: Arc<dyn PropertySource>,
    ) -> Self {
        Self {
            tracer,
            wrapper,
            properties,
            destinations: DestinationCache::new(),
        }
    }

    /// Invokes `function` inside a span, propagating trace context across
    /// both message boundaries.
    ///
    /// - Absent message + supplier: a brand-new root span named after the
    ///   function definition.
    /// - Otherwise the inbound message is wrapped: upstream context is
    ///   extracted from its headers (a fresh root is created when none is
    ///   found) and the invocation runs in the resulting child span.
    ///
    /// Any error from the function is recorded on the invocation span, the
    /// span is finalized, and the error is returned unchanged; no output
    /// wrapping happens on the error path. A `None` result means a pure
    /// consumer and is returned as-is. Otherwise the result is normalized
    /// into a message and wrapped for sending: the send span continues from
    /// the receive span (sibling of the invocation span), or from the root
    /// span on the supplier path.
    pub fn invoke(
        &self,
        message: Option<Message>,
        function: &dyn FunctionHandle,
    ) -> Result<Option<Message>, BoxError> {
        let definition = function.definition().to_string();

        let (span, input, parent): (Box<dyn Span>, Option<Message>, Option<Box<dyn Span>>) =
            match message {
                None if function.is_supplier() => (self.tracer.next_span(&definition), None, None),
                None => {
                    return Err(Box::new(InvokeError::MissingInputMessage {
                        function: definition,
                    }))
                }
                Some(message) => {
                    debug!(function = %definition, "retrieving trace headers from the inbound message");
                    let destination = self.input_destination(&definition);
                    let wrapped = self.wrapper.wrap_input(message, &destination);
                    debug!(?wrapped, "wrapped input message");
                    let MessageAndSpans {
                        message,
                        child_span,
                        parent_span,
                    } = wrapped;
                    (child_span, Some(message), Some(parent_span))
                }
            };

        let outcome = {
            let _scope = self.tracer.activate(span.as_ref());
            match input {
                None => function.get(),
                Some(message) => function.apply(message),
            }
        };

        self.wrapper.after_handled(
            span.as_ref(),
            outcome
                .as_ref()
                .err()
                .map(|error| &**error as &dyn std::error::Error),
        );

        let result = outcome?;
        let Some(output) = result else {
            debug!("function returned no result, consumer invocation");
            return Ok(None);
        };

        let destination = self.output_destination(&definition);
        let continue_from = parent.as_deref().unwrap_or(span.as_ref());
        let wrapped_output =
            self.wrapper
                .wrap_output(output.into_message(), continue_from, &destination);
        debug!(?wrapped_output, "wrapped output message");
        self.wrapper.after_handled(wrapped_output.span.as_ref(), None);
        Ok(Some(wrapped_output.message))
    }

    /// Resolved (and cached) input destination for `function`.
    pub fn input_destination(&self, function: &str) -> String {
        self.destinations
            .resolve_input(self.properties.as_ref(), function)
    }

    /// Resolved (and cached) output destination for `function`.
    pub fn output_destination(&self, function: &str) -> String {
        self.destinations
            .resolve_output(self.properties.as_ref(), function)
    }

    /// Clears the destination cache. The host application calls this on a
    /// configuration refresh; entries repopulate lazily on next access.
    pub fn invalidate(&self) {
        debug!("configuration refreshed, clearing the destination cache");
        self.destinations.invalidate();
    }
}
