//! # RPC Invoker
//!
//! Executes a method call against an injected handler and produces either one
//! result value or a lazy stream of result values, surfacing typed exceptions.
//!
//! Every call is an independent unit of work: the invoker validates the
//! arguments against the method descriptor, dispatches to the handler, and
//! shapes the reply according to the method's result kind. Stream production
//! runs on its own task, so a suspended stream never blocks other calls.
//!
//! ## Error channel
//!
//! A handler raises domain failures as typed exception values
//! ([`HandlerError::Raised`]). Anything else ([`HandlerError::Internal`]) is
//! wrapped into the builtin `chimera.InternalError` exception with the
//! generic `internal` code, so callers can always pattern-match on exception
//! shape.
pub mod stream;

pub use stream::{StreamEnd, ValueStream};

use crate::BoxError;
use crate::schema::{
    EXCEPTION_CODE_FIELD, INTERNAL_ERROR_TYPE, MethodDescriptor, MethodTable, ResultKind,
    TypeRegistry, UnknownMethod,
};
use crate::value::{MessageValue, Value, is_assignable};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use std::future::Future;
use std::sync::Arc;
use stream::StreamEvent;
use tokio::sync::mpsc;

/// Capacity of the per-call delivery channel. Production runs ahead of the
/// consumer by at most this many elements.
const STREAM_BUFFER: usize = 16;

/// Per-call faults. Never propagate to sibling calls.
#[derive(Debug, thiserror::Error)]
pub enum CallFault {
    #[error("method '{method}' argument mismatch: {detail}")]
    ArgumentTypeMismatch { method: String, detail: String },
    #[error(transparent)]
    UnknownMethod(#[from] UnknownMethod),
    /// The call failed with a typed exception value.
    #[error("call failed with a domain exception")]
    Raised(Value),
}

/// What a handler hands back for one call.
pub enum Reply {
    /// A single result value; `Value::Unit` for void methods.
    Value(Value),
    /// A lazily produced sequence of result values.
    Stream(BoxStream<'static, Result<Value, HandlerError>>),
}

/// A failure raised inside a handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A domain exception value with a semantic `code`.
    #[error("domain exception raised")]
    Raised(Value),
    /// A non-domain failure; the invoker wraps it into the builtin
    /// internal-error exception.
    #[error("internal handler failure: '{0}'")]
    Internal(#[source] BoxError),
}

impl HandlerError {
    /// Shorthand for an internal failure from a plain message.
    pub fn internal(detail: impl Into<String>) -> Self {
        HandlerError::Internal(detail.into().into())
    }
}

/// The one injected collaborator: receives the method descriptor and the
/// validated argument values, returns the reply matching the method's result
/// kind.
pub trait CallHandler {
    fn handle(
        &self,
        method: &MethodDescriptor,
        args: Vec<Value>,
    ) -> impl Future<Output = Result<Reply, HandlerError>> + Send;
}

/// A successfully dispatched call.
#[derive(Debug)]
pub enum CallOutcome {
    /// The result value; `Value::Unit` for void methods.
    Completed(Value),
    /// A live stream of result values.
    Streaming(ValueStream),
}

/// Dispatches calls against a finalized registry.
///
/// Cheap to clone; supports arbitrarily many concurrent calls, each owning
/// its argument and result values exclusively.
#[derive(Debug, Clone)]
pub struct Invoker {
    registry: Arc<TypeRegistry>,
}

impl Invoker {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Looks a method up in a flattened table and dispatches it.
    pub async fn call_named<H: CallHandler>(
        &self,
        table: &MethodTable,
        method: &str,
        args: Vec<Value>,
        handler: &H,
    ) -> Result<CallOutcome, CallFault> {
        let method = table.lookup(method)?;
        self.call(method, args, handler).await
    }

    /// Validates the arguments, dispatches to the handler, and shapes the
    /// reply according to the method's result kind.
    pub async fn call<H: CallHandler>(
        &self,
        method: &MethodDescriptor,
        args: Vec<Value>,
        handler: &H,
    ) -> Result<CallOutcome, CallFault> {
        self.validate_args(method, &args)?;
        tracing::debug!(method = %method.name(), args = args.len(), "dispatching call");

        let reply = match handler.handle(method, args).await {
            Ok(reply) => reply,
            Err(HandlerError::Raised(exc)) => {
                tracing::debug!(method = %method.name(), "call raised a domain exception");
                return Err(CallFault::Raised(exc));
            }
            Err(HandlerError::Internal(err)) => {
                tracing::debug!(method = %method.name(), error = %err, "call failed internally");
                return Err(CallFault::Raised(internal_exception(&err.to_string())));
            }
        };

        match (method.result(), reply) {
            (ResultKind::Void, Reply::Value(_)) => Ok(CallOutcome::Completed(Value::Unit)),
            (ResultKind::Value(_), Reply::Value(value)) => Ok(CallOutcome::Completed(value)),
            (ResultKind::Stream(_), Reply::Stream(source)) => {
                Ok(CallOutcome::Streaming(self.spawn_stream(method, source)))
            }
            (_, _) => Err(CallFault::Raised(internal_exception(
                "handler reply does not match the method's result kind",
            ))),
        }
    }

    fn validate_args(&self, method: &MethodDescriptor, args: &[Value]) -> Result<(), CallFault> {
        let params = method.params();
        if args.len() != params.len() {
            return Err(CallFault::ArgumentTypeMismatch {
                method: method.name().to_string(),
                detail: format!("expected {} arguments, got {}", params.len(), args.len()),
            });
        }
        for (param, arg) in params.iter().zip(args) {
            if !is_assignable(arg, param.ty(), &self.registry) {
                return Err(CallFault::ArgumentTypeMismatch {
                    method: method.name().to_string(),
                    detail: format!(
                        "parameter '{}' expects {}, got {}",
                        param.name(),
                        param.ty().kind_label(),
                        arg.kind_label()
                    ),
                });
            }
        }
        Ok(())
    }

    /// Moves stream production onto its own task so a suspended producer
    /// never blocks other calls. The task stops as soon as a send fails,
    /// which is how caller cancellation is observed.
    fn spawn_stream(
        &self,
        method: &MethodDescriptor,
        mut source: BoxStream<'static, Result<Value, HandlerError>>,
    ) -> ValueStream {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let name = method.name().to_string();
        tokio::spawn(async move {
            let mut produced = 0usize;
            while let Some(item) = source.next().await {
                match item {
                    Ok(value) => {
                        if tx.send(StreamEvent::Item(value)).await.is_err() {
                            tracing::debug!(method = %name, produced, "stream cancelled by caller");
                            return;
                        }
                        produced += 1;
                    }
                    Err(err) => {
                        let exc = match err {
                            HandlerError::Raised(exc) => exc,
                            HandlerError::Internal(err) => internal_exception(&err.to_string()),
                        };
                        let _ = tx.send(StreamEvent::Failed(exc)).await;
                        tracing::debug!(method = %name, produced, "stream failed");
                        return;
                    }
                }
            }
            let _ = tx.send(StreamEvent::Completed).await;
            tracing::debug!(method = %name, produced, "stream completed");
        });
        ValueStream::new(rx)
    }
}

/// Builds a `chimera.InternalError` exception value with the generic
/// `internal` code.
pub(crate) fn internal_exception(detail: &str) -> Value {
    let mut exc = MessageValue::of(INTERNAL_ERROR_TYPE);
    exc.set(EXCEPTION_CODE_FIELD, Value::String("internal".to_string()));
    exc.set("message", Value::String(detail.to_string()));
    Value::Message(exc)
}
