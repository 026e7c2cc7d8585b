use chimera_core::invoke::{
    CallFault, CallHandler, CallOutcome, HandlerError, Invoker, Reply, StreamEnd,
};
use chimera_core::schema::{
    EXCEPTION_CODE_FIELD, INTERNAL_ERROR_TYPE, MethodDescriptor, ResultKind, TypeDescriptor,
};
use chimera_core::value::{MessageValue, Value};
use futures_util::StreamExt;
use sample_schema::{SUB_INTERFACE, SUB_MESSAGE1, SUB_MESSAGE2, SUB_MESSAGE3, SampleHandler};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn invoker() -> Invoker {
    Invoker::new(sample_schema::registry())
}

fn exception_code(value: &Value) -> &str {
    let Some(Value::String(code)) = value
        .as_message()
        .and_then(|m| m.get(EXCEPTION_CODE_FIELD))
    else {
        panic!("fault should carry an exception value with a code");
    };
    code
}

async fn collect(mut outcome: CallOutcome) -> (Vec<Value>, StreamEnd) {
    let CallOutcome::Streaming(ref mut stream) = outcome else {
        panic!("expected a streaming outcome");
    };
    let mut items = Vec::new();
    while let Some(value) = stream.next().await {
        items.push(value);
    }
    (items, stream.end().cloned().expect("terminal state reached"))
}

#[tokio::test]
async fn void_method_completes_with_the_unit_sentinel() {
    let invoker = invoker();
    let table = invoker.registry().method_table(SUB_INTERFACE).unwrap().clone();

    let outcome = invoker
        .call_named(&table, "method", vec![], &SampleHandler)
        .await
        .unwrap();

    assert!(matches!(outcome, CallOutcome::Completed(Value::Unit)));
}

#[tokio::test]
async fn inherited_methods_dispatch_through_the_flattened_table() {
    let invoker = invoker();
    let table = invoker.registry().method_table(SUB_INTERFACE).unwrap().clone();

    let outcome = invoker
        .call_named(&table, "call_support", vec![], &SampleHandler)
        .await
        .unwrap();

    assert!(matches!(outcome, CallOutcome::Completed(Value::Unit)));
}

#[tokio::test]
async fn unknown_method_lookup_fails() {
    let invoker = invoker();
    let table = invoker.registry().method_table(SUB_INTERFACE).unwrap().clone();

    let err = invoker
        .call_named(&table, "nope", vec![], &SampleHandler)
        .await
        .unwrap_err();

    assert!(matches!(err, CallFault::UnknownMethod(_)));
}

#[tokio::test]
async fn stream_elements_arrive_in_production_order() {
    let invoker = invoker();
    let table = invoker.registry().method_table(SUB_INTERFACE).unwrap().clone();

    let outcome = invoker
        .call_named(
            &table,
            "sum",
            vec![Value::Int32(2), Value::Int32(3)],
            &SampleHandler,
        )
        .await
        .unwrap();

    let (items, end) = collect(outcome).await;
    assert_eq!(items, [Value::Int32(2), Value::Int32(3), Value::Int32(5)]);
    assert_eq!(end, StreamEnd::Completed);
}

#[tokio::test]
async fn polymorphic_arguments_are_assignable_to_ancestor_parameters() {
    let invoker = invoker();
    let table = invoker.registry().method_table(SUB_INTERFACE).unwrap().clone();

    let msg1 = MessageValue::of(SUB_MESSAGE1).field("sub_field2", Value::String("four".into()));
    // Declared parameter type is SubMessage2; SubMessage3 is a descendant.
    let msg2 = MessageValue::polymorphic(SUB_MESSAGE2, SUB_MESSAGE3)
        .field("sub_field1", Value::Int32(21));

    let outcome = invoker
        .call_named(
            &table,
            "submethod",
            vec![Value::Message(msg1), Value::Message(msg2)],
            &SampleHandler,
        )
        .await
        .unwrap();

    let (items, end) = collect(outcome).await;
    assert_eq!(end, StreamEnd::Completed);
    assert_eq!(items.len(), 1);
    let result = items[0].as_message().unwrap();
    assert_eq!(result.actual(), SUB_MESSAGE3);
    assert_eq!(result.get("sub_field1"), Some(&Value::Int32(21)));
    assert_eq!(result.get("sub_field2"), Some(&Value::Int32(4)));
}

#[tokio::test]
async fn argument_count_mismatch_is_a_fault() {
    let invoker = invoker();
    let table = invoker.registry().method_table(SUB_INTERFACE).unwrap().clone();

    let err = invoker
        .call_named(&table, "sum", vec![Value::Int32(2)], &SampleHandler)
        .await
        .unwrap_err();

    assert!(matches!(err, CallFault::ArgumentTypeMismatch { .. }));
}

#[tokio::test]
async fn argument_type_mismatch_is_a_fault() {
    let invoker = invoker();
    let table = invoker.registry().method_table(SUB_INTERFACE).unwrap().clone();

    let err = invoker
        .call_named(&table, "echo", vec![Value::Int32(1)], &SampleHandler)
        .await
        .unwrap_err();

    assert!(matches!(err, CallFault::ArgumentTypeMismatch { .. }));
}

#[tokio::test]
async fn unrelated_message_argument_is_a_fault() {
    let invoker = invoker();
    let table = invoker.registry().method_table(SUB_INTERFACE).unwrap().clone();

    // SubMessage3 does not descend from SubMessage1.
    let msg1 = MessageValue::of(SUB_MESSAGE3);
    let msg2 = MessageValue::of(SUB_MESSAGE2);

    let err = invoker
        .call_named(
            &table,
            "submethod",
            vec![Value::Message(msg1), Value::Message(msg2)],
            &SampleHandler,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CallFault::ArgumentTypeMismatch { .. }));
}

#[tokio::test]
async fn handler_raised_exception_surfaces_typed() {
    let invoker = invoker();
    let table = invoker.registry().method_table(SUB_INTERFACE).unwrap().clone();

    let err = invoker
        .call_named(&table, "echo", vec![Value::String(String::new())], &SampleHandler)
        .await
        .unwrap_err();

    let CallFault::Raised(exc) = err else {
        panic!("expected a raised domain exception");
    };
    assert_eq!(exc.as_message().unwrap().actual(), sample_schema::SERVICE_ERROR);
    assert_eq!(exception_code(&exc), "empty_text");
}

struct FailingHandler;

impl CallHandler for FailingHandler {
    async fn handle(
        &self,
        _method: &MethodDescriptor,
        _args: Vec<Value>,
    ) -> Result<Reply, HandlerError> {
        Err(HandlerError::internal("backend unavailable"))
    }
}

#[tokio::test]
async fn internal_failures_are_wrapped_into_the_builtin_exception() {
    let invoker = invoker();
    let method = MethodDescriptor::new("boom", ResultKind::Value(TypeDescriptor::String));

    let err = invoker.call(&method, vec![], &FailingHandler).await.unwrap_err();

    let CallFault::Raised(exc) = err else {
        panic!("expected a wrapped internal exception");
    };
    assert_eq!(exc.as_message().unwrap().actual(), INTERNAL_ERROR_TYPE);
    assert_eq!(exception_code(&exc), "internal");
}

struct WrongShapeHandler;

impl CallHandler for WrongShapeHandler {
    async fn handle(
        &self,
        _method: &MethodDescriptor,
        _args: Vec<Value>,
    ) -> Result<Reply, HandlerError> {
        Ok(Reply::Value(Value::Int32(1)))
    }
}

#[tokio::test]
async fn reply_shape_must_match_the_result_kind() {
    let invoker = invoker();
    let method = MethodDescriptor::new("ticks", ResultKind::Stream(TypeDescriptor::Int32));

    let err = invoker.call(&method, vec![], &WrongShapeHandler).await.unwrap_err();

    let CallFault::Raised(exc) = err else {
        panic!("expected a wrapped internal exception");
    };
    assert_eq!(exception_code(&exc), "internal");
}

struct MidStreamFailureHandler;

impl CallHandler for MidStreamFailureHandler {
    async fn handle(
        &self,
        _method: &MethodDescriptor,
        _args: Vec<Value>,
    ) -> Result<Reply, HandlerError> {
        let items = vec![
            Ok(Value::Int32(1)),
            Ok(Value::Int32(2)),
            Err(HandlerError::Raised(sample_schema::service_error("mid_fail"))),
        ];
        Ok(Reply::Stream(futures_util::stream::iter(items).boxed()))
    }
}

#[tokio::test]
async fn mid_stream_failure_keeps_delivered_elements() {
    let invoker = invoker();
    let method = MethodDescriptor::new("counts", ResultKind::Stream(TypeDescriptor::Int32));

    let outcome = invoker.call(&method, vec![], &MidStreamFailureHandler).await.unwrap();

    let (items, end) = collect(outcome).await;
    assert_eq!(items, [Value::Int32(1), Value::Int32(2)]);
    let StreamEnd::Failed(exc) = end else {
        panic!("expected a failed terminal state");
    };
    assert_eq!(exception_code(&exc), "mid_fail");
}

struct TickingHandler {
    produced: Arc<AtomicUsize>,
}

impl CallHandler for TickingHandler {
    async fn handle(
        &self,
        _method: &MethodDescriptor,
        _args: Vec<Value>,
    ) -> Result<Reply, HandlerError> {
        let produced = Arc::clone(&self.produced);
        let ticks = futures_util::stream::unfold(0i32, move |n| {
            let produced = Arc::clone(&produced);
            async move {
                produced.fetch_add(1, Ordering::SeqCst);
                Some((Ok(Value::Int32(n)), n + 1))
            }
        });
        Ok(Reply::Stream(ticks.boxed()))
    }
}

#[tokio::test]
async fn cancellation_stops_an_unbounded_stream() {
    let invoker = invoker();
    let method = MethodDescriptor::new("ticks", ResultKind::Stream(TypeDescriptor::Int32));
    let produced = Arc::new(AtomicUsize::new(0));
    let handler = TickingHandler {
        produced: Arc::clone(&produced),
    };

    let outcome = invoker.call(&method, vec![], &handler).await.unwrap();
    let CallOutcome::Streaming(mut stream) = outcome else {
        panic!("expected a streaming outcome");
    };

    for expected in 0..3 {
        assert_eq!(stream.next().await, Some(Value::Int32(expected)));
    }
    stream.cancel();
    assert_eq!(stream.end(), Some(&StreamEnd::Cancelled));

    // No elements are delivered after cancellation, and the production loop
    // winds down once its next send fails.
    assert_eq!(stream.next().await, None);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let settled = produced.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(produced.load(Ordering::SeqCst), settled);
}

#[tokio::test]
async fn concurrent_streams_do_not_interfere() {
    let invoker = invoker();
    let table = invoker.registry().method_table(SUB_INTERFACE).unwrap().clone();

    let ping = invoker.call_named(
        &table,
        "echo",
        vec![Value::String("ping".into())],
        &SampleHandler,
    );
    let pong = invoker.call_named(
        &table,
        "echo",
        vec![Value::String("pong".into())],
        &SampleHandler,
    );
    let (ping, pong) = tokio::join!(ping, pong);

    let (ping_items, ping_end) = collect(ping.unwrap()).await;
    let (pong_items, pong_end) = collect(pong.unwrap()).await;

    assert_eq!(ping_end, StreamEnd::Completed);
    assert_eq!(pong_end, StreamEnd::Completed);
    assert_eq!(
        ping_items,
        [
            Value::String("ping - seq 0".into()),
            Value::String("ping - seq 1".into()),
            Value::String("ping - seq 2".into()),
        ]
    );
    assert_eq!(
        pong_items,
        [
            Value::String("pong - seq 0".into()),
            Value::String("pong - seq 1".into()),
            Value::String("pong - seq 2".into()),
        ]
    );
}
