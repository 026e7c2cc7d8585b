//! Sample schema used by the `chimera_core` integration tests.
//!
//! Mirrors what a generated package would hand to the runtime: a polymorphic
//! message hierarchy exercising every field kind, a two-level event taxonomy,
//! a domain exception, and three interfaces wired to a reference handler.
use chimera_core::invoke::{CallHandler, HandlerError, Reply};
use chimera_core::schema::{
    EXCEPTION_CODE_FIELD, EnumDescriptor, InterfaceDescriptor, MessageDescriptor, MethodDescriptor,
    ResultKind, SchemaBuilder, TypeDescriptor, TypeRegistry,
};
use chimera_core::value::{EnumValue, MessageValue, Value};
use futures_util::StreamExt;
use std::sync::Arc;

pub const KIND: &str = "test.Kind";
pub const EVENT_KIND: &str = "test.EventKind";
pub const MESSAGE: &str = "test.Message";
pub const SUB_MESSAGE1: &str = "test.SubMessage1";
pub const SUB_MESSAGE2: &str = "test.SubMessage2";
pub const SUB_MESSAGE3: &str = "test.SubMessage3";
pub const EVENT: &str = "test.Event";
pub const CHILD_EVENT: &str = "test.ChildEvent";
pub const GRANDCHILD_EVENT: &str = "test.GrandchildEvent";
pub const SERVICE_ERROR: &str = "test.ServiceError";
pub const INTERFACE: &str = "test.Interface";
pub const SUPPORT: &str = "test.Support";
pub const SUB_INTERFACE: &str = "test.SubInterface";

/// Builds and finalizes the sample registry.
pub fn registry() -> Arc<TypeRegistry> {
    let mut builder = SchemaBuilder::new();

    builder
        .register_enum(EnumDescriptor::new(KIND, ["first", "second", "third"]))
        .expect("sample schema is valid");
    builder
        .register_enum(EnumDescriptor::new(
            EVENT_KIND,
            ["base", "child", "grandchild"],
        ))
        .expect("sample schema is valid");

    builder
        .register_message(
            MessageDescriptor::message(MESSAGE)
                .field("kind", TypeDescriptor::Enum(KIND.into()))
                .field("bool_field", TypeDescriptor::Bool)
                .field("int16_field", TypeDescriptor::Int16)
                .field("int32_field", TypeDescriptor::Int32)
                .field("int64_field", TypeDescriptor::Int64)
                .field("float_field", TypeDescriptor::Float)
                .field("double_field", TypeDescriptor::Double)
                .field("decimal_field", TypeDescriptor::Decimal)
                .field("date_field", TypeDescriptor::Date)
                .field("datetime_field", TypeDescriptor::Datetime)
                .field("string_field", TypeDescriptor::String)
                .field("uuid_field", TypeDescriptor::Uuid)
                .field("object_field", TypeDescriptor::Object)
                .field(
                    "list_field",
                    TypeDescriptor::list(TypeDescriptor::Message(SUB_MESSAGE1.into())),
                )
                .field(
                    "set_field",
                    TypeDescriptor::set(TypeDescriptor::Message(SUB_MESSAGE2.into())),
                )
                .field(
                    "map_field",
                    TypeDescriptor::map(
                        TypeDescriptor::String,
                        TypeDescriptor::Message(SUB_MESSAGE3.into()),
                    ),
                )
                .discriminator(
                    "kind",
                    &[
                        ("first", SUB_MESSAGE1),
                        ("second", SUB_MESSAGE2),
                        ("third", SUB_MESSAGE3),
                    ],
                ),
        )
        .expect("sample schema is valid");
    builder
        .register_message(
            MessageDescriptor::message(SUB_MESSAGE1)
                .base(MESSAGE)
                .field("sub_field1", TypeDescriptor::Message(MESSAGE.into()))
                .field("sub_field2", TypeDescriptor::String),
        )
        .expect("sample schema is valid");
    builder
        .register_message(
            MessageDescriptor::message(SUB_MESSAGE2)
                .base(MESSAGE)
                .field("sub_field1", TypeDescriptor::Int32),
        )
        .expect("sample schema is valid");
    builder
        .register_message(
            MessageDescriptor::message(SUB_MESSAGE3)
                .base(SUB_MESSAGE2)
                .field("sub_field2", TypeDescriptor::Int32),
        )
        .expect("sample schema is valid");

    builder
        .register_message(
            MessageDescriptor::message(EVENT)
                .field("kind", TypeDescriptor::Enum(EVENT_KIND.into()))
                .discriminator(
                    "kind",
                    &[("child", CHILD_EVENT), ("grandchild", CHILD_EVENT)],
                ),
        )
        .expect("sample schema is valid");
    builder
        .register_message(
            MessageDescriptor::message(CHILD_EVENT)
                .base(EVENT)
                .field("child_field", TypeDescriptor::String)
                .discriminator("kind", &[("grandchild", GRANDCHILD_EVENT)]),
        )
        .expect("sample schema is valid");
    builder
        .register_message(
            MessageDescriptor::message(GRANDCHILD_EVENT)
                .base(CHILD_EVENT)
                .field("grandchild_field", TypeDescriptor::Int32),
        )
        .expect("sample schema is valid");

    builder
        .register_message(MessageDescriptor::exception(SERVICE_ERROR))
        .expect("sample schema is valid");

    builder
        .register_interface(
            InterfaceDescriptor::new(INTERFACE)
                .method(MethodDescriptor::new("method", ResultKind::Void))
                .method(
                    MethodDescriptor::new("sum", ResultKind::Stream(TypeDescriptor::Int32))
                        .param("i0", TypeDescriptor::Int32)
                        .param("i1", TypeDescriptor::Int32),
                )
                .method(
                    MethodDescriptor::new("echo", ResultKind::Stream(TypeDescriptor::String))
                        .param("text", TypeDescriptor::String),
                ),
        )
        .expect("sample schema is valid");
    builder
        .register_interface(
            InterfaceDescriptor::new(SUPPORT)
                .method(MethodDescriptor::new("call_support", ResultKind::Void)),
        )
        .expect("sample schema is valid");
    builder
        .register_interface(
            InterfaceDescriptor::new(SUB_INTERFACE)
                .parent(INTERFACE)
                .parent(SUPPORT)
                .method(
                    MethodDescriptor::new(
                        "submethod",
                        ResultKind::Stream(TypeDescriptor::Message(SUB_MESSAGE3.into())),
                    )
                    .param("msg1", TypeDescriptor::Message(SUB_MESSAGE1.into()))
                    .param("msg2", TypeDescriptor::Message(SUB_MESSAGE2.into())),
                ),
        )
        .expect("sample schema is valid");

    Arc::new(builder.finish().expect("sample schema is valid"))
}

/// Builds a `test.ServiceError` value with the given code.
pub fn service_error(code: &str) -> Value {
    Value::Message(
        MessageValue::of(SERVICE_ERROR).field(EXCEPTION_CODE_FIELD, Value::String(code.into())),
    )
}

/// Reference implementation of the sample interfaces.
pub struct SampleHandler;

impl CallHandler for SampleHandler {
    async fn handle(
        &self,
        method: &MethodDescriptor,
        args: Vec<Value>,
    ) -> Result<Reply, HandlerError> {
        match method.name() {
            "method" | "call_support" => Ok(Reply::Value(Value::Unit)),
            "sum" => {
                let (Some(Value::Int32(i0)), Some(Value::Int32(i1))) =
                    (args.first(), args.get(1))
                else {
                    return Err(HandlerError::internal("sum expects two int32 arguments"));
                };
                let (i0, i1) = (*i0, *i1);
                let items = vec![
                    Ok(Value::Int32(i0)),
                    Ok(Value::Int32(i1)),
                    Ok(Value::Int32(i0 + i1)),
                ];
                Ok(Reply::Stream(futures_util::stream::iter(items).boxed()))
            }
            "echo" => {
                let Some(Value::String(text)) = args.first() else {
                    return Err(HandlerError::internal("echo expects a string argument"));
                };
                if text.is_empty() {
                    return Err(HandlerError::Raised(service_error("empty_text")));
                }
                let items: Vec<_> = (0..3)
                    .map(|seq| Ok(Value::String(format!("{text} - seq {seq}"))))
                    .collect();
                Ok(Reply::Stream(futures_util::stream::iter(items).boxed()))
            }
            "submethod" => {
                let (Some(Value::Message(msg1)), Some(Value::Message(msg2))) =
                    (args.first(), args.get(1))
                else {
                    return Err(HandlerError::internal(
                        "submethod expects two message arguments",
                    ));
                };
                let carried = msg2
                    .get("sub_field1")
                    .cloned()
                    .unwrap_or(Value::Int32(0));
                let tag = match msg1.get("sub_field2") {
                    Some(Value::String(s)) => s.len() as i32,
                    _ => 0,
                };
                let result = MessageValue::of(SUB_MESSAGE3)
                    .field("kind", Value::Enum(EnumValue::new(KIND, "third")))
                    .field("sub_field1", carried)
                    .field("sub_field2", Value::Int32(tag));
                let items = vec![Ok(Value::Message(result))];
                Ok(Reply::Stream(futures_util::stream::iter(items).boxed()))
            }
            other => Err(HandlerError::internal(format!(
                "no handler for method '{other}'"
            ))),
        }
    }
}
