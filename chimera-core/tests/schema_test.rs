use chimera_core::schema::{
    EXCEPTION_CODE_FIELD, EnumDescriptor, InterfaceDescriptor, MessageDescriptor, MessageKind,
    MethodDescriptor, ResultKind, SchemaBuilder, SchemaError, TypeDescriptor,
};
use sample_schema::{INTERFACE, SUB_INTERFACE, SUPPORT};

#[test]
fn duplicate_name_is_rejected_at_register_time() {
    let mut builder = SchemaBuilder::new();
    builder
        .register_enum(EnumDescriptor::new("test.Color", ["red"]))
        .unwrap();

    let err = builder
        .register_message(MessageDescriptor::message("test.Color"))
        .unwrap_err();

    assert!(matches!(err, SchemaError::DuplicateName(name) if name == "test.Color"));
}

#[test]
fn unresolved_field_reference_fails_finalization() {
    let mut builder = SchemaBuilder::new();
    builder
        .register_message(
            MessageDescriptor::message("test.Holder")
                .field("missing", TypeDescriptor::Message("test.Missing".into())),
        )
        .unwrap();

    let err = builder.finish().unwrap_err();

    assert!(matches!(
        err,
        SchemaError::UnresolvedReference { referrer, referenced }
            if referrer == "test.Holder" && referenced == "test.Missing"
    ));
}

#[test]
fn unresolved_base_reference_fails_finalization() {
    let mut builder = SchemaBuilder::new();
    builder
        .register_message(MessageDescriptor::message("test.Sub").base("test.Missing"))
        .unwrap();

    assert!(matches!(
        builder.finish().unwrap_err(),
        SchemaError::UnresolvedReference { .. }
    ));
}

#[test]
fn cyclic_message_inheritance_is_rejected() {
    let mut builder = SchemaBuilder::new();
    builder
        .register_message(MessageDescriptor::message("test.A").base("test.B"))
        .unwrap();
    builder
        .register_message(MessageDescriptor::message("test.B").base("test.A"))
        .unwrap();

    assert!(matches!(
        builder.finish().unwrap_err(),
        SchemaError::CyclicInheritance(_)
    ));
}

#[test]
fn cyclic_interface_inheritance_is_rejected() {
    let mut builder = SchemaBuilder::new();
    builder
        .register_interface(InterfaceDescriptor::new("test.I").parent("test.J"))
        .unwrap();
    builder
        .register_interface(InterfaceDescriptor::new("test.J").parent("test.I"))
        .unwrap();

    assert!(matches!(
        builder.finish().unwrap_err(),
        SchemaError::CyclicInheritance(_)
    ));
}

#[test]
fn field_redeclared_with_conflicting_type_is_rejected() {
    let mut builder = SchemaBuilder::new();
    builder
        .register_message(MessageDescriptor::message("test.Base").field("f", TypeDescriptor::String))
        .unwrap();
    builder
        .register_message(
            MessageDescriptor::message("test.Sub")
                .base("test.Base")
                .field("f", TypeDescriptor::Int32),
        )
        .unwrap();

    assert!(matches!(
        builder.finish().unwrap_err(),
        SchemaError::FieldTypeConflict { message, field } if message == "test.Sub" && field == "f"
    ));
}

#[test]
fn discriminator_on_missing_field_is_rejected() {
    let mut builder = SchemaBuilder::new();
    builder
        .register_message(
            MessageDescriptor::message("test.Root").discriminator("kind", &[("a", "test.Leaf")]),
        )
        .unwrap();
    builder
        .register_message(MessageDescriptor::message("test.Leaf").base("test.Root"))
        .unwrap();

    assert!(matches!(
        builder.finish().unwrap_err(),
        SchemaError::InvalidDiscriminator { .. }
    ));
}

#[test]
fn discriminator_on_non_enum_field_is_rejected() {
    let mut builder = SchemaBuilder::new();
    builder
        .register_message(
            MessageDescriptor::message("test.Root")
                .field("kind", TypeDescriptor::String)
                .discriminator("kind", &[("a", "test.Leaf")]),
        )
        .unwrap();
    builder
        .register_message(MessageDescriptor::message("test.Leaf").base("test.Root"))
        .unwrap();

    assert!(matches!(
        builder.finish().unwrap_err(),
        SchemaError::InvalidDiscriminator { .. }
    ));
}

#[test]
fn discriminator_key_must_be_a_declared_symbol() {
    let mut builder = SchemaBuilder::new();
    builder
        .register_enum(EnumDescriptor::new("test.Kind", ["a", "b"]))
        .unwrap();
    builder
        .register_message(
            MessageDescriptor::message("test.Root")
                .field("kind", TypeDescriptor::Enum("test.Kind".into()))
                .discriminator("kind", &[("missing", "test.Leaf")]),
        )
        .unwrap();
    builder
        .register_message(MessageDescriptor::message("test.Leaf").base("test.Root"))
        .unwrap();

    assert!(matches!(
        builder.finish().unwrap_err(),
        SchemaError::InvalidDiscriminator { .. }
    ));
}

#[test]
fn discriminator_target_must_be_a_proper_descendant() {
    let mut builder = SchemaBuilder::new();
    builder
        .register_enum(EnumDescriptor::new("test.Kind", ["a"]))
        .unwrap();
    builder
        .register_message(
            MessageDescriptor::message("test.Root")
                .field("kind", TypeDescriptor::Enum("test.Kind".into()))
                .discriminator("kind", &[("a", "test.Unrelated")]),
        )
        .unwrap();
    builder
        .register_message(MessageDescriptor::message("test.Unrelated"))
        .unwrap();

    assert!(matches!(
        builder.finish().unwrap_err(),
        SchemaError::InvalidDiscriminator { .. }
    ));
}

#[test]
fn exception_is_not_a_valid_field_type() {
    let mut builder = SchemaBuilder::new();
    builder
        .register_message(MessageDescriptor::exception("test.Oops"))
        .unwrap();
    builder
        .register_message(
            MessageDescriptor::message("test.Holder")
                .field("oops", TypeDescriptor::Message("test.Oops".into())),
        )
        .unwrap();

    assert!(matches!(
        builder.finish().unwrap_err(),
        SchemaError::InvalidFieldType { .. }
    ));
}

#[test]
fn map_keys_are_restricted_to_totally_equal_kinds() {
    let mut builder = SchemaBuilder::new();
    builder
        .register_message(MessageDescriptor::message("test.Holder").field(
            "weights",
            TypeDescriptor::map(TypeDescriptor::Double, TypeDescriptor::String),
        ))
        .unwrap();

    assert!(matches!(
        builder.finish().unwrap_err(),
        SchemaError::InvalidMapKey { .. }
    ));
}

#[test]
fn resolve_fails_for_unknown_names() {
    let registry = sample_schema::registry();

    assert!(matches!(
        registry.resolve("test.Nope").unwrap_err(),
        SchemaError::UnknownType(name) if name == "test.Nope"
    ));
}

#[test]
fn builtin_internal_error_exception_is_registered() {
    let registry = sample_schema::registry();

    let resolved = registry
        .message(chimera_core::schema::INTERNAL_ERROR_TYPE)
        .expect("builtin exception registered");

    assert_eq!(resolved.kind(), MessageKind::Exception);
    assert!(resolved.field(EXCEPTION_CODE_FIELD).is_some());
}

#[test]
fn flattened_table_is_the_union_of_parents_and_own_methods() {
    let registry = sample_schema::registry();

    let table = registry.method_table(SUB_INTERFACE).unwrap();
    let names: Vec<&str> = table.methods().iter().map(|m| m.name()).collect();

    assert_eq!(names, ["method", "sum", "echo", "call_support", "submethod"]);
    assert!(table.lookup("sum").is_ok());
    assert!(table.lookup("nope").is_err());
}

#[test]
fn parent_tables_are_unaffected_by_sub_interfaces() {
    let registry = sample_schema::registry();

    assert_eq!(registry.method_table(INTERFACE).unwrap().methods().len(), 3);
    assert_eq!(registry.method_table(SUPPORT).unwrap().methods().len(), 1);
}

#[test]
fn diamond_inheritance_dedups_identical_methods() {
    let mut builder = SchemaBuilder::new();
    builder
        .register_interface(
            InterfaceDescriptor::new("test.Base")
                .method(MethodDescriptor::new("ping", ResultKind::Void)),
        )
        .unwrap();
    builder
        .register_interface(InterfaceDescriptor::new("test.Left").parent("test.Base"))
        .unwrap();
    builder
        .register_interface(InterfaceDescriptor::new("test.Right").parent("test.Base"))
        .unwrap();
    builder
        .register_interface(
            InterfaceDescriptor::new("test.Join")
                .parent("test.Left")
                .parent("test.Right"),
        )
        .unwrap();

    let registry = builder.finish().unwrap();

    assert_eq!(registry.method_table("test.Join").unwrap().methods().len(), 1);
}

#[test]
fn conflicting_inherited_signatures_are_rejected() {
    let mut builder = SchemaBuilder::new();
    builder
        .register_interface(
            InterfaceDescriptor::new("test.Left").method(
                MethodDescriptor::new("foo", ResultKind::Value(TypeDescriptor::String))
                    .param("arg", TypeDescriptor::Int32),
            ),
        )
        .unwrap();
    builder
        .register_interface(
            InterfaceDescriptor::new("test.Right").method(
                MethodDescriptor::new("foo", ResultKind::Value(TypeDescriptor::String))
                    .param("arg", TypeDescriptor::String),
            ),
        )
        .unwrap();
    builder
        .register_interface(
            InterfaceDescriptor::new("test.Join")
                .parent("test.Left")
                .parent("test.Right"),
        )
        .unwrap();

    assert!(matches!(
        builder.finish().unwrap_err(),
        SchemaError::ConflictingMethod { interface, method }
            if interface == "test.Join" && method == "foo"
    ));
}
