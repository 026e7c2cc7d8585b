//! # Type Registry
//!
//! The registry is the single lookup authority for named types. It is built
//! once through a [`SchemaBuilder`], finalized in a single-threaded pass, and
//! thereafter immutable: callers share it freely behind an `Arc` without any
//! locking.
//!
//! ## Finalization
//!
//! `SchemaBuilder::finish` verifies the whole schema before any descriptor
//! becomes visible:
//!
//! * every referenced name resolves to a registered type of the right kind,
//! * message and interface inheritance graphs are acyclic,
//! * no subtype redeclares an ancestor field with a conflicting type,
//! * discriminator declarations are sound (enum-typed field, declared
//!   symbols, unique keys, proper-descendant targets),
//! * map keys are totally-equal scalar kinds,
//! * exceptions never appear as ordinary field values,
//! * every interface flattens into a conflict-free method table.
//!
//! Finalization also precomputes the flattened, ancestor-to-descendant field
//! list of every message, which is what the codec iterates at runtime.
use super::dispatch::MethodTable;
use super::types::{
    EnumDescriptor, FieldDescriptor, InterfaceDescriptor, MessageDescriptor, MessageKind,
    ResultKind, TypeDescriptor, TypeName,
};
use std::collections::{HashMap, HashSet};

/// Name of the builtin exception used to wrap non-domain handler failures.
pub const INTERNAL_ERROR_TYPE: &str = "chimera.InternalError";

/// Fatal schema-load errors. Never recovered; surfaced to the loader.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("duplicate type name '{0}'")]
    DuplicateName(String),
    #[error("type '{referrer}' references unknown type '{referenced}'")]
    UnresolvedReference { referrer: String, referenced: String },
    #[error("unknown type '{0}'")]
    UnknownType(String),
    #[error("cyclic inheritance involving '{0}'")]
    CyclicInheritance(String),
    #[error("interface '{interface}' has conflicting declarations of method '{method}'")]
    ConflictingMethod { interface: String, method: String },
    #[error("message '{message}' declares field '{field}' with a type conflicting an ancestor declaration")]
    FieldTypeConflict { message: String, field: String },
    #[error("invalid field '{field}' in type '{message}': {reason}")]
    InvalidFieldType {
        message: String,
        field: String,
        reason: String,
    },
    #[error("invalid discriminator on message '{message}': {reason}")]
    InvalidDiscriminator { message: String, reason: String },
    #[error("invalid map key type '{key}' in type '{referrer}'")]
    InvalidMapKey { referrer: String, key: String },
}

/// A message field as seen through the flattened, resolved view: its
/// descriptor plus the type that declared it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedField {
    field: FieldDescriptor,
    declared_by: TypeName,
}

impl ResolvedField {
    pub fn name(&self) -> &str {
        self.field.name()
    }

    pub fn ty(&self) -> &TypeDescriptor {
        self.field.ty()
    }

    /// The message type this field was declared in.
    pub fn declared_by(&self) -> &str {
        &self.declared_by
    }
}

/// A message descriptor after finalization: the declared form plus the
/// flattened field list and the resolved base chain.
#[derive(Debug, Clone)]
pub struct ResolvedMessage {
    desc: MessageDescriptor,
    /// All fields, ancestor-to-descendant declaration order.
    fields: Vec<ResolvedField>,
    /// Base chain, nearest ancestor first.
    ancestors: Vec<TypeName>,
}

impl ResolvedMessage {
    pub fn name(&self) -> &str {
        self.desc.name()
    }

    pub fn kind(&self) -> MessageKind {
        self.desc.kind()
    }

    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.desc
    }

    /// The full field set including inherited fields, in
    /// ancestor-to-descendant declaration order.
    pub fn fields(&self) -> &[ResolvedField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&ResolvedField> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// The base chain, nearest ancestor first.
    pub fn ancestors(&self) -> &[TypeName] {
        &self.ancestors
    }
}

/// An interface descriptor after finalization, with its flattened,
/// conflict-free method table.
#[derive(Debug, Clone)]
pub struct ResolvedInterface {
    desc: InterfaceDescriptor,
    table: MethodTable,
}

impl ResolvedInterface {
    pub fn name(&self) -> &str {
        self.desc.name()
    }

    pub fn descriptor(&self) -> &InterfaceDescriptor {
        &self.desc
    }

    pub fn method_table(&self) -> &MethodTable {
        &self.table
    }
}

/// A generic wrapper for the different resolved descriptor kinds.
///
/// Allows [`TypeRegistry::resolve`] to return a single type regardless of
/// whether a name points at an enum, a message or an interface.
#[derive(Debug, Clone, Copy)]
pub enum Descriptor<'a> {
    Enum(&'a EnumDescriptor),
    Message(&'a ResolvedMessage),
    Interface(&'a ResolvedInterface),
}

impl Descriptor<'_> {
    pub fn name(&self) -> &str {
        match self {
            Descriptor::Enum(d) => d.name(),
            Descriptor::Message(d) => d.name(),
            Descriptor::Interface(d) => d.name(),
        }
    }
}

/// Collects raw descriptors and finalizes them into a [`TypeRegistry`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    enums: Vec<EnumDescriptor>,
    messages: Vec<MessageDescriptor>,
    interfaces: Vec<InterfaceDescriptor>,
    names: HashSet<TypeName>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an enum. Fails if the name is already bound.
    pub fn register_enum(&mut self, desc: EnumDescriptor) -> Result<(), SchemaError> {
        self.claim_name(desc.name())?;
        self.enums.push(desc);
        Ok(())
    }

    /// Registers a message or exception. Fails if the name is already bound.
    pub fn register_message(&mut self, desc: MessageDescriptor) -> Result<(), SchemaError> {
        self.claim_name(desc.name())?;
        self.messages.push(desc);
        Ok(())
    }

    /// Registers an interface. Fails if the name is already bound.
    pub fn register_interface(&mut self, desc: InterfaceDescriptor) -> Result<(), SchemaError> {
        self.claim_name(desc.name())?;
        self.interfaces.push(desc);
        Ok(())
    }

    fn claim_name(&mut self, name: &str) -> Result<(), SchemaError> {
        if !self.names.insert(name.to_string()) {
            return Err(SchemaError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    /// Runs the finalization pass and returns the immutable registry.
    pub fn finish(mut self) -> Result<TypeRegistry, SchemaError> {
        if !self.names.contains(INTERNAL_ERROR_TYPE) {
            self.register_message(
                MessageDescriptor::exception(INTERNAL_ERROR_TYPE)
                    .field("message", TypeDescriptor::String),
            )?;
        }

        let enums: HashMap<TypeName, EnumDescriptor> = self
            .enums
            .into_iter()
            .map(|e| (e.name().to_string(), e))
            .collect();
        let raw_messages: HashMap<TypeName, MessageDescriptor> = self
            .messages
            .into_iter()
            .map(|m| (m.name().to_string(), m))
            .collect();
        let raw_interfaces: HashMap<TypeName, InterfaceDescriptor> = self
            .interfaces
            .into_iter()
            .map(|i| (i.name().to_string(), i))
            .collect();

        check_enums(&enums)?;
        check_message_references(&raw_messages, &enums)?;
        check_message_cycles(&raw_messages)?;
        check_field_conflicts(&raw_messages)?;
        let raw_messages = check_discriminators(raw_messages, &enums)?;
        check_interface_references(&raw_interfaces, &enums, &raw_messages)?;
        check_interface_cycles(&raw_interfaces)?;

        let messages = resolve_messages(raw_messages);
        let interfaces = resolve_interfaces(raw_interfaces)?;

        tracing::debug!(
            enums = enums.len(),
            messages = messages.len(),
            interfaces = interfaces.len(),
            "schema finalized"
        );

        Ok(TypeRegistry {
            enums,
            messages,
            interfaces,
        })
    }
}

/// The immutable, finalized set of type descriptors.
#[derive(Debug)]
pub struct TypeRegistry {
    enums: HashMap<TypeName, EnumDescriptor>,
    messages: HashMap<TypeName, ResolvedMessage>,
    interfaces: HashMap<TypeName, ResolvedInterface>,
}

impl TypeRegistry {
    /// Looks up any named type.
    pub fn resolve(&self, name: &str) -> Result<Descriptor<'_>, SchemaError> {
        if let Some(d) = self.enums.get(name) {
            return Ok(Descriptor::Enum(d));
        }
        if let Some(d) = self.messages.get(name) {
            return Ok(Descriptor::Message(d));
        }
        if let Some(d) = self.interfaces.get(name) {
            return Ok(Descriptor::Interface(d));
        }
        Err(SchemaError::UnknownType(name.to_string()))
    }

    pub fn enum_type(&self, name: &str) -> Option<&EnumDescriptor> {
        self.enums.get(name)
    }

    pub fn message(&self, name: &str) -> Option<&ResolvedMessage> {
        self.messages.get(name)
    }

    pub fn interface(&self, name: &str) -> Option<&ResolvedInterface> {
        self.interfaces.get(name)
    }

    /// The flattened method table of an interface.
    pub fn method_table(&self, interface: &str) -> Result<&MethodTable, SchemaError> {
        self.interfaces
            .get(interface)
            .map(ResolvedInterface::method_table)
            .ok_or_else(|| SchemaError::UnknownType(interface.to_string()))
    }

    /// Whether `name` is `ancestor` itself or inherits from it.
    pub fn is_descendant_or_equal(&self, name: &str, ancestor: &str) -> bool {
        if name == ancestor {
            return true;
        }
        self.messages
            .get(name)
            .is_some_and(|m| m.ancestors().iter().any(|a| a == ancestor))
    }

    /// Inheritance depth of a message (number of ancestors).
    pub(crate) fn depth(&self, name: &str) -> usize {
        self.messages.get(name).map_or(0, |m| m.ancestors().len())
    }
}

fn check_enums(enums: &HashMap<TypeName, EnumDescriptor>) -> Result<(), SchemaError> {
    for desc in enums.values() {
        let mut seen = HashSet::new();
        for symbol in desc.symbols() {
            if !seen.insert(symbol.to_ascii_lowercase()) {
                return Err(SchemaError::DuplicateName(format!(
                    "{}.{symbol}",
                    desc.name()
                )));
            }
        }
    }
    Ok(())
}

/// Validates a type reference appearing in a data position (field, parameter
/// or result). Interfaces are not data; exceptions travel only on the error
/// channel.
fn check_data_type(
    referrer: &str,
    field: &str,
    ty: &TypeDescriptor,
    enums: &HashMap<TypeName, EnumDescriptor>,
    messages: &HashMap<TypeName, MessageDescriptor>,
) -> Result<(), SchemaError> {
    let unresolved = |referenced: &str| SchemaError::UnresolvedReference {
        referrer: referrer.to_string(),
        referenced: referenced.to_string(),
    };
    match ty {
        TypeDescriptor::Enum(name) => {
            if !enums.contains_key(name) {
                return Err(unresolved(name));
            }
        }
        TypeDescriptor::Message(name) => match messages.get(name) {
            None => return Err(unresolved(name)),
            Some(m) if m.kind() == MessageKind::Exception => {
                return Err(SchemaError::InvalidFieldType {
                    message: referrer.to_string(),
                    field: field.to_string(),
                    reason: format!("'{name}' is an exception, not a data type"),
                });
            }
            Some(_) => {}
        },
        TypeDescriptor::Exception(name) => {
            if !messages.contains_key(name) {
                return Err(unresolved(name));
            }
            return Err(SchemaError::InvalidFieldType {
                message: referrer.to_string(),
                field: field.to_string(),
                reason: format!("exception '{name}' cannot be used as a data type"),
            });
        }
        TypeDescriptor::Interface(name) => {
            return Err(SchemaError::InvalidFieldType {
                message: referrer.to_string(),
                field: field.to_string(),
                reason: format!("interface '{name}' cannot be used as a data type"),
            });
        }
        TypeDescriptor::List(elem) | TypeDescriptor::Set(elem) => {
            check_data_type(referrer, field, elem, enums, messages)?;
        }
        TypeDescriptor::Map(key, value) => {
            if !key.valid_map_key() {
                return Err(SchemaError::InvalidMapKey {
                    referrer: referrer.to_string(),
                    key: key.kind_label().to_string(),
                });
            }
            check_data_type(referrer, field, key, enums, messages)?;
            check_data_type(referrer, field, value, enums, messages)?;
        }
        _ => {}
    }
    Ok(())
}

fn check_message_references(
    messages: &HashMap<TypeName, MessageDescriptor>,
    enums: &HashMap<TypeName, EnumDescriptor>,
) -> Result<(), SchemaError> {
    for desc in messages.values() {
        if let Some(base) = desc.base_name() {
            match messages.get(base) {
                None => {
                    return Err(SchemaError::UnresolvedReference {
                        referrer: desc.name().to_string(),
                        referenced: base.to_string(),
                    });
                }
                Some(b) if b.kind() != desc.kind() => {
                    return Err(SchemaError::InvalidFieldType {
                        message: desc.name().to_string(),
                        field: String::new(),
                        reason: format!("base '{base}' is a different message kind"),
                    });
                }
                Some(_) => {}
            }
        }
        for field in desc.declared_fields() {
            check_data_type(desc.name(), field.name(), field.ty(), enums, messages)?;
        }
    }
    Ok(())
}

fn check_message_cycles(
    messages: &HashMap<TypeName, MessageDescriptor>,
) -> Result<(), SchemaError> {
    for desc in messages.values() {
        let mut seen = HashSet::new();
        let mut current = desc.name();
        seen.insert(current);
        while let Some(base) = messages.get(current).and_then(MessageDescriptor::base_name) {
            if !seen.insert(base) {
                return Err(SchemaError::CyclicInheritance(desc.name().to_string()));
            }
            current = base;
        }
    }
    Ok(())
}

fn check_field_conflicts(
    messages: &HashMap<TypeName, MessageDescriptor>,
) -> Result<(), SchemaError> {
    for desc in messages.values() {
        // Within one declaration.
        let mut declared = HashMap::new();
        for field in desc.declared_fields() {
            if let Some(prev) = declared.insert(field.name(), field.ty())
                && prev != field.ty()
            {
                return Err(SchemaError::FieldTypeConflict {
                    message: desc.name().to_string(),
                    field: field.name().to_string(),
                });
            }
        }
        // Against every ancestor.
        let mut current = desc.base_name();
        while let Some(ancestor) = current.and_then(|b| messages.get(b)) {
            for field in desc.declared_fields() {
                if let Some(inherited) = ancestor
                    .declared_fields()
                    .iter()
                    .find(|f| f.name() == field.name())
                    && inherited.ty() != field.ty()
                {
                    return Err(SchemaError::FieldTypeConflict {
                        message: desc.name().to_string(),
                        field: field.name().to_string(),
                    });
                }
            }
            current = ancestor.base_name();
        }
    }
    Ok(())
}

/// Validates discriminator declarations and canonicalizes mapping keys to the
/// declared enum spelling.
fn check_discriminators(
    mut messages: HashMap<TypeName, MessageDescriptor>,
    enums: &HashMap<TypeName, EnumDescriptor>,
) -> Result<HashMap<TypeName, MessageDescriptor>, SchemaError> {
    let names: Vec<TypeName> = messages.keys().cloned().collect();
    for name in names {
        let desc = &messages[&name];
        let Some(disc) = desc.discriminator_decl().cloned() else {
            continue;
        };
        let invalid = |reason: String| SchemaError::InvalidDiscriminator {
            message: name.clone(),
            reason,
        };

        // The field may be declared here or inherited from any ancestor.
        let field_ty = find_field_in_chain(&messages, &name, disc.field())
            .ok_or_else(|| invalid(format!("field '{}' does not exist", disc.field())))?;
        let TypeDescriptor::Enum(enum_name) = field_ty else {
            return Err(invalid(format!("field '{}' is not enum-typed", disc.field())));
        };
        let enum_desc = enums
            .get(&enum_name)
            .ok_or_else(|| invalid(format!("enum '{enum_name}' is not registered")))?;

        let mut keys = HashSet::new();
        for (key, target) in disc.mapping() {
            let canonical = enum_desc
                .find_symbol(key)
                .ok_or_else(|| invalid(format!("'{key}' is not a symbol of '{enum_name}'")))?;
            if !keys.insert(canonical.to_string()) {
                return Err(invalid(format!("duplicate mapping key '{canonical}'")));
            }
            if !is_proper_descendant(&messages, target, &name) {
                return Err(invalid(format!(
                    "target '{target}' is not a proper descendant"
                )));
            }
        }

        let desc = messages.get_mut(&name).expect("name listed above");
        if let Some(disc) = desc.discriminator_mut() {
            disc.canonicalize_keys(enum_desc);
        }
    }
    Ok(messages)
}

fn find_field_in_chain(
    messages: &HashMap<TypeName, MessageDescriptor>,
    name: &str,
    field: &str,
) -> Option<TypeDescriptor> {
    let mut current = Some(name);
    while let Some(desc) = current.and_then(|n| messages.get(n)) {
        if let Some(f) = desc.declared_fields().iter().find(|f| f.name() == field) {
            return Some(f.ty().clone());
        }
        current = desc.base_name();
    }
    None
}

fn is_proper_descendant(
    messages: &HashMap<TypeName, MessageDescriptor>,
    name: &str,
    ancestor: &str,
) -> bool {
    if name == ancestor {
        return false;
    }
    let mut current = messages.get(name).and_then(MessageDescriptor::base_name);
    while let Some(base) = current {
        if base == ancestor {
            return true;
        }
        current = messages.get(base).and_then(MessageDescriptor::base_name);
    }
    false
}

fn check_interface_references(
    interfaces: &HashMap<TypeName, InterfaceDescriptor>,
    enums: &HashMap<TypeName, EnumDescriptor>,
    messages: &HashMap<TypeName, MessageDescriptor>,
) -> Result<(), SchemaError> {
    for desc in interfaces.values() {
        for parent in desc.parents() {
            if !interfaces.contains_key(parent) {
                return Err(SchemaError::UnresolvedReference {
                    referrer: desc.name().to_string(),
                    referenced: parent.to_string(),
                });
            }
        }
        for method in desc.declared_methods() {
            for param in method.params() {
                check_data_type(desc.name(), param.name(), param.ty(), enums, messages)?;
            }
            match method.result() {
                ResultKind::Void => {}
                ResultKind::Value(ty) | ResultKind::Stream(ty) => {
                    check_data_type(desc.name(), method.name(), ty, enums, messages)?;
                }
            }
        }
    }
    Ok(())
}

fn check_interface_cycles(
    interfaces: &HashMap<TypeName, InterfaceDescriptor>,
) -> Result<(), SchemaError> {
    fn visit<'a>(
        name: &'a str,
        interfaces: &'a HashMap<TypeName, InterfaceDescriptor>,
        in_progress: &mut HashSet<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Result<(), SchemaError> {
        if done.contains(name) {
            return Ok(());
        }
        if !in_progress.insert(name) {
            return Err(SchemaError::CyclicInheritance(name.to_string()));
        }
        if let Some(desc) = interfaces.get(name) {
            for parent in desc.parents() {
                visit(parent, interfaces, in_progress, done)?;
            }
        }
        in_progress.remove(name);
        done.insert(name);
        Ok(())
    }

    let mut done = HashSet::new();
    for name in interfaces.keys() {
        visit(name, interfaces, &mut HashSet::new(), &mut done)?;
    }
    Ok(())
}

fn resolve_messages(
    raw: HashMap<TypeName, MessageDescriptor>,
) -> HashMap<TypeName, ResolvedMessage> {
    let mut resolved = HashMap::with_capacity(raw.len());
    for name in raw.keys() {
        // Base chain, nearest ancestor first. Cycles were rejected earlier.
        let mut ancestors = Vec::new();
        let mut current = raw[name].base_name();
        while let Some(base) = current {
            ancestors.push(base.to_string());
            current = raw.get(base).and_then(MessageDescriptor::base_name);
        }

        // Fields in ancestor-to-descendant declaration order, inherited
        // declarations winning over same-type redeclarations.
        let mut fields: Vec<ResolvedField> = Vec::new();
        for ty_name in ancestors.iter().rev().chain(std::iter::once(name)) {
            for field in raw[ty_name.as_str()].declared_fields() {
                if fields.iter().any(|f| f.name() == field.name()) {
                    continue;
                }
                fields.push(ResolvedField {
                    field: field.clone(),
                    declared_by: ty_name.clone(),
                });
            }
        }

        resolved.insert(
            name.clone(),
            ResolvedMessage {
                desc: raw[name].clone(),
                fields,
                ancestors,
            },
        );
    }
    resolved
}

fn resolve_interfaces(
    raw: HashMap<TypeName, InterfaceDescriptor>,
) -> Result<HashMap<TypeName, ResolvedInterface>, SchemaError> {
    let mut resolved = HashMap::with_capacity(raw.len());
    for (name, desc) in &raw {
        let table = MethodTable::flatten(desc, &raw)?;
        tracing::trace!(
            interface = %name,
            methods = table.methods().len(),
            "interface flattened"
        );
        resolved.insert(
            name.clone(),
            ResolvedInterface {
                desc: desc.clone(),
                table,
            },
        );
    }
    Ok(resolved)
}
