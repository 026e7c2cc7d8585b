//! # Descriptor Model
//!
//! Plain, owned data structures describing a schema: primitive and collection
//! type references, enums, messages (with optional single inheritance and an
//! optional discriminator declaration), exceptions and interfaces.
//!
//! Descriptors reference each other **by name**. A descriptor on its own is
//! just data; names are bound and validated by the
//! [`registry`](super::registry) during finalization, which is also where the
//! flattened field and method views are computed.

/// A fully qualified type name, e.g. `my.package.Message`.
pub type TypeName = String;

/// A reference to a value type, as used by fields, parameters and results.
///
/// Primitives and collections are structural; enums, messages, exceptions and
/// interfaces are referenced by name and resolved through the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDescriptor {
    Bool,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    /// Arbitrary-precision decimal, represented as an exact literal.
    Decimal,
    Date,
    Datetime,
    String,
    Uuid,
    /// An opaque value carried through the codec untouched.
    Object,
    List(Box<TypeDescriptor>),
    Set(Box<TypeDescriptor>),
    Map(Box<TypeDescriptor>, Box<TypeDescriptor>),
    Enum(TypeName),
    Message(TypeName),
    Exception(TypeName),
    Interface(TypeName),
}

impl TypeDescriptor {
    /// Convenience constructor for `List` with less boxing noise.
    pub fn list(element: TypeDescriptor) -> Self {
        TypeDescriptor::List(Box::new(element))
    }

    /// Convenience constructor for `Set`.
    pub fn set(element: TypeDescriptor) -> Self {
        TypeDescriptor::Set(Box::new(element))
    }

    /// Convenience constructor for `Map`.
    pub fn map(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        TypeDescriptor::Map(Box::new(key), Box::new(value))
    }

    /// Returns the referenced type name for named variants.
    pub fn type_name(&self) -> Option<&str> {
        match self {
            TypeDescriptor::Enum(name)
            | TypeDescriptor::Message(name)
            | TypeDescriptor::Exception(name)
            | TypeDescriptor::Interface(name) => Some(name),
            _ => None,
        }
    }

    /// A short human-readable kind label used in error messages.
    pub fn kind_label(&self) -> &'static str {
        match self {
            TypeDescriptor::Bool => "bool",
            TypeDescriptor::Int16 => "int16",
            TypeDescriptor::Int32 => "int32",
            TypeDescriptor::Int64 => "int64",
            TypeDescriptor::Float => "float",
            TypeDescriptor::Double => "double",
            TypeDescriptor::Decimal => "decimal",
            TypeDescriptor::Date => "date",
            TypeDescriptor::Datetime => "datetime",
            TypeDescriptor::String => "string",
            TypeDescriptor::Uuid => "uuid",
            TypeDescriptor::Object => "object",
            TypeDescriptor::List(_) => "list",
            TypeDescriptor::Set(_) => "set",
            TypeDescriptor::Map(..) => "map",
            TypeDescriptor::Enum(_) => "enum",
            TypeDescriptor::Message(_) => "message",
            TypeDescriptor::Exception(_) => "exception",
            TypeDescriptor::Interface(_) => "interface",
        }
    }

    /// Whether this type is usable as a map key.
    ///
    /// Map keys require total equality independent of ordering: booleans,
    /// integrals, strings, uuids, dates and enum symbols qualify.
    pub fn valid_map_key(&self) -> bool {
        matches!(
            self,
            TypeDescriptor::Bool
                | TypeDescriptor::Int16
                | TypeDescriptor::Int32
                | TypeDescriptor::Int64
                | TypeDescriptor::String
                | TypeDescriptor::Uuid
                | TypeDescriptor::Date
                | TypeDescriptor::Enum(_)
        )
    }
}

/// An ordered sequence of distinct symbol names.
///
/// Symbol equality is by identity, not position; decoding matches symbols
/// case-insensitively and canonicalizes to the declared spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDescriptor {
    name: TypeName,
    symbols: Vec<String>,
}

impl EnumDescriptor {
    pub fn new(name: impl Into<TypeName>, symbols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Resolves a raw symbol to its declared spelling, ignoring case.
    pub fn find_symbol(&self, raw: &str) -> Option<&str> {
        self.symbols
            .iter()
            .find(|s| s.eq_ignore_ascii_case(raw))
            .map(String::as_str)
    }
}

/// A single message field: a name and a value type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    name: String,
    ty: TypeDescriptor,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self { name: name.into(), ty }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &TypeDescriptor {
        &self.ty
    }
}

/// Distinguishes ordinary messages from exceptions.
///
/// Exceptions travel exclusively on the RPC error channel and are rejected as
/// ordinary field values during schema finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Message,
    Exception,
}

/// A discriminator declaration: the field whose value selects the concrete
/// subtype, plus the ordered mapping from enum symbol to subtype name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discriminator {
    field: String,
    mapping: Vec<(String, TypeName)>,
}

impl Discriminator {
    pub fn new(field: impl Into<String>, mapping: &[(&str, &str)]) -> Self {
        Self {
            field: field.into(),
            mapping: mapping
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn mapping(&self) -> &[(String, TypeName)] {
        &self.mapping
    }

    /// Looks up the subtype mapped to a symbol, ignoring case.
    pub fn subtype(&self, symbol: &str) -> Option<&str> {
        self.mapping
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(symbol))
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn canonicalize_keys(&mut self, symbols: &EnumDescriptor) {
        for (key, _) in &mut self.mapping {
            if let Some(canonical) = symbols.find_symbol(key) {
                *key = canonical.to_string();
            }
        }
    }
}

/// A message or exception type: name, optional base (single inheritance),
/// declared fields and an optional discriminator declaration.
///
/// A message is a *polymorphic root* iff it declares a discriminator mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDescriptor {
    name: TypeName,
    kind: MessageKind,
    base: Option<TypeName>,
    fields: Vec<FieldDescriptor>,
    discriminator: Option<Discriminator>,
}

/// Name of the implicit `code` field every exception carries.
pub const EXCEPTION_CODE_FIELD: &str = "code";

impl MessageDescriptor {
    /// Creates an ordinary message descriptor with no fields.
    pub fn message(name: impl Into<TypeName>) -> Self {
        Self {
            name: name.into(),
            kind: MessageKind::Message,
            base: None,
            fields: Vec::new(),
            discriminator: None,
        }
    }

    /// Creates an exception descriptor.
    ///
    /// The implicit `code: string` field is prepended so every exception value
    /// can be pattern-matched on shape.
    pub fn exception(name: impl Into<TypeName>) -> Self {
        Self {
            name: name.into(),
            kind: MessageKind::Exception,
            base: None,
            fields: vec![FieldDescriptor::new(EXCEPTION_CODE_FIELD, TypeDescriptor::String)],
            discriminator: None,
        }
    }

    /// Sets the base message this one inherits from.
    pub fn base(mut self, base: impl Into<TypeName>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Appends a declared field.
    pub fn field(mut self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        self.fields.push(FieldDescriptor::new(name, ty));
        self
    }

    /// Declares the discriminator field and its symbol-to-subtype mapping,
    /// turning this message into a polymorphic root.
    pub fn discriminator(mut self, field: impl Into<String>, mapping: &[(&str, &str)]) -> Self {
        self.discriminator = Some(Discriminator::new(field, mapping));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn base_name(&self) -> Option<&str> {
        self.base.as_deref()
    }

    /// The fields declared by this type itself, excluding inherited ones.
    pub fn declared_fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn discriminator_decl(&self) -> Option<&Discriminator> {
        self.discriminator.as_ref()
    }

    pub(crate) fn discriminator_mut(&mut self) -> Option<&mut Discriminator> {
        self.discriminator.as_mut()
    }
}

/// How a method produces its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultKind {
    /// No payload; completion is signalled with a unit sentinel value.
    Void,
    /// A single value of the given type.
    Value(TypeDescriptor),
    /// An open-ended, ordered sequence of values of the given type.
    Stream(TypeDescriptor),
}

/// A single method parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDescriptor {
    name: String,
    ty: TypeDescriptor,
}

impl ParamDescriptor {
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self { name: name.into(), ty }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &TypeDescriptor {
        &self.ty
    }
}

/// An interface method: name, ordered parameters and a result kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    name: String,
    params: Vec<ParamDescriptor>,
    result: ResultKind,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>, result: ResultKind) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            result,
        }
    }

    /// Appends a parameter.
    pub fn param(mut self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        self.params.push(ParamDescriptor::new(name, ty));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[ParamDescriptor] {
        &self.params
    }

    pub fn result(&self) -> &ResultKind {
        &self.result
    }

    /// Whether two declarations of the same method name are compatible.
    ///
    /// Identical parameter lists and result kinds de-duplicate during
    /// flattening; anything else is a conflict.
    pub fn same_signature(&self, other: &MethodDescriptor) -> bool {
        self.params == other.params && self.result == other.result
    }
}

/// An interface: name, parent interfaces (multiple inheritance permitted) and
/// declared methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    name: TypeName,
    parents: Vec<TypeName>,
    methods: Vec<MethodDescriptor>,
}

impl InterfaceDescriptor {
    pub fn new(name: impl Into<TypeName>) -> Self {
        Self {
            name: name.into(),
            parents: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Adds a parent interface.
    pub fn parent(mut self, parent: impl Into<TypeName>) -> Self {
        self.parents.push(parent.into());
        self
    }

    /// Appends a declared method.
    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parents(&self) -> &[TypeName] {
        &self.parents
    }

    pub fn declared_methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }
}
