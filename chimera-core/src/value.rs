//! # Value Model
//!
//! The in-memory representation of a typed value, shared by the codec and the
//! invoker. A `Value` mirrors the descriptor taxonomy: scalars, enum symbols,
//! collections, and message instances that remember both their declared and
//! their actual (possibly more derived) type.
//!
//! Values are single-owner and never mutated after construction; re-encoding
//! always produces a fresh field stream.
use crate::codec::token::Token;
use crate::schema::{TypeDescriptor, TypeName, TypeRegistry};
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// A runtime value of some schema type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    /// Exact decimal literal, normalized but otherwise preserved verbatim.
    Decimal(String),
    Date(NaiveDate),
    Datetime(DateTime<Utc>),
    String(String),
    Uuid(Uuid),
    /// Opaque token carried through the codec untouched.
    Object(Token),
    Enum(EnumValue),
    List(Vec<Value>),
    /// Distinct elements, first-occurrence order.
    Set(Vec<Value>),
    /// Ordered entries, unique keys, first-insertion order.
    Map(Vec<(MapKey, Value)>),
    Message(MessageValue),
    /// The Void result sentinel.
    Unit,
}

impl Value {
    /// Builds a set value, collapsing duplicates by equality.
    pub fn set_of(elements: impl IntoIterator<Item = Value>) -> Value {
        let mut distinct: Vec<Value> = Vec::new();
        for element in elements {
            if !distinct.contains(&element) {
                distinct.push(element);
            }
        }
        Value::Set(distinct)
    }

    /// Builds a map value; duplicate keys keep the last value at the first
    /// occurrence's position.
    pub fn map_of(entries: impl IntoIterator<Item = (MapKey, Value)>) -> Value {
        let mut unique: Vec<(MapKey, Value)> = Vec::new();
        for (key, value) in entries {
            if let Some(slot) = unique.iter_mut().find(|(k, _)| *k == key) {
                slot.1 = value;
            } else {
                unique.push((key, value));
            }
        }
        Value::Map(unique)
    }

    /// A short label for error messages.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int16(_) => "int16",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Decimal(_) => "decimal",
            Value::Date(_) => "date",
            Value::Datetime(_) => "datetime",
            Value::String(_) => "string",
            Value::Uuid(_) => "uuid",
            Value::Object(_) => "object",
            Value::Enum(_) => "enum",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Message(_) => "message",
            Value::Unit => "unit",
        }
    }

    /// Returns the message payload if this value is a message.
    pub fn as_message(&self) -> Option<&MessageValue> {
        match self {
            Value::Message(m) => Some(m),
            _ => None,
        }
    }
}

/// An enum symbol together with the enum type it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    pub enum_type: TypeName,
    pub symbol: String,
}

impl EnumValue {
    pub fn new(enum_type: impl Into<TypeName>, symbol: impl Into<String>) -> Self {
        Self {
            enum_type: enum_type.into(),
            symbol: symbol.into(),
        }
    }
}

/// A map key. Restricted to kinds with total equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapKey {
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    String(String),
    Uuid(Uuid),
    Date(NaiveDate),
    /// An enum symbol in its declared spelling.
    Enum(String),
}

impl MapKey {
    /// Converts a decoded value into a map key; `None` for kinds that cannot
    /// key a map.
    pub fn from_value(value: Value) -> Option<MapKey> {
        match value {
            Value::Bool(v) => Some(MapKey::Bool(v)),
            Value::Int16(v) => Some(MapKey::Int16(v)),
            Value::Int32(v) => Some(MapKey::Int32(v)),
            Value::Int64(v) => Some(MapKey::Int64(v)),
            Value::String(v) => Some(MapKey::String(v)),
            Value::Uuid(v) => Some(MapKey::Uuid(v)),
            Value::Date(v) => Some(MapKey::Date(v)),
            Value::Enum(v) => Some(MapKey::Enum(v.symbol)),
            _ => None,
        }
    }

    /// Whether this key matches the declared key descriptor's kind.
    pub fn matches(&self, ty: &TypeDescriptor) -> bool {
        matches!(
            (self, ty),
            (MapKey::Bool(_), TypeDescriptor::Bool)
                | (MapKey::Int16(_), TypeDescriptor::Int16)
                | (MapKey::Int32(_), TypeDescriptor::Int32)
                | (MapKey::Int64(_), TypeDescriptor::Int64)
                | (MapKey::String(_), TypeDescriptor::String)
                | (MapKey::Uuid(_), TypeDescriptor::Uuid)
                | (MapKey::Date(_), TypeDescriptor::Date)
                | (MapKey::Enum(_), TypeDescriptor::Enum(_))
        )
    }
}

/// A message instance: its declared static type, its actual dynamic type
/// (a descendant of the declared type when polymorphic), and an ordered
/// field-name-to-value map.
///
/// The map may be sparse for hand-built values; the codec materializes every
/// non-message field on decode, and message-typed fields stay absent until a
/// stream actually carries them.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageValue {
    declared: TypeName,
    actual: TypeName,
    fields: Vec<(String, Value)>,
}

impl MessageValue {
    /// A leaf instance whose actual type equals its declared type.
    pub fn of(ty: impl Into<TypeName>) -> Self {
        let ty = ty.into();
        Self {
            declared: ty.clone(),
            actual: ty,
            fields: Vec::new(),
        }
    }

    /// An instance declared as one type but actually a more derived one.
    pub fn polymorphic(declared: impl Into<TypeName>, actual: impl Into<TypeName>) -> Self {
        Self {
            declared: declared.into(),
            actual: actual.into(),
            fields: Vec::new(),
        }
    }

    /// Sets a field, replacing any previous value under the same name.
    pub fn field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    pub fn declared(&self) -> &str {
        &self.declared
    }

    pub fn actual(&self) -> &str {
        &self.actual
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }
}

impl From<MessageValue> for Value {
    fn from(message: MessageValue) -> Self {
        Value::Message(message)
    }
}

/// The zero value of a type: what an absent field decodes to.
///
/// Message-typed zeros are empty instances; their own fields read as absent
/// rather than being materialized, which keeps zero construction total for
/// recursive message types.
pub fn zero_value(ty: &TypeDescriptor, registry: &TypeRegistry) -> Value {
    match ty {
        TypeDescriptor::Bool => Value::Bool(false),
        TypeDescriptor::Int16 => Value::Int16(0),
        TypeDescriptor::Int32 => Value::Int32(0),
        TypeDescriptor::Int64 => Value::Int64(0),
        TypeDescriptor::Float => Value::Float(0.0),
        TypeDescriptor::Double => Value::Double(0.0),
        TypeDescriptor::Decimal => Value::Decimal("0".to_string()),
        TypeDescriptor::Date => Value::Date(NaiveDate::default()),
        TypeDescriptor::Datetime => Value::Datetime(DateTime::<Utc>::default()),
        TypeDescriptor::String => Value::String(String::new()),
        TypeDescriptor::Uuid => Value::Uuid(Uuid::nil()),
        TypeDescriptor::Object => Value::Object(Token::Null),
        TypeDescriptor::List(_) => Value::List(Vec::new()),
        TypeDescriptor::Set(_) => Value::Set(Vec::new()),
        TypeDescriptor::Map(..) => Value::Map(Vec::new()),
        TypeDescriptor::Enum(name) => {
            let symbol = registry
                .enum_type(name)
                .and_then(|e| e.symbols().first().cloned())
                .unwrap_or_default();
            Value::Enum(EnumValue::new(name.clone(), symbol))
        }
        TypeDescriptor::Message(name) | TypeDescriptor::Exception(name) => {
            Value::Message(MessageValue::of(name.clone()))
        }
        TypeDescriptor::Interface(_) => Value::Unit,
    }
}

/// Whether a runtime value is assignable to a declared type.
///
/// Scalar kinds must match exactly; a message value is assignable to its
/// actual type or any declared ancestor of it; collections check their
/// elements recursively.
pub fn is_assignable(value: &Value, ty: &TypeDescriptor, registry: &TypeRegistry) -> bool {
    match (value, ty) {
        (Value::Bool(_), TypeDescriptor::Bool)
        | (Value::Int16(_), TypeDescriptor::Int16)
        | (Value::Int32(_), TypeDescriptor::Int32)
        | (Value::Int64(_), TypeDescriptor::Int64)
        | (Value::Float(_), TypeDescriptor::Float)
        | (Value::Double(_), TypeDescriptor::Double)
        | (Value::Decimal(_), TypeDescriptor::Decimal)
        | (Value::Date(_), TypeDescriptor::Date)
        | (Value::Datetime(_), TypeDescriptor::Datetime)
        | (Value::String(_), TypeDescriptor::String)
        | (Value::Uuid(_), TypeDescriptor::Uuid)
        | (Value::Object(_), TypeDescriptor::Object) => true,
        (Value::Enum(v), TypeDescriptor::Enum(name)) => v.enum_type == *name,
        (Value::List(elems), TypeDescriptor::List(elem_ty))
        | (Value::Set(elems), TypeDescriptor::Set(elem_ty)) => elems
            .iter()
            .all(|e| is_assignable(e, elem_ty, registry)),
        (Value::Map(entries), TypeDescriptor::Map(key_ty, value_ty)) => {
            entries.iter().all(|(k, v)| {
                k.matches(key_ty) && is_assignable(v, value_ty, registry)
            })
        }
        (Value::Message(m), TypeDescriptor::Message(name))
        | (Value::Message(m), TypeDescriptor::Exception(name)) => {
            registry.is_descendant_or_equal(m.actual(), name)
        }
        _ => false,
    }
}
