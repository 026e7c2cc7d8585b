//! # Polymorphic Codec
//!
//! Converts between [`Value`]s and field streams, independent of the concrete
//! byte encoding. The codec holds a shared reference to the finalized
//! [`TypeRegistry`] and never mutates it.
//!
//! ## Decoding
//!
//! All fields of a stream are staged by name first. If the declared type
//! declares a discriminator mapping, the staged discriminator value selects
//! the concrete subtype and the resolution *repeats from that subtype*, so a
//! hierarchy can dispatch through arbitrarily many levels while each level
//! only knows its own immediate children. Unknown field names are ignored and
//! absent fields decode to their zero values; decoding never fails merely
//! because a field is missing.
//!
//! ## Encoding
//!
//! Encoding emits the value's *actual* type's full field set in
//! ancestor-to-descendant declaration order. Discriminator fields are
//! recomputed from the actual type, so a round trip reconstructs the exact
//! dynamic type even for hand-built values that never set them.
pub mod json;
pub mod token;

use crate::schema::{ResolvedMessage, TypeDescriptor, TypeRegistry};
use crate::value::{EnumValue, MapKey, MessageValue, Value, zero_value};
use std::collections::HashMap;
use std::sync::Arc;
use token::{FieldStream, Token};

/// Per-operation codec failures. The registry and other in-flight operations
/// are unaffected.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
    #[error("'{symbol}' is not a symbol of enum '{enum_type}'")]
    InvalidEnumValue { enum_type: String, symbol: String },
    #[error("type '{0}' is not registered")]
    UnregisteredType(String),
}

impl CodecError {
    fn mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        CodecError::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Encodes and decodes values against a finalized registry.
#[derive(Debug, Clone)]
pub struct Codec {
    registry: Arc<TypeRegistry>,
}

impl Codec {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Decodes a field stream against a declared message or exception type.
    pub fn decode(&self, declared: &TypeDescriptor, stream: &FieldStream) -> Result<Value, CodecError> {
        match declared {
            TypeDescriptor::Message(name) | TypeDescriptor::Exception(name) => {
                self.decode_message(name, stream.entries())
            }
            other => Err(CodecError::mismatch(
                "a message or exception type",
                other.kind_label(),
            )),
        }
    }

    /// Decodes a single token against any declared type.
    ///
    /// This is the entry point the framing layer uses for method arguments
    /// and scalar results.
    pub fn decode_value(&self, declared: &TypeDescriptor, token: &Token) -> Result<Value, CodecError> {
        self.decode_token(declared, token)
    }

    /// Encodes a message value into a fresh field stream.
    pub fn encode(&self, value: &Value) -> Result<FieldStream, CodecError> {
        match value {
            Value::Message(message) => Ok(FieldStream::from(self.encode_message(message)?)),
            other => Err(CodecError::mismatch("a message value", other.kind_label())),
        }
    }

    /// Encodes any value into a single token.
    pub fn encode_value(&self, value: &Value) -> Result<Token, CodecError> {
        match value {
            Value::Bool(v) => Ok(Token::Bool(*v)),
            Value::Int16(v) => Ok(Token::Int(i64::from(*v))),
            Value::Int32(v) => Ok(Token::Int(i64::from(*v))),
            Value::Int64(v) => Ok(Token::Int(*v)),
            Value::Float(v) => Ok(Token::Float(f64::from(*v))),
            Value::Double(v) => Ok(Token::Float(*v)),
            Value::Decimal(v) => Ok(Token::Str(v.clone())),
            Value::Date(v) => Ok(Token::Str(v.format("%Y-%m-%d").to_string())),
            Value::Datetime(v) => Ok(Token::Str(
                v.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            )),
            Value::String(v) => Ok(Token::Str(v.clone())),
            Value::Uuid(v) => Ok(Token::Str(v.to_string())),
            Value::Object(token) => Ok(token.clone()),
            Value::Enum(v) => Ok(Token::Str(v.symbol.clone())),
            Value::List(elems) | Value::Set(elems) => Ok(Token::List(
                elems
                    .iter()
                    .map(|e| self.encode_value(e))
                    .collect::<Result<_, _>>()?,
            )),
            Value::Map(entries) => Ok(Token::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((key_token(k), self.encode_value(v)?)))
                    .collect::<Result<_, CodecError>>()?,
            )),
            Value::Message(message) => Ok(Token::Fields(self.encode_message(message)?)),
            Value::Unit => Ok(Token::Null),
        }
    }

    fn decode_message(
        &self,
        declared: &str,
        entries: &[(String, Token)],
    ) -> Result<Value, CodecError> {
        // Stage every field by name; a repeated name keeps its last token.
        let mut staging: HashMap<&str, &Token> = HashMap::with_capacity(entries.len());
        for (name, token) in entries {
            staging.insert(name.as_str(), token);
        }

        let actual = self.resolve_actual(declared, &staging)?;
        let resolved = self
            .registry
            .message(&actual)
            .ok_or_else(|| CodecError::UnregisteredType(actual.clone()))?;

        // Discriminator fields absent from the stream are materialized from
        // the resolved actual type, never from the enum's zero symbol: a zero
        // default would select a subtype on re-decode.
        let discriminators = self.discriminator_symbols(resolved);

        let mut message = MessageValue::polymorphic(declared, actual.as_str());
        for field in resolved.fields() {
            match staging.get(field.name()) {
                Some(token) if !matches!(token, Token::Null) => {
                    message.set(field.name(), self.decode_token(field.ty(), token)?);
                }
                _ => match field.ty() {
                    // Message-typed fields stay absent until a stream carries
                    // them; materializing them would not terminate for
                    // recursive message types.
                    TypeDescriptor::Message(_) | TypeDescriptor::Exception(_) => {}
                    TypeDescriptor::Enum(enum_name)
                        if self.is_discriminator_field(resolved, field.name()) =>
                    {
                        if let Some((_, symbol)) =
                            discriminators.iter().find(|(f, _)| f == field.name())
                        {
                            message.set(
                                field.name(),
                                Value::Enum(EnumValue::new(enum_name.clone(), symbol.clone())),
                            );
                        }
                    }
                    ty => message.set(field.name(), zero_value(ty, &self.registry)),
                },
            }
        }
        Ok(Value::Message(message))
    }

    /// Walks the discriminator chain from the declared type down to the
    /// concrete subtype the staged fields select.
    fn resolve_actual(
        &self,
        declared: &str,
        staging: &HashMap<&str, &Token>,
    ) -> Result<String, CodecError> {
        let mut actual = declared.to_string();
        loop {
            let resolved = self
                .registry
                .message(&actual)
                .ok_or_else(|| CodecError::UnregisteredType(actual.clone()))?;
            let Some(disc) = resolved.descriptor().discriminator_decl() else {
                break;
            };
            let Some(Token::Str(raw)) = staging.get(disc.field()).copied() else {
                break;
            };
            let Some(next) = disc.subtype(raw) else {
                break;
            };
            if next == actual {
                break;
            }
            actual = next.to_string();
        }
        Ok(actual)
    }

    fn decode_token(&self, declared: &TypeDescriptor, token: &Token) -> Result<Value, CodecError> {
        if matches!(token, Token::Null) && !matches!(declared, TypeDescriptor::Object) {
            return Ok(zero_value(declared, &self.registry));
        }
        match declared {
            TypeDescriptor::Bool => parse_bool(token),
            TypeDescriptor::Int16 => Ok(Value::Int16(parse_integral(token, "int16")?)),
            TypeDescriptor::Int32 => Ok(Value::Int32(parse_integral(token, "int32")?)),
            TypeDescriptor::Int64 => Ok(Value::Int64(parse_integral(token, "int64")?)),
            TypeDescriptor::Float => Ok(Value::Float(parse_floating(token, "float")? as f32)),
            TypeDescriptor::Double => Ok(Value::Double(parse_floating(token, "double")?)),
            TypeDescriptor::Decimal => parse_decimal(token),
            TypeDescriptor::Date => parse_date(token),
            TypeDescriptor::Datetime => parse_datetime(token),
            TypeDescriptor::String => match token {
                Token::Str(s) => Ok(Value::String(s.clone())),
                other => Err(CodecError::mismatch("string", other.describe())),
            },
            TypeDescriptor::Uuid => parse_uuid(token),
            TypeDescriptor::Object => Ok(Value::Object(token.clone())),
            TypeDescriptor::Enum(name) => self.parse_enum(name, token),
            TypeDescriptor::List(elem) => {
                let Token::List(tokens) = token else {
                    return Err(CodecError::mismatch("list", token.describe()));
                };
                let elems = tokens
                    .iter()
                    .map(|t| self.decode_token(elem, t))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(elems))
            }
            TypeDescriptor::Set(elem) => {
                let Token::List(tokens) = token else {
                    return Err(CodecError::mismatch("list", token.describe()));
                };
                let elems = tokens
                    .iter()
                    .map(|t| self.decode_token(elem, t))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::set_of(elems))
            }
            TypeDescriptor::Map(key_ty, value_ty) => self.decode_map(key_ty, value_ty, token),
            TypeDescriptor::Message(name) | TypeDescriptor::Exception(name) => match token {
                Token::Fields(entries) => self.decode_message(name, entries),
                // Framing layers without a dedicated nested-message shape
                // (JSON) deliver string-keyed maps here.
                Token::Map(entries) => {
                    let mut fields = Vec::with_capacity(entries.len());
                    for (key, value) in entries {
                        let Token::Str(name) = key else {
                            return Err(CodecError::mismatch("field set", token.describe()));
                        };
                        fields.push((name.clone(), value.clone()));
                    }
                    self.decode_message(name, &fields)
                }
                other => Err(CodecError::mismatch("field set", other.describe())),
            },
            TypeDescriptor::Interface(name) => Err(CodecError::mismatch(
                "a data type",
                format!("interface '{name}'"),
            )),
        }
    }

    fn decode_map(
        &self,
        key_ty: &TypeDescriptor,
        value_ty: &TypeDescriptor,
        token: &Token,
    ) -> Result<Value, CodecError> {
        let pairs: Vec<(Token, Token)> = match token {
            Token::Map(entries) => entries.clone(),
            // A field set is a string-keyed map as far as decoding goes.
            Token::Fields(entries) => entries
                .iter()
                .map(|(name, value)| (Token::Str(name.clone()), value.clone()))
                .collect(),
            other => return Err(CodecError::mismatch("map", other.describe())),
        };
        let mut entries = Vec::with_capacity(pairs.len());
        for (key_token, value_token) in &pairs {
            let key_value = self.decode_token(key_ty, key_token)?;
            let key = MapKey::from_value(key_value).ok_or_else(|| {
                CodecError::mismatch("a map key", key_token.describe())
            })?;
            let value = self.decode_token(value_ty, value_token)?;
            entries.push((key, value));
        }
        Ok(Value::map_of(entries))
    }

    fn parse_enum(&self, name: &str, token: &Token) -> Result<Value, CodecError> {
        let desc = self
            .registry
            .enum_type(name)
            .ok_or_else(|| CodecError::UnregisteredType(name.to_string()))?;
        let Token::Str(raw) = token else {
            return Err(CodecError::mismatch("enum symbol", token.describe()));
        };
        let symbol = desc
            .find_symbol(raw)
            .ok_or_else(|| CodecError::InvalidEnumValue {
                enum_type: name.to_string(),
                symbol: raw.clone(),
            })?;
        Ok(Value::Enum(EnumValue::new(name, symbol)))
    }

    fn encode_message(&self, message: &MessageValue) -> Result<Vec<(String, Token)>, CodecError> {
        let resolved = self
            .registry
            .message(message.actual())
            .ok_or_else(|| CodecError::UnregisteredType(message.actual().to_string()))?;

        let discriminators = self.discriminator_symbols(resolved);
        let mut entries = Vec::with_capacity(resolved.fields().len());
        for field in resolved.fields() {
            if let Some((_, symbol)) = discriminators.iter().find(|(f, _)| f == field.name()) {
                entries.push((field.name().to_string(), Token::Str(symbol.clone())));
                continue;
            }
            match message.get(field.name()) {
                Some(value) => {
                    entries.push((field.name().to_string(), self.encode_value(value)?));
                }
                None => match field.ty() {
                    TypeDescriptor::Message(_) | TypeDescriptor::Exception(_) => {}
                    _ if self.is_discriminator_field(resolved, field.name()) => {}
                    ty => entries.push((
                        field.name().to_string(),
                        self.encode_value(&zero_value(ty, &self.registry))?,
                    )),
                },
            }
        }
        Ok(entries)
    }

    /// Computes the discriminator field values that make a later decode land
    /// exactly on this actual type.
    ///
    /// Each declaring level along the base chain picks the mapping key whose
    /// target lies deepest on the path to the actual type; deeper levels
    /// overwrite shallower ones when they share a field. The result is
    /// verified by simulating the decode descent.
    fn discriminator_symbols(&self, resolved: &ResolvedMessage) -> Vec<(String, String)> {
        let actual = resolved.name();
        let chain: Vec<&str> = resolved
            .ancestors()
            .iter()
            .rev()
            .map(String::as_str)
            .chain(std::iter::once(actual))
            .collect();

        let mut assignment: Vec<(String, String)> = Vec::new();
        for ty in &chain {
            let Some(disc) = self
                .registry
                .message(ty)
                .and_then(|m| m.descriptor().discriminator_decl())
            else {
                continue;
            };
            let mut best: Option<(&str, usize)> = None;
            for (key, target) in disc.mapping() {
                if self.registry.is_descendant_or_equal(actual, target) {
                    let depth = self.registry.depth(target);
                    if best.is_none_or(|(_, d)| depth > d) {
                        best = Some((key, depth));
                    }
                }
            }
            if let Some((key, _)) = best {
                if let Some(slot) = assignment.iter_mut().find(|(f, _)| f == disc.field()) {
                    slot.1 = key.to_string();
                } else {
                    assignment.push((disc.field().to_string(), key.to_string()));
                }
            }
        }

        if assignment.is_empty() {
            return assignment;
        }

        let start = chain
            .iter()
            .copied()
            .find(|ty| {
                self.registry
                    .message(ty)
                    .is_some_and(|m| m.descriptor().discriminator_decl().is_some())
            })
            .unwrap_or(actual);

        if self.simulate_descent(start, &assignment) != actual && assignment.len() == 1 {
            // Mapping key ties can pick a symbol that descends past the
            // actual type; fall back to probing the enum's symbols.
            let field = assignment[0].0.clone();
            if let Some(TypeDescriptor::Enum(enum_name)) =
                resolved.field(&field).map(|f| f.ty().clone())
                && let Some(enum_desc) = self.registry.enum_type(&enum_name)
            {
                for symbol in enum_desc.symbols() {
                    assignment[0].1 = symbol.clone();
                    if self.simulate_descent(start, &assignment) == actual {
                        break;
                    }
                }
            }
        }
        assignment
    }

    /// Whether a mapping anywhere along this message's chain dispatches on
    /// the given field.
    fn is_discriminator_field(&self, resolved: &ResolvedMessage, field: &str) -> bool {
        std::iter::once(resolved.name())
            .chain(resolved.ancestors().iter().map(String::as_str))
            .any(|ty| {
                self.registry
                    .message(ty)
                    .and_then(|m| m.descriptor().discriminator_decl())
                    .is_some_and(|d| d.field() == field)
            })
    }

    fn simulate_descent(&self, start: &str, assignment: &[(String, String)]) -> String {
        let mut actual = start.to_string();
        loop {
            let Some(disc) = self
                .registry
                .message(&actual)
                .and_then(|m| m.descriptor().discriminator_decl())
            else {
                break;
            };
            let Some((_, symbol)) = assignment.iter().find(|(f, _)| f == disc.field()) else {
                break;
            };
            let Some(next) = disc.subtype(symbol) else {
                break;
            };
            if next == actual {
                break;
            }
            actual = next.to_string();
        }
        actual
    }
}

fn key_token(key: &MapKey) -> Token {
    match key {
        MapKey::Bool(v) => Token::Bool(*v),
        MapKey::Int16(v) => Token::Int(i64::from(*v)),
        MapKey::Int32(v) => Token::Int(i64::from(*v)),
        MapKey::Int64(v) => Token::Int(*v),
        MapKey::String(v) => Token::Str(v.clone()),
        MapKey::Uuid(v) => Token::Str(v.to_string()),
        MapKey::Date(v) => Token::Str(v.format("%Y-%m-%d").to_string()),
        MapKey::Enum(symbol) => Token::Str(symbol.clone()),
    }
}

fn parse_bool(token: &Token) -> Result<Value, CodecError> {
    match token {
        Token::Bool(v) => Ok(Value::Bool(*v)),
        Token::Int(0) => Ok(Value::Bool(false)),
        Token::Int(1) => Ok(Value::Bool(true)),
        Token::Str(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
        Token::Str(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
        other => Err(CodecError::mismatch("bool", other.describe())),
    }
}

fn parse_integral<T>(token: &Token, kind: &str) -> Result<T, CodecError>
where
    T: TryFrom<i64>,
{
    let wide = match token {
        Token::Int(v) => *v,
        // Accept floating tokens that convert losslessly.
        Token::Float(f) if f.fract() == 0.0 && f.is_finite() => *f as i64,
        Token::Str(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| CodecError::mismatch(kind, format!("string '{s}'")))?,
        other => return Err(CodecError::mismatch(kind, other.describe())),
    };
    T::try_from(wide).map_err(|_| CodecError::mismatch(kind, format!("out-of-range value {wide}")))
}

fn parse_floating(token: &Token, kind: &str) -> Result<f64, CodecError> {
    match token {
        Token::Float(v) => Ok(*v),
        Token::Int(v) => Ok(*v as f64),
        Token::Str(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| CodecError::mismatch(kind, format!("string '{s}'"))),
        other => Err(CodecError::mismatch(kind, other.describe())),
    }
}

/// Validates a decimal literal and normalizes it, preserving the exact digits.
fn parse_decimal(token: &Token) -> Result<Value, CodecError> {
    let literal = match token {
        Token::Str(s) => s.trim().trim_start_matches('+').to_string(),
        Token::Int(v) => v.to_string(),
        Token::Float(v) => v.to_string(),
        other => return Err(CodecError::mismatch("decimal", other.describe())),
    };
    if literal.is_empty() || literal.parse::<f64>().is_err() {
        return Err(CodecError::mismatch("decimal", format!("string '{literal}'")));
    }
    Ok(Value::Decimal(literal))
}

fn parse_date(token: &Token) -> Result<Value, CodecError> {
    let Token::Str(s) = token else {
        return Err(CodecError::mismatch("date", token.describe()));
    };
    chrono::NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map(Value::Date)
        .map_err(|_| CodecError::mismatch("date", format!("string '{s}'")))
}

fn parse_datetime(token: &Token) -> Result<Value, CodecError> {
    let Token::Str(s) = token else {
        return Err(CodecError::mismatch("datetime", token.describe()));
    };
    chrono::DateTime::parse_from_rfc3339(s.trim())
        .map(|dt| Value::Datetime(dt.with_timezone(&chrono::Utc)))
        .map_err(|_| CodecError::mismatch("datetime", format!("string '{s}'")))
}

fn parse_uuid(token: &Token) -> Result<Value, CodecError> {
    let Token::Str(s) = token else {
        return Err(CodecError::mismatch("uuid", token.describe()));
    };
    uuid::Uuid::parse_str(s.trim())
        .map(Value::Uuid)
        .map_err(|_| CodecError::mismatch("uuid", format!("string '{s}'")))
}
