//! # JSON Field-Stream Adaptor
//!
//! Bridges the codec's abstract field streams to `serde_json::Value` so an
//! external framing layer can speak JSON without this crate fixing a byte
//! layout. The mapping is lossy only where JSON itself is: object member
//! order is not guaranteed (the decoder stages fields by name, so order does
//! not matter) and non-string map keys are stringified.
use super::CodecError;
use super::token::{FieldStream, Token};
use serde_json::Value as Json;

/// Converts a JSON value into a token. Total: every JSON shape has a token.
pub fn token_from_json(value: &Json) -> Token {
    match value {
        Json::Null => Token::Null,
        Json::Bool(v) => Token::Bool(*v),
        Json::Number(n) => match n.as_i64() {
            Some(v) => Token::Int(v),
            None => Token::Float(n.as_f64().unwrap_or(0.0)),
        },
        Json::String(s) => Token::Str(s.clone()),
        Json::Array(elems) => Token::List(elems.iter().map(token_from_json).collect()),
        Json::Object(members) => Token::Fields(
            members
                .iter()
                .map(|(name, value)| (name.clone(), token_from_json(value)))
                .collect(),
        ),
    }
}

/// Converts a token into a JSON value.
pub fn token_to_json(token: &Token) -> Json {
    match token {
        Token::Null => Json::Null,
        Token::Bool(v) => Json::Bool(*v),
        Token::Int(v) => Json::from(*v),
        Token::Float(v) => serde_json::Number::from_f64(*v)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Token::Str(s) => Json::String(s.clone()),
        Token::List(elems) => Json::Array(elems.iter().map(token_to_json).collect()),
        Token::Map(entries) => Json::Object(
            entries
                .iter()
                .map(|(key, value)| (key_string(key), token_to_json(value)))
                .collect(),
        ),
        Token::Fields(entries) => Json::Object(
            entries
                .iter()
                .map(|(name, value)| (name.clone(), token_to_json(value)))
                .collect(),
        ),
    }
}

/// Parses a JSON object into a field stream.
pub fn stream_from_json(value: &Json) -> Result<FieldStream, CodecError> {
    match token_from_json(value) {
        Token::Fields(entries) => Ok(FieldStream::from(entries)),
        other => Err(CodecError::TypeMismatch {
            expected: "a JSON object".to_string(),
            found: other.describe().to_string(),
        }),
    }
}

/// Renders a field stream as a JSON object.
pub fn stream_to_json(stream: &FieldStream) -> Json {
    Json::Object(
        stream
            .entries()
            .iter()
            .map(|(name, token)| (name.clone(), token_to_json(token)))
            .collect(),
    )
}

fn key_string(key: &Token) -> String {
    match key {
        Token::Str(s) => s.clone(),
        Token::Bool(v) => v.to_string(),
        Token::Int(v) => v.to_string(),
        Token::Float(v) => v.to_string(),
        other => format!("{other:?}"),
    }
}
