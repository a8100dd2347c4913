use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{Result, ServiceError};

/// A value as it travels to the remote database. The remote protocol only
/// accepts text-safe scalars, so there is no blob variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Integer(if value { 1 } else { 0 })
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => SqlValue::Null,
        }
    }
}

impl From<&Value> for SqlValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => (*b).into(),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Real(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Text(other.to_string()),
        }
    }
}

/// A literal value inside a query tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Binary(Vec<u8>),
    /// Structured content, stored as JSON text.
    Json(Value),
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Text(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Text(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Integer(value)
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Literal::Integer(value as i64)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Real(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

impl From<Vec<u8>> for Literal {
    fn from(value: Vec<u8>) -> Self {
        Literal::Binary(value)
    }
}

/// A chunked body of bytes supplied by the caller.
pub type ByteStream = BoxStream<'static, std::io::Result<Vec<u8>>>;

/// A binding parameter, classified once when it is constructed.
pub enum Binding {
    Scalar(SqlValue),
    /// Raw bytes, sent as base64 text.
    Blob(Vec<u8>),
    /// Binary content read in full, then sent as base64 text.
    ByteStream(ByteStream),
    /// UTF-8 (typically JSON) content read in full and sent as text.
    TextStream(ByteStream),
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Scalar(v) => f.debug_tuple("Scalar").field(v).finish(),
            Binding::Blob(b) => f.debug_tuple("Blob").field(&b.len()).finish(),
            Binding::ByteStream(_) => f.write_str("ByteStream(..)"),
            Binding::TextStream(_) => f.write_str("TextStream(..)"),
        }
    }
}

impl From<SqlValue> for Binding {
    fn from(value: SqlValue) -> Self {
        Binding::Scalar(value)
    }
}

impl From<Vec<u8>> for Binding {
    fn from(value: Vec<u8>) -> Self {
        Binding::Blob(value)
    }
}

impl Binding {
    /// Wrap plain values, e.g. the output of the SQL generator.
    pub fn scalars(values: impl IntoIterator<Item = SqlValue>) -> Vec<Binding> {
        values.into_iter().map(Binding::Scalar).collect()
    }

    /// Reduce the binding to a value the remote protocol accepts.
    pub async fn normalize(self) -> Result<SqlValue> {
        match self {
            Binding::Scalar(value) => Ok(value),
            Binding::Blob(bytes) => Ok(SqlValue::Text(BASE64.encode(bytes))),
            Binding::ByteStream(body) => {
                let bytes = read_all(body).await?;
                Ok(SqlValue::Text(BASE64.encode(bytes)))
            }
            Binding::TextStream(body) => {
                let bytes = read_all(body).await?;
                String::from_utf8(bytes)
                    .map(SqlValue::Text)
                    .map_err(|e| ServiceError::Stream(format!("Text stream is not valid UTF-8: {}", e)))
            }
        }
    }
}

async fn read_all(mut body: ByteStream) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| ServiceError::Stream(format!("Failed to read binding stream: {}", e)))?;
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer)
}

/// Normalize every binding in order.
pub async fn normalize_all(bindings: Vec<Binding>) -> Result<Vec<SqlValue>> {
    let mut values = Vec::with_capacity(bindings.len());
    for binding in bindings {
        values.push(binding.normalize().await?);
    }
    Ok(values)
}
