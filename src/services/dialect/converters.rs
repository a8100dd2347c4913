// Type-directed converters for the SQLite Cloud dialect.
//
// Input converters wrap the SQL fragment that receives a written value,
// output converters wrap a column when it is projected into the JSON result,
// and the storage mapping drives CREATE TABLE.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::config::FeatureFlags;
use crate::error::Result;
use crate::models::{Literal, LogicalType, SqlValue};
use crate::services::dialect::temporal::{format_for, parse_instant, ISO_DATE_TIME, ZULU_MILLIS};

const PLACEHOLDER: &str = "?";
const DEFAULT_LENGTH: u32 = 5000;

impl LogicalType {
    /// Wrap a written fragment so the stored text is canonical.
    ///
    /// A bare placeholder is left alone; values bound to it are canonicalized
    /// before they are sent (see [`canonical_value`]).
    pub fn input(&self, expr: &str) -> Option<String> {
        if expr == PLACEHOLDER {
            return None;
        }
        match self {
            LogicalType::Date => Some(format!("strftime('%Y-%m-%d',{})", expr)),
            LogicalType::Time => Some(format!("strftime('%H:%M:%S',{})", expr)),
            LogicalType::DateTime | LogicalType::Timestamp => {
                Some(format!("strftime('%Y-%m-%dT%H:%M:%fZ',{})", expr))
            }
            _ => None,
        }
    }

    /// Wrap a projected column for the JSON result.
    pub fn output(&self, expr: &str, features: &FeatureFlags) -> Option<String> {
        match self {
            // Stored as JSON text; unwrap so json_object does not nest a string
            LogicalType::Association | LogicalType::Struct | LogicalType::Array | LogicalType::Map => {
                Some(format!("{}->'$'", expr))
            }
            LogicalType::Boolean if features.boolean_strings() => Some(format!(
                "CASE {} when 1 then 'true' when 0 then 'false' END ->'$'",
                expr
            )),
            // Milliseconds written on input are dropped on read
            LogicalType::DateTime => Some(format!("substr({},0,20)||'Z'", expr)),
            LogicalType::Int64 if features.ieee754compatible => Some(format!("CAST({} as TEXT)", expr)),
            LogicalType::Decimal { scale, .. } if features.ieee754compatible => Some(match scale {
                Some(scale) if *scale > 0 => format!(
                    "CASE WHEN {} IS NULL THEN NULL ELSE format('%.{}f', {}) END",
                    expr, scale, expr
                ),
                _ => format!("CAST({} as TEXT)", expr),
            }),
            LogicalType::Binary { .. } | LogicalType::LargeBinary => Some(format!("{} || ''", expr)),
            _ => None,
        }
    }

    /// Storage type for CREATE TABLE. Associations have no column of their own.
    pub fn storage_type(&self) -> Option<String> {
        let ty = match self {
            LogicalType::String { length } => format!("NVARCHAR({})", length.unwrap_or(DEFAULT_LENGTH)),
            LogicalType::LargeString => "NCLOB".to_string(),
            LogicalType::Uuid => "NVARCHAR(36)".to_string(),
            LogicalType::Boolean => "BOOLEAN".to_string(),
            LogicalType::Integer => "INTEGER".to_string(),
            LogicalType::Int64 => "BIGINT".to_string(),
            LogicalType::Decimal { precision, scale } => match (precision, scale) {
                (Some(p), Some(s)) => format!("DECIMAL({},{})", p, s),
                (Some(p), None) => format!("DECIMAL({})", p),
                _ => "DECIMAL".to_string(),
            },
            LogicalType::Double => "DOUBLE".to_string(),
            LogicalType::Date => "DATE_TEXT".to_string(),
            LogicalType::Time => "TIME_TEXT".to_string(),
            LogicalType::DateTime => "DATETIME_TEXT".to_string(),
            LogicalType::Timestamp => "TIMESTAMP_TEXT".to_string(),
            LogicalType::Binary { length } => format!("BINARY_BLOB({})", length.unwrap_or(DEFAULT_LENGTH)),
            LogicalType::LargeBinary => "BLOB".to_string(),
            LogicalType::Struct | LogicalType::Array | LogicalType::Map => "JSON_TEXT".to_string(),
            LogicalType::Association => return None,
        };
        Some(ty)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            LogicalType::Date | LogicalType::Time | LogicalType::DateTime | LogicalType::Timestamp
        )
    }
}

/// Turn a literal into the value bound for an element of type `ty`.
///
/// Text for temporal elements is parsed and re-formatted, so an invalid
/// instant fails here instead of reaching the server. Any other text that
/// looks like an ISO date-time with a zone is bound as a zulu instant.
pub fn canonical_value(ty: Option<&LogicalType>, literal: &Literal) -> Result<SqlValue> {
    match (ty, literal) {
        (Some(ty), Literal::Text(text)) if ty.is_temporal() => {
            let instant = parse_instant(text, matches!(ty, LogicalType::Time))?;
            Ok(SqlValue::Text(format_for(ty, &instant).unwrap_or_else(|| text.clone())))
        }
        (_, Literal::Text(text)) if ISO_DATE_TIME.is_match(text) => {
            let instant = parse_instant(text, false)?;
            Ok(SqlValue::Text(instant.format(ZULU_MILLIS).to_string()))
        }
        (_, literal) => Ok(literal_value(literal)),
    }
}

/// The bound form of a literal with no declared type.
pub fn literal_value(literal: &Literal) -> SqlValue {
    match literal {
        Literal::Null => SqlValue::Null,
        Literal::Bool(b) => (*b).into(),
        Literal::Integer(i) => SqlValue::Integer(*i),
        Literal::Real(r) => SqlValue::Real(*r),
        Literal::Text(s) => SqlValue::Text(s.clone()),
        Literal::Binary(bytes) => SqlValue::Text(BASE64.encode(bytes)),
        Literal::Json(value) => SqlValue::Text(value.to_string()),
    }
}
