//! Request bodies, strict JSON decoding and object key generation.

use std::collections::BTreeMap;
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Deserializer};
use serde_json::error::Category;

use crate::error::{DecodeError, IngestError, ValidationError};
use crate::store::WebcamRecord;

// =============================================================================
// Request Bodies
// =============================================================================

/// Body of `POST /login`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    #[serde(rename = "Name", alias = "name", default, deserialize_with = "null_as_default")]
    pub name: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::MissingName);
        }
        Ok(())
    }
}

/// Body of `POST /`.
///
/// Missing and `null` fields decode as empty so that [`Submission::validate`]
/// reports them by name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Submission {
    /// Base64-encoded image bytes
    #[serde(default, deserialize_with = "null_as_default")]
    pub image: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub topic: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: BTreeMap<String, String>,

    /// RFC 3339 timestamp, persisted verbatim when present
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Submission {
    /// Check required fields in order: image, topic, metadata.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.image.is_empty() {
            return Err(ValidationError::MissingImage);
        }
        if self.topic.is_empty() {
            return Err(ValidationError::MissingTopic);
        }
        if self.metadata.is_empty() {
            return Err(ValidationError::MissingMetadata);
        }
        Ok(())
    }

    /// Decode the base64 image payload.
    pub fn image_bytes(&self) -> Result<Bytes, IngestError> {
        STANDARD
            .decode(self.image.as_bytes())
            .map(Bytes::from)
            .map_err(|e| IngestError::InvalidImage(e.to_string()))
    }

    /// Build the metadata row for this submission stored under `key`.
    pub fn into_record(self, key: &ObjectKey) -> WebcamRecord {
        WebcamRecord {
            object_key: key.to_string(),
            topic: self.topic,
            metadata: self.metadata,
            created_at: self.created_at,
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// Strict Decoding
// =============================================================================

/// Decode a JSON body, classifying failures into distinct [`DecodeError`] kinds.
pub fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, DecodeError> {
    let Some(start) = body.iter().position(|b| !b.is_ascii_whitespace()) else {
        return Err(DecodeError::Empty);
    };

    // Derived struct impls also accept a sequence, filling fields by position
    if body[start] == b'[' {
        serde_json::from_slice::<IgnoredAny>(body).map_err(classify)?;
        let (line, column) = position_of(body, start);
        return Err(DecodeError::InvalidValue {
            detail: "invalid type: sequence, expected a JSON object".to_string(),
            line,
            column,
        });
    }

    serde_json::from_slice(body).map_err(classify)
}

/// One-based line and column of byte `offset`, counted the way serde_json does.
fn position_of(body: &[u8], offset: usize) -> (usize, usize) {
    let before = &body[..offset];
    let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
    let line_start = before
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |idx| idx + 1);
    (line, offset - line_start + 1)
}

fn classify(err: serde_json::Error) -> DecodeError {
    match err.classify() {
        Category::Eof => DecodeError::Truncated,
        Category::Syntax => DecodeError::Syntax {
            line: err.line(),
            column: err.column(),
        },
        Category::Data => {
            let message = err.to_string();
            match unknown_field_name(&message) {
                Some(field) => DecodeError::UnknownField(field),
                None => DecodeError::InvalidValue {
                    detail: strip_position(&message).to_string(),
                    line: err.line(),
                    column: err.column(),
                },
            }
        }
        Category::Io => DecodeError::Other(err.to_string()),
    }
}

/// Extract `x` from serde's "unknown field `x`, expected ..." message.
fn unknown_field_name(message: &str) -> Option<String> {
    let rest = message.strip_prefix("unknown field `")?;
    let end = rest.find('`')?;
    Some(rest[..end].to_string())
}

fn strip_position(message: &str) -> &str {
    match message.rfind(" at line ") {
        Some(idx) => &message[..idx],
        None => message,
    }
}

// =============================================================================
// Object Keys
// =============================================================================

/// Storage key for a submitted image: `image-<YYYYMMDDHHMMSS>.jpg` (UTC).
///
/// Keys have one-second resolution. Two submissions within the same second
/// get the same key and the second upload replaces the first object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self(format!("image-{}.jpg", timestamp.format("%Y%m%d%H%M%S")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Tests
// =============================================================================
