//! Compact-serialization decoding with hard resource limits.
//!
//! Tokens arrive from the network and are attacker-controlled until their
//! signature is verified, so decoding enforces limits before any JSON work:
//! raw size, per-segment decoded size, per-string length, per-array length
//! and nesting depth. Payload and header JSON parsing also rejects duplicate
//! object keys, which `serde_json` would otherwise silently collapse.

use crate::claims::JsonObject;
use crate::error::{Result, ValidationError};
use crate::events::SecurityEventType;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::de::{DeserializeSeed, Deserializer, Error as _, MapAccess, SeqAccess, Visitor};
use serde_json::Value;

/// Size and structure limits applied while parsing tokens.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Maximum raw token size in bytes.
    pub max_token_size: usize,
    /// Maximum decoded size per base64url segment, in bytes.
    pub max_decoded_part_size: usize,
    /// Maximum length of any single JSON string.
    pub max_string_length: usize,
    /// Maximum number of elements in any single JSON array.
    pub max_array_elements: usize,
    /// Maximum JSON nesting depth.
    pub max_depth: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_token_size: 8192,
            max_decoded_part_size: 16384,
            max_string_length: 4096,
            max_array_elements: 256,
            max_depth: 10,
        }
    }
}

impl ParserConfig {
    /// Set the maximum raw token size.
    #[must_use]
    pub fn with_max_token_size(mut self, bytes: usize) -> Self {
        self.max_token_size = bytes;
        self
    }

    /// Set the maximum decoded segment size.
    #[must_use]
    pub fn with_max_decoded_part_size(mut self, bytes: usize) -> Self {
        self.max_decoded_part_size = bytes;
        self
    }
}

/// A raw token split into its three segments, not yet decoded.
#[derive(Debug, Clone, Copy)]
pub struct RawJwt<'a> {
    raw: &'a str,
    header_b64: &'a str,
    payload_b64: &'a str,
    signature_b64: &'a str,
}

impl<'a> RawJwt<'a> {
    /// The undecoded token.
    pub fn raw(&self) -> &'a str {
        self.raw
    }
}

/// A fully decoded token: parsed header and payload, raw signature bytes,
/// and the exact signed byte range.
#[derive(Debug, Clone)]
pub struct DecodedToken {
    raw: String,
    header: JsonObject,
    payload: JsonObject,
    signature: Vec<u8>,
    signature_b64: String,
    signed_len: usize,
}

impl DecodedToken {
    /// The raw compact-serialized token.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The parsed JOSE header.
    pub fn header(&self) -> &JsonObject {
        &self.header
    }

    /// The parsed payload object.
    pub fn payload(&self) -> &JsonObject {
        &self.payload
    }

    /// The decoded signature bytes.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// The signature segment as it appeared on the wire.
    pub fn signature_b64(&self) -> &str {
        &self.signature_b64
    }

    /// The byte range `header_b64 '.' payload_b64` that the signature covers.
    ///
    /// Taken verbatim from the raw token; never re-encoded.
    pub fn signed_data(&self) -> &[u8] {
        &self.raw.as_bytes()[..self.signed_len]
    }

    /// A string-valued header parameter.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.header.get(name).and_then(Value::as_str)
    }

    /// The `iss` claim, when present as a string.
    pub fn issuer(&self) -> Option<&str> {
        self.payload.get("iss").and_then(Value::as_str)
    }
}

/// Decodes raw tokens under a [`ParserConfig`].
#[derive(Debug, Clone, Default)]
pub struct TokenDecoder {
    config: ParserConfig,
}

impl TokenDecoder {
    /// Create a decoder with the given limits.
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    /// The limits this decoder applies.
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Stage 1: shape and size checks.
    ///
    /// The token must be non-empty, at most `max_token_size` bytes, and
    /// consist of exactly three non-empty dot-separated segments.
    pub fn check_format<'a>(&self, raw: &'a str) -> Result<RawJwt<'a>> {
        if raw.trim().is_empty() {
            return Err(ValidationError::new(
                SecurityEventType::TokenEmpty,
                "token is empty",
            ));
        }
        if raw.len() > self.config.max_token_size {
            return Err(ValidationError::new(
                SecurityEventType::TokenSizeExceeded,
                format!(
                    "token of {} bytes exceeds the maximum of {}",
                    raw.len(),
                    self.config.max_token_size
                ),
            ));
        }
        let mut segments = raw.split('.');
        let (header, payload, signature) =
            match (segments.next(), segments.next(), segments.next(), segments.next()) {
                (Some(h), Some(p), Some(s), None) if !h.is_empty() && !p.is_empty() && !s.is_empty() => {
                    (h, p, s)
                }
                _ => {
                    return Err(ValidationError::new(
                        SecurityEventType::InvalidJwtFormat,
                        "token is not three dot-separated segments",
                    ));
                }
            };
        Ok(RawJwt {
            raw,
            header_b64: header,
            payload_b64: payload,
            signature_b64: signature,
        })
    }

    /// Stage 2: base64url decoding and strict JSON parsing.
    pub fn decode(&self, jwt: RawJwt<'_>) -> Result<DecodedToken> {
        let header_bytes = URL_SAFE_NO_PAD.decode(jwt.header_b64).map_err(|e| {
            ValidationError::new(
                SecurityEventType::FailedToDecodeHeader,
                "header segment is not valid base64url",
            )
            .with_cause(e.to_string())
        })?;
        self.check_part_size(header_bytes.len(), "header")?;

        let payload_bytes = URL_SAFE_NO_PAD.decode(jwt.payload_b64).map_err(|e| {
            ValidationError::new(
                SecurityEventType::FailedToDecodePayload,
                "payload segment is not valid base64url",
            )
            .with_cause(e.to_string())
        })?;
        self.check_part_size(payload_bytes.len(), "payload")?;

        let signature = URL_SAFE_NO_PAD.decode(jwt.signature_b64).map_err(|e| {
            ValidationError::new(
                SecurityEventType::FailedToDecodeJwt,
                "signature segment is not valid base64url",
            )
            .with_cause(e.to_string())
        })?;

        let header = parse_object(&header_bytes, &self.config).map_err(|detail| {
            ValidationError::new(
                SecurityEventType::FailedToDecodeHeader,
                "header is not a valid JSON object",
            )
            .with_cause(detail)
        })?;
        let payload = parse_object(&payload_bytes, &self.config).map_err(|detail| {
            ValidationError::new(
                SecurityEventType::FailedToDecodePayload,
                "payload is not a valid JSON object",
            )
            .with_cause(detail)
        })?;

        let signed_len = jwt.header_b64.len() + 1 + jwt.payload_b64.len();
        Ok(DecodedToken {
            raw: jwt.raw.to_owned(),
            header,
            payload,
            signature,
            signature_b64: jwt.signature_b64.to_owned(),
            signed_len,
        })
    }

    fn check_part_size(&self, len: usize, part: &str) -> Result<()> {
        if len > self.config.max_decoded_part_size {
            return Err(ValidationError::new(
                SecurityEventType::DecodedPartSizeExceeded,
                format!(
                    "decoded {part} of {len} bytes exceeds the maximum of {}",
                    self.config.max_decoded_part_size
                ),
            ));
        }
        Ok(())
    }
}

/// Parse `bytes` as a JSON object under the configured limits, rejecting
/// duplicate keys at any depth.
fn parse_object(bytes: &[u8], config: &ParserConfig) -> std::result::Result<JsonObject, String> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    let value = GuardedValue { config, depth: 0 }
        .deserialize(&mut deserializer)
        .map_err(|e| e.to_string())?;
    deserializer.end().map_err(|e| e.to_string())?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err("top-level value is not an object".to_owned()),
    }
}

struct GuardedValue<'c> {
    config: &'c ParserConfig,
    depth: usize,
}

impl<'de> DeserializeSeed<'de> for GuardedValue<'_> {
    type Value = Value;

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for GuardedValue<'_> {
    type Value = Value;

    fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("a JSON value")
    }

    fn visit_bool<E: serde::de::Error>(self, v: bool) -> std::result::Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: serde::de::Error>(self, v: i64) -> std::result::Result<Value, E> {
        Ok(Value::from(v))
    }

    fn visit_u64<E: serde::de::Error>(self, v: u64) -> std::result::Result<Value, E> {
        Ok(Value::from(v))
    }

    fn visit_f64<E: serde::de::Error>(self, v: f64) -> std::result::Result<Value, E> {
        Ok(serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number))
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> std::result::Result<Value, E> {
        if v.len() > self.config.max_string_length {
            return Err(E::custom("string exceeds the maximum length"));
        }
        Ok(Value::String(v.to_owned()))
    }

    fn visit_unit<E: serde::de::Error>(self) -> std::result::Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        if self.depth >= self.config.max_depth {
            return Err(A::Error::custom("nesting exceeds the maximum depth"));
        }
        let mut items = Vec::new();
        while let Some(item) = seq.next_element_seed(GuardedValue {
            config: self.config,
            depth: self.depth + 1,
        })? {
            if items.len() >= self.config.max_array_elements {
                return Err(A::Error::custom("array exceeds the maximum element count"));
            }
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        if self.depth >= self.config.max_depth {
            return Err(A::Error::custom("nesting exceeds the maximum depth"));
        }
        let mut object = JsonObject::new();
        while let Some(key) = map.next_key::<String>()? {
            if key.len() > self.config.max_string_length {
                return Err(A::Error::custom("object key exceeds the maximum length"));
            }
            if object.contains_key(&key) {
                return Err(A::Error::custom(format!("duplicate object key '{key}'")));
            }
            let value = map.next_value_seed(GuardedValue {
                config: self.config,
                depth: self.depth + 1,
            })?;
            object.insert(key, value);
        }
        Ok(Value::Object(object))
    }
}
