//! Claim value representation.

use chrono::{DateTime, Utc};

/// The parsed form of a claim.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimKind {
    /// A string claim.
    String(String),
    /// A list of strings (JSON array or split scope string).
    StringList(Vec<String>),
    /// A date-time claim (epoch seconds in the wire form).
    DateTime(DateTime<Utc>),
    /// An integer claim.
    Integer(i64),
    /// A boolean claim.
    Boolean(bool),
}

/// A claim extracted from a token payload.
///
/// Keeps the original serialized form next to the parsed value so callers can
/// log or forward the claim exactly as the issuer wrote it.
///
/// # Example
///
/// ```rust
/// use tokenward::claims::ClaimValue;
///
/// let scope = ClaimValue::string_list("read write", vec!["read".into(), "write".into()]);
/// assert_eq!(scope.as_list().unwrap().len(), 2);
/// assert_eq!(scope.original(), "read write");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimValue {
    original: String,
    kind: ClaimKind,
}

impl ClaimValue {
    /// A string claim; the original form is the string itself.
    pub fn string(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            original: value.clone(),
            kind: ClaimKind::String(value),
        }
    }

    /// A string-list claim with its original serialized form.
    pub fn string_list(original: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            original: original.into(),
            kind: ClaimKind::StringList(values),
        }
    }

    /// A date-time claim with its original serialized form.
    pub fn date_time(original: impl Into<String>, value: DateTime<Utc>) -> Self {
        Self {
            original: original.into(),
            kind: ClaimKind::DateTime(value),
        }
    }

    /// An integer claim.
    pub fn integer(value: i64) -> Self {
        Self {
            original: value.to_string(),
            kind: ClaimKind::Integer(value),
        }
    }

    /// A boolean claim.
    pub fn boolean(value: bool) -> Self {
        Self {
            original: value.to_string(),
            kind: ClaimKind::Boolean(value),
        }
    }

    /// The claim exactly as it appeared in the payload.
    pub fn original(&self) -> &str {
        &self.original
    }

    /// The parsed form.
    pub fn kind(&self) -> &ClaimKind {
        &self.kind
    }

    /// The string value, if this is a string claim.
    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ClaimKind::String(value) => Some(value),
            _ => None,
        }
    }

    /// The list values, if this is a string-list claim.
    pub fn as_list(&self) -> Option<&[String]> {
        match &self.kind {
            ClaimKind::StringList(values) => Some(values),
            _ => None,
        }
    }

    /// The date-time value, if this is a date-time claim.
    pub fn as_date_time(&self) -> Option<DateTime<Utc>> {
        match self.kind {
            ClaimKind::DateTime(value) => Some(value),
            _ => None,
        }
    }

    /// The integer value, if this is an integer claim.
    pub fn as_i64(&self) -> Option<i64> {
        match self.kind {
            ClaimKind::Integer(value) => Some(value),
            _ => None,
        }
    }

    /// The boolean value, if this is a boolean claim.
    pub fn as_bool(&self) -> Option<bool> {
        match self.kind {
            ClaimKind::Boolean(value) => Some(value),
            _ => None,
        }
    }

    /// True for an empty string or an empty list.
    pub fn is_empty(&self) -> bool {
        match &self.kind {
            ClaimKind::String(value) => value.is_empty(),
            ClaimKind::StringList(values) => values.is_empty(),
            _ => false,
        }
    }
}

/// Outcome of mapping one claim out of a payload.
///
/// `Absent` means the payload carried no such claim at all; `Present` may
/// still hold an empty value. The distinction drives required-claim checks.
#[derive(Debug, Clone, PartialEq)]
pub enum MappedClaim {
    /// The claim was not present in the payload.
    Absent,
    /// The claim was present and mapped.
    Present(ClaimValue),
}

impl MappedClaim {
    /// True when the claim was absent.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// The mapped value, if present.
    pub fn value(&self) -> Option<&ClaimValue> {
        match self {
            Self::Absent => None,
            Self::Present(value) => Some(value),
        }
    }

    /// Consume into the mapped value, if present.
    pub fn into_value(self) -> Option<ClaimValue> {
        match self {
            Self::Absent => None,
            Self::Present(value) => Some(value),
        }
    }
}
