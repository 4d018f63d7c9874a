//! Claim mappers: extraction of one claim from a raw payload.
//!
//! Mappers are small trait objects keyed by claim name. The default registry
//! wires the standard OIDC claims; issuer configurations can override any
//! claim with a custom mapper (e.g. the Keycloak role/group mappers).

use super::value::{ClaimValue, MappedClaim};
use super::JsonObject;
use crate::error::ValidationError;
use crate::events::SecurityEventType;
use chrono::{TimeZone, Utc};
use serde_json::Value;

/// Extracts a single named claim from a decoded payload.
///
/// Implementations must be cheap and pure: no I/O, no shared mutable state.
pub trait ClaimMapper: Send + Sync + std::fmt::Debug {
    /// Map `claim` out of `payload`.
    ///
    /// Returns [`MappedClaim::Absent`] when the payload has no such member;
    /// a present member that cannot be mapped is a [`ValidationError`].
    fn map(&self, payload: &JsonObject, claim: &str) -> Result<MappedClaim, ValidationError>;
}

fn invalid(claim: &str, detail: &str) -> ValidationError {
    ValidationError::new(
        SecurityEventType::MissingClaim,
        format!("claim '{claim}' {detail}"),
    )
    .with_claim(claim)
}

/// Maps any scalar claim to a string, preserving the original form.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMapper;

impl ClaimMapper for IdentityMapper {
    fn map(&self, payload: &JsonObject, claim: &str) -> Result<MappedClaim, ValidationError> {
        let Some(value) = payload.get(claim) else {
            return Ok(MappedClaim::Absent);
        };
        let mapped = match value {
            Value::String(s) => ClaimValue::string(s.clone()),
            Value::Number(n) => ClaimValue::string(n.to_string()),
            Value::Bool(b) => ClaimValue::boolean(*b),
            Value::Null => return Ok(MappedClaim::Absent),
            Value::Array(_) | Value::Object(_) => {
                return Err(invalid(claim, "is not a scalar value"));
            }
        };
        Ok(MappedClaim::Present(mapped))
    }
}

/// Maps a JSON array of strings to a string list.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringListMapper;

impl ClaimMapper for StringListMapper {
    fn map(&self, payload: &JsonObject, claim: &str) -> Result<MappedClaim, ValidationError> {
        let Some(value) = payload.get(claim) else {
            return Ok(MappedClaim::Absent);
        };
        let Value::Array(items) = value else {
            return Err(invalid(claim, "is not an array"));
        };
        let strings = items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| invalid(claim, "contains a non-string element"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MappedClaim::Present(ClaimValue::string_list(
            value.to_string(),
            strings,
        )))
    }
}

/// Maps an `aud`-style claim that may be a single string or an array.
#[derive(Debug, Clone, Copy, Default)]
pub struct AudienceMapper;

impl ClaimMapper for AudienceMapper {
    fn map(&self, payload: &JsonObject, claim: &str) -> Result<MappedClaim, ValidationError> {
        let Some(value) = payload.get(claim) else {
            return Ok(MappedClaim::Absent);
        };
        let audiences = match value {
            Value::String(s) => vec![s.clone()],
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_owned)
                        .ok_or_else(|| invalid(claim, "contains a non-string element"))
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => return Err(invalid(claim, "is neither a string nor an array")),
        };
        Ok(MappedClaim::Present(ClaimValue::string_list(
            value.to_string(),
            audiences,
        )))
    }
}

/// Splits a space-separated scope string into a string list.
///
/// Consecutive whitespace is collapsed; empty entries are removed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeMapper;

impl ClaimMapper for ScopeMapper {
    fn map(&self, payload: &JsonObject, claim: &str) -> Result<MappedClaim, ValidationError> {
        let Some(value) = payload.get(claim) else {
            return Ok(MappedClaim::Absent);
        };
        let Value::String(raw) = value else {
            return Err(invalid(claim, "is not a string"));
        };
        let scopes = raw.split_whitespace().map(str::to_owned).collect();
        Ok(MappedClaim::Present(ClaimValue::string_list(
            raw.clone(),
            scopes,
        )))
    }
}

/// Maps a numeric epoch-seconds claim to a date-time.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeMapper;

impl ClaimMapper for DateTimeMapper {
    fn map(&self, payload: &JsonObject, claim: &str) -> Result<MappedClaim, ValidationError> {
        let Some(value) = payload.get(claim) else {
            return Ok(MappedClaim::Absent);
        };
        let seconds = value
            .as_i64()
            .ok_or_else(|| invalid(claim, "is not a numeric epoch timestamp"))?;
        let instant = Utc
            .timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| invalid(claim, "is outside the representable time range"))?;
        Ok(MappedClaim::Present(ClaimValue::date_time(
            value.to_string(),
            instant,
        )))
    }
}

/// Maps Keycloak realm roles from `realm_access.roles`.
///
/// An absent structure maps to an empty list rather than an error; Keycloak
/// omits it for tokens without realm roles.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeycloakRolesMapper;

impl ClaimMapper for KeycloakRolesMapper {
    fn map(&self, payload: &JsonObject, claim: &str) -> Result<MappedClaim, ValidationError> {
        let roles = payload
            .get("realm_access")
            .and_then(Value::as_object)
            .and_then(|access| access.get("roles"));
        let Some(value) = roles else {
            return Ok(MappedClaim::Present(ClaimValue::string_list(
                "[]",
                Vec::new(),
            )));
        };
        let Value::Array(items) = value else {
            return Err(invalid(claim, "realm_access.roles is not an array"));
        };
        let roles = items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect();
        Ok(MappedClaim::Present(ClaimValue::string_list(
            value.to_string(),
            roles,
        )))
    }
}

/// Maps Keycloak group membership from the `groups` claim.
///
/// An absent claim maps to an empty list.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeycloakGroupsMapper;

impl ClaimMapper for KeycloakGroupsMapper {
    fn map(&self, payload: &JsonObject, claim: &str) -> Result<MappedClaim, ValidationError> {
        let Some(value) = payload.get("groups") else {
            return Ok(MappedClaim::Present(ClaimValue::string_list(
                "[]",
                Vec::new(),
            )));
        };
        let Value::Array(items) = value else {
            return Err(invalid(claim, "groups is not an array"));
        };
        let groups = items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect();
        Ok(MappedClaim::Present(ClaimValue::string_list(
            value.to_string(),
            groups,
        )))
    }
}
