//! Typed claim values and per-claim mappers.
//!
//! Raw JWT payloads are untyped JSON objects. Each claim name has a mapper
//! that extracts the claim into a [`ClaimValue`] carrying both the original
//! serialized form and the parsed value, or fails with a categorized error.
//! A claim that is present but empty stays distinguishable from a claim that
//! is absent ([`MappedClaim`]), so required-claim enforcement downstream can
//! tell the two apart.

pub mod mappers;
pub mod value;

pub use mappers::{
    AudienceMapper, ClaimMapper, DateTimeMapper, IdentityMapper, KeycloakGroupsMapper,
    KeycloakRolesMapper, ScopeMapper, StringListMapper,
};
pub use value::{ClaimKind, ClaimValue, MappedClaim};

/// A decoded JSON object, as produced by token parsing.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;
