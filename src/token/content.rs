//! Typed token content produced by a successful validation.
//!
//! The three variants share a common claim-map core; the access-token variant
//! carries the full set of typed accessors since it is the one applications
//! interrogate on every request.

use crate::claims::{ClaimValue, JsonObject};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// The kind of token a pipeline run validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    /// OAuth 2.0 access token.
    Access,
    /// OIDC ID token.
    Id,
    /// OAuth 2.0 refresh token.
    Refresh,
}

impl TokenType {
    /// Stable lowercase name, used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Id => "id",
            Self::Refresh => "refresh",
        }
    }
}

/// Shared core of all token content variants.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ClaimSet {
    pub(crate) claims: HashMap<String, ClaimValue>,
    pub(crate) raw_token: String,
    pub(crate) raw_payload: JsonObject,
}

impl ClaimSet {
    fn str_claim(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(ClaimValue::as_str)
    }

    fn time_claim(&self, name: &str) -> Option<DateTime<Utc>> {
        self.claims.get(name).and_then(ClaimValue::as_date_time)
    }

    fn list_claim(&self, name: &str) -> &[String] {
        self.claims
            .get(name)
            .and_then(ClaimValue::as_list)
            .unwrap_or(&[])
    }
}

macro_rules! content_common {
    ($ty:ty, $token_type:expr) => {
        impl $ty {
            /// All mapped claims by name.
            pub fn claims(&self) -> &HashMap<String, ClaimValue> {
                &self.claim_set.claims
            }

            /// The raw compact-serialized token.
            pub fn raw_token(&self) -> &str {
                &self.claim_set.raw_token
            }

            /// The decoded payload before claim mapping.
            pub fn raw_payload(&self) -> &JsonObject {
                &self.claim_set.raw_payload
            }

            /// The token kind.
            pub fn token_type(&self) -> TokenType {
                $token_type
            }

            /// The `exp` claim.
            pub fn expires_at(&self) -> Option<DateTime<Utc>> {
                self.claim_set.time_claim("exp")
            }
        }
    };
}

/// Content of a validated access token.
///
/// # Example
///
/// ```rust,ignore
/// let content = validator.validate(&raw).await?;
/// if content.has_scope("read:data") {
///     // authorized for the read scope
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AccessTokenContent {
    pub(crate) claim_set: ClaimSet,
}

content_common!(AccessTokenContent, TokenType::Access);

impl AccessTokenContent {
    /// The `sub` claim.
    pub fn subject(&self) -> Option<&str> {
        self.claim_set.str_claim("sub")
    }

    /// The `iss` claim.
    pub fn issuer(&self) -> Option<&str> {
        self.claim_set.str_claim("iss")
    }

    /// The `jti` claim.
    pub fn token_id(&self) -> Option<&str> {
        self.claim_set.str_claim("jti")
    }

    /// The `azp` claim.
    pub fn authorized_party(&self) -> Option<&str> {
        self.claim_set.str_claim("azp")
    }

    /// The `aud` claim as a list (a single-string audience becomes one entry).
    pub fn audience(&self) -> &[String] {
        self.claim_set.list_claim("aud")
    }

    /// The `nbf` claim.
    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.claim_set.time_claim("nbf")
    }

    /// The `iat` claim.
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.claim_set.time_claim("iat")
    }

    /// The scopes from the `scope` claim.
    pub fn scopes(&self) -> &[String] {
        self.claim_set.list_claim("scope")
    }

    /// Mapped roles (by default, Keycloak `realm_access.roles`).
    pub fn roles(&self) -> &[String] {
        self.claim_set.list_claim("roles")
    }

    /// Mapped groups (by default, the Keycloak `groups` claim).
    pub fn groups(&self) -> &[String] {
        self.claim_set.list_claim("groups")
    }

    /// Whether the token carries the given scope.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes().iter().any(|s| s == scope)
    }

    /// Whether the token carries the given role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles().iter().any(|r| r == role)
    }

    /// Whether the token carries the given group.
    pub fn has_group(&self, group: &str) -> bool {
        self.groups().iter().any(|g| g == group)
    }
}

/// Content of a validated ID token.
#[derive(Debug, Clone, PartialEq)]
pub struct IdTokenContent {
    pub(crate) claim_set: ClaimSet,
}

content_common!(IdTokenContent, TokenType::Id);

impl IdTokenContent {
    /// The `sub` claim.
    pub fn subject(&self) -> Option<&str> {
        self.claim_set.str_claim("sub")
    }

    /// The `aud` claim as a list.
    pub fn audience(&self) -> &[String] {
        self.claim_set.list_claim("aud")
    }

    /// The `azp` claim.
    pub fn authorized_party(&self) -> Option<&str> {
        self.claim_set.str_claim("azp")
    }
}

/// Content of a validated refresh token.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshTokenContent {
    pub(crate) claim_set: ClaimSet,
}

content_common!(RefreshTokenContent, TokenType::Refresh);

impl RefreshTokenContent {
    /// The `sub` claim.
    pub fn subject(&self) -> Option<&str> {
        self.claim_set.str_claim("sub")
    }
}
