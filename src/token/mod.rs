//! Token decoding and typed token content.

pub mod content;
pub mod decoded;

pub use content::{AccessTokenContent, IdTokenContent, RefreshTokenContent, TokenType};
pub use decoded::{DecodedToken, ParserConfig, TokenDecoder};
