//! Token types and authorization.

use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Number of random bytes in a freshly generated token secret.
pub const TOKEN_SECRET_BYTES: usize = 32;

/// Unique identifier for a token.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenId(Uuid);

impl From<Uuid> for TokenId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenId({})", self.0)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Token scopes for authorization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenScope {
    /// Fetch the owning user's subscription.
    #[serde(rename = "subscription:read")]
    SubscriptionRead,
    /// Full administrative access.
    #[serde(rename = "admin")]
    Admin,
}

impl TokenScope {
    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "subscription:read" => Ok(Self::SubscriptionRead),
            "admin" => Ok(Self::Admin),
            _ => Err(crate::Error::InvalidScope(format!("unknown scope: {s}"))),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubscriptionRead => "subscription:read",
            Self::Admin => "admin",
        }
    }

    /// Check if this scope implies another scope.
    pub fn implies(&self, other: &Self) -> bool {
        match self {
            Self::Admin => true,
            Self::SubscriptionRead => matches!(other, Self::SubscriptionRead),
        }
    }
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A validated token with its metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Token {
    /// Token identifier.
    pub id: TokenId,
    /// Owning user for subscription tokens.
    pub user_id: Option<Uuid>,
    /// Granted scopes.
    pub scopes: HashSet<TokenScope>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub description: Option<String>,
}

impl Token {
    /// Check if the token is valid (not expired or revoked).
    pub fn is_valid(&self) -> bool {
        if self.revoked_at.is_some() {
            return false;
        }

        if let Some(expires_at) = self.expires_at
            && OffsetDateTime::now_utc() > expires_at
        {
            return false;
        }

        true
    }

    /// Check if the token has a specific scope.
    pub fn has_scope(&self, scope: TokenScope) -> bool {
        self.scopes.iter().any(|s| s.implies(&scope))
    }

    /// Check if the token has admin access.
    pub fn is_admin(&self) -> bool {
        self.is_valid() && self.has_scope(TokenScope::Admin)
    }
}

/// Parse a JSON array of scope strings as stored alongside a token.
pub fn parse_scopes(json: &str) -> crate::Result<HashSet<TokenScope>> {
    let raw: Vec<String> = serde_json::from_str(json)
        .map_err(|e| crate::Error::Serialization(format!("invalid scopes JSON: {e}")))?;
    raw.iter().map(|s| TokenScope::parse(s)).collect()
}

/// Serialize scopes into the stored JSON array form.
pub fn scopes_to_json(scopes: &[TokenScope]) -> String {
    let raw: Vec<&str> = scopes.iter().map(TokenScope::as_str).collect();
    serde_json::to_string(&raw).unwrap_or_else(|_| "[]".to_string())
}

/// SHA-256 of a token secret, lowercase hex. Only this digest is persisted.
pub fn hash_token(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Generate a new URL-safe token secret.
pub fn generate_token_secret() -> String {
    let mut bytes = [0u8; TOKEN_SECRET_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Normalize a configured token hash: strips an optional `sha256:` prefix,
/// lowercases, and requires exactly 64 hex characters.
pub fn normalize_token_hash(configured: &str) -> crate::Result<String> {
    let trimmed = configured.trim();
    let hex_part = trimmed.strip_prefix("sha256:").unwrap_or(trimmed);
    if hex_part.len() != 64 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(crate::Error::InvalidToken(
            "token hash must be 64 hex characters (optionally prefixed with sha256:)".to_string(),
        ));
    }
    Ok(hex_part.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_implies() {
        assert!(TokenScope::Admin.implies(&TokenScope::SubscriptionRead));
        assert!(TokenScope::Admin.implies(&TokenScope::Admin));
        assert!(TokenScope::SubscriptionRead.implies(&TokenScope::SubscriptionRead));
        assert!(!TokenScope::SubscriptionRead.implies(&TokenScope::Admin));
    }

    fn token(scopes: &[TokenScope]) -> Token {
        Token {
            id: TokenId::from(Uuid::new_v4()),
            user_id: None,
            scopes: scopes.iter().copied().collect(),
            expires_at: None,
            revoked_at: None,
            created_at: OffsetDateTime::now_utc(),
            description: None,
        }
    }

    #[test]
    fn test_is_admin_requires_valid_admin_scope() {
        assert!(token(&[TokenScope::Admin]).is_admin());
        assert!(!token(&[TokenScope::SubscriptionRead]).is_admin());

        let mut revoked = token(&[TokenScope::Admin]);
        revoked.revoked_at = Some(OffsetDateTime::now_utc());
        assert!(!revoked.is_admin());

        let mut expired = token(&[TokenScope::Admin]);
        expired.expires_at = Some(OffsetDateTime::now_utc() - time::Duration::hours(1));
        assert!(!expired.is_admin());
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!(TokenScope::parse("admin").unwrap(), TokenScope::Admin);
        assert_eq!(
            TokenScope::parse("subscription:read").unwrap(),
            TokenScope::SubscriptionRead
        );
        assert!(TokenScope::parse("cache:read").is_err());
    }

    #[test]
    fn test_scopes_json_round_trip() {
        let json = scopes_to_json(&[TokenScope::Admin]);
        assert_eq!(json, r#"["admin"]"#);
        let parsed = parse_scopes(&json).unwrap();
        assert!(parsed.contains(&TokenScope::Admin));
        assert!(parse_scopes(r#"["nope"]"#).is_err());
    }

    #[test]
    fn test_hash_token_is_sha256_hex() {
        assert_eq!(
            hash_token("test-admin-token"),
            "17d6bfe05d1b1fb7bc499f8e3f639c7b3eda4c40f321eef8887a0c04c89a99c5"
        );
    }

    #[test]
    fn test_generated_secrets_are_unique_and_url_safe() {
        let a = generate_token_secret();
        let b = generate_token_secret();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(
            a.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_normalize_token_hash() {
        let hash = "9F735E0DF9A1DDC702BF0A1A7B83033F9F7153A00C29DE82CEDADC9957289B05";
        assert_eq!(
            normalize_token_hash(&format!("sha256:{hash}")).unwrap(),
            hash.to_ascii_lowercase()
        );
        assert!(normalize_token_hash("abc").is_err());
        assert!(normalize_token_hash(&"z".repeat(64)).is_err());
    }
}
