//! Signed token encoding and validation.
//!
//! Tokens are three-part HS256 JWTs. The same codec type serves both access
//! and refresh tokens; the two differ only in the secret and lifetime the
//! caller constructs it with. Decoding always verifies structure, signature,
//! and algorithm; expiry enforcement is selectable because refresh validation
//! checks a stored access token that is expected to be stale.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Claim set embedded in every token: identity claim plus role claims.
/// Assembled fresh on each issuance, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user UUID). Defaulted on decode so a token missing the
    /// identity claim surfaces as a domain error, not a parse error.
    #[serde(default)]
    pub sub: String,
    /// Role names granted to the user at issuance time.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Whether `decode` enforces the embedded expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Enforce,
    Ignore,
}

/// Codec for one token family (one secret, one lifetime).
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime: Duration,
}

impl TokenCodec {
    /// Create a codec signing with the given secret, issuing tokens that
    /// expire after `lifetime`.
    pub fn new(secret: &[u8], lifetime: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            lifetime,
        }
    }

    /// Encode a signed token for the given subject and roles.
    pub fn encode(&self, sub: &str, roles: &[String]) -> Result<String, TokenError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| TokenError::TimeError)?
            .as_secs();

        let claims = Claims {
            sub: sub.to_string(),
            roles: roles.to_vec(),
            iat: now,
            exp: now + self.lifetime.as_secs(),
        };

        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(TokenError::Encoding)
    }

    /// Verify and decode a token.
    ///
    /// Signature, structure, and algorithm checks always run. With
    /// `Expiry::Ignore` an expired token still decodes as long as it is
    /// cryptographically ours.
    pub fn decode(&self, token: &str, expiry: Expiry) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = expiry == Expiry::Enforce;

        let token_data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => TokenError::SignatureInvalid,
                jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => TokenError::AlgorithmMismatch,
                _ => TokenError::Malformed,
            })?;

        Ok(token_data.claims)
    }
}

/// Errors that can occur during token operations.
#[derive(Debug)]
pub enum TokenError {
    /// Token cannot be parsed as a three-part signed token
    Malformed,
    /// Signature does not match the secret
    SignatureInvalid,
    /// Declared signing algorithm is not HMAC-SHA-256
    AlgorithmMismatch,
    /// Current time is past the embedded expiry
    Expired,
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// System time error
    TimeError,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Malformed => write!(f, "Token is malformed"),
            TokenError::SignatureInvalid => write!(f, "Token signature is invalid"),
            TokenError::AlgorithmMismatch => write!(f, "Token algorithm mismatch"),
            TokenError::Expired => write!(f, "Token is expired"),
            TokenError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            TokenError::TimeError => write!(f, "System time error"),
        }
    }
}

impl std::error::Error for TokenError {}
