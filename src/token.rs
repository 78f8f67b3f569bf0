//! Bearer token issuance and validation.
//!
//! Tokens are HS256 JSON Web Tokens signed with the process-wide secret:
//!
//! ```text
//! token     = base64url(header) "." base64url(claims) "." base64url(signature)
//! header    = {"alg":"HS256","typ":"JWT"}
//! claims    = {"name":"<client>","exp":<unix seconds>}
//! signature = HMAC-SHA256(secret, base64url(header) "." base64url(claims))
//! ```
//!
//! Every token expires 24 hours after issuance. Validation checks, in order:
//! structure, header algorithm, signature (constant-time), claim shape, expiry.
//!
//! # Example
//!
//! ```rust
//! use webcam_api::token::TokenService;
//!
//! let tokens = TokenService::new("my-secret-key");
//! let token = tokens.issue("front-door");
//!
//! let principal = tokens.validate(&token).unwrap();
//! assert_eq!(principal.name(), "front-door");
//! ```

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::TokenError;

type HmacSha256 = Hmac<Sha256>;

/// Lifetime of every issued token.
pub const TOKEN_TTL_HOURS: i64 = 24;

const ALGORITHM: &str = "HS256";

// =============================================================================
// Types
// =============================================================================

/// Payload embedded in a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Client name the token was issued to
    pub name: String,

    /// Expiry as Unix epoch seconds
    pub exp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default)]
    typ: Option<String>,
}

/// The client identity established for a request after token validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    name: String,
}

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

// =============================================================================
// Token Service
// =============================================================================

/// Issues and validates bearer tokens.
///
/// Cloning is cheap; the secret is shared and never mutated after construction.
#[derive(Clone)]
pub struct TokenService {
    secret: Arc<[u8]>,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl TokenService {
    /// Create a service signing with the given secret.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: Arc::from(secret.as_ref()),
        }
    }

    /// Issue a token for `name`, valid for 24 hours from now.
    pub fn issue(&self, name: &str) -> String {
        self.issue_at(name, Utc::now())
    }

    /// Issue a token as if the current time were `now`.
    pub fn issue_at(&self, name: &str, now: DateTime<Utc>) -> String {
        let claims = Claims {
            name: name.to_string(),
            exp: (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
        };
        self.encode(&claims)
    }

    /// Sign arbitrary claims. Useful for tooling and tests that need tokens
    /// with a specific expiry.
    pub fn encode(&self, claims: &Claims) -> String {
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: Some("JWT".to_string()),
        };

        // Serializing these two plain structs cannot fail
        let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap_or_default());
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap_or_default());

        let signing_input = format!("{}.{}", header, payload);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(signing_input.as_bytes()));

        format!("{}.{}", signing_input, signature)
    }

    /// Validate a token against the current time.
    pub fn validate(&self, token: &str) -> Result<Principal, TokenError> {
        self.validate_at(token, Utc::now())
    }

    /// Validate a token as if the current time were `now`.
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<Principal, TokenError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Missing);
        }

        // Anything after the second dot is signature, so a stray dot there
        // fails the signature check rather than the shape check
        let mut segments = token.splitn(3, '.');
        let (header, payload, signature) = match (segments.next(), segments.next(), segments.next())
        {
            (Some(h), Some(p), Some(s)) => (h, p, s),
            _ => {
                return Err(TokenError::Malformed(
                    "expected three dot-separated segments".to_string(),
                ))
            }
        };

        let header: Header = decode_segment(header, "header")?;
        if header.alg != ALGORITHM {
            return Err(TokenError::Malformed(format!(
                "unsupported algorithm {}",
                header.alg
            )));
        }

        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::InvalidSignature)?;
        let signing_input_len = token.len() - signature.len() - 1;
        let expected = self.sign(token[..signing_input_len].as_bytes());

        if !bool::from(provided.ct_eq(&expected)) {
            return Err(TokenError::InvalidSignature);
        }

        let claims: Claims = decode_segment(payload, "claims")?;
        if claims.name.is_empty() {
            return Err(TokenError::Malformed("empty name claim".to_string()));
        }

        let current_time = now.timestamp();
        if current_time >= claims.exp {
            return Err(TokenError::Expired {
                expired_at: claims.exp,
                current_time,
            });
        }

        Ok(Principal::new(claims.name))
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(message);
        mac.finalize().into_bytes().to_vec()
    }
}

fn decode_segment<T: for<'de> Deserialize<'de>>(
    segment: &str,
    what: &str,
) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| TokenError::Malformed(format!("{} is not base64url: {}", what, e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| TokenError::Malformed(format!("{} has the wrong shape: {}", what, e)))
}

// =============================================================================
// Tests
// =============================================================================
