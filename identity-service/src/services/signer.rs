//! RS256 token signing.
//!
//! Claims arrive as an ordered list of key/value pairs; repeated keys (the
//! permission claims) collapse into a JSON array so the payload stays a flat
//! object.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use identity_core::error::IdentityError;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single claim to place in a token payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    pub key: String,
    pub value: String,
}

impl Claim {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Fold a claim list into a JSON object. A key that appears once maps to a
/// string; a key that appears more than once maps to an array in order of
/// first appearance.
pub fn claims_to_payload(claims: &[Claim]) -> serde_json::Map<String, serde_json::Value> {
    let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut order: Vec<&str> = Vec::new();
    for claim in claims {
        let entry = grouped.entry(claim.key.as_str()).or_default();
        if entry.is_empty() {
            order.push(claim.key.as_str());
        }
        entry.push(claim.value.as_str());
    }

    let mut payload = serde_json::Map::new();
    for key in order {
        let values = &grouped[key];
        let value = if values.len() == 1 {
            serde_json::Value::String(values[0].to_string())
        } else {
            serde_json::Value::Array(
                values
                    .iter()
                    .map(|v| serde_json::Value::String(v.to_string()))
                    .collect(),
            )
        };
        payload.insert(key.to_string(), value);
    }
    payload
}

/// Signs access tokens. Behind a trait so signing can be delegated to a
/// key-management service without touching the token issuer.
pub trait AccessTokenSigner: Send + Sync {
    fn sign(&self, claims: &[Claim], expiry_minutes: i64) -> Result<String, IdentityError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct TempTokenClaims {
    sub: String,
    email: String,
    temp_token: bool,
    iat: i64,
    exp: i64,
}

/// RS256 signer backed by a local PEM key pair.
#[derive(Clone)]
pub struct JwtSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    temp_token_expiry_minutes: i64,
}

impl JwtSigner {
    /// Load the signing key pair from PEM files on disk.
    pub fn from_pem_files(
        private_key_path: &str,
        public_key_path: &str,
        temp_token_expiry_minutes: i64,
    ) -> Result<Self, IdentityError> {
        let private_pem = std::fs::read(private_key_path).map_err(|e| {
            IdentityError::Config(anyhow::anyhow!(
                "Failed to read private key from {}: {}",
                private_key_path,
                e
            ))
        })?;
        let public_pem = std::fs::read(public_key_path).map_err(|e| {
            IdentityError::Config(anyhow::anyhow!(
                "Failed to read public key from {}: {}",
                public_key_path,
                e
            ))
        })?;

        let encoding_key = EncodingKey::from_rsa_pem(&private_pem)
            .map_err(|e| IdentityError::Config(anyhow::anyhow!("Invalid private key: {}", e)))?;
        let decoding_key = DecodingKey::from_rsa_pem(&public_pem)
            .map_err(|e| IdentityError::Config(anyhow::anyhow!("Invalid public key: {}", e)))?;

        Ok(Self {
            encoding_key,
            decoding_key,
            temp_token_expiry_minutes,
        })
    }

    pub fn temp_token_expiry_minutes(&self) -> i64 {
        self.temp_token_expiry_minutes
    }

    /// Sign a short-lived pre-authentication token carried between the
    /// password step and the OTP step of login.
    pub fn sign_temp_token(&self, user_id: Uuid, email: &str) -> Result<String, IdentityError> {
        let now = Utc::now();
        let claims = TempTokenClaims {
            sub: user_id.to_string(),
            email: email.to_string(),
            temp_token: true,
            iat: now.timestamp(),
            exp: (now + Duration::minutes(self.temp_token_expiry_minutes)).timestamp(),
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| IdentityError::Internal(anyhow::anyhow!("Token signing failed: {}", e)))
    }

    /// Verify a pre-authentication token and return the user it names.
    /// Rejects full access tokens, which never carry the temp marker.
    pub fn verify_temp_token(&self, token: &str) -> Result<(Uuid, String), IdentityError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;

        let data = decode::<TempTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|_| IdentityError::Unauthorized(anyhow::anyhow!("Invalid or expired token")))?;

        if !data.claims.temp_token {
            return Err(IdentityError::Unauthorized(anyhow::anyhow!(
                "Invalid or expired token"
            )));
        }

        let user_id = Uuid::parse_str(&data.claims.sub)
            .map_err(|_| IdentityError::Unauthorized(anyhow::anyhow!("Invalid or expired token")))?;
        Ok((user_id, data.claims.email))
    }
}

impl AccessTokenSigner for JwtSigner {
    fn sign(&self, claims: &[Claim], expiry_minutes: i64) -> Result<String, IdentityError> {
        let now = Utc::now();
        let mut payload = claims_to_payload(claims);
        payload.insert("iat".to_string(), serde_json::json!(now.timestamp()));
        payload.insert(
            "exp".to_string(),
            serde_json::json!((now + Duration::minutes(expiry_minutes)).timestamp()),
        );

        encode(
            &Header::new(Algorithm::RS256),
            &serde_json::Value::Object(payload),
            &self.encoding_key,
        )
        .map_err(|e| IdentityError::Internal(anyhow::anyhow!("Token signing failed: {}", e)))
    }
}
