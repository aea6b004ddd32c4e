//! Bearer token verification against the external identity provider
//!
//! Tokens are issued elsewhere; this side only checks signatures and the
//! standard claims, then hands back the stable subject identifier.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{
    decode, decode_header, errors::ErrorKind, jwk::JwkSet, Algorithm, DecodingKey, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::{IdentityConfig, IdentityKeySource};

/// Minimum spacing between JWKS fetches triggered by unknown key ids
const JWKS_MIN_REFRESH: Duration = Duration::from_secs(60);

/// Identity verification errors
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Token expired")]
    Expired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Unknown signing key: {0}")]
    UnknownKey(String),

    /// The provider's keys could not be obtained
    #[error("Signing keys unavailable: {0}")]
    KeyUnavailable(String),

    #[error("Invalid identity configuration: {0}")]
    Config(String),
}

impl From<jsonwebtoken::errors::Error> for IdentityError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => IdentityError::Expired,
            _ => IdentityError::InvalidToken(err.to_string()),
        }
    }
}

/// Claims read from provider tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Provider subject id
    pub sub: String,
    /// Provider session id, when the provider issues one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Single string or array; matching is done by `Validation`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<serde_json::Value>,
}

/// Outcome of a successful verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub subject: String,
    pub session_id: Option<String>,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError>;
}

enum KeySource {
    Static(DecodingKey),
    Jwks {
        url: String,
        http: reqwest::Client,
        cache: RwLock<JwksCache>,
    },
}

#[derive(Default)]
struct JwksCache {
    keys: HashMap<String, DecodingKey>,
    refreshed_at: Option<Instant>,
}

impl JwksCache {
    fn refresh_due(&self, now: Instant) -> bool {
        match self.refreshed_at {
            Some(at) => now.saturating_duration_since(at) >= JWKS_MIN_REFRESH,
            None => true,
        }
    }
}

/// JWT verifier for HS256 secrets, RS256 PEM keys or a JWKS endpoint
pub struct JwtIdentityVerifier {
    source: KeySource,
    validation: Validation,
}

impl JwtIdentityVerifier {
    pub fn from_config(config: &IdentityConfig) -> Result<Self, IdentityError> {
        let (source, algorithm) = match &config.key_source {
            IdentityKeySource::Secret(secret) => (
                KeySource::Static(DecodingKey::from_secret(secret.as_bytes())),
                Algorithm::HS256,
            ),
            IdentityKeySource::PublicKeyPem(pem) => {
                let key = DecodingKey::from_rsa_pem(pem.as_bytes())
                    .map_err(|e| IdentityError::Config(e.to_string()))?;
                (KeySource::Static(key), Algorithm::RS256)
            }
            IdentityKeySource::Jwks(url) => (
                KeySource::Jwks {
                    url: url.clone(),
                    http: reqwest::Client::new(),
                    cache: RwLock::new(JwksCache::default()),
                },
                Algorithm::RS256,
            ),
        };

        let mut validation = Validation::new(algorithm);
        validation.leeway = 5;
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self { source, validation })
    }

    async fn decoding_key(&self, token: &str) -> Result<DecodingKey, IdentityError> {
        match &self.source {
            KeySource::Static(key) => Ok(key.clone()),
            KeySource::Jwks { url, http, cache } => {
                let kid = decode_header(token)?
                    .kid
                    .ok_or_else(|| IdentityError::InvalidToken("missing kid".to_string()))?;

                if let Some(key) = cache.read().await.keys.get(&kid) {
                    return Ok(key.clone());
                }

                // Unknown kid: the provider may have rotated keys. The write
                // lock makes concurrent misses wait for a single fetch.
                let mut cache = cache.write().await;
                if let Some(key) = cache.keys.get(&kid) {
                    return Ok(key.clone());
                }
                let now = Instant::now();
                if !cache.refresh_due(now) {
                    tracing::debug!(kid = %kid, "JWKS refresh throttled");
                    return Err(IdentityError::UnknownKey(kid));
                }
                cache.refreshed_at = Some(now);

                match fetch_jwks(http, url).await {
                    Ok(fetched) => cache.keys = fetched,
                    Err(e) => {
                        tracing::warn!(
                            url = %url,
                            cached = cache.keys.len(),
                            error = %e,
                            "JWKS refresh failed, keeping cached keys"
                        );
                        return Err(e);
                    }
                }
                cache
                    .keys
                    .get(&kid)
                    .cloned()
                    .ok_or(IdentityError::UnknownKey(kid))
            }
        }
    }
}

async fn fetch_jwks(
    http: &reqwest::Client,
    url: &str,
) -> Result<HashMap<String, DecodingKey>, IdentityError> {
    let set: JwkSet = http
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| IdentityError::KeyUnavailable(e.to_string()))?
        .json()
        .await
        .map_err(|e| IdentityError::KeyUnavailable(e.to_string()))?;

    let keys: HashMap<String, DecodingKey> = set
        .keys
        .iter()
        .filter_map(|jwk| {
            let kid = jwk.common.key_id.clone()?;
            DecodingKey::from_jwk(jwk).ok().map(|key| (kid, key))
        })
        .collect();

    tracing::info!(url = %url, keys = keys.len(), "Identity provider keys refreshed");
    Ok(keys)
}

#[async_trait]
impl IdentityVerifier for JwtIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        let key = self.decoding_key(token).await?;
        let data = decode::<IdentityClaims>(token, &key, &self.validation)?;

        if data.claims.sub.trim().is_empty() {
            return Err(IdentityError::InvalidToken("empty subject".to_string()));
        }

        Ok(VerifiedIdentity {
            subject: data.claims.sub,
            session_id: data.claims.sid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret-key";

    fn verifier(issuer: Option<&str>) -> JwtIdentityVerifier {
        JwtIdentityVerifier::from_config(&IdentityConfig {
            key_source: IdentityKeySource::Secret(SECRET.to_string()),
            issuer: issuer.map(str::to_string),
            audience: None,
        })
        .unwrap()
    }

    fn token(sub: &str, exp_offset: Duration, iss: Option<&str>, secret: &str) -> String {
        let claims = IdentityClaims {
            sub: sub.to_string(),
            sid: Some("sess_1".to_string()),
            exp: (Utc::now() + exp_offset).timestamp(),
            iat: Some(Utc::now().timestamp()),
            iss: iss.map(str::to_string),
            aud: None,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_valid_token_yields_subject() {
        let identity = verifier(None)
            .verify(&token("user_2abc", Duration::minutes(5), None, SECRET))
            .await
            .unwrap();
        assert_eq!(identity.subject, "user_2abc");
        assert_eq!(identity.session_id.as_deref(), Some("sess_1"));
    }

    #[tokio::test]
    async fn test_expired_token() {
        let err = verifier(None)
            .verify(&token("user_2abc", Duration::minutes(-10), None, SECRET))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Expired));
    }

    #[tokio::test]
    async fn test_wrong_secret() {
        let err = verifier(None)
            .verify(&token("user_2abc", Duration::minutes(5), None, "other"))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_issuer_is_enforced() {
        let v = verifier(Some("https://issuer.example"));
        assert!(v
            .verify(&token("u", Duration::minutes(5), Some("https://issuer.example"), SECRET))
            .await
            .is_ok());
        assert!(v
            .verify(&token("u", Duration::minutes(5), Some("https://evil.example"), SECRET))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_garbage_token() {
        assert!(verifier(None).verify("invalid.token.here").await.is_err());
    }

    #[test]
    fn test_bad_pem_is_a_config_error() {
        let result = JwtIdentityVerifier::from_config(&IdentityConfig {
            key_source: IdentityKeySource::PublicKeyPem("not a pem".to_string()),
            issuer: None,
            audience: None,
        });
        assert!(matches!(result, Err(IdentityError::Config(_))));
    }

    #[tokio::test]
    async fn test_array_audience_is_accepted() {
        let claims = json!({
            "sub": "user_2abc",
            "exp": (Utc::now() + Duration::minutes(5)).timestamp(),
            "aud": ["barter-api", "x"],
        });
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let identity = verifier(None).verify(&token).await.unwrap();
        assert_eq!(identity.subject, "user_2abc");

        let with_audience = JwtIdentityVerifier::from_config(&IdentityConfig {
            key_source: IdentityKeySource::Secret(SECRET.to_string()),
            issuer: None,
            audience: Some("barter-api".to_string()),
        })
        .unwrap();
        assert!(with_audience.verify(&token).await.is_ok());
    }

    fn jwks_verifier() -> JwtIdentityVerifier {
        // Nothing listens on port 9; fetches fail fast.
        JwtIdentityVerifier::from_config(&IdentityConfig {
            key_source: IdentityKeySource::Jwks("http://127.0.0.1:9/jwks.json".to_string()),
            issuer: None,
            audience: None,
        })
        .unwrap()
    }

    fn token_with_kid(kid: &str) -> String {
        let header = Header {
            kid: Some(kid.to_string()),
            ..Header::default()
        };
        let claims = json!({ "sub": "u", "exp": (Utc::now() + Duration::minutes(5)).timestamp() });
        encode(&header, &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    #[test]
    fn test_jwks_refresh_is_rate_limited() {
        let now = Instant::now();
        let mut cache = JwksCache::default();
        assert!(cache.refresh_due(now));

        cache.refreshed_at = Some(now);
        assert!(!cache.refresh_due(now));
        assert!(!cache.refresh_due(now + std::time::Duration::from_secs(59)));
        assert!(cache.refresh_due(now + JWKS_MIN_REFRESH));
    }

    #[tokio::test]
    async fn test_unknown_kid_fetches_at_most_once_per_interval() {
        let v = jwks_verifier();

        let first = v.verify(&token_with_kid("rotated")).await.unwrap_err();
        assert!(matches!(first, IdentityError::KeyUnavailable(_)));

        let second = v.verify(&token_with_kid("rotated")).await.unwrap_err();
        assert!(matches!(second, IdentityError::UnknownKey(_)));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_cached_keys() {
        let v = jwks_verifier();
        let KeySource::Jwks { cache, .. } = &v.source else {
            panic!("expected a JWKS source");
        };
        cache
            .write()
            .await
            .keys
            .insert("current".to_string(), DecodingKey::from_secret(SECRET.as_bytes()));

        let err = v.verify(&token_with_kid("next")).await.unwrap_err();
        assert!(matches!(err, IdentityError::KeyUnavailable(_)));
        assert!(cache.read().await.keys.contains_key("current"));
    }
}
