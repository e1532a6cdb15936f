//! Identity tokens and the identity-backed credential supplier.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

use super::endpoint::{EndpointTarget, Region, SignedEndpoint};
use super::{Credential, CredentialSupplier};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Password (plus optional one-time code) for the identity check.
#[derive(Clone)]
pub struct Secret {
    password: String,
    mfa_code: Option<String>,
}

impl Secret {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
            mfa_code: None,
        }
    }

    pub fn with_mfa_code(mut self, code: impl Into<String>) -> Self {
        self.mfa_code = Some(code.into());
        self
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn mfa_code(&self) -> Option<&str> {
        self.mfa_code.as_deref()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("password", &"<redacted>")
            .field("mfa_code", &self.mfa_code.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A JWT identity token issued by the identity provider.
///
/// Only the claims segment is read, for the principal name and expiry. The
/// signature is the identity provider's business.
#[derive(Clone, PartialEq, Eq)]
pub struct IdToken {
    jwt: String,
    principal: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl IdToken {
    pub fn parse(jwt: impl Into<String>) -> Result<Self> {
        let jwt = jwt.into();
        let mut segments = jwt.split('.');
        let claims_segment = match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(claims), Some(_), None) => claims,
            _ => return Err(ClientError::Authentication("Malformed identity token".into())),
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(claims_segment.trim_end_matches('='))
            .map_err(|e| ClientError::Authentication(format!("Malformed identity token claims: {}", e)))?;
        let claims: Value = serde_json::from_slice(&bytes)
            .map_err(|e| ClientError::Authentication(format!("Malformed identity token claims: {}", e)))?;

        let principal = ["cognito:username", "username", "sub"]
            .iter()
            .find_map(|key| claims.get(*key).and_then(Value::as_str))
            .map(str::to_string);
        let expires_at = claims
            .get("exp")
            .and_then(Value::as_i64)
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        Ok(Self {
            jwt,
            principal,
            expires_at,
        })
    }

    pub fn jwt(&self) -> &str {
        &self.jwt
    }

    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

impl fmt::Debug for IdToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdToken")
            .field("principal", &self.principal)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Exchanges principal + secret for an identity token (round-trip one).
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, principal: &str, secret: &Secret) -> Result<IdToken>;
}

/// Mints a signed endpoint from an identity token (round-trip two).
#[async_trait]
pub trait EndpointSigner: Send + Sync {
    async fn sign(
        &self,
        token: &IdToken,
        region: Region,
        target: &EndpointTarget,
    ) -> Result<SignedEndpoint>;
}

/// Credential supplier backed by an identity provider and an endpoint signer.
///
/// The identity token from the first successful check is cached and reused by
/// later `obtain()` calls until it expires, so reconnects only pay for the
/// signing round-trip.
pub struct IdentityCredentialSupplier<I, S> {
    identity: I,
    signer: S,
    principal: String,
    secret: Option<Secret>,
    region: Region,
    endpoint_url: Option<String>,
    cached_token: Mutex<Option<IdToken>>,
}

impl<I, S> IdentityCredentialSupplier<I, S>
where
    I: IdentityProvider,
    S: EndpointSigner,
{
    pub fn new(identity: I, signer: S, principal: impl Into<String>, region: Region) -> Self {
        Self {
            identity,
            signer,
            principal: principal.into(),
            secret: None,
            region,
            endpoint_url: None,
            cached_token: Mutex::new(None),
        }
    }

    /// Principal, region and endpoint override taken from the config.
    pub fn from_config(identity: I, signer: S, config: &ClientConfig) -> Result<Self> {
        let principal = config
            .username
            .clone()
            .ok_or_else(|| ClientError::Configuration("No username configured".into()))?;
        let supplier = Self::new(identity, signer, principal, config.region);
        Ok(match &config.endpoint_url {
            Some(url) => supplier.with_endpoint_url(url.clone()),
            None => supplier,
        })
    }

    pub fn with_secret(mut self, secret: Secret) -> Self {
        self.secret = Some(secret);
        self
    }

    /// Seed the cache with a token from an earlier login.
    pub fn with_cached_token(self, token: IdToken) -> Self {
        *self.cached_token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
        self
    }

    pub fn with_endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }

    pub fn cached_token(&self) -> Option<IdToken> {
        self.cached_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn identity_token(&self) -> Result<IdToken> {
        if let Some(token) = self.cached_token() {
            if !token.is_expired_at(Utc::now()) {
                debug!(principal = %self.principal, "Using cached identity token");
                return Ok(token);
            }
            debug!(principal = %self.principal, "Cached identity token expired");
        }

        let Some(secret) = self.secret.as_ref() else {
            return Err(if self.cached_token().is_some() {
                ClientError::CredentialExpired(
                    "Cached identity token expired and no secret to renew it".into(),
                )
            } else {
                ClientError::Configuration(
                    "Neither a secret nor a cached identity token was supplied".into(),
                )
            });
        };

        debug!(principal = %self.principal, "Fetching identity token");
        let token = self.identity.authenticate(&self.principal, secret).await?;
        *self.cached_token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        Ok(token)
    }
}

#[async_trait]
impl<I, S> CredentialSupplier for IdentityCredentialSupplier<I, S>
where
    I: IdentityProvider,
    S: EndpointSigner,
{
    async fn obtain(&self) -> Result<Credential> {
        let target = EndpointTarget::resolve(self.region, self.endpoint_url.as_deref())?;
        let token = self.identity_token().await?;
        let signed = self.signer.sign(&token, self.region, &target).await?;

        let principal_id = token
            .principal()
            .map(str::to_string)
            .unwrap_or_else(|| self.principal.clone());

        info!(principal = %principal_id, region = %self.region, host = %target.host, "Credential issued");

        Ok(Credential {
            principal_id,
            signed_endpoint: signed.url,
            expires_at: signed.expires_at,
            id_token: Some(token),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Build an unsigned JWT carrying `claims`.
    pub(crate) fn jwt(claims: Value) -> String {
        let claims = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        format!("eyJhbGciOiJub25lIn0.{}.c2ln", claims)
    }

    struct CountingIdentity {
        calls: Arc<AtomicUsize>,
        accept: bool,
    }

    #[async_trait]
    impl IdentityProvider for CountingIdentity {
        async fn authenticate(&self, principal: &str, secret: &Secret) -> Result<IdToken> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.accept || secret.password() != "hunter2" {
                return Err(ClientError::Authentication("Incorrect username or password".into()));
            }
            IdToken::parse(jwt(serde_json::json!({
                "cognito:username": principal,
                "exp": (Utc::now() + Duration::hours(1)).timestamp(),
            })))
        }
    }

    struct FakeSigner;

    #[async_trait]
    impl EndpointSigner for FakeSigner {
        async fn sign(
            &self,
            _token: &IdToken,
            region: Region,
            target: &EndpointTarget,
        ) -> Result<SignedEndpoint> {
            Ok(SignedEndpoint {
                url: format!("{}?X-Region={}&X-Signature=abc", target.wss_url(), region),
                expires_at: Some(Utc::now() + Duration::minutes(5)),
            })
        }
    }

    fn supplier(accept: bool) -> (IdentityCredentialSupplier<CountingIdentity, FakeSigner>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let identity = CountingIdentity {
            calls: Arc::clone(&calls),
            accept,
        };
        (
            IdentityCredentialSupplier::new(identity, FakeSigner, "alice", Region::EuNorth1),
            calls,
        )
    }

    #[test]
    fn test_parse_token_claims() {
        let token = IdToken::parse(jwt(serde_json::json!({"sub": "u-1", "exp": 1_700_000_000}))).unwrap();
        assert_eq!(token.principal(), Some("u-1"));
        assert!(token.is_expired_at(Utc::now()));
        assert!(IdToken::parse("not-a-jwt").is_err());
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let rendered = format!("{:?}", Secret::new("hunter2").with_mfa_code("123456"));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("123456"));
    }

    #[tokio::test]
    async fn test_missing_secret_and_token_is_configuration_error() {
        let (supplier, calls) = supplier(true);
        assert!(matches!(supplier.obtain().await, Err(ClientError::Configuration(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejected_identity_is_authentication_error() {
        let (supplier, _) = supplier(false);
        let supplier = supplier.with_secret(Secret::new("hunter2"));
        assert!(matches!(supplier.obtain().await, Err(ClientError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_token_cached_across_obtains() {
        let (supplier, calls) = supplier(true);
        let supplier = supplier
            .with_secret(Secret::new("hunter2"))
            .with_endpoint_url("wss://gw.example.com/dev");

        let first = supplier.obtain().await.unwrap();
        let second = supplier.obtain().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.principal_id, "alice");
        assert!(second
            .signed_endpoint
            .starts_with("wss://gw.example.com/dev?X-Region=eu-north-1"));
        assert!(!second.is_expired_at(Utc::now()));
    }

    #[tokio::test]
    async fn test_from_config_uses_username_region_and_endpoint() {
        let calls = Arc::new(AtomicUsize::new(0));
        let identity = CountingIdentity {
            calls: Arc::clone(&calls),
            accept: true,
        };
        let config = ClientConfig {
            region: Region::UsWest2,
            username: Some("carol".into()),
            endpoint_url: Some("wss://gw.example.com/dev".into()),
            ..Default::default()
        };

        let credential = IdentityCredentialSupplier::from_config(identity, FakeSigner, &config)
            .unwrap()
            .with_secret(Secret::new("hunter2"))
            .obtain()
            .await
            .unwrap();

        assert_eq!(credential.principal_id, "carol");
        assert!(credential
            .signed_endpoint
            .starts_with("wss://gw.example.com/dev?X-Region=us-west-2"));
    }

    #[test]
    fn test_from_config_requires_username() {
        let identity = CountingIdentity {
            calls: Arc::new(AtomicUsize::new(0)),
            accept: true,
        };
        let result = IdentityCredentialSupplier::from_config(identity, FakeSigner, &ClientConfig::default());
        assert!(matches!(result, Err(ClientError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_seeded_token_skips_identity_check() {
        let (supplier, calls) = supplier(true);
        let token = IdToken::parse(jwt(serde_json::json!({
            "cognito:username": "bob",
            "exp": (Utc::now() + Duration::hours(1)).timestamp(),
        })))
        .unwrap();
        let credential = supplier.with_cached_token(token).obtain().await.unwrap();
        assert_eq!(credential.principal_id, "bob");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_seed_without_secret() {
        let (supplier, _) = supplier(true);
        let token = IdToken::parse(jwt(serde_json::json!({"sub": "bob", "exp": 1}))).unwrap();
        assert!(matches!(
            supplier.with_cached_token(token).obtain().await,
            Err(ClientError::CredentialExpired(_))
        ));
    }
}
