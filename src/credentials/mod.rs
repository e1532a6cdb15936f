//! Credential Supply
//!
//! Single responsibility: produce a short-lived signed endpoint to open the
//! connection against.
//!
//! # Flow
//!
//! 1. **Identity check** (`IdentityProvider`): principal + secret → identity
//!    token. Skipped while a cached token is still valid.
//! 2. **Signing** (`EndpointSigner`): identity token → signed `wss://` URL
//!    with a validity window of a few minutes.
//!
//! Both round-trips belong to external services; this module only sequences
//! them, caches the identity token and classifies failures.
//!
//! A signed endpoint past its window is a fatal `CredentialExpired`: the
//! connection manager asks for a new credential instead of retrying.

mod endpoint;
mod identity;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

pub use endpoint::{EndpointTarget, Region, SignedEndpoint, DEFAULT_API_DOMAIN};
pub use identity::{EndpointSigner, IdToken, IdentityCredentialSupplier, IdentityProvider, Secret};

/// Authorization for one connection attempt.
#[derive(Debug, Clone)]
pub struct Credential {
    pub principal_id: String,
    pub signed_endpoint: String,
    pub expires_at: Option<DateTime<Utc>>,
    /// Identity token the endpoint was minted from, when there was one
    pub id_token: Option<IdToken>,
}

impl Credential {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

/// Source of credentials for the connection manager.
#[async_trait]
pub trait CredentialSupplier: Send + Sync {
    /// Produce a fresh credential. Called once per connection attempt.
    async fn obtain(&self) -> Result<Credential>;
}

/// Hands out a pre-signed endpoint, e.g. a local gateway that needs no
/// signature.
#[derive(Debug, Clone)]
pub struct StaticCredentialSupplier {
    credential: Credential,
}

impl StaticCredentialSupplier {
    pub fn new(principal_id: impl Into<String>, signed_endpoint: impl Into<String>) -> Self {
        Self {
            credential: Credential {
                principal_id: principal_id.into(),
                signed_endpoint: signed_endpoint.into(),
                expires_at: None,
                id_token: None,
            },
        }
    }

    /// Build from explicit values, falling back to `endpoint_url` and
    /// `username` from the config. The principal defaults to `anonymous`.
    pub fn from_config(
        config: &ClientConfig,
        signed_endpoint: Option<String>,
        principal_id: Option<String>,
    ) -> Result<Self> {
        let signed_endpoint = signed_endpoint
            .or_else(|| config.endpoint_url.clone())
            .ok_or_else(|| ClientError::Configuration("No gateway URL configured".into()))?;
        let principal_id = principal_id
            .or_else(|| config.username.clone())
            .unwrap_or_else(|| "anonymous".to_string());
        Ok(Self::new(principal_id, signed_endpoint))
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.credential.expires_at = Some(expires_at);
        self
    }
}

#[async_trait]
impl CredentialSupplier for StaticCredentialSupplier {
    async fn obtain(&self) -> Result<Credential> {
        Ok(self.credential.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_static_supplier() {
        let supplier = StaticCredentialSupplier::new("local", "ws://127.0.0.1:9000");
        let credential = supplier.obtain().await.unwrap();
        assert_eq!(credential.signed_endpoint, "ws://127.0.0.1:9000");
        assert!(!credential.is_expired_at(Utc::now()));
    }

    #[tokio::test]
    async fn test_static_supplier_from_config_fallbacks() {
        let config = ClientConfig {
            endpoint_url: Some("ws://127.0.0.1:9000".into()),
            username: Some("analyst".into()),
            ..Default::default()
        };

        let credential = StaticCredentialSupplier::from_config(&config, None, None)
            .unwrap()
            .obtain()
            .await
            .unwrap();
        assert_eq!(credential.signed_endpoint, "ws://127.0.0.1:9000");
        assert_eq!(credential.principal_id, "analyst");

        let credential = StaticCredentialSupplier::from_config(
            &config,
            Some("wss://signed.example/?sig=1".into()),
            Some("ops".into()),
        )
        .unwrap()
        .obtain()
        .await
        .unwrap();
        assert_eq!(credential.signed_endpoint, "wss://signed.example/?sig=1");
        assert_eq!(credential.principal_id, "ops");
    }

    #[test]
    fn test_static_supplier_without_url_is_configuration_error() {
        let err = StaticCredentialSupplier::from_config(&ClientConfig::default(), None, None).unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_static_supplier_expiry() {
        let supplier = StaticCredentialSupplier::new("local", "ws://127.0.0.1:9000")
            .with_expiry(Utc::now() - Duration::seconds(1));
        assert!(supplier.obtain().await.unwrap().is_expired_at(Utc::now()));
    }
}
