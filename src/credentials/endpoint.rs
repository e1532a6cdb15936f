//! Regions and endpoint targets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::{ClientError, Result};

/// Apex domain of the regional query gateways.
pub const DEFAULT_API_DOMAIN: &str = "api.boilingdata.com";

/// Regions the query gateway is deployed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    #[default]
    #[serde(rename = "eu-west-1")]
    EuWest1,
    #[serde(rename = "eu-west-2")]
    EuWest2,
    #[serde(rename = "eu-west-3")]
    EuWest3,
    #[serde(rename = "eu-north-1")]
    EuNorth1,
    #[serde(rename = "eu-south-1")]
    EuSouth1,
    #[serde(rename = "eu-central-1")]
    EuCentral1,
    #[serde(rename = "us-east-1")]
    UsEast1,
    #[serde(rename = "us-east-2")]
    UsEast2,
    #[serde(rename = "us-west-1")]
    UsWest1,
    #[serde(rename = "us-west-2")]
    UsWest2,
    #[serde(rename = "ca-central-1")]
    CaCentral1,
}

impl Region {
    pub const ALL: [Region; 11] = [
        Region::EuWest1,
        Region::EuWest2,
        Region::EuWest3,
        Region::EuNorth1,
        Region::EuSouth1,
        Region::EuCentral1,
        Region::UsEast1,
        Region::UsEast2,
        Region::UsWest1,
        Region::UsWest2,
        Region::CaCentral1,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Region::EuWest1 => "eu-west-1",
            Region::EuWest2 => "eu-west-2",
            Region::EuWest3 => "eu-west-3",
            Region::EuNorth1 => "eu-north-1",
            Region::EuSouth1 => "eu-south-1",
            Region::EuCentral1 => "eu-central-1",
            Region::UsEast1 => "us-east-1",
            Region::UsEast2 => "us-east-2",
            Region::UsWest1 => "us-west-1",
            Region::UsWest2 => "us-west-2",
            Region::CaCentral1 => "ca-central-1",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        Region::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| ClientError::Configuration(format!("Unsupported region: {}", s)))
    }
}

/// Host and path a signed endpoint is minted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTarget {
    /// Host, with `:port` when the override carried one
    pub host: String,
    /// Path component, empty for the regional default
    pub path: String,
}

impl EndpointTarget {
    /// The regional gateway, or whatever `endpoint_url` points at.
    pub fn resolve(region: Region, endpoint_url: Option<&str>) -> Result<Self> {
        let Some(raw) = endpoint_url else {
            return Ok(Self {
                host: format!("{}.{}", region, DEFAULT_API_DOMAIN),
                path: String::new(),
            });
        };

        let url = Url::parse(raw)
            .map_err(|e| ClientError::Configuration(format!("Invalid endpoint URL {}: {}", raw, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| ClientError::Configuration(format!("Endpoint URL has no host: {}", raw)))?;
        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let path = match url.path() {
            "/" => String::new(),
            p => p.to_string(),
        };

        Ok(Self { host, path })
    }

    /// Unsigned `wss://` URL for this target.
    pub fn wss_url(&self) -> String {
        format!("wss://{}{}", self.host, self.path)
    }
}

/// A connection URL carrying its own authorization, valid for a short window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEndpoint {
    pub url: String,
    pub expires_at: Option<DateTime<Utc>>,
}
