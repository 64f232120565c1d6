//! Cluster access credentials
//!
//! Bundles parsed from the kubeconfig blobs returned by the remote service.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Which credential listing to request from the remote service
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    /// Default (user-level) credentials
    User,
    /// Privileged credentials; only issued when identity-provider RBAC is configured
    Admin,
}

impl CredentialKind {
    /// Listing name used by the remote credential API
    pub fn as_str(self) -> &'static str {
        match self {
            CredentialKind::User => "clusterUser",
            CredentialKind::Admin => "clusterAdmin",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured access credentials extracted from a kubeconfig
///
/// For identity-provider-integrated clusters only `host`,
/// `cluster_ca_certificate` and `username` are populated; tokens are
/// obtained interactively from the provider.
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialBundle {
    /// API server URL
    pub host: String,
    /// Base64-encoded cluster CA certificate (PEM)
    pub cluster_ca_certificate: String,
    /// User name from the first user entry
    pub username: String,
    /// Password, when the user authenticates with basic auth
    #[serde(default)]
    pub password: String,
    /// Base64-encoded client certificate (PEM)
    #[serde(default)]
    pub client_certificate: String,
    /// Base64-encoded client key (PEM)
    #[serde(default)]
    pub client_key: String,
    /// Bearer token
    #[serde(default)]
    pub token: String,
}

impl CredentialBundle {
    /// Decoded cluster CA certificate
    pub fn cluster_ca_pem(&self) -> Result<Vec<u8>, Error> {
        decode_field("cluster_ca_certificate", &self.cluster_ca_certificate)
    }

    /// Decoded client certificate, if present
    pub fn client_certificate_pem(&self) -> Result<Option<Vec<u8>>, Error> {
        decode_optional("client_certificate", &self.client_certificate)
    }

    /// Decoded client key, if present
    pub fn client_key_pem(&self) -> Result<Option<Vec<u8>>, Error> {
        decode_optional("client_key", &self.client_key)
    }

    /// Whether the bundle carries a static credential (client cert or token)
    pub fn has_static_credential(&self) -> bool {
        !self.token.is_empty() || !self.client_key.is_empty()
    }
}

fn decode_field(field: &str, value: &str) -> Result<Vec<u8>, Error> {
    STANDARD
        .decode(value.trim())
        .map_err(|e| Error::malformed_credentials(format!("{field} is not valid base64: {e}")))
}

fn decode_optional(field: &str, value: &str) -> Result<Option<Vec<u8>>, Error> {
    if value.is_empty() {
        return Ok(None);
    }
    decode_field(field, value).map(Some)
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(value: &str) -> &'static str {
            if value.is_empty() {
                ""
            } else {
                "<redacted>"
            }
        }

        f.debug_struct("CredentialBundle")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("cluster_ca_certificate", &redact(&self.cluster_ca_certificate))
            .field("password", &redact(&self.password))
            .field("client_certificate", &redact(&self.client_certificate))
            .field("client_key", &redact(&self.client_key))
            .field("token", &redact(&self.token))
            .finish()
    }
}
