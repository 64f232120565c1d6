//! Kubeconfig credential bundle parser
//!
//! The remote service hands out two incompatible kubeconfig shapes. Clusters
//! integrated with an identity provider return a user entry with an
//! `auth-provider` block (recognised by its `apiserver-id:` key) and no
//! credential material; all other clusters return client certificates or a
//! bearer token directly. Both reduce to one [`CredentialBundle`].

use std::collections::BTreeMap;

use serde::Deserialize;

use convoy_common::types::CredentialBundle;
use convoy_common::yaml::parse_yaml;
use convoy_common::Error;

/// Marker present only in identity-provider-integrated kubeconfigs
const IDENTITY_PROVIDER_MARKER: &str = "apiserver-id:";

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "U: Deserialize<'de>"))]
struct KubeConfig<U> {
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    users: Vec<NamedUser<U>>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    cluster: ClusterEntry,
}

#[derive(Debug, Deserialize)]
struct ClusterEntry {
    server: String,
    #[serde(default, rename = "certificate-authority-data")]
    certificate_authority_data: String,
}

#[derive(Debug, Deserialize)]
struct NamedUser<U> {
    name: String,
    user: U,
}

#[derive(Debug, Default, Deserialize)]
struct DirectUser {
    #[serde(default, rename = "client-certificate-data")]
    client_certificate_data: String,
    #[serde(default, rename = "client-key-data")]
    client_key_data: String,
    #[serde(default)]
    token: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct IdentityProviderUser {
    #[serde(rename = "auth-provider")]
    auth_provider: AuthProvider,
}

#[derive(Debug, Deserialize)]
struct AuthProvider {
    #[serde(default)]
    #[allow(dead_code)]
    name: String,
    #[serde(default)]
    config: BTreeMap<String, String>,
}

/// A decoded kubeconfig, tagged by which encoding the remote returned
#[derive(Debug)]
enum RawBundle {
    Direct(KubeConfig<DirectUser>),
    IdentityIntegrated(KubeConfig<IdentityProviderUser>),
}

impl RawBundle {
    fn decode(text: &str) -> Result<Self, Error> {
        let value = parse_yaml(text).map_err(|e| Error::malformed_credentials(e.to_string()))?;
        if value.is_null() {
            return Err(Error::malformed_credentials("credential blob is empty"));
        }
        let malformed = |e: serde_json::Error| Error::malformed_credentials(e.to_string());
        if text.contains(IDENTITY_PROVIDER_MARKER) {
            serde_json::from_value(value)
                .map(RawBundle::IdentityIntegrated)
                .map_err(malformed)
        } else {
            serde_json::from_value(value)
                .map(RawBundle::Direct)
                .map_err(malformed)
        }
    }

    fn into_bundle(self) -> Result<CredentialBundle, Error> {
        match self {
            RawBundle::Direct(config) => {
                let (cluster, user) = first_entries(config)?;
                Ok(CredentialBundle {
                    host: cluster.server,
                    cluster_ca_certificate: cluster.certificate_authority_data,
                    username: user.name,
                    password: user.user.password,
                    client_certificate: user.user.client_certificate_data,
                    client_key: user.user.client_key_data,
                    token: user.user.token,
                })
            }
            RawBundle::IdentityIntegrated(config) => {
                let (cluster, user) = first_entries(config)?;
                if !user.user.auth_provider.config.contains_key("apiserver-id") {
                    return Err(Error::malformed_credentials(
                        "auth-provider config is missing apiserver-id",
                    ));
                }
                Ok(CredentialBundle {
                    host: cluster.server,
                    cluster_ca_certificate: cluster.certificate_authority_data,
                    username: user.name,
                    ..Default::default()
                })
            }
        }
    }
}

fn first_entries<U>(config: KubeConfig<U>) -> Result<(ClusterEntry, NamedUser<U>), Error> {
    let cluster = config
        .clusters
        .into_iter()
        .next()
        .ok_or_else(|| Error::malformed_credentials("kubeconfig has no cluster entries"))?;
    let user = config
        .users
        .into_iter()
        .next()
        .ok_or_else(|| Error::malformed_credentials("kubeconfig has no user entries"))?;
    if cluster.cluster.server.is_empty() {
        return Err(Error::malformed_credentials("cluster entry has no server"));
    }
    Ok((cluster.cluster, user))
}

/// Parse a raw kubeconfig blob into a credential bundle
///
/// Fails with `MalformedCredentialBundle` when the blob is not UTF-8 YAML,
/// lacks at least one cluster and one user entry, or carries certificate
/// data that is not base64.
pub fn parse(raw: &[u8]) -> Result<CredentialBundle, Error> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| Error::malformed_credentials(format!("credential blob is not UTF-8: {e}")))?;
    let bundle = RawBundle::decode(text)?.into_bundle()?;
    bundle.cluster_ca_pem()?;
    bundle.client_certificate_pem()?;
    bundle.client_key_pem()?;
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIRECT: &str = r#"
apiVersion: v1
kind: Config
clusters:
- name: prod
  cluster:
    server: https://prod-dns.hcp.westeurope.example:443
    certificate-authority-data: Q0EtREFUQQ==
contexts:
- name: prod
  context:
    cluster: prod
    user: clusterUser_rg_prod
current-context: prod
users:
- name: clusterUser_rg_prod
  user:
    client-certificate-data: Q0xJRU5ULUNFUlQ=
    client-key-data: Q0xJRU5ULUtFWQ==
    token: abc123
"#;

    const IDENTITY_INTEGRATED: &str = r#"
apiVersion: v1
kind: Config
clusters:
- name: prod
  cluster:
    server: https://prod-aad.hcp.westeurope.example:443
    certificate-authority-data: Q0EtREFUQQ==
users:
- name: clusterUser_rg_prod
  user:
    auth-provider:
      name: azure
      config:
        apiserver-id: 00000000-0000-0000-0000-000000000001
        client-id: 00000000-0000-0000-0000-000000000002
        tenant-id: 00000000-0000-0000-0000-000000000003
        environment: AzurePublicCloud
"#;

    #[test]
    fn test_direct_bundle_carries_material() {
        let bundle = parse(DIRECT.as_bytes()).unwrap();
        assert_eq!(bundle.host, "https://prod-dns.hcp.westeurope.example:443");
        assert_eq!(bundle.cluster_ca_certificate, "Q0EtREFUQQ==");
        assert_eq!(bundle.client_certificate, "Q0xJRU5ULUNFUlQ=");
        assert_eq!(bundle.client_key, "Q0xJRU5ULUtFWQ==");
        assert_eq!(bundle.token, "abc123");
        assert_eq!(bundle.username, "clusterUser_rg_prod");
        assert_eq!(bundle.password, "");
    }

    #[test]
    fn test_identity_integrated_bundle_has_no_material() {
        let bundle = parse(IDENTITY_INTEGRATED.as_bytes()).unwrap();
        assert_eq!(bundle.host, "https://prod-aad.hcp.westeurope.example:443");
        assert_eq!(bundle.cluster_ca_certificate, "Q0EtREFUQQ==");
        assert_eq!(bundle.username, "clusterUser_rg_prod");
        assert_eq!(bundle.client_certificate, "");
        assert_eq!(bundle.client_key, "");
        assert_eq!(bundle.password, "");
        assert_eq!(bundle.token, "");
    }

    #[test]
    fn test_missing_users_is_malformed() {
        let raw = "clusters:\n- name: c\n  cluster:\n    server: https://h\nusers: []\n";
        assert!(matches!(
            parse(raw.as_bytes()),
            Err(Error::MalformedCredentialBundle { .. })
        ));
    }

    #[test]
    fn test_missing_clusters_is_malformed() {
        let raw = "users:\n- name: u\n  user:\n    token: t\n";
        assert!(matches!(
            parse(raw.as_bytes()),
            Err(Error::MalformedCredentialBundle { .. })
        ));
    }

    #[test]
    fn test_marker_without_auth_provider_is_malformed() {
        let raw = "clusters:\n- name: c\n  cluster:\n    server: https://h\nusers:\n- name: u\n  user:\n    token: t\n# apiserver-id: x\n";
        assert!(matches!(
            parse(raw.as_bytes()),
            Err(Error::MalformedCredentialBundle { .. })
        ));
    }

    #[test]
    fn test_empty_and_garbage_blobs_are_malformed() {
        for raw in [&b""[..], b"{not yaml", &[0xff, 0xfe]] {
            assert!(matches!(
                parse(raw),
                Err(Error::MalformedCredentialBundle { .. })
            ));
        }
    }

    #[test]
    fn test_undecodable_certificate_data_is_malformed() {
        for (from, to) in [
            ("certificate-authority-data: Q0EtREFUQQ==", "certificate-authority-data: not*base64"),
            ("client-certificate-data: Q0xJRU5ULUNFUlQ=", "client-certificate-data: Q0xJRU5"),
            ("client-key-data: Q0xJRU5ULUtFWQ==", "client-key-data: %%%"),
        ] {
            let raw = DIRECT.replace(from, to);
            match parse(raw.as_bytes()) {
                Err(Error::MalformedCredentialBundle { message }) => {
                    assert!(message.contains("not valid base64"), "{message}")
                }
                other => panic!("expected malformed bundle for `{to}`, got {other:?}"),
            }
        }
    }
}
