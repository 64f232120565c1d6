//! Write-only secret preservation
//!
//! The remote service accepts three secrets on write and never returns them
//! on read. The store holds the last value known to be applied for each one
//! and backfills it into freshly read state, so a redacted read never looks
//! like a cleared secret.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use convoy_common::types::{DesiredSpec, ObservedState};

/// A field the remote accepts on write but redacts on read
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum SecretField {
    /// Service principal client secret
    ServicePrincipalSecret,
    /// Identity-provider server application secret
    IdentityProviderServerSecret,
    /// Windows node admin password
    WindowsAdminPassword,
}

impl SecretField {
    /// Every preserved field
    pub const ALL: [SecretField; 3] = [
        SecretField::ServicePrincipalSecret,
        SecretField::IdentityProviderServerSecret,
        SecretField::WindowsAdminPassword,
    ];

    /// Field path used in logs
    pub fn path(self) -> &'static str {
        match self {
            SecretField::ServicePrincipalSecret => "service_principal.client_secret",
            SecretField::IdentityProviderServerSecret => {
                "role_based_access_control.identity_provider.server_app_secret"
            }
            SecretField::WindowsAdminPassword => "windows_profile.admin_password",
        }
    }

    /// The value of this field in `spec`, empty when the enclosing block is absent
    pub fn value_in(self, spec: &DesiredSpec) -> &str {
        match self {
            SecretField::ServicePrincipalSecret => spec
                .service_principal
                .as_ref()
                .map_or("", |sp| sp.client_secret.as_str()),
            SecretField::IdentityProviderServerSecret => spec
                .role_based_access_control
                .identity_provider
                .as_ref()
                .map_or("", |idp| idp.server_app_secret.as_str()),
            SecretField::WindowsAdminPassword => spec
                .windows_profile
                .as_ref()
                .map_or("", |w| w.admin_password.as_str()),
        }
    }

    fn slot_in(self, spec: &mut DesiredSpec) -> Option<&mut String> {
        match self {
            SecretField::ServicePrincipalSecret => spec
                .service_principal
                .as_mut()
                .map(|sp| &mut sp.client_secret),
            SecretField::IdentityProviderServerSecret => spec
                .role_based_access_control
                .identity_provider
                .as_mut()
                .filter(|idp| !idp.managed)
                .map(|idp| &mut idp.server_app_secret),
            SecretField::WindowsAdminPassword => spec
                .windows_profile
                .as_mut()
                .map(|w| &mut w.admin_password),
        }
    }
}

impl fmt::Display for SecretField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Effective value of a secret after a read
///
/// An empty observed value means the remote redacted it, so the prior
/// applied value wins; anything else is taken as the remote's truth.
pub fn reconcile_secret(field: SecretField, observed: &str, prior: &str) -> String {
    if observed.is_empty() {
        if !prior.is_empty() {
            tracing::trace!(field = %field, "backfilling redacted secret");
        }
        prior.to_string()
    } else {
        observed.to_string()
    }
}

/// Last applied value of every write-only secret
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SecretStore {
    values: BTreeMap<SecretField, String>,
}

impl SecretStore {
    /// A store that knows no secrets (import)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Secrets from the prior applied state
    pub fn from_prior(prior: &ObservedState) -> Self {
        Self::from_spec(&prior.spec)
    }

    /// Secrets for a first-ever create, where desired values are also the applied ones
    pub fn for_create(desired: &DesiredSpec) -> Self {
        Self::from_spec(desired)
    }

    fn from_spec(spec: &DesiredSpec) -> Self {
        let values = SecretField::ALL
            .into_iter()
            .map(|field| (field, field.value_in(spec)))
            .filter(|(_, value)| !value.is_empty())
            .map(|(field, value)| (field, value.to_string()))
            .collect();
        Self { values }
    }

    /// Last applied value, empty when unknown
    pub fn get(&self, field: SecretField) -> &str {
        self.values.get(&field).map_or("", String::as_str)
    }

    /// Record a value the remote has just accepted
    pub fn record(&mut self, field: SecretField, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            self.values.remove(&field);
        } else {
            self.values.insert(field, value);
        }
    }

    /// Record every secret of `spec` that the remote has just accepted
    pub fn record_all(&mut self, spec: &DesiredSpec) {
        for field in SecretField::ALL {
            let value = field.value_in(spec);
            if !value.is_empty() {
                self.record(field, value);
            }
        }
    }

    /// Backfill redacted secrets into freshly read state
    pub fn backfill(&self, observed: &mut DesiredSpec) {
        for field in SecretField::ALL {
            if let Some(slot) = field.slot_in(observed) {
                let effective = reconcile_secret(field, slot.as_str(), self.get(field));
                *slot = effective;
            }
        }
    }

    /// Whether the store knows a value for `field`
    pub fn contains(&self, field: SecretField) -> bool {
        self.values.contains_key(&field)
    }
}

impl fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_common::types::{
        IdentityProviderSpec, ServicePrincipalSpec, WindowsProfile,
    };
    use rstest::rstest;

    fn spec_with_secrets(sp: &str, idp: &str, windows: &str) -> DesiredSpec {
        let mut spec = DesiredSpec::default();
        spec.service_principal = Some(ServicePrincipalSpec {
            client_id: "app".to_string(),
            client_secret: sp.to_string(),
        });
        spec.role_based_access_control.identity_provider = Some(IdentityProviderSpec {
            client_app_id: "client".to_string(),
            server_app_id: "server".to_string(),
            server_app_secret: idp.to_string(),
            ..Default::default()
        });
        spec.windows_profile = Some(WindowsProfile {
            admin_username: "azureuser".to_string(),
            admin_password: windows.to_string(),
        });
        spec
    }

    #[rstest]
    #[case::service_principal(SecretField::ServicePrincipalSecret)]
    #[case::identity_provider(SecretField::IdentityProviderServerSecret)]
    #[case::windows(SecretField::WindowsAdminPassword)]
    fn test_redacted_read_keeps_prior(#[case] field: SecretField) {
        for prior in ["", "s3cret", "another-value"] {
            assert_eq!(reconcile_secret(field, "", prior), prior);
        }
    }

    #[rstest]
    #[case::service_principal(SecretField::ServicePrincipalSecret)]
    #[case::identity_provider(SecretField::IdentityProviderServerSecret)]
    #[case::windows(SecretField::WindowsAdminPassword)]
    fn test_observed_value_wins(#[case] field: SecretField) {
        for prior in ["", "stale"] {
            assert_eq!(reconcile_secret(field, "fresh", prior), "fresh");
        }
    }

    #[test]
    fn test_backfill_restores_every_redacted_secret() {
        let store = SecretStore::for_create(&spec_with_secrets("sp", "idp", "win"));
        let mut read = spec_with_secrets("", "", "");
        store.backfill(&mut read);
        assert_eq!(read, spec_with_secrets("sp", "idp", "win"));
    }

    #[test]
    fn test_backfill_does_not_invent_blocks() {
        let store = SecretStore::for_create(&spec_with_secrets("sp", "idp", "win"));
        let mut read = DesiredSpec::default();
        store.backfill(&mut read);
        assert_eq!(read, DesiredSpec::default());
    }

    #[test]
    fn test_managed_identity_provider_has_no_secret_slot() {
        let store = SecretStore::for_create(&spec_with_secrets("", "idp", ""));
        let mut read = DesiredSpec::default();
        read.role_based_access_control.identity_provider = Some(IdentityProviderSpec {
            managed: true,
            ..Default::default()
        });
        store.backfill(&mut read);
        assert_eq!(
            SecretField::IdentityProviderServerSecret.value_in(&read),
            ""
        );
    }

    #[test]
    fn test_empty_store_for_import() {
        let store = SecretStore::empty();
        let mut read = spec_with_secrets("", "", "");
        store.backfill(&mut read);
        assert_eq!(read, spec_with_secrets("", "", ""));
        assert!(!store.contains(SecretField::ServicePrincipalSecret));
    }

    #[test]
    fn test_record_and_clear() {
        let mut store = SecretStore::empty();
        store.record(SecretField::WindowsAdminPassword, "pw");
        assert_eq!(store.get(SecretField::WindowsAdminPassword), "pw");
        store.record(SecretField::WindowsAdminPassword, "");
        assert!(!store.contains(SecretField::WindowsAdminPassword));
    }

    #[test]
    fn test_from_prior_reads_backfilled_state() {
        let prior = ObservedState {
            spec: spec_with_secrets("sp", "", "win"),
            ..Default::default()
        };
        let store = SecretStore::from_prior(&prior);
        assert_eq!(store.get(SecretField::ServicePrincipalSecret), "sp");
        assert_eq!(store.get(SecretField::IdentityProviderServerSecret), "");
        assert_eq!(store.get(SecretField::WindowsAdminPassword), "win");
    }

    #[test]
    fn test_debug_never_prints_values() {
        let store = SecretStore::for_create(&spec_with_secrets("sp-value", "", ""));
        let debug = format!("{store:?}");
        assert!(debug.contains("ServicePrincipalSecret"));
        assert!(!debug.contains("sp-value"));
    }
}
