//! In-place updatable sections of the cluster object
//!
//! Each section answers two questions independently: does the desired spec
//! differ from what was read, and how is the desired value written onto a
//! freshly read remote object. Changed sections are coalesced into one
//! whole-object write by the update saga.

use std::collections::BTreeMap;
use std::fmt;

use convoy_common::types::{AddonProfile, DesiredSpec, LoadBalancerProfile, ManagedCluster};

use crate::payload::{
    expand_api_server_access, expand_auto_scaler_profile, expand_identity_provider, expand_sku,
    expand_windows_profile,
};

/// A logical section of the cluster object
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClusterSection {
    /// Add-on profiles
    AddonProfiles,
    /// API server authorised IP ranges
    ApiServerAccess,
    /// Cluster autoscaler tuning
    AutoScalerProfile,
    /// Pod security policy flag
    PodSecurityPolicy,
    /// Linux admin profile
    LinuxProfile,
    /// Network profile (load balancer settings only)
    NetworkProfile,
    /// Identity-provider RBAC integration
    RbacProfile,
    /// Control plane tier (upgrades only)
    SkuTier,
    /// Resource tags
    Tags,
    /// Windows admin profile
    WindowsProfile,
}

impl ClusterSection {
    /// Every section, in the order they are evaluated
    pub const ALL: [ClusterSection; 10] = [
        ClusterSection::AddonProfiles,
        ClusterSection::ApiServerAccess,
        ClusterSection::AutoScalerProfile,
        ClusterSection::PodSecurityPolicy,
        ClusterSection::LinuxProfile,
        ClusterSection::NetworkProfile,
        ClusterSection::RbacProfile,
        ClusterSection::SkuTier,
        ClusterSection::Tags,
        ClusterSection::WindowsProfile,
    ];

    /// Name used in logs and errors
    pub fn name(self) -> &'static str {
        match self {
            ClusterSection::AddonProfiles => "add-on profiles",
            ClusterSection::ApiServerAccess => "API server access",
            ClusterSection::AutoScalerProfile => "auto scaler profile",
            ClusterSection::PodSecurityPolicy => "pod security policy",
            ClusterSection::LinuxProfile => "linux profile",
            ClusterSection::NetworkProfile => "network profile",
            ClusterSection::RbacProfile => "RBAC profile",
            ClusterSection::SkuTier => "sku tier",
            ClusterSection::Tags => "tags",
            ClusterSection::WindowsProfile => "windows profile",
        }
    }

    /// Whether `desired` differs from `observed` in this section
    ///
    /// `observed` must already have redacted secrets backfilled. A tier
    /// downgrade never counts here; it is a replace-only change.
    pub fn differs(self, desired: &DesiredSpec, observed: &DesiredSpec) -> bool {
        match self {
            ClusterSection::AddonProfiles => {
                merge_addons(&observed.addon_profiles, &desired.addon_profiles)
                    != observed.addon_profiles
            }
            ClusterSection::ApiServerAccess => {
                desired.api_server_authorized_ip_ranges != observed.api_server_authorized_ip_ranges
            }
            ClusterSection::AutoScalerProfile => {
                let Some(wanted) = desired.auto_scaler_profile.as_ref() else {
                    return false;
                };
                let current = observed.auto_scaler_profile.clone().unwrap_or_default();
                current.overlay(wanted) != current
            }
            ClusterSection::PodSecurityPolicy => {
                desired.enable_pod_security_policy != observed.enable_pod_security_policy
            }
            ClusterSection::LinuxProfile => desired.linux_profile != observed.linux_profile,
            ClusterSection::NetworkProfile => {
                let Some(wanted) = desired
                    .network_profile
                    .as_ref()
                    .and_then(|n| n.load_balancer_profile.as_ref())
                else {
                    return false;
                };
                let current = observed
                    .network_profile
                    .as_ref()
                    .and_then(|n| n.load_balancer_profile.clone())
                    .unwrap_or_default();
                merge_load_balancer(current.clone(), wanted) != current
            }
            ClusterSection::RbacProfile => {
                desired.role_based_access_control.identity_provider
                    != observed.role_based_access_control.identity_provider
            }
            ClusterSection::SkuTier => desired.sku_tier > observed.sku_tier,
            ClusterSection::Tags => desired.tags != observed.tags,
            ClusterSection::WindowsProfile => desired.windows_profile != observed.windows_profile,
        }
    }

    /// Write the desired value of this section onto `base`
    pub fn apply(self, mut base: ManagedCluster, desired: &DesiredSpec) -> ManagedCluster {
        let props = &mut base.properties;
        match self {
            ClusterSection::AddonProfiles => {
                props.addon_profiles = merge_addons(&props.addon_profiles, &desired.addon_profiles);
            }
            ClusterSection::ApiServerAccess => {
                props.api_server_access_profile =
                    expand_api_server_access(props.api_server_access_profile.take(), desired);
            }
            ClusterSection::AutoScalerProfile => {
                if let Some(wanted) = desired.auto_scaler_profile.as_ref() {
                    props.auto_scaler_profile =
                        Some(expand_auto_scaler_profile(props.auto_scaler_profile.take(), wanted));
                }
            }
            ClusterSection::PodSecurityPolicy => {
                props.enable_pod_security_policy = Some(desired.enable_pod_security_policy);
            }
            ClusterSection::LinuxProfile => {
                props.linux_profile = desired.linux_profile.clone();
            }
            ClusterSection::NetworkProfile => {
                let wanted = desired
                    .network_profile
                    .as_ref()
                    .and_then(|n| n.load_balancer_profile.as_ref());
                if let Some(wanted) = wanted {
                    if let Some(network) = props.network_profile.as_mut() {
                        let current = network.load_balancer_profile.take().unwrap_or_default();
                        network.load_balancer_profile = Some(merge_load_balancer(current, wanted));
                    } else {
                        props.network_profile = desired.network_profile.clone();
                    }
                }
            }
            ClusterSection::RbacProfile => {
                props.identity_provider_profile =
                    expand_identity_provider(&desired.role_based_access_control);
            }
            ClusterSection::SkuTier => {
                base.sku = Some(expand_sku(base.sku.take(), desired.sku_tier));
            }
            ClusterSection::Tags => {
                base.tags = desired.tags.clone();
            }
            ClusterSection::WindowsProfile => {
                props.windows_profile = desired.windows_profile.as_ref().map(expand_windows_profile);
            }
        }
        base
    }
}

impl fmt::Display for ClusterSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sections whose desired value differs from `observed`
pub fn changed_sections(desired: &DesiredSpec, observed: &DesiredSpec) -> Vec<ClusterSection> {
    ClusterSection::ALL
        .into_iter()
        .filter(|section| section.differs(desired, observed))
        .collect()
}

/// Desired add-ons win; add-ons enabled remotely but not declared are disabled
fn merge_addons(
    current: &BTreeMap<String, AddonProfile>,
    desired: &BTreeMap<String, AddonProfile>,
) -> BTreeMap<String, AddonProfile> {
    let mut merged = current.clone();
    for (name, profile) in merged.iter_mut() {
        if !desired.contains_key(name) {
            profile.enabled = false;
        }
    }
    merged.extend(desired.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Overlay the set fields of `wanted` on `current`
///
/// Setting one outbound source clears the other two, since the remote
/// accepts only one of them at a time.
fn merge_load_balancer(
    mut current: LoadBalancerProfile,
    wanted: &LoadBalancerProfile,
) -> LoadBalancerProfile {
    if wanted.managed_outbound_ip_count.is_some() {
        current.managed_outbound_ip_count = wanted.managed_outbound_ip_count;
        current.outbound_ip_address_ids.clear();
        current.outbound_ip_prefix_ids.clear();
    } else if !wanted.outbound_ip_address_ids.is_empty() {
        current.outbound_ip_address_ids = wanted.outbound_ip_address_ids.clone();
        current.managed_outbound_ip_count = None;
        current.outbound_ip_prefix_ids.clear();
    } else if !wanted.outbound_ip_prefix_ids.is_empty() {
        current.outbound_ip_prefix_ids = wanted.outbound_ip_prefix_ids.clone();
        current.managed_outbound_ip_count = None;
        current.outbound_ip_address_ids.clear();
    }
    if wanted.idle_timeout_in_minutes.is_some() {
        current.idle_timeout_in_minutes = wanted.idle_timeout_in_minutes;
    }
    if wanted.outbound_ports_allocated.is_some() {
        current.outbound_ports_allocated = wanted.outbound_ports_allocated;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{expand_cluster, flatten};
    use crate::secrets::SecretStore;
    use crate::testing::sample_desired;
    use convoy_common::types::{AutoScalerProfile, SkuTier};
    use rstest::rstest;

    fn read_back(
        cluster: &ManagedCluster,
        desired: &DesiredSpec,
        secrets: &SecretStore,
    ) -> DesiredSpec {
        flatten(
            &desired.id(),
            cluster,
            Some(&desired.default_node_pool.name),
            secrets,
        )
        .unwrap()
        .spec
    }

    fn observed() -> DesiredSpec {
        let desired = sample_desired();
        read_back(&expand_cluster(&desired), &desired, &SecretStore::for_create(&desired))
    }

    #[test]
    fn test_identical_spec_has_no_changed_sections() {
        assert!(changed_sections(&sample_desired(), &observed()).is_empty());
    }

    #[rstest]
    #[case::addons(ClusterSection::AddonProfiles)]
    #[case::api_server(ClusterSection::ApiServerAccess)]
    #[case::auto_scaler(ClusterSection::AutoScalerProfile)]
    #[case::psp(ClusterSection::PodSecurityPolicy)]
    #[case::linux(ClusterSection::LinuxProfile)]
    #[case::network(ClusterSection::NetworkProfile)]
    #[case::rbac(ClusterSection::RbacProfile)]
    #[case::sku_tier(ClusterSection::SkuTier)]
    #[case::tags(ClusterSection::Tags)]
    #[case::windows(ClusterSection::WindowsProfile)]
    fn test_each_section_detects_and_applies_its_own_change(#[case] section: ClusterSection) {
        let mut desired = sample_desired();
        match section {
            ClusterSection::AddonProfiles => {
                desired.addon_profiles.insert(
                    "azurepolicy".to_string(),
                    AddonProfile {
                        enabled: true,
                        ..Default::default()
                    },
                );
            }
            ClusterSection::ApiServerAccess => {
                desired
                    .api_server_authorized_ip_ranges
                    .insert("192.168.0.0/16".to_string());
            }
            ClusterSection::AutoScalerProfile => {
                if let Some(profile) = desired.auto_scaler_profile.as_mut() {
                    profile.expander = Some("least-waste".to_string());
                }
            }
            ClusterSection::PodSecurityPolicy => desired.enable_pod_security_policy = true,
            ClusterSection::LinuxProfile => {
                if let Some(linux) = desired.linux_profile.as_mut() {
                    linux.ssh_keys.push("ssh-ed25519 BBBB ops".to_string());
                }
            }
            ClusterSection::NetworkProfile => {
                if let Some(lb) = desired
                    .network_profile
                    .as_mut()
                    .and_then(|n| n.load_balancer_profile.as_mut())
                {
                    lb.managed_outbound_ip_count = Some(3);
                }
            }
            ClusterSection::RbacProfile => {
                if let Some(idp) = desired.role_based_access_control.identity_provider.as_mut() {
                    idp.server_app_secret = "rotated".to_string();
                }
            }
            ClusterSection::SkuTier => desired.sku_tier = SkuTier::Paid,
            ClusterSection::Tags => {
                desired.tags.insert("team".to_string(), "platform".to_string());
            }
            ClusterSection::WindowsProfile => {
                if let Some(windows) = desired.windows_profile.as_mut() {
                    windows.admin_password = "rotated".to_string();
                }
            }
        }

        let current = observed();
        assert_eq!(changed_sections(&desired, &current), vec![section]);

        // Applying the section to the remote object converges that section
        let base = expand_cluster(&sample_desired());
        let updated = section.apply(base, &desired);
        let reread = read_back(&updated, &desired, &SecretStore::for_create(&desired));
        assert!(!section.differs(&desired, &reread));
    }

    #[test]
    fn test_redacted_secret_does_not_look_like_a_change() {
        let desired = sample_desired();
        let read = expand_cluster(&desired);
        let mut redacted = read.clone();
        if let Some(w) = redacted.properties.windows_profile.as_mut() {
            w.admin_password = None;
        }
        let current = read_back(&redacted, &desired, &SecretStore::for_create(&desired));
        assert!(!ClusterSection::WindowsProfile.differs(&desired, &current));

        let unknown = read_back(&redacted, &desired, &SecretStore::empty());
        assert!(ClusterSection::WindowsProfile.differs(&desired, &unknown));
    }

    #[test]
    fn test_undeclared_remote_addons_are_disabled() {
        let mut current = observed();
        current.addon_profiles.insert(
            "kubeDashboard".to_string(),
            AddonProfile {
                enabled: true,
                ..Default::default()
            },
        );
        let desired = sample_desired();
        assert!(ClusterSection::AddonProfiles.differs(&desired, &current));

        current
            .addon_profiles
            .get_mut("kubeDashboard")
            .unwrap()
            .enabled = false;
        assert!(!ClusterSection::AddonProfiles.differs(&desired, &current));
    }

    #[rstest]
    #[case::managed_count(
        LoadBalancerProfile { managed_outbound_ip_count: Some(2), ..Default::default() },
        (Some(2), 0, 0)
    )]
    #[case::ip_ids(
        LoadBalancerProfile { outbound_ip_address_ids: vec!["ip-1".to_string()], ..Default::default() },
        (None, 1, 0)
    )]
    #[case::prefix_ids(
        LoadBalancerProfile { outbound_ip_prefix_ids: vec!["prefix-1".to_string()], ..Default::default() },
        (None, 0, 1)
    )]
    fn test_outbound_sources_stay_exclusive(
        #[case] wanted: LoadBalancerProfile,
        #[case] expected: (Option<u32>, usize, usize),
    ) {
        let current = LoadBalancerProfile {
            managed_outbound_ip_count: Some(1),
            outbound_ip_address_ids: vec!["old-ip".to_string()],
            outbound_ip_prefix_ids: vec!["old-prefix".to_string()],
            idle_timeout_in_minutes: Some(30),
            ..Default::default()
        };
        let merged = merge_load_balancer(current, &wanted);
        assert_eq!(
            (
                merged.managed_outbound_ip_count,
                merged.outbound_ip_address_ids.len(),
                merged.outbound_ip_prefix_ids.len()
            ),
            expected
        );
        assert_eq!(merged.idle_timeout_in_minutes, Some(30));
    }

    #[test]
    fn test_network_apply_only_touches_the_load_balancer() {
        let mut desired = sample_desired();
        if let Some(n) = desired.network_profile.as_mut() {
            n.pod_cidr = Some("10.244.0.0/16".to_string());
            n.load_balancer_profile = Some(LoadBalancerProfile {
                managed_outbound_ip_count: Some(4),
                ..Default::default()
            });
        }
        let updated = ClusterSection::NetworkProfile.apply(expand_cluster(&sample_desired()), &desired);
        let network = updated.properties.network_profile.unwrap();
        assert_eq!(network.pod_cidr, None);
        assert_eq!(
            network.load_balancer_profile.unwrap().managed_outbound_ip_count,
            Some(4)
        );
    }

    #[test]
    fn test_tier_downgrade_is_not_an_in_place_change() {
        let mut current = observed();
        current.sku_tier = SkuTier::Paid;
        assert!(!ClusterSection::SkuTier.differs(&sample_desired(), &current));
    }

    #[test]
    fn test_auto_scaler_fields_left_unset_follow_the_remote() {
        let mut current = observed();
        if let Some(profile) = current.auto_scaler_profile.as_mut() {
            profile.scale_down_unneeded = Some("10m".to_string());
        }
        assert!(!ClusterSection::AutoScalerProfile.differs(&sample_desired(), &current));

        let mut desired = sample_desired();
        desired.auto_scaler_profile = None;
        current.auto_scaler_profile = Some(AutoScalerProfile {
            expander: Some("random".to_string()),
            ..Default::default()
        });
        assert!(!ClusterSection::AutoScalerProfile.differs(&desired, &current));
    }

    #[test]
    fn test_apply_preserves_unmodelled_fields() {
        let mut base = expand_cluster(&sample_desired());
        base.additional
            .insert("identity".to_string(), serde_json::json!({"type": "SystemAssigned"}));
        base.properties
            .additional
            .insert("autoUpgradeProfile".to_string(), serde_json::json!({}));
        let mut desired = sample_desired();
        desired.tags.clear();

        let updated = ClusterSection::Tags.apply(base, &desired);
        assert!(updated.tags.is_empty());
        assert!(updated.additional.contains_key("identity"));
        assert!(updated.properties.additional.contains_key("autoUpgradeProfile"));
    }
}
