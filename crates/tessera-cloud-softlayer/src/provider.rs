//! SoftLayer provider
//!
//! Owns the API session and timing configuration and hands out the
//! resources built on them. The free functions below reconcile a resource
//! and keep the local [`GlobalState`] in step with the result.

use crate::client::{SoftLayerApi, SoftLayerClient};
use crate::config::ReconcileConfig;
use crate::error::Result;
use crate::nitro::{AdcConnector, NitroConnector};
use crate::resources::{
    DnsZoneResource, FirewallRulesResource, GlobalIpResource, HaPairResource,
    LoadBalancerServiceResource,
};
use std::sync::Arc;
use tessera_cloud::{GlobalState, Resource, ResourceError, ResourceState, ensure, state_key};

pub const PROVIDER_NAME: &str = "softlayer";

/// SoftLayer provider
pub struct SoftLayerProvider {
    api: Arc<dyn SoftLayerApi>,
    connector: Arc<dyn AdcConnector>,
    config: ReconcileConfig,
}

impl SoftLayerProvider {
    pub fn new(api: Arc<dyn SoftLayerApi>, config: ReconcileConfig) -> Self {
        Self {
            api,
            connector: Arc::new(NitroConnector),
            config,
        }
    }

    /// Provider using credentials from `SOFTLAYER_USERNAME` / `SOFTLAYER_API_KEY`
    pub fn from_env(config: ReconcileConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(Arc::new(SoftLayerClient::from_env()?), config))
    }

    /// Replace how appliances are reached for HA pairing
    pub fn with_connector(mut self, connector: Arc<dyn AdcConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn api(&self) -> &dyn SoftLayerApi {
        self.api.as_ref()
    }

    pub fn global_ips(&self) -> GlobalIpResource {
        GlobalIpResource::new(self.api.clone(), self.config.clone())
    }

    pub fn lb_services(&self) -> LoadBalancerServiceResource {
        LoadBalancerServiceResource::new(self.api.clone(), self.config.clone())
    }

    pub fn dns_zones(&self) -> DnsZoneResource {
        DnsZoneResource::new(self.api.clone())
    }

    pub fn firewalls(&self) -> FirewallRulesResource {
        FirewallRulesResource::new(self.api.clone(), self.config.clone())
    }

    pub fn ha_pairs(&self) -> HaPairResource {
        HaPairResource::new(
            self.api.clone(),
            self.connector.clone(),
            self.config.clone(),
        )
    }
}

/// Reconcile one object and record what was observed.
///
/// When the previously recorded object had to be replaced, its entry is
/// dropped from `state`. An object that was created but never became ready
/// is still recorded before the error is returned.
pub async fn apply<R: Resource + ?Sized>(
    state: &mut GlobalState,
    resource: &R,
    recorded_id: Option<&str>,
    spec: &R::Spec,
) -> std::result::Result<ResourceState, R::Error> {
    let observed = match ensure(resource, recorded_id, spec).await {
        Ok(observed) => observed,
        Err(e) => {
            if let Some(partial) = e.partial_state() {
                tracing::warn!(
                    "Recording {} {} as {}",
                    partial.resource_type,
                    partial.id,
                    partial.status
                );
                record_replacing(state, resource, recorded_id, partial.clone());
            }
            return Err(e);
        }
    };

    record_replacing(state, resource, recorded_id, observed.clone());
    Ok(observed)
}

fn record_replacing<R: Resource + ?Sized>(
    state: &mut GlobalState,
    resource: &R,
    recorded_id: Option<&str>,
    observed: ResourceState,
) {
    if let Some(old) = recorded_id.filter(|old| *old != observed.id) {
        state.forget(&state_key(PROVIDER_NAME, resource.resource_type(), old));
    }
    state.record(PROVIDER_NAME, observed);
}

/// Delete an object and forget it.
pub async fn destroy<R: Resource + ?Sized>(
    state: &mut GlobalState,
    resource: &R,
    id: &str,
) -> std::result::Result<(), R::Error> {
    resource.delete(id).await?;
    state.forget(&state_key(PROVIDER_NAME, resource.resource_type(), id));
    tracing::info!("Destroyed {} {}", resource.resource_type(), id);
    Ok(())
}

/// Re-read every recorded object of the resource's type.
///
/// Objects that no longer exist remotely are dropped; returns how many.
pub async fn refresh<R: Resource + ?Sized>(
    state: &mut GlobalState,
    resource: &R,
) -> std::result::Result<usize, R::Error> {
    let ids: Vec<String> = state
        .by_type(PROVIDER_NAME, resource.resource_type())
        .map(|r| r.id.clone())
        .collect();

    let mut dropped = 0;
    for id in ids {
        match resource.read(&id).await? {
            Some(mut observed) => {
                if let Some(previous) =
                    state.get(&state_key(PROVIDER_NAME, resource.resource_type(), &id))
                {
                    observed.created_at = previous.created_at;
                }
                state.record(PROVIDER_NAME, observed);
            }
            None => {
                tracing::warn!(
                    "{} {} disappeared remotely, dropping it from state",
                    resource.resource_type(),
                    id
                );
                state.forget(&state_key(PROVIDER_NAME, resource.resource_type(), &id));
                dropped += 1;
            }
        }
    }
    Ok(dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ItemPrice, ProductItem};
    use crate::resources::{DnsZoneSpec, GlobalIpSpec, IpVersion};
    use crate::testing::{FakeApi, global_ip};
    use tessera_cloud::{ResourceStatus, StateManager};

    fn zone(target: &str) -> DnsZoneSpec {
        DnsZoneSpec {
            name: "example.com".to_string(),
            target: Some(target.to_string()),
            ttl: 300,
        }
    }

    #[tokio::test]
    async fn test_apply_records_and_persists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        let provider = SoftLayerProvider::new(Arc::new(FakeApi::default()), ReconcileConfig::default());
        let zones = provider.dns_zones();

        let lock = manager.acquire_lock().await.unwrap();
        let mut state = manager.load().await.unwrap();
        let observed = apply(&mut state, &zones, None, &zone("10.0.0.1"))
            .await
            .unwrap();
        manager.save(&state).await.unwrap();
        lock.release().await.unwrap();

        let reloaded = manager.load().await.unwrap();
        let key = state_key(PROVIDER_NAME, "dns-zone", &observed.id);
        assert_eq!(
            reloaded.get(&key).unwrap().attribute::<String>("target").unwrap(),
            "10.0.0.1"
        );
    }

    #[tokio::test]
    async fn test_apply_replaces_vanished_object() {
        let provider = SoftLayerProvider::new(Arc::new(FakeApi::default()), ReconcileConfig::default());
        let zones = provider.dns_zones();
        let mut state = GlobalState::new();

        let first = apply(&mut state, &zones, None, &zone("10.0.0.1")).await.unwrap();
        // Removed behind our back.
        zones.delete(&first.id).await.unwrap();

        let second = apply(&mut state, &zones, Some(&first.id), &zone("10.0.0.1"))
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(state.by_type(PROVIDER_NAME, "dns-zone").count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_records_ip_whose_routing_never_finishes() {
        let api = FakeApi::default();
        api.add_package(
            "ADDITIONAL_SERVICES",
            8,
            vec![ProductItem {
                key_name: "GLOBAL_IPV4".to_string(),
                description: None,
                prices: vec![ItemPrice {
                    id: 4001,
                    location_group_id: None,
                }],
            }],
        );
        api.script_global_ip_lookups(vec![vec![global_ip(77, Some("169.45.1.9"))]]);
        api.script_transactions(vec![Some(1)]);
        let api = Arc::new(api);
        let provider = SoftLayerProvider::new(
            api.clone(),
            ReconcileConfig {
                routing_timeout_secs: 30,
                ..Default::default()
            },
        );
        let ips = provider.global_ips();
        let mut state = GlobalState::new();

        let err = apply(
            &mut state,
            &ips,
            None,
            &GlobalIpSpec {
                version: IpVersion::V4,
                routes_to: Some("10.0.0.5".to_string()),
            },
        )
        .await
        .unwrap_err();

        assert!(err.is_timeout());
        let recorded = state
            .get(&state_key(PROVIDER_NAME, "global-ip", "77"))
            .unwrap();
        assert_eq!(recorded.status, ResourceStatus::Provisioning);
        assert_eq!(recorded.attribute::<String>("ip_address").unwrap(), "169.45.1.9");

        // The next run adopts the recorded IP instead of ordering another one.
        api.script_transactions(vec![None]);
        let observed = apply(
            &mut state,
            &ips,
            Some("77"),
            &GlobalIpSpec {
                version: IpVersion::V4,
                routes_to: Some("10.0.0.5".to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(observed.id, "77");
        assert_eq!(observed.status, ResourceStatus::Active);
        assert_eq!(api.calls("place_order"), 1);
        assert_eq!(state.by_type(PROVIDER_NAME, "global-ip").count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_and_destroy() {
        let provider = SoftLayerProvider::new(Arc::new(FakeApi::default()), ReconcileConfig::default());
        let zones = provider.dns_zones();
        let mut state = GlobalState::new();

        let kept = apply(&mut state, &zones, None, &zone("10.0.0.1")).await.unwrap();
        let gone = apply(&mut state, &zones, None, &zone("10.0.0.2")).await.unwrap();
        zones.delete(&gone.id).await.unwrap();

        assert_eq!(refresh(&mut state, &zones).await.unwrap(), 1);
        assert_eq!(state.by_type(PROVIDER_NAME, "dns-zone").count(), 1);

        destroy(&mut state, &zones, &kept.id).await.unwrap();
        assert!(state.resources.is_empty());
        assert!(!zones.exists(&kept.id).await.unwrap());
    }
}
