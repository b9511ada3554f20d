//! NetScaler VPX Nitro API client
//!
//! Used by the HA choreography to talk to the appliances directly, over
//! their management addresses.

use crate::error::{Result, SoftLayerError};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Mutex;

const ADMIN_USER: &str = "root";

/// HA-related operations on one appliance
#[async_trait]
pub trait AdcNode: Send + Sync {
    /// Management address of the appliance
    fn address(&self) -> &str;

    /// Change the admin password; later calls authenticate with the new one
    async fn change_admin_password(&self, new_password: &str) -> Result<()>;

    async fn add_ha_peer(&self, peer_id: u32, peer_address: &str) -> Result<()>;

    async fn remove_ha_peer(&self, peer_id: u32) -> Result<()>;

    /// The registered HA peer with `peer_id`, if any
    async fn ha_peer(&self, peer_id: u32) -> Result<Option<HaPeer>>;

    /// Keep this node secondary regardless of its peer's health, or let it
    /// take part in failover again
    async fn set_stay_secondary(&self, stay: bool) -> Result<()>;

    /// Register the RPC node entry for `address` with `password`
    async fn set_rpc_node(&self, address: &str, password: &str) -> Result<()>;

    /// Synchronize configuration files to the peer
    async fn sync_ha_files(&self) -> Result<()>;
}

/// Opens [`AdcNode`] sessions
pub trait AdcConnector: Send + Sync {
    fn connect(&self, address: &str, password: &str) -> Box<dyn AdcNode>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HaPeer {
    pub id: String,
    #[serde(rename = "ipaddress")]
    pub address: String,
}

/// Nitro REST client for one appliance
pub struct NitroClient {
    client: reqwest::Client,
    address: String,
    password: Mutex<String>,
}

impl NitroClient {
    pub fn new(address: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            address: address.into(),
            password: Mutex::new(password.into()),
        }
    }

    fn url(&self, resource: &str) -> String {
        format!("http://{}/nitro/v1/config/{}", self.address, resource)
    }

    fn current_password(&self) -> String {
        self.password
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String> {
        let response = request
            .header("X-NITRO-USER", ADMIN_USER)
            .header("X-NITRO-PASS", self.current_password())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<NitroErrorBody>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(SoftLayerError::Nitro {
                node: self.address.clone(),
                status: status.as_u16(),
                message,
            });
        }
        Ok(body)
    }

    async fn post(&self, resource: &str, body: serde_json::Value) -> Result<()> {
        tracing::debug!("Nitro POST {} on {}", resource, self.address);
        self.send(self.client.post(self.url(resource)).json(&body))
            .await?;
        Ok(())
    }

    async fn put(&self, resource: &str, body: serde_json::Value) -> Result<()> {
        tracing::debug!("Nitro PUT {} on {}", resource, self.address);
        self.send(self.client.put(self.url(resource)).json(&body))
            .await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct NitroErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct HaNodeList {
    #[serde(default)]
    hanode: Vec<HaPeer>,
}

#[async_trait]
impl AdcNode for NitroClient {
    fn address(&self) -> &str {
        &self.address
    }

    async fn change_admin_password(&self, new_password: &str) -> Result<()> {
        self.put(
            "systemuser",
            serde_json::json!({
                "systemuser": { "username": ADMIN_USER, "password": new_password }
            }),
        )
        .await?;

        *self
            .password
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = new_password.to_string();
        Ok(())
    }

    async fn add_ha_peer(&self, peer_id: u32, peer_address: &str) -> Result<()> {
        self.post(
            "hanode",
            serde_json::json!({ "hanode": { "id": peer_id, "ipaddress": peer_address } }),
        )
        .await
    }

    async fn remove_ha_peer(&self, peer_id: u32) -> Result<()> {
        tracing::debug!("Nitro DELETE hanode/{} on {}", peer_id, self.address);
        self.send(self.client.delete(self.url(&format!("hanode/{}", peer_id))))
            .await?;
        Ok(())
    }

    async fn ha_peer(&self, peer_id: u32) -> Result<Option<HaPeer>> {
        match self
            .send(self.client.get(self.url(&format!("hanode/{}", peer_id))))
            .await
        {
            Ok(body) => {
                let list: HaNodeList = serde_json::from_str(&body)?;
                Ok(list.hanode.into_iter().next())
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set_stay_secondary(&self, stay: bool) -> Result<()> {
        let status = if stay { "STAYSECONDARY" } else { "ENABLED" };
        self.put(
            "hanode",
            serde_json::json!({ "hanode": { "id": 0, "hastatus": status } }),
        )
        .await
    }

    async fn set_rpc_node(&self, address: &str, password: &str) -> Result<()> {
        self.put(
            "nsrpcnode",
            serde_json::json!({ "nsrpcnode": { "ipaddress": address, "password": password } }),
        )
        .await
    }

    async fn sync_ha_files(&self) -> Result<()> {
        self.post(
            "hafiles?action=sync",
            serde_json::json!({ "hafiles": { "mode": ["all"] } }),
        )
        .await
    }
}

/// Connects to appliances over Nitro
#[derive(Debug, Clone, Copy, Default)]
pub struct NitroConnector;

impl AdcConnector for NitroConnector {
    fn connect(&self, address: &str, password: &str) -> Box<dyn AdcNode> {
        Box::new(NitroClient::new(address, password))
    }
}
