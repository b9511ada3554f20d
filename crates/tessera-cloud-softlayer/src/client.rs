//! SoftLayer REST API client
//!
//! [`SoftLayerApi`] is the typed surface the resolver, flows and resources
//! consume. [`SoftLayerClient`] implements it over the REST endpoint using
//! HTTP basic authentication (username + API key).

use crate::catalog::OrderPayload;
use crate::config::ApiConfig;
use crate::error::{Result, SoftLayerError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Remote operations used by this provider
#[async_trait]
pub trait SoftLayerApi: Send + Sync {
    /// Look up the product package of `package_type` (`Ok(None)` when the catalog has none)
    async fn get_package_by_type(&self, package_type: &str) -> Result<Option<ProductPackage>>;

    async fn get_package_items(&self, package_id: u64) -> Result<Vec<ProductItem>>;

    async fn place_order(&self, order: &OrderPayload) -> Result<OrderReceipt>;

    /// Global IP records on the account created by `order_id`
    async fn find_global_ips_by_order(&self, order_id: u64) -> Result<Vec<GlobalIpRecord>>;

    async fn get_global_ip(&self, id: u64) -> Result<GlobalIpRecord>;

    async fn route_global_ip(&self, id: u64, destination: &str) -> Result<bool>;

    async fn unroute_global_ip(&self, id: u64) -> Result<bool>;

    /// The transaction currently running on a global IP, if any
    async fn get_active_transaction(&self, global_ip_id: u64) -> Result<Option<Transaction>>;

    async fn cancel_billing_item(&self, billing_item_id: u64) -> Result<bool>;

    async fn get_virtual_ip(&self, id: u64) -> Result<VirtualIpAddress>;

    /// Push a full virtual IP configuration to the load balancer
    async fn edit_virtual_ip(&self, id: u64, config: &VirtualIpAddress) -> Result<bool>;

    async fn delete_virtual_server(&self, id: u64) -> Result<bool>;

    async fn create_domain(&self, domain: &DnsDomain) -> Result<DnsDomain>;

    async fn get_domain(&self, id: u64) -> Result<DnsDomain>;

    async fn delete_domain(&self, id: u64) -> Result<bool>;

    async fn create_resource_record(&self, record: &DnsResourceRecord) -> Result<DnsResourceRecord>;

    async fn edit_resource_record(&self, record: &DnsResourceRecord) -> Result<bool>;

    async fn get_firewall_rules(&self, firewall_id: u64) -> Result<Vec<FirewallRule>>;

    /// Submit a full replacement rule set; applied asynchronously
    async fn submit_firewall_update(
        &self,
        firewall_id: u64,
        rules: &[FirewallRule],
    ) -> Result<FirewallUpdateRequest>;

    async fn get_firewall_update(&self, request_id: u64) -> Result<FirewallUpdateRequest>;

    /// VPX appliance details including its management address and admin password
    async fn get_vpx(&self, id: u64) -> Result<VpxAppliance>;
}

// ============ Catalog ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPackage {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub key_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductItem {
    pub key_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub prices: Vec<ItemPrice>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPrice {
    pub id: u64,
    /// Set for location-specific prices; `None` is the standard price
    #[serde(default)]
    pub location_group_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    pub order_id: u64,
}

// ============ Global IPs ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpAddressRef {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingItemRef {
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalIpRecord {
    pub id: u64,
    #[serde(default)]
    pub ip_address: Option<IpAddressRef>,
    #[serde(default)]
    pub destination_ip_address: Option<IpAddressRef>,
    #[serde(default)]
    pub billing_item: Option<BillingItemRef>,
}

impl GlobalIpRecord {
    /// The assigned address, once the remote side has populated it
    pub fn address(&self) -> Option<&str> {
        self.ip_address
            .as_ref()?
            .ip_address
            .as_deref()
            .filter(|ip| !ip.is_empty())
    }

    pub fn destination(&self) -> Option<&str> {
        self.destination_ip_address.as_ref()?.ip_address.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: u64,
    #[serde(default)]
    pub transaction_status: Option<TransactionStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionStatus {
    pub name: String,
}

// ============ Load balancer ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualIpAddress {
    pub id: u64,
    #[serde(default)]
    pub virtual_servers: Vec<VirtualServer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub port: u16,
    /// Share of the VIP's connections, in percent
    pub allocation: u32,
    #[serde(default)]
    pub service_groups: Vec<ServiceGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub routing_method_id: u64,
    pub routing_type_id: u64,
    #[serde(default)]
    pub services: Vec<LbService>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LbService {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub ip_address_id: u64,
    pub port: u16,
    /// 1 for enabled, 0 for disabled
    pub enabled: u8,
    #[serde(default)]
    pub health_checks: Vec<HealthCheck>,
    #[serde(default)]
    pub group_references: Vec<GroupReference>,
}

impl LbService {
    pub fn health_check_type_id(&self) -> Option<u64> {
        self.health_checks.first().map(|c| c.health_check_type_id)
    }

    /// Weight within the service group
    pub fn weight(&self) -> Option<u32> {
        self.group_references.first().map(|r| r.weight)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub health_check_type_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupReference {
    pub weight: u32,
}

// ============ DNS ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsDomain {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_records: Vec<DnsResourceRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsResourceRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<u64>,
    pub host: String,
    pub data: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub ttl: u32,
}

impl DnsResourceRecord {
    /// The zone-apex A record (`@`) pointing at `target`
    pub fn apex_a(target: impl Into<String>, ttl: u32) -> Self {
        Self {
            id: None,
            domain_id: None,
            host: "@".to_string(),
            data: target.into(),
            record_type: "a".to_string(),
            ttl,
        }
    }

    pub fn is_apex_a(&self) -> bool {
        self.host == "@" && self.record_type.eq_ignore_ascii_case("a")
    }
}

// ============ Firewall ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallRule {
    pub order_value: u32,
    pub action: String,
    pub source_ip_address: String,
    #[serde(default)]
    pub source_ip_cidr: u8,
    pub destination_ip_address: String,
    #[serde(default)]
    pub destination_ip_cidr: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_port_range_start: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_port_range_end: Option<u16>,
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallUpdateRequest {
    pub id: u64,
    /// Set once the rules have been applied to the device
    #[serde(default)]
    pub apply_date: Option<String>,
}

// ============ VPX ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasswordRef {
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpxAppliance {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    pub management_ip_address: String,
    #[serde(default)]
    pub password: Option<PasswordRef>,
}

impl VpxAppliance {
    pub fn admin_password(&self) -> Result<&str> {
        self.password
            .as_ref()
            .map(|p| p.password.as_str())
            .ok_or_else(|| SoftLayerError::NotFound(format!("admin password of VPX {}", self.id)))
    }
}

// ============ REST client ============

const GLOBAL_IP_MASK: &str =
    "id,ipAddress[id,ipAddress],destinationIpAddress[ipAddress],billingItem[id]";

/// SoftLayer REST client
pub struct SoftLayerClient {
    client: reqwest::Client,
    config: ApiConfig,
}

impl SoftLayerClient {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::new(ApiConfig::from_env()?))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.endpoint, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        tracing::debug!("GET {}", path);
        let response = self
            .client
            .get(self.url(path))
            .basic_auth(&self.config.username, Some(&self.config.api_key))
            .query(query)
            .send()
            .await?;
        Self::decode(path, response).await
    }

    /// POST `{"parameters": parameters}`, the SoftLayer calling convention
    async fn post<T: DeserializeOwned, P: Serialize + ?Sized>(
        &self,
        path: &str,
        parameters: &P,
    ) -> Result<T> {
        tracing::debug!("POST {}", path);
        let response = self
            .client
            .post(self.url(path))
            .basic_auth(&self.config.username, Some(&self.config.api_key))
            .json(&serde_json::json!({ "parameters": parameters }))
            .send()
            .await?;
        Self::decode(path, response).await
    }

    async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        tracing::debug!("DELETE {}", path);
        let response = self
            .client
            .delete(self.url(path))
            .basic_auth(&self.config.username, Some(&self.config.api_key))
            .send()
            .await?;
        Self::decode(path, response).await
    }

    async fn decode<T: DeserializeOwned>(path: &str, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SoftLayerError::NotFound(path.to_string()));
        }

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(SoftLayerError::Api {
                status: status.as_u16(),
                message,
            });
        }

        // Methods returning nothing (e.g. no active transaction) answer with an empty body.
        let body = if body.trim().is_empty() { "null" } else { body.as_str() };
        Ok(serde_json::from_str(body)?)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
}

fn mask(value: &str) -> (&'static str, String) {
    ("objectMask", format!("mask[{}]", value))
}

fn filter(value: serde_json::Value) -> (&'static str, String) {
    ("objectFilter", value.to_string())
}

#[async_trait]
impl SoftLayerApi for SoftLayerClient {
    async fn get_package_by_type(&self, package_type: &str) -> Result<Option<ProductPackage>> {
        let packages: Vec<ProductPackage> = self
            .get(
                "SoftLayer_Product_Package/getAllObjects.json",
                &[
                    mask("id,name,keyName"),
                    filter(serde_json::json!({
                        "type": { "keyName": { "operation": package_type } }
                    })),
                ],
            )
            .await?;
        Ok(packages.into_iter().next())
    }

    async fn get_package_items(&self, package_id: u64) -> Result<Vec<ProductItem>> {
        self.get(
            &format!("SoftLayer_Product_Package/{}/getItems.json", package_id),
            &[mask("keyName,description,prices[id,locationGroupId]")],
        )
        .await
    }

    async fn place_order(&self, order: &OrderPayload) -> Result<OrderReceipt> {
        self.post("SoftLayer_Product_Order/placeOrder.json", &[order])
            .await
    }

    async fn find_global_ips_by_order(&self, order_id: u64) -> Result<Vec<GlobalIpRecord>> {
        self.get(
            "SoftLayer_Account/getGlobalIpRecords.json",
            &[
                mask(GLOBAL_IP_MASK),
                filter(serde_json::json!({
                    "globalIpRecords": {
                        "billingItem": { "orderItem": { "order": {
                            "id": { "operation": order_id }
                        } } }
                    }
                })),
            ],
        )
        .await
    }

    async fn get_global_ip(&self, id: u64) -> Result<GlobalIpRecord> {
        self.get(
            &format!("SoftLayer_Network_Subnet_IpAddress_Global/{}/getObject.json", id),
            &[mask(GLOBAL_IP_MASK)],
        )
        .await
    }

    async fn route_global_ip(&self, id: u64, destination: &str) -> Result<bool> {
        self.post(
            &format!("SoftLayer_Network_Subnet_IpAddress_Global/{}/route.json", id),
            &[destination],
        )
        .await
    }

    async fn unroute_global_ip(&self, id: u64) -> Result<bool> {
        self.get(
            &format!("SoftLayer_Network_Subnet_IpAddress_Global/{}/unroute.json", id),
            &[],
        )
        .await
    }

    async fn get_active_transaction(&self, global_ip_id: u64) -> Result<Option<Transaction>> {
        self.get(
            &format!(
                "SoftLayer_Network_Subnet_IpAddress_Global/{}/getActiveTransaction.json",
                global_ip_id
            ),
            &[mask("id,transactionStatus[name]")],
        )
        .await
    }

    async fn cancel_billing_item(&self, billing_item_id: u64) -> Result<bool> {
        self.get(
            &format!("SoftLayer_Billing_Item/{}/cancelService.json", billing_item_id),
            &[],
        )
        .await
    }

    async fn get_virtual_ip(&self, id: u64) -> Result<VirtualIpAddress> {
        self.get(
            &format!(
                "SoftLayer_Network_Application_Delivery_Controller_LoadBalancer_VirtualIpAddress/{}/getObject.json",
                id
            ),
            &[mask("id,virtualServers[id,port,allocation,serviceGroups[id,routingMethodId,routingTypeId,services[id,ipAddressId,port,enabled,healthChecks[healthCheckTypeId],groupReferences[weight]]]]")],
        )
        .await
    }

    async fn edit_virtual_ip(&self, id: u64, config: &VirtualIpAddress) -> Result<bool> {
        self.post(
            &format!(
                "SoftLayer_Network_Application_Delivery_Controller_LoadBalancer_VirtualIpAddress/{}/editObject.json",
                id
            ),
            &[config],
        )
        .await
    }

    async fn delete_virtual_server(&self, id: u64) -> Result<bool> {
        self.delete(&format!(
            "SoftLayer_Network_Application_Delivery_Controller_LoadBalancer_VirtualServer/{}.json",
            id
        ))
        .await
    }

    async fn create_domain(&self, domain: &DnsDomain) -> Result<DnsDomain> {
        self.post("SoftLayer_Dns_Domain/createObject.json", &[domain])
            .await
    }

    async fn get_domain(&self, id: u64) -> Result<DnsDomain> {
        self.get(
            &format!("SoftLayer_Dns_Domain/{}/getObject.json", id),
            &[mask("id,name,serial,resourceRecords[id,domainId,host,data,type,ttl]")],
        )
        .await
    }

    async fn delete_domain(&self, id: u64) -> Result<bool> {
        self.delete(&format!("SoftLayer_Dns_Domain/{}.json", id))
            .await
    }

    async fn create_resource_record(&self, record: &DnsResourceRecord) -> Result<DnsResourceRecord> {
        self.post("SoftLayer_Dns_Domain_ResourceRecord/createObject.json", &[record])
            .await
    }

    async fn edit_resource_record(&self, record: &DnsResourceRecord) -> Result<bool> {
        let id = record
            .id
            .ok_or_else(|| SoftLayerError::InvalidConfig("resource record has no id".to_string()))?;
        self.post(
            &format!("SoftLayer_Dns_Domain_ResourceRecord/{}/editObject.json", id),
            &[record],
        )
        .await
    }

    async fn get_firewall_rules(&self, firewall_id: u64) -> Result<Vec<FirewallRule>> {
        self.get(
            &format!("SoftLayer_Network_Component_Firewall/{}/getRules.json", firewall_id),
            &[mask("orderValue,action,sourceIpAddress,sourceIpCidr,destinationIpAddress,destinationIpCidr,destinationPortRangeStart,destinationPortRangeEnd,protocol,notes")],
        )
        .await
    }

    async fn submit_firewall_update(
        &self,
        firewall_id: u64,
        rules: &[FirewallRule],
    ) -> Result<FirewallUpdateRequest> {
        self.post(
            "SoftLayer_Network_Firewall_Update_Request/createObject.json",
            &[serde_json::json!({
                "networkComponentFirewallId": firewall_id,
                "rules": rules,
            })],
        )
        .await
    }

    async fn get_firewall_update(&self, request_id: u64) -> Result<FirewallUpdateRequest> {
        self.get(
            &format!(
                "SoftLayer_Network_Firewall_Update_Request/{}/getObject.json",
                request_id
            ),
            &[mask("id,applyDate")],
        )
        .await
    }

    async fn get_vpx(&self, id: u64) -> Result<VpxAppliance> {
        self.get(
            &format!(
                "SoftLayer_Network_Application_Delivery_Controller/{}/getObject.json",
                id
            ),
            &[mask("id,name,managementIpAddress,password[password]")],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_ip_address_requires_value() {
        let pending: GlobalIpRecord = serde_json::from_value(serde_json::json!({
            "id": 10,
            "ipAddress": { "id": 3, "ipAddress": "" }
        }))
        .unwrap();
        assert_eq!(pending.address(), None);

        let ready: GlobalIpRecord = serde_json::from_value(serde_json::json!({
            "id": 10,
            "ipAddress": { "id": 3, "ipAddress": "169.55.1.2" },
            "billingItem": { "id": 99 }
        }))
        .unwrap();
        assert_eq!(ready.address(), Some("169.55.1.2"));
        assert_eq!(ready.billing_item.unwrap().id, 99);
    }

    #[test]
    fn test_lb_service_nested_health_check_and_weight() {
        let masked = serde_json::json!({
            "id": 5,
            "ipAddressId": 300,
            "port": 8080,
            "enabled": 1,
            "healthChecks": [{ "healthCheckTypeId": 21 }],
            "groupReferences": [{ "weight": 5 }]
        });

        let service: LbService = serde_json::from_value(masked.clone()).unwrap();
        assert_eq!(service.health_check_type_id(), Some(21));
        assert_eq!(service.weight(), Some(5));

        let pushed = serde_json::to_value(&service).unwrap();
        assert_eq!(pushed, masked);
        assert!(pushed.get("weight").is_none());
    }

    #[test]
    fn test_dns_record_type_field() {
        let record = DnsResourceRecord::apex_a("10.0.0.1", 900);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["type"], "a");
        assert_eq!(json["host"], "@");
        assert!(json.get("id").is_none());
        assert!(record.is_apex_a());
    }

    #[test]
    fn test_vpx_password() {
        let vpx: VpxAppliance = serde_json::from_value(serde_json::json!({
            "id": 5,
            "managementIpAddress": "10.1.1.5",
            "password": { "password": "s3cret" }
        }))
        .unwrap();
        assert_eq!(vpx.admin_password().unwrap(), "s3cret");

        let no_password = VpxAppliance {
            password: None,
            ..vpx
        };
        assert!(no_password.admin_password().unwrap_err().is_not_found());
    }
}
