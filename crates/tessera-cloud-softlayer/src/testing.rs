//! In-memory doubles for unit tests

use crate::catalog::OrderPayload;
use crate::client::*;
use crate::error::{Result, SoftLayerError};
use crate::nitro::{AdcConnector, AdcNode, HaPeer};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

pub fn global_ip(id: u64, address: Option<&str>) -> GlobalIpRecord {
    GlobalIpRecord {
        id,
        ip_address: Some(IpAddressRef {
            id: Some(id + 1000),
            ip_address: address.map(str::to_string),
        }),
        destination_ip_address: None,
        billing_item: Some(BillingItemRef { id: id + 9000 }),
    }
}

fn api_error(message: &str) -> SoftLayerError {
    SoftLayerError::Api {
        status: 500,
        message: message.to_string(),
    }
}

/// Pops scripted answers, repeating the last one once the script runs out
fn next_scripted<T: Clone>(script: &Mutex<VecDeque<T>>) -> Option<T> {
    let mut script = script.lock().unwrap();
    if script.len() > 1 {
        script.pop_front()
    } else {
        script.front().cloned()
    }
}

#[derive(Default)]
pub struct FakeApi {
    calls: Mutex<HashMap<&'static str, u32>>,
    packages: Mutex<HashMap<String, ProductPackage>>,
    items: Mutex<HashMap<u64, Vec<ProductItem>>>,
    failing_items: Mutex<HashSet<u64>>,
    order_rejection: Mutex<Option<String>>,
    pub orders: Mutex<Vec<OrderPayload>>,
    global_ip_lookups: Mutex<VecDeque<Vec<GlobalIpRecord>>>,
    pub global_ips: Mutex<HashMap<u64, GlobalIpRecord>>,
    transactions: Mutex<VecDeque<Option<u64>>>,
    transactions_not_found: Mutex<bool>,
    pub routes: Mutex<Vec<(u64, String)>>,
    pub cancelled: Mutex<Vec<u64>>,
    pub virtual_ips: Mutex<HashMap<u64, VirtualIpAddress>>,
    edit_failures: Mutex<u32>,
    pub deleted_virtual_servers: Mutex<Vec<u64>>,
    pub domains: Mutex<HashMap<u64, DnsDomain>>,
    pub firewall_rules: Mutex<HashMap<u64, Vec<FirewallRule>>>,
    firewall_applies: Mutex<VecDeque<bool>>,
    pub vpx: Mutex<HashMap<u64, VpxAppliance>>,
    next_id: Mutex<u64>,
}

impl FakeApi {
    fn record(&self, method: &'static str) {
        *self.calls.lock().unwrap().entry(method).or_default() += 1;
    }

    fn next_id(&self) -> u64 {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        *next + 100
    }

    pub fn calls(&self, method: &str) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(method)
            .copied()
            .unwrap_or_default()
    }

    pub fn add_package(&self, package_type: &str, id: u64, items: Vec<ProductItem>) {
        self.packages.lock().unwrap().insert(
            package_type.to_string(),
            ProductPackage {
                id,
                name: None,
                key_name: Some(package_type.to_string()),
            },
        );
        self.items.lock().unwrap().insert(id, items);
    }

    pub fn fail_items_for(&self, package_id: u64) {
        self.failing_items.lock().unwrap().insert(package_id);
    }

    pub fn reject_orders(&self, message: &str) {
        *self.order_rejection.lock().unwrap() = Some(message.to_string());
    }

    pub fn script_global_ip_lookups(&self, script: Vec<Vec<GlobalIpRecord>>) {
        *self.global_ip_lookups.lock().unwrap() = script.into();
    }

    pub fn script_transactions(&self, script: Vec<Option<u64>>) {
        *self.transactions.lock().unwrap() = script.into();
    }

    pub fn fail_transactions_with_not_found(&self) {
        *self.transactions_not_found.lock().unwrap() = true;
    }

    pub fn add_virtual_ip(&self, vip: VirtualIpAddress) {
        self.virtual_ips.lock().unwrap().insert(vip.id, vip);
    }

    pub fn fail_next_edits(&self, count: u32) {
        *self.edit_failures.lock().unwrap() = count;
    }

    pub fn script_firewall_applies(&self, script: Vec<bool>) {
        *self.firewall_applies.lock().unwrap() = script.into();
    }

    pub fn add_vpx(&self, id: u64, address: &str, password: &str) {
        self.vpx.lock().unwrap().insert(
            id,
            VpxAppliance {
                id,
                name: None,
                management_ip_address: address.to_string(),
                password: Some(PasswordRef {
                    password: password.to_string(),
                }),
            },
        );
    }
}

#[async_trait]
impl SoftLayerApi for FakeApi {
    async fn get_package_by_type(&self, package_type: &str) -> Result<Option<ProductPackage>> {
        self.record("get_package_by_type");
        Ok(self.packages.lock().unwrap().get(package_type).cloned())
    }

    async fn get_package_items(&self, package_id: u64) -> Result<Vec<ProductItem>> {
        self.record("get_package_items");
        if self.failing_items.lock().unwrap().contains(&package_id) {
            return Err(api_error("connection reset"));
        }
        Ok(self
            .items
            .lock()
            .unwrap()
            .get(&package_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn place_order(&self, order: &OrderPayload) -> Result<OrderReceipt> {
        self.record("place_order");
        if let Some(message) = self.order_rejection.lock().unwrap().clone() {
            return Err(api_error(&message));
        }
        self.orders.lock().unwrap().push(order.clone());
        Ok(OrderReceipt {
            order_id: self.next_id(),
        })
    }

    async fn find_global_ips_by_order(&self, _order_id: u64) -> Result<Vec<GlobalIpRecord>> {
        self.record("find_global_ips_by_order");
        let records = next_scripted(&self.global_ip_lookups).unwrap_or_default();
        let mut known = self.global_ips.lock().unwrap();
        for record in &records {
            known.insert(record.id, record.clone());
        }
        Ok(records)
    }

    async fn get_global_ip(&self, id: u64) -> Result<GlobalIpRecord> {
        self.record("get_global_ip");
        self.global_ips
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| SoftLayerError::NotFound(format!("global IP {}", id)))
    }

    async fn route_global_ip(&self, id: u64, destination: &str) -> Result<bool> {
        self.record("route_global_ip");
        let mut known = self.global_ips.lock().unwrap();
        let record = known
            .get_mut(&id)
            .ok_or_else(|| SoftLayerError::NotFound(format!("global IP {}", id)))?;
        record.destination_ip_address = Some(IpAddressRef {
            id: None,
            ip_address: Some(destination.to_string()),
        });
        self.routes
            .lock()
            .unwrap()
            .push((id, destination.to_string()));
        Ok(true)
    }

    async fn unroute_global_ip(&self, id: u64) -> Result<bool> {
        self.record("unroute_global_ip");
        let mut known = self.global_ips.lock().unwrap();
        let record = known
            .get_mut(&id)
            .ok_or_else(|| SoftLayerError::NotFound(format!("global IP {}", id)))?;
        record.destination_ip_address = None;
        Ok(true)
    }

    async fn get_active_transaction(&self, global_ip_id: u64) -> Result<Option<Transaction>> {
        self.record("get_active_transaction");
        if *self.transactions_not_found.lock().unwrap() {
            return Err(SoftLayerError::NotFound(format!("global IP {}", global_ip_id)));
        }
        Ok(next_scripted(&self.transactions)
            .flatten()
            .map(|id| Transaction {
                id,
                transaction_status: None,
            }))
    }

    async fn cancel_billing_item(&self, billing_item_id: u64) -> Result<bool> {
        self.record("cancel_billing_item");
        self.cancelled.lock().unwrap().push(billing_item_id);
        self.global_ips
            .lock()
            .unwrap()
            .retain(|_, r| r.billing_item.as_ref().map(|b| b.id) != Some(billing_item_id));
        Ok(true)
    }

    async fn get_virtual_ip(&self, id: u64) -> Result<VirtualIpAddress> {
        self.record("get_virtual_ip");
        self.virtual_ips
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| SoftLayerError::NotFound(format!("virtual IP {}", id)))
    }

    async fn edit_virtual_ip(&self, id: u64, config: &VirtualIpAddress) -> Result<bool> {
        self.record("edit_virtual_ip");
        {
            let mut failures = self.edit_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(api_error("configuration change already in progress"));
            }
        }

        let mut vips = self.virtual_ips.lock().unwrap();
        let vip = vips
            .get_mut(&id)
            .ok_or_else(|| SoftLayerError::NotFound(format!("virtual IP {}", id)))?;
        // Merge by port, assigning ids to new servers and groups.
        for server in &config.virtual_servers {
            let mut server = server.clone();
            let base = self.next_id();
            server.id.get_or_insert(base);
            for (i, group) in server.service_groups.iter_mut().enumerate() {
                group.id.get_or_insert(base + 500 + i as u64);
            }
            vip.virtual_servers.retain(|s| s.port != server.port);
            vip.virtual_servers.push(server);
        }
        Ok(true)
    }

    async fn delete_virtual_server(&self, id: u64) -> Result<bool> {
        self.record("delete_virtual_server");
        self.deleted_virtual_servers.lock().unwrap().push(id);
        for vip in self.virtual_ips.lock().unwrap().values_mut() {
            vip.virtual_servers.retain(|s| s.id != Some(id));
        }
        Ok(true)
    }

    async fn create_domain(&self, domain: &DnsDomain) -> Result<DnsDomain> {
        self.record("create_domain");
        let id = self.next_id();
        let mut created = domain.clone();
        created.id = Some(id);
        created.serial = Some(1);
        for record in created.resource_records.iter_mut() {
            record.id = Some(self.next_id());
            record.domain_id = Some(id);
        }
        self.domains.lock().unwrap().insert(id, created.clone());
        Ok(created)
    }

    async fn get_domain(&self, id: u64) -> Result<DnsDomain> {
        self.record("get_domain");
        self.domains
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| SoftLayerError::NotFound(format!("domain {}", id)))
    }

    async fn delete_domain(&self, id: u64) -> Result<bool> {
        self.record("delete_domain");
        self.domains
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| true)
            .ok_or_else(|| SoftLayerError::NotFound(format!("domain {}", id)))
    }

    async fn create_resource_record(&self, record: &DnsResourceRecord) -> Result<DnsResourceRecord> {
        self.record("create_resource_record");
        let domain_id = record
            .domain_id
            .ok_or_else(|| api_error("domainId is required"))?;
        let mut created = record.clone();
        created.id = Some(self.next_id());
        let mut domains = self.domains.lock().unwrap();
        let domain = domains
            .get_mut(&domain_id)
            .ok_or_else(|| SoftLayerError::NotFound(format!("domain {}", domain_id)))?;
        domain.resource_records.push(created.clone());
        Ok(created)
    }

    async fn edit_resource_record(&self, record: &DnsResourceRecord) -> Result<bool> {
        self.record("edit_resource_record");
        for domain in self.domains.lock().unwrap().values_mut() {
            if let Some(existing) = domain
                .resource_records
                .iter_mut()
                .find(|r| r.id.is_some() && r.id == record.id)
            {
                *existing = record.clone();
                return Ok(true);
            }
        }
        Err(SoftLayerError::NotFound("resource record".to_string()))
    }

    async fn get_firewall_rules(&self, firewall_id: u64) -> Result<Vec<FirewallRule>> {
        self.record("get_firewall_rules");
        self.firewall_rules
            .lock()
            .unwrap()
            .get(&firewall_id)
            .cloned()
            .ok_or_else(|| SoftLayerError::NotFound(format!("firewall {}", firewall_id)))
    }

    async fn submit_firewall_update(
        &self,
        firewall_id: u64,
        rules: &[FirewallRule],
    ) -> Result<FirewallUpdateRequest> {
        self.record("submit_firewall_update");
        self.firewall_rules
            .lock()
            .unwrap()
            .insert(firewall_id, rules.to_vec());
        Ok(FirewallUpdateRequest {
            id: self.next_id(),
            apply_date: None,
        })
    }

    async fn get_firewall_update(&self, request_id: u64) -> Result<FirewallUpdateRequest> {
        self.record("get_firewall_update");
        let applied = next_scripted(&self.firewall_applies).unwrap_or(true);
        Ok(FirewallUpdateRequest {
            id: request_id,
            apply_date: applied.then(|| "2026-01-01T00:00:00Z".to_string()),
        })
    }

    async fn get_vpx(&self, id: u64) -> Result<VpxAppliance> {
        self.record("get_vpx");
        self.vpx
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| SoftLayerError::NotFound(format!("VPX {}", id)))
    }
}

/// Call log shared by a set of [`FakeNode`]s
#[derive(Clone, Default)]
pub struct NodeLog {
    entries: Arc<Mutex<Vec<(Instant, String)>>>,
}

impl NodeLog {
    fn push(&self, entry: String) {
        self.entries.lock().unwrap().push((Instant::now(), entry));
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// When the first entry containing `needle` was logged
    pub fn time_of(&self, needle: &str) -> Option<Instant> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .find(|(_, e)| e.contains(needle))
            .map(|(t, _)| *t)
    }
}

/// Appliance double with a shared HA peer table
pub struct FakeNode {
    address: String,
    password: Arc<Mutex<String>>,
    failing: Arc<Mutex<HashSet<&'static str>>>,
    peers: Arc<Mutex<HashMap<u32, String>>>,
    stay_secondary: Arc<Mutex<bool>>,
    log: NodeLog,
}

impl FakeNode {
    pub fn new(address: &str, password: &str, log: &NodeLog) -> Self {
        Self {
            address: address.to_string(),
            password: Arc::new(Mutex::new(password.to_string())),
            failing: Arc::default(),
            peers: Arc::default(),
            stay_secondary: Arc::default(),
            log: log.clone(),
        }
    }

    /// Another handle on the same appliance state
    pub fn handle(&self) -> Self {
        Self {
            address: self.address.clone(),
            password: self.password.clone(),
            failing: self.failing.clone(),
            peers: self.peers.clone(),
            stay_secondary: self.stay_secondary.clone(),
            log: self.log.clone(),
        }
    }

    /// Register a peer without logging a call
    pub fn with_peer(self, id: u32, address: &str) -> Self {
        self.peers.lock().unwrap().insert(id, address.to_string());
        self
    }

    pub fn fail_on(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    pub fn recover(&self, operation: &'static str) {
        self.failing.lock().unwrap().remove(operation);
    }

    pub fn stays_secondary(&self) -> bool {
        *self.stay_secondary.lock().unwrap()
    }

    pub fn password(&self) -> String {
        self.password.lock().unwrap().clone()
    }

    pub fn peer(&self, id: u32) -> Option<String> {
        self.peers.lock().unwrap().get(&id).cloned()
    }

    fn call(&self, operation: &'static str, detail: &str) -> Result<()> {
        if detail.is_empty() {
            self.log.push(format!("{} {}", self.address, operation));
        } else {
            self.log
                .push(format!("{} {} {}", self.address, operation, detail));
        }
        if self.failing.lock().unwrap().contains(operation) {
            return Err(SoftLayerError::Nitro {
                node: self.address.clone(),
                status: 599,
                message: format!("{} failed", operation),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AdcNode for FakeNode {
    fn address(&self) -> &str {
        &self.address
    }

    async fn change_admin_password(&self, new_password: &str) -> Result<()> {
        self.call("change_admin_password", new_password)?;
        *self.password.lock().unwrap() = new_password.to_string();
        Ok(())
    }

    async fn add_ha_peer(&self, peer_id: u32, peer_address: &str) -> Result<()> {
        self.call("add_ha_peer", &format!("{} {}", peer_id, peer_address))?;
        self.peers
            .lock()
            .unwrap()
            .insert(peer_id, peer_address.to_string());
        Ok(())
    }

    async fn remove_ha_peer(&self, peer_id: u32) -> Result<()> {
        self.call("remove_ha_peer", &peer_id.to_string())?;
        match self.peers.lock().unwrap().remove(&peer_id) {
            Some(_) => Ok(()),
            None => Err(SoftLayerError::Nitro {
                node: self.address.clone(),
                status: 404,
                message: format!("hanode {} does not exist", peer_id),
            }),
        }
    }

    async fn ha_peer(&self, peer_id: u32) -> Result<Option<HaPeer>> {
        Ok(self.peer(peer_id).map(|address| HaPeer {
            id: peer_id.to_string(),
            address,
        }))
    }

    async fn set_stay_secondary(&self, stay: bool) -> Result<()> {
        self.call("set_stay_secondary", if stay { "on" } else { "off" })?;
        *self.stay_secondary.lock().unwrap() = stay;
        Ok(())
    }

    async fn set_rpc_node(&self, address: &str, _password: &str) -> Result<()> {
        self.call("set_rpc_node", address)
    }

    async fn sync_ha_files(&self) -> Result<()> {
        self.call("sync_ha_files", "")
    }
}

/// Hands out handles to pre-registered [`FakeNode`]s by address
#[derive(Default)]
pub struct FakeConnector {
    nodes: Mutex<HashMap<String, FakeNode>>,
    pub connections: Mutex<Vec<(String, String)>>,
}

impl FakeConnector {
    pub fn add(&self, node: &FakeNode) {
        self.nodes
            .lock()
            .unwrap()
            .insert(node.address.clone(), node.handle());
    }
}

impl AdcConnector for FakeConnector {
    fn connect(&self, address: &str, password: &str) -> Box<dyn AdcNode> {
        self.connections
            .lock()
            .unwrap()
            .push((address.to_string(), password.to_string()));
        let nodes = self.nodes.lock().unwrap();
        let node = match nodes.get(address) {
            Some(node) => node.handle(),
            None => FakeNode::new(address, password, &NodeLog::default()),
        };
        Box::new(node)
    }
}
