//! Endpoint resolution pipeline.
//!
//! Walks interface, switchport and MAC-address-table state per switch and
//! correlates it into a registry mapping each MAC address to its physical
//! attachment point. SVIs are endpoints in their own right; MAC-table entries
//! only count when they sit on a static access port.

use std::collections::HashSet;
use std::fmt::Display;
use std::sync::Mutex;

use mac_address::MacAddress;
use tracing::{debug, info, warn};

use crate::{
    FleetProbeError,
    cisco::{
        self, InterfaceRecord, MacTableRecord, SwitchportRecord, parse_mac,
    },
    session::DeviceSession,
};

/// Sentinel port name for routed (SVI) endpoints.
pub const SVI_PORT: &str = "SVI";

/// A resolved (MAC, switch, port, VLAN) attachment record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub mac: MacAddress,
    pub switch: String,
    /// Physical port name, or [`SVI_PORT`] for routed interfaces.
    pub port: String,
    /// VLAN id, or the interface name for SVI endpoints.
    pub vlan: String,
}

impl Endpoint {
    pub fn new(switch: &str, port: &str, vlan: &str, mac: MacAddress) -> Self {
        Self {
            mac,
            switch: switch.to_string(),
            port: port.to_string(),
            vlan: vlan.to_string(),
        }
    }

    pub fn is_svi(&self) -> bool {
        self.port == SVI_PORT
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} on {}.{} vlan-{}",
            self.mac, self.switch, self.port, self.vlan
        )
    }
}

/// Parsed state of one switch: the three command outputs, as records.
#[derive(Debug, Clone, Default)]
pub struct TopologySample {
    pub switch: String,
    pub interfaces: Vec<InterfaceRecord>,
    pub switchports: Vec<SwitchportRecord>,
    pub mac_table: Vec<MacTableRecord>,
}

/// Issue the three topology queries against one connected device.
pub async fn sample_device<S: DeviceSession>(
    switch: &str,
    session: &mut S,
) -> Result<TopologySample, FleetProbeError> {
    let interfaces_raw = session.execute("show interfaces").await?;
    let switchports_raw = session.execute("show interfaces switchport").await?;
    let mac_table_raw = session.execute("show mac address-table").await?;

    Ok(TopologySample {
        switch: switch.to_string(),
        interfaces: cisco::parse_interfaces(&interfaces_raw)?,
        switchports: cisco::parse_switchports(&switchports_raw)?,
        mac_table: cisco::parse_mac_table(&mac_table_raw)?,
    })
}

/// Derive the set of ports eligible to host endpoints: administratively
/// `static access`, operationally not down.
///
/// Trunk and dynamic-mode ports are deliberately excluded even though real
/// end-hosts can sit behind them; they are never treated as physical
/// endpoint locations.
pub fn access_ports(switch: &str, switchports: &[SwitchportRecord]) -> HashSet<String> {
    let mut ports = HashSet::new();
    for entry in switchports {
        if entry.mode == "down" {
            debug!("{}: skip down {}", switch, entry.interface);
            continue;
        }
        if entry.admin_mode == "static access" {
            ports.insert(entry.interface.clone());
        }
    }
    info!("{}: access ports = {:?}", switch, ports);
    ports
}

/// Emit SVI interfaces as endpoints directly; their address is authoritative,
/// no MAC-table correlation needed. Interfaces that are not up/up are skipped.
pub fn svi_endpoints(switch: &str, interfaces: &[InterfaceRecord]) -> Vec<Endpoint> {
    let mut endpoints = Vec::new();
    for iface in interfaces {
        if iface.link_status != "up" || iface.protocol_status != "up" {
            debug!("{}: {} is down", switch, iface.interface);
            continue;
        }
        if iface.hardware_type != "EtherSVI" {
            continue;
        }

        let address = match iface.address.as_deref() {
            Some(address) => address,
            None => {
                warn!(
                    "{}: SVI {} has no address, skipping",
                    switch, iface.interface
                );
                continue;
            }
        };
        match parse_mac(address) {
            Ok(mac) => {
                debug!("{}: {} is SVI", switch, iface.interface);
                endpoints.push(Endpoint::new(switch, SVI_PORT, &iface.interface, mac));
            }
            Err(err) => {
                warn!("{}: SVI {} address unparseable: {}", switch, iface.interface, err);
            }
        }
    }
    endpoints
}

/// Join MAC-table entries against the switch's access-port set.
///
/// STATIC entries are reserved/system addresses, not end-hosts; entries on
/// ports outside the access set are dropped silently (trunks and uplinks are
/// excluded from endpoint attribution).
pub fn correlate_mac_table(
    switch: &str,
    mac_table: &[MacTableRecord],
    access_ports: &HashSet<String>,
    registry: &EndpointRegistry,
) {
    for entry in mac_table {
        if entry.entry_type == "STATIC" {
            debug!("{}: skip static {}", switch, entry.destination_address);
            continue;
        }
        if !access_ports.contains(&entry.destination_port) {
            continue;
        }
        match parse_mac(&entry.destination_address) {
            Ok(mac) => {
                registry.add(Endpoint::new(
                    switch,
                    &entry.destination_port,
                    &entry.vlan,
                    mac,
                ));
            }
            Err(err) => {
                warn!(
                    "{}: MAC-table address {} unparseable: {}",
                    switch, entry.destination_address, err
                );
            }
        }
    }
}

/// Run classification and correlation for one switch's sample.
pub fn resolve_sample(sample: &TopologySample, registry: &EndpointRegistry) {
    for endpoint in svi_endpoints(&sample.switch, &sample.interfaces) {
        registry.add(endpoint);
    }
    let ports = access_ports(&sample.switch, &sample.switchports);
    correlate_mac_table(&sample.switch, &sample.mac_table, &ports, registry);
}

#[derive(Debug, Default)]
struct RegistryInner {
    by_mac: std::collections::HashMap<MacAddress, Endpoint>,
    order: Vec<MacAddress>,
}

/// Process-wide map from MAC address to endpoint, owned by the run and
/// injected into each worker. Duplicate MACs overwrite: last writer wins.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    inner: Mutex<RegistryInner>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditional upsert keyed by MAC.
    pub fn add(&self, endpoint: Endpoint) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mac = endpoint.mac;
        if guard.by_mac.insert(mac, endpoint).is_none() {
            guard.order.push(mac);
        }
    }

    /// Exact lookup; a miss is a well-defined `None`.
    pub fn get(&self, mac: &MacAddress) -> Option<Endpoint> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .by_mac
            .get(mac)
            .cloned()
    }

    /// Snapshot of all endpoints in insertion order.
    pub fn list_all(&self) -> Vec<Endpoint> {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .order
            .iter()
            .filter_map(|mac| guard.by_mac.get(mac).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .by_mac
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac(value: &str) -> MacAddress {
        parse_mac(value).unwrap()
    }

    fn up_svi(name: &str, address: &str) -> InterfaceRecord {
        InterfaceRecord {
            interface: name.to_string(),
            link_status: "up".to_string(),
            protocol_status: "up".to_string(),
            hardware_type: "EtherSVI".to_string(),
            address: Some(address.to_string()),
        }
    }

    fn switchport(name: &str, mode: &str, admin_mode: &str) -> SwitchportRecord {
        SwitchportRecord {
            interface: name.to_string(),
            mode: mode.to_string(),
            admin_mode: admin_mode.to_string(),
        }
    }

    fn mac_entry(port: &str, vlan: &str, address: &str, entry_type: &str) -> MacTableRecord {
        MacTableRecord {
            vlan: vlan.to_string(),
            destination_address: address.to_string(),
            entry_type: entry_type.to_string(),
            destination_port: port.to_string(),
        }
    }

    #[test]
    fn test_endpoint_display() {
        let endpoint = Endpoint::new("SW1", "Gi0/2", "10", mac("1111.2222.3333"));
        assert_eq!(endpoint.to_string(), "11:11:22:22:33:33 on SW1.Gi0/2 vlan-10");
    }

    #[test]
    fn test_access_ports_excludes_down_and_trunk() {
        crate::setup_test_logging();
        let ports = access_ports(
            "SW1",
            &[
                switchport("Gi0/1", "trunk", "trunk"),
                switchport("Gi0/2", "static access", "static access"),
                switchport("Gi0/3", "down", "static access"),
                switchport("Gi0/4", "static access", "dynamic auto"),
            ],
        );
        assert_eq!(ports, HashSet::from(["Gi0/2".to_string()]));
    }

    #[test]
    fn test_svi_endpoints_skip_down_interfaces() {
        let mut down = up_svi("Vlan20", "aaaa.bbbb.dddd");
        down.link_status = "down".to_string();
        down.protocol_status = "down".to_string();

        let endpoints = svi_endpoints("SW1", &[up_svi("Vlan10", "aaaa.bbbb.cccc"), down]);
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].port, SVI_PORT);
        assert_eq!(endpoints[0].vlan, "Vlan10");
        assert!(endpoints[0].is_svi());
    }

    #[test]
    fn test_svi_endpoints_ignore_physical_interfaces() {
        let mut physical = up_svi("Gi0/1", "aaaa.bbbb.eeee");
        physical.hardware_type = "Gigabit Ethernet".to_string();
        assert!(svi_endpoints("SW1", &[physical]).is_empty());
    }

    #[test]
    fn test_correlate_skips_static_and_non_access_ports() {
        let registry = EndpointRegistry::new();
        let ports = HashSet::from(["Gi0/2".to_string()]);
        correlate_mac_table(
            "SW1",
            &[
                mac_entry("CPU", "All", "0100.0ccc.cccc", "STATIC"),
                mac_entry("Gi0/1", "10", "4444.5555.6666", "DYNAMIC"),
                mac_entry("Gi0/2", "10", "1111.2222.3333", "DYNAMIC"),
            ],
            &ports,
            &registry,
        );

        assert_eq!(registry.len(), 1);
        let endpoint = registry.get(&mac("1111.2222.3333")).unwrap();
        assert_eq!(endpoint.switch, "SW1");
        assert_eq!(endpoint.port, "Gi0/2");
        assert_eq!(endpoint.vlan, "10");
    }

    #[test]
    fn test_correlation_is_idempotent() {
        crate::setup_test_logging();
        let registry = EndpointRegistry::new();
        let sample = TopologySample {
            switch: "SW1".to_string(),
            interfaces: vec![up_svi("Vlan10", "aaaa.bbbb.cccc")],
            switchports: vec![switchport("Gi0/2", "static access", "static access")],
            mac_table: vec![mac_entry("Gi0/2", "10", "1111.2222.3333", "DYNAMIC")],
        };

        resolve_sample(&sample, &registry);
        let first = registry.list_all();
        resolve_sample(&sample, &registry);
        let second = registry.list_all();

        assert_eq!(first, second);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_registry_last_writer_wins() {
        let registry = EndpointRegistry::new();
        let key = mac("1111.2222.3333");
        registry.add(Endpoint::new("SW1", "Gi0/2", "10", key));
        registry.add(Endpoint::new("SW2", "Gi0/7", "20", key));

        let endpoint = registry.get(&key).unwrap();
        assert_eq!(endpoint.switch, "SW2");
        assert_eq!(endpoint.port, "Gi0/7");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.list_all().len(), 1);
    }

    #[test]
    fn test_registry_miss_is_none() {
        let registry = EndpointRegistry::new();
        assert!(registry.get(&mac("dead.beef.0000")).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_insertion_order() {
        let registry = EndpointRegistry::new();
        registry.add(Endpoint::new("SW1", "Gi0/1", "10", mac("0000.0000.0001")));
        registry.add(Endpoint::new("SW1", "Gi0/2", "10", mac("0000.0000.0002")));
        registry.add(Endpoint::new("SW1", "Gi0/3", "10", mac("0000.0000.0003")));

        let macs: Vec<String> = registry
            .list_all()
            .iter()
            .map(|e| e.port.clone())
            .collect();
        assert_eq!(macs, vec!["Gi0/1", "Gi0/2", "Gi0/3"]);
    }
}
