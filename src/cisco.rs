//! Parsers for the Cisco IOS command outputs the pipelines consume.
//!
//! Each command gets an explicit record schema; a missing expected field is a
//! [`FleetProbeError::Parse`], never a silent default.

use mac_address::MacAddress;
use regex::Regex;
use tracing::{debug, trace};

use crate::FleetProbeError;

/// One entry from `show interfaces`.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceRecord {
    pub interface: String,
    pub link_status: String,
    pub protocol_status: String,
    pub hardware_type: String,
    /// Burned-in address in Cisco dotted form, e.g. `aaaa.bbbb.cccc`.
    pub address: Option<String>,
}

/// One entry from `show interfaces switchport`.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchportRecord {
    pub interface: String,
    /// Operational mode, `down` when the port is not forwarding.
    pub mode: String,
    pub admin_mode: String,
}

/// One entry from `show mac address-table`.
#[derive(Debug, Clone, PartialEq)]
pub struct MacTableRecord {
    pub vlan: String,
    pub destination_address: String,
    pub entry_type: String,
    pub destination_port: String,
}

/// Platform and image identity from `show version`.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionInfo {
    pub platform: String,
    pub image_id: String,
    pub version: String,
}

/// One neighbor row from `show cdp neighbors`.
#[derive(Debug, Clone, PartialEq)]
pub struct CdpNeighbor {
    pub device_id: String,
    pub local_interface: String,
    pub port_id: String,
}

/// Clock state from `show ntp status`.
#[derive(Debug, Clone, PartialEq)]
pub struct NtpStatus {
    pub status: String,
    pub stratum: Option<u32>,
}

impl NtpStatus {
    pub fn is_synchronized(&self) -> bool {
        self.status == "synchronized"
    }
}

/// Normalise a Cisco dotted MAC (`aaaa.bbbb.cccc`) or a separator-delimited MAC
/// into a [`MacAddress`].
pub fn parse_mac(value: &str) -> Result<MacAddress, FleetProbeError> {
    let hex: String = value
        .chars()
        .filter(|c| !matches!(c, '.' | ':' | '-'))
        .collect();
    if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(FleetProbeError::Parse(format!(
            "Invalid MAC address: {value}"
        )));
    }
    let mut bytes = [0u8; 6];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|err| FleetProbeError::Parse(format!("Invalid MAC octet in {value}: {err}")))?;
    }
    Ok(MacAddress::new(bytes))
}

/// Parse `show interfaces` output.
///
/// Interface blocks start with lines like
/// `Vlan10 is up, line protocol is up`, followed by a
/// `Hardware is EtherSVI, address is aaaa.bbbb.cccc` detail line.
pub fn parse_interfaces(input_data: &str) -> Result<Vec<InterfaceRecord>, FleetProbeError> {
    let header = Regex::new(r"^(?P<name>\S+) is (?P<link>.+?), line protocol is (?P<proto>\S+)")?;
    let hardware =
        Regex::new(r"Hardware is (?P<hw>[^,]+?)(?:,\s+address is (?P<mac>[0-9a-fA-F.]+))?\s*(?:\(|$)")?;

    let lines: Vec<&str> = input_data.lines().map(|l| l.trim_end()).collect();
    let mut records = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i].trim_start();
        let captures = match header.captures(line) {
            Some(captures) => captures,
            None => {
                i += 1;
                continue;
            }
        };

        let interface = captures["name"].to_string();
        let link_status = captures["link"].to_string();
        let protocol_status = captures["proto"].to_string();

        let mut hardware_type = String::new();
        let mut address = None;

        // Detail lines for this interface run until the next header line.
        let mut j = i + 1;
        while j < lines.len() {
            let detail = lines[j].trim_start();
            if header.is_match(detail) {
                break;
            }
            if detail.starts_with("Hardware is") {
                if let Some(hw_caps) = hardware.captures(detail) {
                    hardware_type = hw_caps["hw"].trim().to_string();
                    address = hw_caps.name("mac").map(|m| m.as_str().to_string());
                }
            }
            j += 1;
        }

        trace!("Parsed interface {interface}: {link_status}/{protocol_status} ({hardware_type})");
        records.push(InterfaceRecord {
            interface,
            link_status,
            protocol_status,
            hardware_type,
            address,
        });
        i = j;
    }

    Ok(records)
}

/// Parse `show interfaces switchport` output.
///
/// Entries are `Name:` blocks carrying `Administrative Mode:` and
/// `Operational Mode:` lines.
pub fn parse_switchports(input_data: &str) -> Result<Vec<SwitchportRecord>, FleetProbeError> {
    let mut records = Vec::new();
    let mut current: Option<SwitchportRecord> = None;

    for line in input_data.lines() {
        let line = line.trim();
        if let Some(name) = line.strip_prefix("Name:") {
            if let Some(record) = current.take() {
                records.push(record);
            }
            current = Some(SwitchportRecord {
                interface: name.trim().to_string(),
                mode: String::new(),
                admin_mode: String::new(),
            });
        } else if let Some(mode) = line.strip_prefix("Operational Mode:") {
            if let Some(record) = current.as_mut() {
                record.mode = mode.trim().to_string();
            }
        } else if let Some(admin) = line.strip_prefix("Administrative Mode:") {
            if let Some(record) = current.as_mut() {
                record.admin_mode = admin.trim().to_string();
            }
        }
    }
    if let Some(record) = current.take() {
        records.push(record);
    }

    for record in &records {
        if record.mode.is_empty() || record.admin_mode.is_empty() {
            return Err(FleetProbeError::Parse(format!(
                "Switchport block for {} is missing a mode field",
                record.interface
            )));
        }
    }

    Ok(records)
}

/// Parse `show mac address-table` output, one row per learned address.
pub fn parse_mac_table(input_data: &str) -> Result<Vec<MacTableRecord>, FleetProbeError> {
    let row = Regex::new(
        r"^\s*(?P<vlan>\S+)\s+(?P<mac>[0-9a-fA-F]{4}\.[0-9a-fA-F]{4}\.[0-9a-fA-F]{4})\s+(?P<type>\S+)\s+(?P<port>\S+)\s*$",
    )?;

    let mut records = Vec::new();
    for line in input_data.lines() {
        if let Some(captures) = row.captures(line) {
            records.push(MacTableRecord {
                vlan: captures["vlan"].to_string(),
                destination_address: captures["mac"].to_string(),
                entry_type: captures["type"].to_string(),
                destination_port: captures["port"].to_string(),
            });
        }
    }

    Ok(records)
}

/// Parse `show version` output for platform, image id and version string.
pub fn parse_version(input_data: &str) -> Result<VersionInfo, FleetProbeError> {
    let image_line = Regex::new(r"\((?P<image>[A-Za-z0-9_-]+)\),\s+Version\s+(?P<version>[^,\s]+)")?;
    let platform_line = Regex::new(r"(?i)^cisco\s+(?P<platform>\S+)\s+\(")?;

    let mut image_id = None;
    let mut version = None;
    let mut platform = None;

    for line in input_data.lines() {
        let line = line.trim();
        if image_id.is_none() {
            if let Some(captures) = image_line.captures(line) {
                image_id = Some(captures["image"].to_string());
                version = Some(captures["version"].trim_end_matches(',').to_string());
                continue;
            }
        }
        if platform.is_none() {
            if let Some(captures) = platform_line.captures(line) {
                platform = Some(captures["platform"].to_string());
            }
        }
    }

    match (platform, image_id, version) {
        (Some(platform), Some(image_id), Some(version)) => Ok(VersionInfo {
            platform,
            image_id,
            version,
        }),
        (platform, image_id, _) => Err(FleetProbeError::Parse(format!(
            "show version output missing fields (platform found: {}, image found: {})",
            platform.is_some(),
            image_id.is_some()
        ))),
    }
}

/// Parse `show cdp neighbors` output into neighbor rows.
///
/// Returns an error when CDP is disabled on the device, so the caller can
/// record the check as failed.
pub fn parse_cdp_neighbors(input_data: &str) -> Result<Vec<CdpNeighbor>, FleetProbeError> {
    if input_data.contains("CDP is not enabled") {
        return Err(FleetProbeError::Parse("CDP is not enabled".to_string()));
    }

    let lines: Vec<&str> = input_data.lines().collect();
    let header_index = lines
        .iter()
        .position(|line| line.trim_start().starts_with("Device ID"))
        .ok_or_else(|| {
            FleetProbeError::Parse("show cdp neighbors output has no Device ID header".to_string())
        })?;

    let mut neighbors = Vec::new();
    let mut pending_device: Option<String> = None;

    for line in &lines[header_index + 1..] {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("Total cdp entries") {
            continue;
        }
        let parts: Vec<&str> = trimmed.split_whitespace().collect();

        // Long device names wrap onto their own line, with the rest of the
        // row following on the next one.
        if parts.len() == 1 {
            pending_device = Some(parts[0].to_string());
            continue;
        }

        let (device_id, fields) = match pending_device.take() {
            Some(device_id) => (device_id, parts.as_slice()),
            None => (parts[0].to_string(), &parts[1..]),
        };

        if fields.len() < 2 {
            debug!("Skipping short CDP row: {trimmed}");
            continue;
        }

        // Local interface is usually two tokens ("Gig 0/1"), port id is the
        // trailing pair. Join defensively since platform strings vary.
        let local_interface = fields[..2.min(fields.len())].join(" ");
        let port_id = fields[fields.len().saturating_sub(2)..].join(" ");

        neighbors.push(CdpNeighbor {
            device_id,
            local_interface,
            port_id,
        });
    }

    Ok(neighbors)
}

/// Parse `show ntp status` output.
pub fn parse_ntp_status(input_data: &str) -> Result<NtpStatus, FleetProbeError> {
    let clock = Regex::new(r"(?m)^Clock is (?P<status>\w+)")?;
    let stratum = Regex::new(r"stratum (?P<stratum>\d+)")?;

    let captures = clock.captures(input_data).ok_or_else(|| {
        FleetProbeError::Parse("show ntp status output has no clock state line".to_string())
    })?;

    Ok(NtpStatus {
        status: captures["status"].to_string(),
        stratum: stratum
            .captures(input_data)
            .and_then(|c| c["stratum"].parse().ok()),
    })
}
