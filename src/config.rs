use std::{collections::HashMap, fs, net::IpAddr, path::Path};

use serde::{Deserialize, Serialize};

use crate::FleetProbeError;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Connection parameters for one device in the fleet inventory.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeviceConfig {
    /// Hostname or address used to reach the device.
    pub hostname: String,
    pub ip_address: Option<IpAddr>,
    pub ssh_port: Option<u16>,
    pub ssh_username: Option<String>,
    pub ssh_password: Option<String>,
    pub ssh_key_path: Option<String>,
    pub ssh_key_passphrase: Option<String>,
    pub notes: Option<String>,
}

impl DeviceConfig {
    pub fn ssh_port(&self) -> u16 {
        self.ssh_port.unwrap_or(DEFAULT_SSH_PORT)
    }
}

/// The fleet inventory file. Keys are the device names used in reports and
/// endpoint records.
#[derive(Debug, Serialize, Deserialize)]
pub struct FleetConfig {
    pub devices: HashMap<String, DeviceConfig>,
    pub ssh_timeout_seconds: u64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            devices: HashMap::new(),
            ssh_timeout_seconds: 30,
        }
    }
}

impl FleetConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, FleetProbeError> {
        let content = fs::read_to_string(path)?;
        let config: FleetConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), FleetProbeError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn get_device(&self, name: &str) -> Option<&DeviceConfig> {
        self.devices.get(name)
    }

    pub fn ssh_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ssh_timeout_seconds)
    }
}
