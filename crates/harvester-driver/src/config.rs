use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::flags::CreateFlags;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid machine name {0:?}, expected letters, digits, '.' or '-' starting with a letter or digit")]
    InvalidMachineName(String),

    #[error("{0} is required")]
    Missing(&'static str),

    #[error("--harvester-ssh-private-key-path is required when --harvester-key-pair-name is set")]
    KeyPairWithoutPrivateKey,

    #[error("unknown network type {0:?}, expected pod, dhcp or static")]
    UnknownNetworkType(String),

    #[error("static network requires --harvester-network-mask and --harvester-network-gateway")]
    StaticNetworkIncomplete,

    #[error("{0} network requires --harvester-network-name and --harvester-network-interface")]
    NetworkIncomplete(NetworkType),

    #[error("invalid disk info: {0}")]
    InvalidDiskInfo(String),

    #[error("invalid network info: {0}")]
    InvalidNetworkInfo(String),

    #[error("invalid vm affinity: {0}")]
    InvalidAffinity(String),
}

/// How the VM is attached to the network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Cluster pod network, masqueraded.
    #[default]
    Pod,
    /// Bridged onto a Harvester VLAN network, address from DHCP.
    Dhcp,
    /// Bridged onto a Harvester VLAN network, address set by cloud-init.
    Static,
}

impl NetworkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pod => "pod",
            Self::Dhcp => "dhcp",
            Self::Static => "static",
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s {
            "" | "pod" => Ok(Self::Pod),
            "dhcp" => Ok(Self::Dhcp),
            "static" => Ok(Self::Static),
            other => Err(ConfigError::UnknownNetworkType(other.to_string())),
        }
    }
}

/// Extra disks passed as `--harvester-disk-info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskInfo {
    pub disks: Vec<DiskSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskSpec {
    /// Image the disk is cloned from; empty for a blank disk.
    #[serde(default)]
    pub image_name: String,
    /// Size in GiB.
    pub size: u32,
    #[serde(default)]
    pub bus: String,
    #[serde(default)]
    pub storage_class_name: String,
    #[serde(default)]
    pub boot_order: u32,
}

/// Extra interfaces passed as `--harvester-network-info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub interfaces: Vec<InterfaceSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceSpec {
    pub network_name: String,
    #[serde(default)]
    pub mac_address: String,
}

/// Everything the driver knows about one machine.
///
/// Built once from the create flags and persisted by the machine store.
/// Only the lifecycle driver fills in the `resolved` fields afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineConfig {
    pub machine_name: String,

    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub insecure_skip_verify: bool,
    pub namespace: String,

    pub cpu: u32,
    pub memory_size: String,
    pub disk_size: String,
    pub disk_bus: String,
    pub image_name: String,
    #[serde(default)]
    pub disk_info: Option<DiskInfo>,

    pub ssh_user: String,
    pub ssh_port: u16,
    #[serde(default)]
    pub ssh_password: String,
    #[serde(default)]
    pub key_pair_name: String,
    #[serde(default)]
    pub ssh_private_key_path: String,
    #[serde(default)]
    pub add_user_to_docker_group: bool,

    pub network_type: NetworkType,
    #[serde(default)]
    pub network_name: String,
    #[serde(default)]
    pub network_interface: String,
    pub network_model: String,
    #[serde(default)]
    pub static_ip: String,
    #[serde(default)]
    pub network_mask: String,
    #[serde(default)]
    pub network_gateway: String,
    #[serde(default)]
    pub network_info: Option<NetworkInfo>,

    #[serde(default)]
    pub cloud_config: String,
    #[serde(default)]
    pub user_data: String,
    #[serde(default)]
    pub network_data: String,
    #[serde(default)]
    pub vm_affinity: Option<serde_json::Value>,

    pub wait_timeout_secs: u64,
    pub wait_interval_secs: u64,

    // resolved
    #[serde(default)]
    pub ssh_public_key: String,
    #[serde(default)]
    pub ssh_key_path: String,
    #[serde(default)]
    pub image_download_url: String,
    #[serde(default)]
    pub ip_address: Option<String>,
}

impl MachineConfig {
    /// Copy the create flags into a config record and validate it.
    pub fn from_flags(machine_name: impl Into<String>, flags: CreateFlags) -> Result<Self, ConfigError> {
        let disk_info = if flags.disk_info.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str::<DiskInfo>(&flags.disk_info)
                    .map_err(|e| ConfigError::InvalidDiskInfo(e.to_string()))?,
            )
        };

        let network_info = if flags.network_info.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str::<NetworkInfo>(&flags.network_info)
                    .map_err(|e| ConfigError::InvalidNetworkInfo(e.to_string()))?,
            )
        };

        let vm_affinity = parse_affinity(&string_support_base64(&flags.vm_affinity))?;

        let config = Self {
            machine_name: machine_name.into(),
            host: flags.host,
            port: flags.port,
            username: flags.username,
            password: flags.password,
            insecure_skip_verify: flags.insecure_skip_verify,
            namespace: flags.namespace,
            cpu: flags.cpu_count,
            memory_size: format!("{}Gi", flags.memory_size),
            disk_size: format!("{}Gi", flags.disk_size),
            disk_bus: flags.disk_bus,
            image_name: flags.image_name,
            disk_info,
            ssh_user: flags.ssh_user,
            ssh_port: flags.ssh_port,
            ssh_password: flags.ssh_password,
            key_pair_name: flags.key_pair_name,
            ssh_private_key_path: flags.ssh_private_key_path,
            add_user_to_docker_group: flags.add_user_to_docker_group,
            network_type: flags.network_type.parse()?,
            network_name: flags.network_name,
            network_interface: flags.network_interface,
            network_model: flags.network_model,
            static_ip: flags.network_ip,
            network_mask: flags.network_mask,
            network_gateway: flags.network_gateway,
            network_info,
            cloud_config: flags.cloud_config,
            user_data: string_support_base64(&flags.user_data),
            network_data: string_support_base64(&flags.network_data),
            vm_affinity,
            wait_timeout_secs: flags.wait_timeout,
            wait_interval_secs: flags.wait_interval,
            ..Default::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_machine_name(&self.machine_name)?;
        if self.host.is_empty() {
            return Err(ConfigError::Missing("--harvester-host"));
        }
        if self.username.is_empty() {
            return Err(ConfigError::Missing("--harvester-username"));
        }
        if self.password.is_empty() {
            return Err(ConfigError::Missing("--harvester-password"));
        }
        if self.image_name.is_empty() {
            return Err(ConfigError::Missing("--harvester-image-name"));
        }
        if !self.key_pair_name.is_empty() && self.ssh_private_key_path.is_empty() {
            return Err(ConfigError::KeyPairWithoutPrivateKey);
        }

        match self.network_type {
            NetworkType::Pod => {}
            NetworkType::Static if self.network_mask.is_empty() || self.network_gateway.is_empty() => {
                return Err(ConfigError::StaticNetworkIncomplete);
            }
            NetworkType::Dhcp | NetworkType::Static => {
                if self.network_name.is_empty() || self.network_interface.is_empty() {
                    return Err(ConfigError::NetworkIncomplete(self.network_type));
                }
            }
        }

        Ok(())
    }

    /// Base URL of the Harvester API.
    pub fn endpoint(&self) -> String {
        format!("https://{}:{}", self.host, self.port)
    }
}

/// Machine names are used as the VM name and as a directory in the machine
/// store, so only `[A-Za-z0-9][A-Za-z0-9.-]*` is accepted.
pub fn validate_machine_name(name: &str) -> Result<(), ConfigError> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidMachineName(name.to_string()))
    }
}

/// Decode `value` as standard base64 if it is valid base64 of UTF-8 text,
/// otherwise return it unchanged.
pub fn string_support_base64(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    STANDARD
        .decode(value)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| value.to_string())
}

fn parse_affinity(raw: &str) -> Result<Option<serde_json::Value>, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| ConfigError::InvalidAffinity(e.to_string()))?;
    if !value.is_object() {
        return Err(ConfigError::InvalidAffinity("expected a JSON object".into()));
    }
    Ok(Some(value))
}

/// Split `namespace/name`, falling back to `default_namespace`.
pub(crate) fn split_namespaced<'a>(value: &'a str, default_namespace: &'a str) -> (&'a str, &'a str) {
    match value.split_once('/') {
        Some((ns, name)) if !ns.is_empty() => (ns, name),
        Some((_, name)) => (default_namespace, name),
        None => (default_namespace, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::parse_without_env;

    const REQUIRED: [&str; 8] = [
        "--harvester-host",
        "10.0.0.10",
        "--harvester-username",
        "admin",
        "--harvester-password",
        "secret",
        "--harvester-image-name",
        "default/ubuntu",
    ];

    fn flags(extra: &[&str]) -> CreateFlags {
        let args = std::iter::once("test")
            .chain(REQUIRED)
            .chain(extra.iter().copied());
        parse_without_env(args).unwrap()
    }

    fn static_flags(mask: &str, gateway: &str) -> CreateFlags {
        flags(&[
            "--harvester-network-type",
            "static",
            "--harvester-network-name",
            "default/vlan1",
            "--harvester-network-interface",
            "eth0",
            "--harvester-network-mask",
            mask,
            "--harvester-network-gateway",
            gateway,
        ])
    }

    #[test]
    fn test_from_flags_copies_values() {
        let config = MachineConfig::from_flags("m1", flags(&["--harvester-memory-size", "8"])).unwrap();
        assert_eq!(config.machine_name, "m1");
        assert_eq!(config.memory_size, "8Gi");
        assert_eq!(config.disk_size, "40Gi");
        assert_eq!(config.cpu, 2);
        assert_eq!(config.network_type, NetworkType::Pod);
        assert_eq!(config.endpoint(), "https://10.0.0.10:443");
        assert!(config.ip_address.is_none());
    }

    #[test]
    fn test_required_fields() {
        for (idx, flag) in ["--harvester-host", "--harvester-username", "--harvester-password", "--harvester-image-name"]
            .iter()
            .enumerate()
        {
            let mut args: Vec<&str> = vec!["test"];
            for (i, pair) in REQUIRED.chunks(2).enumerate() {
                if i != idx {
                    args.extend_from_slice(pair);
                }
            }
            let flags = parse_without_env(args).unwrap();
            assert_eq!(
                MachineConfig::from_flags("m1", flags).unwrap_err(),
                ConfigError::Missing(*flag)
            );
        }
    }

    #[test]
    fn test_machine_name() {
        for ok in ["m1", "Node-1", "rancher.pool1-abc12", "7"] {
            assert!(validate_machine_name(ok).is_ok(), "{ok}");
        }
        for bad in ["", "..", "../x", "a/b", "-m1", ".hidden", "m 1", "m_1", "m1\\x"] {
            assert_eq!(
                validate_machine_name(bad).unwrap_err(),
                ConfigError::InvalidMachineName(bad.to_string())
            );
        }
    }

    #[test]
    fn test_from_flags_rejects_path_like_name() {
        assert_eq!(
            MachineConfig::from_flags("../x", flags(&[])).unwrap_err(),
            ConfigError::InvalidMachineName("../x".into())
        );
    }

    #[test]
    fn test_static_requires_mask_and_gateway() {
        assert!(MachineConfig::from_flags("m1", static_flags("255.255.255.0", "10.0.0.1")).is_ok());
        assert_eq!(
            MachineConfig::from_flags("m1", static_flags("", "10.0.0.1")).unwrap_err(),
            ConfigError::StaticNetworkIncomplete
        );
        assert_eq!(
            MachineConfig::from_flags("m1", static_flags("255.255.255.0", "")).unwrap_err(),
            ConfigError::StaticNetworkIncomplete
        );
        assert_eq!(
            MachineConfig::from_flags("m1", static_flags("", "")).unwrap_err(),
            ConfigError::StaticNetworkIncomplete
        );
    }

    #[test]
    fn test_dhcp_requires_name_and_interface() {
        let err = MachineConfig::from_flags(
            "m1",
            flags(&["--harvester-network-type", "dhcp", "--harvester-network-name", "default/vlan1"]),
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::NetworkIncomplete(NetworkType::Dhcp));

        let ok = MachineConfig::from_flags(
            "m1",
            flags(&[
                "--harvester-network-type",
                "dhcp",
                "--harvester-network-name",
                "default/vlan1",
                "--harvester-network-interface",
                "eth0",
            ]),
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_unknown_network_type() {
        let err = MachineConfig::from_flags("m1", flags(&["--harvester-network-type", "bridge"])).unwrap_err();
        assert_eq!(err, ConfigError::UnknownNetworkType("bridge".into()));
    }

    #[test]
    fn test_key_pair_requires_private_key_path() {
        let err =
            MachineConfig::from_flags("m1", flags(&["--harvester-key-pair-name", "my-key"])).unwrap_err();
        assert_eq!(err, ConfigError::KeyPairWithoutPrivateKey);

        let ok = MachineConfig::from_flags(
            "m1",
            flags(&[
                "--harvester-key-pair-name",
                "my-key",
                "--harvester-ssh-private-key-path",
                "/home/me/.ssh/id_rsa",
            ]),
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_string_support_base64() {
        assert_eq!(string_support_base64(""), "");
        assert_eq!(string_support_base64("aGVsbG8="), "hello");
        assert_eq!(string_support_base64("not base64!"), "not base64!");
        assert_eq!(string_support_base64("#cloud-config"), "#cloud-config");
        // valid base64 that is not UTF-8 is kept as is
        assert_eq!(string_support_base64("/w=="), "/w==");
    }

    #[test]
    fn test_user_data_base64_or_plain() {
        let encoded = STANDARD.encode("#cloud-config\nruncmd: []");
        let config = MachineConfig::from_flags(
            "m1",
            flags(&["--harvester-user-data", &encoded, "--harvester-network-data", "raw: data"]),
        )
        .unwrap();
        assert_eq!(config.user_data, "#cloud-config\nruncmd: []");
        assert_eq!(config.network_data, "raw: data");
    }

    #[test]
    fn test_affinity_plain_and_base64() {
        let json = r#"{"nodeAffinity":{}}"#;
        let plain = MachineConfig::from_flags("m1", flags(&["--harvester-vm-affinity", json])).unwrap();
        assert_eq!(plain.vm_affinity, Some(serde_json::json!({ "nodeAffinity": {} })));

        let encoded = STANDARD.encode(json);
        let decoded = MachineConfig::from_flags("m1", flags(&["--harvester-vm-affinity", &encoded])).unwrap();
        assert_eq!(decoded.vm_affinity, plain.vm_affinity);

        let err = MachineConfig::from_flags("m1", flags(&["--harvester-vm-affinity", "[1]"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAffinity(_)));
    }

    #[test]
    fn test_disk_and_network_info() {
        let config = MachineConfig::from_flags(
            "m1",
            flags(&[
                "--harvester-disk-info",
                r#"{"disks":[{"imageName":"default/ubuntu","size":40,"bootOrder":1},{"size":10}]}"#,
                "--harvester-network-info",
                r#"{"interfaces":[{"networkName":"default/vlan1"}]}"#,
            ]),
        )
        .unwrap();
        let disks = config.disk_info.unwrap().disks;
        assert_eq!(disks.len(), 2);
        assert_eq!(disks[0].boot_order, 1);
        assert!(disks[1].image_name.is_empty());
        assert_eq!(config.network_info.unwrap().interfaces[0].network_name, "default/vlan1");

        let err = MachineConfig::from_flags("m1", flags(&["--harvester-disk-info", "{disks"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDiskInfo(_)));
        let err = MachineConfig::from_flags("m1", flags(&["--harvester-network-info", "[]"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNetworkInfo(_)));
    }

    #[test]
    fn test_split_namespaced() {
        assert_eq!(split_namespaced("img", "default"), ("default", "img"));
        assert_eq!(split_namespaced("prod/img", "default"), ("prod", "img"));
        assert_eq!(split_namespaced("/img", "default"), ("default", "img"));
    }
}
