use clap::Args;

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_CPU: u32 = 2;
pub const DEFAULT_MEMORY_SIZE: u32 = 4;
pub const DEFAULT_DISK_SIZE: u32 = 40;
pub const DEFAULT_DISK_BUS: &str = "virtio";
pub const DEFAULT_NETWORK_MODEL: &str = "virtio";
pub const DEFAULT_SSH_USER: &str = "root";
pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_WAIT_INTERVAL_SECS: u64 = 5;

/// Options recognised when creating a machine.
///
/// Every flag can also be supplied through its `HARVESTER_*` environment
/// variable. Required values default to empty so that validation, not the
/// argument parser, reports what is missing.
#[derive(Debug, Clone, Args)]
pub struct CreateFlags {
    /// Harvester API host
    #[arg(long = "harvester-host", env = "HARVESTER_HOST", default_value = "")]
    pub host: String,

    /// Harvester API port
    #[arg(long = "harvester-port", env = "HARVESTER_PORT", default_value_t = 443)]
    pub port: u16,

    /// Harvester username
    #[arg(long = "harvester-username", env = "HARVESTER_USERNAME", default_value = "")]
    pub username: String,

    /// Harvester password
    #[arg(long = "harvester-password", env = "HARVESTER_PASSWORD", default_value = "")]
    pub password: String,

    /// Accept self-signed Harvester certificates
    #[arg(long = "harvester-insecure-skip-verify", env = "HARVESTER_INSECURE_SKIP_VERIFY")]
    pub insecure_skip_verify: bool,

    /// Harvester namespace the VM is created in
    #[arg(long = "harvester-vm-namespace", env = "HARVESTER_VM_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Number of CPUs for the machine
    #[arg(long = "harvester-cpu-count", env = "HARVESTER_CPU_COUNT", default_value_t = DEFAULT_CPU)]
    pub cpu_count: u32,

    /// Size of memory for the machine (in GiB)
    #[arg(long = "harvester-memory-size", env = "HARVESTER_MEMORY_SIZE", default_value_t = DEFAULT_MEMORY_SIZE)]
    pub memory_size: u32,

    /// Size of the root disk for the machine (in GiB)
    #[arg(long = "harvester-disk-size", env = "HARVESTER_DISK_SIZE", default_value_t = DEFAULT_DISK_SIZE)]
    pub disk_size: u32,

    /// Bus of the root disk
    #[arg(long = "harvester-disk-bus", env = "HARVESTER_DISK_BUS", default_value = DEFAULT_DISK_BUS)]
    pub disk_bus: String,

    /// Harvester image name, `name` or `namespace/name`
    #[arg(long = "harvester-image-name", env = "HARVESTER_IMAGE_NAME", default_value = "")]
    pub image_name: String,

    /// JSON list of disks, replaces the single root disk
    #[arg(long = "harvester-disk-info", env = "HARVESTER_DISK_INFO", default_value = "")]
    pub disk_info: String,

    /// SSH username
    #[arg(long = "harvester-ssh-user", env = "HARVESTER_SSH_USER", default_value = DEFAULT_SSH_USER)]
    pub ssh_user: String,

    /// SSH port
    #[arg(long = "harvester-ssh-port", env = "HARVESTER_SSH_PORT", default_value_t = DEFAULT_SSH_PORT)]
    pub ssh_port: u16,

    /// SSH password
    #[arg(long = "harvester-ssh-password", env = "HARVESTER_SSH_PASSWORD", default_value = "")]
    pub ssh_password: String,

    /// Harvester key pair name
    #[arg(long = "harvester-key-pair-name", env = "HARVESTER_KEY_PAIR_NAME", default_value = "")]
    pub key_pair_name: String,

    /// Local path of the private key matching the key pair
    #[arg(long = "harvester-ssh-private-key-path", env = "HARVESTER_SSH_PRIVATE_KEY_PATH", default_value = "")]
    pub ssh_private_key_path: String,

    /// Create the SSH user with sudo and docker group membership
    #[arg(long = "harvester-add-user-to-docker-group", env = "HARVESTER_ADD_USER_TO_DOCKER_GROUP")]
    pub add_user_to_docker_group: bool,

    /// Network type: pod, dhcp or static
    #[arg(long = "harvester-network-type", env = "HARVESTER_NETWORK_TYPE", default_value = "pod")]
    pub network_type: String,

    /// Harvester network name, `name` or `namespace/name`
    #[arg(long = "harvester-network-name", env = "HARVESTER_NETWORK_NAME", default_value = "")]
    pub network_name: String,

    /// Guest interface configured by cloud-init, e.g. `eth0`
    #[arg(long = "harvester-network-interface", env = "HARVESTER_NETWORK_INTERFACE", default_value = "")]
    pub network_interface: String,

    /// Network interface model
    #[arg(long = "harvester-network-model", env = "HARVESTER_NETWORK_MODEL", default_value = DEFAULT_NETWORK_MODEL)]
    pub network_model: String,

    /// Static IP address
    #[arg(long = "harvester-network-ip", env = "HARVESTER_NETWORK_IP", default_value = "")]
    pub network_ip: String,

    /// Static network mask
    #[arg(long = "harvester-network-mask", env = "HARVESTER_NETWORK_MASK", default_value = "")]
    pub network_mask: String,

    /// Static network gateway
    #[arg(long = "harvester-network-gateway", env = "HARVESTER_NETWORK_GATEWAY", default_value = "")]
    pub network_gateway: String,

    /// JSON list of interfaces, replaces the single network
    #[arg(long = "harvester-network-info", env = "HARVESTER_NETWORK_INFO", default_value = "")]
    pub network_info: String,

    /// Path of an extra cloud-config file merged into the user data
    #[arg(long = "harvester-cloud-config", env = "HARVESTER_CLOUD_CONFIG", default_value = "")]
    pub cloud_config: String,

    /// Extra cloud-init user data, base64 is supported
    #[arg(long = "harvester-user-data", env = "HARVESTER_USER_DATA", default_value = "")]
    pub user_data: String,

    /// Cloud-init network data overriding the generated one, base64 is supported
    #[arg(long = "harvester-network-data", env = "HARVESTER_NETWORK_DATA", default_value = "")]
    pub network_data: String,

    /// VM affinity rules as JSON, base64 is supported
    #[arg(long = "harvester-vm-affinity", env = "HARVESTER_VM_AFFINITY", default_value = "")]
    pub vm_affinity: String,

    /// Seconds to wait for the VM to come up, 0 waits forever
    #[arg(long = "harvester-wait-timeout", env = "HARVESTER_WAIT_TIMEOUT", default_value_t = DEFAULT_WAIT_TIMEOUT_SECS)]
    pub wait_timeout: u64,

    /// Seconds between state checks while waiting
    #[arg(long = "harvester-wait-interval", env = "HARVESTER_WAIT_INTERVAL", default_value_t = DEFAULT_WAIT_INTERVAL_SECS)]
    pub wait_interval: u64,
}

/// Parse create flags from `args` alone, ignoring any `HARVESTER_*`
/// variables set in the environment running the tests.
#[cfg(test)]
pub(crate) fn parse_without_env<I, T>(args: I) -> Result<CreateFlags, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    use clap::{Command, FromArgMatches};

    let command = CreateFlags::augment_args(Command::new("test")).mut_args(|arg| arg.env(None::<&str>));
    let matches = command.try_get_matches_from(args)?;
    CreateFlags::from_arg_matches(&matches)
}
