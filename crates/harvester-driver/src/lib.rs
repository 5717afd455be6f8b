pub mod cloudinit;
pub mod cluster;
pub mod config;
pub mod driver;
pub mod flags;
pub mod ssh;
pub mod store;
pub mod types;
pub mod vm;
pub mod wait;

#[cfg(test)]
mod fake;

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;

pub use cluster::ClusterApi;
pub use config::{ConfigError, MachineConfig, NetworkType};
pub use driver::HarvesterDriver;
pub use flags::CreateFlags;
pub use store::MachineStore;
pub use types::MachineState;

pub const DRIVER_NAME: &str = "harvester";

/// Port the docker daemon listens on inside provisioned machines.
pub const DOCKER_PORT: u16 = 2376;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("harvester api error: {0}")]
    Api(#[from] harvester_api::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("machine is not running (state: {0})")]
    NotRunning(MachineState),

    #[error("virtual machine instance {0} has no network interfaces")]
    NoInterfaces(String),

    #[error("virtual machine instance {0} has not reported an IP address")]
    NoIpAddress(String),

    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    #[error("cancelled while waiting for {0}")]
    Cancelled(String),

    #[error("image {0} has no download URL yet, it may still be importing")]
    ImageNotReady(String),

    #[error("ssh key error: {0}")]
    SshKey(String),

    #[error("machine {0} does not exist")]
    MachineNotFound(String),

    #[error("machine {0} already exists")]
    MachineExists(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this wraps a not-found answer from the cluster.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Api(e) if e.is_not_found())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Lifecycle contract a machine-management host drives.
///
/// One driver instance manages exactly one machine. Operations run one at
/// a time; only `create`, `start` and `restart` wait on the cluster.
#[async_trait]
pub trait MachineDriver: Send + Sync {
    /// Short name the host uses to select this driver.
    fn driver_name(&self) -> &'static str;

    /// Create and boot the machine, recording its IP address.
    async fn create(&mut self) -> Result<()>;

    async fn get_state(&self) -> Result<MachineState>;

    /// Start a stopped machine and wait until it is running.
    async fn start(&self) -> Result<()>;

    /// Request a graceful stop without waiting.
    async fn stop(&self) -> Result<()>;

    /// Restart and wait until a new instance replaced the old one.
    async fn restart(&self) -> Result<()>;

    /// Stop immediately, skipping the guest's graceful shutdown.
    async fn kill(&self) -> Result<()>;

    /// Delete the machine and its disks. Succeeds if it is already gone.
    async fn remove(&self) -> Result<()>;

    async fn get_ip(&self) -> Result<String>;

    async fn get_ssh_hostname(&self) -> Result<String> {
        self.get_ip().await
    }

    /// Docker daemon URL of the machine.
    async fn get_url(&self) -> Result<String> {
        let ip = self.get_ip().await?;
        Ok(format!("tcp://{}", join_host_port(&ip, DOCKER_PORT)))
    }

    async fn must_be_running(&self) -> Result<()> {
        match self.get_state().await? {
            MachineState::Running => Ok(()),
            other => Err(Error::NotRunning(other)),
        }
    }
}

fn join_host_port(host: &str, port: u16) -> String {
    match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port).to_string(),
        Err(_) => format!("{host}:{port}"),
    }
}
