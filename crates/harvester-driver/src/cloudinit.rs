//! Cloud-init user data and network data for new machines.
//!
//! The fragments are parsed by the guest's cloud-init agent, so their
//! indentation and key names must stay exactly as written.

use crate::config::MachineConfig;

const USER_DATA_HEADER: &str = "#cloud-config";

const USER_DATA_ADD_QEMU_GUEST_AGENT: &str = "
package_update: true
packages:
- qemu-guest-agent
runcmd:
- [systemctl, enable, --now, qemu-guest-agent]";

const NETWORK_DATA_DHCP: &str = "
    subnets:
    - type: dhcp";

fn user_data_password(user: &str, password: &str) -> String {
    format!(
        "
user: {user}
password: {password}
chpasswd: {{ expire: False }}
ssh_pwauth: True"
    )
}

fn user_data_ssh_key(public_key: &str) -> String {
    format!(
        "
ssh_authorized_keys:
- >-
  {public_key}"
    )
}

fn user_data_docker_group_ssh_key(user: &str, public_key: &str) -> String {
    format!(
        "
groups:
- docker
users:
- name: {user}
  sudo: ALL=(ALL) NOPASSWD:ALL
  groups: sudo, docker
  shell: /bin/bash
  ssh_authorized_keys:
  - >-
    {public_key}"
    )
}

fn network_data_physical(interface: &str) -> String {
    format!(
        "
network:
  version: 1
  config:
  - type: physical
    name: {interface}"
    )
}

fn network_data_static(address: &str, mask: &str, gateway: &str) -> String {
    format!(
        "
    subnets:
    - type: static
      address: {address}
      netmask: {mask}
      gateway: {gateway}"
    )
}

/// The user data / network data pair handed to the VM's no-cloud volume.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloudInit {
    pub user_data: String,
    pub network_data: String,
}

impl CloudInit {
    /// Render the generated documents for `config`.
    pub fn render(config: &MachineConfig) -> Self {
        let mut user_data = String::from(USER_DATA_HEADER);
        if !config.network_interface.is_empty() {
            // the platform reads the guest IP through the agent
            user_data.push_str(USER_DATA_ADD_QEMU_GUEST_AGENT);
        }
        if !config.ssh_password.is_empty() {
            user_data.push_str(&user_data_password(&config.ssh_user, &config.ssh_password));
        }
        if !config.ssh_public_key.is_empty() {
            if config.add_user_to_docker_group {
                user_data.push_str(&user_data_docker_group_ssh_key(
                    &config.ssh_user,
                    &config.ssh_public_key,
                ));
            } else {
                user_data.push_str(&user_data_ssh_key(&config.ssh_public_key));
            }
        }

        let mut network_data = String::new();
        if !config.network_interface.is_empty() {
            network_data.push_str(&network_data_physical(&config.network_interface));
            if !config.static_ip.is_empty()
                && !config.network_gateway.is_empty()
                && !config.network_mask.is_empty()
            {
                network_data.push_str(&network_data_static(
                    &config.static_ip,
                    &config.network_mask,
                    &config.network_gateway,
                ));
            } else {
                network_data.push_str(NETWORK_DATA_DHCP);
            }
        }

        Self {
            user_data,
            network_data,
        }
    }

    /// Merge operator supplied documents into the generated ones.
    ///
    /// Extra user data (cloud-config file contents, then the user-data flag)
    /// is appended without its own header line. Non-empty network data
    /// replaces the generated network data.
    pub fn with_overrides(mut self, extra_user_data: &[&str], network_data: &str) -> Self {
        for extra in extra_user_data {
            let body = strip_header(extra);
            if body.trim().is_empty() {
                continue;
            }
            self.user_data.push('\n');
            self.user_data.push_str(body.trim_end());
        }
        if !network_data.trim().is_empty() {
            self.network_data = network_data.to_string();
        }
        self
    }
}

fn strip_header(doc: &str) -> &str {
    let doc = doc.trim_start();
    match doc.strip_prefix(USER_DATA_HEADER) {
        Some(rest) => rest.trim_start_matches(['\r', '\n']),
        None => doc,
    }
}
