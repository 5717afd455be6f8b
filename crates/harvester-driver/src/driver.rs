use std::path::Path;

use async_trait::async_trait;
use harvester_api::VirtualMachineInstance;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cloudinit::CloudInit;
use crate::cluster::ClusterApi;
use crate::config::{MachineConfig, split_namespaced};
use crate::store::MachineStore;
use crate::types::MachineState;
use crate::vm::{self, ImageSource, ImageSources};
use crate::wait::{WaitConfig, poll_until};
use crate::{DRIVER_NAME, Error, MachineDriver, Result, ssh};

/// Drives one Harvester virtual machine through its lifecycle.
pub struct HarvesterDriver<C> {
    config: MachineConfig,
    client: C,
    store: MachineStore,
    cancel: CancellationToken,
    wait: WaitConfig,
}

impl<C: ClusterApi> HarvesterDriver<C> {
    pub fn new(config: MachineConfig, client: C, store: MachineStore) -> Self {
        Self::with_cancellation(config, client, store, CancellationToken::new())
    }

    /// Waits give up with [`Error::Cancelled`] once `cancel` fires.
    pub fn with_cancellation(
        config: MachineConfig,
        client: C,
        store: MachineStore,
        cancel: CancellationToken,
    ) -> Self {
        let wait = WaitConfig::from_secs(config.wait_interval_secs, config.wait_timeout_secs);
        Self {
            config,
            client,
            store,
            cancel,
            wait,
        }
    }

    /// Override the polling cadence taken from the config.
    pub fn with_wait(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn wait_config(&self) -> &WaitConfig {
        &self.wait
    }

    fn name(&self) -> &str {
        &self.config.machine_name
    }

    fn namespace(&self) -> &str {
        &self.config.namespace
    }

    async fn get_vmi(&self) -> Result<VirtualMachineInstance> {
        Ok(self.client.get_vmi(self.namespace(), self.name()).await?)
    }

    // ── create helpers ──────────────────────────────────────────────────

    /// Fill in `ssh_public_key` and `ssh_key_path`.
    ///
    /// A named key pair supplies the public key and the operator's private
    /// key is copied into the machine directory. Without a key pair or a
    /// password a fresh key is generated there.
    async fn resolve_ssh_key(&mut self) -> Result<()> {
        let key_path = self.store.ssh_key_path(self.name())?;

        if !self.config.key_pair_name.is_empty() {
            let (ns, name) = split_namespaced(&self.config.key_pair_name, &self.config.namespace);
            let (ns, name) = (ns.to_string(), name.to_string());
            let keypair = self.client.get_keypair(&ns, &name).await?;
            debug!(machine = %self.name(), keypair = %format!("{ns}/{name}"), "using key pair");

            self.store.create_dir(self.name()).await?;
            ssh::copy_private_key(Path::new(&self.config.ssh_private_key_path), &key_path).await?;
            self.config.ssh_public_key = keypair.spec.public_key.trim().to_string();
            self.config.ssh_key_path = key_path.display().to_string();
        } else if self.config.ssh_password.is_empty() {
            self.store.create_dir(self.name()).await?;
            self.config.ssh_public_key = ssh::generate_key(&key_path, self.name()).await?;
            self.config.ssh_key_path = key_path.display().to_string();
        }

        Ok(())
    }

    /// Look up every image the planned disks clone from.
    async fn resolve_images(&self) -> Result<ImageSources> {
        let mut images = ImageSources::new();
        for disk in self.config.planned_disks() {
            if disk.image_id.is_empty() || images.contains_key(&disk.image_id) {
                continue;
            }
            let (ns, name) = split_namespaced(&disk.image_id, self.namespace());
            let image = self.client.get_image(ns, name).await?;
            let download_url = match image.status.download_url {
                Some(url) if !url.is_empty() => url,
                _ => return Err(Error::ImageNotReady(disk.image_id.clone())),
            };
            debug!(machine = %self.name(), image = %disk.image_id, "resolved image");
            images.insert(
                disk.image_id.clone(),
                ImageSource {
                    download_url,
                    storage_class_name: image.status.storage_class_name,
                },
            );
        }
        Ok(images)
    }

    async fn cloud_init(&self) -> Result<CloudInit> {
        let cloud_config = if self.config.cloud_config.is_empty() {
            String::new()
        } else {
            tokio::fs::read_to_string(&self.config.cloud_config).await?
        };

        Ok(CloudInit::render(&self.config).with_overrides(
            &[cloud_config.as_str(), self.config.user_data.as_str()],
            &self.config.network_data,
        ))
    }

    // ── waits ───────────────────────────────────────────────────────────

    async fn wait_for_running(&self) -> Result<()> {
        poll_until(&self.wait, &self.cancel, "instance to be running", || async move {
            match self.get_vmi().await {
                Ok(vmi) if MachineState::from_phase(vmi.phase()) == MachineState::Running => Ok(Some(())),
                Ok(_) => Ok(None),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
    }

    async fn wait_for_new_instance(&self, old_uid: &str) -> Result<()> {
        poll_until(&self.wait, &self.cancel, "instance to be replaced", || async move {
            match self.get_vmi().await {
                Ok(vmi) if vmi.uid() != old_uid => Ok(Some(())),
                Ok(_) => Ok(None),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
    }

    async fn wait_for_ip(&self) -> Result<String> {
        poll_until(&self.wait, &self.cancel, "instance IP address", || async move {
            match self.get_vmi().await {
                Ok(vmi) => Ok(first_ip(&vmi).ok()),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
    }
}

/// The address of the instance's first interface.
fn first_ip(vmi: &VirtualMachineInstance) -> Result<String> {
    let name = &vmi.metadata.name;
    let iface = vmi
        .status
        .interfaces
        .first()
        .ok_or_else(|| Error::NoInterfaces(name.clone()))?;
    match iface.ip_address.as_deref() {
        Some(ip) if !ip.is_empty() => Ok(ip.to_string()),
        _ => Err(Error::NoIpAddress(name.clone())),
    }
}

#[async_trait]
impl<C: ClusterApi> MachineDriver for HarvesterDriver<C> {
    fn driver_name(&self) -> &'static str {
        DRIVER_NAME
    }

    async fn create(&mut self) -> Result<()> {
        info!(machine = %self.name(), namespace = %self.namespace(), "harvester: creating machine");

        self.resolve_ssh_key().await?;

        let images = self.resolve_images().await?;
        let root_image = self.config.image_id(&self.config.image_name);
        self.config.image_download_url = images
            .get(&root_image)
            .map(|i| i.download_url.clone())
            .unwrap_or_default();

        let cloud_init = self.cloud_init().await?;
        let vm = vm::build(&self.config, &cloud_init, &images);
        self.client.create_vm(&vm).await?;
        info!(machine = %self.name(), "harvester: virtual machine created, waiting for it to run");

        self.wait_for_running().await?;
        let ip = self.wait_for_ip().await?;
        info!(machine = %self.name(), ip = %ip, "harvester: machine is running");
        self.config.ip_address = Some(ip);

        Ok(())
    }

    async fn get_state(&self) -> Result<MachineState> {
        match self.client.get_vm(self.namespace(), self.name()).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => return Ok(MachineState::None),
            Err(e) => return Err(e.into()),
        }

        match self.client.get_vmi(self.namespace(), self.name()).await {
            Ok(vmi) => Ok(MachineState::from_phase(vmi.phase())),
            Err(e) if e.is_not_found() => Ok(MachineState::Stopped),
            Err(e) => Err(e.into()),
        }
    }

    async fn start(&self) -> Result<()> {
        self.client.start_vm(self.namespace(), self.name()).await?;
        info!(machine = %self.name(), "harvester: start requested");
        self.wait_for_running().await
    }

    async fn stop(&self) -> Result<()> {
        self.client.stop_vm(self.namespace(), self.name()).await?;
        info!(machine = %self.name(), "harvester: stop requested");
        Ok(())
    }

    async fn restart(&self) -> Result<()> {
        let old = self.get_vmi().await?;
        let old_uid = old.uid().to_string();

        self.client.restart_vm(self.namespace(), self.name()).await?;
        info!(machine = %self.name(), uid = %old_uid, "harvester: restart requested");
        self.wait_for_new_instance(&old_uid).await
    }

    async fn kill(&self) -> Result<()> {
        let mut vm = match self.client.get_vm(self.namespace(), self.name()).await {
            Ok(vm) => vm,
            Err(e) if e.is_not_found() => {
                debug!(machine = %self.name(), "harvester: nothing to kill");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        vm.spec.running = Some(false);
        vm.spec.template.spec.termination_grace_period_seconds = Some(0);
        self.client.update_vm(self.namespace(), self.name(), &vm).await?;
        info!(machine = %self.name(), "harvester: machine killed");
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        let vm = match self.client.get_vm(self.namespace(), self.name()).await {
            Ok(vm) => vm,
            Err(e) if e.is_not_found() => {
                debug!(machine = %self.name(), "harvester: already removed");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let removed_disks = vm.data_volume_names();
        self.client
            .delete_vm(self.namespace(), self.name(), &removed_disks)
            .await?;
        info!(machine = %self.name(), disks = ?removed_disks, "harvester: machine removed");
        Ok(())
    }

    async fn get_ip(&self) -> Result<String> {
        self.must_be_running().await?;
        let vmi = self.get_vmi().await?;
        first_ip(&vmi)
    }
}
