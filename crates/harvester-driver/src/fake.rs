//! In-memory cluster used by the driver tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use harvester_api::{KeyPair, VirtualMachine, VirtualMachineImage, VirtualMachineInstance};

use crate::cluster::ClusterApi;

fn not_found(endpoint: &'static str) -> harvester_api::Error {
    harvester_api::Error::NotFound {
        endpoint,
        body: String::new(),
    }
}

fn forbidden(endpoint: &'static str) -> harvester_api::Error {
    harvester_api::Error::Api {
        endpoint,
        status: reqwest::StatusCode::FORBIDDEN,
        body: "forbidden".into(),
    }
}

#[derive(Default)]
pub(crate) struct FakeState {
    pub vm: Option<VirtualMachine>,
    /// Successive answers to `get_vmi`; the last one repeats. `None` is
    /// answered with not-found.
    pub vmis: VecDeque<Option<VirtualMachineInstance>>,
    pub vm_forbidden: bool,
    pub images: HashMap<String, VirtualMachineImage>,
    pub keypairs: HashMap<String, KeyPair>,

    pub calls: Vec<String>,
    pub created: Option<VirtualMachine>,
    pub updated: Option<VirtualMachine>,
    pub deleted_disks: Option<Vec<String>>,
}

#[derive(Default)]
pub(crate) struct FakeCluster {
    pub state: Mutex<FakeState>,
}

impl FakeCluster {
    pub fn with(f: impl FnOnce(&mut FakeState)) -> Self {
        let cluster = Self::default();
        f(&mut cluster.state.lock().unwrap());
        cluster
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, call: String) -> std::sync::MutexGuard<'_, FakeState> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state
    }
}

pub(crate) fn vmi(name: &str, uid: &str, phase: &str, ip: Option<&str>) -> VirtualMachineInstance {
    let mut vmi = VirtualMachineInstance::default();
    vmi.metadata.name = name.into();
    vmi.metadata.uid = Some(uid.into());
    vmi.status.phase = Some(phase.into());
    if let Some(ip) = ip {
        vmi.status.interfaces.push(harvester_api::VmiInterface {
            name: "default".into(),
            ip_address: Some(ip.into()),
            ..Default::default()
        });
    }
    vmi
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get_vm(&self, namespace: &str, name: &str) -> harvester_api::Result<VirtualMachine> {
        let state = self.record(format!("get_vm {namespace}/{name}"));
        if state.vm_forbidden {
            return Err(forbidden("get virtual machine"));
        }
        state.vm.clone().ok_or_else(|| not_found("get virtual machine"))
    }

    async fn create_vm(&self, vm: &VirtualMachine) -> harvester_api::Result<VirtualMachine> {
        let mut state = self.record(format!("create_vm {}/{}", vm.metadata.namespace, vm.metadata.name));
        state.created = Some(vm.clone());
        state.vm = Some(vm.clone());
        Ok(vm.clone())
    }

    async fn update_vm(
        &self,
        namespace: &str,
        name: &str,
        vm: &VirtualMachine,
    ) -> harvester_api::Result<VirtualMachine> {
        let mut state = self.record(format!("update_vm {namespace}/{name}"));
        state.updated = Some(vm.clone());
        state.vm = Some(vm.clone());
        Ok(vm.clone())
    }

    async fn delete_vm(&self, namespace: &str, name: &str, removed_disks: &[String]) -> harvester_api::Result<()> {
        let mut state = self.record(format!("delete_vm {namespace}/{name}"));
        state.deleted_disks = Some(removed_disks.to_vec());
        state.vm = None;
        Ok(())
    }

    async fn start_vm(&self, namespace: &str, name: &str) -> harvester_api::Result<()> {
        self.record(format!("start_vm {namespace}/{name}"));
        Ok(())
    }

    async fn stop_vm(&self, namespace: &str, name: &str) -> harvester_api::Result<()> {
        self.record(format!("stop_vm {namespace}/{name}"));
        Ok(())
    }

    async fn restart_vm(&self, namespace: &str, name: &str) -> harvester_api::Result<()> {
        self.record(format!("restart_vm {namespace}/{name}"));
        Ok(())
    }

    async fn get_vmi(&self, namespace: &str, name: &str) -> harvester_api::Result<VirtualMachineInstance> {
        let mut state = self.record(format!("get_vmi {namespace}/{name}"));
        let next = if state.vmis.len() > 1 {
            state.vmis.pop_front().flatten()
        } else {
            state.vmis.front().cloned().flatten()
        };
        next.ok_or_else(|| not_found("get virtual machine instance"))
    }

    async fn get_image(&self, namespace: &str, name: &str) -> harvester_api::Result<VirtualMachineImage> {
        let state = self.record(format!("get_image {namespace}/{name}"));
        state
            .images
            .get(&format!("{namespace}/{name}"))
            .cloned()
            .ok_or_else(|| not_found("get image"))
    }

    async fn get_keypair(&self, namespace: &str, name: &str) -> harvester_api::Result<KeyPair> {
        let state = self.record(format!("get_keypair {namespace}/{name}"));
        state
            .keypairs
            .get(&format!("{namespace}/{name}"))
            .cloned()
            .ok_or_else(|| not_found("get key pair"))
    }
}
