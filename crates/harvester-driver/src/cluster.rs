use async_trait::async_trait;
use harvester_api::{HarvesterClient, KeyPair, VirtualMachine, VirtualMachineImage, VirtualMachineInstance};

/// The remote calls the lifecycle driver makes.
///
/// Implemented by [`HarvesterClient`]; tests substitute an in-memory cluster.
#[async_trait]
pub trait ClusterApi: Send + Sync + 'static {
    async fn get_vm(&self, namespace: &str, name: &str) -> harvester_api::Result<VirtualMachine>;

    async fn create_vm(&self, vm: &VirtualMachine) -> harvester_api::Result<VirtualMachine>;

    async fn update_vm(
        &self,
        namespace: &str,
        name: &str,
        vm: &VirtualMachine,
    ) -> harvester_api::Result<VirtualMachine>;

    async fn delete_vm(&self, namespace: &str, name: &str, removed_disks: &[String]) -> harvester_api::Result<()>;

    async fn start_vm(&self, namespace: &str, name: &str) -> harvester_api::Result<()>;

    async fn stop_vm(&self, namespace: &str, name: &str) -> harvester_api::Result<()>;

    async fn restart_vm(&self, namespace: &str, name: &str) -> harvester_api::Result<()>;

    async fn get_vmi(&self, namespace: &str, name: &str) -> harvester_api::Result<VirtualMachineInstance>;

    async fn get_image(&self, namespace: &str, name: &str) -> harvester_api::Result<VirtualMachineImage>;

    async fn get_keypair(&self, namespace: &str, name: &str) -> harvester_api::Result<KeyPair>;
}

#[async_trait]
impl ClusterApi for HarvesterClient {
    async fn get_vm(&self, namespace: &str, name: &str) -> harvester_api::Result<VirtualMachine> {
        HarvesterClient::get_vm(self, namespace, name).await
    }

    async fn create_vm(&self, vm: &VirtualMachine) -> harvester_api::Result<VirtualMachine> {
        HarvesterClient::create_vm(self, vm).await
    }

    async fn update_vm(
        &self,
        namespace: &str,
        name: &str,
        vm: &VirtualMachine,
    ) -> harvester_api::Result<VirtualMachine> {
        HarvesterClient::update_vm(self, namespace, name, vm).await
    }

    async fn delete_vm(&self, namespace: &str, name: &str, removed_disks: &[String]) -> harvester_api::Result<()> {
        HarvesterClient::delete_vm(self, namespace, name, removed_disks).await
    }

    async fn start_vm(&self, namespace: &str, name: &str) -> harvester_api::Result<()> {
        HarvesterClient::start_vm(self, namespace, name).await
    }

    async fn stop_vm(&self, namespace: &str, name: &str) -> harvester_api::Result<()> {
        HarvesterClient::stop_vm(self, namespace, name).await
    }

    async fn restart_vm(&self, namespace: &str, name: &str) -> harvester_api::Result<()> {
        HarvesterClient::restart_vm(self, namespace, name).await
    }

    async fn get_vmi(&self, namespace: &str, name: &str) -> harvester_api::Result<VirtualMachineInstance> {
        HarvesterClient::get_vmi(self, namespace, name).await
    }

    async fn get_image(&self, namespace: &str, name: &str) -> harvester_api::Result<VirtualMachineImage> {
        HarvesterClient::get_image(self, namespace, name).await
    }

    async fn get_keypair(&self, namespace: &str, name: &str) -> harvester_api::Result<KeyPair> {
        HarvesterClient::get_keypair(self, namespace, name).await
    }
}
