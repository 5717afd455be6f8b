use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields the cluster adds that this client does not model. Kept so that a
/// get → update round-trip does not strip them.
pub type Extra = Map<String, Value>;

// ── Metadata ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl ObjectMeta {
    pub fn named(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }
}

// ── Virtual machines ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachine {
    #[serde(default = "VirtualMachine::api_version")]
    pub api_version: String,
    #[serde(default = "VirtualMachine::kind")]
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: VirtualMachineSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl VirtualMachine {
    pub fn api_version() -> String {
        "kubevirt.io/v1".into()
    }

    pub fn kind() -> String {
        "VirtualMachine".into()
    }

    /// Names of the volumes backed by a data volume, i.e. the disks the
    /// cluster should delete together with the VM.
    pub fn data_volume_names(&self) -> Vec<String> {
        self.spec
            .template
            .spec
            .volumes
            .iter()
            .filter(|v| v.data_volume.is_some())
            .map(|v| v.name.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
    pub template: VirtualMachineInstanceTemplate,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_volume_templates: Vec<DataVolumeTemplate>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineInstanceTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ObjectMeta>,
    pub spec: VirtualMachineInstanceSpec,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineInstanceSpec {
    pub domain: DomainSpec,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<Network>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_grace_period_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eviction_strategy: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<Cpu>,
    #[serde(default)]
    pub resources: Resources,
    #[serde(default)]
    pub devices: Devices,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cpu {
    pub cores: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sockets: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<u32>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Devices {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disks: Vec<Disk>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<Interface>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disk {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_order: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<DiskTarget>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskTarget {
    pub bus: String,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interface {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub masquerade: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multus: Option<MultusNetwork>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultusNetwork {
    pub network_name: String,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_volume: Option<DataVolumeSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_init_no_cloud: Option<CloudInitNoCloud>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataVolumeSource {
    pub name: String,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudInitNoCloud {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_data: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network_data: String,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataVolumeTemplate {
    pub metadata: ObjectMeta,
    pub spec: DataVolumeSpec,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataVolumeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<DataVolumeSourceSpec>,
    pub pvc: PersistentVolumeClaimSpec,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataVolumeSourceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blank: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpSource {
    pub url: String,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaimSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_modes: Vec<String>,
    #[serde(default)]
    pub resources: Resources,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_mode: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

// ── Virtual machine instances ───────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachineInstance {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: VirtualMachineInstanceStatus,
}

impl VirtualMachineInstance {
    pub fn phase(&self) -> &str {
        self.status.phase.as_deref().unwrap_or_default()
    }

    pub fn uid(&self) -> &str {
        self.metadata.uid.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineInstanceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<VmiInterface>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmiInterface {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_name: Option<String>,
}

// ── Images ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachineImage {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: VirtualMachineImageSpec,
    #[serde(default)]
    pub status: VirtualMachineImageStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineImageSpec {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineImageStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
    #[serde(default)]
    pub progress: i64,
}

// ── Key pairs ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyPair {
    pub metadata: ObjectMeta,
    pub spec: KeyPairSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPairSpec {
    pub public_key: String,
}

// ── Auth ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub response_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_round_trip_keeps_unknown_fields() {
        let raw = serde_json::json!({
            "apiVersion": "kubevirt.io/v1",
            "kind": "VirtualMachine",
            "metadata": { "name": "m1", "namespace": "default", "generation": 3 },
            "spec": {
                "running": true,
                "runStrategy": "Manual",
                "dataVolumeTemplates": [{
                    "apiVersion": "cdi.kubevirt.io/v1beta1",
                    "kind": "DataVolume",
                    "metadata": { "name": "m1-disk-0" },
                    "spec": {
                        "pvc": {
                            "accessModes": ["ReadWriteMany"],
                            "resources": { "requests": { "storage": "40Gi" } },
                            "dataSource": { "kind": "VolumeSnapshot" }
                        },
                        "source": { "blank": {}, "registry": null }
                    }
                }],
                "template": {
                    "metadata": { "labels": { "app": "m1" } },
                    "spec": {
                        "domain": {
                            "cpu": { "cores": 2, "model": "host-passthrough" },
                            "devices": { "disks": [{ "name": "disk-0", "disk": { "bus": "virtio", "readonly": false } }] },
                            "machine": { "type": "q35" }
                        },
                        "networks": [{ "name": "default", "pod": {}, "binding": { "name": "passt" } }],
                        "terminationGracePeriodSeconds": 120,
                        "volumes": [
                            { "name": "disk-0", "dataVolume": { "name": "m1-disk-0", "hotpluggable": true } },
                            {
                                "name": "cloudinitdisk",
                                "cloudInitNoCloud": {
                                    "secretRef": { "name": "m1-userdata" },
                                    "networkDataSecretRef": { "name": "m1-networkdata" }
                                }
                            }
                        ]
                    }
                }
            }
        });

        let vm: VirtualMachine = serde_json::from_value(raw).unwrap();
        assert_eq!(vm.spec.running, Some(true));
        assert_eq!(vm.spec.template.spec.termination_grace_period_seconds, Some(120));

        let back = serde_json::to_value(&vm).unwrap();
        assert_eq!(back["metadata"]["generation"], 3);
        assert_eq!(back["spec"]["runStrategy"], "Manual");
        assert_eq!(back["spec"]["template"]["spec"]["domain"]["machine"]["type"], "q35");
        assert_eq!(back["spec"]["template"]["spec"]["domain"]["cpu"]["model"], "host-passthrough");
        assert_eq!(
            back["spec"]["template"]["spec"]["domain"]["devices"]["disks"][0]["disk"]["readonly"],
            false
        );
        assert_eq!(back["spec"]["template"]["spec"]["networks"][0]["binding"]["name"], "passt");

        let cloud_init = &back["spec"]["template"]["spec"]["volumes"][1]["cloudInitNoCloud"];
        assert_eq!(cloud_init["secretRef"]["name"], "m1-userdata");
        assert_eq!(cloud_init["networkDataSecretRef"]["name"], "m1-networkdata");
        assert_eq!(back["spec"]["template"]["spec"]["volumes"][0]["dataVolume"]["hotpluggable"], true);

        let dv = &back["spec"]["dataVolumeTemplates"][0];
        assert_eq!(dv["apiVersion"], "cdi.kubevirt.io/v1beta1");
        assert_eq!(dv["kind"], "DataVolume");
        assert_eq!(dv["spec"]["pvc"]["dataSource"]["kind"], "VolumeSnapshot");
        assert!(dv["spec"]["source"].as_object().unwrap().contains_key("registry"));

        // nothing the cluster sent is lost
        let reparsed: VirtualMachine = serde_json::from_value(back).unwrap();
        assert_eq!(reparsed, vm);
    }

    #[test]
    fn test_data_volume_names_skips_other_volumes() {
        let raw = serde_json::json!({
            "metadata": { "name": "m1" },
            "spec": {
                "template": {
                    "spec": {
                        "domain": {},
                        "volumes": [
                            { "name": "disk-0", "dataVolume": { "name": "m1-disk-0" } },
                            { "name": "cloudinitdisk", "cloudInitNoCloud": { "userData": "x" } },
                            { "name": "disk-1", "dataVolume": { "name": "m1-disk-1" } }
                        ]
                    }
                }
            }
        });

        let vm: VirtualMachine = serde_json::from_value(raw).unwrap();
        assert_eq!(vm.data_volume_names(), vec!["disk-0", "disk-1"]);
    }

    #[test]
    fn test_vmi_status_defaults() {
        let vmi: VirtualMachineInstance =
            serde_json::from_value(serde_json::json!({ "metadata": { "name": "m1" } })).unwrap();
        assert_eq!(vmi.phase(), "");
        assert_eq!(vmi.uid(), "");
        assert!(vmi.status.interfaces.is_empty());
    }

    #[test]
    fn test_vmi_interface_ip() {
        let vmi: VirtualMachineInstance = serde_json::from_value(serde_json::json!({
            "metadata": { "name": "m1", "uid": "abc" },
            "status": {
                "phase": "Running",
                "interfaces": [{ "name": "default", "ipAddress": "10.52.0.12", "mac": "52:54:00:00:00:01" }]
            }
        }))
        .unwrap();
        assert_eq!(vmi.phase(), "Running");
        assert_eq!(vmi.uid(), "abc");
        assert_eq!(vmi.status.interfaces[0].ip_address.as_deref(), Some("10.52.0.12"));
    }
}
