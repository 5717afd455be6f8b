//! Translate a machine config into a Harvester `VirtualMachine` resource.

use std::collections::BTreeMap;

use harvester_api::{
    CloudInitNoCloud, Cpu, DataVolumeSource, DataVolumeSourceSpec, DataVolumeSpec, DataVolumeTemplate, Devices,
    Disk, DiskTarget, DomainSpec, HttpSource, Interface, MultusNetwork, Network, ObjectMeta,
    PersistentVolumeClaimSpec, Resources, VirtualMachine, VirtualMachineInstanceSpec,
    VirtualMachineInstanceTemplate, VirtualMachineSpec, Volume,
};
use serde_json::Map;

use crate::cloudinit::CloudInit;
use crate::config::{MachineConfig, NetworkType, split_namespaced};

pub const CREATOR_LABEL: &str = "harvesterhci.io/creator";
pub const CREATOR: &str = "harvester-machine";
pub const VM_NAME_LABEL: &str = "harvesterhci.io/vmName";
pub const IMAGE_ID_ANNOTATION: &str = "harvesterhci.io/imageId";

const CLOUD_INIT_VOLUME: &str = "cloudinitdisk";
const POD_NETWORK: &str = "default";
const TERMINATION_GRACE_PERIOD_SECONDS: i64 = 120;

/// Where the contents of an image-backed disk come from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSource {
    pub download_url: String,
    pub storage_class_name: Option<String>,
}

/// Image sources keyed by `namespace/name`.
pub type ImageSources = BTreeMap<String, ImageSource>;

/// One disk after merging the single-disk flags and the disk info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlannedDisk {
    /// `namespace/name`, empty for a blank disk.
    pub image_id: String,
    pub size: String,
    pub bus: String,
    pub storage_class_name: String,
    pub boot_order: u32,
}

impl MachineConfig {
    /// The disks the VM gets: the disk info when given, otherwise one root
    /// disk cloned from the configured image.
    pub(crate) fn planned_disks(&self) -> Vec<PlannedDisk> {
        match &self.disk_info {
            Some(info) => info
                .disks
                .iter()
                .map(|d| PlannedDisk {
                    image_id: self.image_id(&d.image_name),
                    size: format!("{}Gi", d.size),
                    bus: if d.bus.is_empty() {
                        self.disk_bus.clone()
                    } else {
                        d.bus.clone()
                    },
                    storage_class_name: d.storage_class_name.clone(),
                    boot_order: d.boot_order,
                })
                .collect(),
            None => vec![PlannedDisk {
                image_id: self.image_id(&self.image_name),
                size: self.disk_size.clone(),
                bus: self.disk_bus.clone(),
                storage_class_name: String::new(),
                boot_order: 1,
            }],
        }
    }

    /// Normalise an image reference to `namespace/name`.
    pub(crate) fn image_id(&self, image_name: &str) -> String {
        if image_name.is_empty() {
            return String::new();
        }
        let (ns, name) = split_namespaced(image_name, &self.namespace);
        format!("{ns}/{name}")
    }
}

/// Build the VM resource to create for `config`.
pub fn build(config: &MachineConfig, cloud_init: &CloudInit, images: &ImageSources) -> VirtualMachine {
    let name = config.machine_name.as_str();

    let mut disks = Vec::new();
    let mut volumes = Vec::new();
    let mut data_volume_templates = Vec::new();

    for (i, planned) in config.planned_disks().iter().enumerate() {
        let disk_name = format!("disk-{i}");
        let data_volume_name = format!("{name}-disk-{i}");

        disks.push(Disk {
            name: disk_name.clone(),
            boot_order: (planned.boot_order > 0).then_some(planned.boot_order),
            disk: Some(DiskTarget {
                bus: planned.bus.clone(),
                ..Default::default()
            }),
            ..Default::default()
        });
        volumes.push(Volume {
            name: disk_name,
            data_volume: Some(DataVolumeSource {
                name: data_volume_name.clone(),
                ..Default::default()
            }),
            ..Default::default()
        });
        data_volume_templates.push(data_volume_template(data_volume_name, planned, images));
    }

    disks.push(Disk {
        name: CLOUD_INIT_VOLUME.into(),
        disk: Some(DiskTarget {
            bus: "virtio".into(),
            ..Default::default()
        }),
        ..Default::default()
    });
    volumes.push(Volume {
        name: CLOUD_INIT_VOLUME.into(),
        cloud_init_no_cloud: Some(CloudInitNoCloud {
            user_data: cloud_init.user_data.clone(),
            network_data: cloud_init.network_data.clone(),
            ..Default::default()
        }),
        ..Default::default()
    });

    let (networks, interfaces) = networks(config);

    let mut limits = BTreeMap::new();
    limits.insert("cpu".to_string(), config.cpu.to_string());
    limits.insert("memory".to_string(), config.memory_size.clone());
    let mut requests = BTreeMap::new();
    requests.insert("memory".to_string(), config.memory_size.clone());

    let mut metadata = ObjectMeta::named(&config.namespace, name);
    metadata.labels.insert(CREATOR_LABEL.into(), CREATOR.into());

    let mut template_metadata = ObjectMeta::default();
    template_metadata.labels.insert(VM_NAME_LABEL.into(), name.into());

    VirtualMachine {
        api_version: VirtualMachine::api_version(),
        kind: VirtualMachine::kind(),
        metadata,
        spec: VirtualMachineSpec {
            running: Some(true),
            template: VirtualMachineInstanceTemplate {
                metadata: Some(template_metadata),
                spec: VirtualMachineInstanceSpec {
                    domain: DomainSpec {
                        cpu: Some(Cpu {
                            cores: config.cpu,
                            sockets: Some(1),
                            threads: Some(1),
                            ..Default::default()
                        }),
                        resources: Resources {
                            requests,
                            limits,
                            ..Default::default()
                        },
                        devices: Devices {
                            disks,
                            interfaces,
                            ..Default::default()
                        },
                        ..Default::default()
                    },
                    networks,
                    volumes,
                    affinity: config.vm_affinity.clone(),
                    termination_grace_period_seconds: Some(TERMINATION_GRACE_PERIOD_SECONDS),
                    eviction_strategy: Some("LiveMigrate".into()),
                    ..Default::default()
                },
                ..Default::default()
            },
            data_volume_templates,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn data_volume_template(
    name: String,
    planned: &PlannedDisk,
    images: &ImageSources,
) -> DataVolumeTemplate {
    let mut metadata = ObjectMeta {
        name,
        ..Default::default()
    };

    let image = images.get(&planned.image_id);
    let source = if planned.image_id.is_empty() {
        DataVolumeSourceSpec {
            blank: Some(Map::new()),
            ..Default::default()
        }
    } else {
        metadata
            .annotations
            .insert(IMAGE_ID_ANNOTATION.into(), planned.image_id.clone());
        DataVolumeSourceSpec {
            http: image.map(|i| HttpSource {
                url: i.download_url.clone(),
                ..Default::default()
            }),
            ..Default::default()
        }
    };

    let storage_class_name = if planned.storage_class_name.is_empty() {
        image.and_then(|i| i.storage_class_name.clone())
    } else {
        Some(planned.storage_class_name.clone())
    };

    let mut requests = BTreeMap::new();
    requests.insert("storage".to_string(), planned.size.clone());

    DataVolumeTemplate {
        metadata,
        spec: DataVolumeSpec {
            source: Some(source),
            pvc: PersistentVolumeClaimSpec {
                access_modes: vec!["ReadWriteMany".into()],
                resources: Resources {
                    requests,
                    ..Default::default()
                },
                storage_class_name,
                volume_mode: Some("Block".into()),
                ..Default::default()
            },
            ..Default::default()
        },
        ..Default::default()
    }
}

fn networks(config: &MachineConfig) -> (Vec<Network>, Vec<Interface>) {
    let multus = |i: usize, network_name: &str, mac: &str| {
        let (ns, name) = split_namespaced(network_name, &config.namespace);
        let nic = format!("nic-{i}");
        (
            Network {
                name: nic.clone(),
                multus: Some(MultusNetwork {
                    network_name: format!("{ns}/{name}"),
                    ..Default::default()
                }),
                ..Default::default()
            },
            Interface {
                name: nic,
                model: Some(config.network_model.clone()),
                mac_address: (!mac.is_empty()).then(|| mac.to_string()),
                bridge: Some(Map::new()),
                ..Default::default()
            },
        )
    };

    if let Some(info) = &config.network_info {
        return info
            .interfaces
            .iter()
            .enumerate()
            .map(|(i, iface)| multus(i, &iface.network_name, &iface.mac_address))
            .unzip();
    }

    match config.network_type {
        NetworkType::Pod => (
            vec![Network {
                name: POD_NETWORK.into(),
                pod: Some(Map::new()),
                ..Default::default()
            }],
            vec![Interface {
                name: POD_NETWORK.into(),
                model: Some(config.network_model.clone()),
                masquerade: Some(Map::new()),
                ..Default::default()
            }],
        ),
        NetworkType::Dhcp | NetworkType::Static => {
            let (network, interface) = multus(0, &config.network_name, "");
            (vec![network], vec![interface])
        }
    }
}
