//! Typed view of a virtual machine's disk attachments
//!
//! Only the fields the attach/detach flow reads are decoded. Everything
//! else in the instance document (extensions, child `resources`, network
//! profile) is left on the server and never sent back.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::pool::naming::hash_disk_uri;

/// Decoded instance document
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDescriptor {
    #[serde(default)]
    pub name: String,
    pub properties: InstanceProperties,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceProperties {
    pub hardware_profile: HardwareProfile,
    pub storage_profile: StorageProfile,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareProfile {
    pub vm_size: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageProfile {
    pub os_disk: Option<OsDisk>,
    #[serde(default)]
    pub data_disks: Vec<DataDisk>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsDisk {
    pub vhd: Option<VhdRef>,
    pub managed_disk: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VhdRef {
    pub uri: String,
}

/// One entry of the node's data disk list
///
/// Fields this crate does not interpret are carried in `extra` so that
/// existing entries are written back unchanged when the list is patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataDisk {
    pub lun: u32,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caching: Option<String>,
    pub create_option: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vhd: Option<VhdRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub managed_disk: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DataDisk {
    /// New blob-backed attachment
    pub fn attach_vhd(name: &str, uri: &str, caching: &str, lun: u32) -> Self {
        Self {
            lun,
            name: name.to_string(),
            caching: Some(caching.to_string()),
            create_option: "Attach".to_string(),
            vhd: Some(VhdRef {
                uri: uri.to_string(),
            }),
            managed_disk: None,
            extra: Map::new(),
        }
    }

    pub fn vhd_uri(&self) -> Option<&str> {
        self.vhd.as_ref().map(|vhd| vhd.uri.as_str())
    }

    /// Whether this entry refers to the disk URI with the given hash
    pub fn matches_hash(&self, hashed_uri: &str) -> bool {
        self.vhd_uri()
            .map(|uri| hash_disk_uri(uri) == hashed_uri)
            .unwrap_or(false)
    }
}

/// How a node stores its disks; only blob-backed nodes can take blob disks
#[derive(Debug, Clone)]
pub enum NodeDiskMode {
    Unmanaged {
        vm_size: String,
        data_disks: Vec<DataDisk>,
    },
    Managed,
}

impl InstanceDescriptor {
    pub fn disk_mode(self) -> NodeDiskMode {
        let storage = self.properties.storage_profile;
        let managed = storage
            .os_disk
            .as_ref()
            .map(|os| os.managed_disk.is_some())
            .unwrap_or(false);

        if managed {
            NodeDiskMode::Managed
        } else {
            NodeDiskMode::Unmanaged {
                vm_size: self.properties.hardware_profile.vm_size,
                data_disks: storage.data_disks,
            }
        }
    }

    pub fn data_disks(&self) -> &[DataDisk] {
        &self.properties.storage_profile.data_disks
    }
}

/// Partial update that replaces a node's data disk list
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstancePatch {
    properties: PatchProperties,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct PatchProperties {
    storage_profile: PatchStorageProfile,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct PatchStorageProfile {
    data_disks: Vec<DataDisk>,
}

impl InstancePatch {
    pub fn with_data_disks(data_disks: Vec<DataDisk>) -> Self {
        Self {
            properties: PatchProperties {
                storage_profile: PatchStorageProfile { data_disks },
            },
        }
    }

    pub fn data_disks(&self) -> &[DataDisk] {
        &self.properties.storage_profile.data_disks
    }
}
