//! Wire schema for partition payloads
//!
//! Partitions arrive in one of the supported schema versions, selected by
//! `apiVersion`. Each version is validated and converted into [`Partition`] once,
//! so nothing downstream inspects raw payloads.

use serde::{Deserialize, Serialize};
use slicemesh_core::PartitionId;
use std::collections::BTreeMap;

use crate::types::{
    AddressType, EndpointConditions, EndpointEntry, EndpointPort, Partition, TargetRef,
};

const TOPOLOGY_HOSTNAME: &str = "kubernetes.io/hostname";
const TOPOLOGY_ZONE: &str = "topology.kubernetes.io/zone";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "apiVersion")]
pub enum PartitionPayload {
    #[serde(rename = "discovery.k8s.io/v1")]
    V1(EndpointSliceV1),
    #[serde(rename = "discovery.k8s.io/v1beta1")]
    V1Beta1(EndpointSliceV1Beta1),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSliceV1 {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub address_type: AddressType,
    #[serde(default)]
    pub endpoints: Vec<EndpointV1>,
    #[serde(default)]
    pub ports: Vec<EndpointPort>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointV1 {
    pub addresses: Vec<String>,
    #[serde(default)]
    pub conditions: EndpointConditions,
    #[serde(default)]
    pub target_ref: Option<TargetRef>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSliceV1Beta1 {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub address_type: AddressType,
    #[serde(default)]
    pub endpoints: Vec<EndpointV1Beta1>,
    #[serde(default)]
    pub ports: Vec<EndpointPort>,
}

/// v1beta1 carried placement in a free-form topology map instead of typed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointV1Beta1 {
    pub addresses: Vec<String>,
    #[serde(default)]
    pub conditions: EndpointConditions,
    #[serde(default)]
    pub target_ref: Option<TargetRef>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub topology: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("partition payload has no metadata.name")]
    MissingName,

    #[error("partition {0} has no metadata.namespace")]
    MissingNamespace(String),
}

impl PartitionPayload {
    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::V1(slice) => &mut slice.metadata,
            Self::V1Beta1(slice) => &mut slice.metadata,
        }
    }

    pub fn into_partition(self) -> Result<Partition, PayloadError> {
        Partition::try_from(self)
    }
}

impl TryFrom<PartitionPayload> for Partition {
    type Error = PayloadError;

    fn try_from(payload: PartitionPayload) -> Result<Self, Self::Error> {
        match payload {
            PartitionPayload::V1(slice) => {
                let endpoints = slice
                    .endpoints
                    .into_iter()
                    .map(|e| EndpointEntry {
                        addresses: e.addresses,
                        conditions: e.conditions,
                        target_ref: e.target_ref,
                        hostname: e.hostname,
                        node_name: e.node_name,
                        zone: e.zone,
                    })
                    .collect();
                assemble(slice.metadata, slice.address_type, endpoints, slice.ports)
            }
            PartitionPayload::V1Beta1(slice) => {
                let endpoints = slice
                    .endpoints
                    .into_iter()
                    .map(|mut e| EndpointEntry {
                        addresses: e.addresses,
                        conditions: e.conditions,
                        target_ref: e.target_ref,
                        hostname: e.hostname,
                        node_name: e.topology.remove(TOPOLOGY_HOSTNAME),
                        zone: e.topology.remove(TOPOLOGY_ZONE),
                    })
                    .collect();
                assemble(slice.metadata, slice.address_type, endpoints, slice.ports)
            }
        }
    }
}

fn assemble(
    metadata: ObjectMeta,
    address_type: AddressType,
    endpoints: Vec<EndpointEntry>,
    ports: Vec<EndpointPort>,
) -> Result<Partition, PayloadError> {
    let name = metadata
        .name
        .filter(|n| !n.is_empty())
        .ok_or(PayloadError::MissingName)?;
    let namespace = metadata
        .namespace
        .filter(|n| !n.is_empty())
        .ok_or_else(|| PayloadError::MissingNamespace(name.clone()))?;

    Ok(Partition {
        name: PartitionId::new(name),
        namespace,
        labels: metadata.labels,
        address_type,
        endpoints,
        ports,
    })
}
