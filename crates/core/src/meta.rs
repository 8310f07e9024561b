//! Object metadata and ownership references.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::key::ObjectKey;
use crate::kind::Kind;

/// Label set. Ordered so that equality and rendering are deterministic.
pub type Labels = BTreeMap<String, String>;

/// Metadata carried by every stored object.
///
/// `uid`, `resource_version` and `creation_timestamp` are owned by the
/// object store; clients leave them unset on create.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uuid>,
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    /// Metadata for a new object.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Identity key of this object.
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    /// The owner reference marked as managing controller, if any.
    pub fn controller_ref(&self) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|r| r.controller)
    }

    /// Whether the controller reference points at `owner`.
    ///
    /// Namespace is implied: owner references never cross namespaces, so the
    /// owner must live in this object's namespace.
    pub fn is_controlled_by(&self, owner: &ObjectReference) -> bool {
        owner.namespace == self.namespace
            && self.controller_ref().is_some_and(|r| {
                r.kind == owner.kind.as_str() && r.name == owner.name && Some(r.uid) == owner.uid
            })
    }
}

/// Back-reference from a dependent object to the object that controls it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: Uuid,
    #[serde(default)]
    pub controller: bool,
    #[serde(default)]
    pub block_owner_deletion: bool,
}

/// Value identity of an object, used as the subject of recorded events and as
/// the owner side of ownership checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectReference {
    pub kind: Kind,
    pub namespace: String,
    pub name: String,
    pub uid: Option<Uuid>,
}

impl ObjectReference {
    /// Reference an object by kind and metadata.
    pub fn from_meta(kind: Kind, meta: &ObjectMeta) -> Self {
        Self {
            kind,
            namespace: meta.namespace.clone(),
            name: meta.name.clone(),
            uid: meta.uid,
        }
    }

    /// Identity key of the referenced object.
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }
}
