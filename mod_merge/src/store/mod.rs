use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

mod memory;

pub use memory::{MemoryContainer, MemoryStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store entry not found: {0}")]
    NotFound(String),
    #[error("no object with id {0}")]
    MissingObject(i64),
    #[error("object {id} is a {class}, not a {expected}")]
    WrongClass {
        id: i64,
        class: ObjectClass,
        expected: ObjectClass,
    },
    #[error("object id {0} already taken")]
    IdTaken(i64),
    #[error("malformed container: {0}")]
    Malformed(String),
    #[error("store backend: {0}")]
    Backend(String),
}

/// Engine object classes the pipeline looks at; everything else is `Other`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectClass {
    TextAsset,
    MonoScript,
    MonoBehaviour,
    AssetBundleManifest,
    Other,
}

impl fmt::Display for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ObjectClass::TextAsset => "TextAsset",
            ObjectClass::MonoScript => "MonoScript",
            ObjectClass::MonoBehaviour => "MonoBehaviour",
            ObjectClass::AssetBundleManifest => "AssetBundleManifest",
            ObjectClass::Other => "other",
        };
        write!(f, "{}", label)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    pub id: i64,
    pub class: ObjectClass,
    pub name: String,
}

/// An object lifted out of one container so it can be inserted into another.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    pub class: ObjectClass,
    pub name: String,
    #[serde(default)]
    pub script: Vec<u8>,
    #[serde(default)]
    pub type_tree: Option<Value>,
}

/// One opened bundle file.
pub trait Container {
    /// Objects in storage order.
    fn objects(&self) -> Vec<ObjectInfo>;

    fn contains(&self, id: i64) -> bool;

    /// Script bytes of a `TextAsset`.
    fn read_script(&self, id: i64) -> Result<Vec<u8>, StoreError>;

    fn write_script(&mut self, id: i64, script: Vec<u8>) -> Result<(), StoreError>;

    fn read_type_tree(&self, id: i64) -> Result<Value, StoreError>;

    fn export_object(&self, id: i64) -> Result<StoredObject, StoreError>;

    /// Fails with `IdTaken` when `id` is in use.
    fn insert_object(&mut self, id: i64, object: StoredObject) -> Result<(), StoreError>;

    fn sort_objects_by_id(&mut self);

    fn save(&self) -> Result<Vec<u8>, StoreError>;

    fn find(&self, class: ObjectClass, matches: &dyn Fn(&str) -> bool) -> Option<ObjectInfo> {
        self.objects()
            .into_iter()
            .find(|object| object.class == class && matches(&object.name))
    }
}

/// Remote release artifacts, addressed by resource version and bundle name.
pub trait ResourceStore {
    fn hot_update_list(&self, res_version: &str) -> Result<Vec<u8>, StoreError>;

    fn fetch_asset(&self, res_version: &str, name: &str) -> Result<Vec<u8>, StoreError>;

    fn open_container(&self, data: &[u8]) -> Result<Box<dyn Container>, StoreError>;
}
