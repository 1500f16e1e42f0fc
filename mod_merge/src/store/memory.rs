use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{Container, ObjectClass, ObjectInfo, ResourceStore, StoreError, StoredObject};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct MemoryObject {
    id: i64,
    #[serde(flatten)]
    object: StoredObject,
}

/// Container kept as a plain object list and saved as JSON.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryContainer {
    objects: Vec<MemoryObject>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, StoreError> {
        serde_json::from_slice(data).map_err(|err| StoreError::Malformed(err.to_string()))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(self).map_err(|err| StoreError::Malformed(err.to_string()))
    }

    pub fn with_object(mut self, id: i64, object: StoredObject) -> Self {
        self.objects.push(MemoryObject { id, object });
        self
    }

    pub fn with_text_asset(self, id: i64, name: &str, script: &[u8]) -> Self {
        self.with_object(
            id,
            StoredObject {
                class: ObjectClass::TextAsset,
                name: name.to_string(),
                script: script.to_vec(),
                type_tree: None,
            },
        )
    }

    pub fn with_mono_script(self, id: i64, name: &str) -> Self {
        self.with_object(
            id,
            StoredObject {
                class: ObjectClass::MonoScript,
                name: name.to_string(),
                script: Vec::new(),
                type_tree: Some(json!({"m_ClassName": name})),
            },
        )
    }

    pub fn with_type_tree(self, id: i64, class: ObjectClass, name: &str, tree: Value) -> Self {
        self.with_object(
            id,
            StoredObject {
                class,
                name: name.to_string(),
                script: Vec::new(),
                type_tree: Some(tree),
            },
        )
    }

    fn get(&self, id: i64) -> Result<&MemoryObject, StoreError> {
        self.objects
            .iter()
            .find(|entry| entry.id == id)
            .ok_or(StoreError::MissingObject(id))
    }

    fn get_mut(&mut self, id: i64) -> Result<&mut MemoryObject, StoreError> {
        self.objects
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or(StoreError::MissingObject(id))
    }
}

fn expect_text_asset(entry: &MemoryObject) -> Result<(), StoreError> {
    if entry.object.class != ObjectClass::TextAsset {
        return Err(StoreError::WrongClass {
            id: entry.id,
            class: entry.object.class,
            expected: ObjectClass::TextAsset,
        });
    }
    Ok(())
}

impl Container for MemoryContainer {
    fn objects(&self) -> Vec<ObjectInfo> {
        self.objects
            .iter()
            .map(|entry| ObjectInfo {
                id: entry.id,
                class: entry.object.class,
                name: entry.object.name.clone(),
            })
            .collect()
    }

    fn contains(&self, id: i64) -> bool {
        self.objects.iter().any(|entry| entry.id == id)
    }

    fn read_script(&self, id: i64) -> Result<Vec<u8>, StoreError> {
        let entry = self.get(id)?;
        expect_text_asset(entry)?;
        Ok(entry.object.script.clone())
    }

    fn write_script(&mut self, id: i64, script: Vec<u8>) -> Result<(), StoreError> {
        let entry = self.get_mut(id)?;
        expect_text_asset(entry)?;
        entry.object.script = script;
        Ok(())
    }

    fn read_type_tree(&self, id: i64) -> Result<Value, StoreError> {
        let entry = self.get(id)?;
        entry
            .object
            .type_tree
            .clone()
            .ok_or_else(|| StoreError::Malformed(format!("object {} has no type tree", id)))
    }

    fn export_object(&self, id: i64) -> Result<StoredObject, StoreError> {
        Ok(self.get(id)?.object.clone())
    }

    fn insert_object(&mut self, id: i64, object: StoredObject) -> Result<(), StoreError> {
        if self.contains(id) {
            return Err(StoreError::IdTaken(id));
        }
        self.objects.push(MemoryObject { id, object });
        Ok(())
    }

    fn sort_objects_by_id(&mut self) {
        self.objects.sort_by_key(|entry| entry.id);
    }

    fn save(&self) -> Result<Vec<u8>, StoreError> {
        self.to_bytes()
    }
}

#[derive(Clone, Debug, Default)]
struct MemoryRelease {
    manifest_name: Option<String>,
    assets: BTreeMap<String, Vec<u8>>,
}

/// Release artifacts held in memory; containers are `MemoryContainer` bytes.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    releases: HashMap<String, MemoryRelease>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_asset(&mut self, res_version: &str, name: &str, data: Vec<u8>) {
        self.releases
            .entry(res_version.to_string())
            .or_default()
            .assets
            .insert(name.to_string(), data);
    }

    pub fn insert_container(
        &mut self,
        res_version: &str,
        name: &str,
        container: &MemoryContainer,
    ) -> Result<(), StoreError> {
        self.insert_asset(res_version, name, container.to_bytes()?);
        Ok(())
    }

    /// Stores the encoded manifest and names it in the hot-update list.
    pub fn insert_manifest(&mut self, res_version: &str, name: &str, data: Vec<u8>) {
        self.insert_asset(res_version, name, data);
        self.releases
            .entry(res_version.to_string())
            .or_default()
            .manifest_name = Some(name.to_string());
    }

    fn release(&self, res_version: &str) -> Result<&MemoryRelease, StoreError> {
        self.releases
            .get(res_version)
            .ok_or_else(|| StoreError::NotFound(format!("release {}", res_version)))
    }
}

impl ResourceStore for MemoryStore {
    fn hot_update_list(&self, res_version: &str) -> Result<Vec<u8>, StoreError> {
        let release = self.release(res_version)?;
        let ab_infos: Vec<Value> = release
            .assets
            .keys()
            .map(|name| json!({"name": name}))
            .collect();
        let mut list = json!({"versionId": res_version, "abInfos": ab_infos});
        if let Some(name) = &release.manifest_name {
            list["manifestName"] = json!(name);
        }
        serde_json::to_vec(&list).map_err(|err| StoreError::Backend(err.to_string()))
    }

    fn fetch_asset(&self, res_version: &str, name: &str) -> Result<Vec<u8>, StoreError> {
        self.release(res_version)?
            .assets
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", res_version, name)))
    }

    fn open_container(&self, data: &[u8]) -> Result<Box<dyn Container>, StoreError> {
        Ok(Box::new(MemoryContainer::from_bytes(data)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_round_trips_through_bytes() {
        let container = MemoryContainer::new()
            .with_text_asset(5, "level_a", b"abc")
            .with_mono_script(-3, "Torappu.Foo");
        let bytes = container.save().expect("save ok");
        let mut back = MemoryContainer::from_bytes(&bytes).expect("open ok");
        assert_eq!(back, container);

        back.sort_objects_by_id();
        let ids: Vec<i64> = back.objects().iter().map(|object| object.id).collect();
        assert_eq!(ids, [-3, 5]);
        assert_eq!(back.read_script(5).expect("script"), b"abc");
        assert!(matches!(
            back.read_script(-3),
            Err(StoreError::WrongClass { .. })
        ));
        let exported = back.export_object(-3).expect("export ok");
        assert!(matches!(
            back.insert_object(-3, exported),
            Err(StoreError::IdTaken(-3))
        ));
    }

    #[test]
    fn store_lists_assets_and_manifest() {
        let mut store = MemoryStore::new();
        store.insert_asset("r1", "anon/b.ab", vec![1]);
        store.insert_manifest("r1", "manifest.idx", vec![2]);
        let list: Value =
            serde_json::from_slice(&store.hot_update_list("r1").expect("list ok")).expect("json");
        assert_eq!(list["manifestName"], json!("manifest.idx"));
        assert_eq!(list["abInfos"][0]["name"], json!("anon/b.ab"));
        assert_eq!(store.fetch_asset("r1", "anon/b.ab").expect("fetch ok"), vec![1]);
        assert!(matches!(
            store.fetch_asset("r2", "anon/b.ab"),
            Err(StoreError::NotFound(_))
        ));
    }
}
