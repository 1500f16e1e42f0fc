use std::collections::{BTreeMap, BTreeSet, HashMap};

use asset_codec::{
    level_chain, manifest_chain, CodecContext, CodecError, KnownTable, Payload,
};
use asset_manifest::{
    build_legacy_manifest, DependencyDocument, IndexDocument, Release, ResourceManifest,
};
use serde::Deserialize;
use tracing::{debug, info};

use crate::merger::is_anon_bundle;
use crate::package::ModPackage;
use crate::store::{Container, ObjectClass, ResourceStore};
use crate::MergeError;

pub const LEGACY_INDEX_BUNDLE: &str = "torappu_index.ab";
pub const LEGACY_DEPENDENCY_BUNDLE: &str = "torappu.ab";

/// Level ids that identify the bundles holding level payloads when the
/// manifest is not consulted.
pub const ANCHOR_LEVEL_IDS: &[&str] = &["level_main_01-07", "level_camp_03", "level_act3d0_01"];

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotUpdateList {
    #[serde(default)]
    pub manifest_name: Option<String>,
    #[serde(default)]
    pub ab_infos: Vec<AbInfo>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AbInfo {
    pub name: String,
}

/// How `mod_table` / `mod_level` find the bundle holding their payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// First manifest asset named (levels) or prefixed (tables) by this.
    Manifest(&'a str),
    /// Scan of the `anon/` bundles listed in the hot-update list.
    Anonymous,
}

#[derive(Debug, Default)]
struct AnonIndex {
    bundles: BTreeSet<String>,
    by_asset: BTreeMap<String, BTreeSet<String>>,
    level_bundles: BTreeSet<String>,
}

/// Per-release session: opened containers, modifications and the manifest.
pub struct Resource<'a> {
    release: Release,
    store: &'a dyn ResourceStore,
    ctx: CodecContext<'a>,
    hot_update: HotUpdateList,
    containers: HashMap<String, Box<dyn Container>>,
    modified: BTreeSet<String>,
    manifest: Option<ResourceManifest>,
    new_manifest: Option<ResourceManifest>,
    anon: Option<AnonIndex>,
    foreign: BTreeMap<String, Vec<u8>>,
}

impl<'a> Resource<'a> {
    pub fn open(
        release: Release,
        store: &'a dyn ResourceStore,
        ctx: CodecContext<'a>,
    ) -> Result<Self, MergeError> {
        let raw = store.hot_update_list(&release.res_version)?;
        let hot_update: HotUpdateList = serde_json::from_slice(&raw)
            .map_err(|err| MergeError::Schema(format!("hot update list {}: {}", release, err)))?;
        debug!(release = %release, bundles = hot_update.ab_infos.len(), "opened release");
        Ok(Self {
            release,
            store,
            ctx,
            hot_update,
            containers: HashMap::new(),
            modified: BTreeSet::new(),
            manifest: None,
            new_manifest: None,
            anon: None,
            foreign: BTreeMap::new(),
        })
    }

    pub fn release(&self) -> &Release {
        &self.release
    }

    pub fn hot_update_list(&self) -> &HotUpdateList {
        &self.hot_update
    }

    pub fn store(&self) -> &'a dyn ResourceStore {
        self.store
    }

    pub fn codec_context(&self) -> CodecContext<'a> {
        self.ctx
    }

    /// Decodes the manifest on first use, or rebuilds it from the legacy
    /// index containers for releases that predate it.
    pub fn load_manifest(&mut self) -> Result<&ResourceManifest, MergeError> {
        if self.manifest.is_none() {
            let manifest = if self.release.needs_legacy_manifest() {
                self.load_legacy_manifest()?
            } else {
                self.load_native_manifest()?
            };
            info!(
                release = %self.release,
                bundles = manifest.bundles.len(),
                assets = manifest.asset_to_bundle_list.len(),
                "loaded manifest"
            );
            self.manifest = Some(manifest);
        }
        self.manifest
            .as_ref()
            .ok_or_else(|| MergeError::NotFound(format!("manifest of {}", self.release)))
    }

    pub fn manifest(&self) -> Option<&ResourceManifest> {
        self.manifest.as_ref()
    }

    fn manifest_name(&self) -> Result<&str, MergeError> {
        self.hot_update
            .manifest_name
            .as_deref()
            .ok_or_else(|| MergeError::NotFound(format!("manifest name of {}", self.release)))
    }

    fn load_native_manifest(&self) -> Result<ResourceManifest, MergeError> {
        let name = self.manifest_name()?;
        let data = self.store.fetch_asset(&self.release.res_version, name)?;
        let document = manifest_chain(&self.release.client_version)
            .decode(data, &self.ctx)?
            .into_document()?;
        Ok(ResourceManifest::from_document(document)?)
    }

    fn load_legacy_manifest(&mut self) -> Result<ResourceManifest, MergeError> {
        let index = self.first_type_tree(LEGACY_INDEX_BUNDLE, ObjectClass::MonoBehaviour)?;
        let index = IndexDocument::from_document(index)?;
        let dependencies =
            self.first_type_tree(LEGACY_DEPENDENCY_BUNDLE, ObjectClass::AssetBundleManifest)?;
        let dependencies = DependencyDocument::from_document(dependencies)?;
        Ok(build_legacy_manifest(&index, &dependencies)?)
    }

    fn first_type_tree(
        &mut self,
        bundle: &str,
        class: ObjectClass,
    ) -> Result<serde_json::Value, MergeError> {
        let container = self.load_container(bundle)?;
        let object = container
            .find(class, &|_| true)
            .ok_or_else(|| MergeError::NotFound(format!("{} object in {}", class, bundle)))?;
        Ok(container.read_type_tree(object.id)?)
    }

    /// Opens a release bundle once and keeps it for later edits.
    pub fn load_container(&mut self, name: &str) -> Result<&mut dyn Container, MergeError> {
        if !self.containers.contains_key(name) {
            let data = self.store.fetch_asset(&self.release.res_version, name)?;
            let container = self.store.open_container(&data)?;
            self.containers.insert(name.to_string(), container);
        }
        self.containers
            .get_mut(name)
            .map(|container| container.as_mut() as &mut dyn Container)
            .ok_or_else(|| MergeError::NotFound(name.to_string()))
    }

    pub fn container(&self, name: &str) -> Option<&dyn Container> {
        self.containers.get(name).map(|container| container.as_ref())
    }

    pub fn mark_modified(&mut self, name: &str) -> Result<(), MergeError> {
        if !self.containers.contains_key(name) {
            return Err(MergeError::NotFound(format!("{} not loaded", name)));
        }
        self.modified.insert(name.to_string());
        Ok(())
    }

    pub fn is_modified(&self, name: &str) -> bool {
        self.modified.contains(name)
    }

    pub fn query_manifest(&mut self, asset_name: &str) -> Result<String, MergeError> {
        Ok(self.load_manifest()?.bundle_for_asset(asset_name)?.name.clone())
    }

    pub fn query_manifest_by_prefix(&mut self, prefix: &str) -> Result<String, MergeError> {
        Ok(self.load_manifest()?.bundle_for_prefix(prefix)?.name.clone())
    }

    /// Indexes `TextAsset` names of every anonymous bundle and derives the
    /// level bundles from the anchor level ids.
    pub fn load_anon_assets(&mut self) -> Result<(), MergeError> {
        if self.anon.is_some() {
            return Ok(());
        }
        let names: Vec<String> = self
            .hot_update
            .ab_infos
            .iter()
            .filter(|info| is_anon_bundle(&info.name))
            .map(|info| info.name.clone())
            .collect();

        let mut index = AnonIndex::default();
        for name in names {
            let container = self.load_container(&name)?;
            for object in container.objects() {
                if object.class == ObjectClass::TextAsset {
                    index
                        .by_asset
                        .entry(object.name)
                        .or_default()
                        .insert(name.clone());
                }
            }
            index.bundles.insert(name);
        }

        for anchor in ANCHOR_LEVEL_IDS {
            let bundles = index.by_asset.get(*anchor);
            match bundles {
                Some(bundles) if bundles.len() == 1 => {
                    index.level_bundles.extend(bundles.iter().cloned());
                }
                _ => {
                    return Err(MergeError::NotFound(format!(
                        "anchor level {} in a single bundle of {}",
                        anchor, self.release
                    )))
                }
            }
        }
        debug!(
            release = %self.release,
            bundles = index.bundles.len(),
            assets = index.by_asset.len(),
            "indexed anonymous bundles"
        );
        self.anon = Some(index);
        Ok(())
    }

    fn anon_index(&mut self) -> Result<&AnonIndex, MergeError> {
        self.load_anon_assets()?;
        self.anon
            .as_ref()
            .ok_or_else(|| MergeError::NotFound(format!("anonymous index of {}", self.release)))
    }

    pub fn table_bundle(&mut self, table_prefix: &str) -> Result<String, MergeError> {
        let index = self.anon_index()?;
        index
            .by_asset
            .iter()
            .find(|(name, _)| name.starts_with(table_prefix))
            .and_then(|(_, bundles)| bundles.iter().next().cloned())
            .ok_or_else(|| MergeError::NotFound(format!("table {}", table_prefix)))
    }

    pub fn level_bundle(&mut self, level_id: &str) -> Result<String, MergeError> {
        let index = self.anon_index()?;
        let bundles = index
            .by_asset
            .get(level_id)
            .ok_or_else(|| MergeError::NotFound(format!("level {}", level_id)))?;
        bundles
            .iter()
            .find(|bundle| index.level_bundles.contains(*bundle))
            .cloned()
            .ok_or_else(|| MergeError::NotFound(format!("{} is not in a level bundle", level_id)))
    }

    /// Runs `modify` over the decoded table payload and stores the result.
    pub fn mod_table<F>(
        &mut self,
        table: KnownTable,
        lookup: Lookup<'_>,
        modify: F,
    ) -> Result<(), MergeError>
    where
        F: FnOnce(Payload) -> Result<Payload, CodecError>,
    {
        if !table.is_available(&self.release.client_version) {
            return Err(MergeError::Schema(format!(
                "{} is not available in client {}",
                table.name(),
                self.release.client_version
            )));
        }
        let bundle = match lookup {
            Lookup::Manifest(prefix) => self.query_manifest_by_prefix(prefix)?,
            Lookup::Anonymous => self.table_bundle(table.name())?,
        };
        let chain = table.chain(&self.release.client_version, &self.release.res_version);
        let name = table.name();
        self.edit_text_asset(&bundle, &|asset| asset.starts_with(name), |data, ctx| {
            Ok(chain.apply(data, ctx, modify)?)
        })
    }

    pub fn mod_level<F>(
        &mut self,
        level_id: &str,
        lookup: Lookup<'_>,
        modify: F,
    ) -> Result<(), MergeError>
    where
        F: FnOnce(Payload) -> Result<Payload, CodecError>,
    {
        let bundle = match lookup {
            Lookup::Manifest(asset_name) => self.query_manifest(asset_name)?,
            Lookup::Anonymous => self.level_bundle(level_id)?,
        };
        let chain = level_chain(
            level_id,
            &self.release.client_version,
            &self.release.res_version,
        );
        self.edit_text_asset(&bundle, &|asset| asset == level_id, |data, ctx| {
            Ok(chain.apply(data, ctx, modify)?)
        })
    }

    fn edit_text_asset<F>(
        &mut self,
        bundle: &str,
        matches: &dyn Fn(&str) -> bool,
        edit: F,
    ) -> Result<(), MergeError>
    where
        F: FnOnce(Vec<u8>, &CodecContext<'_>) -> Result<Vec<u8>, MergeError>,
    {
        let ctx = self.ctx;
        let container = self.load_container(bundle)?;
        let object = container
            .find(ObjectClass::TextAsset, matches)
            .ok_or_else(|| MergeError::NotFound(format!("text asset in {}", bundle)))?;
        let script = container.read_script(object.id)?;
        container.write_script(object.id, edit(script, &ctx)?)?;
        self.mark_modified(bundle)?;
        debug!(bundle, asset = %object.name, "modified text asset");
        Ok(())
    }

    pub fn register_foreign_asset(&mut self, name: impl Into<String>, data: Vec<u8>) {
        self.foreign.insert(name.into(), data);
    }

    pub fn mark_manifest(&mut self, manifest: ResourceManifest) -> Result<(), MergeError> {
        if self.manifest.is_none() {
            return Err(MergeError::NotFound(format!(
                "manifest of {} not loaded",
                self.release
            )));
        }
        self.new_manifest = Some(manifest);
        Ok(())
    }

    /// Modified containers, then the rebuilt manifest, then foreign assets.
    /// A later entry with the same name replaces an earlier one.
    pub fn build_mod(&self, mod_name: &str) -> Result<ModPackage, MergeError> {
        let mut package = ModPackage::new(mod_name);
        for name in &self.modified {
            let container = self
                .containers
                .get(name)
                .ok_or_else(|| MergeError::NotFound(format!("{} not loaded", name)))?;
            package.insert(name.clone(), container.save()?);
        }
        if let Some(manifest) = &self.new_manifest {
            let name = self.manifest_name()?;
            let data = manifest_chain(&self.release.client_version)
                .encode(Payload::Document(manifest.to_document()?), &self.ctx)?;
            package.insert(name, data);
        }
        for (name, data) in &self.foreign {
            package.insert(name.clone(), data.clone());
        }
        info!(release = %self.release, mod_name, entries = package.len(), "built mod package");
        Ok(package)
    }
}
