use asset_codec::CodecContext;
use level_migrate::migrate_level;
use tracing::{debug, info};

use crate::merger::ManifestMerger;
use crate::resource::Resource;
use crate::store::{ObjectClass, ResourceStore};
use crate::MergeError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagedBundle {
    pub name: String,
    pub source: usize,
    pub data: Vec<u8>,
}

/// Payloads of every selected bundle, fetched from their origin releases and
/// held under their final names until packaging.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StagedBundles {
    entries: Vec<StagedBundle>,
}

impl StagedBundles {
    pub fn prepare(
        merger: &ManifestMerger<'_>,
        store: &dyn ResourceStore,
    ) -> Result<Self, MergeError> {
        let mut entries = Vec::new();
        for (name, selected) in merger.bundles() {
            let snapshot = &merger.sources()[selected.source];
            let origin = snapshot
                .graph
                .node(selected.bundle)
                .ok_or_else(|| MergeError::NotFound(format!("origin of bundle {}", name)))?;
            let data = store.fetch_asset(&snapshot.release.res_version, &origin.name)?;
            debug!(bundle = name, origin = %origin.name, bytes = data.len(), "staged bundle");
            entries.push(StagedBundle {
                name: name.to_string(),
                source: selected.source,
                data,
            });
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[StagedBundle] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&StagedBundle> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut StagedBundle> {
        self.entries.iter_mut().find(|entry| entry.name == name)
    }

    /// Migrates the merged activity levels inside their staged bundles to
    /// the target's level schema. Returns the number of levels rewritten.
    pub fn migrate_levels(
        &mut self,
        merger: &ManifestMerger<'_>,
        store: &dyn ResourceStore,
        ctx: &CodecContext<'_>,
    ) -> Result<usize, MergeError> {
        let destination = &merger.target().release.client_version;
        let mut migrated = 0;
        for plan in merger.level_migrations()? {
            let origin = &merger.sources()[plan.source].release;
            let staged = self.get_mut(&plan.bundle_name).ok_or_else(|| {
                MergeError::NotFound(format!("staged bundle {}", plan.bundle_name))
            })?;
            let mut container = store.open_container(&staged.data)?;
            for object in container.objects() {
                if object.class != ObjectClass::TextAsset
                    || !plan.level_ids.contains(&object.name)
                {
                    continue;
                }
                let script = container.read_script(object.id)?;
                let script = migrate_level(
                    &object.name,
                    &origin.client_version,
                    destination,
                    &origin.res_version,
                    script,
                    ctx,
                )?;
                container.write_script(object.id, script)?;
                migrated += 1;
            }
            staged.data = container.save()?;
            info!(bundle = %plan.bundle_name, origin = %origin, "migrated bundle levels");
        }
        Ok(migrated)
    }

    /// Hands every staged payload to the target session for packaging.
    pub fn register(self, target: &mut Resource<'_>) {
        for entry in self.entries {
            target.register_foreign_asset(entry.name, entry.data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asset_codec::header::{add_header, remove_header};
    use asset_codec::JsonSchemaCodec;
    use asset_manifest::{Release, ResourceManifest};
    use serde_json::{json, Value};

    use crate::snapshot::ReleaseSnapshot;
    use crate::store::{Container, MemoryContainer, MemoryStore};

    fn snapshot(client: &str, res: &str, doc: Value) -> ReleaseSnapshot {
        let release = Release::parse(client, res).expect("release ok");
        let manifest = ResourceManifest::from_document(doc).expect("manifest ok");
        ReleaseSnapshot::build(release, manifest).expect("snapshot ok")
    }

    fn target() -> ReleaseSnapshot {
        snapshot(
            "2.7.01",
            "t",
            json!({
                "bundles": [{"name": "ui/common.ab", "props": 0, "sccIndex": 0}],
                "assetToBundleList": [{"assetName": "ui/common/frame", "bundleIndex": 0}]
            }),
        )
    }

    fn source(with_levels: bool) -> ReleaseSnapshot {
        let mut assets = vec![json!({"assetName": "ui/act1/banner", "bundleIndex": 0})];
        if with_levels {
            assets.push(json!({
                "assetName": "gamedata/levels/activities/act1/level_act1_01",
                "bundleIndex": 1
            }));
        }
        snapshot(
            "2.6.91",
            "s",
            json!({
                "bundles": [
                    {"name": "ui/act1.ab", "props": 1, "sccIndex": 0},
                    {"name": "gamedata/levels/activities.ab", "props": 0, "sccIndex": 1}
                ],
                "assetToBundleList": assets
            }),
        )
    }

    fn encoded(value: &Value) -> Vec<u8> {
        add_header(&serde_json::to_vec(value).expect("json ok"))
    }

    fn store(level: Vec<u8>) -> MemoryStore {
        let mut store = MemoryStore::new();
        store.insert_manifest("t", "resource_manifest.idx", encoded(&json!({})));
        store
            .insert_container(
                "s",
                "ui/act1.ab",
                &MemoryContainer::new().with_text_asset(1, "banner", b"banner"),
            )
            .expect("insert ok");
        store
            .insert_container(
                "s",
                "gamedata/levels/activities.ab",
                &MemoryContainer::new()
                    .with_text_asset(1, "level_act1_01", &level)
                    .with_text_asset(2, "level_act1_02", b"left alone"),
            )
            .expect("insert ok");
        store
    }

    fn ctx() -> CodecContext<'static> {
        CodecContext::new(&JsonSchemaCodec)
    }

    #[test]
    fn prepare_stages_every_bundle_under_its_final_name() {
        let target = target();
        let sources = vec![source(true)];
        let mut merger = ManifestMerger::new(&target, &sources);
        merger.merge_sources().expect("merge ok");
        let store = store(encoded(&json!({})));

        let staged = StagedBundles::prepare(&merger, &store).expect("prepare ok");
        let names: Vec<&str> = staged.entries().iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, ["ui/act1.ab", "gamedata/levels/activities-s.ab"]);
        let banner = MemoryContainer::from_bytes(&staged.get("ui/act1.ab").expect("staged").data)
            .expect("container ok");
        assert_eq!(banner.read_script(1).expect("script"), b"banner");
    }

    #[test]
    fn prepare_fails_when_an_origin_bundle_is_missing() {
        let target = target();
        let sources = vec![source(true)];
        let mut merger = ManifestMerger::new(&target, &sources);
        merger.merge_sources().expect("merge ok");
        let mut store = MemoryStore::new();
        store
            .insert_container("s", "ui/act1.ab", &MemoryContainer::new())
            .expect("insert ok");

        let err = StagedBundles::prepare(&merger, &store).expect_err("missing bundle");
        assert_eq!(err.kind(), crate::ErrorKind::NotFound);
    }

    #[test]
    fn migrates_only_the_merged_levels() {
        let target = target();
        let sources = vec![source(true)];
        let mut merger = ManifestMerger::new(&target, &sources);
        merger.merge_sources().expect("merge ok");
        let level = json!({"enemyDbRefs": [{"overwrittenData": {}}]});
        let store = store(encoded(&level));

        let mut staged = StagedBundles::prepare(&merger, &store).expect("prepare ok");
        assert_eq!(staged.migrate_levels(&merger, &store, &ctx()).expect("migrate ok"), 1);

        let levels = MemoryContainer::from_bytes(
            &staged
                .get("gamedata/levels/activities-s.ab")
                .expect("staged")
                .data,
        )
        .expect("container ok");
        let migrated: Value = serde_json::from_slice(
            &remove_header(&levels.read_script(1).expect("script")).expect("header ok"),
        )
        .expect("json ok");
        assert_eq!(
            migrated["enemyDbRefs"][0]["overwrittenData"]["applyWay"],
            json!({"m_defined": false})
        );
        assert_eq!(levels.read_script(2).expect("script"), b"left alone");
    }

    #[test]
    fn failed_level_migration_is_fatal() {
        let target = target();
        let sources = vec![source(true)];
        let mut merger = ManifestMerger::new(&target, &sources);
        merger.merge_sources().expect("merge ok");
        let store = store(add_header(b"not json"));

        let mut staged = StagedBundles::prepare(&merger, &store).expect("prepare ok");
        let before = staged.clone();
        let err = staged
            .migrate_levels(&merger, &store, &ctx())
            .expect_err("corrupt level");
        assert!(matches!(err, MergeError::Migrate(_)));
        assert_eq!(err.kind(), crate::ErrorKind::Schema);
        assert_eq!(staged, before);
    }

    #[test]
    fn bundles_without_levels_are_registered_unchanged() {
        let target_snapshot = target();
        let sources = vec![source(false)];
        let mut merger = ManifestMerger::new(&target_snapshot, &sources);
        merger.merge_sources().expect("merge ok");
        let store = store(encoded(&json!({})));

        let mut staged = StagedBundles::prepare(&merger, &store).expect("prepare ok");
        assert_eq!(staged.migrate_levels(&merger, &store, &ctx()).expect("migrate ok"), 0);
        let data = staged.get("ui/act1.ab").expect("staged").data.clone();

        let mut target =
            Resource::open(target_snapshot.release.clone(), &store, ctx()).expect("open ok");
        staged.register(&mut target);
        let package = target.build_mod("demo").expect("build ok");
        assert_eq!(package.len(), 1);
        assert_eq!(package.get("ui/act1.ab"), Some(data.as_slice()));
    }
}
