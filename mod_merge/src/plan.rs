use std::fs;
use std::path::{Path, PathBuf};

use asset_codec::{ClientVersion, CodecContext, SchemaCodec};
use asset_manifest::Release;
use serde::Deserialize;
use tracing::{info, warn};

use crate::anon::{merge_shared_bundles, IdSource, RandomIds};
use crate::merger::ManifestMerger;
use crate::package::ModPackage;
use crate::resource::Resource;
use crate::snapshot::ReleaseSnapshot;
use crate::stage::StagedBundles;
use crate::store::ResourceStore;
use crate::MergeError;

pub const PLAN_VERSION: u32 = 1;
const ALIAS_ROOT: &str = "ui/";

#[derive(Clone, Debug, Deserialize)]
pub struct MergePlan {
    pub version: u32,
    pub mod_name: String,
    pub target: ReleaseSpec,
    /// Priority order, highest first.
    #[serde(default)]
    pub sources: Vec<ReleaseSpec>,
    #[serde(default)]
    pub options: MergeOptions,
    #[serde(default)]
    pub aliases: Vec<AliasSpec>,
    #[serde(default)]
    pub paths: PathsSpec,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ReleaseSpec {
    pub client_version: String,
    pub res_version: String,
}

impl ReleaseSpec {
    pub fn release(&self) -> Result<Release, MergeError> {
        Ok(Release::parse(&self.client_version, &self.res_version)?)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    pub copy_zonemaps: bool,
    pub merge_shared_scripts: bool,
    pub migrate_levels: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            copy_zonemaps: true,
            merge_shared_scripts: true,
            migrate_levels: true,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AliasSpec {
    pub from: String,
    pub to: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PathsSpec {
    pub mod_dir: PathBuf,
    pub dump_dir: Option<PathBuf>,
}

impl Default for PathsSpec {
    fn default() -> Self {
        Self {
            mod_dir: PathBuf::from("mods"),
            dump_dir: None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PlanValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl PlanValidation {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

impl MergePlan {
    pub fn parse_toml(text: &str) -> Result<Self, MergeError> {
        toml::from_str(text).map_err(|err| MergeError::Plan(err.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, MergeError> {
        let text = fs::read_to_string(path).map_err(|err| MergeError::io(path, err))?;
        Self::parse_toml(&text)
    }

    pub fn validate(&self) -> PlanValidation {
        let mut validation = PlanValidation::default();
        if self.version != PLAN_VERSION {
            validation
                .errors
                .push(format!("unsupported plan version {}", self.version));
        }
        if self.mod_name.trim().is_empty() {
            validation
                .errors
                .push("mod_name must not be empty".to_string());
        }
        check_release(&mut validation, "target", &self.target);
        if self.sources.is_empty() {
            validation
                .errors
                .push("plan has no source releases".to_string());
        }
        for (index, source) in self.sources.iter().enumerate() {
            check_release(&mut validation, &format!("source {}", index), source);
            if *source == self.target {
                validation
                    .errors
                    .push(format!("source {} is the target release", index));
            }
            if self.sources[..index].contains(source) {
                validation.warnings.push(format!(
                    "source {} repeats {}@{}",
                    index, source.client_version, source.res_version
                ));
            }
        }
        for alias in &self.aliases {
            if !alias.to.starts_with(ALIAS_ROOT) {
                validation.warnings.push(format!(
                    "alias {} -> {} is not under {}",
                    alias.from, alias.to, ALIAS_ROOT
                ));
            }
        }
        validation
    }
}

fn check_release(validation: &mut PlanValidation, label: &str, spec: &ReleaseSpec) {
    if let Err(err) = ClientVersion::parse(&spec.client_version) {
        validation
            .errors
            .push(format!("{} client_version: {}", label, err));
    }
    if spec.res_version.trim().is_empty() {
        validation
            .errors
            .push(format!("{} res_version must not be empty", label));
    }
}

pub fn run_plan(
    plan: &MergePlan,
    store: &dyn ResourceStore,
    schema: &dyn SchemaCodec,
) -> Result<ModPackage, MergeError> {
    run_plan_with_ids(plan, store, schema, &mut RandomIds::new())
}

/// Runs the plan and writes the package into `paths.mod_dir`.
pub fn run_plan_into_mod_dir(
    plan: &MergePlan,
    store: &dyn ResourceStore,
    schema: &dyn SchemaCodec,
) -> Result<Vec<PathBuf>, MergeError> {
    run_plan(plan, store, schema)?.write_to(&plan.paths.mod_dir)
}

/// Snapshots, overlay merge, aliasing, shared scripts, staging, level
/// migration and manifest rebuild, in that order.
pub fn run_plan_with_ids(
    plan: &MergePlan,
    store: &dyn ResourceStore,
    schema: &dyn SchemaCodec,
    ids: &mut dyn IdSource,
) -> Result<ModPackage, MergeError> {
    let validation = plan.validate();
    for warning in &validation.warnings {
        warn!(mod_name = %plan.mod_name, "{}", warning);
    }
    if !validation.is_ok() {
        return Err(MergeError::Plan(validation.errors.join("; ")));
    }

    let ctx = CodecContext::new(schema).with_dump_dir(plan.paths.dump_dir.as_deref());
    let mut target = Resource::open(plan.target.release()?, store, ctx)?;
    let mut sources = plan
        .sources
        .iter()
        .map(|spec| Resource::open(spec.release()?, store, ctx))
        .collect::<Result<Vec<_>, MergeError>>()?;

    let target_snapshot = ReleaseSnapshot::from_resource(&mut target)?;
    let source_snapshots = sources
        .iter_mut()
        .map(ReleaseSnapshot::from_resource)
        .collect::<Result<Vec<_>, _>>()?;

    let mut merger = ManifestMerger::new(&target_snapshot, &source_snapshots);
    merger.merge_sources()?;
    if plan.options.copy_zonemaps {
        merger.copy_zonemap_nodes()?;
    }
    for alias in &plan.aliases {
        merger.copy_tree_node(&alias.from, &alias.to)?;
    }
    if let Some(dir) = &plan.paths.dump_dir {
        dump_tree(dir, &target_snapshot.release, &merger.overlay().render())?;
    }

    if plan.options.merge_shared_scripts {
        merge_shared_bundles(
            &mut target,
            &target_snapshot,
            &mut sources,
            &source_snapshots,
            ids,
        )?;
    }

    let mut staged = StagedBundles::prepare(&merger, store)?;
    if plan.options.migrate_levels {
        let migrated = staged.migrate_levels(&merger, store, &ctx)?;
        info!(migrated, "migrated activity levels");
    }

    target.mark_manifest(merger.build_mod()?)?;
    staged.register(&mut target);
    target.build_mod(&plan.mod_name)
}

fn dump_tree(dir: &Path, release: &Release, rendered: &str) -> Result<(), MergeError> {
    fs::create_dir_all(dir).map_err(|err| MergeError::io(dir, err))?;
    let path = dir.join(format!("merger_tree_{}.txt", release.res_version));
    fs::write(&path, rendered).map_err(|err| MergeError::io(&path, err))
}
