//! Cross-release manifest merging and mod packaging.
#![forbid(unsafe_code)]

pub mod anon;
mod error;
pub mod merger;
pub mod package;
pub mod plan;
pub mod resource;
pub mod snapshot;
pub mod stage;
pub mod store;

pub use anon::{merge_shared_bundles, merge_shared_scripts, IdSource, RandomIds};
pub use error::{ErrorKind, MergeError};
pub use merger::{LevelMigrationPlan, ManifestMerger, MergerBundle, OverlayLeaf};
pub use package::ModPackage;
pub use plan::{run_plan, run_plan_into_mod_dir, run_plan_with_ids, MergePlan, PlanValidation};
pub use resource::{Lookup, Resource};
pub use snapshot::ReleaseSnapshot;
pub use stage::{StagedBundle, StagedBundles};
pub use store::{
    Container, MemoryContainer, MemoryStore, ObjectClass, ObjectInfo, ResourceStore, StoreError,
    StoredObject,
};
