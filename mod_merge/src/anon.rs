use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::resource::Resource;
use crate::snapshot::ReleaseSnapshot;
use crate::store::{Container, ObjectClass};
use crate::MergeError;

/// The shared script bundle is this bundle's first dependency.
pub const SHARED_SCRIPT_ANCHOR: &str = "arts/clue_hub.ab";
/// Draws per inserted object before giving up. Ids are uniform over the
/// 2^32 signed 32-bit values, so hitting this bound takes a target whose id
/// space is nearly full; exhaustion is reported, not retried.
pub const MAX_ID_ATTEMPTS: usize = 1 << 16;

/// Supplies candidate object ids when an inserted object's own id is taken.
pub trait IdSource {
    fn next_id(&mut self) -> i64;
}

/// Uniform signed 32-bit ids.
pub struct RandomIds {
    rng: StdRng,
}

impl RandomIds {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdSource for RandomIds {
    fn next_id(&mut self) -> i64 {
        i64::from(self.rng.gen::<i32>())
    }
}

pub fn shared_script_bundle(snapshot: &ReleaseSnapshot) -> Result<String, MergeError> {
    let anchor = snapshot.graph.index_of(SHARED_SCRIPT_ANCHOR).ok_or_else(|| {
        MergeError::NotFound(format!("{} in {}", SHARED_SCRIPT_ANCHOR, snapshot.release))
    })?;
    snapshot
        .graph
        .dependencies(anchor)
        .next()
        .map(|node| node.name.clone())
        .ok_or_else(|| {
            MergeError::NotFound(format!(
                "dependency of {} in {}",
                SHARED_SCRIPT_ANCHOR, snapshot.release
            ))
        })
}

fn free_id(
    target: &dyn Container,
    preferred: i64,
    ids: &mut dyn IdSource,
) -> Result<i64, MergeError> {
    let mut id = preferred;
    for _ in 0..MAX_ID_ATTEMPTS {
        if !target.contains(id) {
            return Ok(id);
        }
        id = ids.next_id();
    }
    Err(MergeError::Conflict(format!(
        "no free object id after {} attempts",
        MAX_ID_ATTEMPTS
    )))
}

/// Copies every script object whose name the target lacks, then stores the
/// target's objects in id order. Returns the number inserted.
pub fn merge_shared_scripts(
    target: &mut dyn Container,
    sources: &[&dyn Container],
    ids: &mut dyn IdSource,
) -> Result<usize, MergeError> {
    let mut seen: HashSet<String> = target
        .objects()
        .into_iter()
        .filter(|object| object.class == ObjectClass::MonoScript)
        .map(|object| object.name)
        .collect();

    let mut inserted = 0;
    for source in sources {
        for object in source.objects() {
            if object.class != ObjectClass::MonoScript || seen.contains(&object.name) {
                continue;
            }
            let id = free_id(&*target, object.id, ids)?;
            target.insert_object(id, source.export_object(object.id)?)?;
            debug!(script = %object.name, id, "inserted shared script");
            seen.insert(object.name);
            inserted += 1;
        }
    }
    target.sort_objects_by_id();
    Ok(inserted)
}

/// Merges the shared script bundle of every source into the target's copy
/// and marks it modified.
pub fn merge_shared_bundles(
    target: &mut Resource<'_>,
    target_snapshot: &ReleaseSnapshot,
    sources: &mut [Resource<'_>],
    source_snapshots: &[ReleaseSnapshot],
    ids: &mut dyn IdSource,
) -> Result<usize, MergeError> {
    let target_name = shared_script_bundle(target_snapshot)?;
    let mut source_names = Vec::with_capacity(source_snapshots.len());
    for (resource, snapshot) in sources.iter_mut().zip(source_snapshots) {
        let name = shared_script_bundle(snapshot)?;
        resource.load_container(&name)?;
        source_names.push(name);
    }
    let source_containers = sources
        .iter()
        .zip(&source_names)
        .map(|(resource, name)| {
            resource
                .container(name)
                .ok_or_else(|| MergeError::NotFound(format!("{} not loaded", name)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let target_container = target.load_container(&target_name)?;
    let inserted = merge_shared_scripts(target_container, &source_containers, ids)?;
    target.mark_modified(&target_name)?;
    info!(bundle = %target_name, inserted, "merged shared scripts");
    Ok(inserted)
}
