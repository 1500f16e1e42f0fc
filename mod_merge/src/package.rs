use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;
use zip::write::FileOptions;
use zip::CompressionMethod;

use crate::MergeError;

const PACKAGE_EXTENSION: &str = "dat";

/// `arts/ui#1.ab` becomes `arts_ui__1`; the caller appends the extension.
pub fn escape_bundle_name(name: &str) -> String {
    name.replace('/', "_").replace('#', "__")
}

/// File name of one package entry: escaped name with its last extension
/// replaced by `.dat`.
pub fn package_file_name(bundle_name: &str) -> String {
    let escaped = escape_bundle_name(bundle_name);
    let stem = match escaped.rfind('.') {
        Some(dot) if dot > 0 => &escaped[..dot],
        _ => escaped.as_str(),
    };
    format!("{}.{}", stem, PACKAGE_EXTENSION)
}

/// Output of one run: bundle name to final payload.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModPackage {
    pub mod_name: String,
    entries: BTreeMap<String, Vec<u8>>,
}

impl ModPackage {
    pub fn new(mod_name: impl Into<String>) -> Self {
        Self {
            mod_name: mod_name.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, bundle_name: impl Into<String>, data: Vec<u8>) {
        self.entries.insert(bundle_name.into(), data);
    }

    pub fn get(&self, bundle_name: &str) -> Option<&[u8]> {
        self.entries.get(bundle_name).map(Vec::as_slice)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(name, data)| (name.as_str(), data.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes `{mod_dir}/{mod_name}/{escaped}.dat`, each a deflate zip
    /// holding a single entry named after the bundle.
    pub fn write_to(&self, mod_dir: &Path) -> Result<Vec<PathBuf>, MergeError> {
        let out_dir = mod_dir.join(&self.mod_name);
        fs::create_dir_all(&out_dir).map_err(|err| MergeError::io(&out_dir, err))?;

        let mut written = Vec::with_capacity(self.entries.len());
        for (bundle_name, data) in &self.entries {
            let path = out_dir.join(package_file_name(bundle_name));
            write_entry(&path, bundle_name, data)?;
            written.push(path);
        }
        info!(
            mod_name = %self.mod_name,
            entries = written.len(),
            dir = %out_dir.display(),
            "wrote mod package"
        );
        Ok(written)
    }
}

fn write_entry(path: &Path, bundle_name: &str, data: &[u8]) -> Result<(), MergeError> {
    let file = File::create(path).map_err(|err| MergeError::io(path, err))?;
    let mut writer = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    writer.start_file(bundle_name, options)?;
    writer
        .write_all(data)
        .map_err(|err| MergeError::io(path, err))?;
    writer.finish()?;
    Ok(())
}
