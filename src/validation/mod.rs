use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Deserialize;
use walkdir::WalkDir;

use crate::engine::models::ChannelKind;

pub(crate) mod manifests;

/// How a snapshot is compared against the expected layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    /// Levels and names must line up exactly.
    Positional,
    /// Names are sorted within each level; levels are compared in walk order.
    #[default]
    Sorted,
    /// Compares the return values of two in-place sorts, so every tree passes.
    LegacyAlwaysTrue,
}

/// Expected file names per directory level of a correctly staged release.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Manifest {
    levels: Vec<Vec<String>>,
}

impl Manifest {
    pub fn new(levels: &[&[&str]]) -> Self {
        Self {
            levels: levels
                .iter()
                .map(|names| names.iter().map(|name| (*name).to_owned()).collect())
                .collect(),
        }
    }

    pub fn for_channel(kind: ChannelKind) -> Self {
        match kind {
            ChannelKind::Stable => Self::new(manifests::STABLE),
            ChannelKind::Development => Self::new(manifests::DEVELOPMENT),
        }
    }
}

/// What is actually on disk, shaped like a [`Manifest`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectorySnapshot {
    levels: Vec<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationOutcome {
    Verified,
    /// The tree did not match, so it was downloaded again; reported as success
    /// without re-checking. `error` holds whatever went wrong during the refresh.
    Refreshed { error: Option<String> },
    Failed(String),
}

/// Walk `dir` top-down and collect the file names found at each directory level.
///
/// Directories are visited in name order and names are sorted within a level.
pub fn snapshot(dir: &Path) -> Result<DirectorySnapshot, String> {
    if !dir.is_dir() {
        return Err(format!("staging directory {} is missing", dir.display()));
    }

    let mut levels: Vec<Vec<String>> = Vec::new();
    let mut index: HashMap<PathBuf, usize> = HashMap::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| format!("failed to walk {}: {e}", dir.display()))?;
        if entry.file_type().is_dir() {
            index.insert(entry.path().to_path_buf(), levels.len());
            levels.push(Vec::new());
        } else if let Some(parent) = entry.path().parent()
            && let Some(&level) = index.get(parent)
        {
            levels[level].push(entry.file_name().to_string_lossy().into_owned());
        }
    }

    Ok(DirectorySnapshot { levels })
}

pub fn matches(snapshot: &DirectorySnapshot, manifest: &Manifest, mode: ComparisonMode) -> bool {
    match mode {
        ComparisonMode::Positional => snapshot.levels == manifest.levels,
        ComparisonMode::Sorted => normalized(&snapshot.levels) == normalized(&manifest.levels),
        ComparisonMode::LegacyAlwaysTrue => {
            legacy_compare(snapshot.levels.clone(), manifest.levels.clone())
        }
    }
}

/// Snapshot `dir` and compare it with `manifest`.
pub fn verify(dir: &Path, manifest: &Manifest, mode: ComparisonMode) -> Result<bool, String> {
    let snapshot = snapshot(dir)?;
    let ok = matches(&snapshot, manifest, mode);
    if ok {
        info!("validation: {} matches its manifest ({mode:?})", dir.display());
    } else {
        let (missing, unexpected) = differences(&snapshot, manifest);
        info!(
            "validation: {} does not match its manifest ({mode:?})",
            dir.display()
        );
        debug!("validation: missing={missing:?} unexpected={unexpected:?}");
    }
    Ok(ok)
}

/// File names expected but absent, and present but not expected, across all levels.
pub fn differences(snapshot: &DirectorySnapshot, manifest: &Manifest) -> (Vec<String>, Vec<String>) {
    let found: BTreeSet<&String> = snapshot.levels.iter().flatten().collect();
    let expected: BTreeSet<&String> = manifest.levels.iter().flatten().collect();
    let missing = expected.difference(&found).map(|s| (*s).clone()).collect();
    let unexpected = found.difference(&expected).map(|s| (*s).clone()).collect();
    (missing, unexpected)
}

// Names are sorted within each level; the level order itself is kept.
fn normalized(levels: &[Vec<String>]) -> Vec<Vec<String>> {
    levels
        .iter()
        .map(|names| {
            let mut names = names.clone();
            names.sort();
            names
        })
        .collect()
}

// `list.sort()` sorts in place and returns nothing, so comparing the two
// results compares nothing with nothing.
#[allow(clippy::unit_cmp, clippy::let_unit_value)]
fn legacy_compare(mut found: Vec<Vec<String>>, mut expected: Vec<Vec<String>>) -> bool {
    let found_sorted = found.sort();
    let expected_sorted = expected.sort();
    found_sorted == expected_sorted
}

#[cfg(test)]
pub(crate) mod test_tree {
    use std::fs;
    use std::path::Path;

    /// Lay out the three-level staging tree described by a channel manifest.
    pub fn stage(root: &Path, levels: &[&[&str]]) {
        let dirs = [root.to_path_buf(), root.join("BepInEx"), root.join("BepInEx").join("core")];
        for (dir, names) in dirs.iter().zip(levels) {
            fs::create_dir_all(dir).unwrap();
            for name in names.iter() {
                fs::write(dir.join(name), name.as_bytes()).unwrap();
            }
        }
    }
}
