use std::fs;
use std::path::Path;

use log::{debug, info};
use walkdir::WalkDir;

use crate::engine::models::PatchOperation;
use crate::validation::manifests::PLACEHOLDER;

/// Called with (files copied so far, total files).
pub type DeployProgress<'a> = Option<&'a mut dyn FnMut(u64, u64)>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeployReport {
    pub files_copied: u64,
    pub directories_created: u64,
    pub placeholder_removed: bool,
}

/// Overlay the staging tree onto the install directory.
///
/// Files with the same relative path are overwritten; anything that only exists
/// in the target is left alone. A failure part-way leaves the files copied so far.
pub fn deploy(op: &PatchOperation, mut progress: DeployProgress<'_>) -> Result<DeployReport, String> {
    info!(
        "deploy: patching BepInEx build {} to location: {}",
        op.version,
        op.target.display()
    );
    if !op.source.is_dir() {
        return Err(format!(
            "patch source {} does not exist",
            op.source.display()
        ));
    }

    let total = count_files(&op.source)?;
    fs::create_dir_all(&op.target)
        .map_err(|e| format!("failed to create {}: {e}", op.target.display()))?;

    let mut report = DeployReport::default();
    for entry in WalkDir::new(&op.source).min_depth(1) {
        let entry = entry.map_err(|e| format!("failed to read patch files: {e}"))?;
        let relative = entry
            .path()
            .strip_prefix(&op.source)
            .map_err(|e| format!("unexpected path {}: {e}", entry.path().display()))?;
        let dest = op.target.join(relative);

        if entry.file_type().is_dir() {
            if !dest.is_dir() {
                fs::create_dir_all(&dest)
                    .map_err(|e| format!("failed to create {}: {e}", dest.display()))?;
                report.directories_created += 1;
            }
            continue;
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("failed to create {}: {e}", parent.display()))?;
        }
        fs::copy(entry.path(), &dest).map_err(|e| {
            format!(
                "failed to copy {} to {}: {e}",
                entry.path().display(),
                dest.display()
            )
        })?;
        report.files_copied += 1;
        if let Some(callback) = progress.as_deref_mut() {
            callback(report.files_copied, total);
        }
    }

    report.placeholder_removed = remove_placeholder(&op.target)?;
    info!(
        "deploy: patch build {} successfully installed ({} files, {} new folders)",
        op.version, report.files_copied, report.directories_created
    );
    Ok(report)
}

fn count_files(dir: &Path) -> Result<u64, String> {
    let mut count = 0;
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| format!("failed to read patch files: {e}"))?;
        if !entry.file_type().is_dir() {
            count += 1;
        }
    }
    Ok(count)
}

fn remove_placeholder(target: &Path) -> Result<bool, String> {
    let placeholder = target.join(PLACEHOLDER);
    if !placeholder.is_file() {
        return Ok(false);
    }
    fs::remove_file(&placeholder)
        .map_err(|e| format!("failed to remove {}: {e}", placeholder.display()))?;
    debug!("deploy: removed {}", placeholder.display());
    Ok(true)
}
