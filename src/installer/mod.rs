use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;

use log::{debug, info, warn};
use zip::read::ZipArchive;

use crate::validation::manifests::PLACEHOLDER;

// Bootstrap files shipped in the archive that the overlay copy must not carry over.
const BOOTSTRAP_FILES: &[&str] = &["doorstop_config.ini"];

/// Unzip `archive` into `staging_dir`, then drop the bootstrap files and the archive.
///
/// The staging root always ends up holding the empty placeholder its manifest
/// lists, even though release archives never ship one. Existing files are overwritten. Nothing is rolled back when extraction fails
/// half-way. Returns the number of files written.
pub fn install(archive: &Path, staging_dir: &Path) -> Result<usize, String> {
    info!(
        "installer: unzipping {} into {}",
        archive.display(),
        staging_dir.display()
    );
    let extracted = extract_zip(archive, staging_dir)?;

    for name in BOOTSTRAP_FILES {
        remove_if_present(&staging_dir.join(name))?;
    }
    fs::remove_file(archive)
        .map_err(|e| format!("failed to delete archive {}: {e}", archive.display()))?;
    write_placeholder(staging_dir)?;

    info!("installer: extracted {extracted} files; patch ready for deployment");
    Ok(extracted)
}

fn extract_zip(archive_path: &Path, dest: &Path) -> Result<usize, String> {
    let file = fs::File::open(archive_path).map_err(|e| format!("zip open error: {e}"))?;
    let mut archive = ZipArchive::new(file).map_err(|e| format!("zip parse error: {e}"))?;
    fs::create_dir_all(dest).map_err(|e| format!("zip dest create error: {e}"))?;

    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| format!("zip entry error: {e}"))?;
        let Some(relative) = entry.enclosed_name() else {
            warn!("installer: skipping unsafe entry {}", entry.name());
            continue;
        };
        let out_path = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(|e| format!("zip dir create error: {e}"))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("zip parent dir error: {e}"))?;
        }
        let mut out_file =
            fs::File::create(&out_path).map_err(|e| format!("zip create file error: {e}"))?;
        io::copy(&mut entry, &mut out_file).map_err(|e| format!("zip write error: {e}"))?;
        written += 1;
    }
    Ok(written)
}

fn write_placeholder(staging_dir: &Path) -> Result<(), String> {
    let path = staging_dir.join(PLACEHOLDER);
    if path.is_file() {
        return Ok(());
    }
    fs::File::create(&path).map_err(|e| format!("failed to create {}: {e}", path.display()))?;
    debug!("installer: created {}", path.display());
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<(), String> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("installer: removed {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("installer: {} not present", path.display());
            Ok(())
        }
        Err(err) => Err(format!("failed to delete {}: {err}", path.display())),
    }
}

#[cfg(test)]
pub(crate) mod test_archive {
    use std::fs;
    use std::io::Write;
    use std::path::Path;

    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    /// Build a zip from `(name, contents)` pairs; names ending in `/` become directories.
    pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, data) in entries {
            if name.ends_with('/') {
                writer
                    .add_directory(*name, SimpleFileOptions::default())
                    .unwrap();
            } else {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(data).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        fs::write(path, zip_bytes(entries)).unwrap();
    }
}
