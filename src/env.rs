use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::PatcherConfig;

const STEAM_APP_ID: &str = "892970";

/// Returns the root directory used by the patcher: the folder holding the executable.
pub fn default_app_dir() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn config_file() -> PathBuf {
    default_app_dir().join("patcher.json")
}

fn steam_root() -> PathBuf {
    match env::consts::OS {
        "windows" => PathBuf::from(r"C:\Program Files (x86)\Steam"),
        "macos" => env::var_os("HOME")
            .map(PathBuf::from)
            .map(|home| home.join("Library").join("Application Support").join("Steam"))
            .unwrap_or_else(|| PathBuf::from("Steam")),
        _ => env::var_os("HOME")
            .map(PathBuf::from)
            .map(|home| home.join(".local").join("share").join("Steam"))
            .unwrap_or_else(|| PathBuf::from("Steam")),
    }
}

/// Valheim install directory inside the default Steam library.
pub fn default_target_dir() -> PathBuf {
    steam_root()
        .join("steamapps")
        .join("common")
        .join("Valheim")
}

pub fn default_launcher_program() -> PathBuf {
    if cfg!(target_os = "windows") {
        steam_root().join("Steam.exe")
    } else {
        PathBuf::from("steam")
    }
}

pub fn default_launcher_args() -> Vec<String> {
    vec!["-applaunch".into(), STEAM_APP_ID.into()]
}

/// Create the on-disk folder layout expected by the patcher.
pub fn ensure_base_dirs(config: &PatcherConfig) -> std::io::Result<()> {
    let mut folders = vec![
        config.stable.staging_dir.clone(),
        config.development.staging_dir.clone(),
    ];
    if let Some(parent) = config.logging.file.parent() {
        folders.push(parent.to_path_buf());
    }

    for dir in folders {
        if dir.as_os_str().is_empty() {
            continue;
        }
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_dir_points_at_valheim() {
        let target = default_target_dir();
        assert!(target.ends_with(Path::new("steamapps").join("common").join("Valheim")));
    }

    #[test]
    fn launcher_args_request_valheim() {
        assert_eq!(default_launcher_args(), vec!["-applaunch", "892970"]);
    }
}
