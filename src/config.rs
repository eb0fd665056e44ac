use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::Deserialize;

use crate::engine::models::{ChannelKind, ReleaseChannel, ResolvedRelease};
use crate::env;
use crate::validation::ComparisonMode;

const EMBEDDED_CONFIG: &str = include_str!("../patcher.json");
const DEFAULT_LAUNCH_TIMEOUT_SECS: u64 = 10;

/// Fixed download location that bypasses the release API or build listing.
#[derive(Debug, Clone, Deserialize)]
pub struct PinnedRelease {
    pub download_url: String,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub source_url: String,
    pub staging_dir: PathBuf,
    #[serde(default)]
    pub pinned: Option<PinnedRelease>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LauncherConfig {
    #[serde(default = "env::default_launcher_program")]
    pub program: PathBuf,
    #[serde(default = "env::default_launcher_args")]
    pub args: Vec<String>,
    #[serde(default = "default_launch_timeout")]
    pub timeout_secs: u64,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            program: env::default_launcher_program(),
            args: env::default_launcher_args(),
            timeout_secs: DEFAULT_LAUNCH_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSink {
    #[default]
    File,
    Console,
    Both,
}

impl LogSink {
    pub fn writes_file(self) -> bool {
        matches!(self, LogSink::File | LogSink::Both)
    }

    pub fn writes_console(self) -> bool {
        matches!(self, LogSink::Console | LogSink::Both)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub sink: LogSink,
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_file")]
    pub file: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            sink: LogSink::default(),
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatcherConfig {
    pub stable: ChannelConfig,
    pub development: ChannelConfig,
    #[serde(default = "env::default_target_dir")]
    pub target_dir: PathBuf,
    #[serde(default)]
    pub launcher: LauncherConfig,
    #[serde(default)]
    pub logging: LogConfig,
    #[serde(default)]
    pub comparison: ComparisonMode,
}

fn default_launch_timeout() -> u64 {
    DEFAULT_LAUNCH_TIMEOUT_SECS
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_file() -> PathBuf {
    Path::new("logs").join("patcher.log")
}

impl PatcherConfig {
    pub fn from_json(text: &str) -> Result<Self, String> {
        serde_json::from_str(text).map_err(|e| format!("config parse error: {e}"))
    }

    /// Load the configuration.
    ///
    /// An explicit path must exist and parse. Without one, `patcher.json` next to
    /// the executable is tried before falling back to the embedded defaults.
    /// Relative paths in the result are resolved against the config's folder.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let (mut config, base) = match path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
                let config = Self::from_json(&text)
                    .map_err(|e| format!("{}: {e}", path.display()))?;
                (config, parent_or_cwd(path))
            }
            None => {
                let local = env::config_file();
                match fs::read_to_string(&local) {
                    Ok(text) => {
                        debug!("config: using {}", local.display());
                        (Self::from_json(&text)?, parent_or_cwd(&local))
                    }
                    Err(err) => {
                        debug!(
                            "config: no local {} ({err}); using embedded defaults",
                            local.display()
                        );
                        (Self::from_json(EMBEDDED_CONFIG)?, env::default_app_dir())
                    }
                }
            }
        };

        config.resolve_paths(&base);
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), String> {
        for kind in ChannelKind::ALL {
            let name = kind.id();
            let channel = self.channel_config(kind);
            if !channel.source_url.starts_with("http") {
                return Err(format!("{name}.source_url must be a valid url"));
            }
            if let Some(pinned) = &channel.pinned
                && !pinned.download_url.starts_with("http")
            {
                return Err(format!("{name}.pinned.download_url must be a valid url"));
            }
        }

        if self.launcher.timeout_secs == 0 {
            return Err("launcher.timeout_secs must be at least 1".into());
        }

        if self.stable.staging_dir == self.development.staging_dir {
            warn!("config: stable and development share a staging directory");
        }

        Ok(())
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        let absolutize = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        absolutize(&mut self.stable.staging_dir);
        absolutize(&mut self.development.staging_dir);
        absolutize(&mut self.logging.file);
    }

    fn channel_config(&self, kind: ChannelKind) -> &ChannelConfig {
        match kind {
            ChannelKind::Stable => &self.stable,
            ChannelKind::Development => &self.development,
        }
    }

    pub fn channel(&self, kind: ChannelKind) -> ReleaseChannel {
        let source = self.channel_config(kind);
        ReleaseChannel {
            kind,
            source_url: source.source_url.clone(),
            staging_dir: source.staging_dir.clone(),
            pinned: source.pinned.as_ref().map(|pinned| ResolvedRelease {
                download_url: pinned.download_url.clone(),
                version: pinned.version.clone(),
            }),
        }
    }
}

fn parent_or_cwd(path: &Path) -> PathBuf {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

impl fmt::Display for PatcherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "stable.source      = {}", self.stable.source_url)?;
        writeln!(f, "stable.staging     = {}", self.stable.staging_dir.display())?;
        writeln!(f, "development.source = {}", self.development.source_url)?;
        writeln!(f, "development.staging= {}", self.development.staging_dir.display())?;
        writeln!(f, "target_dir         = {}", self.target_dir.display())?;
        writeln!(f, "launcher           = {}", self.launcher.program.display())?;
        writeln!(f, "comparison         = {:?}", self.comparison)?;
        writeln!(f, "log_file           = {}", self.logging.file.display())?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_config {
    use std::path::Path;

    use super::PatcherConfig;

    /// Embedded defaults with every path moved under `root` and an unreachable source.
    pub fn in_dir(root: &Path) -> PatcherConfig {
        let mut config = PatcherConfig::from_json(super::EMBEDDED_CONFIG).unwrap();
        config.stable.source_url = "http://127.0.0.1:9/stable".into();
        config.development.source_url = "http://127.0.0.1:9/development".into();
        config.resolve_paths(root);
        config.target_dir = root.join("Valheim");
        config
    }
}
