use std::fmt;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChannelKind {
    Stable,
    Development,
}

impl ChannelKind {
    /// Both channels in order of release.
    pub const ALL: [ChannelKind; 2] = [ChannelKind::Stable, ChannelKind::Development];

    pub fn label(self) -> &'static str {
        match self {
            ChannelKind::Stable => "stable release",
            ChannelKind::Development => "development build",
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            ChannelKind::Stable => "stable",
            ChannelKind::Development => "development",
        }
    }

    fn archive_prefix(self) -> &'static str {
        match self {
            ChannelKind::Stable => "BepInEx_stable_",
            ChannelKind::Development => "BepInEx_dev_",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedRelease {
    pub download_url: String,
    pub version: String,
}

/// One distribution track, fixed for the whole session.
#[derive(Clone, Debug)]
pub struct ReleaseChannel {
    pub kind: ChannelKind,
    pub source_url: String,
    pub staging_dir: PathBuf,
    pub pinned: Option<ResolvedRelease>,
}

impl ReleaseChannel {
    /// Where the downloaded archive lands before extraction.
    pub fn archive_path(&self, version: &str) -> PathBuf {
        let version: String = version
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        self.staging_dir
            .join(format!("{}{}.zip", self.kind.archive_prefix(), version))
    }
}

/// A single overlay of a staging tree onto the install directory.
#[derive(Clone, Debug)]
pub struct PatchOperation {
    pub source: PathBuf,
    pub target: PathBuf,
    pub version: String,
}
