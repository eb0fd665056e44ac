use std::future::Future;
use std::time::Duration;

use log::{debug, info, warn};
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Deserialize;

use crate::engine::models::{ChannelKind, ReleaseChannel, ResolvedRelease};

const USER_AGENT: &str = concat!("bepinex-patcher/", env!("CARGO_PKG_VERSION"));

// The release API lists the x86 build first; the x64 archive is the second asset.
const STABLE_ASSET_INDEX: usize = 1;
// `BepInEx_x64_5.4.21.0.zip` -> `5.4.21.0`
const STABLE_VERSION_OFFSET: usize = 12;
const STABLE_VERSION_LEN: usize = 8;

const ARTIFACTS_SELECTOR: &str = "div.artifacts-list";
const DEV_ANCHOR_INDEX: usize = 1;
// `https://builds.bepinex.dev`
const DEV_HOST_PREFIX_LEN: usize = 26;
// Short commit hash embedded in the artifact file name.
const DEV_VERSION_OFFSET: usize = 93;
const DEV_VERSION_LEN: usize = 7;

/// Resolves where a channel's newest archive lives and what to call it.
pub trait AssetLocator {
    fn locate(
        &self,
        channel: &ReleaseChannel,
    ) -> impl Future<Output = Result<ResolvedRelease, String>>;
}

#[derive(Debug, Deserialize)]
struct ReleaseInfo {
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    #[serde(default)]
    browser_download_url: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Clone)]
pub struct HttpLocator {
    client: Client,
}

impl HttpLocator {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|err| {
                warn!("locator: falling back to default HTTP client configuration ({err})");
                Client::new()
            });
        Self { client }
    }

    async fn get_text(&self, url: &str) -> Result<String, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("request to {url} failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!("{url} returned status: {}", response.status()));
        }

        response
            .text()
            .await
            .map_err(|e| format!("failed to read response from {url}: {e}"))
    }
}

impl AssetLocator for HttpLocator {
    async fn locate(&self, channel: &ReleaseChannel) -> Result<ResolvedRelease, String> {
        if let Some(pinned) = &channel.pinned {
            debug!("locator: {} pinned to {}", channel.kind, pinned.download_url);
            return Ok(pinned.clone());
        }

        info!("locator: resolving latest {} from {}", channel.kind, channel.source_url);
        let body = self.get_text(&channel.source_url).await?;
        let release = match channel.kind {
            ChannelKind::Stable => parse_stable_release(&body)?,
            ChannelKind::Development => parse_dev_listing(&body, &channel.source_url)?,
        };
        info!(
            "locator: latest {} is {} ({})",
            channel.kind, release.version, release.download_url
        );
        Ok(release)
    }
}

/// Extract the download link and version from a GitHub "latest release" payload.
pub fn parse_stable_release(body: &str) -> Result<ResolvedRelease, String> {
    let release: ReleaseInfo =
        serde_json::from_str(body).map_err(|err| format!("Failed to parse release info: {err}"))?;

    let asset = release
        .assets
        .get(STABLE_ASSET_INDEX)
        .ok_or_else(|| format!("release lists {} assets; expected at least 2", release.assets.len()))?;
    let download_url = asset
        .browser_download_url
        .clone()
        .ok_or("release asset has no browser_download_url")?;
    let name = asset.name.as_deref().ok_or("release asset has no name")?;
    let version = char_slice(name, STABLE_VERSION_OFFSET, STABLE_VERSION_LEN)?;

    Ok(ResolvedRelease {
        download_url,
        version,
    })
}

/// Pick the newest artifact from the bleeding-edge build listing page.
pub fn parse_dev_listing(body: &str, listing_url: &str) -> Result<ResolvedRelease, String> {
    let document = Html::parse_document(body);
    let container_selector = Selector::parse(ARTIFACTS_SELECTOR)
        .map_err(|e| format!("invalid selector {ARTIFACTS_SELECTOR}: {e}"))?;
    let link_selector =
        Selector::parse("a[href]").map_err(|e| format!("invalid selector a[href]: {e}"))?;

    let container = document
        .select(&container_selector)
        .next()
        .ok_or("build listing has no artifacts list")?;
    let href = container
        .select(&link_selector)
        .nth(DEV_ANCHOR_INDEX)
        .and_then(|link| link.value().attr("href"))
        .ok_or("artifacts list has no downloadable build link")?;

    let host = char_slice(listing_url, 0, DEV_HOST_PREFIX_LEN)?;
    let download_url = format!("{host}{href}");
    let version = char_slice(&download_url, DEV_VERSION_OFFSET, DEV_VERSION_LEN)?;

    Ok(ResolvedRelease {
        download_url,
        version,
    })
}

fn char_slice(value: &str, start: usize, len: usize) -> Result<String, String> {
    let slice: String = value.chars().skip(start).take(len).collect();
    if slice.chars().count() != len {
        return Err(format!(
            "\"{value}\" is too short to hold {len} characters at offset {start}"
        ));
    }
    Ok(slice)
}

#[cfg(test)]
pub(crate) mod fake {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::*;

    /// Serves canned resolutions and counts lookups.
    #[derive(Default)]
    pub struct FakeLocator {
        pub releases: HashMap<ChannelKind, ResolvedRelease>,
        pub calls: RefCell<Vec<ChannelKind>>,
    }

    impl FakeLocator {
        pub fn with(kind: ChannelKind, download_url: &str, version: &str) -> Self {
            let mut locator = Self::default();
            locator.releases.insert(
                kind,
                ResolvedRelease {
                    download_url: download_url.into(),
                    version: version.into(),
                },
            );
            locator
        }
    }

    impl AssetLocator for FakeLocator {
        async fn locate(&self, channel: &ReleaseChannel) -> Result<ResolvedRelease, String> {
            self.calls.borrow_mut().push(channel.kind);
            self.releases
                .get(&channel.kind)
                .cloned()
                .ok_or_else(|| format!("no release for {}", channel.kind))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING_URL: &str = "https://builds.bepinex.dev/projects/bepinex_be";

    #[test]
    fn resolves_stable_asset_by_fixed_offsets() {
        let body = r#"{"assets":[{}, {"browser_download_url":"http://x/BepInEx_stable_v5.19.00.zip","name":"BepInEx_stable_v5.19.00.zip"}]}"#;
        let release = parse_stable_release(body).unwrap();
        assert_eq!(release.download_url, "http://x/BepInEx_stable_v5.19.00.zip");
        assert_eq!(release.version, "le_v5.19");
        assert_eq!(release.version, &"BepInEx_stable_v5.19.00.zip"[12..20]);
    }

    #[test]
    fn stable_version_from_real_asset_name() {
        let body = r#"{"assets":[
            {"browser_download_url":"http://x/BepInEx_x86_5.4.21.0.zip","name":"BepInEx_x86_5.4.21.0.zip"},
            {"browser_download_url":"http://x/BepInEx_x64_5.4.21.0.zip","name":"BepInEx_x64_5.4.21.0.zip"}
        ]}"#;
        let release = parse_stable_release(body).unwrap();
        assert_eq!(release.version, "5.4.21.0");
    }

    #[test]
    fn stable_release_missing_second_asset_is_an_error() {
        let err = parse_stable_release(r#"{"assets":[{"name":"only"}]}"#).unwrap_err();
        assert!(err.contains("expected at least 2"));
        assert!(parse_stable_release("not json").is_err());
    }

    #[test]
    fn stable_asset_name_too_short_is_an_error() {
        let body = r#"{"assets":[{}, {"browser_download_url":"http://x/a.zip","name":"a.zip"}]}"#;
        assert!(parse_stable_release(body).unwrap_err().contains("too short"));
    }

    #[test]
    fn resolves_dev_build_from_listing() {
        let html = r#"
            <html><body>
              <div class="artifacts-list">
                <a href="/projects/bepinex_be/577/BepInEx-Unity.IL2CPP-win-x64-6.0.0-be.577%2B9dbaa23.zip">IL2CPP</a>
                <a href="/projects/bepinex_be/577/BepInEx-Unity.Mono-win-x64-6.0.0-be.577%2B9dbaa23.zip">Mono</a>
              </div>
              <div class="artifacts-list">
                <a href="/projects/bepinex_be/576/old-1.zip">old</a>
                <a href="/projects/bepinex_be/576/old-2.zip">old</a>
              </div>
            </body></html>"#;

        let release = parse_dev_listing(html, LISTING_URL).unwrap();
        assert_eq!(
            release.download_url,
            "https://builds.bepinex.dev/projects/bepinex_be/577/BepInEx-Unity.Mono-win-x64-6.0.0-be.577%2B9dbaa23.zip"
        );
        assert_eq!(release.version, "9dbaa23");
    }

    #[test]
    fn dev_listing_without_artifacts_is_an_error() {
        let err = parse_dev_listing("<html><body><p>maintenance</p></body></html>", LISTING_URL)
            .unwrap_err();
        assert!(err.contains("no artifacts list"));

        let single = r#"<div class="artifacts-list"><a href="/x.zip">x</a></div>"#;
        assert!(parse_dev_listing(single, LISTING_URL).is_err());
    }

    #[tokio::test]
    async fn pinned_channel_skips_the_network() {
        let pinned = ResolvedRelease {
            download_url: "http://127.0.0.1:9/pinned.zip".into(),
            version: "5.4.19".into(),
        };
        let channel = ReleaseChannel {
            kind: ChannelKind::Stable,
            source_url: "http://127.0.0.1:9/unused".into(),
            staging_dir: "unused".into(),
            pinned: Some(pinned.clone()),
        };
        assert_eq!(HttpLocator::new().locate(&channel).await.unwrap(), pinned);
    }
}
