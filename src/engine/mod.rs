use std::collections::{BTreeMap, BTreeSet};

use log::{debug, error, info, warn};

use crate::config::PatcherConfig;
use crate::deploy::{self, DeployReport};
use crate::engine::models::{ChannelKind, PatchOperation, ResolvedRelease};
use crate::engine::state::{ExitReason, PipelineState};
use crate::installer;
use crate::locator::AssetLocator;
use crate::networking::{FetchOutcome, NetworkClient, RetryPrompt};
use crate::process::{LaunchOutcome, ProcessLauncher};
use crate::util::count_bar;
use crate::validation::{self, Manifest, ValidationOutcome};

pub mod models;
pub mod state;

// Version label used when a channel was deployed without contacting its source.
const STAGED_VERSION: &str = "staged";

pub struct PatcherEngine<L: AssetLocator> {
    state: PipelineState,
    config: PatcherConfig,
    locator: L,
    networking: NetworkClient,
    process: ProcessLauncher,
    resolved: BTreeMap<ChannelKind, ResolvedRelease>,
    // Channels whose staging tree passed (or was refreshed by) validation this session.
    validated: BTreeSet<ChannelKind>,
}

impl<L: AssetLocator> PatcherEngine<L> {
    pub fn new(config: PatcherConfig, locator: L) -> Self {
        let process = ProcessLauncher::from_config(&config.launcher);
        Self {
            state: PipelineState::Idle,
            config,
            locator,
            networking: NetworkClient::new(),
            process,
            resolved: BTreeMap::new(),
            validated: BTreeSet::new(),
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn config(&self) -> &PatcherConfig {
        &self.config
    }

    #[cfg(test)]
    pub(crate) fn locator(&self) -> &L {
        &self.locator
    }

    /// Version label of the last release resolved for `kind` this session.
    pub fn version(&self, kind: ChannelKind) -> Option<&str> {
        self.resolved.get(&kind).map(|release| release.version.as_str())
    }

    pub fn finish(&mut self, reason: ExitReason) {
        self.set_state(PipelineState::Exit(reason));
    }

    /// Resolve a channel once per session; later calls reuse the answer.
    pub async fn resolve(&mut self, kind: ChannelKind) -> Result<ResolvedRelease, String> {
        if let Some(release) = self.resolved.get(&kind) {
            return Ok(release.clone());
        }

        self.set_state(PipelineState::Locating(kind));
        let channel = self.config.channel(kind);
        let result = self.locator.locate(&channel).await;
        self.set_state(PipelineState::Idle);

        let release = result.map_err(|e| format!("failed to resolve {kind}: {e}"))?;
        self.resolved.insert(kind, release.clone());
        Ok(release)
    }

    /// Download the newest archive for `kind` and unpack it into its staging directory.
    pub async fn update_channel(
        &mut self,
        kind: ChannelKind,
        retry: RetryPrompt<'_>,
    ) -> Result<usize, String> {
        let release = self.resolve(kind).await?;
        let channel = self.config.channel(kind);
        let archive = channel.archive_path(&release.version);

        self.set_state(PipelineState::Fetching(kind));
        let outcome = self
            .networking
            .fetch(&release.download_url, &archive, kind.label(), retry)
            .await;
        match outcome {
            FetchOutcome::Completed(report) => {
                debug!("update: {kind} archive fetched in {} attempt(s)", report.attempts);
            }
            FetchOutcome::Abandoned {
                attempts,
                last_error,
            } => {
                self.set_state(PipelineState::Idle);
                return Err(format!(
                    "{kind} download abandoned after {attempts} attempt(s): {last_error}"
                ));
            }
        }

        self.set_state(PipelineState::Installing(kind));
        let result = installer::install(&archive, &channel.staging_dir);
        self.set_state(PipelineState::Idle);

        let extracted = result.map_err(|e| format!("failed to install {kind}: {e}"))?;
        info!(
            "update: {kind} {} staged in {}",
            release.version,
            channel.staging_dir.display()
        );
        Ok(extracted)
    }

    /// Update both channels, stable first. One channel failing does not stop the other.
    pub async fn update_all(
        &mut self,
        retry: RetryPrompt<'_>,
    ) -> Vec<(ChannelKind, Result<usize, String>)> {
        let mut results = Vec::with_capacity(ChannelKind::ALL.len());
        for kind in ChannelKind::ALL {
            let result = self.update_channel(kind, &mut *retry).await;
            if let Err(err) = &result {
                error!("update: {err}");
            }
            results.push((kind, result));
        }
        results
    }

    /// Check a staging directory against its manifest, downloading it again once on mismatch.
    ///
    /// A refresh is reported as success without checking the tree a second time.
    pub async fn verify_channel(
        &mut self,
        kind: ChannelKind,
        retry: RetryPrompt<'_>,
    ) -> ValidationOutcome {
        self.set_state(PipelineState::Validating(kind));
        let channel = self.config.channel(kind);
        let manifest = Manifest::for_channel(kind);

        let outcome =
            match validation::verify(&channel.staging_dir, &manifest, self.config.comparison) {
                Ok(true) => {
                    info!("verify: {kind} files are up to date");
                    ValidationOutcome::Verified
                }
                Ok(false) => {
                    warn!("verify: {kind} files are missing or outdated; downloading again");
                    let error = self.update_channel(kind, retry).await.err();
                    if let Some(err) = &error {
                        error!("verify: refreshing {kind} failed: {err}");
                    }
                    ValidationOutcome::Refreshed { error }
                }
                Err(err) => {
                    error!("verify: unable to check {kind}: {err}");
                    ValidationOutcome::Failed(err)
                }
            };

        if matches!(outcome, ValidationOutcome::Failed(_)) {
            self.validated.remove(&kind);
        } else {
            self.validated.insert(kind);
        }
        self.set_state(PipelineState::Idle);
        outcome
    }

    /// Startup validation of every channel. The first failure stops the session.
    pub async fn start_checks(&mut self, retry: RetryPrompt<'_>) -> Result<(), String> {
        info!("startup: verifying staged patch files");
        for kind in ChannelKind::ALL {
            if let ValidationOutcome::Failed(reason) = self.verify_channel(kind, &mut *retry).await
            {
                return Err(format!("{kind} validation failed: {reason}"));
            }
        }
        info!("startup: all channels ready");
        Ok(())
    }

    /// Overlay one staging tree onto the install. Refused until the channel has been validated.
    pub fn deploy_channel(&mut self, kind: ChannelKind) -> Result<DeployReport, String> {
        if !self.validated.contains(&kind) {
            return Err(format!("{kind} has not passed validation this session"));
        }
        self.set_state(PipelineState::Deploying(kind));
        let op = PatchOperation {
            source: self.config.channel(kind).staging_dir,
            target: self.config.target_dir.clone(),
            version: self.version(kind).unwrap_or(STAGED_VERSION).to_owned(),
        };

        let bar = count_bar(0, kind.label());
        let mut tick = |done: u64, total: u64| {
            bar.set_length(total);
            bar.set_position(done);
        };
        let result = deploy::deploy(&op, Some(&mut tick));
        match &result {
            Ok(_) => bar.finish(),
            Err(err) => {
                bar.abandon();
                error!("deploy: {kind} failed: {err}");
            }
        }

        self.set_state(PipelineState::Idle);
        result
    }

    /// Deploy stable then development so the newer build wins any overlap.
    pub fn deploy_full(&mut self) -> Vec<(ChannelKind, Result<DeployReport, String>)> {
        ChannelKind::ALL
            .into_iter()
            .map(|kind| (kind, self.deploy_channel(kind)))
            .collect()
    }

    pub async fn launch(&mut self) -> Result<LaunchOutcome, String> {
        self.set_state(PipelineState::Launching);
        let result = self.process.launch().await;
        self.set_state(PipelineState::Idle);
        result
    }

    fn set_state(&mut self, state: PipelineState) {
        if self.state != state {
            debug!("state: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }
}
