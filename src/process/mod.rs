use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use log::{debug, error, info};
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::LauncherConfig;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The platform client returned; `code` is `None` when it was ended by a signal.
    Exited { code: Option<i32> },
    TimedOut,
}

/// Starts the game through the platform client, bounded by a timeout.
#[derive(Clone, Debug)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &LauncherConfig) -> Self {
        Self::new(
            config.program.clone(),
            config.args.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub async fn launch(&self) -> Result<LaunchOutcome, String> {
        info!(
            "launch: starting Valheim via {} {}",
            self.program.display(),
            self.args.join(" ")
        );

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());

        let mut child = cmd
            .spawn()
            .map_err(|e| format!("failed to start {}: {e}", self.program.display()))?;
        debug!("launch: waiting up to {:?} for the client", self.timeout);

        match timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => {
                info!("launch: client returned {status}");
                Ok(LaunchOutcome::Exited {
                    code: status.code(),
                })
            }
            Ok(Err(e)) => Err(format!("failed to wait for {}: {e}", self.program.display())),
            Err(_) => {
                error!(
                    "launch: having trouble starting the game after {:?}; make sure Steam is running",
                    self.timeout
                );
                let _ = child.start_kill();
                Ok(LaunchOutcome::TimedOut)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn reports_client_exit_code() {
        let launcher = ProcessLauncher::new(
            "sh",
            vec!["-c".into(), "exit 3".into()],
            Duration::from_secs(10),
        );
        assert_eq!(
            launcher.launch().await.unwrap(),
            LaunchOutcome::Exited { code: Some(3) }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn gives_up_after_timeout() {
        let launcher =
            ProcessLauncher::new("sleep", vec!["5".into()], Duration::from_millis(200));
        assert_eq!(launcher.launch().await.unwrap(), LaunchOutcome::TimedOut);
    }

    #[tokio::test]
    async fn missing_client_is_an_error() {
        let launcher = ProcessLauncher::new(
            "definitely-not-a-steam-client",
            Vec::new(),
            Duration::from_secs(1),
        );
        assert!(launcher.launch().await.unwrap_err().contains("failed to start"));
    }
}
