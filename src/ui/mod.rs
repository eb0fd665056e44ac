use std::io::{BufRead, ErrorKind, Write};

use log::{debug, error, info, warn};

use crate::deploy::DeployReport;
use crate::engine::PatcherEngine;
use crate::engine::models::ChannelKind;
use crate::engine::state::{ExitReason, UserAction};
use crate::locator::AssetLocator;
use crate::logging::text_border;
use crate::process::LaunchOutcome;

pub mod keys;

use self::keys::KeyReader;

const YES_OR_NO: &str = ">> Must ONLY enter either [y] for \"YES\" or [n] for \"NO\".";

/// `y`/`yes` and `n`/`no` in any case; anything else is unrecognised.
pub fn parse_confirmation(input: &str) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// Interactive prompts over a line reader, a writer and an optional raw key reader.
pub struct Console<R, W, K> {
    input: R,
    output: W,
    keys: Option<K>,
}

impl<R: BufRead, W: Write, K: KeyReader> Console<R, W, K> {
    pub fn new(input: R, output: W, keys: Option<K>) -> Self {
        Self {
            input,
            output,
            keys,
        }
    }

    pub fn say(&mut self, text: &str) {
        write_out(&mut self.output, &format!("{text}\n"));
    }

    /// Show `text` and read one line. `None` once input is closed.
    fn prompt(&mut self, text: &str) -> Option<String> {
        write_out(&mut self.output, text);
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => {
                info!("console: input closed");
                None
            }
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_owned()),
            Err(err) => {
                error!("console: failed to read input: {err}");
                None
            }
        }
    }

    pub fn choose(&mut self, menu: &str) -> Option<UserAction> {
        loop {
            let answer = self.prompt(menu)?;
            if let Some(action) = UserAction::from_menu(&answer) {
                info!("menu: chose option [{}]", answer.trim());
                return Some(action);
            }
            warn!("Invalid Input: \"{answer}\"");
            self.say(&format!(
                "\nERROR: Invalid Input\n\n>> Your Entry: \"{answer}\".\n\n>> Must ONLY enter a number from [1] to [6].\n"
            ));
        }
    }

    /// Ask until the answer is yes or no. `None` once input is closed.
    pub fn confirm(&mut self, question: &str) -> Option<bool> {
        loop {
            let answer = self.prompt(&format!(
                "\n{question}\n\n> Enter [y] or [n]:\n{}\n> ",
                text_border()
            ))?;
            if let Some(yes) = parse_confirmation(&answer) {
                return Some(yes);
            }
            warn!("Invalid Input: \"{answer}\"");
            self.say(&format!(
                "\nERROR: Invalid Input\n\n>> Your Entry: \"{answer}\".\n\n{YES_OR_NO}\n"
            ));
        }
    }

    /// Asked after a failed download. Only a yes restarts it.
    pub fn ask_retry(&mut self, error: &str) -> bool {
        self.say(&format!("\nDownload failed: {error}"));
        self.prompt("\nTry again? [y/n]:\n>> ")
            .is_some_and(|answer| parse_confirmation(&answer) == Some(true))
    }

    /// Wait for a key press. `false` when interrupted or input is closed.
    pub fn pause(&mut self) -> bool {
        let Some(keys) = self.keys.as_mut() else {
            return self.prompt("\nPress [ENTER] to continue...").is_some();
        };
        write_out(&mut self.output, "\nPress any key to continue...\n");
        match keys.read_key() {
            Ok(_) => true,
            Err(err) if err.kind() == ErrorKind::Interrupted => {
                warn!("console: interrupted at key prompt");
                false
            }
            Err(err) => {
                error!("console: failed to read key: {err}");
                false
            }
        }
    }
}

fn write_out<W: Write>(output: &mut W, text: &str) {
    if let Err(err) = output
        .write_all(text.as_bytes())
        .and_then(|()| output.flush())
    {
        warn!("console: failed to write output: {err}");
    }
}

fn version_suffix(version: Option<&str>) -> String {
    version.map(|v| format!(" {v}")).unwrap_or_default()
}

fn menu<L: AssetLocator>(engine: &PatcherEngine<L>) -> String {
    let stable = version_suffix(engine.version(ChannelKind::Stable));
    let dev = version_suffix(engine.version(ChannelKind::Development));
    format!(
        "\nWelcome to the Valheim BepInEx Patcher!\n\n\
         Please Choose an Option by Entering its Corresponding Number:\n\n\
         {border}\n\
         >> [1] Patch BepInEx to latest stable release{stable}\n\
         >> [2] Patch BepInEx to latest development/bleeding-edge build{dev}\n\
         >> [3] Apply both patches to BepInEx in chronological order of release\n\
         >> [4] Check for/update to newest patch versions\n\
         >> [5] Open Valheim\n\
         >> [6] Exit Program\n\n> ",
        border = text_border()
    )
}

/// Drive the menu until the session ends.
pub async fn run<L, R, W, K>(
    engine: &mut PatcherEngine<L>,
    console: &mut Console<R, W, K>,
) -> ExitReason
where
    L: AssetLocator,
    R: BufRead,
    W: Write,
    K: KeyReader,
{
    let reason = session(engine, console).await;
    engine.finish(reason);
    info!("session: {:?}", engine.state());
    reason
}

async fn session<L, R, W, K>(
    engine: &mut PatcherEngine<L>,
    console: &mut Console<R, W, K>,
) -> ExitReason
where
    L: AssetLocator,
    R: BufRead,
    W: Write,
    K: KeyReader,
{
    if let Err(err) = engine
        .start_checks(&mut |e: &str| console.ask_retry(e))
        .await
    {
        error!("startup: {err}");
        console.say(&format!("\nUnable to prepare patch files: {err}\n"));
        return ExitReason::Completed;
    }

    loop {
        info!("menu: displaying options");
        let Some(action) = console.choose(&menu(engine)) else {
            return ExitReason::Cancelled;
        };

        match action {
            UserAction::Deploy(kind) => {
                let question = format!(
                    "Really patch BepInEx to latest {kind}{} in location:\n\n>> \"{}\"?",
                    version_suffix(engine.version(kind)),
                    engine.config().target_dir.display()
                );
                match console.confirm(&question) {
                    None => return ExitReason::Cancelled,
                    Some(false) => back_to_menu(console),
                    Some(true) => {
                        let result = engine.deploy_channel(kind);
                        report_deploy(console, kind, result);
                        return start_prompt(engine, console).await;
                    }
                }
            }
            UserAction::DeployBoth => {
                let question = format!(
                    "Really apply both the latest stable release{} and the latest development build{} in location:\n\n>> \"{}\"?",
                    version_suffix(engine.version(ChannelKind::Stable)),
                    version_suffix(engine.version(ChannelKind::Development)),
                    engine.config().target_dir.display()
                );
                match console.confirm(&question) {
                    None => return ExitReason::Cancelled,
                    Some(false) => back_to_menu(console),
                    Some(true) => {
                        for (kind, result) in engine.deploy_full() {
                            report_deploy(console, kind, result);
                        }
                        return start_prompt(engine, console).await;
                    }
                }
            }
            UserAction::CheckForUpdates => {
                let results = engine
                    .update_all(&mut |e: &str| console.ask_retry(e))
                    .await;
                for (kind, result) in results {
                    match result {
                        Ok(count) => console.say(&format!(
                            "\n>> {kind}{} is ready ({count} files)",
                            version_suffix(engine.version(kind))
                        )),
                        Err(err) => console.say(&format!("\n>> {err}")),
                    }
                }
                if !console.pause() {
                    return ExitReason::Cancelled;
                }
            }
            UserAction::LaunchGame => {
                launch_game(engine, console).await;
                return ExitReason::Completed;
            }
            UserAction::Exit => {
                info!("menu: patching process cancelled; preparing to exit");
                return ExitReason::Cancelled;
            }
        }
    }
}

fn report_deploy<R: BufRead, W: Write, K: KeyReader>(
    console: &mut Console<R, W, K>,
    kind: ChannelKind,
    result: Result<DeployReport, String>,
) {
    match result {
        Ok(report) => {
            let placeholder = if report.placeholder_removed {
                ", placeholder removed"
            } else {
                ""
            };
            console.say(&format!(
                "\n>> Patched the {kind}: {} files copied{placeholder}",
                report.files_copied
            ));
        }
        Err(err) => console.say(&format!("\nPatching the {kind} failed: {err}\n")),
    }
}

fn back_to_menu<R: BufRead, W: Write, K: KeyReader>(console: &mut Console<R, W, K>) {
    info!("menu: patching cancelled by user");
    console.say("\n>> BepInEx patching process cancelled\n>> Returning to menu...");
}

async fn start_prompt<L, R, W, K>(
    engine: &mut PatcherEngine<L>,
    console: &mut Console<R, W, K>,
) -> ExitReason
where
    L: AssetLocator,
    R: BufRead,
    W: Write,
    K: KeyReader,
{
    info!("menu: displaying start game prompt");
    match console.confirm("Start Game?") {
        Some(true) => {
            launch_game(engine, console).await;
            ExitReason::Completed
        }
        Some(false) => {
            info!("Patching process successfully completed! Preparing to exit...");
            ExitReason::Completed
        }
        None => ExitReason::Cancelled,
    }
}

async fn launch_game<L, R, W, K>(engine: &mut PatcherEngine<L>, console: &mut Console<R, W, K>)
where
    L: AssetLocator,
    R: BufRead,
    W: Write,
    K: KeyReader,
{
    console.say("\nStarting Game... Opening Valheim...");
    match engine.launch().await {
        Ok(LaunchOutcome::Exited { code }) => debug!("launch: client exit code {code:?}"),
        Ok(LaunchOutcome::TimedOut) => console.say(
            "\nSomething went wrong... Having trouble starting game, ensure Steam is running.\n",
        ),
        Err(err) => {
            error!("launch: {err}");
            console.say(&format!("\nUnable to start Valheim: {err}\n"));
        }
    }
}
