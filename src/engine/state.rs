use super::models::ChannelKind;

// Where the pipeline currently is; the menu and logs read from this.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Locating(ChannelKind),
    Fetching(ChannelKind),
    Installing(ChannelKind),
    Validating(ChannelKind),
    Deploying(ChannelKind),
    Launching,
    Exit(ExitReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    Completed,
    Cancelled,
}

// Actions the user can pick from the main menu.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserAction {
    Deploy(ChannelKind),
    DeployBoth,
    CheckForUpdates,
    LaunchGame,
    Exit,
}

impl UserAction {
    pub fn from_menu(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(UserAction::Deploy(ChannelKind::Stable)),
            "2" => Some(UserAction::Deploy(ChannelKind::Development)),
            "3" => Some(UserAction::DeployBoth),
            "4" => Some(UserAction::CheckForUpdates),
            "5" => Some(UserAction::LaunchGame),
            "6" => Some(UserAction::Exit),
            _ => None,
        }
    }
}
